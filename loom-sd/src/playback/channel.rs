//! Channel playback driver
//!
//! Forwards every command over a bounded `mpsc` channel to an external
//! renderer task. A full channel applies backpressure to the scheduler.

use super::{DriverHealth, PlaybackDriver};
use crate::{Error, Result};
use async_trait::async_trait;
use loom_common::MediaBlock;
use tokio::sync::mpsc;
use tracing::debug;

/// Command delivered to the renderer
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    Enqueue(MediaBlock),
    Play,
    Pause,
    Stop,
}

#[derive(Debug, Clone)]
pub struct ChannelDriver {
    tx: mpsc::Sender<DriverCommand>,
}

impl ChannelDriver {
    /// Create the driver and the receiver the renderer consumes
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DriverCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn send(&self, command: DriverCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::Playback("Renderer channel closed".to_string()))
    }
}

#[async_trait]
impl PlaybackDriver for ChannelDriver {
    async fn enqueue(&self, block: &MediaBlock) -> Result<()> {
        debug!(block_id = %block.id, "Forwarding block to renderer");
        self.send(DriverCommand::Enqueue(block.clone())).await
    }

    async fn play(&self) -> Result<()> {
        self.send(DriverCommand::Play).await
    }

    async fn pause(&self) -> Result<()> {
        self.send(DriverCommand::Pause).await
    }

    async fn stop(&self) -> Result<()> {
        self.send(DriverCommand::Stop).await
    }

    async fn health_check(&self) -> Result<DriverHealth> {
        if self.tx.is_closed() {
            Ok(DriverHealth::degraded("renderer channel closed"))
        } else {
            Ok(DriverHealth::ok(format!(
                "renderer channel open, {} slots free",
                self.tx.capacity()
            )))
        }
    }
}
