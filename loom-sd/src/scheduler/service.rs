//! Tick loop and control surface
//!
//! Wraps the scheduler in one async mutex so ticks and control calls never
//! overlap. The loop sleeps until the next wall-clock mark, recomputing the
//! delay from the clock each time, and exits on cancellation or when the
//! stream stops itself.

use super::{StreamScheduler, StreamStatus};
use crate::Result;
use chrono::{DateTime, FixedOffset};
use loom_common::time::next_tick_delay_at;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct TickLoop {
    cancel: CancellationToken,
    /// Cancelled by the loop itself once the stream stops on its own
    ended: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct StreamService {
    scheduler: Arc<Mutex<StreamScheduler>>,
    tick_loop: Mutex<Option<TickLoop>>,
}

impl StreamService {
    pub fn new(scheduler: StreamScheduler) -> Self {
        Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            tick_loop: Mutex::new(None),
        }
    }

    /// Shared handle to the scheduler
    pub fn scheduler(&self) -> Arc<Mutex<StreamScheduler>> {
        self.scheduler.clone()
    }

    pub async fn start_continuous_stream(&self) -> Result<StreamStatus> {
        let status = self.scheduler.lock().await.start_continuous().await?;
        self.spawn_tick_loop().await;
        Ok(status)
    }

    pub async fn start_adhoc_stream(
        &self,
        end_time: DateTime<FixedOffset>,
    ) -> Result<StreamStatus> {
        let status = self.scheduler.lock().await.start_adhoc(end_time).await?;
        self.spawn_tick_loop().await;
        Ok(status)
    }

    /// Resume the persisted stream, if any
    pub async fn resume(&self) -> Result<Option<StreamStatus>> {
        let status = self.scheduler.lock().await.resume_persisted().await?;
        if status.is_some() {
            self.spawn_tick_loop().await;
        }
        Ok(status)
    }

    /// Halt the tick loop, then stop the stream
    pub async fn stop_stream(&self) -> Result<()> {
        self.halt_tick_loop().await;
        self.scheduler.lock().await.stop().await
    }

    /// Halt the tick loop and the driver, keeping the stream resumable
    pub async fn shutdown(&self) -> Result<()> {
        self.halt_tick_loop().await;
        self.scheduler.lock().await.shutdown().await
    }

    /// Resolves once the running stream stops itself
    ///
    /// Pending forever when no tick loop is running.
    pub async fn stream_ended(&self) {
        let ended = self
            .tick_loop
            .lock()
            .await
            .as_ref()
            .map(|t| t.ended.clone());
        match ended {
            Some(ended) => ended.cancelled().await,
            None => std::future::pending().await,
        }
    }

    pub async fn stream_status(&self) -> StreamStatus {
        self.scheduler.lock().await.status()
    }

    /// Whether a tick loop task is still running
    pub async fn is_ticking(&self) -> bool {
        self.tick_loop
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    async fn halt_tick_loop(&self) {
        if let Some(tick_loop) = self.tick_loop.lock().await.take() {
            tick_loop.cancel.cancel();
            if let Err(e) = tick_loop.handle.await {
                warn!("Tick loop task ended abnormally: {}", e);
            }
        }
    }

    async fn spawn_tick_loop(&self) {
        let mut slot = self.tick_loop.lock().await;
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let ended = CancellationToken::new();
        let handle = tokio::spawn(run_tick_loop(
            self.scheduler.clone(),
            cancel.clone(),
            ended.clone(),
        ));
        *slot = Some(TickLoop {
            cancel,
            ended,
            handle,
        });
    }
}

async fn run_tick_loop(
    scheduler: Arc<Mutex<StreamScheduler>>,
    cancel: CancellationToken,
    ended: CancellationToken,
) {
    let (clock, interval_secs) = {
        let scheduler = scheduler.lock().await;
        (scheduler.clock(), scheduler.config().tick_interval.as_secs().max(1))
    };
    info!(interval_secs, "Tick loop started");

    loop {
        let delay = next_tick_delay_at(&clock.now(), interval_secs);
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Tick loop cancelled");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let mut scheduler = scheduler.lock().await;
        let outcome = scheduler.tick().await;
        debug!(?outcome, "Tick complete");

        if !scheduler.state().is_active() {
            info!("Stream no longer active, tick loop exiting");
            ended.cancel();
            break;
        }
    }
}
