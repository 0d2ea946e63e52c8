//! Candidate query description shared by the media and show repositories

use chrono::{DateTime, Utc};
use loom_common::time::duration_to_millis;
use loom_common::MediaKind;
use sqlx::{QueryBuilder, Sqlite};
use std::time::Duration;
use uuid::Uuid;

/// Tag requirement: an item must carry at least one name from every group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagFilter {
    groups: Vec<Vec<String>>,
}

impl TagFilter {
    /// No tag requirement
    pub fn any() -> Self {
        Self::default()
    }

    /// Add a group; empty groups are ignored
    pub fn require_any_of<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut group: Vec<String> = names.into_iter().map(Into::into).collect();
        group.sort();
        group.dedup();
        if !group.is_empty() {
            self.groups.push(group);
        }
        self
    }

    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    pub fn is_unfiltered(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Exclude items used in `context` that are still inside their window
#[derive(Debug, Clone, PartialEq)]
pub struct RecencyExclusion {
    pub context: String,
    pub lookback: Duration,
    pub as_of: DateTime<Utc>,
}

/// Filters for a candidate lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateQuery {
    /// Empty matches every kind
    pub kinds: Vec<MediaKind>,
    pub tags: TagFilter,
    pub recency: Option<RecencyExclusion>,
    pub max_duration: Option<Duration>,
    pub exclude_ids: Vec<Uuid>,
}

impl CandidateQuery {
    pub fn of_kinds(kinds: &[MediaKind]) -> Self {
        Self {
            kinds: kinds.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: TagFilter) -> Self {
        self.tags = tags;
        self
    }

    pub fn excluding_recent(
        mut self,
        context: impl Into<String>,
        lookback: Duration,
        as_of: DateTime<Utc>,
    ) -> Self {
        self.recency = Some(RecencyExclusion {
            context: context.into(),
            lookback,
            as_of,
        });
        self
    }

    pub fn with_max_duration(mut self, max_duration: Option<Duration>) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn excluding_ids(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.exclude_ids.extend(ids);
        self
    }

    /// Append the WHERE clauses for this query
    ///
    /// `alias` is the candidate table alias, `link_table`/`link_column` the
    /// tag join table and its foreign key, `duration_column` the column the
    /// duration cap applies to. Kind filtering is left to the caller.
    pub(crate) fn push_filters(
        &self,
        qb: &mut QueryBuilder<'_, Sqlite>,
        alias: &str,
        link_table: &str,
        link_column: &str,
        duration_column: &str,
    ) {
        if let Some(max) = self.max_duration {
            qb.push(format!(" AND {}.{} <= ", alias, duration_column));
            qb.push_bind(duration_to_millis(max));
        }

        for group in self.tags.groups() {
            qb.push(format!(
                " AND EXISTS (SELECT 1 FROM {lt} lt JOIN tags t ON t.guid = lt.tag_id \
                 WHERE lt.{lc} = {a}.guid AND t.name IN (",
                lt = link_table,
                lc = link_column,
                a = alias
            ));
            let mut names = qb.separated(", ");
            for name in group {
                names.push_bind(name.clone());
            }
            names.push_unseparated("))");
        }

        if !self.exclude_ids.is_empty() {
            qb.push(format!(" AND {}.guid NOT IN (", alias));
            let mut ids = qb.separated(", ");
            for id in &self.exclude_ids {
                ids.push_bind(id.to_string());
            }
            ids.push_unseparated(")");
        }

        if let Some(recency) = &self.recency {
            let now_ms = recency.as_of.timestamp_millis();
            let window_start = now_ms.saturating_sub(duration_to_millis(recency.lookback));
            qb.push(format!(
                " AND NOT EXISTS (SELECT 1 FROM media_usage u WHERE u.media_id = {}.guid AND u.usage_context = ",
                alias
            ));
            qb.push_bind(recency.context.clone());
            qb.push(" AND ((u.expires_at IS NOT NULL AND u.expires_at > ");
            qb.push_bind(now_ms);
            qb.push(") OR (u.expires_at IS NULL AND u.used_at > ");
            qb.push_bind(window_start);
            qb.push(")))");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_filter_skips_empty_groups() {
        let filter = TagFilter::any()
            .require_any_of(Vec::<String>::new())
            .require_any_of(["noir", "noir", "crime"]);
        assert_eq!(filter.groups(), &[vec!["crime".to_string(), "noir".to_string()]]);
        assert!(!filter.is_unfiltered());
        assert!(TagFilter::any().is_unfiltered());
    }

    #[test]
    fn test_push_filters_renders_clauses() {
        let query = CandidateQuery::of_kinds(&[MediaKind::Commercial])
            .with_tags(TagFilter::any().require_any_of(["xmas"]).require_any_of(["retro"]))
            .with_max_duration(Some(Duration::from_secs(60)))
            .excluding_ids([Uuid::nil()])
            .excluding_recent("buffer", Duration::from_secs(7200), Utc::now());

        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT m.guid FROM media m WHERE 1 = 1");
        query.push_filters(&mut qb, "m", "media_tags", "media_id", "duration_ms");
        let sql = qb.sql().to_string();

        assert_eq!(sql.matches("AND EXISTS").count(), 2);
        assert!(sql.contains("m.duration_ms <= "));
        assert!(sql.contains("m.guid NOT IN ("));
        assert!(sql.contains("NOT EXISTS (SELECT 1 FROM media_usage u"));
    }
}
