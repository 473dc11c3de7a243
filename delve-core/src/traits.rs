//! Core trait definitions

use crate::error::DelveResult;
use crate::types::SourceRecord;
use async_trait::async_trait;

/// Retrieves candidate sources for a search query.
///
/// Implementations return results in their own relevance order, at most
/// `max_count` of them, and an empty vector (not an error) when nothing
/// matches.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, query: &str, max_count: usize) -> DelveResult<Vec<SourceRecord>>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "fetcher"
    }
}
