use async_trait::async_trait;
use njvox_core::error::Result;

use crate::types::EnrichmentRecord;

/// One subject to enrich, as handed to the external provider.
#[derive(Debug, Clone)]
pub struct EnrichmentQuery {
    pub person_id: String,
    pub min_likelihood: u8,
}

/// External third-party enrichment service. Implementations own the
/// network call and any provider-specific retry policy; the coordinator
/// only ever sees `EnrichmentRecord` or `None` (no match at threshold).
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich_one(&self, query: &EnrichmentQuery) -> Result<Option<EnrichmentRecord>>;

    async fn enrich_batch(
        &self,
        queries: &[EnrichmentQuery],
    ) -> Result<Vec<(String, Option<EnrichmentRecord>)>>;
}
