pub mod coordinator;
pub mod provider;
pub mod store;
pub mod types;

pub use coordinator::{BatchOutcome, EnrichmentCoordinator, EnrichmentOutcome, EnrichmentPolicy};
pub use provider::{EnrichmentProvider, EnrichmentQuery};
pub use store::EnrichmentStore;
pub use types::EnrichmentRecord;
