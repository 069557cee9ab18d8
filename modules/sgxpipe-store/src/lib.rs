//! Persistence seam and write-side policy for filings, the crawl queue
//! and the canonical company catalog.

pub mod ingest;
pub mod memory;
pub mod traits;

pub use ingest::{IngestStats, IngestionStore};
pub use memory::MemoryStore;
pub use traits::{DisclosureStore, StoreError};
