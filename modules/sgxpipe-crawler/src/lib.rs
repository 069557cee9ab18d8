//! Crawl-and-ingest pipeline over the announcements platform: catalog
//! sourcing, queue-driven crawling, document processing and ticker
//! linking.

pub mod attachments;
pub mod catalog;
pub mod crawl;
pub mod pipeline;
pub mod processor;
pub mod ticker;
pub mod traits;

pub use crawl::{CrawlLimits, CrawlOrchestrator};
pub use pipeline::{Pipeline, RunStats};
pub use processor::DocumentProcessor;
pub use traits::{ArtifactStorage, FilingFetcher, LocalStorage};
