//! Name resolution from scraped issuer names to the canonical company
//! catalog: token-frequency rarity weighting plus a substring-aware
//! fuzzy score.

pub mod freq;
pub mod resolver;

pub use freq::{tokenize, TokenFrequencyIndex};
pub use resolver::EntityResolver;
