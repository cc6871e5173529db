//! Discovery: crawling another service's object tree into a
//! [`DiscoveryIndex`].

/// Tree and managed-object walks.
pub mod crawler;
/// Interface predicates.
pub mod filter;
/// Crawl results.
pub mod index;

pub use crawler::{CrawlOutcome, CrawlStats, CrawlStrategy, Crawler};
pub use filter::InterfaceFilter;
pub use index::DiscoveryIndex;
