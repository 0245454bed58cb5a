//! Bounded-concurrency retrieval of external documents.
//!
//! This crate provides:
//! - [`Fetcher`]: the fetch capability, with [`HttpFetcher`] (baseline) and
//!   [`AcceleratedFetcher`] implementations chosen at construction time
//! - [`extract`]: reduction of an HTML document to its primary text span
//! - [`FetcherPool`]: samples locators and fetches them under a worker cap

pub mod extract;
pub mod fetcher;
pub mod pool;

pub use extract::extract_primary_text;
pub use fetcher::{AcceleratedFetcher, Fetcher, HttpFetcher, build_fetcher};
pub use pool::{FetcherPool, parse_locators, sample_size};
