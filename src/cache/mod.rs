//! Versioned response cache for offline use.
//!
//! This module provides the request interception layer that:
//! - Installs a manifest of assets as one named cache generation
//! - Evicts every other generation on activation
//! - Serves navigations network-first with an offline shell fallback
//! - Serves everything else cache-first

mod key;
mod layer;
mod network;
mod storage;
mod traits;

pub use layer::CacheStrategyEngine;
pub use network::HttpFetcher;
pub use storage::SqliteGenerationStorage;
pub use traits::Request;
