//! Tiered Cache Library
//!
//! In-memory cache holding values in two reclaim tiers, driven by a memory
//! pressure signal that the host application reports.
//!
//! - [`Tier::Eager`] entries are reclaimed by every sweep.
//! - [`Tier::Persistent`] entries are reclaimed only while pressure is at or
//!   above the configured threshold, least recently accessed first, or when
//!   capacity forces one out.
//!
//! # Example
//!
//! ```
//! use tiered_cache::{PressureLevel, Tier, TieredCache, TieredCacheConfig};
//!
//! let config = TieredCacheConfig::new(2).with_threshold(PressureLevel::High);
//! let cache = TieredCache::new(config).unwrap();
//!
//! cache.put("a", 1, Tier::Eager);
//! cache.put("b", 2, Tier::Persistent);
//! cache.put("c", 3, Tier::Persistent); // sweeps "a" to make room
//!
//! assert_eq!(cache.get(&"a"), None);
//! assert_eq!(cache.get(&"b"), Some(2));
//! assert_eq!(cache.size(), 2);
//! ```

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod pressure;
pub mod sweeper;
mod table;

pub use cache::{CacheStats, TieredCache};
pub use config::{ConfigError, TieredCacheConfig};
pub use entry::{AccessStamp, Entry, Tier};
pub use error::{CacheError, CacheResult};
pub use pressure::{BatchFraction, ParsePressureError, PressureLevel, PressureRelief, PressureSignal};
pub use sweeper::{ReclaimSweeper, SweepReport, SweepTrigger};
