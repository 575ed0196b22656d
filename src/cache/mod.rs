//! Cache Module
//!
//! Bounded object caching and a caching `Index` wrapper.
//!
//! ## Lock order
//! `CachedIndex` takes its cache lock first and the backend's locks second,
//! so stacked wrappers (cache over buffer over table) never invert the
//! order.

mod cached;
mod object;

pub use cached::{CacheStats, CachedIndex};
pub use object::ObjectCache;
