//! Application services layer: storage ports and the cache orchestration.

pub mod cache;
pub mod providers;
pub mod singleflight;
pub mod speak;
pub mod stores;
