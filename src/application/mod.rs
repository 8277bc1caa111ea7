//! Application services built on the cache.

pub mod error;
pub mod og_image;
