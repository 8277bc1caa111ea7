//! Fingerprint-keyed TTL cache for generated Open Graph images.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
