//! Per-document fact caches
//!
//! Each content document has at most one cache file next to it. The cache is
//! the only durable record of last-known values between syncs.

pub mod builder;
pub mod path;
pub mod store;

pub use builder::{build_cache, build_from_facts, BuildOptions};
pub use path::{cache_path_for, is_cache_artifact, CACHE_EXTENSION, CACHE_PREFIX, TABLE_CACHE_PREFIX};
pub use store::{load_cache, load_json, remove_file, render_json, save_cache, save_json};
