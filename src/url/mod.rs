//! URL handling module for Reel-Queue
//!
//! This module provides URL normalization (the queue's identity for an entry)
//! and derivation of on-disk file names from URLs.

mod file_name;
mod normalize;

// Re-export main functions
pub use file_name::file_name_for;
pub use normalize::normalize_url;
