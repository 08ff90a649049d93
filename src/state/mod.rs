//! State module for tracking download progress
//!
//! # Components
//!
//! - `UrlStateTable`: deduplicating table of URLs that are queued or in flight
//! - `UrlState`: where a tracked URL currently is
//! - `ModuleState`: lifecycle state of the download manager

mod module_state;
mod url_table;

// Re-export main types
pub use module_state::ModuleState;
pub use url_table::{UrlState, UrlStateTable};
