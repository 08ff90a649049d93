//! Output module for reporting download progress

mod stats;

pub use stats::{print_statistics, ActiveFetch, DownloadStatistics, DownloadStats};
