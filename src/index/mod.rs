//! Durable JSON index of download outcomes.
//!
//! One index per output root records, for every work item ever seen, whether
//! it is pending, downloaded, or failed. The index drives resume: a run skips
//! items whose recorded file is still present and valid.
//!
//! The file layout is:
//!
//! ```json
//! {
//!   "summary": { "total_found": 2, "total_succeeded": 1, ... },
//!   "records": {
//!     "secondary/class-9::গণিত::1": { "status": "success", "local_path": "...", ... }
//!   }
//! }
//! ```

mod error;
mod record;
mod store;

pub use error::IndexError;
pub use record::{DownloadRecord, DownloadStatus, Index, IndexSummary};
pub use store::IndexStore;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as unix seconds (0 if the clock is before the epoch).
#[must_use]
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
