//! ULIDs for tagging recommendation runs and process instances.
//!
//! Every engine run gets its own ULID so the log line that closes a run can be
//! matched with the response that carried its results. The process ULID ties
//! together all runs of one server instance.

use once_cell::sync::Lazy;
use ulid::Ulid;

static PROCESS_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// ULID of this process, fixed at first access.
#[inline]
pub fn process() -> &'static str {
    &PROCESS_ID
}

/// A fresh ULID for one run.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}
