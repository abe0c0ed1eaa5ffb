//! Post-transfer integrity spot check.
//!
//! Shells out to the system `md5sum` tool and logs the digest so the two
//! ends of a transfer can be compared by eye or by script. Purely
//! informational: a missing tool or a failed invocation is not an error.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

/// Log the MD5 digest of a file, if the system tool is available.
pub fn report_digest(path: &Path) {
    match digest(path) {
        Some(digest) => info!(file = %path.display(), md5 = %digest, "content digest"),
        None => debug!(file = %path.display(), "md5sum unavailable, skipping digest"),
    }
}

fn digest(path: &Path) -> Option<String> {
    let output = Command::new("md5sum").arg(path).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.split_whitespace().next().map(str::to_owned)
}
