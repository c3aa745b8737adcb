//! In-place console meter for transfers.

use std::sync::Arc;

use tgrab_core::provider::ProgressFn;

/// Rewrites one stderr line per chunk. With concurrent downloads the lines
/// interleave; the meter is a convenience, not a ledger.
pub fn console_progress() -> ProgressFn {
    Arc::new(|so_far, total| match total {
        Some(total) if total > 0 => {
            let pct = (so_far as f64 / total as f64 * 100.0).min(100.0);
            eprint!("\r  {so_far} / {total} bytes ({pct:.1}%)   ");
        }
        _ => {
            eprint!("\r  {so_far} bytes   ");
        }
    })
}
