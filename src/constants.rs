//! Application-wide constants.
//!
//! Centralizes magic values that are used across multiple modules.

/// Video file extensions the reconciler treats as candidate episode files.
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "m4v"];

/// Minimum file size the reconciler considers a real episode rather than a
/// trailer, sample, or partial download.
pub const MIN_EPISODE_SIZE_BYTES: u64 = 50 * 1024 * 1024;

/// A file younger than this is assumed still being written to by the
/// torrent client and is skipped until the next reconcile pass.
pub const MIN_FILE_AGE_SEC: u64 = 180;
