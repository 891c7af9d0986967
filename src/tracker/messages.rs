//! User-facing status and error text

use std::time::Duration;

pub const SHORT_VIDEO_MESSAGE: &str =
    "Video is too short or not a presentation. Please upload a video longer than 10 seconds.";

pub const DEFAULT_FAILURE_MESSAGE: &str = "Analysis failed. Please try again.";

pub const STARTING_MESSAGE: &str = "Starting analysis...";

pub const RESUMED_MESSAGE: &str = "Analysis in progress...";

pub const COMPLETED_MESSAGE: &str = "Analysis completed successfully!";

pub const WARNING_MESSAGE: &str = "Analysis completed with some warnings.";

const FAILURE_PREFIX: &str = "Analysis failed:";

const SHORT_CLIP_HINTS: [&str; 3] = ["too short", "minimum presentation length", "video is too short"];

/// Whether backend error text describes a clip below the minimum duration
pub fn is_short_clip(text: &str) -> bool {
    let lower = text.to_lowercase();
    SHORT_CLIP_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Normalize backend error text for display.
///
/// Strips the pipeline's "Analysis failed:" prefix and replaces short-clip
/// rejections with [`SHORT_VIDEO_MESSAGE`].
pub fn normalize_error(raw: Option<&str>) -> String {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return DEFAULT_FAILURE_MESSAGE.to_string();
    };

    let stripped = raw.replacen(FAILURE_PREFIX, "", 1);
    let stripped = stripped.trim();

    if is_short_clip(stripped) {
        return SHORT_VIDEO_MESSAGE.to_string();
    }

    if stripped.is_empty() {
        DEFAULT_FAILURE_MESSAGE.to_string()
    } else {
        stripped.to_string()
    }
}

pub fn timeout_message(limit: Duration) -> String {
    format!(
        "Analysis timed out after {} minutes without a result. Please try again later.",
        (limit.as_secs() + 59) / 60
    )
}
