//! Small filesystem helpers shared by the post-processor.

use std::path::Path;
use std::time::Duration;

use regex_lite::Regex;

/// Remove characters that are invalid in file paths, plus trailing spaces
/// and periods.
pub fn sanitize_filename(name: &str) -> String {
    let invalid = Regex::new(r#"[<>:"/\\|?*]"#).expect("static pattern");
    let sanitized = invalid.replace_all(name, "");
    sanitized.trim_end_matches([' ', '.']).to_string()
}

/// Wait for a file to appear, polling every 500 ms up to `timeout`.
///
/// Download clients may report completion before the files are flushed to
/// their final location; this bridges that gap.
pub async fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if path.exists() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
    }
}
