//! Dedicated filter decision log.
//!
//! Append-only file at `{data_path}/filter.log`. The size cap is enforced on
//! open: an oversized file is truncated instead of rotated.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use tracing::info;

const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

pub struct FilterLog {
    file: Mutex<File>,
}

impl FilterLog {
    pub fn open(data_path: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(data_path)?;
        let log_path = data_path.join("filter.log");

        let truncate = match std::fs::metadata(&log_path) {
            Ok(meta) => meta.len() > MAX_LOG_SIZE,
            Err(_) => false,
        };
        if truncate {
            info!(path = %log_path.display(), "Truncating oversized filter.log");
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(!truncate)
            .truncate(truncate)
            .open(&log_path)?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn write_line(&self, line: &str) {
        let stamp = Local::now().format("%Y/%m/%d %H:%M:%S");
        let mut file = self.file.lock().unwrap();
        // Log write failures are not worth surfacing to the caller.
        let _ = writeln!(file, "{} {}", stamp, line);
    }

    pub fn session_started(&self) {
        self.write_line("--- New Filter Session Started ---");
    }

    pub fn filtering(&self, query: &str) {
        self.write_line(&format!("--- Filtering for: {} ---", query));
    }

    pub fn reject(&self, reason: &str, title: &str) {
        self.write_line(&format!("REJECT: [{}] | {}", reason, title));
    }

    pub fn pass(&self, score: i64, title: &str) {
        self.write_line(&format!("PASS: [Score: {}] {}", score, title));
    }
}
