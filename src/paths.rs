//! Output directory handling and capture file naming.
//!
//! Capture files are named `radar_<timestamp>.png` with a zero-padded UTC
//! timestamp, so lexicographic order over file names equals chronological
//! order. "Latest capture" is simply the maximum name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};

pub const CAPTURE_PREFIX: &str = "radar_";
pub const CAPTURE_EXT: &str = ".png";

/// Sortable timestamp used in file names, e.g. `2026-08-04T17-03-21`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Builds the capture file name for a given instant.
pub fn capture_file_name(instant: DateTime<Utc>) -> String {
    format!(
        "{CAPTURE_PREFIX}{}{CAPTURE_EXT}",
        instant.format(TIMESTAMP_FORMAT)
    )
}

/// Creates the captures directory if it does not exist yet.
pub fn ensure_captures_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

fn is_capture_name(name: &str) -> bool {
    name.starts_with(CAPTURE_PREFIX) && name.ends_with(CAPTURE_EXT)
}

/// A capture file found on disk.
#[derive(Debug, Clone)]
pub struct CaptureFile {
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
}

fn list_captures(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read captures directory {}", dir.display()))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_capture_name(name))
        .collect();
    names.sort();
    Ok(names)
}

/// Returns the most recent capture in `dir`.
///
/// Valid because the timestamp format is zero-padded: the maximum by string
/// order is the maximum by time.
pub fn find_latest_capture(dir: &Path) -> Result<CaptureFile> {
    let names = list_captures(dir)?;
    let file_name = names
        .into_iter()
        .next_back()
        .ok_or_else(|| anyhow!("no captures found in {}", dir.display()))?;

    let path = dir.join(&file_name);
    let size = fs::metadata(&path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();

    Ok(CaptureFile { file_name, path, size })
}

/// Deletes all but the newest `keep` captures. Returns how many were removed.
pub fn clean_old_captures(dir: &Path, keep: usize) -> Result<usize> {
    let names = list_captures(dir)?;
    if names.len() <= keep {
        return Ok(0);
    }

    let stale = &names[..names.len() - keep];
    let mut removed = 0;
    for name in stale {
        let path = dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => tracing::warn!("could not remove {}: {err}", path.display()),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_capture_file_name_format() {
        let instant = Utc.with_ymd_and_hms(2026, 8, 4, 9, 5, 3).unwrap();
        assert_eq!(capture_file_name(instant), "radar_2026-08-04T09-05-03.png");
    }

    #[test]
    fn test_file_names_sort_chronologically() {
        // Zero padding makes string order equal time order across day,
        // month, and hour boundaries.
        let instants = [
            Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap(),
        ];

        let names: Vec<String> = instants.iter().map(|i| capture_file_name(*i)).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_find_latest_capture() {
        let dir = tempdir().unwrap();
        for name in [
            "radar_2026-08-01T10-00-00.png",
            "radar_2026-08-03T08-30-00.png",
            "radar_2026-08-02T23-59-59.png",
            "notes.txt",
            "other_2026-09-01T00-00-00.png",
        ] {
            fs::write(dir.path().join(name), b"data").unwrap();
        }

        let latest = find_latest_capture(dir.path()).unwrap();
        assert_eq!(latest.file_name, "radar_2026-08-03T08-30-00.png");
        assert_eq!(latest.size, 4);
    }

    #[test]
    fn test_find_latest_capture_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(find_latest_capture(dir.path()).is_err());
    }

    #[test]
    fn test_clean_old_captures() {
        let dir = tempdir().unwrap();
        for hour in 0..5 {
            let name = format!("radar_2026-08-04T{hour:02}-00-00.png");
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let removed = clean_old_captures(dir.path(), 2).unwrap();
        assert_eq!(removed, 3);

        let remaining = list_captures(dir.path()).unwrap();
        assert_eq!(
            remaining,
            vec![
                "radar_2026-08-04T03-00-00.png",
                "radar_2026-08-04T04-00-00.png"
            ]
        );
    }

    #[test]
    fn test_clean_old_captures_under_limit() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("radar_2026-08-04T00-00-00.png"), b"x").unwrap();
        assert_eq!(clean_old_captures(dir.path(), 5).unwrap(), 0);
    }
}
