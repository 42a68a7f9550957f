use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Root under which each run keeps its retrieved log tree and, transiently,
/// the downloaded archive.
pub fn artifacts_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("vcsched")
        .join("runs")
}

/// Per-run directory label: timestamp plus host address, with characters
/// that are unsafe in file names stripped.
pub fn run_label(created_at: DateTime<Utc>, machine: &str) -> String {
    let raw = format!("{}_{}", created_at.format("%Y%m%d-%H%M%S"), machine);
    sanitize_label(&raw)
}

/// Strip forbidden filesystem characters, keeping the label readable.
pub fn sanitize_label(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn label_strips_forbidden_characters() {
        let at = Utc.with_ymd_and_hms(2026, 8, 7, 12, 30, 0).unwrap();
        let label = run_label(at, "10.0.0.5:2222");
        assert_eq!(label, "20260807-123000_10.0.0.5-2222");
        assert!(!label.contains(':'));
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize_label("a/b\\c d"), "a-b-c-d");
    }
}
