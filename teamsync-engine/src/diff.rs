//! Unified diffs between the two sides of a conflict, shown by the
//! resolution UI before a strategy is chosen.

use similar::TextDiff;

use teamsync_core::types::ConflictRecord;

/// One side's text for diffing. A deleted side diffs as empty.
fn side_text(content: Option<&str>) -> String {
    content.map(normalize_line_endings).unwrap_or_default()
}

/// `local` → `remote` unified diff for `record`. Empty when the two sides
/// only differ in line endings.
pub fn conflict_diff(record: &ConflictRecord) -> String {
    let local = side_text(record.local_version.content.as_deref());
    let remote = side_text(record.remote_version.content.as_deref());
    if local == remote {
        return String::new();
    }
    let old_header = header("local", record, record.local_version.content.is_none());
    let new_header = header("remote", record, record.remote_version.content.is_none());
    TextDiff::from_lines(&local, &remote)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

fn header(side: &str, record: &ConflictRecord, deleted: bool) -> String {
    if deleted {
        format!("{side}/{} (deleted)", record.file_path)
    } else {
        format!("{side}/{}", record.file_path)
    }
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use teamsync_core::types::{ConflictVersion, OperationId};

    fn version(content: Option<&str>) -> ConflictVersion {
        ConflictVersion {
            content: content.map(str::to_string),
            modified_by: None,
            modified_at: None,
            version: None,
        }
    }

    #[test]
    fn diff_has_side_headers_and_changed_lines() {
        let record = ConflictRecord::open(
            OperationId::from("op"),
            "memory/roadmap.md",
            version(Some("- ship A\n")),
            version(Some("- ship B\n")),
            Utc::now(),
        );
        let diff = conflict_diff(&record);
        assert!(diff.contains("--- local/memory/roadmap.md"));
        assert!(diff.contains("+++ remote/memory/roadmap.md"));
        assert!(diff.contains("-- ship A"));
        assert!(diff.contains("+- ship B"));
    }

    #[test]
    fn deleted_side_is_labelled() {
        let record = ConflictRecord::open(
            OperationId::from("op"),
            "a.md",
            version(None),
            version(Some("kept\n")),
            Utc::now(),
        );
        assert!(conflict_diff(&record).contains("local/a.md (deleted)"));
    }

    #[test]
    fn line_ending_only_difference_is_empty() {
        let record = ConflictRecord::open(
            OperationId::from("op"),
            "a.md",
            version(Some("x\r\n")),
            version(Some("x\n")),
            Utc::now(),
        );
        assert_eq!(conflict_diff(&record), "");
    }
}
