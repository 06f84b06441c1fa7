//! ConflictDetector: three-way classification of one shared file.
//!
//! Inputs are the base (last content both sides agreed on), the local working
//! copy and the freshly fetched remote copy. `None` means the file is absent
//! on that side. Content is compared by version token, so line-ending-only
//! differences never count as edits.
//!
//! | base vs local | base vs remote | local vs remote | outcome                |
//! |---------------|----------------|-----------------|------------------------|
//! | same          | same           | -               | `Unchanged`            |
//! | differs       | same           | -               | `FastForwardLocal`     |
//! | same          | differs        | -               | `FastForwardPull`      |
//! | differs       | differs        | same            | `Unchanged`            |
//! | differs       | differs        | differs         | `Conflicting` or `DeleteModifyConflict` |

use std::collections::{BTreeMap, BTreeSet};

use teamsync_core::types::Side;

use crate::workspace::version_token;

/// Result of comparing one file's three versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    /// Only the local side changed: push.
    FastForwardLocal,
    /// Only the remote side changed: adopt remote.
    FastForwardPull,
    /// Both sides edited the text differently.
    Conflicting,
    /// One side deleted the file, the other modified it.
    DeleteModifyConflict { deleted: Side },
}

impl Outcome {
    pub fn is_conflict(self) -> bool {
        matches!(
            self,
            Outcome::Conflicting | Outcome::DeleteModifyConflict { .. }
        )
    }
}

/// Classify a single file. `path` is only used for tracing.
pub fn classify(
    path: &str,
    base: Option<&str>,
    local: Option<&str>,
    remote: Option<&str>,
) -> Outcome {
    let base_tok = base.map(version_token);
    let local_tok = local.map(version_token);
    let remote_tok = remote.map(version_token);

    let outcome = if local_tok == remote_tok {
        Outcome::Unchanged
    } else if local_tok == base_tok {
        Outcome::FastForwardPull
    } else if remote_tok == base_tok {
        Outcome::FastForwardLocal
    } else {
        match (local, remote) {
            (None, Some(_)) => Outcome::DeleteModifyConflict {
                deleted: Side::Local,
            },
            (Some(_), None) => Outcome::DeleteModifyConflict {
                deleted: Side::Remote,
            },
            _ => Outcome::Conflicting,
        }
    };
    tracing::trace!(path, ?outcome, "classified shared file");
    outcome
}

/// Classify every path present in any of the three maps, in lexicographic
/// path order.
pub fn classify_all(
    base: &BTreeMap<String, String>,
    local: &BTreeMap<String, String>,
    remote: &BTreeMap<String, String>,
) -> Vec<(String, Outcome)> {
    let paths: BTreeSet<&String> = base.keys().chain(local.keys()).chain(remote.keys()).collect();
    paths
        .into_iter()
        .map(|path| {
            let outcome = classify(
                path,
                base.get(path).map(String::as_str),
                local.get(path).map(String::as_str),
                remote.get(path).map(String::as_str),
            );
            (path.clone(), outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("b"), Some("b"), Some("b"), Outcome::Unchanged)]
    #[case(Some("b"), Some("l"), Some("b"), Outcome::FastForwardLocal)]
    #[case(Some("b"), Some("b"), Some("r"), Outcome::FastForwardPull)]
    #[case(Some("b"), Some("x"), Some("x"), Outcome::Unchanged)]
    #[case(Some("b"), Some("l"), Some("r"), Outcome::Conflicting)]
    #[case(Some("b"), None, Some("r"), Outcome::DeleteModifyConflict { deleted: Side::Local })]
    #[case(Some("b"), Some("l"), None, Outcome::DeleteModifyConflict { deleted: Side::Remote })]
    #[case(Some("b"), None, Some("b"), Outcome::FastForwardLocal)]
    #[case(Some("b"), Some("b"), None, Outcome::FastForwardPull)]
    #[case(Some("b"), None, None, Outcome::Unchanged)]
    #[case(None, Some("n"), None, Outcome::FastForwardLocal)]
    #[case(None, None, Some("n"), Outcome::FastForwardPull)]
    #[case(None, Some("n"), Some("n"), Outcome::Unchanged)]
    #[case(None, Some("a"), Some("b"), Outcome::Conflicting)]
    fn classification_table(
        #[case] base: Option<&str>,
        #[case] local: Option<&str>,
        #[case] remote: Option<&str>,
        #[case] expected: Outcome,
    ) {
        assert_eq!(classify("f.md", base, local, remote), expected);
    }

    #[test]
    fn identical_sides_never_conflict() {
        let samples = [None, Some(""), Some("a"), Some("b\n"), Some("b\r\n")];
        for base in samples {
            for side in samples {
                let outcome = classify("f.md", base, side, side);
                assert!(!outcome.is_conflict(), "base={base:?} side={side:?}");
            }
        }
    }

    #[test]
    fn crlf_only_edit_is_not_a_change() {
        assert_eq!(
            classify("f.md", Some("a\nb\n"), Some("a\r\nb\r\n"), Some("a\nb\n")),
            Outcome::Unchanged
        );
    }

    #[test]
    fn classify_all_is_sorted_and_covers_union() {
        let mut base = BTreeMap::new();
        base.insert("z.md".to_string(), "1".to_string());
        let mut local = BTreeMap::new();
        local.insert("a.md".to_string(), "new".to_string());
        local.insert("z.md".to_string(), "1".to_string());
        let mut remote = BTreeMap::new();
        remote.insert("m.md".to_string(), "r".to_string());
        remote.insert("z.md".to_string(), "1".to_string());

        let result = classify_all(&base, &local, &remote);
        let paths: Vec<_> = result.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "m.md", "z.md"]);
        assert_eq!(result[0].1, Outcome::FastForwardLocal);
        assert_eq!(result[1].1, Outcome::FastForwardPull);
        assert_eq!(result[2].1, Outcome::Unchanged);
    }
}
