//! Output classification for dry-run and real-run modes.
//!
//! Dry-run: keep lines mentioning "would remove"; the count is the number
//! of kept lines.
//!
//! Real-run: count lines reporting an actual removal ("removed", but not a
//! "would remove" line). The kept text also carries the "would remove" lines
//! after the removals, for diagnostics, without counting them.

use serde::{Deserialize, Serialize};

const WOULD_REMOVE: &str = "would remove";
const REMOVED: &str = "removed";

/// Filtered view of one run's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedOutput {
    /// Kept lines, in output order within each group.
    pub lines: Vec<String>,
    /// Resources counted for the envelope's `ResourcesToDelete`.
    pub resource_count: usize,
}

impl ClassifiedOutput {
    /// Kept lines joined with `\n`.
    pub fn filtered_text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn is_hypothetical(lowered: &str) -> bool {
    lowered.contains(WOULD_REMOVE)
}

fn is_removal(lowered: &str) -> bool {
    lowered.contains(REMOVED) && !lowered.contains(WOULD_REMOVE)
}

/// Classify combined output. Pure function of its inputs.
pub fn classify(combined: &str, dry_run: bool) -> ClassifiedOutput {
    let mut hypothetical = Vec::new();
    let mut removed = Vec::new();

    for line in combined.lines() {
        let lowered = line.to_lowercase();
        if is_hypothetical(&lowered) {
            hypothetical.push(line.to_string());
        } else if is_removal(&lowered) {
            removed.push(line.to_string());
        }
    }

    if dry_run {
        let resource_count = hypothetical.len();
        ClassifiedOutput {
            lines: hypothetical,
            resource_count,
        }
    } else {
        let resource_count = removed.len();
        removed.extend(hypothetical);
        ClassifiedOutput {
            lines: removed,
            resource_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dry_run_output(k: usize, noise: usize) -> String {
        let mut out = String::new();
        for i in 0..noise {
            out.push_str(&format!("us-east-1 - EC2Instance - i-{i:04} - filtered by config\n"));
        }
        for i in 0..k {
            let verb = if i % 2 == 0 { "would remove" } else { "Would Remove" };
            out.push_str(&format!("us-east-1 - S3Bucket - bucket-{i} - {verb}\n"));
        }
        out
    }

    #[test]
    fn test_dry_run_count_equals_would_remove_lines() {
        for k in 0..12 {
            for noise in [0, 1, 7] {
                let classified = classify(&dry_run_output(k, noise), true);
                assert_eq!(classified.resource_count, k, "k={k} noise={noise}");
                assert_eq!(classified.lines.len(), k);
            }
        }
    }

    #[test]
    fn test_dry_run_keeps_only_hypothetical_lines() {
        let out = "a - removed\nb - would remove\nc - skipped\n";
        let classified = classify(out, true);
        assert_eq!(classified.lines, vec!["b - would remove"]);
        assert_eq!(classified.filtered_text(), "b - would remove");
    }

    #[test]
    fn test_real_run_counts_only_actual_removals() {
        let out = "\
us-east-1 - S3Bucket - a - removed
us-east-1 - IAMRole - r - would remove
us-east-1 - S3Bucket - b - REMOVED
us-east-1 - VPC - v - waiting
us-east-1 - Subnet - s - would remove
";
        let classified = classify(out, false);
        assert_eq!(classified.resource_count, 2);
        assert_eq!(
            classified.lines,
            vec![
                "us-east-1 - S3Bucket - a - removed",
                "us-east-1 - S3Bucket - b - REMOVED",
                "us-east-1 - IAMRole - r - would remove",
                "us-east-1 - Subnet - s - would remove",
            ]
        );
    }

    #[test]
    fn test_real_run_line_with_both_phrases_is_not_counted() {
        let classified = classify("x - would remove (previously removed)\n", false);
        assert_eq!(classified.resource_count, 0);
        assert_eq!(classified.lines.len(), 1);
    }

    #[test]
    fn test_empty_output() {
        for dry_run in [true, false] {
            let classified = classify("", dry_run);
            assert!(classified.is_empty());
            assert_eq!(classified.resource_count, 0);
            assert_eq!(classified.filtered_text(), "");
        }
    }

    #[test]
    fn test_classification_is_deterministic() {
        let out = dry_run_output(3, 4);
        assert_eq!(classify(&out, true), classify(&out, true));
        assert_eq!(classify(&out, false), classify(&out, false));
    }
}
