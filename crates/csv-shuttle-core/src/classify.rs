//! Marker-based file classification.
//!
//! Candidate files are split into two disjoint groups by looking for a
//! marker substring in the file's *basename* only. Directory components
//! never influence membership.

/// Default marker used to pick the "truth" group.
pub const DEFAULT_MARKER: &str = "truth";

/// Substring classifier over basenames.
#[derive(Debug, Clone)]
pub struct Classifier {
    marker: String,
    case_sensitive: bool,
}

/// The two classification groups, each in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Groups<T> {
    /// Files whose basename contains the marker.
    pub matched: Vec<T>,
    /// Everything else.
    pub other: Vec<T>,
}

impl<T> Default for Groups<T> {
    fn default() -> Self {
        Self {
            matched: Vec::new(),
            other: Vec::new(),
        }
    }
}

impl Classifier {
    pub fn new(marker: impl Into<String>, case_sensitive: bool) -> Self {
        Self {
            marker: marker.into(),
            case_sensitive,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// True when `path`'s basename contains the marker.
    pub fn matches(&self, path: &str) -> bool {
        let name = basename(path);
        if self.case_sensitive {
            name.contains(&self.marker)
        } else {
            name.to_lowercase().contains(&self.marker.to_lowercase())
        }
    }

    /// Partition `items` by the basename returned from `path_of`.
    pub fn partition<T, F>(&self, items: Vec<T>, path_of: F) -> Groups<T>
    where
        F: Fn(&T) -> &str,
    {
        let mut groups = Groups::default();
        for item in items {
            if self.matches(path_of(&item)) {
                groups.matched.push(item);
            } else {
                groups.other.push(item);
            }
        }
        groups
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER, false)
    }
}

/// Last path component of a local path or object name.
///
/// Both `/` and `\` count as separators.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_example_case_insensitive() {
        let files = vec!["a_truth.csv", "B.csv", "ground_truth_TEST.csv"];
        let groups = Classifier::default().partition(files, |f| *f);
        assert_eq!(groups.matched, vec!["a_truth.csv", "ground_truth_TEST.csv"]);
        assert_eq!(groups.other, vec!["B.csv"]);
    }

    #[test]
    fn test_case_sensitive_marker() {
        let classifier = Classifier::new("Truth", true);
        assert!(classifier.matches("GroundTruth.csv"));
        assert!(!classifier.matches("ground_truth.csv"));
    }

    #[test]
    fn test_case_insensitive_uppercase_marker() {
        let classifier = Classifier::new("TRUTH", false);
        assert!(classifier.matches("data/Ground_truth.csv"));
    }

    #[test]
    fn test_membership_depends_only_on_basename() {
        let classifier = Classifier::default();
        assert!(!classifier.matches("truth/results.csv"));
        assert!(!classifier.matches("C:\\truth\\results.csv"));
        assert!(classifier.matches("results/truth.csv"));
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let files: Vec<String> = (0..20)
            .map(|i| {
                if i % 3 == 0 {
                    format!("dir_truth/{}_TRUTH.csv", i)
                } else {
                    format!("dir_truth/{}.csv", i)
                }
            })
            .collect();
        let groups = Classifier::default().partition(files.clone(), |f| f.as_str());
        assert_eq!(groups.matched.len() + groups.other.len(), files.len());
        for f in &groups.matched {
            assert!(!groups.other.contains(f));
        }
        assert_eq!(groups.matched.len(), 7);
    }

    #[test]
    fn test_empty_input_yields_empty_groups() {
        let groups = Classifier::default().partition(Vec::<String>::new(), |f| f.as_str());
        assert!(groups.matched.is_empty());
        assert!(groups.other.is_empty());
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("a/b/c.csv"), "c.csv");
        assert_eq!(basename("c.csv"), "c.csv");
        assert_eq!(basename("a\\b.csv"), "b.csv");
    }
}
