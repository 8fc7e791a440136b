//! Subfolder selection for enumeration scopes.
//!
//! Both enumeration backends accept an optional allow-list of subfolder
//! names under the scope root. For object storage the rules are applied to
//! object names directly:
//!
//! - no allow-list: keep everything under the base path,
//! - allow-list: keep objects whose relative name starts with
//!   `<subfolder>/`, plus root-level objects (no `/` in the relative name)
//!   when `include_root` is set.

/// Extension recognized as delimited text.
pub const DELIMITED_TEXT_EXTENSION: &str = ".csv";

/// Which part of a scope to enumerate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubfolderSelection {
    /// Allow-listed subfolder names; `None` means the whole scope.
    pub subfolders: Option<Vec<String>>,
    /// Also take files sitting directly in the scope root. Only meaningful
    /// together with an allow-list.
    pub include_root: bool,
}

impl SubfolderSelection {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn only(subfolders: Vec<String>, include_root: bool) -> Self {
        Self {
            subfolders: Some(subfolders),
            include_root,
        }
    }

    /// Allow-list entries with surrounding separators removed.
    pub fn normalized_subfolders(&self) -> Option<Vec<String>> {
        self.subfolders.as_ref().map(|subs| {
            subs.iter()
                .map(|s| s.trim_matches(|c| c == '/' || c == '\\').to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    /// Decide whether an object at `relative` (relative to the base path)
    /// is in scope.
    pub fn keeps(&self, relative: &str) -> bool {
        let Some(subfolders) = self.normalized_subfolders() else {
            return true;
        };
        if self.include_root && !relative.contains('/') {
            return true;
        }
        subfolders
            .iter()
            .any(|sub| relative.starts_with(&format!("{}/", sub)))
    }
}

/// Normalize a base path to either `""` or `"some/path/"`.
pub fn normalize_base_path(base: &str) -> String {
    let trimmed = base.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// `name` relative to a normalized base path, or `None` if outside it.
pub fn relative_to<'a>(base: &str, name: &'a str) -> Option<&'a str> {
    name.strip_prefix(base)
}

/// Case-insensitive check for the delimited-text extension.
pub fn is_delimited_text(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(DELIMITED_TEXT_EXTENSION)
}
