//! Object name helpers shared by the staging and archive stages
//!
//! Object stores have no directories, only names containing `/`. These helpers
//! keep the prefix/basename rules in one place so a staged name and its archived
//! counterpart are always derived the same way.

/// Separator used inside object names
pub const SEPARATOR: char = '/';

/// Last path segment of an object name (`reports/cost-csv/a.csv.gz` -> `a.csv.gz`).
pub fn basename(name: &str) -> &str {
    name.rsplit(SEPARATOR).next().unwrap_or(name)
}

/// Join a folder prefix and a file name into an object name.
///
/// Leading and trailing separators on the prefix are ignored; an empty prefix
/// yields the bare name.
pub fn join(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches(SEPARATOR);
    let name = name.trim_start_matches(SEPARATOR);
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", prefix, SEPARATOR, name)
    }
}

/// Normalised listing prefix for a folder (`staging` -> `staging/`).
pub fn folder(prefix: &str) -> String {
    let prefix = prefix.trim_matches(SEPARATOR);
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}{}", prefix, SEPARATOR)
    }
}

/// Pseudo-folder markers are zero-byte entries whose name ends in `/`.
pub fn is_folder_marker(name: &str, size: u64) -> bool {
    size == 0 && name.ends_with(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename() {
        assert_eq!(basename("reports/cost-csv/0001.csv.gz"), "0001.csv.gz");
        assert_eq!(basename("plain.csv"), "plain.csv");
        assert_eq!(basename("staging/"), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("staging", "a.csv"), "staging/a.csv");
        assert_eq!(join("staging/", "a.csv"), "staging/a.csv");
        assert_eq!(join("/archive/2024/", "/a.csv"), "archive/2024/a.csv");
        assert_eq!(join("", "a.csv"), "a.csv");
    }

    #[test]
    fn test_folder() {
        assert_eq!(folder("staging"), "staging/");
        assert_eq!(folder("staging/"), "staging/");
        assert_eq!(folder(""), "");
    }

    #[test]
    fn test_is_folder_marker() {
        assert!(is_folder_marker("staging/", 0));
        assert!(!is_folder_marker("staging/a.csv", 0));
        assert!(!is_folder_marker("staging/", 12));
    }
}
