//! Virtual path normalization.
//!
//! Every path-accepting API funnels through [`normalize_dir`] or
//! [`normalize_file`]. The virtual separator is `/`; `\` is accepted and
//! converted. Directory paths come back as `/a/b/`, file paths as `/a/b.txt`.
//! Comparisons elsewhere in the crate use [`key`], which folds case.

use crate::error::{VfsError, VfsResult};

/// The virtual path separator.
pub const SEPARATOR: char = '/';

/// The root directory path.
pub const ROOT: &str = "/";

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Returns true if `segment` may be used as a directory or file name.
pub fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment
            .chars()
            .any(|c| c.is_control() || ILLEGAL_CHARS.contains(&c))
}

fn segments_of(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// Normalize a directory path: `characters\hero` becomes `/characters/hero/`.
///
/// An empty path is the root.
pub fn normalize_dir(path: &str) -> VfsResult<String> {
    let replaced = path.replace('\\', "/");
    let segments = segments_of(&replaced);
    if let Some(bad) = segments.iter().find(|s| !valid_segment(s)) {
        return Err(VfsError::path_invalid(format!("{path} (segment {bad:?})")));
    }

    let mut normalized = String::with_capacity(replaced.len() + 2);
    normalized.push(SEPARATOR);
    for segment in segments {
        normalized.push_str(segment);
        normalized.push(SEPARATOR);
    }
    Ok(normalized)
}

/// Normalize a file path: `data//hero.png` becomes `/data/hero.png`.
///
/// Empty paths and paths ending with a separator name no file.
pub fn normalize_file(path: &str) -> VfsResult<String> {
    let replaced = path.replace('\\', "/");
    if replaced.trim().is_empty() || replaced.ends_with(SEPARATOR) {
        return Err(VfsError::filename_invalid(path));
    }

    let segments = segments_of(&replaced);
    if segments.iter().any(|s| !valid_segment(s)) {
        return Err(VfsError::filename_invalid(path));
    }

    let mut normalized = String::with_capacity(replaced.len() + 1);
    for segment in segments {
        normalized.push(SEPARATOR);
        normalized.push_str(segment);
    }
    Ok(normalized)
}

/// Split a normalized file path into its directory (`/a/`) and file name (`b.txt`).
pub fn split_file(full_file: &str) -> (&str, &str) {
    match full_file.rfind(SEPARATOR) {
        Some(idx) => (&full_file[..=idx], &full_file[idx + 1..]),
        None => (ROOT, full_file),
    }
}

/// Split a file name at its last dot into base name and extension.
///
/// The extension keeps its leading dot. A name that starts with its only
/// dot (`.hidden`) has no extension.
pub fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx..]),
        _ => (file_name, ""),
    }
}

/// The segments of a normalized directory path, root first.
pub fn dir_segments(dir: &str) -> impl Iterator<Item = &str> {
    dir.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Case-folded lookup key for names and paths.
pub fn key(name: &str) -> String {
    name.to_lowercase()
}

/// Case-insensitive prefix test on normalized paths.
pub fn starts_with(path: &str, prefix: &str) -> bool {
    key(path).starts_with(&key(prefix))
}

/// Case-insensitive equality on normalized paths.
pub fn same(a: &str, b: &str) -> bool {
    a == b || key(a) == key(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dir() {
        assert_eq!(normalize_dir("").unwrap(), "/");
        assert_eq!(normalize_dir("/").unwrap(), "/");
        assert_eq!(normalize_dir("characters").unwrap(), "/characters/");
        assert_eq!(normalize_dir("characters\\hero").unwrap(), "/characters/hero/");
        assert_eq!(normalize_dir("//characters//hero//").unwrap(), "/characters/hero/");
    }

    #[test]
    fn test_normalize_dir_rejects_illegal() {
        assert!(matches!(normalize_dir("/a/b?c/"), Err(VfsError::PathInvalid(_))));
        assert!(matches!(normalize_dir("/a/../b"), Err(VfsError::PathInvalid(_))));
        assert!(matches!(normalize_dir("/a/\u{7}/"), Err(VfsError::PathInvalid(_))));
    }

    #[test]
    fn test_normalize_file() {
        assert_eq!(normalize_file("hero.png").unwrap(), "/hero.png");
        assert_eq!(normalize_file("data\\\\sprites/hero.png").unwrap(), "/data/sprites/hero.png");
        assert!(matches!(normalize_file(""), Err(VfsError::FilenameInvalid(_))));
        assert!(matches!(normalize_file("/data/"), Err(VfsError::FilenameInvalid(_))));
        assert!(matches!(normalize_file("/data/a|b.txt"), Err(VfsError::FilenameInvalid(_))));
    }

    #[test]
    fn test_split_file() {
        assert_eq!(split_file("/a/b/c.txt"), ("/a/b/", "c.txt"));
        assert_eq!(split_file("/c.txt"), ("/", "c.txt"));
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("hero.png"), ("hero", ".png"));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_name("README"), ("README", ""));
        assert_eq!(split_name(".hidden"), (".hidden", ""));
    }

    #[test]
    fn test_case_folding() {
        assert!(same("/Foo/Bar/", "/foo/bar/"));
        assert!(starts_with("/Characters/Enemies/", "/characters/"));
        assert!(!starts_with("/char/", "/characters/"));
    }
}
