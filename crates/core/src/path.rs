//! Materialized path helpers.
//!
//! Ledger paths always start with `/`. A trailing `/` marks a folder, and a
//! folder path matches its whole subtree; any other path matches exactly.

/// Normalize a path so it starts with `/`.
pub fn normalize(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Whether the path names a folder.
pub fn is_folder(path: &str) -> bool {
    path.ends_with('/')
}

/// Whether `candidate` is matched by `pattern`.
pub fn matches(candidate: &str, pattern: &str) -> bool {
    if is_folder(pattern) {
        candidate.starts_with(pattern)
    } else {
        candidate == pattern
    }
}

/// Rewrite `candidate` from under `src` to under `dest`.
///
/// Returns `None` when `src` does not match `candidate`.
pub fn rebase(candidate: &str, src: &str, dest: &str) -> Option<String> {
    if !matches(candidate, src) {
        return None;
    }
    if is_folder(src) {
        let rest = &candidate[src.len()..];
        let base = if is_folder(dest) {
            dest.to_string()
        } else {
            format!("{dest}/")
        };
        Some(format!("{base}{rest}"))
    } else {
        Some(dest.to_string())
    }
}

/// Last path component, without the trailing slash of a folder.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Parent folder path (with trailing slash), or `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let idx = trimmed.rfind('/')?;
    Some(trimmed[..=idx].to_string())
}

/// Every ancestor folder of `path`, outermost first, excluding the root.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while let Some(folder) = current {
        if folder == "/" {
            break;
        }
        current = parent(&folder);
        out.push(folder);
    }
    out.reverse();
    out
}

/// Path of `child` relative to the folder `root`, normalized.
///
/// Returns `None` when `child` does not live under `root`.
pub fn relative_to(child: &str, root: &str) -> Option<String> {
    let root = normalize(root);
    let root = if is_folder(&root) {
        root
    } else {
        format!("{root}/")
    };
    let child = normalize(child);
    child.strip_prefix(&root).map(normalize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/b.txt"), "/a/b.txt");
        assert_eq!(normalize("/a/b.txt"), "/a/b.txt");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn test_folder_matches_subtree() {
        assert!(matches("/a/b.txt", "/a/"));
        assert!(matches("/a/c/d.txt", "/a/"));
        assert!(!matches("/ab/c.txt", "/a/"));
        assert!(matches("/a/", "/a/"));
    }

    #[test]
    fn test_file_matches_exactly() {
        assert!(matches("/a/b.txt", "/a/b.txt"));
        assert!(!matches("/a/b.txt.bak", "/a/b.txt"));
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase("/a/c/d.txt", "/a/", "/x/").as_deref(), Some("/x/c/d.txt"));
        assert_eq!(rebase("/a/b.txt", "/a/b.txt", "/z.txt").as_deref(), Some("/z.txt"));
        assert_eq!(rebase("/q/b.txt", "/a/", "/x/"), None);
    }

    #[test]
    fn test_parent_and_ancestors() {
        assert_eq!(parent("/a/b/c.txt").as_deref(), Some("/a/b/"));
        assert_eq!(parent("/a/b/").as_deref(), Some("/a/"));
        assert_eq!(parent("/c.txt").as_deref(), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(ancestors("/a/b/c.txt"), vec!["/a/".to_string(), "/a/b/".to_string()]);
        assert!(ancestors("/c.txt").is_empty());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/a/b.txt"), "b.txt");
        assert_eq!(file_name("/a/b/"), "b");
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(
            relative_to("/Projects/lab/data/x.csv", "/Projects/lab").as_deref(),
            Some("/data/x.csv")
        );
        assert_eq!(relative_to("/Other/x.csv", "/Projects/lab/"), None);
        assert_eq!(relative_to("/x.csv", "/").as_deref(), Some("/x.csv"));
    }
}
