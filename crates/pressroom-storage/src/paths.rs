use std::path::{Component, Path, PathBuf};

/// Resolves a site uri to a filesystem path under `root`, or `None` when the
/// uri is blank, all separators, or would land outside `root`.
///
/// Uris are untrusted client input; this is the sole barrier keeping a
/// transaction inside its own sandbox.
pub fn resolve_uri(root: &Path, uri: &str) -> Option<PathBuf> {
    if uri.trim().is_empty() || uri.chars().all(|ch| ch == '/') {
        return None;
    }
    let relative = uri.trim_start_matches('/');
    let candidate = root.join(relative);
    if is_contained(root, &candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// Walks the normalized ancestor chain of `path`; the path is contained when
/// any existing ancestor canonicalizes to the same file as `root`. Tolerates
/// paths that do not exist yet. The root itself must exist.
pub fn is_contained(root: &Path, path: &Path) -> bool {
    let Ok(root) = root.canonicalize() else {
        return false;
    };
    let mut current = Some(normalize_lexically(path));
    while let Some(candidate) = current {
        if candidate.exists() {
            if let Ok(resolved) = candidate.canonicalize() {
                if resolved == root {
                    return true;
                }
            }
        }
        current = candidate.parent().map(Path::to_path_buf);
    }
    false
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
