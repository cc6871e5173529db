//! Object path helpers.
//!
//! Paths are `/`-separated element lists rooted at `/`. Elements are
//! restricted to `[A-Za-z0-9_]` and may not be empty.

use crate::error::RegistryError;

/// The root path.
pub const ROOT: &str = "/";

fn invalid(path: &str, reason: &str) -> RegistryError {
    RegistryError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Validates an object path.
pub fn validate(path: &str) -> Result<(), RegistryError> {
    if !path.starts_with('/') {
        return Err(invalid(path, "must start with '/'"));
    }
    if path == ROOT {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(invalid(path, "trailing '/'"));
    }
    for element in path[1..].split('/') {
        if element.is_empty() {
            return Err(invalid(path, "empty element"));
        }
        if !element.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(path, "element contains characters outside [A-Za-z0-9_]"));
        }
    }
    Ok(())
}

/// Non-empty elements of a path.
pub fn elements(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|e| !e.is_empty())
}

/// Collapses repeated and trailing separators: `"//a//b/"` becomes `"/a/b"`.
#[must_use]
pub fn normalize(path: &str) -> String {
    let joined = elements(path).collect::<Vec<_>>().join("/");
    format!("/{joined}")
}

/// Joins a child name (which may itself contain separators) under `parent`.
#[must_use]
pub fn join(parent: &str, child: &str) -> String {
    normalize(&format!("{parent}/{child}"))
}

/// Parent of `path`, or `None` for the root.
#[must_use]
pub fn parent(path: &str) -> Option<String> {
    let path = normalize(path);
    if path == ROOT {
        return None;
    }
    let idx = path.rfind('/').unwrap_or(0);
    if idx == 0 {
        Some(ROOT.to_string())
    } else {
        Some(path[..idx].to_string())
    }
}

/// Proper ancestors of `path`, root first.
#[must_use]
pub fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        current = parent(&p);
        out.push(p);
    }
    out.reverse();
    out
}

/// Number of elements `path` sits below `ancestor`, or `None` if it is not
/// inside `ancestor`'s subtree. A path is at depth 0 below itself.
#[must_use]
pub fn depth_below(path: &str, ancestor: &str) -> Option<usize> {
    let mut path_elems = elements(path);
    for a in elements(ancestor) {
        if path_elems.next() != Some(a) {
            return None;
        }
    }
    Some(path_elems.count())
}

/// True if `path` is strictly below `ancestor`.
#[must_use]
pub fn is_descendant_of(path: &str, ancestor: &str) -> bool {
    matches!(depth_below(path, ancestor), Some(d) if d > 0)
}

/// Immediate child element of `ancestor` on the way to `path`.
#[must_use]
pub fn child_toward<'a>(path: &'a str, ancestor: &str) -> Option<&'a str> {
    if depth_below(path, ancestor)? == 0 {
        return None;
    }
    elements(path).nth(elements(ancestor).count())
}
