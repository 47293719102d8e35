//! Path utilities
//!
//! Paths are plain strings. A path value is always absolute and normalized:
//! no empty or `.` segments, `..` already applied.

use super::scope::EvalCtx;
use super::value::Value;

/// Normalize a path by resolving `.` and `..` segments and dropping empty
/// ones. A leading `/` is kept.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    if is_absolute_path(path) {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// `base` and `path` joined by a slash, without normalizing
pub fn join_paths(base: &str, path: &str) -> String {
    format!("{}/{}", base, path)
}

pub fn is_absolute_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Everything before the final slash
pub fn dir_of(path: &str) -> &str {
    match path.rfind('/') {
        None => ".",
        Some(0) => "/",
        Some(index) => &path[..index],
    }
}

/// Everything after the final slash, ignoring a single trailing slash
pub fn base_name_of(path: &str) -> &str {
    let path = path.strip_suffix('/').unwrap_or(path);
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// A path literal. Relative paths are resolved against the context's base
/// directory.
pub fn to_path(ctx: &EvalCtx, text: &str) -> Value {
    let absolute = if is_absolute_path(text) {
        normalize_path(text)
    } else {
        normalize_path(&join_paths(ctx.base_dir(), text))
    };
    Value::path(absolute)
}
