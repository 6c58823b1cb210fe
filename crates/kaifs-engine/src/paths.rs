//! Pure path model.
//!
//! Every tree key is a normalized path: a single leading `/`, no trailing
//! `/` (except root itself), no empty segments, no `/` runs. `.` segments
//! vanish and `..` pops, so shell-style relative navigation resolves here.
//! Path comparison is byte equality over the normalized form.
//!
//! Root is its own parent and its own basename — the sentinel that stops
//! recursive walks.

/// Normalize a path to canonical form.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Parent of a normalized path. `parent("/") == "/"`.
pub fn parent(path: &str) -> String {
    let path = normalize(path);
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => "/".to_string(),
    }
}

/// Final segment of a normalized path. `basename("/") == "/"`.
pub fn basename(path: &str) -> String {
    let path = normalize(path);
    if path == "/" {
        return path;
    }
    match path.rfind('/') {
        Some(idx) => path[idx + 1..].to_string(),
        None => path,
    }
}

/// Join `rel` onto `base`. An absolute `rel` replaces `base` entirely.
pub fn join(base: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        normalize(rel)
    } else {
        normalize(&format!("{base}/{rel}"))
    }
}

/// True when `path` lies strictly beneath `ancestor`.
pub fn is_under(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path != "/";
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}
