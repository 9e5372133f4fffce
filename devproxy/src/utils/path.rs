/// Lexically clean a URL path: collapse duplicate slashes, resolve `.` and `..`.
/// The result is always rooted; `..` never climbs above `/`. A trailing slash is kept.
/// Dot segments written with `%2e` count as dot segments.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let mut ends_in_dir = false;
    for segment in path.split('/') {
        ends_in_dir = false;
        match dot_segment(segment) {
            Some(DotSegment::Current) => ends_in_dir = true,
            Some(DotSegment::Parent) => {
                segments.pop();
                ends_in_dir = true;
            }
            None if segment.is_empty() => ends_in_dir = true,
            None => segments.push(segment),
        }
    }
    let mut cleaned = format!("/{}", segments.join("/"));
    if ends_in_dir && !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}

enum DotSegment {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    match segment.to_ascii_lowercase().replace("%2e", ".").as_str() {
        "." => Some(DotSegment::Current),
        ".." => Some(DotSegment::Parent),
        _ => None,
    }
}

/// Return the part of `path` below `prefix`, rooted at `/`, or None when `path` is outside it.
/// `path` is expected to be normalized already.
pub fn strip_prefix_rooted(path: &str, prefix: &str) -> Option<String> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        // "/apple" is not under "/app"
        None
    }
}

/// Join two path pieces with exactly one slash between them.
pub fn join_paths(base: &str, rest: &str) -> String {
    match (base.ends_with('/'), rest.starts_with('/')) {
        (true, true) => format!("{}{}", base, &rest[1..]),
        (false, false) => format!("{}/{}", base, rest),
        _ => format!("{}{}", base, rest),
    }
}
