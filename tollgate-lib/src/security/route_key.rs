/// Resolve the rate-limiting route for a request path.
///
/// The route is the directory part of the path, cleaned the way Go's `path.Dir` does it:
/// `/api/widgets/1` -> `/api/widgets`, `/api` -> `/`, `/api/` -> `/api`.
pub fn route_key(path: &str) -> String {
    let dir = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    };
    clean(dir)
}

/// Lexically normalize a slash-separated path: collapse repeated slashes, drop `.`
/// segments, resolve `..` and strip the trailing slash.
fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
