//! Path arithmetic for the virtual filesystem. Paths are always absolute and
//! use `/` as separator; the root is `/`.

/// Collapses duplicate separators and resolves `.` and `..` segments.
/// `..` at the root stays at the root.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Resolves `target` against `current`: absolute targets replace the current
/// directory, relative ones are appended to it.
pub fn resolve(current: &str, target: &str) -> String {
    if target.starts_with('/') {
        normalize(target)
    } else {
        normalize(&format!("{current}/{target}"))
    }
}

pub fn is_root(path: &str) -> bool {
    path == "/"
}

/// Parent directory of a normalized path. The root has no parent.
pub fn parent(path: &str) -> Option<String> {
    if is_root(path) {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(index) => Some(path[..index].to_string()),
        None => None,
    }
}

/// Last segment of a normalized path. Empty for the root.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_top_level_directory_is_root() {
        assert_eq!(resolve("/research", ".."), "/");
    }

    #[test]
    fn parent_of_root_is_root() {
        assert_eq!(resolve("/", ".."), "/");
        assert_eq!(resolve("/", "../../.."), "/");
    }

    #[test]
    fn relative_paths_append_to_current_directory() {
        assert_eq!(resolve("/", "research"), "/research");
        assert_eq!(resolve("/research", "experiments/./log.txt"), "/research/experiments/log.txt");
        assert_eq!(resolve("/research/experiments", "../research_notes.md"), "/research/research_notes.md");
    }

    #[test]
    fn absolute_paths_replace_current_directory() {
        assert_eq!(resolve("/research", "/military"), "/military");
        assert_eq!(resolve("/research", "/"), "/");
        assert_eq!(normalize("//military///intel/"), "/military/intel");
    }

    #[test]
    fn parent_and_file_name() {
        assert_eq!(parent("/research/notes.md").as_deref(), Some("/research"));
        assert_eq!(parent("/readme.txt").as_deref(), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(file_name("/research/notes.md"), "notes.md");
        assert_eq!(file_name("/"), "");
    }
}
