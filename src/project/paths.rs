//! Portable path helpers for project locations

use std::path::{Component, Path, PathBuf};

/// Marker file that identifies a workspace root
pub const GLOBAL_FILE_NAME: &str = "global.json";

/// Lexically normalize a path, folding `.` and `..` without touching disk
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Relative path from directory `from` to `to`, always `/`-separated so
/// lock files stay portable across operating systems.
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from = normalize(from);
    let to = normalize(to);

    let from_parts: Vec<Component<'_>> = from.components().collect();
    let to_parts: Vec<Component<'_>> = to.components().collect();

    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    // Different roots (e.g. another drive): nothing to share
    if common == 0 && (from.has_root() || to.has_root()) {
        return to_portable(&to);
    }

    let mut segments: Vec<String> = Vec::new();
    for _ in &from_parts[common..] {
        segments.push("..".to_string());
    }
    for part in &to_parts[common..] {
        segments.push(part.as_os_str().to_string_lossy().into_owned());
    }

    if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    }
}

fn to_portable(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Find the workspace root for a project: the nearest ancestor holding
/// `global.json`, or the project directory itself.
pub fn resolve_root_directory(project_dir: &Path) -> PathBuf {
    project_dir
        .ancestors()
        .find(|dir| dir.join(GLOBAL_FILE_NAME).is_file())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project_dir.to_path_buf())
}
