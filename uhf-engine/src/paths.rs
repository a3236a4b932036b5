use std::path::{Component, Path};

/// Characters a player on the broadcast side refuses in a path component.
const ILLEGAL_CHARACTERS: &[char] = &['|', '<', '>', '\\', '"', '?', '*'];

/// `file` expressed relative to `base`, with `../` segments when `file` is
/// outside of it. Always uses forward slashes, as stored in channel files.
pub fn relative_path(file: &Path, base: &Path) -> String {
    let file_parts: Vec<Component> = file.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    let common = file_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();
    for _ in common..base_parts.len() {
        segments.push("..".to_string());
    }
    for part in &file_parts[common..] {
        segments.push(part.as_os_str().to_string_lossy().into_owned());
    }
    segments.join("/")
}

/// Problems with a stored resource path, one message per offending component.
pub fn path_problems(path: &str) -> Vec<String> {
    let mut problems = Vec::new();
    for component in path.split('/') {
        if component.contains(ILLEGAL_CHARACTERS) {
            problems.push(format!("bad character in \"{}\"", component));
        }
        if component.ends_with(' ') {
            problems.push(format!("trailing space in \"{}\"", component));
        }
    }
    problems
}
