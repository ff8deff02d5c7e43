use std::path::Path;
use walkdir::WalkDir;

/// VCS metadata directories, never part of a checkout's content.
const SKIP_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// List every file under `root` as a `/`-separated path relative to it,
/// sorted. Symlinks are not followed.
pub fn scan_manifest_files(root: &Path) -> Vec<String> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !SKIP_DIRS.contains(&name.as_ref())
        });

    let mut files: Vec<String> = walker
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e.path().strip_prefix(root).ok()?;
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
        .collect();
    files.sort();
    files
}
