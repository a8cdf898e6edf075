use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

/// Creates a temporary directory holding the given `(name, content)` files.
pub fn create_test_directory(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (name, content) in files {
        write_test_file(dir.path(), name, content);
    }
    dir
}

/// Writes (or overwrites) a single file inside `dir`.
pub fn write_test_file(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

/// Removes a single file from `dir`.
pub fn remove_test_file(dir: &Path, name: &str) {
    fs::remove_file(dir.join(name)).unwrap();
}
