#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Path for a file the test expects a command to create.
    pub fn target(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

/// Reads a packed file of `(i32, i32)` records.
pub fn read_i32_pairs(path: &Path) -> Vec<(i32, i32)> {
    let bytes = fs::read(path).expect("read packed output");
    assert_eq!(bytes.len() % 8, 0, "output is not a whole number of records");
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let x = i32::from_le_bytes(chunk[..4].try_into().unwrap());
            let y = i32::from_le_bytes(chunk[4..].try_into().unwrap());
            (x, y)
        })
        .collect()
}
