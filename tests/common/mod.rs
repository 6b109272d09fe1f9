#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub const FILE_SIZE: usize = 256 * 1024;

/// SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Vec<u8> {
    let data = fs::read(path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    Sha256::digest(&data).to_vec()
}

/// Deterministic incompressible bytes.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// A binary file and a highly compressible text file in `dir`.
pub fn create_test_files(dir: &Path) -> Vec<PathBuf> {
    let binary = dir.join("test_binary");
    fs::write(&binary, noise(FILE_SIZE, 42)).unwrap();

    let text = dir.join("test_string");
    let repeated: Vec<u8> = b"1234567890".iter().copied().cycle().take(FILE_SIZE).collect();
    fs::write(&text, repeated).unwrap();

    vec![binary, text]
}

/// A small tree:
///
/// ```text
/// tree/
///   a.txt
///   empty/
///   nested/
///     b.bin
///     deeper/
///       c.txt
/// ```
pub fn create_test_tree(dir: &Path) -> PathBuf {
    let root = dir.join("tree");
    fs::create_dir_all(root.join("empty")).unwrap();
    fs::create_dir_all(root.join("nested/deeper")).unwrap();
    fs::write(root.join("a.txt"), b"alpha\n".repeat(1000)).unwrap();
    fs::write(root.join("nested/b.bin"), noise(10_000, 7)).unwrap();
    fs::write(root.join("nested/deeper/c.txt"), b"gamma").unwrap();
    root
}

/// Every node below and including `root`, as the archive writer walks it.
pub fn count_nodes(root: &Path) -> usize {
    walkdir::WalkDir::new(root).into_iter().count()
}

/// Relative paths of every file below `root`, sorted.
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Directory string usable as a trim prefix for paths below it.
pub fn prefix_of(dir: &Path) -> String {
    std::path::absolute(dir)
        .unwrap()
        .to_string_lossy()
        .into_owned()
}
