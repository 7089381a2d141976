//! Test utilities.
//!
//! Scratch directories are created under `$TAR_CODEC_TEST_TMPDIR` when it is
//! set, and under the system temporary directory otherwise.

use std::{ffi::OsString, fs, io::Write, path::Path};

use once_cell::sync::Lazy;
use tempfile::TempDir;

static TMPDIR: Lazy<OsString> = Lazy::new(|| {
    if let Some(path) = std::env::var_os("TAR_CODEC_TEST_TMPDIR") {
        eprintln!("temporary directory from $TAR_CODEC_TEST_TMPDIR: {path:?}");
        path
    } else {
        std::env::temp_dir().into_os_string()
    }
});

/// Allocate a temporary directory, removed when dropped.
pub fn tempdir() -> TempDir {
    TempDir::with_prefix_in("tar-codec-test-", TMPDIR.as_os_str()).unwrap()
}

/// Create `path` with `content`, creating parent directories as needed.
pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::File::create(path)
        .and_then(|mut file| file.write_all(content))
        .unwrap();
}
