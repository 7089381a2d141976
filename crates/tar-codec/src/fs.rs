//! Filesystem access used when archiving and extracting directory trees.
//!
//! Everything above the stream layer talks to the filesystem through the
//! [`FileSystem`] trait, so the archive code can be pointed at something
//! other than the host filesystem.

use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Metadata about one filesystem object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    /// Whether the object is a directory.
    pub is_dir: bool,
    /// Length in bytes (zero for directories).
    pub len: u64,
    /// Last write time, seconds since the Unix epoch.
    pub mtime: u64,
    /// Permission bits, when the filesystem has them.
    pub mode: Option<u32>,
    /// Owner user ID.
    pub uid: u64,
    /// Owner group ID.
    pub gid: u64,
    /// Whether the object is read-only.
    pub read_only: bool,
}

/// The filesystem operations needed to archive and extract trees.
pub trait FileSystem {
    /// Metadata for `path`, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// The immediate children of the directory at `path`.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Open `path` for reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>>;

    /// Create (or truncate) `path` for writing.
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>>;

    /// Create `path` and any missing parents. Succeeds if it already exists.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// The directory relative paths are resolved against.
    fn current_dir(&self) -> io::Result<PathBuf>;

    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }

    /// Whether `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool {
        self.stat(path).is_ok_and(|stat| stat.is_dir)
    }
}

/// The real filesystem of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFileSystem;

impl FileSystem for HostFileSystem {
    #[cfg(unix)]
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        use rustix::fs::FileType;

        let buf = rustix::fs::stat(path)?;
        let is_dir = FileType::from_raw_mode(buf.st_mode as _) == FileType::Directory;
        let read_only = fs::metadata(path)?.permissions().readonly();
        Ok(FileStat {
            is_dir,
            len: if is_dir { 0 } else { buf.st_size as u64 },
            mtime: buf.st_mtime.max(0) as u64,
            mode: Some(buf.st_mode as u32 & 0o7777),
            uid: buf.st_uid.into(),
            gid: buf.st_gid.into(),
            read_only,
        })
    }

    #[cfg(not(unix))]
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = fs::metadata(path)?;
        let is_dir = metadata.is_dir();
        let mtime = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Ok(FileStat {
            is_dir,
            len: if is_dir { 0 } else { metadata.len() },
            mtime,
            mode: None,
            uid: 0,
            gid: 0,
            read_only: metadata.permissions().readonly(),
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut children = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        children.sort();
        Ok(children)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(File::open(path)?))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>> {
        Ok(Box::new(File::create(path)?))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }
}

/// Seconds since the Unix epoch for `time`, clamped at zero.
pub(crate) fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::tempdir;

    #[test]
    fn test_host_stat() {
        let dir = tempdir();
        let file = dir.path().join("data.bin");
        fs::write(&file, b"12345").unwrap();

        let fs = HostFileSystem;
        let stat = fs.stat(&file).unwrap();
        assert!(!stat.is_dir);
        assert_eq!(stat.len, 5);
        assert!(stat.mtime > 0);
        assert!(fs.exists(&file));
        assert!(!fs.is_dir(&file));

        let stat = fs.stat(dir.path()).unwrap();
        assert!(stat.is_dir);
        assert_eq!(stat.len, 0);
        assert!(!fs.exists(&dir.path().join("missing")));
    }

    #[cfg(unix)]
    #[test]
    fn test_host_stat_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir();
        let file = dir.path().join("ro.txt");
        fs::write(&file, b"x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o444)).unwrap();
        let stat = HostFileSystem.stat(&file).unwrap();
        assert_eq!(stat.mode, Some(0o444));
        assert!(stat.read_only);
    }

    #[test]
    fn test_read_dir_sorted() {
        let dir = tempdir();
        for name in ["b", "c", "a"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let children = HostFileSystem.read_dir(dir.path()).unwrap();
        let names: Vec<_> = children
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_create_dir_all_idempotent() {
        let dir = tempdir();
        let nested = dir.path().join("x/y/z");
        HostFileSystem.create_dir_all(&nested).unwrap();
        HostFileSystem.create_dir_all(&nested).unwrap();
        assert!(HostFileSystem.is_dir(&nested));
    }
}
