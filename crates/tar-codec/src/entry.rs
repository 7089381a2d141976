//! Archive members.

use std::{
    hash::{Hash, Hasher},
    path::{Component, Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{
    error::{Result, TarError},
    fs::{unix_seconds, FileSystem},
    header::{Header, NameEncoding, TypeFlag},
};

/// Mode given to directories when the filesystem doesn't report one.
pub const DEFAULT_DIR_MODE: u32 = 0o1753;

/// Mode given to files when the filesystem doesn't report one.
pub const DEFAULT_FILE_MODE: u32 = 0o100700;

/// One member of an archive: a header and, when archiving from disk, the
/// file it was created from.
///
/// Entries compare and hash by name only.
#[derive(Debug, Clone)]
pub struct Entry {
    header: Header,
    file: Option<PathBuf>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.header.name == other.header.name
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.header.name.hash(state);
    }
}

impl Entry {
    /// Create an entry with the given name and no backing file.
    ///
    /// A name ending in '/' makes a directory entry. Ownership and size are
    /// zero and the modification time is now.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_dir = name.ends_with('/');
        Self::from_header(Header {
            name,
            mode: if is_dir {
                DEFAULT_DIR_MODE
            } else {
                DEFAULT_FILE_MODE
            },
            mtime: unix_seconds(SystemTime::now()),
            type_flag: if is_dir {
                TypeFlag::Directory
            } else {
                TypeFlag::Regular
            },
            ..Header::default()
        })
    }

    /// Wrap an already decoded header.
    #[must_use]
    pub fn from_header(header: Header) -> Self {
        Self { header, file: None }
    }

    /// Decode an entry from a header block.
    ///
    /// # Errors
    ///
    /// Fails when the block can't be decoded; see [`Header::decode`].
    pub fn from_header_bytes(bytes: &[u8], encoding: NameEncoding) -> Result<Self> {
        Header::decode(bytes, encoding).map(Self::from_header)
    }

    /// Create an entry describing the file or directory at `path`.
    ///
    /// The name is made relative to the current directory when `path` lies
    /// below it, uses '/' as separator and never starts with one. Directory
    /// names end with '/'.
    ///
    /// # Errors
    ///
    /// Fails if `path` can't be examined.
    pub fn from_path(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stat = fs
            .stat(path)
            .map_err(|e| TarError::archive(format!("examining {path:?}"), e))?;

        let relative = fs
            .current_dir()
            .ok()
            .and_then(|cwd| path.strip_prefix(cwd).ok())
            .unwrap_or(path);
        let mut name = archive_name(relative);

        let (mode, type_flag, size) = if stat.is_dir {
            if !name.is_empty() && !name.ends_with('/') {
                name.push('/');
            }
            (stat.mode.unwrap_or(DEFAULT_DIR_MODE), TypeFlag::Directory, 0)
        } else {
            (
                stat.mode.unwrap_or(DEFAULT_FILE_MODE),
                TypeFlag::Regular,
                stat.len,
            )
        };

        Ok(Self {
            header: Header {
                name,
                mode,
                uid: stat.uid,
                gid: stat.gid,
                size,
                mtime: stat.mtime,
                type_flag,
                ..Header::default()
            },
            file: Some(path.to_path_buf()),
        })
    }

    /// Entries for the immediate children of a directory-backed entry.
    ///
    /// Returns an empty list for anything else.
    ///
    /// # Errors
    ///
    /// Fails if the directory can't be listed or a child can't be examined.
    pub fn children(&self, fs: &dyn FileSystem) -> Result<Vec<Entry>> {
        let Some(path) = &self.file else {
            return Ok(Vec::new());
        };
        if !fs.is_dir(path) {
            return Ok(Vec::new());
        }
        fs.read_dir(path)
            .map_err(|e| TarError::archive(format!("listing {path:?}"), e))?
            .into_iter()
            .map(|child| Entry::from_path(fs, child))
            .collect()
    }

    /// Whether `other` lies below this entry, judging by name.
    #[must_use]
    pub fn is_descendant(&self, other: &Entry) -> bool {
        other.header.name.starts_with(&self.header.name)
    }

    /// Whether this entry is a directory, by type flag or trailing '/'.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.header.type_flag == TypeFlag::Directory || self.header.name.ends_with('/')
    }

    /// The header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The header, for modification.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// The file this entry was created from, if any.
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Point the entry at a different backing file.
    pub fn set_file(&mut self, file: Option<PathBuf>) {
        self.file = file;
    }

    /// Entry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Set the entry name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.header.name = name.into();
    }

    /// Mode bits.
    #[must_use]
    pub fn mode(&self) -> u32 {
        self.header.mode
    }

    /// Set the mode bits.
    pub fn set_mode(&mut self, mode: u32) {
        self.header.mode = mode;
    }

    /// Owner user ID.
    #[must_use]
    pub fn uid(&self) -> u64 {
        self.header.uid
    }

    /// Owner group ID.
    #[must_use]
    pub fn gid(&self) -> u64 {
        self.header.gid
    }

    /// Set the owner user and group IDs.
    pub fn set_ids(&mut self, uid: u64, gid: u64) {
        self.header.uid = uid;
        self.header.gid = gid;
    }

    /// Owner user name.
    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.header.user_name
    }

    /// Owner group name.
    #[must_use]
    pub fn group_name(&self) -> &str {
        &self.header.group_name
    }

    /// Set the owner user and group names.
    pub fn set_names(&mut self, user_name: impl Into<String>, group_name: impl Into<String>) {
        self.header.user_name = user_name.into();
        self.header.group_name = group_name.into();
    }

    /// Size of the entry data.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.header.size
    }

    /// Set the size of the entry data.
    pub fn set_size(&mut self, size: u64) {
        self.header.size = size;
    }

    /// Modification time in seconds since the Unix epoch.
    #[must_use]
    pub fn mtime(&self) -> u64 {
        self.header.mtime
    }

    /// Set the modification time in seconds since the Unix epoch.
    pub fn set_mtime(&mut self, mtime: u64) {
        self.header.mtime = mtime;
    }

    /// Modification time.
    #[must_use]
    pub fn modified(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.header.mtime)
    }

    /// Set the modification time; sub-second precision is dropped.
    pub fn set_modified(&mut self, time: SystemTime) {
        self.header.mtime = unix_seconds(time);
    }

    /// Kind of entry.
    #[must_use]
    pub fn type_flag(&self) -> TypeFlag {
        self.header.type_flag
    }

    /// Set the kind of entry.
    pub fn set_type_flag(&mut self, type_flag: TypeFlag) {
        self.header.type_flag = type_flag;
    }

    /// Link target.
    #[must_use]
    pub fn link_name(&self) -> &str {
        &self.header.link_name
    }

    /// Set the link target.
    pub fn set_link_name(&mut self, link_name: impl Into<String>) {
        self.header.link_name = link_name.into();
    }
}

/// Turn a filesystem path into a '/'-separated name without a leading '/'.
fn archive_name(path: &Path) -> String {
    let parts: Vec<_> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            Component::ParentDir => Some("..".into()),
            Component::Prefix(_) | Component::RootDir | Component::CurDir => None,
        })
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::{
        fs::HostFileSystem,
        test::{tempdir, write_file},
    };

    #[test]
    fn test_bare_file_entry() {
        let entry = Entry::new("notes.txt");
        assert!(!entry.is_directory());
        assert_eq!(entry.type_flag(), TypeFlag::Regular);
        assert_eq!(entry.mode(), DEFAULT_FILE_MODE);
        assert_eq!((entry.uid(), entry.gid(), entry.size()), (0, 0, 0));
        assert_eq!(entry.user_name(), "");
        assert!(entry.mtime() > 0);
        assert!(entry.file().is_none());
    }

    #[test]
    fn test_bare_directory_entry() {
        let entry = Entry::new("docs/");
        assert!(entry.is_directory());
        assert_eq!(entry.type_flag(), TypeFlag::Directory);
        assert_eq!(entry.mode(), DEFAULT_DIR_MODE);
    }

    #[test]
    fn test_equality_by_name() {
        let mut a = Entry::new("same");
        a.set_size(10);
        let mut b = Entry::new("same");
        b.set_ids(1, 2);
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b, Entry::new("other")].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Entry::new("file");
        let mut copy = original.clone();
        copy.set_name("renamed");
        copy.set_ids(5, 6);
        assert_eq!(original.name(), "file");
        assert_eq!(original.uid(), 0);
    }

    #[test]
    fn test_is_descendant() {
        let dir = Entry::new("docs/");
        assert!(dir.is_descendant(&Entry::new("docs/readme.txt")));
        assert!(!dir.is_descendant(&Entry::new("src/main.rs")));
    }

    #[test]
    fn test_from_header_bytes() {
        let header = Header {
            name: "a/b".into(),
            size: 3,
            ..Header::default()
        };
        let block = header.encode(NameEncoding::Utf8);
        let entry = Entry::from_header_bytes(&block, NameEncoding::Utf8).unwrap();
        assert_eq!(entry.name(), "a/b");
        assert_eq!(entry.size(), 3);
        assert!(entry.header().is_checksum_valid());
    }

    #[test]
    fn test_built_header_is_unchecked() {
        let entry = Entry::new("notes.txt");
        assert_eq!(entry.header().checksum(), 0);
        assert!(!entry.header().is_checksum_valid());
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(archive_name(Path::new("/abs/path/file")), "abs/path/file");
        assert_eq!(archive_name(Path::new("./rel/file")), "rel/file");
        assert_eq!(archive_name(Path::new("a/../b")), "a/../b");
    }

    #[test]
    fn test_from_path_and_children() {
        let dir = tempdir();
        let root = dir.path().join("docs");
        write_file(&root.join("readme.txt"), b"hello\n");
        write_file(&root.join("sub/inner.txt"), b"x");

        let fs = HostFileSystem;
        let entry = Entry::from_path(&fs, &root).unwrap();
        assert!(entry.is_directory());
        assert!(entry.name().ends_with("docs/"));
        assert!(!entry.name().starts_with('/'));
        assert_eq!(entry.size(), 0);
        assert_eq!(entry.file(), Some(root.as_path()));

        let children = entry.children(&fs).unwrap();
        assert_eq!(children.len(), 2);
        assert!(children[0].name().ends_with("docs/readme.txt"));
        assert_eq!(children[0].size(), 6);
        assert_eq!(children[0].type_flag(), TypeFlag::Regular);
        assert!(children[1].name().ends_with("docs/sub/"));
        assert!(entry.is_descendant(&children[0]));

        assert!(children[0].children(&fs).unwrap().is_empty());
        assert!(Entry::new("bare/").children(&fs).unwrap().is_empty());
    }
}
