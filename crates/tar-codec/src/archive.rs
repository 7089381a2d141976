//! Whole-archive operations: listing, extracting to a directory, and
//! archiving directory trees.
//!
//! [`TarExtractor`] drives an [`ArchiveReader`] and [`TarBuilder`] drives an
//! [`ArchiveWriter`]. Both reach the filesystem only through
//! [`FileSystem`], defaulting to [`HostFileSystem`], and report progress
//! through an optional callback receiving each entry and, for entries that
//! were skipped, a message saying why.

use std::{
    fmt,
    io::{Read, Write},
    path::{Component, Path, PathBuf},
};

use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::{
    entry::Entry,
    error::{Result, TarError},
    fs::{FileSystem, HostFileSystem},
    header::NameEncoding,
    stream::{ArchiveReader, ArchiveWriter},
    text::{self, PlatformLineWriter},
    DEFAULT_BLOCK_FACTOR,
};

/// Callback invoked for each entry processed.
///
/// The message is `None` for entries processed normally and explains why an
/// entry was skipped otherwise.
pub type ProgressHandler = Box<dyn FnMut(&Entry, Option<&str>)>;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Settings shared by [`TarExtractor`] and [`TarBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Encoding of names in headers.
    pub name_encoding: NameEncoding,
    /// Blocks per record.
    pub block_factor: usize,
    /// Don't overwrite files that already exist when extracting.
    pub keep_old_files: bool,
    /// Translate line endings of text files.
    pub ascii_translate: bool,
    /// Leading part of entry names removed when archiving.
    ///
    /// Backslashes are treated as '/' and trailing separators are ignored.
    pub root_path: Option<String>,
    /// Directory prepended to entry names when archiving.
    pub path_prefix: Option<String>,
    /// Whether closing the archive also drops the underlying stream.
    pub stream_owner: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            name_encoding: NameEncoding::default(),
            block_factor: DEFAULT_BLOCK_FACTOR,
            keep_old_files: false,
            ascii_translate: false,
            root_path: None,
            path_prefix: None,
            stream_owner: true,
        }
    }
}

/// User and group identity stamped on archived entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    /// Numeric user ID.
    pub uid: u64,
    /// User name.
    pub user_name: String,
    /// Numeric group ID.
    pub gid: u64,
    /// Group name.
    pub group_name: String,
}

impl Ownership {
    /// The identity currently carried by `entry`.
    #[must_use]
    pub fn of(entry: &Entry) -> Self {
        Self {
            uid: entry.uid(),
            user_name: entry.user_name().to_owned(),
            gid: entry.gid(),
            group_name: entry.group_name().to_owned(),
        }
    }

    /// Stamp this identity on `entry`.
    pub fn apply(&self, entry: &mut Entry) {
        entry.set_ids(self.uid, self.gid);
        entry.set_names(self.user_name.as_str(), self.group_name.as_str());
    }
}

/// Reads an archive and lists or extracts its entries.
pub struct TarExtractor<R> {
    reader: ArchiveReader<R>,
    options: ArchiveOptions,
    fs: Box<dyn FileSystem>,
    progress: Option<ProgressHandler>,
}

impl<R> fmt::Debug for TarExtractor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarExtractor")
            .field("reader", &self.reader)
            .field("options", &self.options)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: Read> TarExtractor<R> {
    /// Read the archive from `source` with default options.
    pub fn new(source: R) -> Self {
        Self {
            reader: ArchiveReader::new(source),
            options: ArchiveOptions::default(),
            fs: Box::new(HostFileSystem),
            progress: None,
        }
    }

    /// Read the archive from `source` with `options`.
    ///
    /// # Errors
    ///
    /// Fails if the block factor is zero.
    pub fn with_options(source: R, options: ArchiveOptions) -> Result<Self> {
        let mut reader =
            ArchiveReader::with_options(source, options.block_factor, options.name_encoding)?;
        reader.set_stream_owner(options.stream_owner);
        Ok(Self {
            reader,
            options,
            fs: Box::new(HostFileSystem),
            progress: None,
        })
    }

    /// Extract through `fs` instead of the host filesystem.
    pub fn set_file_system(&mut self, fs: Box<dyn FileSystem>) {
        self.fs = fs;
    }

    /// Report each processed entry to `handler`.
    pub fn set_progress(&mut self, handler: impl FnMut(&Entry, Option<&str>) + 'static) {
        self.progress = Some(Box::new(handler));
    }

    /// The underlying reader, for limits and entry factories.
    pub fn reader_mut(&mut self) -> &mut ArchiveReader<R> {
        &mut self.reader
    }

    /// Read all remaining entries, reporting each one.
    ///
    /// # Errors
    ///
    /// Fails if the archive can't be read.
    pub fn list(&mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.reader.next_entry()? {
            self.report(&entry, None);
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Extract all remaining entries below `destination`.
    ///
    /// Entries that would land outside of it are refused.
    ///
    /// # Errors
    ///
    /// See [`extract_with`](Self::extract_with).
    pub fn extract(&mut self, destination: impl AsRef<Path>) -> Result<()> {
        self.extract_with(destination, false)
    }

    /// Extract all remaining entries below `destination`.
    ///
    /// Hard and symbolic links are skipped. Leading '/' is dropped from
    /// names. Existing files are kept when `keep_old_files` is set, or when
    /// they are read-only; both cases are reported through the progress
    /// callback.
    ///
    /// # Errors
    ///
    /// Returns [`TarError::PathTraversal`] for an entry resolving outside of
    /// `destination` unless `allow_parent_traversal` is set; nothing is
    /// created for that entry. Fails as well if the archive can't be read or
    /// the files can't be created.
    pub fn extract_with(
        &mut self,
        destination: impl AsRef<Path>,
        allow_parent_traversal: bool,
    ) -> Result<()> {
        let destination = destination.as_ref();
        let destination = if destination.is_absolute() {
            normalize(destination)
        } else {
            normalize(&self.fs.current_dir()?.join(destination))
        };

        while let Some(entry) = self.reader.next_entry()? {
            if entry.type_flag().is_link() {
                debug!("not extracting link {:?}", entry.name());
                continue;
            }
            self.extract_entry(&destination, &entry, allow_parent_traversal)?;
        }
        Ok(())
    }

    /// Consume the extractor and return the source, unless it was dropped.
    pub fn into_inner(self) -> Option<R> {
        self.reader.into_inner()
    }

    fn extract_entry(
        &mut self,
        destination: &Path,
        entry: &Entry,
        allow_parent_traversal: bool,
    ) -> Result<()> {
        self.report(entry, None);

        let target = normalize(&destination.join(relative_path(entry.name())));
        if !allow_parent_traversal && !target.starts_with(destination) {
            return Err(TarError::PathTraversal {
                name: entry.name().to_owned(),
                destination: destination.to_path_buf(),
            });
        }

        if entry.is_directory() {
            return self.ensure_directory(&target);
        }
        if let Some(parent) = target.parent() {
            self.ensure_directory(parent)?;
        }

        if let Ok(stat) = self.fs.stat(&target) {
            let reason = if self.options.keep_old_files {
                Some("Destination file already exists")
            } else if stat.read_only {
                Some("Destination file already exists, and is read-only")
            } else {
                None
            };
            if let Some(reason) = reason {
                warn!("not extracting {:?}: {reason}", entry.name());
                self.report(entry, Some(reason));
                return Ok(());
            }
        }

        let mut out = self
            .fs
            .create(&target)
            .map_err(|e| TarError::archive(format!("creating {target:?}"), e))?;
        if self.options.ascii_translate {
            self.copy_translated(&mut out)?;
        } else {
            self.reader.copy_entry_contents(&mut out)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Copy the entry data, converting line endings unless it looks binary.
    fn copy_translated(&mut self, out: &mut Box<dyn Write>) -> Result<()> {
        let sample = text::read_sample(&mut self.reader)?;
        if text::is_binary(&sample) {
            out.write_all(&sample)?;
            self.reader.copy_entry_contents(out)?;
            return Ok(());
        }
        let mut writer = PlatformLineWriter::new(out);
        writer.write_all(&sample)?;
        self.reader.copy_entry_contents(&mut writer)?;
        writer.finish()?;
        Ok(())
    }

    fn ensure_directory(&self, path: &Path) -> Result<()> {
        if self.fs.is_dir(path) {
            return Ok(());
        }
        self.fs
            .create_dir_all(path)
            .map_err(|e| TarError::archive(format!("creating directory {path:?}"), e))
    }

    fn report(&mut self, entry: &Entry, message: Option<&str>) {
        if let Some(progress) = &mut self.progress {
            progress(entry, message);
        }
    }
}

/// Writes entries, and the directory trees behind them, to an archive.
pub struct TarBuilder<W: Write> {
    writer: ArchiveWriter<W>,
    options: ArchiveOptions,
    root_path: Option<String>,
    user_info: Option<Ownership>,
    fs: Box<dyn FileSystem>,
    progress: Option<ProgressHandler>,
}

impl<W: Write + fmt::Debug> fmt::Debug for TarBuilder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarBuilder")
            .field("writer", &self.writer)
            .field("options", &self.options)
            .field("user_info", &self.user_info)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl<W: Write> TarBuilder<W> {
    /// Write the archive to `sink` with default options.
    pub fn new(sink: W) -> Self {
        Self::from_writer(ArchiveWriter::new(sink), ArchiveOptions::default())
    }

    /// Write the archive to `sink` with `options`.
    ///
    /// # Errors
    ///
    /// Fails if the block factor is zero.
    pub fn with_options(sink: W, options: ArchiveOptions) -> Result<Self> {
        let mut writer =
            ArchiveWriter::with_options(sink, options.block_factor, options.name_encoding)?;
        writer.set_stream_owner(options.stream_owner);
        Ok(Self::from_writer(writer, options))
    }

    fn from_writer(writer: ArchiveWriter<W>, options: ArchiveOptions) -> Self {
        let root_path = options
            .root_path
            .as_deref()
            .map(|root| root.replace('\\', "/").trim_end_matches('/').to_owned())
            .filter(|root| !root.is_empty());
        Self {
            writer,
            options,
            root_path,
            user_info: None,
            fs: Box::new(HostFileSystem),
            progress: None,
        }
    }

    /// Read files through `fs` instead of the host filesystem.
    pub fn set_file_system(&mut self, fs: Box<dyn FileSystem>) {
        self.fs = fs;
    }

    /// Report each written entry to `handler`.
    pub fn set_progress(&mut self, handler: impl FnMut(&Entry, Option<&str>) + 'static) {
        self.progress = Some(Box::new(handler));
    }

    /// Stamp `ownership` on every entry written from now on, or stop doing
    /// so with `None`.
    pub fn set_user_info(&mut self, ownership: Option<Ownership>) {
        self.user_info = ownership;
    }

    /// Write `entry` and, for a directory with `recurse` set, everything
    /// below it.
    ///
    /// `entry` itself is left untouched. Descendants take the owner of
    /// `entry`; the identity from [`set_user_info`](Self::set_user_info)
    /// overrides both.
    ///
    /// # Errors
    ///
    /// Fails if a file can't be read, if its length changed since it was
    /// examined, and on write errors.
    pub fn write_entry(&mut self, entry: &Entry, recurse: bool) -> Result<()> {
        let inherited = recurse.then(|| Ownership::of(entry));
        self.write_tree(entry, recurse, inherited.as_ref())
    }

    /// Complete the archive.
    ///
    /// # Errors
    ///
    /// Fails if an entry is incomplete and on write errors.
    pub fn finish(&mut self) -> Result<()> {
        self.writer.finish()
    }

    /// Consume the builder and return the sink, unless it was dropped.
    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner()
    }

    fn write_tree(
        &mut self,
        source: &Entry,
        recurse: bool,
        inherited: Option<&Ownership>,
    ) -> Result<()> {
        let mut entry = source.clone();
        if let Some(ownership) = &self.user_info {
            ownership.apply(&mut entry);
        }
        self.report(&entry, None);

        // held until the entry is closed; dropping it removes the file
        let mut translated = None;
        if self.options.ascii_translate && !entry.is_directory() {
            if let Some(file) = entry.file() {
                if let Some(temp) = self.translate_file(file)? {
                    entry.set_size(temp.as_file().metadata()?.len());
                    translated = Some(temp);
                }
            }
        }

        if let Some(name) = self.archive_name(entry.name()) {
            entry.set_name(name);
        }

        self.writer.put_entry(&entry)?;

        if entry.is_directory() {
            if recurse {
                for mut child in source.children(&*self.fs)? {
                    if let Some(ownership) = inherited {
                        ownership.apply(&mut child);
                    }
                    self.write_tree(&child, recurse, inherited)?;
                }
            }
            return Ok(());
        }

        let input: Option<Box<dyn Read>> = match (&translated, entry.file()) {
            (Some(temp), _) => Some(Box::new(temp.reopen()?)),
            (None, Some(file)) => Some(
                self.fs
                    .open(file)
                    .map_err(|e| TarError::archive(format!("opening {file:?}"), e))?,
            ),
            (None, None) => None,
        };
        if let Some(mut input) = input {
            self.copy_data(&mut input)?;
        }
        self.writer.close_entry()
    }

    fn copy_data(&mut self, input: &mut dyn Read) -> Result<()> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            self.writer.write(&buf[..n])?;
        }
    }

    /// Copy a text file to a temporary file with '\n' line endings.
    ///
    /// Returns `None` for binary files.
    fn translate_file(&self, file: &Path) -> Result<Option<NamedTempFile>> {
        let open = |file: &Path| {
            self.fs
                .open(file)
                .map_err(|e| TarError::archive(format!("opening {file:?}"), e))
        };
        if text::is_binary(&text::read_sample(&mut open(file)?)?) {
            return Ok(None);
        }
        let mut temp = NamedTempFile::new()?;
        let written = text::copy_with_unix_newlines(&mut open(file)?, temp.as_file_mut())?;
        temp.as_file_mut().flush()?;
        debug!("translated {file:?} to {written} bytes at {:?}", temp.path());
        Ok(Some(temp))
    }

    /// The name to archive `name` under, if it changes.
    fn archive_name(&self, name: &str) -> Option<String> {
        let stripped = self.root_path.as_deref().and_then(|root| {
            name.get(..root.len())
                .filter(|head| head.eq_ignore_ascii_case(root))
                .filter(|_| name.as_bytes().get(root.len()) == Some(&b'/'))
                .and_then(|_| name.get(root.len() + 1..))
                .filter(|rest| !rest.is_empty())
        });
        match &self.options.path_prefix {
            Some(prefix) => Some(format!("{prefix}/{}", stripped.unwrap_or(name))),
            None => stripped.map(str::to_owned),
        }
    }

    fn report(&mut self, entry: &Entry, message: Option<&str>) {
        if let Some(progress) = &mut self.progress {
            progress(entry, message);
        }
    }
}

/// Turn an entry name into a relative path, dropping any leading root.
fn relative_path(name: &str) -> PathBuf {
    name.split('/')
        .filter(|part| !part.is_empty())
        .flat_map(|part| Path::new(part).components())
        .filter(|c| !matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect()
}

/// Resolve "." and ".." in `path` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::ParentDir) | None => out.push(component),
                // ".." at the root stays at the root
                Some(_) => {}
            },
            other => out.push(other),
        }
    }
    out
}
