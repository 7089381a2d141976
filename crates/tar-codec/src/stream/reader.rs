//! Entry-by-entry reading of a tar stream.

use std::{
    fmt,
    io::{self, Read, Write},
};

use log::{debug, warn};

use crate::{
    buffer::BlockBuffer,
    entry::Entry,
    error::{FormatError, Result, TarError},
    header::{compute_checksum, is_zero_block, truncate_null, Header, NameEncoding, TypeFlag},
    pax::{ExtendedHeaderParser, PAX_PATH},
    BLOCK_SIZE,
};

use super::limits::Limits;

/// Builds the [`Entry`] for a header block in place of [`Entry::from_header_bytes`].
///
/// Names and link targets from preceding extension headers are applied to
/// the returned entry afterwards.
pub type EntryFactory = Box<dyn Fn(&[u8], NameEncoding) -> Result<Entry>>;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    InEntry,
    EndOfArchive,
}

/// What one header block turned out to be.
#[derive(Debug)]
enum HeaderOutcome {
    /// A real entry, with pending extensions applied.
    Entry(Entry),
    /// An extension header; its data was recorded for the next entry.
    Extension,
    /// An entry of a kind this reader doesn't handle; its data was consumed.
    Skip(TypeFlag),
    /// End-of-archive marker or end of stream.
    EndOfArchive,
}

/// Extension data waiting for the entry it applies to.
#[derive(Debug, Default)]
struct Pending {
    long_name: Option<String>,
    long_link: Option<String>,
    pax_path: Option<String>,
    count: usize,
}

/// Sequential reader over the entries of a tar stream.
///
/// [`next_entry`](Self::next_entry) advances to the next entry, skipping
/// whatever data of the previous one wasn't read. The entry data is then
/// available through [`read`](Self::read) (or [`std::io::Read`]), which
/// returns 0 once the entry is exhausted.
pub struct ArchiveReader<R> {
    buffer: BlockBuffer<R>,
    encoding: NameEncoding,
    limits: Limits,
    factory: Option<EntryFactory>,
    state: State,
    current: Option<Entry>,
    pending: Pending,
    entry_size: u64,
    entry_offset: u64,
    /// Last data block read; `block_pos` bytes of it are consumed.
    block: [u8; BLOCK_SIZE],
    block_pos: usize,
    pos: u64,
}

impl<R> fmt::Debug for ArchiveReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("state", &self.state)
            .field("current", &self.current.as_ref().map(Entry::name))
            .field("entry_size", &self.entry_size)
            .field("entry_offset", &self.entry_offset)
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}

impl<R: Read> ArchiveReader<R> {
    /// Read from `source` with the default block factor and UTF-8 names.
    pub fn new(source: R) -> Self {
        Self::from_buffer(BlockBuffer::reader(source), NameEncoding::default())
    }

    /// Read from `source` with a custom block factor and name encoding.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `block_factor` is zero.
    pub fn with_options(source: R, block_factor: usize, encoding: NameEncoding) -> Result<Self> {
        let buffer = BlockBuffer::open_for_read(source, block_factor)?;
        Ok(Self::from_buffer(buffer, encoding))
    }

    fn from_buffer(buffer: BlockBuffer<R>, encoding: NameEncoding) -> Self {
        Self {
            buffer,
            encoding,
            limits: Limits::default(),
            factory: None,
            state: State::Ready,
            current: None,
            pending: Pending::default(),
            entry_size: 0,
            entry_offset: 0,
            block: [0u8; BLOCK_SIZE],
            block_pos: BLOCK_SIZE,
            pos: 0,
        }
    }

    /// Replace the limits applied to extension headers.
    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    /// Build entries with `factory` instead of decoding them directly.
    pub fn set_entry_factory(&mut self, factory: EntryFactory) {
        self.factory = Some(factory);
    }

    /// Choose whether closing the reader drops the source.
    pub fn set_stream_owner(&mut self, owner: bool) {
        self.buffer.set_stream_owner(owner);
    }

    /// Size of one record in bytes.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.buffer.record_size()
    }

    /// Bytes consumed from the stream so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// The entry returned by the last call to `next_entry`.
    #[must_use]
    pub fn current_entry(&self) -> Option<&Entry> {
        self.current.as_ref()
    }

    /// Data bytes of the current entry not read yet.
    #[must_use]
    pub fn available(&self) -> u64 {
        match self.state {
            State::InEntry => self.entry_size - self.entry_offset,
            _ => 0,
        }
    }

    /// Advance to the next entry.
    ///
    /// Returns `Ok(None)` at the end of the archive, and keeps doing so on
    /// later calls.
    ///
    /// # Errors
    ///
    /// Fails on a header with a bad checksum or malformed fields, on
    /// extension headers exceeding the [`Limits`], if the stream ends inside
    /// an entry, and on I/O errors.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        match self.state {
            State::EndOfArchive => return Ok(None),
            State::InEntry => {
                self.skip_entry_data()?;
                self.state = State::Ready;
                self.current = None;
            }
            State::Ready => {}
        }

        loop {
            match self.read_header()? {
                HeaderOutcome::Entry(entry) => {
                    self.pending = Pending::default();
                    self.state = State::InEntry;
                    self.current = Some(entry.clone());
                    return Ok(Some(entry));
                }
                HeaderOutcome::Extension => {
                    self.pending.count += 1;
                    if self.pending.count > self.limits.max_pending_entries {
                        return Err(FormatError::TooManyPendingEntries {
                            count: self.pending.count,
                            limit: self.limits.max_pending_entries,
                        }
                        .into());
                    }
                }
                HeaderOutcome::Skip(type_flag) => {
                    warn!("skipping unsupported entry of type {type_flag:?}");
                    self.pending = Pending::default();
                }
                HeaderOutcome::EndOfArchive => {
                    if self.pending.count > 0 {
                        debug!("archive ends after {} extension headers", self.pending.count);
                    }
                    self.state = State::EndOfArchive;
                    self.current = None;
                    return Ok(None);
                }
            }
        }
    }

    /// Read data of the current entry into `buf`.
    ///
    /// Returns 0 once the entry is exhausted, or when there is no current
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns [`TarError::Truncated`] if the stream ends before the entry
    /// data does.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.state != State::InEntry {
            return Ok(0);
        }
        self.read_entry_data(buf)
    }

    /// Skip up to `count` bytes of the current entry's data.
    ///
    /// Returns the number of bytes skipped.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read).
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        let mut scratch = [0u8; BLOCK_SIZE];
        let mut skipped = 0;
        while skipped < count {
            let want = (count - skipped).min(BLOCK_SIZE as u64) as usize;
            let n = self.read(&mut scratch[..want])?;
            if n == 0 {
                break;
            }
            skipped += n as u64;
        }
        Ok(skipped)
    }

    /// Copy the remaining data of the current entry to `sink`.
    ///
    /// # Errors
    ///
    /// Fails if reading the entry or writing to `sink` fails.
    pub fn copy_entry_contents(&mut self, sink: &mut impl Write) -> Result<u64> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0;
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(copied);
            }
            sink.write_all(&buf[..n])?;
            copied += n as u64;
        }
    }

    /// Close the reader, dropping the source if the reader owns it.
    pub fn close(&mut self) {
        self.buffer.close_reader();
        self.state = State::EndOfArchive;
        self.current = None;
    }

    /// Consume the reader and return the source, unless `close()` dropped it.
    pub fn into_inner(self) -> Option<R> {
        self.buffer.into_inner()
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn read_header(&mut self) -> Result<HeaderOutcome> {
        let mut block = [0u8; BLOCK_SIZE];
        if !self.buffer.read_block(&mut block)? {
            return Ok(HeaderOutcome::EndOfArchive);
        }
        self.pos += BLOCK_SIZE as u64;

        if is_zero_block(&block) {
            // the marker is two zero blocks, but the second may be missing
            if self.buffer.skip_block()? {
                self.pos += BLOCK_SIZE as u64;
            }
            return Ok(HeaderOutcome::EndOfArchive);
        }

        let header = Header::decode(&block, self.encoding)?;
        if !header.is_checksum_valid() {
            return Err(FormatError::ChecksumMismatch {
                stored: header.checksum(),
                computed: compute_checksum(&block),
            }
            .into());
        }

        self.entry_size = header.size;
        self.entry_offset = 0;
        self.block_pos = BLOCK_SIZE;

        match header.type_flag {
            TypeFlag::GnuLongName => {
                let name = self.read_long_name()?;
                debug!("GNU long name {name:?}");
                self.pending.long_name = Some(name);
                Ok(HeaderOutcome::Extension)
            }
            TypeFlag::GnuLongLink => {
                let link = self.read_long_name()?;
                debug!("GNU long link {link:?}");
                self.pending.long_link = Some(link);
                Ok(HeaderOutcome::Extension)
            }
            TypeFlag::PaxExtended => {
                self.read_pax()?;
                Ok(HeaderOutcome::Extension)
            }
            TypeFlag::Regular | TypeFlag::Link | TypeFlag::Symlink | TypeFlag::Directory => {
                let mut entry = match &self.factory {
                    Some(factory) => factory(&block, self.encoding)?,
                    None => Entry::from_header(header),
                };
                if let Some(name) = self.pending.pax_path.take().or(self.pending.long_name.take()) {
                    entry.set_name(name);
                }
                if let Some(link) = self.pending.long_link.take() {
                    entry.set_link_name(link);
                }
                Ok(HeaderOutcome::Entry(entry))
            }
            other => {
                self.skip_entry_data()?;
                Ok(HeaderOutcome::Skip(other))
            }
        }
    }

    /// Read the payload of a GNU long name/link entry.
    fn read_long_name(&mut self) -> Result<String> {
        if self.entry_size > self.limits.max_gnu_long_size {
            return Err(FormatError::GnuLongTooLarge {
                size: self.entry_size,
                limit: self.limits.max_gnu_long_size,
            }
            .into());
        }
        let mut data = vec![0u8; self.entry_size as usize];
        self.read_entry_data(&mut data)?;
        self.skip_entry_data()?;
        Ok(self.encoding.decode(truncate_null(&data)))
    }

    /// Parse the payload of a PAX extended header.
    fn read_pax(&mut self) -> Result<()> {
        if self.entry_size > self.limits.max_pax_size {
            return Err(FormatError::PaxTooLarge {
                size: self.entry_size,
                limit: self.limits.max_pax_size,
            }
            .into());
        }
        let mut parser = ExtendedHeaderParser::new();
        let mut chunk = [0u8; BLOCK_SIZE];
        loop {
            let n = self.read_entry_data(&mut chunk)?;
            if n == 0 {
                break;
            }
            parser.feed(&chunk[..n])?;
        }
        self.skip_entry_data()?;

        let mut headers = parser.into_headers();
        if let Some(path) = headers.remove(PAX_PATH) {
            debug!("PAX path {path:?}");
            self.pending.pax_path = Some(path);
        }
        if !headers.is_empty() {
            debug!("ignoring PAX records {:?}", headers.keys().collect::<Vec<_>>());
        }
        Ok(())
    }

    /// Fill `buf` from the current entry's data, bounded by what is left.
    fn read_entry_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.entry_size - self.entry_offset;
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let mut done = 0;
        while done < want {
            if self.block_pos == BLOCK_SIZE {
                if !self.buffer.read_block(&mut self.block)? {
                    return Err(TarError::Truncated { pos: self.pos });
                }
                self.pos += BLOCK_SIZE as u64;
                self.block_pos = 0;
            }
            let n = (want - done).min(BLOCK_SIZE - self.block_pos);
            buf[done..done + n].copy_from_slice(&self.block[self.block_pos..self.block_pos + n]);
            self.block_pos += n;
            done += n;
        }
        self.entry_offset += done as u64;
        Ok(done)
    }

    /// Discard the rest of the current entry, padding included.
    fn skip_entry_data(&mut self) -> Result<()> {
        let remaining = self.entry_size - self.entry_offset;
        let buffered = (BLOCK_SIZE - self.block_pos) as u64;
        if remaining > buffered {
            let blocks = (remaining - buffered).div_ceil(BLOCK_SIZE as u64);
            for _ in 0..blocks {
                if !self.buffer.skip_block()? {
                    return Err(TarError::Truncated { pos: self.pos });
                }
                self.pos += BLOCK_SIZE as u64;
            }
        }
        self.entry_offset = self.entry_size;
        self.block_pos = BLOCK_SIZE;
        Ok(())
    }
}

impl<R: Read> Read for ArchiveReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state != State::InEntry {
            return Ok(0);
        }
        Ok(self.read_entry_data(buf)?)
    }
}
