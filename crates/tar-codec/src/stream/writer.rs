//! Entry-by-entry writing of a tar stream.

use std::io::{self, Write};

use log::debug;

use crate::{
    buffer::BlockBuffer,
    entry::Entry,
    error::{FormatError, Result, UsageError},
    header::{Header, NameEncoding, TypeFlag, GNU_LONGLINK_NAME, GNU_MAGIC, NAME_LEN},
    BLOCK_SIZE,
};

/// Sequential writer producing a tar stream.
///
/// Each entry is started with [`put_entry`](Self::put_entry), receives
/// exactly `size` bytes through [`write`](Self::write), and is completed by
/// [`close_entry`](Self::close_entry). Directories and empty files need no
/// data. [`finish`](Self::finish) appends the end-of-archive marker.
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    buffer: BlockBuffer<W>,
    encoding: NameEncoding,
    /// Data not yet making up a whole block.
    assembly: [u8; BLOCK_SIZE],
    assembly_len: usize,
    current_name: String,
    current_size: u64,
    current_bytes: u64,
    finished: bool,
}

impl<W: Write> ArchiveWriter<W> {
    /// Write to `sink` with the default block factor and UTF-8 names.
    pub fn new(sink: W) -> Self {
        Self::from_buffer(BlockBuffer::writer(sink), NameEncoding::default())
    }

    /// Write to `sink` with a custom block factor and name encoding.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `block_factor` is zero.
    pub fn with_options(sink: W, block_factor: usize, encoding: NameEncoding) -> Result<Self> {
        let buffer = BlockBuffer::open_for_write(sink, block_factor)?;
        Ok(Self::from_buffer(buffer, encoding))
    }

    fn from_buffer(buffer: BlockBuffer<W>, encoding: NameEncoding) -> Self {
        Self {
            buffer,
            encoding,
            assembly: [0u8; BLOCK_SIZE],
            assembly_len: 0,
            current_name: String::new(),
            current_size: 0,
            current_bytes: 0,
            finished: false,
        }
    }

    /// Choose whether finishing the archive drops the sink.
    pub fn set_stream_owner(&mut self, owner: bool) {
        self.buffer.set_stream_owner(owner);
    }

    /// Size of one record in bytes.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.buffer.record_size()
    }

    /// Whether the current entry still expects data.
    #[must_use]
    pub fn is_entry_open(&self) -> bool {
        self.current_bytes < self.current_size || self.assembly_len > 0
    }

    /// Write the header for `entry`.
    ///
    /// A name whose encoded form exceeds the 100-byte field is preceded by a
    /// GNU long name entry carrying it in full. Directory entries are always
    /// written with a size of zero.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::EntryStillOpen`] if the previous entry hasn't
    /// received all of its data, and fails on I/O errors.
    pub fn put_entry(&mut self, entry: &Entry) -> Result<()> {
        if self.current_bytes < self.current_size {
            return Err(UsageError::EntryStillOpen(self.current_name.clone()).into());
        }
        if self.assembly_len > 0 {
            self.close_entry()?;
        }

        let mut header = entry.header().clone();
        if entry.is_directory() {
            header.size = 0;
        }

        let name_len = self.encoding.byte_len(&header.name);
        if name_len > NAME_LEN {
            self.write_long_name(&header, name_len)?;
        }
        self.buffer.write_block(&header.encode(self.encoding))?;

        self.current_name = header.name;
        self.current_size = header.size;
        self.current_bytes = 0;
        Ok(())
    }

    fn write_long_name(&mut self, header: &Header, name_len: usize) -> Result<()> {
        debug!("writing GNU long name for {:?}", header.name);
        let long = Header {
            name: GNU_LONGLINK_NAME.into(),
            mode: 0o644,
            uid: header.uid,
            gid: header.gid,
            size: name_len as u64 + 1,
            type_flag: TypeFlag::GnuLongName,
            magic: *GNU_MAGIC,
            version: *b" \0",
            user_name: header.user_name.clone(),
            group_name: header.group_name.clone(),
            ..Header::default()
        };
        self.buffer.write_block(&long.encode(self.encoding))?;

        let mut payload = self.encoding.encode(&header.name).into_owned();
        payload.push(0);
        for chunk in payload.chunks(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            self.buffer.write_block(&block)?;
        }
        Ok(())
    }

    /// Write data for the current entry.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::WriteBeyondSize`] if `data` doesn't fit in what
    /// remains of the declared size; nothing is written in that case.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        let remaining = self.current_size - self.current_bytes;
        if data.len() as u64 > remaining {
            return Err(UsageError::WriteBeyondSize {
                name: self.current_name.clone(),
                requested: data.len(),
                remaining,
            }
            .into());
        }
        self.current_bytes += data.len() as u64;

        if self.assembly_len > 0 {
            let n = data.len().min(BLOCK_SIZE - self.assembly_len);
            self.assembly[self.assembly_len..self.assembly_len + n].copy_from_slice(&data[..n]);
            self.assembly_len += n;
            data = &data[n..];
            if self.assembly_len < BLOCK_SIZE {
                return Ok(());
            }
            self.buffer.write_block(&self.assembly)?;
            self.assembly_len = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_SIZE);
        for block in &mut blocks {
            self.buffer.write_block(block)?;
        }
        let rest = blocks.remainder();
        self.assembly[..rest.len()].copy_from_slice(rest);
        self.assembly_len = rest.len();
        Ok(())
    }

    /// Complete the current entry, padding its last block with zeros.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::EntryIncomplete`] if fewer bytes were written
    /// than the header declared.
    pub fn close_entry(&mut self) -> Result<()> {
        if self.current_bytes < self.current_size {
            return Err(FormatError::EntryIncomplete {
                name: self.current_name.clone(),
                written: self.current_bytes,
                expected: self.current_size,
            }
            .into());
        }
        if self.assembly_len > 0 {
            self.assembly[self.assembly_len..].fill(0);
            self.buffer.write_block(&self.assembly)?;
            self.assembly_len = 0;
        }
        Ok(())
    }

    /// Close any open entry and write the end-of-archive marker.
    ///
    /// Calling this more than once has no further effect.
    ///
    /// # Errors
    ///
    /// Fails if the open entry is incomplete, and on I/O errors.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if self.is_entry_open() {
            self.close_entry()?;
        }
        self.buffer.close()?;
        self.finished = true;
        Ok(())
    }

    /// Consume the writer and return the sink, unless `finish()` dropped it.
    pub fn into_inner(self) -> Option<W> {
        self.buffer.into_inner()
    }
}

impl<W: Write> Write for ArchiveWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ArchiveWriter::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
