//! Block and record buffering over a byte stream.
//!
//! Tar moves data in 512-byte blocks, and traditionally issues its I/O a
//! record (a fixed number of blocks) at a time. [`BlockBuffer`] hides the
//! record boundaries from the layers above: they only ever read or write one
//! block at a time.

use std::io::{self, ErrorKind, Read, Write};

use log::{debug, trace};

use crate::{
    error::{FormatError, Result, UsageError},
    BLOCK_SIZE, DEFAULT_BLOCK_FACTOR,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

/// Fixed-size block buffering over a byte source or sink.
///
/// A buffer is opened either for reading or for writing, and stays that way.
/// The stream type only needs to implement [`Read`] or [`Write`] for the
/// operations that use it, but a stream implementing both (a [`File`], a
/// [`Cursor`]) is still refused by operations of the other direction.
///
/// When the buffer is the stream owner (the default), [`close`] drops the
/// stream. Otherwise the stream stays available through [`into_inner`].
///
/// [`File`]: std::fs::File
/// [`Cursor`]: std::io::Cursor
/// [`close`]: BlockBuffer::close
/// [`into_inner`]: BlockBuffer::into_inner
#[derive(Debug)]
pub struct BlockBuffer<S> {
    stream: Option<S>,
    direction: Direction,
    record: Vec<u8>,
    block_factor: usize,
    /// Next block to be handed out (read) or filled (write) in `record`.
    current_block: usize,
    /// Records transferred to or from the stream so far.
    records: u64,
    /// Blocks in `record` holding data from the stream.
    valid_blocks: usize,
    exhausted: bool,
    owns_stream: bool,
    closed: bool,
}

impl<S> BlockBuffer<S> {
    fn new(stream: S, direction: Direction, block_factor: usize) -> Result<Self> {
        if block_factor == 0 {
            return Err(UsageError::InvalidBlockFactor.into());
        }
        Ok(Self::with_factor(stream, direction, block_factor))
    }

    fn with_factor(stream: S, direction: Direction, block_factor: usize) -> Self {
        Self {
            stream: Some(stream),
            direction,
            record: vec![0u8; block_factor * BLOCK_SIZE],
            block_factor,
            current_block: 0,
            records: 0,
            valid_blocks: 0,
            exhausted: false,
            owns_stream: true,
            closed: false,
        }
    }

    /// Number of blocks per record.
    #[must_use]
    pub fn block_factor(&self) -> usize {
        self.block_factor
    }

    /// Size of one record in bytes.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.record.len()
    }

    /// Index of the next block within the current record.
    #[must_use]
    pub fn current_block(&self) -> usize {
        self.current_block
    }

    /// Number of records read from or written to the stream so far.
    #[must_use]
    pub fn current_record(&self) -> u64 {
        self.records
    }

    /// Whether [`close`](Self::close) drops the underlying stream.
    #[must_use]
    pub fn is_stream_owner(&self) -> bool {
        self.owns_stream
    }

    /// Choose whether [`close`](Self::close) drops the underlying stream.
    pub fn set_stream_owner(&mut self, owner: bool) {
        self.owns_stream = owner;
    }

    /// Whether the buffer has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Consume the buffer and return the stream, unless `close()` released it.
    ///
    /// No data is flushed: call [`close`](Self::close) first on a write
    /// buffer.
    pub fn into_inner(self) -> Option<S> {
        self.stream
    }

    fn check(&self, direction: Direction) -> Result<()> {
        if self.closed {
            return Err(UsageError::Closed.into());
        }
        match (self.direction, direction) {
            (Direction::Write, Direction::Read) => Err(UsageError::NotReadable.into()),
            (Direction::Read, Direction::Write) => Err(UsageError::NotWritable.into()),
            _ => Ok(()),
        }
    }
}

impl<R: Read> BlockBuffer<R> {
    /// Open a buffer reading records of `block_factor` blocks from `source`.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `block_factor` is zero.
    pub fn open_for_read(source: R, block_factor: usize) -> Result<Self> {
        Self::new(source, Direction::Read, block_factor)
    }

    /// Open a read buffer with the default block factor.
    pub fn reader(source: R) -> Self {
        Self::with_factor(source, Direction::Read, DEFAULT_BLOCK_FACTOR)
    }

    /// Read the next block into `block`.
    ///
    /// Returns `Ok(false)` at the end of the stream. A stream that ends in the
    /// middle of a record is not an error: the whole blocks that did arrive
    /// are handed out before the end is reported. A trailing partial block is
    /// dropped, so data cut off inside it reads as missing.
    ///
    /// # Errors
    ///
    /// Fails if `block` isn't exactly one block long, if the buffer was opened
    /// for writing or is closed, or on I/O errors.
    pub fn read_block(&mut self, block: &mut [u8]) -> Result<bool> {
        self.check(Direction::Read)?;
        if block.len() != BLOCK_SIZE {
            return Err(FormatError::BlockLength(block.len()).into());
        }
        if !self.next_block()? {
            return Ok(false);
        }
        let offset = self.current_block * BLOCK_SIZE;
        block.copy_from_slice(&self.record[offset..offset + BLOCK_SIZE]);
        self.current_block += 1;
        Ok(true)
    }

    /// Skip the next block without copying it.
    ///
    /// Returns `Ok(false)` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Fails if the buffer was opened for writing or is closed, or on I/O
    /// errors.
    pub fn skip_block(&mut self) -> Result<bool> {
        self.check(Direction::Read)?;
        if !self.next_block()? {
            return Ok(false);
        }
        self.current_block += 1;
        Ok(true)
    }

    /// Make sure `current_block` points at a block holding stream data.
    fn next_block(&mut self) -> Result<bool> {
        if self.current_block < self.valid_blocks {
            return Ok(true);
        }
        self.read_record()
    }

    fn read_record(&mut self) -> Result<bool> {
        self.current_block = 0;
        self.valid_blocks = 0;
        if self.exhausted {
            return Ok(false);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(UsageError::Closed.into());
        };
        let filled = read_fully(stream, &mut self.record)?;
        if filled < self.record.len() {
            self.exhausted = true;
            if filled % BLOCK_SIZE != 0 {
                debug!(
                    "discarding {} trailing bytes of a partial block",
                    filled % BLOCK_SIZE
                );
            }
        }
        self.valid_blocks = filled / BLOCK_SIZE;
        if self.valid_blocks == 0 {
            return Ok(false);
        }
        self.records += 1;
        trace!(
            "read record {} ({filled} bytes, {} blocks)",
            self.records - 1,
            self.valid_blocks
        );
        Ok(true)
    }
}

impl<W: Write> BlockBuffer<W> {
    /// Open a buffer writing records of `block_factor` blocks to `sink`.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `block_factor` is zero.
    pub fn open_for_write(sink: W, block_factor: usize) -> Result<Self> {
        Self::new(sink, Direction::Write, block_factor)
    }

    /// Open a write buffer with the default block factor.
    pub fn writer(sink: W) -> Self {
        Self::with_factor(sink, Direction::Write, DEFAULT_BLOCK_FACTOR)
    }

    /// Append one block, writing the record out once it is full.
    ///
    /// # Errors
    ///
    /// Fails if `block` isn't exactly one block long, if the buffer was opened
    /// for reading or is closed, or on I/O errors.
    pub fn write_block(&mut self, block: &[u8]) -> Result<()> {
        self.check(Direction::Write)?;
        if block.len() != BLOCK_SIZE {
            return Err(FormatError::BlockLength(block.len()).into());
        }
        let offset = self.current_block * BLOCK_SIZE;
        self.record[offset..offset + BLOCK_SIZE].copy_from_slice(block);
        self.current_block += 1;
        if self.current_block == self.block_factor {
            self.write_record()?;
        }
        Ok(())
    }

    fn write_record(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(UsageError::Closed.into());
        };
        stream.write_all(&self.record)?;
        trace!("wrote record {}", self.records);
        self.records += 1;
        self.current_block = 0;
        Ok(())
    }

    /// Flush any partial record and append the end-of-archive marker.
    ///
    /// A partial record is zero-padded to the full record size. Two zero
    /// blocks are then written straight to the sink, so an archive without
    /// entries is exactly two blocks long. Calling this more than once has no
    /// further effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer was opened for reading, or on I/O
    /// errors.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.direction == Direction::Write {
            if self.current_block > 0 {
                self.record[self.current_block * BLOCK_SIZE..].fill(0);
                self.write_record()?;
            }
            if let Some(stream) = self.stream.as_mut() {
                stream.write_all(&[0u8; 2 * BLOCK_SIZE])?;
                stream.flush()?;
            }
        }
        self.release();
        Ok(())
    }
}

impl<S> BlockBuffer<S> {
    /// Close a read buffer.
    ///
    /// Drops the source when the buffer owns it. Idempotent.
    pub fn close_reader(&mut self) {
        if !self.closed && self.direction == Direction::Read {
            self.release();
        }
    }

    fn release(&mut self) {
        self.closed = true;
        if self.owns_stream {
            self.stream = None;
        }
    }
}

/// Read until `buf` is full or the reader hits end of file.
///
/// Unlike [`Read::read_exact`] a short read is not an error; the number of
/// bytes actually read is returned instead.
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::TarError;

    fn block(fill: u8) -> [u8; BLOCK_SIZE] {
        [fill; BLOCK_SIZE]
    }

    #[test]
    fn test_empty_close_writes_marker() {
        let mut buffer = BlockBuffer::writer(Vec::new());
        buffer.set_stream_owner(false);
        buffer.close().unwrap();
        let data = buffer.into_inner().unwrap();
        assert_eq!(data.len(), 1024);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_partial_record_is_padded() {
        let mut buffer = BlockBuffer::open_for_write(Vec::new(), 2).unwrap();
        buffer.set_stream_owner(false);
        for fill in 1..=3 {
            buffer.write_block(&block(fill)).unwrap();
        }
        assert_eq!(buffer.current_record(), 1);
        assert_eq!(buffer.current_block(), 1);
        buffer.close().unwrap();
        let data = buffer.into_inner().unwrap();

        // two full records plus the end marker
        assert_eq!(data.len(), 2 * 1024 + 1024);
        assert!(data[..512].iter().all(|&b| b == 1));
        assert!(data[1024..1536].iter().all(|&b| b == 3));
        assert!(data[1536..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_full_record_written_eagerly() {
        let mut buffer = BlockBuffer::open_for_write(Vec::new(), 2).unwrap();
        buffer.set_stream_owner(false);
        buffer.write_block(&block(7)).unwrap();
        buffer.write_block(&block(8)).unwrap();
        assert_eq!(buffer.current_record(), 1);
        assert_eq!(buffer.current_block(), 0);
        buffer.close().unwrap();
        assert_eq!(buffer.into_inner().unwrap().len(), 1024 + 1024);
    }

    #[test]
    fn test_read_blocks_across_records() {
        let mut data = Vec::new();
        for fill in 1..=4u8 {
            data.extend_from_slice(&block(fill));
        }
        let mut buffer = BlockBuffer::open_for_read(Cursor::new(data), 3).unwrap();
        let mut buf = [0u8; BLOCK_SIZE];
        for fill in 1..=4u8 {
            assert!(buffer.read_block(&mut buf).unwrap());
            assert_eq!(buf[0], fill);
        }
        assert!(!buffer.read_block(&mut buf).unwrap());
        assert!(!buffer.read_block(&mut buf).unwrap());
        assert_eq!(buffer.current_record(), 2);
    }

    #[test]
    fn test_short_final_record_tolerated() {
        let mut data = block(9).to_vec();
        data.extend_from_slice(&block(8));
        let mut buffer = BlockBuffer::reader(Cursor::new(data));
        let mut buf = [0u8; BLOCK_SIZE];
        assert!(buffer.read_block(&mut buf).unwrap());
        assert_eq!(buf, block(9));
        assert!(buffer.read_block(&mut buf).unwrap());
        assert_eq!(buf, block(8));
        assert!(!buffer.read_block(&mut buf).unwrap());
    }

    #[test]
    fn test_partial_final_block_dropped() {
        let mut data = block(9).to_vec();
        data.extend_from_slice(&[5u8; 100]);
        let mut buffer = BlockBuffer::reader(Cursor::new(data));
        let mut buf = [0u8; BLOCK_SIZE];
        assert!(buffer.read_block(&mut buf).unwrap());
        assert_eq!(buf, block(9));
        assert!(!buffer.read_block(&mut buf).unwrap());

        // nothing but a partial block
        let mut buffer = BlockBuffer::reader(Cursor::new(vec![5u8; 100]));
        assert!(!buffer.read_block(&mut buf).unwrap());
    }

    #[test]
    fn test_skip_block() {
        let mut data = block(1).to_vec();
        data.extend_from_slice(&block(2));
        let mut buffer = BlockBuffer::reader(Cursor::new(data));
        assert!(buffer.skip_block().unwrap());
        let mut buf = [0u8; BLOCK_SIZE];
        assert!(buffer.read_block(&mut buf).unwrap());
        assert_eq!(buf[0], 2);
        assert!(!buffer.skip_block().unwrap());
    }

    #[test]
    fn test_wrong_direction() {
        let mut writer = BlockBuffer::writer(Cursor::new(Vec::new()));
        let mut buf = [0u8; BLOCK_SIZE];
        assert!(matches!(
            writer.read_block(&mut buf),
            Err(TarError::Usage(UsageError::NotReadable))
        ));

        let mut reader = BlockBuffer::reader(Cursor::new(Vec::new()));
        assert!(matches!(
            reader.write_block(&buf),
            Err(TarError::Usage(UsageError::NotWritable))
        ));
    }

    #[test]
    fn test_wrong_block_length() {
        let mut writer = BlockBuffer::writer(Vec::new());
        assert!(matches!(
            writer.write_block(&[0u8; 100]),
            Err(TarError::Format(FormatError::BlockLength(100)))
        ));

        let mut reader = BlockBuffer::reader(Cursor::new(vec![0u8; 512]));
        let mut buf = [0u8; 1024];
        assert!(matches!(
            reader.read_block(&mut buf),
            Err(TarError::Format(FormatError::BlockLength(1024)))
        ));
    }

    #[test]
    fn test_zero_block_factor() {
        assert!(matches!(
            BlockBuffer::open_for_write(Vec::new(), 0),
            Err(TarError::Usage(UsageError::InvalidBlockFactor))
        ));
    }

    #[test]
    fn test_close_ownership() {
        let mut owned = BlockBuffer::writer(Vec::new());
        assert!(owned.is_stream_owner());
        owned.close().unwrap();
        owned.close().unwrap();
        assert!(owned.is_closed());
        assert!(matches!(
            owned.write_block(&block(0)),
            Err(TarError::Usage(UsageError::Closed))
        ));
        assert!(owned.into_inner().is_none());

        let mut reader = BlockBuffer::reader(Cursor::new(Vec::new()));
        reader.set_stream_owner(false);
        reader.close_reader();
        assert!(reader.into_inner().is_some());
    }

    #[test]
    fn test_record_size() {
        let buffer = BlockBuffer::open_for_write(Vec::new(), 4).unwrap();
        assert_eq!(buffer.block_factor(), 4);
        assert_eq!(buffer.record_size(), 2048);
        assert_eq!(BlockBuffer::writer(Vec::new()).record_size(), 10240);
    }
}
