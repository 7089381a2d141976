//! Reading, writing and extracting UNIX tar archives.
//!
//! This crate implements the tar binary format: 512-byte blocks grouped into
//! records, ustar headers with octal fields and a byte-sum checksum, plus the
//! GNU long-name/long-link and POSIX PAX extensions used to carry names that
//! don't fit the fixed 100-byte field.
//!
//! The crate is layered:
//!
//! - [`buffer::BlockBuffer`] moves whole blocks to and from a byte stream,
//!   a record at a time.
//! - [`header::Header`] encodes and decodes one header block.
//! - [`entry::Entry`] is one archive member: a header plus an optional
//!   backing file on disk.
//! - [`pax::ExtendedHeaderParser`] parses PAX `length key=value\n` records.
//! - [`stream::ArchiveReader`] and [`stream::ArchiveWriter`] iterate and
//!   produce entries, resolving the extension headers transparently.
//! - [`archive::TarExtractor`] and [`archive::TarBuilder`] work on whole
//!   directory trees, through the [`fs::FileSystem`] seam.
//!
//! # Header Field Layout
//!
//! | Offset | Size | Field     | Description                              |
//! |--------|------|-----------|------------------------------------------|
//! | 0      | 100  | name      | File path (null-terminated if < 100)     |
//! | 100    | 8    | mode      | File mode in octal ASCII                 |
//! | 108    | 8    | uid       | Owner user ID in octal ASCII             |
//! | 116    | 8    | gid       | Owner group ID in octal ASCII            |
//! | 124    | 12   | size      | File size in octal ASCII or binary       |
//! | 136    | 12   | mtime     | Modification time (Unix epoch, octal)    |
//! | 148    | 8    | checksum  | Header checksum in octal ASCII           |
//! | 156    | 1    | typeflag  | Entry type (see [`TypeFlag`])            |
//! | 157    | 100  | linkname  | Link target for hard/symbolic links      |
//! | 257    | 6    | magic     | "ustar\0"                                |
//! | 263    | 2    | version   | "00"                                     |
//! | 265    | 32   | uname     | Owner user name                          |
//! | 297    | 32   | gname     | Owner group name                         |
//! | 329    | 8    | devmajor  | Device major number                      |
//! | 337    | 8    | devminor  | Device minor number                      |
//! | 345    | 155  | prefix    | Path prefix for long names               |
//!
//! # Example
//!
//! ```
//! use std::io::{Cursor, Read};
//! use tar_codec::{ArchiveReader, ArchiveWriter, Entry};
//!
//! let mut data = Vec::new();
//! let mut writer = ArchiveWriter::new(&mut data);
//! let mut entry = Entry::new("hello.txt");
//! entry.set_size(5);
//! writer.put_entry(&entry).unwrap();
//! writer.write(b"hello").unwrap();
//! writer.close_entry().unwrap();
//! writer.finish().unwrap();
//! drop(writer);
//!
//! let mut reader = ArchiveReader::new(Cursor::new(data));
//! let entry = reader.next_entry().unwrap().unwrap();
//! assert_eq!(entry.name(), "hello.txt");
//! let mut content = String::new();
//! reader.read_to_string(&mut content).unwrap();
//! assert_eq!(content, "hello");
//! ```

pub mod archive;
pub mod buffer;
pub mod entry;
mod error;
pub mod fs;
pub mod header;
pub mod pax;
pub mod stream;
mod text;

#[cfg(any(test, feature = "test"))]
pub mod test;

pub use archive::{ArchiveOptions, Ownership, TarBuilder, TarExtractor};
pub use buffer::BlockBuffer;
pub use entry::Entry;
pub use error::{FormatError, Result, TarError, UsageError};
pub use header::{Header, NameEncoding, TypeFlag};
pub use stream::{ArchiveReader, ArchiveWriter, Limits};

/// Size of a tar block (and of a header) in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Number of blocks in one record unless configured otherwise.
pub const DEFAULT_BLOCK_FACTOR: usize = 20;

/// Size of a record with the default block factor.
pub const DEFAULT_RECORD_SIZE: usize = BLOCK_SIZE * DEFAULT_BLOCK_FACTOR;
