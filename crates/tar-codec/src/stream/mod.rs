//! Sequential reading and writing of archive entries.
//!
//! [`ArchiveReader`] yields one [`Entry`](crate::Entry) per real archive
//! member and resolves the extension headers in front of it:
//!
//! - **GNU long name (type 'L')**: the name of the following entry
//! - **GNU long link (type 'K')**: the link target of the following entry
//! - **PAX extended header (type 'x')**: its `path` record names the
//!   following entry
//! - **PAX global header (type 'g')** and **GNU volume header (type 'V')**:
//!   skipped
//!
//! Entry types the reader doesn't handle are skipped as well. Extension
//! payloads are bounded by [`Limits`].
//!
//! [`ArchiveWriter`] is the inverse. Names longer than the 100-byte header
//! field are written with a preceding GNU long name entry, and every entry
//! must receive exactly as many data bytes as its header declares.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use tar_codec::stream::ArchiveReader;
//!
//! let mut reader = ArchiveReader::new(File::open("archive.tar").unwrap());
//! while let Some(entry) = reader.next_entry().unwrap() {
//!     println!("{} ({} bytes)", entry.name(), entry.size());
//! }
//! ```

mod limits;
mod reader;
mod writer;

pub use limits::Limits;
pub use reader::{ArchiveReader, EntryFactory};
pub use writer::ArchiveWriter;
