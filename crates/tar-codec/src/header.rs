//! Encoding and decoding of 512-byte tar header blocks.
//!
//! The on-disk block is described by [`UstarHeader`], a zerocopy view over
//! the raw bytes. [`Header`] is the decoded value: names as strings, numeric
//! fields as integers, and the checksum validity as plain data.
//!
//! Numeric fields are stored as octal ASCII, right-justified, zero-padded and
//! NUL-terminated. Values too large for their field use the GNU binary form
//! instead: the high bit of the first byte is set and the remaining bytes hold
//! the value in big-endian order.

use std::{borrow::Cow, fmt};

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::{
    error::{FormatError, Result},
    BLOCK_SIZE,
};

/// Magic string for POSIX ustar headers ("ustar\0").
pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// Version field for POSIX ustar headers ("00").
pub const USTAR_VERSION: &[u8; 2] = b"00";

/// Magic string for GNU tar headers ("ustar ").
pub const GNU_MAGIC: &[u8; 6] = b"ustar ";

/// Width of the name field.
pub const NAME_LEN: usize = 100;

/// Name used for the synthetic entry carrying a GNU long name.
pub const GNU_LONGLINK_NAME: &str = "././@LongLink";

const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

// ============================================================================
// Raw Header Layout
// ============================================================================

/// Byte layout of a ustar header block.
///
/// See the crate documentation for the field table. GNU headers share the
/// layout up to `prefix`, which GNU tar reuses for other purposes.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct UstarHeader {
    /// File path name (null-terminated if shorter than 100 bytes).
    pub name: [u8; 100],
    /// File mode in octal ASCII.
    pub mode: [u8; 8],
    /// Owner user ID.
    pub uid: [u8; 8],
    /// Owner group ID.
    pub gid: [u8; 8],
    /// File size.
    pub size: [u8; 12],
    /// Modification time as Unix timestamp.
    pub mtime: [u8; 12],
    /// Header checksum in octal ASCII.
    pub checksum: [u8; 8],
    /// Entry type flag.
    pub typeflag: u8,
    /// Link target name for hard/symbolic links.
    pub linkname: [u8; 100],
    /// Magic string identifying the format.
    pub magic: [u8; 6],
    /// Format version.
    pub version: [u8; 2],
    /// Owner user name (null-terminated).
    pub uname: [u8; 32],
    /// Owner group name (null-terminated).
    pub gname: [u8; 32],
    /// Device major number (for special files).
    pub devmajor: [u8; 8],
    /// Device minor number (for special files).
    pub devminor: [u8; 8],
    /// Path prefix for names longer than 100 bytes.
    pub prefix: [u8; 155],
    /// Padding to fill the 512-byte block.
    pub pad: [u8; 12],
}

impl fmt::Debug for UstarHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UstarHeader")
            .field("name", &String::from_utf8_lossy(truncate_null(&self.name)))
            .field("mode", &String::from_utf8_lossy(truncate_null(&self.mode)))
            .field("typeflag", &self.typeflag)
            .field("magic", &self.magic)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Type Flag
// ============================================================================

/// The kind of archive member, stored as one ASCII byte in the header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TypeFlag {
    /// Regular file (type '0', or '\0' in old archives).
    #[default]
    Regular,
    /// Hard link to another member of the archive (type '1').
    Link,
    /// Symbolic link (type '2').
    Symlink,
    /// Character device (type '3').
    Char,
    /// Block device (type '4').
    Block,
    /// Directory (type '5').
    Directory,
    /// FIFO/named pipe (type '6').
    Fifo,
    /// Contiguous file (type '7').
    Contiguous,
    /// GNU long name for the following entry (type 'L').
    GnuLongName,
    /// GNU long link target for the following entry (type 'K').
    GnuLongLink,
    /// PAX extended header for the following entry (type 'x').
    PaxExtended,
    /// PAX global extended header (type 'g').
    PaxGlobal,
    /// GNU volume header (type 'V').
    GnuVolumeHeader,
    /// Anything else.
    Other(u8),
}

impl TypeFlag {
    /// Parse a type flag from its raw byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' | b'\0' => TypeFlag::Regular,
            b'1' => TypeFlag::Link,
            b'2' => TypeFlag::Symlink,
            b'3' => TypeFlag::Char,
            b'4' => TypeFlag::Block,
            b'5' => TypeFlag::Directory,
            b'6' => TypeFlag::Fifo,
            b'7' => TypeFlag::Contiguous,
            b'L' => TypeFlag::GnuLongName,
            b'K' => TypeFlag::GnuLongLink,
            b'x' => TypeFlag::PaxExtended,
            b'g' => TypeFlag::PaxGlobal,
            b'V' => TypeFlag::GnuVolumeHeader,
            other => TypeFlag::Other(other),
        }
    }

    /// The raw byte for this type flag.
    ///
    /// `Regular` is always written as '0'.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            TypeFlag::Regular => b'0',
            TypeFlag::Link => b'1',
            TypeFlag::Symlink => b'2',
            TypeFlag::Char => b'3',
            TypeFlag::Block => b'4',
            TypeFlag::Directory => b'5',
            TypeFlag::Fifo => b'6',
            TypeFlag::Contiguous => b'7',
            TypeFlag::GnuLongName => b'L',
            TypeFlag::GnuLongLink => b'K',
            TypeFlag::PaxExtended => b'x',
            TypeFlag::PaxGlobal => b'g',
            TypeFlag::GnuVolumeHeader => b'V',
            TypeFlag::Other(b) => b,
        }
    }

    /// Returns true for hard and symbolic links.
    #[must_use]
    pub fn is_link(self) -> bool {
        matches!(self, TypeFlag::Link | TypeFlag::Symlink)
    }

    /// Returns true for character and block devices.
    #[must_use]
    pub fn is_device(self) -> bool {
        matches!(self, TypeFlag::Char | TypeFlag::Block)
    }
}

impl From<u8> for TypeFlag {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl From<TypeFlag> for u8 {
    fn from(flag: TypeFlag) -> Self {
        flag.to_byte()
    }
}

// ============================================================================
// Name Encoding
// ============================================================================

/// Character encoding used for names stored in headers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NameEncoding {
    /// UTF-8; invalid sequences decode to U+FFFD.
    #[default]
    Utf8,
    /// ISO-8859-1, one byte per character; characters above U+00FF encode
    /// as '?'.
    Latin1,
}

impl NameEncoding {
    /// Decode a name field.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            NameEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            NameEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }

    /// Encode a name.
    #[must_use]
    pub fn encode(self, name: &str) -> Cow<'_, [u8]> {
        match self {
            NameEncoding::Utf8 => Cow::Borrowed(name.as_bytes()),
            NameEncoding::Latin1 => Cow::Owned(
                name.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect(),
            ),
        }
    }

    /// Length of `name` in bytes once encoded.
    #[must_use]
    pub fn byte_len(self, name: &str) -> usize {
        match self {
            NameEncoding::Utf8 => name.len(),
            NameEncoding::Latin1 => name.chars().count(),
        }
    }

    /// Write `name` into a fixed-size field, truncating at a character
    /// boundary if it doesn't fit. The rest of the field is left untouched.
    fn encode_into(self, name: &str, field: &mut [u8]) {
        let encoded = self.encode(name);
        let mut end = encoded.len().min(field.len());
        if self == NameEncoding::Utf8 {
            while !name.is_char_boundary(end) {
                end -= 1;
            }
        }
        field[..end].copy_from_slice(&encoded[..end]);
    }
}

// ============================================================================
// Header Value
// ============================================================================

/// A decoded tar header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Entry name; includes the ustar prefix when one was present.
    pub name: String,
    /// Mode bits (permissions plus any file type bits).
    pub mode: u32,
    /// Owner user ID.
    pub uid: u64,
    /// Owner group ID.
    pub gid: u64,
    /// Size of the entry data in bytes.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: u64,
    /// Kind of entry.
    pub type_flag: TypeFlag,
    /// Link target for hard and symbolic links.
    pub link_name: String,
    /// Format magic.
    pub magic: [u8; 6],
    /// Format version.
    pub version: [u8; 2],
    /// Owner user name.
    pub user_name: String,
    /// Owner group name.
    pub group_name: String,
    /// Device major number.
    pub dev_major: u32,
    /// Device minor number.
    pub dev_minor: u32,
    pub(crate) checksum: u64,
    pub(crate) checksum_valid: bool,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            mtime: 0,
            type_flag: TypeFlag::Regular,
            link_name: String::new(),
            magic: *USTAR_MAGIC,
            version: *USTAR_VERSION,
            user_name: String::new(),
            group_name: String::new(),
            dev_major: 0,
            dev_minor: 0,
            checksum: 0,
            checksum_valid: false,
        }
    }
}

impl Header {
    /// Decode a header block.
    ///
    /// An invalid checksum is not an error here: it is reported by
    /// [`is_checksum_valid`](Self::is_checksum_valid).
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::BlockLength`] unless `bytes` is exactly one
    /// block, and [`FormatError::InvalidOctal`] for malformed numeric fields.
    pub fn decode(bytes: &[u8], encoding: NameEncoding) -> Result<Header> {
        let raw = UstarHeader::ref_from_bytes(bytes)
            .map_err(|_| FormatError::BlockLength(bytes.len()))?;

        let stored = parse_octal(&raw.checksum).ok();
        let computed = compute_checksum(bytes);

        let mut name = encoding.decode(truncate_null(&raw.name));
        if raw.magic == *USTAR_MAGIC {
            let prefix = truncate_null(&raw.prefix);
            if !prefix.is_empty() {
                name = format!("{}/{name}", encoding.decode(prefix));
            }
        }

        // Old-style headers have garbage after the link name
        let extended = raw.magic[..5] == USTAR_MAGIC[..5];
        let (user_name, group_name, dev_major, dev_minor) = if extended {
            (
                encoding.decode(truncate_null(&raw.uname)),
                encoding.decode(truncate_null(&raw.gname)),
                parse_u32(&raw.devmajor)?,
                parse_u32(&raw.devminor)?,
            )
        } else {
            (String::new(), String::new(), 0, 0)
        };

        Ok(Header {
            name,
            mode: parse_u32(&raw.mode)?,
            uid: parse_numeric(&raw.uid)?,
            gid: parse_numeric(&raw.gid)?,
            size: parse_numeric(&raw.size)?,
            mtime: parse_numeric(&raw.mtime)?,
            type_flag: TypeFlag::from_byte(raw.typeflag),
            link_name: encoding.decode(truncate_null(&raw.linkname)),
            magic: raw.magic,
            version: raw.version,
            user_name,
            group_name,
            dev_major,
            dev_minor,
            checksum: stored.unwrap_or(0),
            checksum_valid: stored == Some(computed),
        })
    }

    /// Encode this header into a block, computing the checksum.
    ///
    /// Names longer than their field are truncated; callers that need the
    /// full name emit an extension header first.
    #[must_use]
    pub fn encode(&self, encoding: NameEncoding) -> [u8; BLOCK_SIZE] {
        let mut raw = UstarHeader::new_zeroed();
        encoding.encode_into(&self.name, &mut raw.name);
        encode_octal(u64::from(self.mode), &mut raw.mode);
        encode_numeric(self.uid, &mut raw.uid);
        encode_numeric(self.gid, &mut raw.gid);
        encode_numeric(self.size, &mut raw.size);
        encode_numeric(self.mtime, &mut raw.mtime);
        raw.typeflag = self.type_flag.to_byte();
        encoding.encode_into(&self.link_name, &mut raw.linkname);
        raw.magic = self.magic;
        raw.version = self.version;
        encoding.encode_into(&self.user_name, &mut raw.uname);
        encoding.encode_into(&self.group_name, &mut raw.gname);
        if self.type_flag.is_device() {
            encode_octal(u64::from(self.dev_major), &mut raw.devmajor);
            encode_octal(u64::from(self.dev_minor), &mut raw.devminor);
        }

        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(raw.as_bytes());
        let checksum = compute_checksum(&block);
        block[CHECKSUM_RANGE].fill(b' ');
        // six digits and a NUL, keeping the trailing space
        encode_octal(checksum, &mut block[148..155]);
        block
    }

    /// The checksum stored in the header this value was decoded from.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    /// Whether the stored checksum matched the header bytes when decoded.
    ///
    /// Always false for a header that was built rather than decoded.
    #[must_use]
    pub fn is_checksum_valid(&self) -> bool {
        self.checksum_valid
    }

    /// Whether the magic identifies a POSIX ustar header.
    #[must_use]
    pub fn is_ustar(&self) -> bool {
        self.magic == *USTAR_MAGIC
    }
}

// ============================================================================
// Field Codecs
// ============================================================================

/// Parse an octal ASCII field.
///
/// Leading spaces and NULs are skipped, and the digits end at the first NUL
/// or space. An empty field is zero.
///
/// # Errors
///
/// Returns [`FormatError::InvalidOctal`] for any other character, or if the
/// value overflows.
pub fn parse_octal(bytes: &[u8]) -> Result<u64> {
    let start = bytes
        .iter()
        .position(|&b| b != b' ' && b != b'\0')
        .unwrap_or(bytes.len());
    let end = bytes[start..]
        .iter()
        .position(|&b| b == b' ' || b == b'\0')
        .map_or(bytes.len(), |i| start + i);

    let mut value: u64 = 0;
    for &byte in &bytes[start..end] {
        if !(b'0'..=b'7').contains(&byte) {
            return Err(FormatError::InvalidOctal(bytes.to_vec()).into());
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(byte - b'0')))
            .ok_or_else(|| FormatError::InvalidOctal(bytes.to_vec()))?;
    }
    Ok(value)
}

/// Parse a numeric field that may be octal ASCII or GNU binary.
///
/// When the high bit of the first byte is set, the remaining bits are a
/// big-endian binary integer.
///
/// # Errors
///
/// Returns [`FormatError::InvalidOctal`] if octal parsing fails or a binary
/// value doesn't fit in 64 bits.
pub fn parse_numeric(bytes: &[u8]) -> Result<u64> {
    match bytes.first() {
        Some(first) if first & 0x80 != 0 => {
            let mut value: u64 = 0;
            for (i, &byte) in bytes.iter().enumerate() {
                let b = if i == 0 { byte & 0x7f } else { byte };
                value = value
                    .checked_mul(256)
                    .and_then(|v| v.checked_add(u64::from(b)))
                    .ok_or_else(|| FormatError::InvalidOctal(bytes.to_vec()))?;
            }
            Ok(value)
        }
        _ => parse_octal(bytes),
    }
}

/// Parse a numeric field that must fit in 32 bits.
fn parse_u32(bytes: &[u8]) -> Result<u32> {
    let value = parse_numeric(bytes)?;
    u32::try_from(value).map_err(|_| FormatError::InvalidOctal(bytes.to_vec()).into())
}

/// Write `value` as `field.len() - 1` zero-padded octal digits and a NUL.
///
/// Digits that don't fit are silently dropped from the high end.
pub fn encode_octal(mut value: u64, field: &mut [u8]) {
    let Some((nul, digits)) = field.split_last_mut() else {
        return;
    };
    *nul = 0;
    for digit in digits.iter_mut().rev() {
        *digit = b'0' + (value & 7) as u8;
        value >>= 3;
    }
}

/// Write `value` in octal if it fits, and in GNU binary form otherwise.
pub fn encode_numeric(value: u64, field: &mut [u8]) {
    let digits = field.len().saturating_sub(1);
    if digits >= 22 || value >> (3 * digits) == 0 {
        encode_octal(value, field);
        return;
    }
    field.fill(0);
    field[0] = 0x80;
    let bytes = value.to_be_bytes();
    let width = (field.len() - 1).min(bytes.len());
    let start = field.len() - width;
    field[start..].copy_from_slice(&bytes[bytes.len() - width..]);
}

/// Sum of all header bytes with the checksum field counted as spaces.
#[must_use]
pub fn compute_checksum(block: &[u8]) -> u64 {
    block
        .iter()
        .enumerate()
        .map(|(i, &byte)| {
            if CHECKSUM_RANGE.contains(&i) {
                u64::from(b' ')
            } else {
                u64::from(byte)
            }
        })
        .sum()
}

/// Whether the checksum stored in `block` matches its contents.
#[must_use]
pub fn verify_checksum(block: &[u8]) -> bool {
    block.len() == BLOCK_SIZE
        && parse_octal(&block[CHECKSUM_RANGE]).ok() == Some(compute_checksum(block))
}

/// Whether every byte of `block` is zero.
#[must_use]
pub fn is_zero_block(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Truncate a byte slice at the first NUL.
#[must_use]
pub fn truncate_null(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(pos) => &bytes[..pos],
        None => bytes,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::TarError;

    fn sample() -> Header {
        Header {
            name: "docs/readme.txt".into(),
            mode: 0o100644,
            uid: 1000,
            gid: 100,
            size: 6,
            mtime: 1_234_567_890,
            user_name: "alice".into(),
            group_name: "users".into(),
            ..Header::default()
        }
    }

    // =========================================================================
    // Numeric fields
    // =========================================================================

    #[test]
    fn test_encode_octal() {
        let mut field = [0xffu8; 8];
        encode_octal(0, &mut field);
        assert_eq!(&field, b"0000000\0");
        encode_octal(511, &mut field);
        assert_eq!(&field, b"0000777\0");
        assert_eq!(parse_octal(&field).unwrap(), 511);
    }

    #[test]
    fn test_encode_octal_truncates_high_digits() {
        let mut field = [0u8; 4];
        encode_octal(0o12345, &mut field);
        assert_eq!(&field, b"345\0");
    }

    #[test]
    fn test_parse_octal_padding() {
        assert_eq!(parse_octal(b"0000644\0").unwrap(), 0o644);
        assert_eq!(parse_octal(b"     123 ").unwrap(), 0o123);
        assert_eq!(parse_octal(b"\0\0\0\0644 \0").unwrap(), 0o644);
        assert_eq!(parse_octal(b"\0\0\0\0\0\0\0\0").unwrap(), 0);
        assert_eq!(parse_octal(b"").unwrap(), 0);
    }

    #[test]
    fn test_parse_octal_invalid() {
        assert!(matches!(
            parse_octal(b"0000789\0"),
            Err(TarError::Format(FormatError::InvalidOctal(_)))
        ));
        assert!(parse_octal(b"12a4").is_err());
    }

    #[test]
    fn test_size_binary_fallback() {
        let size = 0o77777777777u64 + 1;
        let mut field = [0u8; 12];
        encode_numeric(size, &mut field);
        assert_eq!(field[0], 0x80);
        assert_eq!(parse_numeric(&field).unwrap(), size);

        encode_numeric(0o77777777777, &mut field);
        assert_eq!(&field, b"77777777777\0");
    }

    #[test]
    fn test_parse_numeric_binary() {
        let mut field = [0u8; 8];
        field[0] = 0x80;
        field[6] = 0x01;
        field[7] = 0x00;
        assert_eq!(parse_numeric(&field).unwrap(), 256);
    }

    #[test]
    fn test_mode_out_of_range() {
        let mut block = sample().encode(NameEncoding::Utf8);
        block[100..108].copy_from_slice(&[0x80, 0, 0, 1, 0, 0, 0, 0]);
        let stored = compute_checksum(&block);
        encode_octal(stored, &mut block[148..155]);
        assert!(matches!(
            Header::decode(&block, NameEncoding::Utf8),
            Err(TarError::Format(FormatError::InvalidOctal(_)))
        ));
    }

    // =========================================================================
    // Header blocks
    // =========================================================================

    #[test]
    fn test_roundtrip() {
        let header = sample();
        let block = header.encode(NameEncoding::Utf8);
        let decoded = Header::decode(&block, NameEncoding::Utf8).unwrap();
        assert!(decoded.is_checksum_valid());
        assert_eq!(decoded.name, header.name);
        assert_eq!(decoded.mode, header.mode);
        assert_eq!(decoded.uid, header.uid);
        assert_eq!(decoded.gid, header.gid);
        assert_eq!(decoded.size, header.size);
        assert_eq!(decoded.mtime, header.mtime);
        assert_eq!(decoded.type_flag, TypeFlag::Regular);
        assert_eq!(decoded.user_name, "alice");
        assert_eq!(decoded.group_name, "users");
        assert!(decoded.is_ustar());
    }

    #[test]
    fn test_checksum_layout() {
        let block = sample().encode(NameEncoding::Utf8);
        assert_eq!(block[154], 0);
        assert_eq!(block[155], b' ');
        let stored = parse_octal(&block[148..156]).unwrap();
        assert_eq!(stored, compute_checksum(&block));
        assert!(verify_checksum(&block));
    }

    #[test]
    fn test_flipped_byte_invalidates_checksum() {
        let mut block = sample().encode(NameEncoding::Utf8);
        block[3] ^= 0x01;
        let decoded = Header::decode(&block, NameEncoding::Utf8).unwrap();
        assert!(!decoded.is_checksum_valid());
    }

    #[test]
    fn test_wrong_length() {
        assert!(matches!(
            Header::decode(&[0u8; 511], NameEncoding::Utf8),
            Err(TarError::Format(FormatError::BlockLength(511)))
        ));
    }

    #[test]
    fn test_name_truncated() {
        let header = Header {
            name: "a".repeat(150),
            ..Header::default()
        };
        let block = header.encode(NameEncoding::Utf8);
        let decoded = Header::decode(&block, NameEncoding::Utf8).unwrap();
        assert_eq!(decoded.name, "a".repeat(100));
    }

    #[test]
    fn test_name_truncated_at_char_boundary() {
        // 99 ASCII bytes followed by a two-byte character
        let header = Header {
            name: format!("{}é", "a".repeat(99)),
            ..Header::default()
        };
        let block = header.encode(NameEncoding::Utf8);
        let decoded = Header::decode(&block, NameEncoding::Utf8).unwrap();
        assert_eq!(decoded.name, "a".repeat(99));
    }

    #[test]
    fn test_ustar_prefix() {
        let mut block = Header {
            name: "file.txt".into(),
            ..Header::default()
        }
        .encode(NameEncoding::Utf8);
        block[345..349].copy_from_slice(b"some");
        let decoded = Header::decode(&block, NameEncoding::Utf8).unwrap();
        assert_eq!(decoded.name, "some/file.txt");
        assert!(!decoded.is_checksum_valid());
    }

    #[test]
    fn test_gnu_magic_ignores_prefix() {
        let header = Header {
            name: "file.txt".into(),
            magic: *GNU_MAGIC,
            version: *b" \0",
            user_name: "root".into(),
            ..Header::default()
        };
        let mut block = header.encode(NameEncoding::Utf8);
        block[345..349].copy_from_slice(b"1234");
        let decoded = Header::decode(&block, NameEncoding::Utf8).unwrap();
        assert_eq!(decoded.name, "file.txt");
        assert_eq!(decoded.user_name, "root");
    }

    #[test]
    fn test_device_numbers() {
        let header = Header {
            name: "dev/null".into(),
            type_flag: TypeFlag::Char,
            dev_major: 1,
            dev_minor: 3,
            ..Header::default()
        };
        let block = header.encode(NameEncoding::Utf8);
        let decoded = Header::decode(&block, NameEncoding::Utf8).unwrap();
        assert_eq!((decoded.dev_major, decoded.dev_minor), (1, 3));

        // not written for other types
        let block = Header {
            dev_major: 1,
            ..sample()
        }
        .encode(NameEncoding::Utf8);
        assert!(block[329..345].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_latin1_names() {
        let header = Header {
            name: "caf\u{e9}".into(),
            ..Header::default()
        };
        let block = header.encode(NameEncoding::Latin1);
        assert_eq!(&block[..5], b"caf\xe9\0");
        let decoded = Header::decode(&block, NameEncoding::Latin1).unwrap();
        assert_eq!(decoded.name, "caf\u{e9}");
        assert_eq!(NameEncoding::Latin1.byte_len("caf\u{e9}"), 4);
        assert_eq!(NameEncoding::Utf8.byte_len("caf\u{e9}"), 5);
        assert_eq!(NameEncoding::Latin1.encode("\u{263a}").as_ref(), &b"?"[..]);
    }

    #[test]
    fn test_type_flag_bytes() {
        for byte in [b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'L', b'K', b'x', b'g', b'V', b'Z'] {
            assert_eq!(TypeFlag::from_byte(byte).to_byte(), byte);
        }
        assert_eq!(TypeFlag::from_byte(b'\0'), TypeFlag::Regular);
        assert_eq!(TypeFlag::from_byte(b'Z'), TypeFlag::Other(b'Z'));
    }

    // =========================================================================
    // Cross-checks against the tar crate
    // =========================================================================

    #[test]
    fn test_decode_tar_rs_header() {
        let mut theirs = tar::Header::new_ustar();
        theirs.set_path("some/dir/file.bin").unwrap();
        theirs.set_mode(0o755);
        theirs.set_uid(4242);
        theirs.set_gid(99);
        theirs.set_size(123_456);
        theirs.set_mtime(1_700_000_000);
        theirs.set_entry_type(tar::EntryType::Regular);
        theirs.set_username("bob").unwrap();
        theirs.set_cksum();

        let decoded = Header::decode(theirs.as_bytes(), NameEncoding::Utf8).unwrap();
        assert!(decoded.is_checksum_valid());
        assert_eq!(decoded.name, "some/dir/file.bin");
        assert_eq!(decoded.mode, 0o755);
        assert_eq!(decoded.uid, 4242);
        assert_eq!(decoded.gid, 99);
        assert_eq!(decoded.size, 123_456);
        assert_eq!(decoded.mtime, 1_700_000_000);
        assert_eq!(decoded.user_name, "bob");
    }

    #[test]
    fn test_tar_rs_reads_our_header() {
        let block = sample().encode(NameEncoding::Utf8);
        let mut theirs = tar::Header::new_old();
        theirs.as_mut_bytes().copy_from_slice(&block);
        let stored = theirs.cksum().unwrap();
        theirs.set_cksum();
        assert_eq!(theirs.cksum().unwrap(), stored);
        assert_eq!(theirs.path().unwrap().to_str(), Some("docs/readme.txt"));
        assert_eq!(theirs.size().unwrap(), 6);
        assert_eq!(theirs.mode().unwrap(), 0o100644);
        assert_eq!(theirs.username().unwrap(), Some("alice"));
    }

    proptest! {
        #[test]
        fn proptest_roundtrip(
            name in "[a-zA-Z0-9_./-]{1,100}",
            mode in 0u32..0o7777777,
            uid in 0u64..0o7777777,
            gid in 0u64..0o7777777,
            size in any::<u64>(),
            mtime in 0u64..(1 << 40),
        ) {
            let header = Header { name: name.clone(), mode, uid, gid, size, mtime, ..Header::default() };
            let block = header.encode(NameEncoding::Utf8);
            let decoded = Header::decode(&block, NameEncoding::Utf8).unwrap();
            prop_assert!(decoded.is_checksum_valid());
            prop_assert_eq!(decoded.name, name);
            prop_assert_eq!(decoded.mode, mode);
            prop_assert_eq!(decoded.uid, uid);
            prop_assert_eq!(decoded.gid, gid);
            prop_assert_eq!(decoded.size, size);
            prop_assert_eq!(decoded.mtime, mtime);
        }

        #[test]
        fn proptest_flip_detected(index in 0usize..BLOCK_SIZE - 8, bit in 0u8..8) {
            // skip over the checksum field itself
            let index = if index >= 148 { index + 8 } else { index };
            let mut block = sample().encode(NameEncoding::Utf8);
            block[index] ^= 1 << bit;
            prop_assert!(!verify_checksum(&block));
        }
    }
}
