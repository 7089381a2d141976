//! Resource limits applied while reading archives.

/// Limits on the extension headers an [`ArchiveReader`] accepts.
///
/// Extension payloads are buffered in memory before the entry they describe
/// is returned, so a hostile archive could otherwise declare gigabyte-sized
/// names.
///
/// # Example
///
/// ```
/// use tar_codec::stream::Limits;
///
/// let limits = Limits {
///     max_pax_size: 64 * 1024,
///     ..Default::default()
/// };
/// ```
///
/// [`ArchiveReader`]: super::ArchiveReader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a GNU long name/link payload in bytes.
    ///
    /// Default: 4096 bytes (Linux PATH_MAX).
    pub max_gnu_long_size: u64,

    /// Maximum size of one PAX extended header payload in bytes.
    ///
    /// Default: 1 MiB.
    pub max_pax_size: u64,

    /// Maximum number of consecutive extension headers before a real entry.
    ///
    /// Default: 16.
    pub max_pending_entries: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_gnu_long_size: 4096,
            max_pax_size: 1024 * 1024,
            max_pending_entries: 16,
        }
    }
}

impl Limits {
    /// Limits that accept anything; for trusted archives only.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            max_gnu_long_size: u64::MAX,
            max_pax_size: u64::MAX,
            max_pending_entries: usize::MAX,
        }
    }

    /// Conservative limits for untrusted archives.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_gnu_long_size: 1024,
            max_pax_size: 64 * 1024,
            max_pending_entries: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_gnu_long_size, 4096);
        assert_eq!(limits.max_pax_size, 1024 * 1024);
        assert_eq!(limits.max_pending_entries, 16);
    }

    #[test]
    fn test_strict_is_stricter() {
        let strict = Limits::strict();
        let default = Limits::default();
        assert!(strict.max_gnu_long_size < default.max_gnu_long_size);
        assert!(strict.max_pax_size < default.max_pax_size);
        assert!(Limits::permissive().max_pax_size > default.max_pax_size);
    }
}
