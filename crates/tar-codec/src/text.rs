//! Line-ending translation for text entries.
//!
//! Both directions treat "\r\n", a lone '\r' and '\n' as line endings.
//! Extraction rewrites them to the platform line ending, archiving to a bare
//! '\n'.

use std::io::{self, Read, Write};

/// How many leading bytes decide whether content is binary.
pub(crate) const SAMPLE_SIZE: usize = 4096;

#[cfg(windows)]
const LINE_ENDING: &[u8] = b"\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &[u8] = b"\n";

/// Whether `sample` looks like binary content.
///
/// Only the first [`SAMPLE_SIZE`] bytes are examined. Bytes 0-7, 14-31 and
/// 255 never appear in text.
pub(crate) fn is_binary(sample: &[u8]) -> bool {
    sample
        .iter()
        .take(SAMPLE_SIZE)
        .any(|&b| b < 8 || (14..32).contains(&b) || b == 255)
}

/// Read up to [`SAMPLE_SIZE`] bytes from `source`.
pub(crate) fn read_sample(source: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    source.take(SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

/// Writer replacing line endings with the platform's.
///
/// A "\r\n" pair split across two writes is still recognised. Call
/// [`finish`](Self::finish) to emit the ending for a '\r' held back for that.
pub(crate) struct PlatformLineWriter<W: Write> {
    inner: W,
    ending: &'static [u8],
    pending_cr: bool,
}

impl<W: Write> PlatformLineWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self::with_ending(inner, LINE_ENDING)
    }

    fn with_ending(inner: W, ending: &'static [u8]) -> Self {
        Self {
            inner,
            ending,
            pending_cr: false,
        }
    }

    /// Flush held back bytes and return the inner writer.
    pub(crate) fn finish(mut self) -> io::Result<W> {
        if self.pending_cr {
            self.inner.write_all(self.ending)?;
            self.pending_cr = false;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for PlatformLineWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        if self.pending_cr && !rest.is_empty() {
            self.pending_cr = false;
            self.inner.write_all(self.ending)?;
            if rest[0] == b'\n' {
                rest = &rest[1..];
            }
        }
        while let Some(i) = rest.iter().position(|&b| b == b'\n' || b == b'\r') {
            self.inner.write_all(&rest[..i])?;
            match rest.get(i..i + 2) {
                Some(b"\r\n") => rest = &rest[i + 2..],
                // may be the first half of a pair
                None if rest[i] == b'\r' => {
                    self.pending_cr = true;
                    return Ok(buf.len());
                }
                _ => rest = &rest[i + 1..],
            }
            self.inner.write_all(self.ending)?;
        }
        self.inner.write_all(rest)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Copy `source` to `sink`, ending every line with a bare '\n'.
///
/// "\r\n", a lone '\r' and '\n' all end a line, and a final line without an
/// ending gets one. Returns the number of bytes written.
pub(crate) fn copy_with_unix_newlines(
    source: &mut impl Read,
    sink: &mut impl Write,
) -> io::Result<u64> {
    let mut buf = vec![0u8; 32 * 1024];
    let mut out = Vec::with_capacity(buf.len());
    let mut written = 0;
    let mut prev_cr = false;
    let mut last = None;

    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.clear();
        for &b in &buf[..n] {
            match b {
                b'\r' => out.push(b'\n'),
                b'\n' if prev_cr => {}
                _ => out.push(b),
            }
            prev_cr = b == b'\r';
        }
        if let Some(&b) = out.last() {
            last = Some(b);
        }
        sink.write_all(&out)?;
        written += out.len() as u64;
    }

    if last.is_some_and(|b| b != b'\n') {
        sink.write_all(b"\n")?;
        written += 1;
    }
    Ok(written)
}
