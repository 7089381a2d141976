//! Incremental parser for PAX extended header records.
//!
//! A PAX extended header entry (type 'x') carries records of the form
//! `"<length> <key>=<value>\n"`. The payload arrives block by block, so the
//! parser is fed arbitrary slices and keeps its state between calls,
//! including a partial UTF-8 character cut off at the end of a slice.

use std::collections::BTreeMap;

use crate::error::{FormatError, Result};

/// PAX key carrying the path of the following entry.
pub const PAX_PATH: &str = "path";

/// PAX key carrying the link target of the following entry.
pub const PAX_LINKPATH: &str = "linkpath";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingLength,
    ReadingKey,
    ReadingValue,
}

/// State machine accumulating PAX records into a key/value map.
///
/// Duplicate keys overwrite earlier values. The length prefix of each record
/// is only checked for being decimal; the `=` and newline delimiters decide
/// where keys and values end.
#[derive(Debug)]
pub struct ExtendedHeaderParser {
    state: State,
    key: String,
    value: String,
    headers: BTreeMap<String, String>,
    carry: [u8; 4],
    carry_len: usize,
}

impl Default for ExtendedHeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtendedHeaderParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::ReadingLength,
            key: String::new(),
            value: String::new(),
            headers: BTreeMap::new(),
            carry: [0; 4],
            carry_len: 0,
        }
    }

    /// Feed the next slice of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::MalformedPax`] if a record's length field
    /// contains something other than decimal digits.
    pub fn feed(&mut self, mut data: &[u8]) -> Result<()> {
        // finish a character split by the previous slice
        while self.carry_len > 0 && !data.is_empty() {
            self.carry[self.carry_len] = data[0];
            self.carry_len += 1;
            data = &data[1..];
            match std::str::from_utf8(&self.carry[..self.carry_len]) {
                Ok(s) => {
                    let c = s.chars().next().unwrap_or(char::REPLACEMENT_CHARACTER);
                    self.carry_len = 0;
                    self.push(c)?;
                }
                Err(e) if e.error_len().is_some() || self.carry_len == self.carry.len() => {
                    self.carry_len = 0;
                    self.push(char::REPLACEMENT_CHARACTER)?;
                }
                Err(_) => {}
            }
        }

        while !data.is_empty() {
            match std::str::from_utf8(data) {
                Ok(s) => {
                    self.push_str(s)?;
                    data = &[];
                }
                Err(e) => {
                    let (valid, rest) = data.split_at(e.valid_up_to());
                    self.push_str(std::str::from_utf8(valid).unwrap_or_default())?;
                    match e.error_len() {
                        Some(len) => {
                            self.push(char::REPLACEMENT_CHARACTER)?;
                            data = &rest[len..];
                        }
                        None => {
                            self.carry[..rest.len()].copy_from_slice(rest);
                            self.carry_len = rest.len();
                            data = &[];
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn push_str(&mut self, s: &str) -> Result<()> {
        s.chars().try_for_each(|c| self.push(c))
    }

    fn push(&mut self, c: char) -> Result<()> {
        match self.state {
            State::ReadingLength => match c {
                ' ' => self.state = State::ReadingKey,
                '0'..='9' | '\0' => {}
                other => {
                    return Err(FormatError::MalformedPax(format!(
                        "unexpected {other:?} in record length"
                    ))
                    .into())
                }
            },
            State::ReadingKey => match c {
                '=' => self.state = State::ReadingValue,
                c => self.key.push(c),
            },
            State::ReadingValue => match c {
                '\n' => {
                    let key = std::mem::take(&mut self.key);
                    let value = std::mem::take(&mut self.value);
                    self.headers.insert(key, value);
                    self.state = State::ReadingLength;
                }
                c => self.value.push(c),
            },
        }
        Ok(())
    }

    /// The records parsed so far.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Consume the parser, returning the parsed records.
    #[must_use]
    pub fn into_headers(self) -> BTreeMap<String, String> {
        self.headers
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::TarError;

    fn parse(data: &[u8]) -> BTreeMap<String, String> {
        let mut parser = ExtendedHeaderParser::new();
        parser.feed(data).unwrap();
        parser.into_headers()
    }

    #[test]
    fn test_single_record() {
        let headers = parse(b"30 path=some/very/long/name\n");
        assert_eq!(headers.get(PAX_PATH).map(String::as_str), Some("some/very/long/name"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_multiple_records() {
        let headers = parse(b"20 mtime=1234567890\n12 uid=1000\n19 linkpath=target\n");
        assert_eq!(headers["mtime"], "1234567890");
        assert_eq!(headers["uid"], "1000");
        assert_eq!(headers[PAX_LINKPATH], "target");
    }

    #[test]
    fn test_duplicate_key_overwrites() {
        let headers = parse(b"11 path=a\n11 path=b\n");
        assert_eq!(headers[PAX_PATH], "b");
    }

    #[test]
    fn test_value_with_equals_and_spaces() {
        let headers = parse(b"23 comment=a = b c d\n");
        assert_eq!(headers["comment"], "a = b c d");
    }

    #[test]
    fn test_split_across_feeds() {
        let data = b"30 path=some/very/long/name\n13 uid=12345\n";
        for split in 0..data.len() {
            let mut parser = ExtendedHeaderParser::new();
            parser.feed(&data[..split]).unwrap();
            parser.feed(&data[split..]).unwrap();
            let headers = parser.into_headers();
            assert_eq!(headers[PAX_PATH], "some/very/long/name");
            assert_eq!(headers["uid"], "12345");
        }
    }

    #[test]
    fn test_multibyte_split_across_feeds() {
        let data = "22 path=\u{65e5}\u{672c}/\u{1f600}\n".as_bytes();
        for split in 0..data.len() {
            let mut parser = ExtendedHeaderParser::new();
            parser.feed(&data[..split]).unwrap();
            parser.feed(&data[split..]).unwrap();
            assert_eq!(parser.headers()[PAX_PATH], "\u{65e5}\u{672c}/\u{1f600}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let data = "19 path=caf\u{e9}/x\n".as_bytes();
        let mut parser = ExtendedHeaderParser::new();
        for byte in data {
            parser.feed(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(parser.headers()[PAX_PATH], "caf\u{e9}/x");
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let headers = parse(b"13 path=a\xffb\n");
        assert_eq!(headers[PAX_PATH], "a\u{fffd}b");
    }

    #[test]
    fn test_malformed_length() {
        let mut parser = ExtendedHeaderParser::new();
        assert!(matches!(
            parser.feed(b"1x path=a\n"),
            Err(TarError::Format(FormatError::MalformedPax(_)))
        ));
    }

    #[test]
    fn test_incomplete_record_not_stored() {
        let headers = parse(b"30 path=unterminated");
        assert!(headers.is_empty());
    }
}
