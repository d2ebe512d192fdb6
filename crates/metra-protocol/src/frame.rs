use bytes::Bytes;
use metra_core::constants::{CR, LF};
use std::borrow::Cow;
use std::fmt;

/// One terminator-delimited message received from a reader.
///
/// A frame holds the raw bytes between two terminators, without the
/// terminator itself. In CR framing mode a frame is a single line. In
/// end-of-frame mode the reader terminates a complete reply with LF, so a
/// frame may span several CR-separated lines:
///
/// ```text
/// CR mode:   HBT<CR>                       -> frame "HBT"
/// EOF mode:  3000AB<CR>3000AC<CR>IVF 02<CR><LF>
///                                          -> frame "3000AB\r3000AC\rIVF 02\r"
/// ```
///
/// # Example
///
/// ```
/// use metra_protocol::Frame;
///
/// let frame = Frame::from_string("3000AB\r3000AC\rIVF 02\r");
/// assert_eq!(frame.lines(), ["3000AB", "3000AC", "IVF 02"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    pub fn new(data: Bytes) -> Self {
        Frame { data }
    }

    /// Create a Frame from a byte slice
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }

    /// Create a Frame from a string (tests and simulators)
    pub fn from_string(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Frame content as text; the protocols are ASCII so this is lossless
    /// for anything the [`Framer`](crate::Framer) produces.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Non-empty lines of the frame, split on CR with stray LFs removed.
    pub fn lines(&self) -> Vec<String> {
        self.data
            .split(|&b| b == CR)
            .map(|line| {
                let line: Vec<u8> = line.iter().copied().filter(|&b| b != LF).collect();
                String::from_utf8_lossy(&line).into_owned()
            })
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// First non-empty line, used by classifiers to recognise event frames.
    pub fn first_line(&self) -> Option<String> {
        self.lines().into_iter().next()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text().escape_debug())
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Frame::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let frame = Frame::from_string("HBT");
        assert_eq!(frame.lines(), ["HBT"]);
        assert_eq!(frame.first_line().as_deref(), Some("HBT"));
        assert_eq!(frame.size(), 3);
    }

    #[test]
    fn test_lines_skip_empty_and_lf() {
        let frame = Frame::from_string("\nOK!\r\r\n");
        assert_eq!(frame.lines(), ["OK!"]);
    }

    #[test]
    fn test_display_escapes_terminators() {
        let frame = Frame::from_string("A\rB");
        assert_eq!(frame.to_string(), "A\\rB");
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::from_bytes(b"");
        assert!(frame.is_empty());
        assert!(frame.lines().is_empty());
        assert!(frame.first_line().is_none());
    }
}
