use serde::{Deserialize, Serialize};

/// A decoded reply to a [`Command`](crate::Command).
///
/// Each data line of the reply is split into fields. For the ASCII protocol
/// fields are space separated; for the AT protocol they are comma separated
/// with the `+VERB: ` prefix removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    verb: String,
    lines: Vec<Vec<String>>,
    raw: String,
}

impl Reply {
    pub fn new(verb: impl Into<String>, lines: Vec<Vec<String>>, raw: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            lines,
            raw: raw.into(),
        }
    }

    /// Verb of the command this reply answers.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// All data lines, split into fields.
    pub fn lines(&self) -> &[Vec<String>] {
        &self.lines
    }

    /// Fields of the first data line (empty for a bare `OK`).
    pub fn fields(&self) -> &[String] {
        self.lines.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Get field of the first data line by index
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields().get(index).map(String::as_str)
    }

    /// Reply text as received, terminators included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}
