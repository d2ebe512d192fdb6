use metra_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical request to the reader: a verb plus ordered parameters.
///
/// How the command looks on the wire depends on the [`FrameCodec`] in use.
///
/// # Example
///
/// ```
/// use metra_protocol::Command;
///
/// let cmd = Command::new("SRI").param("SS").param(100);
/// assert_eq!(cmd.verb(), "SRI");
/// assert_eq!(cmd.params(), ["SS", "100"]);
/// ```
///
/// [`FrameCodec`]: crate::FrameCodec
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    verb: String,
    params: Vec<String>,
}

impl Command {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            params: Vec::new(),
        }
    }

    /// Append one parameter.
    #[must_use]
    pub fn param(mut self, param: impl ToString) -> Self {
        self.params.push(param.to_string());
        self
    }

    /// Append several parameters in order.
    #[must_use]
    pub fn params_from<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.params
            .extend(params.into_iter().map(|p| p.to_string()));
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Check that the command can be put on the wire.
    ///
    /// # Errors
    /// Returns `Error::InvalidCommand` for an empty verb or for a verb or
    /// parameter containing a line terminator.
    pub fn validate(&self) -> Result<()> {
        if self.verb.is_empty() {
            return Err(Error::InvalidCommand("verb must not be empty".to_string()));
        }

        let has_terminator = |s: &str| s.contains(['\r', '\n']);
        if has_terminator(&self.verb) || self.params.iter().any(|p| has_terminator(p)) {
            return Err(Error::InvalidCommand(format!(
                "{} contains a line terminator",
                self.verb.escape_debug()
            )));
        }

        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.verb)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        Ok(())
    }
}
