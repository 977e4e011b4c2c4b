//! Diagnostic types for document parsing.
//!
//! Diagnostics carry non-fatal findings out of the fragment assembler so that the crawler can
//! report them without interrupting discovery. Anything fatal to a document is a
//! [crate::DtsError] instead.

/// A recoverable problem found while assembling a document, such as an element that looks like
/// a link but is not legal where it appears.
///
/// # Examples
///
/// ```
/// # use xbrl_dts::codec::ParseDiagnostic;
/// let warning = ParseDiagnostic::warning("link:loc ignored: a Locator must be a child of an extended link")
///     .with_location(12, 5);
/// assert_eq!(warning.location(), Some((12, 5)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParseDiagnostic {
    pub message: String,
    /// (line, column) of the element that caused the warning
    pub location: Option<(usize, usize)>,
}

impl ParseDiagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        ParseDiagnostic {
            message: message.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.location = Some((line, column));
        self
    }

    pub fn location(&self) -> Option<(usize, usize)> {
        self.location
    }
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.location {
            Some((line, column)) => write!(f, "Warning ({line}:{column}): {}", self.message),
            None => write!(f, "Warning: {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location() {
        assert_eq!(ParseDiagnostic::warning("w").to_string(), "Warning: w");
        let located = ParseDiagnostic::warning("w").with_location(3, 7);
        assert_eq!(located.to_string(), "Warning (3:7): w");
        assert_eq!(located.location(), Some((3, 7)));
    }
}
