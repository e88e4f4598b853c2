//! Human-readable round and phase reports.

use serde::{Deserialize, Serialize};

/// Accumulated report text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Report {
    text: String,
}

impl Report {
    /// Create an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text without a line break.
    pub fn push(&mut self, text: impl AsRef<str>) {
        self.text.push_str(text.as_ref());
    }

    /// Append a line.
    pub fn line(&mut self, text: impl AsRef<str>) {
        self.text.push_str(text.as_ref());
        self.text.push('\n');
    }

    /// Append a section header underlined with dashes.
    pub fn header(&mut self, title: &str) {
        self.text.push('\n');
        self.line(title);
        self.line("-".repeat(title.len()));
    }

    /// Append another report.
    pub fn extend(&mut self, other: &Report) {
        self.text.push_str(&other.text);
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Report text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Take the text, leaving the report empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.text.clear();
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_lines() {
        let mut report = Report::new();
        assert!(report.is_empty());
        report.header("Heat Phase");
        report.push("Atlas gains 4 heat,");
        report.line(" sinks 4 heat.");
        assert_eq!(
            report.as_str(),
            "\nHeat Phase\n----------\nAtlas gains 4 heat, sinks 4 heat.\n"
        );
        let text = report.take();
        assert!(text.starts_with('\n'));
        assert!(report.is_empty());
    }
}
