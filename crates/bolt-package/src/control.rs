//! The `Field: value` control block format.

use std::fmt::{self, Display, Formatter};

use crate::error::{PackageError, Result};

/// One package's control block.
///
/// Field lookup ignores ASCII case. Fields keep their insertion order, which is
/// the order they are written back out in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlMetadata {
    fields: Vec<(String, String)>,
}

impl ControlMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a single control block.
    ///
    /// Lines that start with whitespace are continuation lines of a multi-line
    /// field. They are dropped, so only the first line of each field survives.
    pub fn parse(text: &str) -> Result<Self> {
        let mut metadata = Self::new();

        for line in text.lines() {
            if line.trim().is_empty() || line.starts_with(char::is_whitespace) {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(PackageError::Control(format!(
                    "line without field separator: `{line}`"
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(PackageError::Control(format!(
                    "line without field name: `{line}`"
                )));
            }

            metadata.set(key, value.trim());
        }

        Ok(metadata)
    }

    /// Splits index text into its blank-line separated blocks.
    pub fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
        text.split("\n\n")
            .map(str::trim)
            .filter(|paragraph| !paragraph.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key` to `value`, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self
            .fields
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn package(&self) -> Option<&str> {
        self.get("Package")
    }

    pub fn version(&self) -> Option<&str> {
        self.get("Version")
    }

    /// Path of the package archive relative to the repository root.
    pub fn filename(&self) -> Option<&str> {
        self.get("Filename")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Display for ControlMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.fields {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL: &str = "\
Package: hello
Version: 2.12-1
Architecture: x86_64
Description: greets the world
 GNU hello prints a friendly greeting.
 .
 It is an example.
Installed-Size: 120
";

    #[test]
    fn test_parse_drops_continuation_lines() {
        let control = ControlMetadata::parse(CONTROL).unwrap();
        assert_eq!(control.package(), Some("hello"));
        assert_eq!(control.version(), Some("2.12-1"));
        assert_eq!(control.get("description"), Some("greets the world"));
        assert_eq!(control.get("Installed-Size"), Some("120"));
        assert_eq!(control.len(), 5);
    }

    #[test]
    fn test_display_preserves_order() {
        let mut control = ControlMetadata::parse("Package: a\nVersion: 1.0\n").unwrap();
        control.set("Filename", "pool/a_1.0_x86_64.bolt");
        control.set("Size", "10");
        control.set("version", "1.1");

        assert_eq!(
            control.to_string(),
            "Package: a\nVersion: 1.1\nFilename: pool/a_1.0_x86_64.bolt\nSize: 10\n"
        );
    }

    #[test]
    fn test_value_may_contain_colon() {
        let control = ControlMetadata::parse("Homepage: https://example.org\n").unwrap();
        assert_eq!(control.get("Homepage"), Some("https://example.org"));
    }

    #[test]
    fn test_line_without_separator_rejected() {
        assert!(ControlMetadata::parse("Package hello\n").is_err());
        assert!(ControlMetadata::parse(": value\n").is_err());
    }

    #[test]
    fn test_paragraphs() {
        let text = "Package: a\nVersion: 1\n\nPackage: b\nVersion: 2\n\n\n\nPackage: c\n";
        let blocks: Vec<_> = ControlMetadata::paragraphs(text).collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1], "Package: b\nVersion: 2");
    }
}
