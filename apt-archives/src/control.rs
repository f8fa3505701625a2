// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! deb822 paragraph primitives.
//!
//! APT reads both its sources files and its preferences files in the deb822
//! format: paragraphs of `Name: value` fields separated by blank lines. See
//! `deb822(5)` and `apt_preferences(5)`.
//!
//! [ControlParagraph] is an ordered series of [ControlField]. Rendering is
//! deterministic: fields are emitted in insertion order, one per line.

use {
    crate::error::{ArchivesError, Result},
    std::{
        borrow::Cow,
        fmt::{Display, Formatter},
    },
};

/// A field in a deb822 paragraph.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: impl Into<Cow<'a, str>>, value: impl Into<Cow<'a, str>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Construct an instance whose value is a space delimited list of words.
    pub fn from_words(
        name: impl Into<Cow<'a, str>>,
        words: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let value = words
            .into_iter()
            .map(|w| w.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");

        Self::new(name, value)
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// The value of this field.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }
}

impl<'a> Display for ControlField<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}: {}", self.name, self.value)
    }
}

/// A paragraph in a deb822 file.
///
/// Field names are case insensitive on read and case preserving on set. A
/// paragraph holds at most one occurrence of each field.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Parse a single paragraph from a string.
    ///
    /// Comment lines (starting with `#`) are ignored. Content after the first
    /// paragraph is an error.
    pub fn parse_str(s: &str) -> Result<ControlParagraph<'static>> {
        let mut parser = ControlFileParser::default();
        let mut paragraph = None;

        for line in s.lines() {
            if let Some(p) = parser.write_line(line)? {
                if paragraph.replace(p).is_some() {
                    return Err(ArchivesError::ControlParse(
                        "expected a single paragraph".to_string(),
                    ));
                }
            }
        }

        if let Some(p) = parser.finish()? {
            if paragraph.replace(p).is_some() {
                return Err(ArchivesError::ControlParse(
                    "expected a single paragraph".to_string(),
                ));
            }
        }

        Ok(paragraph.unwrap_or_default())
    }

    /// Whether the paragraph lacks any fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field.
    ///
    /// An existing field with the same name (case insensitive compare) is replaced.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        self.fields
            .retain(|cf| !cf.name.eq_ignore_ascii_case(&field.name));
        self.fields.push(field);
    }

    /// Iterate over fields in insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with a given name.
    pub fn field(&self, name: &str) -> Option<&ControlField<'a>> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }
}

impl<'a> Display for ControlParagraph<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for field in &self.fields {
            field.fmt(f)?;
        }

        Ok(())
    }
}

impl<'a> FromIterator<ControlField<'a>> for ControlParagraph<'a> {
    fn from_iter<T: IntoIterator<Item = ControlField<'a>>>(iter: T) -> Self {
        let mut paragraph = Self::default();
        for field in iter {
            paragraph.set_field(field);
        }

        paragraph
    }
}

/// Holds parsing state for deb822 content.
///
/// Instances are fed lines of text and emit [ControlParagraph] instances as they
/// are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph is returned.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.starts_with('#') {
            return Ok(None);
        }

        let is_empty_line = line.trim().is_empty();
        let is_continuation = line.starts_with([' ', '\t']);

        let current_field = self.field.take();

        // Empty lines terminate a paragraph.
        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        self.field = match (current_field, is_continuation) {
            (Some(v), true) => Some(format!("{}\n{}", v, line)),
            (Some(v), false) => {
                self.flush_field(v)?;
                Some(line.to_string())
            }
            (None, _) => Some(line.to_string()),
        };

        Ok(None)
    }

    /// Finish parsing, returning any in-progress paragraph.
    pub fn finish(mut self) -> Result<Option<ControlParagraph<'static>>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, v: String) -> Result<()> {
        let (name, value) = v.split_once(':').ok_or_else(|| {
            ArchivesError::ControlParse(format!("error parsing line '{}'; missing colon", v))
        })?;

        self.paragraph.set_field(ControlField::new(
            name.trim().to_string(),
            value.trim().to_string(),
        ));

        Ok(())
    }
}
