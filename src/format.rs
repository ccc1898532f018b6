//! Compiles `%field%` format strings into filename matchers.
//!
//! A format such as `%artist% - %title%` becomes the anchored pattern
//! `^(.*) \- (.*)$` plus the field order `[artist, title]`. Placeholder names
//! are case-insensitive and literal text matches regardless of case, while
//! captured values keep the case they have in the filename.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};

pub const DELIMITER: char = '%';
pub const DEFAULT_FORMAT: &str = "%artist% - %title%";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Artist,
    Album,
    Genre,
    AlbumArtist,
    Composer,
    Date,
    TrackNumber,
    DiscNumber,
    Length,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Title,
        Field::Artist,
        Field::Album,
        Field::Genre,
        Field::AlbumArtist,
        Field::Composer,
        Field::Date,
        Field::TrackNumber,
        Field::DiscNumber,
        Field::Length,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Artist => "artist",
            Field::Album => "album",
            Field::Genre => "genre",
            Field::AlbumArtist => "albumartist",
            Field::Composer => "composer",
            Field::Date => "date",
            Field::TrackNumber => "tracknumber",
            Field::DiscNumber => "discnumber",
            Field::Length => "length",
        }
    }

    /// Whether a captured value can be written to the tag. `length` is
    /// recognized but comes from the audio stream, not the tag.
    pub fn is_implemented(self) -> bool {
        !matches!(self, Field::Length)
    }

    /// Check a captured value before anything is written.
    pub fn validate(self, value: &str) -> Result<()> {
        let valid = match self {
            Field::TrackNumber | Field::DiscNumber => parse_position(value).is_some(),
            _ => true,
        };
        if valid {
            Ok(())
        } else {
            Err(AppError::InvalidValue {
                field: self.name().to_owned(),
                value: value.to_owned(),
            })
        }
    }
}

/// Parse `N` or `N/M` as used by track and disc numbers.
pub fn parse_position(value: &str) -> Option<(u32, Option<u32>)> {
    let mut parts = value.trim().splitn(2, '/');
    let number = parts.next()?.trim().parse().ok()?;
    let total = match parts.next() {
        Some(total) => Some(total.trim().parse().ok()?),
        None => None,
    };
    Some((number, total))
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = AppError;

    fn from_str(name: &str) -> Result<Field> {
        let lower = name.to_lowercase();
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.name() == lower)
            .ok_or(AppError::UnknownField(lower))
    }
}

/// A compiled format: the placeholder fields in order of appearance and a
/// matcher with one capture group per placeholder.
#[derive(Debug, Clone)]
pub struct FormatSpec {
    fields: Vec<Field>,
    matcher: Regex,
    source: String,
}

impl FormatSpec {
    pub fn compile(format: &str) -> Result<FormatSpec> {
        let delimiters = format.matches(DELIMITER).count();
        if delimiters == 0 {
            return Err(AppError::InvalidFormat(format!(
                "'{}' has no %field% placeholders",
                format
            )));
        }
        if delimiters % 2 != 0 {
            return Err(AppError::InvalidFormat(format!(
                "'{}' has unbalanced '{}' delimiters",
                format, DELIMITER
            )));
        }

        let mut fields = Vec::new();
        let mut pattern = String::from("^");
        let mut source = String::new();

        // Splitting on the delimiter alternates literal text and placeholder names.
        for (index, part) in format.split(DELIMITER).enumerate() {
            if index % 2 == 0 {
                pattern.push_str(&regex::escape(part));
                source.push_str(part);
            } else {
                let field: Field = part.parse()?;
                fields.push(field);
                pattern.push_str("(.*)");
                source.push(DELIMITER);
                source.push_str(field.name());
                source.push(DELIMITER);
            }
        }
        pattern.push('$');

        let matcher = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
        debug_assert_eq!(matcher.captures_len(), fields.len() + 1);

        Ok(FormatSpec {
            fields,
            matcher,
            source,
        })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Fields that are recognized but cannot be written.
    pub fn unimplemented_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.iter().copied().filter(|f| !f.is_implemented())
    }

    /// Match a file stem and pair each captured value with its field.
    pub fn captures(&self, name: &str) -> Option<Vec<(Field, String)>> {
        let caps = self.matcher.captures(name)?;
        Some(
            self.fields
                .iter()
                .zip(caps.iter().skip(1))
                .map(|(field, m)| (*field, m.map_or("", |m| m.as_str()).to_string()))
                .collect(),
        )
    }
}

impl FromStr for FormatSpec {
    type Err = AppError;

    fn from_str(format: &str) -> Result<FormatSpec> {
        FormatSpec::compile(format)
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
