//! Heading-delimited section slicing.
//!
//! A section is addressed by up to three literal headings: a numbered
//! title (`4. Descripción ...`), a numbered start sub-heading
//! (`4.1. ...`) and a numbered end sub-heading. Lookup walks a fixed
//! ladder and reports which rung produced the text, so callers can tell a
//! located section from a whole-document fallback.

use regex::Regex;
use serde::Serialize;

use crate::error::ExtractError;
use crate::patterns::SectionPattern;

/// Which rung of the lookup ladder produced a [`SectionMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionOutcome {
    /// No heading was requested; the whole text is returned.
    WholeText,
    /// Start and end sub-headings were both found.
    Bounded,
    /// Only the start sub-heading was found.
    OpenEnded,
    /// The title was found but the start sub-heading was not.
    TitleWindow,
    /// Nothing matched; the whole text is returned.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionMatch {
    pub text: String,
    pub outcome: SectionOutcome,
}

impl SectionMatch {
    /// True unless the locator gave up and returned the whole text.
    pub fn is_located(&self) -> bool {
        self.outcome != SectionOutcome::Fallback
    }
}

/// Builds the case-insensitive heading regex for a literal heading.
///
/// Titles are numbered `N.`; sub-headings are numbered `N.M.`.
pub fn heading_regex(literal: &str, sub_heading: bool) -> Result<Regex, ExtractError> {
    let literal = literal.trim();
    let number = if sub_heading { r"\d+\.\d+\." } else { r"\d+\." };
    // A trailing boundary only makes sense after a word character.
    let tail = match literal.chars().last() {
        Some(c) if c.is_alphanumeric() || c == '_' => r"\b",
        _ => "",
    };
    let pattern = format!(r"(?i)\b{}\s*{}{}", number, regex::escape(literal), tail);
    Regex::new(&pattern).map_err(|source| ExtractError::Pattern {
        name: literal.to_string(),
        source,
    })
}

/// A [`SectionPattern`] with its headings compiled.
#[derive(Debug, Clone)]
pub struct SectionLocator {
    title: Option<Regex>,
    start: Option<Regex>,
    end: Option<Regex>,
}

impl SectionLocator {
    pub fn new(pattern: &SectionPattern) -> Result<Self, ExtractError> {
        Ok(Self {
            title: compile(pattern.title.as_deref(), false)?,
            start: compile(pattern.start.as_deref(), true)?,
            end: compile(pattern.end.as_deref(), true)?,
        })
    }

    pub fn locate(&self, text: &str) -> SectionMatch {
        if self.title.is_none() && self.start.is_none() && self.end.is_none() {
            return matched(text, SectionOutcome::WholeText);
        }

        let window = match self.title.as_ref().and_then(|re| re.find(text)) {
            Some(m) => Some(&text[m.end()..]),
            None => None,
        };
        let search_in = window.unwrap_or(text);

        if let Some(start) = self.start.as_ref().and_then(|re| re.find(search_in)) {
            let rest = &search_in[start.end()..];
            if let Some(end) = self.end.as_ref().and_then(|re| re.find(rest)) {
                return matched(&rest[..end.start()], SectionOutcome::Bounded);
            }
            return matched(rest, SectionOutcome::OpenEnded);
        }

        match window {
            Some(w) => matched(w, SectionOutcome::TitleWindow),
            None => matched(text, SectionOutcome::Fallback),
        }
    }
}

fn compile(literal: Option<&str>, sub_heading: bool) -> Result<Option<Regex>, ExtractError> {
    literal
        .filter(|l| !l.trim().is_empty())
        .map(|l| heading_regex(l, sub_heading))
        .transpose()
}

fn matched(text: &str, outcome: SectionOutcome) -> SectionMatch {
    SectionMatch {
        text: text.trim().to_string(),
        outcome,
    }
}

/// One-shot lookup; compiles the pattern on every call.
pub fn locate_section(text: &str, pattern: &SectionPattern) -> Result<SectionMatch, ExtractError> {
    Ok(SectionLocator::new(pattern)?.locate(text))
}

/// Removes every line that contains `needle`.
pub fn drop_lines_containing(text: &str, needle: &str) -> String {
    text.lines()
        .filter(|l| !l.contains(needle))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
