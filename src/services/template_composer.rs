//! Managed instruction document: named sections between marker lines, with
//! free text around them left alone.
//!
//! A section is written as
//!
//! ```text
//! <!-- packsync:begin ios -->
//! section content
//! <!-- packsync:end ios -->
//! ```
//!
//! Markers must each sit alone on a line. Unterminated or mismatched markers
//! are not errors; their lines simply count as user content.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use crate::domain::models::TemplateSection;

const MARKER_OPEN: &str = "<!-- packsync:";
const MARKER_CLOSE: &str = "-->";

/// Opening marker line for section `id`.
pub fn begin_marker(id: &str) -> String {
    format!("{MARKER_OPEN}begin {id} {MARKER_CLOSE}")
}

/// Closing marker line for section `id`.
pub fn end_marker(id: &str) -> String {
    format!("{MARKER_OPEN}end {id} {MARKER_CLOSE}")
}

/// A section recovered from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSection {
    /// Section id from the markers
    pub id: String,
    /// Text between the markers
    pub content: String,
}

/// Byte ranges of one recognized marker pair.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Span {
    id: String,
    /// Begin line start to end line end (newline included)
    outer: Range<usize>,
    /// Raw bytes between the two marker lines
    inner: Range<usize>,
    crlf: bool,
}

fn parse_marker<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let body = line
        .trim()
        .strip_prefix(MARKER_OPEN)?
        .strip_suffix(MARKER_CLOSE)?
        .trim_end()
        .strip_prefix(keyword)?
        .strip_prefix(' ')?
        .trim();
    (!body.is_empty() && !body.contains(char::is_whitespace)).then_some(body)
}

fn spans(document: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut open: Option<(String, usize, usize, bool)> = None;
    let mut offset = 0;

    for line in document.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        if let Some(id) = parse_marker(line, "begin") {
            // A begin inside an open section abandons the open one
            open = Some((id.to_string(), start, offset, line.ends_with("\r\n")));
            continue;
        }

        if let Some(id) = parse_marker(line, "end") {
            if let Some((open_id, outer_start, inner_start, crlf)) = open.take() {
                if open_id == id {
                    spans.push(Span {
                        id: open_id,
                        outer: outer_start..offset,
                        inner: inner_start..start,
                        crlf,
                    });
                } else {
                    open = Some((open_id, outer_start, inner_start, crlf));
                }
            }
        }
    }

    spans
}

fn inner_content(document: &str, span: &Span) -> String {
    let raw = &document[span.inner.clone()];
    let raw = raw.strip_suffix('\n').unwrap_or(raw);
    let raw = if span.crlf {
        raw.strip_suffix('\r').unwrap_or(raw)
    } else {
        raw
    };
    raw.to_string()
}

/// Every `{{NAME}}` placeholder appearing in `content`, in order, without duplicates.
pub fn placeholders_in(content: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = content;
    while let Some(open) = rest.find("{{") {
        rest = &rest[open + 2..];
        let Some(close) = rest.find("}}") else { break };
        let name = &rest[..close];
        if !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !found.iter().any(|f| f == name)
        {
            found.push(name.to_string());
        }
        rest = &rest[close + 2..];
    }
    found
}

/// Substitute the declared placeholders in one left-to-right pass, so text
/// coming from a value is never substituted again. Unresolved ones stay verbatim.
pub fn substitute(
    content: &str,
    placeholders: &[String],
    values: &BTreeMap<String, String>,
) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match values.get(name) {
            Some(value) if placeholders.iter().any(|p| p == name) => out.push_str(value),
            _ => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

/// A section with its placeholders resolved. The result declares none.
pub fn render_section(
    section: &TemplateSection,
    values: &BTreeMap<String, String>,
) -> TemplateSection {
    TemplateSection::new(
        section.id.clone(),
        substitute(&section.content, &section.placeholders, values),
    )
}

fn block(section: &TemplateSection, values: &BTreeMap<String, String>) -> String {
    let content = substitute(&section.content, &section.placeholders, values);
    format!("{}\n{content}\n{}", begin_marker(&section.id), end_marker(&section.id))
}

/// Compose a fresh document: the core section followed by one section per contribution.
pub fn compose(
    core: &TemplateSection,
    contributions: &[TemplateSection],
    values: &BTreeMap<String, String>,
) -> String {
    let blocks: Vec<String> = std::iter::once(core)
        .chain(contributions)
        .map(|section| block(section, values))
        .collect();
    format!("{}\n", blocks.join("\n\n"))
}

/// Sections in document order.
pub fn parse_sections(document: &str) -> Vec<ParsedSection> {
    spans(document)
        .iter()
        .map(|span| ParsedSection {
            id: span.id.clone(),
            content: inner_content(document, span),
        })
        .collect()
}

/// Whether `document` holds at least one well-formed section.
pub fn has_sections(document: &str) -> bool {
    !spans(document).is_empty()
}

/// All text outside recognized marker pairs, trimmed.
pub fn extract_user_content(document: &str) -> String {
    let mut user = String::new();
    let mut cursor = 0;
    for span in spans(document) {
        user.push_str(&document[cursor..span.outer.start]);
        cursor = span.outer.end;
    }
    user.push_str(&document[cursor..]);
    user.trim().to_string()
}

/// Delete the first section with `id`. Everything else stays byte-identical.
pub fn remove_section(document: &str, id: &str) -> String {
    match spans(document).into_iter().find(|span| span.id == id) {
        Some(span) => {
            let mut out = String::with_capacity(document.len());
            out.push_str(&document[..span.outer.start]);
            out.push_str(&document[span.outer.end..]);
            out
        }
        None => document.to_string(),
    }
}

/// Replace the content of sections present in `sections` in place, then
/// append the ones the document does not have yet. Sections not mentioned and
/// all user content are kept.
pub fn recompose(
    document: &str,
    core: &TemplateSection,
    contributions: &[TemplateSection],
    values: &BTreeMap<String, String>,
) -> String {
    let wanted: Vec<&TemplateSection> = std::iter::once(core).chain(contributions).collect();
    let by_id: BTreeMap<&str, &TemplateSection> =
        wanted.iter().map(|s| (s.id.as_str(), *s)).collect();

    let mut out = String::with_capacity(document.len());
    let mut present = BTreeSet::new();
    let mut cursor = 0;

    for span in spans(document) {
        out.push_str(&document[cursor..span.inner.start]);
        cursor = span.inner.end;
        present.insert(span.id.clone());

        let newline = if span.crlf { "\r\n" } else { "\n" };
        match by_id.get(span.id.as_str()) {
            Some(section) => {
                let content = substitute(&section.content, &section.placeholders, values);
                out.push_str(&content);
                out.push_str(newline);
            }
            None => out.push_str(&document[span.inner.clone()]),
        }
    }
    out.push_str(&document[cursor..]);

    for section in wanted.into_iter().filter(|s| !present.contains(&s.id)) {
        if !out.is_empty() {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            if !out.ends_with("\n\n") {
                out.push('\n');
            }
        }
        out.push_str(&block(section, values));
        out.push('\n');
    }

    out
}

/// How a document write has to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePlan {
    /// No usable document yet
    Fresh { document: String },
    /// Existing document has no markers; back it up, then replace it
    MigrateLegacy { document: String },
    /// Existing document has markers; sections updated in place
    Recompose { document: String },
}

impl WritePlan {
    /// Text to write.
    pub fn document(&self) -> &str {
        match self {
            Self::Fresh { document }
            | Self::MigrateLegacy { document }
            | Self::Recompose { document } => document,
        }
    }

    /// Whether the existing file must be copied aside first.
    pub const fn needs_backup(&self) -> bool {
        matches!(self, Self::MigrateLegacy { .. })
    }
}

/// Decide how to write the document given what is on disk now.
pub fn plan_write(
    existing: Option<&str>,
    core: &TemplateSection,
    contributions: &[TemplateSection],
    values: &BTreeMap<String, String>,
) -> WritePlan {
    match existing {
        None => WritePlan::Fresh {
            document: compose(core, contributions, values),
        },
        Some(text) if text.trim().is_empty() => WritePlan::Fresh {
            document: compose(core, contributions, values),
        },
        Some(text) if !has_sections(text) => WritePlan::MigrateLegacy {
            document: compose(core, contributions, values),
        },
        Some(text) => WritePlan::Recompose {
            document: recompose(text, core, contributions, values),
        },
    }
}
