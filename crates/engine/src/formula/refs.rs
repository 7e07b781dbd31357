//! Brace-delimited reference spans.
//!
//! Stored formulas are strings, not token arrays, so name/id conversion and
//! evaluation work directly on `{...}` spans. A span runs from `{` to the
//! next `}`; an unterminated `{` is not a span.

use rustc_hash::FxHashSet;

/// A `{...}` span inside a formula string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    /// Byte offset of the opening brace.
    pub start: usize,
    /// Byte offset just past the closing brace.
    pub end: usize,
    /// Text between the braces, untrimmed.
    pub inner: &'a str,
}

/// The span opening at byte offset `start`, if `formula[start]` is `{` and
/// a closing brace follows.
pub fn span_at(formula: &str, start: usize) -> Option<Span<'_>> {
    let rest = formula.get(start..)?;
    if !rest.starts_with('{') {
        return None;
    }
    let close = rest.find('}')?;
    Some(Span {
        start,
        end: start + close + 1,
        inner: &rest[1..close],
    })
}

/// Iterate over every span, left to right.
pub fn spans(formula: &str) -> Spans<'_> {
    Spans { formula, pos: 0 }
}

pub struct Spans<'a> {
    formula: &'a str,
    pos: usize,
}

impl<'a> Iterator for Spans<'a> {
    type Item = Span<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.formula.get(self.pos..)?.find('{')?;
        let start = self.pos + offset;
        match span_at(self.formula, start) {
            Some(span) => {
                self.pos = span.end;
                Some(span)
            }
            None => {
                // No closing brace anywhere after this point
                self.pos = self.formula.len();
                None
            }
        }
    }
}

/// Rebuild `formula`, replacing the inner text of each non-empty span with
/// whatever `replace` returns. `None` keeps the span as written.
pub fn rewrite_spans<F>(formula: &str, mut replace: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;
    for span in spans(formula) {
        if span.inner.is_empty() {
            continue;
        }
        if let Some(text) = replace(span.inner) {
            out.push_str(&formula[last..span.start]);
            out.push('{');
            out.push_str(&text);
            out.push('}');
            last = span.end;
        }
    }
    out.push_str(&formula[last..]);
    out
}

/// Distinct referenced ids, in first-seen order.
pub fn referenced_ids(formula: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut ids = Vec::new();
    for span in spans(formula) {
        if span.inner.is_empty() {
            continue;
        }
        if seen.insert(span.inner) {
            ids.push(span.inner.to_string());
        }
    }
    ids
}
