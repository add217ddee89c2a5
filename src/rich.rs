//! Decoding of rich print streams into styled lines.
//!
//! A rich print is a flat stream: span markers open a style, `Reset` closes
//! the innermost one, and `NewLine(offset)` ends the line that was printed
//! for `offset`. Styles nest, so decoding keeps an explicit stack of open
//! spans.

use crate::analysis::types::PrintPart;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Name,
    Literal,
    Keyword,
    Type,
    Comment,
}

impl SpanKind {
    fn from_marker(part: &PrintPart) -> Option<Self> {
        match part {
            PrintPart::Name => Some(Self::Name),
            PrintPart::Literal => Some(Self::Literal),
            PrintPart::Keyword => Some(Self::Keyword),
            PrintPart::Type => Some(Self::Type),
            PrintPart::Comment => Some(Self::Comment),
            PrintPart::Str(_) | PrintPart::NewLine(_) | PrintPart::Reset => None,
        }
    }
}

/// A run of text with the innermost style open when it was printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    pub style: Option<SpanKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StyledLine {
    /// Binary offset the line was printed for; `None` for trailing text
    /// that no line marker ended.
    pub offset: Option<u32>,
    pub segments: Vec<Segment>,
}

impl StyledLine {
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StyledText {
    pub lines: Vec<StyledLine>,
}

impl StyledText {
    pub fn from_parts(parts: &[PrintPart]) -> Self {
        let mut stack: Vec<SpanKind> = Vec::new();
        let mut lines: Vec<StyledLine> = Vec::new();
        let mut current = StyledLine::default();

        for part in parts {
            match part {
                PrintPart::Str(text) => {
                    let style = stack.last().copied();
                    match current.segments.last_mut() {
                        Some(prev) if prev.style == style => prev.text.push_str(text),
                        _ => current.segments.push(Segment {
                            text: text.clone(),
                            style,
                        }),
                    }
                }
                PrintPart::NewLine(offset) => {
                    current.offset = Some(*offset);
                    lines.push(std::mem::take(&mut current));
                }
                // A reset with nothing open is tolerated.
                PrintPart::Reset => {
                    stack.pop();
                }
                marker => stack.extend(SpanKind::from_marker(marker)),
            }
        }
        if !current.segments.is_empty() {
            lines.push(current);
        }

        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.segments.is_empty())
    }

    /// Text without styling; every ended line is followed by `\n`.
    pub fn to_plain(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            for segment in &line.segments {
                out.push_str(&segment.text);
            }
            if line.offset.is_some() {
                out.push('\n');
            }
        }
        out
    }
}
