//! Data types shared by both sides of the analysis bridge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque id of an artifact held in the analysis service's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub u64);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Half-open byte interval `[start, end)` inside one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "range start {start} is past end {end}");
        Self { start, end }
    }

    /// Canonical `"{start}-{end}"` key used by the print caches.
    pub fn key(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains_range(&self, other: &Range) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Whether the byte at `offset` lies inside this range.
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= u64::from(self.start) && offset < u64::from(self.end)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x}", self.start, self.end)
    }
}

/// A named structural element of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub raw_name: String,
    pub display_name: String,
    pub range: Range,
}

impl Item {
    pub fn new(raw_name: impl Into<String>, range: Range) -> Self {
        let raw_name = raw_name.into();
        Self {
            display_name: raw_name.clone(),
            raw_name,
            range,
        }
    }
}

/// The artifact is structurally invalid. Carried as data, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
    pub offset: u32,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {:#x})", self.message, self.offset)
    }
}

/// One element of a rich print stream.
///
/// The span markers (`Name` .. `Comment`) open a styled span that stays open
/// until the matching `Reset`, so a stream must be consumed in order with a
/// span stack (see [`crate::rich::StyledText`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PrintPart {
    Str(String),
    NewLine(u32),
    Name,
    Literal,
    Keyword,
    Type,
    Comment,
    Reset,
}
