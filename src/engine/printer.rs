//! `wasmprinter` sinks that keep only the lines belonging to one byte range.
//!
//! wasmprinter always prints the whole module; each line announces the
//! binary offset it came from, and output is dropped unless that offset is
//! inside the requested range.

use crate::analysis::types::{PrintPart, Range};
use std::io;
use wasmprinter::Print;

/// Offset tracker shared by both sinks.
struct LineFilter {
    range: Range,
    current: usize,
}

impl LineFilter {
    fn new(range: Range) -> Self {
        Self { range, current: 0 }
    }

    fn active(&self) -> bool {
        self.current >= self.range.start as usize && self.current < self.range.end as usize
    }

    fn start_line(&mut self, binary_offset: Option<usize>) {
        if let Some(offset) = binary_offset {
            self.current = offset;
        }
    }
}

pub(crate) struct PlainWriter {
    filter: LineFilter,
    text: String,
}

impl PlainWriter {
    pub(crate) fn new(range: Range) -> Self {
        Self {
            filter: LineFilter::new(range),
            text: String::new(),
        }
    }

    pub(crate) fn finish(self) -> String {
        self.text
    }
}

impl Print for PlainWriter {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        if self.filter.active() {
            self.text.push_str(s);
        }
        Ok(())
    }

    fn newline(&mut self) -> io::Result<()> {
        if self.filter.active() {
            self.text.push('\n');
        }
        Ok(())
    }

    fn start_line(&mut self, binary_offset: Option<usize>) {
        self.filter.start_line(binary_offset);
    }
}

pub(crate) struct RichWriter {
    filter: LineFilter,
    parts: Vec<PrintPart>,
}

impl RichWriter {
    pub(crate) fn new(range: Range) -> Self {
        Self {
            filter: LineFilter::new(range),
            parts: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> Vec<PrintPart> {
        self.parts
    }

    fn push(&mut self, part: PrintPart) -> io::Result<()> {
        if self.filter.active() {
            self.parts.push(part);
        }
        Ok(())
    }
}

impl Print for RichWriter {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        if !self.filter.active() {
            return Ok(());
        }
        // Merge adjacent text so consumers see one part per styled run.
        if let Some(PrintPart::Str(last)) = self.parts.last_mut() {
            last.push_str(s);
            return Ok(());
        }
        self.parts.push(PrintPart::Str(s.to_string()));
        Ok(())
    }

    fn newline(&mut self) -> io::Result<()> {
        let offset = u32::try_from(self.filter.current).unwrap_or(u32::MAX);
        self.push(PrintPart::NewLine(offset))
    }

    fn start_line(&mut self, binary_offset: Option<usize>) {
        self.filter.start_line(binary_offset);
    }

    fn start_name(&mut self) -> io::Result<()> {
        self.push(PrintPart::Name)
    }

    fn start_literal(&mut self) -> io::Result<()> {
        self.push(PrintPart::Literal)
    }

    fn start_keyword(&mut self) -> io::Result<()> {
        self.push(PrintPart::Keyword)
    }

    fn start_type(&mut self) -> io::Result<()> {
        self.push(PrintPart::Type)
    }

    fn start_comment(&mut self) -> io::Result<()> {
        self.push(PrintPart::Comment)
    }

    fn reset_color(&mut self) -> io::Result<()> {
        self.push(PrintPart::Reset)
    }
}
