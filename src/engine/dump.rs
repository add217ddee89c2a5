//! Annotated byte dump of a binary module.
//!
//! Every byte of the module lands in exactly one row: the header, each
//! section header and entry count, each entry, and inside function bodies
//! the size prefix, the locals and one row per operator.

use crate::analysis::types::Range;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use wasmparser::{FromReader, FunctionBody, Parser, Payload, SectionLimited, TypeRef};

/// Bytes shown per line of hex.
const NBYTES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpRow {
    pub offset: u32,
    pub bytes: Vec<u8>,
    pub explain: String,
}

impl DumpRow {
    pub fn range(&self) -> Range {
        let end = self.offset.saturating_add(self.bytes.len() as u32);
        Range::new(self.offset, end)
    }

    /// Whether any byte of this row lies inside `range`.
    pub fn overlaps(&self, range: &Range) -> bool {
        let own = self.range();
        own.start < range.end && range.start < own.end
    }
}

impl fmt::Display for DumpRow {
    /// `0x0008 | 01 07 01 60 | section types`, continuing long rows on
    /// further lines without an explanation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.bytes.chunks(NBYTES).enumerate() {
            if i == 0 {
                write!(f, "{:#06x} |", self.offset)?;
            } else {
                writeln!(f)?;
                write!(f, "       |")?;
            }
            for j in 0..NBYTES {
                match chunk.get(j) {
                    Some(b) => write!(f, " {b:02x}")?,
                    None => write!(f, "   ")?,
                }
            }
            if i == 0 {
                write!(f, " | {}", self.explain)?;
            }
        }
        Ok(())
    }
}

struct Dump<'a> {
    bytes: &'a [u8],
    cur: usize,
    rows: Vec<DumpRow>,
    imported_funcs: u32,
    code_index: u32,
    code_count: Option<u32>,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    ty: u32,
    table: u32,
    memory: u32,
    global: u32,
    tag: u32,
    elem: u32,
    data: u32,
}

impl<'a> Dump<'a> {
    /// Emit a row for `cur..end`; empty spans are skipped.
    fn row(&mut self, end: usize, explain: impl Into<String>) {
        let end = end.min(self.bytes.len());
        if end <= self.cur {
            return;
        }
        self.rows.push(DumpRow {
            offset: u32::try_from(self.cur).unwrap_or(u32::MAX),
            bytes: self.bytes[self.cur..end].to_vec(),
            explain: explain.into(),
        });
        self.cur = end;
    }

    /// Section header, entry count, then one row per entry. Each entry runs
    /// to the next entry's offset, the last to the section end.
    fn section(
        &mut self,
        name: &str,
        range: std::ops::Range<usize>,
        count: u32,
        entries: Vec<(usize, String)>,
    ) {
        self.row(range.start, format!("section {name}"));
        let first = entries.first().map(|(offset, _)| *offset).unwrap_or(range.end);
        self.row(first, format!("{count} count"));
        let ends: Vec<usize> = entries
            .iter()
            .skip(1)
            .map(|(offset, _)| *offset)
            .chain(std::iter::once(range.end))
            .collect();
        for ((_, label), end) in entries.into_iter().zip(ends) {
            self.row(end, label);
        }
    }

    fn body(&mut self, body: &FunctionBody<'_>) -> Result<()> {
        let range = body.range();
        let func = self.imported_funcs + self.code_index;
        self.code_index += 1;

        let size_start = range.start.saturating_sub(leb128_len(range.len())).max(self.cur);
        if let Some(count) = self.code_count.take() {
            self.row(size_start, format!("{count} count"));
        }
        self.row(range.start, format!("size of func {func}"));

        let mut locals = body.get_locals_reader()?;
        let blocks = locals.get_count();
        let mut declared = Vec::new();
        for _ in 0..blocks {
            let (amount, ty) = locals.read()?;
            declared.push(format!("{amount} x {ty:?}"));
        }
        let summary = if declared.is_empty() {
            "0 local blocks".to_string()
        } else {
            format!("{blocks} local blocks: {}", declared.join(", "))
        };
        self.row(locals.original_position(), summary);

        let mut ops = body.get_operators_reader()?;
        while !ops.eof() {
            match ops.read() {
                Ok(op) => self.row(ops.original_position(), format!("{op:?}")),
                Err(_) => {
                    self.row(range.end, "??");
                    break;
                }
            }
        }
        self.row(range.end, "end of func");
        Ok(())
    }
}

fn leb128_len(mut value: usize) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

fn labelled<'a, T, F>(reader: SectionLimited<'a, T>, mut label: F) -> Result<Vec<(usize, String)>>
where
    T: FromReader<'a>,
    F: FnMut(T) -> String,
{
    let mut entries = Vec::new();
    for entry in reader.into_iter_with_offsets() {
        let (offset, value) = entry?;
        entries.push((offset, label(value)));
    }
    Ok(entries)
}

/// Dump `bytes` into rows that together cover the whole module.
pub fn dump_module(bytes: &[u8]) -> Result<Vec<DumpRow>> {
    let mut d = Dump {
        bytes,
        cur: 0,
        rows: Vec::new(),
        imported_funcs: 0,
        code_index: 0,
        code_count: None,
        counters: Counters::default(),
    };

    for payload in Parser::new(0).parse_all(bytes) {
        let payload = payload?;
        match &payload {
            Payload::Version { num, range, .. } => d.row(range.end, format!("version {num}")),
            Payload::TypeSection(s) => {
                let counters = &mut d.counters;
                let entries = labelled(s.clone(), |group| {
                    let first = counters.ty;
                    counters.ty += group.types().count() as u32;
                    match counters.ty - first {
                        1 => format!("type {first}"),
                        n => format!("rec group: types {first}..{}", first + n),
                    }
                })?;
                d.section("types", s.range(), s.count(), entries);
            }
            Payload::ImportSection(s) => {
                let counters = &mut d.counters;
                let funcs = &mut d.imported_funcs;
                let entries = labelled(s.clone(), |import| {
                    let (kind, counter) = match import.ty {
                        TypeRef::Func(_) => ("func", &mut *funcs),
                        TypeRef::Table(_) => ("table", &mut counters.table),
                        TypeRef::Memory(_) => ("memory", &mut counters.memory),
                        TypeRef::Global(_) => ("global", &mut counters.global),
                        TypeRef::Tag(_) => ("tag", &mut counters.tag),
                    };
                    let label = format!("import [{kind} {counter}] {:?} {:?}", import.module, import.name);
                    *counter += 1;
                    label
                })?;
                d.section("imports", s.range(), s.count(), entries);
            }
            Payload::FunctionSection(s) => {
                let mut func = d.imported_funcs;
                let entries = labelled(s.clone(), |ty: u32| {
                    let label = format!("[func {func}] type {ty}");
                    func += 1;
                    label
                })?;
                d.section("functions", s.range(), s.count(), entries);
            }
            Payload::TableSection(s) => {
                let counter = &mut d.counters.table;
                let entries = labelled(s.clone(), |table| {
                    let label = format!("[table {counter}] {:?}", table.ty);
                    *counter += 1;
                    label
                })?;
                d.section("tables", s.range(), s.count(), entries);
            }
            Payload::MemorySection(s) => {
                let counter = &mut d.counters.memory;
                let entries = labelled(s.clone(), |memory| {
                    let label = format!("[memory {counter}] {memory:?}");
                    *counter += 1;
                    label
                })?;
                d.section("memories", s.range(), s.count(), entries);
            }
            Payload::TagSection(s) => {
                let counter = &mut d.counters.tag;
                let entries = labelled(s.clone(), |tag| {
                    let label = format!("[tag {counter}] {tag:?}");
                    *counter += 1;
                    label
                })?;
                d.section("tags", s.range(), s.count(), entries);
            }
            Payload::GlobalSection(s) => {
                let counter = &mut d.counters.global;
                let entries = labelled(s.clone(), |global| {
                    let label = format!("[global {counter}] {:?}", global.ty);
                    *counter += 1;
                    label
                })?;
                d.section("globals", s.range(), s.count(), entries);
            }
            Payload::ExportSection(s) => {
                let entries = labelled(s.clone(), |export| {
                    format!("export {:?} {:?} {}", export.name, export.kind, export.index)
                })?;
                d.section("exports", s.range(), s.count(), entries);
            }
            Payload::StartSection { func, range } => {
                d.row(range.start, "section start");
                d.row(range.end, format!("start func {func}"));
            }
            Payload::ElementSection(s) => {
                let counter = &mut d.counters.elem;
                let entries = labelled(s.clone(), |_| {
                    let label = format!("[elem {counter}]");
                    *counter += 1;
                    label
                })?;
                d.section("elems", s.range(), s.count(), entries);
            }
            Payload::DataCountSection { count, range } => {
                d.row(range.start, "section data count");
                d.row(range.end, format!("data count {count}"));
            }
            Payload::DataSection(s) => {
                let counter = &mut d.counters.data;
                let entries = labelled(s.clone(), |data| {
                    let label = format!("[data {counter}] {} bytes", data.data.len());
                    *counter += 1;
                    label
                })?;
                d.section("data", s.range(), s.count(), entries);
            }
            Payload::CodeSectionStart { count, range, .. } => {
                d.row(range.start, "section code");
                if *count == 0 {
                    d.row(range.end, "0 count");
                } else {
                    d.code_count = Some(*count);
                }
            }
            Payload::CodeSectionEntry(body) => d.body(body)?,
            Payload::CustomSection(reader) => {
                let range = reader.range();
                d.row(range.start, "section custom");
                d.row(range.end, format!("custom section {:?}", reader.name()));
            }
            Payload::End(offset) => {
                d.row(*offset, "unparsed bytes");
                break;
            }
            other => {
                if let Some((id, range)) = other.as_section() {
                    d.row(range.start, format!("section {id}"));
                    d.row(range.end, format!("contents of section {id}"));
                }
            }
        }
    }

    let len = bytes.len();
    d.row(len, "unparsed bytes");
    Ok(d.rows)
}
