//! Structural item extraction for WebAssembly modules.
//!
//! Items are emitted in ancestor-before-descendant order: the whole module,
//! then each section followed by its entries. An entry spans from its own
//! offset to the next entry's offset (the last one to the section end).

use crate::analysis::types::{Item, Range};
use anyhow::Result;
use std::collections::HashMap;
use wasmparser::{
    FromReader, KnownCustom, Name, NameMap, Parser, Payload, SectionLimited, TypeRef,
};

/// Running index spaces; imports and definitions share them.
#[derive(Default)]
struct Counters {
    func: u32,
    global: u32,
    memory: u32,
    table: u32,
    ty: u32,
    tag: u32,
    elem: u32,
    data: u32,
}

struct Collector {
    items: Vec<Item>,
    counters: Counters,
}

impl Collector {
    fn section(&mut self, name: &str, range: std::ops::Range<usize>) {
        self.items.push(Item::new(name, convert_range(&range)));
    }

    /// Push one item per `(offset, name)` entry.
    fn entries(&mut self, section_end: usize, entries: Vec<(usize, String)>) {
        let ends = entries
            .iter()
            .skip(1)
            .map(|(offset, _)| *offset)
            .chain(std::iter::once(section_end));
        let new_items: Vec<Item> = entries
            .iter()
            .zip(ends)
            .map(|((start, name), end)| Item::new(name.clone(), to_range(*start, end)))
            .collect();
        self.items.extend(new_items);
    }
}

fn convert_range(r: &std::ops::Range<usize>) -> Range {
    to_range(r.start, r.end)
}

fn to_range(start: usize, end: usize) -> Range {
    let start = u32::try_from(start).unwrap_or(u32::MAX);
    let end = u32::try_from(end).unwrap_or(u32::MAX).max(start);
    Range::new(start, end)
}

/// Name each entry of a homogeneous section `"{kind} {index}"`.
fn indexed_entries<'a, T>(
    reader: SectionLimited<'a, T>,
    kind: &str,
    counter: &mut u32,
) -> Result<Vec<(usize, String)>>
where
    T: FromReader<'a>,
{
    let mut entries = Vec::new();
    for entry in reader.into_iter_with_offsets() {
        let (offset, _) = entry?;
        entries.push((offset, format!("{kind} {counter}")));
        *counter += 1;
    }
    Ok(entries)
}

/// Gather the structural items of a module, with display names resolved
/// from the `name` custom section.
pub(crate) fn gather_items(bytes: &[u8]) -> Result<Vec<Item>> {
    let mut c = Collector {
        items: vec![Item::new("module", to_range(0, bytes.len()))],
        counters: Counters::default(),
    };

    for payload in Parser::new(0).parse_all(bytes) {
        match payload? {
            Payload::TypeSection(s) => {
                let range = s.range();
                c.section("types", range.clone());
                let mut entries = Vec::new();
                for rec_group in s {
                    for (offset, _) in rec_group?.into_types_and_offsets() {
                        entries.push((offset, format!("type {}", c.counters.ty)));
                        c.counters.ty += 1;
                    }
                }
                c.entries(range.end, entries);
            }
            Payload::ImportSection(s) => {
                let range = s.range();
                c.section("imports", range.clone());
                let mut entries = Vec::new();
                for import in s.into_iter_with_offsets() {
                    let (offset, import) = import?;
                    let counters = &mut c.counters;
                    let (kind, counter) = match import.ty {
                        TypeRef::Func(_) => ("func", &mut counters.func),
                        TypeRef::Global(_) => ("global", &mut counters.global),
                        TypeRef::Memory(_) => ("memory", &mut counters.memory),
                        TypeRef::Table(_) => ("table", &mut counters.table),
                        TypeRef::Tag(_) => ("tag", &mut counters.tag),
                    };
                    entries.push((offset, format!("{kind} {counter}")));
                    *counter += 1;
                }
                c.entries(range.end, entries);
            }
            Payload::TableSection(s) => {
                let range = s.range();
                c.section("tables", range.clone());
                let entries = indexed_entries(s, "table", &mut c.counters.table)?;
                c.entries(range.end, entries);
            }
            Payload::MemorySection(s) => {
                let range = s.range();
                c.section("memories", range.clone());
                let entries = indexed_entries(s, "memory", &mut c.counters.memory)?;
                c.entries(range.end, entries);
            }
            Payload::TagSection(s) => {
                let range = s.range();
                c.section("tags", range.clone());
                let entries = indexed_entries(s, "tag", &mut c.counters.tag)?;
                c.entries(range.end, entries);
            }
            Payload::GlobalSection(s) => {
                let range = s.range();
                c.section("globals", range.clone());
                let entries = indexed_entries(s, "global", &mut c.counters.global)?;
                c.entries(range.end, entries);
            }
            Payload::ExportSection(s) => c.section("exports", s.range()),
            Payload::StartSection { range, .. } => c.section("start", range),
            Payload::ElementSection(s) => {
                let range = s.range();
                c.section("elems", range.clone());
                let entries = indexed_entries(s, "elem", &mut c.counters.elem)?;
                c.entries(range.end, entries);
            }
            Payload::CodeSectionStart { range, .. } => c.section("funcs", range),
            Payload::CodeSectionEntry(body) => {
                let name = format!("func {}", c.counters.func);
                c.counters.func += 1;
                c.section(&name, body.range());
            }
            Payload::DataSection(s) => {
                let range = s.range();
                c.section("data", range.clone());
                let entries = indexed_entries(s, "data", &mut c.counters.data)?;
                c.entries(range.end, entries);
            }
            Payload::End(_) => break,
            _ => {}
        }
    }

    let aliases = gather_aliases(bytes)?;
    for item in &mut c.items {
        if let Some(alias) = aliases.get(&item.raw_name) {
            item.display_name = alias.clone();
        }
    }
    Ok(c.items)
}

/// Map raw item names (`"func 3"`) to names recorded in the `name` section.
fn gather_aliases(bytes: &[u8]) -> Result<HashMap<String, String>> {
    let mut aliases = HashMap::new();

    for payload in Parser::new(0).parse_all(bytes) {
        let reader = match payload? {
            Payload::CustomSection(reader) => reader,
            Payload::End(_) => break,
            _ => continue,
        };
        let KnownCustom::Name(names) = reader.as_known() else {
            continue;
        };
        for subsection in names {
            match subsection? {
                Name::Module { name, .. } => {
                    aliases.insert("module".to_string(), name.to_string());
                }
                Name::Function(map) => insert_names(&mut aliases, "func", map)?,
                Name::Type(map) => insert_names(&mut aliases, "type", map)?,
                Name::Tag(map) => insert_names(&mut aliases, "tag", map)?,
                Name::Table(map) => insert_names(&mut aliases, "table", map)?,
                Name::Memory(map) => insert_names(&mut aliases, "memory", map)?,
                Name::Global(map) => insert_names(&mut aliases, "global", map)?,
                Name::Element(map) => insert_names(&mut aliases, "elem", map)?,
                Name::Data(map) => insert_names(&mut aliases, "data", map)?,
                _ => {}
            }
        }
    }

    Ok(aliases)
}

fn insert_names(aliases: &mut HashMap<String, String>, kind: &str, map: NameMap<'_>) -> Result<()> {
    for naming in map {
        let naming = naming?;
        aliases.insert(format!("{kind} {}", naming.index), naming.name.to_string());
    }
    Ok(())
}
