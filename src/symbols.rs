use crate::elf::ParsedObject;
use crate::error::Result;
use object::read::elf::SectionHeader as _;
use object::read::elf::Sym as _;
use std::collections::BTreeMap;

/// Section whose symbols hold substitutable fixed-width integers.
const DATA_SECTION: &[u8] = b".data";
/// Section whose symbols name BPF maps. The substitutable value for these is
/// the name itself, stored in the symbol string table.
const MAP_SECTION: &[u8] = b"maps";
/// Debug-type section that duplicates map names and must be kept in sync
/// with them.
const BTF_SECTION: &str = ".BTF";

/// Which of the two substitutable categories a symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A fixed-width integer in the data section. Substitutable at sizes 2
    /// and 4 only.
    Data,
    /// A fixed-length byte string in the symbol string table.
    String,
}

/// A named location in the object that a write operation can patch.
///
/// Descriptors are derived once when the object is opened and never change.
/// All offsets are absolute within the object, not section-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub(crate) name: String,
    pub(crate) kind: SymbolKind,
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) btf_offset: Option<u64>,
}

impl Symbol {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    /// File offset of the symbol's value.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Declared byte length of the value at `offset`.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// File offset of the duplicate of this value in the `.BTF` section, if
    /// that section carries one. Patches to `offset` are repeated here so
    /// that the debug info stays in agreement with the data it describes.
    #[must_use]
    pub fn btf_offset(&self) -> Option<u64> {
        self.btf_offset
    }
}

/// The substitutable symbols of an object, sorted by name so that
/// substitution order and diagnostic order are reproducible across runs.
pub(crate) struct Symbols {
    sorted: Vec<Symbol>,
}

impl Symbols {
    /// Classifies every symbol table entry by the section it references.
    /// Entries that reference neither the data section nor the maps section,
    /// as well as unnamed entries and entries with reserved or out-of-range
    /// section indexes, aren't substitutable and are dropped. A later entry
    /// with the same name and kind as an earlier one replaces it.
    pub(crate) fn extract_from(object: &ParsedObject) -> Result<Symbols> {
        let endian = object.endian;

        let btf = match object.section_by_name(BTF_SECTION) {
            Some((_, section)) => Some((section.sh_offset(endian), object.section_data(section)?)),
            None => None,
        };

        let mut data_symbols = BTreeMap::new();
        let mut string_symbols = BTreeMap::new();

        for sym in object.symbols.iter() {
            let name = object.symbol_name(sym)?;
            if name.is_empty() {
                continue;
            }

            let shndx = sym.st_shndx(endian);
            if shndx == object::elf::SHN_UNDEF || shndx >= object::elf::SHN_LORESERVE {
                continue;
            }
            let Ok(section) = object.section(object::SectionIndex(usize::from(shndx))) else {
                continue;
            };

            match object.section_name(section)? {
                DATA_SECTION => {
                    let name = String::from_utf8_lossy(name).into_owned();
                    let offset = section.sh_offset(endian) + sym.st_value(endian);
                    data_symbols.insert(
                        name.clone(),
                        Symbol {
                            name,
                            kind: SymbolKind::Data,
                            offset,
                            size: sym.st_size(endian),
                            btf_offset: None,
                        },
                    );
                }
                MAP_SECTION => {
                    // The map's patchable value is its name string in the
                    // symbol string table, so the offset points into that
                    // table rather than at the symbol's own storage.
                    let offset = object.strtab_offset + u64::from(sym.st_name(endian));
                    let btf_offset = btf.and_then(|(base, data)| mirror_offset(base, data, name));
                    let name = String::from_utf8_lossy(name).into_owned();
                    let size = name.len() as u64;
                    string_symbols.insert(
                        name.clone(),
                        Symbol {
                            name,
                            kind: SymbolKind::String,
                            offset,
                            size,
                            btf_offset,
                        },
                    );
                }
                _ => {}
            }
        }

        let mut sorted: Vec<Symbol> = data_symbols
            .into_values()
            .chain(string_symbols.into_values())
            .collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Symbols { sorted })
    }

    pub(crate) fn as_slice(&self) -> &[Symbol] {
        &self.sorted
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Symbol> {
        self.sorted
            .binary_search_by(|sym| sym.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.sorted[i])
    }
}

/// Locates the copy of `name` that the BTF string region holds. BTF strings
/// are NUL-delimited and the region starts with a NUL, so every entry
/// appears as `\0name\0`. Returns the absolute file offset of the first byte
/// of the name, or None if BTF doesn't mention it.
fn mirror_offset(btf_offset: u64, btf_data: &[u8], name: &[u8]) -> Option<u64> {
    let mut needle = Vec::with_capacity(name.len() + 2);
    needle.push(0);
    needle.extend_from_slice(name);
    needle.push(0);
    let index = memchr::memmem::find(btf_data, &needle)?;
    Some(btf_offset + index as u64 + 1)
}
