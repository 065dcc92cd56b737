use crate::error::Result;
use crate::error::UnsupportedMachine;
use anyhow::Context;
use anyhow::bail;
use object::Endianness;
use object::read::elf::FileHeader as _;
use object::read::elf::SectionHeader as _;

pub(crate) type FileHeader = object::elf::FileHeader64<Endianness>;
pub(crate) type SectionHeader = object::elf::SectionHeader64<Endianness>;
pub(crate) type SymtabEntry = object::elf::Sym64<Endianness>;

type SectionTable<'data> = object::read::elf::SectionTable<'data, FileHeader>;
type SymbolTable<'data> = object::read::elf::SymbolTable<'data, FileHeader>;

/// A parsed view of the raw object, borrowed from the handle's byte source.
/// Only lives for the duration of construction; everything the handle keeps
/// is copied out of it.
pub(crate) struct ParsedObject<'data> {
    pub(crate) endian: Endianness,
    pub(crate) machine: u16,
    pub(crate) data: &'data [u8],
    pub(crate) sections: SectionTable<'data>,
    pub(crate) symbols: SymbolTable<'data>,

    /// File offset of the string table holding the symbol names. Zero when
    /// the object has no symbol table.
    pub(crate) strtab_offset: u64,
}

impl<'data> ParsedObject<'data> {
    pub(crate) fn parse(data: &'data [u8]) -> Result<ParsedObject<'data>> {
        let header = FileHeader::parse(data)?;
        let endian = header.endian()?;
        let machine = header.e_machine(endian);

        // EM_NONE is what older clang versions (3.8.x era) put in the header
        // instead of EM_BPF. Objects built that way are still loadable, so
        // keep accepting them.
        if machine != object::elf::EM_BPF && machine != object::elf::EM_NONE {
            bail!(UnsupportedMachine(machine));
        }

        let sections = header.sections(endian, data)?;

        let mut symbols = SymbolTable::default();
        let mut strtab_offset = 0;

        for (section_index, section) in sections.enumerate() {
            if section.sh_type(endian) == object::elf::SHT_SYMTAB {
                symbols = SymbolTable::parse(endian, data, &sections, section_index, section)
                    .context("Unable to read ELF symbols")?;
                let strtab_index = object::SectionIndex(section.sh_link(endian) as usize);
                strtab_offset = sections.section(strtab_index)?.sh_offset(endian);
            }
        }

        Ok(ParsedObject {
            endian,
            machine,
            data,
            sections,
            symbols,
            strtab_offset,
        })
    }

    pub(crate) fn section(&self, index: object::SectionIndex) -> Result<&'data SectionHeader> {
        Ok(self.sections.section(index)?)
    }

    pub(crate) fn section_by_name(
        &self,
        name: &str,
    ) -> Option<(object::SectionIndex, &'data SectionHeader)> {
        self.sections.section_by_name(self.endian, name.as_bytes())
    }

    pub(crate) fn section_name(&self, section: &SectionHeader) -> Result<&'data [u8]> {
        Ok(self.sections.section_name(self.endian, section)?)
    }

    pub(crate) fn section_data(&self, section: &SectionHeader) -> Result<&'data [u8]> {
        Ok(section.data(self.endian, self.data)?)
    }

    pub(crate) fn symbol_name(&self, symbol: &SymtabEntry) -> Result<&'data [u8]> {
        Ok(self.symbols.symbol_name(self.endian, symbol)?)
    }
}
