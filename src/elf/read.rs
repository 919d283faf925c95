//! The ELF reader. Parses headers out of an in-memory byte slice,
//! validates that every offset stays inside the file, and builds
//! name-to-index maps for sections and symbols when the creation flags
//! request them.

use std::collections::HashMap;

use bitflags::bitflags;
use num_traits::FromPrimitive;

use super::{
    get_u16, get_u32, get_u64, get_word, ElfClass, ElfHeader, Note, ProgramHeader, SectionHeader,
    Sym, EI_ABIVERSION, EI_CLASS, EI_DATA, EI_OSABI, ELF_MAGIC, PN_XNUM, SHT_DYNAMIC, SHT_DYNSYM,
    SHT_NOBITS, SHT_NOTE, SHT_SYMTAB,
};
use crate::error::BinaryError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// What the reader indexes while parsing
    pub struct CreationFlags: u32 {
        /// Build the section name map
        const SECTION_MAP = 1;
        /// Build the symbol name map
        const SYMBOL_MAP = 2;
        /// Build the dynamic-symbol name map
        const DYNSYM_MAP = 4;
    }
}

/// A parsed ELF object borrowing its backing bytes
#[derive(Debug)]
pub struct ElfBinary<'a> {
    bytes: &'a [u8],
    header: ElfHeader,
    sections: Vec<SectionHeader>,
    program_headers: Vec<ProgramHeader>,
    symbols: Vec<Sym>,
    dyn_symbols: Vec<Sym>,
    symtab_link: u32,
    dynsym_link: u32,
    section_map: HashMap<&'a [u8], usize>,
    symbol_map: HashMap<&'a [u8], usize>,
    dynsym_map: HashMap<&'a [u8], usize>,
}

impl<'a> ElfBinary<'a> {
    /// Parse an ELF object. Validates the magic, class and endianness,
    /// and that every section and symbol reference stays inside the file.
    pub fn new(bytes: &'a [u8], flags: CreationFlags) -> Result<Self, BinaryError> {
        if bytes.len() < 16 || bytes[..4] != ELF_MAGIC {
            return Err(BinaryError::BadMagic);
        }
        let class = ElfClass::from_u8(bytes[EI_CLASS]).ok_or(BinaryError::InvalidClass {
            value: bytes[EI_CLASS],
        })?;
        if bytes[EI_DATA] != 1 {
            return Err(BinaryError::InvalidDataEncoding {
                value: bytes[EI_DATA],
            });
        }
        let header = parse_header(bytes, class)?;
        let mut binary = Self {
            bytes,
            header,
            sections: Vec::new(),
            program_headers: Vec::new(),
            symbols: Vec::new(),
            dyn_symbols: Vec::new(),
            symtab_link: 0,
            dynsym_link: 0,
            section_map: HashMap::new(),
            symbol_map: HashMap::new(),
            dynsym_map: HashMap::new(),
        };
        binary.parse_sections()?;
        binary.parse_program_headers()?;
        binary.parse_symbols()?;
        if flags.contains(CreationFlags::SECTION_MAP) {
            binary.build_section_map()?;
        }
        if flags.contains(CreationFlags::SYMBOL_MAP) {
            binary.symbol_map = binary.build_symbol_map(&binary.symbols, binary.symtab_link)?;
        }
        if flags.contains(CreationFlags::DYNSYM_MAP) {
            binary.dynsym_map = binary.build_symbol_map(&binary.dyn_symbols, binary.dynsym_link)?;
        }
        Ok(binary)
    }

    /// The parsed header
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// The backing bytes
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Parsed section headers
    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    /// Parsed program headers
    pub fn program_headers(&self) -> &[ProgramHeader] {
        &self.program_headers
    }

    /// Parsed symbols of the static symbol table
    pub fn symbols(&self) -> &[Sym] {
        &self.symbols
    }

    /// Parsed symbols of the dynamic symbol table
    pub fn dyn_symbols(&self) -> &[Sym] {
        &self.dyn_symbols
    }

    fn parse_sections(&mut self) -> Result<(), BinaryError> {
        let class = self.header.class;
        let shoff = self.header.shoff as usize;
        if self.header.shnum == 0 {
            return Ok(());
        }
        let size = class.shdr_size();
        for index in 0..self.header.shnum as usize {
            let at = shoff + index * size;
            if at + size > self.bytes.len() {
                return Err(BinaryError::Truncated {
                    offset: at,
                    wanted: size,
                });
            }
            let section = parse_section_header(self.bytes, class, at);
            let within = section.sh_type == SHT_NOBITS
                || section.sh_type == super::SHT_NULL
                || (section.offset + section.size) as usize <= self.bytes.len();
            if !within {
                return Err(BinaryError::SectionBeyondFile { index });
            }
            if section.link != 0 && section.link >= self.header.shnum {
                return Err(BinaryError::LinkOutOfRange { link: section.link });
            }
            self.sections.push(section);
        }
        Ok(())
    }

    fn parse_program_headers(&mut self) -> Result<(), BinaryError> {
        let class = self.header.class;
        let phoff = self.header.phoff as usize;
        let size = class.phdr_size();
        for index in 0..self.header.phnum as usize {
            let at = phoff + index * size;
            if at + size > self.bytes.len() {
                return Err(BinaryError::Truncated {
                    offset: at,
                    wanted: size,
                });
            }
            self.program_headers
                .push(parse_program_header(self.bytes, class, at));
        }
        Ok(())
    }

    fn parse_symbols(&mut self) -> Result<(), BinaryError> {
        let tables: Vec<(u32, u64, u64, u32)> = self
            .sections
            .iter()
            .filter(|s| s.sh_type == SHT_SYMTAB || s.sh_type == SHT_DYNSYM)
            .map(|s| (s.sh_type, s.offset, s.size, s.link))
            .collect();
        for (sh_type, offset, size, link) in tables {
            let class = self.header.class;
            let entry = class.sym_size();
            let count = (size as usize) / entry;
            let mut syms = Vec::with_capacity(count);
            for i in 0..count {
                let at = offset as usize + i * entry;
                let bytes = self
                    .bytes
                    .get(at..at + entry)
                    .ok_or(BinaryError::SymbolOutOfRange { index: i })?;
                syms.push(parse_sym(bytes, class));
            }
            if sh_type == SHT_SYMTAB {
                self.symbols = syms;
                self.symtab_link = link;
            } else {
                self.dyn_symbols = syms;
                self.dynsym_link = link;
            }
        }
        Ok(())
    }

    /// Link of the static symbol table (its string table index)
    pub fn symtab_link(&self) -> u32 {
        self.symtab_link
    }

    fn shstr_section(&self) -> Result<&SectionHeader, BinaryError> {
        self.sections
            .get(self.header.shstrndx as usize)
            .ok_or(BinaryError::SectionOutOfRange {
                index: self.header.shstrndx as usize,
            })
    }

    /// Name bytes at `offset` of the string table in section `strtab`
    fn name_in(&self, strtab: &SectionHeader, offset: usize) -> Result<&'a [u8], BinaryError> {
        if offset as u64 >= strtab.size {
            return Err(BinaryError::NameOffsetOutOfRange { offset });
        }
        let data: &'a [u8] = self.bytes;
        let start = strtab.offset as usize + offset;
        let end = (strtab.offset + strtab.size) as usize;
        let bytes = data
            .get(start..end)
            .ok_or(BinaryError::NameOffsetOutOfRange { offset })?;
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(&bytes[..len])
    }

    fn build_section_map(&mut self) -> Result<(), BinaryError> {
        let shstr = self.shstr_section()?.clone();
        let mut map = HashMap::new();
        for (index, section) in self.sections.iter().enumerate() {
            let name = self.name_in(&shstr, section.name_offset as usize)?;
            map.insert(name, index);
        }
        self.section_map = map;
        Ok(())
    }

    fn build_symbol_map(
        &self,
        symbols: &[Sym],
        link: u32,
    ) -> Result<HashMap<&'a [u8], usize>, BinaryError> {
        let strtab = self
            .sections
            .get(link as usize)
            .ok_or(BinaryError::LinkOutOfRange { link })?;
        let mut map = HashMap::new();
        for (index, sym) in symbols.iter().enumerate() {
            let name = self.name_in(strtab, sym.name_offset as usize)?;
            if !name.is_empty() {
                map.insert(name, index);
            }
        }
        Ok(map)
    }

    /// Index of a section by name (needs `SECTION_MAP`)
    pub fn section_index(&self, name: &str) -> Result<usize, BinaryError> {
        self.section_map
            .get(name.as_bytes())
            .copied()
            .ok_or_else(|| BinaryError::NotFound {
                what: "Section",
                name: name.to_string(),
            })
    }

    /// Section header by name (needs `SECTION_MAP`)
    pub fn section_by_name(&self, name: &str) -> Result<&SectionHeader, BinaryError> {
        self.section_index(name).map(|i| &self.sections[i])
    }

    /// Content bytes of a section
    pub fn section_content(&self, index: usize) -> Result<&'a [u8], BinaryError> {
        let section = self
            .sections
            .get(index)
            .ok_or(BinaryError::SectionOutOfRange { index })?;
        if section.sh_type == SHT_NOBITS {
            return Ok(&[]);
        }
        let data: &'a [u8] = self.bytes;
        data.get(section.offset as usize..(section.offset + section.size) as usize)
            .ok_or(BinaryError::SectionBeyondFile { index })
    }

    /// Content bytes of a section found by name (needs `SECTION_MAP`)
    pub fn section_content_by_name(&self, name: &str) -> Result<&'a [u8], BinaryError> {
        self.section_content(self.section_index(name)?)
    }

    /// Symbol index by name (needs `SYMBOL_MAP`)
    pub fn symbol_index(&self, name: &str) -> Result<usize, BinaryError> {
        self.symbol_map
            .get(name.as_bytes())
            .copied()
            .ok_or_else(|| BinaryError::NotFound {
                what: "Symbol",
                name: name.to_string(),
            })
    }

    /// Symbol by name (needs `SYMBOL_MAP`)
    pub fn symbol_by_name(&self, name: &str) -> Result<&Sym, BinaryError> {
        self.symbol_index(name).map(|i| &self.symbols[i])
    }

    /// Dynamic symbol index by name (needs `DYNSYM_MAP`)
    pub fn dyn_symbol_index(&self, name: &str) -> Result<usize, BinaryError> {
        self.dynsym_map
            .get(name.as_bytes())
            .copied()
            .ok_or_else(|| BinaryError::NotFound {
                what: "DynSymbol",
                name: name.to_string(),
            })
    }

    /// Name of a symbol from the static symbol table
    pub fn symbol_name(&self, sym: &Sym) -> Result<&'a [u8], BinaryError> {
        let strtab = self
            .sections
            .get(self.symtab_link as usize)
            .ok_or(BinaryError::LinkOutOfRange {
                link: self.symtab_link,
            })?;
        self.name_in(strtab, sym.name_offset as usize)
    }

    /// Name of a section
    pub fn section_name(&self, section: &SectionHeader) -> Result<&'a [u8], BinaryError> {
        let shstr = self.shstr_section()?;
        self.name_in(shstr, section.name_offset as usize)
    }

    /// Parsed notes of every `SHT_NOTE` section
    pub fn notes(&self) -> Result<Vec<Note>, BinaryError> {
        let mut notes = Vec::new();
        for (index, section) in self.sections.iter().enumerate() {
            if section.sh_type != SHT_NOTE {
                continue;
            }
            let content = self.section_content(index)?;
            parse_notes(content, &mut notes)?;
        }
        Ok(notes)
    }

    /// `(tag, value)` entries of the first `SHT_DYNAMIC` section
    pub fn dynamic_entries(&self) -> Result<Vec<(i64, u64)>, BinaryError> {
        let class = self.header.class;
        let mut entries = Vec::new();
        for (index, section) in self.sections.iter().enumerate() {
            if section.sh_type != SHT_DYNAMIC {
                continue;
            }
            let content = self.section_content(index)?;
            let entry = class.dyn_size();
            for chunk in content.chunks_exact(entry) {
                let tag = get_word(class, chunk, 0).unwrap_or(0) as i64;
                let value = get_word(class, chunk, entry / 2).unwrap_or(0);
                entries.push((tag, value));
            }
            break;
        }
        Ok(entries)
    }
}

fn parse_header(bytes: &[u8], class: ElfClass) -> Result<ElfHeader, BinaryError> {
    let need = class.ehdr_size();
    if bytes.len() < need {
        return Err(BinaryError::Truncated {
            offset: 0,
            wanted: need,
        });
    }
    let word = |at32: usize, at64: usize| match class {
        ElfClass::Elf32 => get_u32(bytes, at32).unwrap_or(0) as u64,
        ElfClass::Elf64 => get_u64(bytes, at64).unwrap_or(0),
    };
    let half = |at32: usize, at64: usize| match class {
        ElfClass::Elf32 => get_u16(bytes, at32).unwrap_or(0),
        ElfClass::Elf64 => get_u16(bytes, at64).unwrap_or(0),
    };
    let mut header = ElfHeader {
        class,
        osabi: bytes[EI_OSABI],
        abi_version: bytes[EI_ABIVERSION],
        e_type: half(16, 16),
        machine: half(18, 18),
        version: get_u32(bytes, 20).unwrap_or(0),
        entry: word(24, 24),
        flags: match class {
            ElfClass::Elf32 => get_u32(bytes, 36).unwrap_or(0),
            ElfClass::Elf64 => get_u32(bytes, 48).unwrap_or(0),
        },
        phoff: word(28, 32),
        shoff: word(32, 40),
        phnum: half(44, 56) as u32,
        shnum: half(48, 60) as u32,
        shstrndx: half(50, 62) as u32,
    };
    // PN_XNUM: the real program header count is in section 0's sh_info
    if header.phnum == PN_XNUM as u32 && header.shnum > 0 {
        let at = header.shoff as usize;
        if at + class.shdr_size() <= bytes.len() {
            let zero = parse_section_header(bytes, class, at);
            header.phnum = zero.info;
        }
    }
    Ok(header)
}

fn parse_section_header(bytes: &[u8], class: ElfClass, at: usize) -> SectionHeader {
    match class {
        ElfClass::Elf32 => SectionHeader {
            name_offset: get_u32(bytes, at).unwrap_or(0),
            sh_type: get_u32(bytes, at + 4).unwrap_or(0),
            flags: get_u32(bytes, at + 8).unwrap_or(0) as u64,
            addr: get_u32(bytes, at + 12).unwrap_or(0) as u64,
            offset: get_u32(bytes, at + 16).unwrap_or(0) as u64,
            size: get_u32(bytes, at + 20).unwrap_or(0) as u64,
            link: get_u32(bytes, at + 24).unwrap_or(0),
            info: get_u32(bytes, at + 28).unwrap_or(0),
            addralign: get_u32(bytes, at + 32).unwrap_or(0) as u64,
            entsize: get_u32(bytes, at + 36).unwrap_or(0) as u64,
        },
        ElfClass::Elf64 => SectionHeader {
            name_offset: get_u32(bytes, at).unwrap_or(0),
            sh_type: get_u32(bytes, at + 4).unwrap_or(0),
            flags: get_u64(bytes, at + 8).unwrap_or(0),
            addr: get_u64(bytes, at + 16).unwrap_or(0),
            offset: get_u64(bytes, at + 24).unwrap_or(0),
            size: get_u64(bytes, at + 32).unwrap_or(0),
            link: get_u32(bytes, at + 40).unwrap_or(0),
            info: get_u32(bytes, at + 44).unwrap_or(0),
            addralign: get_u64(bytes, at + 48).unwrap_or(0),
            entsize: get_u64(bytes, at + 56).unwrap_or(0),
        },
    }
}

fn parse_program_header(bytes: &[u8], class: ElfClass, at: usize) -> ProgramHeader {
    match class {
        ElfClass::Elf32 => ProgramHeader {
            p_type: get_u32(bytes, at).unwrap_or(0),
            offset: get_u32(bytes, at + 4).unwrap_or(0) as u64,
            vaddr: get_u32(bytes, at + 8).unwrap_or(0) as u64,
            paddr: get_u32(bytes, at + 12).unwrap_or(0) as u64,
            filesz: get_u32(bytes, at + 16).unwrap_or(0) as u64,
            memsz: get_u32(bytes, at + 20).unwrap_or(0) as u64,
            flags: get_u32(bytes, at + 24).unwrap_or(0),
            align: get_u32(bytes, at + 28).unwrap_or(0) as u64,
        },
        ElfClass::Elf64 => ProgramHeader {
            p_type: get_u32(bytes, at).unwrap_or(0),
            flags: get_u32(bytes, at + 4).unwrap_or(0),
            offset: get_u64(bytes, at + 8).unwrap_or(0),
            vaddr: get_u64(bytes, at + 16).unwrap_or(0),
            paddr: get_u64(bytes, at + 24).unwrap_or(0),
            filesz: get_u64(bytes, at + 32).unwrap_or(0),
            memsz: get_u64(bytes, at + 40).unwrap_or(0),
            align: get_u64(bytes, at + 48).unwrap_or(0),
        },
    }
}

fn parse_sym(bytes: &[u8], class: ElfClass) -> Sym {
    match class {
        ElfClass::Elf32 => Sym {
            name_offset: get_u32(bytes, 0).unwrap_or(0),
            value: get_u32(bytes, 4).unwrap_or(0) as u64,
            size: get_u32(bytes, 8).unwrap_or(0) as u64,
            info: bytes[12],
            other: bytes[13],
            shndx: get_u16(bytes, 14).unwrap_or(0),
        },
        ElfClass::Elf64 => Sym {
            name_offset: get_u32(bytes, 0).unwrap_or(0),
            info: bytes[4],
            other: bytes[5],
            shndx: get_u16(bytes, 6).unwrap_or(0),
            value: get_u64(bytes, 8).unwrap_or(0),
            size: get_u64(bytes, 16).unwrap_or(0),
        },
    }
}

fn parse_notes(content: &[u8], notes: &mut Vec<Note>) -> Result<(), BinaryError> {
    let mut at = 0usize;
    while at + 12 <= content.len() {
        let namesz = get_u32(content, at).unwrap_or(0) as usize;
        let descsz = get_u32(content, at + 4).unwrap_or(0) as usize;
        let n_type = get_u32(content, at + 8).unwrap_or(0);
        let name_start = at + 12;
        let name_end = name_start + namesz;
        let desc_start = name_end.next_multiple_of(4);
        let desc_end = desc_start + descsz;
        if desc_end > content.len() {
            return Err(BinaryError::Malformed { what: "note" });
        }
        let name = content[name_start..name_end]
            .split(|&b| b == 0)
            .next()
            .unwrap_or(&[])
            .to_vec();
        notes.push(Note {
            name,
            n_type,
            desc: content[desc_start..desc_end].to_vec(),
        });
        at = desc_end.next_multiple_of(4);
    }
    Ok(())
}
