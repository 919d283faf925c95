//! The ELF writer. Callers describe the output as an ordered list of
//! regions (program-header table, section-header table, user blocks,
//! sections with bytes or generated content); the generator computes
//! per-region offsets with alignment fixups and serializes the whole
//! tree through the [`ToWriter`] seam. Symbol tables, string tables, the
//! `.hash` section and the dynamic section are generated from the
//! declared symbols and the layout itself.

use std::collections::HashMap;
use std::io::Write;

use typed_builder::TypedBuilder;

use super::{
    elf_hash, put_u16, put_u32, put_u64, put_word, ElfClass, DT_HASH, DT_REL, DT_RELA, DT_RELAENT,
    DT_RELASZ, DT_RELENT, DT_RELSZ, DT_STRSZ, DT_STRTAB, DT_SYMENT, DT_SYMTAB, EI_NIDENT,
    ELFOSABI_SYSV, ELF_MAGIC, PN_XNUM, SHN_ABS, SHN_UNDEF, SHT_DYNSYM, SHT_HASH, SHT_RELA,
    SHT_REL, STB_LOCAL,
};
use crate::error::BinGenError;
use crate::ToWriter;

#[derive(Debug, Clone, TypedBuilder)]
/// Header fields of the object under construction
pub struct ElfHeaderGen {
    /// Record layout class
    pub class: ElfClass,
    #[builder(default = ELFOSABI_SYSV)]
    /// OS ABI byte
    pub osabi: u8,
    #[builder(default = 0)]
    /// ABI version byte
    pub abi_version: u8,
    /// Object type
    pub e_type: u16,
    /// Machine
    pub machine: u16,
    #[builder(default = 1)]
    /// Object version
    pub version: u32,
    #[builder(default = 0)]
    /// Entry point
    pub entry: u64,
    #[builder(default = 0)]
    /// ELF-specific flags
    pub flags: u32,
    #[builder(default = 0)]
    /// Base virtual address added to section offsets
    pub vaddr_base: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Where a symbol is defined
pub enum SymSection {
    /// Undefined
    Undef,
    /// Absolute value
    Abs,
    /// Explicit section-header index
    Index(u16),
}

#[derive(Debug, Clone)]
/// One symbol of the generated symbol table
pub struct ElfSymbolGen {
    /// Symbol name; empty names share the null offset
    pub name: String,
    /// Value
    pub value: u64,
    /// Size
    pub size: u64,
    /// Binding and type byte
    pub info: u8,
    /// Visibility byte
    pub other: u8,
    /// Defining section
    pub section: SymSection,
}

/// Content of one section region
pub enum SectionContent {
    /// Literal bytes
    Bytes(Vec<u8>),
    /// Bytes produced by a callback at write time
    Generator(Box<dyn Fn() -> Vec<u8>>),
    /// Generated static symbol table
    SymTab,
    /// Generated dynamic symbol table
    DynSym,
    /// Generated `.strtab`
    StrTab,
    /// Generated `.dynstr`
    DynStr,
    /// Generated `.shstrtab`
    ShStrTab,
    /// Generated System V hash table
    Hash,
    /// Generated dynamic section holding the listed tags
    Dynamic(Vec<i64>),
    /// Size-only section without file content
    NoBits(u64),
}

impl std::fmt::Debug for SectionContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionContent::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            SectionContent::Generator(_) => write!(f, "Generator"),
            SectionContent::SymTab => write!(f, "SymTab"),
            SectionContent::DynSym => write!(f, "DynSym"),
            SectionContent::StrTab => write!(f, "StrTab"),
            SectionContent::DynStr => write!(f, "DynStr"),
            SectionContent::ShStrTab => write!(f, "ShStrTab"),
            SectionContent::Hash => write!(f, "Hash"),
            SectionContent::Dynamic(tags) => write!(f, "Dynamic({tags:?})"),
            SectionContent::NoBits(size) => write!(f, "NoBits({size})"),
        }
    }
}

#[derive(Debug)]
/// A section region of the output
pub struct ElfSectionGen {
    /// Section name
    pub name: String,
    /// Section type
    pub sh_type: u32,
    /// Section flags
    pub flags: u64,
    /// Alignment of the section start in the file
    pub align: u64,
    /// Name of the linked section, resolved to `sh_link`
    pub link: Option<String>,
    /// `sh_info`
    pub info: u32,
    /// `sh_entsize`
    pub entsize: u64,
    /// Content
    pub content: SectionContent,
}

#[derive(Debug)]
/// One region of the output, in file order
pub enum ElfRegion {
    /// The program-header table
    ProgramHeaderTable,
    /// The section-header table
    SectionHeaderTable,
    /// A raw byte block outside any section
    User {
        /// The bytes
        data: Vec<u8>,
        /// Alignment of the block start
        align: u64,
    },
    /// A section
    Section(ElfSectionGen),
}

#[derive(Debug, Clone)]
/// A program header covering a run of regions
pub struct ElfProgramHeaderGen {
    /// Segment type
    pub p_type: u32,
    /// Segment flags
    pub flags: u32,
    /// First covered region
    pub region_start: usize,
    /// Number of covered regions
    pub region_count: usize,
    /// Segment alignment
    pub align: u64,
    /// Extra bytes of memory size past the file size
    pub memsz_add: u64,
}

/// Builds one ELF object from an ordered region list
pub struct ElfBinaryGen {
    header: ElfHeaderGen,
    regions: Vec<ElfRegion>,
    prog_headers: Vec<ElfProgramHeaderGen>,
    symbols: Vec<ElfSymbolGen>,
    dyn_symbols: Vec<ElfSymbolGen>,
    add_null_sym: bool,
    add_null_dyn_sym: bool,
    add_null_section: bool,
}

struct Layout {
    region_offsets: Vec<u64>,
    region_sizes: Vec<u64>,
    total: u64,
    shstrtab: Vec<u8>,
    shstr_offsets: Vec<u32>,
    strtab: Vec<u8>,
    dynstr: Vec<u8>,
    symtab: Vec<u8>,
    dynsym: Vec<u8>,
    hash: Vec<u8>,
    section_count: u32,
    shstrndx: u32,
    phoff: u64,
    shoff: u64,
}

impl ElfBinaryGen {
    /// Start a generator with the given header
    pub fn new(header: ElfHeaderGen) -> Self {
        Self {
            header,
            regions: Vec::new(),
            prog_headers: Vec::new(),
            symbols: Vec::new(),
            dyn_symbols: Vec::new(),
            add_null_sym: true,
            add_null_dyn_sym: true,
            add_null_section: true,
        }
    }

    /// Append a region; regions land in the file in append order
    pub fn add_region(&mut self, region: ElfRegion) {
        self.regions.push(region);
    }

    /// Append a program header
    pub fn add_program_header(&mut self, phdr: ElfProgramHeaderGen) {
        self.prog_headers.push(phdr);
    }

    /// Add a static symbol
    pub fn add_symbol(&mut self, symbol: ElfSymbolGen) {
        self.symbols.push(symbol);
    }

    /// Add a dynamic symbol
    pub fn add_dyn_symbol(&mut self, symbol: ElfSymbolGen) {
        self.dyn_symbols.push(symbol);
    }

    /// Suppress the leading null symbol of the static table
    pub fn set_add_null_sym(&mut self, add: bool) {
        self.add_null_sym = add;
    }

    /// Section-header index a named section will get
    pub fn section_index(&self, name: &str) -> Option<u16> {
        let mut index = u16::from(self.add_null_section);
        for region in &self.regions {
            if let ElfRegion::Section(section) = region {
                if section.name == name {
                    return Some(index);
                }
                index += 1;
            }
        }
        None
    }

    fn find_section(&self, pred: impl Fn(&ElfSectionGen) -> bool) -> Option<usize> {
        self.regions.iter().position(|r| match r {
            ElfRegion::Section(s) => pred(s),
            _ => false,
        })
    }

    /// Sorted symbols with locals first and the optional null prefix
    fn sorted_symbols(symbols: &[ElfSymbolGen], add_null: bool) -> Vec<ElfSymbolGen> {
        let mut out = Vec::with_capacity(symbols.len() + usize::from(add_null));
        if add_null {
            out.push(ElfSymbolGen {
                name: String::new(),
                value: 0,
                size: 0,
                info: 0,
                other: 0,
                section: SymSection::Undef,
            });
        }
        out.extend(symbols.iter().filter(|s| s.info >> 4 == STB_LOCAL).cloned());
        out.extend(symbols.iter().filter(|s| s.info >> 4 != STB_LOCAL).cloned());
        out
    }

    fn build_strtab(symbols: &[ElfSymbolGen]) -> (Vec<u8>, Vec<u32>) {
        let mut table = vec![0u8];
        let mut offsets = Vec::with_capacity(symbols.len());
        for sym in symbols {
            if sym.name.is_empty() {
                offsets.push(0);
            } else {
                offsets.push(table.len() as u32);
                table.extend_from_slice(sym.name.as_bytes());
                table.push(0);
            }
        }
        (table, offsets)
    }

    fn build_symtab(
        &self,
        symbols: &[ElfSymbolGen],
        name_offsets: &[u32],
    ) -> Result<Vec<u8>, BinGenError> {
        let class = self.header.class;
        let mut out = Vec::with_capacity(symbols.len() * class.sym_size());
        for (sym, &name_offset) in symbols.iter().zip(name_offsets) {
            let shndx = match sym.section {
                SymSection::Undef => SHN_UNDEF,
                SymSection::Abs => SHN_ABS,
                SymSection::Index(index) => index,
            };
            match class {
                ElfClass::Elf32 => {
                    put_u32(&mut out, name_offset);
                    put_u32(&mut out, sym.value as u32);
                    put_u32(&mut out, sym.size as u32);
                    out.push(sym.info);
                    out.push(sym.other);
                    put_u16(&mut out, shndx);
                }
                ElfClass::Elf64 => {
                    put_u32(&mut out, name_offset);
                    out.push(sym.info);
                    out.push(sym.other);
                    put_u16(&mut out, shndx);
                    put_u64(&mut out, sym.value);
                    put_u64(&mut out, sym.size);
                }
            }
        }
        Ok(out)
    }

    /// Build the `.hash` section from the hashed symbol set
    fn build_hash(symbols: &[ElfSymbolGen], add_null: bool) -> Vec<u8> {
        let mut hashes = Vec::with_capacity(symbols.len() + usize::from(add_null));
        if add_null {
            hashes.push(0);
        }
        hashes.extend(symbols.iter().map(|s| elf_hash(s.name.as_bytes())));
        let nbuckets = optimize_hash_buckets(hashes.len() as u32, add_null, &hashes);
        let nchain = hashes.len() as u32;
        let mut buckets = vec![0u32; nbuckets as usize];
        let mut chains = vec![0u32; nchain as usize];
        for (i, &hash) in hashes.iter().enumerate().skip(usize::from(add_null)) {
            let bucket = (hash % nbuckets) as usize;
            chains[i] = buckets[bucket];
            buckets[bucket] = i as u32;
        }
        let mut out = Vec::with_capacity(4 * (2 + nbuckets as usize + nchain as usize));
        put_u32(&mut out, nbuckets);
        put_u32(&mut out, nchain);
        for value in buckets.into_iter().chain(chains) {
            put_u32(&mut out, value);
        }
        out
    }

    /// Value of one dynamic tag, derived from the layout
    fn dynamic_value(&self, tag: i64, layout: &Layout) -> u64 {
        let class = self.header.class;
        let vaddr = |region: Option<usize>| {
            region
                .map(|i| self.header.vaddr_base + layout.region_offsets[i])
                .unwrap_or(0)
        };
        let size_of = |region: Option<usize>| {
            region.map(|i| layout.region_sizes[i]).unwrap_or(0)
        };
        match tag {
            DT_SYMTAB => vaddr(self.find_section(|s| s.sh_type == SHT_DYNSYM)),
            DT_STRTAB => vaddr(self.find_section(|s| matches!(s.content, SectionContent::DynStr))),
            DT_STRSZ => layout.dynstr.len() as u64,
            DT_SYMENT => class.sym_size() as u64,
            DT_HASH => vaddr(self.find_section(|s| s.sh_type == SHT_HASH)),
            DT_RELA => vaddr(self.find_section(|s| s.sh_type == SHT_RELA)),
            DT_RELASZ => size_of(self.find_section(|s| s.sh_type == SHT_RELA)),
            DT_RELAENT => match class {
                ElfClass::Elf32 => 12,
                ElfClass::Elf64 => 24,
            },
            DT_REL => vaddr(self.find_section(|s| s.sh_type == SHT_REL)),
            DT_RELSZ => size_of(self.find_section(|s| s.sh_type == SHT_REL)),
            DT_RELENT => match class {
                ElfClass::Elf32 => 8,
                ElfClass::Elf64 => 16,
            },
            _ => 0,
        }
    }

    fn compute_layout(&self) -> Result<Layout, BinGenError> {
        let class = self.header.class;
        let symbols = Self::sorted_symbols(&self.symbols, self.add_null_sym);
        let dyn_symbols = Self::sorted_symbols(&self.dyn_symbols, self.add_null_dyn_sym);
        let (strtab, sym_names) = Self::build_strtab(&symbols);
        let (dynstr, dyn_names) = Self::build_strtab(&dyn_symbols);
        let symtab = self.build_symtab(&symbols, &sym_names)?;
        let dynsym = self.build_symtab(&dyn_symbols, &dyn_names)?;
        let hash_syms = if self.dyn_symbols.is_empty() {
            &symbols[usize::from(self.add_null_sym)..]
        } else {
            &dyn_symbols[usize::from(self.add_null_dyn_sym)..]
        };
        let hash = Self::build_hash(
            hash_syms,
            if self.dyn_symbols.is_empty() {
                self.add_null_sym
            } else {
                self.add_null_dyn_sym
            },
        );

        // the section name table collects names in region order
        let mut shstrtab = vec![0u8];
        let mut shstr_offsets = Vec::new();
        let mut section_count = u32::from(self.add_null_section);
        for region in &self.regions {
            if let ElfRegion::Section(section) = region {
                shstr_offsets.push(shstrtab.len() as u32);
                shstrtab.extend_from_slice(section.name.as_bytes());
                shstrtab.push(0);
                section_count += 1;
            }
        }

        let mut layout = Layout {
            region_offsets: vec![0; self.regions.len()],
            region_sizes: vec![0; self.regions.len()],
            total: 0,
            shstrtab,
            shstr_offsets,
            strtab,
            dynstr,
            symtab,
            dynsym,
            hash,
            section_count,
            shstrndx: 0,
            phoff: 0,
            shoff: 0,
        };

        let mut offset = class.ehdr_size() as u64;
        let mut section_index = u32::from(self.add_null_section);
        for (i, region) in self.regions.iter().enumerate() {
            let (align, size) = match region {
                ElfRegion::ProgramHeaderTable => (
                    8,
                    (self.prog_headers.len() * class.phdr_size()) as u64,
                ),
                ElfRegion::SectionHeaderTable => {
                    (8, (layout.section_count as usize * class.shdr_size()) as u64)
                }
                ElfRegion::User { data, align } => (*align, data.len() as u64),
                ElfRegion::Section(section) => {
                    let size = match &section.content {
                        SectionContent::Bytes(bytes) => bytes.len() as u64,
                        SectionContent::Generator(generate) => generate().len() as u64,
                        SectionContent::SymTab => layout.symtab.len() as u64,
                        SectionContent::DynSym => layout.dynsym.len() as u64,
                        SectionContent::StrTab => layout.strtab.len() as u64,
                        SectionContent::DynStr => layout.dynstr.len() as u64,
                        SectionContent::ShStrTab => layout.shstrtab.len() as u64,
                        SectionContent::Hash => layout.hash.len() as u64,
                        SectionContent::Dynamic(tags) => {
                            (tags.len() * class.dyn_size()) as u64
                        }
                        SectionContent::NoBits(size) => *size,
                    };
                    if matches!(section.content, SectionContent::ShStrTab) {
                        layout.shstrndx = section_index;
                    }
                    section_index += 1;
                    (section.align.max(1), size)
                }
            };
            offset = offset.next_multiple_of(align.max(1));
            match region {
                ElfRegion::ProgramHeaderTable => layout.phoff = offset,
                ElfRegion::SectionHeaderTable => layout.shoff = offset,
                _ => {}
            }
            layout.region_offsets[i] = offset;
            layout.region_sizes[i] = size;
            if !matches!(
                region,
                ElfRegion::Section(ElfSectionGen {
                    content: SectionContent::NoBits(_),
                    ..
                })
            ) {
                offset += size;
            }
        }
        layout.total = offset;
        Ok(layout)
    }

    /// Total output size
    pub fn size(&self) -> Result<u64, BinGenError> {
        Ok(self.compute_layout()?.total)
    }

    fn link_index(&self, link: &Option<String>) -> u32 {
        link.as_deref()
            .and_then(|name| self.section_index(name))
            .map(u32::from)
            .unwrap_or(0)
    }
}

impl<W> ToWriter<W> for ElfBinaryGen
where
    W: Write,
{
    type Error = BinGenError;

    fn to_writer(&self, writer: &mut W) -> Result<(), Self::Error> {
        let class = self.header.class;
        let layout = self.compute_layout()?;
        let mut out: Vec<u8> = Vec::with_capacity(layout.total as usize);

        // ELF header
        out.extend_from_slice(&ELF_MAGIC);
        out.push(class as u8);
        out.push(1);
        out.push(1);
        out.push(self.header.osabi);
        out.push(self.header.abi_version);
        out.resize(EI_NIDENT, 0);
        put_u16(&mut out, self.header.e_type);
        put_u16(&mut out, self.header.machine);
        put_u32(&mut out, self.header.version);
        put_word(&mut out, class, self.header.entry);
        put_word(&mut out, class, layout.phoff);
        put_word(&mut out, class, layout.shoff);
        put_u32(&mut out, self.header.flags);
        put_u16(&mut out, class.ehdr_size() as u16);
        put_u16(&mut out, class.phdr_size() as u16);
        let phnum = self.prog_headers.len() as u32;
        put_u16(
            &mut out,
            if phnum >= PN_XNUM as u32 {
                PN_XNUM
            } else {
                phnum as u16
            },
        );
        put_u16(&mut out, class.shdr_size() as u16);
        put_u16(&mut out, layout.section_count as u16);
        put_u16(&mut out, layout.shstrndx as u16);

        // regions in order
        for (i, region) in self.regions.iter().enumerate() {
            let at = layout.region_offsets[i];
            if out.len() < at as usize {
                out.resize(at as usize, 0);
            }
            match region {
                ElfRegion::ProgramHeaderTable => {
                    for phdr in &self.prog_headers {
                        let start = phdr.region_start.min(layout.region_offsets.len() - 1);
                        let end = (phdr.region_start + phdr.region_count.max(1) - 1)
                            .min(layout.region_offsets.len() - 1);
                        let offset = layout.region_offsets[start];
                        let filesz = layout.region_offsets[end] + layout.region_sizes[end]
                            - offset;
                        let vaddr = self.header.vaddr_base + offset;
                        match class {
                            ElfClass::Elf32 => {
                                put_u32(&mut out, phdr.p_type);
                                put_u32(&mut out, offset as u32);
                                put_u32(&mut out, vaddr as u32);
                                put_u32(&mut out, vaddr as u32);
                                put_u32(&mut out, filesz as u32);
                                put_u32(&mut out, (filesz + phdr.memsz_add) as u32);
                                put_u32(&mut out, phdr.flags);
                                put_u32(&mut out, phdr.align as u32);
                            }
                            ElfClass::Elf64 => {
                                put_u32(&mut out, phdr.p_type);
                                put_u32(&mut out, phdr.flags);
                                put_u64(&mut out, offset);
                                put_u64(&mut out, vaddr);
                                put_u64(&mut out, vaddr);
                                put_u64(&mut out, filesz);
                                put_u64(&mut out, filesz + phdr.memsz_add);
                                put_u64(&mut out, phdr.align);
                            }
                        }
                    }
                }
                ElfRegion::SectionHeaderTable => {
                    if self.add_null_section {
                        let mut null = vec![0u8; class.shdr_size()];
                        if phnum >= PN_XNUM as u32 {
                            // sh_info of section 0 carries the real count
                            let info_at = match class {
                                ElfClass::Elf32 => 28,
                                ElfClass::Elf64 => 44,
                            };
                            null[info_at..info_at + 4]
                                .copy_from_slice(&phnum.to_le_bytes());
                        }
                        out.extend_from_slice(&null);
                    }
                    let mut name_iter = layout.shstr_offsets.iter();
                    for (j, region2) in self.regions.iter().enumerate() {
                        let ElfRegion::Section(section) = region2 else {
                            continue;
                        };
                        let name_offset = name_iter.next().copied().unwrap_or(0);
                        let sh_offset = layout.region_offsets[j];
                        let sh_size = layout.region_sizes[j];
                        let addr = if section.flags & super::ShFlags::ALLOC.bits() != 0 {
                            self.header.vaddr_base + sh_offset
                        } else {
                            0
                        };
                        let link = self.link_index(&section.link);
                        match class {
                            ElfClass::Elf32 => {
                                put_u32(&mut out, name_offset);
                                put_u32(&mut out, section.sh_type);
                                put_u32(&mut out, section.flags as u32);
                                put_u32(&mut out, addr as u32);
                                put_u32(&mut out, sh_offset as u32);
                                put_u32(&mut out, sh_size as u32);
                                put_u32(&mut out, link);
                                put_u32(&mut out, section.info);
                                put_u32(&mut out, section.align as u32);
                                put_u32(&mut out, section.entsize as u32);
                            }
                            ElfClass::Elf64 => {
                                put_u32(&mut out, name_offset);
                                put_u32(&mut out, section.sh_type);
                                put_u64(&mut out, section.flags);
                                put_u64(&mut out, addr);
                                put_u64(&mut out, sh_offset);
                                put_u64(&mut out, sh_size);
                                put_u32(&mut out, link);
                                put_u32(&mut out, section.info);
                                put_u64(&mut out, section.align);
                                put_u64(&mut out, section.entsize);
                            }
                        }
                    }
                }
                ElfRegion::User { data, .. } => out.extend_from_slice(data),
                ElfRegion::Section(section) => match &section.content {
                    SectionContent::Bytes(bytes) => out.extend_from_slice(bytes),
                    SectionContent::Generator(generate) => out.extend_from_slice(&generate()),
                    SectionContent::SymTab => out.extend_from_slice(&layout.symtab),
                    SectionContent::DynSym => out.extend_from_slice(&layout.dynsym),
                    SectionContent::StrTab => out.extend_from_slice(&layout.strtab),
                    SectionContent::DynStr => out.extend_from_slice(&layout.dynstr),
                    SectionContent::ShStrTab => out.extend_from_slice(&layout.shstrtab),
                    SectionContent::Hash => out.extend_from_slice(&layout.hash),
                    SectionContent::Dynamic(tags) => {
                        for &tag in tags {
                            put_word(&mut out, class, tag as u64);
                            put_word(&mut out, class, self.dynamic_value(tag, &layout));
                        }
                    }
                    SectionContent::NoBits(_) => {}
                },
            }
        }
        writer.write_all(&out)?;
        Ok(())
    }
}

/// Pick the bucket count minimizing `buckets + Σ chain_len²` over a
/// bounded candidate scan; ties go to the smallest count
pub fn optimize_hash_buckets(hash_num: u32, skip_first: bool, hash_codes: &[u32]) -> u32 {
    if hash_num == 0 {
        return 1;
    }
    let first_step = (hash_num >> 2).max(1);
    let max_steps = ((hash_num as u64) << 1) - first_step as u64 + 1;
    let steps = max_steps.min(4000);
    let step_size = (max_steps / steps).max(1) as u32;
    let mut best_buckets = 0u32;
    let mut best_value = u64::MAX;
    let mut chain_lengths = vec![0u32; (hash_num as usize) * 2 + 1];
    let mut buckets = first_step;
    while buckets <= hash_num << 1 {
        chain_lengths[..buckets as usize].fill(0);
        for &code in hash_codes.iter().skip(usize::from(skip_first)) {
            chain_lengths[(code % buckets) as usize] += 1;
        }
        let mut value = buckets as u64;
        for &len in &chain_lengths[..buckets as usize] {
            value += (len as u64) * (len as u64);
        }
        if value < best_value {
            best_buckets = buckets;
            best_value = value;
        }
        buckets += step_size;
    }
    best_buckets
}

/// Convenience map from section names to their final header indices
pub fn section_indices(gen: &ElfBinaryGen) -> HashMap<String, u16> {
    let mut map = HashMap::new();
    let mut index = 1u16;
    for region in &gen.regions {
        if let ElfRegion::Section(section) = region {
            map.insert(section.name.clone(), index);
            index += 1;
        }
    }
    map
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::elf::read::{CreationFlags, ElfBinary};
    use crate::elf::{
        get_u32, DT_NULL, SHT_DYNAMIC, SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL,
        STT_OBJECT,
    };

    fn sample_gen() -> ElfBinaryGen {
        let header = ElfHeaderGen::builder()
            .class(ElfClass::Elf64)
            .e_type(1)
            .machine(super::super::EM_AMDGPU)
            .build();
        let mut gen = ElfBinaryGen::new(header);
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".text".to_string(),
            sh_type: SHT_PROGBITS,
            flags: (super::super::ShFlags::ALLOC | super::super::ShFlags::EXECINSTR).bits(),
            align: 4,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::Bytes(vec![0x04, 0x3d, 0x15, 0x80]),
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".symtab".to_string(),
            sh_type: SHT_SYMTAB,
            flags: 0,
            align: 8,
            link: Some(".strtab".to_string()),
            info: 1,
            entsize: 24,
            content: SectionContent::SymTab,
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".hash".to_string(),
            sh_type: SHT_HASH,
            flags: 0,
            align: 4,
            link: Some(".symtab".to_string()),
            info: 0,
            entsize: 4,
            content: SectionContent::Hash,
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".strtab".to_string(),
            sh_type: SHT_STRTAB,
            flags: 0,
            align: 1,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::StrTab,
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".shstrtab".to_string(),
            sh_type: SHT_STRTAB,
            flags: 0,
            align: 1,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::ShStrTab,
        }));
        gen.add_region(ElfRegion::SectionHeaderTable);
        for (i, name) in ["foo", "bar", "baz", "qux", "quux"].iter().enumerate() {
            gen.add_symbol(ElfSymbolGen {
                name: name.to_string(),
                value: i as u64 * 16,
                size: 4,
                info: (STB_GLOBAL << 4) | STT_OBJECT,
                other: 0,
                section: SymSection::Index(1),
            });
        }
        gen
    }

    #[test]
    fn test_write_read_roundtrip() {
        let gen = sample_gen();
        let mut bytes = Vec::new();
        gen.to_writer(&mut bytes).unwrap();
        assert_eq!(bytes.len() as u64, gen.size().unwrap());

        let elf = ElfBinary::new(
            &bytes,
            CreationFlags::SECTION_MAP | CreationFlags::SYMBOL_MAP,
        )
        .unwrap();
        assert_eq!(elf.header().machine, super::super::EM_AMDGPU);
        assert_eq!(
            elf.section_content_by_name(".text").unwrap(),
            &[0x04, 0x3d, 0x15, 0x80]
        );
        // all five names resolve through the symbol map
        for name in ["foo", "bar", "baz", "qux", "quux"] {
            let sym = elf.symbol_by_name(name).unwrap();
            assert_eq!(sym.size, 4);
            assert_eq!(sym.shndx, 1);
        }
        assert_eq!(elf.symbols().len(), 6);
    }

    #[test]
    fn test_hash_section_is_optimal_and_walkable() {
        let gen = sample_gen();
        let mut bytes = Vec::new();
        gen.to_writer(&mut bytes).unwrap();
        let elf = ElfBinary::new(&bytes, CreationFlags::SECTION_MAP).unwrap();
        let hash = elf.section_content_by_name(".hash").unwrap();
        let nbuckets = get_u32(hash, 0).unwrap();
        let nchain = get_u32(hash, 4).unwrap();
        assert_eq!(nchain, 6);

        // the chosen bucket count minimizes buckets + sum(len^2) over the
        // whole candidate range, ties to the smallest count
        let names = ["foo", "bar", "baz", "qux", "quux"];
        let hashes: Vec<u32> = names.iter().map(|n| elf_hash(n.as_bytes())).collect();
        let cost = |buckets: u32| {
            let mut lens = vec![0u64; buckets as usize];
            for &h in &hashes {
                lens[(h % buckets) as usize] += 1;
            }
            buckets as u64 + lens.iter().map(|&l| l * l).sum::<u64>()
        };
        let hash_num = 6u32;
        let first = (hash_num >> 2).max(1);
        let best = (first..=hash_num * 2).min_by_key(|&b| (cost(b), b)).unwrap();
        assert_eq!(nbuckets, best);

        // every symbol is reachable by walking its bucket chain
        let strtab = elf.section_content_by_name(".strtab").unwrap();
        for (name, &h) in names.iter().zip(&hashes) {
            let mut index = get_u32(hash, (8 + (h % nbuckets) * 4) as usize).unwrap();
            let mut found = false;
            while index != 0 {
                let sym = &elf.symbols()[index as usize];
                let at = sym.name_offset as usize;
                let end = at + name.len();
                if strtab.get(at..end) == Some(name.as_bytes())
                    && strtab.get(end) == Some(&0)
                {
                    found = true;
                    break;
                }
                index = get_u32(hash, (8 + (nbuckets + index) * 4) as usize).unwrap();
            }
            assert!(found, "symbol {name} not reachable through .hash");
        }
    }

    #[test]
    fn test_pn_xnum_overflow() {
        let header = ElfHeaderGen::builder()
            .class(ElfClass::Elf64)
            .e_type(2)
            .machine(0)
            .build();
        let mut gen = ElfBinaryGen::new(header);
        gen.add_region(ElfRegion::ProgramHeaderTable);
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".shstrtab".to_string(),
            sh_type: SHT_STRTAB,
            flags: 0,
            align: 1,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::ShStrTab,
        }));
        gen.add_region(ElfRegion::SectionHeaderTable);
        for _ in 0..0x10000 {
            gen.add_program_header(ElfProgramHeaderGen {
                p_type: super::super::PT_LOAD,
                flags: 4,
                region_start: 1,
                region_count: 1,
                align: 1,
                memsz_add: 0,
            });
        }
        let mut bytes = Vec::new();
        gen.to_writer(&mut bytes).unwrap();
        let elf = ElfBinary::new(&bytes, CreationFlags::empty()).unwrap();
        assert_eq!(elf.header().phnum, 0x10000);
        assert_eq!(elf.program_headers().len(), 0x10000);
    }

    #[test]
    fn test_dynamic_section_values() {
        let header = ElfHeaderGen::builder()
            .class(ElfClass::Elf64)
            .e_type(3)
            .machine(0)
            .build();
        let mut gen = ElfBinaryGen::new(header);
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".dynsym".to_string(),
            sh_type: SHT_DYNSYM,
            flags: 0,
            align: 8,
            link: Some(".dynstr".to_string()),
            info: 1,
            entsize: 24,
            content: SectionContent::DynSym,
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".dynstr".to_string(),
            sh_type: SHT_STRTAB,
            flags: 0,
            align: 1,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::DynStr,
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".dynamic".to_string(),
            sh_type: SHT_DYNAMIC,
            flags: 0,
            align: 8,
            link: Some(".dynstr".to_string()),
            info: 0,
            entsize: 16,
            content: SectionContent::Dynamic(vec![DT_SYMTAB, DT_STRTAB, DT_STRSZ, DT_SYMENT, DT_NULL]),
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".shstrtab".to_string(),
            sh_type: SHT_STRTAB,
            flags: 0,
            align: 1,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::ShStrTab,
        }));
        gen.add_region(ElfRegion::SectionHeaderTable);
        gen.add_dyn_symbol(ElfSymbolGen {
            name: "kernel".to_string(),
            value: 0,
            size: 0,
            info: (STB_GLOBAL << 4) | STT_OBJECT,
            other: 0,
            section: SymSection::Abs,
        });
        let mut bytes = Vec::new();
        gen.to_writer(&mut bytes).unwrap();
        let elf = ElfBinary::new(&bytes, CreationFlags::SECTION_MAP).unwrap();
        let entries = elf.dynamic_entries().unwrap();
        let dynsym = elf.section_by_name(".dynsym").unwrap();
        let dynstr = elf.section_by_name(".dynstr").unwrap();
        assert!(entries.contains(&(DT_SYMTAB, dynsym.offset)));
        assert!(entries.contains(&(DT_STRTAB, dynstr.offset)));
        assert!(entries.contains(&(DT_STRSZ, dynstr.size)));
        assert!(entries.contains(&(DT_SYMENT, 24)));
        assert!(entries.contains(&(DT_NULL, 0)));
    }
}
