//! Shared ELF definitions: constants, header records and the unaligned
//! little-endian accessors every multi-byte read and write goes through.
//! The AMD containers are little-endian only, so no byte-order handling
//! exists outside this module.

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};

pub mod read;
pub mod write;

/// The four magic bytes opening every ELF object
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
/// Index of the class byte in `e_ident`
pub const EI_CLASS: usize = 4;
/// Index of the data-encoding byte in `e_ident`
pub const EI_DATA: usize = 5;
/// Index of the version byte in `e_ident`
pub const EI_VERSION: usize = 6;
/// Index of the OS ABI byte in `e_ident`
pub const EI_OSABI: usize = 7;
/// Index of the ABI version byte in `e_ident`
pub const EI_ABIVERSION: usize = 8;
/// Size of `e_ident`
pub const EI_NIDENT: usize = 16;

/// `e_phnum` marker: the real program-header count is in section 0's
/// `sh_info`
pub const PN_XNUM: u16 = 0xffff;
/// Undefined section index
pub const SHN_UNDEF: u16 = 0;
/// Absolute-symbol section index
pub const SHN_ABS: u16 = 0xfff1;
/// Section-index escape to `sh_link`-style extended indices
pub const SHN_XINDEX: u16 = 0xffff;

/// UNIX System V ABI
pub const ELFOSABI_SYSV: u8 = 0;
/// AMD's private OS ABI value used by Mesa 17+
pub const ELFOSABI_AMDGPU_PRIVATE: u8 = 0x40;

/// AMD GPU machine value
pub const EM_AMDGPU: u16 = 224;
/// Legacy AMD inner-binary machine value
pub const EM_AMD_INNER: u16 = 0x7d;
/// No machine
pub const EM_NONE: u16 = 0;
/// x86-64, the outer machine of the legacy containers
pub const EM_X86_64: u16 = 62;

/// Inactive section header
pub const SHT_NULL: u32 = 0;
/// Program-defined contents
pub const SHT_PROGBITS: u32 = 1;
/// Symbol table
pub const SHT_SYMTAB: u32 = 2;
/// String table
pub const SHT_STRTAB: u32 = 3;
/// Relocations with addends
pub const SHT_RELA: u32 = 4;
/// Symbol hash table
pub const SHT_HASH: u32 = 5;
/// Dynamic linking information
pub const SHT_DYNAMIC: u32 = 6;
/// Notes
pub const SHT_NOTE: u32 = 7;
/// Zero-filled section
pub const SHT_NOBITS: u32 = 8;
/// Relocations without addends
pub const SHT_REL: u32 = 9;
/// Dynamic symbol table
pub const SHT_DYNSYM: u32 = 11;

/// Loadable program segment
pub const PT_LOAD: u32 = 1;
/// Note segment
pub const PT_NOTE: u32 = 4;

/// Local symbol binding
pub const STB_LOCAL: u8 = 0;
/// Global symbol binding
pub const STB_GLOBAL: u8 = 1;
/// Weak symbol binding
pub const STB_WEAK: u8 = 2;
/// Untyped symbol
pub const STT_NOTYPE: u8 = 0;
/// Data object symbol
pub const STT_OBJECT: u8 = 1;
/// Function symbol
pub const STT_FUNC: u8 = 2;
/// Section symbol
pub const STT_SECTION: u8 = 3;

/// End of the dynamic array
pub const DT_NULL: i64 = 0;
/// Dynamic hash table address
pub const DT_HASH: i64 = 4;
/// Dynamic string table address
pub const DT_STRTAB: i64 = 5;
/// Dynamic symbol table address
pub const DT_SYMTAB: i64 = 6;
/// Rela table address
pub const DT_RELA: i64 = 7;
/// Rela table size
pub const DT_RELASZ: i64 = 8;
/// Rela entry size
pub const DT_RELAENT: i64 = 9;
/// String table size
pub const DT_STRSZ: i64 = 10;
/// Symbol entry size
pub const DT_SYMENT: i64 = 11;
/// Rel table address
pub const DT_REL: i64 = 17;
/// Rel table size
pub const DT_RELSZ: i64 = 18;
/// Rel entry size
pub const DT_RELENT: i64 = 19;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
/// The file's class: 32-bit or 64-bit record layout
pub enum ElfClass {
    /// 32-bit records
    Elf32 = 1,
    /// 64-bit records
    Elf64 = 2,
}

impl ElfClass {
    /// ELF header size of the class
    pub fn ehdr_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 52,
            ElfClass::Elf64 => 64,
        }
    }

    /// Section header size of the class
    pub fn shdr_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 40,
            ElfClass::Elf64 => 64,
        }
    }

    /// Program header size of the class
    pub fn phdr_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 32,
            ElfClass::Elf64 => 56,
        }
    }

    /// Symbol record size of the class
    pub fn sym_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 16,
            ElfClass::Elf64 => 24,
        }
    }

    /// Dynamic entry size of the class
    pub fn dyn_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 8,
            ElfClass::Elf64 => 16,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Section header flags
    pub struct ShFlags: u64 {
        /// Writable at run time
        const WRITE = 1;
        /// Occupies memory at run time
        const ALLOC = 2;
        /// Executable machine instructions
        const EXECINSTR = 4;
        /// Merged by the link editor
        const MERGE = 0x10;
        /// Holds null-terminated strings
        const STRINGS = 0x20;
        /// `sh_info` holds a section index
        const INFO_LINK = 0x40;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Program header flags
    pub struct PhFlags: u32 {
        /// Execute permission
        const X = 1;
        /// Write permission
        const W = 2;
        /// Read permission
        const R = 4;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A parsed or to-be-written ELF header, fields widened to 64 bits
pub struct ElfHeader {
    /// Record layout class
    pub class: ElfClass,
    /// OS ABI byte
    pub osabi: u8,
    /// ABI version byte
    pub abi_version: u8,
    /// Object type (`e_type`)
    pub e_type: u16,
    /// Machine (`e_machine`)
    pub machine: u16,
    /// Object version (`e_version`)
    pub version: u32,
    /// Entry point
    pub entry: u64,
    /// ELF-specific flags (`e_flags`)
    pub flags: u32,
    /// Program header table offset
    pub phoff: u64,
    /// Section header table offset
    pub shoff: u64,
    /// Program header count
    pub phnum: u32,
    /// Section header count
    pub shnum: u32,
    /// Section name string table index
    pub shstrndx: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// A parsed section header, fields widened to 64 bits
pub struct SectionHeader {
    /// Offset of the name in the section name table
    pub name_offset: u32,
    /// Section type
    pub sh_type: u32,
    /// Section flags
    pub flags: u64,
    /// Virtual address
    pub addr: u64,
    /// File offset of the content
    pub offset: u64,
    /// Content size
    pub size: u64,
    /// Linked section index
    pub link: u32,
    /// Extra information
    pub info: u32,
    /// Alignment requirement
    pub addralign: u64,
    /// Table entry size
    pub entsize: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// A parsed program header, fields widened to 64 bits
pub struct ProgramHeader {
    /// Segment type
    pub p_type: u32,
    /// Segment flags
    pub flags: u32,
    /// File offset
    pub offset: u64,
    /// Virtual address
    pub vaddr: u64,
    /// Physical address
    pub paddr: u64,
    /// Size in the file
    pub filesz: u64,
    /// Size in memory
    pub memsz: u64,
    /// Alignment
    pub align: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// A parsed symbol record, fields widened to 64 bits
pub struct Sym {
    /// Offset of the name in the linked string table
    pub name_offset: u32,
    /// Symbol value
    pub value: u64,
    /// Symbol size
    pub size: u64,
    /// Binding and type byte
    pub info: u8,
    /// Visibility byte
    pub other: u8,
    /// Defining section index
    pub shndx: u16,
}

impl Sym {
    /// Symbol binding half of `info`
    pub fn bind(&self) -> u8 {
        self.info >> 4
    }

    /// Symbol type half of `info`
    pub fn sym_type(&self) -> u8 {
        self.info & 0xf
    }

    /// Compose `info` from binding and type
    pub fn info_of(bind: u8, sym_type: u8) -> u8 {
        (bind << 4) | (sym_type & 0xf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A parsed note record
pub struct Note {
    /// Note name (owner)
    pub name: Vec<u8>,
    /// Note type
    pub n_type: u32,
    /// Note payload
    pub desc: Vec<u8>,
}

/// Read a `u16` at an unaligned offset, little-endian
pub fn get_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let b = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

/// Read a `u32` at an unaligned offset, little-endian
pub fn get_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Read a `u64` at an unaligned offset, little-endian
pub fn get_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let b = bytes.get(at..at + 8)?;
    Some(u64::from_le_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

/// Read a class-sized word: `u32` on ELF32, `u64` on ELF64
pub fn get_word(class: ElfClass, bytes: &[u8], at: usize) -> Option<u64> {
    match class {
        ElfClass::Elf32 => get_u32(bytes, at).map(u64::from),
        ElfClass::Elf64 => get_u64(bytes, at),
    }
}

/// Write a `u16` little-endian
pub fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write a `u32` little-endian
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write a `u64` little-endian
pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write a class-sized word
pub fn put_word(out: &mut Vec<u8>, class: ElfClass, value: u64) {
    match class {
        ElfClass::Elf32 => put_u32(out, value as u32),
        ElfClass::Elf64 => put_u64(out, value),
    }
}

/// The System V ELF hash function
pub fn elf_hash(name: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &byte in name {
        if byte == 0 {
            break;
        }
        h = (h << 4).wrapping_add(byte as u32);
        let g = h & 0xf000_0000;
        if g != 0 {
            h ^= g >> 24;
        }
        h &= !g;
    }
    h
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unaligned_accessors() {
        let bytes = [0u8, 0x34, 0x12, 0xaa, 0xbb, 0xcc, 0xdd, 0, 0, 0, 0, 0];
        assert_eq!(get_u16(&bytes, 1), Some(0x1234));
        assert_eq!(get_u32(&bytes, 3), Some(0xddccbbaa));
        assert_eq!(get_u32(&bytes, 9), None);
        assert_eq!(get_word(ElfClass::Elf32, &bytes, 3), Some(0xddccbbaa));
        let mut out = Vec::new();
        put_u16(&mut out, 0x1234);
        put_word(&mut out, ElfClass::Elf64, 0x1122334455667788);
        assert_eq!(out[0..2], [0x34, 0x12]);
        assert_eq!(get_u64(&out, 2), Some(0x1122334455667788));
    }

    #[test]
    fn test_elf_hash() {
        // reference values of the System V hash
        assert_eq!(elf_hash(b""), 0);
        assert_eq!(elf_hash(b"foo"), 0x6d5f);
        assert_eq!(elf_hash(b"printf"), 0x77905a6);
    }

    #[test]
    fn test_sym_info() {
        let info = Sym::info_of(STB_GLOBAL, STT_FUNC);
        let sym = Sym {
            info,
            ..Sym::default()
        };
        assert_eq!(sym.bind(), STB_GLOBAL);
        assert_eq!(sym.sym_type(), STT_FUNC);
    }
}
