//! The Gallium (Mesa) container: an outer header with per-kernel
//! argument descriptors followed by a section table whose main section
//! embeds a full inner ELF. The inner `.AMDGPU.config` section carries
//! three 64-bit key/value entries per kernel, five from LLVM 3.9 on.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use crate::elf::read::{CreationFlags, ElfBinary};
use crate::elf::write::{
    ElfBinaryGen, ElfHeaderGen, ElfRegion, ElfSectionGen, ElfSymbolGen, SectionContent, SymSection,
};
use crate::elf::{
    get_u32, put_u32, ElfClass, ELFOSABI_AMDGPU_PRIVATE, ELFOSABI_SYSV, EM_AMDGPU, SHT_PROGBITS,
    SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL, STT_OBJECT,
};
use crate::error::{BinGenError, BinaryError};
use crate::ToWriter;

/// Config key of `COMPUTE_PGM_RSRC1`
pub const GALLIUM_PGM_RSRC1: u32 = 0x0000b848;
/// Config key of `COMPUTE_PGM_RSRC2`
pub const GALLIUM_PGM_RSRC2: u32 = 0x0000b84c;
/// Config key of the scratch ring size
pub const GALLIUM_SCRATCH: u32 = 0x0000b860;
/// Config key of the spilled-SGPR count (LLVM 3.9+)
pub const GALLIUM_SPILLED_SGPRS: u32 = 4;
/// Config key of the spilled-VGPR count (LLVM 3.9+)
pub const GALLIUM_SPILLED_VGPRS: u32 = 8;

/// Name of the first scratch-resource relocation symbol
pub const SCRATCH_RSRC_DWORD0: &str = "SCRATCH_RSRC_DWORD0";
/// Name of the second scratch-resource relocation symbol
pub const SCRATCH_RSRC_DWORD1: &str = "SCRATCH_RSRC_DWORD1";

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
/// Type of one Gallium kernel argument
pub enum GalliumArgType {
    Scalar = 0,
    Constant,
    Global,
    Local,
    Image2dRdOnly,
    Image2dWrOnly,
    Image3dRdOnly,
    Image3dWrOnly,
    Sampler,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
/// Semantic of one Gallium kernel argument
pub enum GalliumArgSemantic {
    General = 0,
    GridDimension,
    GridOffset,
    ImageSize,
    ImageFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One Gallium argument descriptor
pub struct GalliumArgInfo {
    /// Argument type
    pub arg_type: GalliumArgType,
    /// Source size
    pub size: u32,
    /// Size in the target buffer
    pub target_size: u32,
    /// Alignment in the target buffer
    pub target_align: u32,
    /// Value is sign-extended
    pub sign_extended: bool,
    /// Argument semantic
    pub semantic: GalliumArgSemantic,
}

#[derive(Debug, Clone)]
/// One kernel record of the outer header
pub struct GalliumKernel {
    /// Kernel name
    pub name: String,
    /// Offset of the kernel inside the embedded text section
    pub offset: u32,
    /// Argument descriptors
    pub args: Vec<GalliumArgInfo>,
    /// progInfo entries written into `.AMDGPU.config`
    pub prog_info: Vec<(u32, u32)>,
}

/// Section id of the embedded inner ELF
const SECTION_MAIN: u32 = 0;

/// Input of the Gallium generator
pub struct GalliumBinGen {
    /// Kernel records
    pub kernels: Vec<GalliumKernel>,
    /// Machine code of all kernels
    pub code: Vec<u8>,
    /// Global data bytes, if any
    pub global_data: Vec<u8>,
    /// Detected or configured LLVM version (major*10000 + minor*100)
    pub llvm_version: u32,
    /// Mesa version decides the OS ABI byte of the inner ELF
    pub mesa_version: u32,
    /// Scratch-resource relocations `(offset, dword_index)` in the code
    pub scratch_relocs: Vec<(u64, u32)>,
}

impl GalliumBinGen {
    /// Default progInfo for a kernel: three entries, five for LLVM 3.9+
    pub fn default_prog_info(&self) -> Vec<(u32, u32)> {
        let mut entries = vec![
            (GALLIUM_PGM_RSRC1, 0x0000_00c0),
            (GALLIUM_PGM_RSRC2, 0x0000_0090),
            (GALLIUM_SCRATCH, 0),
        ];
        if self.llvm_version >= 30900 {
            entries.push((GALLIUM_SPILLED_SGPRS, 0));
            entries.push((GALLIUM_SPILLED_VGPRS, 0));
        }
        entries
    }

    fn inner_elf(&self) -> Result<Vec<u8>, BinGenError> {
        let osabi = if self.mesa_version >= 170000 {
            ELFOSABI_AMDGPU_PRIVATE
        } else {
            ELFOSABI_SYSV
        };
        let header = ElfHeaderGen::builder()
            .class(ElfClass::Elf64)
            .osabi(osabi)
            .e_type(1)
            .machine(EM_AMDGPU)
            .build();
        let mut gen = ElfBinaryGen::new(header);
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".text".to_string(),
            sh_type: SHT_PROGBITS,
            flags: 6,
            align: 256,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::Bytes(self.code.clone()),
        }));
        if !self.global_data.is_empty() {
            gen.add_region(ElfRegion::Section(ElfSectionGen {
                name: ".rodata".to_string(),
                sh_type: SHT_PROGBITS,
                flags: 2,
                align: 4,
                link: None,
                info: 0,
                entsize: 0,
                content: SectionContent::Bytes(self.global_data.clone()),
            }));
        }
        let mut config = Vec::new();
        for kernel in &self.kernels {
            let entries = if kernel.prog_info.is_empty() {
                self.default_prog_info()
            } else {
                kernel.prog_info.clone()
            };
            for (key, value) in entries {
                put_u32(&mut config, key);
                put_u32(&mut config, value);
            }
        }
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".AMDGPU.config".to_string(),
            sh_type: SHT_PROGBITS,
            flags: 0,
            align: 4,
            link: None,
            info: 0,
            entsize: 8,
            content: SectionContent::Bytes(config),
        }));
        if !self.scratch_relocs.is_empty() {
            // rela entries against the scratch resource symbols
            let mut rela = Vec::new();
            for &(offset, dword) in &self.scratch_relocs {
                crate::elf::put_u64(&mut rela, offset);
                // symbol index 1 or 2, type 1 (32-bit absolute)
                crate::elf::put_u64(&mut rela, (((dword + 1) as u64) << 32) | 1);
                crate::elf::put_u64(&mut rela, 0);
            }
            gen.add_region(ElfRegion::Section(ElfSectionGen {
                name: ".rela.text".to_string(),
                sh_type: crate::elf::SHT_RELA,
                flags: 0,
                align: 8,
                link: Some(".symtab".to_string()),
                info: 1,
                entsize: 24,
                content: SectionContent::Bytes(rela),
            }));
        }
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
        let text_index = gen.section_index(".text").unwrap_or(1);
        if !self.scratch_relocs.is_empty() {
            for name in [SCRATCH_RSRC_DWORD0, SCRATCH_RSRC_DWORD1] {
                gen.add_symbol(ElfSymbolGen {
                    name: name.to_string(),
                    value: 0,
                    size: 0,
                    info: (STB_GLOBAL << 4) | STT_OBJECT,
                    other: 0,
                    section: SymSection::Undef,
                });
            }
        }
        for kernel in &self.kernels {
            gen.add_symbol(ElfSymbolGen {
                name: kernel.name.clone(),
                value: kernel.offset as u64,
                size: 0,
                info: (STB_GLOBAL << 4) | STT_OBJECT,
                other: 0,
                section: SymSection::Index(text_index),
            });
        }
        let mut out = Vec::new();
        gen.to_writer(&mut out)?;
        Ok(out)
    }
}

impl<W> ToWriter<W> for GalliumBinGen
where
    W: std::io::Write,
{
    type Error = BinGenError;

    fn to_writer(&self, writer: &mut W) -> Result<(), Self::Error> {
        let inner = self.inner_elf()?;
        let mut out = Vec::new();
        put_u32(&mut out, self.kernels.len() as u32);
        for kernel in &self.kernels {
            put_u32(&mut out, kernel.name.len() as u32);
            out.extend_from_slice(kernel.name.as_bytes());
            put_u32(&mut out, SECTION_MAIN);
            put_u32(&mut out, kernel.offset);
            put_u32(&mut out, kernel.args.len() as u32);
            for arg in &kernel.args {
                put_u32(&mut out, arg.arg_type as u32);
                put_u32(&mut out, arg.size);
                put_u32(&mut out, arg.target_size);
                put_u32(&mut out, arg.target_align);
                put_u32(&mut out, u32::from(arg.sign_extended));
                put_u32(&mut out, arg.semantic as u32);
            }
        }
        put_u32(&mut out, 1);
        put_u32(&mut out, SECTION_MAIN);
        put_u32(&mut out, 0);
        put_u32(&mut out, inner.len() as u32);
        out.extend_from_slice(&inner);
        writer.write_all(&out)?;
        Ok(())
    }
}

/// A parsed Gallium binary borrowing its backing bytes
pub struct GalliumBinary<'a> {
    kernels: Vec<GalliumKernel>,
    inner: ElfBinary<'a>,
}

impl<'a> GalliumBinary<'a> {
    /// Parse the outer header and the embedded inner ELF
    pub fn new(bytes: &'a [u8]) -> Result<Self, BinaryError> {
        let mut at = 0usize;
        let fail = BinaryError::Malformed {
            what: "Gallium header",
        };
        let mut take_u32 = |at: &mut usize| -> Result<u32, BinaryError> {
            let v = get_u32(bytes, *at).ok_or(fail.clone())?;
            *at += 4;
            Ok(v)
        };
        let kernels_num = take_u32(&mut at)?;
        let mut kernels = Vec::new();
        for _ in 0..kernels_num {
            let name_len = take_u32(&mut at)? as usize;
            let name_bytes = bytes.get(at..at + name_len).ok_or(fail.clone())?;
            let name = String::from_utf8_lossy(name_bytes).into_owned();
            at += name_len;
            let _section_id = take_u32(&mut at)?;
            let offset = take_u32(&mut at)?;
            let args_num = take_u32(&mut at)?;
            let mut args = Vec::new();
            for _ in 0..args_num {
                let raw_type = take_u32(&mut at)?;
                let size = take_u32(&mut at)?;
                let target_size = take_u32(&mut at)?;
                let target_align = take_u32(&mut at)?;
                let sign_extended = take_u32(&mut at)? != 0;
                let raw_semantic = take_u32(&mut at)?;
                args.push(GalliumArgInfo {
                    arg_type: GalliumArgType::from_u32(raw_type).ok_or(fail.clone())?,
                    size,
                    target_size,
                    target_align,
                    sign_extended,
                    semantic: GalliumArgSemantic::from_u32(raw_semantic).ok_or(fail.clone())?,
                });
            }
            kernels.push(GalliumKernel {
                name,
                offset,
                args,
                prog_info: Vec::new(),
            });
        }
        let sections_num = take_u32(&mut at)?;
        let mut inner_bytes: Option<&[u8]> = None;
        for _ in 0..sections_num {
            let _section_id = take_u32(&mut at)?;
            let sec_type = take_u32(&mut at)?;
            let size = take_u32(&mut at)? as usize;
            let data = bytes.get(at..at + size).ok_or(fail.clone())?;
            at += size;
            if sec_type == SECTION_MAIN {
                inner_bytes = Some(data);
            }
        }
        let inner = ElfBinary::new(
            inner_bytes.ok_or(fail.clone())?,
            CreationFlags::SECTION_MAP | CreationFlags::SYMBOL_MAP,
        )?;
        let mut binary = Self { kernels, inner };
        binary.read_prog_info()?;
        Ok(binary)
    }

    /// Copy the `.AMDGPU.config` entries back onto the kernel records
    fn read_prog_info(&mut self) -> Result<(), BinaryError> {
        let config = self.inner.section_content_by_name(".AMDGPU.config")?;
        if self.kernels.is_empty() {
            return Ok(());
        }
        let per_kernel = (config.len() / 8) / self.kernels.len();
        for (index, kernel) in self.kernels.iter_mut().enumerate() {
            for slot in 0..per_kernel {
                let base = (index * per_kernel + slot) * 8;
                let key = get_u32(config, base).unwrap_or(0);
                let value = get_u32(config, base + 4).unwrap_or(0);
                kernel.prog_info.push((key, value));
            }
        }
        Ok(())
    }

    /// Kernel records of the outer header
    pub fn kernels(&self) -> &[GalliumKernel] {
        &self.kernels
    }

    /// The embedded inner ELF
    pub fn inner(&self) -> &ElfBinary<'a> {
        &self.inner
    }

    /// Code bytes of the embedded text section
    pub fn code(&self) -> Result<&'a [u8], BinaryError> {
        self.inner.section_content_by_name(".text")
    }

    /// Whether the binary carries scratch-resource relocations
    pub fn has_scratch_relocs(&self) -> bool {
        self.inner.symbol_by_name(SCRATCH_RSRC_DWORD0).is_ok()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    fn sample_gen(llvm_version: u32) -> GalliumBinGen {
        GalliumBinGen {
            kernels: vec![
                GalliumKernel {
                    name: "vadd".to_string(),
                    offset: 0,
                    args: vec![
                        GalliumArgInfo {
                            arg_type: GalliumArgType::Global,
                            size: 8,
                            target_size: 8,
                            target_align: 8,
                            sign_extended: false,
                            semantic: GalliumArgSemantic::General,
                        },
                        GalliumArgInfo {
                            arg_type: GalliumArgType::Scalar,
                            size: 4,
                            target_size: 4,
                            target_align: 4,
                            sign_extended: true,
                            semantic: GalliumArgSemantic::GridDimension,
                        },
                    ],
                    prog_info: Vec::new(),
                },
                GalliumKernel {
                    name: "vmul".to_string(),
                    offset: 64,
                    args: Vec::new(),
                    prog_info: Vec::new(),
                },
            ],
            code: vec![0x04, 0x3d, 0x15, 0x80, 0x00, 0x00, 0x81, 0xbf],
            global_data: Vec::new(),
            llvm_version,
            mesa_version: 170000,
            scratch_relocs: vec![(4, 0), (12, 1)],
        }
    }

    #[test]
    fn test_roundtrip() {
        let gen = sample_gen(30800);
        let mut bytes = Vec::new();
        gen.to_writer(&mut bytes).unwrap();
        let binary = GalliumBinary::new(&bytes).unwrap();
        assert_eq!(binary.kernels().len(), 2);
        let vadd = &binary.kernels()[0];
        assert_eq!(vadd.name, "vadd");
        assert_eq!(vadd.args.len(), 2);
        assert_eq!(vadd.args[0].arg_type, GalliumArgType::Global);
        assert_eq!(vadd.args[1].semantic, GalliumArgSemantic::GridDimension);
        assert!(vadd.args[1].sign_extended);
        assert_eq!(binary.kernels()[1].offset, 64);
        assert_eq!(&binary.code().unwrap()[..4], &[0x04, 0x3d, 0x15, 0x80]);
        // Mesa 17+ marks the inner ELF with the private OS ABI
        assert_eq!(binary.inner().header().osabi, ELFOSABI_AMDGPU_PRIVATE);
        assert!(binary.has_scratch_relocs());
    }

    #[test]
    fn test_prog_info_entry_count_by_llvm_version() {
        for (llvm, expected) in [(30800u32, 3usize), (30900, 5)] {
            let gen = sample_gen(llvm);
            let mut bytes = Vec::new();
            gen.to_writer(&mut bytes).unwrap();
            let binary = GalliumBinary::new(&bytes).unwrap();
            for kernel in binary.kernels() {
                assert_eq!(kernel.prog_info.len(), expected);
                assert_eq!(kernel.prog_info[0].0, GALLIUM_PGM_RSRC1);
                assert_eq!(kernel.prog_info[1].0, GALLIUM_PGM_RSRC2);
                assert_eq!(kernel.prog_info[2].0, GALLIUM_SCRATCH);
            }
            if expected == 5 {
                let kernel = &binary.kernels()[0];
                assert_eq!(kernel.prog_info[3].0, GALLIUM_SPILLED_SGPRS);
                assert_eq!(kernel.prog_info[4].0, GALLIUM_SPILLED_VGPRS);
            }
        }
    }
}
