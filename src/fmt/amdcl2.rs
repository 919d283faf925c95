//! The AMDCL2 (OpenCL 2.0) container: the outer ELF's `.text` is itself
//! an ELF holding the code segment (`.hsatext`), global and rw data,
//! sampler-init data, a `.rela.hsatext` relocation section and one
//! kernel-descriptor/metadata pair per kernel. The machine-code table
//! in use depends on the driver version range.

use super::amdcl2_code_base;
use crate::elf::read::{CreationFlags, ElfBinary};
use crate::elf::write::{
    ElfBinaryGen, ElfHeaderGen, ElfRegion, ElfSectionGen, ElfSymbolGen, SectionContent, SymSection,
};
use crate::elf::{
    put_u32, put_u64, ElfClass, EM_X86_64, SHT_NOTE, SHT_PROGBITS, SHT_RELA, SHT_STRTAB,
    SHT_SYMTAB, STB_GLOBAL, STT_OBJECT,
};
use crate::error::{BinGenError, BinaryError};
use crate::gcn::GpuDeviceType;
use crate::section::{RelocKind, Relocation};
use crate::ToWriter;

/// A sampler configuration: either raw init bytes or values to
/// materialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplerConfig {
    /// Explicit init-section bytes
    InitBytes(Vec<u8>),
    /// Sampler values; the generator materializes eight bytes each
    Values(Vec<u32>),
}

impl SamplerConfig {
    /// The init-section bytes this configuration produces
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SamplerConfig::InitBytes(bytes) => bytes.clone(),
            SamplerConfig::Values(values) => {
                let mut out = Vec::with_capacity(values.len() * 8);
                for (index, &value) in values.iter().enumerate() {
                    put_u32(&mut out, index as u32);
                    put_u32(&mut out, value);
                }
                out
            }
        }
    }
}

/// One kernel of the inner binary
#[derive(Debug, Clone)]
pub struct AmdCl2KernelInput {
    /// Kernel name
    pub name: String,
    /// Kernel setup/descriptor blob
    pub setup: Vec<u8>,
    /// Binary metadata blob
    pub metadata: Vec<u8>,
    /// Machine code placed into `.hsatext`
    pub code: Vec<u8>,
}

/// Input of the AMDCL2 generator
pub struct AmdCl2BinGen {
    /// Target device
    pub device: GpuDeviceType,
    /// Driver version the machine-code table is chosen by
    pub driver_version: u32,
    /// Global (read-only agent) data
    pub global_data: Vec<u8>,
    /// Read-write data
    pub rw_data: Vec<u8>,
    /// Size of the zero-initialized section
    pub bss_size: u64,
    /// Sampler configuration
    pub samplers: Option<SamplerConfig>,
    /// Kernels
    pub kernels: Vec<AmdCl2KernelInput>,
    /// Relocations projected into `.rela.hsatext`
    pub relocs: Vec<Relocation>,
}

impl AmdCl2BinGen {
    /// Machine value of the inner ELF for this driver version
    fn inner_machine(&self) -> u16 {
        super::amd_machine_code(self.device) + amdcl2_code_base(self.driver_version) as u16
    }

    fn inner_elf(&self) -> Result<Vec<u8>, BinGenError> {
        let header = ElfHeaderGen::builder()
            .class(ElfClass::Elf64)
            .e_type(2)
            .machine(self.inner_machine())
            .build();
        let mut gen = ElfBinaryGen::new(header);
        let mut hsatext = Vec::new();
        struct Placed {
            name: String,
            at: u64,
            size: u64,
        }
        let mut placed = Vec::new();
        for kernel in &self.kernels {
            let at = hsatext.len() as u64;
            hsatext.extend_from_slice(&kernel.setup);
            hsatext.extend_from_slice(&kernel.code);
            while hsatext.len() % 256 != 0 {
                hsatext.push(0);
            }
            placed.push(Placed {
                name: kernel.name.clone(),
                at,
                size: (kernel.setup.len() + kernel.code.len()) as u64,
            });
        }
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".hsatext".to_string(),
            sh_type: SHT_PROGBITS,
            flags: 6,
            align: 256,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::Bytes(hsatext),
        }));
        if !self.global_data.is_empty() {
            gen.add_region(ElfRegion::Section(ElfSectionGen {
                name: ".hsadata_readonly_agent".to_string(),
                sh_type: SHT_PROGBITS,
                flags: 2,
                align: 8,
                link: None,
                info: 0,
                entsize: 0,
                content: SectionContent::Bytes(self.global_data.clone()),
            }));
        }
        if !self.rw_data.is_empty() {
            gen.add_region(ElfRegion::Section(ElfSectionGen {
                name: ".hsadata_global_agent".to_string(),
                sh_type: SHT_PROGBITS,
                flags: 3,
                align: 8,
                link: None,
                info: 0,
                entsize: 0,
                content: SectionContent::Bytes(self.rw_data.clone()),
            }));
        }
        if self.bss_size != 0 {
            gen.add_region(ElfRegion::Section(ElfSectionGen {
                name: ".hsabss_global_agent".to_string(),
                sh_type: crate::elf::SHT_NOBITS,
                flags: 3,
                align: 8,
                link: None,
                info: 0,
                entsize: 0,
                content: SectionContent::NoBits(self.bss_size),
            }));
        }
        if let Some(samplers) = &self.samplers {
            gen.add_region(ElfRegion::Section(ElfSectionGen {
                name: ".hsaimage_samplerinit".to_string(),
                sh_type: SHT_PROGBITS,
                flags: 2,
                align: 8,
                link: None,
                info: 0,
                entsize: 8,
                content: SectionContent::Bytes(samplers.to_bytes()),
            }));
        }
        for kernel in &self.kernels {
            gen.add_region(ElfRegion::Section(ElfSectionGen {
                name: format!(".kernel.{}.metadata", kernel.name),
                sh_type: SHT_PROGBITS,
                flags: 0,
                align: 8,
                link: None,
                info: 0,
                entsize: 0,
                content: SectionContent::Bytes(kernel.metadata.clone()),
            }));
        }
        if !self.relocs.is_empty() {
            let mut rela = Vec::new();
            for reloc in &self.relocs {
                put_u64(&mut rela, reloc.offset);
                let r_type: u64 = match reloc.kind {
                    RelocKind::Low32 => 1,
                    RelocKind::High32 => 2,
                    RelocKind::Whole => 3,
                };
                // symbol 1 addresses the global-data base
                put_u64(&mut rela, (1u64 << 32) | r_type);
                put_u64(&mut rela, reloc.addend);
            }
            gen.add_region(ElfRegion::Section(ElfSectionGen {
                name: ".rela.hsatext".to_string(),
                sh_type: SHT_RELA,
                flags: 0,
                align: 8,
                link: Some(".symtab".to_string()),
                info: 1,
                entsize: 24,
                content: SectionContent::Bytes(rela),
            }));
        }
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".note".to_string(),
            sh_type: SHT_NOTE,
            flags: 0,
            align: 4,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::Bytes(vec![amdcl2_code_base(self.driver_version) as u8]),
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

        let hsatext_index = gen.section_index(".hsatext").unwrap_or(1);
        if !self.global_data.is_empty() {
            gen.add_symbol(ElfSymbolGen {
                name: "__hsa_section.hsadata_readonly_agent".to_string(),
                value: 0,
                size: 0,
                info: (STB_GLOBAL << 4) | STT_OBJECT,
                other: 0,
                section: SymSection::Index(
                    gen.section_index(".hsadata_readonly_agent").unwrap_or(2),
                ),
            });
        }
        for kernel in &placed {
            gen.add_symbol(ElfSymbolGen {
                name: format!("&__OpenCL_{}_kernel", kernel.name),
                value: kernel.at,
                size: kernel.size,
                info: (STB_GLOBAL << 4) | STT_OBJECT,
                other: 0,
                section: SymSection::Index(hsatext_index),
            });
        }
        let mut out = Vec::new();
        gen.to_writer(&mut out)?;
        Ok(out)
    }
}

impl<W> ToWriter<W> for AmdCl2BinGen
where
    W: std::io::Write,
{
    type Error = BinGenError;

    fn to_writer(&self, writer: &mut W) -> Result<(), Self::Error> {
        let inner = self.inner_elf()?;
        let header = ElfHeaderGen::builder()
            .class(ElfClass::Elf64)
            .e_type(2)
            .machine(EM_X86_64)
            .build();
        let mut gen = ElfBinaryGen::new(header);
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".text".to_string(),
            sh_type: SHT_PROGBITS,
            flags: 6,
            align: 16,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::Bytes(inner),
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
        gen.to_writer(writer)
    }
}

/// A parsed AMDCL2 container borrowing its backing bytes
pub struct AmdCl2MainBinary<'a> {
    inner: ElfBinary<'a>,
    kernel_names: Vec<String>,
    driver_code_base: u32,
}

impl<'a> AmdCl2MainBinary<'a> {
    /// Parse the outer binary and the nested inner ELF
    pub fn new(bytes: &'a [u8]) -> Result<Self, BinaryError> {
        let outer = ElfBinary::new(bytes, CreationFlags::SECTION_MAP)?;
        let inner_bytes = outer.section_content_by_name(".text")?;
        let inner = ElfBinary::new(
            inner_bytes,
            CreationFlags::SECTION_MAP | CreationFlags::SYMBOL_MAP,
        )?;
        let mut kernel_names = Vec::new();
        for sym in inner.symbols() {
            let name = inner.symbol_name(sym)?;
            if let Some(rest) = name.strip_prefix(b"&__OpenCL_") {
                if let Some(kernel) = rest.strip_suffix(b"_kernel") {
                    kernel_names.push(String::from_utf8_lossy(kernel).into_owned());
                }
            }
        }
        // the driver-version table index is a single byte in .note
        let driver_code_base = inner
            .section_content_by_name(".note")
            .ok()
            .and_then(|note| note.first().copied())
            .unwrap_or(0) as u32;
        Ok(Self {
            inner,
            kernel_names,
            driver_code_base,
        })
    }

    /// Names of the kernels in symbol order
    pub fn kernel_names(&self) -> &[String] {
        &self.kernel_names
    }

    /// Machine-code table index detected from the inner binary
    pub fn driver_code_base(&self) -> u32 {
        self.driver_code_base
    }

    /// Device of the inner machine value under the detected table
    pub fn device(&self) -> Result<GpuDeviceType, BinaryError> {
        let machine = self.inner.header().machine as u32;
        let legacy = machine.saturating_sub(self.driver_code_base);
        super::amd_device_of_machine(legacy as u16)
    }

    /// Setup+code bytes of one kernel inside `.hsatext`
    pub fn kernel_content(&self, name: &str) -> Result<&'a [u8], BinaryError> {
        let sym = self
            .inner
            .symbol_by_name(&format!("&__OpenCL_{name}_kernel"))?;
        let text = self.inner.section_content_by_name(".hsatext")?;
        text.get(sym.value as usize..(sym.value + sym.size) as usize)
            .ok_or(BinaryError::Malformed {
                what: "kernel symbol range",
            })
    }

    /// Metadata blob of one kernel
    pub fn kernel_metadata(&self, name: &str) -> Result<&'a [u8], BinaryError> {
        self.inner
            .section_content_by_name(&format!(".kernel.{name}.metadata"))
    }

    /// Sampler-init bytes, when present
    pub fn sampler_init(&self) -> Option<&'a [u8]> {
        self.inner
            .section_content_by_name(".hsaimage_samplerinit")
            .ok()
    }

    /// The inner ELF
    pub fn inner(&self) -> &ElfBinary<'a> {
        &self.inner
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::section::RelocRef;

    fn sample_gen() -> AmdCl2BinGen {
        AmdCl2BinGen {
            device: GpuDeviceType::Fiji,
            driver_version: 200406,
            global_data: vec![9, 9, 9, 9],
            rw_data: Vec::new(),
            bss_size: 64,
            samplers: Some(SamplerConfig::Values(vec![0x14, 0x25])),
            kernels: vec![AmdCl2KernelInput {
                name: "reduce".to_string(),
                setup: vec![0u8; 256],
                metadata: vec![2, 0, 0, 0, 17, 0, 0, 0],
                code: vec![0x04, 0x3d, 0x15, 0x80],
            }],
            relocs: vec![Relocation {
                section: 0,
                offset: 0x104,
                kind: RelocKind::Low32,
                target: RelocRef::Section(1),
                addend: 8,
            }],
        }
    }

    #[test]
    fn test_container_roundtrip() {
        let gen = sample_gen();
        let mut bytes = Vec::new();
        gen.to_writer(&mut bytes).unwrap();

        let main = AmdCl2MainBinary::new(&bytes).unwrap();
        assert_eq!(main.kernel_names(), &["reduce".to_string()]);
        assert_eq!(main.driver_code_base(), 2);
        assert_eq!(main.device().unwrap(), GpuDeviceType::Fiji);
        let content = main.kernel_content("reduce").unwrap();
        assert_eq!(content.len(), 260);
        assert_eq!(&content[256..], &[0x04, 0x3d, 0x15, 0x80]);
        assert_eq!(
            main.kernel_metadata("reduce").unwrap(),
            &[2, 0, 0, 0, 17, 0, 0, 0]
        );
        // sampler values were materialized into init bytes
        let init = main.sampler_init().unwrap();
        assert_eq!(init.len(), 16);
        assert_eq!(&init[4..8], &[0x14, 0, 0, 0]);
        // the relocation projection survived
        let rela = main.inner().section_content_by_name(".rela.hsatext").unwrap();
        assert_eq!(rela.len(), 24);
        assert_eq!(crate::elf::get_u64(rela, 0), Some(0x104));
        assert_eq!(crate::elf::get_u64(rela, 16), Some(8));
    }
}
