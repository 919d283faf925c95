//! The legacy AMD (OpenCL 1.x) container: an outer ELF whose `.text`
//! holds one inner ELF per kernel and whose `.rodata` holds the textual
//! kernel metadata, addressed through `__OpenCL_<name>_metadata`,
//! `__OpenCL_<name>_header` and `__OpenCL_<name>_kernel` symbols. The
//! inner binaries carry CAL notes in a note segment.

use super::{
    amd_device_of_machine, amd_machine_code, calnote, parse_cal_notes, write_cal_notes, ArgSemantic,
    CalNote, KernelArg,
};
use crate::elf::read::{CreationFlags, ElfBinary};
use crate::elf::write::{
    ElfBinaryGen, ElfHeaderGen, ElfProgramHeaderGen, ElfRegion, ElfSectionGen, ElfSymbolGen,
    SectionContent, SymSection,
};
use crate::elf::{
    ElfClass, EM_X86_64, PT_NOTE, SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB, STB_GLOBAL, STT_OBJECT,
};
use crate::error::{BinGenError, BinaryError};
use crate::gcn::GpuDeviceType;
use crate::ToWriter;

/// One kernel of the outer binary
#[derive(Debug, Clone)]
pub struct AmdKernelInput {
    /// Kernel name
    pub name: String,
    /// Inner-binary bytes (or code to wrap into one)
    pub code: Vec<u8>,
    /// Metadata text; generated from `args` when empty
    pub metadata: String,
    /// Kernel header blob
    pub header: Vec<u8>,
    /// Argument descriptors the metadata is generated from
    pub args: Vec<KernelArg>,
    /// CAL notes of the generated inner binary
    pub cal_notes: Vec<CalNote>,
}

/// Input of the AMD container generator
pub struct AmdBinGen {
    /// Target device
    pub device: GpuDeviceType,
    /// 64-bit outer binary
    pub is_64bit: bool,
    /// Driver info string placed into `.comment`
    pub driver_info: String,
    /// Kernels
    pub kernels: Vec<AmdKernelInput>,
}

/// Generate the metadata text of one kernel from its arguments
pub fn kernel_metadata_text(name: &str, device: GpuDeviceType, args: &[KernelArg]) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    let _ = writeln!(out, ";ARGSTART:__OpenCL_{name}_kernel");
    out.push_str(";version:3:1:111\n");
    let _ = writeln!(out, ";device:{}", device.name());
    out.push_str(";uniqueid:1024\n");
    out.push_str(";memory:uavprivate:0\n");
    out.push_str(";memory:hwlocal:0\n");
    out.push_str(";memory:hwregion:0\n");
    for arg in args {
        match arg.semantic {
            ArgSemantic::Pointer => {
                let _ = writeln!(
                    out,
                    ";pointer:{}:{}:1:1:{}:uav:12:4:{}:0:0",
                    arg.name,
                    arg.type_name.trim_end_matches('*'),
                    arg.offset,
                    match arg.access {
                        super::AccessQual::ReadOnly => "RO",
                        super::AccessQual::WriteOnly => "WO",
                        _ => "RW",
                    }
                );
            }
            ArgSemantic::Image => {
                let _ = writeln!(
                    out,
                    ";image:{}:{}:{}:1:1:{}",
                    arg.name,
                    arg.type_name,
                    match arg.access {
                        super::AccessQual::WriteOnly => "WO",
                        _ => "RO",
                    },
                    arg.offset
                );
            }
            ArgSemantic::Sampler => {
                let _ = writeln!(out, ";sampler:{}:{}:1:1", arg.name, arg.offset);
            }
            _ => {
                let _ = writeln!(
                    out,
                    ";value:{}:{}:1:1:{}",
                    arg.name, arg.type_name, arg.offset
                );
            }
        }
        if arg.is_const {
            out.push_str(";constarg:0:\n");
        }
    }
    out.push_str(";function:1:1028\n");
    out.push_str(";intrinsic:0\n");
    let _ = writeln!(out, ";ARGEND:__OpenCL_{name}_kernel");
    out
}

/// Wrap kernel code and CAL notes into one inner binary
pub fn build_inner_binary(
    device: GpuDeviceType,
    code: &[u8],
    notes: &[CalNote],
) -> Result<Vec<u8>, BinGenError> {
    let header = ElfHeaderGen::builder()
        .class(ElfClass::Elf32)
        .e_type(2)
        .machine(amd_machine_code(device))
        .build();
    let mut gen = ElfBinaryGen::new(header);
    gen.add_region(ElfRegion::ProgramHeaderTable);
    gen.add_region(ElfRegion::User {
        data: write_cal_notes(notes),
        align: 4,
    });
    gen.add_region(ElfRegion::Section(ElfSectionGen {
        name: ".text".to_string(),
        sh_type: SHT_PROGBITS,
        flags: 6,
        align: 4,
        link: None,
        info: 0,
        entsize: 0,
        content: SectionContent::Bytes(code.to_vec()),
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
    gen.add_program_header(ElfProgramHeaderGen {
        p_type: PT_NOTE,
        flags: 4,
        region_start: 1,
        region_count: 1,
        align: 4,
        memsz_add: 0,
    });
    let mut out = Vec::new();
    gen.to_writer(&mut out)?;
    Ok(out)
}

impl<W> ToWriter<W> for AmdBinGen
where
    W: std::io::Write,
{
    type Error = BinGenError;

    fn to_writer(&self, writer: &mut W) -> Result<(), Self::Error> {
        let class = if self.is_64bit {
            ElfClass::Elf64
        } else {
            ElfClass::Elf32
        };
        let header = ElfHeaderGen::builder()
            .class(class)
            .e_type(2)
            .machine(EM_X86_64)
            .build();
        let mut gen = ElfBinaryGen::new(header);

        let mut text = Vec::new();
        let mut rodata = Vec::new();
        struct Placed {
            name: String,
            kernel_at: u64,
            kernel_size: u64,
            metadata_at: u64,
            metadata_size: u64,
            header_at: u64,
            header_size: u64,
        }
        let mut placed = Vec::new();
        for kernel in &self.kernels {
            let metadata = if kernel.metadata.is_empty() {
                kernel_metadata_text(&kernel.name, self.device, &kernel.args)
            } else {
                kernel.metadata.clone()
            };
            let inner = if kernel.code.starts_with(&crate::elf::ELF_MAGIC) {
                kernel.code.clone()
            } else {
                build_inner_binary(self.device, &kernel.code, &kernel.cal_notes)?
            };
            let kernel_at = text.len() as u64;
            text.extend_from_slice(&inner);
            let metadata_at = rodata.len() as u64;
            rodata.extend_from_slice(metadata.as_bytes());
            rodata.push(0);
            let header_at = rodata.len() as u64;
            rodata.extend_from_slice(&kernel.header);
            placed.push(Placed {
                name: kernel.name.clone(),
                kernel_at,
                kernel_size: inner.len() as u64,
                metadata_at,
                metadata_size: metadata.len() as u64 + 1,
                header_at,
                header_size: kernel.header.len() as u64,
            });
        }

        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".text".to_string(),
            sh_type: SHT_PROGBITS,
            flags: 6,
            align: 16,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::Bytes(text),
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".rodata".to_string(),
            sh_type: SHT_PROGBITS,
            flags: 2,
            align: 1,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::Bytes(rodata),
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".comment".to_string(),
            sh_type: SHT_PROGBITS,
            flags: 0,
            align: 1,
            link: None,
            info: 0,
            entsize: 0,
            content: SectionContent::Bytes(self.driver_info.as_bytes().to_vec()),
        }));
        gen.add_region(ElfRegion::Section(ElfSectionGen {
            name: ".symtab".to_string(),
            sh_type: SHT_SYMTAB,
            flags: 0,
            align: 8,
            link: Some(".strtab".to_string()),
            info: 1,
            entsize: if self.is_64bit { 24 } else { 16 },
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
        let rodata_index = gen.section_index(".rodata").unwrap_or(2);
        for kernel in &placed {
            let symbol = |name: String, value: u64, size: u64, section: u16| ElfSymbolGen {
                name,
                value,
                size,
                info: (STB_GLOBAL << 4) | STT_OBJECT,
                other: 0,
                section: SymSection::Index(section),
            };
            gen.add_symbol(symbol(
                format!("__OpenCL_{}_metadata", kernel.name),
                kernel.metadata_at,
                kernel.metadata_size,
                rodata_index,
            ));
            gen.add_symbol(symbol(
                format!("__OpenCL_{}_header", kernel.name),
                kernel.header_at,
                kernel.header_size,
                rodata_index,
            ));
            gen.add_symbol(symbol(
                format!("__OpenCL_{}_kernel", kernel.name),
                kernel.kernel_at,
                kernel.kernel_size,
                text_index,
            ));
        }
        gen.to_writer(writer)
    }
}

/// A parsed AMD container borrowing its backing bytes
pub struct AmdMainBinary<'a> {
    elf: ElfBinary<'a>,
    kernel_names: Vec<String>,
}

impl<'a> AmdMainBinary<'a> {
    /// Parse the outer binary and index its kernels
    pub fn new(bytes: &'a [u8]) -> Result<Self, BinaryError> {
        let elf = ElfBinary::new(
            bytes,
            CreationFlags::SECTION_MAP | CreationFlags::SYMBOL_MAP,
        )?;
        let mut kernel_names = Vec::new();
        for sym in elf.symbols() {
            let name = elf.symbol_name(sym)?;
            if let Some(rest) = name.strip_prefix(b"__OpenCL_") {
                if let Some(kernel) = rest.strip_suffix(b"_kernel") {
                    kernel_names.push(String::from_utf8_lossy(kernel).into_owned());
                }
            }
        }
        Ok(Self { elf, kernel_names })
    }

    /// Names of the kernels in symbol order
    pub fn kernel_names(&self) -> &[String] {
        &self.kernel_names
    }

    fn symbol_payload(&self, section: &str, symbol: &str) -> Result<&'a [u8], BinaryError> {
        let sym = self.elf.symbol_by_name(symbol)?;
        let content = self.elf.section_content_by_name(section)?;
        content
            .get(sym.value as usize..(sym.value + sym.size) as usize)
            .ok_or(BinaryError::Malformed {
                what: "kernel symbol range",
            })
    }

    /// Inner-binary bytes of a kernel
    pub fn kernel_code(&self, name: &str) -> Result<&'a [u8], BinaryError> {
        self.symbol_payload(".text", &format!("__OpenCL_{name}_kernel"))
    }

    /// Metadata text of a kernel
    pub fn kernel_metadata(&self, name: &str) -> Result<&'a str, BinaryError> {
        let raw = self.symbol_payload(".rodata", &format!("__OpenCL_{name}_metadata"))?;
        let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
        std::str::from_utf8(raw).map_err(|_| BinaryError::Malformed {
            what: "kernel metadata text",
        })
    }

    /// The outer ELF
    pub fn elf(&self) -> &ElfBinary<'a> {
        &self.elf
    }
}

/// A parsed inner binary of one kernel
pub struct AmdInnerBinary<'a> {
    elf: ElfBinary<'a>,
    device: GpuDeviceType,
}

impl<'a> AmdInnerBinary<'a> {
    /// Parse an inner binary; the device comes from the machine field
    pub fn new(bytes: &'a [u8]) -> Result<Self, BinaryError> {
        let elf = ElfBinary::new(bytes, CreationFlags::SECTION_MAP)?;
        let device = amd_device_of_machine(elf.header().machine)?;
        Ok(Self { elf, device })
    }

    /// The GPU device the binary targets
    pub fn device(&self) -> GpuDeviceType {
        self.device
    }

    /// Machine code bytes
    pub fn code(&self) -> Result<&'a [u8], BinaryError> {
        self.elf.section_content_by_name(".text")
    }

    /// CAL notes from the note segments
    pub fn cal_notes(&self) -> Result<Vec<CalNote>, BinaryError> {
        let mut notes = Vec::new();
        for phdr in self.elf.program_headers() {
            if phdr.p_type != PT_NOTE {
                continue;
            }
            let data = self
                .elf
                .bytes()
                .get(phdr.offset as usize..(phdr.offset + phdr.filesz) as usize)
                .ok_or(BinaryError::Malformed { what: "note segment" })?;
            notes.extend(parse_cal_notes(data)?);
        }
        Ok(notes)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::fmt::ValueType;

    fn sample_gen() -> AmdBinGen {
        AmdBinGen {
            device: GpuDeviceType::Pitcairn,
            is_64bit: true,
            driver_info: "@(#) driver 1573.4".to_string(),
            kernels: vec![AmdKernelInput {
                name: "scale".to_string(),
                code: vec![0x04, 0x3d, 0x15, 0x80, 0x00, 0x00, 0x81, 0xbf],
                metadata: String::new(),
                header: vec![1, 0, 0, 0],
                args: vec![
                    KernelArg::global_pointer("out", "float*", 8, 0),
                    KernelArg::value("n", "uint", ValueType::U32, 4, 16),
                ],
                cal_notes: vec![CalNote {
                    n_type: calnote::PROGINFO,
                    data: vec![0x80, 0x2e, 0, 0, 0xc0, 0, 0, 0],
                }],
            }],
        }
    }

    #[test]
    fn test_container_roundtrip() {
        let gen = sample_gen();
        let mut bytes = Vec::new();
        gen.to_writer(&mut bytes).unwrap();

        let main = AmdMainBinary::new(&bytes).unwrap();
        assert_eq!(main.kernel_names(), &["scale".to_string()]);
        let metadata = main.kernel_metadata("scale").unwrap();
        assert!(metadata.starts_with(";ARGSTART:__OpenCL_scale_kernel"));
        assert!(metadata.contains(";device:pitcairn"));
        assert!(metadata.contains(";pointer:out:float:1:1:0:uav:12:4:RW:0:0"));
        assert!(metadata.contains(";value:n:uint:1:1:16"));
        assert!(metadata.ends_with(";ARGEND:__OpenCL_scale_kernel\n"));

        let inner_bytes = main.kernel_code("scale").unwrap();
        let inner = AmdInnerBinary::new(inner_bytes).unwrap();
        assert_eq!(inner.device(), GpuDeviceType::Pitcairn);
        assert_eq!(
            inner.code().unwrap(),
            &[0x04, 0x3d, 0x15, 0x80, 0x00, 0x00, 0x81, 0xbf]
        );
        let notes = inner.cal_notes().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].n_type, calnote::PROGINFO);
    }
}
