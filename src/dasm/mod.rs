//! The disassembler driver: one reader contract over the container
//! variants, kernel-by-kernel code recovery and listing generation
//! through the GCN decoder.

use crate::error::BinaryError;
use crate::fmt::amd::{AmdInnerBinary, AmdMainBinary};
use crate::fmt::amdcl2::AmdCl2MainBinary;
use crate::fmt::gallium::GalliumBinary;
use crate::gcn::decode::{DisasmConfig, GcnDisassembler};
use crate::gcn::{GcnGen, GpuDeviceType};

/// The container variants behind one reader interface
pub enum BinaryInput<'a> {
    /// Legacy AMD OpenCL 1.x container
    Amd(AmdMainBinary<'a>),
    /// AMD OpenCL 2.0 container
    AmdCl2(AmdCl2MainBinary<'a>),
    /// Gallium (Mesa) container
    Gallium(GalliumBinary<'a>),
}

impl<'a> BinaryInput<'a> {
    /// Kernel names of the container
    pub fn list_kernels(&self) -> Vec<String> {
        match self {
            BinaryInput::Amd(binary) => binary.kernel_names().to_vec(),
            BinaryInput::AmdCl2(binary) => binary.kernel_names().to_vec(),
            BinaryInput::Gallium(binary) => {
                binary.kernels().iter().map(|k| k.name.clone()).collect()
            }
        }
    }

    /// Machine code of one kernel
    pub fn kernel_code(&self, name: &str) -> Result<Vec<u8>, BinaryError> {
        match self {
            BinaryInput::Amd(binary) => {
                let inner = AmdInnerBinary::new(binary.kernel_code(name)?)?;
                Ok(inner.code()?.to_vec())
            }
            BinaryInput::AmdCl2(binary) => Ok(binary.kernel_content(name)?.to_vec()),
            BinaryInput::Gallium(binary) => {
                let code = binary.code()?;
                let kernel = binary
                    .kernels()
                    .iter()
                    .find(|k| k.name == name)
                    .ok_or_else(|| BinaryError::NotFound {
                        what: "Kernel",
                        name: name.to_string(),
                    })?;
                Ok(code.get(kernel.offset as usize..).unwrap_or(&[]).to_vec())
            }
        }
    }

    /// Metadata text of one kernel, where the container carries any
    pub fn kernel_metadata(&self, name: &str) -> Result<String, BinaryError> {
        match self {
            BinaryInput::Amd(binary) => Ok(binary.kernel_metadata(name)?.to_string()),
            BinaryInput::AmdCl2(binary) => {
                Ok(format!("{:?}", binary.kernel_metadata(name)?))
            }
            BinaryInput::Gallium(_) => Ok(String::new()),
        }
    }

    /// Device of the container, when it names one
    pub fn device(&self) -> Option<GpuDeviceType> {
        match self {
            BinaryInput::Amd(binary) => binary
                .kernel_names()
                .first()
                .and_then(|name| binary.kernel_code(name).ok())
                .and_then(|code| AmdInnerBinary::new(code).ok())
                .map(|inner| inner.device()),
            BinaryInput::AmdCl2(binary) => binary.device().ok(),
            BinaryInput::Gallium(_) => None,
        }
    }
}

/// Disassemble every kernel of a container into one listing
pub fn disassemble(input: &BinaryInput, gen: GcnGen) -> Result<String, BinaryError> {
    let mut out = String::new();
    let gen = input.device().map(|d| d.gen()).unwrap_or(gen);
    out.push_str(&format!(".gpu {}\n", gen_name(gen)));
    for (index, name) in input.list_kernels().into_iter().enumerate() {
        out.push_str(&format!(".kernel {name}\n"));
        let code = input.kernel_code(&name)?;
        let config = DisasmConfig::builder()
            .gen(gen)
            .section_index(index as u32)
            .build();
        let mut dasm = GcnDisassembler::new(config, &code);
        dasm.collect_labels();
        out.push_str(&dasm.disassemble());
    }
    Ok(out)
}

fn gen_name(gen: GcnGen) -> &'static str {
    match gen {
        GcnGen::Gcn10 => "GCN1.0",
        GcnGen::Gcn11 => "GCN1.1",
        GcnGen::Gcn12 => "GCN1.2",
        GcnGen::Gcn14 => "GCN1.4",
        GcnGen::Gcn141 => "GCN1.4.1",
        GcnGen::Gcn15 => "GCN1.5",
        GcnGen::Gcn151 => "GCN1.5.1",
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::fmt::amd::{AmdBinGen, AmdKernelInput};
    use crate::ToWriter;

    #[test]
    fn test_disassemble_amd_container() {
        let gen = AmdBinGen {
            device: GpuDeviceType::Pitcairn,
            is_64bit: false,
            driver_info: String::new(),
            kernels: vec![AmdKernelInput {
                name: "noop".to_string(),
                // s_add_u32 s21, s4, s61; s_endpgm
                code: vec![0x04, 0x3d, 0x15, 0x80, 0x00, 0x00, 0x81, 0xbf],
                metadata: String::new(),
                header: Vec::new(),
                args: Vec::new(),
                cal_notes: Vec::new(),
            }],
        };
        let mut bytes = Vec::new();
        gen.to_writer(&mut bytes).unwrap();
        let input = BinaryInput::Amd(AmdMainBinary::new(&bytes).unwrap());
        assert_eq!(input.list_kernels(), vec!["noop".to_string()]);
        let listing = disassemble(&input, GcnGen::Gcn10).unwrap();
        assert!(listing.starts_with(".gpu GCN1.0\n.kernel noop\n"));
        assert!(listing.contains("        s_add_u32       s21, s4, s61\n"));
        assert!(listing.contains("        s_endpgm\n"));
    }
}
