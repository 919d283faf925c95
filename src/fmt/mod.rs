//! The AMD container layers above the generic ELF engine, plus the
//! abstractions they all share: the kernel-argument descriptor, the CAL
//! note records of the legacy format and the machine-code/device tables.
//! Every container variant exposes the same reader contract: list the
//! kernels, hand out their code, hand out their metadata.

use num_derive::{FromPrimitive, ToPrimitive};

use crate::error::BinaryError;
use crate::gcn::GpuDeviceType;

pub mod amd;
pub mod amdcl2;
pub mod detect;
pub mod gallium;
pub mod msgpack;
pub mod rocm;

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
/// Semantic class of a kernel argument
pub enum ArgSemantic {
    Value = 0,
    Pointer,
    Image,
    Sampler,
    Pipe,
    Queue,
    Structure,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
/// Access qualifier of a kernel argument
pub enum AccessQual {
    Default = 0,
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
/// Address space of a pointer argument
pub enum AddressSpace {
    None = 0,
    Private,
    Global,
    Constant,
    Local,
    Generic,
    Region,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
/// What the argument slot carries at dispatch time
pub enum ValueKind {
    ByValue = 0,
    GlobalBuffer,
    DynSharedPointer,
    Sampler,
    Image,
    Pipe,
    Queue,
    HiddenGlobalOffsetX,
    HiddenGlobalOffsetY,
    HiddenGlobalOffsetZ,
    HiddenNone,
    HiddenPrintfBuffer,
    HiddenDefaultQueue,
    HiddenCompletionAction,
    HiddenMultigridSyncArg,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
/// Element type of a by-value argument
pub enum ValueType {
    Structure = 0,
    I8,
    U8,
    I16,
    U16,
    F16,
    I32,
    U32,
    F32,
    I64,
    U64,
    F64,
}

#[derive(Debug, Clone, PartialEq)]
/// The kernel-argument descriptor every container maps into its own
/// wire form
pub struct KernelArg {
    /// Argument name
    pub name: String,
    /// Source-language type name
    pub type_name: String,
    /// Semantic class
    pub semantic: ArgSemantic,
    /// Access qualifier
    pub access: AccessQual,
    /// Actual access observed by the compiler
    pub actual_access: AccessQual,
    /// Address space of pointers
    pub address_space: AddressSpace,
    /// Value kind at dispatch
    pub value_kind: ValueKind,
    /// Element type
    pub value_type: ValueType,
    /// Size in the kernel-argument buffer
    pub size: u64,
    /// Offset in the kernel-argument buffer
    pub offset: u64,
    /// Alignment of the pointee
    pub pointee_align: u64,
    /// `const` qualifier
    pub is_const: bool,
    /// `restrict` qualifier
    pub is_restrict: bool,
    /// `volatile` qualifier
    pub is_volatile: bool,
    /// `pipe` qualifier
    pub is_pipe: bool,
}

impl KernelArg {
    /// A plain by-value argument
    pub fn value(name: &str, type_name: &str, value_type: ValueType, size: u64, offset: u64) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            semantic: ArgSemantic::Value,
            access: AccessQual::Default,
            actual_access: AccessQual::Default,
            address_space: AddressSpace::None,
            value_kind: ValueKind::ByValue,
            value_type,
            size,
            offset,
            pointee_align: 0,
            is_const: false,
            is_restrict: false,
            is_volatile: false,
            is_pipe: false,
        }
    }

    /// A global-buffer pointer argument
    pub fn global_pointer(name: &str, type_name: &str, size: u64, offset: u64) -> Self {
        Self {
            semantic: ArgSemantic::Pointer,
            address_space: AddressSpace::Global,
            value_kind: ValueKind::GlobalBuffer,
            ..Self::value(name, type_name, ValueType::Structure, size, offset)
        }
    }
}

/// CAL note types carried in the program headers of the legacy AMD
/// inner binaries
pub mod calnote {
    /// Program info key/value table
    pub const PROGINFO: u32 = 1;
    /// Input resources
    pub const INPUTS: u32 = 2;
    /// Output resources
    pub const OUTPUTS: u32 = 3;
    /// Condition-out register
    pub const CONDOUT: u32 = 4;
    /// Float constants
    pub const FLOATCONSTS: u32 = 5;
    /// Integer constants
    pub const INTCONSTS: u32 = 6;
    /// Boolean constants
    pub const BOOLCONSTS: u32 = 7;
    /// Early exit
    pub const EARLYEXIT: u32 = 8;
    /// Global buffers
    pub const GLOBAL_BUFFERS: u32 = 9;
    /// Constant buffers
    pub const CONSTANT_BUFFERS: u32 = 10;
    /// Input samplers
    pub const INPUT_SAMPLERS: u32 = 11;
    /// Scratch buffers
    pub const SCRATCH_BUFFERS: u32 = 13;
    /// Persistent buffers
    pub const PERSISTENT_BUFFERS: u32 = 12;
    /// Sub-constant buffers
    pub const SUB_CONSTANT_BUFFERS: u32 = 14;
    /// UAV mailbox size
    pub const UAV_MAILBOX_SIZE: u32 = 15;
    /// UAV resources
    pub const UAV: u32 = 16;
    /// UAV operation mask
    pub const UAV_OP_MASK: u32 = 17;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One CAL note: a typed record nested in an inner-binary program header
pub struct CalNote {
    /// Note type, one of [`calnote`]
    pub n_type: u32,
    /// Payload bytes
    pub data: Vec<u8>,
}

/// The name every CAL note carries
pub const CALNOTE_NAME: &[u8; 8] = b"ATI CAL\0";

/// Parse a CAL-note stream out of a program-header segment
pub fn parse_cal_notes(data: &[u8]) -> Result<Vec<CalNote>, BinaryError> {
    let mut notes = Vec::new();
    let mut at = 0usize;
    while at + 16 <= data.len() {
        let name_size = crate::elf::get_u32(data, at).unwrap_or(0) as usize;
        let desc_size = crate::elf::get_u32(data, at + 4).unwrap_or(0) as usize;
        let n_type = crate::elf::get_u32(data, at + 8).unwrap_or(0);
        let payload_at = at + 12 + name_size;
        if name_size != 8 || payload_at + desc_size > data.len() {
            return Err(BinaryError::Malformed { what: "CAL note" });
        }
        notes.push(CalNote {
            n_type,
            data: data[payload_at..payload_at + desc_size].to_vec(),
        });
        at = payload_at + desc_size;
    }
    Ok(notes)
}

/// Serialize a CAL-note stream
pub fn write_cal_notes(notes: &[CalNote]) -> Vec<u8> {
    let mut out = Vec::new();
    for note in notes {
        crate::elf::put_u32(&mut out, 8);
        crate::elf::put_u32(&mut out, note.data.len() as u32);
        crate::elf::put_u32(&mut out, note.n_type);
        out.extend_from_slice(CALNOTE_NAME);
        out.extend_from_slice(&note.data);
    }
    out
}

/// Machine code of a device in the legacy AMD inner binaries
pub fn amd_machine_code(device: GpuDeviceType) -> u16 {
    use GpuDeviceType::*;
    match device {
        CapeVerde => 0x1c,
        Pitcairn => 0x1b,
        Tahiti => 0x1a,
        Oland => 0x20,
        Bonaire => 0x21,
        Spectre => 0x22,
        Spooky => 0x23,
        Kalindi => 0x24,
        Hainan => 0x25,
        Hawaii => 0x27,
        Iceland => 0x29,
        Tonga => 0x2a,
        Mullins => 0x2b,
        Fiji => 0x2d,
        Carrizo => 0x2e,
        _ => 0x2f,
    }
}

/// Device of a machine code in the legacy AMD inner binaries
pub fn amd_device_of_machine(code: u16) -> Result<GpuDeviceType, BinaryError> {
    use GpuDeviceType::*;
    Ok(match code {
        0x1c => CapeVerde,
        0x1b => Pitcairn,
        0x1a => Tahiti,
        0x20 => Oland,
        0x21 => Bonaire,
        0x22 => Spectre,
        0x23 => Spooky,
        0x24 => Kalindi,
        0x25 => Hainan,
        0x27 => Hawaii,
        0x29 => Iceland,
        0x2a => Tonga,
        0x2b => Mullins,
        0x2d => Fiji,
        0x2e => Carrizo,
        0x2f => Stoney,
        _ => return Err(BinaryError::UnknownDevice { code: code as u32 }),
    })
}

/// Driver-version ranges with distinct machine-code tables in the
/// OpenCL 2.0 container; the returned base is added to the legacy code
pub fn amdcl2_code_base(driver_version: u32) -> u32 {
    match driver_version {
        0..=191205 => 0,
        191206..=200405 => 1,
        200406..=203602 => 2,
        203603..=223600 => 3,
        223601..=226400 => 4,
        226401..=234800 => 5,
        234801..=244200 => 6,
        _ => 7,
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cal_note_roundtrip() {
        let notes = vec![
            CalNote {
                n_type: calnote::PROGINFO,
                data: vec![1, 2, 3, 4, 5, 6, 7, 8],
            },
            CalNote {
                n_type: calnote::UAV,
                data: vec![],
            },
        ];
        let bytes = write_cal_notes(&notes);
        assert_eq!(parse_cal_notes(&bytes).unwrap(), notes);
        assert!(parse_cal_notes(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn test_machine_code_tables() {
        assert_eq!(
            amd_device_of_machine(amd_machine_code(GpuDeviceType::Pitcairn)).unwrap(),
            GpuDeviceType::Pitcairn
        );
        assert!(amd_device_of_machine(0xffff).is_err());
        assert_eq!(amdcl2_code_base(150000), 0);
        assert_eq!(amdcl2_code_base(200406), 2);
        assert!(amdcl2_code_base(250000) == 7);
    }
}
