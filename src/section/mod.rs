//! The section and relocation model. Sections are append-mostly byte
//! buffers the assembler writes into at a tracked offset and patches when
//! expressions resolve; alongside the bytes each section carries code-flow
//! entries, register-variable usage records, linear-dependency spans,
//! wait-state annotations and a source-position map.

use crate::error::BinGenError;
use crate::expr::SymbolId;
use crate::source::{OffsetPosMap, SourcePos};
use bitflags::bitflags;

/// Id of a section within one assembly
pub type SectionId = u32;
/// Sentinel section id denoting an absolute value
pub const SECTION_ABS: SectionId = SectionId::MAX;
/// Sentinel section id denoting an unresolved symbol
pub const SECTION_UNDEF: SectionId = SectionId::MAX - 1;

/// Id of a kernel within one assembly
pub type KernelId = u32;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Attribute flags of a section
    pub struct SectionFlags: u32 {
        /// Content bytes are kept and patchable
        const WRITABLE = 1 << 0;
        /// Content may be read back by directives
        const READABLE = 1 << 1;
        /// Section holds executable code
        const EXECUTABLE = 1 << 2;
        /// Section is placed at an absolute address
        const ABS_ADDRESS = 1 << 3;
        /// Section participates in kernel code regions
        const CODE = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Broad classification of a section's payload
pub enum SectionKind {
    /// GPU machine code
    Code,
    /// Initialized data
    Data,
    /// Read-only data
    RoData,
    /// Uninitialized data, size only
    Bss,
    /// Kernel configuration payload
    Config,
    /// Format-specific extra section
    Extra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Kind of a code-flow entry
pub enum CodeFlowKind {
    /// Unconditional jump
    Jump,
    /// Conditional jump
    CondJump,
    /// Procedure call
    Call,
    /// Return from procedure
    Return,
    /// Start of code
    Start,
    /// End of code
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One code-flow entry: where it sits and where it leads
pub struct CodeFlowEntry {
    /// Offset of the entry in its section
    pub offset: u64,
    /// Jump target address; patched later when the target expression
    /// resolves
    pub target: u64,
    /// Kind of control transfer
    pub kind: CodeFlowKind,
}

/// Id of a register variable in the register-variable pool
pub type RegVarId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Register file a register variable lives in
pub enum RegKind {
    /// Scalar general-purpose register
    Sgpr,
    /// Vector general-purpose register
    Vgpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A logical register variable of a given type and size in registers
pub struct RegVar {
    /// Register file
    pub kind: RegKind,
    /// Number of consecutive hardware registers
    pub size: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// One element of a register-variable array, the key usage handlers track
pub struct SingleVReg {
    /// The register variable
    pub regvar: RegVarId,
    /// Index within the variable's array
    pub index: u16,
}

/// Place of a register operand within an instruction encoding
pub type RegField = u8;
/// No instruction field
pub const REG_FIELD_NONE: RegField = 0;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Read/write access of a register usage
    pub struct RegAccess: u8 {
        /// Register is read
        const READ = 1;
        /// Register is written
        const WRITE = 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Register-variable usage attached to a section offset
pub struct RegVarUsage {
    /// Byte offset of the instruction
    pub offset: u64,
    /// Used register variable; `None` for a hardware register
    pub regvar: Option<RegVarId>,
    /// First register of the range
    pub rstart: u16,
    /// One past the last register of the range
    pub rend: u16,
    /// Instruction field the range occupies
    pub field: RegField,
    /// Read/write flags
    pub access: RegAccess,
    /// Required register alignment
    pub align: u8,
    /// Usage came from an explicit use-register request
    pub use_reg_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Register liveness span the allocator must keep linear
pub struct RegVarLinearDep {
    /// Byte offset of the instruction
    pub offset: u64,
    /// The register variable
    pub regvar: RegVarId,
    /// First register of the range
    pub rstart: u16,
    /// One past the last register of the range
    pub rend: u16,
}

/// Maximum number of delayed-op types a target may configure
pub const MAX_DELAYED_OP_TYPES: usize = 8;
/// Maximum number of wait queues a target may configure
pub const MAX_WAIT_QUEUES: usize = 4;
/// Sentinel for an unused delayed-op slot
pub const DELAYED_OP_NONE: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Configuration of one delayed-op type
pub struct DelayedOpType {
    /// Wait queue the op counts against
    pub wait_queue: u8,
    /// Queue drains in issue order
    pub ordered: bool,
    /// Waiting finishes on register read-out rather than on the operation
    pub finish_on_reg_readout: bool,
    /// Counting unit: 255 per instruction, 1–254 per element size
    pub counting: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Per-target wait-system configuration: the queues and delayed-op types
/// the generation's hazard discipline defines
pub struct WaitConfig {
    /// Number of configured delayed-op types
    pub delayed_op_types_num: usize,
    /// Number of configured wait queues
    pub wait_queues_num: usize,
    /// Delayed-op type table
    pub delayed_op_types: [DelayedOpType; MAX_DELAYED_OP_TYPES],
    /// Depth of each wait queue
    pub wait_queue_sizes: [u16; MAX_WAIT_QUEUES],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A result that becomes visible after its wait queue drains
pub struct DelayedOp {
    /// Byte offset of the instruction
    pub offset: u64,
    /// Destination register variable; `None` for a hardware register
    pub regvar: Option<RegVarId>,
    /// First register of the result range
    pub rstart: u16,
    /// One past the last register of the result range
    pub rend: u16,
    /// Number of queue units the op occupies
    pub count: u8,
    /// Primary delayed-op type
    pub op_type: u8,
    /// Secondary delayed-op type, `DELAYED_OP_NONE` if unused
    pub op_type2: u8,
    /// Access of the primary result
    pub access: RegAccess,
    /// Access of the secondary result
    pub access2: RegAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A wait instruction: stall until each queue drains to its bound
pub struct WaitInstr {
    /// Byte offset of the instruction
    pub offset: u64,
    /// Per-queue bounds to wait down to
    pub waits: [u16; MAX_WAIT_QUEUES],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Kind of value a relocation patches in
pub enum RelocKind {
    /// Low 32 bits of the value
    Low32,
    /// High 32 bits of the value
    High32,
    /// The whole value
    Whole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What a relocation is computed against
pub enum RelocRef {
    /// A symbol
    Symbol(SymbolId),
    /// A target section's base
    Section(SectionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A relocation pending for the output binary
pub struct Relocation {
    /// Section holding the patched field
    pub section: SectionId,
    /// Offset of the patched field
    pub offset: u64,
    /// Which part of the value lands in the field
    pub kind: RelocKind,
    /// Symbol or section the value is computed against
    pub target: RelocRef,
    /// Constant added to the target
    pub addend: u64,
}

#[derive(Debug, Clone)]
/// An assembler section
pub struct Section {
    /// Section name
    pub name: String,
    /// Owning kernel, if the section belongs to one
    pub kernel_id: Option<KernelId>,
    /// Payload classification
    pub kind: SectionKind,
    /// Attribute flags
    pub flags: SectionFlags,
    /// Required alignment of the section start
    pub alignment: u64,
    /// Size of a non-writable section; writable sections measure their
    /// content instead
    pub size: u64,
    /// Relative space the section is placed in, once layout assigns one
    pub rel_space: Option<u32>,
    /// Address within the relative space
    pub rel_address: u64,
    /// Content bytes; only writable sections carry any
    pub content: Vec<u8>,
    /// Code-flow entries in append order
    pub code_flow: Vec<CodeFlowEntry>,
    /// Register-variable usage records in offset order
    pub reg_usages: Vec<RegVarUsage>,
    /// Register liveness spans in offset order
    pub linear_deps: Vec<RegVarLinearDep>,
    /// Delayed-op records in offset order
    pub delayed_ops: Vec<DelayedOp>,
    /// Wait instructions in offset order
    pub wait_instrs: Vec<WaitInstr>,
    /// Map from content offsets back to source positions
    pub source_map: OffsetPosMap,
}

impl Section {
    /// Create an empty section
    pub fn new(name: impl Into<String>, kind: SectionKind, flags: SectionFlags) -> Self {
        Self {
            name: name.into(),
            kernel_id: None,
            kind,
            flags,
            alignment: 0,
            size: 0,
            rel_space: None,
            rel_address: 0,
            content: Vec::new(),
            code_flow: Vec::new(),
            reg_usages: Vec::new(),
            linear_deps: Vec::new(),
            delayed_ops: Vec::new(),
            wait_instrs: Vec::new(),
            source_map: OffsetPosMap::default(),
        }
    }

    /// Current size: content length for writable sections, the reserved
    /// size otherwise
    pub fn len(&self) -> u64 {
        if self.flags.contains(SectionFlags::WRITABLE) {
            self.content.len() as u64
        } else {
            self.size
        }
    }

    /// True when nothing has been emitted or reserved
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append bytes at the current offset, returning the offset they
    /// landed at
    pub fn emit(&mut self, bytes: &[u8]) -> u64 {
        let offset = self.content.len() as u64;
        self.content.extend_from_slice(bytes);
        offset
    }

    /// Append bytes and record the source position that produced them
    pub fn emit_at(&mut self, bytes: &[u8], pos: SourcePos) -> u64 {
        let offset = self.emit(bytes);
        self.source_map.push(offset, pos);
        offset
    }

    /// Grow a non-writable section without content
    pub fn reserve(&mut self, len: u64) {
        self.size += len;
    }

    /// Round the section up to `alignment` with zero fill, returning the
    /// new offset
    pub fn align_to(&mut self, alignment: u64) -> u64 {
        if alignment > 1 {
            let len = self.len();
            let padded = len.next_multiple_of(alignment);
            if self.flags.contains(SectionFlags::WRITABLE) {
                self.content.resize(padded as usize, 0);
            } else {
                self.size = padded;
            }
        }
        self.len()
    }

    /// Overwrite previously emitted bytes once their expression resolved
    pub fn patch(&mut self, offset: u64, bytes: &[u8]) -> Result<(), BinGenError> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.content.len() {
            return Err(BinGenError::Invalid {
                what: "Patch outside of section content",
            });
        }
        self.content[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Append a code-flow entry
    pub fn add_code_flow(&mut self, entry: CodeFlowEntry) {
        self.code_flow.push(entry);
    }
}

#[derive(Debug, Clone)]
/// A kernel: a named entry point and the code regions that belong to it
pub struct Kernel {
    /// Kernel name
    pub name: String,
    /// Where the kernel was declared
    pub pos: SourcePos,
    /// Open/close offset pairs of the kernel's executable ranges
    pub code_regions: Vec<(u64, u64)>,
}

impl Kernel {
    /// Declare a kernel
    pub fn new(name: impl Into<String>, pos: SourcePos) -> Self {
        Self {
            name: name.into(),
            pos,
            code_regions: Vec::new(),
        }
    }

    /// Open a code region at `offset`; a still-open region is closed first
    pub fn open_code_region(&mut self, offset: u64) {
        self.close_code_region(offset);
        self.code_regions.push((offset, u64::MAX));
    }

    /// Close the open code region, if any, at `offset`
    pub fn close_code_region(&mut self, offset: u64) {
        if let Some(last) = self.code_regions.last_mut() {
            if last.1 == u64::MAX {
                last.1 = offset;
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    fn code_section() -> Section {
        Section::new(
            ".text",
            SectionKind::Code,
            SectionFlags::WRITABLE | SectionFlags::EXECUTABLE | SectionFlags::CODE,
        )
    }

    #[test]
    fn test_emit_align_patch() {
        let mut section = code_section();
        assert_eq!(section.emit(&[1, 2, 3]), 0);
        assert_eq!(section.align_to(8), 8);
        assert_eq!(&section.content[3..8], &[0, 0, 0, 0, 0]);
        assert_eq!(section.emit(&[9]), 8);
        section.patch(1, &[7, 7]).unwrap();
        assert_eq!(&section.content[..4], &[1, 7, 7, 0]);
        assert!(section.patch(8, &[0, 0]).is_err());
    }

    #[test]
    fn test_reserved_section() {
        let mut section = Section::new(".bss", SectionKind::Bss, SectionFlags::READABLE);
        section.reserve(10);
        assert_eq!(section.len(), 10);
        assert_eq!(section.align_to(16), 16);
        assert!(section.content.is_empty());
    }

    #[test]
    fn test_kernel_regions() {
        let pos = SourcePos {
            file: "test.s".into(),
            line: 1,
            col: 1,
        };
        let mut kernel = Kernel::new("vadd", pos);
        kernel.open_code_region(0);
        kernel.open_code_region(0x40);
        kernel.close_code_region(0x80);
        assert_eq!(kernel.code_regions, vec![(0, 0x40), (0x40, 0x80)]);
    }
}
