//! The instruction table the encoder and decoder dispatch through. Every
//! entry binds a mnemonic to an encoding, an opcode value, an operand-shape
//! mode and the mask of generations the opcode value is correct for. One
//! mnemonic may carry several entries when opcode numbering moved between
//! generations.

use super::ArchMask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Machine encodings of the GCN instruction set
pub enum GcnEncoding {
    /// Scalar two-operand
    Sop2,
    /// Scalar with 16-bit immediate
    Sopk,
    /// Scalar one-operand
    Sop1,
    /// Scalar compare
    Sopc,
    /// Scalar program control
    Sopp,
    /// Scalar memory read (GCN 1.0/1.1)
    Smrd,
    /// Scalar memory (GCN 1.2+)
    Smem,
    /// Vector two-operand
    Vop2,
    /// Vector one-operand
    Vop1,
    /// Vector compare
    Vopc,
    /// Vector three-operand
    Vop3,
    /// Parameter interpolation
    Vintrp,
    /// Local data share
    Ds,
    /// Untyped buffer access
    Mubuf,
    /// Typed buffer access
    Mtbuf,
    /// Image access
    Mimg,
    /// Export
    Exp,
    /// Flat memory access
    Flat,
    /// Flat scratch access (GCN 1.4+)
    Scratch,
    /// Flat global access (GCN 1.4+)
    Global,
}

/// 64-bit destination (or two-register destination)
pub const M_DST64: u32 = 1 << 0;
/// 64-bit first source
pub const M_SRC0_64: u32 = 1 << 1;
/// 64-bit second source
pub const M_SRC1_64: u32 = 1 << 2;
/// 64-bit third source
pub const M_SRC2_64: u32 = 1 << 3;
/// No destination operand
pub const M_NO_DST: u32 = 1 << 4;
/// No source operands
pub const M_NO_SRC: u32 = 1 << 5;
/// Destination only
pub const M_ONLY_DST: u32 = M_NO_SRC;
/// SOPK/SOPP: a 32-bit literal follows the instruction word
pub const M_IMM32: u32 = 1 << 6;
/// SOPK: `hwreg(...)` occupies the immediate, destination is a register
pub const M_HWREG_DST: u32 = 1 << 7;
/// SOPK: `hwreg(...)` occupies the immediate, source is a register
pub const M_HWREG_SRC: u32 = 1 << 8;
/// The 16-bit immediate is a relative branch target
pub const M_BRANCH: u32 = 1 << 9;
/// SOPP: wait-count expression operand
pub const M_WAITCNT: u32 = 1 << 10;
/// SOPP: send-message expression operand
pub const M_SENDMSG: u32 = 1 << 11;
/// SOPP/SOPK: plain 16-bit immediate operand
pub const M_IMM16: u32 = 1 << 12;
/// VOP2: the implicit carry destination is spelled (`vcc` after vdst)
pub const M_VCC_SDST: u32 = 1 << 13;
/// VOP2: a trailing `vcc` source is spelled
pub const M_VCC_SSRC: u32 = 1 << 14;
/// VOP2: `vdst, src0, literal, vsrc1`
pub const M_MADMK: u32 = 1 << 15;
/// VOP2: `vdst, src0, vsrc1, literal`
pub const M_MADAK: u32 = 1 << 16;
/// Literals are 16-bit floats
pub const M_F16: u32 = 1 << 17;
/// SMRD/SMEM: four-register buffer resource base
pub const M_SBASE4: u32 = 1 << 18;
/// Memory operation writes to memory
pub const M_STORE: u32 = 1 << 19;
/// DS: has a vector destination
pub const M_DS_DST: u32 = 1 << 20;
/// DS: has a first data operand
pub const M_DS_D0: u32 = 1 << 21;
/// DS: has a second data operand
pub const M_DS_D1: u32 = 1 << 22;
/// DS: two 8-bit offsets instead of one 16-bit offset
pub const M_DS_2OFF: u32 = 1 << 23;
/// MIMG: a sampler resource follows the texture resource
pub const M_MIMG_SAMPLE: u32 = 1 << 28;
/// VOP3: second (scalar) destination
pub const M_VOP3B: u32 = 1 << 29;

/// Pack a data-register count (1..=16) into the mode word
pub const fn m_nregs(n: u32) -> u32 {
    (n - 1) << 24
}

/// Data-register count of a mode word
pub const fn mode_nregs(mode: u32) -> u16 {
    (((mode >> 24) & 15) + 1) as u16
}

/// VOP3: number of sources (1..=3); zero means two
pub const fn m_nsrc(n: u32) -> u32 {
    n << 30
}

/// VOP3 source count of a mode word
pub const fn mode_nsrc(mode: u32) -> usize {
    let n = (mode >> 30) & 3;
    if n == 0 {
        2
    } else {
        n as usize
    }
}

#[derive(Debug, Clone, Copy)]
/// One instruction-table entry
pub struct GcnInstruction {
    /// Mnemonic text
    pub mnemonic: &'static str,
    /// Machine encoding the mnemonic belongs to
    pub encoding: GcnEncoding,
    /// Operand-shape mode bits
    pub mode: u32,
    /// Opcode value within the encoding
    pub code: u16,
    /// Generations this opcode value holds on
    pub arch_mask: ArchMask,
}

macro_rules! ins {
    ($mn:literal, $enc:ident, $mode:expr, $code:expr, $mask:expr) => {
        GcnInstruction {
            mnemonic: $mn,
            encoding: GcnEncoding::$enc,
            mode: $mode,
            code: $code,
            arch_mask: $mask,
        }
    };
}

const A01: ArchMask = ArchMask::GCN1_01;
const A24: ArchMask = ArchMask::GCN1_24;
const A245: ArchMask = ArchMask::GCN1_25;
const A4: ArchMask = ArchMask::GCN1_4;
const A5: ArchMask = ArchMask::GCN1_5;
const AALL: ArchMask = ArchMask::ALL;
const A15: ArchMask = ArchMask::GCN1_15;

/// The instruction table
pub static GCN_INSTRUCTIONS: &[GcnInstruction] = &[
    // SOP2
    ins!("s_add_u32", Sop2, 0, 0, AALL),
    ins!("s_sub_u32", Sop2, 0, 1, AALL),
    ins!("s_add_i32", Sop2, 0, 2, AALL),
    ins!("s_sub_i32", Sop2, 0, 3, AALL),
    ins!("s_addc_u32", Sop2, 0, 4, AALL),
    ins!("s_subb_u32", Sop2, 0, 5, AALL),
    ins!("s_min_i32", Sop2, 0, 6, AALL),
    ins!("s_min_u32", Sop2, 0, 7, AALL),
    ins!("s_max_i32", Sop2, 0, 8, AALL),
    ins!("s_max_u32", Sop2, 0, 9, AALL),
    ins!("s_cselect_b32", Sop2, 0, 10, AALL),
    ins!("s_cselect_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 11, AALL),
    ins!("s_and_b32", Sop2, 0, 14, A01),
    ins!("s_and_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 15, A01),
    ins!("s_or_b32", Sop2, 0, 16, A01),
    ins!("s_or_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 17, A01),
    ins!("s_xor_b32", Sop2, 0, 18, A01),
    ins!("s_xor_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 19, A01),
    ins!("s_andn2_b32", Sop2, 0, 20, A01),
    ins!("s_andn2_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 21, A01),
    ins!("s_orn2_b32", Sop2, 0, 22, A01),
    ins!("s_orn2_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 23, A01),
    ins!("s_nand_b32", Sop2, 0, 24, A01),
    ins!("s_nand_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 25, A01),
    ins!("s_nor_b32", Sop2, 0, 26, A01),
    ins!("s_nor_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 27, A01),
    ins!("s_xnor_b32", Sop2, 0, 28, A01),
    ins!("s_xnor_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 29, A01),
    ins!("s_lshl_b32", Sop2, 0, 30, A01),
    ins!("s_lshl_b64", Sop2, M_DST64 | M_SRC0_64, 31, A01),
    ins!("s_lshr_b32", Sop2, 0, 32, A01),
    ins!("s_lshr_b64", Sop2, M_DST64 | M_SRC0_64, 33, A01),
    ins!("s_ashr_i32", Sop2, 0, 34, A01),
    ins!("s_ashr_i64", Sop2, M_DST64 | M_SRC0_64, 35, A01),
    ins!("s_bfm_b32", Sop2, 0, 36, A01),
    ins!("s_bfm_b64", Sop2, M_DST64, 37, A01),
    ins!("s_mul_i32", Sop2, 0, 38, A01),
    ins!("s_bfe_u32", Sop2, 0, 39, A01),
    ins!("s_bfe_i32", Sop2, 0, 40, A01),
    ins!("s_bfe_u64", Sop2, M_DST64 | M_SRC0_64, 41, A01),
    ins!("s_bfe_i64", Sop2, M_DST64 | M_SRC0_64, 42, A01),
    ins!("s_cbranch_g_fork", Sop2, M_NO_DST | M_SRC0_64 | M_SRC1_64, 43, A01),
    ins!("s_absdiff_i32", Sop2, 0, 44, A01),
    ins!("s_and_b32", Sop2, 0, 12, A245),
    ins!("s_and_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 13, A245),
    ins!("s_or_b32", Sop2, 0, 14, A245),
    ins!("s_or_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 15, A245),
    ins!("s_xor_b32", Sop2, 0, 16, A245),
    ins!("s_xor_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 17, A245),
    ins!("s_andn2_b32", Sop2, 0, 18, A245),
    ins!("s_andn2_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 19, A245),
    ins!("s_orn2_b32", Sop2, 0, 20, A245),
    ins!("s_orn2_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 21, A245),
    ins!("s_nand_b32", Sop2, 0, 22, A245),
    ins!("s_nand_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 23, A245),
    ins!("s_nor_b32", Sop2, 0, 24, A245),
    ins!("s_nor_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 25, A245),
    ins!("s_xnor_b32", Sop2, 0, 26, A245),
    ins!("s_xnor_b64", Sop2, M_DST64 | M_SRC0_64 | M_SRC1_64, 27, A245),
    ins!("s_lshl_b32", Sop2, 0, 28, A245),
    ins!("s_lshl_b64", Sop2, M_DST64 | M_SRC0_64, 29, A245),
    ins!("s_lshr_b32", Sop2, 0, 30, A245),
    ins!("s_lshr_b64", Sop2, M_DST64 | M_SRC0_64, 31, A245),
    ins!("s_ashr_i32", Sop2, 0, 32, A245),
    ins!("s_ashr_i64", Sop2, M_DST64 | M_SRC0_64, 33, A245),
    ins!("s_bfm_b32", Sop2, 0, 34, A245),
    ins!("s_bfm_b64", Sop2, M_DST64, 35, A245),
    ins!("s_mul_i32", Sop2, 0, 36, A245),
    ins!("s_bfe_u32", Sop2, 0, 37, A245),
    ins!("s_bfe_i32", Sop2, 0, 38, A245),
    ins!("s_bfe_u64", Sop2, M_DST64 | M_SRC0_64, 39, A245),
    ins!("s_bfe_i64", Sop2, M_DST64 | M_SRC0_64, 40, A245),
    ins!("s_cbranch_g_fork", Sop2, M_NO_DST | M_SRC0_64 | M_SRC1_64, 41, A24),
    ins!("s_absdiff_i32", Sop2, 0, 42, A245),
    ins!("s_rfe_restore_b64", Sop2, M_NO_DST | M_SRC0_64, 43, A24),
    // SOPK
    ins!("s_movk_i32", Sopk, M_IMM16, 0, AALL),
    ins!("s_cmovk_i32", Sopk, M_IMM16, 2, A01),
    ins!("s_cmpk_eq_i32", Sopk, M_IMM16, 3, A01),
    ins!("s_cmpk_lg_i32", Sopk, M_IMM16, 4, A01),
    ins!("s_cmpk_gt_i32", Sopk, M_IMM16, 5, A01),
    ins!("s_cmpk_ge_i32", Sopk, M_IMM16, 6, A01),
    ins!("s_cmpk_lt_i32", Sopk, M_IMM16, 7, A01),
    ins!("s_cmpk_le_i32", Sopk, M_IMM16, 8, A01),
    ins!("s_cmpk_eq_u32", Sopk, M_IMM16, 9, A01),
    ins!("s_cmpk_lg_u32", Sopk, M_IMM16, 10, A01),
    ins!("s_cmpk_gt_u32", Sopk, M_IMM16, 11, A01),
    ins!("s_cmpk_ge_u32", Sopk, M_IMM16, 12, A01),
    ins!("s_cmpk_lt_u32", Sopk, M_IMM16, 13, A01),
    ins!("s_cmpk_le_u32", Sopk, M_IMM16, 14, A01),
    ins!("s_addk_i32", Sopk, M_IMM16, 15, A01),
    ins!("s_mulk_i32", Sopk, M_IMM16, 16, A01),
    ins!("s_cbranch_i_fork", Sopk, M_BRANCH | M_SRC0_64, 17, A01),
    ins!("s_getreg_b32", Sopk, M_HWREG_SRC, 18, A01),
    ins!("s_setreg_b32", Sopk, M_HWREG_DST, 19, A01),
    ins!("s_setreg_imm32_b32", Sopk, M_HWREG_DST | M_IMM32, 21, A01),
    ins!("s_cmovk_i32", Sopk, M_IMM16, 1, A245),
    ins!("s_cmpk_eq_i32", Sopk, M_IMM16, 2, A245),
    ins!("s_cmpk_lg_i32", Sopk, M_IMM16, 3, A245),
    ins!("s_cmpk_gt_i32", Sopk, M_IMM16, 4, A245),
    ins!("s_cmpk_ge_i32", Sopk, M_IMM16, 5, A245),
    ins!("s_cmpk_lt_i32", Sopk, M_IMM16, 6, A245),
    ins!("s_cmpk_le_i32", Sopk, M_IMM16, 7, A245),
    ins!("s_cmpk_eq_u32", Sopk, M_IMM16, 8, A245),
    ins!("s_cmpk_lg_u32", Sopk, M_IMM16, 9, A245),
    ins!("s_cmpk_gt_u32", Sopk, M_IMM16, 10, A245),
    ins!("s_cmpk_ge_u32", Sopk, M_IMM16, 11, A245),
    ins!("s_cmpk_lt_u32", Sopk, M_IMM16, 12, A245),
    ins!("s_cmpk_le_u32", Sopk, M_IMM16, 13, A245),
    ins!("s_addk_i32", Sopk, M_IMM16, 14, A245),
    ins!("s_mulk_i32", Sopk, M_IMM16, 15, A245),
    ins!("s_cbranch_i_fork", Sopk, M_BRANCH | M_SRC0_64, 16, A24),
    ins!("s_getreg_b32", Sopk, M_HWREG_SRC, 17, A245),
    ins!("s_setreg_b32", Sopk, M_HWREG_DST, 18, A245),
    ins!("s_setreg_imm32_b32", Sopk, M_HWREG_DST | M_IMM32, 20, A245),
    ins!("s_call_b64", Sopk, M_BRANCH | M_DST64, 21, A4),
    // SOP1
    ins!("s_mov_b32", Sop1, 0, 3, A01),
    ins!("s_mov_b64", Sop1, M_DST64 | M_SRC0_64, 4, A01),
    ins!("s_cmov_b32", Sop1, 0, 5, A01),
    ins!("s_cmov_b64", Sop1, M_DST64 | M_SRC0_64, 6, A01),
    ins!("s_not_b32", Sop1, 0, 7, A01),
    ins!("s_not_b64", Sop1, M_DST64 | M_SRC0_64, 8, A01),
    ins!("s_wqm_b32", Sop1, 0, 9, A01),
    ins!("s_wqm_b64", Sop1, M_DST64 | M_SRC0_64, 10, A01),
    ins!("s_brev_b32", Sop1, 0, 11, A01),
    ins!("s_brev_b64", Sop1, M_DST64 | M_SRC0_64, 12, A01),
    ins!("s_bcnt0_i32_b32", Sop1, 0, 13, A01),
    ins!("s_bcnt0_i32_b64", Sop1, M_SRC0_64, 14, A01),
    ins!("s_bcnt1_i32_b32", Sop1, 0, 15, A01),
    ins!("s_bcnt1_i32_b64", Sop1, M_SRC0_64, 16, A01),
    ins!("s_ff0_i32_b32", Sop1, 0, 17, A01),
    ins!("s_ff0_i32_b64", Sop1, M_SRC0_64, 18, A01),
    ins!("s_ff1_i32_b32", Sop1, 0, 19, A01),
    ins!("s_ff1_i32_b64", Sop1, M_SRC0_64, 20, A01),
    ins!("s_flbit_i32_b32", Sop1, 0, 21, A01),
    ins!("s_flbit_i32_b64", Sop1, M_SRC0_64, 22, A01),
    ins!("s_flbit_i32", Sop1, 0, 23, A01),
    ins!("s_flbit_i32_i64", Sop1, M_SRC0_64, 24, A01),
    ins!("s_sext_i32_i8", Sop1, 0, 25, A01),
    ins!("s_sext_i32_i16", Sop1, 0, 26, A01),
    ins!("s_bitset0_b32", Sop1, 0, 27, A01),
    ins!("s_bitset0_b64", Sop1, M_DST64, 28, A01),
    ins!("s_bitset1_b32", Sop1, 0, 29, A01),
    ins!("s_bitset1_b64", Sop1, M_DST64, 30, A01),
    ins!("s_getpc_b64", Sop1, M_ONLY_DST | M_DST64, 31, A01),
    ins!("s_setpc_b64", Sop1, M_NO_DST | M_SRC0_64, 32, A01),
    ins!("s_swappc_b64", Sop1, M_DST64 | M_SRC0_64, 33, A01),
    ins!("s_rfe_b64", Sop1, M_NO_DST | M_SRC0_64, 34, A01),
    ins!("s_and_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 36, A01),
    ins!("s_or_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 37, A01),
    ins!("s_xor_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 38, A01),
    ins!("s_andn2_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 39, A01),
    ins!("s_orn2_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 40, A01),
    ins!("s_nand_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 41, A01),
    ins!("s_nor_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 42, A01),
    ins!("s_xnor_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 43, A01),
    ins!("s_quadmask_b32", Sop1, 0, 44, A01),
    ins!("s_quadmask_b64", Sop1, M_DST64 | M_SRC0_64, 45, A01),
    ins!("s_movrels_b32", Sop1, 0, 46, A01),
    ins!("s_movrels_b64", Sop1, M_DST64 | M_SRC0_64, 47, A01),
    ins!("s_movreld_b32", Sop1, 0, 48, A01),
    ins!("s_movreld_b64", Sop1, M_DST64 | M_SRC0_64, 49, A01),
    ins!("s_cbranch_join", Sop1, M_NO_DST, 50, A01),
    ins!("s_abs_i32", Sop1, 0, 52, A01),
    ins!("s_mov_fed_b32", Sop1, 0, 53, A01),
    ins!("s_mov_b32", Sop1, 0, 0, A245),
    ins!("s_mov_b64", Sop1, M_DST64 | M_SRC0_64, 1, A245),
    ins!("s_cmov_b32", Sop1, 0, 2, A245),
    ins!("s_cmov_b64", Sop1, M_DST64 | M_SRC0_64, 3, A245),
    ins!("s_not_b32", Sop1, 0, 4, A245),
    ins!("s_not_b64", Sop1, M_DST64 | M_SRC0_64, 5, A245),
    ins!("s_wqm_b32", Sop1, 0, 6, A245),
    ins!("s_wqm_b64", Sop1, M_DST64 | M_SRC0_64, 7, A245),
    ins!("s_brev_b32", Sop1, 0, 8, A245),
    ins!("s_brev_b64", Sop1, M_DST64 | M_SRC0_64, 9, A245),
    ins!("s_bcnt0_i32_b32", Sop1, 0, 10, A245),
    ins!("s_bcnt0_i32_b64", Sop1, M_SRC0_64, 11, A245),
    ins!("s_bcnt1_i32_b32", Sop1, 0, 12, A245),
    ins!("s_bcnt1_i32_b64", Sop1, M_SRC0_64, 13, A245),
    ins!("s_ff0_i32_b32", Sop1, 0, 14, A245),
    ins!("s_ff0_i32_b64", Sop1, M_SRC0_64, 15, A245),
    ins!("s_ff1_i32_b32", Sop1, 0, 16, A245),
    ins!("s_ff1_i32_b64", Sop1, M_SRC0_64, 17, A245),
    ins!("s_flbit_i32_b32", Sop1, 0, 18, A245),
    ins!("s_flbit_i32_b64", Sop1, M_SRC0_64, 19, A245),
    ins!("s_flbit_i32", Sop1, 0, 20, A245),
    ins!("s_flbit_i32_i64", Sop1, M_SRC0_64, 21, A245),
    ins!("s_sext_i32_i8", Sop1, 0, 22, A245),
    ins!("s_sext_i32_i16", Sop1, 0, 23, A245),
    ins!("s_bitset0_b32", Sop1, 0, 24, A245),
    ins!("s_bitset0_b64", Sop1, M_DST64, 25, A245),
    ins!("s_bitset1_b32", Sop1, 0, 26, A245),
    ins!("s_bitset1_b64", Sop1, M_DST64, 27, A245),
    ins!("s_getpc_b64", Sop1, M_ONLY_DST | M_DST64, 28, A245),
    ins!("s_setpc_b64", Sop1, M_NO_DST | M_SRC0_64, 29, A245),
    ins!("s_swappc_b64", Sop1, M_DST64 | M_SRC0_64, 30, A245),
    ins!("s_rfe_b64", Sop1, M_NO_DST | M_SRC0_64, 31, A245),
    ins!("s_and_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 32, A245),
    ins!("s_or_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 33, A245),
    ins!("s_xor_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 34, A245),
    ins!("s_andn2_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 35, A245),
    ins!("s_orn2_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 36, A245),
    ins!("s_nand_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 37, A245),
    ins!("s_nor_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 38, A245),
    ins!("s_xnor_saveexec_b64", Sop1, M_DST64 | M_SRC0_64, 39, A245),
    ins!("s_quadmask_b32", Sop1, 0, 40, A245),
    ins!("s_quadmask_b64", Sop1, M_DST64 | M_SRC0_64, 41, A245),
    ins!("s_movrels_b32", Sop1, 0, 42, A245),
    ins!("s_movrels_b64", Sop1, M_DST64 | M_SRC0_64, 43, A245),
    ins!("s_movreld_b32", Sop1, 0, 44, A245),
    ins!("s_movreld_b64", Sop1, M_DST64 | M_SRC0_64, 45, A245),
    ins!("s_cbranch_join", Sop1, M_NO_DST, 46, A24),
    ins!("s_mov_regrd_b32", Sop1, 0, 47, A24),
    ins!("s_abs_i32", Sop1, 0, 48, A245),
    ins!("s_mov_fed_b32", Sop1, 0, 49, A24),
    ins!("s_set_gpr_idx_idx", Sop1, M_NO_DST, 50, A24),
    // SOPC
    ins!("s_cmp_eq_i32", Sopc, 0, 0, AALL),
    ins!("s_cmp_lg_i32", Sopc, 0, 1, AALL),
    ins!("s_cmp_gt_i32", Sopc, 0, 2, AALL),
    ins!("s_cmp_ge_i32", Sopc, 0, 3, AALL),
    ins!("s_cmp_lt_i32", Sopc, 0, 4, AALL),
    ins!("s_cmp_le_i32", Sopc, 0, 5, AALL),
    ins!("s_cmp_eq_u32", Sopc, 0, 6, AALL),
    ins!("s_cmp_lg_u32", Sopc, 0, 7, AALL),
    ins!("s_cmp_gt_u32", Sopc, 0, 8, AALL),
    ins!("s_cmp_ge_u32", Sopc, 0, 9, AALL),
    ins!("s_cmp_lt_u32", Sopc, 0, 10, AALL),
    ins!("s_cmp_le_u32", Sopc, 0, 11, AALL),
    ins!("s_bitcmp0_b32", Sopc, 0, 12, AALL),
    ins!("s_bitcmp1_b32", Sopc, 0, 13, AALL),
    ins!("s_bitcmp0_b64", Sopc, M_SRC0_64, 14, AALL),
    ins!("s_bitcmp1_b64", Sopc, M_SRC0_64, 15, AALL),
    ins!("s_setvskip", Sopc, 0, 16, AALL),
    ins!("s_set_gpr_idx_on", Sopc, M_IMM16, 17, A24),
    ins!("s_cmp_eq_u64", Sopc, M_SRC0_64 | M_SRC1_64, 18, A245),
    ins!("s_cmp_lg_u64", Sopc, M_SRC0_64 | M_SRC1_64, 19, A245),
    ins!("s_cmp_ne_u64", Sopc, M_SRC0_64 | M_SRC1_64, 19, A245),
    // SOPP
    ins!("s_nop", Sopp, M_IMM16, 0, AALL),
    ins!("s_endpgm", Sopp, 0, 1, AALL),
    ins!("s_branch", Sopp, M_BRANCH, 2, AALL),
    ins!("s_wakeup", Sopp, 0, 3, A245),
    ins!("s_cbranch_scc0", Sopp, M_BRANCH, 4, AALL),
    ins!("s_cbranch_scc1", Sopp, M_BRANCH, 5, AALL),
    ins!("s_cbranch_vccz", Sopp, M_BRANCH, 6, AALL),
    ins!("s_cbranch_vccnz", Sopp, M_BRANCH, 7, AALL),
    ins!("s_cbranch_execz", Sopp, M_BRANCH, 8, AALL),
    ins!("s_cbranch_execnz", Sopp, M_BRANCH, 9, AALL),
    ins!("s_barrier", Sopp, 0, 10, AALL),
    ins!("s_setkill", Sopp, M_IMM16, 11, A245),
    ins!("s_waitcnt", Sopp, M_WAITCNT, 12, AALL),
    ins!("s_sethalt", Sopp, M_IMM16, 13, AALL),
    ins!("s_sleep", Sopp, M_IMM16, 14, AALL),
    ins!("s_setprio", Sopp, M_IMM16, 15, AALL),
    ins!("s_sendmsg", Sopp, M_SENDMSG, 16, AALL),
    ins!("s_sendmsghalt", Sopp, M_SENDMSG, 17, AALL),
    ins!("s_trap", Sopp, M_IMM16, 18, AALL),
    ins!("s_icache_inv", Sopp, 0, 19, AALL),
    ins!("s_incperflevel", Sopp, M_IMM16, 20, AALL),
    ins!("s_decperflevel", Sopp, M_IMM16, 21, AALL),
    ins!("s_ttracedata", Sopp, 0, 22, AALL),
    ins!("s_cbranch_cdbgsys", Sopp, M_BRANCH, 23, A15),
    ins!("s_cbranch_cdbguser", Sopp, M_BRANCH, 24, A15),
    ins!("s_cbranch_cdbgsys_or_user", Sopp, M_BRANCH, 25, A15),
    ins!("s_cbranch_cdbgsys_and_user", Sopp, M_BRANCH, 26, A15),
    ins!("s_endpgm_saved", Sopp, 0, 27, A245),
    ins!("s_set_gpr_idx_off", Sopp, 0, 28, A24),
    ins!("s_set_gpr_idx_mode", Sopp, M_IMM16, 29, A24),
    ins!("s_endpgm_ordered_ps_done", Sopp, 0, 30, A4),
    // SMRD
    ins!("s_load_dword", Smrd, m_nregs(1), 0, A01),
    ins!("s_load_dwordx2", Smrd, m_nregs(2), 1, A01),
    ins!("s_load_dwordx4", Smrd, m_nregs(4), 2, A01),
    ins!("s_load_dwordx8", Smrd, m_nregs(8), 3, A01),
    ins!("s_load_dwordx16", Smrd, m_nregs(16), 4, A01),
    ins!("s_buffer_load_dword", Smrd, m_nregs(1) | M_SBASE4, 8, A01),
    ins!("s_buffer_load_dwordx2", Smrd, m_nregs(2) | M_SBASE4, 9, A01),
    ins!("s_buffer_load_dwordx4", Smrd, m_nregs(4) | M_SBASE4, 10, A01),
    ins!("s_buffer_load_dwordx8", Smrd, m_nregs(8) | M_SBASE4, 11, A01),
    ins!("s_buffer_load_dwordx16", Smrd, m_nregs(16) | M_SBASE4, 12, A01),
    ins!("s_memtime", Smrd, m_nregs(2) | M_ONLY_DST | M_DST64, 30, A01),
    ins!("s_dcache_inv", Smrd, M_NO_DST | M_NO_SRC, 31, A01),
    // SMEM
    ins!("s_load_dword", Smem, m_nregs(1), 0, A245),
    ins!("s_load_dwordx2", Smem, m_nregs(2), 1, A245),
    ins!("s_load_dwordx4", Smem, m_nregs(4), 2, A245),
    ins!("s_load_dwordx8", Smem, m_nregs(8), 3, A245),
    ins!("s_load_dwordx16", Smem, m_nregs(16), 4, A245),
    ins!("s_buffer_load_dword", Smem, m_nregs(1) | M_SBASE4, 8, A245),
    ins!("s_buffer_load_dwordx2", Smem, m_nregs(2) | M_SBASE4, 9, A245),
    ins!("s_buffer_load_dwordx4", Smem, m_nregs(4) | M_SBASE4, 10, A245),
    ins!("s_buffer_load_dwordx8", Smem, m_nregs(8) | M_SBASE4, 11, A245),
    ins!("s_buffer_load_dwordx16", Smem, m_nregs(16) | M_SBASE4, 12, A245),
    ins!("s_store_dword", Smem, m_nregs(1) | M_STORE, 16, A245),
    ins!("s_store_dwordx2", Smem, m_nregs(2) | M_STORE, 17, A245),
    ins!("s_store_dwordx4", Smem, m_nregs(4) | M_STORE, 18, A245),
    ins!("s_buffer_store_dword", Smem, m_nregs(1) | M_STORE | M_SBASE4, 24, A245),
    ins!("s_buffer_store_dwordx2", Smem, m_nregs(2) | M_STORE | M_SBASE4, 25, A245),
    ins!("s_buffer_store_dwordx4", Smem, m_nregs(4) | M_STORE | M_SBASE4, 26, A245),
    ins!("s_dcache_inv", Smem, M_NO_DST | M_NO_SRC, 32, A245),
    ins!("s_dcache_wb", Smem, M_NO_DST | M_NO_SRC, 33, A245),
    ins!("s_dcache_inv_vol", Smem, M_NO_DST | M_NO_SRC, 34, A24),
    ins!("s_dcache_wb_vol", Smem, M_NO_DST | M_NO_SRC, 35, A24),
    ins!("s_memtime", Smem, m_nregs(2) | M_ONLY_DST | M_DST64, 36, A245),
    ins!("s_memrealtime", Smem, m_nregs(2) | M_ONLY_DST | M_DST64, 37, A245),
    // VOP2
    ins!("v_cndmask_b32", Vop2, M_VCC_SSRC, 0, A01),
    ins!("v_readlane_b32", Vop2, 0, 1, A01),
    ins!("v_writelane_b32", Vop2, 0, 2, A01),
    ins!("v_add_f32", Vop2, 0, 3, A01),
    ins!("v_sub_f32", Vop2, 0, 4, A01),
    ins!("v_subrev_f32", Vop2, 0, 5, A01),
    ins!("v_mac_legacy_f32", Vop2, 0, 6, A01),
    ins!("v_mul_legacy_f32", Vop2, 0, 7, A01),
    ins!("v_mul_f32", Vop2, 0, 8, A01),
    ins!("v_mul_i32_i24", Vop2, 0, 9, A01),
    ins!("v_mul_hi_i32_i24", Vop2, 0, 10, A01),
    ins!("v_mul_u32_u24", Vop2, 0, 11, A01),
    ins!("v_mul_hi_u32_u24", Vop2, 0, 12, A01),
    ins!("v_min_legacy_f32", Vop2, 0, 13, A01),
    ins!("v_max_legacy_f32", Vop2, 0, 14, A01),
    ins!("v_min_f32", Vop2, 0, 15, A01),
    ins!("v_max_f32", Vop2, 0, 16, A01),
    ins!("v_min_i32", Vop2, 0, 17, A01),
    ins!("v_max_i32", Vop2, 0, 18, A01),
    ins!("v_min_u32", Vop2, 0, 19, A01),
    ins!("v_max_u32", Vop2, 0, 20, A01),
    ins!("v_lshr_b32", Vop2, 0, 21, A01),
    ins!("v_lshrrev_b32", Vop2, 0, 22, A01),
    ins!("v_ashr_i32", Vop2, 0, 23, A01),
    ins!("v_ashrrev_i32", Vop2, 0, 24, A01),
    ins!("v_lshl_b32", Vop2, 0, 25, A01),
    ins!("v_lshlrev_b32", Vop2, 0, 26, A01),
    ins!("v_and_b32", Vop2, 0, 27, A01),
    ins!("v_or_b32", Vop2, 0, 28, A01),
    ins!("v_xor_b32", Vop2, 0, 29, A01),
    ins!("v_bfm_b32", Vop2, 0, 30, A01),
    ins!("v_mac_f32", Vop2, 0, 31, A01),
    ins!("v_madmk_f32", Vop2, M_MADMK, 32, A01),
    ins!("v_madak_f32", Vop2, M_MADAK, 33, A01),
    ins!("v_bcnt_u32_b32", Vop2, 0, 34, A01),
    ins!("v_mbcnt_lo_u32_b32", Vop2, 0, 35, A01),
    ins!("v_mbcnt_hi_u32_b32", Vop2, 0, 36, A01),
    ins!("v_add_i32", Vop2, M_VCC_SDST, 37, A01),
    ins!("v_sub_i32", Vop2, M_VCC_SDST, 38, A01),
    ins!("v_subrev_i32", Vop2, M_VCC_SDST, 39, A01),
    ins!("v_addc_u32", Vop2, M_VCC_SDST | M_VCC_SSRC, 40, A01),
    ins!("v_subb_u32", Vop2, M_VCC_SDST | M_VCC_SSRC, 41, A01),
    ins!("v_subbrev_u32", Vop2, M_VCC_SDST | M_VCC_SSRC, 42, A01),
    ins!("v_ldexp_f32", Vop2, 0, 43, A01),
    ins!("v_cvt_pkaccum_u8_f32", Vop2, 0, 44, A01),
    ins!("v_cvt_pknorm_i16_f32", Vop2, 0, 45, A01),
    ins!("v_cvt_pknorm_u16_f32", Vop2, 0, 46, A01),
    ins!("v_cvt_pkrtz_f16_f32", Vop2, 0, 47, A01),
    ins!("v_cvt_pk_u16_u32", Vop2, 0, 48, A01),
    ins!("v_cvt_pk_i16_i32", Vop2, 0, 49, A01),
    ins!("v_cndmask_b32", Vop2, M_VCC_SSRC, 0, A24),
    ins!("v_add_f32", Vop2, 0, 1, A24),
    ins!("v_sub_f32", Vop2, 0, 2, A24),
    ins!("v_subrev_f32", Vop2, 0, 3, A24),
    ins!("v_mul_legacy_f32", Vop2, 0, 4, A24),
    ins!("v_mul_f32", Vop2, 0, 5, A24),
    ins!("v_mul_i32_i24", Vop2, 0, 6, A24),
    ins!("v_mul_hi_i32_i24", Vop2, 0, 7, A24),
    ins!("v_mul_u32_u24", Vop2, 0, 8, A24),
    ins!("v_mul_hi_u32_u24", Vop2, 0, 9, A24),
    ins!("v_min_f32", Vop2, 0, 10, A24),
    ins!("v_max_f32", Vop2, 0, 11, A24),
    ins!("v_min_i32", Vop2, 0, 12, A24),
    ins!("v_max_i32", Vop2, 0, 13, A24),
    ins!("v_min_u32", Vop2, 0, 14, A24),
    ins!("v_max_u32", Vop2, 0, 15, A24),
    ins!("v_lshrrev_b32", Vop2, 0, 16, A24),
    ins!("v_ashrrev_i32", Vop2, 0, 17, A24),
    ins!("v_lshlrev_b32", Vop2, 0, 18, A24),
    ins!("v_and_b32", Vop2, 0, 19, A24),
    ins!("v_or_b32", Vop2, 0, 20, A24),
    ins!("v_xor_b32", Vop2, 0, 21, A24),
    ins!("v_mac_f32", Vop2, 0, 22, A24),
    ins!("v_madmk_f32", Vop2, M_MADMK, 23, A24),
    ins!("v_madak_f32", Vop2, M_MADAK, 24, A24),
    ins!("v_add_u32", Vop2, M_VCC_SDST, 25, A24),
    ins!("v_sub_u32", Vop2, M_VCC_SDST, 26, A24),
    ins!("v_subrev_u32", Vop2, M_VCC_SDST, 27, A24),
    ins!("v_addc_u32", Vop2, M_VCC_SDST | M_VCC_SSRC, 28, A24),
    ins!("v_subb_u32", Vop2, M_VCC_SDST | M_VCC_SSRC, 29, A24),
    ins!("v_subbrev_u32", Vop2, M_VCC_SDST | M_VCC_SSRC, 30, A24),
    ins!("v_add_f16", Vop2, M_F16, 31, A24),
    ins!("v_sub_f16", Vop2, M_F16, 32, A24),
    ins!("v_subrev_f16", Vop2, M_F16, 33, A24),
    ins!("v_mul_f16", Vop2, M_F16, 34, A24),
    ins!("v_mac_f16", Vop2, M_F16, 35, A24),
    ins!("v_madmk_f16", Vop2, M_MADMK | M_F16, 36, A24),
    ins!("v_madak_f16", Vop2, M_MADAK | M_F16, 37, A24),
    ins!("v_add_u16", Vop2, 0, 38, A24),
    ins!("v_sub_u16", Vop2, 0, 39, A24),
    ins!("v_subrev_u16", Vop2, 0, 40, A24),
    ins!("v_mul_lo_u16", Vop2, 0, 41, A24),
    ins!("v_lshlrev_b16", Vop2, 0, 42, A24),
    ins!("v_lshrrev_b16", Vop2, 0, 43, A24),
    ins!("v_ashrrev_i16", Vop2, 0, 44, A24),
    ins!("v_max_f16", Vop2, M_F16, 45, A24),
    ins!("v_min_f16", Vop2, M_F16, 46, A24),
    ins!("v_max_u16", Vop2, 0, 47, A24),
    ins!("v_max_i16", Vop2, 0, 48, A24),
    ins!("v_min_u16", Vop2, 0, 49, A24),
    ins!("v_min_i16", Vop2, 0, 50, A24),
    ins!("v_ldexp_f16", Vop2, M_F16, 51, A24),
    ins!("v_cndmask_b32", Vop2, M_VCC_SSRC, 1, A5),
    ins!("v_add_f32", Vop2, 0, 3, A5),
    ins!("v_sub_f32", Vop2, 0, 4, A5),
    ins!("v_subrev_f32", Vop2, 0, 5, A5),
    ins!("v_mul_f32", Vop2, 0, 8, A5),
    ins!("v_and_b32", Vop2, 0, 27, A5),
    ins!("v_or_b32", Vop2, 0, 28, A5),
    ins!("v_xor_b32", Vop2, 0, 29, A5),
    // VOP1
    ins!("v_nop", Vop1, M_NO_DST | M_NO_SRC, 0, AALL),
    ins!("v_mov_b32", Vop1, 0, 1, AALL),
    ins!("v_readfirstlane_b32", Vop1, 0, 2, AALL),
    ins!("v_cvt_i32_f64", Vop1, M_SRC0_64, 3, AALL),
    ins!("v_cvt_f64_i32", Vop1, M_DST64, 4, AALL),
    ins!("v_cvt_f32_i32", Vop1, 0, 5, AALL),
    ins!("v_cvt_f32_u32", Vop1, 0, 6, AALL),
    ins!("v_cvt_u32_f32", Vop1, 0, 7, AALL),
    ins!("v_cvt_i32_f32", Vop1, 0, 8, AALL),
    ins!("v_cvt_f16_f32", Vop1, 0, 10, AALL),
    ins!("v_cvt_f32_f16", Vop1, 0, 11, AALL),
    ins!("v_cvt_f32_f64", Vop1, M_SRC0_64, 15, AALL),
    ins!("v_cvt_f64_f32", Vop1, M_DST64, 16, AALL),
    ins!("v_fract_f32", Vop1, 0, 32, A01),
    ins!("v_trunc_f32", Vop1, 0, 33, A01),
    ins!("v_ceil_f32", Vop1, 0, 34, A01),
    ins!("v_rndne_f32", Vop1, 0, 35, A01),
    ins!("v_floor_f32", Vop1, 0, 36, A01),
    ins!("v_exp_f32", Vop1, 0, 37, A01),
    ins!("v_log_clamp_f32", Vop1, 0, 38, A01),
    ins!("v_log_f32", Vop1, 0, 39, A01),
    ins!("v_rcp_f32", Vop1, 0, 42, A01),
    ins!("v_rsq_f32", Vop1, 0, 46, A01),
    ins!("v_sqrt_f32", Vop1, 0, 51, A01),
    ins!("v_sin_f32", Vop1, 0, 53, A01),
    ins!("v_cos_f32", Vop1, 0, 54, A01),
    ins!("v_not_b32", Vop1, 0, 55, A01),
    ins!("v_bfrev_b32", Vop1, 0, 56, A01),
    ins!("v_ffbh_u32", Vop1, 0, 57, A01),
    ins!("v_fract_f32", Vop1, 0, 27, A24),
    ins!("v_trunc_f32", Vop1, 0, 28, A24),
    ins!("v_ceil_f32", Vop1, 0, 29, A24),
    ins!("v_rndne_f32", Vop1, 0, 30, A24),
    ins!("v_floor_f32", Vop1, 0, 31, A24),
    ins!("v_exp_f32", Vop1, 0, 32, A24),
    ins!("v_log_f32", Vop1, 0, 33, A24),
    ins!("v_rcp_f32", Vop1, 0, 34, A24),
    ins!("v_rcp_iflag_f32", Vop1, 0, 35, A24),
    ins!("v_rsq_f32", Vop1, 0, 36, A24),
    ins!("v_rcp_f64", Vop1, M_DST64 | M_SRC0_64, 37, A24),
    ins!("v_rsq_f64", Vop1, M_DST64 | M_SRC0_64, 38, A24),
    ins!("v_sqrt_f32", Vop1, 0, 39, A24),
    ins!("v_sqrt_f64", Vop1, M_DST64 | M_SRC0_64, 40, A24),
    ins!("v_sin_f32", Vop1, 0, 41, A24),
    ins!("v_cos_f32", Vop1, 0, 42, A24),
    ins!("v_not_b32", Vop1, 0, 43, A24),
    ins!("v_bfrev_b32", Vop1, 0, 44, A24),
    ins!("v_ffbh_u32", Vop1, 0, 45, A24),
    // VOPC
    ins!("v_cmp_f_f32", Vopc, 0, 0, A01),
    ins!("v_cmp_lt_f32", Vopc, 0, 1, A01),
    ins!("v_cmp_eq_f32", Vopc, 0, 2, A01),
    ins!("v_cmp_le_f32", Vopc, 0, 3, A01),
    ins!("v_cmp_gt_f32", Vopc, 0, 4, A01),
    ins!("v_cmp_lg_f32", Vopc, 0, 5, A01),
    ins!("v_cmp_ge_f32", Vopc, 0, 6, A01),
    ins!("v_cmp_tru_f32", Vopc, 0, 15, A01),
    ins!("v_cmpx_lt_f32", Vopc, 0, 17, A01),
    ins!("v_cmp_f_f64", Vopc, M_SRC0_64 | M_SRC1_64, 32, A01),
    ins!("v_cmp_lt_f64", Vopc, M_SRC0_64 | M_SRC1_64, 33, A01),
    ins!("v_cmpx_f_f64", Vopc, M_SRC0_64 | M_SRC1_64, 48, A01),
    ins!("v_cmpx_lg_f64", Vopc, M_SRC0_64 | M_SRC1_64, 53, A01),
    ins!("v_cmp_eq_i32", Vopc, 0, 130, A01),
    ins!("v_cmp_lt_i32", Vopc, 0, 129, A01),
    ins!("v_cmp_gt_i32", Vopc, 0, 132, A01),
    ins!("v_cmp_eq_u32", Vopc, 0, 194, A01),
    ins!("v_cmp_lt_u32", Vopc, 0, 193, A01),
    ins!("v_cmp_gt_u32", Vopc, 0, 196, A01),
    ins!("v_cmp_f_f16", Vopc, M_F16, 0x20, A24),
    ins!("v_cmp_lt_f16", Vopc, M_F16, 0x21, A24),
    ins!("v_cmp_eq_f16", Vopc, M_F16, 0x22, A24),
    ins!("v_cmp_f_f32", Vopc, 0, 0x40, A24),
    ins!("v_cmp_lt_f32", Vopc, 0, 0x41, A24),
    ins!("v_cmp_eq_f32", Vopc, 0, 0x42, A24),
    ins!("v_cmp_le_f32", Vopc, 0, 0x43, A24),
    ins!("v_cmp_gt_f32", Vopc, 0, 0x44, A24),
    ins!("v_cmp_lg_f32", Vopc, 0, 0x45, A24),
    ins!("v_cmp_ge_f32", Vopc, 0, 0x46, A24),
    ins!("v_cmp_f_f64", Vopc, M_SRC0_64 | M_SRC1_64, 0x60, A24),
    ins!("v_cmp_lt_f64", Vopc, M_SRC0_64 | M_SRC1_64, 0x61, A24),
    ins!("v_cmpx_lg_f64", Vopc, M_SRC0_64 | M_SRC1_64, 0x75, A24),
    ins!("v_cmp_lt_i32", Vopc, 0, 0xc1, A24),
    ins!("v_cmp_eq_i32", Vopc, 0, 0xc2, A24),
    ins!("v_cmp_gt_i32", Vopc, 0, 0xc4, A24),
    ins!("v_cmp_lt_u32", Vopc, 0, 0xc9, A24),
    ins!("v_cmp_eq_u32", Vopc, 0, 0xca, A24),
    ins!("v_cmp_gt_u32", Vopc, 0, 0xcc, A24),
    // VOP3 only
    ins!("v_mad_legacy_f32", Vop3, m_nsrc(3), 0x140, A01),
    ins!("v_mad_f32", Vop3, m_nsrc(3), 0x141, A01),
    ins!("v_mad_i32_i24", Vop3, m_nsrc(3), 0x142, A01),
    ins!("v_mad_u32_u24", Vop3, m_nsrc(3), 0x143, A01),
    ins!("v_bfe_u32", Vop3, m_nsrc(3), 0x148, A01),
    ins!("v_bfe_i32", Vop3, m_nsrc(3), 0x149, A01),
    ins!("v_bfi_b32", Vop3, m_nsrc(3), 0x14a, A01),
    ins!("v_fma_f32", Vop3, m_nsrc(3), 0x14b, A01),
    ins!(
        "v_fma_f64",
        Vop3,
        m_nsrc(3) | M_DST64 | M_SRC0_64 | M_SRC1_64 | M_SRC2_64,
        0x14c,
        A01
    ),
    ins!("v_alignbit_b32", Vop3, m_nsrc(3), 0x14e, A01),
    ins!("v_alignbyte_b32", Vop3, m_nsrc(3), 0x14f, A01),
    ins!("v_min3_f32", Vop3, m_nsrc(3), 0x151, A01),
    ins!("v_min3_i32", Vop3, m_nsrc(3), 0x152, A01),
    ins!("v_min3_u32", Vop3, m_nsrc(3), 0x153, A01),
    ins!("v_max3_f32", Vop3, m_nsrc(3), 0x154, A01),
    ins!("v_max3_i32", Vop3, m_nsrc(3), 0x155, A01),
    ins!("v_max3_u32", Vop3, m_nsrc(3), 0x156, A01),
    ins!("v_med3_f32", Vop3, m_nsrc(3), 0x157, A01),
    ins!("v_med3_i32", Vop3, m_nsrc(3), 0x158, A01),
    ins!("v_med3_u32", Vop3, m_nsrc(3), 0x159, A01),
    ins!(
        "v_add_f64",
        Vop3,
        M_DST64 | M_SRC0_64 | M_SRC1_64,
        0x164,
        A01
    ),
    ins!(
        "v_mul_f64",
        Vop3,
        M_DST64 | M_SRC0_64 | M_SRC1_64,
        0x165,
        A01
    ),
    ins!("v_mul_lo_u32", Vop3, 0, 0x169, A01),
    ins!("v_mul_hi_u32", Vop3, 0, 0x16a, A01),
    ins!("v_mul_lo_i32", Vop3, 0, 0x16b, A01),
    ins!("v_mul_hi_i32", Vop3, 0, 0x16c, A01),
    ins!("v_div_scale_f32", Vop3, m_nsrc(3) | M_VOP3B, 0x16d, A01),
    ins!("v_mad_legacy_f32", Vop3, m_nsrc(3), 0x1c0, A24),
    ins!("v_mad_f32", Vop3, m_nsrc(3), 0x1c1, A24),
    ins!("v_mad_i32_i24", Vop3, m_nsrc(3), 0x1c2, A24),
    ins!("v_mad_u32_u24", Vop3, m_nsrc(3), 0x1c3, A24),
    ins!("v_bfe_u32", Vop3, m_nsrc(3), 0x1c8, A24),
    ins!("v_bfe_i32", Vop3, m_nsrc(3), 0x1c9, A24),
    ins!("v_bfi_b32", Vop3, m_nsrc(3), 0x1ca, A24),
    ins!("v_fma_f32", Vop3, m_nsrc(3), 0x1cb, A24),
    ins!(
        "v_fma_f64",
        Vop3,
        m_nsrc(3) | M_DST64 | M_SRC0_64 | M_SRC1_64 | M_SRC2_64,
        0x1cc,
        A24
    ),
    ins!("v_alignbit_b32", Vop3, m_nsrc(3), 0x1ce, A24),
    ins!("v_alignbyte_b32", Vop3, m_nsrc(3), 0x1cf, A24),
    ins!("v_min3_f32", Vop3, m_nsrc(3), 0x1d0, A24),
    ins!("v_min3_i32", Vop3, m_nsrc(3), 0x1d1, A24),
    ins!("v_min3_u32", Vop3, m_nsrc(3), 0x1d2, A24),
    ins!("v_max3_f32", Vop3, m_nsrc(3), 0x1d3, A24),
    ins!("v_max3_i32", Vop3, m_nsrc(3), 0x1d4, A24),
    ins!("v_max3_u32", Vop3, m_nsrc(3), 0x1d5, A24),
    ins!("v_med3_f32", Vop3, m_nsrc(3), 0x1d6, A24),
    ins!("v_med3_i32", Vop3, m_nsrc(3), 0x1d7, A24),
    ins!("v_med3_u32", Vop3, m_nsrc(3), 0x1d8, A24),
    ins!(
        "v_add_f64",
        Vop3,
        M_DST64 | M_SRC0_64 | M_SRC1_64,
        0x280,
        A24
    ),
    ins!(
        "v_mul_f64",
        Vop3,
        M_DST64 | M_SRC0_64 | M_SRC1_64,
        0x281,
        A24
    ),
    ins!("v_mul_lo_u32", Vop3, 0, 0x285, A24),
    ins!("v_mul_hi_u32", Vop3, 0, 0x286, A24),
    ins!("v_mul_hi_i32", Vop3, 0, 0x287, A24),
    // VINTRP
    ins!("v_interp_p1_f32", Vintrp, 0, 0, AALL),
    ins!("v_interp_p2_f32", Vintrp, 0, 1, AALL),
    ins!("v_interp_mov_f32", Vintrp, 0, 2, AALL),
    // DS
    ins!("ds_add_u32", Ds, M_DS_D0, 0, AALL),
    ins!("ds_sub_u32", Ds, M_DS_D0, 1, AALL),
    ins!("ds_rsub_u32", Ds, M_DS_D0, 2, AALL),
    ins!("ds_inc_u32", Ds, M_DS_D0, 3, AALL),
    ins!("ds_dec_u32", Ds, M_DS_D0, 4, AALL),
    ins!("ds_min_i32", Ds, M_DS_D0, 5, AALL),
    ins!("ds_max_i32", Ds, M_DS_D0, 6, AALL),
    ins!("ds_min_u32", Ds, M_DS_D0, 7, AALL),
    ins!("ds_max_u32", Ds, M_DS_D0, 8, AALL),
    ins!("ds_and_b32", Ds, M_DS_D0, 9, AALL),
    ins!("ds_or_b32", Ds, M_DS_D0, 10, AALL),
    ins!("ds_xor_b32", Ds, M_DS_D0, 11, AALL),
    ins!("ds_mskor_b32", Ds, M_DS_D0 | M_DS_D1, 12, AALL),
    ins!("ds_write_b32", Ds, M_DS_D0, 13, AALL),
    ins!("ds_write2_b32", Ds, M_DS_D0 | M_DS_D1 | M_DS_2OFF, 14, AALL),
    ins!("ds_write2st64_b32", Ds, M_DS_D0 | M_DS_D1 | M_DS_2OFF, 15, AALL),
    ins!("ds_cmpst_b32", Ds, M_DS_D0 | M_DS_D1, 16, AALL),
    ins!("ds_min_f32", Ds, M_DS_D0, 18, AALL),
    ins!("ds_max_f32", Ds, M_DS_D0, 19, AALL),
    ins!("ds_add_rtn_u32", Ds, M_DS_DST | M_DS_D0, 32, AALL),
    ins!("ds_sub_rtn_u32", Ds, M_DS_DST | M_DS_D0, 33, AALL),
    ins!("ds_rsub_rtn_u32", Ds, M_DS_DST | M_DS_D0, 34, AALL),
    ins!("ds_inc_rtn_u32", Ds, M_DS_DST | M_DS_D0, 35, AALL),
    ins!("ds_dec_rtn_u32", Ds, M_DS_DST | M_DS_D0, 36, AALL),
    ins!("ds_min_rtn_i32", Ds, M_DS_DST | M_DS_D0, 37, AALL),
    ins!("ds_max_rtn_i32", Ds, M_DS_DST | M_DS_D0, 38, AALL),
    ins!("ds_wrxchg_rtn_b32", Ds, M_DS_DST | M_DS_D0, 45, AALL),
    ins!("ds_read_b32", Ds, M_DS_DST, 54, AALL),
    ins!(
        "ds_read2_b32",
        Ds,
        M_DS_DST | M_DS_2OFF | m_nregs(2),
        55,
        AALL
    ),
    ins!(
        "ds_read2st64_b32",
        Ds,
        M_DS_DST | M_DS_2OFF | m_nregs(2),
        56,
        AALL
    ),
    ins!("ds_read_i8", Ds, M_DS_DST, 57, AALL),
    ins!("ds_read_u8", Ds, M_DS_DST, 58, AALL),
    ins!("ds_read_i16", Ds, M_DS_DST, 59, AALL),
    ins!("ds_read_u16", Ds, M_DS_DST, 60, AALL),
    ins!("ds_add_u64", Ds, M_DS_D0 | m_nregs(2), 64, AALL),
    ins!("ds_write_b64", Ds, M_DS_D0 | m_nregs(2), 77, AALL),
    ins!("ds_read_b64", Ds, M_DS_DST | m_nregs(2), 118, AALL),
    ins!(
        "ds_read2_b64",
        Ds,
        M_DS_DST | M_DS_2OFF | m_nregs(4),
        119,
        AALL
    ),
    // MUBUF
    ins!("buffer_load_format_x", Mubuf, m_nregs(1), 0, AALL),
    ins!("buffer_load_format_xy", Mubuf, m_nregs(2), 1, AALL),
    ins!("buffer_load_format_xyz", Mubuf, m_nregs(3), 2, AALL),
    ins!("buffer_load_format_xyzw", Mubuf, m_nregs(4), 3, AALL),
    ins!("buffer_store_format_x", Mubuf, m_nregs(1) | M_STORE, 4, AALL),
    ins!("buffer_store_format_xy", Mubuf, m_nregs(2) | M_STORE, 5, AALL),
    ins!("buffer_store_format_xyz", Mubuf, m_nregs(3) | M_STORE, 6, AALL),
    ins!("buffer_store_format_xyzw", Mubuf, m_nregs(4) | M_STORE, 7, AALL),
    ins!("buffer_load_ubyte", Mubuf, m_nregs(1), 8, AALL),
    ins!("buffer_load_sbyte", Mubuf, m_nregs(1), 9, AALL),
    ins!("buffer_load_ushort", Mubuf, m_nregs(1), 10, AALL),
    ins!("buffer_load_sshort", Mubuf, m_nregs(1), 11, AALL),
    ins!("buffer_load_dword", Mubuf, m_nregs(1), 12, AALL),
    ins!("buffer_load_dwordx2", Mubuf, m_nregs(2), 13, AALL),
    ins!("buffer_load_dwordx4", Mubuf, m_nregs(4), 14, A01),
    ins!("buffer_load_dwordx3", Mubuf, m_nregs(3), 15, ArchMask::GCN11),
    ins!("buffer_load_dwordx3", Mubuf, m_nregs(3), 14, A245),
    ins!("buffer_load_dwordx4", Mubuf, m_nregs(4), 15, A245),
    ins!("buffer_store_byte", Mubuf, m_nregs(1) | M_STORE, 24, AALL),
    ins!("buffer_store_short", Mubuf, m_nregs(1) | M_STORE, 26, AALL),
    ins!("buffer_store_dword", Mubuf, m_nregs(1) | M_STORE, 28, AALL),
    ins!("buffer_store_dwordx2", Mubuf, m_nregs(2) | M_STORE, 29, AALL),
    ins!("buffer_store_dwordx4", Mubuf, m_nregs(4) | M_STORE, 30, A01),
    ins!("buffer_store_dwordx3", Mubuf, m_nregs(3) | M_STORE, 31, ArchMask::GCN11),
    ins!("buffer_store_dwordx3", Mubuf, m_nregs(3) | M_STORE, 30, A245),
    ins!("buffer_store_dwordx4", Mubuf, m_nregs(4) | M_STORE, 31, A245),
    // MTBUF
    ins!("tbuffer_load_format_x", Mtbuf, m_nregs(1), 0, AALL),
    ins!("tbuffer_load_format_xy", Mtbuf, m_nregs(2), 1, AALL),
    ins!("tbuffer_load_format_xyz", Mtbuf, m_nregs(3), 2, AALL),
    ins!("tbuffer_load_format_xyzw", Mtbuf, m_nregs(4), 3, AALL),
    ins!("tbuffer_store_format_x", Mtbuf, m_nregs(1) | M_STORE, 4, AALL),
    ins!("tbuffer_store_format_xy", Mtbuf, m_nregs(2) | M_STORE, 5, AALL),
    ins!("tbuffer_store_format_xyz", Mtbuf, m_nregs(3) | M_STORE, 6, AALL),
    ins!("tbuffer_store_format_xyzw", Mtbuf, m_nregs(4) | M_STORE, 7, AALL),
    // MIMG
    ins!("image_load", Mimg, 0, 0, AALL),
    ins!("image_load_mip", Mimg, 0, 1, AALL),
    ins!("image_store", Mimg, M_STORE, 8, AALL),
    ins!("image_store_mip", Mimg, M_STORE, 9, AALL),
    ins!("image_get_resinfo", Mimg, 0, 14, AALL),
    ins!("image_sample", Mimg, M_MIMG_SAMPLE, 32, AALL),
    ins!("image_sample_l", Mimg, M_MIMG_SAMPLE, 36, AALL),
    // EXP
    ins!("exp", Exp, 0, 0, AALL),
    // FLAT (GCN 1.1 uses the 1.0-style numbering, 1.2+ the moved one)
    ins!("flat_load_ubyte", Flat, m_nregs(1), 8, ArchMask::GCN11),
    ins!("flat_load_sbyte", Flat, m_nregs(1), 9, ArchMask::GCN11),
    ins!("flat_load_ushort", Flat, m_nregs(1), 10, ArchMask::GCN11),
    ins!("flat_load_sshort", Flat, m_nregs(1), 11, ArchMask::GCN11),
    ins!("flat_load_dword", Flat, m_nregs(1), 12, ArchMask::GCN11),
    ins!("flat_load_dwordx2", Flat, m_nregs(2), 13, ArchMask::GCN11),
    ins!("flat_load_dwordx4", Flat, m_nregs(4), 14, ArchMask::GCN11),
    ins!("flat_load_dwordx3", Flat, m_nregs(3), 15, ArchMask::GCN11),
    ins!("flat_store_byte", Flat, m_nregs(1) | M_STORE, 24, ArchMask::GCN11),
    ins!("flat_store_short", Flat, m_nregs(1) | M_STORE, 26, ArchMask::GCN11),
    ins!("flat_store_dword", Flat, m_nregs(1) | M_STORE, 28, ArchMask::GCN11),
    ins!("flat_store_dwordx2", Flat, m_nregs(2) | M_STORE, 29, ArchMask::GCN11),
    ins!("flat_store_dwordx4", Flat, m_nregs(4) | M_STORE, 30, ArchMask::GCN11),
    ins!("flat_store_dwordx3", Flat, m_nregs(3) | M_STORE, 31, ArchMask::GCN11),
    ins!("flat_load_ubyte", Flat, m_nregs(1), 16, A245),
    ins!("flat_load_sbyte", Flat, m_nregs(1), 17, A245),
    ins!("flat_load_ushort", Flat, m_nregs(1), 18, A245),
    ins!("flat_load_sshort", Flat, m_nregs(1), 19, A245),
    ins!("flat_load_dword", Flat, m_nregs(1), 20, A245),
    ins!("flat_load_dwordx2", Flat, m_nregs(2), 21, A245),
    ins!("flat_load_dwordx3", Flat, m_nregs(3), 22, A245),
    ins!("flat_load_dwordx4", Flat, m_nregs(4), 23, A245),
    ins!("flat_store_byte", Flat, m_nregs(1) | M_STORE, 24, A245),
    ins!("flat_store_short", Flat, m_nregs(1) | M_STORE, 26, A245),
    ins!("flat_store_dword", Flat, m_nregs(1) | M_STORE, 28, A245),
    ins!("flat_store_dwordx2", Flat, m_nregs(2) | M_STORE, 29, A245),
    ins!("flat_store_dwordx3", Flat, m_nregs(3) | M_STORE, 30, A245),
    ins!("flat_store_dwordx4", Flat, m_nregs(4) | M_STORE, 31, A245),
    ins!("global_load_dword", Global, m_nregs(1), 20, A4),
    ins!("global_load_dwordx2", Global, m_nregs(2), 21, A4),
    ins!("global_store_dword", Global, m_nregs(1) | M_STORE, 28, A4),
    ins!("global_store_dwordx2", Global, m_nregs(2) | M_STORE, 29, A4),
    ins!("scratch_load_dword", Scratch, m_nregs(1), 20, A4),
    ins!("scratch_store_dword", Scratch, m_nregs(1) | M_STORE, 28, A4),
];

/// All table entries for a mnemonic on the given generation mask
pub fn lookup(mnemonic: &str, arch: ArchMask) -> impl Iterator<Item = &'static GcnInstruction> + use<'_> {
    GCN_INSTRUCTIONS
        .iter()
        .filter(move |ins| ins.mnemonic == mnemonic && ins.arch_mask.intersects(arch))
}

/// True when the mnemonic exists on any generation
pub fn known_mnemonic(mnemonic: &str) -> bool {
    GCN_INSTRUCTIONS.iter().any(|ins| ins.mnemonic == mnemonic)
}

/// Reverse lookup for the decoder: the entry of `(encoding, code)` on the
/// given generation mask
pub fn reverse_lookup(
    encoding: GcnEncoding,
    code: u16,
    arch: ArchMask,
) -> Option<&'static GcnInstruction> {
    GCN_INSTRUCTIONS
        .iter()
        .find(|ins| ins.encoding == encoding && ins.code == code && ins.arch_mask.intersects(arch))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lookup_per_arch() {
        let add: Vec<_> = lookup("s_add_u32", ArchMask::GCN10).collect();
        assert_eq!(add.len(), 1);
        assert_eq!(add[0].code, 0);
        // opcode numbering moved between 1.0 and 1.2
        let and10 = lookup("s_and_b32", ArchMask::GCN10).next().unwrap();
        let and12 = lookup("s_and_b32", ArchMask::GCN12).next().unwrap();
        assert_eq!(and10.code, 14);
        assert_eq!(and12.code, 12);
        assert!(lookup("s_rfe_restore_b64", ArchMask::GCN10).next().is_none());
    }

    #[test]
    fn test_reverse_lookup() {
        let ins = reverse_lookup(GcnEncoding::Sopk, 20, ArchMask::GCN12).unwrap();
        assert_eq!(ins.mnemonic, "s_setreg_imm32_b32");
        let ins = reverse_lookup(GcnEncoding::Sopk, 21, ArchMask::GCN10).unwrap();
        assert_eq!(ins.mnemonic, "s_setreg_imm32_b32");
        assert_eq!(
            reverse_lookup(GcnEncoding::Ds, 55, ArchMask::GCN10)
                .unwrap()
                .mnemonic,
            "ds_read2_b32"
        );
    }
}
