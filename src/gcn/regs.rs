//! Register-operand model of the GCN codec. Scalar operands live in one
//! unified code space (SGPRs, the named scalar aliases, inline constants
//! and the literal marker); vector registers sit at a fixed offset above
//! it. Parsers produce [`RegRange`] values in that space and the
//! formatter maps them back to canonical names.

use phf::phf_map;

use super::GcnGen;
use crate::error::EncodeErrorKind;

/// Offset of VGPR 0 in the unified operand code space
pub const VGPR_OFFSET: u16 = 256;
/// Operand code of `vcc_lo`
pub const VCC_LO: u16 = 106;
/// Operand code of `m0`
pub const M0: u16 = 124;
/// Operand code of `null` (GCN 1.5)
pub const NULL_CODE: u16 = 125;
/// Operand code of `exec_lo`
pub const EXEC_LO: u16 = 126;
/// Operand code marking a trailing 32-bit literal
pub const LITERAL: u16 = 255;
/// Operand code of `vccz`
pub const VCCZ: u16 = 251;
/// Operand code of `execz`
pub const EXECZ: u16 = 252;
/// Operand code of `scc`
pub const SCC: u16 = 253;
/// Operand code of `lds_direct`
pub const LDS_DIRECT: u16 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A register range in the unified operand code space; `end` is one past
/// the last register
pub struct RegRange {
    /// First operand code
    pub start: u16,
    /// One past the last operand code
    pub end: u16,
}

impl RegRange {
    /// A range of `len` registers starting at `start`
    pub fn new(start: u16, len: u16) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    /// Number of registers covered
    pub fn len(self) -> u16 {
        self.end - self.start
    }

    /// True for an empty range
    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// True when the range lies in the VGPR file
    pub fn is_vgpr(self) -> bool {
        self.start >= VGPR_OFFSET
    }

    /// VGPR index of the first register
    pub fn vgpr_index(self) -> u16 {
        self.start - VGPR_OFFSET
    }
}

/// Highest SGPR number addressable as an ordinary register operand
pub fn max_sgpr(gen: GcnGen) -> u16 {
    match gen {
        GcnGen::Gcn10 | GcnGen::Gcn11 => 103,
        GcnGen::Gcn12 | GcnGen::Gcn14 | GcnGen::Gcn141 => 101,
        GcnGen::Gcn15 | GcnGen::Gcn151 => 105,
    }
}

/// First ttmp operand code
pub fn ttmp_base(gen: GcnGen) -> u16 {
    if gen.is_gcn14() {
        108
    } else {
        112
    }
}

/// Number of ttmp registers
pub fn ttmp_count(gen: GcnGen) -> u16 {
    if gen.is_gcn14() {
        16
    } else {
        12
    }
}

/// Operand code of `flat_scratch_lo`, where the generation has one
pub fn flat_scratch_code(gen: GcnGen) -> Option<u16> {
    match gen {
        GcnGen::Gcn11 => Some(104),
        GcnGen::Gcn12 | GcnGen::Gcn14 | GcnGen::Gcn141 => Some(102),
        _ => None,
    }
}

/// Operand code of `xnack_mask_lo`, where the generation has one
pub fn xnack_mask_code(gen: GcnGen) -> Option<u16> {
    match gen {
        GcnGen::Gcn12 | GcnGen::Gcn14 | GcnGen::Gcn141 => Some(104),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialReg {
    Vcc,
    VccLo,
    VccHi,
    Exec,
    ExecLo,
    ExecHi,
    M0,
    Null,
    FlatScratch,
    FlatScratchLo,
    FlatScratchHi,
    XnackMask,
    XnackMaskLo,
    XnackMaskHi,
    Tba,
    TbaLo,
    TbaHi,
    Tma,
    TmaLo,
    TmaHi,
    SharedBase,
    SharedLimit,
    PrivateBase,
    PrivateLimit,
    PopsExitingWaveId,
    Vccz,
    Execz,
    Scc,
    LdsDirect,
}

static SPECIAL_REGS: phf::Map<&'static str, SpecialReg> = phf_map! {
    "vcc" => SpecialReg::Vcc,
    "vcc_lo" => SpecialReg::VccLo,
    "vcc_hi" => SpecialReg::VccHi,
    "exec" => SpecialReg::Exec,
    "exec_lo" => SpecialReg::ExecLo,
    "exec_hi" => SpecialReg::ExecHi,
    "m0" => SpecialReg::M0,
    "null" => SpecialReg::Null,
    "flat_scratch" => SpecialReg::FlatScratch,
    "flat_scratch_lo" => SpecialReg::FlatScratchLo,
    "flat_scratch_hi" => SpecialReg::FlatScratchHi,
    "xnack_mask" => SpecialReg::XnackMask,
    "xnack_mask_lo" => SpecialReg::XnackMaskLo,
    "xnack_mask_hi" => SpecialReg::XnackMaskHi,
    "tba" => SpecialReg::Tba,
    "tba_lo" => SpecialReg::TbaLo,
    "tba_hi" => SpecialReg::TbaHi,
    "tma" => SpecialReg::Tma,
    "tma_lo" => SpecialReg::TmaLo,
    "tma_hi" => SpecialReg::TmaHi,
    "shared_base" => SpecialReg::SharedBase,
    "src_shared_base" => SpecialReg::SharedBase,
    "shared_limit" => SpecialReg::SharedLimit,
    "src_shared_limit" => SpecialReg::SharedLimit,
    "private_base" => SpecialReg::PrivateBase,
    "src_private_base" => SpecialReg::PrivateBase,
    "private_limit" => SpecialReg::PrivateLimit,
    "src_private_limit" => SpecialReg::PrivateLimit,
    "pops_exiting_wave_id" => SpecialReg::PopsExitingWaveId,
    "src_pops_exiting_wave_id" => SpecialReg::PopsExitingWaveId,
    "vccz" => SpecialReg::Vccz,
    "src_vccz" => SpecialReg::Vccz,
    "execz" => SpecialReg::Execz,
    "src_execz" => SpecialReg::Execz,
    "scc" => SpecialReg::Scc,
    "src_scc" => SpecialReg::Scc,
    "lds_direct" => SpecialReg::LdsDirect,
};

fn resolve_special(reg: SpecialReg, gen: GcnGen) -> Option<RegRange> {
    use SpecialReg::*;
    let range = |start, len| Some(RegRange::new(start, len));
    match reg {
        Vcc => range(VCC_LO, 2),
        VccLo => range(VCC_LO, 1),
        VccHi => range(VCC_LO + 1, 1),
        Exec => range(EXEC_LO, 2),
        ExecLo => range(EXEC_LO, 1),
        ExecHi => range(EXEC_LO + 1, 1),
        M0 => range(M0_CODE, 1),
        Null if gen.is_gcn15() => range(NULL_CODE, 1),
        Null => None,
        FlatScratch => flat_scratch_code(gen).and_then(|c| range(c, 2)),
        FlatScratchLo => flat_scratch_code(gen).and_then(|c| range(c, 1)),
        FlatScratchHi => flat_scratch_code(gen).and_then(|c| range(c + 1, 1)),
        XnackMask => xnack_mask_code(gen).and_then(|c| range(c, 2)),
        XnackMaskLo => xnack_mask_code(gen).and_then(|c| range(c, 1)),
        XnackMaskHi => xnack_mask_code(gen).and_then(|c| range(c + 1, 1)),
        Tba if !gen.is_gcn14() => range(108, 2),
        TbaLo if !gen.is_gcn14() => range(108, 1),
        TbaHi if !gen.is_gcn14() => range(109, 1),
        Tma if !gen.is_gcn14() => range(110, 2),
        TmaLo if !gen.is_gcn14() => range(110, 1),
        TmaHi if !gen.is_gcn14() => range(111, 1),
        Tba | TbaLo | TbaHi | Tma | TmaLo | TmaHi => None,
        SharedBase if gen.is_gcn14() => range(235, 1),
        SharedLimit if gen.is_gcn14() => range(236, 1),
        PrivateBase if gen.is_gcn14() => range(237, 1),
        PrivateLimit if gen.is_gcn14() => range(238, 1),
        PopsExitingWaveId if gen.is_gcn14() => range(239, 1),
        SharedBase | SharedLimit | PrivateBase | PrivateLimit | PopsExitingWaveId => None,
        Vccz => range(VCCZ, 1),
        Execz => range(EXECZ, 1),
        Scc => range(SCC, 1),
        LdsDirect if !gen.is_gcn15() => range(LDS_DIRECT, 1),
        LdsDirect => None,
    }
}

const M0_CODE: u16 = M0;

fn ident_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len()
        && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_' || bytes[end] == b'$')
    {
        end += 1;
    }
    end
}

/// Parse `N`, `[N]` or `[a:b]` after a register-file prefix. Returns the
/// index pair inclusive.
fn parse_index_range(bytes: &[u8], pos: &mut usize) -> Option<(u16, u16)> {
    let digits = |bytes: &[u8], pos: &mut usize| -> Option<u16> {
        let start = *pos;
        let mut value: u32 = 0;
        while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
            value = value * 10 + (bytes[*pos] - b'0') as u32;
            if value > u16::MAX as u32 {
                return None;
            }
            *pos += 1;
        }
        (*pos > start).then_some(value as u16)
    };
    if bytes.get(*pos) == Some(&b'[') {
        let mut at = *pos + 1;
        let first = digits(bytes, &mut at)?;
        let last = if bytes.get(at) == Some(&b':') {
            at += 1;
            digits(bytes, &mut at)?
        } else {
            first
        };
        if bytes.get(at) != Some(&b']') {
            return None;
        }
        *pos = at + 1;
        Some((first, last))
    } else {
        let first = digits(bytes, pos)?;
        // a trailing identifier character means this was a name, not a
        // register number
        if *pos < bytes.len()
            && (bytes[*pos].is_ascii_alphanumeric() || bytes[*pos] == b'_' || bytes[*pos] == b'$')
        {
            return None;
        }
        Some((first, first))
    }
}

/// Parse one scalar register operand (`s13`, `s[4:5]`, named aliases,
/// `ttmpN`) from `text` at `*pos`. Returns `None` when the input is not a
/// scalar register token.
pub fn parse_sreg_range(
    text: &str,
    pos: &mut usize,
    gen: GcnGen,
) -> Result<Option<RegRange>, EncodeErrorKind> {
    let bytes = text.as_bytes();
    let start = *pos;
    let end = ident_end(bytes, start);
    if end == start {
        return Ok(None);
    }
    let word = &text[start..end];
    // plain sN or s[..]
    if (word.starts_with('s') || word.starts_with('S'))
        && bytes
            .get(start + 1)
            .is_some_and(|b| b.is_ascii_digit() || *b == b'[')
    {
        let mut at = start + 1;
        if let Some((first, last)) = parse_index_range(bytes, &mut at) {
            if last < first || last > max_sgpr(gen) {
                return Err(EncodeErrorKind::BadRegisterRange {
                    start: first,
                    end: last,
                });
            }
            *pos = at;
            return Ok(Some(RegRange::new(first, last - first + 1)));
        }
    }
    // ttmpN / ttmp[a:b]
    if let Some(rest) = word.strip_prefix("ttmp") {
        if rest.is_empty() && bytes.get(end) == Some(&b'[') || !rest.is_empty() {
            let mut at = start + 4;
            if let Some((first, last)) = parse_index_range(bytes, &mut at) {
                if last < first || last >= ttmp_count(gen) {
                    return Err(EncodeErrorKind::BadRegisterRange {
                        start: first,
                        end: last,
                    });
                }
                *pos = at;
                let base = ttmp_base(gen);
                return Ok(Some(RegRange::new(base + first, last - first + 1)));
            }
        }
    }
    // named aliases, optionally indexed like vcc[1]
    let lower = word.to_ascii_lowercase();
    if let Some(&special) = SPECIAL_REGS.get(lower.as_str()) {
        let Some(range) = resolve_special(special, gen) else {
            return Ok(None);
        };
        let mut at = end;
        if bytes.get(at) == Some(&b'[') {
            if let Some((first, last)) = parse_index_range(bytes, &mut at) {
                if last < first || range.start + last >= range.end.max(range.start + 2) {
                    return Err(EncodeErrorKind::BadRegisterRange {
                        start: first,
                        end: last,
                    });
                }
                *pos = at;
                return Ok(Some(RegRange::new(range.start + first, last - first + 1)));
            }
        }
        *pos = end;
        return Ok(Some(range));
    }
    Ok(None)
}

/// Parse one vector register operand (`v13`, `v[4:7]`). Returns `None`
/// when the input is not a vector register token.
pub fn parse_vreg_range(
    text: &str,
    pos: &mut usize,
) -> Result<Option<RegRange>, EncodeErrorKind> {
    let bytes = text.as_bytes();
    let start = *pos;
    if !matches!(bytes.get(start), Some(b'v') | Some(b'V')) {
        return Ok(None);
    }
    if !bytes
        .get(start + 1)
        .is_some_and(|b| b.is_ascii_digit() || *b == b'[')
    {
        return Ok(None);
    }
    let mut at = start + 1;
    let Some((first, last)) = parse_index_range(bytes, &mut at) else {
        return Ok(None);
    };
    if last < first || last > 255 {
        return Err(EncodeErrorKind::BadRegisterRange {
            start: first,
            end: last,
        });
    }
    *pos = at;
    Ok(Some(RegRange::new(
        VGPR_OFFSET + first,
        last - first + 1,
    )))
}

/// Inline-constant code of a small integer
pub fn int_inline_code(value: i64) -> Option<u16> {
    match value {
        0..=64 => Some(128 + value as u16),
        -16..=-1 => Some(192 + (-value) as u16),
        _ => None,
    }
}

/// Integer value of an inline-constant code
pub fn inline_code_int(code: u16) -> Option<i64> {
    match code {
        128..=192 => Some(code as i64 - 128),
        193..=208 => Some(-(code as i64 - 192)),
        _ => None,
    }
}

/// Inline-constant code of a single-precision float, by bit pattern
pub fn f32_inline_code(bits: u32, gen: GcnGen) -> Option<u16> {
    Some(match bits {
        0x3f00_0000 => 240,
        0xbf00_0000 => 241,
        0x3f80_0000 => 242,
        0xbf80_0000 => 243,
        0x4000_0000 => 244,
        0xc000_0000 => 245,
        0x4080_0000 => 246,
        0xc080_0000 => 247,
        0x3e22_f983 if gen.is_gcn12() => 248,
        _ => return None,
    })
}

/// Single-precision bit pattern of a float inline-constant code
pub fn inline_code_f32_bits(code: u16) -> Option<u32> {
    Some(match code {
        240 => 0x3f00_0000,
        241 => 0xbf00_0000,
        242 => 0x3f80_0000,
        243 => 0xbf80_0000,
        244 => 0x4000_0000,
        245 => 0xc000_0000,
        246 => 0x4080_0000,
        247 => 0xc080_0000,
        248 => 0x3e22_f983,
        _ => return None,
    })
}

/// Inline-constant code of a half-precision float, by bit pattern
/// (GCN 1.2 and later)
pub fn f16_inline_code(bits: u16, gen: GcnGen) -> Option<u16> {
    if !gen.is_gcn12() {
        return None;
    }
    Some(match bits {
        0x3800 => 240,
        0xb800 => 241,
        0x3c00 => 242,
        0xbc00 => 243,
        0x4000 => 244,
        0xc000 => 245,
        0x4400 => 246,
        0xc400 => 247,
        0x3118 => 248,
        _ => return None,
    })
}

/// Format a scalar operand range back to its canonical name
pub fn format_sreg(range: RegRange, gen: GcnGen) -> String {
    let (start, len) = (range.start, range.len());
    let named_pair = |lo: &str, full: &str, base: u16| {
        if start == base && len == 2 {
            Some(full.to_string())
        } else if start == base && len == 1 {
            Some(format!("{lo}_lo"))
        } else if start == base + 1 && len == 1 {
            Some(format!("{lo}_hi"))
        } else {
            None
        }
    };
    if let Some(name) = named_pair("vcc", "vcc", VCC_LO) {
        return name;
    }
    if let Some(name) = named_pair("exec", "exec", EXEC_LO) {
        return name;
    }
    if let Some(code) = flat_scratch_code(gen) {
        if let Some(name) = named_pair("flat_scratch", "flat_scratch", code) {
            return name;
        }
    }
    if let Some(code) = xnack_mask_code(gen) {
        if let Some(name) = named_pair("xnack_mask", "xnack_mask", code) {
            return name;
        }
    }
    if start == M0 && len == 1 {
        return "m0".to_string();
    }
    if gen.is_gcn15() && start == NULL_CODE && len == 1 {
        return "null".to_string();
    }
    match start {
        VCCZ => return "vccz".to_string(),
        EXECZ => return "execz".to_string(),
        SCC => return "scc".to_string(),
        LDS_DIRECT => return "lds_direct".to_string(),
        235 if gen.is_gcn14() => return "shared_base".to_string(),
        236 if gen.is_gcn14() => return "shared_limit".to_string(),
        237 if gen.is_gcn14() => return "private_base".to_string(),
        238 if gen.is_gcn14() => return "private_limit".to_string(),
        239 if gen.is_gcn14() => return "pops_exiting_wave_id".to_string(),
        _ => {}
    }
    let ttmp0 = ttmp_base(gen);
    if start >= ttmp0 && start + len <= ttmp0 + ttmp_count(gen) {
        return if len == 1 {
            format!("ttmp{}", start - ttmp0)
        } else {
            format!("ttmp[{}:{}]", start - ttmp0, start - ttmp0 + len - 1)
        };
    }
    if len == 1 {
        format!("s{start}")
    } else {
        format!("s[{}:{}]", start, start + len - 1)
    }
}

/// Format a vector operand range back to its canonical name
pub fn format_vreg(range: RegRange) -> String {
    let start = range.vgpr_index();
    if range.len() == 1 {
        format!("v{start}")
    } else {
        format!("v[{}:{}]", start, start + range.len() - 1)
    }
}

/// Hardware-register ids accepted by `s_getreg`/`s_setreg`
pub static HWREG_NAMES: phf::Map<&'static str, u16> = phf_map! {
    "mode" => 1,
    "status" => 2,
    "trapsts" => 3,
    "hw_id" => 4,
    "gpr_alloc" => 5,
    "lds_alloc" => 6,
    "ib_sts" => 7,
    "pc_lo" => 8,
    "pc_hi" => 9,
    "inst_dw0" => 10,
    "inst_dw1" => 11,
    "ib_dbg0" => 12,
    "ib_dbg1" => 13,
    "flush_ib" => 14,
    "sh_mem_bases" => 15,
    "sq_shader_tba_lo" => 16,
    "sq_shader_tba_hi" => 17,
    "sq_shader_tma_lo" => 18,
    "sq_shader_tma_hi" => 19,
};

/// Name of a hardware-register id, for disassembly
pub fn hwreg_name(id: u16) -> Option<&'static str> {
    HWREG_NAMES
        .entries()
        .find(|&(_, &v)| v == id)
        .map(|(k, _)| *k)
}

/// Message types accepted by `s_sendmsg`
pub static SENDMSG_NAMES: phf::Map<&'static str, u16> = phf_map! {
    "interrupt" => 1,
    "int" => 1,
    "gs" => 2,
    "gs_done" => 3,
    "savewave" => 4,
    "stall_wave_gen" => 5,
    "halt_waves" => 6,
    "ordered_ps_done" => 7,
    "early_prim_dealloc" => 8,
    "gs_alloc_req" => 9,
    "get_doorbell" => 10,
    "system" => 15,
    "sysmsg" => 15,
};

/// Canonical name of a message type, for disassembly
pub fn sendmsg_name(id: u16) -> Option<&'static str> {
    Some(match id {
        1 => "interrupt",
        2 => "gs",
        3 => "gs_done",
        4 => "savewave",
        5 => "stall_wave_gen",
        6 => "halt_waves",
        7 => "ordered_ps_done",
        8 => "early_prim_dealloc",
        9 => "gs_alloc_req",
        10 => "get_doorbell",
        15 => "system",
        _ => return None,
    })
}

/// GS operations of the `gs`/`gs_done` messages
pub static SENDMSG_GSOPS: phf::Map<&'static str, u16> = phf_map! {
    "nop" => 0,
    "cut" => 1,
    "emit" => 2,
    "emit_cut" => 3,
    "emit-cut" => 3,
};

/// Canonical name of a GS operation, for disassembly
pub fn sendmsg_gsop_name(op: u16) -> Option<&'static str> {
    Some(match op {
        0 => "nop",
        1 => "cut",
        2 => "emit",
        3 => "emit_cut",
        _ => return None,
    })
}

/// Per-generation limits of the `s_waitcnt` counters
pub fn waitcnt_maxes(gen: GcnGen) -> (u16, u16, u16) {
    let vmcnt = if gen.is_gcn14() { 63 } else { 15 };
    let lgkmcnt = if gen.is_gcn15() { 63 } else { 15 };
    (vmcnt, 7, lgkmcnt)
}

/// Pack `vmcnt`/`expcnt`/`lgkmcnt` values into the 16-bit wait field
pub fn encode_waitcnt(gen: GcnGen, vmcnt: u16, expcnt: u16, lgkmcnt: u16) -> u16 {
    let mut word = (vmcnt & 15) | ((expcnt & 7) << 4);
    if gen.is_gcn14() {
        word |= (vmcnt & 0x30) << 10;
    }
    if gen.is_gcn15() {
        word |= (lgkmcnt & 63) << 8;
    } else {
        word |= (lgkmcnt & 15) << 8;
    }
    word
}

/// Unpack the 16-bit wait field into `(vmcnt, expcnt, lgkmcnt)`
pub fn decode_waitcnt(gen: GcnGen, word: u16) -> (u16, u16, u16) {
    let mut vmcnt = word & 15;
    if gen.is_gcn14() {
        vmcnt |= (word >> 10) & 0x30;
    }
    let expcnt = (word >> 4) & 7;
    let lgkmcnt = if gen.is_gcn15() {
        (word >> 8) & 63
    } else {
        (word >> 8) & 15
    };
    (vmcnt, expcnt, lgkmcnt)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_plain_registers() {
        let mut pos = 0;
        let r = parse_sreg_range("s13", &mut pos, GcnGen::Gcn10).unwrap().unwrap();
        assert_eq!((r.start, r.len()), (13, 1));
        let mut pos = 0;
        let r = parse_sreg_range("s[4:5],", &mut pos, GcnGen::Gcn10)
            .unwrap()
            .unwrap();
        assert_eq!((r.start, r.len()), (4, 2));
        assert_eq!(pos, 6);
        let mut pos = 0;
        let r = parse_vreg_range("v[4:7]", &mut pos).unwrap().unwrap();
        assert_eq!((r.vgpr_index(), r.len()), (4, 4));
        let mut pos = 0;
        assert!(parse_vreg_range("vcc", &mut pos).unwrap().is_none());
    }

    #[test]
    fn test_parse_special_registers() {
        let mut pos = 0;
        let r = parse_sreg_range("vcc", &mut pos, GcnGen::Gcn10).unwrap().unwrap();
        assert_eq!((r.start, r.len()), (106, 2));
        let mut pos = 0;
        let r = parse_sreg_range("vcc[1:1]", &mut pos, GcnGen::Gcn10)
            .unwrap()
            .unwrap();
        assert_eq!((r.start, r.len()), (107, 1));
        let mut pos = 0;
        let r = parse_sreg_range("flat_scratch_lo", &mut pos, GcnGen::Gcn12)
            .unwrap()
            .unwrap();
        assert_eq!(r.start, 102);
        let mut pos = 0;
        let r = parse_sreg_range("xnack_mask_hi", &mut pos, GcnGen::Gcn12)
            .unwrap()
            .unwrap();
        assert_eq!(r.start, 105);
        // GCN 1.0 has no flat_scratch
        let mut pos = 0;
        assert!(parse_sreg_range("flat_scratch", &mut pos, GcnGen::Gcn10)
            .unwrap()
            .is_none());
        let mut pos = 0;
        let r = parse_sreg_range("shared_base", &mut pos, GcnGen::Gcn14)
            .unwrap()
            .unwrap();
        assert_eq!(r.start, 235);
    }

    #[test]
    fn test_parse_ttmp() {
        let mut pos = 0;
        let r = parse_sreg_range("ttmp12", &mut pos, GcnGen::Gcn10)
            .unwrap()
            .unwrap();
        assert_eq!(r.start, 112 + 12 - 12);
        assert_eq!(r.start, 112);
        let mut pos = 0;
        let r = parse_sreg_range("ttmp12", &mut pos, GcnGen::Gcn14)
            .unwrap()
            .unwrap();
        assert_eq!(r.start, 108 + 12);
        let mut pos = 0;
        assert!(parse_sreg_range("ttmp12", &mut pos, GcnGen::Gcn12).is_err());
        let mut pos = 0;
        let r = parse_sreg_range("ttmp[2:2]", &mut pos, GcnGen::Gcn10)
            .unwrap()
            .unwrap();
        assert_eq!((r.start, r.len()), (114, 1));
    }

    #[test]
    fn test_sgpr_limits_per_generation() {
        let mut pos = 0;
        assert!(parse_sreg_range("s103", &mut pos, GcnGen::Gcn15).unwrap().is_some());
        let mut pos = 0;
        assert!(parse_sreg_range("s103", &mut pos, GcnGen::Gcn12).is_err());
        let mut pos = 0;
        assert!(parse_sreg_range("s103", &mut pos, GcnGen::Gcn10).unwrap().is_some());
    }

    #[test]
    fn test_inline_constants() {
        assert_eq!(int_inline_code(0), Some(128));
        assert_eq!(int_inline_code(64), Some(192));
        assert_eq!(int_inline_code(-1), Some(193));
        assert_eq!(int_inline_code(-16), Some(208));
        assert_eq!(int_inline_code(65), None);
        assert_eq!(inline_code_int(193), Some(-1));
        assert_eq!(f32_inline_code(0.5f32.to_bits(), GcnGen::Gcn10), Some(240));
        assert_eq!(f32_inline_code((-4.0f32).to_bits(), GcnGen::Gcn10), Some(247));
        // 1/(2*pi) is inline only from GCN 1.2 on
        assert_eq!(f32_inline_code(0x3e22f983, GcnGen::Gcn10), None);
        assert_eq!(f32_inline_code(0x3e22f983, GcnGen::Gcn12), Some(248));
        assert_eq!(f16_inline_code(0x3800, GcnGen::Gcn12), Some(240));
        assert_eq!(f16_inline_code(0x3800, GcnGen::Gcn10), None);
    }

    #[test]
    fn test_format_registers() {
        assert_eq!(format_sreg(RegRange::new(21, 1), GcnGen::Gcn10), "s21");
        assert_eq!(format_sreg(RegRange::new(20, 2), GcnGen::Gcn10), "s[20:21]");
        assert_eq!(format_sreg(RegRange::new(106, 2), GcnGen::Gcn10), "vcc");
        assert_eq!(format_sreg(RegRange::new(127, 1), GcnGen::Gcn10), "exec_hi");
        assert_eq!(format_sreg(RegRange::new(102, 1), GcnGen::Gcn12), "flat_scratch_lo");
        assert_eq!(format_sreg(RegRange::new(120, 1), GcnGen::Gcn14), "ttmp12");
        assert_eq!(format_vreg(RegRange::new(VGPR_OFFSET + 154, 1)), "v154");
        assert_eq!(format_vreg(RegRange::new(VGPR_OFFSET + 4, 4)), "v[4:7]");
    }

    #[test]
    fn test_waitcnt_fields() {
        // unspecified counters stay at their maximum
        let word = encode_waitcnt(GcnGen::Gcn10, 14, 7, 15);
        assert_eq!(word, 0x0f7e);
        assert_eq!(decode_waitcnt(GcnGen::Gcn10, 0x0f7e), (14, 7, 15));
        let word = encode_waitcnt(GcnGen::Gcn14, 35, 7, 15);
        assert_eq!(decode_waitcnt(GcnGen::Gcn14, word), (35, 7, 15));
    }
}
