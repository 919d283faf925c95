//! The GCN instruction encoder. One call encodes one mnemonic line into
//! one or two 32-bit words appended to the current section, resolving
//! operands through the expression engine: inline constants are folded
//! in-slot, out-of-line constants take the single literal word, and
//! unresolved expressions register patches or relocations.

use crate::error::{Diagnostic, EncodeError, EncodeErrorKind};
use crate::expr::parse::{parse_expression, ParseOptions};
use crate::expr::{EvalOutcome, ExprArg, ExprId, ExprOp, ExprTarget, SymbolEnv};
use crate::num;
use crate::section::{
    CodeFlowEntry, CodeFlowKind, DelayedOp, RegAccess, RegVarUsage, Relocation, RelocKind,
    RelocRef, Section, SectionId, WaitInstr, SECTION_ABS,
};
use crate::source::{LineCol, SourcePos};

use super::regs::{self, RegRange, LITERAL, VGPR_OFFSET};
use super::table::{self, GcnEncoding, GcnInstruction};
use super::{ArchMask, GcnGen};

/// Instruction-field ids recorded into register-usage records
pub mod fields {
    /// Destination register field
    pub const DST: u8 = 1;
    /// First source field
    pub const SRC0: u8 = 2;
    /// Second source field
    pub const SRC1: u8 = 3;
    /// Third source field
    pub const SRC2: u8 = 4;
    /// Memory data field
    pub const DATA: u8 = 5;
    /// Address field
    pub const ADDR: u8 = 6;
    /// Resource descriptor field
    pub const RSRC: u8 = 7;
    /// Sampler descriptor field
    pub const SAMP: u8 = 8;
    /// Scalar offset field
    pub const SOFFSET: u8 = 9;
}

/// Wait-queue indices of the waitcnt discipline
pub mod queues {
    /// Vector memory queue
    pub const VM: u8 = 0;
    /// Export queue
    pub const EXP: u8 = 1;
    /// LDS/GDS/constant/message queue
    pub const LGKM: u8 = 2;
}

#[derive(Debug, Clone, Copy)]
/// Target context of one encoding run
pub struct EncodeContext {
    /// Generation to encode for
    pub gen: GcnGen,
    /// Wave32 execution mode (GCN 1.5)
    pub wave32: bool,
}

impl EncodeContext {
    /// Architecture mask of the context
    pub fn arch(&self) -> ArchMask {
        self.gen.mask(self.wave32)
    }
}

/// Everything an encoding run writes into
pub struct EncodeSink<'a> {
    /// The symbol environment operand expressions resolve through
    pub env: &'a mut SymbolEnv,
    /// All sections of the assembly
    pub sections: &'a mut Vec<Section>,
    /// The section instruction words land in
    pub section: SectionId,
    /// Relocations accumulated for the output binary
    pub relocs: &'a mut Vec<Relocation>,
    /// Recoverable diagnostics
    pub diags: &'a mut Vec<Diagnostic>,
}

/// Encode one instruction line (`mnemonic operands...`) for the given
/// context, appending its words to the sink's current section
pub fn encode_instruction(
    ctx: &EncodeContext,
    line: &str,
    pos: &SourcePos,
    sink: &mut EncodeSink,
) -> Result<(), EncodeError> {
    let text = line.trim_end();
    let mut at = 0;
    let bytes = text.as_bytes();
    while at < bytes.len() && (bytes[at] == b' ' || bytes[at] == b'\t') {
        at += 1;
    }
    let mn_start = at;
    while at < bytes.len() && bytes[at] != b' ' && bytes[at] != b'\t' {
        at += 1;
    }
    let mnemonic = &text[mn_start..at].to_ascii_lowercase();
    let err = |kind| Err(EncodeError::new(pos.clone(), kind));
    if mnemonic.is_empty() {
        return err(EncodeErrorKind::UnknownMnemonic {
            name: String::new(),
        });
    }
    let offset = sink.sections[sink.section as usize].len();
    if offset % 4 != 0 {
        return err(EncodeErrorKind::MisalignedInstruction { offset });
    }
    let candidates: Vec<&'static GcnInstruction> = table::lookup(mnemonic, ctx.arch()).collect();
    if candidates.is_empty() {
        if table::known_mnemonic(mnemonic) {
            return err(EncodeErrorKind::UnsupportedOnGeneration {
                name: mnemonic.clone(),
            });
        }
        return err(EncodeErrorKind::UnknownMnemonic {
            name: mnemonic.clone(),
        });
    }
    let ins = candidates[0];
    let mut enc = Encoder {
        ctx,
        ins,
        pos,
        text,
        at,
        sink,
        offset,
        words: Vec::new(),
        literal: None,
        deferred: Vec::new(),
        usages: Vec::new(),
    };
    enc.run()?;
    enc.finish()
}

/// A literal payload pending for the second instruction word
enum Lit {
    Value(u32),
    /// Unresolved expression patched in once it evaluates; relocation
    /// kind detected from the expression shape
    Deferred(ExprId, RelocKind),
}

/// A parsed source operand in the unified code space
enum Src {
    Code(u16),
    Literal(Lit),
}

struct Encoder<'a, 'b> {
    ctx: &'a EncodeContext,
    ins: &'static GcnInstruction,
    pos: &'a SourcePos,
    text: &'a str,
    at: usize,
    sink: &'a mut EncodeSink<'b>,
    offset: u64,
    words: Vec<u32>,
    literal: Option<Lit>,
    /// (expression, byte offset relative to instruction start, width)
    deferred: Vec<(ExprId, u64, u8)>,
    usages: Vec<RegVarUsage>,
}

impl<'a, 'b> Encoder<'a, 'b> {
    fn err(&self, kind: EncodeErrorKind) -> EncodeError {
        EncodeError::new(self.pos.clone(), kind)
    }

    fn skip_ws(&mut self) {
        let bytes = self.text.as_bytes();
        while self.at < bytes.len() && (bytes[self.at] == b' ' || bytes[self.at] == b'\t') {
            self.at += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.at >= self.text.len()
    }

    fn expect_comma(&mut self) -> Result<(), EncodeError> {
        self.skip_ws();
        if self.text.as_bytes().get(self.at) == Some(&b',') {
            self.at += 1;
            Ok(())
        } else {
            Err(self.err(EncodeErrorKind::MissingComma))
        }
    }

    fn peek_word(&mut self) -> &'a str {
        self.skip_ws();
        let bytes = self.text.as_bytes();
        let start = self.at;
        let mut end = start;
        while end < bytes.len()
            && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_' || bytes[end] == b'.')
        {
            end += 1;
        }
        &self.text[start..end]
    }

    fn take_flag(&mut self, name: &str) -> bool {
        let word = self.peek_word();
        if word.eq_ignore_ascii_case(name) {
            self.at += word.len();
            true
        } else {
            false
        }
    }

    fn record_usage(&mut self, range: RegRange, field: u8, access: RegAccess) {
        let (rstart, rend, align) = if range.is_vgpr() {
            (range.vgpr_index(), range.vgpr_index() + range.len(), 1)
        } else {
            let align = if range.len() > 1 { 2 } else { 1 };
            (range.start, range.end, align)
        };
        self.usages.push(RegVarUsage {
            offset: self.offset,
            regvar: None,
            rstart,
            rend,
            field,
            access,
            align,
            use_reg_mode: false,
        });
    }

    /// Parse a scalar destination of `len` registers
    fn parse_sdst(&mut self, len: u16) -> Result<RegRange, EncodeError> {
        self.skip_ws();
        let range = self.parse_reg_operand(false)?;
        let Some(range) = range else {
            return Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "scalar register",
            }));
        };
        if range.is_vgpr() || range.len() != len {
            return Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "scalar register of matching size",
            }));
        }
        if len == 2 && range.start < 102 && range.start % 2 != 0 {
            return Err(self.err(EncodeErrorKind::BadRegisterRange {
                start: range.start,
                end: range.end - 1,
            }));
        }
        self.record_usage(range, fields::DST, RegAccess::WRITE);
        Ok(range)
    }

    /// Parse a vector register operand of `len` registers
    fn parse_vreg(&mut self, len: u16, field: u8, access: RegAccess) -> Result<RegRange, EncodeError> {
        self.skip_ws();
        let range = self.parse_reg_operand(true)?;
        match range {
            Some(range) if range.is_vgpr() && range.len() == len => {
                self.record_usage(range, field, access);
                Ok(range)
            }
            _ => Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "vector register of matching size",
            })),
        }
    }

    /// Parse a register token, also resolving register-range symbols
    fn parse_reg_operand(&mut self, vector_first: bool) -> Result<Option<RegRange>, EncodeError> {
        if vector_first {
            if let Some(r) = regs::parse_vreg_range(self.text, &mut self.at)
                .map_err(|e| EncodeError::new(self.pos.clone(), e))?
            {
                return Ok(Some(r));
            }
        }
        if let Some(r) = regs::parse_sreg_range(self.text, &mut self.at, self.ctx.gen)
            .map_err(|e| EncodeError::new(self.pos.clone(), e))?
        {
            return Ok(Some(r));
        }
        if !vector_first {
            if let Some(r) = regs::parse_vreg_range(self.text, &mut self.at)
                .map_err(|e| EncodeError::new(self.pos.clone(), e))?
            {
                return Ok(Some(r));
            }
        }
        // a symbol naming a register range
        let word = self.peek_word();
        if !word.is_empty() {
            if let Some(sym) = self.sink.env.scopes.resolve_symbol(word) {
                let packed = self
                    .sink
                    .env
                    .symbols
                    .get(sym)
                    .filter(|s| s.reg_range && s.has_value)
                    .map(|s| s.value);
                if let Some(packed) = packed {
                    self.at += word.len();
                    return Ok(Some(unpack_reg_range(packed)));
                }
            }
        }
        Ok(None)
    }

    /// Parse a 9-bit-code source operand: register, inline constant,
    /// literal or deferred expression
    fn parse_src(&mut self, len: u16, field: u8, vgpr_ok: bool) -> Result<Src, EncodeError> {
        self.skip_ws();
        if let Some(range) = self.parse_reg_operand(false)? {
            if range.is_vgpr() && !vgpr_ok {
                return Err(self.err(EncodeErrorKind::IllegalOperand {
                    expected: "scalar register or constant",
                }));
            }
            if range.len() != len {
                return Err(self.err(EncodeErrorKind::IllegalOperand {
                    expected: "register of matching size",
                }));
            }
            self.record_usage(range, field, RegAccess::READ);
            return Ok(Src::Code(range.start));
        }
        if let Some(bits) = self.try_float_literal()? {
            let inline = if self.ins.mode & table::M_F16 != 0 {
                regs::f16_inline_code(bits as u16, self.ctx.gen)
            } else {
                regs::f32_inline_code(bits, self.ctx.gen)
            };
            return Ok(match inline {
                Some(code) => Src::Code(code),
                None => Src::Literal(Lit::Value(bits)),
            });
        }
        self.parse_imm_src()
    }

    /// Parse an integer source: expression folded to an inline constant,
    /// a literal, a relocated literal, or a deferred patch
    fn parse_imm_src(&mut self) -> Result<Src, EncodeError> {
        let expr = self.parse_operand_expr()?;
        let kind = self.strip_reloc_pattern(expr);
        let full_ops = self
            .sink
            .env
            .exprs
            .get(expr)
            .map(|e| e.ops_len())
            .unwrap_or(0);
        // relocation shapes evaluate their inner value; the mask or shift
        // is applied by the relocation itself
        let eval_ops = if kind == RelocKind::Whole {
            full_ops
        } else {
            full_ops - 2
        };
        let outcome = self
            .sink
            .env
            .try_evaluate(expr, 0, eval_ops, false, self.sink.sections);
        match outcome {
            Ok(EvalOutcome::Value {
                value,
                section: SECTION_ABS,
            }) => {
                self.release_expr(expr);
                let value = match kind {
                    RelocKind::Low32 => value & 0xffff_ffff,
                    RelocKind::High32 => value >> 32,
                    RelocKind::Whole => value,
                };
                if let Some(code) = regs::int_inline_code(value as i64) {
                    return Ok(Src::Code(code));
                }
                Ok(Src::Literal(Lit::Value(self.check_imm32(value)?)))
            }
            Ok(EvalOutcome::Value { value, section }) => {
                // section-relative: the literal field takes a relocation
                self.release_expr(expr);
                self.sink.relocs.push(Relocation {
                    section: self.sink.section,
                    offset: self.offset + 4,
                    kind,
                    target: RelocRef::Section(section),
                    addend: value,
                });
                Ok(Src::Literal(Lit::Value(value as u32)))
            }
            Ok(EvalOutcome::TryLater) => Ok(Src::Literal(Lit::Deferred(expr, kind))),
            Err(e) => {
                self.release_expr(expr);
                Err(EncodeError::new(e.pos.clone(), EncodeErrorKind::Expr(e.kind)))
            }
        }
    }

    /// Detect the `expr & 0xffffffff` and `expr >> 32` relocation shapes
    fn strip_reloc_pattern(&mut self, expr: ExprId) -> RelocKind {
        let Some(e) = self.sink.env.exprs.get(expr) else {
            return RelocKind::Whole;
        };
        let n = e.ops.len();
        if n >= 2 {
            let last_arg = e.args.last().copied();
            match (e.ops[n - 2], e.ops[n - 1], last_arg) {
                (
                    ExprOp::ArgValue,
                    ExprOp::BitAnd,
                    Some(ExprArg::Value {
                        value: 0xffff_ffff, ..
                    }),
                ) => return RelocKind::Low32,
                (ExprOp::ArgValue, ExprOp::Shr, Some(ExprArg::Value { value: 32, .. })) => {
                    return RelocKind::High32
                }
                _ => {}
            }
        }
        RelocKind::Whole
    }

    fn check_imm32(&self, value: u64) -> Result<u32, EncodeError> {
        let signed = value as i64;
        if value > u32::MAX as u64 && (signed < i32::MIN as i64 || signed > u32::MAX as i64) {
            return Err(self.err(EncodeErrorKind::ImmOutOfRange { value, bits: 32 }));
        }
        Ok(value as u32)
    }

    /// Parse a float literal token when the input looks like one
    fn try_float_literal(&mut self) -> Result<Option<u32>, EncodeError> {
        let rest = &self.text[self.at..];
        let bytes = rest.as_bytes();
        let mut scan = 0;
        if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
            scan += 1;
        }
        let digit_start = scan;
        while scan < bytes.len() && bytes[scan].is_ascii_digit() {
            scan += 1;
        }
        let is_hex_float =
            rest[digit_start..].starts_with("0x") || rest[digit_start..].starts_with("0X");
        let float_like = if is_hex_float {
            rest[digit_start..]
                .bytes()
                .take_while(|b| !matches!(b, b',' | b' ' | b'\t'))
                .any(|b| matches!(b, b'p' | b'P' | b'.'))
        } else if scan > digit_start {
            match bytes.get(scan) {
                Some(b'.') => true,
                // an exponent needs digits or a sign after it
                Some(b'e') | Some(b'E') => matches!(
                    bytes.get(scan + 1),
                    Some(b'+') | Some(b'-') | Some(b'0'..=b'9')
                ),
                _ => false,
            }
        } else {
            false
        };
        if !float_like {
            return Ok(None);
        }
        let parsed = if self.ins.mode & table::M_F16 != 0 {
            num::parse_f16(rest).map(|(bits, used)| (bits as u32, used))
        } else {
            num::parse_f32(rest)
        };
        match parsed {
            Ok((bits, used)) => {
                self.at += used;
                Ok(Some(bits))
            }
            Err(e) => Err(self.err(EncodeErrorKind::Expr(e.into()))),
        }
    }

    /// Parse an operand expression from the current position
    fn parse_operand_expr(&mut self) -> Result<ExprId, EncodeError> {
        self.skip_ws();
        let base = SourcePos {
            file: self.pos.file.clone(),
            line: self.pos.line,
            col: self.pos.col + self.at as u64,
        };
        let sub = &self.text[self.at..];
        let mut sub_at = 0;
        let expr = parse_expression(
            self.sink.env,
            sub,
            &mut sub_at,
            &base,
            ParseOptions::default(),
        )
        .map_err(|e| EncodeError::new(e.pos.clone(), EncodeErrorKind::Expr(e.kind)))?;
        self.at += sub_at;
        Ok(expr)
    }

    /// Evaluate an operand expression now when it has no unresolved
    /// references; `None` means resolution is deferred
    fn eval_now(&mut self, expr: ExprId) -> Result<Option<(u64, SectionId)>, EncodeError> {
        let Some(e) = self.sink.env.exprs.get(expr) else {
            return Ok(None);
        };
        if e.sym_occurs() != 0 {
            return Ok(None);
        }
        let ops = e.ops_len();
        match self
            .sink
            .env
            .try_evaluate(expr, 0, ops, false, self.sink.sections)
        {
            Ok(EvalOutcome::Value { value, section }) => Ok(Some((value, section))),
            Ok(EvalOutcome::TryLater) => Ok(None),
            Err(e) => Err(EncodeError::new(e.pos.clone(), EncodeErrorKind::Expr(e.kind))),
        }
    }

    fn release_expr(&mut self, expr: ExprId) {
        self.sink.env.exprs.release(expr);
    }

    /// Parse an immediate that must resolve now and fit `bits`
    fn parse_imm_now(&mut self, bits: u32) -> Result<u64, EncodeError> {
        let expr = self.parse_operand_expr()?;
        let Some((value, section)) = self.eval_now(expr)? else {
            self.release_expr(expr);
            return Err(self.err(EncodeErrorKind::Expr(
                crate::error::ExprErrorKind::SymbolNotFound {
                    name: String::new(),
                },
            )));
        };
        self.release_expr(expr);
        if section != SECTION_ABS {
            return Err(self.err(EncodeErrorKind::Expr(
                crate::error::ExprErrorKind::CrossSection,
            )));
        }
        if bits < 64 && value >> bits != 0 {
            return Err(self.err(EncodeErrorKind::ImmOutOfRange { value, bits }));
        }
        Ok(value)
    }

    /// Parse a 16-bit immediate field, deferring to a patch when forward
    /// references remain. `byte` is the field offset within the word.
    fn parse_imm16_field(&mut self, byte: u64, bits: u32) -> Result<u16, EncodeError> {
        let expr = self.parse_operand_expr()?;
        match self.eval_now(expr)? {
            Some((value, SECTION_ABS)) => {
                self.release_expr(expr);
                let signed = value as i64;
                if bits == 16 {
                    if signed > u16::MAX as i64 || signed < i16::MIN as i64 {
                        return Err(self.err(EncodeErrorKind::ImmOutOfRange { value, bits }));
                    }
                } else if value >> bits != 0 {
                    return Err(self.err(EncodeErrorKind::ImmOutOfRange { value, bits }));
                }
                Ok(value as u16)
            }
            Some((_, _)) => Err(self.err(EncodeErrorKind::Expr(
                crate::error::ExprErrorKind::CrossSection,
            ))),
            None => {
                self.deferred.push((expr, byte, if bits > 8 { 2 } else { 1 }));
                Ok(0)
            }
        }
    }

    /// Parse a branch target. The 16-bit field counts words from the end
    /// of the instruction; a code-flow entry tracks the absolute target.
    fn parse_branch_imm16(&mut self, kind: CodeFlowKind) -> Result<u16, EncodeError> {
        let branch_base = self.offset + 4;
        let operand_at = self.at;
        let expr = self.parse_operand_expr()?;
        match self.eval_now(expr)? {
            Some((value, section)) => {
                self.release_expr(expr);
                if section != self.sink.section && section != SECTION_ABS {
                    return Err(self.err(EncodeErrorKind::Expr(
                        crate::error::ExprErrorKind::CrossSection,
                    )));
                }
                let rel = value.wrapping_sub(branch_base) as i64;
                if rel % 4 != 0 {
                    return Err(self.err(EncodeErrorKind::MisalignedInstruction {
                        offset: value,
                    }));
                }
                let words = rel >> 2;
                if words > i16::MAX as i64 || words < i16::MIN as i64 {
                    return Err(self.err(EncodeErrorKind::ImmOutOfRange {
                        value,
                        bits: 16,
                    }));
                }
                self.sink.sections[self.sink.section as usize].add_code_flow(CodeFlowEntry {
                    offset: self.offset,
                    target: value,
                    kind,
                });
                Ok(words as u16 & 0xffff)
            }
            None => {
                // wrap the expression into ((target - base) / 4) and
                // patch the field when it resolves
                let lc = LineCol {
                    line: self.pos.line,
                    col: self.pos.col + operand_at as u64,
                };
                self.sink.env.append_postfix(
                    expr,
                    &[ExprOp::Sub, ExprOp::ArgValue, ExprOp::Div],
                    &[
                        ExprArg::Value {
                            value: branch_base,
                            section: self.sink.section,
                        },
                        ExprArg::Value {
                            value: 4,
                            section: SECTION_ABS,
                        },
                    ],
                    lc,
                );
                self.deferred.push((expr, 0, 2));
                // a second parse of the same operand drives the code-flow
                // entry to the absolute target
                let section = self.sink.section;
                let index = self.sink.sections[section as usize].code_flow.len();
                self.sink.sections[section as usize].add_code_flow(CodeFlowEntry {
                    offset: self.offset,
                    target: 0,
                    kind,
                });
                let save = self.at;
                self.at = operand_at;
                let cf_expr = self.parse_operand_expr()?;
                self.at = save;
                self.sink.env.bind_target(
                    cf_expr,
                    ExprTarget::CodeFlow { section, index },
                    self.sink.sections,
                    self.sink.diags,
                );
                Ok(0)
            }
        }
    }

    /// Parse a `hwreg(name, offset, width)` operand into its 16-bit form
    fn parse_hwreg(&mut self) -> Result<u16, EncodeError> {
        self.skip_ws();
        let word = self.peek_word();
        if !word.eq_ignore_ascii_case("hwreg") {
            return Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "hwreg(...)",
            }));
        }
        self.at += word.len();
        self.expect_char('(')?;
        self.skip_ws();
        let name = self.peek_word();
        let id = if let Some(&id) = regs::HWREG_NAMES.get(name.to_ascii_lowercase().as_str()) {
            self.at += name.len();
            id
        } else {
            self.parse_imm_now(6)? as u16
        };
        self.expect_char(',')?;
        let offset = self.parse_imm_now(5)? as u16;
        self.expect_char(',')?;
        let width = self.parse_imm_now(6)? as u16;
        if width == 0 || width > 32 {
            return Err(self.err(EncodeErrorKind::ImmOutOfRange {
                value: width as u64,
                bits: 5,
            }));
        }
        self.expect_char(')')?;
        Ok(id | (offset << 6) | ((width - 1) << 11))
    }

    /// Parse a `sendmsg(type, op, stream)` operand into its 16-bit form
    fn parse_sendmsg(&mut self) -> Result<u16, EncodeError> {
        self.skip_ws();
        let word = self.peek_word();
        if !word.eq_ignore_ascii_case("sendmsg") {
            return Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "sendmsg(...)",
            }));
        }
        self.at += word.len();
        self.expect_char('(')?;
        self.skip_ws();
        let name = self.peek_word();
        let msg = if let Some(&id) = regs::SENDMSG_NAMES.get(name.to_ascii_lowercase().as_str()) {
            self.at += name.len();
            id
        } else {
            self.parse_imm_now(4)? as u16
        };
        let mut op = 0;
        let mut stream = 0;
        self.skip_ws();
        if self.text.as_bytes().get(self.at) == Some(&b',') {
            self.at += 1;
            self.skip_ws();
            let name = self.peek_word();
            op = if let Some(&id) = regs::SENDMSG_GSOPS.get(name.to_ascii_lowercase().as_str()) {
                self.at += name.len();
                id
            } else {
                self.parse_imm_now(3)? as u16
            };
            self.skip_ws();
            if self.text.as_bytes().get(self.at) == Some(&b',') {
                self.at += 1;
                stream = self.parse_imm_now(2)? as u16;
            }
        }
        self.expect_char(')')?;
        Ok(msg | (op << 4) | (stream << 8))
    }

    fn expect_char(&mut self, ch: char) -> Result<(), EncodeError> {
        self.skip_ws();
        if self.text[self.at..].starts_with(ch) {
            self.at += ch.len_utf8();
            Ok(())
        } else if ch == ',' {
            Err(self.err(EncodeErrorKind::MissingComma))
        } else {
            Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "well-formed operand",
            }))
        }
    }

    /// Parse `key:value` style trailing modifier; returns the value
    fn take_keyed(&mut self, name: &str, bits: u32) -> Result<Option<u64>, EncodeError> {
        let save = self.at;
        let word = self.peek_word();
        if !word.eq_ignore_ascii_case(name) {
            return Ok(None);
        }
        self.at += word.len();
        self.skip_ws();
        if self.text.as_bytes().get(self.at) != Some(&b':') {
            self.at = save;
            return Ok(None);
        }
        self.at += 1;
        Ok(Some(self.parse_imm_now(bits)?))
    }

    fn run(&mut self) -> Result<(), EncodeError> {
        match self.ins.encoding {
            GcnEncoding::Sop2 => self.encode_sop2(),
            GcnEncoding::Sopk => self.encode_sopk(),
            GcnEncoding::Sop1 => self.encode_sop1(),
            GcnEncoding::Sopc => self.encode_sopc(),
            GcnEncoding::Sopp => self.encode_sopp(),
            GcnEncoding::Smrd => self.encode_smrd(),
            GcnEncoding::Smem => self.encode_smem(),
            GcnEncoding::Vop2 => self.encode_vop2(),
            GcnEncoding::Vop1 => self.encode_vop1(),
            GcnEncoding::Vopc => self.encode_vopc(),
            GcnEncoding::Vop3 => self.encode_vop3(),
            GcnEncoding::Vintrp => self.encode_vintrp(),
            GcnEncoding::Ds => self.encode_ds(),
            GcnEncoding::Mubuf | GcnEncoding::Mtbuf => self.encode_mbuf(),
            GcnEncoding::Mimg => self.encode_mimg(),
            GcnEncoding::Exp => self.encode_exp(),
            GcnEncoding::Flat | GcnEncoding::Global | GcnEncoding::Scratch => self.encode_flat(),
        }
    }

    fn set_literal(&mut self, lit: Lit) -> Result<u16, EncodeError> {
        if self.literal.is_some() {
            return Err(self.err(EncodeErrorKind::IllegalConstant));
        }
        self.literal = Some(lit);
        Ok(LITERAL)
    }

    fn src_code(&mut self, src: Src) -> Result<u16, EncodeError> {
        match src {
            Src::Code(code) => Ok(code),
            Src::Literal(lit) => self.set_literal(lit),
        }
    }

    fn width(mode_bit: bool) -> u16 {
        if mode_bit {
            2
        } else {
            1
        }
    }

    fn encode_sop2(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let sdst = if mode & table::M_NO_DST == 0 {
            let r = self.parse_sdst(Self::width(mode & table::M_DST64 != 0))?;
            self.expect_comma()?;
            r.start
        } else {
            0
        };
        let src0 = self.parse_src(Self::width(mode & table::M_SRC0_64 != 0), fields::SRC0, false)?;
        let src0 = self.src_code(src0)?;
        self.expect_comma()?;
        let src1 = self.parse_src(Self::width(mode & table::M_SRC1_64 != 0), fields::SRC1, false)?;
        let src1 = self.src_code(src1)?;
        self.words.push(
            0x8000_0000
                | (self.ins.code as u32) << 23
                | (sdst as u32) << 16
                | (src1 as u32) << 8
                | src0 as u32,
        );
        Ok(())
    }

    fn encode_sopk(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let mut sdst = 0u16;
        let mut imm16 = 0u16;
        if mode & table::M_HWREG_DST != 0 {
            imm16 = self.parse_hwreg()?;
            self.expect_comma()?;
            if mode & table::M_IMM32 != 0 {
                let src = self.parse_imm_src()?;
                match src {
                    Src::Literal(lit) => {
                        self.set_literal(lit)?;
                    }
                    Src::Code(code) => {
                        // a small constant still goes to the literal word
                        let value = regs::inline_code_int(code).unwrap_or(0) as u32;
                        self.set_literal(Lit::Value(value))?;
                    }
                }
            } else {
                sdst = self.parse_sdst(1)?.start;
            }
        } else if mode & table::M_HWREG_SRC != 0 {
            sdst = self.parse_sdst(1)?.start;
            self.expect_comma()?;
            imm16 = self.parse_hwreg()?;
        } else if mode & table::M_BRANCH != 0 {
            if mode & table::M_SRC0_64 != 0 {
                let r = self.parse_sdst(2)?;
                sdst = r.start;
                self.expect_comma()?;
            } else if mode & table::M_DST64 != 0 {
                let r = self.parse_sdst(2)?;
                sdst = r.start;
                self.expect_comma()?;
            }
            imm16 = self.parse_branch_imm16(CodeFlowKind::CondJump)?;
        } else {
            sdst = self.parse_sdst(1)?.start;
            self.expect_comma()?;
            imm16 = self.parse_imm16_field(0, 16)?;
        }
        self.words.push(
            0xb000_0000 | (self.ins.code as u32) << 23 | (sdst as u32) << 16 | imm16 as u32,
        );
        Ok(())
    }

    fn encode_sop1(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let mut sdst = 0u16;
        let mut src0 = 0u16;
        if mode & table::M_NO_DST == 0 {
            sdst = self
                .parse_sdst(Self::width(mode & table::M_DST64 != 0))?
                .start;
        }
        if mode & table::M_NO_SRC == 0 {
            if mode & table::M_NO_DST == 0 {
                self.expect_comma()?;
            }
            let src = self.parse_src(
                Self::width(mode & table::M_SRC0_64 != 0),
                fields::SRC0,
                false,
            )?;
            src0 = self.src_code(src)?;
        }
        self.words.push(
            0xbe80_0000 | (sdst as u32) << 16 | (self.ins.code as u32) << 8 | src0 as u32,
        );
        Ok(())
    }

    fn encode_sopc(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let src0 = self.parse_src(Self::width(mode & table::M_SRC0_64 != 0), fields::SRC0, false)?;
        let src0 = self.src_code(src0)?;
        self.expect_comma()?;
        let src1 = if mode & table::M_IMM16 != 0 {
            // the immediate index operand of s_set_gpr_idx_on
            self.parse_imm16_field(1, 8)? & 0xff
        } else {
            let src = self.parse_src(
                Self::width(mode & table::M_SRC1_64 != 0),
                fields::SRC1,
                false,
            )?;
            self.src_code(src)?
        };
        self.words.push(
            0xbf00_0000 | (self.ins.code as u32) << 16 | (src1 as u32) << 8 | src0 as u32,
        );
        Ok(())
    }

    fn encode_sopp(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let imm16 = if mode & table::M_BRANCH != 0 {
            self.parse_branch_imm16(if self.ins.code == 2 {
                CodeFlowKind::Jump
            } else {
                CodeFlowKind::CondJump
            })?
        } else if mode & table::M_WAITCNT != 0 {
            self.parse_waitcnt()?
        } else if mode & table::M_SENDMSG != 0 {
            self.parse_sendmsg()?
        } else if mode & table::M_IMM16 != 0 && !self.at_end() {
            self.parse_imm16_field(0, 16)?
        } else {
            0
        };
        self.words
            .push(0xbf80_0000 | (self.ins.code as u32) << 16 | imm16 as u32);
        Ok(())
    }

    fn parse_waitcnt(&mut self) -> Result<u16, EncodeError> {
        let (vm_max, exp_max, lgkm_max) = regs::waitcnt_maxes(self.ctx.gen);
        let (mut vmcnt, mut expcnt, mut lgkmcnt) = (vm_max, exp_max, lgkm_max);
        loop {
            self.skip_ws();
            let word = self.peek_word().to_ascii_lowercase();
            let (counter, max) = match word.as_str() {
                "vmcnt" => (&mut vmcnt, vm_max),
                "expcnt" => (&mut expcnt, exp_max),
                "lgkmcnt" => (&mut lgkmcnt, lgkm_max),
                _ => break,
            };
            self.at += word.len();
            self.expect_char('(')?;
            let value = self.parse_imm_now(16)?;
            if value > max as u64 {
                return Err(self.err(EncodeErrorKind::ImmOutOfRange {
                    value,
                    bits: max.trailing_ones(),
                }));
            }
            *counter = value as u16;
            self.expect_char(')')?;
            self.skip_ws();
            match self.text.as_bytes().get(self.at) {
                Some(b'&') | Some(b',') => self.at += 1,
                _ => break,
            }
        }
        let waits = [vmcnt, expcnt, lgkmcnt, 0];
        self.sink.sections[self.sink.section as usize]
            .wait_instrs
            .push(WaitInstr {
                offset: self.offset,
                waits,
            });
        Ok(regs::encode_waitcnt(self.ctx.gen, vmcnt, expcnt, lgkmcnt))
    }

    fn encode_smrd(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let nregs = table::mode_nregs(mode);
        let mut sdst = 0u16;
        let mut sbase = 0u16;
        let mut imm = 0u32;
        let mut offset = 0u16;
        if mode & table::M_NO_DST == 0 {
            sdst = self.parse_sdst(nregs)?.start;
            if mode & table::M_NO_SRC == 0 {
                self.expect_comma()?;
                let base_len = if mode & table::M_SBASE4 != 0 { 4 } else { 2 };
                let base = self.parse_sdst_read(base_len)?;
                sbase = base.start;
                self.expect_comma()?;
                self.skip_ws();
                if let Some(reg) = self.parse_reg_operand(false)? {
                    if reg.is_vgpr() || reg.len() != 1 {
                        return Err(self.err(EncodeErrorKind::IllegalOperand {
                            expected: "scalar offset register",
                        }));
                    }
                    offset = reg.start;
                } else {
                    imm = 1;
                    offset = self.parse_imm_now(8)? as u16;
                }
            }
        }
        if mode & table::M_NO_DST == 0 {
            self.push_delayed_load(sdst, nregs, queues::LGKM);
        }
        self.words.push(
            0xc000_0000
                | (self.ins.code as u32) << 22
                | (sdst as u32) << 15
                | ((sbase >> 1) as u32) << 9
                | imm << 8
                | offset as u32,
        );
        Ok(())
    }

    fn parse_sdst_read(&mut self, len: u16) -> Result<RegRange, EncodeError> {
        self.skip_ws();
        match self.parse_reg_operand(false)? {
            Some(range) if !range.is_vgpr() && range.len() == len => {
                self.record_usage(range, fields::ADDR, RegAccess::READ);
                Ok(range)
            }
            _ => Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "scalar register range",
            })),
        }
    }

    fn encode_smem(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let nregs = table::mode_nregs(mode);
        let mut sdata = 0u16;
        let mut sbase = 0u16;
        let mut imm = 0u32;
        let mut word1 = 0u32;
        if mode & (table::M_NO_DST | table::M_NO_SRC) != (table::M_NO_DST | table::M_NO_SRC) {
            sdata = if mode & table::M_STORE != 0 {
                let r = self.parse_sdst_read(nregs)?;
                r.start
            } else {
                self.parse_sdst(nregs)?.start
            };
            if mode & table::M_NO_SRC == 0 {
                self.expect_comma()?;
                let base_len = if mode & table::M_SBASE4 != 0 { 4 } else { 2 };
                sbase = self.parse_sdst_read(base_len)?.start;
                self.expect_comma()?;
                self.skip_ws();
                if let Some(reg) = self.parse_reg_operand(false)? {
                    if reg.is_vgpr() || reg.len() != 1 {
                        return Err(self.err(EncodeErrorKind::IllegalOperand {
                            expected: "scalar offset register",
                        }));
                    }
                    word1 = reg.start as u32;
                } else {
                    imm = 1;
                    word1 = (self.parse_imm_now(20)? as u32) & 0xf_ffff;
                }
            }
        }
        let glc = u32::from(self.take_flag("glc"));
        if mode & (table::M_STORE | table::M_NO_DST) == 0 {
            self.push_delayed_load(sdata, nregs, queues::LGKM);
        }
        self.words.push(
            0xc000_0000
                | (self.ins.code as u32) << 18
                | imm << 17
                | glc << 16
                | (sdata as u32) << 6
                | (sbase >> 1) as u32,
        );
        self.words.push(word1);
        Ok(())
    }

    fn encode_vop2(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let vdst = self.parse_vreg(1, fields::DST, RegAccess::WRITE)?;
        self.expect_comma()?;
        if mode & table::M_VCC_SDST != 0 {
            let r = self.parse_sdst(2)?;
            if r.start != regs::VCC_LO {
                return Err(self.err(EncodeErrorKind::IllegalOperand { expected: "vcc" }));
            }
            self.expect_comma()?;
        }
        let src0 = self.parse_src(1, fields::SRC0, true)?;
        let src0 = self.src_code(src0)?;
        self.expect_comma()?;
        if mode & table::M_MADMK != 0 {
            // the constant operand always takes the literal word
            let bits = self.parse_madk_literal()?;
            self.set_literal(Lit::Value(bits))?;
            self.expect_comma()?;
        }
        let vsrc1 = self.parse_vreg(1, fields::SRC1, RegAccess::READ)?;
        if mode & table::M_MADAK != 0 {
            self.expect_comma()?;
            let bits = self.parse_madk_literal()?;
            self.set_literal(Lit::Value(bits))?;
        }
        if mode & table::M_VCC_SSRC != 0 {
            self.expect_comma()?;
            self.skip_ws();
            let r = self.parse_reg_operand(false)?;
            if r.map(|r| r.start) != Some(regs::VCC_LO) {
                return Err(self.err(EncodeErrorKind::IllegalOperand { expected: "vcc" }));
            }
        }
        let word = (self.ins.code as u32) << 25
            | (vdst.vgpr_index() as u32) << 17
            | (vsrc1.vgpr_index() as u32) << 9
            | src0 as u32;
        self.words.push(word);
        self.encode_sdwa_dpp_tail(src0)
    }

    fn parse_madk_literal(&mut self) -> Result<u32, EncodeError> {
        if let Some(bits) = self.try_float_literal()? {
            return Ok(bits);
        }
        let expr = self.parse_operand_expr()?;
        match self.eval_now(expr)? {
            Some((value, SECTION_ABS)) => {
                self.release_expr(expr);
                self.check_imm32(value)
            }
            _ => {
                self.release_expr(expr);
                Err(self.err(EncodeErrorKind::IllegalOperand {
                    expected: "constant",
                }))
            }
        }
    }

    /// Rewrite src0 to the SDWA or DPP marker when trailing modifiers ask
    /// for one, appending the extra word
    fn encode_sdwa_dpp_tail(&mut self, src0: u16) -> Result<(), EncodeError> {
        self.skip_ws();
        if self.at_end() {
            return Ok(());
        }
        if !self.ctx.gen.is_gcn12() {
            return Err(self.err(EncodeErrorKind::GarbageAtEnd));
        }
        if src0 < VGPR_OFFSET {
            return Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "vector register source for SDWA/DPP",
            }));
        }
        let vsrc0 = (src0 - VGPR_OFFSET) as u32;
        // SDWA selects
        let mut sdwa: Option<u32> = None;
        let mut dpp: Option<u32> = None;
        loop {
            self.skip_ws();
            if self.at >= self.text.len() {
                break;
            }
            if let Some(sel) = self.take_sel("dst_sel")? {
                sdwa = Some((sdwa.unwrap_or(SDWA_DEFAULT) & !(7 << 8)) | sel << 8);
            } else if let Some(sel) = self.take_sel("src0_sel")? {
                sdwa = Some((sdwa.unwrap_or(SDWA_DEFAULT) & !(7 << 16)) | sel << 16);
            } else if let Some(sel) = self.take_sel("src1_sel")? {
                sdwa = Some((sdwa.unwrap_or(SDWA_DEFAULT) & !(7 << 24)) | sel << 24);
            } else if let Some(ctrl) = self.take_dpp_ctrl()? {
                dpp = Some((dpp.unwrap_or(DPP_DEFAULT) & !(0x1ff << 8)) | ctrl << 8);
            } else if let Some(mask) = self.take_keyed("row_mask", 4)? {
                dpp = Some((dpp.unwrap_or(DPP_DEFAULT) & !(0xf << 24)) | (mask as u32) << 24);
            } else if let Some(mask) = self.take_keyed("bank_mask", 4)? {
                dpp = Some((dpp.unwrap_or(DPP_DEFAULT) & !(0xf << 28)) | (mask as u32) << 28);
            } else if self.take_flag("bound_ctrl") {
                dpp = Some(dpp.unwrap_or(DPP_DEFAULT) | 1 << 19);
            } else {
                return Err(self.err(EncodeErrorKind::GarbageAtEnd));
            }
        }
        match (sdwa, dpp) {
            (Some(word), None) => {
                self.patch_src0_marker(249);
                self.words.push(word | vsrc0);
                Ok(())
            }
            (None, Some(word)) => {
                self.patch_src0_marker(250);
                self.words.push(word | vsrc0);
                Ok(())
            }
            (Some(_), Some(_)) => Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "either SDWA or DPP modifiers, not both",
            })),
            (None, None) => Ok(()),
        }
    }

    fn patch_src0_marker(&mut self, marker: u32) {
        if let Some(word) = self.words.first_mut() {
            *word = (*word & !0x1ff) | marker;
        }
    }

    fn take_sel(&mut self, name: &str) -> Result<Option<u32>, EncodeError> {
        let save = self.at;
        let word = self.peek_word();
        if !word.eq_ignore_ascii_case(name) {
            return Ok(None);
        }
        self.at += word.len();
        self.skip_ws();
        if self.text.as_bytes().get(self.at) != Some(&b':') {
            self.at = save;
            return Ok(None);
        }
        self.at += 1;
        self.skip_ws();
        let sel = self.peek_word().to_ascii_lowercase();
        let value = match sel.as_str() {
            "byte0" => 0,
            "byte1" => 1,
            "byte2" => 2,
            "byte3" => 3,
            "word0" => 4,
            "word1" => 5,
            "dword" => 6,
            _ => {
                return Err(self.err(EncodeErrorKind::IllegalOperand {
                    expected: "byte0..byte3, word0, word1 or dword",
                }))
            }
        };
        self.at += sel.len();
        Ok(Some(value))
    }

    fn take_dpp_ctrl(&mut self) -> Result<Option<u32>, EncodeError> {
        for (name, base, bits) in [
            ("row_shl", 0x100u32, 4),
            ("row_shr", 0x110, 4),
            ("row_ror", 0x120, 4),
            ("wave_shl", 0x130, 0),
            ("wave_rol", 0x134, 0),
            ("wave_shr", 0x138, 0),
            ("wave_ror", 0x13c, 0),
        ] {
            if bits == 0 {
                let save = self.at;
                let word = self.peek_word();
                if word.eq_ignore_ascii_case(name) {
                    self.at += word.len();
                    self.skip_ws();
                    if self.text.as_bytes().get(self.at) == Some(&b':') {
                        self.at += 1;
                        let _ = self.parse_imm_now(1)?;
                    }
                    return Ok(Some(base));
                }
                self.at = save;
            } else if let Some(value) = self.take_keyed(name, bits)? {
                return Ok(Some(base | value as u32));
            }
        }
        if let Some(value) = self.take_keyed("row_bcast", 6)? {
            return Ok(Some(if value == 15 { 0x142 } else { 0x143 }));
        }
        let save = self.at;
        let word = self.peek_word();
        if word.eq_ignore_ascii_case("quad_perm") {
            self.at += word.len();
            self.skip_ws();
            if self.text.as_bytes().get(self.at) == Some(&b':') {
                self.at += 1;
                self.expect_char('[')?;
                let mut ctrl = 0u32;
                for lane in 0..4 {
                    if lane != 0 {
                        self.expect_char(',')?;
                    }
                    let v = self.parse_imm_now(2)?;
                    ctrl |= (v as u32) << (lane * 2);
                }
                self.expect_char(']')?;
                return Ok(Some(ctrl));
            }
            self.at = save;
        }
        Ok(None)
    }

    fn encode_vop1(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let mut vdst = 0u32;
        let mut src0 = 0u16;
        if mode & table::M_NO_DST == 0 {
            let dst_len = Self::width(mode & table::M_DST64 != 0);
            let dst = self.parse_vreg(dst_len, fields::DST, RegAccess::WRITE)?;
            vdst = vdst | dst.vgpr_index() as u32;
            self.expect_comma()?;
            let src = self.parse_src(
                Self::width(mode & table::M_SRC0_64 != 0),
                fields::SRC0,
                true,
            )?;
            src0 = self.src_code(src)?;
        }
        self.words
            .push(0x7e00_0000 | vdst << 17 | (self.ins.code as u32) << 9 | src0 as u32);
        self.encode_sdwa_dpp_tail(src0)
    }

    fn encode_vopc(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        self.skip_ws();
        // destination is the vcc mask
        let dst = self.parse_reg_operand(false)?;
        if dst.map(|r| r.start) != Some(regs::VCC_LO) {
            return Err(self.err(EncodeErrorKind::IllegalOperand { expected: "vcc" }));
        }
        self.expect_comma()?;
        let src0 = self.parse_src(Self::width(mode & table::M_SRC0_64 != 0), fields::SRC0, true)?;
        let src0 = self.src_code(src0)?;
        self.expect_comma()?;
        let vsrc1 = self.parse_vreg(
            Self::width(mode & table::M_SRC1_64 != 0),
            fields::SRC1,
            RegAccess::READ,
        )?;
        self.words.push(
            0x7c00_0000
                | (self.ins.code as u32) << 17
                | (vsrc1.vgpr_index() as u32) << 9
                | src0 as u32,
        );
        self.encode_sdwa_dpp_tail(src0)
    }

    fn encode_vop3(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let nsrc = table::mode_nsrc(mode);
        let dst_len = Self::width(mode & table::M_DST64 != 0);
        let vdst = self.parse_vreg(dst_len, fields::DST, RegAccess::WRITE)?;
        let mut sdst = 0u16;
        if mode & table::M_VOP3B != 0 {
            self.expect_comma()?;
            sdst = self.parse_sdst(2)?.start;
        }
        let widths = [
            Self::width(mode & table::M_SRC0_64 != 0),
            Self::width(mode & table::M_SRC1_64 != 0),
            Self::width(mode & table::M_SRC2_64 != 0),
        ];
        let src_fields = [fields::SRC0, fields::SRC1, fields::SRC2];
        let mut srcs = [0u16; 3];
        let mut neg = 0u32;
        let mut abs = 0u32;
        for i in 0..nsrc {
            self.expect_comma()?;
            self.skip_ws();
            if self.text.as_bytes().get(self.at) == Some(&b'-') {
                self.at += 1;
                neg |= 1 << i;
            }
            let mut in_abs = false;
            let word = self.peek_word();
            if word.eq_ignore_ascii_case("abs") {
                self.at += word.len();
                self.expect_char('(')?;
                in_abs = true;
                abs |= 1 << i;
            }
            self.skip_ws();
            let Some(range) = self.parse_reg_operand(true)? else {
                // inline constants only; VOP3 has no literal slot
                let expr = self.parse_operand_expr()?;
                let Some((value, SECTION_ABS)) = self.eval_now(expr)? else {
                    self.release_expr(expr);
                    return Err(self.err(EncodeErrorKind::IllegalOperand {
                        expected: "register or inline constant",
                    }));
                };
                self.release_expr(expr);
                let Some(code) = regs::int_inline_code(value as i64) else {
                    return Err(self.err(EncodeErrorKind::IllegalConstant));
                };
                srcs[i] = code;
                if in_abs {
                    self.expect_char(')')?;
                }
                continue;
            };
            if range.len() != widths[i] {
                return Err(self.err(EncodeErrorKind::IllegalOperand {
                    expected: "register of matching size",
                }));
            }
            self.record_usage(range, src_fields[i], RegAccess::READ);
            srcs[i] = range.start;
            if in_abs {
                self.expect_char(')')?;
            }
        }
        let mut clamp = 0u32;
        let mut omod = 0u32;
        loop {
            self.skip_ws();
            if self.take_flag("clamp") {
                clamp = 1;
            } else if let Some(v) = self.take_keyed("mul", 3)? {
                omod = if v == 2 { 1 } else { 2 };
            } else if let Some(v) = self.take_keyed("div", 2)? {
                omod = if v == 2 { 3 } else { 0 };
            } else {
                break;
            }
        }
        if !self.at_end() {
            return Err(self.err(EncodeErrorKind::GarbageAtEnd));
        }
        let word0 = if self.ctx.gen.is_gcn12() {
            let base = if self.ctx.gen.is_gcn15() {
                0xd400_0000
            } else {
                0xd000_0000
            };
            if mode & table::M_VOP3B != 0 {
                base | (self.ins.code as u32) << 16
                    | clamp << 15
                    | (sdst as u32) << 8
                    | vdst.vgpr_index() as u32
            } else {
                base | (self.ins.code as u32) << 16
                    | clamp << 15
                    | abs << 8
                    | vdst.vgpr_index() as u32
            }
        } else if mode & table::M_VOP3B != 0 {
            0xd000_0000
                | (self.ins.code as u32) << 17
                | (sdst as u32) << 8
                | vdst.vgpr_index() as u32
        } else {
            0xd000_0000
                | (self.ins.code as u32) << 17
                | clamp << 11
                | abs << 8
                | vdst.vgpr_index() as u32
        };
        let word1 = neg << 29
            | omod << 27
            | (srcs[2] as u32) << 18
            | (srcs[1] as u32) << 9
            | srcs[0] as u32;
        self.words.push(word0);
        self.words.push(word1);
        Ok(())
    }

    fn encode_vintrp(&mut self) -> Result<(), EncodeError> {
        let vdst = self.parse_vreg(1, fields::DST, RegAccess::WRITE)?;
        self.expect_comma()?;
        let vsrc = self.parse_vreg(1, fields::SRC0, RegAccess::READ)?;
        self.expect_comma()?;
        self.skip_ws();
        let word = self.peek_word().to_ascii_lowercase();
        let Some(rest) = word.strip_prefix("attr") else {
            return Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "attrN.{x,y,z,w}",
            }));
        };
        let Some((num, chan)) = rest.split_once('.') else {
            return Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "attrN.{x,y,z,w}",
            }));
        };
        let attr: u32 = num.parse().map_err(|_| {
            self.err(EncodeErrorKind::IllegalOperand {
                expected: "attribute number",
            })
        })?;
        let chan = match chan {
            "x" => 0u32,
            "y" => 1,
            "z" => 2,
            "w" => 3,
            _ => {
                return Err(self.err(EncodeErrorKind::IllegalOperand {
                    expected: "attribute channel",
                }))
            }
        };
        self.at += word.len();
        let base = if self.ctx.gen.is_gcn12() && !self.ctx.gen.is_gcn15() {
            0xd400_0000
        } else {
            0xc800_0000
        };
        self.words.push(
            base | (vdst.vgpr_index() as u32) << 18
                | (self.ins.code as u32) << 16
                | (attr & 0x3f) << 10
                | chan << 8
                | vsrc.vgpr_index() as u32,
        );
        Ok(())
    }

    fn encode_ds(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let nregs = table::mode_nregs(mode);
        let mut vdst = 0u32;
        let mut data0 = 0u32;
        let mut data1 = 0u32;
        if mode & table::M_DS_DST != 0 {
            let dst = self.parse_vreg(nregs, fields::DST, RegAccess::WRITE)?;
            vdst = dst.vgpr_index() as u32;
            self.expect_comma()?;
        }
        let addr = self.parse_vreg(1, fields::ADDR, RegAccess::READ)?;
        if mode & table::M_DS_D0 != 0 {
            self.expect_comma()?;
            let data_len = if mode & table::M_DS_DST == 0 { nregs } else { 1 };
            let d0 = self.parse_vreg(data_len, fields::DATA, RegAccess::READ)?;
            data0 = d0.vgpr_index() as u32;
            if mode & table::M_DS_D1 != 0 {
                self.expect_comma()?;
                let d1 = self.parse_vreg(data_len, fields::DATA, RegAccess::READ)?;
                data1 = d1.vgpr_index() as u32;
            }
        }
        let mut offset = 0u32;
        let mut gds = 0u32;
        loop {
            self.skip_ws();
            if mode & table::M_DS_2OFF != 0 {
                if let Some(v) = self.take_keyed("offset0", 8)? {
                    offset = (offset & 0xff00) | v as u32;
                    continue;
                }
                if let Some(v) = self.take_keyed("offset1", 8)? {
                    offset = (offset & 0x00ff) | (v as u32) << 8;
                    continue;
                }
            } else if let Some(v) = self.take_keyed("offset", 16)? {
                offset = v as u32;
                continue;
            }
            if self.take_flag("gds") {
                gds = 1;
                continue;
            }
            break;
        }
        if mode & table::M_DS_DST != 0 {
            self.push_delayed_load(vdst as u16, nregs, queues::LGKM);
        }
        let word0 = if self.ctx.gen.is_gcn12() && !self.ctx.gen.is_gcn15() {
            0xd800_0000 | (self.ins.code as u32) << 17 | gds << 16 | offset
        } else {
            0xd800_0000 | (self.ins.code as u32) << 18 | gds << 17 | offset
        };
        self.words.push(word0);
        self.words
            .push(addr.vgpr_index() as u32 | data0 << 8 | data1 << 16 | vdst << 24);
        Ok(())
    }

    fn encode_mbuf(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let is_mtbuf = self.ins.encoding == GcnEncoding::Mtbuf;
        let nregs = table::mode_nregs(mode);
        let data_access = if mode & table::M_STORE != 0 {
            RegAccess::READ
        } else {
            RegAccess::WRITE
        };
        // data register count grows by one with tfe; parse operands
        // first with a lookahead on the flags
        let flags_text = self.text[self.at..].to_ascii_lowercase();
        let tfe = flags_text.contains("tfe");
        let vdata = self.parse_vreg(nregs + u16::from(tfe), fields::DATA, data_access)?;
        self.expect_comma()?;
        let offen_ahead = flags_text.contains("offen");
        let idxen_ahead = flags_text.contains("idxen");
        let addr64_ahead = flags_text.contains("addr64");
        let naddr = match (offen_ahead && idxen_ahead) || addr64_ahead {
            true => 2,
            false => 1,
        };
        let vaddr = self.parse_vreg(naddr, fields::ADDR, RegAccess::READ)?;
        self.expect_comma()?;
        let srsrc = self.parse_sdst_read(4)?;
        self.expect_comma()?;
        let soffset = {
            self.skip_ws();
            match self.parse_reg_operand(false)? {
                Some(r) if !r.is_vgpr() && r.len() == 1 => {
                    self.record_usage(r, fields::SOFFSET, RegAccess::READ);
                    r.start as u32
                }
                _ => {
                    let v = self.parse_imm_now(8)? as i64;
                    regs::int_inline_code(v).ok_or_else(|| {
                        self.err(EncodeErrorKind::IllegalOperand {
                            expected: "scalar register or inline constant",
                        })
                    })? as u32
                }
            }
        };
        let mut offset = 0u32;
        let mut offen = 0u32;
        let mut idxen = 0u32;
        let mut glc = 0u32;
        let mut slc = 0u32;
        let mut lds = 0u32;
        let mut addr64 = 0u32;
        let mut dfmt = 0u32;
        let mut nfmt = 0u32;
        loop {
            self.skip_ws();
            if self.at >= self.text.len() {
                break;
            }
            if let Some(v) = self.take_keyed("offset", 12)? {
                offset = v as u32;
            } else if self.take_flag("offen") {
                offen = 1;
            } else if self.take_flag("idxen") {
                idxen = 1;
            } else if self.take_flag("glc") {
                glc = 1;
            } else if self.take_flag("slc") {
                slc = 1;
            } else if self.take_flag("lds") {
                lds = 1;
            } else if self.take_flag("tfe") {
                // already counted into the data range
            } else if self.take_flag("addr64") {
                if self.ctx.gen.is_gcn12() {
                    return Err(self.err(EncodeErrorKind::IllegalOperand {
                        expected: "no addr64 on this architecture",
                    }));
                }
                addr64 = 1;
            } else if is_mtbuf && self.take_format(&mut dfmt, &mut nfmt)? {
                // parsed into dfmt/nfmt
            } else {
                return Err(self.err(EncodeErrorKind::GarbageAtEnd));
            }
        }
        if mode & table::M_STORE == 0 {
            self.push_delayed_load(vdata.vgpr_index(), nregs, queues::VM);
        }
        let enc = if is_mtbuf { 0xe800_0000 } else { 0xe000_0000 };
        let word0 = if is_mtbuf {
            let op_shift = if self.ctx.gen.is_gcn12() && !self.ctx.gen.is_gcn15() {
                15
            } else {
                16
            };
            enc | offset
                | offen << 12
                | idxen << 13
                | glc << 14
                | addr64 << 15
                | (self.ins.code as u32) << op_shift
                | dfmt << 19
                | nfmt << 23
        } else if self.ctx.gen.is_gcn12() && !self.ctx.gen.is_gcn15() {
            enc | offset
                | offen << 12
                | idxen << 13
                | glc << 14
                | lds << 16
                | slc << 17
                | (self.ins.code as u32) << 18
        } else {
            enc | offset
                | offen << 12
                | idxen << 13
                | glc << 14
                | addr64 << 15
                | lds << 16
                | (self.ins.code as u32) << 18
        };
        let mut word1 = vaddr.vgpr_index() as u32
            | (vdata.vgpr_index() as u32) << 8
            | ((srsrc.start >> 2) as u32) << 16
            | u32::from(tfe) << 23
            | soffset << 24;
        let slc_in_word1 = is_mtbuf || !self.ctx.gen.is_gcn12() || self.ctx.gen.is_gcn15();
        if slc_in_word1 {
            word1 |= slc << 22;
        }
        self.words.push(word0);
        self.words.push(word1);
        Ok(())
    }

    fn take_format(&mut self, dfmt: &mut u32, nfmt: &mut u32) -> Result<bool, EncodeError> {
        let save = self.at;
        let word = self.peek_word();
        if !word.eq_ignore_ascii_case("format") {
            return Ok(false);
        }
        self.at += word.len();
        self.skip_ws();
        if self.text.as_bytes().get(self.at) != Some(&b':') {
            self.at = save;
            return Ok(false);
        }
        self.at += 1;
        self.expect_char('[')?;
        for _ in 0..2 {
            self.skip_ws();
            let item_start = self.at;
            let bytes = self.text.as_bytes();
            let mut end = item_start;
            while end < bytes.len() && bytes[end] != b',' && bytes[end] != b']' {
                end += 1;
            }
            let item = self.text[item_start..end].trim().to_ascii_lowercase();
            self.at = end;
            if let Some(v) = data_format_code(&item) {
                *dfmt = v;
            } else if let Some(v) = number_format_code(&item) {
                *nfmt = v;
            } else if !item.is_empty() {
                return Err(self.err(EncodeErrorKind::IllegalOperand {
                    expected: "buffer data/number format",
                }));
            }
            self.skip_ws();
            if self.text.as_bytes().get(self.at) == Some(&b',') {
                self.at += 1;
            } else {
                break;
            }
        }
        self.expect_char(']')?;
        Ok(true)
    }

    fn encode_mimg(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let flags_text = self.text[self.at..].to_ascii_lowercase();
        let tfe = flags_text.contains("tfe");
        let dmask_ahead = flags_text
            .find("dmask:")
            .and_then(|at| {
                let rest = &flags_text[at + 6..];
                let end = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                rest[..end].parse::<u32>().ok()
            })
            .unwrap_or(1);
        let ndata = (dmask_ahead.count_ones() as u16).max(1) + u16::from(tfe);
        let data_access = if mode & table::M_STORE != 0 {
            RegAccess::READ
        } else {
            RegAccess::WRITE
        };
        let vdata = self.parse_vreg(ndata, fields::DATA, data_access)?;
        self.expect_comma()?;
        self.skip_ws();
        let Some(vaddr) = self.parse_reg_operand(true)? else {
            return Err(self.err(EncodeErrorKind::IllegalOperand {
                expected: "vector address register range",
            }));
        };
        self.record_usage(vaddr, fields::ADDR, RegAccess::READ);
        self.expect_comma()?;
        let r128 = flags_text.contains("r128");
        let srsrc = self.parse_sdst_read(if r128 { 4 } else { 8 })?;
        let mut ssamp = 0u32;
        if mode & table::M_MIMG_SAMPLE != 0 {
            self.expect_comma()?;
            let samp = self.parse_sdst_read(4)?;
            ssamp = (samp.start >> 2) as u32;
        }
        let mut dmask = 1u32;
        let mut unorm = 0u32;
        let mut glc = 0u32;
        let mut slc = 0u32;
        let mut lwe = 0u32;
        let mut da = 0u32;
        loop {
            self.skip_ws();
            if self.at >= self.text.len() {
                break;
            }
            if let Some(v) = self.take_keyed("dmask", 4)? {
                dmask = v as u32;
            } else if self.take_flag("unorm") {
                unorm = 1;
            } else if self.take_flag("glc") {
                glc = 1;
            } else if self.take_flag("slc") {
                slc = 1;
            } else if self.take_flag("r128") || self.take_flag("tfe") {
                // consumed ahead of operand parsing
            } else if self.take_flag("lwe") {
                lwe = 1;
            } else if self.take_flag("da") {
                da = 1;
            } else {
                return Err(self.err(EncodeErrorKind::GarbageAtEnd));
            }
        }
        if mode & table::M_STORE == 0 {
            self.push_delayed_load(vdata.vgpr_index(), ndata, queues::VM);
        }
        self.words.push(
            0xf000_0000
                | dmask << 8
                | unorm << 12
                | glc << 13
                | da << 14
                | u32::from(r128) << 15
                | u32::from(tfe) << 16
                | lwe << 17
                | (self.ins.code as u32) << 18
                | slc << 25,
        );
        self.words.push(
            vaddr.vgpr_index() as u32
                | (vdata.vgpr_index() as u32) << 8
                | ((srsrc.start >> 2) as u32) << 16
                | ssamp << 21,
        );
        Ok(())
    }

    fn encode_exp(&mut self) -> Result<(), EncodeError> {
        self.skip_ws();
        let word = self.peek_word().to_ascii_lowercase();
        let target = export_target_code(&word)
            .ok_or_else(|| self.err(EncodeErrorKind::IllegalOperand {
                expected: "export target",
            }))?;
        self.at += word.len();
        let mut en = 0u32;
        let mut srcs = [0u32; 4];
        for (i, src) in srcs.iter_mut().enumerate() {
            self.expect_comma()?;
            self.skip_ws();
            if self.peek_word().eq_ignore_ascii_case("off") {
                let len = self.peek_word().len();
                self.at += len;
                continue;
            }
            let reg = self.parse_vreg(1, fields::SRC0 + i as u8, RegAccess::READ)?;
            *src = reg.vgpr_index() as u32;
            en |= 1 << i;
        }
        let mut done = 0u32;
        let mut compr = 0u32;
        let mut vm = 0u32;
        loop {
            self.skip_ws();
            if self.at >= self.text.len() {
                break;
            }
            if self.take_flag("done") {
                done = 1;
            } else if self.take_flag("compr") {
                compr = 1;
            } else if self.take_flag("vm") {
                vm = 1;
            } else {
                return Err(self.err(EncodeErrorKind::GarbageAtEnd));
            }
        }
        let enc = if self.ctx.gen.is_gcn12() && !self.ctx.gen.is_gcn15() {
            0xc400_0000
        } else {
            0xf800_0000
        };
        self.words
            .push(enc | en | target << 4 | compr << 10 | done << 11 | vm << 12);
        self.words
            .push(srcs[0] | srcs[1] << 8 | srcs[2] << 16 | srcs[3] << 24);
        Ok(())
    }

    fn encode_flat(&mut self) -> Result<(), EncodeError> {
        let mode = self.ins.mode;
        let nregs = table::mode_nregs(mode);
        let flags_text = self.text[self.at..].to_ascii_lowercase();
        let tfe = flags_text.contains("tfe") && !self.ctx.gen.is_gcn15();
        let mut vdst = 0u32;
        let mut data = 0u32;
        let addr;
        if mode & table::M_STORE != 0 {
            addr = self.parse_vreg(2, fields::ADDR, RegAccess::READ)?;
            self.expect_comma()?;
            let d = self.parse_vreg(nregs, fields::DATA, RegAccess::READ)?;
            data = d.vgpr_index() as u32;
        } else {
            let d = self.parse_vreg(nregs + u16::from(tfe), fields::DST, RegAccess::WRITE)?;
            vdst = d.vgpr_index() as u32;
            self.expect_comma()?;
            addr = self.parse_vreg(2, fields::ADDR, RegAccess::READ)?;
        }
        let mut saddr = if self.ctx.gen.is_gcn14() { 0x7fu32 } else { 0 };
        let mut offset = 0u32;
        let mut glc = 0u32;
        let mut slc = 0u32;
        loop {
            self.skip_ws();
            if self.at >= self.text.len() {
                break;
            }
            if self.take_flag("glc") {
                glc = 1;
            } else if self.take_flag("slc") {
                slc = 1;
            } else if self.take_flag("tfe") {
                // consumed ahead of operand parsing
            } else if self.take_flag("off") {
                saddr = 0x7f;
            } else if self.ctx.gen.is_gcn14() {
                if let Some(v) = self.take_keyed("inst_offset", 12)? {
                    offset = v as u32;
                } else {
                    let save = self.at;
                    match self.parse_reg_operand(false)? {
                        Some(r) if !r.is_vgpr() && r.len() == 2 => saddr = r.start as u32,
                        _ => {
                            self.at = save;
                            return Err(self.err(EncodeErrorKind::GarbageAtEnd));
                        }
                    }
                }
            } else {
                return Err(self.err(EncodeErrorKind::GarbageAtEnd));
            }
        }
        if mode & table::M_STORE == 0 {
            self.push_delayed_load(vdst as u16, nregs, queues::VM);
        }
        let seg = match self.ins.encoding {
            GcnEncoding::Scratch => 1u32,
            GcnEncoding::Global => 2,
            _ => 0,
        };
        let mut word0 = 0xdc00_0000 | glc << 16 | slc << 17 | (self.ins.code as u32) << 18;
        if self.ctx.gen.is_gcn14() {
            word0 |= offset | seg << 14;
        }
        let mut word1 = addr.vgpr_index() as u32 | data << 8 | vdst << 24;
        if self.ctx.gen.is_gcn14() {
            word1 |= saddr << 16;
        }
        if tfe {
            word1 |= 1 << 23;
        }
        self.words.push(word0);
        self.words.push(word1);
        Ok(())
    }

    fn push_delayed_load(&mut self, rstart: u16, count: u16, queue: u8) {
        self.sink.sections[self.sink.section as usize]
            .delayed_ops
            .push(DelayedOp {
                offset: self.offset,
                regvar: None,
                rstart,
                rend: rstart + count,
                count: 1,
                op_type: queue,
                op_type2: crate::section::DELAYED_OP_NONE,
                access: RegAccess::WRITE,
                access2: RegAccess::empty(),
            });
    }

    fn finish(mut self) -> Result<(), EncodeError> {
        if !self.at_end() {
            let bytes = self.text.as_bytes();
            if bytes.get(self.at) != Some(&b';') {
                return Err(self.err(EncodeErrorKind::GarbageAtEnd));
            }
        }
        let mut bytes = Vec::with_capacity(8);
        for word in &self.words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let lit_offset = bytes.len() as u64;
        let deferred_lit = match self.literal.take() {
            Some(Lit::Value(v)) => {
                bytes.extend_from_slice(&v.to_le_bytes());
                None
            }
            Some(Lit::Deferred(expr, kind)) => {
                bytes.extend_from_slice(&[0; 4]);
                Some((expr, kind))
            }
            None => None,
        };
        let section = &mut self.sink.sections[self.sink.section as usize];
        let offset = section.emit_at(&bytes, self.pos.clone());
        section.reg_usages.append(&mut self.usages);
        for (expr, field_offset, width) in std::mem::take(&mut self.deferred) {
            let target = match width {
                1 => ExprTarget::Data8 {
                    section: self.sink.section,
                    offset: offset + field_offset,
                },
                _ => ExprTarget::Data16 {
                    section: self.sink.section,
                    offset: offset + field_offset,
                },
            };
            self.sink
                .env
                .bind_target(expr, target, self.sink.sections, self.sink.diags);
        }
        if let Some((expr, _kind)) = deferred_lit {
            self.sink.env.bind_target(
                expr,
                ExprTarget::Data32 {
                    section: self.sink.section,
                    offset: offset + lit_offset,
                },
                self.sink.sections,
                self.sink.diags,
            );
        }
        Ok(())
    }
}

const SDWA_DEFAULT: u32 = 6 << 8 | 6 << 16 | 6 << 24;
const DPP_DEFAULT: u32 = 0xff << 24;

fn unpack_reg_range(packed: u64) -> RegRange {
    RegRange {
        start: (packed & 0xffff) as u16,
        end: ((packed >> 16) & 0xffff) as u16,
    }
}

/// Pack a register range into a symbol value for `sym = %reg` definitions
pub fn pack_reg_range(range: RegRange) -> u64 {
    range.start as u64 | (range.end as u64) << 16
}

fn data_format_code(name: &str) -> Option<u32> {
    Some(match name {
        "8" => 1,
        "16" => 2,
        "8_8" => 3,
        "32" => 4,
        "16_16" => 5,
        "10_11_11" => 6,
        "11_11_10" => 7,
        "10_10_10_2" => 8,
        "2_10_10_10" => 9,
        "8_8_8_8" => 10,
        "32_32" => 11,
        "16_16_16_16" => 12,
        "32_32_32" => 13,
        "32_32_32_32" => 14,
        _ => return None,
    })
}

fn number_format_code(name: &str) -> Option<u32> {
    Some(match name {
        "unorm" => 0,
        "snorm" => 1,
        "uscaled" => 2,
        "sscaled" => 3,
        "uint" => 4,
        "sint" => 5,
        "snorm_ogl" => 6,
        "float" => 7,
        _ => return None,
    })
}

fn export_target_code(name: &str) -> Option<u32> {
    if let Some(n) = name.strip_prefix("mrt") {
        if n == "z" {
            return Some(8);
        }
        return n.parse::<u32>().ok().filter(|&n| n < 8);
    }
    if name == "null" {
        return Some(9);
    }
    if let Some(n) = name.strip_prefix("pos") {
        return n.parse::<u32>().ok().filter(|&n| n < 4).map(|n| 12 + n);
    }
    if let Some(n) = name.strip_prefix("param") {
        return n.parse::<u32>().ok().filter(|&n| n < 32).map(|n| 32 + n);
    }
    None
}

#[allow(clippy::unwrap_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::section::{SectionFlags, SectionKind};
    use std::sync::Arc;

    struct Bench {
        env: SymbolEnv,
        sections: Vec<Section>,
        relocs: Vec<Relocation>,
        diags: Vec<Diagnostic>,
        ctx: EncodeContext,
    }

    fn bench(gen: GcnGen) -> Bench {
        Bench {
            env: SymbolEnv::new(),
            sections: vec![Section::new(
                ".text",
                SectionKind::Code,
                SectionFlags::WRITABLE | SectionFlags::EXECUTABLE | SectionFlags::CODE,
            )],
            relocs: Vec::new(),
            diags: Vec::new(),
            ctx: EncodeContext { gen, wave32: false },
        }
    }

    fn pos() -> SourcePos {
        SourcePos {
            file: Arc::from("test.s"),
            line: 1,
            col: 1,
        }
    }

    impl Bench {
        fn encode(&mut self, line: &str) -> Result<(), EncodeError> {
            let mut sink = EncodeSink {
                env: &mut self.env,
                sections: &mut self.sections,
                section: 0,
                relocs: &mut self.relocs,
                diags: &mut self.diags,
            };
            encode_instruction(&self.ctx, line, &pos(), &mut sink)
        }

        fn words(&self) -> Vec<u32> {
            self.sections[0]
                .content
                .chunks(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
    }

    fn enc1(gen: GcnGen, line: &str) -> u32 {
        let mut b = bench(gen);
        b.encode(line).unwrap();
        let words = b.words();
        assert_eq!(words.len(), 1, "{line}: expected one word, got {words:x?}");
        words[0]
    }

    fn enc2(gen: GcnGen, line: &str) -> (u32, u32) {
        let mut b = bench(gen);
        b.encode(line).unwrap();
        let words = b.words();
        assert_eq!(words.len(), 2, "{line}: expected two words, got {words:x?}");
        (words[0], words[1])
    }

    #[test]
    fn test_sop2() {
        assert_eq!(enc1(GcnGen::Gcn10, "s_add_u32 s21, s4, s61"), 0x80153d04);
        assert_eq!(enc1(GcnGen::Gcn10, "s_sub_i32 s21, s4, s61"), 0x81953d04);
        assert_eq!(
            enc1(GcnGen::Gcn10, "s_and_b64 s[20:21], s[4:5], s[62:63]"),
            0x87943e04
        );
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_and_b64 s[20:21], s[4:5], s[62:63]"),
            0x86943e04
        );
        assert_eq!(enc1(GcnGen::Gcn10, "s_lshr_b32 s21, s4, s61"), 0x90153d04);
        assert_eq!(enc1(GcnGen::Gcn12, "s_and_b32 s21, s4, s61"), 0x86153d04);
        assert_eq!(enc1(GcnGen::Gcn12, "s_mul_i32 s21, s4, s61"), 0x92153d04);
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_rfe_restore_b64 s[4:5], s61"),
            0x95803d04
        );
        // SGPR numbering widens on GCN 1.5
        assert_eq!(enc1(GcnGen::Gcn15, "s_add_u32 s21, s4, s103"), 0x80156704);
        assert_eq!(enc1(GcnGen::Gcn15, "s_add_u32 s21, s4, s105"), 0x80156904);
    }

    #[test]
    fn test_sop2_aliases_and_literals() {
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_add_u32 flat_scratch_lo, s4, s61"),
            0x80663d04
        );
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_add_u32 xnack_mask_hi, s4, s61"),
            0x80693d04
        );
        assert_eq!(enc1(GcnGen::Gcn10, "s_add_u32 ttmp0, s4, s61"), 0x806c3d04);
        assert_eq!(
            enc1(GcnGen::Gcn10, "s_add_u32 vcc[1:1], s4, s61"),
            0x806b3d04
        );
        assert_eq!(
            enc2(GcnGen::Gcn10, "s_add_u32 exec_hi, s5, 0xd3abc5f"),
            (0x807fff05, 0x0d3abc5f)
        );
        assert_eq!(
            enc2(GcnGen::Gcn10, "s_add_u32 exec_hi, 0xd3abc5f, s61"),
            (0x807f3dff, 0x0d3abc5f)
        );
        // 1/(2*pi) folds to an inline constant from GCN 1.2 on
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_add_u32 xnack_mask_hi, 0.15915494, s61"),
            0x80693df8
        );
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_add_u32 xnack_mask_hi, 15.915494e-2, s61"),
            0x80693df8
        );
    }

    #[test]
    fn test_reg_range_symbol() {
        let mut b = bench(GcnGen::Gcn15);
        // xrv = %s105
        let sym = b.env.get_or_create_symbol("xrv");
        let range = RegRange::new(105, 1);
        {
            let s = b.env.symbols.get_mut(sym).unwrap();
            s.reg_range = true;
            s.has_value = true;
            s.value = pack_reg_range(range);
        }
        b.encode("s_add_u32 s21, s4, xrv").unwrap();
        assert_eq!(b.words(), vec![0x80156904]);
    }

    #[test]
    fn test_sopk() {
        assert_eq!(enc1(GcnGen::Gcn10, "s_movk_i32 s43, 0xd3b9"), 0xb02bd3b9);
        assert_eq!(enc1(GcnGen::Gcn12, "s_cmpk_lg_i32 s43, 0xd3b9"), 0xb1abd3b9);
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_getreg_b32 s43, hwreg(mode, 0, 1)"),
            0xb8ab0001
        );
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_setreg_b32 hwreg(trapsts, 3, 10), s43"),
            0xb92b48c3
        );
        assert_eq!(
            enc2(
                GcnGen::Gcn12,
                "s_setreg_imm32_b32 hwreg(trapsts, 3, 10), 0x45d2a"
            ),
            (0xba0048c3, 0x00045d2a)
        );
        assert_eq!(
            enc2(
                GcnGen::Gcn10,
                "s_setreg_imm32_b32 hwreg(trapsts, 3, 10), 0x45d2a"
            ),
            (0xba8048c3, 0x00045d2a)
        );
    }

    #[test]
    fn test_sop1_sopc() {
        assert_eq!(enc1(GcnGen::Gcn12, "s_mov_b32 s86, s20"), 0xbed60014);
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_mov_b64 s[86:87], s[20:21]"),
            0xbed60114
        );
        assert_eq!(enc1(GcnGen::Gcn10, "s_mov_b64 s[86:87], s[20:21]"), 0xbed60414);
        assert_eq!(enc1(GcnGen::Gcn12, "s_getpc_b64 s[86:87]"), 0xbed61c00);
        assert_eq!(enc1(GcnGen::Gcn12, "s_setpc_b64 s[20:21]"), 0xbe801d14);
        assert_eq!(
            enc2(GcnGen::Gcn12, "s_mov_b32 s86, 0xddbbaa11"),
            (0xbed600ff, 0xddbbaa11)
        );
        assert_eq!(enc1(GcnGen::Gcn10, "s_cmp_eq_u32 s29, s69"), 0xbf06451d);
        assert_eq!(enc1(GcnGen::Gcn12, "s_cmp_eq_i32 s29, s69"), 0xbf00451d);
        assert_eq!(
            enc2(GcnGen::Gcn12, "s_cmp_eq_i32 0x6d894, s69"),
            (0xbf0045ff, 0x0006d894)
        );
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_set_gpr_idx_on s29, 0x45"),
            0xbf11451d
        );
    }

    #[test]
    fn test_sopc_forward_imm() {
        // the immediate resolves after the instruction was emitted
        let mut b = bench(GcnGen::Gcn12);
        b.encode("s_set_gpr_idx_on s29, 4+xd").unwrap();
        let xd = b.env.get_or_create_symbol("xd");
        b.env
            .define_symbol_value(xd, 43, crate::section::SECTION_ABS, &pos(), &mut b.sections, &mut b.diags)
            .unwrap();
        assert!(b.diags.is_empty(), "{:?}", b.diags);
        assert_eq!(b.words(), vec![0xbf112f1d]);
    }

    #[test]
    fn test_sopp() {
        assert_eq!(enc1(GcnGen::Gcn10, "s_endpgm"), 0xbf810000);
        assert_eq!(enc1(GcnGen::Gcn10, "s_waitcnt vmcnt(14)"), 0xbf8c0f7e);
        assert_eq!(
            enc1(GcnGen::Gcn12, "s_sendmsg sendmsg(11, cut, 0)"),
            0xbf90001b
        );
        let section = {
            let mut b = bench(GcnGen::Gcn10);
            b.encode("s_waitcnt vmcnt(14)").unwrap();
            b.sections.remove(0)
        };
        assert_eq!(section.wait_instrs.len(), 1);
        assert_eq!(section.wait_instrs[0].waits[0], 14);
    }

    #[test]
    fn test_branches() {
        // backward branch target resolved immediately
        let mut b = bench(GcnGen::Gcn10);
        let label = b.env.get_or_create_symbol(".L4");
        b.encode("s_nop 0").unwrap();
        b.env
            .define_symbol_value(label, 4, 0, &pos(), &mut b.sections, &mut b.diags)
            .unwrap();
        b.encode("s_branch .L4").unwrap();
        assert_eq!(b.words(), vec![0xbf800000, 0xbf82ffff]);
        assert_eq!(b.sections[0].code_flow.len(), 1);
        assert_eq!(b.sections[0].code_flow[0].target, 4);

        // forward branch patched when the label resolves
        let mut b = bench(GcnGen::Gcn10);
        b.encode("s_branch fwd").unwrap();
        b.encode("s_nop 0").unwrap();
        let fwd = b.env.get_or_create_symbol("fwd");
        b.env
            .define_symbol_value(fwd, 8, 0, &pos(), &mut b.sections, &mut b.diags)
            .unwrap();
        assert!(b.diags.is_empty(), "{:?}", b.diags);
        assert_eq!(b.words(), vec![0xbf820001, 0xbf800000]);
        assert_eq!(b.sections[0].code_flow[0].target, 8);
    }

    #[test]
    fn test_smrd_smem() {
        assert_eq!(enc1(GcnGen::Gcn10, "s_memtime s[51:52]"), 0xc7998000);
        assert_eq!(
            enc2(GcnGen::Gcn12, "s_load_dword s50, s[58:59], 0x1345b"),
            (0xc0020c9d, 0x0001345b)
        );
    }

    #[test]
    fn test_vop2() {
        assert_eq!(
            enc1(GcnGen::Gcn10, "v_cndmask_b32 v154, v21, v107, vcc"),
            0x0134d715
        );
        assert_eq!(
            enc2(GcnGen::Gcn10, "v_cndmask_b32 v154, 0x445aa, v107, vcc"),
            (0x0134d6ff, 0x000445aa)
        );
        assert_eq!(enc1(GcnGen::Gcn12, "v_max_u32 v154, v21, v107"), 0x1f34d715);
        assert_eq!(
            enc2(GcnGen::Gcn12, "v_mul_i32_i24 v154, 0xa2346, v107"),
            (0x0d34d6ff, 0x000a2346)
        );
        assert_eq!(
            enc2(GcnGen::Gcn10, "v_madmk_f32 v154, v21, 0x567d0700, v107"),
            (0x4134d715, 0x567d0700)
        );
        assert_eq!(
            enc2(GcnGen::Gcn10, "v_madak_f32 v154, v21, v107, 0x567d0700"),
            (0x4334d715, 0x567d0700)
        );
        assert_eq!(
            enc2(GcnGen::Gcn12, "v_madmk_f16 v154, v21, 0x3d4c, v107"),
            (0x4934d715, 0x00003d4c)
        );
        assert_eq!(
            enc2(GcnGen::Gcn12, "v_madak_f16 v154, v21, v107, 0x3d4c"),
            (0x4b34d715, 0x00003d4c)
        );
    }

    #[test]
    fn test_vop2_half_inline() {
        // 0.5 in a half instruction is the inline constant, not a literal
        assert_eq!(enc1(GcnGen::Gcn12, "v_add_f16 v1, 0.5, v2"), {
            // op 31, vdst 1, vsrc1 2, src0 240
            31 << 25 | 1 << 17 | 2 << 9 | 240
        });
        // on a single-precision instruction 0.5 is inline on all
        // generations
        assert_eq!(
            enc1(GcnGen::Gcn10, "v_add_f32 v1, 0.5, v2"),
            3 << 25 | 1 << 17 | 2 << 9 | 240
        );
    }

    #[test]
    fn test_vop1_vopc() {
        assert_eq!(enc1(GcnGen::Gcn10, "v_mov_b32 v158, s79"), 0x7f3c024f);
        assert_eq!(
            enc2(GcnGen::Gcn10, "v_cvt_f32_i32 v158, 0x4556fd"),
            (0x7f3c0aff, 0x004556fd)
        );
        assert_eq!(enc1(GcnGen::Gcn12, "v_cvt_f32_u32 v158, v79"), 0x7f3c0d4f);
        assert_eq!(enc1(GcnGen::Gcn10, "v_cmp_lt_f32 vcc, v79, v201"), 0x7c03934f);
        // 2.0 is an inline constant and takes precedence over the literal
        assert_eq!(
            enc1(GcnGen::Gcn10, "v_cmp_lt_f32 vcc, 2.0, v201"),
            0x7c0392f4
        );
        assert_eq!(
            enc2(GcnGen::Gcn10, "v_cmp_lt_f32 vcc, 1.5, v201"),
            (0x7c0392ff, 0x3fc00000)
        );
        assert_eq!(enc1(GcnGen::Gcn12, "v_cmp_f_f16 vcc, v79, v201"), 0x7c41934f);
        assert_eq!(
            enc1(GcnGen::Gcn10, "v_cmpx_lg_f64 vcc, v[79:80], v[201:202]"),
            0x7c6b934f
        );
    }

    #[test]
    fn test_vop3() {
        assert_eq!(
            enc2(GcnGen::Gcn12, "v_min3_i32 v55, v79, v166, v229"),
            (0xd1d10037, 0x07974d4f)
        );
        assert_eq!(
            enc2(GcnGen::Gcn10, "v_mad_f32 v55, v79, v166, v229"),
            (0xd2820037, 0x07974d4f)
        );
    }

    #[test]
    fn test_vop2_sdwa_dpp() {
        assert_eq!(
            enc2(
                GcnGen::Gcn12,
                "v_cndmask_b32 v154, v61, v107, vcc src0_sel:byte0 src1_sel:byte0"
            ),
            (0x0134d6f9, 0x0000063d)
        );
        assert_eq!(
            enc2(
                GcnGen::Gcn12,
                "v_cndmask_b32 v154, v190, v107, vcc row_shr:10 bank_mask:0 row_mask:0"
            ),
            (0x0134d6fa, 0x00011abe)
        );
        // SDWA does not exist before GCN 1.2
        let mut b = bench(GcnGen::Gcn10);
        let err = b
            .encode("v_cndmask_b32 v154, v61, v107, vcc src0_sel:byte0")
            .unwrap_err();
        assert_eq!(err.kind, EncodeErrorKind::GarbageAtEnd);
    }

    #[test]
    fn test_vintrp() {
        assert_eq!(
            enc1(GcnGen::Gcn10, "v_interp_p1_f32 v93, v211, attr0.x"),
            0xc97400d3
        );
        assert_eq!(
            enc1(GcnGen::Gcn12, "v_interp_p1_f32 v93, v211, attr0.x"),
            0xd57400d3
        );
    }

    #[test]
    fn test_ds() {
        assert_eq!(
            enc2(
                GcnGen::Gcn10,
                "ds_read2_b32 v[55:56], v6 offset0:37 offset1:38"
            ),
            (0xd8dc2625, 0x37000006)
        );
        assert_eq!(
            enc2(GcnGen::Gcn10, "ds_min_i32 v71, v169 offset:52583"),
            (0xd814cd67, 0x0000a947)
        );
        assert_eq!(
            enc2(GcnGen::Gcn12, "ds_inc_rtn_u32 v155, v71, v169 offset:52583"),
            (0xd846cd67, 0x9b00a947)
        );
    }

    #[test]
    fn test_mubuf_mtbuf() {
        assert_eq!(
            enc2(
                GcnGen::Gcn10,
                "buffer_load_format_x v61, v[18:19], s[80:83], s35 offen idxen offset:603"
            ),
            (0xe000325b, 0x23143d12)
        );
        assert_eq!(
            enc2(
                GcnGen::Gcn10,
                "tbuffer_load_format_x v[61:62], v[18:19], s[80:83], s35 offen idxen \
                 offset:2004 glc slc tfe format:[8,sint]"
            ),
            (0xea8877d4, 0x23d43d12)
        );
        assert_eq!(
            enc2(
                GcnGen::Gcn12,
                "tbuffer_load_format_xyzw v[61:65], v[18:19], s[80:83], s35 offen idxen \
                 offset:2004 glc slc tfe format:[8,sint]"
            ),
            (0xea89f7d4, 0x23d43d12)
        );
    }

    #[test]
    fn test_mimg() {
        assert_eq!(
            enc2(
                GcnGen::Gcn10,
                "image_load v[157:160], v[121:124], s[84:87] dmask:11 unorm glc slc r128 tfe lwe da"
            ),
            (0xf203fb00, 0x00159d79)
        );
        assert_eq!(
            enc2(
                GcnGen::Gcn12,
                "image_store_mip v[157:159], v[121:124], s[84:87] dmask:11 unorm glc r128 da"
            ),
            (0xf024fb00, 0x00159d79)
        );
    }

    #[test]
    fn test_exp() {
        assert_eq!(
            enc2(GcnGen::Gcn10, "exp param5, v116, v93, v27, v124 done vm"),
            (0xf8001a5f, 0x7c1b5d74)
        );
        assert_eq!(
            enc2(GcnGen::Gcn12, "exp param5, v116, v93, v27, v124 done vm"),
            (0xc4001a5f, 0x7c1b5d74)
        );
    }

    #[test]
    fn test_flat() {
        assert_eq!(
            enc2(GcnGen::Gcn11, "flat_load_dwordx2 v[47:49], v[187:188] glc slc tfe"),
            (0xdc370000, 0x2f8000bb)
        );
        assert_eq!(
            enc2(GcnGen::Gcn12, "flat_store_dword v[191:192], v84 glc slc tfe"),
            (0xdc730000, 0x008054bf)
        );
    }

    #[test]
    fn test_errors() {
        let mut b = bench(GcnGen::Gcn10);
        let err = b.encode("s_frobnicate s0, s1, s2").unwrap_err();
        assert!(matches!(err.kind, EncodeErrorKind::UnknownMnemonic { .. }));
        let err = b.encode("s_rfe_restore_b64 s[4:5], s61").unwrap_err();
        assert!(matches!(
            err.kind,
            EncodeErrorKind::UnsupportedOnGeneration { .. }
        ));
        // two literals in one instruction
        let err = b
            .encode("v_cndmask_b32 v1, 0x12345678, v2, vcc src0_sel:byte0")
            .unwrap_err();
        assert!(matches!(err.kind, EncodeErrorKind::IllegalOperand { .. }));
        let err = b.encode("s_add_u32 s21, 0x123456, 0x654321").unwrap_err();
        assert_eq!(err.kind, EncodeErrorKind::IllegalConstant);
        // misaligned instruction start
        let mut b = bench(GcnGen::Gcn10);
        b.sections[0].emit(&[0]);
        let err = b.encode("s_endpgm").unwrap_err();
        assert!(matches!(
            err.kind,
            EncodeErrorKind::MisalignedInstruction { .. }
        ));
    }

    #[test]
    fn test_relocation_literal() {
        let mut b = bench(GcnGen::Gcn10);
        b.sections.push(Section::new(
            ".data",
            SectionKind::Data,
            SectionFlags::WRITABLE,
        ));
        let sym = b.env.get_or_create_symbol("buf");
        b.env
            .define_symbol_value(sym, 0x20, 1, &pos(), &mut b.sections, &mut b.diags)
            .unwrap();
        b.encode("s_mov_b32 s0, buf&0xffffffff").unwrap();
        b.encode("s_mov_b32 s1, buf>>32").unwrap();
        assert_eq!(b.relocs.len(), 2);
        assert_eq!(b.relocs[0].kind, crate::section::RelocKind::Low32);
        assert_eq!(b.relocs[0].addend, 0x20);
        assert_eq!(b.relocs[0].offset, 4);
        assert_eq!(b.relocs[1].kind, crate::section::RelocKind::High32);
        assert_eq!(b.relocs[1].offset, 12);
    }
}
