//! The assembler core state: sections, kernels, the symbol environment
//! and the emit/patch primitives the directive frontend drives. One
//! statement at a time comes in; bytes go into the current section,
//! labels and assignments go through the expression engine, and the
//! resolution chain patches everything the moment it becomes known.

use std::sync::Arc;

use crate::error::{Diagnostic, EncodeError, EncodeErrorKind, ExprError, Severity};
use crate::expr::parse::{parse_expression, ParseOptions};
use crate::expr::{ExprTarget, SymbolEnv};
use crate::gcn::encode::{self, pack_reg_range, EncodeContext, EncodeSink};
use crate::gcn::{regs, GcnGen};
use crate::section::{
    Kernel, Relocation, Section, SectionFlags, SectionId, SectionKind, SECTION_ABS,
};
use crate::source::SourcePos;

/// The assembler state shared by the directive frontend and the
/// instruction encoder
pub struct Assembler {
    /// Source file name used in diagnostics
    pub file: Arc<str>,
    /// Target generation
    pub gen: GcnGen,
    /// Wave32 execution mode
    pub wave32: bool,
    /// The symbol environment
    pub env: SymbolEnv,
    /// All sections, indexed by [`SectionId`]
    pub sections: Vec<Section>,
    /// Declared kernels
    pub kernels: Vec<Kernel>,
    /// Relocations accumulated for the output binary
    pub relocs: Vec<Relocation>,
    /// Accumulated diagnostics
    pub diags: Vec<Diagnostic>,
    current_section: SectionId,
    line: u64,
}

impl Assembler {
    /// Create an assembler with one executable `.text` section
    pub fn new(file: &str, gen: GcnGen) -> Self {
        let text = Section::new(
            ".text",
            SectionKind::Code,
            SectionFlags::WRITABLE | SectionFlags::EXECUTABLE | SectionFlags::CODE,
        );
        Self {
            file: Arc::from(file),
            gen,
            wave32: false,
            env: SymbolEnv::new(),
            sections: vec![text],
            kernels: Vec::new(),
            relocs: Vec::new(),
            diags: Vec::new(),
            current_section: 0,
            line: 0,
        }
    }

    /// The section bytes are currently emitted into
    pub fn current_section(&self) -> SectionId {
        self.current_section
    }

    /// Add a section and switch to it
    pub fn add_section(&mut self, section: Section) -> SectionId {
        self.sections.push(section);
        self.current_section = self.sections.len() as SectionId - 1;
        self.current_section
    }

    /// Switch the current section
    pub fn switch_section(&mut self, id: SectionId) {
        if (id as usize) < self.sections.len() {
            self.current_section = id;
        }
    }

    fn pos(&self, col: u64) -> SourcePos {
        SourcePos {
            file: self.file.clone(),
            line: self.line,
            col,
        }
    }

    fn record_error(&mut self, pos: SourcePos, message: String) {
        self.diags.push(Diagnostic {
            severity: Severity::Error,
            pos,
            message,
        });
    }

    /// Feed one source statement. Errors are accumulated; assembly
    /// continues where safe so one pass reports as many as possible.
    pub fn statement(&mut self, text: &str) {
        self.line += 1;
        for part in split_statements(text) {
            if let Err(e) = self.one_statement(part) {
                self.record_error(e.pos, e.kind.to_string());
            }
        }
    }

    fn one_statement(&mut self, text: &str) -> Result<(), EncodeError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }
        let pos = self.pos(1);
        // label definitions
        if let Some(label) = trimmed.strip_suffix(':') {
            if is_ident(label) {
                return self.define_label(label, &pos);
            }
        }
        // symbol assignments, including register ranges
        if let Some((lhs, rhs)) = trimmed.split_once('=') {
            let lhs = lhs.trim();
            if is_ident(lhs) && !trimmed.starts_with(".eqv") {
                return self.assign(lhs, rhs.trim(), &pos);
            }
        }
        if let Some(rest) = trimmed.strip_prefix(".eqv") {
            let (name, expr) = rest
                .trim()
                .split_once(',')
                .ok_or_else(|| EncodeError::new(pos.clone(), EncodeErrorKind::MissingComma))?;
            return self.define_eqv(name.trim(), expr.trim(), &pos);
        }
        if let Some(rest) = trimmed.strip_prefix(".int") {
            return self.emit_data_values(rest, 4, &pos);
        }
        if let Some(rest) = trimmed.strip_prefix(".short") {
            return self.emit_data_values(rest, 2, &pos);
        }
        if let Some(rest) = trimmed.strip_prefix(".byte") {
            return self.emit_data_values(rest, 1, &pos);
        }
        if let Some(rest) = trimmed.strip_prefix(".quad") {
            return self.emit_data_values(rest, 8, &pos);
        }
        if let Some(rest) = trimmed.strip_prefix(".fill") {
            return self.fill(rest, &pos);
        }
        if let Some(rest) = trimmed.strip_prefix(".align") {
            let value = self.const_expr(rest.trim(), &pos)?;
            self.sections[self.current_section as usize].align_to(value);
            return Ok(());
        }
        if trimmed.starts_with('.') {
            return Err(EncodeError::new(
                pos,
                EncodeErrorKind::UnknownMnemonic {
                    name: trimmed.to_string(),
                },
            ));
        }
        self.instruction(trimmed, &pos)
    }

    /// Define a label at the current offset of the current section
    pub fn define_label(&mut self, name: &str, pos: &SourcePos) -> Result<(), EncodeError> {
        let offset = self.sections[self.current_section as usize].len();
        let id = self.env.get_or_create_symbol(name);
        if let Some(sym) = self.env.symbols.get_mut(id) {
            sym.once_defined = true;
        }
        self.env
            .define_symbol_value(
                id,
                offset,
                self.current_section,
                pos,
                &mut self.sections,
                &mut self.diags,
            )
            .map_err(expr_to_encode)
    }

    fn assign(&mut self, name: &str, rhs: &str, pos: &SourcePos) -> Result<(), EncodeError> {
        // `%` forces hardware-register interpretation: the symbol names
        // a register range
        if let Some(reg_text) = rhs.strip_prefix('%') {
            let mut at = 0;
            let range = regs::parse_sreg_range(reg_text, &mut at, self.gen)
                .map_err(|e| EncodeError::new(pos.clone(), e))?
                .or(regs::parse_vreg_range(reg_text, &mut at)
                    .map_err(|e| EncodeError::new(pos.clone(), e))?);
            let Some(range) = range else {
                return Err(EncodeError::new(
                    pos.clone(),
                    EncodeErrorKind::IllegalOperand {
                        expected: "register range after '%'",
                    },
                ));
            };
            let id = self.env.get_or_create_symbol(name);
            if let Some(sym) = self.env.symbols.get_mut(id) {
                sym.reg_range = true;
                sym.has_value = true;
                sym.value = pack_reg_range(range);
            }
            return Ok(());
        }
        let id = self.env.get_or_create_symbol(name);
        let mut at = 0;
        let expr = parse_expression(&mut self.env, rhs, &mut at, pos, ParseOptions::default())
            .map_err(expr_to_encode)?;
        self.env
            .assign_symbol_expr(id, expr, pos, &mut self.sections, &mut self.diags)
            .map_err(expr_to_encode)
    }

    fn define_eqv(&mut self, name: &str, rhs: &str, pos: &SourcePos) -> Result<(), EncodeError> {
        let mut at = 0;
        let template = parse_expression(
            &mut self.env,
            rhs,
            &mut at,
            pos,
            ParseOptions {
                make_base: true,
                ..ParseOptions::default()
            },
        )
        .map_err(expr_to_encode)?;
        self.env
            .define_eqv(name, template, pos, &mut self.sections, &mut self.diags)
            .map_err(expr_to_encode)?;
        Ok(())
    }

    /// Emit data slots of `width` bytes, one per comma-separated
    /// expression; unresolved expressions patch their slot later
    pub fn emit_data_values(
        &mut self,
        list: &str,
        width: u64,
        pos: &SourcePos,
    ) -> Result<(), EncodeError> {
        for item in list.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let mut at = 0;
            let expr =
                parse_expression(&mut self.env, item, &mut at, pos, ParseOptions::default())
                    .map_err(expr_to_encode)?;
            let offset = self.sections[self.current_section as usize]
                .emit_at(&vec![0u8; width as usize], pos.clone());
            let target = match width {
                1 => ExprTarget::Data8 {
                    section: self.current_section,
                    offset,
                },
                2 => ExprTarget::Data16 {
                    section: self.current_section,
                    offset,
                },
                4 => ExprTarget::Data32 {
                    section: self.current_section,
                    offset,
                },
                _ => ExprTarget::Data64 {
                    section: self.current_section,
                    offset,
                },
            };
            self.env
                .bind_target(expr, target, &mut self.sections, &mut self.diags);
        }
        Ok(())
    }

    fn fill(&mut self, rest: &str, pos: &SourcePos) -> Result<(), EncodeError> {
        let mut parts = rest.splitn(3, ',').map(str::trim);
        let count = self.const_expr(parts.next().unwrap_or("0"), pos)?;
        let size = self.const_expr(parts.next().unwrap_or("1"), pos)?;
        let value = self.const_expr(parts.next().unwrap_or("0"), pos)?;
        let section = &mut self.sections[self.current_section as usize];
        for _ in 0..count {
            let bytes = value.to_le_bytes();
            section.emit(&bytes[..(size as usize).min(8)]);
        }
        Ok(())
    }

    /// Evaluate an expression that must resolve now to an absolute value
    pub fn const_expr(&mut self, text: &str, pos: &SourcePos) -> Result<u64, EncodeError> {
        let mut at = 0;
        let expr = parse_expression(&mut self.env, text, &mut at, pos, ParseOptions::default())
            .map_err(expr_to_encode)?;
        let ops = self.env.exprs.get(expr).map(|e| e.ops_len()).unwrap_or(0);
        let outcome = self
            .env
            .try_evaluate(expr, 0, ops, false, &self.sections)
            .map_err(expr_to_encode)?;
        self.env.exprs.release(expr);
        match outcome {
            crate::expr::EvalOutcome::Value {
                value,
                section: SECTION_ABS,
            } => Ok(value),
            _ => Err(EncodeError::new(
                pos.clone(),
                EncodeErrorKind::Expr(crate::error::ExprErrorKind::CrossSection),
            )),
        }
    }

    /// Encode one instruction line into the current section
    pub fn instruction(&mut self, line: &str, pos: &SourcePos) -> Result<(), EncodeError> {
        let ctx = EncodeContext {
            gen: self.gen,
            wave32: self.wave32,
        };
        let mut sink = EncodeSink {
            env: &mut self.env,
            sections: &mut self.sections,
            section: self.current_section,
            relocs: &mut self.relocs,
            diags: &mut self.diags,
        };
        encode::encode_instruction(&ctx, line, pos, &mut sink)
    }

    /// Finish the pass: resolve pending section differences and report
    /// still-undefined symbols
    pub fn finish(&mut self) {
        // single relative space covering all sections, laid out in order
        let mut address = 0u64;
        for section in &mut self.sections {
            section.rel_space = Some(0);
            address = address.next_multiple_of(section.alignment.max(1));
            section.rel_address = address;
            address += section.len();
        }
        self.env.resolve_pending(&mut self.sections, &mut self.diags);
        let undefined: Vec<String> = self
            .env
            .undefined_symbols()
            .into_iter()
            .map(str::to_string)
            .collect();
        for name in undefined {
            let pos = self.pos(1);
            self.record_error(pos, format!("Undefined symbol '{name}'"));
        }
    }

    /// True when no error-severity diagnostics were recorded
    pub fn good(&self) -> bool {
        self.diags.iter().all(|d| d.severity != Severity::Error)
    }
}

fn expr_to_encode(e: ExprError) -> EncodeError {
    EncodeError::new(e.pos, EncodeErrorKind::Expr(e.kind))
}

fn is_ident(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'$')
        && !text.as_bytes()[0].is_ascii_digit()
}

fn split_statements(text: &str) -> impl Iterator<Item = &str> {
    text.split(';')
}

/// Position helper for callers outside a line context
pub fn start_pos(file: &Arc<str>) -> SourcePos {
    SourcePos {
        file: file.clone(),
        line: 1,
        col: 1,
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    fn assemble(lines: &[&str]) -> Assembler {
        let mut asm = Assembler::new("test.s", GcnGen::Gcn10);
        for line in lines {
            asm.statement(line);
        }
        asm.finish();
        asm
    }

    #[test]
    fn test_forward_symbol_through_data() {
        // E1: sym_a = sym_b + 4; sym_b = 7; .int sym_a
        let asm = assemble(&["sym_a = sym_b + 4", "sym_b = 7", ".int sym_a"]);
        assert!(asm.good(), "{:?}", asm.diags);
        assert_eq!(&asm.sections[0].content, &[0x0b, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_section_difference_with_fill() {
        // E2: .int end - start; start: .fill 10, 1, 0; end:
        let asm = assemble(&[".int end - start", "start:", ".fill 10, 1, 0", "end:"]);
        assert!(asm.good(), "{:?}", asm.diags);
        assert_eq!(&asm.sections[0].content[..4], &[0x0a, 0x00, 0x00, 0x00]);
        assert_eq!(asm.sections[0].content.len(), 14);
    }

    #[test]
    fn test_instructions_and_labels() {
        let asm = assemble(&[
            "start:",
            "    s_add_u32  s21, s4, s61",
            "    s_branch   done",
            "    s_nop 0",
            "done:",
            "    s_endpgm",
        ]);
        assert!(asm.good(), "{:?}", asm.diags);
        let words: Vec<u32> = asm.sections[0]
            .content
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(words, vec![0x80153d04, 0xbf820001, 0xbf800000, 0xbf810000]);
        assert_eq!(asm.sections[0].code_flow[0].target, 12);
    }

    #[test]
    fn test_register_range_symbol_statement() {
        let mut asm = Assembler::new("test.s", GcnGen::Gcn15);
        asm.statement("xrv = %s105; s_add_u32 s21, s4, xrv");
        asm.finish();
        assert!(asm.good(), "{:?}", asm.diags);
        assert_eq!(&asm.sections[0].content, &[0x04, 0x69, 0x15, 0x80]);
    }

    #[test]
    fn test_eqv_statement() {
        let asm = assemble(&[
            "base = 5",
            ".eqv snap, base + 10",
            "base = 50",
            ".int snap",
        ]);
        assert!(asm.good(), "{:?}", asm.diags);
        assert_eq!(&asm.sections[0].content, &[15, 0, 0, 0]);
    }

    #[test]
    fn test_label_redefinition_is_reported() {
        let asm = assemble(&["lab:", ".int 1", "lab:"]);
        assert!(!asm.good());
        assert!(asm.diags[0].message.contains("already defined"));
    }

    #[test]
    fn test_undefined_symbol_reported_at_finish() {
        let asm = assemble(&[".int never_defined"]);
        assert!(!asm.good());
        assert!(asm
            .diags
            .iter()
            .any(|d| d.message.contains("Undefined symbol 'never_defined'")));
    }
}
