//! Operator-precedence parser producing postfix expression programs.
//! The dialect is C-like with the assembler's extensions: unsigned and
//! signed divide (`/`, `//`) and modulo (`%`, `%%`), logical and
//! arithmetic right shift (`>>`, `>>>`), binary or-not (`!`), unsigned
//! comparisons (`<@`, `<=@`, `>@`, `>=@`) and the ternary choice.

use super::{ExprArg, ExprId, ExprOp, ExprTarget, Expression, SymbolEnv};
use crate::error::{ExprError, ExprErrorKind};
use crate::num;
use crate::section::SECTION_ABS;
use crate::source::{LineCol, SourcePos};

#[derive(Debug, Clone, Copy, Default)]
/// Options of one expression parse
pub struct ParseOptions {
    /// Do not inline already-defined symbols; keep references so the
    /// expression can be captured
    pub make_base: bool,
    /// Unresolved references are errors instead of deferred work
    pub dont_resolve_later: bool,
}

/// Parse an expression from `text` starting at `*pos`, which is advanced
/// past the consumed input. `base` is the source position of `text`'s
/// first byte; per-operator positions are derived from it.
pub fn parse_expression(
    env: &mut SymbolEnv,
    text: &str,
    pos: &mut usize,
    base: &SourcePos,
    options: ParseOptions,
) -> Result<ExprId, ExprError> {
    let mut parser = Parser {
        env,
        text: text.as_bytes(),
        pos: *pos,
        base,
        options,
        ops: Vec::new(),
        args: Vec::new(),
        op_pos: Vec::new(),
    };
    parser.parse_binary(0)?;
    parser.skip_ws();
    *pos = parser.pos;
    let sym_occurs = parser
        .args
        .iter()
        .filter(|a| matches!(a, ExprArg::Symbol(_)))
        .count();
    let rel_sym_occurs = parser
        .args
        .iter()
        .filter(|a| matches!(a, ExprArg::Value { section, .. } if *section != SECTION_ABS))
        .count();
    let expr = Expression {
        ops: parser.ops,
        args: parser.args,
        op_pos: parser.op_pos,
        pos: base.clone(),
        target: ExprTarget::None,
        sym_occurs,
        rel_sym_occurs,
    };
    Ok(env.intern_expr(expr))
}

/// Fast path for purely numeric expressions: an optional run of unary
/// `+`/`-` and a literal, with no operator following. Returns `None` when
/// the input needs the full parser.
pub fn fast_evaluate(text: &str, pos: &mut usize) -> Option<u64> {
    let bytes = text.as_bytes();
    let mut at = *pos;
    while at < bytes.len() && (bytes[at] == b' ' || bytes[at] == b'\t') {
        at += 1;
    }
    let mut negate = false;
    while let Some(&b) = bytes.get(at) {
        match b {
            b'+' => at += 1,
            b'-' => {
                negate = !negate;
                at += 1;
            }
            _ => break,
        }
    }
    let (value, used) = num::parse_u64(&text[at..]).ok()?;
    at += used;
    let mut end = at;
    while end < bytes.len() && (bytes[end] == b' ' || bytes[end] == b'\t') {
        end += 1;
    }
    if matches!(
        bytes.get(end),
        Some(
            b'+' | b'-'
                | b'*'
                | b'/'
                | b'%'
                | b'<'
                | b'>'
                | b'='
                | b'&'
                | b'|'
                | b'^'
                | b'!'
                | b'?'
                | b'~'
                | b'('
        )
    ) {
        return None;
    }
    *pos = at;
    Some(if negate { value.wrapping_neg() } else { value })
}

struct Parser<'a, 'e> {
    env: &'e mut SymbolEnv,
    text: &'a [u8],
    pos: usize,
    base: &'a SourcePos,
    options: ParseOptions,
    ops: Vec<ExprOp>,
    args: Vec<ExprArg>,
    op_pos: Vec<LineCol>,
}

impl<'a, 'e> Parser<'a, 'e> {
    fn line_col(&self, at: usize) -> LineCol {
        LineCol {
            line: self.base.line,
            col: self.base.col + at as u64,
        }
    }

    fn error(&self, at: usize, kind: ExprErrorKind) -> ExprError {
        ExprError::new(self.base.with_line_col(self.line_col(at)), kind)
    }

    fn skip_ws(&mut self) {
        while matches!(self.text.get(self.pos), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn push_op(&mut self, op: ExprOp, at: usize) {
        self.ops.push(op);
        self.op_pos.push(self.line_col(at));
    }

    fn push_value(&mut self, value: u64, section: u32, at: usize) {
        self.args.push(ExprArg::Value { value, section });
        self.push_op(ExprOp::ArgValue, at);
    }

    fn parse_binary(&mut self, min_bp: u8) -> Result<(), ExprError> {
        self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.text.get(self.pos) == Some(&b'?') && min_bp <= 1 {
                let at = self.pos;
                self.pos += 1;
                self.push_op(ExprOp::ChoiceStart, at);
                self.parse_binary(0)?;
                self.skip_ws();
                if self.text.get(self.pos) != Some(&b':') {
                    return Err(self.error(self.pos, ExprErrorKind::MissingTernaryColon));
                }
                self.pos += 1;
                self.parse_binary(1)?;
                self.push_op(ExprOp::Choice, at);
                continue;
            }
            let Some((op, bp, len)) = self.peek_binary_op() else {
                break;
            };
            if bp < min_bp {
                break;
            }
            let at = self.pos;
            self.pos += len;
            self.parse_binary(bp + 1)?;
            self.push_op(op, at);
        }
        Ok(())
    }

    fn peek_binary_op(&self) -> Option<(ExprOp, u8, usize)> {
        let rest = &self.text[self.pos.min(self.text.len())..];
        let tokens: &[(&[u8], ExprOp, u8)] = &[
            (b"||", ExprOp::LogicalOr, 2),
            (b"&&", ExprOp::LogicalAnd, 3),
            (b"==", ExprOp::Equal, 7),
            (b"!=", ExprOp::NotEqual, 7),
            (b"!", ExprOp::BitOrNot, 4),
            (b"|", ExprOp::BitOr, 4),
            (b"^", ExprOp::BitXor, 5),
            (b"&", ExprOp::BitAnd, 6),
            (b"<=@", ExprOp::BelowEq, 8),
            (b"<<", ExprOp::Shl, 9),
            (b"<=", ExprOp::LessEq, 8),
            (b"<@", ExprOp::Below, 8),
            (b"<", ExprOp::Less, 8),
            (b">=@", ExprOp::AboveEq, 8),
            (b">>>", ExprOp::SignedShr, 9),
            (b">>", ExprOp::Shr, 9),
            (b">=", ExprOp::GreaterEq, 8),
            (b">@", ExprOp::Above, 8),
            (b">", ExprOp::Greater, 8),
            (b"+", ExprOp::Add, 10),
            (b"-", ExprOp::Sub, 10),
            (b"*", ExprOp::Mul, 11),
            (b"//", ExprOp::SignedDiv, 11),
            (b"/", ExprOp::Div, 11),
            (b"%%", ExprOp::SignedMod, 11),
            (b"%", ExprOp::Mod, 11),
        ];
        tokens
            .iter()
            .find(|(tok, _, _)| rest.starts_with(tok))
            .map(|&(tok, op, bp)| (op, bp, tok.len()))
    }

    fn parse_unary(&mut self) -> Result<(), ExprError> {
        self.skip_ws();
        let at = self.pos;
        match self.text.get(self.pos) {
            Some(b'+') => {
                self.pos += 1;
                self.parse_unary()?;
                self.push_op(ExprOp::Plus, at);
            }
            Some(b'-') => {
                self.pos += 1;
                self.parse_unary()?;
                self.push_op(ExprOp::Negate, at);
            }
            Some(b'~') => {
                self.pos += 1;
                self.parse_unary()?;
                self.push_op(ExprOp::BitNot, at);
            }
            Some(b'!') => {
                self.pos += 1;
                self.parse_unary()?;
                self.push_op(ExprOp::LogicalNot, at);
            }
            Some(b'(') => {
                self.pos += 1;
                self.parse_binary(0)?;
                self.skip_ws();
                if self.text.get(self.pos) != Some(&b')') {
                    return Err(self.error(self.pos, ExprErrorKind::UnterminatedParen));
                }
                self.pos += 1;
            }
            Some(&b) if b.is_ascii_digit() => {
                let text = std::str::from_utf8(&self.text[self.pos..]).unwrap_or("");
                let (value, used) = num::parse_u64(text).map_err(|e| self.error(at, e.into()))?;
                self.pos += used;
                self.push_value(value, SECTION_ABS, at);
            }
            Some(&b) if is_ident_start(b) || self.starts_scoped_ident() => {
                let name = self.scan_ident();
                self.push_symbol_ref(&name, at)?;
            }
            _ => return Err(self.error(at, ExprErrorKind::MissingOperand)),
        }
        Ok(())
    }

    fn starts_scoped_ident(&self) -> bool {
        self.text[self.pos..].starts_with(b"::")
            && self
                .text
                .get(self.pos + 2)
                .copied()
                .is_some_and(is_ident_start)
    }

    fn scan_ident(&mut self) -> String {
        let start = self.pos;
        if self.text[self.pos..].starts_with(b"::") {
            self.pos += 2;
        }
        loop {
            while self
                .text
                .get(self.pos)
                .copied()
                .is_some_and(is_ident_continue)
            {
                self.pos += 1;
            }
            if self.text[self.pos..].starts_with(b"::")
                && self
                    .text
                    .get(self.pos + 2)
                    .copied()
                    .is_some_and(is_ident_start)
            {
                self.pos += 2;
                continue;
            }
            break;
        }
        String::from_utf8_lossy(&self.text[start..self.pos]).into_owned()
    }

    fn push_symbol_ref(&mut self, name: &str, at: usize) -> Result<(), ExprError> {
        let existing = self.env.scopes.resolve_symbol(name);
        let inline = existing.and_then(|id| {
            let sym = self.env.symbols.get(id)?;
            (sym.has_value && !self.options.make_base).then_some((sym.value, sym.section))
        });
        if let Some((value, section)) = inline {
            self.push_value(value, section, at);
            return Ok(());
        }
        let id = match existing {
            Some(id) => id,
            None if self.options.dont_resolve_later => {
                return Err(self.error(
                    at,
                    ExprErrorKind::SymbolNotFound {
                        name: name.to_string(),
                    },
                ));
            }
            None => self.env.get_or_create_symbol(name),
        };
        self.args.push(ExprArg::Symbol(id));
        self.push_op(ExprOp::ArgSymbol, at);
        Ok(())
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'.' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

#[allow(clippy::unwrap_used, clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::EvalOutcome;
    use crate::section::{Section, SectionFlags, SectionKind};
    use std::sync::Arc;

    fn pos() -> SourcePos {
        SourcePos {
            file: Arc::from("test.s"),
            line: 1,
            col: 1,
        }
    }

    fn eval(text: &str) -> Result<EvalOutcome, ExprError> {
        let mut env = SymbolEnv::new();
        let mut at = 0;
        let id = parse_expression(&mut env, text, &mut at, &pos(), ParseOptions::default())?;
        let ops = env.exprs.get(id).unwrap().ops.len();
        env.try_evaluate(id, 0, ops, false, &[])
    }

    fn eval_value(text: &str) -> u64 {
        match eval(text).unwrap() {
            EvalOutcome::Value { value, .. } => value,
            EvalOutcome::TryLater => panic!("not resolved"),
        }
    }

    #[test]
    fn test_precedence_and_parens() {
        assert_eq!(eval_value("2+2*2"), 6);
        assert_eq!(eval_value("(2+2)*2"), 8);
        assert_eq!(eval_value("1<<4|1"), 17);
        assert_eq!(eval_value("0x10 + 0b101 - 010"), 13);
        assert_eq!(eval_value("7 & 3 ^ 1"), 2);
        assert_eq!(eval_value("~0 >> 60"), 15);
        assert_eq!(eval_value("-8 >>> 1"), (-4i64) as u64);
        assert_eq!(eval_value("1 ! 2"), 1 | !2u64);
    }

    #[test]
    fn test_signed_unsigned_forms() {
        assert_eq!(eval_value("-10 // 3"), (-3i64) as u64);
        assert_eq!(eval_value("-10 / 3"), ((-10i64) as u64) / 3);
        assert_eq!(eval_value("-7 %% 2"), (-1i64) as u64);
        assert_eq!(eval_value("-1 < 0"), u64::MAX);
        assert_eq!(eval_value("-1 <@ 0"), 0);
        assert_eq!(eval_value("1 >@ 0"), u64::MAX);
        assert_eq!(eval_value("-1 >=@ 5"), u64::MAX);
    }

    #[test]
    fn test_ternary() {
        assert_eq!(eval_value("1 ? 10 : 20"), 10);
        assert_eq!(eval_value("0 ? 10 : 20"), 20);
        assert_eq!(eval_value("0 ? 1 : 1 ? 2 : 3"), 2);
        assert_eq!(eval_value("2 == 2 ? 5+5 : 6"), 10);
    }

    #[test]
    fn test_division_by_zero_position() {
        let err = eval("10 + 4 / 0").unwrap_err();
        assert_eq!(err.kind, ExprErrorKind::DivisionByZero);
        // the position points at the '/', not the expression head
        assert_eq!(err.pos.col, 8);
        let err = eval("1 << 64").unwrap_err();
        assert_eq!(err.kind, ExprErrorKind::ShiftOutOfRange { count: 64 });
    }

    #[test]
    fn test_dont_resolve_later() {
        let mut env = SymbolEnv::new();
        let mut at = 0;
        let err = parse_expression(
            &mut env,
            "missing + 1",
            &mut at,
            &pos(),
            ParseOptions {
                dont_resolve_later: true,
                ..ParseOptions::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err.kind,
            ExprErrorKind::SymbolNotFound {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_fast_evaluate() {
        let mut at = 0;
        assert_eq!(fast_evaluate("  42", &mut at), Some(42));
        assert_eq!(at, 4);
        let mut at = 0;
        assert_eq!(fast_evaluate("-0x10", &mut at), Some((-16i64) as u64));
        let mut at = 0;
        assert_eq!(fast_evaluate("4+2", &mut at), None);
        let mut at = 0;
        assert_eq!(fast_evaluate("abc", &mut at), None);
    }

    fn data_section() -> Section {
        Section::new(
            ".data",
            SectionKind::Data,
            SectionFlags::WRITABLE | SectionFlags::READABLE,
        )
    }

    #[test]
    fn test_forward_reference_data_target() {
        // sym_a = sym_b + 4; sym_b = 7; .int sym_a  =>  0b 00 00 00
        let mut env = SymbolEnv::new();
        let mut sections = vec![data_section()];
        let mut diags = Vec::new();

        let sym_a = env.get_or_create_symbol("sym_a");
        let mut at = 0;
        let rhs =
            parse_expression(&mut env, "sym_b + 4", &mut at, &pos(), ParseOptions::default())
                .unwrap();
        env.assign_symbol_expr(sym_a, rhs, &pos(), &mut sections, &mut diags)
            .unwrap();

        // .int sym_a reserves the slot and defers
        let offset = sections[0].emit(&[0; 4]);
        let mut at = 0;
        let slot =
            parse_expression(&mut env, "sym_a", &mut at, &pos(), ParseOptions::default()).unwrap();
        env.bind_target(
            slot,
            ExprTarget::Data32 {
                section: 0,
                offset,
            },
            &mut sections,
            &mut diags,
        );

        let sym_b = env.get_or_create_symbol("sym_b");
        env.define_symbol_value(sym_b, 7, SECTION_ABS, &pos(), &mut sections, &mut diags)
            .unwrap();

        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(&sections[0].content, &[0x0b, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_section_difference() {
        // .int end - start; start: .fill 10,1,0; end:
        let mut env = SymbolEnv::new();
        let mut sections = vec![data_section()];
        let mut diags = Vec::new();

        let offset = sections[0].emit(&[0; 4]);
        let mut at = 0;
        let diff =
            parse_expression(&mut env, "end - start", &mut at, &pos(), ParseOptions::default())
                .unwrap();
        env.bind_target(
            diff,
            ExprTarget::Data32 {
                section: 0,
                offset,
            },
            &mut sections,
            &mut diags,
        );

        let start = env.get_or_create_symbol("start");
        env.define_symbol_value(start, 4, 0, &pos(), &mut sections, &mut diags)
            .unwrap();
        sections[0].emit(&[0; 10]);
        let end = env.get_or_create_symbol("end");
        env.define_symbol_value(end, 14, 0, &pos(), &mut sections, &mut diags)
            .unwrap();

        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(&sections[0].content[..4], &[0x0a, 0x00, 0x00, 0x00]);
        assert_eq!(sections[0].content.len(), 14);
    }

    #[test]
    fn test_forward_chain_deeper_than_16() {
        let mut env = SymbolEnv::new();
        let mut sections = vec![data_section()];
        let mut diags = Vec::new();
        // sym0 = sym1 + 1; sym1 = sym2 + 1; ... sym17 defined last
        for i in 0..18 {
            let name = format!("sym{i}");
            let sym = env.get_or_create_symbol(&name);
            let rhs_text = format!("sym{} + 1", i + 1);
            let mut at = 0;
            let rhs =
                parse_expression(&mut env, &rhs_text, &mut at, &pos(), ParseOptions::default())
                    .unwrap();
            env.assign_symbol_expr(sym, rhs, &pos(), &mut sections, &mut diags)
                .unwrap();
        }
        let last = env.get_or_create_symbol("sym18");
        env.define_symbol_value(last, 100, SECTION_ABS, &pos(), &mut sections, &mut diags)
            .unwrap();
        assert!(diags.is_empty(), "{diags:?}");
        let sym0 = env.scopes.resolve_symbol("sym0").unwrap();
        let sym0 = env.symbols.get(sym0).unwrap();
        assert!(sym0.has_value);
        assert_eq!(sym0.value, 118);
    }

    #[test]
    fn test_backward_definition_reaches_earlier_referents() {
        // .int sym; sym = 5  — the waiting slot patches when the
        // assignment completes immediately
        let mut env = SymbolEnv::new();
        let mut sections = vec![data_section()];
        let mut diags = Vec::new();
        let offset = sections[0].emit(&[0; 4]);
        let mut at = 0;
        let slot =
            parse_expression(&mut env, "sym", &mut at, &pos(), ParseOptions::default()).unwrap();
        env.bind_target(
            slot,
            ExprTarget::Data32 {
                section: 0,
                offset,
            },
            &mut sections,
            &mut diags,
        );
        let sym = env.get_or_create_symbol("sym");
        let mut at = 0;
        let rhs = parse_expression(&mut env, "5", &mut at, &pos(), ParseOptions::default()).unwrap();
        env.assign_symbol_expr(sym, rhs, &pos(), &mut sections, &mut diags)
            .unwrap();
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(&sections[0].content, &[5, 0, 0, 0]);
    }

    #[test]
    fn test_redefinition_of_label_fails() {
        let mut env = SymbolEnv::new();
        let mut sections = vec![data_section()];
        let mut diags = Vec::new();
        let label = env.get_or_create_symbol("label");
        env.symbols.get_mut(label).unwrap().once_defined = true;
        env.define_symbol_value(label, 0, 0, &pos(), &mut sections, &mut diags)
            .unwrap();
        let err = env
            .define_symbol_value(label, 4, 0, &pos(), &mut sections, &mut diags)
            .unwrap_err();
        assert_eq!(
            err.kind,
            ExprErrorKind::Redefinition {
                name: "label".to_string()
            }
        );
    }

    #[test]
    fn test_snapshot_survives_redefinition() {
        let mut env = SymbolEnv::new();
        let mut sections = vec![data_section()];
        let mut diags = Vec::new();

        // base = 5; .eqv snap, base + undef; base = 50; undef = 1
        let base = env.get_or_create_symbol("base");
        env.define_symbol_value(base, 5, SECTION_ABS, &pos(), &mut sections, &mut diags)
            .unwrap();

        let mut at = 0;
        let template = parse_expression(
            &mut env,
            "base + undef",
            &mut at,
            &pos(),
            ParseOptions {
                make_base: true,
                ..ParseOptions::default()
            },
        )
        .unwrap();
        let snap = env
            .define_eqv("snap", template, &pos(), &mut sections, &mut diags)
            .unwrap();

        // redefine both referenced symbols after the snapshot
        env.define_symbol_value(base, 50, SECTION_ABS, &pos(), &mut sections, &mut diags)
            .unwrap();
        let undef = env.scopes.resolve_symbol("undef").unwrap();
        env.define_symbol_value(undef, 1, SECTION_ABS, &pos(), &mut sections, &mut diags)
            .unwrap();
        env.define_symbol_value(undef, 1000, SECTION_ABS, &pos(), &mut sections, &mut diags)
            .unwrap();

        let snap = env.symbols.get(snap).unwrap();
        assert!(snap.has_value);
        // captured base at 5, undef at its first definition
        assert_eq!(snap.value, 6);
    }
}
