//! The expression engine: lazy expression trees bound to output targets,
//! a symbol environment with forward references and occurrence tracking,
//! and a section-difference-aware evaluator.
//!
//! Expressions are immutable postfix programs owned by an arena pool;
//! symbols live in a second arena and every cross-reference is an index
//! pair, so resolving a symbol patches all referents in time linear in
//! the number of references.

use std::collections::VecDeque;

use crate::error::{Diagnostic, ExprError, ExprErrorKind};
use crate::section::{Section, SectionId, SECTION_ABS};
use crate::source::{LineCol, SourcePos};

pub mod parse;
pub mod scope;

pub use scope::{ScopeId, ScopeTree, Symbol, SymbolId, SymbolPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
/// One postfix expression operator
pub enum ExprOp {
    /// Literal value argument
    ArgValue,
    /// Symbol reference argument, substituted on resolution
    ArgSymbol,
    /// Arithmetic negation
    Negate,
    /// Bitwise negation
    BitNot,
    /// Logical negation
    LogicalNot,
    /// Unary plus
    Plus,
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Unsigned division
    Div,
    /// Signed division
    SignedDiv,
    /// Unsigned modulo
    Mod,
    /// Signed modulo
    SignedMod,
    /// Bitwise AND
    BitAnd,
    /// Bitwise OR
    BitOr,
    /// Bitwise XOR
    BitXor,
    /// Bitwise OR-NOT
    BitOrNot,
    /// Shift left
    Shl,
    /// Logical shift right
    Shr,
    /// Arithmetic shift right
    SignedShr,
    /// Logical AND
    LogicalAnd,
    /// Logical OR
    LogicalOr,
    /// Equality
    Equal,
    /// Inequality
    NotEqual,
    /// Signed less-than
    Less,
    /// Signed less-or-equal
    LessEq,
    /// Signed greater-than
    Greater,
    /// Signed greater-or-equal
    GreaterEq,
    /// Unsigned less-than
    Below,
    /// Unsigned less-or-equal
    BelowEq,
    /// Unsigned greater-than
    Above,
    /// Unsigned greater-or-equal
    AboveEq,
    /// Ternary choice `a ? b : c`
    Choice,
    /// Parser helper marking the `?` of a ternary; no effect on evaluation
    ChoiceStart,
}

impl ExprOp {
    /// True for the two argument leaf ops
    pub fn is_arg(self) -> bool {
        matches!(self, ExprOp::ArgValue | ExprOp::ArgSymbol)
    }

    /// True for unary operators
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            ExprOp::Negate | ExprOp::BitNot | ExprOp::LogicalNot | ExprOp::Plus
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One expression argument slot
pub enum ExprArg {
    /// A resolved value, possibly relative to a section
    Value {
        /// The value
        value: u64,
        /// `SECTION_ABS` for plain constants
        section: SectionId,
    },
    /// A still-unresolved symbol reference
    Symbol(SymbolId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Destination an expression writes to once it evaluates
pub enum ExprTarget {
    /// Not bound yet
    None,
    /// Write value and section into a symbol
    Symbol(SymbolId),
    /// Write a little-endian byte into a section
    Data8 {
        /// Destination section
        section: SectionId,
        /// Destination offset
        offset: u64,
    },
    /// Write a little-endian 16-bit word into a section
    Data16 {
        /// Destination section
        section: SectionId,
        /// Destination offset
        offset: u64,
    },
    /// Write a little-endian 32-bit word into a section
    Data32 {
        /// Destination section
        section: SectionId,
        /// Destination offset
        offset: u64,
    },
    /// Write a little-endian 64-bit word into a section
    Data64 {
        /// Destination section
        section: SectionId,
        /// Destination offset
        offset: u64,
    },
    /// Update the target field of a code-flow entry
    CodeFlow {
        /// Section owning the entry
        section: SectionId,
        /// Index of the entry in the section's code-flow list
        index: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of a resolution attempt
pub enum EvalOutcome {
    /// The expression reduced to a value
    Value {
        /// The value
        value: u64,
        /// `SECTION_ABS` unless the result is section-relative
        section: SectionId,
    },
    /// Unresolved symbols or unplaced sections remain; try again later
    TryLater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Index of an expression in the expression pool
pub struct ExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// One place inside an expression where a symbol is referenced
pub struct SymOccurrence {
    /// The referencing expression
    pub expr: ExprId,
    /// Index of the argument slot
    pub arg_index: u32,
    /// Index of the `ArgSymbol` operator
    pub op_index: u32,
}

#[derive(Debug, Clone)]
/// An immutable postfix expression bound to an output target
pub struct Expression {
    pub(crate) ops: Vec<ExprOp>,
    pub(crate) args: Vec<ExprArg>,
    pub(crate) op_pos: Vec<LineCol>,
    pub(crate) pos: SourcePos,
    pub(crate) target: ExprTarget,
    pub(crate) sym_occurs: usize,
    pub(crate) rel_sym_occurs: usize,
}

impl Expression {
    /// Head source position of the expression
    pub fn pos(&self) -> &SourcePos {
        &self.pos
    }

    /// Number of still-unresolved symbol references
    pub fn sym_occurs(&self) -> usize {
        self.sym_occurs
    }

    /// True when any substituted reference was section-relative
    pub fn has_relative_sym_occurs(&self) -> bool {
        self.rel_sym_occurs != 0
    }

    /// The bound output target
    pub fn target(&self) -> ExprTarget {
        self.target
    }

    /// Number of postfix operators
    pub fn ops_len(&self) -> usize {
        self.ops.len()
    }

    /// Replace the symbol reference at `occurrence` by a concrete value
    pub(crate) fn substitute_occurrence(
        &mut self,
        occurrence: SymOccurrence,
        value: u64,
        section: SectionId,
    ) {
        self.ops[occurrence.op_index as usize] = ExprOp::ArgValue;
        self.args[occurrence.arg_index as usize] = ExprArg::Value { value, section };
        if section != SECTION_ABS {
            self.rel_sym_occurs += 1;
        }
        self.sym_occurs -= 1;
    }

    /// Replace the symbol identity at `occurrence` by another symbol,
    /// without resolving it (used when snapshots alias symbols)
    pub(crate) fn replace_occurrence_symbol(
        &mut self,
        occurrence: SymOccurrence,
        new_symbol: SymbolId,
    ) {
        self.args[occurrence.arg_index as usize] = ExprArg::Symbol(new_symbol);
    }

    fn op_source_pos(&self, op_index: usize) -> SourcePos {
        self.pos.with_line_col(self.op_pos[op_index])
    }
}

#[derive(Debug, Default)]
/// Arena owning all live expressions
pub struct ExprPool {
    slots: Vec<Option<Expression>>,
    free: Vec<u32>,
}

impl ExprPool {
    /// Move an expression into the pool
    pub fn alloc(&mut self, expr: Expression) -> ExprId {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(expr);
            ExprId(slot)
        } else {
            self.slots.push(Some(expr));
            ExprId(self.slots.len() as u32 - 1)
        }
    }

    /// Borrow an expression
    pub fn get(&self, id: ExprId) -> Option<&Expression> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    /// Mutably borrow an expression
    pub fn get_mut(&mut self, id: ExprId) -> Option<&mut Expression> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    /// Drop an expression and recycle its slot
    pub fn release(&mut self, id: ExprId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            if slot.take().is_some() {
                self.free.push(id.0);
            }
        }
    }
}

/// The symbol environment: expression pool, symbol pool and scope tree,
/// plus the single work queue that drives out-of-order resolution
#[derive(Debug, Default)]
pub struct SymbolEnv {
    /// All live expressions
    pub exprs: ExprPool,
    /// All live symbols
    pub symbols: SymbolPool,
    /// The scope tree
    pub scopes: ScopeTree,
    /// Expressions whose evaluation waits for section placement
    pending: Vec<ExprId>,
}

impl SymbolEnv {
    /// Create an environment with one global scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the named symbol via scope resolution, creating it undefined
    /// in the current scope on a full miss
    pub fn get_or_create_symbol(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.scopes.resolve_symbol(name) {
            return id;
        }
        let id = self.symbols.alloc(Symbol::new(name));
        self.scopes.insert_symbol(name, id);
        id
    }

    /// Register the symbol occurrences of a freshly built expression and
    /// hand it to the pool
    pub fn intern_expr(&mut self, expr: Expression) -> ExprId {
        let id = self.exprs.alloc(expr);
        let mut arg_index = 0u32;
        let mut refs = Vec::new();
        if let Some(expr) = self.exprs.get(id) {
            for (op_index, op) in expr.ops.iter().enumerate() {
                if !op.is_arg() {
                    continue;
                }
                if let ExprArg::Symbol(sym) = expr.args[arg_index as usize] {
                    refs.push((
                        sym,
                        SymOccurrence {
                            expr: id,
                            arg_index,
                            op_index: op_index as u32,
                        },
                    ));
                }
                arg_index += 1;
            }
        }
        for (sym, occurrence) in refs {
            if let Some(symbol) = self.symbols.get_mut(sym) {
                symbol.occurrences.push(occurrence);
                symbol.ref_count += 1;
            }
        }
        id
    }

    /// Attach a destination to an expression and resolve immediately when
    /// no symbol references remain. Failed evaluations are reported into
    /// `diags`; incomplete ones stay registered on their symbols.
    pub fn bind_target(
        &mut self,
        expr: ExprId,
        target: ExprTarget,
        sections: &mut [Section],
        diags: &mut Vec<Diagnostic>,
    ) {
        let ready = match self.exprs.get_mut(expr) {
            Some(e) => {
                e.target = target;
                e.sym_occurs == 0
            }
            None => false,
        };
        if ready {
            if let Some(defined) = self.finish_expr(expr, sections, diags) {
                self.propagate(defined, sections, diags);
            }
        }
    }

    /// Try to evaluate `[op_start, op_end)` of an expression. Undefined
    /// symbols and unplaced cross-section differences yield
    /// [`EvalOutcome::TryLater`]; hard failures carry the source position
    /// of the offending operator.
    pub fn try_evaluate(
        &self,
        expr_id: ExprId,
        op_start: usize,
        op_end: usize,
        with_section_diffs: bool,
        sections: &[Section],
    ) -> Result<EvalOutcome, ExprError> {
        let Some(expr) = self.exprs.get(expr_id) else {
            return Ok(EvalOutcome::TryLater);
        };
        let mut arg_pos = expr.ops[..op_start].iter().filter(|op| op.is_arg()).count();
        let mut stack: Vec<(u64, SectionId)> = Vec::new();
        let fail = |i: usize, kind: ExprErrorKind| Err(ExprError::new(expr.op_source_pos(i), kind));
        for i in op_start..op_end {
            let op = expr.ops[i];
            match op {
                ExprOp::ArgValue | ExprOp::ArgSymbol => {
                    let arg = expr.args[arg_pos];
                    arg_pos += 1;
                    match arg {
                        ExprArg::Value { value, section } => stack.push((value, section)),
                        ExprArg::Symbol(sym) => {
                            match self.symbols.get(sym) {
                                Some(s) if s.has_value => stack.push((s.value, s.section)),
                                _ => return Ok(EvalOutcome::TryLater),
                            };
                        }
                    }
                }
                ExprOp::ChoiceStart => {}
                _ if op.is_unary() => {
                    let Some((value, section)) = stack.pop() else {
                        return fail(i, ExprErrorKind::MissingOperand);
                    };
                    if section != SECTION_ABS && op != ExprOp::Plus {
                        return fail(i, ExprErrorKind::CrossSection);
                    }
                    let value = match op {
                        ExprOp::Negate => value.wrapping_neg(),
                        ExprOp::BitNot => !value,
                        ExprOp::LogicalNot => {
                            if value == 0 {
                                u64::MAX
                            } else {
                                0
                            }
                        }
                        _ => value,
                    };
                    stack.push((value, section));
                }
                ExprOp::Choice => {
                    let (Some(on_false), Some(on_true), Some(cond)) =
                        (stack.pop(), stack.pop(), stack.pop())
                    else {
                        return fail(i, ExprErrorKind::MissingOperand);
                    };
                    if cond.1 != SECTION_ABS {
                        return fail(i, ExprErrorKind::CrossSection);
                    }
                    stack.push(if cond.0 != 0 { on_true } else { on_false });
                }
                _ => {
                    let (Some((b, bs)), Some((a, as_))) = (stack.pop(), stack.pop()) else {
                        return fail(i, ExprErrorKind::MissingOperand);
                    };
                    match self.apply_binary(op, (a, as_), (b, bs), with_section_diffs, sections) {
                        Ok(Some(result)) => stack.push(result),
                        Ok(None) => return Ok(EvalOutcome::TryLater),
                        Err(kind) => return fail(i, kind),
                    }
                }
            }
        }
        match stack.pop() {
            Some((value, section)) if stack.is_empty() => Ok(EvalOutcome::Value { value, section }),
            _ => Err(ExprError::new(
                expr.pos.clone(),
                ExprErrorKind::UnexpectedToken,
            )),
        }
    }

    /// Apply one binary operator under the section rules: mixing relative
    /// operands is only meaningful for addition, subtraction and
    /// same-section comparison
    fn apply_binary(
        &self,
        op: ExprOp,
        (a, asec): (u64, SectionId),
        (b, bsec): (u64, SectionId),
        with_section_diffs: bool,
        sections: &[Section],
    ) -> Result<Option<(u64, SectionId)>, ExprErrorKind> {
        use ExprOp::*;
        let both_abs = asec == SECTION_ABS && bsec == SECTION_ABS;
        match op {
            Add => {
                let section = match (asec, bsec) {
                    (SECTION_ABS, s) | (s, SECTION_ABS) => s,
                    _ => return Err(ExprErrorKind::CrossSection),
                };
                return Ok(Some((a.wrapping_add(b), section)));
            }
            Sub => {
                let result = if asec == bsec {
                    (a.wrapping_sub(b), SECTION_ABS)
                } else if bsec == SECTION_ABS {
                    (a.wrapping_sub(b), asec)
                } else if asec == SECTION_ABS {
                    return Err(ExprErrorKind::CrossSection);
                } else if with_section_diffs {
                    let placed = |id: SectionId| {
                        sections
                            .get(id as usize)
                            .and_then(|s| s.rel_space.map(|space| (space, s.rel_address)))
                    };
                    match (placed(asec), placed(bsec)) {
                        (Some((space_a, addr_a)), Some((space_b, addr_b)))
                            if space_a == space_b =>
                        {
                            (
                                a.wrapping_add(addr_a).wrapping_sub(b.wrapping_add(addr_b)),
                                SECTION_ABS,
                            )
                        }
                        (Some(_), Some(_)) => return Err(ExprErrorKind::CrossSection),
                        _ => return Ok(None),
                    }
                } else {
                    return Err(ExprErrorKind::CrossSection);
                };
                return Ok(Some(result));
            }
            Equal | NotEqual | Less | LessEq | Greater | GreaterEq | Below | BelowEq | Above
            | AboveEq => {
                if asec != bsec {
                    return Err(ExprErrorKind::RelativeCompare);
                }
                let truth = match op {
                    Equal => a == b,
                    NotEqual => a != b,
                    Less => (a as i64) < (b as i64),
                    LessEq => (a as i64) <= (b as i64),
                    Greater => (a as i64) > (b as i64),
                    GreaterEq => (a as i64) >= (b as i64),
                    Below => a < b,
                    BelowEq => a <= b,
                    Above => a > b,
                    _ => a >= b,
                };
                return Ok(Some((if truth { u64::MAX } else { 0 }, SECTION_ABS)));
            }
            _ => {}
        }
        if !both_abs {
            return Err(ExprErrorKind::CrossSection);
        }
        let value = match op {
            Mul => a.wrapping_mul(b),
            Div => {
                if b == 0 {
                    return Err(ExprErrorKind::DivisionByZero);
                }
                a / b
            }
            SignedDiv => {
                if b == 0 {
                    return Err(ExprErrorKind::DivisionByZero);
                }
                (a as i64).wrapping_div(b as i64) as u64
            }
            Mod => {
                if b == 0 {
                    return Err(ExprErrorKind::DivisionByZero);
                }
                a % b
            }
            SignedMod => {
                if b == 0 {
                    return Err(ExprErrorKind::DivisionByZero);
                }
                (a as i64).wrapping_rem(b as i64) as u64
            }
            BitAnd => a & b,
            BitOr => a | b,
            BitXor => a ^ b,
            BitOrNot => a | !b,
            Shl | Shr | SignedShr => {
                if b >= 64 {
                    return Err(ExprErrorKind::ShiftOutOfRange { count: b });
                }
                match op {
                    Shl => a << b,
                    Shr => a >> b,
                    _ => ((a as i64) >> b) as u64,
                }
            }
            LogicalAnd => {
                if a != 0 && b != 0 {
                    u64::MAX
                } else {
                    0
                }
            }
            LogicalOr => {
                if a != 0 || b != 0 {
                    u64::MAX
                } else {
                    0
                }
            }
            _ => 0,
        };
        Ok(Some((value, SECTION_ABS)))
    }

    /// Give a symbol its concrete value and drive the resolution chain:
    /// every occurrence is substituted in registration order, completed
    /// expressions are evaluated and their targets written, and symbols
    /// defined along the way continue the chain.
    pub fn define_symbol_value(
        &mut self,
        id: SymbolId,
        value: u64,
        section: SectionId,
        pos: &SourcePos,
        sections: &mut [Section],
        diags: &mut Vec<Diagnostic>,
    ) -> Result<(), ExprError> {
        {
            let Some(sym) = self.symbols.get_mut(id) else {
                return Ok(());
            };
            if sym.has_value && sym.once_defined {
                return Err(ExprError::new(
                    pos.clone(),
                    ExprErrorKind::Redefinition {
                        name: sym.name.to_string(),
                    },
                ));
            }
            if sym.resolving {
                return Err(ExprError::new(
                    pos.clone(),
                    ExprErrorKind::CyclicDefinition {
                        name: sym.name.to_string(),
                    },
                ));
            }
            sym.value = value;
            sym.section = section;
            sym.has_value = true;
            sym.expr = None;
        }
        self.propagate(id, sections, diags);
        Ok(())
    }

    /// Substitute a newly defined symbol into all its referents, then keep
    /// following the chain of definitions that fall out
    fn propagate(
        &mut self,
        start: SymbolId,
        sections: &mut [Section],
        diags: &mut Vec<Diagnostic>,
    ) {
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(sym_id) = queue.pop_front() {
            let (occurrences, value, section) = match self.symbols.get_mut(sym_id) {
                Some(sym) if sym.has_value => {
                    sym.resolving = true;
                    (std::mem::take(&mut sym.occurrences), sym.value, sym.section)
                }
                _ => continue,
            };
            let mut ready = Vec::new();
            for occurrence in occurrences {
                if let Some(expr) = self.exprs.get_mut(occurrence.expr) {
                    expr.substitute_occurrence(occurrence, value, section);
                    if expr.sym_occurs == 0 {
                        ready.push(occurrence.expr);
                    }
                }
                self.unref_symbol(sym_id);
            }
            for expr_id in ready {
                if let Some(next) = self.finish_expr(expr_id, sections, diags) {
                    queue.push_back(next);
                }
            }
            if let Some(sym) = self.symbols.get_mut(sym_id) {
                sym.resolving = false;
            }
        }
    }

    /// Evaluate a complete expression and write its target. Returns the
    /// symbol the target defined, if any, so the caller can continue the
    /// chain.
    fn finish_expr(
        &mut self,
        expr_id: ExprId,
        sections: &mut [Section],
        diags: &mut Vec<Diagnostic>,
    ) -> Option<SymbolId> {
        let (op_count, target, pos) = self
            .exprs
            .get(expr_id)
            .map(|e| (e.ops.len(), e.target, e.pos.clone()))?;
        let outcome = self.try_evaluate(expr_id, 0, op_count, false, sections);
        match outcome {
            Ok(EvalOutcome::Value { value, section }) => {
                self.exprs.release(expr_id);
                self.write_target(target, value, section, &pos, sections, diags)
            }
            Ok(EvalOutcome::TryLater) => {
                self.pending.push(expr_id);
                None
            }
            Err(e) => {
                self.exprs.release(expr_id);
                diags.push(Diagnostic::error(e.pos.clone(), e.kind.to_string()));
                None
            }
        }
    }

    /// Write a resolved value into an expression target. Data and
    /// code-flow targets must be absolute by the time they resolve.
    fn write_target(
        &mut self,
        target: ExprTarget,
        value: u64,
        section: SectionId,
        pos: &SourcePos,
        sections: &mut [Section],
        diags: &mut Vec<Diagnostic>,
    ) -> Option<SymbolId> {
        let mut data = |sections: &mut [Section], sect: SectionId, offset: u64, bytes: &[u8]| {
            if section != SECTION_ABS {
                diags.push(Diagnostic::error(
                    pos.clone(),
                    ExprErrorKind::CrossSection.to_string(),
                ));
            }
            if let Some(s) = sections.get_mut(sect as usize) {
                let _ = s.patch(offset, bytes);
            }
        };
        match target {
            ExprTarget::None => None,
            ExprTarget::Symbol(sym_id) => {
                let defined = match self.symbols.get_mut(sym_id) {
                    Some(sym) if !sym.resolving => {
                        sym.value = value;
                        sym.section = section;
                        sym.has_value = true;
                        sym.expr = None;
                        sym.with_uneval_expr = false;
                        true
                    }
                    Some(sym) => {
                        diags.push(Diagnostic::error(
                            pos.clone(),
                            ExprErrorKind::CyclicDefinition {
                                name: sym.name.to_string(),
                            }
                            .to_string(),
                        ));
                        false
                    }
                    None => false,
                };
                defined.then_some(sym_id)
            }
            ExprTarget::Data8 { section: s, offset } => {
                data(sections, s, offset, &[value as u8]);
                None
            }
            ExprTarget::Data16 { section: s, offset } => {
                data(sections, s, offset, &(value as u16).to_le_bytes());
                None
            }
            ExprTarget::Data32 { section: s, offset } => {
                data(sections, s, offset, &(value as u32).to_le_bytes());
                None
            }
            ExprTarget::Data64 { section: s, offset } => {
                data(sections, s, offset, &value.to_le_bytes());
                None
            }
            ExprTarget::CodeFlow { section: s, index } => {
                if let Some(entry) = sections
                    .get_mut(s as usize)
                    .and_then(|s| s.code_flow.get_mut(index))
                {
                    entry.target = value;
                }
                None
            }
        }
    }

    /// Drop one symbol reference; detached, undefined, unreferenced
    /// symbols are released
    fn unref_symbol(&mut self, id: SymbolId) {
        let release = match self.symbols.get_mut(id) {
            Some(sym) => {
                sym.ref_count = sym.ref_count.saturating_sub(1);
                sym.ref_count == 0 && sym.detached && sym.occurrences.is_empty()
            }
            None => false,
        };
        if release {
            self.symbols.release(id);
        }
    }

    /// Define a symbol by an expression. Resolves immediately when the
    /// expression has no unresolved references, otherwise the symbol
    /// stays pending on them.
    pub fn assign_symbol_expr(
        &mut self,
        id: SymbolId,
        expr: ExprId,
        pos: &SourcePos,
        sections: &mut [Section],
        diags: &mut Vec<Diagnostic>,
    ) -> Result<(), ExprError> {
        {
            let Some(sym) = self.symbols.get_mut(id) else {
                return Ok(());
            };
            if sym.has_value && sym.once_defined {
                return Err(ExprError::new(
                    pos.clone(),
                    ExprErrorKind::Redefinition {
                        name: sym.name.to_string(),
                    },
                ));
            }
            sym.has_value = false;
            sym.expr = Some(expr);
            sym.with_uneval_expr = true;
        }
        self.bind_target(expr, ExprTarget::Symbol(id), sections, diags);
        Ok(())
    }

    /// Define a snapshot symbol: the template expression is cloned with
    /// every already-defined reference frozen to its current value and
    /// every undefined reference aliased through a fresh detached symbol
    /// that captures the referent's first definition. Later redefinitions
    /// of any referenced name leave the snapshot untouched.
    pub fn define_eqv(
        &mut self,
        name: &str,
        template: ExprId,
        pos: &SourcePos,
        sections: &mut [Section],
        diags: &mut Vec<Diagnostic>,
    ) -> Result<SymbolId, ExprError> {
        let snap_id = self.get_or_create_symbol(name);
        {
            let Some(sym) = self.symbols.get_mut(snap_id) else {
                return Ok(snap_id);
            };
            if sym.is_defined() {
                return Err(ExprError::new(
                    pos.clone(),
                    ExprErrorKind::Redefinition {
                        name: name.to_string(),
                    },
                ));
            }
            sym.snapshot = true;
            sym.base = true;
            sym.once_defined = true;
        }
        let (ops, mut args, op_pos, head) = match self.exprs.get(template) {
            Some(e) => (
                e.ops.clone(),
                e.args.clone(),
                e.op_pos.clone(),
                e.pos.clone(),
            ),
            None => return Ok(snap_id),
        };
        let mut bridges = Vec::new();
        for arg in &mut args {
            let ExprArg::Symbol(orig) = *arg else {
                continue;
            };
            let frozen = self
                .symbols
                .get(orig)
                .and_then(|s| s.has_value.then_some((s.value, s.section)));
            match frozen {
                Some((value, section)) => *arg = ExprArg::Value { value, section },
                None => {
                    let mut capture =
                        Symbol::new(&format!(".eqv.{}.{}", name, bridges.len()));
                    capture.detached = true;
                    capture.snapshot = true;
                    capture.ref_count = 0;
                    let capture_id = self.symbols.alloc(capture);
                    bridges.push((orig, capture_id));
                    *arg = ExprArg::Symbol(capture_id);
                }
            }
        }
        let sym_occurs = args
            .iter()
            .filter(|a| matches!(a, ExprArg::Symbol(_)))
            .count();
        let rel_sym_occurs = args
            .iter()
            .filter(|a| matches!(a, ExprArg::Value { section, .. } if *section != SECTION_ABS))
            .count();
        self.release_expr_occurrences(template);
        self.exprs.release(template);
        for &(orig, capture) in &bridges {
            let bridge = Expression {
                ops: vec![ExprOp::ArgSymbol],
                args: vec![ExprArg::Symbol(orig)],
                op_pos: vec![LineCol {
                    line: pos.line,
                    col: pos.col,
                }],
                pos: pos.clone(),
                target: ExprTarget::Symbol(capture),
                sym_occurs: 1,
                rel_sym_occurs: 0,
            };
            self.intern_expr(bridge);
        }
        let ready = sym_occurs == 0;
        let clone_id = self.intern_expr(Expression {
            ops,
            args,
            op_pos,
            pos: head,
            target: ExprTarget::Symbol(snap_id),
            sym_occurs,
            rel_sym_occurs,
        });
        if let Some(sym) = self.symbols.get_mut(snap_id) {
            sym.expr = Some(clone_id);
            sym.with_uneval_expr = true;
        }
        if ready {
            if let Some(defined) = self.finish_expr(clone_id, sections, diags) {
                self.propagate(defined, sections, diags);
            }
        }
        Ok(snap_id)
    }

    /// Append further postfix operators (and the argument slots the
    /// arg-ops among them consume, in order) to an interned expression.
    /// Existing occurrence indices stay valid because the arrays only
    /// grow.
    pub fn append_postfix(&mut self, expr: ExprId, ops: &[ExprOp], args: &[ExprArg], pos: LineCol) {
        if let Some(e) = self.exprs.get_mut(expr) {
            for &op in ops {
                e.ops.push(op);
                e.op_pos.push(pos);
            }
            for &arg in args {
                if let ExprArg::Value { section, .. } = arg {
                    if section != SECTION_ABS {
                        e.rel_sym_occurs += 1;
                    }
                }
                e.args.push(arg);
            }
        }
    }

    /// Unregister an expression's symbol occurrences before dropping it
    fn release_expr_occurrences(&mut self, expr_id: ExprId) {
        let Some(expr) = self.exprs.get(expr_id) else {
            return;
        };
        let referenced: Vec<SymbolId> = expr
            .args
            .iter()
            .filter_map(|arg| match arg {
                ExprArg::Symbol(sym) => Some(*sym),
                _ => None,
            })
            .collect();
        for sym_id in referenced {
            if let Some(sym) = self.symbols.get_mut(sym_id) {
                sym.occurrences.retain(|occ| occ.expr != expr_id);
            }
            self.unref_symbol(sym_id);
        }
    }

    /// End-of-pass resolution: retry pending expressions with section
    /// differences enabled, now that layout has placed the sections
    pub fn resolve_pending(&mut self, sections: &mut [Section], diags: &mut Vec<Diagnostic>) {
        let pending = std::mem::take(&mut self.pending);
        for expr_id in pending {
            let Some(expr) = self.exprs.get(expr_id) else {
                continue;
            };
            let (op_count, target, pos) = (expr.ops.len(), expr.target, expr.pos.clone());
            match self.try_evaluate(expr_id, 0, op_count, true, sections) {
                Ok(EvalOutcome::Value { value, section }) => {
                    self.exprs.release(expr_id);
                    self.write_target(target, value, section, &pos, sections, diags);
                }
                Ok(EvalOutcome::TryLater) => {
                    self.exprs.release(expr_id);
                    diags.push(Diagnostic::error(
                        pos,
                        ExprErrorKind::CrossSection.to_string(),
                    ));
                }
                Err(e) => {
                    self.exprs.release(expr_id);
                    diags.push(Diagnostic::error(e.pos.clone(), e.kind.to_string()));
                }
            }
        }
    }

    /// Expressions still waiting for section placement
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Names of symbols that never received a value, for end-of-assembly
    /// undefined-symbol reporting
    pub fn undefined_symbols(&self) -> Vec<&str> {
        self.symbols
            .iter()
            .filter(|sym| !sym.has_value && !sym.occurrences.is_empty())
            .map(|sym| &*sym.name)
            .collect()
    }
}
