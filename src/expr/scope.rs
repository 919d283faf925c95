//! Symbols and the scope tree. Each scope owns three maps (symbols,
//! register variables, child scopes) plus an ordered list of "used"
//! scopes; name resolution walks from the current scope outward through
//! parents and then through the used scopes.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ExprId, SymOccurrence};
use crate::section::{RegVar, RegVarId, SectionId, SECTION_ABS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Index of a symbol in the symbol pool
pub struct SymbolId(pub u32);

#[derive(Debug, Clone)]
/// An assembler symbol
pub struct Symbol {
    /// Interned symbol name
    pub name: Arc<str>,
    /// Number of expressions referencing this symbol
    pub ref_count: u32,
    /// Section the value is relative to; `SECTION_ABS` for absolute
    pub section: SectionId,
    /// ELF symbol info byte
    pub info: u8,
    /// ELF symbol other byte
    pub other: u8,
    /// The value, meaningful once `has_value` is set
    pub value: u64,
    /// ELF symbol size
    pub size: u64,
    /// The symbol has a concrete value
    pub has_value: bool,
    /// Redefinition is an error (labels)
    pub once_defined: bool,
    /// Resolution-in-progress guard for cycle detection
    pub resolving: bool,
    /// Symbol owns its defining expression
    pub base: bool,
    /// Symbol was created by a snapshot definition
    pub snapshot: bool,
    /// Symbol names a contiguous hardware register range; the packed
    /// range lives in `value`
    pub reg_range: bool,
    /// Symbol lives outside every scope map (snapshot captures)
    pub detached: bool,
    /// The defining expression still contains unevaluated subexpressions
    pub with_uneval_expr: bool,
    /// Defining expression, when the value is not known yet
    pub expr: Option<ExprId>,
    /// Every expression node referencing this symbol
    pub occurrences: Vec<SymOccurrence>,
}

impl Symbol {
    /// Create an undefined symbol
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            ref_count: 1,
            section: SECTION_ABS,
            info: 0,
            other: 0,
            value: 0,
            size: 0,
            has_value: false,
            once_defined: false,
            resolving: false,
            base: false,
            snapshot: false,
            reg_range: false,
            detached: false,
            with_uneval_expr: false,
            expr: None,
            occurrences: Vec::new(),
        }
    }

    /// Create a symbol with a known value
    pub fn with_value(name: &str, section: SectionId, value: u64, once_defined: bool) -> Self {
        Self {
            section,
            value,
            has_value: true,
            once_defined,
            ..Self::new(name)
        }
    }

    /// True when the symbol has a value or a defining expression
    pub fn is_defined(&self) -> bool {
        self.has_value || self.expr.is_some()
    }

    /// Drop the value and defining expression
    pub fn undefine(&mut self) {
        self.has_value = false;
        self.expr = None;
        self.base = false;
        self.with_uneval_expr = false;
    }
}

#[derive(Debug, Default)]
/// Arena owning all live symbols
pub struct SymbolPool {
    slots: Vec<Option<Symbol>>,
    free: Vec<u32>,
}

impl SymbolPool {
    /// Move a symbol into the pool
    pub fn alloc(&mut self, symbol: Symbol) -> SymbolId {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(symbol);
            SymbolId(slot)
        } else {
            self.slots.push(Some(symbol));
            SymbolId(self.slots.len() as u32 - 1)
        }
    }

    /// Borrow a symbol
    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    /// Mutably borrow a symbol
    pub fn get_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    /// Drop a symbol and recycle its slot
    pub fn release(&mut self, id: SymbolId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            if slot.take().is_some() {
                self.free.push(id.0);
            }
        }
    }

    /// Iterate over live symbols
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Index of a scope in the scope tree
pub struct ScopeId(pub u32);

#[derive(Debug, Default)]
/// A node of the scope tree
pub struct Scope {
    /// Parent scope; `None` only for the global scope
    pub parent: Option<ScopeId>,
    /// Symbols declared in this scope
    pub symbols: HashMap<Arc<str>, SymbolId>,
    /// Register variables declared in this scope
    pub regvars: HashMap<Arc<str>, RegVarId>,
    /// Named child scopes
    pub children: HashMap<Arc<str>, ScopeId>,
    /// Anonymous inner block, dropped on close
    pub temporary: bool,
    /// Next value an enumeration directive will assign
    pub enum_count: u64,
    used_slots: Vec<Option<ScopeId>>,
    used_index: HashMap<ScopeId, usize>,
}

impl Scope {
    /// Make `scope`'s names visible here. A scope already in use moves to
    /// the end of the lookup order.
    pub fn start_using(&mut self, scope: ScopeId) {
        self.stop_using(scope);
        self.used_index.insert(scope, self.used_slots.len());
        self.used_slots.push(Some(scope));
    }

    /// Remove `scope` from the used list in O(1)
    pub fn stop_using(&mut self, scope: ScopeId) {
        if let Some(slot) = self.used_index.remove(&scope) {
            self.used_slots[slot] = None;
        }
    }

    /// Remove every used scope
    pub fn stop_using_all(&mut self) {
        self.used_slots.clear();
        self.used_index.clear();
    }

    /// Used scopes in insertion order
    pub fn used_scopes(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.used_slots.iter().filter_map(|s| *s)
    }
}

#[derive(Debug)]
/// The scope tree plus the register-variable pool
pub struct ScopeTree {
    scopes: Vec<Scope>,
    current: ScopeId,
    regvar_pool: Vec<RegVar>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self {
            scopes: vec![Scope::default()],
            current: ScopeId(0),
            regvar_pool: Vec::new(),
        }
    }
}

impl ScopeTree {
    /// The global scope
    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    /// The scope names currently resolve in
    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Borrow a scope node
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// Mutably borrow a scope node
    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    /// Mutably borrow the current scope
    pub fn current_scope_mut(&mut self) -> &mut Scope {
        self.scope_mut(self.current)
    }

    /// Enter a scope: a named scope is found or created under the current
    /// one, an anonymous scope is temporary
    pub fn open_scope(&mut self, name: Option<&str>) -> ScopeId {
        let id = match name {
            Some(name) => {
                if let Some(&existing) = self.scope(self.current).children.get(name) {
                    self.current = existing;
                    return existing;
                }
                let id = ScopeId(self.scopes.len() as u32);
                self.scopes.push(Scope {
                    parent: Some(self.current),
                    ..Scope::default()
                });
                self.scope_mut(self.current)
                    .children
                    .insert(Arc::from(name), id);
                id
            }
            None => {
                let id = ScopeId(self.scopes.len() as u32);
                self.scopes.push(Scope {
                    parent: Some(self.current),
                    temporary: true,
                    ..Scope::default()
                });
                id
            }
        };
        self.current = id;
        id
    }

    /// Leave the current scope
    pub fn close_scope(&mut self) {
        if let Some(parent) = self.scope(self.current).parent {
            self.current = parent;
        }
    }

    /// Resolve a symbol name: the current scope, its parents, then the
    /// used scopes of each scope along the chain. `::`-separated paths
    /// address scopes explicitly; a leading `::` starts at the global
    /// scope.
    pub fn resolve_symbol(&self, name: &str) -> Option<SymbolId> {
        if name.contains("::") {
            let (scope, last) = self.resolve_path(name)?;
            return self.scope(scope).symbols.get(last).copied();
        }
        let mut walk = Some(self.current);
        while let Some(id) = walk {
            if let Some(&sym) = self.scope(id).symbols.get(name) {
                return Some(sym);
            }
            walk = self.scope(id).parent;
        }
        let mut walk = Some(self.current);
        while let Some(id) = walk {
            for used in self.scope(id).used_scopes() {
                if let Some(&sym) = self.scope(used).symbols.get(name) {
                    return Some(sym);
                }
            }
            walk = self.scope(id).parent;
        }
        None
    }

    /// Resolve a register-variable name through the same scope order
    pub fn resolve_regvar(&self, name: &str) -> Option<RegVarId> {
        let mut walk = Some(self.current);
        while let Some(id) = walk {
            if let Some(&rv) = self.scope(id).regvars.get(name) {
                return Some(rv);
            }
            walk = self.scope(id).parent;
        }
        let mut walk = Some(self.current);
        while let Some(id) = walk {
            for used in self.scope(id).used_scopes() {
                if let Some(&rv) = self.scope(used).regvars.get(name) {
                    return Some(rv);
                }
            }
            walk = self.scope(id).parent;
        }
        None
    }

    /// Walk a `::`-path down to its final scope, returning that scope and
    /// the trailing name
    fn resolve_path<'n>(&self, name: &'n str) -> Option<(ScopeId, &'n str)> {
        let absolute = name.starts_with("::");
        let mut parts = name.trim_start_matches("::").split("::").collect::<Vec<_>>().into_iter();
        let last = parts.next_back()?;
        let mut scope = if absolute { self.global() } else { self.current };
        let mut first = true;
        for part in parts {
            if first && !absolute {
                // the first segment may live anywhere up the chain
                let mut walk = Some(scope);
                let mut found = None;
                while let Some(id) = walk {
                    if let Some(&child) = self.scope(id).children.get(part) {
                        found = Some(child);
                        break;
                    }
                    walk = self.scope(id).parent;
                }
                scope = found?;
            } else {
                scope = *self.scope(scope).children.get(part)?;
            }
            first = false;
        }
        Some((scope, last))
    }

    /// Bind a symbol name in the current scope
    pub fn insert_symbol(&mut self, name: &str, id: SymbolId) {
        self.current_scope_mut().symbols.insert(Arc::from(name), id);
    }

    /// Declare a register variable in the current scope; `None` when the
    /// name is taken
    pub fn insert_regvar(&mut self, name: &str, regvar: RegVar) -> Option<RegVarId> {
        if self.scope(self.current).regvars.contains_key(name) {
            return None;
        }
        let id = self.regvar_pool.len() as RegVarId;
        self.regvar_pool.push(regvar);
        self.current_scope_mut().regvars.insert(Arc::from(name), id);
        Some(id)
    }

    /// Borrow a register variable from the pool
    pub fn regvar(&self, id: RegVarId) -> Option<&RegVar> {
        self.regvar_pool.get(id as usize)
    }

    /// Make `scope`'s names visible in the current scope
    pub fn start_using(&mut self, scope: ScopeId) {
        self.current_scope_mut().start_using(scope);
    }

    /// Stop resolving through `scope` in the current scope
    pub fn stop_using(&mut self, scope: ScopeId) {
        self.current_scope_mut().stop_using(scope);
    }

    /// The next enumeration value of the current scope
    pub fn next_enum_value(&mut self) -> u64 {
        let scope = self.current_scope_mut();
        let value = scope.enum_count;
        scope.enum_count += 1;
        value
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scope_lookup_walks_parents() {
        let mut tree = ScopeTree::default();
        let mut pool = SymbolPool::default();
        let outer = pool.alloc(Symbol::with_value("outer", SECTION_ABS, 10, false));
        tree.insert_symbol("outer", outer);
        tree.open_scope(Some("inner"));
        let shadow = pool.alloc(Symbol::with_value("outer", SECTION_ABS, 20, false));
        tree.insert_symbol("outer", shadow);
        assert_eq!(tree.resolve_symbol("outer"), Some(shadow));
        tree.close_scope();
        assert_eq!(tree.resolve_symbol("outer"), Some(outer));
        assert_eq!(tree.resolve_symbol("inner::outer"), Some(shadow));
        assert_eq!(tree.resolve_symbol("::inner::outer"), Some(shadow));
    }

    #[test]
    fn test_used_scopes_order_and_stop() {
        let mut tree = ScopeTree::default();
        let mut pool = SymbolPool::default();
        let a = tree.open_scope(Some("a"));
        let in_a = pool.alloc(Symbol::with_value("x", SECTION_ABS, 1, false));
        tree.insert_symbol("x", in_a);
        tree.close_scope();
        let b = tree.open_scope(Some("b"));
        let in_b = pool.alloc(Symbol::with_value("x", SECTION_ABS, 2, false));
        tree.insert_symbol("x", in_b);
        tree.close_scope();

        tree.start_using(a);
        tree.start_using(b);
        // earliest used scope wins
        assert_eq!(tree.resolve_symbol("x"), Some(in_a));
        tree.stop_using(a);
        assert_eq!(tree.resolve_symbol("x"), Some(in_b));
        tree.stop_using(b);
        assert_eq!(tree.resolve_symbol("x"), None);
    }

    #[test]
    fn test_enum_counter() {
        let mut tree = ScopeTree::default();
        assert_eq!(tree.next_enum_value(), 0);
        assert_eq!(tree.next_enum_value(), 1);
        tree.open_scope(None);
        assert_eq!(tree.next_enum_value(), 0);
    }
}
