//! Scoped name resolution. Symbols live in one arena for the whole
//! compilation; scopes only hold ids into it, so a symbol outlives the block
//! that declared it and later stages can still reach it through the
//! analysis side tables.

use colored::Colorize;

use crate::{
    frontend::intern::InternedSymbol,
    index::{IndexVec, simple_index},
    middle::{
        ir::{LabelId, VarId},
        ty::Type,
    },
};

simple_index! {
    pub struct SymbolId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolState {
    /// A function prototype or a struct tag that was named without a body
    Declared,
    Defined,
}

/// What a symbol lowers to. Set once while generating IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Variable(VarId),
    Function(LabelId),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: InternedSymbol,
    pub line: usize,
    pub ty: Type,
    pub state: SymbolState,
    /// Struct tags name a type, every other symbol names a value
    pub is_struct_tag: bool,
    binding: Option<Binding>,
}

impl Symbol {
    pub fn value(name: InternedSymbol, line: usize, ty: Type, state: SymbolState) -> Self {
        Self {
            name,
            line,
            ty,
            state,
            is_struct_tag: false,
            binding: None,
        }
    }

    pub fn struct_tag(name: InternedSymbol, line: usize, ty: Type, state: SymbolState) -> Self {
        Self {
            is_struct_tag: true,
            ..Self::value(name, line, ty, state)
        }
    }

    pub fn is_function(&self) -> bool {
        !self.is_struct_tag && self.ty.function_signature().is_some()
    }

    pub fn binding(&self) -> Option<Binding> {
        self.binding
    }

    /// Attaches the backend binding. A symbol is only ever bound once, a
    /// second attempt returns the existing binding as the error.
    pub fn bind(&mut self, binding: Binding) -> Result<(), Binding> {
        match self.binding {
            Some(existing) => Err(existing),
            None => {
                self.binding = Some(binding);
                Ok(())
            }
        }
    }
}

impl core::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_struct_tag {
            "struct"
        } else if self.is_function() {
            "fn"
        } else {
            "var"
        };

        let state = match self.state {
            SymbolState::Declared => " (declared)",
            SymbolState::Defined => "",
        };

        write!(
            f,
            "{} {}: {}{} @ line {}",
            kind.magenta(),
            self.name,
            self.ty,
            state,
            self.line
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{name}` is already declared in this scope")]
pub struct Redeclared {
    pub name: InternedSymbol,
    pub existing: SymbolId,
}

/// The scope chain. The global scope always exists and nested scopes are
/// pushed for struct bodies, functions and compound statements. Each scope
/// keeps its symbols in declaration order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: IndexVec<SymbolId, Symbol>,
    global_scope: Vec<SymbolId>,
    stack: Vec<Vec<SymbolId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new struct, function or block scope
    pub fn push_scope(&mut self) {
        self.stack.push(Vec::new());
    }

    /// Destroys the current scope, returning the symbols it declared in
    /// declaration order
    pub fn pop_scope(&mut self) -> Vec<SymbolId> {
        assert!(
            !self.stack.is_empty(),
            "Attempted to pop a scope from the global context"
        );

        self.stack.pop().unwrap_or_default()
    }

    fn current_scope(&self) -> &[SymbolId] {
        self.stack.last().unwrap_or(&self.global_scope)
    }

    fn find_in(&self, scope: &[SymbolId], name: InternedSymbol) -> Option<SymbolId> {
        scope
            .iter()
            .copied()
            .find(|id| self.symbols[*id].name == name)
    }

    /// Adds a symbol to the current scope. Shadowing a symbol of an enclosing
    /// scope is allowed, a second symbol of the same name in the same scope
    /// is not.
    pub fn declare(&mut self, symbol: Symbol) -> Result<SymbolId, Redeclared> {
        if let Some(existing) = self.resolve_local(symbol.name) {
            return Err(Redeclared {
                name: symbol.name,
                existing,
            });
        }

        let id = self.symbols.push(symbol);

        match self.stack.last_mut() {
            Some(scope) => scope.push(id),
            None => self.global_scope.push(id),
        }

        Ok(id)
    }

    /// Declares a symbol in the global scope whatever scope is current
    pub fn declare_global(&mut self, symbol: Symbol) -> Result<SymbolId, Redeclared> {
        if let Some(existing) = self.resolve_global(symbol.name) {
            return Err(Redeclared {
                name: symbol.name,
                existing,
            });
        }

        let id = self.symbols.push(symbol);
        self.global_scope.push(id);

        Ok(id)
    }

    /// Looks for a symbol only within the current (most nested) scope
    pub fn resolve_local(&self, name: InternedSymbol) -> Option<SymbolId> {
        self.find_in(self.current_scope(), name)
    }

    /// Looks for a symbol in the global scope
    pub fn resolve_global(&self, name: InternedSymbol) -> Option<SymbolId> {
        self.find_in(&self.global_scope, name)
    }

    /// Traverses the scope stack from the innermost scope outwards before
    /// checking the global scope
    pub fn resolve(&self, name: InternedSymbol) -> Option<SymbolId> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| self.find_in(scope, name))
            .or_else(|| self.resolve_global(name))
    }

    pub fn global_symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.global_scope.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.enumerate()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl core::ops::Index<SymbolId> for SymbolTable {
    type Output = Symbol;

    fn index(&self, index: SymbolId) -> &Self::Output {
        &self.symbols[index]
    }
}

impl core::ops::IndexMut<SymbolId> for SymbolTable {
    fn index_mut(&mut self, index: SymbolId) -> &mut Self::Output {
        &mut self.symbols[index]
    }
}

#[cfg(test)]
mod tests {
    use super::{Binding, Symbol, SymbolState, SymbolTable};
    use crate::{
        frontend::intern::InternedSymbol,
        index::Index,
        middle::{ir::VarId, ty::TypeContext},
    };

    fn variable(types: &TypeContext, name: &str, line: usize) -> Symbol {
        Symbol::value(
            InternedSymbol::new(name),
            line,
            types.int(),
            SymbolState::Defined,
        )
    }

    #[test]
    fn shadowing_an_outer_scope_is_allowed() {
        let types = TypeContext::new();
        let mut table = SymbolTable::new();
        let x = InternedSymbol::new("x");

        let outer = table.declare(variable(&types, "x", 1)).unwrap();
        table.push_scope();
        let inner = table.declare(variable(&types, "x", 2)).unwrap();

        assert_eq!(table.resolve(x), Some(inner));
        assert_eq!(table.resolve_global(x), Some(outer));

        assert_eq!(table.pop_scope(), vec![inner]);
        assert_eq!(table.resolve(x), Some(outer));
    }

    #[test]
    fn redeclaring_in_the_same_scope_fails() {
        let types = TypeContext::new();
        let mut table = SymbolTable::new();
        table.push_scope();

        let first = table.declare(variable(&types, "y", 1)).unwrap();
        let error = table.declare(variable(&types, "y", 2)).unwrap_err();

        assert_eq!(error.existing, first);
        assert_eq!(table[first].line, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn lookup_falls_through_every_enclosing_scope() {
        let types = TypeContext::new();
        let mut table = SymbolTable::new();

        let global = table.declare(variable(&types, "g", 1)).unwrap();
        table.push_scope();
        table.push_scope();
        table.push_scope();

        let g = InternedSymbol::new("g");
        assert_eq!(table.resolve(g), Some(global));
        assert_eq!(table.resolve_local(g), None);
        assert_eq!(table.resolve(InternedSymbol::new("missing")), None);
    }

    #[test]
    fn scopes_keep_declaration_order() {
        let types = TypeContext::new();
        let mut table = SymbolTable::new();
        table.push_scope();

        let ids = ["c", "a", "b"]
            .iter()
            .map(|name| table.declare(variable(&types, name, 1)).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(table.pop_scope(), ids);
    }

    #[test]
    fn bindings_are_set_once() {
        let types = TypeContext::new();
        let mut symbol = variable(&types, "z", 1);

        assert_eq!(symbol.binding(), None);
        assert!(symbol.bind(Binding::Variable(VarId::new(0))).is_ok());
        assert_eq!(
            symbol.bind(Binding::Variable(VarId::new(1))),
            Err(Binding::Variable(VarId::new(0)))
        );
    }
}
