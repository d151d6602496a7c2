//! Semantic analysis. The syntax tree is walked once, top down and left to
//! right. Names are resolved against the scope chain, every expression gets a
//! type and every independent error is reported. Results are stored in side
//! tables keyed by syntax node so later stages never need to re-resolve a
//! name.

use hashbrown::HashMap;
use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    frontend::{
        intern::InternedSymbol,
        syntax::{MetaKind, Node, NodeId, NodeKind},
    },
    middle::{
        symbol::{Symbol, SymbolId, SymbolState, SymbolTable},
        ty::{Type, TypeContext, is_arithmetic_pair, types_equal},
    },
};

pub mod error;

pub use error::{SemanticError, SemanticErrorKind};

/// Everything the analyzer learned about a program
#[derive(Debug, Clone)]
pub struct Analysis {
    pub types: TypeContext,
    pub symbols: SymbolTable,
    /// Type of every `Exp` node
    pub expression_types: HashMap<NodeId, Type>,
    /// Symbol of every identifier that declares or names a variable or
    /// function
    pub resolutions: HashMap<NodeId, SymbolId>,
    pub errors: Vec<SemanticError>,
}

impl Analysis {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn expression_type(&self, node: &Node) -> Option<&Type> {
        self.expression_types.get(&node.id)
    }

    pub fn resolution(&self, node: &Node) -> Option<SymbolId> {
        self.resolutions.get(&node.id).copied()
    }

    /// One line per symbol in declaration order
    pub fn symbol_listing(&self) -> String {
        self.symbols
            .iter()
            .map(|(_, symbol)| symbol.to_string())
            .join("\n")
    }
}

/// The result of analyzing a `Specifier`
enum Specifier {
    Type(Type),
    /// `struct Tag` without a body
    StructReference(InternedSymbol),
    /// `struct Tag { ... }`
    StructDefinition(InternedSymbol, Type),
}

/// A `VarDec` with its dimensions folded into its type
struct Declarator<'tree> {
    name: InternedSymbol,
    identifier: &'tree Node,
    line: usize,
    ty: Type,
}

pub struct Analyzer {
    types: TypeContext,
    symbols: SymbolTable,
    expression_types: HashMap<NodeId, Type>,
    resolutions: HashMap<NodeId, SymbolId>,
    errors: Vec<SemanticError>,
    return_type: Option<Type>,
    in_struct: bool,
    anonymous_structs: u32,
}

impl Analyzer {
    pub fn analyze(program: &Node) -> Analysis {
        let mut analyzer = Self {
            types: TypeContext::new(),
            symbols: SymbolTable::new(),
            expression_types: HashMap::new(),
            resolutions: HashMap::new(),
            errors: Vec::new(),
            return_type: None,
            in_struct: false,
            anonymous_structs: 0,
        };

        analyzer.bind_built_ins();
        analyzer.analyze_program(program);

        debug!(
            symbols = analyzer.symbols.len(),
            errors = analyzer.errors.len(),
            "semantic analysis finished"
        );

        Analysis {
            types: analyzer.types,
            symbols: analyzer.symbols,
            expression_types: analyzer.expression_types,
            resolutions: analyzer.resolutions,
            errors: analyzer.errors,
        }
    }

    /// `int read()` and `write(int)` are always in the global scope
    fn bind_built_ins(&mut self) {
        let int = self.types.int();

        let unit = self.types.unit();
        let read = self.types.function(Vec::new(), int.clone());
        let write = self.types.function(vec![int], unit);

        for (name, ty) in [("read", read), ("write", write)] {
            let symbol = Symbol::value(InternedSymbol::new(name), 0, ty, SymbolState::Defined);
            // The global scope is empty at this point
            let _ = self.symbols.declare(symbol);
        }
    }

    fn report(&mut self, line: usize, kind: SemanticErrorKind) {
        trace!(line, %kind, "semantic error");
        self.errors.push(SemanticError { kind, line });
    }

    fn analyze_program(&mut self, program: &Node) {
        for list in &program.children {
            for definition in &list.children {
                self.analyze_external_definition(definition);
            }
        }

        // Every prototype needs a body somewhere in the program
        let undefined = self
            .symbols
            .global_symbols()
            .filter(|id| {
                let symbol = &self.symbols[*id];
                symbol.is_function() && symbol.state == SymbolState::Declared
            })
            .collect::<Vec<_>>();

        for id in undefined {
            let symbol = &self.symbols[id];
            let (line, name) = (symbol.line, symbol.name);
            self.report(line, SemanticErrorKind::DeclaredButNotDefined(name));
        }
    }

    fn analyze_external_definition(&mut self, definition: &Node) {
        let [specifier, rest @ ..] = definition.children.as_slice() else {
            return;
        };

        let specifier = self.analyze_specifier(specifier, definition.line);

        match rest {
            [list, _] if list.kind == NodeKind::ExtDecList => {
                let ty = self.specifier_type(specifier, definition.line);

                for var_dec in &list.children {
                    let declarator = self.analyze_declarator(var_dec, &ty);
                    self.declare_variable(declarator, false);
                }
            }
            [function, body] if function.kind == NodeKind::FunDec => {
                let ret = self.specifier_type(specifier, definition.line);
                let body = (body.kind == NodeKind::CompSt).then_some(body);
                self.analyze_function(function, ret, body);
            }
            _ => {}
        }
    }

    /// Resolves a `Specifier` node. Struct tags seen with a body are declared
    /// or completed here, a bare `struct Tag` that names nothing yet is
    /// declared so a later body can complete it.
    fn analyze_specifier(&mut self, specifier: &Node, line: usize) -> Specifier {
        let Some(child) = specifier.child(0) else {
            return Specifier::Type(self.types.never());
        };

        match child.kind {
            NodeKind::Type(meta) => Specifier::Type(self.types.intern_meta(meta)),
            NodeKind::StructSpecifier => {
                let specifier = self.analyze_struct_specifier(child);
                self.declare_struct(specifier, line)
            }
            _ => Specifier::Type(self.types.never()),
        }
    }

    /// Like [`Self::analyze_specifier`] but never declares struct tags. Used
    /// for parameters.
    fn analyze_parameter_specifier(&mut self, specifier: &Node) -> Specifier {
        match specifier.child(0) {
            Some(Node {
                kind: NodeKind::Type(meta),
                ..
            }) => Specifier::Type(self.types.intern_meta(*meta)),
            Some(child) if child.kind == NodeKind::StructSpecifier => {
                self.analyze_struct_specifier(child)
            }
            _ => Specifier::Type(self.types.never()),
        }
    }

    fn analyze_struct_specifier(&mut self, node: &Node) -> Specifier {
        match node.children.as_slice() {
            [_, tag] => match tag.child(0).and_then(Node::identifier) {
                Some(name) => Specifier::StructReference(name),
                None => Specifier::Type(self.types.never()),
            },
            [_, opt_tag, _, definitions, _] => {
                let tag = match opt_tag.child(0).and_then(Node::identifier) {
                    Some(name) => name,
                    None => {
                        self.anonymous_structs += 1;
                        InternedSymbol::new(&format!("@STRUCT{}", self.anonymous_structs))
                    }
                };

                self.symbols.push_scope();
                let was_in_struct = std::mem::replace(&mut self.in_struct, true);

                for definition in &definitions.children {
                    self.analyze_local_definition(definition);
                }

                self.in_struct = was_in_struct;
                let members = self
                    .symbols
                    .pop_scope()
                    .into_iter()
                    .map(|id| &self.symbols[id])
                    .map(|symbol| (symbol.name, symbol.ty.clone()))
                    .collect();

                let ty = self.types.structure(tag, members);
                Specifier::StructDefinition(tag, ty)
            }
            _ => Specifier::Type(self.types.never()),
        }
    }

    /// Records a struct tag. Tags always live in the global scope, wherever
    /// the struct is written.
    fn declare_struct(&mut self, specifier: Specifier, line: usize) -> Specifier {
        let (tag, body) = match &specifier {
            Specifier::Type(_) => None,
            Specifier::StructReference(tag) => Some((*tag, None)),
            Specifier::StructDefinition(tag, ty) => Some((*tag, Some(ty.clone()))),
        }
        .unzip();

        let (Some(tag), Some(body)) = (tag, body) else {
            return specifier;
        };

        let Some(existing) = self.symbols.resolve_global(tag) else {
            let symbol = match body {
                Some(ty) => Symbol::struct_tag(tag, line, ty, SymbolState::Defined),
                None => {
                    let empty = self.types.structure(tag, Vec::new());
                    Symbol::struct_tag(tag, line, empty, SymbolState::Declared)
                }
            };

            let _ = self.symbols.declare_global(symbol);
            return specifier;
        };

        let existing = &mut self.symbols[existing];

        if !existing.is_struct_tag {
            self.report(line, SemanticErrorKind::RedefinedStruct(tag));
            return Specifier::Type(self.types.never());
        }

        match (existing.state, body) {
            (SymbolState::Defined, Some(_)) => {
                let ty = existing.ty.clone();
                self.report(line, SemanticErrorKind::RedefinedStruct(tag));
                Specifier::StructDefinition(tag, ty)
            }
            (SymbolState::Declared, Some(ty)) => {
                existing.ty = ty;
                existing.state = SymbolState::Defined;
                specifier
            }
            (_, None) => specifier,
        }
    }

    /// The type a specifier gives to the variables declared with it. Naming a
    /// struct that has no body yet is an error.
    fn specifier_type(&mut self, specifier: Specifier, line: usize) -> Type {
        match specifier {
            Specifier::Type(ty) | Specifier::StructDefinition(_, ty) => ty,
            Specifier::StructReference(tag) => {
                let defined = self
                    .symbols
                    .resolve_global(tag)
                    .map(|id| &self.symbols[id])
                    .filter(|symbol| symbol.is_struct_tag && symbol.state == SymbolState::Defined)
                    .map(|symbol| symbol.ty.clone());

                match defined {
                    Some(ty) => ty,
                    None => {
                        self.report(line, SemanticErrorKind::UndefinedStruct(tag));
                        self.types.never()
                    }
                }
            }
        }
    }

    /// Folds the brackets of a `VarDec` around the base type. `a[2][3]` nests
    /// as `(a[2])[3]`, so lengths are collected innermost first while
    /// descending and reversed once the identifier is reached.
    fn analyze_declarator<'tree>(&mut self, var_dec: &'tree Node, base: &Type) -> Declarator<'tree> {
        let mut lengths = Vec::new();
        let mut node = var_dec;

        while let [inner, _, length, _] = node.children.as_slice() {
            if let NodeKind::Int(length) = length.kind {
                lengths.push(u32::try_from(length).unwrap_or_default());
            }
            node = inner;
        }

        lengths.reverse();

        let identifier = node.child(0).unwrap_or(node);
        let name = identifier
            .identifier()
            .unwrap_or_else(|| InternedSymbol::new("?"));

        Declarator {
            name,
            identifier,
            line: var_dec.line,
            ty: self.types.array_of(base.clone(), &lengths),
        }
    }

    /// Declares a variable, struct member or parameter in the current scope.
    /// A name may not be declared twice in one scope and may not reuse the
    /// name of a struct tag that is in scope.
    fn declare_variable(&mut self, declarator: Declarator, has_initializer: bool) {
        let clashes_with_tag = self
            .symbols
            .resolve(declarator.name)
            .is_some_and(|id| self.symbols[id].is_struct_tag);

        let error = if self.in_struct {
            SemanticErrorKind::InvalidMemberDefinition(declarator.name)
        } else {
            SemanticErrorKind::RedefinedVariable(declarator.name)
        };

        if clashes_with_tag {
            self.report(declarator.line, error);
            return;
        }

        let symbol = Symbol::value(
            declarator.name,
            declarator.line,
            declarator.ty,
            SymbolState::Defined,
        );

        match self.symbols.declare(symbol) {
            Ok(id) => {
                self.resolutions.insert(declarator.identifier.id, id);

                if self.in_struct && has_initializer {
                    self.report(declarator.line, error);
                }
            }
            Err(_) => self.report(declarator.line, error),
        }
    }

    fn analyze_function(&mut self, function: &Node, ret: Type, body: Option<&Node>) {
        let Some(name) = function.child(0).and_then(Node::identifier) else {
            return;
        };

        // Parameter types are needed for the signature before the parameters
        // themselves can be declared
        let parameters = match function.children.as_slice() {
            [_, _, list, _] => list
                .children
                .iter()
                .filter_map(|parameter| match parameter.children.as_slice() {
                    [specifier, var_dec] => {
                        let specifier = self.analyze_parameter_specifier(specifier);
                        let ty = self.specifier_type(specifier, parameter.line);
                        Some(self.analyze_declarator(var_dec, &ty))
                    }
                    _ => None,
                })
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        };

        let signature = self.types.function(
            parameters.iter().map(|p| p.ty.clone()).collect(),
            ret.clone(),
        );

        let state = match body {
            Some(_) => SymbolState::Defined,
            None => SymbolState::Declared,
        };

        if let Some(id) = self.declare_function(name, function.line, signature, state) {
            if let Some(identifier) = function.child(0) {
                self.resolutions.insert(identifier.id, id);
            }
        }

        self.symbols.push_scope();

        for parameter in parameters {
            self.declare_variable(parameter, false);
        }

        if let Some(body) = body {
            let outer_return = self.return_type.replace(ret);
            self.analyze_compound_statement(body);
            self.return_type = outer_return;
        }

        self.symbols.pop_scope();
    }

    /// Matches a function against earlier declarations of the same name and
    /// returns the symbol that stands for it
    fn declare_function(
        &mut self,
        name: InternedSymbol,
        line: usize,
        signature: Type,
        state: SymbolState,
    ) -> Option<SymbolId> {
        let Some(existing) = self.symbols.resolve_local(name) else {
            let symbol = Symbol::value(name, line, signature, state);
            return self.symbols.declare(symbol).ok();
        };

        let symbol = &mut self.symbols[existing];

        if !symbol.is_function() {
            self.report(line, SemanticErrorKind::RedefinedFunction(name));
            return None;
        }

        match (symbol.state, state) {
            (SymbolState::Defined, SymbolState::Defined) => {
                self.report(line, SemanticErrorKind::RedefinedFunction(name));
            }
            _ if !types_equal(&symbol.ty, &signature, false) => {
                self.report(line, SemanticErrorKind::ConflictingDeclaration(name));
            }
            (SymbolState::Declared, SymbolState::Defined) => {
                symbol.state = SymbolState::Defined;
            }
            _ => {}
        }

        Some(existing)
    }

    /// A `CompSt` that is a function body shares the scope of the parameters.
    /// Any other compound statement opens its own scope.
    fn analyze_compound_statement(&mut self, compound: &Node) {
        let [_, definitions, statements, _] = compound.children.as_slice() else {
            return;
        };

        for definition in &definitions.children {
            self.analyze_local_definition(definition);
        }

        for statement in &statements.children {
            self.analyze_statement(statement);
        }
    }

    fn analyze_local_definition(&mut self, definition: &Node) {
        let [specifier, declarations, _] = definition.children.as_slice() else {
            return;
        };

        let specifier = self.analyze_specifier(specifier, definition.line);
        let ty = self.specifier_type(specifier, definition.line);

        for declaration in &declarations.children {
            match declaration.children.as_slice() {
                [var_dec] => {
                    let declarator = self.analyze_declarator(var_dec, &ty);
                    self.declare_variable(declarator, false);
                }
                [var_dec, _, value] => {
                    let declarator = self.analyze_declarator(var_dec, &ty);
                    let value_type = self.analyze_expression(value);

                    if !self.in_struct && !types_equal(&declarator.ty, &value_type, false) {
                        self.report(declaration.line, SemanticErrorKind::AssignmentMismatch);
                    }

                    self.declare_variable(declarator, true);
                }
                _ => {}
            }
        }
    }

    fn analyze_statement(&mut self, statement: &Node) {
        match statement.children.as_slice() {
            [expression, _] if expression.kind == NodeKind::Exp => {
                self.analyze_expression(expression);
            }
            [compound] => {
                self.symbols.push_scope();
                self.analyze_compound_statement(compound);
                self.symbols.pop_scope();
            }
            [keyword, value, _] if keyword.kind == NodeKind::Return => {
                let ty = self.analyze_expression(value);

                let mismatch = self
                    .return_type
                    .as_ref()
                    .is_some_and(|expected| !types_equal(expected, &ty, false));

                if mismatch {
                    self.report(value.line, SemanticErrorKind::ReturnMismatch);
                }
            }
            [_, _, condition, _, body @ ..] => {
                self.analyze_condition(condition);

                for child in body.iter().filter(|c| c.kind == NodeKind::Stmt) {
                    self.analyze_statement(child);
                }
            }
            _ => {}
        }
    }

    fn analyze_condition(&mut self, condition: &Node) {
        let ty = self.analyze_expression(condition);

        if !ty.is_logical() {
            self.report(condition.line, SemanticErrorKind::OperandMismatch);
        }
    }

    fn analyze_expression(&mut self, expression: &Node) -> Type {
        let ty = self.infer_expression(expression);
        self.expression_types.insert(expression.id, ty.clone());
        ty
    }

    fn infer_expression(&mut self, expression: &Node) -> Type {
        match expression.children.as_slice() {
            [literal] if matches!(literal.kind, NodeKind::Int(_)) => self.types.int(),
            [literal] if matches!(literal.kind, NodeKind::Float(_)) => {
                self.types.intern_meta(MetaKind::Float)
            }
            [identifier] => self.analyze_identifier(identifier, expression.line),

            [operator, operand] => {
                let ty = self.analyze_expression(operand);

                let valid = match operator.kind {
                    NodeKind::Minus => ty.is_arithmetic(),
                    _ => ty.is_logical(),
                };

                if valid {
                    ty
                } else {
                    self.report(operand.line, SemanticErrorKind::OperandMismatch);
                    self.types.never()
                }
            }

            [open, inner, _] if open.kind == NodeKind::Lp => self.analyze_expression(inner),
            [callee, open, _] if open.kind == NodeKind::Lp => {
                self.analyze_call(callee, &[], expression.line)
            }
            [callee, _, arguments, _] if callee.kind != NodeKind::Exp => {
                self.analyze_call(callee, &arguments.children, expression.line)
            }

            [base, dot, member] if dot.kind == NodeKind::Dot => {
                let ty = self.analyze_expression(base);
                let name = member.identifier().unwrap_or_else(|| InternedSymbol::new("?"));

                if !ty.is_memberable() {
                    self.report(expression.line, SemanticErrorKind::NotMemberable);
                    return self.types.never();
                }

                if ty.is_error() {
                    return self.types.never();
                }

                match ty.member(name) {
                    Some(member_type) => member_type.clone(),
                    None => {
                        self.report(member.line, SemanticErrorKind::UndefinedMember(name));
                        self.types.never()
                    }
                }
            }

            [base, _, index, _] => {
                let base_type = self.analyze_expression(base);
                let index_type = self.analyze_expression(index);

                if !index_type.is_logical() {
                    self.report(index.line, SemanticErrorKind::NonIntegerIndex);
                    return self.types.descend(&base_type);
                }

                if !base_type.is_indexable() {
                    self.report(expression.line, SemanticErrorKind::NotIndexable);
                    return self.types.never();
                }

                self.types.descend(&base_type)
            }

            [lhs, operator, rhs] => match operator.kind {
                NodeKind::AssignOp => self.analyze_assignment(expression, lhs, rhs),
                NodeKind::And | NodeKind::Or => {
                    let lhs_type = self.analyze_expression(lhs);
                    let rhs_type = self.analyze_expression(rhs);

                    if !lhs_type.is_logical() {
                        self.report(lhs.line, SemanticErrorKind::OperandMismatch);
                        return self.types.never();
                    }

                    if !rhs_type.is_logical() {
                        self.report(rhs.line, SemanticErrorKind::OperandMismatch);
                        return self.types.never();
                    }

                    self.types.int()
                }
                _ => {
                    let lhs_type = self.analyze_expression(lhs);
                    let rhs_type = self.analyze_expression(rhs);

                    if !lhs_type.is_arithmetic() {
                        self.report(lhs.line, SemanticErrorKind::OperandMismatch);
                        return self.types.never();
                    }

                    if !is_arithmetic_pair(&lhs_type, &rhs_type) {
                        self.report(rhs.line, SemanticErrorKind::OperandMismatch);
                        return self.types.never();
                    }

                    match operator.kind {
                        NodeKind::Relop(_) => self.types.int(),
                        _ if lhs_type.is_error() => rhs_type,
                        _ => lhs_type,
                    }
                }
            },

            _ => self.types.never(),
        }
    }

    fn analyze_identifier(&mut self, identifier: &Node, line: usize) -> Type {
        let Some(name) = identifier.identifier() else {
            return self.types.never();
        };

        let Some(id) = self.symbols.resolve(name) else {
            self.report(line, SemanticErrorKind::UndefinedVariable(name));
            return self.types.never();
        };

        if self.symbols[id].is_struct_tag {
            self.report(line, SemanticErrorKind::OperandMismatch);
            return self.types.never();
        }

        self.resolutions.insert(identifier.id, id);
        self.symbols[id].ty.clone()
    }

    fn analyze_assignment(&mut self, expression: &Node, lhs: &Node, rhs: &Node) -> Type {
        let lhs_type = self.analyze_expression(lhs);
        let rhs_type = self.analyze_expression(rhs);

        if !is_lvalue(lhs) {
            self.report(expression.line, SemanticErrorKind::AssignmentToRvalue);
            return self.types.never();
        }

        if !types_equal(&lhs_type, &rhs_type, false) {
            self.report(expression.line, SemanticErrorKind::AssignmentMismatch);
            return self.types.never();
        }

        lhs_type
    }

    /// Arguments are checked before the callee. An argument mismatch is
    /// reported but the call still has the callee's return type.
    fn analyze_call(&mut self, callee: &Node, arguments: &[Node], line: usize) -> Type {
        let argument_types = arguments
            .iter()
            .map(|argument| self.analyze_expression(argument))
            .collect::<Vec<_>>();

        let Some(name) = callee.identifier() else {
            return self.types.never();
        };

        let Some(id) = self.symbols.resolve(name) else {
            self.report(line, SemanticErrorKind::UndefinedFunction(name));
            return self.types.never();
        };

        let symbol = &self.symbols[id];

        if symbol.is_struct_tag || !symbol.ty.is_callable() {
            self.report(line, SemanticErrorKind::NotCallable);
            return self.types.never();
        }

        let Some((parameters, ret)) = symbol.ty.function_signature() else {
            return self.types.never();
        };

        let (parameters, ret) = (parameters.to_vec(), ret.clone());
        self.resolutions.insert(callee.id, id);

        for ((argument, argument_type), parameter) in
            arguments.iter().zip(&argument_types).zip(&parameters)
        {
            if !types_equal(argument_type, parameter, false) {
                self.report(argument.line, SemanticErrorKind::ArgumentMismatch);
            }
        }

        if arguments.len() != parameters.len() {
            self.report(line, SemanticErrorKind::ArgumentMismatch);
        }

        ret
    }
}

/// Only names, indexing and member accesses can be assigned to
pub fn is_lvalue(expression: &Node) -> bool {
    match expression.children.as_slice() {
        [identifier] => matches!(identifier.kind, NodeKind::Id(_)),
        [_, open, _, _] => open.kind == NodeKind::Lb,
        [_, dot, _] => dot.kind == NodeKind::Dot,
        _ => false,
    }
}
