//! Lowers the checked syntax tree to IR. Control flow becomes branches to
//! fresh labels, arrays and structs are reached through explicit address
//! arithmetic and every call records which variables it has to preserve.

use hashbrown::HashSet;
use tracing::debug;

use crate::{
    frontend::{
        intern::InternedSymbol,
        syntax::{MetaKind, Node, NodeKind, Relop},
    },
    middle::{
        ir::{ArithmeticOperator, InstructionKind, LabelId, Operand, Program, VarId},
        semantics::Analysis,
        symbol::{Binding, SymbolId},
        ty::{Type, WORD_SIZE},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoweringError {
    #[error("Line {line}: floating point values can not be lowered to IR")]
    UnsupportedFloat { line: usize },
    #[error("Line {line}: global variable `{name}` can not be lowered to IR")]
    GlobalVariable { name: InternedSymbol, line: usize },
    #[error("Line {line}: `{name}` has no usable binding")]
    MissingBinding { name: InternedSymbol, line: usize },
    #[error("Line {line}: no semantic information for this {kind} node")]
    MissingAnnotation { kind: &'static str, line: usize },
    #[error("Line {line}: unexpected {kind} node")]
    UnexpectedNode { kind: &'static str, line: usize },
    #[error("Line {line}: the value does not fit in the address space")]
    AggregateTooLarge { line: usize },
}

impl LoweringError {
    fn unexpected(node: &Node) -> Self {
        LoweringError::UnexpectedNode {
            kind: node.kind.name(),
            line: node.line,
        }
    }

    fn missing_annotation(node: &Node) -> Self {
        LoweringError::MissingAnnotation {
            kind: node.kind.name(),
            line: node.line,
        }
    }
}

struct LoweringContext<'analysis> {
    program: Program,
    analysis: &'analysis mut Analysis,
    /// Every variable created for the function being lowered
    function_variables: Vec<VarId>,
    /// Indices of the calls made by the function being lowered
    calls: Vec<usize>,
    /// Variables whose storage was reserved with `DEC`. Their address is
    /// `&v`, every other aggregate variable already holds an address.
    allocated: HashSet<VarId>,
}

/// Lowers a program that passed semantic analysis. Symbols get their
/// backend bindings attached as a side effect, so lowering the same analysis
/// twice requires a fresh copy of it.
pub fn lower_program(tree: &Node, analysis: &mut Analysis) -> Result<Program, LoweringError> {
    let mut context = LoweringContext {
        program: Program::default(),
        analysis,
        function_variables: Vec::new(),
        calls: Vec::new(),
        allocated: HashSet::new(),
    };

    for list in &tree.children {
        for definition in &list.children {
            context.lower_external_definition(definition)?;
        }
    }

    debug!(
        instructions = context.program.instructions.len(),
        variables = context.program.variables.len(),
        labels = context.program.labels.len(),
        "lowered program to IR"
    );

    Ok(context.program)
}

/// The identifier at the bottom of a `VarDec`
fn base_identifier(var_dec: &Node) -> &Node {
    let mut node = var_dec;

    while let [inner, _, _, _] = node.children.as_slice() {
        node = inner;
    }

    node.child(0).unwrap_or(node)
}

fn arithmetic_operator(kind: &NodeKind) -> Option<ArithmeticOperator> {
    match kind {
        NodeKind::Plus => Some(ArithmeticOperator::Add),
        NodeKind::Minus => Some(ArithmeticOperator::Sub),
        NodeKind::Star => Some(ArithmeticOperator::Mul),
        NodeKind::Div => Some(ArithmeticOperator::Div),
        _ => None,
    }
}

impl LoweringContext<'_> {
    fn push(&mut self, kind: InstructionKind) -> usize {
        self.program.push(kind)
    }

    fn new_temporary(&mut self) -> VarId {
        let variable = self.program.new_variable(None);
        self.function_variables.push(variable);
        variable
    }

    fn symbol_of(&self, identifier: &Node) -> Result<SymbolId, LoweringError> {
        self.analysis
            .resolution(identifier)
            .ok_or_else(|| LoweringError::missing_annotation(identifier))
    }

    fn type_of(&self, expression: &Node) -> Result<Type, LoweringError> {
        self.analysis
            .expression_type(expression)
            .cloned()
            .ok_or_else(|| LoweringError::missing_annotation(expression))
    }

    /// Size in bytes of a value of `ty`, which must be addressable with a
    /// signed word
    fn size_of(&self, ty: &Type, line: usize) -> Result<u32, LoweringError> {
        ty.size_of()
            .filter(|size| i32::try_from(*size).is_ok())
            .ok_or(LoweringError::AggregateTooLarge { line })
    }

    /// Creates the variable standing for a declared name
    fn bind_variable(&mut self, identifier: &Node) -> Result<VarId, LoweringError> {
        let id = self.symbol_of(identifier)?;
        let symbol = &mut self.analysis.symbols[id];

        let variable = self.program.new_variable(Some(symbol.name));
        self.function_variables.push(variable);

        symbol
            .bind(Binding::Variable(variable))
            .map_err(|_| LoweringError::MissingBinding {
                name: symbol.name,
                line: identifier.line,
            })?;

        Ok(variable)
    }

    fn variable_of(&self, identifier: &Node) -> Result<VarId, LoweringError> {
        let symbol = &self.analysis.symbols[self.symbol_of(identifier)?];

        match symbol.binding() {
            Some(Binding::Variable(variable)) => Ok(variable),
            _ => Err(LoweringError::MissingBinding {
                name: symbol.name,
                line: identifier.line,
            }),
        }
    }

    /// Function labels are created the first time the function is either
    /// defined or called
    fn function_label(&mut self, identifier: &Node) -> Result<LabelId, LoweringError> {
        let id = self.symbol_of(identifier)?;
        let symbol = &mut self.analysis.symbols[id];

        match symbol.binding() {
            Some(Binding::Function(label)) => Ok(label),
            Some(Binding::Variable(_)) => Err(LoweringError::MissingBinding {
                name: symbol.name,
                line: identifier.line,
            }),
            None => {
                let label = self.program.new_function_label(symbol.name);
                // Unbound, checked above
                let _ = symbol.bind(Binding::Function(label));
                Ok(label)
            }
        }
    }

    fn lower_external_definition(&mut self, definition: &Node) -> Result<(), LoweringError> {
        match definition.children.as_slice() {
            [_, list, _] if list.kind == NodeKind::ExtDecList => match list.child(0) {
                Some(var_dec) => {
                    let identifier = base_identifier(var_dec);
                    Err(LoweringError::GlobalVariable {
                        name: identifier
                            .identifier()
                            .unwrap_or_else(|| InternedSymbol::new("?")),
                        line: var_dec.line,
                    })
                }
                None => Ok(()),
            },
            [_, function, body] if body.kind == NodeKind::CompSt => {
                self.lower_function(function, body)
            }
            _ => Ok(()),
        }
    }

    fn lower_function(&mut self, function: &Node, body: &Node) -> Result<(), LoweringError> {
        let identifier = function
            .child(0)
            .ok_or_else(|| LoweringError::unexpected(function))?;
        let label = self.function_label(identifier)?;

        self.function_variables.clear();
        self.calls.clear();

        self.push(InstructionKind::FunctionEntry(label));

        if let [_, _, parameters, _] = function.children.as_slice() {
            for parameter in &parameters.children {
                let var_dec = parameter
                    .child(1)
                    .ok_or_else(|| LoweringError::unexpected(parameter))?;
                let variable = self.bind_variable(base_identifier(var_dec))?;
                self.push(InstructionKind::Param(variable));
            }
        }

        self.lower_compound_statement(body)?;

        let returns = self
            .program
            .instructions
            .last()
            .is_some_and(|i| matches!(i.kind, InstructionKind::Return(_)));

        if !returns {
            self.push(InstructionKind::Return(Operand::Const(0)));
        }

        let live_across_calls = self.function_variables.clone();

        for index in &self.calls {
            if let InstructionKind::Call { saved, .. } = &mut self.program.instructions[*index].kind
            {
                saved.clone_from(&live_across_calls);
            }
        }

        debug!(
            function = %self.program.label_name(label),
            variables = live_across_calls.len(),
            calls = self.calls.len(),
            "lowered function"
        );

        Ok(())
    }

    fn lower_compound_statement(&mut self, compound: &Node) -> Result<(), LoweringError> {
        let [_, definitions, statements, _] = compound.children.as_slice() else {
            return Err(LoweringError::unexpected(compound));
        };

        for definition in &definitions.children {
            self.lower_local_definition(definition)?;
        }

        for statement in &statements.children {
            self.lower_statement(statement)?;
        }

        Ok(())
    }

    fn lower_local_definition(&mut self, definition: &Node) -> Result<(), LoweringError> {
        let Some(declarations) = definition.child(1) else {
            return Err(LoweringError::unexpected(definition));
        };

        for declaration in &declarations.children {
            let var_dec = declaration
                .child(0)
                .ok_or_else(|| LoweringError::unexpected(declaration))?;
            let identifier = base_identifier(var_dec);

            let ty = self.analysis.symbols[self.symbol_of(identifier)?].ty.clone();
            let variable = self.bind_variable(identifier)?;

            if ty.is_aggregate() {
                let size = self.size_of(&ty, declaration.line)?;
                self.push(InstructionKind::Alloc { variable, size });
                self.allocated.insert(variable);
            }

            let [_, _, value] = declaration.children.as_slice() else {
                continue;
            };

            if ty.is_aggregate() {
                let source = self.lower_value(value)?;
                let size = self
                    .size_of(&ty, value.line)?
                    .min(self.size_of(&self.type_of(value)?, value.line)?);
                self.copy_words(Operand::Ref(variable), source, size);
            } else {
                let value = self.lower_value(value)?;
                self.push(InstructionKind::Assign {
                    destination: Operand::Var(variable),
                    source: value,
                });
            }
        }

        Ok(())
    }

    fn lower_statement(&mut self, statement: &Node) -> Result<(), LoweringError> {
        match statement.children.as_slice() {
            [expression, _] if expression.kind == NodeKind::Exp => {
                self.lower_value(expression)?;
            }
            [compound] => self.lower_compound_statement(compound)?,
            [keyword, value, _] if keyword.kind == NodeKind::Return => {
                let value = self.lower_value(value)?;
                self.push(InstructionKind::Return(value));
            }
            [keyword, _, condition, _, then] if keyword.kind == NodeKind::If => {
                let yes = self.program.new_label();
                let no = self.program.new_label();

                self.lower_condition(condition, yes, no)?;
                self.push(InstructionKind::Label(yes));
                self.lower_statement(then)?;
                self.push(InstructionKind::Label(no));
            }
            [keyword, _, condition, _, then, _, otherwise] if keyword.kind == NodeKind::If => {
                let yes = self.program.new_label();
                let no = self.program.new_label();
                let end = self.program.new_label();

                self.lower_condition(condition, yes, no)?;
                self.push(InstructionKind::Label(yes));
                self.lower_statement(then)?;
                self.push(InstructionKind::Goto(end));
                self.push(InstructionKind::Label(no));
                self.lower_statement(otherwise)?;
                self.push(InstructionKind::Label(end));
            }
            [keyword, _, condition, _, body] if keyword.kind == NodeKind::While => {
                let test = self.program.new_label();
                let start = self.program.new_label();
                let exit = self.program.new_label();

                self.push(InstructionKind::Label(test));
                self.lower_condition(condition, start, exit)?;
                self.push(InstructionKind::Label(start));
                self.lower_statement(body)?;
                self.push(InstructionKind::Goto(test));
                self.push(InstructionKind::Label(exit));
            }
            _ => return Err(LoweringError::unexpected(statement)),
        }

        Ok(())
    }

    /// Emits a jump to `yes` when the expression holds and to `no` otherwise.
    /// The right operand of `&&` and `||` is only evaluated when it decides
    /// the result.
    fn lower_condition(
        &mut self,
        expression: &Node,
        yes: LabelId,
        no: LabelId,
    ) -> Result<(), LoweringError> {
        match expression.children.as_slice() {
            [open, inner, _] if open.kind == NodeKind::Lp => {
                return self.lower_condition(inner, yes, no);
            }
            [operator, operand] if operator.kind == NodeKind::Not => {
                return self.lower_condition(operand, no, yes);
            }
            [lhs, operator, rhs] => match operator.kind {
                NodeKind::Relop(relop) => {
                    let lhs = self.lower_value(lhs)?;
                    let rhs = self.lower_value(rhs)?;

                    self.push(InstructionKind::Branch {
                        relop,
                        lhs,
                        rhs,
                        target: yes,
                    });
                    self.push(InstructionKind::Goto(no));
                    return Ok(());
                }
                NodeKind::And => {
                    let middle = self.program.new_label();
                    self.lower_condition(lhs, middle, no)?;
                    self.push(InstructionKind::Label(middle));
                    return self.lower_condition(rhs, yes, no);
                }
                NodeKind::Or => {
                    let middle = self.program.new_label();
                    self.lower_condition(lhs, yes, middle)?;
                    self.push(InstructionKind::Label(middle));
                    return self.lower_condition(rhs, yes, no);
                }
                _ => {}
            },
            _ => {}
        }

        let value = self.lower_value(expression)?;

        self.push(InstructionKind::Branch {
            relop: Relop::Ne,
            lhs: value,
            rhs: Operand::Const(0),
            target: yes,
        });
        self.push(InstructionKind::Goto(no));

        Ok(())
    }

    /// Lowers an expression to an operand holding its value. Arrays and
    /// structs are represented by their address.
    fn lower_value(&mut self, expression: &Node) -> Result<Operand, LoweringError> {
        let ty = self.type_of(expression)?;

        if ty.is_meta(MetaKind::Float) {
            return Err(LoweringError::UnsupportedFloat {
                line: expression.line,
            });
        }

        match expression.children.as_slice() {
            [literal] => match literal.kind {
                NodeKind::Int(value) => Ok(Operand::Const(value)),
                NodeKind::Id(_) => self.lower_variable(literal, &ty),
                NodeKind::Float(_) => Err(LoweringError::UnsupportedFloat {
                    line: literal.line,
                }),
                _ => Err(LoweringError::unexpected(literal)),
            },

            [operator, operand] if operator.kind == NodeKind::Minus => {
                let value = self.lower_value(operand)?;
                let destination = self.new_temporary();

                self.push(InstructionKind::Arithmetic {
                    operator: ArithmeticOperator::Sub,
                    destination,
                    lhs: Operand::Const(0),
                    rhs: value,
                });

                Ok(Operand::Var(destination))
            }
            [operator, _] if operator.kind == NodeKind::Not => self.materialize(expression),

            [open, inner, _] if open.kind == NodeKind::Lp => self.lower_value(inner),
            [callee, open, _] if open.kind == NodeKind::Lp => self.lower_call(callee, &[]),
            [callee, _, arguments, _] if callee.kind != NodeKind::Exp => {
                self.lower_call(callee, &arguments.children)
            }

            [_, operator, _] | [_, operator, _, _]
                if matches!(operator.kind, NodeKind::Dot | NodeKind::Lb) =>
            {
                let address = self.lower_address(expression)?;

                if ty.is_aggregate() {
                    return Ok(address);
                }

                let pointer = self.pointer(address);
                let destination = self.new_temporary();

                self.push(InstructionKind::Assign {
                    destination: Operand::Var(destination),
                    source: Operand::Deref(pointer),
                });

                Ok(Operand::Var(destination))
            }

            [lhs, operator, rhs] => match operator.kind {
                NodeKind::AssignOp => self.lower_assignment(lhs, rhs),
                NodeKind::Relop(_) | NodeKind::And | NodeKind::Or => self.materialize(expression),
                ref kind => {
                    let operator =
                        arithmetic_operator(kind).ok_or_else(|| LoweringError::unexpected(expression))?;

                    let lhs = self.lower_value(lhs)?;
                    let rhs = self.lower_value(rhs)?;
                    let destination = self.new_temporary();

                    self.push(InstructionKind::Arithmetic {
                        operator,
                        destination,
                        lhs,
                        rhs,
                    });

                    Ok(Operand::Var(destination))
                }
            },

            _ => Err(LoweringError::unexpected(expression)),
        }
    }

    fn lower_variable(&mut self, identifier: &Node, ty: &Type) -> Result<Operand, LoweringError> {
        let variable = self.variable_of(identifier)?;

        if ty.is_aggregate() && self.allocated.contains(&variable) {
            Ok(Operand::Ref(variable))
        } else {
            Ok(Operand::Var(variable))
        }
    }

    /// Turns a condition into `0` or `1`
    fn materialize(&mut self, expression: &Node) -> Result<Operand, LoweringError> {
        let destination = self.new_temporary();
        let yes = self.program.new_label();
        let no = self.program.new_label();

        self.push(InstructionKind::Assign {
            destination: Operand::Var(destination),
            source: Operand::Const(0),
        });
        self.lower_condition(expression, yes, no)?;
        self.push(InstructionKind::Label(yes));
        self.push(InstructionKind::Assign {
            destination: Operand::Var(destination),
            source: Operand::Const(1),
        });
        self.push(InstructionKind::Label(no));

        Ok(Operand::Var(destination))
    }

    /// Computes the address of an expression that lives in memory
    fn lower_address(&mut self, expression: &Node) -> Result<Operand, LoweringError> {
        match expression.children.as_slice() {
            [identifier] if matches!(identifier.kind, NodeKind::Id(_)) => {
                let variable = self.variable_of(identifier)?;

                if self.allocated.contains(&variable) {
                    Ok(Operand::Ref(variable))
                } else {
                    Ok(Operand::Var(variable))
                }
            }
            [open, inner, _] if open.kind == NodeKind::Lp => self.lower_address(inner),
            [base, open, index, _] if open.kind == NodeKind::Lb => {
                let base = self.lower_address(base)?;
                let stride = self.size_of(&self.type_of(expression)?, expression.line)? as i32;

                let offset = match self.lower_value(index)? {
                    Operand::Const(index) => Operand::Const(index.wrapping_mul(stride)),
                    index => {
                        let scaled = self.new_temporary();
                        self.push(InstructionKind::Arithmetic {
                            operator: ArithmeticOperator::Mul,
                            destination: scaled,
                            lhs: index,
                            rhs: Operand::Const(stride),
                        });
                        Operand::Var(scaled)
                    }
                };

                Ok(self.offset_address(base, offset))
            }
            [base, dot, member] if dot.kind == NodeKind::Dot => {
                let name = member
                    .identifier()
                    .ok_or_else(|| LoweringError::unexpected(member))?;
                let base_type = self.type_of(base)?;
                self.size_of(&base_type, expression.line)?;
                let offset = base_type
                    .offset_of(name)
                    .ok_or_else(|| LoweringError::missing_annotation(member))?;

                let base = self.lower_address(base)?;
                Ok(self.offset_address(base, Operand::Const(offset as i32)))
            }
            // A call returning an aggregate hands back its address
            _ => self.lower_value(expression),
        }
    }

    fn offset_address(&mut self, base: Operand, offset: Operand) -> Operand {
        if offset == Operand::Const(0) {
            return base;
        }

        let destination = self.new_temporary();
        self.push(InstructionKind::Arithmetic {
            operator: ArithmeticOperator::Add,
            destination,
            lhs: base,
            rhs: offset,
        });

        Operand::Var(destination)
    }

    /// A variable holding `address`, suitable for `*v`
    fn pointer(&mut self, address: Operand) -> VarId {
        if let Operand::Var(variable) = address {
            return variable;
        }

        let pointer = self.new_temporary();
        self.push(InstructionKind::Assign {
            destination: Operand::Var(pointer),
            source: address,
        });

        pointer
    }

    /// Copies `size` bytes one word at a time
    fn copy_words(&mut self, destination: Operand, source: Operand, size: u32) {
        for offset in (0..size).step_by(WORD_SIZE as usize) {
            let from = self.offset_address(source, Operand::Const(offset as i32));
            let from = self.pointer(from);
            let to = self.offset_address(destination, Operand::Const(offset as i32));
            let to = self.pointer(to);

            let word = self.new_temporary();
            self.push(InstructionKind::Assign {
                destination: Operand::Var(word),
                source: Operand::Deref(from),
            });
            self.push(InstructionKind::Assign {
                destination: Operand::Deref(to),
                source: Operand::Var(word),
            });
        }
    }

    fn lower_assignment(&mut self, lhs: &Node, rhs: &Node) -> Result<Operand, LoweringError> {
        let ty = self.type_of(lhs)?;

        if ty.is_aggregate() {
            let source = self.lower_value(rhs)?;
            let destination = self.lower_address(lhs)?;
            let size = self
                .size_of(&ty, lhs.line)?
                .min(self.size_of(&self.type_of(rhs)?, rhs.line)?);

            self.copy_words(destination, source, size);
            return Ok(destination);
        }

        let value = self.lower_value(rhs)?;

        match lhs.children.as_slice() {
            [identifier] => {
                let variable = self.variable_of(identifier)?;
                self.push(InstructionKind::Assign {
                    destination: Operand::Var(variable),
                    source: value,
                });
                Ok(Operand::Var(variable))
            }
            _ => {
                let address = self.lower_address(lhs)?;
                let pointer = self.pointer(address);
                self.push(InstructionKind::Assign {
                    destination: Operand::Deref(pointer),
                    source: value,
                });
                Ok(value)
            }
        }
    }

    /// Arguments are evaluated left to right before any of them is pushed, so
    /// nested calls never interleave their `ARG`s with ours
    fn lower_call(&mut self, callee: &Node, arguments: &[Node]) -> Result<Operand, LoweringError> {
        let values = arguments
            .iter()
            .map(|argument| self.lower_value(argument))
            .collect::<Result<Vec<_>, _>>()?;

        let name = callee
            .identifier()
            .ok_or_else(|| LoweringError::unexpected(callee))?;

        match name.value() {
            "read" => {
                let destination = self.new_temporary();
                self.push(InstructionKind::Read(destination));
                Ok(Operand::Var(destination))
            }
            "write" => {
                for value in values {
                    self.push(InstructionKind::Write(value));
                }
                Ok(Operand::Const(0))
            }
            _ => {
                let function = self.function_label(callee)?;

                for value in values {
                    self.push(InstructionKind::Arg(value));
                }

                let destination = self.new_temporary();
                let index = self.push(InstructionKind::Call {
                    destination,
                    function,
                    saved: Vec::new(),
                });
                self.calls.push(index);

                Ok(Operand::Var(destination))
            }
        }
    }
}

#[cfg(test)]
mod tests;
