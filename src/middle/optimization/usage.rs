use crate::{
    index::IndexVec,
    middle::ir::{InstructionKind, Operand, Program, VarId},
};

/// How often a variable is read and written by the live instructions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariableUsage {
    pub uses: u32,
    /// The using instruction, meaningful when `uses == 1`
    pub user: Option<usize>,
    pub definitions: u32,
}

impl VariableUsage {
    /// The index of the only instruction reading this variable
    pub fn sole_user(&self) -> Option<usize> {
        if self.uses == 1 { self.user } else { None }
    }
}

/// Use and definition counts for every variable of a program. Constants are
/// never uses, a store through `*v` is a use of `v` and the variables a call
/// preserves are not uses of them.
#[derive(Debug, Clone)]
pub struct Usage {
    variables: IndexVec<VarId, VariableUsage>,
}

impl Usage {
    pub fn analyze(program: &Program) -> Self {
        let mut variables =
            IndexVec::from_elem_n(VariableUsage::default(), program.variables.len());

        let mut record_use = |variable: VarId, index: usize| {
            let usage: &mut VariableUsage = &mut variables[variable];
            usage.uses += 1;
            usage.user.get_or_insert(index);
        };

        for index in program.live_indices() {
            let kind = &program.instructions[index].kind;

            for operand in kind.sources() {
                if let Some(variable) = operand.variable() {
                    record_use(variable, index);
                }
            }

            if let InstructionKind::Assign {
                destination: Operand::Deref(pointer),
                ..
            } = kind
            {
                record_use(*pointer, index);
            }
        }

        for index in program.live_indices() {
            if let Some(variable) = program.instructions[index].kind.defined_variable() {
                variables[variable].definitions += 1;
            }
        }

        Self { variables }
    }
}

impl core::ops::Index<VarId> for Usage {
    type Output = VariableUsage;

    fn index(&self, variable: VarId) -> &Self::Output {
        &self.variables[variable]
    }
}

#[cfg(test)]
mod tests {
    use super::Usage;
    use crate::middle::ir::{ArithmeticOperator, InstructionKind, Operand, Program};

    #[test]
    fn counts_uses_and_definitions() {
        let mut program = Program::default();
        let a = program.new_variable(None);
        let b = program.new_variable(None);
        let p = program.new_variable(None);

        program.push(InstructionKind::Read(a));
        program.push(InstructionKind::Assign {
            destination: Operand::Var(b),
            source: Operand::Const(1),
        });
        let sum = program.push(InstructionKind::Arithmetic {
            operator: ArithmeticOperator::Add,
            destination: b,
            lhs: Operand::Var(a),
            rhs: Operand::Var(a),
        });
        program.push(InstructionKind::Assign {
            destination: Operand::Deref(p),
            source: Operand::Const(0),
        });

        let usage = Usage::analyze(&program);

        assert_eq!(usage[a].uses, 2);
        assert_eq!(usage[a].sole_user(), None);
        assert_eq!(usage[a].definitions, 1);
        assert_eq!(usage[b].uses, 0);
        assert_eq!(usage[b].definitions, 2);
        assert_eq!(usage[p].sole_user(), Some(3));
        assert_eq!(usage[p].definitions, 0);
        assert_eq!(sum, 2);
    }

    #[test]
    fn ignored_instructions_do_not_count() {
        let mut program = Program::default();
        let a = program.new_variable(None);

        program.push(InstructionKind::Read(a));
        let write = program.push(InstructionKind::Write(Operand::Var(a)));
        program.instructions[write].ignore = true;

        let usage = Usage::analyze(&program);

        assert_eq!(usage[a].uses, 0);
        assert_eq!(usage[a].user, None);
    }
}
