//! The three-address intermediate representation. A program is one flat list
//! of instructions covering every function, each introduced by a
//! `FUNCTION f :` entry. Variables and labels are handles into arenas owned
//! by the [`Program`], so redirecting a label through its alias is seen by
//! every instruction that refers to it.
//!
//! Instructions are never removed or reordered once generated. Passes that
//! want an instruction gone set its `ignore` flag instead, which keeps
//! instruction indices stable for the whole optimization.

use crate::{
    frontend::{intern::InternedSymbol, syntax::Relop},
    index::{Index, IndexVec, simple_index},
};

pub mod interpret;
pub mod lowering;
pub mod pretty_print;

simple_index! {
    /// Identifies an IR variable (`t1`, `t2`, ...)
    pub struct VarId;
}

simple_index! {
    /// Identifies an IR label. Function entry points are labels too.
    pub struct LabelId;
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub variables: IndexVec<VarId, Variable>,
    pub labels: IndexVec<LabelId, Label>,
    pub instructions: Vec<Instruction>,
    local_label_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Source variable this temporary stands for, if any
    pub name: Option<InternedSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: LabelName,
    /// Set when this label was merged into another one. Every reference to
    /// this label is then a reference to the alias.
    pub alias: Option<LabelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelName {
    Local(u32),
    Function(InternedSymbol),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub ignore: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Var(VarId),
    Const(i32),
    /// Address of a variable's storage
    Ref(VarId),
    /// The word stored at the address held by a variable
    Deref(VarId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ArithmeticOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    Label(LabelId),
    FunctionEntry(LabelId),
    Assign {
        destination: Operand,
        source: Operand,
    },
    Arithmetic {
        operator: ArithmeticOperator,
        destination: VarId,
        lhs: Operand,
        rhs: Operand,
    },
    Goto(LabelId),
    Branch {
        relop: Relop,
        lhs: Operand,
        rhs: Operand,
        target: LabelId,
    },
    Return(Operand),
    Alloc {
        variable: VarId,
        size: u32,
    },
    Arg(Operand),
    Call {
        destination: VarId,
        function: LabelId,
        /// Variables of the calling function that must survive the call
        saved: Vec<VarId>,
    },
    Param(VarId),
    Read(VarId),
    Write(Operand),
}

impl Operand {
    /// The variable this operand mentions, if any
    pub fn variable(&self) -> Option<VarId> {
        match *self {
            Operand::Var(v) | Operand::Ref(v) | Operand::Deref(v) => Some(v),
            Operand::Const(_) => None,
        }
    }
}

impl ArithmeticOperator {
    /// Two's complement arithmetic. Division truncates toward zero and a
    /// division by zero yields zero.
    pub fn evaluate(self, lhs: i32, rhs: i32) -> i32 {
        match self {
            ArithmeticOperator::Add => lhs.wrapping_add(rhs),
            ArithmeticOperator::Sub => lhs.wrapping_sub(rhs),
            ArithmeticOperator::Mul => lhs.wrapping_mul(rhs),
            ArithmeticOperator::Div if rhs == 0 => 0,
            ArithmeticOperator::Div => lhs.wrapping_div(rhs),
        }
    }
}

impl InstructionKind {
    /// The variable this instruction writes as a whole. Stores through a
    /// pointer do not count as a definition of the pointer.
    pub fn defined_variable(&self) -> Option<VarId> {
        match self {
            InstructionKind::Assign {
                destination: Operand::Var(v),
                ..
            }
            | InstructionKind::Arithmetic { destination: v, .. }
            | InstructionKind::Alloc { variable: v, .. }
            | InstructionKind::Call { destination: v, .. }
            | InstructionKind::Param(v)
            | InstructionKind::Read(v) => Some(*v),
            _ => None,
        }
    }

    /// Operands read by this instruction. The destination of a store through
    /// a pointer is not included here even though it reads the pointer.
    pub fn sources(&self) -> Vec<&Operand> {
        match self {
            InstructionKind::Assign { source, .. } => vec![source],
            InstructionKind::Arithmetic { lhs, rhs, .. }
            | InstructionKind::Branch { lhs, rhs, .. } => vec![lhs, rhs],
            InstructionKind::Return(value)
            | InstructionKind::Arg(value)
            | InstructionKind::Write(value) => vec![value],
            _ => Vec::new(),
        }
    }

    pub fn sources_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            InstructionKind::Assign { source, .. } => vec![source],
            InstructionKind::Arithmetic { lhs, rhs, .. }
            | InstructionKind::Branch { lhs, rhs, .. } => vec![lhs, rhs],
            InstructionKind::Return(value)
            | InstructionKind::Arg(value)
            | InstructionKind::Write(value) => vec![value],
            _ => Vec::new(),
        }
    }

    /// Whether this instruction starts a new region that control can enter
    /// from somewhere other than the previous instruction
    pub fn is_entry_point(&self) -> bool {
        matches!(
            self,
            InstructionKind::Label(_) | InstructionKind::FunctionEntry(_)
        )
    }

    /// Whether this instruction may write memory other than whole variables
    pub fn writes_memory(&self) -> bool {
        matches!(
            self,
            InstructionKind::Assign {
                destination: Operand::Deref(_),
                ..
            } | InstructionKind::Call { .. }
        )
    }
}

impl Program {
    pub fn new_variable(&mut self, name: Option<InternedSymbol>) -> VarId {
        self.variables.push(Variable { name })
    }

    pub fn new_label(&mut self) -> LabelId {
        self.local_label_count += 1;
        self.labels.push(Label {
            name: LabelName::Local(self.local_label_count),
            alias: None,
        })
    }

    pub fn new_function_label(&mut self, name: InternedSymbol) -> LabelId {
        self.labels.push(Label {
            name: LabelName::Function(name),
            alias: None,
        })
    }

    pub fn push(&mut self, kind: InstructionKind) -> usize {
        self.instructions.push(Instruction {
            kind,
            ignore: false,
        });
        self.instructions.len() - 1
    }

    /// Follows the alias chain of a label to the label that stands for it
    pub fn resolve_label(&self, mut label: LabelId) -> LabelId {
        // A label is only aliased onto a label that is still placed, and
        // placed labels are never aliased, so the chain is finite
        while let Some(alias) = self.labels[label].alias {
            label = alias;
        }

        label
    }

    pub fn label_name(&self, label: LabelId) -> LabelName {
        self.labels[self.resolve_label(label)].name
    }

    /// Indices of the instructions that were not ignored, in order
    pub fn live_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.ignore)
            .map(|(index, _)| index)
    }

    pub fn live_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().filter(|i| !i.ignore)
    }

    /// Index of the next instruction after `index` that was not ignored
    pub fn next_live(&self, index: usize) -> Option<usize> {
        (index + 1..self.instructions.len()).find(|i| !self.instructions[*i].ignore)
    }

    /// Index of the closest instruction before `index` that was not ignored
    pub fn previous_live(&self, index: usize) -> Option<usize> {
        (0..index).rev().find(|i| !self.instructions[*i].ignore)
    }

    pub fn live_count(&self) -> usize {
        self.live_instructions().count()
    }
}

impl core::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.index() + 1)
    }
}

impl core::fmt::Display for LabelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelName::Local(n) => write!(f, "l{n}"),
            LabelName::Function(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ArithmeticOperator, InstructionKind, Operand, Program};
    use crate::frontend::intern::InternedSymbol;

    #[test]
    fn label_aliases_are_followed() {
        let mut program = Program::default();
        let main = program.new_function_label(InternedSymbol::new("main"));
        let first = program.new_label();
        let second = program.new_label();
        let third = program.new_label();

        program.labels[third].alias = Some(second);
        program.labels[second].alias = Some(first);

        assert_eq!(program.resolve_label(third), first);
        assert_eq!(program.label_name(third).to_string(), "l1");
        assert_eq!(program.label_name(main).to_string(), "main");
    }

    #[test]
    fn arithmetic_wraps_and_guards_division() {
        assert_eq!(ArithmeticOperator::Add.evaluate(i32::MAX, 1), i32::MIN);
        assert_eq!(ArithmeticOperator::Div.evaluate(7, 0), 0);
        assert_eq!(ArithmeticOperator::Div.evaluate(-7, 2), -3);
        assert_eq!(ArithmeticOperator::Div.evaluate(i32::MIN, -1), i32::MIN);
    }

    #[test]
    fn stores_through_pointers_define_nothing() {
        let mut program = Program::default();
        let pointer = program.new_variable(None);
        let value = program.new_variable(None);

        let store = InstructionKind::Assign {
            destination: Operand::Deref(pointer),
            source: Operand::Var(value),
        };
        let load = InstructionKind::Assign {
            destination: Operand::Var(value),
            source: Operand::Deref(pointer),
        };

        assert_eq!(store.defined_variable(), None);
        assert!(store.writes_memory());
        assert_eq!(load.defined_variable(), Some(value));
        assert!(!load.writes_memory());
    }

    #[test]
    fn live_neighbours_skip_ignored_instructions() {
        let mut program = Program::default();
        let t = program.new_variable(None);

        for value in 0..4 {
            program.push(InstructionKind::Write(Operand::Const(value)));
        }
        program.push(InstructionKind::Read(t));
        program.instructions[1].ignore = true;
        program.instructions[2].ignore = true;

        assert_eq!(program.next_live(0), Some(3));
        assert_eq!(program.previous_live(3), Some(0));
        assert_eq!(program.live_indices().collect::<Vec<_>>(), vec![0, 3, 4]);
        assert_eq!(program.next_live(4), None);
    }
}
