use colored::Colorize;

use crate::middle::ir::{Instruction, InstructionKind, LabelId, Operand, Program};

/// Borrows the program so labels are printed through their aliases
pub struct DisplayInstruction<'program> {
    program: &'program Program,
    instruction: &'program InstructionKind,
}

impl Program {
    pub fn display<'program>(
        &'program self,
        instruction: &'program Instruction,
    ) -> DisplayInstruction<'program> {
        DisplayInstruction {
            program: self,
            instruction: &instruction.kind,
        }
    }

    /// The textual IR without terminal colors, one instruction per line
    pub fn to_plain_text(&self) -> String {
        strip_ansi_escapes::strip_str(self.to_string())
    }
}

impl core::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{v}"),
            Operand::Const(value) => write!(f, "{}", format!("#{value}").purple()),
            Operand::Ref(v) => write!(f, "&{v}"),
            Operand::Deref(v) => write!(f, "*{v}"),
        }
    }
}

impl core::fmt::Display for DisplayInstruction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = |label: LabelId| {
            self.program
                .label_name(label)
                .to_string()
                .blue()
                .to_string()
        };

        match self.instruction {
            InstructionKind::Label(l) => write!(f, "{} {} :", "LABEL".cyan(), label(*l)),
            InstructionKind::FunctionEntry(l) => {
                write!(f, "{} {} :", "FUNCTION".cyan(), label(*l))
            }
            InstructionKind::Assign {
                destination,
                source,
            } => write!(f, "{destination} := {source}"),
            InstructionKind::Arithmetic {
                operator,
                destination,
                lhs,
                rhs,
            } => write!(f, "{destination} := {lhs} {operator} {rhs}"),
            InstructionKind::Goto(l) => write!(f, "{} {}", "GOTO".cyan(), label(*l)),
            InstructionKind::Branch {
                relop,
                lhs,
                rhs,
                target,
            } => write!(
                f,
                "{} {lhs} {relop} {rhs} {} {}",
                "IF".cyan(),
                "GOTO".cyan(),
                label(*target)
            ),
            InstructionKind::Return(value) => write!(f, "{} {value}", "RETURN".cyan()),
            InstructionKind::Alloc { variable, size } => {
                write!(f, "{} {variable} {size}", "DEC".cyan())
            }
            InstructionKind::Arg(value) => write!(f, "{} {value}", "ARG".cyan()),
            InstructionKind::Call {
                destination,
                function,
                ..
            } => write!(f, "{destination} := {} {}", "CALL".cyan(), label(*function)),
            InstructionKind::Param(v) => write!(f, "{} {v}", "PARAM".cyan()),
            InstructionKind::Read(v) => write!(f, "{} {v}", "READ".cyan()),
            InstructionKind::Write(value) => write!(f, "{} {value}", "WRITE".cyan()),
        }
    }
}

impl core::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for instruction in self.live_instructions() {
            writeln!(f, "{}", self.display(instruction))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::{
        frontend::{intern::InternedSymbol, syntax::Relop},
        middle::ir::{ArithmeticOperator, InstructionKind, Operand, Program},
    };

    #[test]
    fn prints_the_textual_ir() {
        let mut program = Program::default();
        let main = program.new_function_label(InternedSymbol::new("main"));
        let exit = program.new_label();
        let a = program.new_variable(Some(InternedSymbol::new("a")));
        let b = program.new_variable(None);

        program.push(InstructionKind::FunctionEntry(main));
        program.push(InstructionKind::Alloc {
            variable: b,
            size: 8,
        });
        program.push(InstructionKind::Read(a));
        program.push(InstructionKind::Assign {
            destination: Operand::Deref(b),
            source: Operand::Var(a),
        });
        program.push(InstructionKind::Arithmetic {
            operator: ArithmeticOperator::Mul,
            destination: a,
            lhs: Operand::Ref(b),
            rhs: Operand::Const(-4),
        });
        program.push(InstructionKind::Branch {
            relop: Relop::Ge,
            lhs: Operand::Var(a),
            rhs: Operand::Const(0),
            target: exit,
        });
        program.push(InstructionKind::Write(Operand::Var(a)));
        program.push(InstructionKind::Label(exit));
        program.push(InstructionKind::Return(Operand::Const(0)));

        program.instructions[6].ignore = true;

        assert_eq!(
            program.to_plain_text(),
            indoc! {"
                FUNCTION main :
                DEC t2 8
                READ t1
                *t2 := t1
                t1 := &t2 * #-4
                IF t1 >= #0 GOTO l1
                LABEL l1 :
                RETURN #0
            "}
        );
    }
}
