use crate::middle::ir::{Operand, VarId};

/// Registers staging operands for a single instruction, handed out in turn
const SCRATCH: [Register; 10] = [
    Register::T0,
    Register::T1,
    Register::T2,
    Register::T3,
    Register::T4,
    Register::T5,
    Register::T6,
    Register::T7,
    Register::T8,
    Register::T9,
];

pub struct Assembler {
    output: String,
    next_scratch: usize,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            next_scratch: 0,
        }
    }

    pub fn into_output(self) -> String {
        self.output
    }

    fn push_line(&mut self, string: impl AsRef<str>) {
        self.output.push_str(string.as_ref());
        self.output.push('\n');
    }

    pub fn emit(&mut self, string: impl AsRef<str>) {
        self.output.push_str("  ");
        self.push_line(string);
    }

    pub fn blank_line(&mut self) {
        self.output.push('\n');
    }

    pub fn label(&mut self, name: impl AsRef<str>) {
        self.push_line(format!("{}:", name.as_ref()));
    }

    pub fn comment(&mut self, comment: impl AsRef<str>) {
        self.push_line(format!("# {}", comment.as_ref()));
    }

    /// The next register of the rotating scratch pool
    pub fn scratch(&mut self) -> Register {
        let register = SCRATCH[self.next_scratch];
        self.next_scratch = (self.next_scratch + 1) % SCRATCH.len();
        register
    }

    /// Loads the value of an operand into a fresh scratch register
    pub fn load_operand(&mut self, operand: Operand) -> Register {
        let register = self.scratch();

        match operand {
            Operand::Const(value) => self.emit(format!("li {register}, {value}")),
            // The cell of an allocated variable holds the block's address
            Operand::Var(variable) | Operand::Ref(variable) => {
                self.emit(format!("lw {register}, {}", cell(variable)));
            }
            Operand::Deref(pointer) => {
                self.emit(format!("lw {register}, {}", cell(pointer)));
                self.emit(format!("lw {register}, 0({register})"));
            }
        }

        register
    }

    pub fn store_variable(&mut self, variable: VarId, source: Register) {
        self.emit(format!("sw {source}, {}", cell(variable)));
    }

    pub fn push_word(&mut self, source: Register) {
        self.emit(format!("addi {}, {}, -4", Register::Sp, Register::Sp));
        self.emit(format!("sw {source}, 0({})", Register::Sp));
    }

    /// Calls one of the runtime routines, which only clobber `$v0`, `$a0`
    /// and `$ra`
    pub fn call_runtime(&mut self, routine: &str) {
        self.push_word(Register::Ra);
        self.emit(format!("jal {routine}"));
        self.emit(format!("lw {}, 0({})", Register::Ra, Register::Sp));
        self.emit(format!("addi {}, {}, 4", Register::Sp, Register::Sp));
    }
}

/// Label of the memory cell backing an IR variable
pub fn cell(variable: VarId) -> String {
    format!("_{variable}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Register {
    #[strum(serialize = "$v0")]
    V0,
    #[strum(serialize = "$a0")]
    A0,
    #[strum(serialize = "$t0")]
    T0,
    #[strum(serialize = "$t1")]
    T1,
    #[strum(serialize = "$t2")]
    T2,
    #[strum(serialize = "$t3")]
    T3,
    #[strum(serialize = "$t4")]
    T4,
    #[strum(serialize = "$t5")]
    T5,
    #[strum(serialize = "$t6")]
    T6,
    #[strum(serialize = "$t7")]
    T7,
    #[strum(serialize = "$t8")]
    T8,
    #[strum(serialize = "$t9")]
    T9,
    #[strum(serialize = "$sp")]
    Sp,
    #[strum(serialize = "$fp")]
    Fp,
    #[strum(serialize = "$ra")]
    Ra,
}

#[cfg(test)]
mod tests {
    use super::{Assembler, Register};
    use crate::{
        index::Index,
        middle::ir::{Operand, VarId},
    };

    #[test]
    fn scratch_registers_rotate() {
        let mut assembler = Assembler::new();

        let first = (0..10).map(|_| assembler.scratch()).collect::<Vec<_>>();

        assert_eq!(first[0], Register::T0);
        assert_eq!(first[9], Register::T9);
        assert_eq!(assembler.scratch(), Register::T0);
    }

    #[test]
    fn loads_every_operand_form() {
        let mut assembler = Assembler::new();
        let v = VarId::new(2);

        assembler.load_operand(Operand::Const(-7));
        assembler.load_operand(Operand::Var(v));
        assembler.load_operand(Operand::Deref(v));

        assert_eq!(
            assembler.into_output(),
            "  li $t0, -7\n  lw $t1, _t3\n  lw $t2, _t3\n  lw $t2, 0($t2)\n"
        );
    }
}
