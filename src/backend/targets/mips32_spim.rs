use itertools::Itertools;
use tracing::debug;

use crate::{
    backend::{
        CodegenError, CodegenOptions,
        assemblers::mips32::{Assembler, Register, cell},
        targets::CodeGenerator,
    },
    frontend::syntax::Relop,
    middle::{
        ir::{ArithmeticOperator, InstructionKind, LabelId, LabelName, Operand, Program},
        ty::WORD_SIZE,
    },
};

pub struct CodeGeneratorMips32Spim;

impl CodeGenerator for CodeGeneratorMips32Spim {
    fn translate_to_asm(
        &self,
        program: &Program,
        options: &CodegenOptions,
    ) -> Result<String, CodegenError> {
        let has_main = program.live_instructions().any(|i| match i.kind {
            InstructionKind::FunctionEntry(label) => symbol_name(program, label) == "main",
            _ => false,
        });

        if !has_main {
            return Err(CodegenError::MissingMain);
        }

        let cells = program
            .variables
            .indices()
            .map(|v| format!("{}: .word 0", cell(v)))
            .join("\n");

        let indices = program.live_indices().collect::<Vec<_>>();
        let mut assembler = Assembler::new();
        let mut frame: Option<Frame> = None;

        for (position, &index) in indices.iter().enumerate() {
            let instruction = &program.instructions[index];
            let text = strip_ansi_escapes::strip_str(program.display(instruction).to_string());

            if let InstructionKind::FunctionEntry(label) = instruction.kind {
                let body = indices[position + 1..]
                    .iter()
                    .map(|i| &program.instructions[*i].kind)
                    .take_while(|kind| !matches!(kind, InstructionKind::FunctionEntry(_)))
                    .collect::<Vec<_>>();

                assembler.blank_line();
                if options.emit_comments {
                    assembler.comment(&text);
                }

                frame = Some(codegen_function_entry(
                    &mut assembler,
                    &symbol_name(program, label),
                    &body,
                ));
                continue;
            }

            let Some(frame) = frame.as_mut() else {
                return Err(CodegenError::OutsideFunction(text));
            };

            if options.emit_comments {
                assembler.comment(&text);
            }

            codegen_instruction(&mut assembler, program, &instruction.kind, frame);
        }

        debug!(
            instructions = indices.len(),
            variables = program.variables.len(),
            "generated MIPS32 assembly"
        );

        Ok(format!(
            indoc::indoc! {r#"
            .data
            _prompt: .asciiz "Enter an integer:"
            _ret: .asciiz "\n"
            {0}
            .globl main
            .text
            {1}{2}"#
            },
            cells,
            include_str!("./mips32_spim_core.s"),
            assembler.into_output()
        ))
    }
}

/// What the translation needs to know about the function it is in
#[derive(Debug, Default)]
struct Frame {
    parameters: usize,
    next_parameter: usize,
    /// `ARG`s pushed since the last call
    pending_arguments: usize,
}

/// Name of the assembly label for a function or local label. Functions other
/// than `main` get a prefix so they can not clash with mnemonics or the
/// runtime routines.
fn symbol_name(program: &Program, label: LabelId) -> String {
    match program.label_name(label) {
        LabelName::Function(name) if name.value() == "main" => "main".to_string(),
        LabelName::Function(name) => format!("f_{name}"),
        local => local.to_string(),
    }
}

fn branch_mnemonic(relop: Relop) -> &'static str {
    match relop {
        Relop::Lt => "blt",
        Relop::Le => "ble",
        Relop::Gt => "bgt",
        Relop::Ge => "bge",
        Relop::Eq => "beq",
        Relop::Ne => "bne",
    }
}

/// Emits the function label and reserves the stack storage of every `DEC` in
/// the body, so each allocation happens once per call
fn codegen_function_entry(
    assembler: &mut Assembler,
    name: &str,
    body: &[&InstructionKind],
) -> Frame {
    assembler.label(name);

    for kind in body {
        if let InstructionKind::Alloc { variable, size } = kind {
            let bytes = size.div_ceil(WORD_SIZE) * WORD_SIZE;
            assembler.emit(format!("addi {0}, {0}, -{bytes}", Register::Sp));
            assembler.store_variable(*variable, Register::Sp);
        }
    }

    Frame {
        parameters: body
            .iter()
            .filter(|kind| matches!(kind, InstructionKind::Param(_)))
            .count(),
        ..Frame::default()
    }
}

fn codegen_instruction(
    assembler: &mut Assembler,
    program: &Program,
    kind: &InstructionKind,
    frame: &mut Frame,
) {
    match kind {
        InstructionKind::Label(label) => assembler.label(symbol_name(program, *label)),
        InstructionKind::FunctionEntry(_) | InstructionKind::Alloc { .. } => {}
        InstructionKind::Assign {
            destination,
            source,
        } => {
            let value = assembler.load_operand(*source);

            match *destination {
                Operand::Var(variable) => assembler.store_variable(variable, value),
                Operand::Deref(pointer) => {
                    let address = assembler.load_operand(Operand::Var(pointer));
                    assembler.emit(format!("sw {value}, 0({address})"));
                }
                Operand::Const(_) | Operand::Ref(_) => {}
            }
        }
        InstructionKind::Arithmetic {
            operator,
            destination,
            lhs,
            rhs,
        } => {
            let lhs = assembler.load_operand(*lhs);
            let rhs = assembler.load_operand(*rhs);
            let result = assembler.scratch();

            match operator {
                ArithmeticOperator::Add => assembler.emit(format!("add {result}, {lhs}, {rhs}")),
                ArithmeticOperator::Sub => assembler.emit(format!("sub {result}, {lhs}, {rhs}")),
                ArithmeticOperator::Mul => assembler.emit(format!("mul {result}, {lhs}, {rhs}")),
                ArithmeticOperator::Div => {
                    assembler.emit(format!("div {lhs}, {rhs}"));
                    assembler.emit(format!("mflo {result}"));
                }
            }

            assembler.store_variable(*destination, result);
        }
        InstructionKind::Goto(label) => {
            assembler.emit(format!("j {}", symbol_name(program, *label)));
        }
        InstructionKind::Branch {
            relop,
            lhs,
            rhs,
            target,
        } => {
            let lhs = assembler.load_operand(*lhs);
            let rhs = assembler.load_operand(*rhs);

            assembler.emit(format!(
                "{} {lhs}, {rhs}, {}",
                branch_mnemonic(*relop),
                symbol_name(program, *target)
            ));
        }
        InstructionKind::Return(value) => {
            let value = assembler.load_operand(*value);
            assembler.emit(format!("move {}, {value}", Register::V0));
            assembler.emit(format!("jr {}", Register::Ra));
        }
        InstructionKind::Arg(value) => {
            let value = assembler.load_operand(*value);
            assembler.push_word(value);
            frame.pending_arguments += 1;
        }
        InstructionKind::Param(variable) => {
            // Arguments are pushed first to last, so the first one is the
            // deepest
            let slot = frame.parameters.saturating_sub(frame.next_parameter + 1);
            frame.next_parameter += 1;

            let value = assembler.scratch();
            assembler.emit(format!(
                "lw {value}, {}({})",
                slot * WORD_SIZE as usize,
                Register::Fp
            ));
            assembler.store_variable(*variable, value);
        }
        InstructionKind::Call {
            destination,
            function,
            saved,
        } => {
            let spill_size = saved.len() * WORD_SIZE as usize;
            let argument_size = std::mem::take(&mut frame.pending_arguments) * WORD_SIZE as usize;
            let link_size = 2 * WORD_SIZE as usize;

            if spill_size > 0 {
                assembler.emit(format!("addi {0}, {0}, -{spill_size}", Register::Sp));
                for (slot, variable) in saved.iter().enumerate() {
                    let value = assembler.load_operand(Operand::Var(*variable));
                    assembler.emit(format!(
                        "sw {value}, {}({})",
                        slot * WORD_SIZE as usize,
                        Register::Sp
                    ));
                }
            }

            assembler.emit(format!("addi {0}, {0}, -{link_size}", Register::Sp));
            assembler.emit(format!("sw {}, 4({})", Register::Ra, Register::Sp));
            assembler.emit(format!("sw {}, 0({})", Register::Fp, Register::Sp));
            assembler.emit(format!(
                "addi {}, {}, {}",
                Register::Fp,
                Register::Sp,
                link_size + spill_size
            ));

            assembler.emit(format!("jal {}", symbol_name(program, *function)));

            // The callee may leave its own allocations on the stack, `$fp`
            // still marks where the arguments start
            assembler.emit(format!(
                "addi {}, {}, -{}",
                Register::Sp,
                Register::Fp,
                link_size + spill_size
            ));
            assembler.emit(format!("lw {}, 0({})", Register::Fp, Register::Sp));
            assembler.emit(format!("lw {}, 4({})", Register::Ra, Register::Sp));
            assembler.emit(format!("addi {0}, {0}, {link_size}", Register::Sp));

            for (slot, variable) in saved.iter().enumerate() {
                let value = assembler.scratch();
                assembler.emit(format!(
                    "lw {value}, {}({})",
                    slot * WORD_SIZE as usize,
                    Register::Sp
                ));
                assembler.store_variable(*variable, value);
            }

            if spill_size + argument_size > 0 {
                assembler.emit(format!(
                    "addi {0}, {0}, {1}",
                    Register::Sp,
                    spill_size + argument_size
                ));
            }

            assembler.store_variable(*destination, Register::V0);
        }
        InstructionKind::Read(variable) => {
            assembler.call_runtime("read");
            assembler.store_variable(*variable, Register::V0);
        }
        InstructionKind::Write(value) => {
            let value = assembler.load_operand(*value);
            assembler.emit(format!("move {}, {value}", Register::A0));
            assembler.call_runtime("write");
        }
    }
}

#[cfg(test)]
mod tests;
