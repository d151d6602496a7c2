//! A reference interpreter for the IR. It gives the optimizer's tests an
//! observable behavior to preserve and lets the driver run a program without
//! a MIPS simulator.

use std::collections::VecDeque;

use hashbrown::HashMap;
use tracing::trace;

use crate::{
    frontend::intern::InternedSymbol,
    middle::{
        ir::{InstructionKind, LabelId, LabelName, Operand, Program, VarId},
        ty::WORD_SIZE,
    },
};

/// Address of the first word handed out by `DEC`
const MEMORY_BASE: i32 = 4096;

const DEFAULT_FUEL: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpretError {
    #[error("the program has no `main` function")]
    MissingMain,
    #[error("jump to {0}, which is not placed anywhere in the program")]
    UndefinedLabel(LabelName),
    #[error("{0} is not a valid word address")]
    InvalidAddress(i32),
    #[error("`READ` with no input left")]
    InputExhausted,
    #[error("`PARAM` without a matching `ARG`")]
    MissingArgument,
    #[error("execution ran past the end of a function")]
    FellThrough,
    #[error("execution did not finish within {0} steps")]
    OutOfFuel(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Every value written, in order
    pub output: Vec<i32>,
    /// Value returned by `main`
    pub exit_code: i32,
    pub steps: u64,
}

#[derive(Debug, Default)]
struct Frame {
    values: HashMap<VarId, i32>,
    arguments: VecDeque<i32>,
    /// Index of the call that created this frame and the variable that
    /// receives the result
    caller: Option<(usize, VarId)>,
    /// Memory length when the frame was entered
    memory_mark: usize,
}

impl Frame {
    fn get(&self, variable: VarId) -> i32 {
        self.values.get(&variable).copied().unwrap_or(0)
    }
}

pub struct Interpreter<'program> {
    program: &'program Program,
    /// Instruction index of every placed label, keyed by the resolved label
    positions: HashMap<LabelId, usize>,
    fuel: u64,
}

impl<'program> Interpreter<'program> {
    pub fn new(program: &'program Program) -> Self {
        let mut positions = HashMap::new();

        for index in program.live_indices() {
            if let InstructionKind::Label(label) | InstructionKind::FunctionEntry(label) =
                program.instructions[index].kind
            {
                positions.insert(program.resolve_label(label), index);
            }
        }

        Self {
            program,
            positions,
            fuel: DEFAULT_FUEL,
        }
    }

    /// Limits the number of executed instructions
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    fn position(&self, label: LabelId) -> Result<usize, InterpretError> {
        self.positions
            .get(&self.program.resolve_label(label))
            .copied()
            .ok_or_else(|| InterpretError::UndefinedLabel(self.program.label_name(label)))
    }

    fn main_position(&self) -> Result<usize, InterpretError> {
        let main = LabelName::Function(InternedSymbol::new("main"));

        self.program
            .live_indices()
            .find(|index| match self.program.instructions[*index].kind {
                InstructionKind::FunctionEntry(label) => self.program.label_name(label) == main,
                _ => false,
            })
            .ok_or(InterpretError::MissingMain)
    }

    pub fn run(&self, input: impl IntoIterator<Item = i32>) -> Result<Execution, InterpretError> {
        let mut input = input.into_iter().collect::<VecDeque<_>>();
        let mut output = Vec::new();
        let mut memory: Vec<i32> = Vec::new();
        let mut outgoing = VecDeque::new();
        let mut frames = vec![Frame::default()];
        let mut steps = 0;

        let mut pc = self.main_position()?;

        loop {
            if steps == self.fuel {
                return Err(InterpretError::OutOfFuel(self.fuel));
            }
            steps += 1;

            let Some(frame) = frames.last_mut() else {
                return Err(InterpretError::FellThrough);
            };

            let mut next = None;

            match &self.program.instructions[pc].kind {
                InstructionKind::Label(_) | InstructionKind::FunctionEntry(_) => {}
                InstructionKind::Assign {
                    destination,
                    source,
                } => {
                    let source = value(frame, &memory, *source)?;

                    match *destination {
                        Operand::Var(v) => {
                            frame.values.insert(v, source);
                        }
                        Operand::Deref(v) => store(&mut memory, frame.get(v), source)?,
                        _ => {}
                    }
                }
                InstructionKind::Arithmetic {
                    operator,
                    destination,
                    lhs,
                    rhs,
                } => {
                    let result = operator
                        .evaluate(value(frame, &memory, *lhs)?, value(frame, &memory, *rhs)?);
                    frame.values.insert(*destination, result);
                }
                InstructionKind::Goto(label) => next = Some(self.position(*label)?),
                InstructionKind::Branch {
                    relop,
                    lhs,
                    rhs,
                    target,
                } => {
                    if relop.evaluate(value(frame, &memory, *lhs)?, value(frame, &memory, *rhs)?) {
                        next = Some(self.position(*target)?);
                    }
                }
                InstructionKind::Alloc { variable, size } => {
                    let address = MEMORY_BASE + (memory.len() as i32) * WORD_SIZE as i32;
                    memory.resize(memory.len() + size.div_ceil(WORD_SIZE) as usize, 0);
                    frame.values.insert(*variable, address);
                }
                InstructionKind::Arg(operand) => {
                    outgoing.push_back(value(frame, &memory, *operand)?);
                }
                InstructionKind::Param(variable) => {
                    let argument = frame
                        .arguments
                        .pop_front()
                        .ok_or(InterpretError::MissingArgument)?;
                    frame.values.insert(*variable, argument);
                }
                InstructionKind::Read(variable) => {
                    let read = input.pop_front().ok_or(InterpretError::InputExhausted)?;
                    frame.values.insert(*variable, read);
                }
                InstructionKind::Write(operand) => {
                    output.push(value(frame, &memory, *operand)?);
                }
                InstructionKind::Call {
                    destination,
                    function,
                    ..
                } => {
                    trace!(function = %self.program.label_name(*function), "call");

                    frames.push(Frame {
                        values: HashMap::new(),
                        arguments: std::mem::take(&mut outgoing),
                        caller: Some((pc, *destination)),
                        memory_mark: memory.len(),
                    });
                    next = Some(self.position(*function)?);
                }
                InstructionKind::Return(operand) => {
                    let result = value(frame, &memory, *operand)?;
                    let memory_mark = frame.memory_mark;
                    let caller = frame.caller;

                    frames.pop();
                    memory.truncate(memory_mark);

                    let (Some((call, destination)), Some(frame)) = (caller, frames.last_mut())
                    else {
                        return Ok(Execution {
                            output,
                            exit_code: result,
                            steps,
                        });
                    };

                    frame.values.insert(destination, result);
                    pc = call;
                }
            }

            pc = match next {
                Some(target) => target,
                None => self
                    .program
                    .next_live(pc)
                    .ok_or(InterpretError::FellThrough)?,
            };

            if matches!(
                self.program.instructions[pc].kind,
                InstructionKind::FunctionEntry(_)
            ) && next.is_none()
            {
                return Err(InterpretError::FellThrough);
            }
        }
    }
}

fn value(frame: &Frame, memory: &[i32], operand: Operand) -> Result<i32, InterpretError> {
    match operand {
        // `DEC` stores the address of the block in the variable itself
        Operand::Var(v) | Operand::Ref(v) => Ok(frame.get(v)),
        Operand::Const(c) => Ok(c),
        Operand::Deref(v) => load(memory, frame.get(v)),
    }
}

fn word_index(memory: &[i32], address: i32) -> Result<usize, InterpretError> {
    let offset = address - MEMORY_BASE;

    if offset < 0 || offset % WORD_SIZE as i32 != 0 {
        return Err(InterpretError::InvalidAddress(address));
    }

    let index = (offset / WORD_SIZE as i32) as usize;

    if index < memory.len() {
        Ok(index)
    } else {
        Err(InterpretError::InvalidAddress(address))
    }
}

fn load(memory: &[i32], address: i32) -> Result<i32, InterpretError> {
    Ok(memory[word_index(memory, address)?])
}

fn store(memory: &mut [i32], address: i32, value: i32) -> Result<(), InterpretError> {
    memory[word_index(memory, address)?] = value;
    Ok(())
}
