//! `cmmc` compiles C-- to MIPS32 assembly for the SPIM simulator.
//!
//! The pipeline runs front to back, each stage consuming all of its input
//! before the next one starts: the [`frontend`] parses the source into a
//! syntax tree, [`middle::semantics`] checks it, [`middle::ir::lowering`]
//! turns it into three-address IR, [`middle::optimization`] cleans the IR up
//! and a [`backend`] target prints assembly.

use tracing::debug;

use crate::{
    backend::{CodegenOptions, targets::CodeGenerator, targets::Target},
    frontend::{
        SourceFile,
        parser::Parser,
        syntax::{Node, pretty_print_tree},
    },
    middle::{
        ir::{
            Program,
            interpret::{Execution, Interpreter},
            lowering::lower_program,
        },
        optimization::{DEFAULT_MAX_ROUNDS, optimize},
        semantics::{Analysis, Analyzer},
    },
};

pub mod backend;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

pub use error::CompileError;

/// The artifact a compilation stops at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Stage {
    /// The syntax tree
    Syntax,
    /// The symbol table of a semantically valid program
    Semantic,
    /// IR straight out of the generator
    Ir,
    /// IR after optimization
    Optimized,
    /// Target assembly
    #[default]
    Asm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub stage: Stage,
    /// Run the optimizer before printing assembly
    pub optimize: bool,
    pub max_rounds: usize,
    /// Keep terminal colors in the tree and IR listings
    pub color: bool,
    pub target: Target,
    pub codegen: CodegenOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            stage: Stage::default(),
            optimize: true,
            max_rounds: DEFAULT_MAX_ROUNDS,
            color: false,
            target: Target::default(),
            codegen: CodegenOptions::default(),
        }
    }
}

/// Runs the pipeline up to `options.stage` and returns that stage's artifact
/// as text
pub fn compile(source: &SourceFile, options: &CompileOptions) -> Result<String, CompileError> {
    let tree = Parser::parse_program(source)?;
    debug!(origin = %source.origin, nodes = tree.size(), "parsed");

    if options.stage == Stage::Syntax {
        return Ok(paint(pretty_print_tree(&tree), options.color));
    }

    let mut analysis = check(&tree)?;

    if options.stage == Stage::Semantic {
        return Ok(paint(analysis.symbol_listing() + "\n", options.color));
    }

    let mut program = lower_program(&tree, &mut analysis)?;
    debug!(
        instructions = program.instructions.len(),
        variables = program.variables.len(),
        labels = program.labels.len(),
        "lowered"
    );

    if options.stage == Stage::Ir {
        return Ok(listing(&program, options.color));
    }

    if options.optimize || options.stage == Stage::Optimized {
        run_optimizer(&mut program, options.max_rounds);
    }

    if options.stage == Stage::Optimized {
        return Ok(listing(&program, options.color));
    }

    let asm = options
        .target
        .get_code_generator()
        .translate_to_asm(&program, &options.codegen)?;

    Ok(asm)
}

/// Compiles the program to IR, optimized unless `options.optimize` is off,
/// and executes it on the IR interpreter with `input` as the values `read`
/// returns
pub fn run(
    source: &SourceFile,
    options: &CompileOptions,
    input: impl IntoIterator<Item = i32>,
) -> Result<Execution, CompileError> {
    let tree = Parser::parse_program(source)?;
    let mut analysis = check(&tree)?;
    let mut program = lower_program(&tree, &mut analysis)?;

    if options.optimize {
        run_optimizer(&mut program, options.max_rounds);
    }

    let execution = Interpreter::new(&program).run(input)?;
    debug!(
        steps = execution.steps,
        exit_code = execution.exit_code,
        "interpreted"
    );

    Ok(execution)
}

fn check(tree: &Node) -> Result<Analysis, CompileError> {
    let analysis = Analyzer::analyze(tree);
    debug!(
        symbols = analysis.symbols.len(),
        errors = analysis.errors.len(),
        "analyzed"
    );

    if analysis.is_ok() {
        Ok(analysis)
    } else {
        Err(CompileError::Semantic(analysis.errors))
    }
}

fn run_optimizer(program: &mut Program, max_rounds: usize) {
    let stats = optimize(program, max_rounds);
    debug!(
        rounds = stats.rounds,
        ignored = stats.ignored,
        converged = stats.converged,
        "optimized"
    );
}

fn listing(program: &Program, color: bool) -> String {
    if color {
        program.to_string()
    } else {
        program.to_plain_text()
    }
}

fn paint(text: String, color: bool) -> String {
    if color {
        text
    } else {
        strip_ansi_escapes::strip_str(text)
    }
}
