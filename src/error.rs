use itertools::Itertools;
use thiserror::Error;

use crate::{
    backend::CodegenError,
    frontend::parser::ParseError,
    middle::{
        ir::{interpret::InterpretError, lowering::LoweringError},
        semantics::SemanticError,
    },
};

/// Everything that can stop a compilation
#[derive(Debug, Error)]
pub enum CompileError {
    /// Lexical and syntax errors. The first one stops the front end.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Every semantic error of the program, in the order they were found
    #[error("{}", .0.iter().join("\n"))]
    Semantic(Vec<SemanticError>),

    /// The tree and the analysis disagree, which no valid input can cause
    #[error("internal error: {0}")]
    Internal(#[from] LoweringError),

    #[error("runtime error: {0}")]
    Interpret(#[from] InterpretError),

    #[error("code generation failed: {0}")]
    Codegen(#[from] CodegenError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
