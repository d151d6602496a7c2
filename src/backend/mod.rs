//! The backend turns optimized IR into assembly text for a concrete target.
//! Targets keep no values in registers between IR instructions: every IR
//! variable lives in memory and registers only stage the operands of the
//! instruction being translated.

pub mod assemblers;
pub mod targets;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Precede every translated instruction with its IR as a comment
    pub emit_comments: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            emit_comments: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    #[error("the program has no `main` function")]
    MissingMain,
    #[error("`{0}` is not inside any function")]
    OutsideFunction(String),
}
