use crate::frontend::intern::InternedSymbol;

/// A diagnostic found while checking the program. Analysis keeps going after
/// one is reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error type {} at Line {}: {}.", .kind.code(), .line, .kind)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SemanticErrorKind {
    #[error("No def var: {0}")]
    UndefinedVariable(InternedSymbol),
    #[error("No def func: {0}")]
    UndefinedFunction(InternedSymbol),
    #[error("Re def var: {0}")]
    RedefinedVariable(InternedSymbol),
    #[error("Re def func: {0}")]
    RedefinedFunction(InternedSymbol),
    #[error("assign type not match")]
    AssignmentMismatch,
    #[error("assign to rval")]
    AssignmentToRvalue,
    #[error("op type not match")]
    OperandMismatch,
    #[error("return type not match")]
    ReturnMismatch,
    #[error("func call arg type not match")]
    ArgumentMismatch,
    #[error("not indexable")]
    NotIndexable,
    #[error("not callable")]
    NotCallable,
    #[error("not integer in index")]
    NonIntegerIndex,
    #[error("not memberable")]
    NotMemberable,
    #[error("no member: {0}")]
    UndefinedMember(InternedSymbol),
    #[error("invalid member def")]
    InvalidMemberDefinition(InternedSymbol),
    #[error("struct redef")]
    RedefinedStruct(InternedSymbol),
    #[error("struct nodef")]
    UndefinedStruct(InternedSymbol),
    #[error("func dec but no def")]
    DeclaredButNotDefined(InternedSymbol),
    #[error("func dec conflict")]
    ConflictingDeclaration(InternedSymbol),
}

impl SemanticErrorKind {
    /// The stable numeric category of this error
    pub fn code(&self) -> u8 {
        match self {
            SemanticErrorKind::UndefinedVariable(_) => 1,
            SemanticErrorKind::UndefinedFunction(_) => 2,
            SemanticErrorKind::RedefinedVariable(_) => 3,
            SemanticErrorKind::RedefinedFunction(_) => 4,
            SemanticErrorKind::AssignmentMismatch => 5,
            SemanticErrorKind::AssignmentToRvalue => 6,
            SemanticErrorKind::OperandMismatch => 7,
            SemanticErrorKind::ReturnMismatch => 8,
            SemanticErrorKind::ArgumentMismatch => 9,
            SemanticErrorKind::NotIndexable => 10,
            SemanticErrorKind::NotCallable => 11,
            SemanticErrorKind::NonIntegerIndex => 12,
            SemanticErrorKind::NotMemberable => 13,
            SemanticErrorKind::UndefinedMember(_) => 14,
            SemanticErrorKind::InvalidMemberDefinition(_) => 15,
            SemanticErrorKind::RedefinedStruct(_) => 16,
            SemanticErrorKind::UndefinedStruct(_) => 17,
            SemanticErrorKind::DeclaredButNotDefined(_) => 18,
            SemanticErrorKind::ConflictingDeclaration(_) => 19,
        }
    }
}
