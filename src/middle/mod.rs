//! Everything between the syntax tree and the target: types and symbols are
//! checked here, the checked tree is lowered to three-address IR and the IR
//! is optimized before it is handed to a backend.

pub mod ir;
pub mod optimization;
pub mod semantics;
pub mod symbol;
pub mod ty;
