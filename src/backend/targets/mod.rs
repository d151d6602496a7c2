use crate::{
    backend::{CodegenError, CodegenOptions},
    middle::ir::Program,
};

mod mips32_spim;

pub trait CodeGenerator {
    fn translate_to_asm(
        &self,
        program: &Program,
        options: &CodegenOptions,
    ) -> Result<String, CodegenError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Target {
    /// 32-bit MIPS as accepted by the SPIM simulator
    #[default]
    Mips32Spim,
}

impl Target {
    pub fn get_code_generator(self) -> impl CodeGenerator {
        match self {
            Target::Mips32Spim => mips32_spim::CodeGeneratorMips32Spim,
        }
    }
}
