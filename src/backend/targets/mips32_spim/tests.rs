use indoc::indoc;

use crate::{
    backend::{
        CodegenError, CodegenOptions,
        targets::{CodeGenerator, Target},
    },
    frontend::{SourceFile, parser::Parser},
    middle::{
        ir::{Program, lowering::lower_program},
        optimization::{DEFAULT_MAX_ROUNDS, optimize},
        semantics::Analyzer,
    },
};

fn lower(source: &str) -> Program {
    let source = SourceFile::from_memory(source);
    let tree = Parser::parse_program(&source).unwrap();
    let mut analysis = Analyzer::analyze(&tree);
    assert!(analysis.is_ok(), "{:?}", analysis.errors);
    lower_program(&tree, &mut analysis).unwrap()
}

fn assemble(program: &Program) -> String {
    Target::Mips32Spim
        .get_code_generator()
        .translate_to_asm(program, &CodegenOptions::default())
        .unwrap()
}

#[test]
fn emits_the_data_section_and_runtime() {
    let asm = assemble(&lower("int main() { return 0; }"));

    assert!(asm.starts_with(indoc! {r#"
        .data
        _prompt: .asciiz "Enter an integer:"
        _ret: .asciiz "\n"
    "#}));
    assert!(asm.contains(".globl main\n.text\nread:\n"));
    assert!(asm.contains("write:\n  li $v0, 1\n  syscall\n"));
}

#[test]
fn folded_constants_are_written() {
    let mut program = lower("int main() { int a; a = 1 + 2; write(a); return 0; }");
    optimize(&mut program, DEFAULT_MAX_ROUNDS);

    let asm = assemble(&program);

    assert!(asm.contains(indoc! {"
        # WRITE #3
          li $t0, 3
          move $a0, $t0
          addi $sp, $sp, -4
          sw $ra, 0($sp)
          jal write
    "}));
}

#[test]
fn every_variable_has_a_cell() {
    let asm = assemble(&lower("int main() { int a = read(); write(a); return 0; }"));

    assert!(asm.contains("_t1: .word 0\n_t2: .word 0\n"));
    assert!(asm.contains("jal read\n  lw $ra, 0($sp)\n  addi $sp, $sp, 4\n  sw $v0, _t2\n"));
}

#[test]
fn parameters_are_read_from_the_argument_area() {
    let asm = assemble(&lower(indoc! {"
        int sub(int a, int b) { return a - b; }
        int main() { write(sub(5, 3)); return 0; }
    "}));

    assert!(asm.contains(indoc! {"
        # FUNCTION sub :
        f_sub:
        # PARAM t1
          lw $t0, 4($fp)
          sw $t0, _t1
        # PARAM t2
          lw $t1, 0($fp)
          sw $t1, _t2
    "}));
}

#[test]
fn calls_save_the_link_registers_and_variables() {
    let asm = assemble(&lower(indoc! {"
        int twice(int x) { return x + x; }
        int main() { int v = twice(4); return v; }
    "}));

    // `main` preserves `v` and the call's result across the call
    assert!(asm.contains(indoc! {"
          addi $sp, $sp, -8
          sw $ra, 4($sp)
          sw $fp, 0($sp)
          addi $fp, $sp, 16
          jal f_twice
          addi $sp, $fp, -16
          lw $fp, 0($sp)
          lw $ra, 4($sp)
          addi $sp, $sp, 8
    "}));
    assert!(asm.contains("  addi $sp, $sp, 12\n  sw $v0, _t4\n"));
}

#[test]
fn allocations_are_reserved_at_function_entry() {
    let asm = assemble(&lower("int main() { int a[3]; a[0] = 1; return a[0]; }"));

    assert!(asm.contains("main:\n  addi $sp, $sp, -12\n  sw $sp, _t1\n"));
}

#[test]
fn branches_use_the_matching_instruction() {
    let asm = assemble(&lower(
        "int main() { int n = read(); if (n >= 10) write(1); return 0; }",
    ));

    assert!(asm.contains("bge $t"));
    assert!(asm.contains(", l1\n# GOTO l2\n  j l2\n# LABEL l1 :\nl1:\n"));
}

#[test]
fn comments_can_be_left_out() {
    let program = lower("int main() { write(7); return 0; }");
    let asm = Target::Mips32Spim
        .get_code_generator()
        .translate_to_asm(
            &program,
            &CodegenOptions {
                emit_comments: false,
            },
        )
        .unwrap();

    assert!(!asm.lines().any(|line| line.starts_with('#')));
}

#[test]
fn requires_a_main_function() {
    let program = lower("int helper() { return 1; }");

    assert_eq!(
        Target::Mips32Spim
            .get_code_generator()
            .translate_to_asm(&program, &CodegenOptions::default()),
        Err(CodegenError::MissingMain)
    );
}
