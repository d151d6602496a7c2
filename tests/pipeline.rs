use cmmc::{
    CompileError, CompileOptions, Stage, compile,
    frontend::{SourceFile, parser::Parser},
    middle::{
        ir::{
            interpret::{InterpretError, Interpreter},
            lowering::lower_program,
        },
        optimization::{DEFAULT_MAX_ROUNDS, optimize},
        semantics::Analyzer,
    },
};
use indoc::indoc;

fn compile_to(source: &str, stage: Stage) -> Result<String, CompileError> {
    compile(
        &SourceFile::from_memory(source),
        &CompileOptions {
            stage,
            ..CompileOptions::default()
        },
    )
}

const GCD: &str = indoc! {"
    int gcd(int a, int b) {
        while (a != b) {
            if (a > b) a = a - b;
            else b = b - a;
        }
        return a;
    }

    int main() {
        int pairs[3][2];
        int i = 0;
        while (i < 3) {
            pairs[i][0] = read();
            pairs[i][1] = read();
            i = i + 1;
        }
        i = 0;
        while (i < 3) {
            write(gcd(pairs[i][0], pairs[i][1]));
            i = i + 1;
        }
        return 0;
    }
"};

#[test]
fn constant_sum_is_written_as_an_immediate() {
    let asm = compile_to(
        "int main() { int a; a = 1 + 2; write(a); return 0; }",
        Stage::Asm,
    )
    .unwrap();

    assert!(asm.contains("# WRITE #3\n  li $t0, 3\n  move $a0, $t0\n"));
    assert!(!asm.contains(" + "));
}

#[test]
fn struct_defined_twice_is_one_error() {
    let result = compile_to(
        indoc! {"
            struct Point { int x; int y; };
            struct Point { int x; int y; };
            int main() { struct Point p; p.x = 1; return p.y; }
        "},
        Stage::Asm,
    );

    let Err(CompileError::Semantic(errors)) = result else {
        panic!("expected semantic errors, got {result:?}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind.code(), 16);
    assert_eq!(errors[0].line, 2);
    assert!(errors[0].to_string().starts_with("Error type 16 at Line 2:"));
}

#[test]
fn loop_carried_update_survives_optimization() {
    let ir = compile_to(
        "int main() { int x = 0; while (1) { x = x + 1; } return 0; }",
        Stage::Optimized,
    )
    .unwrap();

    assert!(ir.contains("t1 := t1 + #1\n"));
}

#[test]
fn single_use_copy_is_spliced() {
    let ir = compile_to(
        "int main() { int a = read(); int b = a; write(b); return 0; }",
        Stage::Optimized,
    )
    .unwrap();

    assert_eq!(
        ir,
        indoc! {"
            FUNCTION main :
            READ t1
            WRITE t1
            RETURN #0
        "}
    );
}

#[test]
fn every_stage_produces_its_artifact() {
    let source = "int main() { int a = 2; write(a * 3); return 0; }";

    let tree = compile_to(source, Stage::Syntax).unwrap();
    assert!(tree.starts_with("Program (1)\n  ExtDefList (1)\n"));

    let symbols = compile_to(source, Stage::Semantic).unwrap();
    assert!(symbols.contains("fn main: fn() -> int @ line 1"));
    assert!(symbols.contains("var a: int @ line 1"));

    let ir = compile_to(source, Stage::Ir).unwrap();
    assert!(ir.starts_with("FUNCTION main :\n"));
    assert!(ir.contains(" * #3\n"));

    let optimized = compile_to(source, Stage::Optimized).unwrap();
    assert!(optimized.contains("WRITE #6\n"));

    let asm = compile_to(source, Stage::Asm).unwrap();
    assert!(asm.contains("\nmain:\n"));
}

#[test]
fn front_end_errors_stop_the_pipeline() {
    let lexical = compile_to("int main() { return 1 @ 2; }", Stage::Syntax).unwrap_err();
    assert!(matches!(lexical, CompileError::Parse(_)));
    assert!(lexical.to_string().starts_with("Error type A at Line 1:"));

    let syntax = compile_to("int main() {\n  return 1\n}", Stage::Asm).unwrap_err();
    assert!(syntax.to_string().starts_with("Error type B at Line "));
}

#[test]
fn floats_are_rejected_by_the_generator() {
    let result = compile_to("int main() { float f = 1.5; return 0; }", Stage::Ir);

    assert!(matches!(result, Err(CompileError::Internal(_))));
}

#[test]
fn generation_is_deterministic() {
    let source = SourceFile::from_memory(GCD);
    let tree = Parser::parse_program(&source).unwrap();
    let analysis = Analyzer::analyze(&tree);
    assert!(analysis.is_ok());

    let first = lower_program(&tree, &mut analysis.clone()).unwrap();
    let second = lower_program(&tree, &mut analysis.clone()).unwrap();

    assert_eq!(first.to_plain_text(), second.to_plain_text());
    assert_eq!(
        compile_to(GCD, Stage::Asm).unwrap(),
        compile_to(GCD, Stage::Asm).unwrap()
    );
}

#[test]
fn optimized_program_behaves_the_same() {
    let source = SourceFile::from_memory(GCD);
    let tree = Parser::parse_program(&source).unwrap();
    let mut analysis = Analyzer::analyze(&tree);
    let mut program = lower_program(&tree, &mut analysis).unwrap();
    let input = [12, 18, 7, 21, 9, 9];

    let before = Interpreter::new(&program).run(input).unwrap();
    let stats = optimize(&mut program, DEFAULT_MAX_ROUNDS);
    let after = Interpreter::new(&program).run(input).unwrap();

    assert!(stats.converged);
    assert!(stats.ignored > 0);
    assert_eq!(before.output, vec![6, 7, 9]);
    assert_eq!(after.output, before.output);
    assert_eq!(after.exit_code, 0);
    assert!(after.steps < before.steps);
}

#[test]
fn optimizing_is_idempotent() {
    let optimized = compile_to(GCD, Stage::Optimized).unwrap();

    let source = SourceFile::from_memory(GCD);
    let tree = Parser::parse_program(&source).unwrap();
    let mut analysis = Analyzer::analyze(&tree);
    let mut program = lower_program(&tree, &mut analysis).unwrap();
    optimize(&mut program, DEFAULT_MAX_ROUNDS);
    let again = optimize(&mut program, DEFAULT_MAX_ROUNDS);

    assert_eq!(program.to_plain_text(), optimized);
    assert_eq!(again.rounds, 1);
    assert_eq!(again.ignored, 0);
}

#[test]
fn programs_run_on_the_interpreter() {
    let source = SourceFile::from_memory(GCD);

    let optimized = cmmc::run(&source, &CompileOptions::default(), [4, 6, 5, 10, 3, 7]).unwrap();
    let raw = cmmc::run(
        &source,
        &CompileOptions {
            optimize: false,
            ..CompileOptions::default()
        },
        [4, 6, 5, 10, 3, 7],
    )
    .unwrap();

    assert_eq!(optimized.output, vec![2, 5, 1]);
    assert_eq!(raw.output, optimized.output);

    let starved = cmmc::run(&source, &CompileOptions::default(), [1]);
    assert!(matches!(
        starved,
        Err(CompileError::Interpret(InterpretError::InputExhausted))
    ));
}

#[test]
fn short_circuit_skips_the_right_operand() {
    let source = SourceFile::from_memory(indoc! {"
        int noisy() {
            write(99);
            return 1;
        }

        int main() {
            int a = read();
            if (a > 1 && noisy()) write(1); else write(2);
            if (a < 1 || noisy()) write(3);
            return 0;
        }
    "});

    for optimize in [true, false] {
        let options = CompileOptions {
            optimize,
            ..CompileOptions::default()
        };

        let skipped = cmmc::run(&source, &options, [0]).unwrap();
        assert_eq!(skipped.output, vec![2, 3]);
        assert!(!skipped.output.contains(&99));

        let evaluated = cmmc::run(&source, &options, [5]).unwrap();
        assert_eq!(evaluated.output, vec![99, 1, 99, 3]);
    }
}

#[test]
fn oversized_arrays_are_an_internal_error() {
    let result = compile_to(
        "int main() { int cells[100000][100000]; return 0; }",
        Stage::Ir,
    );

    assert!(matches!(result, Err(CompileError::Internal(_))));
}
