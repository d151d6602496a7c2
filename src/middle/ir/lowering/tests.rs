use indoc::indoc;

use super::{LoweringError, lower_program};
use crate::{
    frontend::{SourceFile, intern::InternedSymbol, parser::Parser},
    middle::{
        ir::{InstructionKind, Program},
        semantics::Analyzer,
        symbol::Binding,
    },
};

fn lower(source: &str) -> Result<Program, LoweringError> {
    let source = SourceFile::from_memory(source);
    let tree = Parser::parse_program(&source).unwrap();
    let mut analysis = Analyzer::analyze(&tree);
    assert!(analysis.is_ok(), "{:?}", analysis.errors);

    lower_program(&tree, &mut analysis)
}

fn lower_to_text(source: &str) -> String {
    lower(source).unwrap().to_plain_text()
}

#[test]
fn straight_line_code() {
    assert_eq!(
        lower_to_text("int main() { int a = read(); write(a + 1); return 0; }"),
        indoc! {"
            FUNCTION main :
            READ t2
            t1 := t2
            t3 := t1 + #1
            WRITE t3
            RETURN #0
        "}
    );
}

#[test]
fn short_circuit_conditions() {
    assert_eq!(
        lower_to_text(indoc! {"
            int main() {
                int n = read();
                if (n > 0 && n < 10) write(1); else write(0);
                return 0;
            }
        "}),
        indoc! {"
            FUNCTION main :
            READ t2
            t1 := t2
            IF t1 > #0 GOTO l4
            GOTO l2
            LABEL l4 :
            IF t1 < #10 GOTO l1
            GOTO l2
            LABEL l1 :
            WRITE #1
            GOTO l3
            LABEL l2 :
            WRITE #0
            LABEL l3 :
            RETURN #0
        "}
    );
}

#[test]
fn while_loops_test_before_the_body() {
    assert_eq!(
        lower_to_text("int main() { int i = 0; while (i < 3) i = i + 1; return i; }"),
        indoc! {"
            FUNCTION main :
            t1 := #0
            LABEL l1 :
            IF t1 < #3 GOTO l2
            GOTO l3
            LABEL l2 :
            t2 := t1 + #1
            t1 := t2
            GOTO l1
            LABEL l3 :
            RETURN t1
        "}
    );
}

#[test]
fn array_elements_are_addressed_explicitly() {
    assert_eq!(
        lower_to_text("int main() { int a[3]; a[1] = 5; return a[1]; }"),
        indoc! {"
            FUNCTION main :
            DEC t1 12
            t2 := &t1 + #4
            *t2 := #5
            t3 := &t1 + #4
            t4 := *t3
            RETURN t4
        "}
    );
}

#[test]
fn variable_indices_are_scaled_by_the_row_size() {
    assert_eq!(
        lower_to_text("int main() { int m[2][3]; int i = 1; m[i][2] = 7; return 0; }"),
        indoc! {"
            FUNCTION main :
            DEC t1 24
            t2 := #1
            t3 := t2 * #12
            t4 := &t1 + t3
            t5 := t4 + #8
            *t5 := #7
            RETURN #0
        "}
    );
}

#[test]
fn struct_members_use_their_offsets() {
    assert_eq!(
        lower_to_text(indoc! {"
            struct P { int x; int y; };
            int main() { struct P p; p.y = 2; return p.x; }
        "}),
        indoc! {"
            FUNCTION main :
            DEC t1 8
            t2 := &t1 + #4
            *t2 := #2
            t3 := &t1
            t4 := *t3
            RETURN t4
        "}
    );
}

#[test]
fn calls_push_arguments_and_record_saved_variables() {
    let program = lower(indoc! {"
        int sq(int x) { return x * x; }
        int main() { int a = 3; return sq(a); }
    "})
    .unwrap();

    assert_eq!(
        program.to_plain_text(),
        indoc! {"
            FUNCTION sq :
            PARAM t1
            t2 := t1 * t1
            RETURN t2
            FUNCTION main :
            t3 := #3
            ARG t3
            t4 := CALL sq
            RETURN t4
        "}
    );

    let saved = program
        .instructions
        .iter()
        .find_map(|i| match &i.kind {
            InstructionKind::Call { saved, .. } => Some(saved.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(saved.len(), 2);
}

#[test]
fn conditions_used_as_values_become_zero_or_one() {
    assert_eq!(
        lower_to_text("int main() { int b = 1 < 2; return b; }"),
        indoc! {"
            FUNCTION main :
            t2 := #0
            IF #1 < #2 GOTO l1
            GOTO l2
            LABEL l1 :
            t2 := #1
            LABEL l2 :
            t1 := t2
            RETURN t1
        "}
    );
}

#[test]
fn missing_return_is_added() {
    assert_eq!(
        lower_to_text("int f() { write(1); } int main() { f(); return 0; }"),
        indoc! {"
            FUNCTION f :
            WRITE #1
            RETURN #0
            FUNCTION main :
            t1 := CALL f
            RETURN #0
        "}
    );
}

#[test]
fn functions_are_bound_to_labels() {
    let source = SourceFile::from_memory("int main() { return 0; }");
    let tree = Parser::parse_program(&source).unwrap();
    let mut analysis = Analyzer::analyze(&tree);

    lower_program(&tree, &mut analysis).unwrap();

    let main = analysis
        .symbols
        .resolve_global(InternedSymbol::new("main"))
        .unwrap();
    assert!(matches!(
        analysis.symbols[main].binding(),
        Some(Binding::Function(_))
    ));
}

#[test]
fn floats_are_rejected() {
    assert_eq!(
        lower("int main() { float f = 1.5; return 0; }").unwrap_err(),
        LoweringError::UnsupportedFloat { line: 1 }
    );
}

#[test]
fn globals_are_rejected() {
    assert!(matches!(
        lower("int g; int main() { return 0; }").unwrap_err(),
        LoweringError::GlobalVariable { line: 1, .. }
    ));
}

#[test]
fn aggregates_beyond_the_address_space_are_rejected() {
    assert_eq!(
        lower(indoc! {"
            int main() {
                int cells[100000][100000];
                return 0;
            }
        "})
        .unwrap_err(),
        LoweringError::AggregateTooLarge { line: 2 }
    );

    assert_eq!(
        lower(indoc! {"
            struct Big { int cells[100000][100000]; int count; };
            int tally(struct Big b) {
                return b.count;
            }
            int main() { return 0; }
        "})
        .unwrap_err(),
        LoweringError::AggregateTooLarge { line: 3 }
    );
}
