use std::{
    io::Write,
    path::Path,
    process::{Command, Output, Stdio},
};

use indoc::indoc;
use mktemp::Temp;

const SOURCE: &str = indoc! {"
    int square(int n) { return n * n; }
    int main() {
        int x = read();
        write(square(x));
        return 0;
    }
"};

fn cmmc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cmmc"))
}

fn write_source(directory: &Path, contents: &str) -> std::path::PathBuf {
    let path = directory.join("input.cmm");
    std::fs::write(&path, contents).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8(output.stderr.clone()).unwrap()
}

#[test]
fn writes_assembly_to_the_output_file() {
    let directory = Temp::new_dir().unwrap();
    let input = write_source(directory.as_path(), SOURCE);
    let asm = directory.as_path().join("output.s");

    let output = cmmc().arg(&input).arg("-o").arg(&asm).output().unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).is_empty());

    let text = std::fs::read_to_string(&asm).unwrap();
    assert!(text.starts_with(".data\n"));
    assert!(text.contains("\nf_square:\n"));
    assert!(text.contains("\nmain:\n"));
    assert!(text.contains("jal f_square\n"));
}

#[test]
fn reads_the_program_from_standard_input() {
    let mut child = cmmc()
        .args(["--stage", "ir"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    child
        .stdin
        .take()
        .unwrap()
        .write_all(SOURCE.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    let ir = stdout(&output);
    assert!(ir.starts_with("FUNCTION square :\nPARAM t1\n"));
    assert!(ir.contains("FUNCTION main :\n"));
    assert!(!ir.contains('\u{1b}'));
}

#[test]
fn stages_and_flags_change_the_artifact() {
    let directory = Temp::new_dir().unwrap();
    let input = write_source(directory.as_path(), SOURCE);

    let raw = cmmc().arg(&input).arg("--no-optimize").output().unwrap();
    let optimized = cmmc().arg(&input).output().unwrap();
    assert!(raw.status.success() && optimized.status.success());
    assert!(stdout(&raw).len() > stdout(&optimized).len());

    let bare = cmmc().arg(&input).arg("--no-comments").output().unwrap();
    assert!(!stdout(&bare).contains("# FUNCTION"));
    assert!(stdout(&optimized).contains("# FUNCTION main :\n"));

    let tree = cmmc().arg(&input).args(["--stage", "syntax"]).output().unwrap();
    assert!(stdout(&tree).starts_with("Program (1)\n"));
}

#[test]
fn semantic_errors_fail_the_process() {
    let directory = Temp::new_dir().unwrap();
    let input = write_source(
        directory.as_path(),
        indoc! {"
            int main() {
                int a;
                a = b;
                return c;
            }
        "},
    );

    let output = cmmc().arg(&input).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    assert_eq!(
        stderr(&output).lines().collect::<Vec<_>>(),
        vec![
            "Error type 1 at Line 3: No def var: b.",
            "Error type 1 at Line 4: No def var: c.",
        ]
    );
}

#[test]
fn missing_input_is_a_usage_error() {
    let directory = Temp::new_dir().unwrap();

    let output = cmmc()
        .arg(directory.as_path().join("missing.cmm"))
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not exist"));
}

#[test]
fn runs_the_program_with_the_given_input() {
    let directory = Temp::new_dir().unwrap();
    let input = write_source(directory.as_path(), SOURCE);

    let output = cmmc()
        .arg(&input)
        .args(["--run", "--input=-7"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "49\n");

    let starved = cmmc().arg(&input).arg("--run").output().unwrap();
    assert_eq!(starved.status.code(), Some(1));
    assert!(stderr(&starved).starts_with("runtime error:"));
}
