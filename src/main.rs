use std::{
    io::{IsTerminal, Read, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use cmmc::{
    CompileError, CompileOptions, Stage,
    backend::{CodegenOptions, targets::Target},
    compile,
    frontend::{SourceFile, SourceFileOrigin},
    middle::optimization::DEFAULT_MAX_ROUNDS,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// C-- source file, standard input when omitted
    source_file: Option<PathBuf>,

    /// Stop after this stage and print its result
    #[arg(long, value_enum, default_value_t = Stage::Asm)]
    stage: Stage,

    /// Write the result here instead of standard output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Translate the IR exactly as generated
    #[arg(long)]
    no_optimize: bool,

    /// Upper bound on optimization rounds
    #[arg(long, default_value_t = DEFAULT_MAX_ROUNDS)]
    max_rounds: usize,

    #[arg(long, value_enum, default_value_t = Target::Mips32Spim)]
    target: Target,

    /// Leave the IR comments out of the assembly
    #[arg(long)]
    no_comments: bool,

    /// Execute the program on the IR interpreter instead of printing a stage
    #[arg(long, conflicts_with = "stage")]
    run: bool,

    /// Values returned by `read` when running, in order
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, requires = "run")]
    input: Vec<i32>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    if let Some(path) = &args.source_file {
        if !path.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", path.display()),
                )
                .exit()
        }

        if !path.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", path.display()),
                )
                .exit()
        }
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), CompileError> {
    let source_file = match &args.source_file {
        Some(path) => SourceFile {
            contents: std::fs::read_to_string(path)?,
            origin: SourceFileOrigin::File(path.clone()),
        },
        None => {
            let mut contents = String::new();
            std::io::stdin().read_to_string(&mut contents)?;
            SourceFile {
                contents,
                origin: SourceFileOrigin::Stdin,
            }
        }
    };

    let options = CompileOptions {
        stage: args.stage,
        optimize: !args.no_optimize,
        max_rounds: args.max_rounds,
        color: args.output.is_none() && std::io::stdout().is_terminal(),
        target: args.target,
        codegen: CodegenOptions {
            emit_comments: !args.no_comments,
        },
    };
    debug!(?options, origin = %source_file.origin, "compiling");

    let artifact: String = if args.run {
        cmmc::run(&source_file, &options, args.input.iter().copied())?
            .output
            .iter()
            .map(|value| format!("{value}\n"))
            .collect()
    } else {
        compile(&source_file, &options)?
    };

    match &args.output {
        Some(path) => std::fs::write(path, artifact)?,
        None => std::io::stdout().write_all(artifact.as_bytes())?,
    }

    Ok(())
}
