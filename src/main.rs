//! `ktjvmc` CLI: `ktjvmc [-v] [-c classpath] SOURCE.kt`.
//!
//! Exit codes: `0` success, `1` a lex/parse/resolve/codegen error with
//! diagnostics on stderr, `2` bad usage (bad flags, wrong source
//! extension, unreachable `$JAVA_HOME/jmods/java.base.jmod`).

use clap::Parser as ClapParser;
use ktjvmc::CompilerConfig;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(ClapParser)]
#[command(name = "ktjvmc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ahead-of-time compiler from a Kotlin-like language to JVM class files")]
struct Cli {
    /// Source file to compile; must end in `.kt`.
    source: PathBuf,

    /// Colon-separated class-path entries (directories or `.jar` files).
    /// `.` is always searched first regardless of this flag.
    #[arg(short = 'c', long = "classpath", value_name = "PATH")]
    classpath: Option<String>,

    /// Emit progress to stderr as each compiler phase runs.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.source.extension().and_then(|e| e.to_str()) != Some("kt") {
        eprintln!(
            "ktjvmc: source path must end in `.kt`, got {}",
            cli.source.display()
        );
        return ExitCode::from(2);
    }

    let mut config = CompilerConfig::new().with_verbose(cli.verbose);
    if let Some(classpath) = &cli.classpath {
        config = config.with_classpath_str(classpath);
    }

    let output_path = ktjvmc::derive_output_path(&cli.source);
    match ktjvmc::compile_file(&cli.source, &output_path, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
