use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use asmlens::config::AppConfig;
use asmlens::demangle::CxxFilt;
use asmlens::engine::{Engine, EngineOptions};
use asmlens::toolchain::ExternalToolchain;
use asmlens::ui;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "asmlens", about = "Offline compiler explorer: live assembly for one source file")]
struct Args {
    /// Source file to watch and recompile.
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let Some(file) = args.file else {
        eprintln!("error: no source file specified");
        eprintln!("usage: asmlens <file.cpp>");
        return ExitCode::from(1);
    };

    match run(file).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

async fn run(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let source = file.canonicalize().unwrap_or(file);
    let config = AppConfig::load();
    let toolchain = Arc::new(ExternalToolchain::new(config.compiler.clone()));
    let demangler = Arc::new(CxxFilt::new());

    let (engine, snapshots) = Engine::spawn(
        source.clone(),
        config,
        toolchain,
        demangler,
        EngineOptions::default(),
    )?;

    ui::run(source, engine, snapshots).await?;
    Ok(())
}
