#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;
use pep517_frontend::{ArtifactResult, SubprocessFrontend};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Drive a project's PEP 517 build backend to produce an sdist and/or wheel.
#[derive(Parser)]
struct Args {
    /// Project directory containing pyproject.toml (defaults to the current directory).
    project: Option<PathBuf>,
    /// Directory to write built artifacts into (defaults to `<project>/dist`).
    #[clap(short, long)]
    outdir: Option<PathBuf>,
    /// Build a source distribution.
    #[clap(short = 's', long)]
    sdist: bool,
    /// Build a wheel.
    #[clap(short = 'w', long)]
    wheel: bool,
    /// Build an editable wheel.
    #[clap(short = 'e', long)]
    editable: bool,
}

fn report(kind: &str, result: &ArtifactResult) {
    print!("{}", result.out);
    eprint!("{}", result.err);
    println!("{kind} built: {}", result.filename);
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let project_dir = args.project.unwrap_or(env::current_dir()?);
    let outdir = match args.outdir {
        Some(dir) => dir,
        None => project_dir.join("dist"),
    };
    fs_err::create_dir_all(&outdir).context("invalid output directory")?;

    let (build_sdist, build_wheel) = if !args.sdist && !args.wheel && !args.editable {
        (true, true)
    } else {
        (args.sdist, args.wheel)
    };

    let frontend = SubprocessFrontend::for_project(&project_dir, true)
        .context("failed to resolve a Python interpreter or read pyproject.toml")?;

    if build_sdist {
        println!("Building sdist...");
        let result = frontend.build_sdist(&outdir, None).await?;
        report("sdist", &result);
    }
    if build_wheel {
        println!("Building wheel...");
        let result = frontend.build_wheel(&outdir, None, None).await?;
        report("wheel", &result);
    }
    if args.editable {
        println!("Building editable wheel...");
        let result = frontend.build_editable(&outdir, None, None).await?;
        report("editable wheel", &result);
    }

    frontend.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let start = std::time::Instant::now();
    let result = run().await;
    debug!("took {}ms", start.elapsed().as_millis());

    if let Err(err) = result {
        eprintln!("{}", "pep517-cli failed".red().bold());
        for cause in err.chain() {
            eprintln!("  {}: {}", "caused by".red().bold(), cause);
        }
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
