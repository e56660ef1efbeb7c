use std::path::PathBuf;
use std::process::ExitCode;

mod app;
mod bot;
mod collector;
mod config;
mod db;
mod error;
mod models;
mod scheduler;

use app::App;
use config::Config;
use error::{AppError, Result};

const USAGE: &str = "usage: xfree [--config <path>] [--collect-once] [--version]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    collect_once: bool,
    version: bool,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--version" => parsed.version = true,
                "--collect-once" => parsed.collect_once = true,
                "--config" => {
                    let path = args
                        .next()
                        .ok_or_else(|| AppError::Config("--config needs a path".to_string()))?;
                    parsed.config = Some(PathBuf::from(path));
                }
                other => {
                    return Err(AppError::Config(format!("unknown argument {other:?}\n{USAGE}")));
                }
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "xfree stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    if args.version {
        println!("xfree {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let app = App::new(&config).await?;

    if args.collect_once {
        return app.run_once().await;
    }
    app.run().await
}
