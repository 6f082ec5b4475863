mod backend;
mod config;
mod driver;
mod translate;

use std::process::ExitCode;

use clap::Parser as _;
use config::{BuildConfig, Options};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};
use weft_errors::Renderer;
use weft_inputs::SourceDb;
use weft_stage::DirOutput;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Overrides the log filter, e.g. `WEFT_LOG=weft_stage=debug`.
const LOG_ENV: &str = "WEFT_LOG";

fn setup_tracing() {
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV)
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let options = Options::parse();
    setup_tracing();
    match options {
        Options::Build(args) => {
            let config = BuildConfig::from_args(args)?;
            let db = SourceDb::default();
            let files = driver::load(&db, &config)?;
            let sink = DirOutput::new(config.out.clone());
            let renderer = Renderer::styled();

            let outcome = driver::build(&db, &files, &config, &sink, &renderer)?;
            for message in &outcome.messages {
                eprintln!("{message}");
            }
            if let Some(report) = &outcome.report {
                tracing::info!(written = report.written, out = %config.out, "outputs written");
            }
            Ok(if outcome.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}
