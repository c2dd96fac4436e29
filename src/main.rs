use std::fs::File;
use std::io::{self, BufReader, Write};

use clap::Parser;
use cortex_analyzers::analyzers;
use cortex_analyzers::cli::Args;
use cortex_analyzers::runner::LiveConnector;
use cortex_analyzers::{AnalyzerError, AnalyzerResult, Artifact, Outcome};
use env_logger::{Env, Target};

fn read_artifact(args: &Args) -> AnalyzerResult<Artifact> {
    match &args.input {
        Some(path) => {
            let file = File::open(path).map_err(|e| AnalyzerError::io(e, path.clone()))?;
            Artifact::from_reader(BufReader::new(file))
        }
        None => Artifact::from_reader(io::stdin().lock()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // stdout carries the report; logs go to stderr only
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level()))
        .target(Target::Stderr)
        .format_timestamp_millis()
        .init();

    log::info!("Starting {} analyzer", args.analyzer);

    let result = match read_artifact(&args) {
        Ok(artifact) => analyzers::dispatch(args.analyzer, &artifact, &LiveConnector).await,
        Err(e) => Err(e),
    };
    let outcome = Outcome::from_result(result, args.pretty);

    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", outcome.body).and_then(|_| stdout.flush()) {
        log::error!("Failed to write report: {}", e);
    }
    std::process::exit(outcome.exit_code);
}
