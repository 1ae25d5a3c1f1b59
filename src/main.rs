use anyhow::Result;
use codetrend::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.common.verbose);
    cli.execute()
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "codetrend=debug" } else { "codetrend=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
