use clap::Parser;
use overload_experiment_cli::{run_cli, Cli};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "overload_experiment_cli=info,overload_experiment_core=info".into()
        }))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run_cli(cli)
}
