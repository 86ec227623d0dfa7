use clap::Parser;
use pmp_workflow_engine::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli::init();

    match cli.command {
        Command::Validate(args) => cli::validate::run(args),
        Command::Run(args) => cli::run::run(args, &config).await,
        Command::Dispatch(args) => cli::run::dispatch(args, &config).await,
        Command::Tools(args) => cli::tools::run(args).await,
    }
}
