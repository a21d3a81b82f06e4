use anyhow::Result;
use weaver_cli::{cli, logging};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("weaver error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    tracing::debug!(command = ?args.command, "starting weaver");
    weaver_cli::run(args).await
}
