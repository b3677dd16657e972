use clap::Parser;
use nodeup_cli::commands::cli;
use nodeup_cli::{app, logging};
use nodeup_core::api::{load_app_config, NodeupError};

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, NodeupError> {
    let args = cli::Args::parse();
    let cfg = load_app_config(args.app_config.as_deref())?;
    let _log_guard =
        logging::init(&cfg.logging).map_err(|e| NodeupError::Anyhow(anyhow::anyhow!(e)))?;

    let result = app::run_node_up(&args, &cfg).await?;
    tracing::debug!(run_id = %result.run_id, "exiting");
    Ok(0)
}
