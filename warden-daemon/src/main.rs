use anyhow::Result;
use clap::Parser;

use warden_core::config::WardenConfig;
use warden_core::lifecycle::ExitAction;
use warden_daemon::cli::DaemonCli;
use warden_daemon::logging::init_tracing;
use warden_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() {
    let cli = DaemonCli::parse();

    match run(cli).await {
        Ok(action) => std::process::exit(action.exit_code()),
        Err(e) => {
            eprintln!("warden-daemon: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: DaemonCli) -> Result<ExitAction> {
    // 설정 로드: 파일 -> 환경변수 -> CLI 순으로 덮어씀
    let mut config = WardenConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        println!("configuration is valid: {}", cli.config.display());
        return Ok(ExitAction::Shutdown);
    }

    init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "warden-daemon starting");

    let orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await
}
