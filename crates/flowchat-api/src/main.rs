mod http;
mod state;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use secrecy::ExposeSecret;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flowchat_infra::config;

use crate::state::AppState;

#[derive(Parser)]
#[command(
    name = "flowchat",
    version,
    about = "Streaming multi-step reasoning chat service"
)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory containing config.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Bind host, overriding the config file
        #[arg(long)]
        host: Option<String>,
        /// Bind port, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective configuration and exit
    Check,
}

fn init_tracing(verbose: u8) {
    let directives = match verbose {
        0 => "info",
        1 => "info,flowchat_api=debug,flowchat_core=debug,flowchat_infra=debug",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Serve { host, port } => serve(cli.config_dir, host, port).await,
        Command::Check => check(cli.config_dir).await,
    }
}

async fn serve(
    config_dir: PathBuf,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = config::load(&config_dir).await;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let state = AppState::from_config(&config);
    let router = http::router::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!(
        "{} v{} listening on {}",
        style("flowchat").cyan().bold(),
        env!("CARGO_PKG_VERSION"),
        style(format!("http://{}", listener.local_addr()?)).underlined(),
    );
    info!(%addr, "server started");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn check(config_dir: PathBuf) -> anyhow::Result<()> {
    let config = config::load(&config_dir).await;

    let mark = |set: bool| {
        if set {
            style("set").green()
        } else {
            style("not set").yellow()
        }
    };

    println!("{}", style("flowchat configuration").bold());
    println!(
        "  server      {}:{} (timeout {}s)",
        config.server.host, config.server.port, config.server.request_timeout_secs,
    );
    println!("  llm         {}", config.llm.base_url);
    println!(
        "  models      fast={} planner={} responder={}",
        config.llm.fast_model, config.llm.planner_model, config.llm.responder_model,
    );
    println!(
        "  llm api key {}",
        mark(!config.llm.api_key.expose_secret().is_empty()),
    );
    println!(
        "  market key  {}",
        mark(!config.tools.market_api_key.expose_secret().is_empty()),
    );
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
