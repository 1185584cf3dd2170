use std::time::Duration;

use clap::Parser;
use fourfifths::prelude::*;

/// fourfifths server - closest to 4/5 of the average wins
#[derive(Parser, Debug)]
#[command(name = "fourfifths-server", version, about)]
struct Args {
    /// Interface to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Browser origin allowed to connect. Repeat or comma-separate for
    /// several; pass an empty value to accept any origin.
    #[arg(
        long = "frontend-url",
        env = "FRONTEND_URL",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    frontend_urls: Vec<String>,

    /// Don't give a lone player bots to play against
    #[arg(long)]
    no_bots: bool,

    /// Drop connections idle for this many seconds (0 keeps them forever)
    #[arg(long, env = "IDLE_TIMEOUT_SECS", default_value_t = 0)]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fourfifths=info,fourfifths_room=info,fourfifths_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let origins: Vec<String> = args
        .frontend_urls
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();

    let config = RoomConfig {
        bots_enabled: !args.no_bots,
        ..RoomConfig::default()
    };

    let mut builder = FourfifthsServer::builder()
        .bind(&format!("{}:{}", args.host, args.port))
        .allowed_origins(origins.clone())
        .room_config(config);
    if args.idle_timeout_secs > 0 {
        builder = builder.idle_timeout(Duration::from_secs(args.idle_timeout_secs));
    }

    let server = builder.build().await?;
    tracing::info!(
        addr = %server.local_addr()?,
        ?origins,
        bots = !args.no_bots,
        "Starting fourfifths server"
    );

    server.run_until(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
