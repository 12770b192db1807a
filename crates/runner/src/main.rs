use anyhow::Context;
use beacon_runner::{Monitor, build_client, load_config, load_default_config};

fn print_help() {
    eprintln!(
        r#"beacon-monitor - live dashboard feed monitor

USAGE:
    beacon-monitor [CONFIG]

ARGS:
    CONFIG              Path to a beacon_config.json (default: embedded)

ENVIRONMENT VARIABLES:
    RUST_LOG            Log level filter (default: info)
    BEACON_SYMBOLS      Comma-separated symbols for the price feed
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1).as_deref() {
        Some("--help" | "-h") => {
            print_help();
            return Ok(());
        }
        Some(path) => {
            log::info!("Loading configuration from: {}", path);
            load_config(path).with_context(|| format!("loading {}", path))?
        }
        None => load_default_config().context("loading embedded configuration")?,
    };

    let symbols: Vec<String> = std::env::var("BEACON_SYMBOLS")
        .map(|s| {
            s.split(',')
                .map(|sym| sym.trim().to_string())
                .filter(|sym| !sym.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let client = build_client(&config)?;
    client.init()?;
    let monitor = Monitor::start(&client, &symbols);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    log::info!("Shutting down");

    monitor.stop();
    client.dispose().await;
    Ok(())
}
