use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use futures::StreamExt;
use shared::{
    domain::RunState,
    protocol::ServerEvent,
    session::{ClientViewModel, Notice},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Prints live kiln telemetry from a running server")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8081")]
    server_url: String,
    /// Seconds to wait before reconnecting; 0 exits when the socket closes.
    #[arg(long, default_value_t = 5)]
    reconnect_seconds: u64,
}

fn ws_url(server_url: &str) -> Result<String> {
    let base = server_url.trim_end_matches('/');
    let ws_base = if base.starts_with("https://") {
        base.replacen("https://", "wss://", 1)
    } else if base.starts_with("http://") {
        base.replacen("http://", "ws://", 1)
    } else {
        return Err(anyhow!("server_url must start with http:// or https://"));
    };
    Ok(format!("{ws_base}/ws"))
}

fn status_line(view: &ClientViewModel) -> Option<String> {
    let status = view.status.as_ref()?;
    let unit = match view.config.as_ref().map(|c| c.temp_scale) {
        Some(shared::domain::TempScale::Fahrenheit) => "F",
        _ => "C",
    };
    let target = view
        .display_target()
        .map(|t| format!("{t:.1}{unit}"))
        .unwrap_or_else(|| "---".into());
    if status.state == RunState::Idle {
        return Some(format!("IDLE {:.1}{unit}", status.temperature));
    }
    let remaining = view.remaining_seconds().unwrap_or_default().max(0.0) as u64;
    Some(format!(
        "{}{} {} {:.1}{unit} -> {target} heat={:>3.0}% {:>5.1}% left={:02}:{:02}:{:02} {}",
        status.state.as_str(),
        if status.is_simulation { " (sim)" } else { "" },
        status.profile.as_deref().unwrap_or("-"),
        status.temperature,
        status.heat * 100.0,
        view.progress_percent(),
        remaining / 3600,
        remaining / 60 % 60,
        remaining % 60,
        view.cost_label(),
    ))
}

fn notice_line(notice: &Notice) -> String {
    match notice {
        Notice::RunFinished(done) => format!("** {} ({:.2})", done.message, done.cost),
        Notice::Response(response) => format!("-- {}", response.message),
        Notice::Error(error) => format!("!! {:?}: {}", error.code, error.message),
    }
}

async fn watch(url: &str) -> Result<()> {
    let (stream, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect websocket: {url}"))?;
    info!(%url, "connected");
    let (_, mut reader) = stream.split();
    let mut view = ClientViewModel::new();

    while let Some(message) = reader.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let event: ServerEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "skipping undecodable frame");
                continue;
            }
        };
        if let Some(notice) = view.apply(&event) {
            println!("{}", notice_line(&notice));
        }
        if let ServerEvent::OvenUpdate(_) = event {
            if let Some(line) = status_line(&view) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();
    let url = ws_url(&args.server_url)?;

    loop {
        match watch(&url).await {
            Ok(()) => info!("server closed the connection"),
            Err(error) => warn!(%error, "telemetry stream failed"),
        }
        if args.reconnect_seconds == 0 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(args.reconnect_seconds)).await;
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
