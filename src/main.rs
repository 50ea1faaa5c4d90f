mod cache_engine;
mod catalog;
mod cli;
mod config;
mod debug_impls;
mod display;
mod engine;
mod host;
mod log;
mod provider;
mod sync;
#[cfg(test)]
mod test_utils;

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use cli::Cli;
use config::Config;
use engine::Engine;
use host::{InboundMessage, OutboundMessage};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    log::init(cli.verbose);

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| dirs::data_local_dir().map(|d| d.join("photoframe-engine")))
        .context("Could not resolve a data directory; pass --data-dir")?;

    let raw_config = match &cli.config {
        Some(path) => cli::load_config_file(path)?,
        None => serde_json::Value::Null,
    };
    let config = Config::from_json(&raw_config, data_dir);

    let engine = Arc::new(Engine::new(config)?);

    if cli.once {
        engine.run_once();
        while let Some(message) = engine.try_recv_outbound() {
            write_message(&message)?;
        }
        engine.shutdown();
        return Ok(());
    }

    engine.start();

    let outbound_engine = Arc::clone(&engine);
    let writer = std::thread::spawn(move || -> anyhow::Result<()> {
        while let Some(message) = outbound_engine.recv_outbound() {
            write_message(&message)?;
        }
        Ok(())
    });

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundMessage>(&line) {
            Ok(message) => handle_inbound(&engine, message)?,
            Err(err) => tracing::warn!(%err, "Failed to parse inbound message"),
        }
    }

    engine.shutdown();
    drop(writer);
    Ok(())
}

fn handle_inbound(engine: &Arc<Engine>, message: InboundMessage) -> anyhow::Result<()> {
    match message {
        InboundMessage::Init { .. } => {
            // Configuration is loaded once at process startup (§6); a later INIT is a no-op.
            tracing::debug!("Ignoring redundant INIT after startup");
        }
        InboundMessage::ImageLoaded { id } => {
            engine.mark_image_loaded(&id, now_ms());
        }
        InboundMessage::GetCacheStats => engine.push_cache_stats(),
    }
    Ok(())
}

fn write_message(message: &OutboundMessage) -> anyhow::Result<()> {
    let json = serde_json::to_string(message)?;
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{json}")?;
    stdout.flush()?;
    Ok(())
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
