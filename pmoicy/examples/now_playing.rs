//! Prints the titles announced by an ICY stream
//!
//! ```text
//! cargo run -p pmoicy --example now_playing -- http://radio.example.com:8000/live [seconds]
//! ```
//!
//! Settings are read from the pmoicy configuration (`sources.icy`), the log
//! level from `host.logger`. Set `RUST_LOG=pmoicy=debug` to see the framing
//! details.

use pmoicy::{IcyClient, SessionEvent};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = pmoconfig::get_config();

    if config.get_log_enable_console()? {
        let level = config.get_log_min_level()?.to_lowercase();
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(format!("pmoicy={}", level))),
            )
            .init();
    }

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: now_playing <stream url> [seconds]"))?;
    let seconds: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(60);

    let client = IcyClient::from_config(&config)?;
    let (mut sink, mut audio) = client.channel_sink();
    let mut metadata = sink.subscribe_metadata(16);
    let mut session_events = sink.subscribe_session(16);

    let handle = client.spawn(url, sink);

    tokio::spawn(async move {
        while let Some(event) = metadata.recv().await {
            if event.title_changed {
                match event.block.artist_title() {
                    Some((Some(artist), title)) => println!("♪ {} - {}", artist, title),
                    Some((None, title)) => println!("♪ {}", title),
                    None => {}
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(event) = session_events.recv().await {
            match event {
                SessionEvent::Connected { headers, .. } => println!(
                    "Connected to {} ({} kbps)",
                    headers.name.as_deref().unwrap_or("unnamed stream"),
                    headers
                        .bitrate
                        .map(|b| b.to_string())
                        .unwrap_or_else(|| "?".to_string())
                ),
                other => println!("{:?}", other),
            }
        }
    });

    // Un vrai lecteur passerait `audio` au décodeur
    let drain = tokio::spawn(async move {
        let mut total = 0usize;
        while let Some(chunk) = audio.next_chunk().await {
            total += chunk.len();
        }
        total
    });

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    let stats = handle.stats();
    let summary = handle.disconnect().await?;
    let total = drain.await?;
    println!("{:?} after {} audio bytes", summary.outcome, total);
    println!("{}", stats.report());
    Ok(())
}
