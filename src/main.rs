use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::debug;

use page_mirror::cli::{Command, MirrorArgs, MirrorCommand, ServeArgs};
use page_mirror::{server, MirrorEvent, WebsiteMirror};

#[tokio::main]
async fn main() -> Result<()> {
    let args = MirrorCommand::parse();
    init_tracing(args.verbose, args.quiet);
    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Mirror(args) => mirror_once(args).await,
        Command::Serve(args) => serve(args).await,
    }
}

/// `RUST_LOG` wins over `-q` / `-v`.
fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn mirror_once(args: MirrorArgs) -> Result<()> {
    let mirror = WebsiteMirror::new(args.engine.to_config())?;
    let request = mirror.request_for(&args.url);

    println!("🚀 Mirroring: {}", request.source_url.blue());
    println!("📁 Output directory: {:?}", request.output_directory);

    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    progress_bar.set_message("Downloading page and assets");
    progress_bar.enable_steady_tick(Duration::from_millis(100));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = {
        let progress_bar = progress_bar.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let line = match &event {
                    MirrorEvent::Downloaded { .. } => format!("✅ {event}").green(),
                    MirrorEvent::Failed { .. } => format!("⚠️  {event}").yellow(),
                };
                progress_bar.println(line.to_string());
            }
        })
    };

    let report = mirror.mirror_request(&request, Some(tx)).await;
    printer.await?;
    progress_bar.finish_and_clear();

    if report.success {
        println!("✅ {}", report.message.green());
        Ok(())
    } else {
        eprintln!("❌ {}", report.message.red());
        anyhow::bail!("mirroring {} failed", request.source_url)
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mirror = WebsiteMirror::new(args.engine.to_config())?;
    let addr = SocketAddr::new(args.host, args.port);

    println!("🌐 Mirror service on http://{addr} (POST /mirror, GET /ws)");
    println!("📁 Output directory: {:?}", args.engine.output_dir);

    server::start(addr, Arc::new(mirror)).await
}
