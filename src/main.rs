use clap::Parser;
use log::{error, info, warn};
use mouselounge::configuration::Config;
use mouselounge::controller::CaptureOrchestrator;
use mouselounge::dispatch::HandlerRegistry;
use mouselounge::protocol::{DecodedEvent, EventKind, SignatureDecoder};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mouselounge")]
#[command(version)]
#[command(about = "Plays the videos posted in tribe houses and music rooms")]
struct Args {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(env = "MOUSELOUNGE_CONFIG")]
    config_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Print the known packet signatures and exit
    #[arg(long)]
    list_signatures: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // RUST_LOG still wins over the default level
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .format_target(false)
        .init();

    if args.list_signatures {
        print!("{}", SignatureDecoder::new());
        return;
    }

    let config = match args.config_file {
        Some(ref path) => {
            info!("Importing configuration from {}", path.display());
            Config::from_file(path).unwrap_or_else(|e| {
                error!("Unable to import configuration from file: {}", e);
                std::process::exit(1);
            })
        }
        None => Config::default(),
    };

    let mut registry = HandlerRegistry::new();
    for kind in EventKind::ALL {
        registry.add(kind.name(), move |event| print_video(kind, event));
    }

    let mut orchestrator = CaptureOrchestrator::new(config, Arc::new(registry));
    let report = orchestrator
        .run(shutdown_signal())
        .await
        .unwrap_or_else(|e| {
            error!("{}, exiting...", e);
            std::process::exit(1);
        });

    if !report.is_success() {
        eprint!("{}", report);
    }
    std::process::exit(report.exit_code());
}

fn print_video(kind: EventKind, event: &DecodedEvent) {
    let Some(first) = event.get(0) else {
        return;
    };
    let link = match kind {
        EventKind::PlayVidTribehouse => first.to_string(),
        EventKind::PlayVidMusicroom => format!("https://www.youtube.com/watch?v={}", first),
    };

    println!(
        "Post time: {}",
        chrono::Local::now().format("%a, %d %b %Y, %H:%M:%S")
    );
    if let Some(poster) = event.get(2) {
        println!("Poster: {}", poster);
    }
    println!("Link: {}", link);
    if let Some(title) = event.get(1) {
        println!("Title: {}", title);
    }
    println!();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::quit()) {
            Ok(mut quit) => {
                tokio::select! {
                    _ = quit.recv() => info!("User exited with SIGQUIT"),
                    _ = tokio::signal::ctrl_c() => info!("User exited with SIGINT"),
                }
                return;
            }
            Err(e) => warn!("Unable to trap SIGQUIT: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("User exited with SIGINT"),
        Err(e) => {
            error!("Unable to trap Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
