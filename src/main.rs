mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::args::{Arguments, Role};
use log::{error, info, LevelFilter};
use peerfs::config::Config;
use peerfs::coordinator::Coordinator;
use peerfs::networking::node_info::NodeInfo;
use peerfs::networking::tcp_listener::TcpListenerService;
use peerfs::peer::node::PeerNode;
use peerfs::utils::logging::init_logging;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::watch;

const SEPARATOR: &str = "──────────────────────────────── ✧ ✧ ✧ ────────────────────────────────";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Arguments::parse();

    if args.verbose {
        init_logging(LevelFilter::Info);
    } else {
        init_logging(LevelFilter::Warn);
    }

    let mut config = match &args.config {
        Some(config_path) => Config::parse_from_file(config_path).map_err(|e| {
            error!("Failed to read configuration file '{}': {}", config_path, e);
            e
        })?,
        None => Config::default(),
    };

    match args.role {
        Role::Coordinator { port } => run_coordinator(port, &config).await,
        Role::Peer {
            name,
            directory,
            port,
            coordinator,
        } => {
            if let Some(address) = coordinator {
                config.coordinator_address = address;
            }
            run_peer(name, directory, port, &config).await
        }
    }
}

async fn run_coordinator(port: u16, config: &Config) -> Result<()> {
    let listener =
        TcpListenerService::bind(&format!("0.0.0.0:{}", port), config.request_timeout()).await?;
    let address = listener.local_addr();

    let coordinator = Arc::new(Coordinator::new(config.request_timeout()));
    let server = Arc::clone(&coordinator).start_listening(listener);
    println!("Coordinator is listening at {}", address);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received shutdown signal. Stopping the coordinator...");
    server.abort();
    Ok(())
}

async fn run_peer(name: String, directory: String, port: u16, config: &Config) -> Result<()> {
    std::fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create directory '{}'", directory))?;

    let listener =
        TcpListenerService::bind(&format!("0.0.0.0:{}", port), config.request_timeout()).await?;
    let info = NodeInfo::new(name, format!("{}:{}", config.advertise_host, port));
    let node = Arc::new(PeerNode::new(info, &directory, config));

    let _server = Arc::clone(&node).start_listening(listener);
    info!("Your peer {} is serving {}", node.info(), directory);

    println!(
        "Connecting to the coordinator at {}...",
        config.coordinator_address
    );
    node.join()
        .await
        .with_context(|| format!("Failed to join via {}", config.coordinator_address))?;

    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    let sync_task = tokio::spawn(Arc::clone(&node).run_sync_loop(shutdown_receiver));

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received shutdown signal. Stopping the sync loop...");
        if shutdown_sender.send(true).is_ok() {
            if let Err(e) = sync_task.await {
                error!("Sync loop ended abnormally: {}", e);
            }
        }
        std::process::exit(0);
    });

    println!("{}", SEPARATOR);
    println!("Welcome to the cluster! Your peer is {}", node.info());
    println!("Available commands:");
    println!(" - list: List every file known to the coordinator");
    println!(" - get <file>: Fetch a file and print its content");
    println!("{}", SEPARATOR);

    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "list" | "get_files" if parts.len() == 1 => match node.catalog().await {
                Ok(files) => {
                    println!("Files in the cluster:");
                    for file in files {
                        println!(" - {}", file);
                    }
                }
                Err(e) => eprintln!("Failed to list files: {}", e),
            },
            "get" if parts.len() == 2 => match node.fetch(parts[1]).await {
                Ok(data) => println!("{}", String::from_utf8_lossy(&data)),
                Err(e) => eprintln!("Failed to get {}: {}", parts[1], e),
            },
            _ => {
                eprintln!(
                    "Wrong command or syntax '{}'. Valid commands are: 'list' or 'get <file>'",
                    parts[0]
                );
            }
        }
        println!("{}", SEPARATOR);
    }

    Ok(())
}
