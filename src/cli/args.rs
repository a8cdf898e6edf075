use clap::{Parser, Subcommand};
use peerfs::constants::DEFAULT_COORDINATOR_PORT;

#[derive(Parser, Debug)]
#[clap(name = "peerfs", version = "1.0.0")]
/// Peer-assisted distributed file store
pub struct Arguments {
    #[command(subcommand)]
    pub role: Role,

    #[arg(short, long, global = true)]
    /// Optional YAML config file. Command-line flags take precedence over its values.
    pub config: Option<String>,

    #[arg(short, long, global = true)]
    /// Log info about the ongoing communication. (For debugging purposes).
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Role {
    /// Run the central coordinator.
    Coordinator {
        #[arg(short, long, default_value_t = DEFAULT_COORDINATOR_PORT)]
        /// Port to accept peer requests on.
        port: u16,
    },
    /// Run a peer sharing the files of a directory.
    Peer {
        /// Unique peer name.
        name: String,
        /// Directory whose files this peer owns. Created when missing.
        directory: String,
        /// Port to serve downloads on.
        port: u16,
        #[arg(long)]
        /// Coordinator address (host:port).
        coordinator: Option<String>,
    },
}

/*

    coordinator [-p --port]: Start the coordinator, 8000 by default.
    peer <name> <directory> <port> [--coordinator host:port]: Start a peer.
    -c --config: YAML file with timeouts, sync interval, retry policy and addresses.
    -v --verbose: Log info about the ongoing communication to stdout.
    -h --help: Print help message
 */
