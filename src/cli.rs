use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fedimapper", about = "Fediverse instance crawler & mapper")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the continuous crawl engine
    Crawl {
        /// Number of parallel ingest workers
        #[arg(short, long)]
        num_processes: Option<usize>,
    },
    /// Ingest a single host and exit
    IngestInstance {
        host: String,
    },
    /// Print the live metadata a host advertises
    Instance {
        host: String,
    },
    /// Print the parsed version breakdown of a host
    InstanceVersion {
        host: String,
    },
    /// Print the peer list a host publishes
    InstancePeers {
        host: String,
    },
    /// Print the ban list a host publishes
    InstanceBlocks {
        host: String,
    },
    /// Reclaim storage and refresh planner statistics
    VacuumDatabase,
}
