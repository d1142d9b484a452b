//! mudcast server binary: runs the bundled chat room.

use std::time::Duration;

use clap::Parser;

use mudcast::broker::{Broker, BrokerConfig};
use mudcast::chatroom::Chatroom;
use mudcast::server::{self, ServerConfig};

/// Store-and-forward chat session broker.
#[derive(Parser, Debug)]
#[command(name = "mudcast", version, about)]
struct Args {
    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Seconds a client may stay silent before it is pruned.
    #[arg(long, default_value_t = 300)]
    idle_timeout_secs: u64,

    /// Command queue ceiling; further commands are refused until drained.
    #[arg(long, default_value_t = 10_000)]
    queue_depth: usize,
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    env_logger::init();
    let args = Args::parse();

    let broker = Broker::new(
        Chatroom::new(),
        BrokerConfig {
            idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            queue_depth: args.queue_depth,
            ..BrokerConfig::default()
        },
    );

    let config = ServerConfig {
        bind_addr: args.bind,
        sweep_interval: Duration::from_secs((args.idle_timeout_secs / 4).max(1)),
    };

    let handle = server::start(config, broker).await?;
    log::info!("chat room ready on port {}", handle.port);

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    Ok(())
}
