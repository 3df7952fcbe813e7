use clap::Parser;
use client::{run_agent, Brain};
use log::{error, info};
use std::net::SocketAddr;
use uuid::Uuid;

/// Reference agent. Host, port and agent id default to the `HOST`, `PORT`
/// and `AGENTID` environment variables set by the arena.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Arena host
    #[clap(short = 'H', long)]
    host: Option<String>,
    /// Arena port
    #[clap(short, long)]
    port: Option<u16>,
    /// Id the arena registered this agent under
    #[clap(short, long)]
    agent_id: Option<Uuid>,
    /// Seed for the wander behaviour
    #[clap(short, long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();

    let host = args
        .host
        .or_else(|| std::env::var("HOST").ok())
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match args.port {
        Some(port) => port,
        None => std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(shared::DEFAULT_PORT),
    };
    let agent_id = match args.agent_id {
        Some(id) => id,
        None => std::env::var("AGENTID")?.parse()?,
    };

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let brain = args.seed.map_or_else(Brain::new, Brain::with_seed);

    match run_agent(addr, agent_id, brain).await {
        Ok(perceptions) => {
            info!("Agent {} done after {} perceptions", agent_id, perceptions);
            Ok(())
        }
        Err(e) => {
            error!("Agent {} failed; {}", agent_id, e);
            Err(e)
        }
    }
}
