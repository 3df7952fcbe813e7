use clap::Parser;
use log::{info, warn};
use server::config::{AgentDescriptor, GameDescription};
use server::game::deathmatch::DeathmatchGame;
use server::mq::LogBroker;
use server::orchestrator::ProcessOrchestrator;
use server::viz::VizStreamer;
use server::{ArenaConfig, ArenaServer};
use std::sync::Arc;
use std::time::Duration;

const VIZ_FRAMES_PER_BATCH: usize = 10;
const VIZ_BATCHES_TO_KEEP: usize = 6;

/// Runs an arena game until it is over or interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Port agents connect to
        #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
        port: u16,
        /// Game description (JSON); a built-in arena is used without it
        #[clap(short, long)]
        game: Option<String>,
        /// Overrides the tick rate of the game description
        #[clap(short, long)]
        tps: Option<u32>,
        /// Stops the game after this many seconds
        #[clap(short, long)]
        duration: Option<u64>,
        /// Agent executable; repeat for every contestant
        #[clap(short, long)]
        agent: Vec<String>,
        /// Address handed to the agents; defaults to loopback
        #[clap(long)]
        agent_host: Option<String>,
        /// Do not spawn agent processes, wait for them to connect
        #[clap(long)]
        no_agents: bool,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut description = match &args.game {
        Some(path) => GameDescription::from_file(path)?,
        None => GameDescription::default_arena(),
    };
    if let Some(tps) = args.tps {
        description.tps = tps;
    }
    description
        .agents
        .extend(args.agent.iter().map(|image| AgentDescriptor::from_image(image)));
    description.validate()?;

    if description.agents.is_empty() {
        warn!("No agent in the game; it will tick empty");
    }

    let config = ArenaConfig {
        host: args.host.clone(),
        port: args.port,
        game_duration: args.duration.map(Duration::from_secs),
        start_agents: !args.no_agents,
    };

    let game = DeathmatchGame::new(description.clone());
    let orchestrator = Arc::new(ProcessOrchestrator::new(args.agent_host.clone()));
    let server = ArenaServer::new(description, Box::new(game), config, orchestrator, Arc::new(LogBroker));

    let streamer = Arc::new(VizStreamer::new(VIZ_FRAMES_PER_BATCH, VIZ_BATCHES_TO_KEEP));
    streamer.spawn(server.subscribe_state_updates());

    let addr = server.start().await?;
    server.send_launched();
    info!("Arena {} ready on {}", server.uuid(), addr);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
        _ = server.wait_game_over() => {
            info!("Game over, shutting down");
        }
    }

    server.stop().await;
    info!("Arena stopped; {} viz batches retained", streamer.batches().len());

    Ok(())
}
