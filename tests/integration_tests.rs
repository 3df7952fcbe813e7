//! Integration tests for the arena server
//!
//! These tests run a real comm server on a loopback port and drive it with
//! the reference agent codec.

use client::{AgentConnection, ServerEvent};
use server::config::{AgentDescriptor, GameDescription};
use server::game::deathmatch::DeathmatchGame;
use server::mq::MemoryBroker;
use server::orchestrator::ProcessOrchestrator;
use server::{ArenaConfig, ArenaServer};
use shared::protocol::{PROTOCOL_VERSION_CLEAR_BETA, PROTOCOL_VERSION_CLEAR_V1};
use shared::{AgentAction, Vector2};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(3);

async fn arena_with(agents: usize, game_duration: Option<Duration>) -> (Arc<ArenaServer>, SocketAddr, Vec<Uuid>) {
    let mut description = GameDescription::default_arena();
    description.tps = 20;
    description.agents = (0..agents)
        .map(|i| AgentDescriptor::from_image(&format!("./agent-{}", i)))
        .collect();

    let game = DeathmatchGame::with_seed(description.clone(), 3);
    let config = ArenaConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        game_duration,
        start_agents: false,
    };

    let server = ArenaServer::new(
        description,
        Box::new(game),
        config,
        Arc::new(ProcessOrchestrator::new(None)),
        Arc::new(MemoryBroker::new()),
    );
    let addr = server.start().await.unwrap();
    let ids = server.agent_ids();
    (server, addr, ids)
}

async fn arena(agents: usize) -> (Arc<ArenaServer>, SocketAddr, Vec<Uuid>) {
    arena_with(agents, None).await
}

async fn next_event(connection: &mut AgentConnection) -> ServerEvent {
    timeout(WAIT, connection.recv())
        .await
        .expect("no message from the server")
        .unwrap()
        .expect("connection closed")
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// HANDSHAKE TESTS
mod handshake_tests {
    use super::*;

    #[tokio::test]
    async fn test_handshake_gets_welcome_then_perceptions() {
        let (server, addr, ids) = arena(1).await;
        let mut agent = AgentConnection::connect(addr, ids[0]).await.unwrap();
        agent.handshake(PROTOCOL_VERSION_CLEAR_V1).await.unwrap();

        match next_event(&mut agent).await {
            ServerEvent::Welcome(specs) => {
                assert!(specs.maxspeed > 0.0);
                assert!(specs.gear.contains_key("gun"));
            }
            other => panic!("expected welcome, got {:?}", other),
        }

        assert!(matches!(next_event(&mut agent).await, ServerEvent::Perception(_)));
        assert!(server.is_running());
        server.stop().await;
    }

    #[tokio::test]
    async fn test_unsupported_versions_are_rejected() {
        let (server, addr, ids) = arena(1).await;
        let mut agent = AgentConnection::connect(addr, ids[0]).await.unwrap();

        agent.handshake("clear_v2").await.unwrap();
        agent.handshake("").await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(server.handshaked_count(), 0);
        assert!(!server.is_running());

        // Still connected, an accepted version goes through
        agent.handshake(PROTOCOL_VERSION_CLEAR_BETA).await.unwrap();
        assert!(matches!(next_event(&mut agent).await, ServerEvent::Welcome(_)));
        assert_eq!(server.handshaked_count(), 1);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_handshake_is_rejected() {
        let (server, addr, ids) = arena(1).await;
        let mut agent = AgentConnection::connect(addr, ids[0]).await.unwrap();

        agent.handshake(PROTOCOL_VERSION_CLEAR_V1).await.unwrap();
        assert!(matches!(next_event(&mut agent).await, ServerEvent::Welcome(_)));

        agent.handshake(PROTOCOL_VERSION_CLEAR_V1).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(server.handshaked_count(), 1);

        // No second welcome: only perceptions follow
        for _ in 0..3 {
            assert!(matches!(next_event(&mut agent).await, ServerEvent::Perception(_)));
        }
        server.stop().await;
    }

    #[tokio::test]
    async fn test_ticking_waits_for_every_agent() {
        let (server, addr, ids) = arena(2).await;

        let mut first = AgentConnection::connect(addr, ids[0]).await.unwrap();
        first.handshake(PROTOCOL_VERSION_CLEAR_V1).await.unwrap();
        assert!(matches!(next_event(&mut first).await, ServerEvent::Welcome(_)));
        sleep(Duration::from_millis(300)).await;
        assert_eq!(server.current_turn(), 0);

        let mut second = AgentConnection::connect(addr, ids[1]).await.unwrap();
        second.handshake(PROTOCOL_VERSION_CLEAR_V1).await.unwrap();
        assert!(matches!(next_event(&mut second).await, ServerEvent::Welcome(_)));
        assert!(matches!(next_event(&mut first).await, ServerEvent::Perception(_)));
        assert!(server.current_turn() > 0);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_silent_connection_is_dropped() {
        let (server, addr, _) = arena(1).await;
        let mut agent = AgentConnection::connect(addr, Uuid::new_v4()).await.unwrap();

        let result = timeout(Duration::from_secs(5), agent.recv()).await.unwrap();
        assert!(matches!(result, Ok(None) | Err(_)));
        server.stop().await;
    }
}

/// GAMEPLAY TESTS
mod gameplay_tests {
    use super::*;

    #[tokio::test]
    async fn test_steering_actions_move_the_agent() {
        let (server, addr, ids) = arena(1).await;
        let mut agent = AgentConnection::connect(addr, ids[0]).await.unwrap();
        agent.handshake(PROTOCOL_VERSION_CLEAR_V1).await.unwrap();

        let mut moving = false;
        for _ in 0..40 {
            if let ServerEvent::Perception(perception) = next_event(&mut agent).await {
                if perception.velocity.mag() > 0.0 {
                    moving = true;
                    break;
                }
                agent
                    .send_actions(vec![AgentAction::steer(Vector2::new(0.0, 0.5))])
                    .await
                    .unwrap();
            }
        }

        assert!(moving);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_removes_the_agent() {
        let (server, addr, ids) = arena(1).await;
        let mut agent = AgentConnection::connect(addr, ids[0]).await.unwrap();
        agent.handshake(PROTOCOL_VERSION_CLEAR_V1).await.unwrap();
        assert!(matches!(next_event(&mut agent).await, ServerEvent::Welcome(_)));

        drop(agent);
        assert!(eventually(|| server.agent_count() == 0).await);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_game_duration_ends_the_game() {
        let (server, _, _) = arena_with(0, Some(Duration::from_millis(300))).await;

        timeout(WAIT, server.wait_game_over()).await.unwrap();
        assert!(server.is_game_over());

        let turn = server.current_turn();
        assert!(turn > 0);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(server.current_turn(), turn);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_state_updates_carry_viz_frames() {
        let (server, _, _) = arena_with(0, None).await;
        let mut updates = server.subscribe_state_updates();

        let update = timeout(WAIT, updates.recv()).await.unwrap().unwrap();
        let frame: serde_json::Value = serde_json::from_slice(&update.frame).unwrap();
        assert_eq!(frame["gameid"], "default");

        let init: serde_json::Value = serde_json::from_slice(&server.viz_init_json().await).unwrap();
        assert_eq!(init["type"], "init");
        assert_eq!(init["data"]["tps"], 20);
        server.stop().await;
    }
}
