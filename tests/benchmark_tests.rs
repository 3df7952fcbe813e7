//! Coarse performance checks for the simulation hot paths

use server::config::{AgentDescriptor, GameDescription};
use server::game::deathmatch::DeathmatchGame;
use server::game::{AgentMutationBatch, Game};
use shared::visibility::{only_visible, ObstacleSegment};
use shared::{AgentAction, Vector2};
use std::time::Instant;
use uuid::Uuid;

/// Benchmarks the visibility sweep over a field of overlapping walls
#[test]
fn benchmark_visibility_sweep() {
    let segments: Vec<ObstacleSegment<usize>> = (0..60)
        .map(|i| {
            let angle = i as f64 * 0.1;
            let distance = 5.0 + (i % 7) as f64;
            let center = Vector2::new(angle.sin() * distance, angle.cos() * distance);
            let half = Vector2::new(angle.cos(), -angle.sin()) * 1.5;
            ObstacleSegment::new(center - half, center + half, i)
        })
        .collect();

    let iterations = 200;
    let start = Instant::now();

    for _ in 0..iterations {
        let visible = only_visible(Vector2::ZERO, &segments);
        assert!(!visible.is_empty());
    }

    let duration = start.elapsed();
    println!(
        "Visibility sweep: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds even unoptimized
    assert!(duration.as_secs() < 5);
}

/// Benchmarks full game steps with four steering and shooting agents
#[test]
fn benchmark_deathmatch_step() {
    let description = GameDescription::default_arena();
    let mut game = DeathmatchGame::with_seed(description.clone(), 11);

    let agents: Vec<_> = description
        .map
        .start_points()
        .into_iter()
        .map(|spawn| (Uuid::new_v4(), game.new_entity_agent(&AgentDescriptor::from_image("./bench"), spawn)))
        .collect();

    let ticks = 300u32;
    let start = Instant::now();

    for tick in 0..ticks {
        let mutations = agents
            .iter()
            .enumerate()
            .map(|(sequence, (proxy, entity))| AgentMutationBatch {
                agent_proxy: *proxy,
                entity: *entity,
                mutations: vec![
                    AgentAction::shoot(Vector2::new(0.0, 1.0)),
                    AgentAction::steer(Vector2::new((tick as f64 * 0.1).sin(), 1.0)),
                ],
                sequence: sequence as u64,
            })
            .collect();

        game.step(tick, 0.1, mutations);
    }

    let duration = start.elapsed();
    println!(
        "Deathmatch step: {} ticks in {:?} ({:.2} μs/tick)",
        ticks,
        duration,
        duration.as_micros() as f64 / ticks as f64
    );

    assert!(!game.viz_frame_json().is_empty());
    // A 10 tps game has 100 ms per tick; stay far below
    assert!(duration.as_secs() < 10);
}
