//! Performance benchmarks for the dispatch path

use bot::dispatcher::Dispatcher;
use bot::lang::{format_template, Passthrough};
use bot::registry::EntityRegistry;
use shared::codec::encode;
use shared::{Packet, Vec3};
use std::sync::Arc;
use std::time::Instant;

fn populated_dispatcher(players: u64) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(EntityRegistry::new(), Arc::new(Passthrough), "en_US");
    for id in 0..players {
        dispatcher.dispatch(Packet::AddPlayer {
            username: format!("player{}", id),
            runtime_id: id,
            unique_id: id as i64,
            position: Vec3::ZERO,
        });
    }
    dispatcher
}

/// Benchmarks delta moves against a populated registry
#[test]
fn benchmark_delta_moves() {
    let mut dispatcher = populated_dispatcher(100);

    let iterations = 100_000u64;
    let start = Instant::now();

    for i in 0..iterations {
        dispatcher.dispatch(Packet::MoveActorDelta {
            runtime_id: i % 100,
            delta: Vec3::new(0.1, 0.0, -0.1),
        });
    }

    let duration = start.elapsed();
    println!(
        "Delta moves: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(dispatcher.registry().len(), 100);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks add/remove churn with recycled runtime ids
#[test]
fn benchmark_entity_churn() {
    let mut registry = EntityRegistry::new();

    let iterations = 50_000u64;
    let start = Instant::now();

    for i in 0..iterations {
        let id = i % 64;
        registry.upsert(id, "churn", i as i64, Vec3::new(i as f32, 0.0, 0.0));
        if i % 3 == 0 {
            registry.remove(id);
        }
    }

    let duration = start.elapsed();
    println!(
        "Entity churn: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(registry.len() <= 64);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks frame encoding of typical movement updates
#[test]
fn benchmark_frame_encoding() {
    let packet = Packet::MoveActorAbsolute {
        runtime_id: 12,
        position: Vec3::new(100.5, 64.0, -20.25),
    };

    let iterations = 100_000;
    let start = Instant::now();
    let mut total_bytes = 0;

    for _ in 0..iterations {
        total_bytes += encode(&packet).unwrap().len();
    }

    let duration = start.elapsed();
    println!(
        "Frame encoding: {} iterations in {:?} ({} bytes total)",
        iterations, duration, total_bytes
    );

    assert!(total_bytes > 0);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks chat template formatting
#[test]
fn benchmark_template_formatting() {
    let params = vec!["Alice".to_string(), "Bob".to_string()];

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let text = format_template("%2$s was slain by %1$s using %%magic", &params);
        assert_eq!(text, "Bob was slain by Alice using %magic");
    }

    let duration = start.elapsed();
    println!("Template formatting: {} iterations in {:?}", iterations, duration);

    assert!(duration.as_millis() < 2000);
}
