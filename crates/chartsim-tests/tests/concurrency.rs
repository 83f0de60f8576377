//! Ticks, chart passes and on-demand actions from concurrent tasks.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chartsim_runtime::SimEvent;
use chartsim_tests::helpers::*;
use chrono::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_actions_and_ticks_lose_no_updates() {
    let sim = Arc::new(seeded_sim(compact_config(), 21));
    let (_, ids) = group_with_releases(&sim, "Busy", profile(600, 80_000, 90), 4);
    let target = ids[0];
    sim.start_promotion(target, 30, t0()).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let sim = Arc::clone(&sim);
        handles.push(tokio::task::spawn_blocking(move || {
            let mut gained = 0u64;
            for _ in 0..50 {
                gained += sim.perform(target, "streams").unwrap().result.final_value;
            }
            gained
        }));
    }
    let ticker = {
        let sim = Arc::clone(&sim);
        tokio::task::spawn_blocking(move || {
            for i in 1..=20 {
                sim.tick(t0() + Duration::minutes(15 * i));
            }
        })
    };

    let mut performed = 0u64;
    for h in handles {
        performed += h.await.unwrap();
    }
    ticker.await.unwrap();

    let entity = sim.entity(target).unwrap();
    let passive: u64 = entity.history.iter().map(|h| h.increment).sum();
    assert_eq!(entity.history.len(), 20);
    assert_eq!(entity.metrics.streams, performed + passive);
}

#[tokio::test(start_paused = true)]
async fn run_loop_ticks_on_interval_and_publishes() {
    let mut cfg = compact_config();
    cfg.tick_interval_secs = 60;
    let sim = Arc::new(seeded_sim(cfg, 2));
    let (_, ids) = group_with_releases(&sim, "Loop", profile(200, 10_000, 40), 1);
    let mut events = sim.subscribe();

    let runner = {
        let sim = Arc::clone(&sim);
        tokio::spawn(async move { sim.run().await })
    };

    let mut ticks = 0;
    while ticks < 3 {
        match tokio::time::timeout(StdDuration::from_secs(600), events.recv()).await {
            Ok(Ok(SimEvent::TickCompleted { processed, .. })) => {
                assert_eq!(processed, 1);
                ticks += 1;
            }
            Ok(Ok(_)) => {}
            other => panic!("event stream ended early: {other:?}"),
        }
    }
    runner.abort();

    assert!(sim.history(ids[0]).unwrap().len() >= 3);
}

#[tokio::test]
async fn events_without_subscribers_are_dropped_silently() {
    let sim = seeded_sim(compact_config(), 4);
    let (_, ids) = group_with_releases(&sim, "Quiet", profile(200, 10_000, 40), 1);
    sim.start_promotion(ids[0], 3, t0()).unwrap();
    let out = sim.tick(t0());
    assert_eq!(out.growth.processed, 1);

    let mut late = sim.subscribe();
    assert!(late.try_recv().is_err());
    sim.end_promotion(ids[0]).unwrap();
    assert_eq!(
        late.try_recv().unwrap(),
        SimEvent::PromotionEnded { entity: ids[0] }
    );
}
