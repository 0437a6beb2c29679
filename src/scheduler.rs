//! Background schedulers for the vote runtime
//!
//! Both tasks run forever on a tokio `interval`; the synchronous SQLite work
//! goes to `spawn_blocking`. A failed run is logged and the loop keeps
//! ticking.

use crate::aggregation::AggregationEngine;
use crate::ledger::VoteLedger;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Lock sweep task - periodically lock votes whose edit window has passed
pub async fn lock_sweep_task(ledger: Arc<VoteLedger>, sweep_interval_ms: u64) {
    log::info!("⏰ Starting lock sweep (interval: {}ms)", sweep_interval_ms);

    let mut timer = interval(Duration::from_millis(sweep_interval_ms));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        let ledger = ledger.clone();
        match tokio::task::spawn_blocking(move || ledger.lock_expired_votes()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::error!("❌ Lock sweep failed: {}", e),
            Err(e) => log::error!("❌ Lock sweep task panicked: {}", e),
        }
    }
}

/// Recompute task - tool stats, head-to-head and stale user stats
pub async fn recompute_task(engine: Arc<AggregationEngine>, recompute_interval_ms: u64) {
    log::info!("⏰ Starting aggregate recompute (interval: {}ms)", recompute_interval_ms);

    let mut timer = interval(Duration::from_millis(recompute_interval_ms));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        let engine = engine.clone();
        match tokio::task::spawn_blocking(move || engine.recompute_all()).await {
            Ok(Ok(summary)) => {
                log::info!("📊 Recompute finished");
                log::info!("   ├─ Tools: {}", summary.tools_updated);
                log::info!("   ├─ H2H pairs: {}", summary.h2h_pairs_updated);
                log::info!("   ├─ Users: {}", summary.user_stats_updated);
                log::info!("   └─ Took: {}ms", summary.duration_ms);
            }
            Ok(Err(e)) => log::error!("❌ Recompute failed: {}", e),
            Err(e) => log::error!("❌ Recompute task panicked: {}", e),
        }
    }
}
