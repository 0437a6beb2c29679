//! Aggregation engine rebuilds over a seeded ledger

mod common;

use common::*;
use compare_vote::cache::CacheKey;
use compare_vote::directory::set_tool_status;
use compare_vote::ledger::insert_vote;
use compare_vote::model::{Category, ToolId, ToolStatus};
use rusqlite::params;
use serde_json::json;

const DAY: i64 = 86_400;

fn tool_row(fx: &Fixture, tool_id: ToolId, category: &str) -> (i64, i64, Option<f64>, String) {
    fx.db
        .lock()
        .unwrap()
        .query_row(
            "SELECT total_votes, total_wins, win_rate, trend FROM tool_stats
             WHERE tool_id = ?1 AND category = ?2",
            params![tool_id, category],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap()
}

#[test]
fn test_tool_stats_counts_locked_votes_on_active_matchups() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let live = fx.matchup(chatgpt, claude);
    let archived = fx.matchup(chatgpt, claude);

    for user in 1..=3 {
        fx.locked_vote(user, live, "overall", chatgpt, NOW - DAY);
    }
    fx.locked_vote(4, live, "overall", claude, NOW - DAY);
    {
        let conn = fx.db.lock().unwrap();
        insert_vote(&conn, 5, live, Category::Overall, claude, true, NOW - 10).unwrap();
    }
    for user in 1..=5 {
        fx.locked_vote(user, archived, "overall", claude, NOW - DAY);
    }
    fx.registry().archive(archived).unwrap();

    let (engine, _cache) = fx.engine();
    let summary = engine.recompute_tool_stats().unwrap();
    assert_eq!(summary.tools_updated, 2);
    assert_eq!(summary.rows_written, 10);

    let (votes, wins, rate, _) = tool_row(&fx, chatgpt, "overall");
    assert_eq!((votes, wins), (4, 3));
    assert_eq!(rate, Some(0.75));

    let (votes, wins, rate, _) = tool_row(&fx, claude, "overall");
    assert_eq!((votes, wins), (4, 1));
    assert_eq!(rate, Some(0.25));

    // No votes yet: a null rate, never zero
    let (votes, _, rate, _) = tool_row(&fx, chatgpt, "accuracy");
    assert_eq!(votes, 0);
    assert_eq!(rate, None);
}

#[test]
fn test_tool_trend_over_weekly_windows() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let matchup = fx.matchup(chatgpt, claude);

    // Previous week: ChatGPT wins 2 of 10. This week: 8 of 10.
    for user in 1..=10 {
        let winner = if user <= 2 { chatgpt } else { claude };
        fx.locked_vote(user, matchup, "creativity", winner, NOW - 10 * DAY);
    }
    for user in 11..=20 {
        let winner = if user <= 18 { chatgpt } else { claude };
        fx.locked_vote(user, matchup, "creativity", winner, NOW - 2 * DAY);
    }

    let (engine, _cache) = fx.engine();
    engine.recompute_tool_stats().unwrap();

    assert_eq!(tool_row(&fx, chatgpt, "creativity").3, "up");
    assert_eq!(tool_row(&fx, claude, "creativity").3, "down");
    assert_eq!(tool_row(&fx, chatgpt, "overall").3, "stable");
}

#[test]
fn test_tool_stats_drop_unranked_tools() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let (engine, _cache) = fx.engine();
    engine.recompute_tool_stats().unwrap();
    assert_eq!(fx.count("SELECT COUNT(*) FROM tool_stats"), 10);

    {
        let conn = fx.db.lock().unwrap();
        set_tool_status(&conn, claude, ToolStatus::Inactive).unwrap();
    }
    fx.advance(60);
    engine.recompute_tool_stats().unwrap();

    assert_eq!(fx.count("SELECT COUNT(*) FROM tool_stats"), 5);
    assert_eq!(
        fx.count(&format!("SELECT COUNT(*) FROM tool_stats WHERE tool_id = {}", chatgpt)),
        5
    );
}

#[test]
fn test_h2h_covers_every_pair() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let gemini = fx.tool("gemini", "Gemini", ToolStatus::Active);
    let jasper = fx.tool("jasper", "Jasper", ToolStatus::Pending);
    fx.tool("retired", "Retired", ToolStatus::Inactive);

    let matchup = fx.matchup(claude, chatgpt);
    for user in 1..=6 {
        let winner = if user <= 4 { claude } else { chatgpt };
        fx.locked_vote(user, matchup, "overall", winner, NOW - DAY);
    }

    let (engine, _cache) = fx.engine();
    let summary = engine.recompute_h2h_stats().unwrap();
    // 4 ranked tools → 6 pairs × 5 categories
    assert_eq!(summary.pairs_updated, 6);
    assert_eq!(summary.rows_written, 30);
    assert_eq!(fx.count("SELECT COUNT(*) FROM h2h_stats"), 30);
    assert_eq!(fx.count("SELECT COUNT(*) FROM h2h_stats WHERE tool_a >= tool_b"), 0);

    let conn = fx.db.lock().unwrap();
    let (total, a_wins, b_wins, a_rate, b_rate, confidence): (i64, i64, i64, f64, f64, String) = conn
        .query_row(
            "SELECT total_votes, tool_a_wins, tool_b_wins, tool_a_win_rate, tool_b_win_rate, confidence
             FROM h2h_stats WHERE tool_a = ?1 AND tool_b = ?2 AND category = 'overall'",
            params![chatgpt, claude],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
        )
        .unwrap();
    assert_eq!((total, a_wins, b_wins), (6, 2, 4));
    assert!((a_rate + b_rate - 1.0).abs() < 1e-9);
    assert_eq!(confidence, "low");

    let (rate, trend_a, trend_b): (Option<f64>, String, String) = conn
        .query_row(
            "SELECT tool_a_win_rate, tool_a_trend, tool_b_trend FROM h2h_stats
             WHERE tool_a = ?1 AND tool_b = ?2 AND category = 'accuracy'",
            params![gemini, jasper],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(rate, None);
    assert_eq!((trend_a.as_str(), trend_b.as_str()), ("new", "new"));
}

#[test]
fn test_user_stats_profile() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let first = fx.matchup(chatgpt, claude);
    let second = fx.matchup(chatgpt, claude);

    for user in 1..=2 {
        fx.locked_vote(user, first, "overall", chatgpt, NOW - 3 * DAY);
        fx.locked_vote(user, first, "accuracy", chatgpt, NOW - 3 * DAY);
    }
    // Agrees on overall, disagrees on accuracy
    fx.locked_vote(7, first, "overall", chatgpt, NOW - 2 * DAY);
    fx.locked_vote(7, first, "accuracy", claude, NOW - DAY);
    {
        let conn = fx.db.lock().unwrap();
        insert_vote(&conn, 7, second, Category::Overall, claude, true, NOW - 30).unwrap();
    }

    let (engine, _cache) = fx.engine();
    let stats = engine.recompute_user_stats(7).unwrap();

    assert_eq!(stats.total_votes, 3);
    assert_eq!(stats.total_matchups, 2);
    assert_eq!(stats.majority_agreement, 1);
    assert_eq!(stats.majority_rate, Some(0.5));
    // One locked win each: tie goes to the lower id
    assert_eq!(stats.favorite_tool_id, Some(chatgpt));
    assert_eq!(stats.favorite_tool_votes, 1);
    assert_eq!(stats.most_voted_category, Some(Category::Overall));
    assert_eq!((stats.current_streak, stats.longest_streak), (3, 3));
    assert_eq!(stats.last_voted_at, Some(NOW - 30));

    assert_eq!(engine.user_stats(7).unwrap(), Some(stats));
    assert_eq!(engine.user_stats(8).unwrap(), None);
}

#[test]
fn test_stale_user_sweep() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let matchup = fx.matchup(chatgpt, claude);
    let pipeline = fx.pipeline(compare_vote::VoteConfig::default());
    pipeline
        .submit_votes(&compare_vote::voting::VoteBatch::new(
            PREMIUM_USER,
            matchup,
            vec![compare_vote::model::VoteRequest::new("overall", chatgpt)],
        ))
        .unwrap();

    let (engine, _cache) = fx.engine();
    assert_eq!(engine.recompute_stale_user_stats().unwrap().users_updated, 1);
    assert_eq!(engine.recompute_stale_user_stats().unwrap().users_updated, 0);

    // The vote's lock time has now passed since the last computation
    fx.advance(301);
    assert_eq!(engine.recompute_stale_user_stats().unwrap().users_updated, 1);
    assert_eq!(engine.recompute_stale_user_stats().unwrap().users_updated, 0);
}

#[test]
fn test_rebuilds_clear_cache_user_refresh_does_not() {
    let fx = Fixture::new();
    two_tools(&fx);
    let (engine, cache) = fx.engine();

    cache.insert(CacheKey::Teaser, json!({ "success": true }));
    engine.recompute_user_stats(PREMIUM_USER).unwrap();
    assert_eq!(cache.len(), 1);

    engine.recompute_h2h_stats().unwrap();
    assert!(cache.is_empty());

    cache.insert(CacheKey::Matrix(Category::Overall), json!({}));
    engine.recompute_tool_stats().unwrap();
    assert!(cache.is_empty());
}

#[test]
fn test_recompute_all_logs_jobs() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let matchup = fx.matchup(chatgpt, claude);
    fx.locked_vote(1, matchup, "overall", chatgpt, NOW - DAY);

    let (engine, _cache) = fx.engine();
    let summary = engine.recompute_all().unwrap();
    assert_eq!(summary.tools_updated, 2);
    assert_eq!(summary.h2h_pairs_updated, 1);
    assert_eq!(summary.user_stats_updated, 1);

    let conn = fx.db.lock().unwrap();
    let jobs: Vec<(String, String, String)> = conn
        .prepare("SELECT job_name, status, details FROM job_log ORDER BY job_id")
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let names: Vec<&str> = jobs.iter().map(|(name, _, _)| name.as_str()).collect();
    assert_eq!(names, vec!["tool_stats", "h2h_stats", "user_vote_stats"]);
    assert!(jobs.iter().all(|(_, status, _)| status == "completed"));

    let details: serde_json::Value = serde_json::from_str(&jobs[1].2).unwrap();
    assert_eq!(details["pairs_updated"], 1);
    assert_eq!(details["rows_written"], 5);
}

#[test]
fn test_failed_job_is_logged_and_rolled_back() {
    let fx = Fixture::new();
    two_tools(&fx);
    let (engine, cache) = fx.engine();
    engine.recompute_h2h_stats().unwrap();
    cache.insert(CacheKey::Teaser, json!({}));

    fx.db
        .lock()
        .unwrap()
        .execute_batch("DROP TABLE tool_stats")
        .unwrap();

    assert!(engine.recompute_tool_stats().is_err());
    // Failed jobs leave the cache alone
    assert_eq!(cache.len(), 1);

    let conn = fx.db.lock().unwrap();
    let (status, error): (String, Option<String>) = conn
        .query_row(
            "SELECT status, error FROM job_log WHERE job_name = 'tool_stats'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(status, "failed");
    assert!(error.unwrap().contains("tool_stats"));
}
