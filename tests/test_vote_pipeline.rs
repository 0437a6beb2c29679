//! Submit / edit / cast pipelines against a real SQLite file

mod common;

use common::*;
use compare_vote::audit::events_for;
use compare_vote::error::ErrorCode;
use compare_vote::ledger::{user_votes_for_matchup, VoteLedger};
use compare_vote::model::{Category, MatchupId, ToolId, UserId, VoteEventType, VoteRequest};
use compare_vote::voting::{CastStatus, VoteBatch, VoteOutcome, VotePipeline};
use compare_vote::{Database, VoteConfig, VoteError};
use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

fn batch(user_id: UserId, matchup_id: MatchupId, votes: &[(&str, ToolId)]) -> VoteBatch {
    VoteBatch::new(
        user_id,
        matchup_id,
        votes.iter().map(|(c, w)| VoteRequest::new(*c, *w)).collect(),
    )
}

fn code(result: Result<VoteOutcome, VoteError>) -> ErrorCode {
    match result {
        Err(e) => e.rejection().expect("expected a rejection").code,
        Ok(outcome) => panic!("expected a rejection, got {:?}", outcome),
    }
}

fn winners(fx: &Fixture, user_id: UserId, matchup_id: MatchupId) -> HashMap<Category, (ToolId, bool)> {
    let conn = fx.db.lock().unwrap();
    user_votes_for_matchup(&conn, user_id, matchup_id)
        .unwrap()
        .into_iter()
        .map(|v| (v.category, (v.winner_tool, v.locked)))
        .collect()
}

fn setup() -> (Fixture, ToolId, ToolId, MatchupId, VotePipeline) {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let matchup = fx.matchup(claude, chatgpt);
    let pipeline = fx.pipeline(VoteConfig::default());
    (fx, chatgpt, claude, matchup, pipeline)
}

#[test]
fn test_submit_then_edit_within_window() {
    let (fx, chatgpt, claude, matchup, pipeline) = setup();

    let outcome = pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt), ("accuracy", chatgpt)]))
        .unwrap();
    assert_eq!(outcome.status_code(), 201);
    assert_eq!(outcome.vote_ids.len(), 2);
    assert_eq!(
        outcome.edit_window_expires_at.map(|dt| dt.timestamp()),
        Some(NOW + 300)
    );

    fx.advance(60);
    let edited = pipeline
        .edit_votes(&batch(PREMIUM_USER, matchup, &[("overall", claude)]))
        .unwrap();
    assert_eq!(edited.status_code(), 200);
    assert_eq!(edited.vote_ids, vec![outcome.vote_ids[0]]);
    assert_eq!(
        edited.edit_window_expires_at.map(|dt| dt.timestamp()),
        Some(NOW + 60 + 300)
    );

    let stored = winners(&fx, PREMIUM_USER, matchup);
    assert_eq!(stored[&Category::Overall], (claude, false));
    assert_eq!(stored[&Category::Accuracy], (chatgpt, false));
}

#[test]
fn test_edit_after_window_locks_row() {
    let (fx, chatgpt, claude, matchup, pipeline) = setup();
    pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt), ("accuracy", chatgpt)]))
        .unwrap();

    // Sweep never ran: the edit itself must enforce the window
    fx.backdate_votes(PREMIUM_USER, matchup, 600);
    let result = pipeline.edit_votes(&batch(PREMIUM_USER, matchup, &[("overall", claude)]));

    let rejection = result.unwrap_err().to_rejection();
    assert_eq!(rejection.code, ErrorCode::VoteLocked);
    assert_eq!(rejection.status(), 409);
    assert_eq!(rejection.details["category"], "overall");

    let stored = winners(&fx, PREMIUM_USER, matchup);
    assert_eq!(stored[&Category::Overall], (chatgpt, true));
    // Not part of the request: left for the sweep
    assert_eq!(stored[&Category::Accuracy], (chatgpt, false));

    let conn = fx.db.lock().unwrap();
    let kinds: Vec<VoteEventType> = events_for(&conn, PREMIUM_USER, matchup)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![VoteEventType::Submit, VoteEventType::Lock, VoteEventType::Reject]
    );
}

#[test]
fn test_locked_vote_cannot_be_resubmitted_differently() {
    let (fx, chatgpt, claude, matchup, pipeline) = setup();
    pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt)]))
        .unwrap();

    fx.advance(301);
    let swept = VoteLedger::new(fx.db.clone(), fx.clock.clone(), 300)
        .lock_expired_votes()
        .unwrap();
    assert_eq!(swept, 1);

    assert_eq!(
        code(pipeline.submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", claude)]))),
        ErrorCode::VoteLocked
    );
    assert_eq!(
        code(pipeline.edit_votes(&batch(PREMIUM_USER, matchup, &[("overall", claude)]))),
        ErrorCode::VoteLocked
    );
}

#[test]
fn test_free_tier_weekly_allowance() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let pipeline = fx.pipeline(free_config(3));
    let matchups: Vec<MatchupId> = (0..4).map(|_| fx.matchup(chatgpt, claude)).collect();

    for &m in &matchups[..3] {
        pipeline
            .submit_votes(&batch(FREE_USER, m, &[("overall", chatgpt)]))
            .unwrap();
    }

    let rejection = pipeline
        .submit_votes(&batch(FREE_USER, matchups[3], &[("overall", chatgpt)]))
        .unwrap_err()
        .to_rejection();
    assert_eq!(rejection.code, ErrorCode::FreeLimitReached);
    assert_eq!(rejection.status(), 403);
    assert_eq!(rejection.details["used"], 3);
    assert_eq!(rejection.details["limit"], 3);
    assert_eq!(rejection.details["resets_at"], "2024-01-22T00:00:00Z");

    // Same matchup again: no new slot needed
    let again = pipeline
        .submit_votes(&batch(FREE_USER, matchups[0], &[("accuracy", claude)]))
        .unwrap();
    assert_eq!(again.status_code(), 201);

    // New week, fresh allowance
    fx.set_now(NEXT_MONDAY);
    pipeline
        .submit_votes(&batch(FREE_USER, matchups[3], &[("overall", chatgpt)]))
        .unwrap();
}

#[test]
fn test_free_user_without_bootstrap_needs_premium() {
    let (fx, chatgpt, _claude, matchup, pipeline) = setup();

    assert_eq!(
        code(pipeline.submit_votes(&batch(FREE_USER, matchup, &[("overall", chatgpt)]))),
        ErrorCode::PremiumRequired
    );
    assert_eq!(fx.count("SELECT COUNT(*) FROM votes"), 0);
}

#[test]
fn test_free_user_edits_only_existing_matchups() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let matchup = fx.matchup(chatgpt, claude);
    let pipeline = fx.pipeline(free_config(1));

    assert_eq!(
        code(pipeline.edit_votes(&batch(FREE_USER, matchup, &[("overall", claude)]))),
        ErrorCode::PremiumRequired
    );

    pipeline
        .submit_votes(&batch(FREE_USER, matchup, &[("overall", chatgpt)]))
        .unwrap();
    pipeline
        .edit_votes(&batch(FREE_USER, matchup, &[("overall", claude)]))
        .unwrap();
    assert_eq!(winners(&fx, FREE_USER, matchup)[&Category::Overall].0, claude);
}

#[test]
fn test_invalid_winner_writes_nothing() {
    let (fx, chatgpt, _claude, matchup, pipeline) = setup();
    let outsider = fx.tool("gemini", "Gemini", compare_vote::model::ToolStatus::Active);

    let rejection = pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt), ("accuracy", outsider)]))
        .unwrap_err()
        .to_rejection();
    assert_eq!(rejection.code, ErrorCode::InvalidWinner);
    assert_eq!(rejection.details["category"], "accuracy");
    assert_eq!(rejection.details["winner_tool"], outsider);

    assert_eq!(fx.count("SELECT COUNT(*) FROM votes"), 0);
    assert_eq!(
        fx.count("SELECT COUNT(*) FROM vote_events WHERE event_type = 'reject' AND error_code = 'INVALID_WINNER'"),
        1
    );
}

#[test]
fn test_identical_resubmit_is_noop() {
    let (fx, chatgpt, claude, matchup, pipeline) = setup();
    let votes = [("overall", chatgpt), ("creativity", claude)];

    let first = pipeline.submit_votes(&batch(PREMIUM_USER, matchup, &votes)).unwrap();
    fx.advance(30);
    let second = pipeline.submit_votes(&batch(PREMIUM_USER, matchup, &votes)).unwrap();

    assert_eq!(second.status_code(), 200);
    assert_eq!(second.vote_ids, first.vote_ids);
    assert!(second.is_noop());
    assert_eq!(fx.count("SELECT COUNT(*) FROM votes"), 2);
}

#[test]
fn test_partial_overlap_inserts_only_missing() {
    let (fx, chatgpt, _claude, matchup, pipeline) = setup();
    let first = pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt)]))
        .unwrap();

    let second = pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt), ("usefulness", chatgpt)]))
        .unwrap();
    assert_eq!(second.status_code(), 201);
    assert_eq!(second.vote_ids[0], first.vote_ids[0]);
    assert_eq!(fx.count("SELECT COUNT(*) FROM votes"), 2);
}

#[test]
fn test_differing_existing_votes_need_patch() {
    let (fx, chatgpt, claude, matchup, pipeline) = setup();
    pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt)]))
        .unwrap();

    let rejection = pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", claude), ("accuracy", claude)]))
        .unwrap_err()
        .to_rejection();
    assert_eq!(rejection.code, ErrorCode::ExistingVotesUsePatch);
    assert_eq!(rejection.details["categories"], serde_json::json!(["overall"]));

    // Never partially applied: accuracy was not inserted
    assert_eq!(fx.count("SELECT COUNT(*) FROM votes"), 1);
    assert_eq!(winners(&fx, PREMIUM_USER, matchup)[&Category::Overall].0, chatgpt);
}

#[test]
fn test_payload_validation() {
    let (fx, chatgpt, _claude, matchup, pipeline) = setup();

    assert_eq!(code(pipeline.submit_votes(&batch(PREMIUM_USER, matchup, &[]))), ErrorCode::InvalidPayload);

    let six: Vec<(&str, ToolId)> = ["overall", "accuracy", "creativity", "usefulness", "writing_quality", "overall"]
        .iter()
        .map(|c| (*c, chatgpt))
        .collect();
    assert_eq!(code(pipeline.submit_votes(&batch(PREMIUM_USER, matchup, &six))), ErrorCode::InvalidPayload);

    assert_eq!(
        code(pipeline.submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt), ("overall", chatgpt)]))),
        ErrorCode::DuplicateCategory
    );
    assert_eq!(
        code(pipeline.submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt), ("speed", chatgpt)]))),
        ErrorCode::InvalidCategory
    );

    let mut missing_winner = batch(PREMIUM_USER, matchup, &[("overall", chatgpt)]);
    missing_winner.votes[0].winner_tool = None;
    assert_eq!(code(pipeline.submit_votes(&missing_winner)), ErrorCode::InvalidWinner);

    assert_eq!(fx.count("SELECT COUNT(*) FROM votes"), 0);
    assert_eq!(fx.count("SELECT COUNT(*) FROM vote_events WHERE event_type = 'reject'"), 5);
}

#[test]
fn test_matchup_state_checks() {
    let (fx, chatgpt, _claude, matchup, pipeline) = setup();

    assert_eq!(
        code(pipeline.submit_votes(&batch(PREMIUM_USER, 9_999, &[("overall", chatgpt)]))),
        ErrorCode::MatchupNotFound
    );

    fx.registry().archive(matchup).unwrap();
    assert_eq!(
        code(pipeline.submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt)]))),
        ErrorCode::MatchupInactive
    );
}

#[test]
fn test_new_category_via_patch_rejected() {
    let (fx, chatgpt, claude, matchup, pipeline) = setup();
    pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt)]))
        .unwrap();

    let rejection = pipeline
        .edit_votes(&batch(PREMIUM_USER, matchup, &[("overall", claude), ("accuracy", claude)]))
        .unwrap_err()
        .to_rejection();
    assert_eq!(rejection.code, ErrorCode::NewVoteViaPatch);
    assert_eq!(rejection.details["category"], "accuracy");
    assert_eq!(winners(&fx, PREMIUM_USER, matchup)[&Category::Overall].0, chatgpt);
}

#[test]
fn test_edit_with_same_winner_is_noop() {
    let (fx, chatgpt, _claude, matchup, pipeline) = setup();
    pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt)]))
        .unwrap();
    fx.advance(120);

    let outcome = pipeline
        .edit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt)]))
        .unwrap();
    assert!(outcome.is_noop());

    // voted_at untouched: the window still counts from the original vote
    let voted_at: i64 = fx.count("SELECT voted_at FROM votes");
    assert_eq!(voted_at, NOW);
}

#[test]
fn test_daily_rate_limit() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let first = fx.matchup(chatgpt, claude);
    let second = fx.matchup(chatgpt, claude);
    let pipeline = fx.pipeline(VoteConfig {
        daily_vote_limit: 2,
        ..VoteConfig::default()
    });

    pipeline
        .submit_votes(&batch(PREMIUM_USER, first, &[("overall", chatgpt), ("accuracy", claude)]))
        .unwrap();

    let rejection = pipeline
        .submit_votes(&batch(PREMIUM_USER, second, &[("overall", chatgpt)]))
        .unwrap_err()
        .to_rejection();
    assert_eq!(rejection.code, ErrorCode::RateLimited);
    assert_eq!(rejection.status(), 429);
    assert_eq!(rejection.details["current"], 2);
    assert_eq!(rejection.details["limit"], 2);
    assert_eq!(rejection.details["requested"], 1);

    // Trailing 24 hours
    fx.advance(86_401);
    pipeline
        .submit_votes(&batch(PREMIUM_USER, second, &[("overall", chatgpt)]))
        .unwrap();
}

#[test]
fn test_legacy_cast_vote() {
    let (fx, chatgpt, claude, matchup, pipeline) = setup();

    let first = pipeline.cast_vote(PREMIUM_USER, matchup, "overall", chatgpt).unwrap();
    assert_eq!(first.status, CastStatus::Recorded);

    let overwrite = pipeline.cast_vote(PREMIUM_USER, matchup, "overall", claude).unwrap();
    assert_eq!(overwrite.status, CastStatus::Recorded);
    assert_eq!(overwrite.vote_id, first.vote_id);
    assert_eq!(winners(&fx, PREMIUM_USER, matchup)[&Category::Overall].0, claude);

    fx.lock_all();
    let blocked = pipeline.cast_vote(PREMIUM_USER, matchup, "overall", chatgpt).unwrap();
    assert_eq!(blocked.status, CastStatus::Locked);
    assert_eq!(blocked.vote_id, first.vote_id);
    assert_eq!(winners(&fx, PREMIUM_USER, matchup)[&Category::Overall], (claude, true));
}

#[test]
fn test_concurrent_identical_submits_serialize() {
    let fx = Fixture::new();
    let (chatgpt, claude) = two_tools(&fx);
    let matchup = fx.matchup(chatgpt, claude);

    // Separate connections to the same file, as two server processes would have
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let db = Database::open(fx.db_path()).unwrap();
            let pipeline = VotePipeline::new(db, fx.roster.clone(), fx.clock.clone(), VoteConfig::default());
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                pipeline
                    .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt), ("accuracy", claude)]))
                    .unwrap()
            })
        })
        .collect();

    let mut outcomes: Vec<VoteOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    outcomes.sort_by_key(|o| o.status_code());

    assert_eq!(outcomes[0].status_code(), 200);
    assert_eq!(outcomes[1].status_code(), 201);
    assert_eq!(outcomes[0].vote_ids, outcomes[1].vote_ids);
    assert_eq!(fx.count("SELECT COUNT(*) FROM votes"), 2);
}

#[test]
fn test_locked_row_is_frozen_by_trigger() {
    let (fx, chatgpt, claude, matchup, pipeline) = setup();
    pipeline
        .submit_votes(&batch(PREMIUM_USER, matchup, &[("overall", chatgpt)]))
        .unwrap();
    fx.lock_all();

    let conn = fx.db.lock().unwrap();
    let result = conn.execute(
        "UPDATE votes SET winner_tool = ?1",
        rusqlite::params![claude],
    );
    assert!(result.is_err());
}
