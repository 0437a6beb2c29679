//! Matchup and vote endpoints
//!
//! The comparison UI sends `left`/`right`; the winner tool is resolved here
//! from the viewer's stable placement before the batch reaches the
//! [`VotePipeline`](crate::voting::VotePipeline).

use super::{internal, respond, ApiResponse, CompareApi};
use crate::cache::CacheKey;
use crate::clock::to_datetime;
use crate::error::{ErrorCode, VoteRejection};
use crate::model::{Category, MatchupId, MatchupView, PostId, SideVote, ToolId, UserId, Vote, VoteMetadata, VoteRequest};
use crate::registry::position_a_is_left;
use crate::voting::{VoteBatch, VoteOutcome};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};

const DEFAULT_PER_PAGE: i64 = 20;

/// Which tool a viewer meant by `left`/`right`
pub fn resolve_side(view: &MatchupView, position_a_left: bool, side: &str) -> Option<ToolId> {
    let m = &view.matchup;
    match (side, position_a_left) {
        ("left", true) | ("right", false) => Some(m.tool_a),
        ("right", true) | ("left", false) => Some(m.tool_b),
        _ => None,
    }
}

fn side_of(view: &MatchupView, position_a_left: bool, tool_id: ToolId) -> &'static str {
    if (tool_id == view.matchup.tool_a) == position_a_left {
        "left"
    } else {
        "right"
    }
}

fn percent(n: i64, total: i64) -> i64 {
    if total == 0 {
        0
    } else {
        ((n as f64 / total as f64) * 100.0).round() as i64
    }
}

/// Per-category tallies with both tool names
fn format_results(view: &MatchupView, counts: &BTreeMap<Category, HashMap<ToolId, i64>>) -> Value {
    let results: Map<String, Value> = counts
        .iter()
        .map(|(category, by_tool)| {
            let a_votes = by_tool.get(&view.matchup.tool_a).copied().unwrap_or(0);
            let b_votes = by_tool.get(&view.matchup.tool_b).copied().unwrap_or(0);
            let total = a_votes + b_votes;
            (
                category.as_str().to_string(),
                json!({
                    "tool_a_name": view.tool_a_name,
                    "tool_b_name": view.tool_b_name,
                    "tool_a_votes": a_votes,
                    "tool_b_votes": b_votes,
                    "tool_a_pct": percent(a_votes, total),
                    "tool_b_pct": percent(b_votes, total),
                    "total": total,
                }),
            )
        })
        .collect();
    Value::Object(results)
}

fn matchup_not_found(matchup_id: MatchupId) -> VoteRejection {
    VoteRejection::new(ErrorCode::MatchupNotFound, "Matchup not found")
        .with_details(json!({ "matchup_id": matchup_id }))
}

#[derive(Clone, Copy)]
enum Mode {
    Submit,
    Edit,
}

impl CompareApi {
    fn load_view(&self, matchup_id: MatchupId) -> Result<MatchupView, VoteRejection> {
        self.registry
            .get_matchup_view(matchup_id)
            .map_err(|e| internal("matchup lookup", e))?
            .ok_or_else(|| matchup_not_found(matchup_id))
    }

    fn results_for(&self, view: &MatchupView) -> Result<Value, VoteRejection> {
        let counts = self
            .ledger
            .get_matchup_vote_counts(view.matchup.matchup_id)
            .map_err(|e| internal("vote counts", e))?;
        Ok(format_results(view, &counts))
    }

    /// Matchup page data for one viewer: placement, the viewer's own votes
    /// as left/right, and results once a premium viewer has voted.
    pub fn get_matchup(&self, viewer: Option<UserId>, matchup_id: MatchupId) -> ApiResponse {
        respond(self.get_matchup_inner(viewer, matchup_id))
    }

    fn get_matchup_inner(
        &self,
        viewer: Option<UserId>,
        matchup_id: MatchupId,
    ) -> Result<ApiResponse, VoteRejection> {
        let view = self.load_view(matchup_id)?;
        let position_a_left = position_a_is_left(view.matchup.position_seed, viewer.unwrap_or(0));
        let total_votes = self
            .ledger
            .get_matchup_total_votes(matchup_id)
            .map_err(|e| internal("vote counts", e))?;

        let mut body = json!({
            "success": true,
            "matchup": view,
            "position_a_is_left": position_a_left,
            "total_vote_count": total_votes,
            "has_voted": false,
            "user_votes": {},
            "votes_locked": false,
            "results": null,
        });

        let Some(user_id) = viewer else {
            return Ok(ApiResponse::ok(body));
        };

        let votes: Vec<Vote> = self
            .ledger
            .get_user_votes_for_matchup(user_id, matchup_id)
            .map_err(|e| internal("user votes", e))?;
        if votes.is_empty() {
            return Ok(ApiResponse::ok(body));
        }

        let user_votes: Map<String, Value> = votes
            .iter()
            .map(|v| {
                (
                    v.category.as_str().to_string(),
                    json!(side_of(&view, position_a_left, v.winner_tool)),
                )
            })
            .collect();
        let first_voted_at = votes.iter().map(|v| v.voted_at).min();

        body["has_voted"] = json!(true);
        body["user_votes"] = Value::Object(user_votes);
        body["votes_locked"] = json!(votes.iter().any(|v| v.locked));
        body["voted_at"] = json!(first_voted_at.and_then(to_datetime));
        if self.is_premium(user_id)? {
            body["results"] = self.results_for(&view)?;
        }

        Ok(ApiResponse::ok(body))
    }

    /// POST: first votes on a matchup, `left`/`right` per category
    pub fn submit_votes(
        &self,
        viewer: Option<UserId>,
        matchup_id: MatchupId,
        votes: &[SideVote],
        metadata: VoteMetadata,
    ) -> ApiResponse {
        respond(self.write_votes(Mode::Submit, viewer, matchup_id, votes, metadata))
    }

    /// PATCH: change winners of existing, unlocked votes
    pub fn edit_votes(
        &self,
        viewer: Option<UserId>,
        matchup_id: MatchupId,
        votes: &[SideVote],
        metadata: VoteMetadata,
    ) -> ApiResponse {
        respond(self.write_votes(Mode::Edit, viewer, matchup_id, votes, metadata))
    }

    fn write_votes(
        &self,
        mode: Mode,
        viewer: Option<UserId>,
        matchup_id: MatchupId,
        votes: &[SideVote],
        metadata: VoteMetadata,
    ) -> Result<ApiResponse, VoteRejection> {
        let user_id = self.require_user(viewer)?;
        let view = self.load_view(matchup_id)?;
        let position_a_left = position_a_is_left(view.matchup.position_seed, user_id);

        let requests = votes
            .iter()
            .map(|v| {
                let winner_tool = resolve_side(&view, position_a_left, &v.winner).ok_or_else(|| {
                    VoteRejection::new(
                        ErrorCode::InvalidWinner,
                        format!("Winner must be 'left' or 'right', got '{}'", v.winner),
                    )
                    .with_details(json!({ "category": v.category }))
                })?;
                Ok(VoteRequest {
                    category: v.category.clone(),
                    winner_tool: Some(winner_tool),
                })
            })
            .collect::<Result<Vec<_>, VoteRejection>>()?;

        let batch = VoteBatch {
            user_id,
            matchup_id,
            votes: requests,
            position_a_left,
            metadata,
        };

        let outcome: VoteOutcome = match mode {
            Mode::Submit => self.pipeline.submit_votes(&batch),
            Mode::Edit => self.pipeline.edit_votes(&batch),
        }
        .map_err(|e| {
            if let Some(rejection) = e.rejection() {
                return rejection.clone();
            }
            log::error!("❌ Vote write failed for matchup {}: {}", matchup_id, e);
            e.to_rejection()
        })?;

        if let Err(e) = self.engine.recompute_user_stats(user_id) {
            log::warn!("⚠️  User stats refresh failed for user {}: {}", user_id, e);
        }

        let status = match mode {
            Mode::Submit => outcome.status_code(),
            Mode::Edit => 200,
        };
        Ok(ApiResponse::with_status(
            status,
            json!({
                "success": true,
                "vote_count": outcome.vote_ids.len(),
                "vote_ids": outcome.vote_ids,
                "edit_window_expires_at": outcome.edit_window_expires_at,
                "results": self.results_for(&view)?,
                "tool_a_name": view.tool_a_name,
                "tool_b_name": view.tool_b_name,
                "position_a_is_left": position_a_left,
            }),
        ))
    }

    /// Premium results for a matchup the viewer has voted on
    pub fn matchup_results(&self, viewer: Option<UserId>, matchup_id: MatchupId) -> ApiResponse {
        respond(self.matchup_results_inner(viewer, matchup_id))
    }

    fn matchup_results_inner(
        &self,
        viewer: Option<UserId>,
        matchup_id: MatchupId,
    ) -> Result<ApiResponse, VoteRejection> {
        let user_id = self.require_premium(viewer)?;
        let view = self.load_view(matchup_id)?;

        let voted = {
            let conn = self.db.lock().map_err(|e| internal("results", e))?;
            crate::ledger::has_voted_on_matchup(&conn, user_id, matchup_id)
                .map_err(|e| internal("results", e.into()))?
        };
        if !voted {
            return Err(VoteRejection::new(
                ErrorCode::VoteRequired,
                "Vote on this matchup to see the results",
            )
            .with_details(json!({ "matchup_id": matchup_id })));
        }

        let total_votes = self
            .ledger
            .get_matchup_total_votes(matchup_id)
            .map_err(|e| internal("results", e))?;
        Ok(ApiResponse::ok(json!({
            "success": true,
            "matchup_id": matchup_id,
            "results": self.results_for(&view)?,
            "total_votes": total_votes,
        })))
    }

    /// Featured matchup for the landing page
    pub fn featured_matchup(&self) -> ApiResponse {
        respond(
            self.cache
                .get_or_compute(CacheKey::FeaturedMatchup, || {
                    let featured = self
                        .registry
                        .featured_matchup()
                        .map_err(|e| internal("featured matchup", e))?;
                    Ok::<_, VoteRejection>(json!({ "success": true, "matchup": featured }))
                })
                .map(ApiResponse::cached),
        )
    }

    /// Active matchups, pinned first. `page` is 1-based.
    pub fn active_matchups(&self, page: Option<i64>, per_page: Option<i64>) -> ApiResponse {
        respond(
            self.registry
                .get_active_matchups(page.unwrap_or(1), per_page.unwrap_or(DEFAULT_PER_PAGE))
                .map_err(|e| internal("active matchups", e))
                .map(|page| {
                    ApiResponse::ok(json!({
                        "success": true,
                        "matchups": page.matchups,
                        "total": page.total,
                        "page": page.page,
                        "pages": page.pages,
                    }))
                }),
        )
    }

    /// Active matchups that include a post
    pub fn matchups_for_post(&self, post_id: PostId) -> ApiResponse {
        respond(
            self.registry
                .get_active_matchups_for_post(post_id)
                .map_err(|e| internal("post matchups", e))
                .map(|matchups| {
                    ApiResponse::ok(json!({
                        "success": true,
                        "post_id": post_id,
                        "matchups": matchups,
                    }))
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Matchup, MatchupStatus};

    fn view() -> MatchupView {
        MatchupView {
            matchup: Matchup {
                matchup_id: 1,
                post_a_id: 10,
                post_b_id: 20,
                tool_a: 1,
                tool_b: 2,
                prompt_id: None,
                position_seed: 0,
                status: MatchupStatus::Active,
                is_pinned: false,
                created_at: 0,
            },
            tool_a_name: "ChatGPT".to_string(),
            tool_a_slug: "chatgpt".to_string(),
            tool_b_name: "Claude".to_string(),
            tool_b_slug: "claude".to_string(),
            title_a: "A".to_string(),
            title_b: "B".to_string(),
        }
    }

    #[test]
    fn test_resolve_side_follows_placement() {
        let v = view();
        assert_eq!(resolve_side(&v, true, "left"), Some(1));
        assert_eq!(resolve_side(&v, true, "right"), Some(2));
        assert_eq!(resolve_side(&v, false, "left"), Some(2));
        assert_eq!(resolve_side(&v, false, "right"), Some(1));
        assert_eq!(resolve_side(&v, true, "middle"), None);
        assert_eq!(resolve_side(&v, true, "Left"), None);
    }

    #[test]
    fn test_side_of_inverts_resolve() {
        let v = view();
        for a_left in [true, false] {
            for side in ["left", "right"] {
                let tool = resolve_side(&v, a_left, side).unwrap();
                assert_eq!(side_of(&v, a_left, tool), side);
            }
        }
    }

    #[test]
    fn test_format_results_percentages() {
        let v = view();
        let mut counts = BTreeMap::new();
        counts.insert(Category::Overall, HashMap::from([(1, 2), (2, 1)]));
        counts.insert(Category::Accuracy, HashMap::from([(2, 4)]));

        let results = format_results(&v, &counts);
        assert_eq!(results["overall"]["tool_a_pct"], 67);
        assert_eq!(results["overall"]["tool_b_pct"], 33);
        assert_eq!(results["accuracy"]["tool_a_votes"], 0);
        assert_eq!(results["accuracy"]["tool_b_pct"], 100);
        assert_eq!(results["accuracy"]["tool_b_name"], "Claude");
    }
}
