use std::cmp::Reverse;
use std::fmt::Write as _;

use rayon::prelude::*;
use serde::Serialize;

use crate::cache::ResultsSnapshot;
use crate::error::PickemsResult;
use crate::prediction::Prediction;
use crate::stage::StageRules;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub user_id: String,
    pub user_name: String,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
}

impl Standing {
    pub fn net(&self) -> i64 {
        self.succeeded as i64 - self.failed as i64
    }
}

/// Score every prediction against one snapshot, keeping input order.
pub fn score_all(
    rules: &dyn StageRules,
    predictions: &[Prediction],
    snapshot: &ResultsSnapshot,
) -> PickemsResult<Vec<Standing>> {
    predictions
        .par_iter()
        .map(|prediction| {
            let card = rules.score(&prediction.picks, snapshot)?;
            Ok(Standing {
                user_id: prediction.user_id.clone(),
                user_name: prediction.user_name.clone(),
                succeeded: card.succeeded,
                failed: card.failed,
                pending: card.pending,
            })
        })
        .collect()
}

/// Highest (succeeded - failed) first. Ties keep their input order; there is
/// no secondary key.
pub fn rank(mut standings: Vec<Standing>) -> Vec<Standing> {
    standings.sort_by_key(|s| Reverse(s.net()));
    standings
}

pub fn render_leaderboard(standings: &[Standing]) -> String {
    if standings.is_empty() {
        return "No Pickems have been set for this stage yet".to_string();
    }
    let mut out = String::from("The users with the best pickems are:\n");
    for (idx, s) in standings.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {}, {} successes, {} failures",
            idx + 1,
            s.user_name,
            s.succeeded,
            s.failed
        );
    }
    out
}
