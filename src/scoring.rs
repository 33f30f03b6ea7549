use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::PickemsResult;
use crate::record::{MAX_FREQUENCY, PlayoffFrequency, SWISS_LIMIT, SwissRecord, frequency_total, token_for};

// Ladder slots that must be resolved before a low frequency counts as a miss:
// 8 quarterfinalists, +4 semifinalists, +2 finalists, +1 champion.
const SEMIFINAL_SETTLED: u32 = 12;
const GRAND_FINAL_SETTLED: u32 = 14;
const CHAMPION_SETTLED: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Succeeded,
    Failed,
    Pending,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Succeeded => "[Succeeded]",
            Verdict::Failed => "[Failed]",
            Verdict::Pending => "[Pending]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PickCategory {
    Undefeated,
    Advance,
    Winless,
    Semifinal,
    GrandFinal,
    Champion,
}

impl PickCategory {
    fn heading(self) -> &'static str {
        match self {
            PickCategory::Undefeated => "[3-0]",
            PickCategory::Advance => "[3-1, 3-2]",
            PickCategory::Winless => "[0-3]",
            PickCategory::Semifinal => "Semi Finals",
            PickCategory::GrandFinal => "Grand Final",
            PickCategory::Champion => "Champion",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickOutcome {
    pub category: PickCategory,
    pub team: String,
    pub token: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scorecard {
    pub outcomes: Vec<PickOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
}

impl Scorecard {
    fn push(&mut self, outcome: PickOutcome) {
        match outcome.verdict {
            Verdict::Succeeded => self.succeeded += 1,
            Verdict::Failed => self.failed += 1,
            Verdict::Pending => self.pending += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Leaderboard score.
    pub fn net(&self) -> i64 {
        self.succeeded as i64 - self.failed as i64
    }
}

pub fn classify_swiss(category: PickCategory, record: SwissRecord) -> Verdict {
    let SwissRecord { wins, losses } = record;
    let undefeated = wins == SWISS_LIMIT && losses == 0;
    match category {
        PickCategory::Undefeated => {
            if losses >= 1 {
                Verdict::Failed
            } else if undefeated {
                Verdict::Succeeded
            } else {
                Verdict::Pending
            }
        }
        PickCategory::Advance => {
            // A 3-0 run is as wrong as elimination for a mid-table pick.
            if losses == SWISS_LIMIT || undefeated {
                Verdict::Failed
            } else if wins == SWISS_LIMIT {
                Verdict::Succeeded
            } else {
                Verdict::Pending
            }
        }
        PickCategory::Winless => {
            if wins >= 1 {
                Verdict::Failed
            } else if losses == SWISS_LIMIT {
                Verdict::Succeeded
            } else {
                Verdict::Pending
            }
        }
        PickCategory::Semifinal | PickCategory::GrandFinal | PickCategory::Champion => {
            Verdict::Pending
        }
    }
}

pub fn classify_playoff(category: PickCategory, frequency: PlayoffFrequency, total: u32) -> Verdict {
    let (reached, settled_at) = match category {
        PickCategory::Semifinal => (frequency.0 >= 2, SEMIFINAL_SETTLED),
        PickCategory::GrandFinal => (frequency.0 >= 3, GRAND_FINAL_SETTLED),
        PickCategory::Champion => (frequency.0 == MAX_FREQUENCY, CHAMPION_SETTLED),
        PickCategory::Undefeated | PickCategory::Advance | PickCategory::Winless => {
            return Verdict::Pending;
        }
    };
    if reached {
        Verdict::Succeeded
    } else if total >= settled_at {
        Verdict::Failed
    } else {
        Verdict::Pending
    }
}

pub fn score_swiss(
    undefeated: &[String],
    advance: &[String],
    winless: &[String],
    teams: &BTreeMap<String, String>,
) -> PickemsResult<Scorecard> {
    let mut card = Scorecard::default();
    let groups = [
        (PickCategory::Undefeated, undefeated),
        (PickCategory::Advance, advance),
        (PickCategory::Winless, winless),
    ];
    for (category, picks) in groups {
        for team in picks {
            let token = token_for(teams, team)?;
            let record = SwissRecord::parse(team, token)?;
            card.push(PickOutcome {
                category,
                team: team.clone(),
                token: record.to_string(),
                verdict: classify_swiss(category, record),
            });
        }
    }
    Ok(card)
}

pub fn score_playoff(
    semifinal: &[String],
    grand_final: &[String],
    champion: &str,
    teams: &BTreeMap<String, String>,
) -> PickemsResult<Scorecard> {
    let total = frequency_total(teams)?;
    let mut card = Scorecard::default();
    let champion = [champion.to_string()];
    let groups = [
        (PickCategory::Semifinal, semifinal),
        (PickCategory::GrandFinal, grand_final),
        (PickCategory::Champion, &champion[..]),
    ];
    for (category, picks) in groups {
        for team in picks {
            let token = token_for(teams, team)?;
            let frequency = PlayoffFrequency::parse(team, token)?;
            card.push(PickOutcome {
                category,
                team: team.clone(),
                token: frequency.0.to_string(),
                verdict: classify_playoff(category, frequency, total),
            });
        }
    }
    Ok(card)
}

pub fn render_report(user_name: &str, tournament: &str, card: &Scorecard) -> String {
    let mut out = format!("{user_name}'s picks are:\n");
    let mut heading = None;
    for outcome in &card.outcomes {
        let label = outcome.verdict.label();
        match outcome.category {
            PickCategory::Undefeated | PickCategory::Advance | PickCategory::Winless => {
                if heading != Some(outcome.category) {
                    let _ = writeln!(out, "{}", outcome.category.heading());
                    heading = Some(outcome.category);
                }
                let _ = writeln!(out, "{}: {} {label}", outcome.team, outcome.token);
            }
            PickCategory::Semifinal | PickCategory::GrandFinal => {
                let _ = writeln!(
                    out,
                    "- {} to make it to the {} {label}",
                    outcome.team,
                    outcome.category.heading()
                );
            }
            PickCategory::Champion => {
                let _ = writeln!(out, "- {} to win {tournament} {label}", outcome.team);
            }
        }
    }
    let _ = write!(
        out,
        "\nSucceeded: {}, Failed: {}, Pending: {}",
        card.succeeded, card.failed, card.pending
    );
    out
}
