use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::ResultsSnapshot;
use crate::error::{PickemsError, PickemsResult};
use crate::parser;
use crate::prediction::{PLAYOFF_PICKS, Picks, SWISS_PICKS};
use crate::scoring::{self, Scorecard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Opening,
    Elimination,
    Playoffs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Swiss,
    Playoff,
}

impl Stage {
    pub fn kind(self) -> StageKind {
        match self {
            Stage::Opening | Stage::Elimination => StageKind::Swiss,
            Stage::Playoffs => StageKind::Playoff,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Opening => "opening",
            Stage::Elimination => "elimination",
            Stage::Playoffs => "playoffs",
        }
    }

    /// Last path segment of the stage's results page.
    pub fn page_suffix(self) -> &'static str {
        match self {
            Stage::Opening => "Opening_Stage",
            Stage::Elimination => "Elimination_Stage",
            Stage::Playoffs => "Playoff_Stage",
        }
    }

    pub fn rules(self) -> &'static dyn StageRules {
        match self.kind() {
            StageKind::Swiss => &SwissRules,
            StageKind::Playoff => &PlayoffRules,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opening" => Ok(Stage::Opening),
            "elimination" => Ok(Stage::Elimination),
            "playoffs" | "playoff" => Ok(Stage::Playoffs),
            other => Err(format!(
                "unknown stage {other:?}; expected opening, elimination or playoffs"
            )),
        }
    }
}

/// Everything that differs between swiss and playoff stages.
pub trait StageRules: Send + Sync {
    fn kind(&self) -> StageKind;

    fn pick_count(&self) -> usize;

    /// Check arity and team membership, returning the normalized team names.
    fn validate(
        &self,
        tokens: &[String],
        valid_teams: &BTreeSet<String>,
    ) -> PickemsResult<Vec<String>> {
        parser::validate_picks(tokens, self.pick_count(), valid_teams)
    }

    /// Arrange already-validated team names into the stage's pick slots.
    fn parse(&self, teams: Vec<String>) -> PickemsResult<Picks>;

    fn score(&self, picks: &Picks, snapshot: &ResultsSnapshot) -> PickemsResult<Scorecard>;
}

pub struct SwissRules;

pub struct PlayoffRules;

impl StageRules for SwissRules {
    fn kind(&self) -> StageKind {
        StageKind::Swiss
    }

    fn pick_count(&self) -> usize {
        SWISS_PICKS
    }

    fn parse(&self, teams: Vec<String>) -> PickemsResult<Picks> {
        let got = teams.len();
        Picks::swiss_from(teams).ok_or(PickemsError::WrongPickCount {
            expected: SWISS_PICKS,
            got,
        })
    }

    fn score(&self, picks: &Picks, snapshot: &ResultsSnapshot) -> PickemsResult<Scorecard> {
        let Picks::Swiss {
            undefeated,
            advance,
            winless,
        } = picks
        else {
            return Err(shape_mismatch(picks, self.kind()));
        };
        scoring::score_swiss(undefeated, advance, winless, &snapshot.teams)
    }
}

impl StageRules for PlayoffRules {
    fn kind(&self) -> StageKind {
        StageKind::Playoff
    }

    fn pick_count(&self) -> usize {
        PLAYOFF_PICKS
    }

    fn parse(&self, teams: Vec<String>) -> PickemsResult<Picks> {
        let got = teams.len();
        Picks::playoff_from(teams).ok_or(PickemsError::WrongPickCount {
            expected: PLAYOFF_PICKS,
            got,
        })
    }

    fn score(&self, picks: &Picks, snapshot: &ResultsSnapshot) -> PickemsResult<Scorecard> {
        let Picks::Playoff {
            semifinal,
            grand_final,
            champion,
        } = picks
        else {
            return Err(shape_mismatch(picks, self.kind()));
        };
        scoring::score_playoff(semifinal, grand_final, champion, &snapshot.teams)
    }
}

fn shape_mismatch(picks: &Picks, expected: StageKind) -> PickemsError {
    PickemsError::Store(format!(
        "stored {:?} prediction cannot be scored under {:?} rules",
        picks.kind(),
        expected
    ))
}
