use serde::{Deserialize, Serialize};

use crate::stage::StageKind;

pub const SWISS_PICKS: usize = 10;
pub const PLAYOFF_PICKS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub user_id: String,
    pub user_name: String,
    pub picks: Picks,
}

/// A user's picks for one stage. Team names are stored lower case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum Picks {
    Swiss {
        undefeated: [String; 2],
        advance: [String; 6],
        winless: [String; 2],
    },
    Playoff {
        semifinal: [String; 4],
        grand_final: [String; 2],
        champion: String,
    },
}

impl Picks {
    /// Ordered as entered: undefeated, advance, winless.
    pub fn swiss_from(teams: Vec<String>) -> Option<Self> {
        if teams.len() != SWISS_PICKS {
            return None;
        }
        let mut it = teams.into_iter();
        Some(Self::Swiss {
            undefeated: take_array(&mut it)?,
            advance: take_array(&mut it)?,
            winless: take_array(&mut it)?,
        })
    }

    /// Ordered as entered: four semifinalists, two finalists, the champion.
    pub fn playoff_from(teams: Vec<String>) -> Option<Self> {
        if teams.len() != PLAYOFF_PICKS {
            return None;
        }
        let mut it = teams.into_iter();
        let semifinal = take_array(&mut it)?;
        let grand_final = take_array(&mut it)?;
        let champion = it.next()?;
        Some(Self::Playoff {
            semifinal,
            grand_final,
            champion,
        })
    }

    pub fn kind(&self) -> StageKind {
        match self {
            Self::Swiss { .. } => StageKind::Swiss,
            Self::Playoff { .. } => StageKind::Playoff,
        }
    }

    pub fn teams(&self) -> Vec<&str> {
        match self {
            Self::Swiss {
                undefeated,
                advance,
                winless,
            } => undefeated
                .iter()
                .chain(advance.iter())
                .chain(winless.iter())
                .map(String::as_str)
                .collect(),
            Self::Playoff {
                semifinal,
                grand_final,
                champion,
            } => semifinal
                .iter()
                .chain(grand_final.iter())
                .chain(std::iter::once(champion))
                .map(String::as_str)
                .collect(),
        }
    }
}

fn take_array<const N: usize>(it: &mut impl Iterator<Item = String>) -> Option<[String; N]> {
    let chunk: Vec<String> = it.by_ref().take(N).collect();
    chunk.try_into().ok()
}
