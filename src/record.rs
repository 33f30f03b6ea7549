use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PickemsError, PickemsResult};

/// Swiss stages end at three wins or three losses.
pub const SWISS_LIMIT: u8 = 3;
/// Quarterfinal, semifinal and grand-final appearances plus the title.
pub const MAX_FREQUENCY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwissRecord {
    pub wins: u8,
    pub losses: u8,
}

impl SwissRecord {
    pub fn new(wins: u8, losses: u8) -> Self {
        Self { wins, losses }
    }

    pub fn parse(team: &str, token: &str) -> PickemsResult<Self> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(PickemsError::MissingRecord {
                team: team.to_string(),
            });
        }
        if trimmed == "-" {
            return Ok(Self::default());
        }
        let malformed = || PickemsError::MalformedRecord {
            team: team.to_string(),
            token: token.to_string(),
        };
        let (wins, losses) = trimmed.split_once('-').ok_or_else(malformed)?;
        if losses.contains('-') {
            return Err(malformed());
        }
        let wins = wins.trim().parse::<u8>().map_err(|_| malformed())?;
        let losses = losses.trim().parse::<u8>().map_err(|_| malformed())?;
        if wins > SWISS_LIMIT || losses > SWISS_LIMIT {
            return Err(malformed());
        }
        Ok(Self { wins, losses })
    }
}

impl fmt::Display for SwissRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.wins, self.losses)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PlayoffFrequency(pub u8);

impl PlayoffFrequency {
    pub fn parse(team: &str, token: &str) -> PickemsResult<Self> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(PickemsError::MissingRecord {
                team: team.to_string(),
            });
        }
        let value = trimmed
            .parse::<u8>()
            .ok()
            .filter(|v| *v <= MAX_FREQUENCY)
            .ok_or_else(|| PickemsError::MalformedRecord {
                team: team.to_string(),
                token: token.to_string(),
            })?;
        Ok(Self(value))
    }
}

/// Look up a team's raw token, treating absence as a data error.
pub fn token_for<'a>(teams: &'a BTreeMap<String, String>, team: &str) -> PickemsResult<&'a str> {
    teams
        .get(team)
        .map(String::as_str)
        .ok_or_else(|| PickemsError::MissingRecord {
            team: team.to_string(),
        })
}

/// Sum of every team's frequency; how many ladder slots have resolved so far.
pub fn frequency_total(teams: &BTreeMap<String, String>) -> PickemsResult<u32> {
    teams.iter().try_fold(0u32, |acc, (team, token)| {
        PlayoffFrequency::parse(team, token).map(|f| acc + u32::from(f.0))
    })
}

#[cfg(test)]
mod tests {
    use super::{PlayoffFrequency, SwissRecord};

    #[test]
    fn swiss_tokens_parse() {
        assert_eq!(SwissRecord::parse("a", "3-0").unwrap(), SwissRecord::new(3, 0));
        assert_eq!(SwissRecord::parse("a", " 1-2 ").unwrap(), SwissRecord::new(1, 2));
        assert_eq!(SwissRecord::parse("a", "-").unwrap(), SwissRecord::new(0, 0));
    }

    #[test]
    fn swiss_rejects_garbage() {
        assert!(SwissRecord::parse("a", "").unwrap_err().is_upstream());
        assert!(SwissRecord::parse("a", "3").is_err());
        assert!(SwissRecord::parse("a", "1-2-3").is_err());
        assert!(SwissRecord::parse("a", "4-0").is_err());
        assert!(SwissRecord::parse("a", "x-1").is_err());
    }

    #[test]
    fn frequency_bounds() {
        assert_eq!(PlayoffFrequency::parse("a", "4").unwrap(), PlayoffFrequency(4));
        assert!(PlayoffFrequency::parse("a", "5").is_err());
        assert!(PlayoffFrequency::parse("a", "-1").is_err());
        assert!(PlayoffFrequency::parse("a", "").is_err());
    }
}
