use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, anyhow};

use crate::record::MAX_FREQUENCY;

/// Placeholder name for an unfilled slot.
pub const TBD: &str = "tbd";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub team1: String,
    pub team2: String,
    /// 1 or 2 once the match is decided.
    pub winner: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LadderRound {
    Quarterfinal,
    Semifinal,
    GrandFinal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LadderMatch {
    pub round: LadderRound,
    pub team1: String,
    pub team1_score: u8,
    pub team2: String,
    pub team2_score: u8,
}

impl LadderMatch {
    /// Grand finals are best of three, so a decided series sums to 3.
    pub fn series_winner(&self) -> Option<&str> {
        if u16::from(self.team1_score) + u16::from(self.team2_score) != 3 {
            return None;
        }
        if self.team1_score > self.team2_score {
            Some(&self.team1)
        } else {
            Some(&self.team2)
        }
    }
}

/// Win-loss tokens per team from a swiss match list.
///
/// Teams in undecided matches are still listed, at whatever record they have.
pub fn swiss_records(matches: &[MatchResult]) -> BTreeMap<String, String> {
    let mut tally: BTreeMap<String, (u8, u8)> = BTreeMap::new();
    for m in matches {
        let team1 = normalize(&m.team1);
        let team2 = normalize(&m.team2);
        for team in [&team1, &team2] {
            if is_placeholder(team) {
                continue;
            }
            tally.entry(team.clone()).or_default();
        }
        let (winner, loser) = match m.winner {
            Some(1) => (team1, team2),
            Some(2) => (team2, team1),
            _ => continue,
        };
        if let Some(w) = tally.get_mut(&winner) {
            w.0 = w.0.saturating_add(1);
        }
        if let Some(l) = tally.get_mut(&loser) {
            l.1 = l.1.saturating_add(1);
        }
    }
    tally
        .into_iter()
        .map(|(team, (w, l))| (team, format!("{w}-{l}")))
        .collect()
}

/// Pair a scraped ladder's team and score columns into matches.
///
/// Slots run quarterfinals 1-4, semifinals 5-6, quarterfinals 7-10,
/// semifinals 11-12 and the grand final 13-14.
pub fn ladder_from_slots(teams: &[String], scores: &[String]) -> Result<Vec<LadderMatch>> {
    if scores.len() < teams.len() {
        return Err(anyhow!(
            "ladder has {} team slots but only {} scores",
            teams.len(),
            scores.len()
        ));
    }
    let mut out = Vec::new();
    for (idx, pair) in teams.chunks_exact(2).enumerate() {
        let slot = idx * 2 + 1;
        let round = match slot {
            1 | 3 | 7 | 9 => LadderRound::Quarterfinal,
            5 | 11 => LadderRound::Semifinal,
            13 => LadderRound::GrandFinal,
            _ => continue,
        };
        out.push(LadderMatch {
            round,
            team1: pair[0].clone(),
            team1_score: parse_score(&scores[idx * 2])?,
            team2: pair[1].clone(),
            team2_score: parse_score(&scores[idx * 2 + 1])?,
        });
    }
    Ok(out)
}

/// Appearance counts: one per quarterfinal, semifinal and grand-final slot,
/// plus one for winning the grand final.
pub fn playoff_frequencies(matches: &[LadderMatch]) -> Result<BTreeMap<String, u8>> {
    let mut freq: HashMap<String, u8> = HashMap::new();
    for m in matches {
        for team in [&m.team1, &m.team2] {
            let team = normalize(team);
            if is_placeholder(&team) {
                continue;
            }
            bump(&mut freq, team);
        }
        if m.round == LadderRound::GrandFinal
            && let Some(winner) = m.series_winner()
        {
            let winner = normalize(winner);
            if !is_placeholder(&winner) {
                bump(&mut freq, winner);
            }
        }
    }

    if let Some((team, count)) = freq.iter().find(|(_, count)| **count > MAX_FREQUENCY) {
        return Err(anyhow!(
            "{team} appears {count} times in the ladder; at most {MAX_FREQUENCY} expected"
        ));
    }
    Ok(freq.into_iter().collect())
}

fn bump(freq: &mut HashMap<String, u8>, team: String) {
    let count = freq.entry(team).or_default();
    *count = count.saturating_add(1);
}

fn parse_score(raw: &str) -> Result<u8> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<u8>()
        .map_err(|_| anyhow!("unreadable ladder score {raw:?}"))
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn is_placeholder(name: &str) -> bool {
    name.is_empty() || name == TBD
}

#[cfg(test)]
mod tests {
    use super::{LadderMatch, LadderRound, MatchResult, ladder_from_slots, playoff_frequencies, swiss_records};

    fn m(team1: &str, team2: &str, winner: Option<u8>) -> MatchResult {
        MatchResult {
            team1: team1.to_string(),
            team2: team2.to_string(),
            winner,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn swiss_records_count_decided_matches() {
        let records = swiss_records(&[
            m("NAVI", "G2", Some(1)),
            m("NAVI", "FaZe", Some(1)),
            m("G2", "FaZe", Some(2)),
            m("Spirit", "TBD", None),
        ]);
        assert_eq!(records["navi"], "2-0");
        assert_eq!(records["g2"], "0-2");
        assert_eq!(records["faze"], "1-1");
        assert_eq!(records["spirit"], "0-0");
        assert!(!records.contains_key("tbd"));
    }

    #[test]
    fn ladder_slots_map_to_rounds() {
        let teams = strings(&[
            "a", "b", "c", "d", "a", "c", "e", "f", "g", "h", "e", "g", "a", "e",
        ]);
        let scores = strings(&[
            "2", "0", "2", "1", "2", "0", "2", "1", "0", "2", "2", "1", "2", "1",
        ]);
        let ladder = ladder_from_slots(&teams, &scores).unwrap();
        assert_eq!(ladder.len(), 7);
        assert_eq!(ladder[2].round, LadderRound::Semifinal);
        assert_eq!(ladder[3].round, LadderRound::Quarterfinal);
        assert_eq!(ladder[6].round, LadderRound::GrandFinal);

        let freq = playoff_frequencies(&ladder).unwrap();
        assert_eq!(freq["a"], 4);
        assert_eq!(freq["e"], 3);
        assert_eq!(freq["c"], 2);
        assert_eq!(freq["b"], 1);
        assert_eq!(freq.values().map(|v| u32::from(*v)).sum::<u32>(), 15);
    }

    #[test]
    fn unfinished_grand_final_adds_no_title() {
        let gf = LadderMatch {
            round: LadderRound::GrandFinal,
            team1: "a".to_string(),
            team1_score: 1,
            team2: "b".to_string(),
            team2_score: 1,
        };
        assert_eq!(gf.series_winner(), None);
        let freq = playoff_frequencies(&[gf]).unwrap();
        assert_eq!(freq["a"], 1);
        assert_eq!(freq["b"], 1);
    }

    #[test]
    fn repeated_slots_are_an_upstream_error() {
        let repeat = |round| LadderMatch {
            round,
            team1: "a".to_string(),
            team1_score: 0,
            team2: "b".to_string(),
            team2_score: 0,
        };
        let ladder = vec![
            repeat(LadderRound::Quarterfinal),
            repeat(LadderRound::Quarterfinal),
            repeat(LadderRound::Semifinal),
            repeat(LadderRound::Semifinal),
            repeat(LadderRound::GrandFinal),
        ];
        assert!(playoff_frequencies(&ladder).is_err());
    }

    #[test]
    fn mismatched_columns_fail() {
        assert!(ladder_from_slots(&strings(&["a", "b"]), &strings(&["1"])).is_err());
        assert!(ladder_from_slots(&strings(&["a", "b"]), &strings(&["x", "1"])).is_err());
    }
}
