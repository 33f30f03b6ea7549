use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::bracket::{self, LadderMatch, LadderRound, MatchResult};
use crate::http_client::http_client;
use crate::stage::StageKind;

const LIQUIPEDIA_MATCH_API: &str = "https://api.liquipedia.net/api/v3/match";
const DEFAULT_WIKI: &str = "counterstrike";
const MATCH_LIMIT: &str = "100";
const TWITCH_BASE: &str = "https://www.twitch.tv/";
// LiquipediaDB match dates are GMT without an offset.
const MATCH_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where results come from. Team names come back lower case.
///
/// Fetches may be slow and may fail; callers decide whether to retry.
pub trait ResultsSource: Send + Sync {
    /// Team to `"W-L"` for a swiss stage page.
    fn fetch_swiss_records(&self, stage_url: &str) -> Result<HashMap<String, String>>;

    /// Team to ladder appearance count for a playoff stage page.
    fn fetch_playoff_frequencies(&self, stage_url: &str) -> Result<HashMap<String, u8>>;

    /// Unplayed matches between two known teams, earliest first.
    fn fetch_upcoming_matches(
        &self,
        stage_url: &str,
        kind: StageKind,
    ) -> Result<Vec<UpcomingMatch>>;
}

/// A scheduled match as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingMatch {
    pub team1: String,
    pub team2: String,
    pub start: DateTime<Utc>,
    pub best_of: u8,
    #[serde(default)]
    pub stream: Option<String>,
}

/// Drop matches with an unfilled side and order the rest by start time.
pub fn arrange_upcoming(matches: Vec<UpcomingMatch>) -> Vec<UpcomingMatch> {
    let mut out: Vec<UpcomingMatch> = matches
        .into_iter()
        .filter(|m| !is_tbd(&m.team1) && !is_tbd(&m.team2))
        .collect();
    out.sort_by_key(|m| m.start);
    out
}

/// Reads match data from the LiquipediaDB API, using the stage page's
/// wikitext to find which match lists belong to the stage.
pub struct LiquipediaSource {
    api_key: String,
}

impl LiquipediaSource {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    fn fetch_stage_matches(&self, stage_url: &str, template: &str) -> Result<Vec<ApiMatch>> {
        let client = http_client()?;
        let wikitext = client
            .get(format!("{stage_url}?action=raw"))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .with_context(|| format!("wikitext request failed for {stage_url}"))?;

        let ids = extract_template_ids(&wikitext, template);
        if ids.is_empty() {
            return Err(anyhow!("no {template} ids found on {stage_url}"));
        }
        debug!(stage_url, ids = ids.len(), "resolved bracket ids");

        let conditions = ids
            .iter()
            .map(|id| format!("[[match2bracketid::{id}]]"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let body = client
            .get(LIQUIPEDIA_MATCH_API)
            .header(AUTHORIZATION, format!("Apikey {}", self.api_key))
            .query(&[
                ("limit", MATCH_LIMIT),
                ("wiki", DEFAULT_WIKI),
                ("conditions", conditions.as_str()),
                ("rawstreams", "false"),
                ("streamurls", "false"),
            ])
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .context("match api request failed")?;
        parse_match_payload(&body)
    }
}

impl ResultsSource for LiquipediaSource {
    fn fetch_swiss_records(&self, stage_url: &str) -> Result<HashMap<String, String>> {
        let matches = self.fetch_stage_matches(stage_url, "Matchlist")?;
        let results = matches
            .iter()
            .map(ApiMatch::to_result)
            .collect::<Result<Vec<_>>>()?;
        Ok(bracket::swiss_records(&results).into_iter().collect())
    }

    fn fetch_playoff_frequencies(&self, stage_url: &str) -> Result<HashMap<String, u8>> {
        let matches = self.fetch_stage_matches(stage_url, "Bracket")?;
        let ladder = ladder_from_api(&matches)?;
        Ok(bracket::playoff_frequencies(&ladder)?.into_iter().collect())
    }

    fn fetch_upcoming_matches(
        &self,
        stage_url: &str,
        kind: StageKind,
    ) -> Result<Vec<UpcomingMatch>> {
        let template = match kind {
            StageKind::Swiss => "Matchlist",
            StageKind::Playoff => "Bracket",
        };
        let matches = self.fetch_stage_matches(stage_url, template)?;
        upcoming_from_api(&matches)
    }
}

/// Serves results from a JSON file keyed by stage page name, e.g.
/// `{"swiss": {"Opening_Stage": {"navi": "2-1"}}, "playoff": {"Playoff_Stage": {"navi": 2}}}`.
///
/// A playoff page may instead appear under `ladder` as slot-ordered `teams`
/// and `scores` columns, and `upcoming` lists scheduled matches per page.
/// The file is re-read on every fetch so it can be edited while running.
pub struct FixtureSource {
    path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    swiss: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    playoff: HashMap<String, HashMap<String, u8>>,
    #[serde(default)]
    ladder: HashMap<String, FixtureLadder>,
    #[serde(default)]
    upcoming: HashMap<String, Vec<UpcomingMatch>>,
}

#[derive(Debug, Default, Deserialize)]
struct FixtureLadder {
    teams: Vec<String>,
    #[serde(default)]
    scores: Vec<String>,
}

impl FixtureSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<FixtureFile> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read fixture {}", self.path.display()))?;
        serde_json::from_str(&raw).context("invalid fixture json")
    }
}

impl ResultsSource for FixtureSource {
    fn fetch_swiss_records(&self, stage_url: &str) -> Result<HashMap<String, String>> {
        let page = page_name(stage_url);
        let stage = self
            .load()?
            .swiss
            .remove(page)
            .ok_or_else(|| anyhow!("fixture has no swiss stage {page}"))?;
        Ok(lowercase_keys(stage))
    }

    fn fetch_playoff_frequencies(&self, stage_url: &str) -> Result<HashMap<String, u8>> {
        let page = page_name(stage_url);
        let mut fixture = self.load()?;
        if let Some(stage) = fixture.playoff.remove(page) {
            return Ok(lowercase_keys(stage));
        }
        let ladder = fixture
            .ladder
            .remove(page)
            .ok_or_else(|| anyhow!("fixture has no playoff stage {page}"))?;
        let matches = bracket::ladder_from_slots(&ladder.teams, &ladder.scores)?;
        Ok(bracket::playoff_frequencies(&matches)?.into_iter().collect())
    }

    fn fetch_upcoming_matches(
        &self,
        stage_url: &str,
        _kind: StageKind,
    ) -> Result<Vec<UpcomingMatch>> {
        let page = page_name(stage_url);
        let matches = self.load()?.upcoming.remove(page).unwrap_or_default();
        Ok(arrange_upcoming(
            matches
                .into_iter()
                .map(|m| UpcomingMatch {
                    team1: team_or_tbd(&m.team1),
                    team2: team_or_tbd(&m.team2),
                    ..m
                })
                .collect(),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiMatch {
    pub match2id: String,
    #[serde(default)]
    finished: Value,
    #[serde(default)]
    winner: Value,
    #[serde(default)]
    match2opponents: Vec<ApiOpponent>,
    #[serde(default)]
    date: String,
    #[serde(default)]
    bestof: Value,
    #[serde(default)]
    stream: Value,
}

#[derive(Debug, Deserialize)]
struct ApiOpponent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    result: Vec<ApiMatch>,
}

impl ApiMatch {
    fn opponents(&self) -> Result<(&ApiOpponent, &ApiOpponent)> {
        match self.match2opponents.as_slice() {
            [a, b] => Ok((a, b)),
            other => Err(anyhow!(
                "match {} has {} opponents, expected 2",
                self.match2id,
                other.len()
            )),
        }
    }

    fn is_finished(&self) -> Result<bool> {
        match value_as_i64(&self.finished) {
            Some(0) | None => Ok(false),
            Some(1) => Ok(true),
            Some(other) => Err(anyhow!(
                "match {} has non-binary finished flag {other}",
                self.match2id
            )),
        }
    }

    pub fn to_result(&self) -> Result<MatchResult> {
        let (a, b) = self.opponents()?;
        let winner = if self.is_finished()? {
            value_as_i64(&self.winner)
                .and_then(|w| u8::try_from(w).ok())
                .filter(|w| *w == 1 || *w == 2)
        } else {
            None
        };
        Ok(MatchResult {
            team1: team_or_tbd(&a.name),
            team2: team_or_tbd(&b.name),
            winner,
        })
    }

    /// `None` once the match has been played.
    pub fn to_upcoming(&self) -> Result<Option<UpcomingMatch>> {
        if self.is_finished()? {
            return Ok(None);
        }
        let (a, b) = self.opponents()?;
        let start = NaiveDateTime::parse_from_str(self.date.trim(), MATCH_DATE_FORMAT)
            .with_context(|| format!("match {} has bad date {:?}", self.match2id, self.date))?
            .and_utc();
        let best_of = value_as_i64(&self.bestof)
            .and_then(|b| u8::try_from(b).ok())
            .ok_or_else(|| anyhow!("match {} has no best-of", self.match2id))?;
        Ok(Some(UpcomingMatch {
            team1: team_or_tbd(&a.name),
            team2: team_or_tbd(&b.name),
            start,
            best_of,
            stream: self
                .stream
                .get("twitch")
                .and_then(Value::as_str)
                .and_then(twitch_url),
        }))
    }

    /// Round number from ids shaped like `<bracket>_R02-M001`.
    pub fn round_number(&self) -> Option<u32> {
        let (_, tail) = self.match2id.rsplit_once('_')?;
        let (round, _) = tail.strip_prefix('R')?.split_once('-')?;
        round.parse().ok()
    }
}

pub fn parse_match_payload(raw: &str) -> Result<Vec<ApiMatch>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let parsed: ApiResponse = serde_json::from_str(trimmed).context("invalid match api json")?;
    Ok(parsed.result)
}

/// The last three rounds of a bracket are its quarterfinals, semifinals and final.
pub fn ladder_from_api(matches: &[ApiMatch]) -> Result<Vec<LadderMatch>> {
    let last = matches
        .iter()
        .filter_map(ApiMatch::round_number)
        .max()
        .ok_or_else(|| anyhow!("no bracket rounds in match data"))?;

    let mut out = Vec::new();
    for m in matches {
        let Some(round) = m.round_number() else {
            continue;
        };
        let round = match last.checked_sub(round) {
            Some(0) => LadderRound::GrandFinal,
            Some(1) => LadderRound::Semifinal,
            Some(2) => LadderRound::Quarterfinal,
            _ => continue,
        };
        let (a, b) = m.opponents()?;
        out.push(LadderMatch {
            round,
            team1: team_or_tbd(&a.name),
            team1_score: score_of(&a.score),
            team2: team_or_tbd(&b.name),
            team2_score: score_of(&b.score),
        });
    }
    out.sort_by_key(|m| m.round);
    Ok(out)
}

pub fn upcoming_from_api(matches: &[ApiMatch]) -> Result<Vec<UpcomingMatch>> {
    let mut out = Vec::new();
    for m in matches {
        if let Some(upcoming) = m.to_upcoming()? {
            out.push(upcoming);
        }
    }
    Ok(arrange_upcoming(out))
}

/// Values of `id=` parameters on `{{<template>|...}}` calls.
pub fn extract_template_ids(wikitext: &str, template: &str) -> Vec<String> {
    let opener = format!("{{{{{template}");
    let mut ids = Vec::new();
    let mut rest = wikitext;
    while let Some(start) = rest.find(&opener) {
        let after = &rest[start + opener.len()..];
        // `{{Matchlist` must not also match `{{MatchlistStart`.
        if !after.starts_with(|c: char| c == '|' || c.is_whitespace()) {
            rest = after;
            continue;
        }
        let end = after.find("}}").unwrap_or(after.len());
        let params = &after[..end];
        if let Some(id) = params
            .split('|')
            .map(str::trim)
            .find_map(|part| part.strip_prefix("id="))
        {
            let id = strip_html_comments(id);
            let id = id.trim();
            if !id.is_empty() {
                ids.push(id.to_string());
            }
        }
        rest = &after[end..];
    }
    ids
}

fn strip_html_comments(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn page_name(stage_url: &str) -> &str {
    stage_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(stage_url)
}

fn lowercase_keys<V>(map: HashMap<String, V>) -> HashMap<String, V> {
    map.into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v))
        .collect()
}

fn team_or_tbd(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bracket::TBD.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

fn is_tbd(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(bracket::TBD)
}

/// Channel names such as `BLAST_Premier` map to `twitch.tv/blastpremier`.
fn twitch_url(channel: &str) -> Option<String> {
    let channel = channel.trim();
    if channel.is_empty() {
        return None;
    }
    if channel.starts_with("http") {
        return Some(channel.to_string());
    }
    let handle: String = channel
        .chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    Some(format!("{TWITCH_BASE}{handle}"))
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn score_of(v: &Value) -> u8 {
    value_as_i64(v)
        .and_then(|s| u8::try_from(s).ok())
        .unwrap_or(0)
}
