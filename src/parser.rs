use std::collections::BTreeSet;

use crate::error::{PickemsError, PickemsResult};

/// Straight and typographic double quotes; chat clients substitute the latter.
const QUOTES: [char; 3] = ['"', '\u{201c}', '\u{201d}'];

/// Split command text on whitespace, keeping quoted runs together.
///
/// Quote characters are left in place; `normalize_team` strips them.
pub fn split_tokens(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in raw.chars() {
        if QUOTES.contains(&ch) {
            quoted = !quoted;
            current.push(ch);
            continue;
        }
        if ch.is_whitespace() && !quoted {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Drop a leading `$command` word if present.
pub fn strip_command(raw: &str) -> &str {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('$') {
        return trimmed;
    }
    match trimmed.split_once(char::is_whitespace) {
        Some((_, rest)) => rest,
        None => "",
    }
}

pub fn normalize_team(token: &str) -> String {
    token
        .chars()
        .filter(|c| !QUOTES.contains(c))
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Arity first, then membership. Nothing is returned unless every pick is known.
pub fn validate_picks(
    tokens: &[String],
    expected: usize,
    valid_teams: &BTreeSet<String>,
) -> PickemsResult<Vec<String>> {
    if tokens.len() != expected {
        return Err(PickemsError::WrongPickCount {
            expected,
            got: tokens.len(),
        });
    }

    let teams: Vec<String> = tokens.iter().map(|t| normalize_team(t)).collect();
    let unknown: Vec<String> = teams
        .iter()
        .filter(|t| !valid_teams.contains(t.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(PickemsError::UnknownTeams(unknown));
    }
    Ok(teams)
}
