use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use pickems::cache::ResultsSnapshot;
use pickems::leaderboard::{rank, render_leaderboard, score_all};
use pickems::parser::{split_tokens, strip_command, validate_picks};
use pickems::prediction::{Picks, Prediction};
use pickems::stage::Stage;

const TEAMS: [&str; 16] = [
    "natus vincere",
    "team spirit",
    "faze clan",
    "the mongolz",
    "g2",
    "heroic",
    "mouz",
    "vitality",
    "astralis",
    "liquid",
    "complexity",
    "cloud9",
    "virtus.pro",
    "eternal fire",
    "furia",
    "mibr",
];

const RECORDS: [&str; 16] = [
    "3-0", "3-1", "3-2", "2-2", "1-3", "0-3", "2-1", "-", "1-1", "0-2", "3-0", "2-3", "1-2",
    "0-1", "1-0", "2-0",
];

const SET_COMMAND: &str = r#"$set "Natus Vincere" Complexity "Team Spirit" "FaZe Clan" MOUZ Astralis "The MongolZ" Vitality Heroic G2"#;

fn snapshot() -> ResultsSnapshot {
    ResultsSnapshot {
        stage: Stage::Opening,
        expires_at: Utc::now() + Duration::minutes(15),
        teams: TEAMS
            .iter()
            .zip(RECORDS)
            .map(|(team, record)| (team.to_string(), record.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn predictions(count: usize) -> Vec<Prediction> {
    (0..count)
        .map(|idx| {
            let teams = (0..10)
                .map(|slot| TEAMS[(idx + slot * 3) % TEAMS.len()].to_string())
                .collect();
            Prediction {
                user_id: idx.to_string(),
                user_name: format!("user{idx}"),
                picks: Picks::swiss_from(teams).expect("ten picks"),
            }
        })
        .collect()
}

fn bench_leaderboard(c: &mut Criterion) {
    let snapshot = snapshot();
    let predictions = predictions(5_000);
    let rules = Stage::Opening.rules();

    c.bench_function("leaderboard_5000", |b| {
        b.iter(|| {
            let standings = score_all(rules, black_box(&predictions), black_box(&snapshot))
                .expect("every pick has a record");
            let ranked = rank(standings);
            black_box(render_leaderboard(&ranked[..10]).len());
        })
    });
}

fn bench_set_command(c: &mut Criterion) {
    let valid = snapshot().valid_teams();

    c.bench_function("set_command_parse", |b| {
        b.iter(|| {
            let tokens = split_tokens(strip_command(black_box(SET_COMMAND)));
            let teams = validate_picks(&tokens, 10, &valid).expect("valid picks");
            black_box(teams.len());
        })
    });
}

criterion_group!(benches, bench_leaderboard, bench_set_command);
criterion_main!(benches);
