use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cache::ResultsCache;
use crate::config::TrackerConfig;
use crate::error::{PickemsError, PickemsResult};
use crate::leaderboard::{self, Standing};
use crate::parser;
use crate::prediction::Prediction;
use crate::scoring::{self, Scorecard};
use crate::source::UpcomingMatch;
use crate::stage::{StageKind, StageRules};
use crate::store::PredictionStore;

/// The typed command surface a chat front end calls into.
pub struct PickemsService {
    config: Arc<TrackerConfig>,
    cache: ResultsCache,
    store: Arc<dyn PredictionStore>,
}

impl PickemsService {
    pub fn new(
        config: Arc<TrackerConfig>,
        cache: ResultsCache,
        store: Arc<dyn PredictionStore>,
    ) -> Self {
        Self {
            config,
            cache,
            store,
        }
    }

    fn rules(&self) -> &'static dyn StageRules {
        self.config.stage.rules()
    }

    /// Validate and store a full set of picks. Nothing is written unless every
    /// pick is valid.
    pub fn set_predictions(
        &self,
        user_id: &str,
        user_name: &str,
        tokens: &[String],
    ) -> PickemsResult<Prediction> {
        let rules = self.rules();
        if tokens.len() != rules.pick_count() {
            return Err(PickemsError::WrongPickCount {
                expected: rules.pick_count(),
                got: tokens.len(),
            });
        }
        let snapshot = self.cache.current()?;
        let teams = rules.validate(tokens, &snapshot.valid_teams())?;
        let prediction = Prediction {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            picks: rules.parse(teams)?,
        };
        self.store.upsert_prediction(&prediction)?;
        info!(user_id, stage = %self.config.stage, "predictions updated");
        Ok(prediction)
    }

    /// Same as `set_predictions`, starting from the raw command text.
    pub fn set_predictions_from_text(
        &self,
        user_id: &str,
        user_name: &str,
        raw: &str,
    ) -> PickemsResult<Prediction> {
        let tokens = parser::split_tokens(parser::strip_command(raw));
        self.set_predictions(user_id, user_name, &tokens)
    }

    pub fn scorecard(&self, user_id: &str) -> PickemsResult<(Prediction, Scorecard)> {
        let prediction = self
            .store
            .get_prediction(user_id)?
            .ok_or_else(|| PickemsError::NotFound {
                user_id: user_id.to_string(),
            })?;
        let snapshot = self.cache.current()?;
        let card = self.rules().score(&prediction.picks, &snapshot)?;
        Ok((prediction, card))
    }

    /// Per-pick report, or guidance when the user has nothing stored.
    pub fn check_predictions(&self, user_id: &str, user_name: &str) -> PickemsResult<String> {
        match self.scorecard(user_id) {
            Ok((prediction, card)) => Ok(scoring::render_report(
                &prediction.user_name,
                &self.config.tournament,
                &card,
            )),
            Err(err @ PickemsError::NotFound { .. }) => Ok(err.user_message(user_name)),
            Err(err) => Err(err),
        }
    }

    pub fn standings(&self) -> PickemsResult<Vec<Standing>> {
        let predictions = self.store.all_predictions()?;
        let snapshot = self.cache.current()?;
        let scored = leaderboard::score_all(self.rules(), &predictions, &snapshot)?;
        Ok(leaderboard::rank(scored))
    }

    pub fn leaderboard(&self) -> PickemsResult<String> {
        Ok(leaderboard::render_leaderboard(&self.standings()?))
    }

    /// Teams that may be picked this stage, sorted.
    pub fn list_valid_teams(&self) -> PickemsResult<Vec<String>> {
        Ok(self.cache.current()?.valid_teams().into_iter().collect())
    }

    pub fn teams_message(&self) -> PickemsResult<String> {
        let mut out = format!("Valid teams for the {} stage are:\n", self.config.stage);
        for team in self.list_valid_teams()? {
            let _ = writeln!(out, "- {team}");
        }
        Ok(out)
    }

    /// Tournament name, stage, format and how many picks `$set` needs.
    pub fn tournament_details(&self) -> Vec<String> {
        let rules = self.rules();
        let format = match rules.kind() {
            StageKind::Swiss => "swiss",
            StageKind::Playoff => "single-elimination",
        };
        vec![
            format!("Tournament Name: {}", self.config.tournament),
            format!("Round: {}", self.config.stage),
            format!("Format: {format}"),
            format!("Number of required teams: {}", rules.pick_count()),
        ]
    }

    pub fn details_message(&self) -> String {
        self.tournament_details().join("\n")
    }

    pub fn upcoming_matches(&self) -> PickemsResult<Vec<UpcomingMatch>> {
        self.cache.upcoming(self.config.stage)
    }

    pub fn upcoming_message(&self) -> PickemsResult<String> {
        let matches = self.upcoming_matches()?;
        if matches.is_empty() {
            return Ok("No upcoming matches".to_string());
        }
        let mut out = String::from("Upcoming matches:\n");
        for m in matches {
            let _ = write!(
                out,
                "- {} VS {} (bo{}): {}",
                m.team1,
                m.team2,
                m.best_of,
                m.start.format("%Y-%m-%d %H:%M UTC")
            );
            match m.stream {
                Some(stream) => {
                    let _ = writeln!(out, ": {stream}");
                }
                None => out.push('\n'),
            }
        }
        Ok(out)
    }

    pub fn help_message(&self) -> String {
        let set_usage = match self.rules().kind() {
            StageKind::Swiss => {
                "`$set [team1] [team2] ... [team10]`: Sets your Pick'Ems. 1 & 2 are the 3-0 teams, 3-8 are the 3-1 / 3-2 teams and 9-10 are the 0-3 teams."
            }
            StageKind::Playoff => {
                "`$set [team1] [team2] ... [team7]`: Sets your Pick'Ems. 1-4 reach the semi finals, 5 & 6 reach the grand final and 7 wins the tournament."
            }
        };
        format!(
            "PickEms Bot\n\
             `$details`: shows the tournament name, stage, format and number of teams needed to set your Pick'Ems\n\
             {set_usage} Team names are not case sensitive. Names that contain two or more words need to be wrapped in \" \", e.g. \"The MongolZ\"\n\
             `$check`: shows the current status of your Pick'Ems\n\
             `$teams`: shows the teams in the current stage of the tournament\n\
             `$leaderboard`: ranks users by successes minus failures. There is no tie breaker\n\
             `$upcoming`: shows the upcoming matches in this stage with confirmed teams\n\
             `$help`: shows this message\n"
        )
    }

    /// Route one chat message. Returns `None` for messages that are not commands.
    pub fn handle_command(&self, user_id: &str, user_name: &str, content: &str) -> Option<String> {
        let content = content.trim();
        let command = content.split_whitespace().next()?;
        let result = match command {
            "$set" => self
                .set_predictions_from_text(user_id, user_name, content)
                .map(|_| format!("{user_name}'s Pickems have been updated")),
            "$check" => self.check_predictions(user_id, user_name),
            "$leaderboard" => self.leaderboard(),
            "$teams" => self.teams_message(),
            "$details" => Ok(self.details_message()),
            "$upcoming" => self.upcoming_message(),
            "$help" => Ok(self.help_message()),
            _ => return None,
        };
        Some(result.unwrap_or_else(|err| {
            if err.is_validation() {
                warn!(user_id, command, error = %err, "command rejected");
            } else {
                error!(user_id, command, error = %err, "command failed");
            }
            err.user_message(user_name)
        }))
    }
}
