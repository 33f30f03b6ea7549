use thiserror::Error;

pub type PickemsResult<T> = Result<T, PickemsError>;

const GENERIC_FAILURE: &str = "An unexpected error has occurred";

#[derive(Debug, Clone, Error)]
pub enum PickemsError {
    #[error("this stage requires {expected} teams but {got} were supplied")]
    WrongPickCount { expected: usize, got: usize },

    #[error("unknown team names: {}", .0.join(", "))]
    UnknownTeams(Vec<String>),

    #[error("no predictions stored for user {user_id}")]
    NotFound { user_id: String },

    #[error("results source failed: {0}")]
    Upstream(String),

    #[error("no record for team {team}")]
    MissingRecord { team: String },

    #[error("malformed record {token:?} for team {team}")]
    MalformedRecord { team: String, token: String },

    #[error("store failure: {0}")]
    Store(String),
}

impl PickemsError {
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::Upstream(err.to_string())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::WrongPickCount { .. } | Self::UnknownTeams(_))
    }

    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Upstream(_) | Self::MissingRecord { .. } | Self::MalformedRecord { .. }
        )
    }

    /// Text safe to show the person who issued the command.
    pub fn user_message(&self, user_name: &str) -> String {
        match self {
            Self::WrongPickCount { expected, got } => format!(
                "Incorrect number of teams were supplied ({got} given, {expected} needed). Please try again"
            ),
            Self::UnknownTeams(teams) => format!(
                "The following team names are invalid: {}. {user_name}'s Pickems have not been updated",
                teams.join(", ")
            ),
            Self::NotFound { .. } => format!(
                "{user_name} does not have any Pickems stored. Use $set to set your predictions"
            ),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

impl From<rusqlite::Error> for PickemsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for PickemsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(err.to_string())
    }
}
