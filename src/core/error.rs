use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForceError {
    #[error("Owner '{owner}' has no free tickets (maximum {max})")]
    QuotaExhausted { owner: String, max: u32 },

    #[error("Player '{player}' has no free tickets (maximum {max})")]
    PlayerQuotaExhausted { player: String, max: u32 },

    #[error("Owner '{0}' requested a ticket without a loading callback in place")]
    UnregisteredOwner(String),

    #[error("Invalid ticket: {0}")]
    InvalidTicket(String),

    #[error("Invalid ticket kind: {0}")]
    InvalidTicketKind(String),

    #[error("Space {0} is not loaded")]
    UnknownSpace(u64),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, ForceError>;

impl ForceError {
    /// Request denials are expected outcomes for plugin owners, not faults.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::QuotaExhausted { .. } | Self::PlayerQuotaExhausted { .. } | Self::UnregisteredOwner(_)
        )
    }
}

impl From<std::io::Error> for ForceError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for ForceError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::ParseError(format!("Failed to encode tickets: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for ForceError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::ParseError(format!("Failed to decode tickets: {}", err))
    }
}

impl From<serde_json::Error> for ForceError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}
