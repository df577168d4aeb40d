use std::time::Duration;

use thiserror::Error;

use crate::{
    dealer::TripletError,
    mailbox::MailboxError,
    party::PartyState,
    protocol::ConfigError,
    sharing::ShareError,
    transport::TransportError,
};

/// Terminal failure of a protocol run. No partial result is ever returned.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("malformed payload {label}: {source}")]
    Malformed {
        label: String,
        #[source]
        source: ShareError,
    },
    #[error("inconsistent share {label}: {reason}")]
    InconsistentShare { label: String, reason: String },
    #[error("timed out after {timeout:?} waiting for {label}")]
    Timeout { label: String, timeout: Duration },
    #[error("transport failure on {label}: {source}")]
    Transport {
        label: String,
        #[source]
        source: TransportError,
    },
    #[error("party {participant} aborted: {reason}")]
    Aborted { participant: String, reason: String },
    #[error("party cannot start a run in state {0:?}")]
    InvalidState(PartyState),
}

/// Coarse classification of [`ProtocolError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid setup, such as unknown participants or diverging specifications.
    Configuration,
    /// Malformed or inconsistent payload received from the network.
    Serialization,
    /// Bug in the driver: a contract of the mailbox or the triplet generator was broken.
    StateViolation,
    /// Some peer did not respond in time.
    Liveness,
    /// Connection to the mailbox failed.
    Transport,
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Malformed { .. } | Self::InconsistentShare { .. } => ErrorKind::Serialization,
            Self::Timeout { .. } | Self::Aborted { .. } => ErrorKind::Liveness,
            Self::InvalidState(_) => ErrorKind::StateViolation,
            Self::Transport { source, .. } => match source {
                TransportError::Mailbox(err) => mailbox_error_kind(err),
                _ => ErrorKind::Transport,
            },
        }
    }
}

fn mailbox_error_kind(err: &MailboxError) -> ErrorKind {
    match err {
        MailboxError::UnknownParticipant(_)
        | MailboxError::DuplicateMessage { .. }
        | MailboxError::Triplet(TripletError::UnknownParticipant(_)) => ErrorKind::Configuration,
        MailboxError::AlreadyConsumed { .. }
        | MailboxError::MissingHello
        | MailboxError::Triplet(TripletError::AlreadyDispensed { .. })
        | MailboxError::Triplet(TripletError::Exhausted { .. }) => ErrorKind::StateViolation,
        MailboxError::Encoding(_) => ErrorKind::Serialization,
    }
}
