use std::collections::HashSet;

use digest::Digest;
use serde::{Deserialize, Serialize};
use sha3::Sha3_256;
use thiserror::Error;

use crate::{
    circuits::Circuit,
    expression::Expression,
    fields::MpcField,
    sharing::{self, ShareError},
};

/// Identifier of a participant, e.g. its mailbox name.
pub type ParticipantId = String;

/// Digest identifying a protocol specification.
pub type Fingerprint = [u8; 32];

/// Deepest expression accepted by [`ProtocolSpec::validate`]. Encoding and
/// printing walk the tree recursively, so deeper trees are refused up front.
pub const MAX_EXPRESSION_DEPTH: usize = 1024;

/// Invalid protocol setup. Never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("protocol has no participants")]
    NoParticipants,
    #[error("participant {0} is listed twice")]
    DuplicateParticipant(ParticipantId),
    #[error("participant {0} is not part of the protocol")]
    UnknownParticipant(ParticipantId),
    #[error("participant {0} runs a different protocol specification")]
    SpecMismatch(ParticipantId),
    #[error("transport speaks for {actual}, expected {expected}")]
    TransportIdentity {
        expected: ParticipantId,
        actual: ParticipantId,
    },
    #[error("expression depth {depth} exceeds the limit of {max}")]
    ExpressionTooDeep { depth: usize, max: usize },
    #[error("unable to encode protocol specification: {0}")]
    Encoding(#[from] ShareError),
}

/// Public description of a run, received identically by every participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "F: MpcField")]
pub struct ProtocolSpec<F> {
    /// Ordered participants. Position `i` receives share index `i`; the first
    /// participant holds the canonical index.
    pub participant_ids: Vec<ParticipantId>,
    /// Expression to compute.
    pub expr: Expression<F>,
}

impl<F: MpcField> ProtocolSpec<F> {
    pub fn new(participant_ids: Vec<ParticipantId>, expr: Expression<F>) -> Self {
        Self {
            participant_ids,
            expr,
        }
    }

    /// Check that the participant list is non-empty and free of duplicates,
    /// and that the expression is at most [`MAX_EXPRESSION_DEPTH`] deep.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_depth()?;
        if self.participant_ids.is_empty() {
            return Err(ConfigError::NoParticipants);
        }
        let mut seen = HashSet::new();
        for id in &self.participant_ids {
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateParticipant(id.clone()));
            }
        }
        Ok(())
    }

    fn check_depth(&self) -> Result<(), ConfigError> {
        let depth = self.expr.depth();
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(ConfigError::ExpressionTooDeep {
                depth,
                max: MAX_EXPRESSION_DEPTH,
            });
        }
        Ok(())
    }

    pub fn num_parties(&self) -> usize {
        self.participant_ids.len()
    }

    /// Position of participant in the ordered list, i.e. its share index.
    pub fn index_of(&self, participant: &str) -> Result<usize, ConfigError> {
        self.participant_ids
            .iter()
            .position(|id| id == participant)
            .ok_or_else(|| ConfigError::UnknownParticipant(participant.to_string()))
    }

    /// Flatten expression in canonical order.
    pub fn compile(&self) -> Circuit<F> {
        Circuit::compile(&self.expr)
    }

    /// SHA3-256 digest over the wire encoding of the specification.
    pub fn fingerprint(&self) -> Result<Fingerprint, ConfigError> {
        self.check_depth()?;
        let encoded = sharing::encode(self)?;
        let mut fingerprint = Fingerprint::default();
        fingerprint.copy_from_slice(&Sha3_256::digest(&encoded));
        Ok(fingerprint)
    }
}
