//! Secure multi-party computation over additive N-of-N secret sharing.
//!
//! Every party owns some private field elements and all parties jointly
//! evaluate a public arithmetic [`Expression`] over them. Inputs are split
//! into additive shares, additions are computed locally and multiplications
//! consume Beaver triples handed out by a [`TripletGenerator`]. Only the final
//! result is ever reconstructed.

pub mod circuits;
pub mod config;
pub mod dealer;
pub mod error;
pub mod executor;
pub mod expression;
pub mod fields;
pub mod labels;
pub mod mailbox;
pub mod party;
pub mod protocol;
pub mod sharing;
pub mod transport;

pub use config::EngineConfig;
pub use dealer::{Triplet, TripletGenerator};
pub use error::{ErrorKind, ProtocolError};
pub use expression::{Expression, SecretId};
pub use fields::MpcField;
pub use mailbox::{LocalTransport, Mailbox};
pub use party::{PartyState, SmcParty};
pub use protocol::ProtocolSpec;
pub use sharing::Share;
pub use transport::{ChannelTransport, Transport};
