//! Mailbox labels. Each label names the sender, the role of the message and
//! the secret or node it belongs to, so that concurrent messages never collide.

use crate::{circuits::MultId, expression::SecretId};

/// Role of a value opened during Beaver multiplication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opening {
    /// `d = x - a`
    D,
    /// `e = y - b`
    E,
}

impl Opening {
    fn tag(self) -> &'static str {
        match self {
            Opening::D => "d",
            Opening::E => "e",
        }
    }
}

/// Private share of a secret input.
pub fn secret_share(id: &SecretId) -> String {
    format!("share/{id}")
}

/// Published protocol fingerprint.
pub fn fingerprint(sender: &str) -> String {
    format!("{sender}/spec")
}

/// Published share of an opened Beaver difference.
pub fn opening(sender: &str, role: Opening, mult: MultId) -> String {
    format!("{sender}/{}/{mult}", role.tag())
}

/// Published share of the final result.
pub fn result(sender: &str) -> String {
    format!("{sender}/result")
}
