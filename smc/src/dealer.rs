//! Semi-trusted generator of Beaver triples.
//!
//! The generator never sees any party's inputs. For every multiplication node
//! it draws a random triple `(a, b, a*b)` once, splits each component into N
//! shares and hands out exactly one slot of these shares per request.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    fields::MpcField,
    sharing::{self, Share, ShareError},
};

/// Error raised when the dispensing contract is violated.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TripletError {
    #[error("participant {0} is not registered with the triplet generator")]
    UnknownParticipant(String),
    #[error("participant {participant} already received a triplet for node {node_id}")]
    AlreadyDispensed {
        participant: String,
        node_id: String,
    },
    #[error("all {num_parties} triplet shares for node {node_id} were dispensed")]
    Exhausted { node_id: String, num_parties: usize },
}

/// One party's shares of a Beaver triple `(a, b, c)` with `c = a*b`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "F: MpcField")]
pub struct Triplet<F> {
    pub a: Share<F>,
    pub b: Share<F>,
    pub c: Share<F>,
}

impl<F: MpcField> Triplet<F> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ShareError> {
        sharing::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShareError> {
        sharing::decode(bytes)
    }
}

/// Shares of one triple plus dispensing cursor.
struct TripletSlot<F> {
    a: Vec<Share<F>>,
    b: Vec<Share<F>>,
    c: Vec<Share<F>>,
    cursor: usize,
    served: HashSet<String>,
}

impl<F: MpcField> TripletSlot<F> {
    fn generate(node_id: &str, num_parties: usize, rng: &mut StdRng) -> Self {
        let a = F::random(&mut *rng);
        let b = F::random(&mut *rng);
        let correlation_id = node_id.as_bytes();
        Self {
            a: sharing::split_with_rng(a, num_parties, correlation_id, rng),
            b: sharing::split_with_rng(b, num_parties, correlation_id, rng),
            c: sharing::split_with_rng(a * b, num_parties, correlation_id, rng),
            cursor: 0,
            served: HashSet::new(),
        }
    }

    fn dispense(&mut self, participant: &str, node_id: &str) -> Result<Triplet<F>, TripletError> {
        let index = self.cursor;
        if index >= self.a.len() {
            return Err(TripletError::Exhausted {
                node_id: node_id.to_string(),
                num_parties: self.a.len(),
            });
        }
        if !self.served.insert(participant.to_string()) {
            return Err(TripletError::AlreadyDispensed {
                participant: participant.to_string(),
                node_id: node_id.to_string(),
            });
        }
        self.cursor += 1;
        Ok(Triplet {
            a: self.a[index].clone(),
            b: self.b[index].clone(),
            c: self.c[index].clone(),
        })
    }
}

/// Triplet generator shared by all parties of a run.
pub struct TripletGenerator<F> {
    participants: Mutex<HashSet<String>>,
    slots: Mutex<HashMap<String, Arc<Mutex<TripletSlot<F>>>>>,
    rng: Mutex<StdRng>,
}

impl<F: MpcField> TripletGenerator<F> {
    /// Create generator seeded from system entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create generator with given source of randomness.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            participants: Mutex::new(HashSet::new()),
            slots: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    pub fn add_participant(&self, participant: impl Into<String>) {
        self.participants.lock().insert(participant.into());
    }

    pub fn num_participants(&self) -> usize {
        self.participants.lock().len()
    }

    /// Hand out the next unused slot of the triple for `node_id`, generating
    /// the triple on first request. Every registered participant may draw
    /// once per node.
    pub fn retrieve_triplet(
        &self,
        participant: &str,
        node_id: &str,
    ) -> Result<Triplet<F>, TripletError> {
        let num_parties = {
            let participants = self.participants.lock();
            if !participants.contains(participant) {
                return Err(TripletError::UnknownParticipant(participant.to_string()));
            }
            participants.len()
        };

        let slot = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(node_id.to_string()).or_insert_with(|| {
                tracing::debug!(node_id, num_parties, "Generating Beaver triple");
                let slot = TripletSlot::generate(node_id, num_parties, &mut self.rng.lock());
                Arc::new(Mutex::new(slot))
            });
            Arc::clone(slot)
        };

        let triplet = slot.lock().dispense(participant, node_id)?;
        tracing::trace!(participant, node_id, index = triplet.a.index(), "Dispensed triplet");
        Ok(triplet)
    }
}

impl<F: MpcField> Default for TripletGenerator<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{fields::Mersenne61, sharing::reconstruct};

    type Fp = Mersenne61;

    fn generator(parties: &[&str]) -> TripletGenerator<Fp> {
        let generator = TripletGenerator::with_rng(StdRng::seed_from_u64(5));
        for party in parties {
            generator.add_participant(*party);
        }
        generator
    }

    #[test]
    fn test_triplet_correlation() {
        let generator = generator(&["alice", "bob", "charlie"]);
        let triplets: Vec<_> = ["bob", "charlie", "alice"]
            .into_iter()
            .map(|party| generator.retrieve_triplet(party, "mult/0").unwrap())
            .collect();

        let mut indices: Vec<_> = triplets.iter().map(|t| t.a.index()).collect();
        indices.sort_unstable();
        assert_eq!(indices, [0, 1, 2]);

        let a: Vec<_> = triplets.iter().map(|t| t.a.clone()).collect();
        let b: Vec<_> = triplets.iter().map(|t| t.b.clone()).collect();
        let c: Vec<_> = triplets.iter().map(|t| t.c.clone()).collect();
        assert_eq!(reconstruct(&a) * reconstruct(&b), reconstruct(&c));
    }

    #[test]
    fn test_distinct_nodes_get_distinct_triples() {
        let generator = generator(&["alice"]);
        let first = generator.retrieve_triplet("alice", "mult/0").unwrap();
        let second = generator.retrieve_triplet("alice", "mult/1").unwrap();
        assert_ne!(first.a.value(), second.a.value());
    }

    #[test]
    fn test_contract_violations() {
        let generator = generator(&["alice", "bob"]);
        assert_eq!(
            generator.retrieve_triplet("mallory", "mult/0"),
            Err(TripletError::UnknownParticipant("mallory".into()))
        );

        generator.retrieve_triplet("alice", "mult/0").unwrap();
        assert!(matches!(
            generator.retrieve_triplet("alice", "mult/0"),
            Err(TripletError::AlreadyDispensed { .. })
        ));

        generator.retrieve_triplet("bob", "mult/0").unwrap();
        generator.add_participant("charlie");
        assert_eq!(
            generator.retrieve_triplet("charlie", "mult/0"),
            Err(TripletError::Exhausted {
                node_id: "mult/0".into(),
                num_parties: 2
            })
        );
    }

    #[test]
    fn test_concurrent_dispensing() {
        let parties: Vec<String> = (0..16).map(|i| format!("party{i}")).collect();
        let generator = Arc::new(TripletGenerator::<Fp>::new());
        for party in &parties {
            generator.add_participant(party.clone());
        }

        let handles: Vec<_> = parties
            .iter()
            .cloned()
            .map(|party| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || generator.retrieve_triplet(&party, "mult/7").unwrap())
            })
            .collect();
        let triplets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut indices: Vec<_> = triplets.iter().map(|t| t.c.index()).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..16).collect::<Vec<_>>());
    }
}
