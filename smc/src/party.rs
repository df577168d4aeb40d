//! Protocol engine run independently by every party.
//!
//! A party distributes shares of its own secrets, evaluates the shared
//! expression gate by gate on shares, multiplies shared values with Beaver
//! triples, publishes its share of the result and finally sums up the result
//! shares of all parties.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    future::Future,
    sync::Arc,
};

use tracing::{debug, trace, warn};

use crate::{
    circuits::{Circuit, Gate, MultId},
    config::EngineConfig,
    dealer::Triplet,
    error::ProtocolError,
    expression::SecretId,
    fields::MpcField,
    labels::{self, Opening},
    protocol::{ConfigError, ParticipantId, ProtocolSpec},
    sharing::{self, Share, Value},
    transport::{Transport, TransportError},
};

/// Phase of a party's run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartyState {
    Idle,
    Sharing,
    Evaluating,
    Publishing,
    Reconstructing,
    Done,
}

/// Participant of a secure computation.
pub struct SmcParty<F, T> {
    id: ParticipantId,
    index: usize,
    spec: ProtocolSpec<F>,
    circuit: Arc<Circuit<F>>,
    inputs: HashMap<SecretId, F>,
    transport: T,
    config: EngineConfig,
    state: PartyState,
    received: HashMap<SecretId, Share<F>>,
    triplets: HashMap<MultId, Triplet<F>>,
}

impl<F: MpcField, T: Transport> SmcParty<F, T> {
    /// Prepare party `participant` holding private `inputs`.
    pub fn new(
        participant: impl Into<ParticipantId>,
        spec: ProtocolSpec<F>,
        inputs: HashMap<SecretId, F>,
        transport: T,
        config: EngineConfig,
    ) -> Result<Self, ProtocolError> {
        let id = participant.into();
        spec.validate()?;
        let index = spec.index_of(&id)?;
        if transport.participant_id() != id {
            return Err(ConfigError::TransportIdentity {
                expected: id,
                actual: transport.participant_id().to_string(),
            }
            .into());
        }
        let circuit = Arc::new(spec.compile());
        Ok(Self {
            id,
            index,
            spec,
            circuit,
            inputs,
            transport,
            config,
            state: PartyState::Idle,
            received: HashMap::new(),
            triplets: HashMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Share index held by this party.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> PartyState {
        self.state
    }

    /// Run the protocol to completion and return the value of the expression.
    #[tracing::instrument(skip_all, fields(party = %self.id))]
    pub async fn run(&mut self) -> Result<F, ProtocolError> {
        if self.state != PartyState::Idle {
            return Err(ProtocolError::InvalidState(self.state));
        }
        self.verify_spec().await?;

        self.enter(PartyState::Sharing);
        self.share_inputs().await?;

        self.enter(PartyState::Evaluating);
        let share = self.evaluate().await?;

        self.enter(PartyState::Publishing);
        self.publish_share(&labels::result(&self.id), share).await?;

        self.enter(PartyState::Reconstructing);
        let result_labels = self.labels_for_all(|sender| labels::result(sender));
        let shares = self.collect_shares(result_labels).await?;
        let result = sharing::reconstruct(&shares);

        self.enter(PartyState::Done);
        Ok(result)
    }

    fn enter(&mut self, state: PartyState) {
        debug!(from = ?self.state, to = ?state, "State transition");
        self.state = state;
    }

    /// Wait on transport operation for at most the configured timeout.
    async fn bounded<R>(
        &self,
        label: &str,
        operation: impl Future<Output = Result<R, TransportError>>,
    ) -> Result<R, ProtocolError> {
        let timeout = self.config.retrieve_timeout;
        match tokio::time::timeout(timeout, operation).await {
            Ok(result) => result.map_err(|source| ProtocolError::Transport {
                label: label.to_string(),
                source,
            }),
            Err(_) => Err(ProtocolError::Timeout {
                label: label.to_string(),
                timeout,
            }),
        }
    }

    /// Make sure every peer evaluates the same specification. The multiplication
    /// node identifiers of all parties line up only if this holds.
    async fn verify_spec(&self) -> Result<(), ProtocolError> {
        let fingerprint = self.spec.fingerprint()?;
        let label = labels::fingerprint(&self.id);
        self.bounded(&label, self.transport.publish(&label, fingerprint.to_vec()))
            .await?;

        for peer in self.spec.participant_ids.iter().filter(|p| **p != self.id) {
            let label = labels::fingerprint(peer);
            let theirs = self
                .bounded(&label, self.transport.retrieve_public(peer, &label))
                .await?;
            if theirs[..] != fingerprint[..] {
                return Err(ConfigError::SpecMismatch(peer.clone()).into());
            }
        }
        Ok(())
    }

    /// Split own secrets and send one share to every participant, ourselves included.
    async fn share_inputs(&self) -> Result<(), ProtocolError> {
        let referenced: HashSet<&SecretId> = self.spec.expr.secret_ids().into_iter().collect();
        let inputs: BTreeMap<_, _> = self.inputs.iter().collect();

        for (id, &value) in inputs {
            if !referenced.contains(id) {
                warn!(secret = %id, "Secret is not used by the expression");
            }
            let label = labels::secret_share(id);
            let shares = sharing::split(value, self.spec.num_parties(), id.as_bytes());
            for (receiver, share) in self.spec.participant_ids.iter().zip(shares) {
                let payload = encode_share(&label, &share)?;
                trace!(%receiver, %label, "Sending share");
                self.bounded(&label, self.transport.send_private(receiver, &label, payload))
                    .await?;
            }
        }
        Ok(())
    }

    /// Evaluate circuit on shares and return own share of the output.
    async fn evaluate(&mut self) -> Result<Share<F>, ProtocolError> {
        let circuit = Arc::clone(&self.circuit);
        let mut wires: Vec<Value<F>> = Vec::with_capacity(circuit.gates().len());

        for gate in circuit.gates() {
            let value = match gate {
                Gate::Constant(value) => Value::Public(*value),
                Gate::Input(id) => Value::Shared(self.input_share(id).await?),
                Gate::Add(left, right) => wires[*left].clone() + wires[*right].clone(),
                Gate::Sub(left, right) => wires[*left].clone() - wires[*right].clone(),
                Gate::Mul(left, right, mult) => {
                    let (left, right) = (wires[*left].clone(), wires[*right].clone());
                    self.multiply(left, right, *mult).await?
                }
            };
            wires.push(value);
        }

        Ok(match wires.swap_remove(circuit.output()) {
            Value::Shared(share) => share,
            // Public outputs are held entirely by the canonical share.
            Value::Public(value) => Share::new(self.index, F::zero(), Vec::new()) + value,
        })
    }

    /// Own share of secret `id`, received from its owner at first use.
    async fn input_share(&mut self, id: &SecretId) -> Result<Share<F>, ProtocolError> {
        if let Some(share) = self.received.get(id) {
            return Ok(share.clone());
        }
        let label = labels::secret_share(id);
        let payload = self
            .bounded(&label, self.transport.retrieve_private(&label))
            .await?;
        let share = decode_share(&label, &payload)?;
        if share.index() != self.index || share.correlation_id() != id.as_bytes() {
            return Err(ProtocolError::InconsistentShare {
                label,
                reason: format!("expected slot {} of secret {}", self.index, id),
            });
        }
        trace!(%label, "Received share");
        self.received.insert(id.clone(), share.clone());
        Ok(share)
    }

    async fn multiply(
        &mut self,
        x: Value<F>,
        y: Value<F>,
        mult: MultId,
    ) -> Result<Value<F>, ProtocolError> {
        Ok(match (x, y) {
            (Value::Public(x), Value::Public(y)) => Value::Public(x * y),
            (Value::Shared(share), Value::Public(k)) | (Value::Public(k), Value::Shared(share)) => {
                Value::Shared(share * k)
            }
            (Value::Shared(x), Value::Shared(y)) => {
                Value::Shared(self.beaver_multiply(x, y, mult).await?)
            }
        })
    }

    /// Share of `x*y` using the Beaver triple of node `mult`.
    /// Cost: 1 triple, 2 openings, 1 communication round.
    async fn beaver_multiply(
        &mut self,
        x: Share<F>,
        y: Share<F>,
        mult: MultId,
    ) -> Result<Share<F>, ProtocolError> {
        let triplet = self.triplet(mult).await?;

        let d_label = labels::opening(&self.id, Opening::D, mult);
        let e_label = labels::opening(&self.id, Opening::E, mult);
        let d_share = Share::new(self.index, x.value() - triplet.a.value(), d_label.as_bytes());
        let e_share = Share::new(self.index, y.value() - triplet.b.value(), e_label.as_bytes());
        self.publish_share(&d_label, d_share).await?;
        self.publish_share(&e_label, e_share).await?;

        let d_labels = self.labels_for_all(|sender| labels::opening(sender, Opening::D, mult));
        let e_labels = self.labels_for_all(|sender| labels::opening(sender, Opening::E, mult));
        let d = sharing::reconstruct(&self.collect_shares(d_labels).await?);
        let e = sharing::reconstruct(&self.collect_shares(e_labels).await?);
        trace!(%mult, "Opened Beaver differences");

        Ok(beaver_product(self.index, &triplet, d, e, mult))
    }

    /// Triplet of node `mult`, requested from the generator at first use.
    async fn triplet(&mut self, mult: MultId) -> Result<Triplet<F>, ProtocolError> {
        if let Some(triplet) = self.triplets.get(&mult) {
            return Ok(triplet.clone());
        }
        let node_id = mult.to_string();
        let payload = self
            .bounded(&node_id, self.transport.retrieve_triplet(&node_id))
            .await?;
        let triplet = Triplet::from_bytes(&payload).map_err(|source| ProtocolError::Malformed {
            label: node_id.clone(),
            source,
        })?;
        if triplet.a.correlation_id() != node_id.as_bytes() {
            return Err(ProtocolError::InconsistentShare {
                label: node_id,
                reason: "triplet belongs to another node".to_string(),
            });
        }
        self.triplets.insert(mult, triplet.clone());
        Ok(triplet)
    }

    async fn publish_share(&self, label: &str, share: Share<F>) -> Result<(), ProtocolError> {
        let payload = encode_share(label, &share.with_correlation_id(label))?;
        self.bounded(label, self.transport.publish(label, payload))
            .await
    }

    /// Label of every participant's message, in participant order.
    fn labels_for_all(&self, label: impl Fn(&str) -> String) -> Vec<String> {
        self.spec
            .participant_ids
            .iter()
            .map(|sender| label(sender))
            .collect()
    }

    /// Read share published by every participant. `labels[i]` belongs to participant `i`.
    /// Requests are issued one after another, so each timeout covers a single
    /// retrieval even on transports that serialize requests.
    async fn collect_shares(&self, labels: Vec<String>) -> Result<Vec<Share<F>>, ProtocolError> {
        let mut shares = Vec::with_capacity(labels.len());
        for (index, (sender, label)) in self.spec.participant_ids.iter().zip(labels).enumerate() {
            let payload = self
                .bounded(&label, self.transport.retrieve_public(sender, &label))
                .await?;
            let share = decode_share(&label, &payload)?;
            if share.index() != index {
                return Err(ProtocolError::InconsistentShare {
                    label,
                    reason: format!("expected slot {}, got {}", index, share.index()),
                });
            }
            shares.push(share);
        }
        Ok(shares)
    }
}

/// Share of `x*y` held by party `index`, given its triple shares and the opened
/// differences `d = x - a` and `e = y - b`.
fn beaver_product<F: MpcField>(
    index: usize,
    triplet: &Triplet<F>,
    d: F,
    e: F,
    mult: MultId,
) -> Share<F> {
    let z = triplet.c.value() + d * triplet.b.value() + e * triplet.a.value();
    // The public term d*e goes to the canonical share only.
    Share::new(index, z, mult.to_string()) + d * e
}

fn encode_share<F: MpcField>(label: &str, share: &Share<F>) -> Result<Vec<u8>, ProtocolError> {
    share.to_bytes().map_err(|source| ProtocolError::Malformed {
        label: label.to_string(),
        source,
    })
}

fn decode_share<F: MpcField>(label: &str, payload: &[u8]) -> Result<Share<F>, ProtocolError> {
    Share::from_bytes(payload).map_err(|source| ProtocolError::Malformed {
        label: label.to_string(),
        source,
    })
}
