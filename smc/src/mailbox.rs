//! In-process mailbox service: private and public message stores plus the
//! triplet generator, shared by all parties of one run.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, trace, warn};

use crate::{
    dealer::{TripletError, TripletGenerator},
    fields::MpcField,
    transport::{MailboxRequest, MailboxResponse, Transport, TransportError},
};

/// Fault reported by the mailbox service. Serializable, so that it survives
/// the trip over a framed channel.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MailboxError {
    #[error("participant {0} is not registered with the mailbox")]
    UnknownParticipant(String),
    #[error("private message {label} for {receiver} was already consumed")]
    AlreadyConsumed { receiver: String, label: String },
    #[error("private message {label} for {receiver} was already sent")]
    DuplicateMessage { receiver: String, label: String },
    #[error("connection must start with a hello message")]
    MissingHello,
    #[error("unable to encode triplet: {0}")]
    Encoding(String),
    #[error(transparent)]
    Triplet(#[from] TripletError),
}

type Key = (String, String);

#[derive(Default)]
struct Stores {
    /// Keyed by (receiver, label).
    private: HashMap<Key, Vec<u8>>,
    consumed: HashSet<Key>,
    /// Keyed by (sender, label).
    public: HashMap<Key, Vec<u8>>,
}

/// Mailbox shared by the participants of a single run.
pub struct Mailbox<F> {
    participants: HashSet<String>,
    stores: Mutex<Stores>,
    arrivals: Notify,
    triplets: TripletGenerator<F>,
}

impl<F: MpcField> Mailbox<F> {
    /// Create mailbox with a fresh triplet generator.
    pub fn new<I, S>(participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_triplet_generator(participants, TripletGenerator::new())
    }

    /// Create mailbox serving triplets from given generator. All
    /// participants are registered with the generator.
    pub fn with_triplet_generator<I, S>(participants: I, triplets: TripletGenerator<F>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let participants: HashSet<String> = participants.into_iter().map(Into::into).collect();
        for participant in &participants {
            triplets.add_participant(participant.clone());
        }
        Self {
            participants,
            stores: Mutex::new(Stores::default()),
            arrivals: Notify::new(),
            triplets,
        }
    }

    /// Transport handle acting as `participant`.
    pub fn transport(
        self: &Arc<Self>,
        participant: impl Into<String>,
    ) -> Result<LocalTransport<F>, MailboxError> {
        let participant = participant.into();
        self.check_participant(&participant)?;
        Ok(LocalTransport {
            mailbox: Arc::clone(self),
            participant,
        })
    }

    fn check_participant(&self, participant: &str) -> Result<(), MailboxError> {
        if self.participants.contains(participant) {
            Ok(())
        } else {
            Err(MailboxError::UnknownParticipant(participant.to_string()))
        }
    }

    /// Store private message for `receiver`. Every `(receiver, label)` pair
    /// is written once; a second write means two senders claim the same label.
    pub fn send_private(
        &self,
        receiver: &str,
        label: &str,
        payload: Vec<u8>,
    ) -> Result<(), MailboxError> {
        self.check_participant(receiver)?;
        let key = (receiver.to_string(), label.to_string());
        {
            let mut stores = self.stores.lock();
            if stores.private.contains_key(&key) || stores.consumed.contains(&key) {
                warn!(receiver, label, "Rejected duplicate private message");
                return Err(MailboxError::DuplicateMessage {
                    receiver: key.0,
                    label: key.1,
                });
            }
            stores.private.insert(key, payload);
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    /// Wait until private message for `receiver` arrives and consume it.
    pub async fn retrieve_private(
        &self,
        receiver: &str,
        label: &str,
    ) -> Result<Vec<u8>, MailboxError> {
        let key = (receiver.to_string(), label.to_string());
        loop {
            // Registered before the lookup, so an arrival in between is not missed.
            let arrival = self.arrivals.notified();
            {
                let mut stores = self.stores.lock();
                if let Some(payload) = stores.private.remove(&key) {
                    stores.consumed.insert(key);
                    return Ok(payload);
                }
                if stores.consumed.contains(&key) {
                    return Err(MailboxError::AlreadyConsumed {
                        receiver: key.0,
                        label: key.1,
                    });
                }
            }
            arrival.await;
        }
    }

    pub fn publish(&self, sender: &str, label: &str, payload: Vec<u8>) -> Result<(), MailboxError> {
        self.check_participant(sender)?;
        let key = (sender.to_string(), label.to_string());
        self.stores.lock().public.insert(key, payload);
        self.arrivals.notify_waiters();
        Ok(())
    }

    /// Wait until `sender` publishes under `label` and read it without consuming.
    pub async fn retrieve_public(&self, sender: &str, label: &str) -> Result<Vec<u8>, MailboxError> {
        self.check_participant(sender)?;
        let key = (sender.to_string(), label.to_string());
        loop {
            let arrival = self.arrivals.notified();
            let payload = self.stores.lock().public.get(&key).cloned();
            if let Some(payload) = payload {
                return Ok(payload);
            }
            arrival.await;
        }
    }

    /// Encoded triplet shares for `participant` at node `node_id`.
    pub fn retrieve_triplet(&self, participant: &str, node_id: &str) -> Result<Vec<u8>, MailboxError> {
        self.triplets
            .retrieve_triplet(participant, node_id)?
            .to_bytes()
            .map_err(|err| MailboxError::Encoding(err.to_string()))
    }

    /// Execute single request on behalf of `participant`.
    pub async fn handle(&self, participant: &str, request: MailboxRequest) -> MailboxResponse {
        let result = match request {
            MailboxRequest::Hello { .. } => self.check_participant(participant).map(|_| None),
            MailboxRequest::SendPrivate {
                receiver,
                label,
                payload,
            } => self.send_private(&receiver, &label, payload).map(|_| None),
            MailboxRequest::RetrievePrivate { label } => {
                self.retrieve_private(participant, &label).await.map(Some)
            }
            MailboxRequest::Publish { label, payload } => {
                self.publish(participant, &label, payload).map(|_| None)
            }
            MailboxRequest::RetrievePublic { sender, label } => {
                self.retrieve_public(&sender, &label).await.map(Some)
            }
            MailboxRequest::RetrieveTriplet { node_id } => {
                self.retrieve_triplet(participant, &node_id).map(Some)
            }
        };
        match result {
            Ok(Some(payload)) => MailboxResponse::Payload(payload),
            Ok(None) => MailboxResponse::Done,
            Err(err) => MailboxResponse::Failed(err),
        }
    }
}

/// Serve one party connected over a message channel until it disconnects.
/// The first request must be [`MailboxRequest::Hello`].
#[tracing::instrument(skip_all)]
pub async fn serve_connection<F, Channel, E>(mailbox: Arc<Mailbox<F>>, mut channel: Channel)
where
    F: MpcField,
    Channel: Stream<Item = Result<MailboxRequest, E>> + Sink<MailboxResponse> + Unpin,
    E: std::fmt::Display,
{
    let participant = match channel.next().await {
        Some(Ok(MailboxRequest::Hello { participant })) => participant,
        Some(Ok(_)) => {
            let _ = channel
                .send(MailboxResponse::Failed(MailboxError::MissingHello))
                .await;
            return;
        }
        Some(Err(err)) => {
            error!(%err, "Error reading hello");
            return;
        }
        None => return,
    };

    let response = mailbox
        .handle(&participant, MailboxRequest::Hello {
            participant: participant.clone(),
        })
        .await;
    let accepted = matches!(response, MailboxResponse::Done);
    if channel.send(response).await.is_err() || !accepted {
        return;
    }
    debug!(participant, "Party connected");

    loop {
        let request = match channel.next().await {
            Some(Ok(request)) => request,
            Some(Err(err)) => {
                error!(participant, %err, "Error handling connection");
                break;
            }
            None => break,
        };
        trace!(participant, ?request, "Mailbox request");
        let response = mailbox.handle(&participant, request).await;
        if channel.send(response).await.is_err() {
            error!(participant, "Unable to send mailbox response");
            break;
        }
    }
    debug!(participant, "Party disconnected");
}

/// [`Transport`] acting directly on an in-process [`Mailbox`].
pub struct LocalTransport<F> {
    mailbox: Arc<Mailbox<F>>,
    participant: String,
}

#[async_trait]
impl<F: MpcField> Transport for LocalTransport<F> {
    fn participant_id(&self) -> &str {
        &self.participant
    }

    async fn send_private(
        &self,
        receiver: &str,
        label: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        Ok(self.mailbox.send_private(receiver, label, payload)?)
    }

    async fn retrieve_private(&self, label: &str) -> Result<Vec<u8>, TransportError> {
        Ok(self.mailbox.retrieve_private(&self.participant, label).await?)
    }

    async fn publish(&self, label: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        Ok(self.mailbox.publish(&self.participant, label, payload)?)
    }

    async fn retrieve_public(&self, sender: &str, label: &str) -> Result<Vec<u8>, TransportError> {
        Ok(self.mailbox.retrieve_public(sender, label).await?)
    }

    async fn retrieve_triplet(&self, node_id: &str) -> Result<Vec<u8>, TransportError> {
        Ok(self.mailbox.retrieve_triplet(&self.participant, node_id)?)
    }
}
