//! Mailbox contract consumed by the party engine, and a client speaking it
//! over a length-framed bincode channel.

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, DuplexStream},
    sync::Mutex,
};
use tokio_serde::formats::Bincode;
use tokio_util::codec::LengthDelimitedCodec;

use crate::mailbox::MailboxError;

/// Client-side transport failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("error while sending request to mailbox")]
    Send,
    #[error("mailbox connection closed")]
    Closed,
    #[error("unexpected response from mailbox")]
    UnexpectedResponse,
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// Message store through which parties exchange data.
///
/// Private messages are consumed by their single reader. Public messages stay
/// readable by any number of readers. Retrieval blocks until the requested
/// entry exists.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity under which this transport talks to the mailbox.
    fn participant_id(&self) -> &str;

    /// Enqueue message into mailbox of `receiver` under `label`.
    async fn send_private(
        &self,
        receiver: &str,
        label: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Wait for and consume own private message with given label.
    async fn retrieve_private(&self, label: &str) -> Result<Vec<u8>, TransportError>;

    /// Store message visible to everyone under `(own id, label)`.
    async fn publish(&self, label: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Wait for and read message published by `sender` under `label`.
    async fn retrieve_public(&self, sender: &str, label: &str) -> Result<Vec<u8>, TransportError>;

    /// Encoded [`Triplet`](crate::dealer::Triplet) for multiplication node `node_id`.
    async fn retrieve_triplet(&self, node_id: &str) -> Result<Vec<u8>, TransportError>;
}

/// Request sent by a party to the mailbox service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MailboxRequest {
    /// First message on every connection.
    Hello { participant: String },
    SendPrivate {
        receiver: String,
        label: String,
        payload: Vec<u8>,
    },
    RetrievePrivate { label: String },
    Publish { label: String, payload: Vec<u8> },
    RetrievePublic { sender: String, label: String },
    RetrieveTriplet { node_id: String },
}

/// Reply of the mailbox service to a single [`MailboxRequest`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MailboxResponse {
    Done,
    Payload(Vec<u8>),
    Failed(MailboxError),
}

/// Length-framed Bincode-encoded messages channel.
pub type BincodeStreamSink<In, Out, C> =
    tokio_serde::Framed<tokio_util::codec::Framed<C, LengthDelimitedCodec>, In, Out, Bincode<In, Out>>;

/// Party side of a mailbox connection over tokio's Duplex stream.
pub type ClientDuplex = BincodeStreamSink<MailboxResponse, MailboxRequest, DuplexStream>;

/// Mailbox side of a connection over tokio's Duplex stream.
pub type ServerDuplex = BincodeStreamSink<MailboxRequest, MailboxResponse, DuplexStream>;

/// Create length-framed Bincode-encoded message channel from AsyncRead/Write.
pub fn wrap_bincode<In, Out, C>(channel: C) -> BincodeStreamSink<In, Out, C>
where
    C: AsyncRead + AsyncWrite,
    In: DeserializeOwned,
    Out: Serialize,
{
    let length_delimited = tokio_util::codec::Framed::new(channel, LengthDelimitedCodec::new());
    tokio_serde::Framed::new(length_delimited, Bincode::default())
}

/// Create in-process connection between a party and the mailbox service.
pub fn mailbox_duplex(max_buf_size: usize) -> (ClientDuplex, ServerDuplex) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (wrap_bincode(a), wrap_bincode(b))
}

/// [`Transport`] talking to a remote mailbox over a message channel.
/// Requests are issued one at a time.
pub struct ChannelTransport<Channel> {
    participant: String,
    channel: Mutex<Channel>,
}

impl<Channel, E> ChannelTransport<Channel>
where
    Channel: Stream<Item = Result<MailboxResponse, E>> + Sink<MailboxRequest> + Unpin + Send,
    E: Send,
{
    /// Introduce ourselves to the mailbox service and wait for acknowledgement.
    pub async fn connect(
        channel: Channel,
        participant: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let transport = Self {
            participant: participant.into(),
            channel: Mutex::new(channel),
        };
        let hello = MailboxRequest::Hello {
            participant: transport.participant.clone(),
        };
        match transport.request(hello).await? {
            MailboxResponse::Done => Ok(transport),
            _ => Err(TransportError::UnexpectedResponse),
        }
    }

    async fn request(&self, request: MailboxRequest) -> Result<MailboxResponse, TransportError> {
        let mut channel = self.channel.lock().await;
        channel
            .send(request)
            .await
            .map_err(|_| TransportError::Send)?;
        match channel.next().await {
            Some(Ok(MailboxResponse::Failed(err))) => Err(err.into()),
            Some(Ok(response)) => Ok(response),
            _ => Err(TransportError::Closed),
        }
    }

    async fn request_payload(&self, request: MailboxRequest) -> Result<Vec<u8>, TransportError> {
        match self.request(request).await? {
            MailboxResponse::Payload(payload) => Ok(payload),
            _ => Err(TransportError::UnexpectedResponse),
        }
    }

    async fn request_done(&self, request: MailboxRequest) -> Result<(), TransportError> {
        match self.request(request).await? {
            MailboxResponse::Done => Ok(()),
            _ => Err(TransportError::UnexpectedResponse),
        }
    }
}

#[async_trait]
impl<Channel, E> Transport for ChannelTransport<Channel>
where
    Channel: Stream<Item = Result<MailboxResponse, E>> + Sink<MailboxRequest> + Unpin + Send,
    E: Send,
{
    fn participant_id(&self) -> &str {
        &self.participant
    }

    async fn send_private(
        &self,
        receiver: &str,
        label: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.request_done(MailboxRequest::SendPrivate {
            receiver: receiver.to_string(),
            label: label.to_string(),
            payload,
        })
        .await
    }

    async fn retrieve_private(&self, label: &str) -> Result<Vec<u8>, TransportError> {
        self.request_payload(MailboxRequest::RetrievePrivate {
            label: label.to_string(),
        })
        .await
    }

    async fn publish(&self, label: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.request_done(MailboxRequest::Publish {
            label: label.to_string(),
            payload,
        })
        .await
    }

    async fn retrieve_public(&self, sender: &str, label: &str) -> Result<Vec<u8>, TransportError> {
        self.request_payload(MailboxRequest::RetrievePublic {
            sender: sender.to_string(),
            label: label.to_string(),
        })
        .await
    }

    async fn retrieve_triplet(&self, node_id: &str) -> Result<Vec<u8>, TransportError> {
        self.request_payload(MailboxRequest::RetrieveTriplet {
            node_id: node_id.to_string(),
        })
        .await
    }
}
