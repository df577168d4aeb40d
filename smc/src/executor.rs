//! Drivers running parties to completion.

use std::{collections::HashMap, future::Future, sync::Arc};

use crate::{
    config::EngineConfig,
    error::ProtocolError,
    expression::SecretId,
    fields::MpcField,
    mailbox::{serve_connection, Mailbox},
    party::SmcParty,
    protocol::{ParticipantId, ProtocolSpec},
    transport::{mailbox_duplex, ChannelTransport, Transport},
};

/// Private inputs of every participant, keyed by participant id.
pub type PartyInputs<F> = HashMap<ParticipantId, HashMap<SecretId, F>>;

/// Buffer size of in-process framed connections.
const DUPLEX_BUF_SIZE: usize = 1 << 16;

/// Run single party over given transport and return reconstructed result.
pub async fn run_party<F: MpcField, T: Transport>(
    spec: ProtocolSpec<F>,
    participant: impl Into<ParticipantId>,
    inputs: HashMap<SecretId, F>,
    transport: T,
    config: EngineConfig,
) -> Result<F, ProtocolError> {
    let mut party = SmcParty::new(participant, spec, inputs, transport, config)?;
    party.run().await
}

/// Run every participant of `spec` as a separate tokio task sharing one
/// in-process mailbox. Results are returned in participant order.
pub async fn run_in_process<F: MpcField>(
    spec: &ProtocolSpec<F>,
    inputs: PartyInputs<F>,
    config: EngineConfig,
) -> Vec<Result<F, ProtocolError>> {
    let mailbox = Arc::new(Mailbox::<F>::new(spec.participant_ids.clone()));
    spawn_parties(spec, inputs, |participant, spec, inputs| {
        let mailbox = Arc::clone(&mailbox);
        let config = config.clone();
        async move {
            let transport = mailbox.transport(participant.as_str()).map_err(|err| {
                ProtocolError::Transport {
                    label: participant.clone(),
                    source: err.into(),
                }
            })?;
            run_party(spec, participant, inputs, transport, config).await
        }
    })
    .await
}

/// Same as [`run_in_process`], but every party talks to the mailbox through
/// a length-framed bincode connection.
pub async fn run_in_process_framed<F: MpcField>(
    spec: &ProtocolSpec<F>,
    inputs: PartyInputs<F>,
    config: EngineConfig,
) -> Vec<Result<F, ProtocolError>> {
    let mailbox = Arc::new(Mailbox::<F>::new(spec.participant_ids.clone()));
    spawn_parties(spec, inputs, |participant, spec, inputs| {
        let (client, server) = mailbox_duplex(DUPLEX_BUF_SIZE);
        tokio::spawn(serve_connection(Arc::clone(&mailbox), server));
        let config = config.clone();
        async move {
            let transport = ChannelTransport::connect(client, participant.as_str())
                .await
                .map_err(|source| ProtocolError::Transport {
                    label: "hello".to_string(),
                    source,
                })?;
            run_party(spec, participant, inputs, transport, config).await
        }
    })
    .await
}

async fn spawn_parties<F, S, Fut>(
    spec: &ProtocolSpec<F>,
    mut inputs: PartyInputs<F>,
    mut start: S,
) -> Vec<Result<F, ProtocolError>>
where
    F: MpcField,
    S: FnMut(ParticipantId, ProtocolSpec<F>, HashMap<SecretId, F>) -> Fut,
    Fut: Future<Output = Result<F, ProtocolError>> + Send + 'static,
{
    let tasks: Vec<_> = spec
        .participant_ids
        .iter()
        .map(|participant| {
            let own_inputs = inputs.remove(participant).unwrap_or_default();
            let task = tokio::spawn(start(participant.clone(), spec.clone(), own_inputs));
            (participant.clone(), task)
        })
        .collect();

    futures::future::join_all(tasks.into_iter().map(|(participant, task)| async move {
        task.await.unwrap_or_else(|err| {
            Err(ProtocolError::Aborted {
                participant,
                reason: err.to_string(),
            })
        })
    }))
    .await
}
