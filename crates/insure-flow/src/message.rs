//! Messages exchanged over a session. JSON, internally tagged by `type`.

use insure_contract::{SignedTransition, TransitionId, TransitionSignature};
use serde::{Deserialize, Serialize};

use crate::capability::Session;
use crate::error::FlowError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolMessage {
    /// Initiator → responder: the transition signed by the initiator.
    Propose { transition: SignedTransition },
    /// Responder → initiator: the responder's signature.
    Signature { signature: TransitionSignature },
    Refuse { reason: String },
    /// Initiator → responder: the oracle accepted the transition.
    Finalized { transition_id: TransitionId },
    Aborted { reason: String },
    /// Responder → initiator: finalized transition recorded.
    Ack,
}

impl ProtocolMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Propose { .. } => "propose",
            Self::Signature { .. } => "signature",
            Self::Refuse { .. } => "refuse",
            Self::Finalized { .. } => "finalized",
            Self::Aborted { .. } => "aborted",
            Self::Ack => "ack",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FlowError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FlowError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub(crate) async fn send(session: &mut dyn Session, msg: &ProtocolMessage) -> Result<(), FlowError> {
    session.send(msg.encode()?).await
}

pub(crate) async fn receive(session: &mut dyn Session) -> Result<ProtocolMessage, FlowError> {
    let bytes = session.receive().await?;
    ProtocolMessage::decode(&bytes)
}
