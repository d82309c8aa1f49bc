// Registration handshake: one-shot gate in front of all bidding.

use tracing::{debug, info};

use crate::error::ClientError;
use crate::model::ConnectionId;
use crate::protocol::ClientEvent;

/// Registration state for the session.
///
/// There is no explicit pending state: after the intent is sent the client
/// stays `Unregistered` until the server confirms.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegistrationState {
    #[default]
    Unregistered,
    Registered {
        /// Connection identity at the time the server confirmed, if known.
        identity: Option<ConnectionId>,
        /// Name as echoed back by the server.
        display_name: String,
    },
}

impl RegistrationState {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationState::Registered { .. })
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            RegistrationState::Registered { display_name, .. } => Some(display_name),
            RegistrationState::Unregistered => None,
        }
    }
}

/// Build the registration intent for `raw_name`.
///
/// Blank input and repeat registrations are rejected locally; nothing is
/// emitted for them.
pub fn registration_intent(
    state: &RegistrationState,
    raw_name: &str,
) -> Result<ClientEvent, ClientError> {
    if let RegistrationState::Registered { display_name, .. } = state {
        return Err(ClientError::AlreadyRegistered {
            display_name: display_name.clone(),
        });
    }

    let name = raw_name.trim();
    if name.is_empty() {
        return Err(ClientError::InvalidRegistrationInput);
    }

    Ok(ClientEvent::Register {
        username: name.to_string(),
    })
}

/// Commit a server confirmation. Only the first confirmation takes effect;
/// there is no way back to `Unregistered`.
///
/// Returns `true` when the state changed.
pub(crate) fn confirm(
    state: &mut RegistrationState,
    identity: Option<ConnectionId>,
    username: String,
) -> bool {
    if let RegistrationState::Registered { display_name, .. } = state {
        debug!(
            "Ignoring registration confirmation for {username}, already registered as {display_name}"
        );
        return false;
    }

    info!("Registered as {username}");
    *state = RegistrationState::Registered {
        identity,
        display_name: username,
    };
    true
}
