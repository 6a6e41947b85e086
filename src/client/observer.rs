use super::ConnectionState;
use crate::utils::error::ClientError;

/// Receives non-blocking notifications from a connection manager.
///
/// Both methods default to doing nothing. They are called synchronously from
/// whichever manager call caused the change, so implementations should
/// return quickly.
pub trait Observer: Send + Sync {
    fn on_state_change(&self, _from: ConnectionState, _to: ConnectionState) {}

    fn on_error(&self, _error: &ClientError) {}
}
