//! Start/stop bookkeeping shared by every receiver.

use crate::ReceiverError;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Owns the cancellation token of a running receiver. Dropping it stops the
/// receiver's tasks.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    token: Option<CancellationToken>,
}

impl Lifecycle {
    /// The runtime receivers spawn onto.
    pub(crate) fn runtime() -> Result<Handle, ReceiverError> {
        Handle::try_current().map_err(|_| ReceiverError::NoRuntime)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Mark the receiver as running and hand out the token its tasks watch.
    pub(crate) fn begin(&mut self) -> CancellationToken {
        self.stop();
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        token
    }

    /// Cancel the running tasks. Returns `false` if nothing was running.
    pub(crate) fn stop(&mut self) -> bool {
        match self.token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.stop();
    }
}
