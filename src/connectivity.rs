use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

/// Snapshot of the platform's network state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    /// Whether a network interface is connected.
    pub connected: bool,
    /// Whether the internet is actually reachable, when the platform can
    /// tell. `None` means unknown.
    pub reachable: Option<bool>,
}

impl NetworkState {
    pub fn online() -> Self {
        Self {
            connected: true,
            reachable: Some(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            connected: false,
            reachable: Some(false),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("network probe failed: {0}")]
pub struct ProbeError(pub String);

/// Platform seam for the connectivity probe. Implementations query whatever
/// the host platform exposes; they must not block.
pub trait NetworkStateProvider: Send + Sync {
    fn current(&self) -> Result<NetworkState, ProbeError>;
}

/// Returns true only when the provider definitively reports no usable
/// network. A probe failure reports not-offline (fail open) so a broken
/// probe cannot block legitimate requests.
pub fn is_offline(provider: &dyn NetworkStateProvider) -> bool {
    match provider.current() {
        Ok(state) => !state.connected || state.reachable == Some(false),
        Err(e) => {
            warn!("{}, assuming online", e);
            false
        }
    }
}

/// Settable provider: platforms push state changes into it, tests flip it.
pub struct StaticNetworkState {
    state: Mutex<Result<NetworkState, ProbeError>>,
}

impl StaticNetworkState {
    pub fn new(state: NetworkState) -> Self {
        Self {
            state: Mutex::new(Ok(state)),
        }
    }

    pub fn online() -> Self {
        Self::new(NetworkState::online())
    }

    pub fn set(&self, state: NetworkState) {
        *self.state.lock().expect("network state lock poisoned") = Ok(state);
    }

    /// Make subsequent probes fail, for exercising the fail-open path.
    pub fn set_failing(&self, message: &str) {
        *self.state.lock().expect("network state lock poisoned") =
            Err(ProbeError(message.to_string()));
    }
}

impl NetworkStateProvider for StaticNetworkState {
    fn current(&self) -> Result<NetworkState, ProbeError> {
        self.state.lock().expect("network state lock poisoned").clone()
    }
}
