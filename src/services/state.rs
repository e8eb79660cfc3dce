//! Per-address send state: whether mail to an address is muted, and why.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{MailError, Result};

/// Send state of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SendState {
    /// Mail is sent normally.
    Send,
    /// Mail is sent no matter what bounces say.
    PersistentSend,
    /// Muted by an administrator.
    OnHold,
    /// Soft bounces seen so far; mail is still sent.
    Counting { count: u32, threshold: u32 },
    /// Muted after too many soft bounces.
    TemporarilyUnreachable,
    /// Muted after a hard bounce.
    InvalidAddress,
}

impl SendState {
    /// Whether mail to the address is currently suppressed.
    pub fn is_mute(&self) -> bool {
        matches!(
            self,
            Self::OnHold | Self::TemporarilyUnreachable | Self::InvalidAddress
        )
    }

    /// Stable identifier, e.g. `"invalid_address"`.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::PersistentSend => "persistent_send",
            Self::OnHold => "onhold",
            Self::Counting { .. } => "counting",
            Self::TemporarilyUnreachable => "temporarily_unreachable",
            Self::InvalidAddress => "invalid_address",
        }
    }
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counting { count, threshold } => write!(f, "counting ({count}/{threshold})"),
            other => f.write_str(other.id()),
        }
    }
}

/// Persistent send states.
///
/// Implementations must make [`update`](SendStateStore::update) atomic per
/// address: two deliveries of a bounce for the same recipient must not both
/// read the same counter.
pub trait SendStateStore: Send + Sync {
    /// Current state, or `None` if the address is unknown.
    fn state(&self, address: &str) -> Result<Option<SendState>>;

    /// Move a known address to `state`.
    fn transition(&self, address: &str, state: SendState) -> Result<()>;

    /// Atomically replace the state with `f(current)` and return the new one,
    /// or `None` if the address is unknown.
    fn update(
        &self,
        address: &str,
        f: &mut dyn FnMut(&SendState) -> SendState,
    ) -> Result<Option<SendState>>;
}

/// In-memory store guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemorySendStateStore {
    states: Mutex<HashMap<String, SendState>>,
}

impl MemorySendStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an address known, in state [`SendState::Send`].
    pub fn register(&self, address: impl Into<String>) {
        self.lock()
            .entry(address.into().to_lowercase())
            .or_insert(SendState::Send);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SendState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SendStateStore for MemorySendStateStore {
    fn state(&self, address: &str) -> Result<Option<SendState>> {
        Ok(self.lock().get(&address.to_lowercase()).cloned())
    }

    fn transition(&self, address: &str, state: SendState) -> Result<()> {
        match self.lock().get_mut(&address.to_lowercase()) {
            Some(current) => {
                *current = state;
                Ok(())
            }
            None => Err(MailError::StateStore(format!("Unknown address: {address}"))),
        }
    }

    fn update(
        &self,
        address: &str,
        f: &mut dyn FnMut(&SendState) -> SendState,
    ) -> Result<Option<SendState>> {
        let mut states = self.lock();
        Ok(states.get_mut(&address.to_lowercase()).map(|current| {
            *current = f(current);
            current.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_address() {
        let store = MemorySendStateStore::new();
        assert_eq!(store.state("nobody@example.org").unwrap(), None);
        assert!(store
            .transition("nobody@example.org", SendState::OnHold)
            .is_err());
        assert_eq!(
            store
                .update("nobody@example.org", &mut |_| SendState::OnHold)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_register_and_transition() {
        let store = MemorySendStateStore::new();
        store.register("User@Example.org");
        assert_eq!(
            store.state("user@example.org").unwrap(),
            Some(SendState::Send)
        );
        store
            .transition("user@example.org", SendState::InvalidAddress)
            .unwrap();
        let state = store.state("USER@example.org").unwrap().unwrap();
        assert!(state.is_mute());
        assert_eq!(state.id(), "invalid_address");
    }

    #[test]
    fn test_update_is_read_modify_write() {
        let store = MemorySendStateStore::new();
        store.register("user@example.org");
        let bump = &mut |state: &SendState| match state {
            SendState::Counting { count, threshold } => SendState::Counting {
                count: count + 1,
                threshold: *threshold,
            },
            _ => SendState::Counting {
                count: 1,
                threshold: 3,
            },
        };
        store.update("user@example.org", &mut *bump).unwrap();
        let state = store.update("user@example.org", &mut *bump).unwrap();
        assert_eq!(
            state,
            Some(SendState::Counting {
                count: 2,
                threshold: 3
            })
        );
        assert_eq!(state.unwrap().to_string(), "counting (2/3)");
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_counts() {
        let store = std::sync::Arc::new(MemorySendStateStore::new());
        store.register("user@example.org");
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .update("user@example.org", &mut |state| match state {
                                SendState::Counting { count, threshold } => SendState::Counting {
                                    count: count + 1,
                                    threshold: *threshold,
                                },
                                _ => SendState::Counting {
                                    count: 1,
                                    threshold: 1000,
                                },
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(
            store.state("user@example.org").unwrap(),
            Some(SendState::Counting {
                count: 400,
                threshold: 1000
            })
        );
    }
}
