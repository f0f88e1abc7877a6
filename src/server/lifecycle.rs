use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::Error;

/// Where a [`crate::Server`] is in its life.
///
/// `Created -> Initializing -> Initialized -> Running -> Stopping -> Stopped`,
/// and any state but `Failed` may fail. Nothing leaves `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Initializing,
    Initialized,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ServerState {
    pub fn can_transition_to(&self, next: ServerState) -> bool {
        use ServerState::*;

        match (*self, next) {
            (Failed, _) => false,
            (_, Failed) => true,
            (Created, Initializing)
            | (Initializing, Initialized)
            | (Initialized, Running)
            | (Running, Stopping)
            | (Stopping, Stopped) => true,
            _ => false,
        }
    }
}

/// Notified after every successful transition.
#[async_trait]
pub trait StateListener: Send + Sync {
    async fn on_state_change(&self, old_state: ServerState, new_state: ServerState);
}

/// Shared handle on a server's state. Clones observe the same state.
#[derive(Clone)]
pub struct LifecycleManager {
    state: Arc<RwLock<ServerState>>,
    listeners: Arc<RwLock<Vec<Box<dyn StateListener>>>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        LifecycleManager {
            state: Arc::new(RwLock::new(ServerState::Created)),
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn current_state(&self) -> ServerState {
        *self.state.read().await
    }

    pub async fn transition_to(&self, new_state: ServerState) -> Result<(), Error> {
        let old_state = {
            let mut current = self.state.write().await;
            if !current.can_transition_to(new_state) {
                return Err(Error::Lifecycle(format!(
                    "Server cannot go from {:?} to {:?}",
                    *current, new_state
                )));
            }
            std::mem::replace(&mut *current, new_state)
        };

        for listener in self.listeners.read().await.iter() {
            listener.on_state_change(old_state, new_state).await;
        }
        Ok(())
    }

    pub async fn add_listener(&self, listener: Box<dyn StateListener>) {
        self.listeners.write().await.push(listener);
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs every transition at info level.
#[derive(Clone)]
pub struct LoggingStateListener;

#[async_trait]
impl StateListener for LoggingStateListener {
    async fn on_state_change(&self, old_state: ServerState, new_state: ServerState) {
        info!(from = ?old_state, to = ?new_state, "Server state changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_state_transitions() {
        assert!(ServerState::Created.can_transition_to(ServerState::Initializing));
        assert!(ServerState::Initializing.can_transition_to(ServerState::Initialized));
        assert!(ServerState::Initialized.can_transition_to(ServerState::Running));
        assert!(ServerState::Running.can_transition_to(ServerState::Stopping));
        assert!(ServerState::Stopping.can_transition_to(ServerState::Stopped));
        assert!(ServerState::Initializing.can_transition_to(ServerState::Failed));
        assert!(ServerState::Running.can_transition_to(ServerState::Failed));

        assert!(!ServerState::Created.can_transition_to(ServerState::Running));
        assert!(!ServerState::Initialized.can_transition_to(ServerState::Stopping));
        assert!(!ServerState::Stopped.can_transition_to(ServerState::Running));
        assert!(!ServerState::Failed.can_transition_to(ServerState::Initializing));
        assert!(!ServerState::Failed.can_transition_to(ServerState::Failed));
    }

    struct Recorder(Arc<Mutex<Vec<(ServerState, ServerState)>>>);

    #[async_trait]
    impl StateListener for Recorder {
        async fn on_state_change(&self, old_state: ServerState, new_state: ServerState) {
            self.0.lock().unwrap().push((old_state, new_state));
        }
    }

    #[tokio::test]
    async fn test_lifecycle_manager() {
        let manager = LifecycleManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        manager.add_listener(Box::new(Recorder(seen.clone()))).await;

        assert_eq!(manager.current_state().await, ServerState::Created);

        manager.transition_to(ServerState::Initializing).await.unwrap();
        manager.clone().transition_to(ServerState::Initialized).await.unwrap();
        assert_eq!(manager.current_state().await, ServerState::Initialized);

        let result = manager.transition_to(ServerState::Created).await;
        assert!(matches!(result, Err(Error::Lifecycle(_))));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (ServerState::Created, ServerState::Initializing),
                (ServerState::Initializing, ServerState::Initialized),
            ]
        );
    }
}
