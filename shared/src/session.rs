use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::provider::IdentityResolver;
use crate::types::{Principal, Role, UserAccount};

/// Snapshot of the authenticated session published to all consumers.
/// `is_loading` stays true until the first auth-state notification has been
/// processed, including an initial "no user".
#[derive(Debug, Serialize, Clone)]
pub struct SessionState {
    pub principal: Option<Principal>,
    pub account: Option<UserAccount>,
    pub role: Option<Role>,
    pub is_loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            principal: None,
            account: None,
            role: None,
            is_loading: true,
        }
    }
}

/// Process-local cache of the current principal and resolved role. Fed by
/// the resolver's auth-state subscription; single writer, many readers.
#[derive(Clone)]
pub struct SessionStore {
    state: watch::Receiver<SessionState>,
}

impl SessionStore {
    /// Subscribes to the resolver's auth events and keeps the published
    /// session state current in a background task.
    pub fn spawn(resolver: Arc<dyn IdentityResolver>) -> SessionStore {
        let (tx, rx) = watch::channel(SessionState::default());
        let mut events = resolver.subscribe();
        tokio::spawn(async move {
            loop {
                let principal = events.borrow_and_update().clone();
                let state = resolve_state(resolver.as_ref(), principal).await;
                if tx.send(state).is_err() {
                    break; // no readers left
                }
                if events.changed().await.is_err() {
                    break; // resolver dropped
                }
            }
        });
        SessionStore { state: rx }
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

async fn resolve_state(
    resolver: &dyn IdentityResolver,
    principal: Option<Principal>,
) -> SessionState {
    let Some(principal) = principal else {
        return SessionState {
            principal: None,
            account: None,
            role: None,
            is_loading: false,
        };
    };

    // Role resolution is fail-closed: a missing record or a failed fetch
    // yields the lowest-privilege role and never blocks the login.
    let (account, role) = match resolver.account_by_id(&principal.account_id).await {
        Ok(Some(account)) => {
            let role = account.role;
            (Some(account), role)
        }
        Ok(None) => {
            tracing::warn!("no profile record for account {}", principal.account_id);
            (None, Role::User)
        }
        Err(err) => {
            tracing::error!(
                "failed to fetch profile for account {}: {}",
                principal.account_id,
                err
            );
            (None, Role::User)
        }
    };

    SessionState {
        principal: Some(principal),
        account,
        role: Some(role),
        is_loading: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use crate::provider::AuthStateReceiver;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct StubResolver {
        events: watch::Sender<Option<Principal>>,
        accounts: Mutex<HashMap<String, UserAccount>>,
        fail_lookups: AtomicBool,
    }

    impl StubResolver {
        fn new() -> Arc<Self> {
            let (events, _) = watch::channel(None);
            Arc::new(Self {
                events,
                accounts: Mutex::new(HashMap::new()),
                fail_lookups: AtomicBool::new(false),
            })
        }

        fn insert_account(&self, account: UserAccount) {
            self.accounts
                .lock()
                .unwrap()
                .insert(account.account_id.clone(), account);
        }

        fn sign_in(&self, account_id: &str) {
            self.events
                .send(Some(Principal {
                    account_id: account_id.to_string(),
                    email: format!("{account_id}@fieldlog.local"),
                }))
                .unwrap();
        }

        fn sign_out(&self) {
            self.events.send(None).unwrap();
        }
    }

    #[async_trait]
    impl IdentityResolver for StubResolver {
        async fn employee_login(&self, _: &str, _: &str) -> Result<(), DataError> {
            Err(DataError::transport("not used by this stub"))
        }

        async fn create_employee(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Role,
        ) -> Result<(), DataError> {
            Err(DataError::transport("not used by this stub"))
        }

        async fn login(&self, _: &str, _: &str) -> Result<(), DataError> {
            Err(DataError::transport("not used by this stub"))
        }

        async fn signup(&self, _: &str, _: &str) -> Result<(), DataError> {
            Err(DataError::transport("not used by this stub"))
        }

        async fn logout(&self) -> Result<(), DataError> {
            self.sign_out();
            Ok(())
        }

        async fn account_by_id(&self, account_id: &str) -> Result<Option<UserAccount>, DataError> {
            if self.fail_lookups.load(Ordering::SeqCst) {
                return Err(DataError::transport("profile store unavailable"));
            }
            Ok(self.accounts.lock().unwrap().get(account_id).cloned())
        }

        fn subscribe(&self) -> AuthStateReceiver {
            self.events.subscribe()
        }
    }

    async fn wait_for(
        store: &SessionStore,
        predicate: impl FnMut(&SessionState) -> bool,
    ) -> SessionState {
        let mut rx = store.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(predicate))
            .await
            .expect("session state did not settle")
            .expect("session task gone")
            .clone();
        state
    }

    fn admin_account(account_id: &str) -> UserAccount {
        UserAccount {
            account_id: account_id.to_string(),
            employee_id: "emp001".to_string(),
            name: "John Doe".to_string(),
            email: "emp001@fieldlog.local".to_string(),
            role: Role::Admin,
        }
    }

    #[tokio::test]
    async fn initial_no_user_event_clears_loading() {
        let resolver = StubResolver::new();
        let store = SessionStore::spawn(resolver.clone());

        let state = wait_for(&store, |s| !s.is_loading).await;
        assert!(state.principal.is_none());
        assert!(state.role.is_none());
    }

    #[tokio::test]
    async fn sign_in_resolves_role_from_profile() {
        let resolver = StubResolver::new();
        resolver.insert_account(admin_account("acct-1"));
        let store = SessionStore::spawn(resolver.clone());
        wait_for(&store, |s| !s.is_loading).await;

        resolver.sign_in("acct-1");
        let state = wait_for(&store, |s| s.principal.is_some()).await;
        assert_eq!(state.role, Some(Role::Admin));
        assert_eq!(state.account.unwrap().name, "John Doe");
    }

    #[tokio::test]
    async fn missing_profile_degrades_to_user() {
        let resolver = StubResolver::new();
        let store = SessionStore::spawn(resolver.clone());
        wait_for(&store, |s| !s.is_loading).await;

        resolver.sign_in("acct-unknown");
        let state = wait_for(&store, |s| s.principal.is_some()).await;
        assert_eq!(state.role, Some(Role::User));
        assert!(state.account.is_none());
    }

    #[tokio::test]
    async fn profile_fetch_failure_degrades_to_user_not_admin() {
        let resolver = StubResolver::new();
        resolver.insert_account(admin_account("acct-1"));
        resolver.fail_lookups.store(true, Ordering::SeqCst);
        let store = SessionStore::spawn(resolver.clone());
        wait_for(&store, |s| !s.is_loading).await;

        resolver.sign_in("acct-1");
        let state = wait_for(&store, |s| s.principal.is_some()).await;
        // The profile says admin, but the fetch failed: fail closed.
        assert_eq!(state.role, Some(Role::User));
    }

    #[tokio::test]
    async fn sign_out_clears_role_and_account() {
        let resolver = StubResolver::new();
        resolver.insert_account(admin_account("acct-1"));
        let store = SessionStore::spawn(resolver.clone());
        wait_for(&store, |s| !s.is_loading).await;

        resolver.sign_in("acct-1");
        wait_for(&store, |s| s.principal.is_some()).await;

        resolver.logout().await.unwrap();
        let state = wait_for(&store, |s| s.principal.is_none()).await;
        assert!(state.role.is_none());
        assert!(state.account.is_none());
        assert!(!state.is_loading);
    }
}
