//! Shared helpers for the session manager integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use sportgo_session::{
    Credentials, DEFAULT_REFRESH_INTERVAL, Error, IdentityProvider, MemoryStorage, Role,
    SessionManager, SessionSnapshot, SessionStorage, StorageKey, TokenPair, UserProfile,
};
use tokio::sync::watch;

/// How the fake answers the refresh endpoint.
#[derive(Debug, Clone, Copy)]
pub enum RefreshReply {
    /// Issue `T{n}` / `R{n}`, counting up from 2.
    Rotate,
    /// Reject with the given HTTP status.
    Reject(u16),
    /// Fail without a status, like a dropped connection.
    Fail,
}

/// In-memory identity provider with call counters.
pub struct FakeProvider {
    pub refresh_calls: AtomicUsize,
    pub user_info_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    refresh_reply: Mutex<RefreshReply>,
    refresh_delay: Mutex<Option<Duration>>,
    logout_delay: Mutex<Option<Duration>>,
    profile: Mutex<Option<UserProfile>>,
    sign_in_profile: Mutex<Option<UserProfile>>,
    logout_fails: AtomicBool,
    refreshed_with: Mutex<Vec<String>>,
    logged_out_with: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            user_info_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            refresh_reply: Mutex::new(RefreshReply::Rotate),
            refresh_delay: Mutex::new(None),
            logout_delay: Mutex::new(None),
            profile: Mutex::new(None),
            sign_in_profile: Mutex::new(None),
            logout_fails: AtomicBool::new(false),
            refreshed_with: Mutex::new(Vec::new()),
            logged_out_with: Mutex::new(Vec::new()),
        }
    }

    /// Profile returned by the user info endpoint; `None` makes it fail.
    pub fn set_profile(&self, profile: Option<UserProfile>) {
        *self.profile.lock().unwrap() = profile;
    }

    pub fn set_sign_in_profile(&self, profile: Option<UserProfile>) {
        *self.sign_in_profile.lock().unwrap() = profile;
    }

    pub fn set_refresh_reply(&self, reply: RefreshReply) {
        *self.refresh_reply.lock().unwrap() = reply;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_logout_delay(&self, delay: Duration) {
        *self.logout_delay.lock().unwrap() = Some(delay);
    }

    pub fn user_info_count(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    pub fn set_logout_fails(&self, fails: bool) {
        self.logout_fails.store(fails, Ordering::SeqCst);
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn refreshed_with(&self) -> Vec<String> {
        self.refreshed_with.lock().unwrap().clone()
    }

    pub fn logged_out_with(&self) -> Vec<String> {
        self.logged_out_with.lock().unwrap().clone()
    }
}

fn rejected(operation: &'static str, status: u16) -> Error {
    Error::Api {
        operation,
        status: Some(status),
        detail: "rejected by fake".into(),
    }
}

impl IdentityProvider for FakeProvider {
    async fn sign_in(&self, _credentials: &Credentials) -> Result<UserProfile, Error> {
        let profile = self.sign_in_profile.lock().unwrap().clone();
        profile.ok_or_else(|| rejected("login", 401))
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 2;
        self.refreshed_with
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = *self.refresh_reply.lock().unwrap();
        match reply {
            RefreshReply::Rotate => Ok(TokenPair {
                access_token: format!("T{n}"),
                refresh_token: format!("R{n}"),
            }),
            RefreshReply::Reject(status) => Err(rejected("token refresh", status)),
            RefreshReply::Fail => Err(Error::Api {
                operation: "token refresh",
                status: None,
                detail: "connection reset".into(),
            }),
        }
    }

    async fn user_info(&self, _access_token: &str) -> Result<UserProfile, Error> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        let profile = self.profile.lock().unwrap().clone();
        profile.ok_or_else(|| rejected("user info request", 503))
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), Error> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logged_out_with
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        let delay = *self.logout_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.logout_fails.load(Ordering::SeqCst) {
            return Err(Error::Api {
                operation: "logout",
                status: None,
                detail: "network unreachable".into(),
            });
        }
        Ok(())
    }
}

pub type TestManager = SessionManager<Arc<FakeProvider>, Arc<MemoryStorage>>;

pub fn create_test_manager() -> (TestManager, Arc<FakeProvider>, Arc<MemoryStorage>) {
    let provider = Arc::new(FakeProvider::new());
    let storage = Arc::new(MemoryStorage::new());
    let manager = SessionManager::new(provider.clone(), storage.clone(), DEFAULT_REFRESH_INTERVAL);
    (manager, provider, storage)
}

/// Memory storage that records, on every read, whether the manager was
/// reporting `is_auth_loading` at that moment.
#[derive(Default)]
pub struct ObservedStorage {
    inner: MemoryStorage,
    updates: OnceLock<watch::Receiver<SessionSnapshot>>,
    loading_at_read: Mutex<Vec<bool>>,
}

impl ObservedStorage {
    pub fn observe(&self, updates: watch::Receiver<SessionSnapshot>) {
        let _ = self.updates.set(updates);
    }

    pub fn loading_at_read(&self) -> Vec<bool> {
        self.loading_at_read.lock().unwrap().clone()
    }
}

impl SessionStorage for ObservedStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>, Error> {
        if let Some(updates) = self.updates.get() {
            let loading = updates.borrow().is_auth_loading();
            self.loading_at_read.lock().unwrap().push(loading);
        }
        self.inner.get(key)
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), Error> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: StorageKey) -> Result<(), Error> {
        self.inner.remove(key)
    }
}

/// Login payload as the credential exchange returns it.
pub fn issued_profile(access: &str, refresh: &str, email: &str) -> UserProfile {
    UserProfile::from_tokens(TokenPair {
        access_token: access.into(),
        refresh_token: refresh.into(),
    })
    .with_email(email)
}

/// Profile as the user info endpoint returns it.
pub fn server_profile(full_name: &str, role: Role) -> UserProfile {
    UserProfile::default().with_full_name(full_name).with_role(role)
}

pub fn stored(storage: &MemoryStorage, key: StorageKey) -> Option<String> {
    storage.get(key).unwrap()
}

pub fn stored_user(storage: &MemoryStorage) -> Option<UserProfile> {
    stored(storage, StorageKey::User).map(|raw| serde_json::from_str(&raw).unwrap())
}

/// Let spawned tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Move paused time just past the next refresh tick.
pub async fn advance_one_interval() {
    tokio::time::sleep(DEFAULT_REFRESH_INTERVAL + Duration::from_millis(1)).await;
    settle().await;
}
