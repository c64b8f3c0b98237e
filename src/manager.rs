//! The session manager: who is logged in, and keeping their tokens fresh.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sportgo_session::{Credentials, SessionConfig, SessionManager};
//!
//! let config = SessionConfig::from_env()?;
//! let session = SessionManager::from_config(&config);
//!
//! // Restore whatever was persisted by the previous run.
//! session.check_auth().await;
//!
//! if !session.is_logged_in() {
//!     session.sign_in(&Credentials::new("an@example.com", "secret")).await?;
//! }
//!
//! // React to logins, refreshes and logouts.
//! let mut updates = session.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow_and_update().clone();
//!     render(snapshot.user());
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::client::{IdentityClient, IdentityProvider};
use crate::config::SessionConfig;
use crate::error::Error;
use crate::state::{SessionPhase, SessionSnapshot};
use crate::storage::{self, AnyStorage, SessionStorage, StorageKey};
use crate::types::{Credentials, TokenPair, UserProfile};

/// How often the token pair is silently refreshed.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

struct RefreshTask {
    id: u64,
    handle: JoinHandle<()>,
}

struct State {
    snapshot: SessionSnapshot,
    /// Bumped whenever the session is replaced or torn down. Async completions
    /// compare against the value they started with.
    epoch: u64,
    logouts_in_flight: usize,
    refresh_task: Option<RefreshTask>,
    next_task_id: u64,
}

impl State {
    fn stop_refresh(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.handle.abort();
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Tick {
    Continue,
    Stop,
}

struct Inner<P, S> {
    provider: P,
    storage: S,
    refresh_interval: Duration,
    state: Mutex<State>,
    updates: watch::Sender<SessionSnapshot>,
}

/// Owns the client-side session.
///
/// Cheap to clone; clones share the same session. Every operation must run
/// inside a tokio runtime because the periodic refresh is a spawned task.
pub struct SessionManager<P, S> {
    inner: Arc<Inner<P, S>>,
}

// Manual Clone: avoid derive adding `P: Clone, S: Clone` bounds.
impl<P, S> Clone for SessionManager<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl SessionManager<IdentityClient, AnyStorage> {
    /// Build a manager talking HTTP to the configured API, persisting to the
    /// configured file (or memory when none is set).
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            IdentityClient::new(config.api().clone()),
            config.storage(),
            config.refresh_interval(),
        )
    }
}

impl<P: IdentityProvider, S: SessionStorage> SessionManager<P, S> {
    /// A zero `refresh_interval` falls back to [`DEFAULT_REFRESH_INTERVAL`].
    #[must_use]
    pub fn new(provider: P, storage: S, refresh_interval: Duration) -> Self {
        let refresh_interval = if refresh_interval.is_zero() {
            DEFAULT_REFRESH_INTERVAL
        } else {
            refresh_interval
        };
        let (updates, _) = watch::channel(SessionSnapshot::anonymous());
        Self {
            inner: Arc::new(Inner {
                provider,
                storage,
                refresh_interval,
                state: Mutex::new(State {
                    snapshot: SessionSnapshot::anonymous(),
                    epoch: 0,
                    logouts_in_flight: 0,
                    refresh_task: None,
                    next_task_id: 0,
                }),
                updates,
            }),
        }
    }

    /// Adopt a freshly issued session.
    ///
    /// `profile` must carry both tokens. The full profile is then fetched and
    /// merged in; if that fetch fails the partial profile stays.
    pub async fn login(&self, profile: UserProfile) {
        self.inner.login(profile).await;
    }

    /// Exchange credentials for tokens, then [`login`](Self::login).
    ///
    /// # Errors
    ///
    /// Returns the exchange failure; the session is untouched in that case.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<(), Error> {
        let profile = self.inner.provider.sign_in(credentials).await?;
        if profile.tokens().is_none() {
            return Err(Error::Api {
                operation: "login",
                status: None,
                detail: "response carried no token pair".into(),
            });
        }
        self.inner.login(profile).await;
        Ok(())
    }

    /// End the session. Always succeeds locally, even when the server cannot
    /// be told.
    ///
    /// A login that completes while the server is being told survives: only
    /// the session that was current when `logout` started is cleared.
    pub async fn logout(&self) {
        self.inner.logout().await;
    }

    /// Restore a persisted session at startup.
    ///
    /// Does nothing when the session is already confirmed, or while a logout
    /// is in progress.
    pub async fn check_auth(&self) {
        self.inner.check_auth().await;
    }

    /// Re-fetch the profile and merge it into the session.
    ///
    /// # Errors
    ///
    /// [`Error::NotLoggedIn`] without a session, or the fetch failure. The
    /// session is kept either way.
    pub async fn refresh_profile(&self) -> Result<(), Error> {
        let (epoch, access_token) = {
            let state = self.inner.lock();
            (
                state.epoch,
                state.snapshot.access_token().map(str::to_owned),
            )
        };
        let access_token = access_token.ok_or(Error::NotLoggedIn)?;
        let fresh = self.inner.provider.user_info(&access_token).await?;
        self.inner.apply_profile(epoch, fresh);
        Ok(())
    }

    /// Start (or restart) the periodic refresh. Any running timer is cancelled
    /// first.
    pub fn start_refresh(&self) {
        let mut state = self.inner.lock();
        self.inner.start_refresh_locked(&mut state);
    }

    pub fn stop_refresh(&self) {
        self.inner.lock().stop_refresh();
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().refresh_task.is_some()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot.clone()
    }

    /// Receive every subsequent state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.inner.lock().snapshot.is_logged_in()
    }

    #[must_use]
    pub fn is_auth_loading(&self) -> bool {
        self.inner.lock().snapshot.is_auth_loading()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().snapshot.phase()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.inner.lock().snapshot.user().cloned()
    }

    /// Bearer token for requests made on the user's behalf.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner.lock().snapshot.access_token().map(str::to_owned)
    }
}

impl<P: IdentityProvider, S: SessionStorage> Inner<P, S> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.updates.send_replace(state.snapshot.clone());
    }

    fn persist(&self, profile: &UserProfile) {
        if let Err(e) = storage::save_session(&self.storage, profile) {
            tracing::warn!(error = %e, "Failed to persist session");
        }
    }

    fn persist_tokens(&self, tokens: &TokenPair) {
        if let Err(e) = storage::save_tokens(&self.storage, tokens) {
            tracing::warn!(error = %e, "Failed to persist refreshed tokens");
        }
    }

    fn stored_refresh_token(&self) -> Option<String> {
        self.storage
            .get(StorageKey::RefreshToken)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to read stored refresh token");
                None
            })
    }

    fn start_refresh_locked(self: &Arc<Self>, state: &mut State) {
        state.stop_refresh();
        state.next_task_id += 1;
        let id = state.next_task_id;
        let handle = tokio::spawn(run_refresh_loop(
            Arc::downgrade(self),
            id,
            Instant::now() + self.refresh_interval,
            self.refresh_interval,
        ));
        state.refresh_task = Some(RefreshTask { id, handle });
        tracing::debug!(task_id = id, interval = ?self.refresh_interval, "Token refresh scheduled");
    }

    async fn login(self: &Arc<Self>, mut profile: UserProfile) {
        let Some(access_token) = profile.access_token.clone() else {
            tracing::warn!("Login ignored: profile carries no access token");
            return;
        };
        if profile.refresh_token.is_none() {
            tracing::warn!("Login ignored: profile carries no refresh token");
            return;
        }
        profile.derive_fields();

        let epoch = {
            let mut state = self.lock();
            state.epoch += 1;
            self.persist(&profile);
            state.snapshot = SessionSnapshot::logged_in(SessionPhase::Confirmed, profile);
            self.start_refresh_locked(&mut state);
            self.publish(&state);
            state.epoch
        };
        tracing::info!("Session started");

        match self.provider.user_info(&access_token).await {
            Ok(fresh) => {
                self.apply_profile(epoch, fresh);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Profile fetch after login failed, keeping partial profile");
            }
        }
    }

    /// Merge a fetched profile into the session started at `epoch`.
    ///
    /// An optimistic session becomes confirmed and gets its refresh timer.
    fn apply_profile(self: &Arc<Self>, epoch: u64, fresh: UserProfile) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            tracing::debug!("Discarding profile for a superseded session");
            return false;
        }
        let Some(user) = state.snapshot.user_mut() else {
            return false;
        };
        user.merge(fresh);
        let user = user.clone();
        self.persist(&user);

        if state.snapshot.phase() == SessionPhase::Optimistic {
            state.snapshot.set_phase(SessionPhase::Confirmed);
            self.start_refresh_locked(&mut state);
        }
        self.publish(&state);
        true
    }

    async fn logout(&self) {
        let (epoch, refresh_token) = {
            let mut state = self.lock();
            state.logouts_in_flight += 1;
            state.epoch += 1;
            state.stop_refresh();
            let refresh_token = self.stored_refresh_token().or_else(|| {
                state
                    .snapshot
                    .user()
                    .and_then(|u| u.refresh_token.clone())
            });
            (state.epoch, refresh_token)
        };

        if let Some(refresh_token) = refresh_token {
            if let Err(e) = self.provider.logout(&refresh_token).await {
                tracing::warn!(error = %e, "Logout notification failed, clearing local session anyway");
            }
        }

        let mut state = self.lock();
        state.logouts_in_flight = state.logouts_in_flight.saturating_sub(1);
        if state.epoch != epoch {
            tracing::info!("Session replaced during logout, keeping the newer one");
            return;
        }
        state.epoch += 1;
        state.stop_refresh();
        if let Err(e) = storage::clear_session(&self.storage) {
            tracing::warn!(error = %e, "Failed to clear persisted session");
        }
        state.snapshot = SessionSnapshot::anonymous();
        self.publish(&state);
        tracing::info!("Session ended");
    }

    async fn check_auth(self: &Arc<Self>) {
        let (epoch, access_token) = {
            let mut state = self.lock();
            if state.logouts_in_flight > 0 {
                state.snapshot.set_auth_loading(false);
                self.publish(&state);
                return;
            }
            if state.snapshot.phase() == SessionPhase::Confirmed {
                tracing::debug!("Session already confirmed, skipping restore");
                return;
            }
            if state.snapshot.is_logged_in() {
                state.snapshot.set_auth_loading(true);
            } else {
                state.snapshot = SessionSnapshot::restoring();
            }
            self.publish(&state);

            let restored = storage::load_session(&self.storage).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored session is unreadable, starting logged out");
                None
            });
            let Some((profile, access_token)) = restored
                .and_then(|p| p.access_token.clone().map(|token| (p, token)))
            else {
                state.snapshot = SessionSnapshot::anonymous();
                self.publish(&state);
                tracing::debug!("No stored session");
                return;
            };

            state.epoch += 1;
            state.stop_refresh();
            // The backfilled tokens must land in the stored profile too.
            self.persist(&profile);
            state.snapshot = SessionSnapshot::logged_in(SessionPhase::Optimistic, profile);
            self.publish(&state);
            (state.epoch, access_token)
        };
        tracing::info!("Session restored from storage");

        match self.provider.user_info(&access_token).await {
            Ok(fresh) => {
                self.apply_profile(epoch, fresh);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Profile fetch during restore failed, keeping restored session");
            }
        }
    }

    async fn refresh_tick(&self, task_id: u64) -> Tick {
        let (epoch, refresh_token) = {
            let state = self.lock();
            (state.epoch, self.stored_refresh_token())
        };
        let Some(refresh_token) = refresh_token else {
            tracing::warn!("No refresh token stored, ending session");
            return self.end_session_from_refresh(task_id, epoch).await;
        };

        match self.provider.refresh_tokens(&refresh_token).await {
            Ok(tokens) => {
                let mut state = self.lock();
                if state.epoch != epoch {
                    tracing::debug!("Discarding token refresh for a superseded session");
                    return Tick::Stop;
                }
                match state.snapshot.user_mut() {
                    Some(user) => {
                        user.apply_tokens(tokens);
                        let user = user.clone();
                        self.persist(&user);
                    }
                    None => self.persist_tokens(&tokens),
                }
                self.publish(&state);
                tracing::debug!(task_id, "Tokens refreshed");
                Tick::Continue
            }
            Err(e) => {
                if e.is_rejection() {
                    tracing::warn!(error = %e, "Refresh token rejected, ending session");
                } else {
                    tracing::error!(error = %e, "Token refresh failed, ending session");
                }
                self.end_session_from_refresh(task_id, epoch).await
            }
        }
    }

    async fn end_session_from_refresh(&self, task_id: u64, epoch: u64) -> Tick {
        {
            let mut state = self.lock();
            if state.epoch != epoch {
                return Tick::Stop;
            }
            // Detach rather than abort: this task is the one running logout.
            if state.refresh_task.as_ref().is_some_and(|t| t.id == task_id) {
                state.refresh_task = None;
            }
        }
        self.logout().await;
        Tick::Stop
    }
}

impl<P, S> Drop for Inner<P, S> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.stop_refresh();
    }
}

async fn run_refresh_loop<P: IdentityProvider, S: SessionStorage>(
    inner: Weak<Inner<P, S>>,
    task_id: u64,
    first_tick: Instant,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.refresh_tick(task_id).await == Tick::Stop {
            break;
        }
    }
}
