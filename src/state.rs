use crate::types::UserProfile;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Nobody is logged in.
    #[default]
    Anonymous,
    /// Startup restore is reading persisted state.
    Restoring,
    /// Restored from storage; the server has not confirmed the profile yet.
    Optimistic,
    /// Fresh login, or a restore the server confirmed.
    Confirmed,
}

impl SessionPhase {
    #[must_use]
    pub fn has_user(self) -> bool {
        matches!(self, Self::Optimistic | Self::Confirmed)
    }
}

/// The session state consumers observe.
///
/// Constructed only by the session manager, which keeps `user` present
/// exactly when the phase carries a user.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    phase: SessionPhase,
    user: Option<UserProfile>,
    is_auth_loading: bool,
}

impl SessionSnapshot {
    pub(crate) fn anonymous() -> Self {
        Self::default()
    }

    pub(crate) fn restoring() -> Self {
        Self {
            phase: SessionPhase::Restoring,
            user: None,
            is_auth_loading: true,
        }
    }

    pub(crate) fn logged_in(phase: SessionPhase, user: UserProfile) -> Self {
        debug_assert!(phase.has_user());
        Self {
            phase,
            user: Some(user),
            is_auth_loading: false,
        }
    }

    pub(crate) fn set_phase(&mut self, phase: SessionPhase) {
        debug_assert_eq!(phase.has_user(), self.user.is_some());
        self.phase = phase;
    }

    pub(crate) fn set_auth_loading(&mut self, loading: bool) {
        self.is_auth_loading = loading;
    }

    pub(crate) fn user_mut(&mut self) -> Option<&mut UserProfile> {
        self.user.as_mut()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn is_auth_loading(&self) -> bool {
        self.is_auth_loading
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.user.as_ref()?.access_token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_has_no_user() {
        let snapshot = SessionSnapshot::anonymous();
        assert_eq!(snapshot.phase(), SessionPhase::Anonymous);
        assert!(!snapshot.is_logged_in());
        assert!(!snapshot.is_auth_loading());
        assert_eq!(snapshot.access_token(), None);
    }

    #[test]
    fn restoring_is_loading_without_user() {
        let snapshot = SessionSnapshot::restoring();
        assert!(snapshot.is_auth_loading());
        assert!(!snapshot.is_logged_in());
    }

    #[test]
    fn logged_in_exposes_user_and_token() {
        let mut user = UserProfile::default().with_email("a@x.com");
        user.access_token = Some("T1".into());

        let mut snapshot = SessionSnapshot::logged_in(SessionPhase::Optimistic, user);
        assert!(snapshot.is_logged_in());
        assert_eq!(snapshot.access_token(), Some("T1"));

        snapshot.set_phase(SessionPhase::Confirmed);
        assert_eq!(snapshot.phase(), SessionPhase::Confirmed);
    }

    #[test]
    fn phases_that_carry_a_user() {
        assert!(!SessionPhase::Anonymous.has_user());
        assert!(!SessionPhase::Restoring.has_user());
        assert!(SessionPhase::Optimistic.has_user());
        assert!(SessionPhase::Confirmed.has_user());
    }
}
