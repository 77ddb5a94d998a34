//! Route guard: binds `RouteRequirements` to a live session.

use felicita_auth::{GuardDecision, PermissionCheck, RouteRequirements, SessionState, UserId};

use crate::session::SessionController;

/// One protected route instance.
///
/// Holds the backend permission verification for the user it was run for;
/// a different user (or none) makes it stale.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    requirements: RouteRequirements,
    check: PermissionCheck,
    checked_for: Option<UserId>,
}

impl RouteGuard {
    pub fn new(requirements: RouteRequirements) -> Self {
        let check = if requirements.needs_permission_check() {
            PermissionCheck::Pending
        } else {
            PermissionCheck::not_required()
        };
        Self {
            requirements,
            check,
            checked_for: None,
        }
    }

    pub fn requirements(&self) -> &RouteRequirements {
        &self.requirements
    }

    pub fn permission_check(&self) -> &PermissionCheck {
        &self.check
    }

    /// Decision for a snapshot.
    ///
    /// A verification only counts for the user it was run for; until the
    /// signed-in user has been verified the route stays loading.
    pub fn decision(&self, session: &SessionState) -> GuardDecision {
        if !self.requirements.needs_permission_check() {
            return self.requirements.evaluate(session, &self.check);
        }

        let current = match (session.is_authenticated, session.user()) {
            (true, Some(user)) => user.id,
            // Not signed in: nothing to verify, the requirements deny on their own.
            _ => return self.requirements.evaluate(session, &PermissionCheck::not_required()),
        };

        if self.checked_for == Some(current) {
            self.requirements.evaluate(session, &self.check)
        } else {
            self.requirements.evaluate(session, &PermissionCheck::Pending)
        }
    }

    /// Forget the verification so the next `verify` asks the backend again.
    pub fn invalidate(&mut self) {
        if self.requirements.needs_permission_check() {
            self.check = PermissionCheck::Pending;
            self.checked_for = None;
        }
    }

    /// Run the backend permission verification for the current user.
    ///
    /// Nothing is asked while signed out; the guard goes back to pending so
    /// the next user is verified before anything renders.
    pub async fn verify(&mut self, controller: &SessionController) {
        if !self.requirements.needs_permission_check() {
            return;
        }

        let state = controller.state();
        let user_id = match (state.is_authenticated, state.user()) {
            (true, Some(user)) => user.id,
            _ => {
                self.check = PermissionCheck::Pending;
                self.checked_for = None;
                return;
            }
        };

        if self.checked_for == Some(user_id) && !self.check.is_pending() {
            return;
        }
        if self.checked_for.is_some_and(|id| id != user_id) {
            tracing::debug!(user = %user_id, "signed-in user changed; re-verifying route permissions");
        }
        self.check = PermissionCheck::Pending;
        self.checked_for = None;

        let results = controller
            .check_permissions(&self.requirements.required_permissions)
            .await;
        tracing::debug!(user = %user_id, ?results, "route permissions verified");
        self.check = PermissionCheck::Verified(results);
        self.checked_for = Some(user_id);
    }

    /// Wait for the session to settle, verify, and decide.
    pub async fn resolve(&mut self, controller: &SessionController) -> GuardDecision {
        let mut rx = controller.subscribe();
        if rx.wait_for(|state| !state.is_loading).await.is_err() {
            tracing::warn!("session controller dropped while resolving a route");
        }

        self.verify(controller).await;
        self.decision(&controller.state())
    }
}
