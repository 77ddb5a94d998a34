//! Session controller: the context object views and route guards consult.
//!
//! Every state change goes through `felicita_auth::reduce`; observers get the
//! new snapshot through a `watch` channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use felicita_auth::{Permission, ProfileUpdate, Role, SessionAction, SessionState, User, reduce};

use crate::auth_service::{
    ActiveSession, AuthService, Credentials, LoginResponse, MessageResponse, PasswordChange, Registration,
    RegistrationResponse,
};
use crate::error::ClientResult;
use crate::interceptor::ApiClient;
use crate::notify::Notice;

#[derive(Debug)]
pub struct SessionController {
    auth: AuthService,
    state: watch::Sender<SessionState>,
}

impl SessionController {
    /// New controller in the loading state; call `initialize` once mounted.
    pub fn new(client: Arc<ApiClient>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            auth: AuthService::new(client),
            state,
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    /// Current snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().current_user.clone()
    }

    fn dispatch(&self, action: SessionAction) {
        tracing::trace!(?action, "session action");
        self.state.send_modify(|state| {
            let current = std::mem::take(state);
            *state = reduce(current, action);
        });
    }

    fn notify(&self, notice: Notice) {
        self.auth.client().notifier().notify(notice);
    }

    fn clear_tokens(&self) {
        if let Err(err) = self.auth.client().tokens().clear() {
            tracing::error!(error = %err, "failed to clear tokens");
        }
    }

    /// Restore the session from stored tokens.
    ///
    /// Only a stored, unexpired access token leads to a profile fetch; any
    /// other situation (or a failed fetch) clears the tokens and ends signed out.
    pub async fn initialize(&self) {
        self.dispatch(SessionAction::SetLoading(true));

        if self.auth.client().tokens().valid_access_token().is_none() {
            tracing::debug!("no live access token at startup");
            self.clear_tokens();
            self.dispatch(SessionAction::SetUser(None));
            return;
        }

        match self.auth.current_user().await {
            Ok(user) => {
                tracing::info!(username = %user.username, "session restored");
                self.dispatch(SessionAction::SetUser(Some(user)));
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not restore session");
                self.clear_tokens();
                self.dispatch(SessionAction::SetUser(None));
            }
        }
    }

    /// Sign in. On failure the session moves to the error state, stored
    /// tokens are left alone and the error is returned to the caller.
    pub async fn login(&self, credentials: &Credentials) -> ClientResult<LoginResponse> {
        self.dispatch(SessionAction::SetError(None));
        self.dispatch(SessionAction::SetLoading(true));

        match self.auth.login(credentials).await {
            Ok(response) => {
                self.notify(Notice::success(format!("¡Bienvenido, {}!", response.user.display_name())));
                self.dispatch(SessionAction::LoginSuccess(response.user.clone()));
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(username = %credentials.username, error = %err, "login failed");
                self.notify(Notice::error(err.message()));
                self.dispatch(SessionAction::SetError(Some(err.message().to_string())));
                Err(err)
            }
        }
    }

    /// Sign out. Never fails: the local session is reset regardless of the
    /// server's answer.
    pub async fn logout(&self) {
        self.dispatch(SessionAction::SetLoading(true));
        self.auth.logout().await;
        self.dispatch(SessionAction::Logout);
        self.notify(Notice::success("Sesión cerrada correctamente"));
    }

    /// Re-fetch the profile. A failure ends the session.
    pub async fn refresh_user(&self) -> ClientResult<User> {
        match self.auth.current_user().await {
            Ok(user) => {
                self.dispatch(SessionAction::SetUser(Some(user.clone())));
                Ok(user)
            }
            Err(err) => {
                tracing::warn!(error = %err, "profile refresh failed; signing out");
                self.clear_tokens();
                self.dispatch(SessionAction::Logout);
                Err(err)
            }
        }
    }

    /// Apply a profile change and merge the backend's answer into the
    /// signed-in user. Returns the merged user, or `None` if the session
    /// ended while the request was in flight.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<Option<User>> {
        match self.auth.update_profile(update).await {
            Ok(fields) => {
                self.dispatch(SessionAction::UpdateUser(fields));
                self.notify(Notice::success("Perfil actualizado correctamente"));
                Ok(self.current_user())
            }
            Err(err) => {
                self.notify(Notice::error(err.message()));
                Err(err)
            }
        }
    }

    pub async fn change_password(&self, change: &PasswordChange) -> ClientResult<()> {
        match self.auth.change_password(change).await {
            Ok(_) => {
                self.dispatch(SessionAction::Logout);
                self.notify(Notice::success("Contraseña cambiada correctamente. Inicie sesión nuevamente."));
                Ok(())
            }
            Err(err) => {
                self.notify(Notice::error(err.message()));
                Err(err)
            }
        }
    }

    pub async fn register(&self, registration: &Registration) -> ClientResult<RegistrationResponse> {
        self.auth.register(registration).await
    }

    pub async fn active_sessions(&self) -> ClientResult<Vec<ActiveSession>> {
        self.auth.active_sessions().await.inspect_err(|err| {
            self.notify(Notice::error(err.message()));
        })
    }

    pub async fn close_session(&self, token_jti: &str) -> ClientResult<MessageResponse> {
        match self.auth.close_session(token_jti).await {
            Ok(response) => {
                self.notify(Notice::success("Sesión cerrada correctamente"));
                Ok(response)
            }
            Err(err) => {
                self.notify(Notice::error(err.message()));
                Err(err)
            }
        }
    }

    pub async fn close_all_sessions(&self) -> ClientResult<()> {
        match self.auth.close_all_sessions().await {
            Ok(_) => {
                self.dispatch(SessionAction::Logout);
                self.notify(Notice::success("Todas las sesiones han sido cerradas"));
                Ok(())
            }
            Err(err) => {
                self.notify(Notice::error(err.message()));
                Err(err)
            }
        }
    }

    pub fn has_permission(&self, code: &str) -> bool {
        felicita_auth::has_permission(self.state.borrow().user(), code)
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        felicita_auth::has_role(self.state.borrow().user(), roles)
    }

    /// Backend verification of `codes`.
    ///
    /// Fails closed: when verification cannot be completed every code maps to
    /// `false`; codes the backend left out are also `false`.
    pub async fn check_permissions(&self, codes: &[Permission]) -> HashMap<String, bool> {
        let verified = match self.auth.verify_permissions(codes).await {
            Ok(verification) => verification.permissions,
            Err(err) => {
                tracing::warn!(error = %err, "permission verification failed; denying");
                HashMap::new()
            }
        };

        codes
            .iter()
            .map(|code| {
                let granted = verified.get(code.as_str()).copied().unwrap_or(false);
                (code.as_str().to_string(), granted)
            })
            .collect()
    }
}
