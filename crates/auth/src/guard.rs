//! Route gating decisions for protected views.
//!
//! `RouteRequirements::evaluate` is the whole decision: it takes a session
//! snapshot plus the outcome of the (asynchronous) backend permission check
//! and says what the view layer should do.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::authorize::{AuthzError, PermissionMode, authorize, has_permission, has_role};
use crate::{Permission, Role, SessionState};

pub const LOGIN_PATH: &str = "/login";
pub const LANDING_PATH: &str = "/dashboard";

/// What a protected route demands of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequirements {
    pub required_roles: Vec<Role>,
    pub required_permissions: Vec<Permission>,
    pub permission_mode: PermissionMode,
    /// Where unauthenticated visitors are sent when not shown an in-place view.
    pub fallback_path: String,
    /// Render an in-place unauthorized view instead of redirecting.
    pub show_unauthorized: bool,
}

impl Default for RouteRequirements {
    fn default() -> Self {
        Self {
            required_roles: Vec::new(),
            required_permissions: Vec::new(),
            permission_mode: PermissionMode::Any,
            fallback_path: LOGIN_PATH.to_string(),
            show_unauthorized: true,
        }
    }
}

/// Outcome of the backend permission verification for a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCheck {
    Pending,
    Verified(HashMap<String, bool>),
}

impl PermissionCheck {
    /// Nothing to verify.
    pub fn not_required() -> Self {
        Self::Verified(HashMap::new())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnauthorizedKind {
    NotAuthenticated,
    InsufficientRole,
    InsufficientPermissions,
}

/// Content of the in-place unauthorized view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnauthorizedView {
    pub kind: UnauthorizedKind,
    pub required_roles: Vec<Role>,
    pub required_permissions: Vec<Permission>,
    pub user_role: Option<Role>,
}

impl UnauthorizedView {
    pub fn title(&self) -> &'static str {
        match self.kind {
            UnauthorizedKind::NotAuthenticated => "Acceso Restringido",
            UnauthorizedKind::InsufficientRole => "Permisos Insuficientes",
            UnauthorizedKind::InsufficientPermissions => "Sin Autorización",
        }
    }

    pub fn message(&self) -> String {
        match self.kind {
            UnauthorizedKind::NotAuthenticated => "Necesitas iniciar sesión para acceder a esta página.".to_string(),
            UnauthorizedKind::InsufficientRole => match self.user_role {
                Some(role) => format!("Tu rol actual ({}) no tiene acceso a esta sección.", role.label()),
                None => "Tu rol actual no tiene acceso a esta sección.".to_string(),
            },
            UnauthorizedKind::InsufficientPermissions => {
                "No tienes los permisos necesarios para acceder a esta página.".to_string()
            }
        }
    }

    pub fn details(&self) -> Option<String> {
        match self.kind {
            UnauthorizedKind::NotAuthenticated => None,
            UnauthorizedKind::InsufficientRole if !self.required_roles.is_empty() => {
                let roles: Vec<&str> = self.required_roles.iter().map(|r| r.as_str()).collect();
                Some(format!("Roles requeridos: {}", roles.join(", ")))
            }
            UnauthorizedKind::InsufficientPermissions if !self.required_permissions.is_empty() => {
                let perms: Vec<&str> = self.required_permissions.iter().map(|p| p.as_str()).collect();
                Some(format!("Permisos requeridos: {}", perms.join(", ")))
            }
            _ => None,
        }
    }

    pub fn action_label(&self) -> &'static str {
        match self.kind {
            UnauthorizedKind::NotAuthenticated => "Ir al Login",
            _ => "Volver al Dashboard",
        }
    }

    pub fn action_path(&self) -> &'static str {
        match self.kind {
            UnauthorizedKind::NotAuthenticated => LOGIN_PATH,
            _ => LANDING_PATH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session or permission verification still settling; do not redirect.
    Loading,
    Unauthorized(UnauthorizedView),
    Redirect { to: String },
    /// Render the protected content.
    Render,
}

impl GuardDecision {
    pub fn is_render(&self) -> bool {
        matches!(self, GuardDecision::Render)
    }
}

impl RouteRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.required_roles = roles.into_iter().collect();
        self
    }

    pub fn permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.required_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn require_all(mut self, require_all: bool) -> Self {
        self.permission_mode = PermissionMode::from_require_all(require_all);
        self
    }

    pub fn fallback_path(mut self, path: impl Into<String>) -> Self {
        self.fallback_path = path.into();
        self
    }

    pub fn show_unauthorized(mut self, show: bool) -> Self {
        self.show_unauthorized = show;
        self
    }

    pub fn admin_only() -> Self {
        Self::new().roles([Role::Administrador])
    }

    pub fn admin_or_accountant() -> Self {
        Self::new().roles([Role::Administrador, Role::Contador])
    }

    /// Every role that runs the business; excludes clients.
    pub fn operational() -> Self {
        Self::new().roles(Role::OPERATIONAL)
    }

    pub fn permission_route<I, P>(permissions: I, require_all: bool) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        Self::new().permissions(permissions).require_all(require_all)
    }

    pub fn needs_permission_check(&self) -> bool {
        !self.required_permissions.is_empty()
    }

    pub fn evaluate(&self, session: &SessionState, check: &PermissionCheck) -> GuardDecision {
        if session.is_loading || (self.needs_permission_check() && check.is_pending()) {
            return GuardDecision::Loading;
        }

        let user = match (session.is_authenticated, session.user()) {
            (true, Some(user)) => user,
            _ => {
                return self.deny(UnauthorizedKind::NotAuthenticated, None, &self.fallback_path);
            }
        };

        if !self.required_roles.is_empty() && !has_role(Some(user), &self.required_roles) {
            return self.deny(UnauthorizedKind::InsufficientRole, Some(user.role), LANDING_PATH);
        }

        if self.needs_permission_check() {
            let granted = match check {
                PermissionCheck::Verified(results) => {
                    self.permission_mode.evaluate(&self.required_permissions, results)
                }
                PermissionCheck::Pending => false,
            };
            if !granted {
                return self.deny(
                    UnauthorizedKind::InsufficientPermissions,
                    Some(user.role),
                    LANDING_PATH,
                );
            }
        }

        GuardDecision::Render
    }

    /// Synchronous access check against the local grants only (no backend),
    /// reporting why access was refused.
    pub fn check_access(&self, session: &SessionState) -> Result<(), AuthzError> {
        let Some(user) = session.user().filter(|_| session.is_authenticated) else {
            return Err(AuthzError::NotAuthenticated);
        };

        if !self.required_roles.is_empty() && !has_role(Some(user), &self.required_roles) {
            return Err(AuthzError::InsufficientRole(user.role));
        }

        match self.permission_mode {
            PermissionMode::All => self
                .required_permissions
                .iter()
                .try_for_each(|p| authorize(Some(user), p)),
            PermissionMode::Any if self.required_permissions.is_empty() => Ok(()),
            PermissionMode::Any => {
                if self.required_permissions.iter().any(|p| has_permission(Some(user), p.as_str())) {
                    Ok(())
                } else {
                    let codes: Vec<&str> = self.required_permissions.iter().map(|p| p.as_str()).collect();
                    Err(AuthzError::Forbidden(codes.join(", ")))
                }
            }
        }
    }

    pub fn route_access(&self, session: &SessionState) -> bool {
        self.check_access(session).is_ok()
    }

    fn deny(&self, kind: UnauthorizedKind, user_role: Option<Role>, redirect_to: &str) -> GuardDecision {
        if self.show_unauthorized {
            GuardDecision::Unauthorized(UnauthorizedView {
                kind,
                required_roles: self.required_roles.clone(),
                required_permissions: self.required_permissions.clone(),
                user_role,
            })
        } else {
            GuardDecision::Redirect {
                to: redirect_to.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::User;

    fn signed_in(user: User) -> SessionState {
        SessionState {
            current_user: Some(user),
            is_loading: false,
            is_authenticated: true,
            last_error: None,
        }
    }

    fn signed_out() -> SessionState {
        SessionState {
            is_loading: false,
            ..Default::default()
        }
    }

    fn vendedor() -> User {
        User::new(5, "caja1", Role::Vendedor).with_permissions(["punto_venta.*", "core.view_cliente"])
    }

    fn verified(pairs: &[(&str, bool)]) -> PermissionCheck {
        PermissionCheck::Verified(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn loading_session_suspends() {
        let reqs = RouteRequirements::admin_only();
        assert_eq!(
            reqs.evaluate(&SessionState::default(), &PermissionCheck::not_required()),
            GuardDecision::Loading
        );
    }

    #[test]
    fn pending_permission_check_suspends() {
        let reqs = RouteRequirements::permission_route(["facturacion.add_factura"], false);
        assert_eq!(
            reqs.evaluate(&signed_in(vendedor()), &PermissionCheck::Pending),
            GuardDecision::Loading
        );
    }

    #[test]
    fn unauthenticated_view_or_fallback_redirect() {
        let reqs = RouteRequirements::new();
        let GuardDecision::Unauthorized(view) = reqs.evaluate(&signed_out(), &PermissionCheck::not_required())
        else {
            panic!("expected unauthorized view");
        };
        assert_eq!(view.kind, UnauthorizedKind::NotAuthenticated);
        assert_eq!(view.action_path(), LOGIN_PATH);

        let reqs = RouteRequirements::new().show_unauthorized(false).fallback_path("/ingresar");
        assert_eq!(
            reqs.evaluate(&signed_out(), &PermissionCheck::not_required()),
            GuardDecision::Redirect { to: "/ingresar".into() }
        );
    }

    #[test]
    fn vendedor_on_admin_route_gets_insufficient_role() {
        let reqs = RouteRequirements::admin_only();
        let decision = reqs.evaluate(&signed_in(vendedor()), &PermissionCheck::not_required());

        let GuardDecision::Unauthorized(view) = decision else {
            panic!("expected insufficient role view, got {decision:?}");
        };
        assert_eq!(view.kind, UnauthorizedKind::InsufficientRole);
        assert_eq!(view.user_role, Some(Role::Vendedor));
        assert_eq!(view.details().as_deref(), Some("Roles requeridos: administrador"));
        assert!(view.message().contains("Vendedor"));

        let redirect = reqs.show_unauthorized(false);
        assert_eq!(
            redirect.evaluate(&signed_in(vendedor()), &PermissionCheck::not_required()),
            GuardDecision::Redirect { to: LANDING_PATH.into() }
        );
    }

    #[test]
    fn any_versus_all_permissions() {
        let session = signed_in(vendedor());
        let check = verified(&[("a.b", true), ("c.d", false)]);

        let any = RouteRequirements::permission_route(["a.b", "c.d"], false);
        assert!(any.evaluate(&session, &check).is_render());

        let all = RouteRequirements::permission_route(["a.b", "c.d"], true);
        let GuardDecision::Unauthorized(view) = all.evaluate(&session, &check) else {
            panic!("expected insufficient permissions");
        };
        assert_eq!(view.kind, UnauthorizedKind::InsufficientPermissions);
        assert_eq!(view.details().as_deref(), Some("Permisos requeridos: a.b, c.d"));
    }

    #[test]
    fn missing_results_deny() {
        let reqs = RouteRequirements::permission_route(["a.b"], false);
        let decision = reqs.evaluate(&signed_in(vendedor()), &PermissionCheck::not_required());
        assert!(matches!(decision, GuardDecision::Unauthorized(_)));
    }

    #[test]
    fn operational_route_rejects_clients() {
        let cliente = User::new(8, "cli", Role::Cliente);
        let reqs = RouteRequirements::operational();
        assert!(!reqs.evaluate(&signed_in(cliente), &PermissionCheck::not_required()).is_render());
        assert!(reqs.evaluate(&signed_in(vendedor()), &PermissionCheck::not_required()).is_render());
    }

    #[test]
    fn route_access_uses_local_grants() {
        let session = signed_in(vendedor());
        assert!(RouteRequirements::permission_route(["punto_venta.cerrar_caja"], true).route_access(&session));
        assert!(!RouteRequirements::permission_route(["punto_venta.x", "contabilidad.x"], true).route_access(&session));
        assert!(RouteRequirements::permission_route(["punto_venta.x", "contabilidad.x"], false).route_access(&session));
        assert!(!RouteRequirements::admin_or_accountant().route_access(&session));
        assert!(!RouteRequirements::new().route_access(&signed_out()));
    }

    #[test]
    fn check_access_reports_the_denial() {
        let session = signed_in(vendedor());
        assert_eq!(RouteRequirements::new().check_access(&signed_out()), Err(AuthzError::NotAuthenticated));
        assert_eq!(
            RouteRequirements::admin_only().check_access(&session),
            Err(AuthzError::InsufficientRole(Role::Vendedor))
        );
        assert_eq!(
            RouteRequirements::permission_route(["punto_venta.abrir_caja", "contabilidad.cerrar"], true)
                .check_access(&session),
            Err(AuthzError::Forbidden("contabilidad.cerrar".into()))
        );
        assert_eq!(
            RouteRequirements::permission_route(["ventas.x", "contabilidad.x"], false).check_access(&session),
            Err(AuthzError::Forbidden("ventas.x, contabilidad.x".into()))
        );
        assert_eq!(RouteRequirements::operational().check_access(&session), Ok(()));
    }
}
