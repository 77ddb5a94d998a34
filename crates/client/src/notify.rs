//! User-facing side effects of the request pipeline: transient notices and
//! forced navigation.

use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient toast-style notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    /// Notice for a failed status, if that status is one users are told about.
    /// 401 is handled by the refresh path and never produces a notice.
    pub fn for_status(status: u16) -> Option<Self> {
        let message = match status {
            403 => "No tienes permisos para realizar esta acción",
            404 => "Recurso no encontrado",
            422 => "Datos inválidos",
            429 => "Demasiadas peticiones. Intenta más tarde.",
            s if s >= 500 => "Error interno del servidor",
            _ => return None,
        };
        Some(Self::error(message))
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Forces the application to a route (e.g. back to login).
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Headless notifier: notices become log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => tracing::info!(message = %notice.message, "notice"),
            NoticeLevel::Error => tracing::warn!(message = %notice.message, "notice"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, path: &str) {
        tracing::info!(%path, "navigation requested");
    }
}
