//! `felicita-client`
//!
//! **Responsibility:** the session layer of the FELICITA front end.
//!
//! This crate provides:
//! - Token persistence (`TokenStore`)
//! - The request pipeline with bearer attachment and serialized refresh-on-401
//! - The backend auth endpoints (`AuthService`)
//! - The session controller backing route guards
//!
//! Authorization *decisions* live in `felicita-auth`; this crate does the IO.

pub mod auth_service;
pub mod config;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod notify;
pub mod session;
pub mod token_store;
pub mod transport;

pub use auth_service::{ActiveSession, AuthService, Credentials, LoginResponse, PasswordChange, Registration};
pub use config::{ClientConfig, Endpoints};
pub use error::{ClientError, ClientResult};
pub use guard::RouteGuard;
pub use interceptor::ApiClient;
pub use notify::{Navigator, Notice, NoticeLevel, Notifier, TracingNavigator, TracingNotifier};
pub use session::SessionController;
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore, TokenStoreError};
pub use transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, Transport, TransportError};
