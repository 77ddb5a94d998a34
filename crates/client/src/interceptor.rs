//! Request pipeline: bearer attachment, refresh-on-401, status notices.
//!
//! # Refresh serialization
//!
//! At most one refresh exchange is in flight. The first request to observe a
//! 401 becomes the *leader* and performs the exchange; every request that
//! hits a 401 while the exchange is running parks a oneshot sender in the
//! pending queue. When the exchange settles the queue is taken in one step
//! and every parked caller receives the same outcome.
//!
//! Each request is retried at most once (`MAX_RETRIES`); the attempt counter
//! travels with the request through the loop in `execute`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, extract_message};
use crate::notify::{Navigator, Notice, Notifier, TracingNavigator, TracingNotifier};
use crate::token_store::{TokenPair, TokenStore};
use crate::transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, Transport};

const MAX_RETRIES: u32 = 1;

type RefreshOutcome = Result<String, ClientError>;

/// Why a caller wants a new access token.
#[derive(Debug, Clone, Copy)]
enum Trigger<'a> {
    /// The backend rejected a request sent with this bearer.
    Rejected(Option<&'a str>),
    /// Caller explicitly asked for a refresh.
    Explicit,
}

enum Ticket {
    /// Token already rotated since the rejected request was sent.
    Fresh(String),
    Leader,
    Follower(oneshot::Receiver<RefreshOutcome>),
}

/// Pending-refresh queue. `Some` while an exchange is in flight.
#[derive(Default)]
struct RefreshCoordinator {
    pending: Mutex<Option<Vec<oneshot::Sender<RefreshOutcome>>>>,
}

impl RefreshCoordinator {
    fn join(&self, tokens: &dyn TokenStore, trigger: Trigger<'_>) -> Ticket {
        let mut pending = self.pending.lock();

        if let Some(queue) = pending.as_mut() {
            let (tx, rx) = oneshot::channel();
            queue.push(tx);
            return Ticket::Follower(rx);
        }

        // The leader persists new tokens before settling, so a rotated token
        // is visible here once the queue is gone.
        if let Trigger::Rejected(sent_with) = trigger {
            if let Some(current) = tokens.valid_access_token() {
                if sent_with != Some(current.as_str()) {
                    return Ticket::Fresh(current);
                }
            }
        }

        *pending = Some(Vec::new());
        Ticket::Leader
    }

    /// Drain the queue atomically; returns how many callers were waiting.
    fn settle(&self, outcome: &RefreshOutcome) -> usize {
        let queue = self.pending.lock().take().unwrap_or_default();
        let waiting = queue.len();
        for tx in queue {
            let _ = tx.send(outcome.clone());
        }
        waiting
    }

    fn in_flight(&self) -> bool {
        self.pending.lock().is_some()
    }
}

/// Releases followers if the leader's future is dropped mid-exchange.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl LeaderGuard<'_> {
    fn settle(mut self, outcome: &RefreshOutcome) -> usize {
        self.settled = true;
        self.coordinator.settle(outcome)
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .settle(&Err(ClientError::SessionExpired("token refresh was abandoned".into())));
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// HTTP client for the FELICITA backend.
pub struct ApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    refresh: RefreshCoordinator,
}

impl core::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("refresh_in_flight", &self.refresh.in_flight())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            config,
            transport,
            tokens,
            notifier: Arc::new(TracingNotifier),
            navigator: Arc::new(TracingNavigator),
            refresh: RefreshCoordinator::default(),
        }
    }

    /// Client over the real `reqwest` transport.
    pub fn from_config(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> ClientResult<Self> {
        let transport = ReqwestTransport::new(config.clone())?;
        Ok(Self::new(config, Arc::new(transport), tokens))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.in_flight()
    }

    /// Send a request through the full pipeline.
    pub async fn execute(&self, mut request: ApiRequest) -> ClientResult<ApiResponse> {
        // Request phase: only a live token is worth sending.
        request.bearer = self.tokens.valid_access_token();

        let mut attempt: u32 = 0;
        loop {
            let span = tracing::debug_span!(
                "api_request",
                request_id = %request.request_id,
                method = %request.method,
                path = %request.path,
                attempt,
            );

            let response = match self.transport.send(&request).instrument(span.clone()).await {
                Ok(response) => response,
                Err(err) => {
                    span.in_scope(|| tracing::warn!(error = %err, "request failed in transport"));
                    return Err(err.into());
                }
            };
            span.in_scope(|| tracing::debug!(status = response.status, "response"));

            if response.is_success() {
                return Ok(response);
            }

            if response.status == 401
                && attempt < MAX_RETRIES
                && !self.config.endpoints.skips_refresh(&request.path)
            {
                let token = self
                    .obtain_access_token(Trigger::Rejected(request.bearer.as_deref()))
                    .instrument(span)
                    .await?;
                request.bearer = Some(token);
                attempt += 1;
                continue;
            }

            if let Some(notice) = Notice::for_status(response.status) {
                self.notifier.notify(notice);
            }
            return Err(ClientError::from_response(response.status, &response.body));
        }
    }

    /// Force a refresh exchange (joining one already in flight).
    pub async fn refresh_access_token(&self) -> ClientResult<String> {
        self.obtain_access_token(Trigger::Explicit).await
    }

    async fn obtain_access_token(&self, trigger: Trigger<'_>) -> RefreshOutcome {
        match self.refresh.join(self.tokens.as_ref(), trigger) {
            Ticket::Fresh(token) => {
                tracing::debug!("access token rotated meanwhile; retrying without refresh");
                Ok(token)
            }
            Ticket::Follower(rx) => {
                tracing::debug!("refresh in flight; waiting for shared outcome");
                rx.await.unwrap_or_else(|_| {
                    Err(ClientError::SessionExpired("token refresh was abandoned".into()))
                })
            }
            Ticket::Leader => {
                let guard = LeaderGuard {
                    coordinator: &self.refresh,
                    settled: false,
                };

                let outcome = self.exchange_refresh_token().await;
                if let Err(err) = &outcome {
                    tracing::warn!(error = %err, "token refresh failed; resetting session");
                    self.reset_session();
                }

                let waiting = guard.settle(&outcome);
                tracing::info!(waiting, ok = outcome.is_ok(), "token refresh settled");
                outcome
            }
        }
    }

    /// Exchange the stored refresh token for a new pair. Any failure is a
    /// `SessionExpired`.
    async fn exchange_refresh_token(&self) -> RefreshOutcome {
        let Some(refresh) = self.tokens.valid_refresh_token() else {
            return Err(ClientError::SessionExpired("no valid refresh token".into()));
        };

        let request = ApiRequest::post(self.config.endpoints.refresh.clone(), json!({ "refresh": refresh }));
        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| ClientError::SessionExpired(format!("refresh request failed: {e}")))?;

        if !response.is_success() {
            let message = extract_message(&response.body)
                .unwrap_or_else(|| format!("refresh rejected with status {}", response.status));
            return Err(ClientError::SessionExpired(message));
        }

        let body: RefreshResponse = serde_json::from_value(response.body)
            .map_err(|e| ClientError::SessionExpired(format!("malformed refresh response: {e}")))?;

        let pair = TokenPair {
            access: body.access,
            refresh: body.refresh.unwrap_or(refresh),
        };
        self.tokens
            .set_tokens(&pair)
            .map_err(|e| ClientError::SessionExpired(format!("could not persist tokens: {e}")))?;

        Ok(pair.access)
    }

    /// Hard reset: forget tokens and send the user to login.
    fn reset_session(&self) {
        if let Err(err) = self.tokens.clear() {
            tracing::error!(error = %err, "failed to clear tokens");
        }
        self.navigator.navigate(&self.config.login_path);
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.execute(ApiRequest::get(path)).await?;
        decode(response)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::Post, path, body).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::Patch, path, body).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        let response = self.execute(ApiRequest::new(method, path).with_body(body)).await?;
        decode(response)
    }
}

fn decode<T: DeserializeOwned>(response: ApiResponse) -> ClientResult<T> {
    serde_json::from_value(response.body).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::tests::Recorder;
    use crate::token_store::MemoryTokenStore;
    use crate::token_store::tests::jwt_expiring_in;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend fake: accepts only `valid_access`; refresh mints `new_access`.
    struct FakeBackend {
        valid_access: Mutex<String>,
        new_access: String,
        refresh_status: u16,
        rotate_on_refresh: bool,
        refresh_calls: AtomicUsize,
        requests: Mutex<Vec<ApiRequest>>,
        refresh_delay: std::time::Duration,
    }

    impl FakeBackend {
        fn new(valid_access: String, new_access: String) -> Self {
            Self {
                valid_access: Mutex::new(valid_access),
                new_access,
                refresh_status: 200,
                rotate_on_refresh: true,
                refresh_calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                refresh_delay: std::time::Duration::from_millis(50),
            }
        }
    }

    #[async_trait]
    impl Transport for FakeBackend {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
            self.requests.lock().push(request.clone());

            match request.path.as_str() {
                "/auth/token/refresh" => {
                    self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(self.refresh_delay).await;
                    if self.refresh_status != 200 {
                        return Ok(ApiResponse::new(self.refresh_status, json!({ "detail": "Token is invalid" })));
                    }
                    if self.rotate_on_refresh {
                        *self.valid_access.lock() = self.new_access.clone();
                    }
                    Ok(ApiResponse::new(200, json!({ "access": self.new_access })))
                }
                "/auth/login" => Ok(ApiResponse::new(401, json!({ "detail": "bad credentials" }))),
                "/missing" => Ok(ApiResponse::new(404, Value::Null)),
                _ => {
                    let valid = self.valid_access.lock().clone();
                    if request.bearer.as_deref() == Some(valid.as_str()) {
                        Ok(ApiResponse::new(200, json!({ "ok": true })))
                    } else {
                        Ok(ApiResponse::new(401, json!({ "detail": "expired" })))
                    }
                }
            }
        }
    }

    struct Harness {
        backend: Arc<FakeBackend>,
        tokens: Arc<MemoryTokenStore>,
        recorder: Arc<Recorder>,
        client: Arc<ApiClient>,
    }

    fn harness(backend: FakeBackend, tokens: TokenPair) -> Harness {
        let backend = Arc::new(backend);
        let tokens = Arc::new(MemoryTokenStore::with_tokens(&tokens));
        let recorder = Arc::new(Recorder::default());
        let client = ApiClient::new(ClientConfig::default(), backend.clone(), tokens.clone())
            .with_notifier(recorder.clone())
            .with_navigator(recorder.clone());
        Harness {
            backend,
            tokens,
            recorder,
            client: Arc::new(client),
        }
    }

    fn stale_pair() -> (String, String, TokenPair) {
        // Locally unexpired but revoked server-side.
        let stale = jwt_expiring_in(Duration::minutes(5));
        let fresh = jwt_expiring_in(Duration::minutes(30));
        let pair = TokenPair {
            access: stale.clone(),
            refresh: jwt_expiring_in(Duration::days(1)),
        };
        (stale, fresh, pair)
    }

    #[tokio::test]
    async fn attaches_valid_bearer() {
        let access = jwt_expiring_in(Duration::minutes(5));
        let h = harness(
            FakeBackend::new(access.clone(), "unused".into()),
            TokenPair {
                access: access.clone(),
                refresh: "r".into(),
            },
        );

        let resp = h.client.execute(ApiRequest::get("/users/profile")).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(h.backend.requests.lock()[0].bearer.as_deref(), Some(access.as_str()));
    }

    #[tokio::test]
    async fn expired_access_token_is_not_sent() {
        let h = harness(
            FakeBackend::new("x".into(), "y".into()),
            TokenPair {
                access: jwt_expiring_in(Duration::minutes(-5)),
                refresh: "garbage".into(),
            },
        );

        let err = h.client.execute(ApiRequest::get("/users/profile")).await.unwrap_err();
        assert_eq!(h.backend.requests.lock()[0].bearer, None);
        // Refresh token is garbage: no exchange, hard reset.
        assert!(matches!(err, ClientError::SessionExpired(_)));
        assert_eq!(h.backend.refresh_calls.load(Ordering::SeqCst), 0);
        assert!(h.tokens.is_empty());
        assert_eq!(*h.recorder.navigations.lock(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn single_401_refreshes_and_retries_once() {
        let (_stale, fresh, pair) = stale_pair();
        let h = harness(FakeBackend::new(fresh.clone(), fresh.clone()), pair);

        let resp = h.client.execute(ApiRequest::get("/facturas")).await.unwrap();
        assert_eq!(resp.body, json!({ "ok": true }));
        assert_eq!(h.backend.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.tokens.access_token(), Some(fresh));
        // Refresh response omitted a new refresh token: the old one is kept.
        assert!(h.tokens.valid_refresh_token().is_some());
        assert!(!h.client.is_refreshing());
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh() {
        let (_stale, fresh, pair) = stale_pair();
        let h = harness(FakeBackend::new(fresh.clone(), fresh), pair);

        let calls = (0..5).map(|i| {
            let client = h.client.clone();
            tokio::spawn(async move { client.execute(ApiRequest::get(format!("/ventas/{i}"))).await })
        });
        let results = join_all(calls).await;

        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|r| r.status == 200)));
        assert_eq!(h.backend.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_rejects_everyone_and_clears_tokens() {
        let (_stale, fresh, pair) = stale_pair();
        let mut backend = FakeBackend::new(fresh.clone(), fresh);
        backend.refresh_status = 401;
        let h = harness(backend, pair);

        let calls = (0..5).map(|i| {
            let client = h.client.clone();
            tokio::spawn(async move { client.execute(ApiRequest::get(format!("/clientes/{i}"))).await })
        });
        let results = join_all(calls).await;

        assert!(results.iter().all(|r| matches!(r, Err(ClientError::SessionExpired(_)))));
        assert_eq!(h.backend.refresh_calls.load(Ordering::SeqCst), 1);
        assert!(h.tokens.access_token().is_none());
        assert!(h.tokens.refresh_token().is_none());
        assert!(!h.recorder.navigations.lock().is_empty());
    }

    #[tokio::test]
    async fn retry_is_attempted_only_once() {
        let (_stale, fresh, pair) = stale_pair();
        // The backend keeps rejecting even the refreshed token.
        let mut backend = FakeBackend::new("never-valid".into(), fresh);
        backend.rotate_on_refresh = false;
        let h = harness(backend, pair);

        let err = h.client.execute(ApiRequest::get("/inventario")).await.unwrap_err();
        assert!(matches!(err, ClientError::Authentication(_)));
        assert_eq!(h.backend.refresh_calls.load(Ordering::SeqCst), 1);
        let requests: Vec<String> = h.backend.requests.lock().iter().map(|r| r.path.clone()).collect();
        assert_eq!(requests, vec!["/inventario", "/auth/token/refresh", "/inventario"]);
    }

    #[tokio::test]
    async fn login_401_never_triggers_refresh() {
        let (_stale, fresh, pair) = stale_pair();
        let h = harness(FakeBackend::new(fresh.clone(), fresh), pair);

        let err = h
            .client
            .execute(ApiRequest::post("/auth/login", json!({ "username": "a", "password": "b" })))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Authentication("bad credentials".into()));
        assert_eq!(h.backend.refresh_calls.load(Ordering::SeqCst), 0);
        assert!(h.recorder.notices.lock().is_empty());
    }

    #[tokio::test]
    async fn other_statuses_notify_without_touching_tokens() {
        let (_stale, fresh, pair) = stale_pair();
        let h = harness(FakeBackend::new(fresh.clone(), fresh), pair.clone());

        let err = h.client.execute(ApiRequest::get("/missing")).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(h.recorder.notices.lock()[0], Notice::error("Recurso no encontrado"));
        assert_eq!(h.tokens.access_token(), Some(pair.access));
        assert!(h.recorder.navigations.lock().is_empty());
    }

    async fn join_all<I, T>(handles: I) -> Vec<T>
    where
        I: IntoIterator<Item = tokio::task::JoinHandle<T>>,
    {
        let mut out = Vec::new();
        for handle in handles {
            out.push(handle.await.unwrap());
        }
        out
    }
}
