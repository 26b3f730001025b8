//! Calendar integration HTTP endpoints.
//!
//! Two `GET` routes behind the application's reverse proxy, which
//! terminates TLS and sets the role header. Unknown paths answer 404 and
//! other methods 405, both before the role check.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use absence_calendar::{AuthorizationFlowController, SyncGate, SyncStatus};
use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::header::{HOST, LOCATION};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{AUTHORIZE_PATH, HttpConfig, STATUS_PATH};
use crate::error::ServerResult;
use crate::scheduler::{JobState, SchedulerHandle};

/// Body of the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub sync: SyncStatus,
    pub jobs: BTreeMap<String, JobState>,
}

#[derive(Clone)]
struct EndpointState {
    config: Arc<HttpConfig>,
    controller: Arc<AuthorizationFlowController>,
    gate: Arc<SyncGate>,
    scheduler: Option<SchedulerHandle>,
}

/// Routes requests to the handshake controller and the sync gate.
pub struct CalendarEndpoints {
    state: EndpointState,
}

impl CalendarEndpoints {
    pub fn new(
        config: HttpConfig,
        controller: Arc<AuthorizationFlowController>,
        gate: Arc<SyncGate>,
    ) -> Self {
        Self {
            state: EndpointState {
                config: Arc::new(config),
                controller,
                gate,
                scheduler: None,
            },
        }
    }

    /// Builder: include job states in the status report.
    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.state.scheduler = Some(scheduler);
        self
    }

    pub fn config(&self) -> &HttpConfig {
        &self.state.config
    }

    pub fn router(&self) -> Router {
        let config = &self.state.config;
        let in_flight = Arc::new(Semaphore::new(config.max_connections.max(1)));

        // Outermost last: trace, then timeout, then the in-flight limit.
        Router::new()
            .route(AUTHORIZE_PATH, get(authorize))
            .route(STATUS_PATH, get(status))
            .layer(middleware::from_fn_with_state(in_flight, limit_in_flight))
            .layer(TimeoutLayer::new(config.connection_timeout))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }
}

/// Present when the role header names one of the allowed roles.
///
/// Every value of the header counts, and each value may list several roles
/// separated by commas. Roles compare case-insensitively.
struct Privileged;

impl FromRequestParts<EndpointState> for Privileged {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &EndpointState,
    ) -> Result<Self, Self::Rejection> {
        let config = &state.config;
        let allowed = parts
            .headers
            .get_all(config.role_header.as_str())
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .any(|role| {
                config
                    .allowed_roles
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(role))
            });

        if allowed {
            Ok(Self)
        } else {
            warn!(path = %parts.uri.path(), "rejected request without an allowed role");
            Err((StatusCode::FORBIDDEN, "forbidden"))
        }
    }
}

async fn limit_in_flight(
    State(in_flight): State<Arc<Semaphore>>,
    request: Request,
    next: Next,
) -> Response {
    let Ok(_permit) = in_flight.acquire().await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response();
    };
    next.run(request).await
}

/// Query of the authorization endpoint. Google adds `scope` and others,
/// which are ignored.
#[derive(Debug, Deserialize)]
struct AuthorizeParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn authorize(
    _: Privileged,
    State(endpoints): State<EndpointState>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let config = &endpoints.config;
    let current_url = current_url(config, &headers, uri.path());

    if let Some(reason) = params.error.as_deref() {
        warn!(reason, "provider returned an authorization error");
        let controller = endpoints.controller.clone();
        match tokio::task::spawn_blocking(move || controller.abandon_handshake()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to drop the pending authorization"),
            Err(e) => error!(error = %e, "authorization task failed"),
        }
        return status_redirect(config, Some(reason));
    }

    if let Some(code) = params.code.as_deref() {
        return match endpoints
            .controller
            .complete_handshake(code, params.state.as_deref(), &current_url)
            .await
        {
            Ok(outcome) => {
                info!(
                    refresh_token = outcome.refresh_token_stored,
                    sync_active = outcome.sync_active,
                    probe = ?outcome.probe,
                    "calendar authorization completed"
                );
                status_redirect(config, None)
            }
            Err(e) => {
                error!(reason = e.reason(), error = %e, "calendar authorization failed");
                status_redirect(config, Some(e.reason()))
            }
        };
    }

    let controller = endpoints.controller.clone();
    match tokio::task::spawn_blocking(move || controller.begin_handshake(&current_url)).await {
        Ok(Ok(url)) => found(url),
        Ok(Err(e)) => {
            warn!(reason = e.reason(), error = %e, "cannot start calendar authorization");
            status_redirect(config, Some(e.reason()))
        }
        Err(e) => {
            error!(error = %e, "authorization task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

async fn status(_: Privileged, State(endpoints): State<EndpointState>) -> Response {
    let gate = endpoints.gate.clone();
    let sync = match tokio::task::spawn_blocking(move || gate.status()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            error!(error = %e, "failed to read calendar sync status");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to read calendar settings",
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "status task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
        }
    };
    let jobs = match &endpoints.scheduler {
        Some(scheduler) => scheduler.state().await,
        None => BTreeMap::new(),
    };
    Json(StatusReport { sync, jobs }).into_response()
}

/// The URL the browser used for this request, without query.
fn current_url(config: &HttpConfig, headers: &HeaderMap, path: &str) -> String {
    match &config.public_url {
        Some(base) => format!("{}{}", base, path),
        None => {
            let host = headers
                .get(HOST)
                .and_then(|host| host.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| config.bind.to_string());
            format!("http://{}{}", host, path)
        }
    }
}

fn status_redirect(config: &HttpConfig, error: Option<&str>) -> Response {
    let page = &config.status_page;
    match error {
        Some(reason) => {
            let separator = if page.contains('?') { '&' } else { '?' };
            found(format!(
                "{}{}error={}",
                page,
                separator,
                urlencoding::encode(reason)
            ))
        }
        None => found(page.clone()),
    }
}

/// 302, which the browser follows with a `GET`.
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

/// TCP listener serving [`CalendarEndpoints`].
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    pub async fn bind(endpoints: CalendarEndpoints) -> ServerResult<Self> {
        let listener = TcpListener::bind(endpoints.config().bind).await?;
        info!(addr = %listener.local_addr()?, "calendar endpoints listening");

        Ok(Self {
            listener,
            router: endpoints.router(),
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` completes, then lets in-flight requests
    /// finish.
    pub async fn run_until_shutdown<S>(self, shutdown: S) -> ServerResult<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("shutdown signal received, closing listener");
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use absence_calendar::{CredentialStore, MemoryCredentialStore, MemoryFlowStore};
    use axum::body::Body;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tower::ServiceExt;

    use super::*;
    use crate::testing::{FakeCalendarApi, settings};

    struct Fixture {
        store: Arc<MemoryCredentialStore>,
        gate: Arc<SyncGate>,
        api: Arc<FakeCalendarApi>,
        endpoints: CalendarEndpoints,
    }

    fn fixture(config: HttpConfig, api: FakeCalendarApi) -> Fixture {
        let store = Arc::new(MemoryCredentialStore::new(settings(None)));
        let gate = Arc::new(SyncGate::new(store.clone()));
        let api = Arc::new(api);
        let controller = Arc::new(AuthorizationFlowController::new(
            store.clone(),
            Arc::new(MemoryFlowStore::default()),
            api.clone(),
            gate.clone(),
        ));
        Fixture {
            store,
            gate: gate.clone(),
            api,
            endpoints: CalendarEndpoints::new(config, controller, gate),
        }
    }

    async fn send(
        router: &Router,
        method: &str,
        target: &str,
        roles: &[&str],
    ) -> Response {
        let mut request = axum::http::Request::builder()
            .method(method)
            .uri(target)
            .header(HOST, "absence.internal:8087");
        for role in roles {
            request = request.header("X-Remote-Role", *role);
        }
        router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn get(router: &Router, target: &str, role: &str) -> Response {
        send(router, "GET", target, &[role]).await
    }

    fn location(response: &Response) -> &str {
        response.headers()[LOCATION].to_str().unwrap()
    }

    fn query_param(url: &str, key: &str) -> String {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn requires_privileged_role() {
        let f = fixture(HttpConfig::default(), FakeCalendarApi::new());
        let router = f.endpoints.router();

        let anonymous = send(&router, "GET", AUTHORIZE_PATH, &[]).await;
        assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);
        for role in ["employee", "", "employee, boss"] {
            let response = get(&router, STATUS_PATH, role).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{role:?}");
        }

        let response = get(&router, STATUS_PATH, "user, Office").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn role_may_arrive_in_a_repeated_header() {
        let f = fixture(HttpConfig::default(), FakeCalendarApi::new());
        let router = f.endpoints.router();

        let response = send(&router, "GET", STATUS_PATH, &["employee", "office"]).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_method_and_query() {
        let f = fixture(HttpConfig::default(), FakeCalendarApi::new());
        let router = f.endpoints.router();

        assert_eq!(
            get(&router, "/", "office").await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            send(&router, "POST", STATUS_PATH, &["office"]).await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );

        let repeated = format!("{AUTHORIZE_PATH}?code=a&code=b");
        assert_eq!(
            get(&router, &repeated, "office").await.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get(&router, &repeated, "employee").await.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(f.api.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authorize_redirects_to_provider_then_back() {
        let mut api = FakeCalendarApi::new();
        api.refresh_token = Some("1//refresh");
        let f = fixture(HttpConfig::default(), api);
        let router = f.endpoints.router();

        let start = get(&router, AUTHORIZE_PATH, "office").await;
        assert_eq!(start.status(), StatusCode::FOUND);
        let provider_url = location(&start).to_string();
        assert!(provider_url.starts_with("https://provider.test/auth"));
        assert_eq!(
            query_param(&provider_url, "redirect_uri"),
            "http://absence.internal:8087/integration/calendar/authorize"
        );

        let state = query_param(&provider_url, "state");
        let callback = get(
            &router,
            &format!("{AUTHORIZE_PATH}?code=4%2Fcode&state={state}&scope=calendar"),
            "office",
        )
        .await;

        assert_eq!(callback.status(), StatusCode::FOUND);
        assert_eq!(location(&callback), "/settings/calendar-sync");
        assert!(f.gate.is_sync_active());
        assert_eq!(
            f.store.get().unwrap().credentials.refresh_token.as_deref(),
            Some("1//refresh")
        );
    }

    #[tokio::test]
    async fn public_url_is_used_for_redirect_uri() {
        let f = fixture(
            HttpConfig::default().with_public_url("https://absence.example.com"),
            FakeCalendarApi::new(),
        );

        let start = get(&f.endpoints.router(), AUTHORIZE_PATH, "office").await;
        assert_eq!(
            query_param(location(&start), "redirect_uri"),
            "https://absence.example.com/integration/calendar/authorize"
        );
    }

    #[tokio::test]
    async fn missing_client_credentials_redirect_to_status_page() {
        let f = fixture(HttpConfig::default(), FakeCalendarApi::new());
        f.store.save(&Default::default()).unwrap();

        let response = get(&f.endpoints.router(), AUTHORIZE_PATH, "office").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "/settings/calendar-sync?error=configuration"
        );
    }

    #[tokio::test]
    async fn stray_callback_redirects_with_flow_state() {
        let f = fixture(HttpConfig::default(), FakeCalendarApi::new());

        let stray = get(
            &f.endpoints.router(),
            &format!("{AUTHORIZE_PATH}?code=x&state=y"),
            "office",
        )
        .await;
        assert_eq!(stray.status(), StatusCode::FOUND);
        assert_eq!(location(&stray), "/settings/calendar-sync?error=flow_state");
        assert_eq!(f.store.save_count(), 0);
    }

    #[tokio::test]
    async fn provider_error_ends_the_pending_flow() {
        let f = fixture(HttpConfig::default(), FakeCalendarApi::new());
        let router = f.endpoints.router();

        let start = get(&router, AUTHORIZE_PATH, "office").await;
        let state = query_param(location(&start), "state");

        let denied = get(
            &router,
            &format!("{AUTHORIZE_PATH}?error=access_denied&state={state}"),
            "office",
        )
        .await;
        assert_eq!(
            location(&denied),
            "/settings/calendar-sync?error=access_denied"
        );

        let late = get(
            &router,
            &format!("{AUTHORIZE_PATH}?code=4%2Fcode&state={state}"),
            "office",
        )
        .await;
        assert_eq!(location(&late), "/settings/calendar-sync?error=flow_state");
        assert_eq!(f.api.exchanges.load(Ordering::SeqCst), 0);
        assert_eq!(f.store.save_count(), 0);
    }

    #[tokio::test]
    async fn status_report_json() {
        let f = fixture(HttpConfig::default(), FakeCalendarApi::new());
        f.store.save(&settings(Some("1//refresh"))).unwrap();

        let response = get(&f.endpoints.router(), STATUS_PATH, "office").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "application/json"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        insta::assert_json_snapshot!(report, @r#"
        {
          "jobs": {},
          "sync": {
            "active": true,
            "calendar_id": "team@group.calendar.google.com",
            "has_refresh_token": true,
            "provider": "google"
          }
        }
        "#);
    }

    #[tokio::test]
    async fn serves_over_tcp() {
        let config = HttpConfig::default().with_bind(SocketAddr::from(([127, 0, 0, 1], 0)));
        let f = fixture(config, FakeCalendarApi::new());
        let server = HttpServer::bind(f.endpoints).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until_shutdown(async move {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"GET /integration/calendar/status HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
            )
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 403 Forbidden"), "{response}");

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"GET /integration/calendar/status HTTP/1.1\r\nHost: test\r\nX-Remote-Role: office\r\nConnection: close\r\n\r\n",
            )
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("\"active\":false"), "{response}");

        stop_tx.send(()).unwrap();
        running.await.unwrap().unwrap();
    }
}
