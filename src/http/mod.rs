//! HTTP surface. Handlers translate wire types into engine calls; the engine
//! owns every rule about overlap, uniqueness and lifecycle.

mod bookings;
mod catalog;
mod dto;
mod error;
mod payments;
mod reports;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{FromRequestParts, MatchedPath, Request},
    http::{HeaderName, HeaderValue, request::Parts},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use axum_extra::headers::{Error as HeaderError, Header, HeaderMapExt};
use ulid::Ulid;

use crate::engine::Engine;
use crate::model::{AuthContext, Role};

static USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
static USER_ROLE_HEADER: HeaderName = HeaderName::from_static("x-user-role");
static WEBHOOK_SECRET_HEADER: HeaderName = HeaderName::from_static("x-webhook-secret");

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, webhook_secret: Option<String>) -> Self {
        Self {
            engine,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }
}

fn single_value<'i, I>(values: &mut I) -> Result<&'i str, HeaderError>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let value = values.next().ok_or_else(HeaderError::invalid)?;
    value.to_str().map(str::trim).map_err(|_| HeaderError::invalid())
}

/// `x-user-id`: the authenticated user's ULID, set by the upstream auth gate.
#[derive(Debug)]
struct UserIdHeader(Ulid);

impl Header for UserIdHeader {
    fn name() -> &'static HeaderName {
        &USER_ID_HEADER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, HeaderError>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let raw = single_value(values)?;
        Ulid::from_string(raw)
            .map(UserIdHeader)
            .map_err(|_| HeaderError::invalid())
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        match HeaderValue::from_str(&self.0.to_string()) {
            Ok(value) => values.extend(std::iter::once(value)),
            Err(_) => tracing::error!("failed to encode x-user-id header"),
        }
    }
}

/// `x-user-role`: `customer`, `manager` or `admin`.
#[derive(Debug)]
struct UserRoleHeader(Role);

impl Header for UserRoleHeader {
    fn name() -> &'static HeaderName {
        &USER_ROLE_HEADER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, HeaderError>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let raw = single_value(values)?;
        Role::parse(raw)
            .map(UserRoleHeader)
            .ok_or_else(HeaderError::invalid)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let label = match self.0 {
            Role::Customer => "customer",
            Role::Manager => "manager",
            Role::Admin => "admin",
        };
        values.extend(std::iter::once(HeaderValue::from_static(label)));
    }
}

/// `x-webhook-secret`: shared secret presented by the payment gateway.
#[derive(Debug)]
pub(crate) struct WebhookSecretHeader(String);

impl Header for WebhookSecretHeader {
    fn name() -> &'static HeaderName {
        &WEBHOOK_SECRET_HEADER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, HeaderError>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        single_value(values).map(|s| WebhookSecretHeader(s.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        match HeaderValue::from_str(&self.0) {
            Ok(value) => values.extend(std::iter::once(value)),
            Err(_) => tracing::error!("failed to encode x-webhook-secret header"),
        }
    }
}

/// Attach an [`AuthContext`] when identity headers are present. Malformed
/// identity is rejected outright; a missing one leaves the request anonymous
/// and routes that need a caller reject it through [`Caller`].
async fn authenticate(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let headers = request.headers();
    let user = headers
        .typed_try_get::<UserIdHeader>()
        .map_err(|_| auth_failure("malformed x-user-id header"))?;
    let role = headers
        .typed_try_get::<UserRoleHeader>()
        .map_err(|_| auth_failure("unknown x-user-role"))?;

    if let Some(UserIdHeader(user_id)) = user {
        let role = role.map_or(Role::Customer, |r| r.0);
        request
            .extensions_mut()
            .insert(AuthContext::new(user_id, role));
    }
    Ok(next.run(request).await)
}

fn auth_failure(reason: &'static str) -> ApiError {
    metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
    tracing::debug!("rejecting request: {reason}");
    ApiError::Unauthorized
}

async fn track(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |m| m.as_str().to_string());
    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status().as_u16().to_string();
    metrics::histogram!(crate::observability::HTTP_REQUEST_DURATION_SECONDS, "route" => route.clone())
        .record(started.elapsed().as_secs_f64());
    metrics::counter!(crate::observability::HTTP_REQUESTS_TOTAL, "route" => route, "status" => status)
        .increment(1);
    response
}

/// The authenticated caller. Rejects with 401 when the request is anonymous.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub AuthContext);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .map(Caller)
            .ok_or(ApiError::Unauthorized)
    }
}

impl Caller {
    /// Managers and admins only.
    fn elevated(self) -> Result<AuthContext, ApiError> {
        if self.0.role.is_elevated() {
            Ok(self.0)
        } else {
            tracing::warn!("user {} needs an elevated role", self.0.user_id);
            Err(ApiError::Engine(crate::engine::EngineError::Forbidden(self.0.user_id)))
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(bookings::create).get(bookings::list))
        .route("/bookings/availability", get(bookings::availability))
        .route("/bookings/{id}", get(bookings::get_one).delete(bookings::cancel))
        .route("/bookings/{id}/pay", post(bookings::pay))
        .route("/bookings/{id}/payment", put(bookings::set_payment))
        .route("/payments/webhook", post(payments::webhook))
        .route("/spaces/available", get(catalog::available_spaces))
        .route(
            "/spaces/{id}",
            get(catalog::get_space)
                .put(catalog::update_space)
                .delete(catalog::delete_space),
        )
        .route("/spaces/{id}/free", get(catalog::free_windows))
        .route("/locations", get(catalog::list_locations).post(catalog::create_location))
        .route("/locations/available", get(catalog::available_locations))
        .route(
            "/locations/{id}",
            get(catalog::get_location)
                .put(catalog::update_location)
                .delete(catalog::delete_location),
        )
        .route(
            "/locations/{id}/spaces",
            get(catalog::location_spaces).post(catalog::add_spaces),
        )
        .route("/admin/wizard/prefill", get(catalog::wizard_prefill))
        .route("/admin/wizard/validate", post(catalog::wizard_validate))
        .route("/admin/wizard/commit", post(catalog::wizard_commit))
        .route("/admin/bookings", get(bookings::admin_list))
        .route("/admin/metrics", get(reports::admin_metrics))
        .route("/manager/report", get(reports::manager_report))
        .route_layer(middleware::from_fn(authenticate))
        .route_layer(middleware::from_fn(track))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("HTTP listening on {addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
