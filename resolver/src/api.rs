use crate::config::Listener as ListenerConfig;
use crate::credentials::CredentialStore;
use crate::errors::ResolveError;
use crate::events::{Event, EventSink, LookupEvent, TrackEvent};
use crate::metrics_defs::REQUEST_DURATION;
use crate::pipeline::ResolutionPipeline;
use crate::types::ResolvedContact;
use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use shared::histogram;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use url::form_urlencoded;

const CLIENT_ID_HEADER: &str = "x-client-id";
const CLIENT_TOKEN_HEADER: &str = "x-client-token";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub pipeline: Arc<ResolutionPipeline>,
    pub events: EventSink,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/mp", get(lookup_handler))
        .route("/api/track", get(track_handler))
        .fallback(not_found)
        // Applied last so preflight requests never reach a handler or the fallback
        .layer(middleware::from_fn(preflight))
        .with_state(state)
}

pub async fn serve(listener: &ListenerConfig, state: AppState) -> Result<(), ApiError> {
    let app = router(state);

    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "lookup API listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Answers OPTIONS on any path with an empty 200.
async fn preflight(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

async fn not_found() -> Response {
    ResolveErrorBody::new("not found").into_response_with(StatusCode::NOT_FOUND)
}

#[derive(Serialize)]
struct ResolveErrorBody {
    error: String,
}

impl ResolveErrorBody {
    fn new(message: impl Into<String>) -> Self {
        ResolveErrorBody {
            error: message.into(),
        }
    }

    fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ResolveError::Upstream(_) => format!("{self} (status {})", status.as_u16()),
            _ => self.to_string(),
        };

        ResolveErrorBody::new(message).into_response_with(status)
    }
}

#[derive(Deserialize, Debug, Default)]
struct LookupParams {
    postcode: Option<String>,
    client_id: Option<String>,
    client_token: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct TrackParams {
    client_id: Option<String>,
    client_token: Option<String>,
    email: Option<String>,
    subject: Option<String>,
    body: Option<String>,
    mp: Option<String>,
    constituency: Option<String>,
    postcode: Option<String>,
    page: Option<String>,
}

/// Caller credentials, from headers first and query parameters second.
/// Blank values count as missing.
fn caller_credentials(
    headers: &HeaderMap,
    query_id: Option<&str>,
    query_token: Option<&str>,
) -> (Option<String>, Option<String>) {
    let pick = |name: &str, fallback: Option<&str>| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .or(fallback)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(String::from)
    };

    (
        pick(CLIENT_ID_HEADER, query_id),
        pick(CLIENT_TOKEN_HEADER, query_token),
    )
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

async fn lookup_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LookupParams>,
) -> Result<Json<ResolvedContact>, ResolveError> {
    let started = Instant::now();
    let (client_id, client_token) = caller_credentials(
        &headers,
        params.client_id.as_deref(),
        params.client_token.as_deref(),
    );

    let result = lookup(
        &state,
        client_id.as_deref(),
        client_token.as_deref(),
        params.postcode.as_deref(),
    )
    .await;

    let (outcome, status) = match &result {
        Ok(_) => ("ok", StatusCode::OK),
        Err(e) => (e.outcome(), e.status_code()),
    };
    histogram!(REQUEST_DURATION, "endpoint" => "mp", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());

    let contact = result.as_ref().ok();
    state.events.emit(Event::MpLookup(LookupEvent {
        client_id,
        postcode: params.postcode.clone(),
        outcome,
        status: status.as_u16(),
        name: contact.and_then(|c| c.name.clone()),
        constituency: contact.and_then(|c| c.constituency.clone()),
    }));

    result.map(Json)
}

async fn lookup(
    state: &AppState,
    client_id: Option<&str>,
    client_token: Option<&str>,
    postcode: Option<&str>,
) -> Result<ResolvedContact, ResolveError> {
    if client_id.is_none() || client_token.is_none() {
        return Err(ResolveError::MissingCredentials);
    }
    if !state.credentials.authorize(client_id, client_token) {
        return Err(ResolveError::Unauthorized);
    }

    let postcode = non_blank(postcode).ok_or(ResolveError::MissingPostcode)?;
    state.pipeline.resolve(postcode).await
}

/// Logs a click on a contact link and redirects to the matching `mailto:` URL.
async fn track_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TrackParams>,
) -> Response {
    let started = Instant::now();
    let response = track(&state, &headers, params);
    let outcome = if response.status() == StatusCode::FOUND {
        "ok"
    } else {
        "rejected"
    };
    histogram!(REQUEST_DURATION, "endpoint" => "track", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
    response
}

fn track(state: &AppState, headers: &HeaderMap, params: TrackParams) -> Response {
    let (client_id, client_token) = caller_credentials(
        headers,
        params.client_id.as_deref(),
        params.client_token.as_deref(),
    );
    if !state
        .credentials
        .authorize(client_id.as_deref(), client_token.as_deref())
    {
        return (StatusCode::FORBIDDEN, "unauthorised client").into_response();
    }

    let Some(email) = non_blank(params.email.as_deref()) else {
        return (StatusCode::BAD_REQUEST, "Missing email").into_response();
    };

    let subject = params.subject.unwrap_or_default();
    let body = params.body.unwrap_or_default();
    let location = mailto_link(email, &subject, &body);
    let Ok(location) = HeaderValue::from_str(&location) else {
        return (StatusCode::BAD_REQUEST, "Invalid email").into_response();
    };

    let header_text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    state.events.emit(Event::Track(TrackEvent {
        client_id: client_id.unwrap_or_default(),
        email: email.to_string(),
        // Counted in UTF-16 code units, like a browser's `String.length`
        body_length: body.encode_utf16().count(),
        subject,
        mp: params.mp.unwrap_or_default(),
        constituency: params.constituency.unwrap_or_default(),
        postcode: params.postcode.unwrap_or_default(),
        page: params.page.unwrap_or_default(),
        user_agent: header_text(header::USER_AGENT),
        ip: header_text(header::HeaderName::from_static("x-forwarded-for")),
    }));

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn mailto_link(email: &str, subject: &str, body: &str) -> String {
    format!(
        "mailto:{}?subject={}&body={}",
        encode_component(email),
        encode_component(subject),
        encode_component(body)
    )
}

// Mail clients expect %20 for spaces; a literal '+' is already encoded as %2B.
fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
