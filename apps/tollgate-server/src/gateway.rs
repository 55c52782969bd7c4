//! HTTP service that authenticates callers and answers access checks.
//!
//! Routes:
//!
//! | Method | Path | Answer |
//! |--------|------|--------|
//! | `GET` | `/health` | liveness, no authentication |
//! | `GET` | `/modules/{module}/actions/{action}` | action check |
//! | `GET` | `/modules/{module}/groups/{group}` | group check |
//! | `GET` | `/modules/{module}/resources/{class}/{id}[/{action}]` | resource check |
//! | `POST` | `/_admin/modules/{module}/events/{ACTION}` | deliver a module event |
//!
//! Checks answer 200 when allowed and 403 when denied or indeterminate.
//! Failed authentication answers 401 with both challenges.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::Service;
use serde_json::json;
use tracing::{debug, error, info, warn};

use tollgate_auth::{AuthError, Authenticator};
use tollgate_authz::{
    AccessDecision, AccessQuery, AuthorizationFacade, ModuleAction, ModuleEvent,
    ModuleEventListener, ResourcePermission,
};
use tollgate_core::ModuleName;

/// Response body used by the gateway.
pub type GatewayBody = Full<Bytes>;

/// Authority required to deliver module events.
pub const ADMIN_AUTHORITY: &str = "ADMIN";

/// A parsed request route.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Health,
    Check { module: String, query: AccessQuery },
    Event { module: String, action: String },
    NotFound,
}

impl Route {
    fn parse(method: &Method, path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match (method, segments.as_slice()) {
            (&Method::GET, ["health" | "_health"]) => Self::Health,
            (&Method::GET, ["modules", module, "actions", action]) => {
                Self::check(module, AccessQuery::Action((*action).to_owned()))
            }
            (&Method::GET, ["modules", module, "groups", group]) => {
                Self::check(module, AccessQuery::Group((*group).to_owned()))
            }
            (&Method::GET, ["modules", module, "resources", class, id]) => Self::check(
                module,
                AccessQuery::Resource(ResourcePermission::new(
                    *class,
                    *id,
                    ResourcePermission::ALL,
                )),
            ),
            (&Method::GET, ["modules", module, "resources", class, id, action]) => Self::check(
                module,
                AccessQuery::Resource(ResourcePermission::new(*class, *id, *action)),
            ),
            (&Method::POST, ["_admin", "modules", module, "events", action]) => Self::Event {
                module: (*module).to_owned(),
                action: (*action).to_owned(),
            },
            _ => Self::NotFound,
        }
    }

    fn check(module: &str, query: AccessQuery) -> Self {
        Self::Check {
            module: module.to_owned(),
            query,
        }
    }
}

/// Shared state behind every connection.
#[derive(Debug)]
pub struct AppState {
    authenticator: Authenticator,
    facade: AuthorizationFacade,
    request_timeout: Duration,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub fn new(
        authenticator: Authenticator,
        facade: AuthorizationFacade,
        request_timeout: Duration,
    ) -> Self {
        Self {
            authenticator,
            facade,
            request_timeout,
        }
    }

    /// The authorization facade.
    #[must_use]
    pub fn facade(&self) -> &AuthorizationFacade {
        &self.facade
    }

    /// Handle one request whose body has been collected.
    ///
    /// Authentication and permission lookups may block, so this runs on the
    /// blocking pool.
    pub fn handle(&self, parts: &http::request::Parts, body: &[u8]) -> http::Response<GatewayBody> {
        let route = Route::parse(&parts.method, parts.uri.path());
        if route == Route::Health {
            return json_response(StatusCode::OK, &json!({ "status": "running" }));
        }
        if route == Route::NotFound {
            return json_response(StatusCode::NOT_FOUND, &json!({ "error": "not found" }));
        }

        let principal = match self.authenticator.authenticate(parts, body) {
            Ok(principal) => principal,
            Err(e) => return self.unauthorized(&e),
        };
        let consumer = principal.consumer_key();

        match route {
            Route::Check { module, query } => {
                let module = match ModuleName::new(module) {
                    Ok(module) => module,
                    Err(e) => return bad_request(&e.to_string()),
                };
                let decision = self.facade.check(&module, &consumer, &query);
                debug!(%module, %consumer, ?query, ?decision, "access check");
                let status = if decision.is_allowed() {
                    StatusCode::OK
                } else {
                    StatusCode::FORBIDDEN
                };
                json_response(
                    status,
                    &json!({
                        "module": module.as_str(),
                        "consumer": consumer.as_str(),
                        "decision": decision_name(decision),
                    }),
                )
            }
            Route::Event { module, action } => {
                if !principal.has_authority(ADMIN_AUTHORITY) {
                    warn!(%consumer, "module event rejected: caller is not an administrator");
                    return json_response(StatusCode::FORBIDDEN, &json!({ "error": "forbidden" }));
                }
                let module = match ModuleName::new(module) {
                    Ok(module) => module,
                    Err(e) => return bad_request(&e.to_string()),
                };
                let action = match action.parse::<ModuleAction>() {
                    Ok(action) => action,
                    Err(e) => return bad_request(&e.to_string()),
                };
                info!(%module, %action, %consumer, "delivering module event");
                self.facade
                    .module_changed(&ModuleEvent::new(module.clone(), action));
                json_response(
                    StatusCode::OK,
                    &json!({ "module": module.as_str(), "action": action.as_str() }),
                )
            }
            Route::Health | Route::NotFound => {
                json_response(StatusCode::NOT_FOUND, &json!({ "error": "not found" }))
            }
        }
    }

    fn unauthorized(&self, err: &AuthError) -> http::Response<GatewayBody> {
        debug!(error = %err, "authentication failed");
        let mut response =
            json_response(StatusCode::UNAUTHORIZED, &json!({ "error": "unauthorized" }));
        response
            .headers_mut()
            .extend(self.authenticator.challenge_headers(err));
        response
    }
}

/// Hyper service wrapping [`AppState`].
#[derive(Debug, Clone)]
pub struct GatewayService {
    state: Arc<AppState>,
}

impl GatewayService {
    /// Create a service over `state`.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl Service<http::Request<Incoming>> for GatewayService {
    type Response = http::Response<GatewayBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(error = %e, "failed to read request body");
                    return Ok(bad_request("unreadable request body"));
                }
            };

            let timeout = state.request_timeout;
            let task = tokio::task::spawn_blocking(move || state.handle(&parts, &body));
            let response = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    error!(error = %e, "request handler panicked");
                    json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &json!({ "error": "internal error" }),
                    )
                }
                Err(_) => {
                    warn!(?timeout, "request timed out, decision is indeterminate");
                    json_response(
                        StatusCode::FORBIDDEN,
                        &json!({ "decision": decision_name(AccessDecision::Indeterminate) }),
                    )
                }
            };
            Ok(response)
        })
    }
}

fn decision_name(decision: AccessDecision) -> &'static str {
    match decision {
        AccessDecision::Allow => "allow",
        AccessDecision::Deny => "deny",
        AccessDecision::Indeterminate => "indeterminate",
    }
}

fn bad_request(message: &str) -> http::Response<GatewayBody> {
    json_response(StatusCode::BAD_REQUEST, &json!({ "error": message }))
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> http::Response<GatewayBody> {
    let mut response = http::Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
