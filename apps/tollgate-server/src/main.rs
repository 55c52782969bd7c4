//! Tollgate Server - authentication and authorization front door.
//!
//! Authenticates callers with HTTP Digest or OAuth 1.0a and answers access
//! checks from the per-module authorization decision cache.
//!
//! # Usage
//!
//! ```text
//! TOLLGATE_LISTEN=0.0.0.0:8080 TOLLGATE_POLICY_FILE=policy.json tollgate-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TOLLGATE_LISTEN` | `0.0.0.0:8080` | Bind address |
//! | `TOLLGATE_REALM` | `tollgate` | Authentication realm |
//! | `TOLLGATE_SERVER_KEY` | *(random)* | Digest nonce signing key |
//! | `TOLLGATE_POLICY_FILE` | *(unset)* | JSON accounts and permissions |
//! | `TOLLGATE_DECISION_MAX_AGE_SECS` | `900` | Lifetime of cached decisions |
//! | `TOLLGATE_BACKEND_TIMEOUT_MS` | `5000` | Permission lookup timeout |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//!
//! See [`TollgateConfig::from_env`] for the full list.

mod gateway;
mod policy;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tollgate_auth::{AuthContext, Authenticator, InMemoryUserCache, ReplayGuard};
use tollgate_authz::{AuthorizationFacade, DecisionCache};
use tollgate_core::TollgateConfig;

use crate::gateway::{AppState, GatewayService};
use crate::policy::Policy;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often expired decision services are swept.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// A request may perform several backend lookups, each bounded by the
/// backend timeout.
const REQUEST_TIMEOUT_FACTOR: u32 = 3;

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Wire the authenticator and the decision cache from configuration.
fn build_state(config: &TollgateConfig, policy: &Policy) -> Result<AppState> {
    let ctx = Arc::new(AuthContext::from_config(config));
    let user_cache = InMemoryUserCache::new(Duration::from_secs(config.user_cache_ttl_secs));
    let mut authenticator = Authenticator::new(ctx, Arc::new(policy.identity_backend()))
        .with_user_cache(Arc::new(user_cache));
    if config.oauth_replay_protection {
        authenticator = authenticator.with_replay_guard(Arc::new(ReplayGuard::new(
            Duration::from_secs(config.oauth_timestamp_window_secs),
        )));
    }

    let backend = policy
        .permission_backend()
        .context("failed to build permission backend")?;
    let cache = DecisionCache::from_config(Arc::new(backend), config);
    let facade = AuthorizationFacade::new(Arc::new(cache));

    let request_timeout =
        Duration::from_millis(config.backend_timeout_ms).saturating_mul(REQUEST_TIMEOUT_FACTOR);
    Ok(AppState::new(authenticator, facade, request_timeout))
}

/// Periodically drop expired decision services.
fn spawn_eviction_sweep(cache: Arc<DecisionCache>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.evict_expired();
            if removed > 0 {
                info!(removed, "evicted expired decision services");
            }
        }
    });
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: GatewayService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Perform a health check by connecting to the server and requesting the health endpoint.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = TollgateConfig::from_env()?;

    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let addr = config.listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level)?;

    let policy = Policy::from_env()?;
    let state = build_state(&config, &policy)?;
    spawn_eviction_sweep(Arc::clone(state.facade().cache()));

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        realm = %config.realm,
        decision_max_age_secs = config.decision_max_age_secs,
        oauth_replay_protection = config.oauth_replay_protection,
        version = VERSION,
        "starting Tollgate Server",
    );

    serve(listener, GatewayService::new(Arc::new(state))).await
}
