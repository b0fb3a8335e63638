//! HTTP API
//!
//! Every route is a warp filter ending in a `Response`, so the modules can be
//! joined with `or().unify()` into one filter. Handlers never reject:
//! failures are turned into `{error}` JSON bodies with the right status.
//! Routes that need a session read the `Authorization: Bearer` header.

pub mod agent_routes;
pub mod auth_routes;
pub mod market;
pub mod payments;
pub mod reply;
pub mod settings;
pub mod tasks;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::agent::{PayoutPolicy, PayoutService, TaskRunner};
use crate::auth::{AuthService, SessionUser};
use self::reply::{BodyTooLarge, BodyUnreadable};
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::llm::{build_provider, LlmProvider, LlmSettings};
use crate::notify::Notifier;
use crate::observability::{health_routes, HealthMonitor};
use crate::payments::Payments;
use crate::research::{ResearchClient, ResearchSettings};
use crate::store::Store;
use crate::tools::{ToolContext, ToolSystem};

/// Largest JSON body accepted by any route
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Everything the handlers share
pub struct AppState {
    pub store: Arc<Store>,
    pub auth: AuthService,
    pub runner: Arc<TaskRunner>,
    pub notifier: Arc<Notifier>,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub llm_settings: LlmSettings,
    pub health: Arc<HealthMonitor>,
    pub discord_bot_token: Option<String>,
    pub discord_channel: Option<String>,
    pub discord_app_id: Option<String>,
    pub cron_secret: Option<String>,
    pub batch_size: usize,
    /// Network recorded on new PENDING payments
    pub network: String,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire every component from configuration and the environment
    pub async fn build(config: &AppConfig) -> AppResult<Self> {
        let http = http_client(config)?;
        let llm = build_provider(config)?;
        let payments = Payments::from_config(config, http.clone());
        Self::assemble(config, http, llm, payments).await
    }

    /// Wire the state around an existing model provider and payment rails
    pub async fn assemble(
        config: &AppConfig,
        http: reqwest::Client,
        llm: Option<Arc<dyn LlmProvider>>,
        payments: Payments,
    ) -> AppResult<Self> {
        let store = Arc::new(Store::new());

        let research = Arc::new(ResearchClient::new(
            payments.fetcher.clone(),
            ResearchSettings::from_config(config),
        ));
        let mut tools = ToolSystem::new(ToolContext {
            research: research.clone(),
            store: store.clone(),
            http: http.clone(),
            x402_demo_url: config.payments.x402_demo_url.clone(),
        });
        tools.initialize(&config.tools).await?;
        let tools = Arc::new(tools);

        let llm_settings = LlmSettings::from_config(config);
        let notifier = Arc::new(Notifier::from_config(config, http, store.clone()));

        let health = Arc::new(HealthMonitor::new("agenx"));
        health.set_integration("openai", llm.is_some()).await;
        health
            .set_integration("perplexity", research.settings().perplexity_api_key.is_some())
            .await;
        health
            .set_integration("tavily", research.settings().tavily_api_key.is_some())
            .await;
        health.set_integration("discord", notifier.is_configured()).await;
        health.set_integration("payouts", payments.rail.is_some()).await;

        let payout = PayoutService::new(
            payments.rail.clone(),
            payments.price.clone(),
            PayoutPolicy::from_config(config),
            config.agent_public_key(),
            store.clone(),
            notifier.clone(),
        )
        .with_agent_name(config.agent.name.clone());

        let runner = TaskRunner::new(
            store.clone(),
            tools.clone(),
            notifier.clone(),
            payout,
            config.agent.clone(),
        )
        .with_llm(llm.clone(), llm_settings.clone())
        .with_health(health.clone());

        info!(
            tools = ?tools.list_tools(),
            llm = llm.is_some(),
            payouts = payments.rail.is_some(),
            network = %payments.network,
            "Application state ready"
        );

        Ok(Self {
            store,
            auth: AuthService::from_config(config),
            runner: Arc::new(runner),
            notifier,
            llm,
            llm_settings,
            health,
            discord_bot_token: config.discord_bot_token(),
            discord_channel: config.discord_fallback_channel(),
            discord_app_id: config.discord_app_id(),
            cron_secret: config.cron_secret(),
            batch_size: config.cron.batch_size,
            network: payments.network,
        })
    }

    /// Caller identity from an `Authorization` header value
    pub fn session(&self, authorization: Option<&str>) -> Option<SessionUser> {
        self.auth.bearer_user(authorization)
    }
}

fn http_client(config: &AppConfig) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.research.timeout_secs))
        .user_agent(concat!("agenx/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| crate::error::AppError::internal_error(format!("HTTP client: {e}")))
}

/// All API routes plus the health endpoints, with CORS and JSON rejections
pub fn routes(state: SharedState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let api = auth_routes::routes(state.clone())
        .or(tasks::routes(state.clone()))
        .unify()
        .or(agent_routes::routes(state.clone()))
        .unify()
        .or(settings::routes(state.clone()))
        .unify()
        .or(payments::routes(state.clone()))
        .unify()
        .or(market::routes(state.clone()))
        .unify()
        .or(health_routes(state.health.clone()))
        .unify();

    api.with(
        warp::cors()
            .allow_any_origin()
            .allow_headers(vec!["authorization", "content-type", "x-cron-secret"])
            .allow_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"]),
    )
    .with(warp::trace::request())
    .recover(reply::handle_rejection)
}

pub(crate) fn with_state(
    state: SharedState,
) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Raw `Authorization` header, if any
pub(crate) fn authorization(
) -> impl Filter<Extract = (Option<String>,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("authorization")
}

/// Bounded raw body; handlers parse it so bad JSON gets their own error text.
/// Chunked bodies without `Content-Length` are accepted and capped as they arrive.
pub(crate) fn json_body() -> impl Filter<Extract = (Bytes,), Error = warp::Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(|declared: Option<u64>| async move {
            match declared {
                Some(len) if len > MAX_BODY_BYTES => Err(warp::reject::custom(BodyTooLarge)),
                _ => Ok(()),
            }
        })
        .untuple_one()
        .and(warp::body::stream())
        .and_then(|stream| collect_body(stream, MAX_BODY_BYTES))
}

/// Gather body chunks, rejecting once more than `limit` bytes have arrived
async fn collect_body<S, B>(stream: S, limit: u64) -> Result<Bytes, warp::Rejection>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    futures::pin_mut!(stream);
    let mut body = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::debug!(error = %e, "Request body read failed");
            warp::reject::custom(BodyUnreadable)
        })?;
        if (body.len() + chunk.remaining()) as u64 > limit {
            return Err(warp::reject::custom(BodyTooLarge));
        }
        body.put(chunk);
    }
    Ok(body.freeze())
}
