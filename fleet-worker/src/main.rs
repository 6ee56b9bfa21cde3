use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod ai;
mod config;
mod controllers;
mod gateway;
mod worker;

use ai::{CompletionClient, OpenAIClient};
use config::Config;
use gateway::events::EventBroadcaster;
use worker::TaskDispatcher;

pub struct AppState {
    pub config: Config,
    pub dispatcher: Arc<TaskDispatcher>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Cancelled on shutdown; every call runs under a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        client: Arc<dyn CompletionClient>,
        broadcaster: Arc<EventBroadcaster>,
        shutdown: CancellationToken,
    ) -> Self {
        let dispatcher = Arc::new(TaskDispatcher::new(
            config.clone(),
            client,
            Arc::clone(&broadcaster),
        ));
        Self {
            config,
            dispatcher,
            broadcaster,
            shutdown,
        }
    }
}

/// Resolves on ctrl-c or, on unix, SIGTERM. Returns the signal name.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                return tokio::select! {
                    Ok(()) = tokio::signal::ctrl_c() => "SIGINT",
                    Some(()) = term.recv() => "SIGTERM",
                    else => std::future::pending::<&'static str>().await,
                };
            }
            Err(e) => log::warn!("Cannot listen for SIGTERM, only ctrl-c stops the worker: {}", e),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// Waits for `signal`, then cancels every in-flight task.
async fn cancel_on<F>(signal: F, shutdown: &CancellationToken) -> &'static str
where
    F: std::future::Future<Output = &'static str>,
{
    let name = signal.await;
    log::info!("{} received, cancelling in-flight tasks", name);
    shutdown.cancel();
    name
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = match Config::from_env().and_then(|c| c.with_port_arg(std::env::args().nth(1))) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let api_key = match config.require_credential() {
        Ok(key) => {
            log::info!("OPENAI_API_KEY found");
            key.to_string()
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let client = OpenAIClient::new(
        &api_key,
        config.openai_endpoint.as_deref(),
        Some(config.execution_model.as_str()),
    )
    .map_err(std::io::Error::other)?;
    log::info!(
        "Completion backend: {} (decision: {}, execution: {}, direct JSON: {})",
        client.endpoint(),
        config.decision_model,
        config.execution_model,
        config.direct_json_model
    );

    let broadcaster = Arc::new(EventBroadcaster::new());
    let shutdown = CancellationToken::new();
    let state = web::Data::new(AppState::new(
        config.clone(),
        Arc::new(client),
        Arc::clone(&broadcaster),
        shutdown.clone(),
    ));

    let port = config.port;
    log::info!(
        "Starting fleet worker on port {} with {} workers",
        port,
        config.max_workers
    );
    log::info!("Event stream available at /ws");

    let bcast = Arc::clone(&broadcaster);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            // WebSocket data for /ws route
            .app_data(web::Data::new(Arc::clone(&bcast)))
            .wrap(Logger::default())
            .configure(controllers::health::config)
            .configure(controllers::tasks::config)
            .route("/ws", web::get().to(gateway::ws::ws_handler))
    })
    .workers(config.max_workers)
    .disable_signals()
    .bind(("0.0.0.0", port))?
    .run();

    let handle = server.handle();
    tokio::spawn(async move {
        cancel_on(shutdown_signal(), &shutdown).await;
        handle.stop(true).await;
    });

    server.await
}
