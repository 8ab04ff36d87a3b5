use envconfig::Envconfig;
use eyre::Result;
use roster_import::app_context::AppContext;
use roster_import::config::Config;
use roster_import::http::{app, listen, setup_metrics_recorder};
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

async fn shutdown_signal() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("shutting down gracefully");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration from env");
            return Err(e.into());
        }
    };

    let context = AppContext::new(&config).await?;

    // The loop starts either way; a tick without a token retries the exchange itself.
    match context.pipeline.authenticate().await {
        Ok(()) => info!("initial credential exchange succeeded"),
        Err(e) => warn!(error = %e, "initial credential exchange failed"),
    }

    let scheduler = tokio::spawn(context.scheduler().run(shutdown_signal()));

    let router = app(context.server_state(), Some(setup_metrics_recorder()?));
    let http_server = tokio::spawn(listen(router, config.bind()));

    // Anything but a clean scheduler stop exits non-zero.
    let result = tokio::select! {
        res = scheduler => res.map_err(|e| {
            error!("scheduler failed with: {}", e);
            eyre::eyre!("scheduler task failed: {e}")
        }),
        res = http_server => {
            error!("http server exited");
            match res {
                Ok(Err(e)) => {
                    error!("server failed with: {}", e);
                    Err(e)
                }
                Err(e) => {
                    error!("server task failed with: {}", e);
                    Err(e.into())
                }
                Ok(Ok(())) => Err(eyre::eyre!("http server stopped unexpectedly")),
            }
        }
    };

    info!("exiting");
    result
}
