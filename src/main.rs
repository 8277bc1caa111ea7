use std::{process, sync::Arc};

use ogcache::{
    application::error::AppError,
    cache::{ArtifactCache, CacheConfig, CachePolicy, KeyParams, MemoryStore, cache_headers},
    config::{self, HeadersArgs, KeyArgs},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::{net::TcpListener, sync::watch};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        config::Command::Serve(_) => {
            telemetry::init(&settings.logging).map_err(AppError::from)?;
            run_serve(settings).await
        }
        config::Command::Key(args) => run_key(&settings, args),
        config::Command::Headers(args) => run_headers(&settings, args),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(MemoryStore::new(&cache_config));
    let cache = Arc::new(ArtifactCache::new(store, cache_config));

    if !cache.health_check().await {
        return Err(AppError::from(InfraError::configuration(
            "cache store failed its startup probe",
        )));
    }

    serve_http(&settings, HttpState::new(cache)).await
}

fn run_key(settings: &config::Settings, args: KeyArgs) -> Result<(), AppError> {
    let mut params = KeyParams::new();
    for pair in &args.params {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(AppError::validation(format!(
                "parameter `{pair}` is not a NAME=VALUE pair"
            )));
        };
        params.insert(name, value);
    }

    let key = params.fingerprint()?;
    println!("{key}");
    println!("{}", key.namespaced(&settings.cache.namespace));
    Ok(())
}

fn run_headers(settings: &config::Settings, args: HeadersArgs) -> Result<(), AppError> {
    let defaults = CachePolicy::from_config(&CacheConfig::from(&settings.cache));
    let policy = CachePolicy {
        ttl_secs: args.ttl.unwrap_or(defaults.ttl_secs),
        stale_while_revalidate_secs: args.swr.unwrap_or(defaults.stale_while_revalidate_secs),
        tags: args.tags,
        vary: args.vary.or(defaults.vary),
    };

    for (name, value) in &cache_headers(&policy) {
        let value = value
            .to_str()
            .map_err(|err| AppError::unexpected(format!("header `{name}` is not text: {err}")))?;
        println!("{name}: {value}");
    }
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let public_router = http::build_router(state.clone());
    let admin_router = http::build_admin_router(state);

    let public_listener = TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "ogcache::serve",
        public_addr = %settings.server.public_addr,
        admin_addr = %settings.server.admin_addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(shutdown_requested(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_requested(shutdown_rx));

    let servers = async move { tokio::try_join!(async { public_server.await }, async { admin_server.await }) };
    tokio::pin!(servers);

    tokio::select! {
        result = &mut servers => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            return Ok(());
        }
        _ = wait_for_shutdown_signal() => {
            info!(target = "ogcache::serve", "Shutdown requested, draining connections");
            let _ = shutdown_tx.send(true);
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, servers).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            Ok(())
        }
        Err(_) => {
            warn!(
                target = "ogcache::serve",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "Graceful shutdown timed out"
            );
            Ok(())
        }
    }
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn wait_for_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target = "ogcache::serve", error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
