use anyhow::Context;
use clap::Parser;

/// Gateway is the OpenCALL protocol server: a single-endpoint RPC runtime
/// with scope-based authorization, an async operation lifecycle, and
/// chunked result retrieval.
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// URL of the SQLite database backing tokens and operation instances.
    #[clap(
        long = "database",
        env = "DATABASE_URL",
        default_value = "sqlite://gateway.sqlite"
    )]
    database_url: String,
    /// Maximum connections of the database pool.
    #[clap(long = "database-max-connections", default_value = "8")]
    database_max_connections: u32,
    /// The port to listen on for API requests.
    #[clap(long, default_value = "8080", env = "API_PORT")]
    api_port: u16,
    /// Origin to allow in CORS contexts. May be specified multiple times.
    #[clap(long = "allow-origin")]
    allow_origin: Vec<String>,
    /// Seconds between sweeps of expired operation instances.
    #[clap(long = "sweep-interval-seconds", default_value = "60")]
    sweep_interval_seconds: u64,
}

fn main() -> Result<(), anyhow::Error> {
    // Use reasonable defaults for printing structured logs to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(if matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1") {
            false
        } else {
            true
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let args = Args::parse();
    tracing::info!(?args, "started!");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let task = runtime.spawn(async move { async_main(args).await });
    let result = runtime.block_on(task);

    tracing::info!(?result, "main function completed, shutting down runtime");
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result?
}

async fn async_main(args: Args) -> Result<(), anyhow::Error> {
    // Bind early in the application lifecycle, to not fail requests which
    // may dispatch as soon as the process is up.
    let api_listener = tokio::net::TcpListener::bind(format!("[::]:{}", args.api_port))
        .await
        .context("failed to bind server port")?;

    let pool = gateway_sql::open(&args.database_url, args.database_max_connections)
        .await
        .context("opening gateway database")?;

    let registry =
        registry::Registry::build(gateway::ops::built_in()).context("building the registry")?;
    tracing::info!(
        operations = registry.operations().count(),
        etag = registry.etag(),
        "registry assembled",
    );

    let app = gateway::App::new(pool.clone(), registry);
    let router = gateway::build_router(app, &args.allow_origin)?;

    tokio::spawn(gateway::lifecycle::sweep_expired(
        pool,
        std::time::Duration::from_secs(args.sweep_interval_seconds),
    ));

    axum::serve(api_listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving the API")?;

    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("caught ctrl-c, shutting down"),
        _ = sigterm.recv() => tracing::info!("caught SIGTERM, shutting down"),
    }
}
