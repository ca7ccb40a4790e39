use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use meeting_assist::api::{AppState, api_routes, cors_layer};
use meeting_assist::config::{AppConfig, IdentityConfig};
use meeting_assist::identity::{FirebaseIdentity, IdentityProvider, LocalIdentity};
use meeting_assist::shell::{SessionRegistry, spawn_sweep_task};
use meeting_assist::store::LibSqlBackend;
use meeting_assist::tasks::PlaceholderTaskGenerator;
use meeting_assist::webhook::HttpWebhook;
use meeting_assist::workflow::WorkflowDeps;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("📝 Meeting Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/dashboard", config.port);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Webhook delivery: {}", config.webhook.mode);

    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    let identity: Arc<dyn IdentityProvider> = match &config.identity {
        IdentityConfig::Local => Arc::new(LocalIdentity::new(Arc::clone(&db) as _)),
        IdentityConfig::Firebase {
            api_key,
            request_uri,
        } => Arc::new(FirebaseIdentity::new(api_key.clone(), request_uri.clone())),
    };
    tracing::info!(provider = identity.name(), "Identity provider ready");

    let notifier = HttpWebhook::new(config.webhook.mode, config.webhook.timeout)?;

    let sessions = Arc::new(SessionRegistry::with_limits(config.sessions));
    let _sweep_handle = spawn_sweep_task(Arc::clone(&sessions), Duration::from_secs(60));

    let state = AppState {
        identity,
        deps: WorkflowDeps {
            store: db,
            notifier: Arc::new(notifier),
            generator: Arc::new(PlaceholderTaskGenerator),
        },
        sessions,
    };

    let app = api_routes(state).layer(cors_layer(config.cors_origin.as_deref())?);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
