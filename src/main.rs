mod blob_store;
mod config;
mod database;
mod error;
mod formatter;
mod importer;
mod jira_client;
mod models;
mod routes;
#[cfg(test)]
mod test_support;

use blob_store::FsBlobStore;
use config::Config;
use database::Database;
use importer::ProjectImporter;
use jira_client::{IssueTracker, JiraClient};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
pub(crate) struct AppState {
    importer: Arc<ProjectImporter>,
    tracker: Arc<dyn IssueTracker>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jira_project_importer=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let tracker: Arc<dyn IssueTracker> = Arc::new(JiraClient::new(&config.jira)?);
    let database = Database::new(&config.database_path).await?;
    let blobs = FsBlobStore::new(&config.blob_root);

    let state = AppState {
        importer: Arc::new(ProjectImporter::new(
            tracker.clone(),
            Arc::new(database),
            Arc::new(blobs),
            config.import_concurrency,
        )),
        tracker,
    };

    let app = routes::create_app(state, config.request_timeout);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        jira = %config.jira.base_url,
        "listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down...");
}
