//! workflow-progress - tracks a session through one workflow and keeps step
//! progress in sync with the agent service until interrupted.

use std::error::Error;
use std::sync::Arc;

use workflow_progress::adapters::{
    AgentApiClient, AgentApiConfig, FileKeyValueStore, FileWorkflowSource, HttpConversationLookup,
    HttpWorkflowSource, InMemoryKeyValueStore, SystemClock,
};
use workflow_progress::application::{
    ConversationReconciler, ProgressPersistence, ProgressService, ProgressServiceConfig,
    ReconciliationSweeper,
};
use workflow_progress::config::{AppConfig, LoggingConfig, StorageBackend};
use workflow_progress::ports::{KeyValueStore, WorkflowSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.logging)?;

    let mut api = AgentApiConfig::new(config.api.base_url.clone()).with_timeout(config.api.timeout());
    if let Some(token) = &config.api.api_token {
        api = api.with_api_token(token.clone());
    }
    let client = AgentApiClient::new(api)?;

    let request = config.workflow.request();
    let definition = match &config.workflow.definition_path {
        Some(path) => FileWorkflowSource::new(path).load_workflow(&request).await?,
        None => {
            HttpWorkflowSource::new(client.clone())
                .load_workflow(&request)
                .await?
        }
    };
    tracing::info!(
        workflow_id = %definition.id(),
        steps = definition.steps().len(),
        "Workflow definition loaded"
    );

    let store: Arc<dyn KeyValueStore> = match config.storage.backend {
        StorageBackend::File => Arc::new(FileKeyValueStore::new(&config.storage.data_dir)),
        StorageBackend::Memory => Arc::new(InMemoryKeyValueStore::new()),
    };
    let service = Arc::new(ProgressService::with_config(
        Arc::new(definition),
        ProgressPersistence::new(store, config.storage.namespace.clone()),
        Arc::new(SystemClock),
        ProgressServiceConfig::default().with_auto_advance(config.reconciliation.auto_advance),
    ));

    let progress = service.current().await?;
    tracing::info!(
        session_id = %progress.session_id,
        current_step = %progress.current_step_id,
        completed = progress.overall_progress.completed_steps,
        total = progress.overall_progress.total_steps,
        "Progress restored"
    );

    let reconciler = Arc::new(ConversationReconciler::new(
        service.clone(),
        Arc::new(HttpConversationLookup::new(client)),
    ));
    let sweeper =
        ReconciliationSweeper::with_interval(reconciler, config.reconciliation.sweep_interval());
    sweeper.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    sweeper.stop().await;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn Error>> {
    let builder = tracing_subscriber::fmt().with_env_filter(logging.env_filter()?);
    if logging.json {
        builder.json().try_init().map_err(|e| e as Box<dyn Error>)?;
    } else {
        builder.try_init().map_err(|e| e as Box<dyn Error>)?;
    }
    Ok(())
}
