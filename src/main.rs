use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use support_assist::answerer::{AgentCache, HttpAnswerer};
use support_assist::config::Config;
use support_assist::http::{AppState, serve};
use support_assist::notify::{TracingOperatorChannel, UserMessenger};
use support_assist::stores::{
    ConversationStore, InMemoryConversationStore, InMemoryProcessStore, LibSqlStore, ProcessStore,
};
use support_assist::workflow::WorkflowService;
use support_assist::workflow::steps::StepDeps;
use support_assist::workflow::trace::TracingObserver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing: env-filtered stderr output plus a daily-rolling file log.
    let file_appender = tracing_appender::rolling::daily("./logs", "support-assist.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    let config = Config::from_env()?;

    eprintln!("📬 Support Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Answerer: {}", config.answerer.base_url);
    eprintln!("   API: http://0.0.0.0:{}/api/emails", config.http_port);

    // Stores: a local database when configured, in-memory otherwise.
    let (processes, conversations): (Arc<dyn ProcessStore>, Arc<dyn ConversationStore>) =
        match &config.db_path {
            Some(path) => {
                eprintln!("   Database: {path}");
                let store = Arc::new(LibSqlStore::new_local(std::path::Path::new(path)).await?);
                (store.clone(), store)
            }
            None => (
                Arc::new(InMemoryProcessStore::new()),
                Arc::new(InMemoryConversationStore::new()),
            ),
        };

    let answerer: Arc<dyn support_assist::answerer::Answerer> =
        Arc::new(HttpAnswerer::new(&config.answerer, config.poll.clone()));
    let agents = Arc::new(AgentCache::new(config.agents.clone()));
    let messenger = Arc::new(UserMessenger::new(
        Arc::clone(&conversations),
        Arc::new(TracingOperatorChannel),
        answerer.clone(),
        Arc::clone(&agents),
    ));

    let deps = StepDeps {
        answerer,
        agents,
        messenger: Arc::clone(&messenger),
        observer: Arc::new(TracingObserver),
        poll: config.poll.clone(),
        thread_create_retries: config.thread_create_retries,
    };

    let service = Arc::new(WorkflowService::new(deps, processes));
    let state = Arc::new(AppState {
        service,
        conversations,
        messenger,
    });

    serve(state, config.http_port).await?;
    Ok(())
}
