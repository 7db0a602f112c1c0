//! Demo CLI for the rep assistance orchestrator
//!
//! Runs a single workflow against an in-memory conversation, using stub
//! source adapters and a scripted language model, and prints the event
//! stream as the run progresses. This is a harness for exercising the
//! engine end to end, not a production entry point — a real deployment
//! wires `HttpLanguageModel` and live source adapters instead.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use rep_orchestrator::{
    AdapterRegistry, Channel, Conversation, Evaluator, EventBus, Message, MessageRole,
    PersistencePort, QueryFormulator, ResolutionGenerator, RocksPersistence, SourceAdapter,
    StateStore, TriggerDetector, WorkflowConfig, WorkflowEngine,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the RocksDB state directory
    #[arg(long, default_value = ".rep-orchestrator-state")]
    state_path: std::path::PathBuf,

    /// Conversation id to run the workflow against
    #[arg(long, default_value = "demo-conversation")]
    conversation_id: String,

    /// Skip trigger-phrase matching and force a run
    #[arg(long, default_value_t = true)]
    force: bool,
}

/// Stub source that always returns one canned result, standing in for a
/// real content source until one is wired.
struct DemoSourceAdapter;

#[async_trait::async_trait]
impl SourceAdapter for DemoSourceAdapter {
    fn tag(&self) -> &str {
        "demo"
    }

    async fn search(
        &self,
        _query: &str,
        _k: usize,
        _deadline: std::time::Duration,
    ) -> rep_orchestrator::AdapterOutcome {
        rep_orchestrator::AdapterOutcome::ok(vec![rep_orchestrator::SourceResult {
            source_tag: "demo".to_string(),
            title: "Password Reset Guide".to_string(),
            url: "https://help.example.com/password-reset".to_string(),
            snippet: "To reset your password, go to account settings and select \
                      'Forgot password'."
                .to_string(),
            relevance: 0.95,
        }])
    }
}

/// Scripted model good enough to carry the demo through the happy path.
struct DemoModel;

#[async_trait::async_trait]
impl rep_orchestrator::LanguageModel for DemoModel {
    async fn complete(
        &self,
        prompt: &str,
        _config: &rep_orchestrator::ModelConfig,
    ) -> Result<String, rep_orchestrator::ModelError> {
        if prompt.contains("Score this answer") {
            return Ok(r#"{"accuracy":5,"relevancy":5,"factual_grounding":5,"citation_quality":5,"clarity":5,"feedback":"clear and grounded"}"#.to_string());
        }
        if prompt.contains("Write a 2-4 paragraph answer") {
            return Ok(
                "Go to account settings and select 'Forgot password' to reset it \
                 [Source: https://help.example.com/password-reset]."
                    .to_string(),
            );
        }
        Ok(r#"{"query":"reset password","keywords":["password","reset"],"entities":[],"intent":"account_access"}"#.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("rep_orchestrator=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!(path = %args.state_path.display(), "opening state store");
    let store = StateStore::open(&args.state_path)
        .map_err(|e| anyhow::anyhow!("failed to open state store: {}", e))?
        .shared();

    store.mark_abandoned_runs_aborted().map_err(|e| anyhow::anyhow!("{}", e))?;

    let conversation = Conversation::new(args.conversation_id.clone(), "rep-demo", Channel::Chat);
    store.put_conversation(&conversation).map_err(|e| anyhow::anyhow!("{}", e))?;
    store
        .put_message(&Message::new(
            args.conversation_id.clone(),
            MessageRole::Representative,
            "let me check that for you",
            0,
        ))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let events = EventBus::with_persistence(store.clone()).shared();
    let mut subscription = events.subscribe(&args.conversation_id);

    let persistence: Arc<dyn PersistencePort> = Arc::new(RocksPersistence::new(store));

    let model = Arc::new(DemoModel);
    let registry = AdapterRegistry::new();
    registry.register(Arc::new(DemoSourceAdapter));

    let config = WorkflowConfig::default();
    let engine = WorkflowEngine::new(
        TriggerDetector::new(config.trigger_phrases.clone()),
        QueryFormulator::new(model.clone(), config.model_tag_generator.clone()),
        registry,
        ResolutionGenerator::new(model.clone(), config.model_tag_generator.clone()),
        Evaluator::new(model, config.model_tag_evaluator.clone()).with_min_score(config.eval_min_score),
        persistence,
        events,
        config,
    );

    let printer = tokio::spawn(async move {
        loop {
            let event = subscription.recv().await;
            println!("[{}] {}", event.timestamp.format("%H:%M:%S"), event.event_type());
            if event.kind.is_terminal() {
                break;
            }
        }
    });

    let outcome = engine.run(&args.conversation_id, args.force).await?;
    printer.await.ok();

    println!("\nrun {} terminal={}", outcome.run_id, outcome.terminal);
    if let Some(resolution) = outcome.resolution {
        println!("resolution:\n{}", resolution.resolution_text);
    }
    if let Some(error_kind) = outcome.error_kind {
        println!("error_kind: {}", error_kind);
    }

    Ok(())
}
