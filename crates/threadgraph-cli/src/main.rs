//! Threadgraph CLI - hybrid graph/keyword/vector retrieval over discussion threads
//!
//! Every command writes exactly one JSON document to stdout; logs go to
//! stderr so callers can pipe the output. Failures emit `{"error": ...}`
//! and a non-zero exit code.

use std::io::Read;

use clap::{Parser, Subcommand};
use serde_json::json;
use threadgraph_core::config::Config;
use threadgraph_core::error::Error;
use threadgraph_core::ingest::{ChatSession, RecordInput};
use threadgraph_core::retrieval::RetrievedRecord;
use threadgraph_core::service::ThreadGraph;

/// Longest content excerpt included in result metadata
const PREVIEW_LEN: usize = 200;

#[derive(Parser)]
#[command(name = "threadgraph")]
#[command(author, version, about = "Knowledge-graph retrieval over discussion threads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve relevant records for a query
    Query {
        /// Query text
        text: String,
        /// Maximum number of results
        #[arg(default_value_t = 5)]
        limit: usize,
    },

    /// Ingest records from stdin ({"records": [...]})
    Ingest,

    /// Replace chat history from stdin ({"chat_sessions": [...]})
    IngestChat,

    /// Search chat history across all conversations
    SearchChat {
        /// Query text
        text: String,
        /// Maximum number of results
        #[arg(default_value_t = 5)]
        limit: usize,
    },

    /// List chat conversations, newest first
    Conversations,

    /// Show store, index, and graph statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs to stderr; stdout is reserved for the JSON payload
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("threadgraph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });

    let result = match cli.command {
        Commands::Query { text, limit } => cmd_query(config, &text, limit).await,
        Commands::Ingest => cmd_ingest(config).await,
        Commands::IngestChat => cmd_ingest_chat(config).await,
        Commands::SearchChat { text, limit } => cmd_search_chat(config, &text, limit).await,
        Commands::Conversations => cmd_conversations(config).await,
        Commands::Stats => cmd_stats(config).await,
    };

    match result {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            fail(&error_payload(&e));
        }
    }
}

/// Print an error payload to stdout and exit non-zero
fn fail(payload: &serde_json::Value) -> ! {
    println!("{}", payload);
    std::process::exit(1);
}

fn error_payload(e: &anyhow::Error) -> serde_json::Value {
    match e.downcast_ref::<Error>() {
        Some(core_err) => match core_err.remediation() {
            Some(instructions) => json!({
                "error": core_err.to_string(),
                "code": core_err.code(),
                "instructions": instructions,
            }),
            None => json!({
                "error": core_err.to_string(),
                "code": core_err.code(),
            }),
        },
        None => json!({ "error": e.to_string() }),
    }
}

async fn open(config: Config) -> anyhow::Result<ThreadGraph> {
    Ok(ThreadGraph::open(config).await?)
}

fn read_stdin() -> anyhow::Result<String> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    Ok(input)
}

fn result_metadata(results: &[RetrievedRecord]) -> Vec<serde_json::Value> {
    results
        .iter()
        .map(|r| {
            let preview: String = r.content.chars().take(PREVIEW_LEN).collect();
            json!({
                "id": r.id,
                "title": r.title,
                "author": r.author,
                "collection": r.collection,
                "score": r.score,
                "entities": r.entities,
                "sentiment": r.sentiment,
                "relevance_score": r.relevance_score,
                "retrieval_method": r.retrieval_method,
                "content_preview": preview,
            })
        })
        .collect()
}

async fn cmd_query(config: Config, text: &str, limit: usize) -> anyhow::Result<String> {
    let service = open(config).await?;
    if !service.has_graph().await? {
        return Err(Error::GraphNotBuilt.into());
    }

    let results = service.retrieve(text, limit).await?;

    let context: Vec<String> = results
        .iter()
        .map(|r| match &r.title {
            Some(title) if !title.is_empty() => format!("{}\n{}", title, r.content),
            _ => r.content.clone(),
        })
        .collect();

    let output = json!({
        "context": context,
        "metadata": result_metadata(&results),
        "query": text,
        "limit": limit,
        "total_results": results.len(),
    });
    Ok(output.to_string())
}

async fn cmd_ingest(config: Config) -> anyhow::Result<String> {
    let input = read_stdin()?;

    #[derive(serde::Deserialize)]
    struct IngestPayload {
        records: Vec<RecordInput>,
    }

    let payload: IngestPayload = match serde_json::from_str(&input) {
        Ok(payload) => payload,
        Err(e) => fail(&json!({ "error": format!("Invalid JSON input: {}", e) })),
    };

    let service = open(config).await?;
    let report = service.ingest_records(payload.records).await?;

    let output = json!({
        "processed_count": report.processed,
        "failed_count": report.failed,
        "message": format!("Ingested {} records", report.processed),
    });
    Ok(output.to_string())
}

async fn cmd_ingest_chat(config: Config) -> anyhow::Result<String> {
    let input = read_stdin()?;

    #[derive(serde::Deserialize)]
    struct ChatPayload {
        chat_sessions: Vec<ChatSession>,
    }

    let payload: ChatPayload = match serde_json::from_str(&input) {
        Ok(payload) => payload,
        Err(e) => fail(&json!({ "error": format!("Invalid JSON input: {}", e) })),
    };

    let service = open(config).await?;
    if !service.inference_available().await {
        fail(&json!({
            "error": "Inference service is not available",
            "instructions": "Start the inference service (e.g. `ollama serve`) and retry.",
        }));
    }

    let report = service.ingest_chat_sessions(payload.chat_sessions).await?;

    let output = json!({
        "processed_count": report.processed,
        "failed_count": report.failed,
        "message": format!("Ingested {} chat messages", report.processed),
    });
    Ok(output.to_string())
}

async fn cmd_search_chat(config: Config, text: &str, limit: usize) -> anyhow::Result<String> {
    let service = open(config).await?;
    if !service.has_graph().await? {
        return Err(Error::GraphNotBuilt.into());
    }

    let results = service.search_conversations(text, limit).await?;

    let output = json!({
        "results": result_metadata(&results),
        "query": text,
        "limit": limit,
        "total_results": results.len(),
    });
    Ok(output.to_string())
}

async fn cmd_conversations(config: Config) -> anyhow::Result<String> {
    let service = open(config).await?;
    let conversations = service.conversations().await?;

    let total = conversations.len();
    let output = json!({
        "conversations": conversations,
        "total": total,
    });
    Ok(output.to_string())
}

async fn cmd_stats(config: Config) -> anyhow::Result<String> {
    let service = open(config).await?;
    let stats = service.stats().await?;
    Ok(serde_json::to_string(&stats)?)
}
