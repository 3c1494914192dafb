use std::path::PathBuf;

use clap::Parser;
use formic_core::data::SetValueFlags;
use formic_core::schema::SchemaFragment;
use formic_engine::{Form, HttpLoader};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// Render a form schema: build the component tree, resolve remote subforms,
/// bind a data object, and print the merged value.
#[derive(Parser, Debug)]
#[command(name = "formic", version, about)]
struct Args {
    /// Path to the form schema (JSON)
    schema: PathBuf,

    /// Path to a data object (JSON) to bind after building
    #[arg(long)]
    data: Option<PathBuf>,

    /// Base URL for resolving relative subform sources
    #[arg(long)]
    base_url: Option<String>,

    /// Print every engine event to stderr as it is emitted
    #[arg(long)]
    watch_events: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json_logs: bool,

    /// Also print per-component visibility
    #[arg(long)]
    show_components: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    formic_telemetry::init_telemetry(formic_telemetry::TelemetryConfig {
        log_level: Level::INFO,
        module_levels: Vec::new(),
        json_output: args.json_logs,
    });

    let raw = std::fs::read_to_string(&args.schema).expect("failed to read schema file");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("schema is not valid JSON");
    let schema = SchemaFragment::from_value(value).expect("invalid schema fragment");

    let mut form = Form::new(&schema).expect("failed to build form");
    tracing::info!(form_id = %form.id(), "form built");

    if args.watch_events {
        let mut events = BroadcastStream::new(form.subscribe());
        tokio::spawn(async move {
            while let Some(Ok(event)) = events.next().await {
                eprintln!(
                    "{}",
                    serde_json::to_string(&event).unwrap_or_else(|_| event.event_type().into())
                );
            }
        });
    }

    let loader = match &args.base_url {
        Some(base) => HttpLoader::with_base_url(base.as_str()),
        None => HttpLoader::new(),
    };
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });
    form.load_subforms(&loader, &cancel).await;

    if let Some(path) = &args.data {
        let raw = std::fs::read_to_string(path).expect("failed to read data file");
        let data: serde_json::Value = serde_json::from_str(&raw).expect("data is not valid JSON");
        form.set_value(data, SetValueFlags::default());
    }

    if args.show_components {
        form.every_component(|node| {
            eprintln!(
                "{:<24} {:<12} visible={}",
                node.key().unwrap_or("-"),
                node.field_type,
                node.visible
            );
        });
    }

    let merged = serde_json::to_string_pretty(&form.get_value())
        .expect("merged value serializes");
    println!("{merged}");
}
