use anyhow::{Context as _, Result};
use clap::Parser;
use lab_report_service::{
    FormData, MasterAnalyzer, OpenRouterClient, PdfPageRasterizer, ServiceConfig,
    reconcile::data_source_message, telemetry::init_tracing,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Analyze one lab report and print the result as JSON.
#[derive(Debug, Parser)]
#[command(name = "analyze-report", version)]
struct Args {
    /// PDF or plain-text export to analyze
    file: PathBuf,

    /// Operator-entered client name; enables identity reconciliation
    #[arg(long)]
    client_name: Option<String>,

    #[arg(long, requires = "client_name")]
    client_email: Option<String>,

    /// Print the human-readable summary instead of JSON
    #[arg(long)]
    summary: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = ServiceConfig::from_env()?;
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("cannot read {}", args.file.display()))?;

    let analyzer = MasterAnalyzer::new(
        Arc::new(OpenRouterClient::new(config.inference.clone())),
        Arc::new(PdfPageRasterizer),
        config.pipeline,
    );

    let (outcome, client_data) = match args.client_name {
        Some(client_name) => {
            let form = FormData {
                client_name,
                client_email: args.client_email,
                ..Default::default()
            };
            let analysis = analyzer.analyze_for_client(bytes, &form).await?;
            (analysis.outcome, Some(analysis.client_data))
        }
        None => (analyzer.analyze_report(bytes).await?, None),
    };

    if args.summary {
        print!("{}", MasterAnalyzer::summary(outcome.result()));
        for reason in outcome.reasons() {
            println!("Rejected: {}", reason);
        }
        if let Some(client_data) = &client_data {
            println!("{}", data_source_message(client_data));
        }
        return Ok(());
    }

    let envelope = json!({
        "outcome": outcome,
        "clientData": client_data,
        "dataSourceMessage": client_data.as_ref().map(data_source_message),
    });
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}
