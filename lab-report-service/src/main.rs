use lab_report_service::{ServiceConfig, create_app, telemetry::init_tracing};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    info!(
        text_model = %config.inference.text_model,
        vision_model = %config.inference.vision_model,
        vision_max_pages = config.pipeline.vision_max_pages,
        max_concurrent_documents = config.pipeline.max_concurrent_documents,
        ambiguous_report_policy = ?config.pipeline.ambiguous_report_policy,
        name_match_policy = ?config.pipeline.name_match_policy,
        blob_root = %config.blob_root.display(),
        "Loaded configuration"
    );

    let app = create_app(&config);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("Lab Report Analysis Service starting on {}", addr);
    info!("Analysis endpoint: POST http://{}/lab-reports/analyze", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
