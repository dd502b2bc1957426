use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use course_certify::{
    api::{self, ApiDoc},
    config::Config,
    server::AppState,
    utils::init_log,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the toml config file
    #[arg(short, long, env = "COURSE_CERTIFY_CONFIG")]
    config: Option<PathBuf>,
    /// Directory for daily rotated log files, stdout when absent
    #[arg(short, long)]
    log_dir: Option<PathBuf>,
    #[arg(short = 'H', long)]
    host: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_log(args.log_dir)?;
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    info!(?config, "starting");

    let state = Arc::new(AppState::from_config(&config).await?);
    let app = api::router(state)
        .nest_service("/certificates", ServeDir::new(&config.certificate.output_dir))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("listening on http://{address}, Swagger UI at http://{address}/swagger-ui/");
    axum::serve(listener, app).await?;
    Ok(())
}
