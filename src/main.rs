use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueHint};
use iocraft::prelude::*;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::{Duration, Instant},
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    address::NetworkAddress,
    client::DigitalOceanClient,
    config::Config,
    import::{ImportEvent, ImportOrchestrator, ImportRequest},
    route::ServingRoute,
    server::FileServer,
    ui::{ImageStatus, ProgressLine},
};

mod address;
mod client;
mod config;
mod error;
mod import;
mod rest_types;
mod route;
mod serde_utils;
mod server;
mod ui;

const DEFAULT_LOG_FILTER: &str = "do_image_uploader=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "do-image-uploader")]
#[command(version)]
#[command(about = "Import a local disk image into DigitalOcean as a custom image")]
struct Cli {
    /// Wait until the image is available
    #[arg(long, env = "WAIT_UNTIL_AVAILABLE")]
    wait_until_available: bool,
    /// DigitalOcean API token
    #[arg(long, env = "DO_API_TOKEN", hide_env_values = true)]
    api_token: String,
    /// Path to the image file
    #[arg(long, env = "IMAGE_FILE", value_hint = ValueHint::FilePath, value_parser = existing_file)]
    image_file: PathBuf,
    /// Image region [default: nyc3]
    #[arg(long, env = "IMAGE_REGION")]
    region: Option<String>,
    /// Image name
    #[arg(long, env = "IMAGE_NAME")]
    name: String,
    /// Port the image is served on [default: 5379]
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,
    /// Local IP to listen on, if the public address is not bound locally (e.g. behind NAT)
    #[arg(long, env = "BIND_ADDRESS")]
    bind_address: Option<IpAddr>,
    /// Image description
    #[arg(long)]
    description: Option<String>,
    /// Tag to apply to the image, may be repeated
    #[arg(long = "tag")]
    tags: Vec<String>,
}

fn existing_file(value: &str) -> std::result::Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if !path.is_file() {
        return Err(format!("{} is not an existing file", value));
    }
    fs::File::open(&path).map_err(|e| format!("{} is not readable: {}", value, e))?;
    Ok(path)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let _rt_guard = rt.enter();
    // Env-backed flags read `.env` values only if it is loaded before parsing.
    let _ = dotenvy::dotenv();
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    let cli = Cli::parse();

    init_tracing();
    let config = config::read_config(cli)?;

    rt.block_on(upload_image(&config))
}

fn report_progress(event: ImportEvent) {
    let (message, done) = match event {
        ImportEvent::Created { id } => (format!("created image {}", id), false),
        ImportEvent::Downloaded { id, status } => {
            debug!(image_id = id, %status, "Provider finished fetching image");
            ("image has been downloaded".to_string(), true)
        }
        ImportEvent::Available { id } => {
            debug!(image_id = id, "Image is available");
            ("image is available".to_string(), true)
        }
    };
    element!(ProgressLine(message: message, done: done)).print();
}

async fn upload_image(config: &Config) -> Result<()> {
    let http = reqwest::Client::new();
    let host = address::resolve_public_address(&http, &config.address_lookup_url).await?;
    let address = NetworkAddress::new(host, config.http_port);
    info!("Public address is {}", address);

    let route = ServingRoute::generate(&config.image_file)?;
    let fetch_url = route.fetch_url(&address)?;

    let bind_addr = match config.bind_address {
        Some(ip) => SocketAddr::new(ip, config.http_port).to_string(),
        None => address.to_string(),
    };
    let mut server = FileServer::bind(&bind_addr, fetch_url.path(), config.image_file.clone())
        .await?
        .spawn();
    debug!(
        "Image will be fetched from {} (listening on {})",
        fetch_url,
        server.local_addr()
    );

    let orchestrator = ImportOrchestrator::new(
        DigitalOceanClient::new(config.api_base_url.clone(), config.api_token.clone()),
        config.poll_intervals,
    );
    let request = ImportRequest {
        image_file: config.image_file.clone(),
        name: config.name.clone(),
        region: config.region.clone(),
        url: fetch_url,
        description: config.description.clone(),
        tags: config.tags.clone(),
    };

    let started = Instant::now();
    let job = tokio::select! {
        job = orchestrator.run(request, config.wait_until_available, report_progress) => job?,
        failure = server.failed() => return Err(failure).context("Image server failed"),
    };

    let elapsed = Duration::from_secs(started.elapsed().as_secs());
    element! {
        ImageStatus(
            id: job.id,
            name: job.name,
            image_file: job.image_file.display().to_string(),
            region: job.region,
            status: job.status,
            available: job.available,
            elapsed: humantime::format_duration(elapsed).to_string()
        )
    }
    .print();

    Ok(())
}
