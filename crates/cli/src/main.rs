//! Command-line front end: generate a 3D model from one image.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hunyuan3d_client::{HunyuanApi, RemoteJobClient};
use hunyuan3d_core::generation::{
    validate_endpoint, GenerationOptions, DEFAULT_FACE_COUNT, DEFAULT_GUIDANCE_SCALE,
    DEFAULT_NUM_CHUNKS, DEFAULT_NUM_INFERENCE_STEPS, DEFAULT_OCTREE_RESOLUTION, DEFAULT_SEED,
};
use hunyuan3d_orchestrator::{
    AssetConverter, GenerateCommand, ManagerConfig, SubprocessConverter, TaskManager,
    TaskRequest,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Hunyuan3D image-to-3D client
#[derive(Parser)]
#[command(name = "hunyuan3d", version, about)]
struct Cli {
    /// Server endpoint (defaults to HUNYUAN3D_BASE_URL)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Print the final task record as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a model from an image and wait for it
    Generate(GenerateArgs),

    /// Check that the server is up
    Health,
}

#[derive(Args)]
struct GenerateArgs {
    /// Input image
    image: PathBuf,

    /// Output file (default: <image dir>/<stem>_hunyuan3d.usd)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep the image background instead of removing it
    #[arg(long)]
    keep_background: bool,

    /// Generate textures
    #[arg(long)]
    texture: bool,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u32,

    #[arg(long, default_value_t = DEFAULT_OCTREE_RESOLUTION)]
    octree_resolution: u32,

    #[arg(long, default_value_t = DEFAULT_NUM_INFERENCE_STEPS)]
    steps: u32,

    #[arg(long, default_value_t = DEFAULT_GUIDANCE_SCALE)]
    guidance_scale: f64,

    #[arg(long, default_value_t = DEFAULT_NUM_CHUNKS)]
    num_chunks: u32,

    #[arg(long, default_value_t = DEFAULT_FACE_COUNT)]
    face_count: u32,

    /// Seconds between status polls
    #[arg(long)]
    poll_interval: Option<f64>,
}

impl GenerateArgs {
    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            remove_background: !self.keep_background,
            texture: self.texture,
            seed: self.seed,
            octree_resolution: self.octree_resolution,
            num_inference_steps: self.steps,
            guidance_scale: self.guidance_scale,
            num_chunks: self.num_chunks,
            face_count: self.face_count,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hunyuan3d=info,hunyuan3d_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = ManagerConfig::from_env().context("Invalid configuration")?;
    if let Some(endpoint) = &cli.endpoint {
        config.default_endpoint = validate_endpoint(endpoint)?;
    }

    let api = HunyuanApi::new(config.request_timeout).context("Failed to build HTTP client")?;

    match cli.command {
        Commands::Health => {
            let health = api.health(&config.default_endpoint).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("{} (worker {})", health.status, health.worker_id);
            }
            if !health.is_healthy() {
                bail!("Server reported status '{}'", health.status);
            }
            Ok(())
        }
        Commands::Generate(args) => generate(api, config, args, cli.json).await,
    }
}

async fn generate(
    api: HunyuanApi,
    config: ManagerConfig,
    args: GenerateArgs,
    json: bool,
) -> Result<()> {
    let converter = SubprocessConverter::new(&config.converter_program, config.converter_timeout);
    let client: Arc<dyn RemoteJobClient> = Arc::new(api);
    let converter: Arc<dyn AssetConverter> = Arc::new(converter);
    let manager = TaskManager::start(client, converter, config);

    let mut request = TaskRequest::new(&args.image)
        .options(args.options())
        .on_progress(|task_id, message| tracing::info!(task_id = %task_id, "{message}"));
    if let Some(output) = &args.output {
        request = request.output_path(output);
    }
    if let Some(secs) = args.poll_interval {
        request = request.poll_interval_secs(secs);
    }

    let mut command = GenerateCommand::new(request);
    let response = command.execute(&manager);
    let Some(task_id) = response.task_id else {
        bail!(
            "{}",
            response.error.unwrap_or_else(|| "Request rejected".to_string())
        );
    };
    tracing::info!(
        task_id = %task_id,
        endpoint = response.endpoint.as_deref().unwrap_or_default(),
        "Generation requested",
    );

    let record = tokio::select! {
        record = manager.wait(task_id) => record?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(task_id = %task_id, "Interrupted, cancelling");
            command.undo(&manager)?;
            manager.wait(task_id).await?
        }
    };
    manager.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    match (&record.result, &record.error) {
        (Some(path), _) => {
            if !json {
                println!("{}", path.display());
            }
            Ok(())
        }
        (None, Some(error)) => bail!("Generation failed: {error}"),
        (None, None) => bail!("Generation {}", record.state),
    }
}
