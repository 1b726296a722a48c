use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use moodlight_contracts::audio::{AliasMap, AudioSource};
use moodlight_contracts::chat::{PromptTemplate, ResponseFraming, STARTERS};
use moodlight_contracts::events::TurnJournal;
use moodlight_engine::config::PlatformConfig;
use moodlight_engine::dataset::{prepare_dataset, DatasetPlan, DEFAULT_SPLIT_SEED, DEFAULT_TEST_RATIO};
use moodlight_engine::inference::{GenerationParameters, ParameterDialect};
use moodlight_engine::platform::{
    publish_audio_previews, DeployRequest, VertexAdmin, DEFAULT_ACCELERATOR_TYPE,
    DEFAULT_ENDPOINT_DISPLAY_NAME, DEFAULT_MACHINE_TYPE,
};
use moodlight_engine::{
    AccessTokenSource, AudioResolver, ChatSurface, EndpointClient, GcloudAccessToken,
    GcsObjectStore, InferenceClient, MediaElement, MoodChatHandler, ObjectStore, StatusHandle,
};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_TEST_INPUT: &str =
    "Je me sens incroyablement positif ce matin et je veux une ambiance qui danse facilement.";

#[derive(Debug, Parser)]
#[command(name = "moodlight", version, about = "Mood-driven lighting and music chat")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive mood chat in the terminal.
    Chat(ChatArgs),
    /// Send one prompt to the deployed endpoint and print the reply.
    TestEndpoint(TestEndpointArgs),
    CheckEndpointStatus(EndpointArgs),
    DeployModel(DeployArgs),
    /// Make the audio previews publicly readable and list their URLs.
    MakeAudioPublic,
    /// Build train/test CSV files from the samples and catalog.
    PrepareDataset(PrepareDatasetArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DialectArg {
    TextGeneration,
    ModelGarden,
}

impl From<DialectArg> for ParameterDialect {
    fn from(value: DialectArg) -> Self {
        match value {
            DialectArg::TextGeneration => ParameterDialect::TextGeneration,
            DialectArg::ModelGarden => ParameterDialect::ModelGarden,
        }
    }
}

#[derive(Debug, Parser)]
struct ChatArgs {
    /// Directory receiving lighting overlays, audio files and events.jsonl.
    #[arg(long, default_value = "moodlight-session")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, env = "GCP_ENDPOINT_ID")]
    endpoint_id: Option<String>,
    #[arg(long, value_enum, default_value = "text-generation")]
    dialect: DialectArg,
}

#[derive(Debug, Parser)]
struct TestEndpointArgs {
    endpoint_id: String,
    #[arg(long, default_value = DEFAULT_TEST_INPUT)]
    test_input: String,
    #[arg(long, value_enum, default_value = "text-generation")]
    dialect: DialectArg,
}

#[derive(Debug, Parser)]
struct EndpointArgs {
    endpoint_id: String,
}

#[derive(Debug, Parser)]
struct DeployArgs {
    /// Model id or full resource name.
    model_name: String,
    #[arg(long, default_value = DEFAULT_ENDPOINT_DISPLAY_NAME)]
    endpoint_display_name: String,
    #[arg(long, default_value = DEFAULT_MACHINE_TYPE)]
    machine_type: String,
    #[arg(long, default_value = DEFAULT_ACCELERATOR_TYPE)]
    accelerator_type: String,
    #[arg(long, default_value_t = 1)]
    accelerator_count: u32,
    #[arg(long, default_value_t = 45)]
    timeout_minutes: u64,
}

#[derive(Debug, Parser)]
struct PrepareDatasetArgs {
    /// Defaults to MOOD_SAMPLES_URI or the bucket's synesthetic_dj/mood_samples.csv.
    #[arg(long)]
    samples: Option<String>,
    #[arg(long)]
    catalog: Option<String>,
    #[arg(long, default_value = "dataset")]
    out: PathBuf,
    #[arg(long, default_value_t = DEFAULT_TEST_RATIO)]
    test_ratio: f64,
    #[arg(long, default_value_t = DEFAULT_SPLIT_SEED)]
    seed: u64,
}

fn main() {
    let _ = dotenvy::dotenv();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("moodlight error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = PlatformConfig::from_env();
    match cli.command {
        Command::Chat(args) => {
            run_chat(&config, args)?;
            Ok(0)
        }
        Command::TestEndpoint(args) => run_test_endpoint(&config, args),
        Command::CheckEndpointStatus(args) => run_check_endpoint_status(&config, args),
        Command::DeployModel(args) => run_deploy_model(&config, args),
        Command::MakeAudioPublic => run_make_audio_public(&config),
        Command::PrepareDataset(args) => run_prepare_dataset(&config, args),
    }
}

fn tokens() -> Arc<dyn AccessTokenSource> {
    Arc::new(GcloudAccessToken)
}

fn endpoint_client(
    config: &PlatformConfig,
    endpoint_id: Option<&str>,
    dialect: DialectArg,
) -> Result<EndpointClient> {
    let parameters = GenerationParameters {
        dialect: dialect.into(),
        ..GenerationParameters::default()
    };
    Ok(EndpointClient::new(config.predict_url(endpoint_id)?, tokens())?.with_parameters(parameters))
}

fn vertex_admin(config: &PlatformConfig) -> Result<VertexAdmin> {
    VertexAdmin::new(
        config.aiplatform_api_base(),
        config.require_project_id()?,
        config.region.clone(),
        tokens(),
    )
}

fn run_chat(config: &PlatformConfig, args: ChatArgs) -> Result<()> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let session_id = uuid::Uuid::new_v4().to_string();

    let client = endpoint_client(config, args.endpoint_id.as_deref(), args.dialect)?;
    let store = GcsObjectStore::new(config.storage_api_base(), tokens())?;
    let aliases = AliasMap::load(config.audio_aliases_path.as_deref())?;
    let template = PromptTemplate::phi3();
    let framing = ResponseFraming::for_template(&template);
    let handler = MoodChatHandler::new(
        Box::new(client),
        AudioResolver::new(Arc::new(store), aliases),
    )
    .with_template(template, framing)
    .with_journal(TurnJournal::new(&events_path, session_id.clone()));

    tracing::info!(session_id = %session_id, events = %events_path.display(), "chat session started");
    println!("Moodlight chat started. Describe how you feel, or type /help.");
    print_starters();

    let mut surface = TerminalSurface::new(args.out.clone());
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let message = match input {
            "/quit" | "/exit" => break,
            "/help" => {
                println!("Commands: /starters /1../{} /quit", STARTERS.len());
                continue;
            }
            "/starters" => {
                print_starters();
                continue;
            }
            _ => match starter_message(input) {
                Some(message) => message,
                None if input.starts_with('/') => {
                    println!("Unknown command: {input}");
                    continue;
                }
                None => input,
            },
        };
        handler.handle_message(message, &mut surface)?;
    }
    Ok(())
}

fn starter_message(input: &str) -> Option<&'static str> {
    let index: usize = input.strip_prefix('/')?.parse().ok()?;
    STARTERS.get(index.checked_sub(1)?).map(|starter| starter.message)
}

fn print_starters() {
    for (index, starter) in STARTERS.iter().enumerate() {
        println!("  /{} {}: {}", index + 1, starter.label, starter.message);
    }
}

/// Prints messages to stdout and saves attached media under `out_dir`.
struct TerminalSurface {
    out_dir: PathBuf,
    next_status: u64,
    turns: u64,
}

impl TerminalSurface {
    fn new(out_dir: PathBuf) -> Self {
        Self {
            out_dir,
            next_status: 0,
            turns: 0,
        }
    }

    fn save(&self, file_name: String, data: &[u8]) -> Result<PathBuf> {
        let path = self.out_dir.join(file_name);
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

impl ChatSurface for TerminalSurface {
    fn show_status(&mut self, text: &str) -> Result<StatusHandle> {
        self.next_status += 1;
        println!("{text}");
        Ok(StatusHandle(self.next_status))
    }

    fn update_status(&mut self, _status: StatusHandle, text: &str) -> Result<()> {
        println!("{text}");
        Ok(())
    }

    fn remove_status(&mut self, _status: StatusHandle) -> Result<()> {
        Ok(())
    }

    fn send_message(&mut self, content: &str, elements: &[MediaElement]) -> Result<()> {
        self.turns += 1;
        println!("{content}");
        for element in elements {
            match element {
                MediaElement::Lighting { html, .. } => {
                    let path = self.save(format!("ambiance-{:03}.html", self.turns), html.as_bytes())?;
                    println!("  lighting: {}", path.display());
                }
                MediaElement::Audio { source, .. } => match source {
                    AudioSource::Bytes { data, .. } => {
                        let path = self.save(format!("ambiance-{:03}.mp3", self.turns), data)?;
                        println!("  audio: {}", path.display());
                    }
                    AudioSource::Url { url, .. } => println!("  audio: {url}"),
                },
            }
        }
        Ok(())
    }
}

fn run_test_endpoint(config: &PlatformConfig, args: TestEndpointArgs) -> Result<i32> {
    let client = endpoint_client(config, Some(&args.endpoint_id), args.dialect)?;
    let template = PromptTemplate::phi3();
    let framing = ResponseFraming::for_template(&template);
    println!("Endpoint ID: {}", args.endpoint_id);
    println!("Test input: {}", args.test_input);
    println!();
    println!("Sending prediction request...");

    let prediction = match client.predict(&template.build_prompt(&args.test_input)) {
        Ok(prediction) => prediction,
        Err(err) => {
            println!("❌ Prediction failed: {err:#}");
            return Ok(1);
        }
    };
    println!("✅ Prediction successful!");
    if let Some(model) = prediction.model_display_name.as_deref() {
        println!("Model: {model}");
    }
    println!();
    println!("Raw response:");
    println!("{}", prediction.raw_text);
    println!();
    match framing.extract(&prediction.raw_text) {
        Ok(response) => {
            println!("Parsed JSON response:");
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Err(err) => println!("Could not parse JSON: {err}"),
    }
    Ok(0)
}

fn run_check_endpoint_status(config: &PlatformConfig, args: EndpointArgs) -> Result<i32> {
    let admin = vertex_admin(config)?;
    let endpoint = admin.endpoint_status(&args.endpoint_id)?;
    println!("Endpoint: {}", endpoint.display_name);
    println!("Endpoint ID: {}", args.endpoint_id);
    println!("Resource Name: {}", endpoint.name);
    println!();

    if endpoint.deployed_models.is_empty() {
        println!("⏳ No models deployed yet. Deployment in progress...");
        return Ok(0);
    }
    println!("✅ {} model(s) deployed:", endpoint.deployed_models.len());
    for model in &endpoint.deployed_models {
        println!("  - Model: {}", model.display_name);
        println!("    ID: {}", model.id);
        let Some(resources) = model.dedicated_resources.as_ref() else {
            continue;
        };
        println!("    Machine Type: {}", resources.machine_spec.machine_type);
        println!("    Min Replicas: {}", resources.min_replica_count);
        println!("    Max Replicas: {}", resources.max_replica_count);
        if let Some(accelerator) = resources.machine_spec.accelerator_type.as_deref() {
            println!("    Accelerator: {accelerator}");
            println!(
                "    Accelerator Count: {}",
                resources.machine_spec.accelerator_count.unwrap_or(0)
            );
        }
    }
    Ok(0)
}

fn run_deploy_model(config: &PlatformConfig, args: DeployArgs) -> Result<i32> {
    let admin = vertex_admin(config)?;
    let accelerator_type = Some(args.accelerator_type).filter(|value| !value.trim().is_empty());
    let request = DeployRequest {
        model: args.model_name,
        endpoint_display_name: args.endpoint_display_name,
        machine_type: args.machine_type,
        accelerator_type,
        accelerator_count: args.accelerator_count,
        operation_timeout: Duration::from_secs(args.timeout_minutes * 60),
    };
    println!("Deploying model to endpoint...");
    let deployment = admin.deploy_model(&request)?;
    if deployment.created_endpoint {
        println!("Created new endpoint: {}", deployment.endpoint.display_name);
    } else {
        println!("Using existing endpoint: {}", deployment.endpoint.display_name);
    }
    println!("Model deployed successfully: {}", deployment.model_display_name);
    println!("Endpoint ID: {}", deployment.endpoint.endpoint_id());
    println!("Endpoint resource name: {}", deployment.endpoint.name);
    Ok(0)
}

fn run_make_audio_public(config: &PlatformConfig) -> Result<i32> {
    let project = config.require_project_id()?;
    let bucket = config.require_bucket()?;
    println!("Project: {project}");
    println!("Bucket: {bucket}");

    let store = GcsObjectStore::new(config.storage_api_base(), tokens())?;
    let publication = publish_audio_previews(&store, bucket)?;
    if publication.uniform_access {
        if publication.policy_updated {
            println!("✅ Bucket is now publicly readable");
        } else {
            println!("Bucket already grants public read access");
        }
    }
    println!();
    println!("Found {} audio files", publication.files.len());
    for file in &publication.files {
        println!("✅ {}", file.key);
        println!("   URL: {}", file.url);
    }
    println!();
    println!(
        "🎵 All {} audio files are now publicly accessible!",
        publication.files.len()
    );
    Ok(0)
}

fn run_prepare_dataset(config: &PlatformConfig, args: PrepareDatasetArgs) -> Result<i32> {
    let samples = args
        .samples
        .or_else(|| config.mood_samples_uri.clone())
        .context("--samples, MOOD_SAMPLES_URI or GCP_BUCKET_NAME must be set")?;
    let catalog = args
        .catalog
        .or_else(|| config.mood_catalog_uri.clone())
        .context("--catalog, MOOD_CATALOG_URI or GCP_BUCKET_NAME must be set")?;

    let store = if samples.starts_with("gs://") || catalog.starts_with("gs://") {
        Some(GcsObjectStore::new(config.storage_api_base(), tokens())?)
    } else {
        None
    };
    let mut plan = DatasetPlan::new(samples, catalog, args.out);
    plan.test_ratio = args.test_ratio;
    plan.seed = args.seed;

    let report = prepare_dataset(
        &plan,
        store.as_ref().map(|store| store as &dyn ObjectStore),
        &Default::default(),
    )?;
    println!(
        "Wrote {} rows: {} train ({}), {} test ({})",
        report.total_rows,
        report.train_rows,
        report.train_path.display(),
        report.test_rows,
        report.test_path.display()
    );
    Ok(0)
}
