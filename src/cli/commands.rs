//! CLI command definitions for mimicforge.
//!
//! Each pipeline stage is a separately invokable command; `forge` chains all
//! of them in unattended mode. Commands communicate only through the
//! persisted configuration store and the filesystem.

use std::path::PathBuf;

use clap::Parser;
use tracing::error;

use crate::classify;
use crate::collab::{ProcessActivator, ProcessMiner, ProcessPreprocessor, ProcessTrainer};
use crate::config::{ConfigStore, DISCORD, GENERAL, HUGGINGFACE, TRAINING};
use crate::error::StageError;
use crate::export;
use crate::pipeline::{self, PipelineOrchestrator, ProcessExecutor, TrainOutcome};
use crate::prompt::{self, DefaultSource, InteractiveSource, ValueSource};
use crate::registry::{self, MODEL_SAVES_KEY};
use crate::session;
use crate::stage::{ActivateStage, MineStage, PreprocessStage, StageArgs, StageOutput, StageRunner};

/// Chat-mimic agent forge.
#[derive(Parser)]
#[command(name = "mimicforge")]
#[command(about = "Forge a conversational agent from raw chat history")]
#[command(version)]
#[command(
    long_about = "mimicforge drives the full pipeline from raw chat history to a deployed \
conversational agent: configure, scrape, clean/package, train, activate.\n\nEach stage is a \
separate command; `forge` chains all five in one unattended run."
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "warn", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Initialize and set the configuration for mimicforge.
    Init(InitArgs),

    /// Set individual configuration values.
    Set(SetArgs),

    /// Scrape all message data from the configured guild.
    Mine(MineArgs),

    /// Clean mined data and package it for training.
    Preprocess(PreprocessArgs),

    /// Train a model that imitates the configured target user.
    Train(TrainArgs),

    /// Activate the bot with a trained model.
    Activate(ActivateArgs),

    /// Produce a bot from scratch: init, mine, preprocess, train, activate.
    Forge,

    /// Generate an environment file for production deployment.
    #[command(name = "poduction_env")]
    PoductionEnv,

    /// Print the current configuration.
    Config(ConfigArgs),
}

/// Arguments for `mimicforge init`.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to mimicforge configuration and user data.
    #[arg(long)]
    pub app_path: Option<PathBuf>,

    /// Session name for organization in the data path.
    #[arg(long)]
    pub session: Option<String>,

    /// Path for mined server data and model saves.
    #[arg(long)]
    pub data_path: Option<String>,

    /// API key for the Discord bot.
    #[arg(long)]
    pub discord_api_key: Option<String>,

    /// Guild (server) where data is gathered and the bot runs.
    #[arg(long)]
    pub discord_guild: Option<String>,

    /// Guild member to mimic (name without the discriminator numbers).
    #[arg(long)]
    pub discord_target_user: Option<String>,

    /// HuggingFace write key for uploading models.
    #[arg(long)]
    pub huggingface_api_key: Option<String>,

    /// Name the fine-tuned model is uploaded under.
    #[arg(long)]
    pub huggingface_model_name: Option<String>,
}

/// Arguments for `mimicforge set`.
#[derive(Parser, Debug)]
pub struct SetArgs {
    /// Session name for organization of data.
    #[arg(long)]
    pub session: Option<String>,

    /// Name of the model to upload or fine-tune on HuggingFace.
    #[arg(long = "model_name")]
    pub model_name: Option<String>,

    /// Path to mimicforge data.
    #[arg(long)]
    pub app_path: Option<PathBuf>,
}

/// Arguments for `mimicforge mine`.
#[derive(Parser, Debug)]
pub struct MineArgs {
    /// Path to mimicforge configuration.
    #[arg(long)]
    pub app_path: Option<PathBuf>,

    /// Running as part of the forge pipeline.
    #[arg(long)]
    pub forge_pipeline: bool,
}

/// Arguments for `mimicforge preprocess`.
#[derive(Parser, Debug)]
pub struct PreprocessArgs {
    /// Path to mimicforge configuration.
    #[arg(long)]
    pub app_path: Option<PathBuf>,

    /// Path to session data.
    #[arg(long)]
    pub session_path: Option<PathBuf>,

    /// Running as part of the forge pipeline.
    #[arg(long)]
    pub forge_pipeline: bool,
}

/// Arguments for `mimicforge train`.
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Path to mimicforge configuration.
    #[arg(long)]
    pub app_path: Option<PathBuf>,

    /// Path to session data.
    #[arg(long)]
    pub session_path: Option<PathBuf>,

    /// Running as part of the forge pipeline.
    #[arg(long)]
    pub forge_pipeline: bool,
}

/// Arguments for `mimicforge activate`.
#[derive(Parser, Debug)]
pub struct ActivateArgs {
    /// Index of the model save to activate.
    #[arg(long)]
    pub model_idx: Option<usize>,

    /// Running as part of the forge pipeline.
    #[arg(long)]
    pub forge_pipeline: bool,
}

/// Arguments for `mimicforge config`.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Path to the app directory.
    #[arg(long)]
    pub app_path: Option<PathBuf>,
}

/// Parse CLI arguments without running the command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the mimicforge CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init(args) => run_init(args).await,
        Commands::Set(args) => run_set(args).await,
        Commands::Mine(args) => run_mine(args).await,
        Commands::Preprocess(args) => run_preprocess(args).await,
        Commands::Train(args) => run_train(args).await,
        Commands::Activate(args) => run_activate(args).await,
        Commands::Forge => run_forge().await,
        Commands::PoductionEnv => run_poduction_env().await,
        Commands::Config(args) => run_config(args).await,
    }
}

/// Default application directory (`~/.mimicforge`).
fn default_app_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".mimicforge"))
        .unwrap_or_else(|| PathBuf::from(".mimicforge"))
}

fn app_path_or_default(explicit: &Option<PathBuf>) -> PathBuf {
    explicit.clone().unwrap_or_else(default_app_path)
}

/// Local `(HH:MM)` prefix for operator-facing status lines.
fn timestamp() -> String {
    chrono::Local::now().format("(%H:%M)").to_string()
}

/// Report a classified stage failure and convert it for the fatal exit path.
fn fail(err: StageError) -> anyhow::Error {
    if let Some(hint) = classify::remediation(&err) {
        eprintln!("{hint}");
    }
    error!(kind = err.kind(), "stage failed");
    anyhow::anyhow!("{err}")
}

/// Take the flag value, or collect a non-empty one interactively.
fn resolve_field(
    flag: Option<String>,
    source: &mut dyn ValueSource,
    description: &str,
    default: String,
) -> Result<String, prompt::PromptError> {
    match flag {
        Some(value) => Ok(value),
        None => prompt::resolve(source, description, default, |v: &String| {
            !v.trim().is_empty()
        }),
    }
}

async fn run_init(args: InitArgs) -> anyhow::Result<()> {
    let app_path = app_path_or_default(&args.app_path);
    println!("app path: {}", app_path.display());

    // Existing values become the prompt defaults so re-running init only
    // changes what the operator actually edits.
    let mut store = ConfigStore::load(&app_path).map_err(|e| fail(StageError::Store(e)))?;
    let mut source = InteractiveSource;

    let session = resolve_field(
        args.session,
        &mut source,
        "Session name for organization in the data path",
        store.read(GENERAL, "session", &default_session_name()),
    )?;
    let data_path = resolve_field(
        args.data_path,
        &mut source,
        "Path to save server data and model saves",
        store.read(
            GENERAL,
            "data_path",
            &app_path.join("data").display().to_string(),
        ),
    )?;
    let discord_api_key = resolve_field(
        args.discord_api_key,
        &mut source,
        "Discord API key",
        store.read(DISCORD, "api_key", ""),
    )?;
    let discord_guild = resolve_field(
        args.discord_guild,
        &mut source,
        "Discord guild (server) name",
        store.read(DISCORD, "guild", ""),
    )?;
    let discord_target_user = resolve_field(
        args.discord_target_user,
        &mut source,
        "Target user to mimic (name only, no numbers)",
        store.read(DISCORD, "target_user", ""),
    )?;
    let huggingface_api_key = resolve_field(
        args.huggingface_api_key,
        &mut source,
        "HuggingFace API key (write access)",
        store.read(HUGGINGFACE, "api_key", ""),
    )?;
    let huggingface_model_name = resolve_field(
        args.huggingface_model_name,
        &mut source,
        "Name of the model to upload and fine-tune",
        store.read(HUGGINGFACE, "model_name", &suggested_model_name()),
    )?;

    store.write(
        GENERAL,
        &[("session", &session), ("data_path", &data_path)],
    )?;
    store.write(
        DISCORD,
        &[
            ("api_key", &discord_api_key),
            ("guild", &discord_guild),
            ("target_user", &discord_target_user),
        ],
    )?;
    let saves = store.read(HUGGINGFACE, MODEL_SAVES_KEY, "[]");
    store.write(
        HUGGINGFACE,
        &[
            ("api_key", &huggingface_api_key),
            ("model_name", &huggingface_model_name),
            (MODEL_SAVES_KEY, &saves),
        ],
    )?;

    let recommended = prompt::confirm(&mut source, "Use recommended training settings?", true)?;
    if recommended {
        store.write(
            TRAINING,
            &[
                ("context_window", ""),
                ("context_length", "2"),
                ("test_perc", "0.1"),
            ],
        )?;
    } else {
        let extrapolate = prompt::confirm(
            &mut source,
            "Extrapolate data by building context combinations (recommended under 2,000 rows)?",
            true,
        )?;
        let context_length = prompt::resolve(
            &mut source,
            "Context length (messages of context for generation; must be positive)",
            2u32,
            prompt::positive,
        )?;
        let context_window = if extrapolate {
            prompt::resolve(
                &mut source,
                "Context window (messages used to extrapolate context; must exceed the context length)",
                6u32,
                prompt::exceeds(context_length),
            )?
            .to_string()
        } else {
            String::new()
        };
        let test_perc = prompt::resolve(
            &mut source,
            "Fraction of data reserved for evaluation (between 0 and 1)",
            0.1f64,
            prompt::proper_fraction,
        )?;
        store.write(
            TRAINING,
            &[
                ("context_window", &context_window),
                ("context_length", &context_length.to_string()),
                ("test_perc", &test_perc.to_string()),
            ],
        )?;
    }

    println!("{} Successfully initialized mimicforge.", timestamp());
    Ok(())
}

async fn run_set(args: SetArgs) -> anyhow::Result<()> {
    let app_path = app_path_or_default(&args.app_path);
    let mut store = ConfigStore::load(&app_path).map_err(|e| fail(StageError::Store(e)))?;

    if let Some(session) = &args.session {
        store.write(GENERAL, &[("session", session)])?;
    }
    if let Some(model_name) = &args.model_name {
        store.write(HUGGINGFACE, &[("model_name", model_name)])?;
    }

    println!("Successfully set value.");
    Ok(())
}

async fn run_mine(args: MineArgs) -> anyhow::Result<()> {
    println!("{} Beginning to mine data.", timestamp());
    let app_path = app_path_or_default(&args.app_path);
    let mut store = ConfigStore::load(&app_path).map_err(|e| fail(StageError::Store(e)))?;

    let stage = MineStage::new(Box::new(ProcessMiner::from_env()));
    let stage_args = StageArgs {
        session_path: None,
        forge: args.forge_pipeline,
    };
    let report = StageRunner::run(&stage, &mut store, &stage_args).await;

    match report.outcome {
        Ok(StageOutput::Path(path)) => {
            println!(
                "{} Successfully mined data. You can find it here [{}].",
                timestamp(),
                path.display()
            );
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(err) => Err(fail(err)),
    }
}

async fn run_preprocess(args: PreprocessArgs) -> anyhow::Result<()> {
    let app_path = app_path_or_default(&args.app_path);
    let mut store = ConfigStore::load(&app_path).map_err(|e| fail(StageError::Store(e)))?;

    let mut source: Box<dyn ValueSource> = if args.forge_pipeline {
        Box::new(DefaultSource::new())
    } else {
        Box::new(InteractiveSource)
    };
    let session =
        session::resolve_session_path(&store, args.session_path.as_deref(), source.as_mut())
            .map_err(fail)?;

    let stage = PreprocessStage::new(Box::new(ProcessPreprocessor::from_env()));
    let stage_args = StageArgs {
        session_path: Some(session),
        forge: args.forge_pipeline,
    };
    let report = StageRunner::run(&stage, &mut store, &stage_args).await;

    match report.outcome {
        Ok(StageOutput::Path(path)) => {
            println!(
                "{} Data is ready for training. You can find it here [{}].",
                timestamp(),
                path.display()
            );
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(err) => Err(fail(err)),
    }
}

async fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let app_path = app_path_or_default(&args.app_path);
    let mut store = ConfigStore::load(&app_path).map_err(|e| fail(StageError::Store(e)))?;

    let mut source: Box<dyn ValueSource> = if args.forge_pipeline {
        Box::new(DefaultSource::new())
    } else {
        Box::new(InteractiveSource)
    };
    let session =
        session::resolve_session_path(&store, args.session_path.as_deref(), source.as_mut())
            .map_err(fail)?;

    println!("{} Training model. This may take a while.", timestamp());

    // The handoff checkpoint blocks on a human answer even inside forge.
    let mut confirm_source = InteractiveSource;
    let outcome = pipeline::run_train_stage(
        &mut store,
        &session,
        Box::new(ProcessTrainer::from_env()),
        args.forge_pipeline,
        &mut confirm_source,
    )
    .await;

    match outcome {
        Ok(TrainOutcome::Trained(save)) => {
            println!(
                "{} Successfully trained and saved the model. You can find it here [{}].",
                timestamp(),
                save.url
            );
            Ok(())
        }
        Ok(TrainOutcome::HandedOff { handoff, save }) => {
            println!(
                "{} External training confirmed; model recorded as [{}]. Handoff package remains at [{}].",
                timestamp(),
                save.url,
                handoff.display()
            );
            Ok(())
        }
        Err(err) => {
            if matches!(err, StageError::ResourceExhaustion(_)) {
                eprintln!(
                    "Training ran out of memory. A handoff package was exported under the \
session's colab directory; finish the run on external compute, then re-run `train` or `activate`."
                );
            }
            Err(fail(err))
        }
    }
}

async fn run_activate(args: ActivateArgs) -> anyhow::Result<()> {
    let app_path = default_app_path();
    let mut store = ConfigStore::load(&app_path).map_err(|e| fail(StageError::Store(e)))?;
    let saves = registry::list(&store).map_err(fail)?;

    let index = match args.model_idx {
        Some(index) => index,
        None if args.forge_pipeline => 0,
        None => choose_model_save(&saves).map_err(fail)?,
    };
    let save = registry::select(&store, index).map_err(fail)?;

    println!("{} Activating bot with model [{}].", timestamp(), save.url);
    let stage = ActivateStage::new(Box::new(ProcessActivator::from_env()), save);
    let stage_args = StageArgs {
        session_path: None,
        forge: args.forge_pipeline,
    };
    let report = StageRunner::run(&stage, &mut store, &stage_args).await;
    report.outcome.map_err(fail)?;
    Ok(())
}

async fn run_forge() -> anyhow::Result<()> {
    println!(
        "{} Forging a bot from scratch: init, mine, preprocess, train, activate.",
        timestamp()
    );

    let executor = ProcessExecutor::current().map_err(fail)?;
    let mut orchestrator = PipelineOrchestrator::new(executor);
    orchestrator.run().await.map_err(fail)?;

    println!("{} Forge complete.", timestamp());
    Ok(())
}

async fn run_poduction_env() -> anyhow::Result<()> {
    let app_path = default_app_path();
    let store = ConfigStore::load(&app_path).map_err(|e| fail(StageError::Store(e)))?;
    let saves = registry::list(&store).map_err(fail)?;

    let index = choose_model_save(&saves).map_err(fail)?;
    let save = registry::select(&store, index).map_err(fail)?;
    let session = session::session_dir(&store).map_err(fail)?;
    let env_path = export::write_deploy_env(&session, &store, &save).map_err(fail)?;

    println!(
        "{} Successfully generated the environment file. It is located here [{}].",
        timestamp(),
        env_path.display()
    );
    Ok(())
}

async fn run_config(args: ConfigArgs) -> anyhow::Result<()> {
    let app_path = app_path_or_default(&args.app_path);
    let store = ConfigStore::load(&app_path).map_err(|e| fail(StageError::Store(e)))?;

    match store.raw_contents() {
        Ok(contents) => {
            println!("{contents}");
            Ok(())
        }
        Err(err) => Err(fail(StageError::Store(err))),
    }
}

/// Interactive model-save menu; collects an in-bounds index.
fn choose_model_save(saves: &[registry::ModelSave]) -> Result<usize, StageError> {
    if saves.is_empty() {
        return Err(StageError::Index { index: 0, len: 0 });
    }

    println!("Available model saves:");
    for (index, save) in saves.iter().enumerate() {
        println!(
            "  {index}) {} (context_length={})",
            save.url, save.context_length
        );
    }

    let len = saves.len();
    prompt::resolve(
        &mut InteractiveSource,
        "Model index",
        0usize,
        |index: &usize| *index < len,
    )
    .map_err(|e| StageError::Other(anyhow::anyhow!("selecting model save: {e}")))
}

/// Timestamp-based default session name.
fn default_session_name() -> String {
    chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string()
}

/// Suggested model name for first-time initialization.
fn suggested_model_name() -> String {
    format!("mimic-{}", rand::random::<u32>() % 1000)
}
