use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reel_composer::assets::ClipStore;
use reel_composer::config::Config;
use reel_composer::gemini::{AspectRatio, GeminiClient, ImagePayload, GEMINI_API_KEY_ENV};
use reel_composer::history::History;
use reel_composer::ledger::{Wallet, VIDEO_COST};
use reel_composer::persona::{self, Persona};
use reel_composer::pipeline::Composer;
use reel_composer::plan::{MarketingMetrics, Plan, SceneStatus};
use reel_composer::planner::PlanRequest;
use reel_composer::stitcher::FfmpegConcatenator;
use reel_composer::storage::JsonFileStorage;

/// Parse and validate an aspect ratio argument.
fn parse_aspect(s: &str) -> Result<AspectRatio, String> {
    s.parse()
}

/// reel-composer: AI video commercial composer
#[derive(Parser)]
#[command(name = "reel-composer")]
#[command(version, about = "AI video commercial composer")]
#[command(long_about = "Draft a shot-by-shot script with a generative text model, \
    generate one clip per scene with a generative video model, and stitch the \
    clips into a single commercial.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Draft, review, generate, and stitch a commercial from a brief
    #[command(after_help = "EXAMPLES:
    # A 15-second spot drafted by the director persona
    reel-composer compose \"a 15 second ad for a cold brew coffee brand\"

    # Vertical campaign video with the marketer persona
    reel-composer compose -p marketer \"promote our new sneaker drop\"

    # Animate a product photo into the first scene
    reel-composer compose --image product.png \"a 10 second teaser\"

    # Pick up a failed run where it stopped
    reel-composer compose --resume 6f9619ff-8b86-4d01-b42d-00cf4fc964ff

ENVIRONMENT:
    GEMINI_API_KEY    Required. Your generative API key.")]
    Compose {
        /// Free-form brief, e.g. "a 15 second ad for a coffee brand"
        #[arg(required_unless_present = "resume")]
        brief: Option<String>,

        /// Seed image for the first scene (png, jpg, webp, or gif)
        #[arg(long, short = 'i')]
        image: Option<PathBuf>,

        /// Persona drafting the plan (director, marketer, storyteller)
        #[arg(long, short = 'p')]
        persona: Option<String>,

        /// Output aspect ratio (16:9 or 9:16)
        #[arg(long, short = 'a', value_parser = parse_aspect)]
        aspect: Option<AspectRatio>,

        /// Copy the stitched video to this path
        #[arg(long, short = 'O')]
        output: Option<PathBuf>,

        /// Wallet account to charge
        #[arg(long, short = 'u', default_value = "local")]
        user: String,

        /// Skip the review confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,

        /// Resume a saved plan by id instead of drafting a new one
        #[arg(long, conflicts_with = "brief")]
        resume: Option<String>,

        /// Custom config file path (default: ~/.config/reel-composer/config.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// List saved plans
    History,

    /// Inspect or top up a wallet balance
    #[command(after_help = "EXAMPLES:
    reel-composer wallet show
    reel-composer wallet add 50 --user me@example.com")]
    Wallet {
        #[command(subcommand)]
        action: WalletAction,

        /// Wallet account to operate on
        #[arg(long, short = 'u', default_value = "local")]
        user: String,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Print the current balance
    Show,
    /// Add funds to the balance
    Add {
        /// Amount in currency units
        amount: u64,
    },
}

fn load_env() {
    // A missing .env file is fine; the key may come from the environment.
    let _ = dotenv::dotenv();
}

fn load_config(explicit: Option<&PathBuf>) -> Result<Config, String> {
    match explicit {
        Some(path) => Config::load_from_explicit(path).map_err(|e| e.to_string()),
        None => match Config::load() {
            Ok(config) => Ok(config),
            Err(e) => {
                eprintln!("Warning: {}", e);
                eprintln!("Using default settings.\n");
                Ok(Config::default())
            }
        },
    }
}

fn storage_for(config: &Config) -> JsonFileStorage {
    match &config.storage.data_dir {
        Some(dir) => JsonFileStorage::new(dir.clone()),
        None => JsonFileStorage::with_default_dir(),
    }
}

fn missing_key_help() -> String {
    format!(
        "{} environment variable is not set.\n\n\
         Add your API key to a .env file:\n\
         \x20   echo '{}=your-api-key-here' >> .env\n\n\
         Or set it as an environment variable:\n\
         \x20   export {}=\"your-api-key-here\"",
        GEMINI_API_KEY_ENV, GEMINI_API_KEY_ENV, GEMINI_API_KEY_ENV
    )
}

fn build_client(config: &Config) -> Result<GeminiClient, String> {
    let api_key = std::env::var(GEMINI_API_KEY_ENV).map_err(|_| missing_key_help())?;
    let mut client =
        GeminiClient::with_base_url(api_key, config.base_url()).map_err(|e| e.to_string())?;
    client.set_models(config.script_model(), config.video_model());
    client.set_poll_interval(config.poll_interval());
    Ok(client)
}

fn status_tag(status: SceneStatus) -> &'static str {
    match status {
        SceneStatus::Pending => "pending",
        SceneStatus::Generating => "generating",
        SceneStatus::Completed => "completed",
        SceneStatus::Failed => "failed",
    }
}

fn print_plan(plan: &Plan) {
    println!();
    println!("Plan: {}", plan.title);
    println!("  id: {}", plan.id);
    for scene in &plan.scenes {
        println!();
        println!("  Scene {} [{}]", scene.number, status_tag(scene.status));
        println!("    script: {}", scene.script);
        println!("    prompt: {}", scene.prompt);
        if let Some(error) = &scene.error {
            println!("    error:  {}", error);
        }
    }
    println!();
    println!(
        "  Estimated duration: {}s   Cost: {} credits",
        plan.scenes.len() * 5,
        VIDEO_COST
    );
    println!();
}

fn confirm_render() -> bool {
    print!("Render this plan for {} credits? [y/N] ", VIDEO_COST);
    use std::io::Write as _;
    std::io::stdout().flush().ok();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

#[allow(clippy::too_many_arguments)]
fn run_compose(
    brief: Option<String>,
    image: Option<PathBuf>,
    persona_id: Option<String>,
    aspect: Option<AspectRatio>,
    output: Option<PathBuf>,
    user: String,
    yes: bool,
    resume: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<(), String> {
    let config = load_config(config_path.as_ref())?;
    let storage = storage_for(&config);
    let wallet = Wallet::new(&storage);
    let history = History::new(&storage);

    let client = build_client(&config)?;

    let persona: &Persona = match &persona_id {
        Some(id) => persona::find(id).ok_or_else(|| {
            let known: Vec<&str> = persona::PERSONAS.iter().map(|p| p.id).collect();
            format!("Unknown persona '{}'. Available: {}", id, known.join(", "))
        })?,
        None => persona::default_persona(),
    };

    let seed_image = match &image {
        Some(path) => Some(ImagePayload::from_file(path).map_err(|e| e.to_string())?),
        None => None,
    };

    let aspect = aspect
        .or_else(|| {
            config
                .generation
                .aspect_ratio
                .as_deref()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or_else(|| persona.default_aspect_ratio());

    let mut composer = Composer::new(client, ClipStore::with_default_dir());
    composer.set_retry_policy(config.retry_policy());
    composer.set_aspect_ratio(aspect);
    composer.set_seed_image(seed_image);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        // Either load a saved plan or draft a new one.
        if let Some(id) = &resume {
            let id = id
                .parse()
                .map_err(|_| format!("'{}' is not a valid plan id", id))?;
            let entry = history
                .find(id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("No saved plan with id {}", id))?;
            println!(
                "Resuming \"{}\" ({})",
                entry.plan.title,
                entry.plan.progress_summary()
            );
            composer.load_plan(entry.plan);
        } else {
            let brief = brief
                .as_deref()
                .expect("clap requires a brief without --resume");
            let metrics = persona.uses_marketing_data().then(MarketingMetrics::demo);
            let request = PlanRequest {
                brief,
                has_seed_image: image.is_some(),
                persona,
                metrics: metrics.as_ref(),
            };

            println!("Drafting a plan with {}...", persona.name);
            composer.draft(&request).await.map_err(|e| e.to_string())?;
        }

        print_plan(composer.plan().expect("plan is loaded"));

        if !yes && !confirm_render() {
            println!("Cancelled. The draft stays in your history:");
            println!(
                "    reel-composer compose --resume {}",
                composer.plan().unwrap().id
            );
            history
                .upsert(composer.plan().unwrap(), None)
                .map_err(|e| e.to_string())?;
            return Ok(());
        }

        // The draft is saved before generation so a failed run can resume.
        history
            .upsert(composer.plan().unwrap(), None)
            .map_err(|e| e.to_string())?;

        let charged = wallet
            .charge(&user, VIDEO_COST)
            .map_err(|e| e.to_string())?;
        if !charged {
            let balance = wallet.balance(&user).map_err(|e| e.to_string())?;
            return Err(format!(
                "Insufficient funds: balance is {} but a render costs {}.\n\
                 Top up with: reel-composer wallet add {} --user {}",
                balance, VIDEO_COST, VIDEO_COST, user
            ));
        }

        println!(
            "Generating {} scenes...",
            composer.plan().unwrap().scenes.len()
        );
        let generation = composer.generate().await;

        // Persist per-scene progress whether or not the pass succeeded.
        history
            .upsert(composer.plan().unwrap(), None)
            .map_err(|e| e.to_string())?;

        if let Err(e) = generation {
            print_plan(composer.plan().unwrap());
            let message = composer
                .last_error()
                .map(String::from)
                .unwrap_or_else(|| e.to_string());
            return Err(format!(
                "{}\n\nCompleted scenes are saved. Resume with:\n\
                 \x20   reel-composer compose --resume {}",
                message,
                composer.plan().unwrap().id
            ));
        }

        println!("Stitching...");
        let stitched = composer
            .stitch(&FfmpegConcatenator::new())
            .await
            .map_err(|e| e.to_string())?;

        let final_path = match &output {
            Some(path) => {
                std::fs::copy(&stitched, path)
                    .map_err(|e| format!("Failed to copy output to {}: {}", path.display(), e))?;
                path.clone()
            }
            None => stitched,
        };

        history
            .upsert(composer.plan().unwrap(), Some(final_path.clone()))
            .map_err(|e| e.to_string())?;

        println!();
        println!("Done! {}", final_path.display());
        Ok(())
    })
}

fn run_history() -> Result<(), String> {
    let config = load_config(None)?;
    let storage = storage_for(&config);
    let history = History::new(&storage);

    let entries = history.entries().map_err(|e| e.to_string())?;
    if entries.is_empty() {
        println!("No saved plans yet.");
        return Ok(());
    }

    for entry in entries {
        let state = if entry.output.is_some() {
            "ready"
        } else {
            "draft"
        };
        println!(
            "{}  [{}]  {}  ({})",
            entry.plan.id,
            state,
            entry.plan.title,
            entry.plan.progress_summary()
        );
    }
    Ok(())
}

fn run_wallet(action: WalletAction, user: String) -> Result<(), String> {
    let config = load_config(None)?;
    let storage = storage_for(&config);
    let wallet = Wallet::new(&storage);

    match action {
        WalletAction::Show => {
            let balance = wallet.balance(&user).map_err(|e| e.to_string())?;
            println!("Balance for {}: {} credits", user, balance);
        }
        WalletAction::Add { amount } => {
            let balance = wallet
                .add_funds(&user, amount)
                .map_err(|e| e.to_string())?;
            println!("Added {} credits. Balance for {}: {}", amount, user, balance);
        }
    }
    Ok(())
}

fn main() {
    load_env();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compose {
            brief,
            image,
            persona,
            aspect,
            output,
            user,
            yes,
            resume,
            config,
        } => run_compose(
            brief, image, persona, aspect, output, user, yes, resume, config,
        ),
        Commands::History => run_history(),
        Commands::Wallet { action, user } => run_wallet(action, user),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
