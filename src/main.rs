use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use parley_chat::inputs::{Field, PromptInputs};
use parley_chat::prompts::Prompts;
use parley_chat::tokenizer::{count_tokens, fits_request_budget};
use parley_chat::{Bot, ChatReply};
use parley_core::{
    ConversationIds, Credentials, EntryPoint, ModelOptions, OutputFormat, ParleyConfig,
};

#[derive(Parser)]
#[command(
    name = "parley",
    version,
    about = "LLM conversation layer for pull-request review bots",
    long_about = "Parley talks to an OpenAI-compatible backend on behalf of a review pipeline.\n\n\
                   Examples:\n  \
                     parley chat 'Summarize this diff'           One turn with the light model\n  \
                     parley chat --heavy --parent-message-id ID  Continue a thread saved in bot.history_file\n  \
                     git diff | parley tokens                    Count tokens against the budget\n  \
                     parley render --prompt review --filename f  Render a built-in prompt\n  \
                     parley route pull_request                   Show which flow an event runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .parley.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Send one or more messages to the backend
    #[command(long_about = "Send one or more messages to the backend.\n\n\
        A single message continues the thread named by --parent-message-id and\n\
        --conversation-id. Earlier turns are replayed from the history file\n\
        (--history or bot.history_file), so a thread can span several runs.\n\
        Several messages start independent conversations and run concurrently,\n\
        bounded by bot.concurrency_limit. Reads stdin when no message is given.")]
    Chat {
        /// Messages to send
        messages: Vec<String>,

        /// Use the heavy (review) model instead of the light (summary) model
        #[arg(long)]
        heavy: bool,

        /// Message the turn attaches to; must be in the history file
        #[arg(long)]
        parent_message_id: Option<String>,

        /// Conversation the parent message belongs to
        #[arg(long)]
        conversation_id: Option<String>,

        /// History file to replay and extend (default: bot.history_file)
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Count tokens and check them against a model's request budget
    Tokens {
        /// Read input from file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,

        /// Model whose budget to check (default: bot.heavy_model)
        #[arg(long)]
        model: Option<String>,
    },
    /// Render a prompt template
    Render {
        /// Template file
        #[arg(long, conflicts_with = "prompt", required_unless_present = "prompt")]
        template: Option<PathBuf>,

        /// Built-in or configured prompt to render instead of a template file
        #[arg(long, value_enum)]
        prompt: Option<PromptKind>,

        /// Pull request title
        #[arg(long)]
        title: Option<String>,

        /// Pull request description
        #[arg(long)]
        description: Option<String>,

        /// File holding the diff
        #[arg(long)]
        diff: Option<PathBuf>,

        /// File name under review
        #[arg(long)]
        filename: Option<String>,

        /// File holding the full file content
        #[arg(long)]
        file_content: Option<PathBuf>,

        /// Comment that needs a reply
        #[arg(long)]
        comment: Option<String>,

        /// Earlier comments in the thread
        #[arg(long)]
        comment_chain: Option<String>,

        /// Short summary of the whole change
        #[arg(long)]
        short_summary: Option<String>,

        /// Concatenated per-file summaries
        #[arg(long)]
        raw_summary: Option<String>,

        /// File holding the annotated hunks
        #[arg(long)]
        patches: Option<PathBuf>,
    },
    /// Show which review flow an event routes to
    Route {
        /// Event name (default: $GITHUB_EVENT_NAME)
        event: Option<String>,
    },
    /// Create a default .parley.toml
    Init,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Prompts `parley render --prompt` can produce.
#[derive(Clone, Copy, ValueEnum)]
enum PromptKind {
    /// Per-file diff summary with triage verdict
    SummarizeFileDiff,
    /// Final summary from `[prompts] summarize`
    Summarize,
    /// Release notes from `[prompts] summarize_release_notes`
    ReleaseNotes,
    /// Per-file review of annotated hunks
    Review,
    /// Reply within a review-comment thread
    Comment,
}

impl PromptKind {
    fn render(self, prompts: &Prompts, inputs: &PromptInputs) -> String {
        match self {
            Self::SummarizeFileDiff => prompts.render_summarize_file_diff(inputs),
            Self::Summarize => prompts.render_summarize(inputs),
            Self::ReleaseNotes => prompts.render_summarize_release_notes(inputs),
            Self::Review => prompts.render_review_file_diff(inputs),
            Self::Comment => prompts.render_comment(inputs),
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# Parley Configuration

[bot]
# debug = false
# light_model = "gpt-3.5-turbo"
# heavy_model = "gpt-4"
# model_temperature = 0.05
# retries = 5
# timeout_ms = 360000
# retry_backoff_ms = 0
# concurrency_limit = 6
# base_url = "https://api.openai.com/v1"
# language = "en-US"
# system_message = "You are a highly experienced software engineer..."
# history_limit = 10000
# history_file = ".parley/history.json"

[review]
# disable_review = false
# disable_release_notes = false
# max_files = 150
# review_simple_changes = false
# review_comment_lgtm = false
# path_filters = ["!dist/**", "!**/*.lock"]
# github_concurrency_limit = 6

[prompts]
# summarize = "Summarize the changes: $raw_summary"
# summarize_release_notes = "Write release notes for: $title"
"#;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ParleyConfig> {
    let config = match path {
        Some(path) => ParleyConfig::from_file(path)?,
        None => {
            let default_path = Path::new(".parley.toml");
            if default_path.exists() {
                ParleyConfig::from_file(default_path)?
            } else {
                ParleyConfig::default()
            }
        }
    };
    Ok(config)
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err(format!("reading {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .into_diagnostic()
                .wrap_err("reading stdin")?;
            Ok(input)
        }
    }
}

fn credentials() -> Credentials {
    Credentials::from_lookup(|name| std::env::var(name).ok())
}

fn create_bot(config: &ParleyConfig, model: &str, role: &str) -> Option<Bot> {
    let today = Utc::now().date_naive();
    match Bot::new(&config.bot, &ModelOptions::new(model), &credentials(), today) {
        Ok(bot) => Some(bot),
        Err(e) => {
            warn!("Skipped: failed to create {role} bot, please check your API key: {e}");
            None
        }
    }
}

async fn run_chat(
    config: &ParleyConfig,
    format: OutputFormat,
    mut messages: Vec<String>,
    heavy: bool,
    ids: ConversationIds,
) -> Result<()> {
    let (model, role) = if heavy {
        (config.bot.heavy_model.as_str(), "review")
    } else {
        (config.bot.light_model.as_str(), "summary")
    };
    let today = Utc::now().date_naive();
    let bot = Bot::new(&config.bot, &ModelOptions::new(model), &credentials(), today)
        .map_err(|e| {
            miette::miette!(
                help = format!(
                    "export {}=... before running parley chat",
                    Credentials::API_KEY_VAR
                ),
                "failed to create {role} bot: {e}"
            )
        })?;

    if messages.is_empty() {
        messages.push(read_input(None)?);
    }

    let replies: Vec<ChatReply> = if messages.len() == 1 {
        vec![bot.chat(&messages[0], &ids).await]
    } else {
        if !ids.is_empty() {
            warn!("ignoring conversation ids: several messages start independent conversations");
        }
        let bot = Arc::new(bot);
        let limit = Arc::new(Semaphore::new(config.bot.concurrency_limit.max(1)));
        let mut tasks = JoinSet::new();
        for (index, message) in messages.into_iter().enumerate() {
            let bot = Arc::clone(&bot);
            let limit = Arc::clone(&limit);
            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await.ok();
                (index, bot.chat(&message, &ConversationIds::default()).await)
            });
        }
        let mut indexed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            indexed.push(joined.into_diagnostic()?);
        }
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, reply)| reply).collect()
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&replies).into_diagnostic()?
            );
        }
        OutputFormat::Text => {
            for reply in &replies {
                if reply.is_empty() {
                    println!("(no response)");
                } else {
                    println!("{}", reply.text);
                }
                if let Some(id) = &reply.ids.parent_message_id {
                    println!("parent_message_id: {id}");
                }
                if let Some(id) = &reply.ids.conversation_id {
                    println!("conversation_id: {id}");
                }
            }
        }
    }
    Ok(())
}

fn run_tokens(
    config: &ParleyConfig,
    format: OutputFormat,
    file: Option<&Path>,
    model: Option<&str>,
) -> Result<()> {
    let input = read_input(file)?;
    let model = ModelOptions::new(model.unwrap_or(&config.bot.heavy_model));
    let tokens = count_tokens(&input);
    let fits = fits_request_budget(&input, &model.token_limits);

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "model": model.model,
                "tokens": tokens,
                "requestTokens": model.token_limits.request_tokens,
                "fits": fits,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Text => {
            println!("{tokens} tokens");
            println!("{} ({})", model.model, model.token_limits);
            if fits {
                println!("fits in request budget");
            } else {
                println!("exceeds request budget; split the input");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Chat {
            messages,
            heavy,
            parent_message_id,
            conversation_id,
            history,
        } => {
            let mut config = config;
            if history.is_some() {
                config.bot.history_file = history;
            }
            if parent_message_id.is_some() && config.bot.history_file.is_none() {
                warn!("no history file configured; the parent's earlier turns cannot be replayed");
            }
            let ids = ConversationIds::new(parent_message_id, conversation_id);
            run_chat(&config, cli.format, messages, heavy, ids).await?;
        }
        Command::Tokens {
            ref file,
            ref model,
        } => {
            run_tokens(&config, cli.format, file.as_deref(), model.as_deref())?;
        }
        Command::Render {
            ref template,
            prompt,
            title,
            description,
            ref diff,
            filename,
            ref file_content,
            comment,
            comment_chain,
            short_summary,
            raw_summary,
            ref patches,
        } => {
            let mut inputs =
                PromptInputs::default().with(Field::SystemMessage, &config.bot.system_message);
            let text_fields = [
                (Field::Title, title),
                (Field::Description, description),
                (Field::Filename, filename),
                (Field::Comment, comment),
                (Field::CommentChain, comment_chain),
                (Field::ShortSummary, short_summary),
                (Field::RawSummary, raw_summary),
            ];
            for (field, value) in text_fields {
                if let Some(value) = value {
                    inputs = inputs.with(field, value);
                }
            }
            if let Some(path) = diff {
                let content = read_input(Some(path.as_path()))?;
                inputs = inputs
                    .with(Field::Diff, content.clone())
                    .with(Field::FileDiff, content);
            }
            if let Some(path) = file_content {
                inputs = inputs.with(Field::FileContent, read_input(Some(path.as_path()))?);
            }
            if let Some(path) = patches {
                inputs = inputs.with(Field::Patches, read_input(Some(path.as_path()))?);
            }

            let rendered = match (prompt, template) {
                (Some(kind), _) => kind.render(&Prompts::from_config(&config.prompts), &inputs),
                (None, Some(path)) => inputs.render(&read_input(Some(path.as_path()))?),
                (None, None) => miette::bail!("either --template or --prompt is required"),
            };
            print!("{rendered}");
        }
        Command::Route { event } => {
            let event = event
                .or_else(|| std::env::var("GITHUB_EVENT_NAME").ok())
                .unwrap_or_default();

            let light = create_bot(&config, &config.bot.light_model, "summary");
            let heavy = create_bot(&config, &config.bot.heavy_model, "review");
            let (Some(light), Some(heavy)) = (light, heavy) else {
                return Ok(());
            };
            info!(light = light.model(), heavy = heavy.model(), "bots ready");

            match EntryPoint::from_event_name(&event) {
                Some(entry) => match cli.format {
                    OutputFormat::Json => {
                        let json = serde_json::json!({ "event": event, "entryPoint": entry });
                        println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
                    }
                    OutputFormat::Text => println!("{event} -> {entry}"),
                },
                None => {
                    warn!("Skipped: '{event}' is not a pull_request or pull_request_review_comment event");
                }
            }
        }
        Command::Init => {
            let path = Path::new(".parley.toml");
            if path.exists() {
                miette::bail!(".parley.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .parley.toml with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "parley", &mut std::io::stdout());
        }
    }

    Ok(())
}
