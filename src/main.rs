use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use repair_relay::config::{self, Config};
use repair_relay::corpus::{self, ApplyOutcome, FileKind};
use repair_relay::github::{self, GitHubClient, RepoId};
use repair_relay::llm::{CompletionClient, GeminiBackend, ModelProfile};
use repair_relay::session::{Mode, Speaker};
use repair_relay::store::SessionStore;
use repair_relay::util::truncate;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "repair-relay",
    about = "Ask questions about your files, or let the model draft, verify and repair a fix",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory holding the session (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question with the loaded files as context
    Ask(AskArgs),
    /// Run the draft, verify and refine repair loop
    Debug(DebugArgs),
    /// Add files or directories to the session
    Add(AddArgs),
    /// Remove a file by id, id prefix or name
    Remove { key: String },
    /// Replace a file's content by name (or add it), reading from --from or stdin
    Apply(ApplyArgs),
    /// List loaded files
    Files,
    /// Print the dependency graph as JSON
    Graph {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Pull text files from a GitHub repository (owner/repo or URL)
    Fetch(FetchArgs),
    /// Show the conversation so far
    History {
        /// Include reasoning traces
        #[arg(long)]
        traces: bool,
    },
    /// Forget the saved session
    Reset,
    /// Store the model API key in the system keychain
    Setup {
        /// Store a GitHub token for `fetch` instead
        #[arg(long)]
        github: bool,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ProfileArg {
    Fast,
    Deep,
}

impl From<ProfileArg> for ModelProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Fast => ModelProfile::Fast,
            ProfileArg::Deep => ModelProfile::Deep,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum KindArg {
    Source,
    Image,
    Log,
    Metric,
    Issue,
}

impl From<KindArg> for FileKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Source => FileKind::Source,
            KindArg::Image => FileKind::Image,
            KindArg::Log => FileKind::Log,
            KindArg::Metric => FileKind::Metric,
            KindArg::Issue => FileKind::Issue,
        }
    }
}

#[derive(Args, Debug)]
struct AskArgs {
    #[arg(required = true)]
    prompt: Vec<String>,
    #[arg(long, value_enum, default_value_t = ProfileArg::Fast)]
    profile: ProfileArg,
    /// Print the reasoning trace after the answer
    #[arg(long)]
    trace: bool,
}

#[derive(Args, Debug)]
struct DebugArgs {
    #[arg(required = true)]
    prompt: Vec<String>,
    #[arg(long)]
    trace: bool,
}

#[derive(Args, Debug)]
struct AddArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Declare the kind instead of inferring it from the extension
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    name: String,
    #[arg(long)]
    from: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Defaults to the GitHub remote of the project directory
    repo: Option<String>,
    #[arg(long)]
    cap: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = SessionStore::new(&cli.dir);
    let config = Config::load();

    match cli.command {
        Commands::Ask(args) => {
            let mode = Mode::Chat {
                profile: args.profile.into(),
            };
            submit(&store, &config, &args.prompt.join(" "), mode, args.trace).await
        }
        Commands::Debug(args) => {
            submit(&store, &config, &args.prompt.join(" "), Mode::Debug, args.trace).await
        }
        Commands::Add(args) => add_files(&store, &args).await,
        Commands::Remove { key } => {
            let mut locked = store.open()?;
            let id = locked
                .session
                .corpus
                .lookup(&key)
                .map(|f| f.id)
                .with_context(|| format!("No file matches '{}'", key))?;
            if let Some(removed) = locked.session.corpus.remove(id) {
                println!("  - {}", removed.name);
            }
            locked.save()
        }
        Commands::Apply(args) => {
            let content = match &args.from {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let mut locked = store.open()?;
            match locked.session.corpus.apply_change(&args.name, &content) {
                ApplyOutcome::Replaced(_) => println!("  ~ {}", args.name),
                ApplyOutcome::Added(_) => println!("  + {}", args.name),
            }
            locked.save()
        }
        Commands::Files => {
            let session = store.load()?;
            if session.corpus.is_empty() {
                println!("  No files loaded. Add some with `repair-relay add <path>`.");
            }
            for file in session.corpus.files() {
                let id = file.id.to_string();
                println!(
                    "  {}  {:<6}  {}",
                    &id[..8],
                    file.kind.as_str(),
                    file.name
                );
            }
            Ok(())
        }
        Commands::Graph { output } => {
            let session = store.load()?;
            let json = session.graph().to_json()?;
            match output {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display())),
                None => {
                    println!("{}", json);
                    Ok(())
                }
            }
        }
        Commands::Fetch(args) => fetch(&store, &config, &cli.dir, args).await,
        Commands::History { traces } => {
            let session = store.load()?;
            for turn in session.transcript.turns() {
                let who = match turn.speaker {
                    Speaker::User => "you",
                    Speaker::Agent => "agent",
                };
                println!(
                    "[{}] {}:",
                    turn.created_at.format("%Y-%m-%d %H:%M:%S"),
                    who
                );
                println!("{}", turn.visible_text);
                if traces {
                    if let Some(trace) = &turn.reasoning_trace {
                        println!("\n<reasoning>\n{}\n</reasoning>", trace);
                    }
                }
                println!();
            }
            Ok(())
        }
        Commands::Reset => {
            if store.reset()? {
                println!("  Session cleared.");
            } else {
                println!("  Nothing to clear.");
            }
            Ok(())
        }
        Commands::Setup { github: true } => github::setup_token_interactive(),
        Commands::Setup { github: false } => {
            config::setup_api_key_interactive()?;
            config.save()?;
            println!("  Config: {}", Config::config_location());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    // RUST_LOG takes precedence; --verbose falls back to DEBUG
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

fn build_client(config: &Config) -> Result<CompletionClient<GeminiBackend>> {
    let api_key = config::get_api_key().with_context(|| {
        format!(
            "No API key configured. Run `repair-relay setup` or set {}.",
            config::API_KEY_ENV
        )
    })?;
    let backend = GeminiBackend::new(api_key, &config.api_base_url, config.request_timeout_secs)?;
    Ok(CompletionClient::new(backend, config.model_map()).with_retry_policy(config.retry_policy()))
}

async fn submit(
    store: &SessionStore,
    config: &Config,
    prompt: &str,
    mode: Mode,
    show_trace: bool,
) -> Result<()> {
    let client = build_client(config)?;
    // Held across the model call so a concurrent command can't drop this turn
    let mut locked = store.open()?;
    if matches!(mode, Mode::Debug) {
        eprintln!("  Drafting, verifying and, if needed, repairing...");
    }

    let turn = locked
        .session
        .submit(&client, prompt, mode, config.repair_budgets())
        .await;
    locked.save()?;

    println!("{}", turn.visible_text);
    if show_trace {
        if let Some(trace) = &turn.reasoning_trace {
            println!("\n<reasoning>\n{}\n</reasoning>", trace);
        }
    }
    Ok(())
}

async fn add_files(store: &SessionStore, args: &AddArgs) -> Result<()> {
    let kind = args.kind.map(FileKind::from);
    let mut locked = store.open()?;
    let session = &mut locked.session;
    let mut added = 0;
    for path in &args.paths {
        if path.is_dir() {
            let records = corpus::ingest_dir(path, kind).await?;
            for record in records {
                println!("  + {} ({})", record.name, record.kind.as_str());
                session.corpus.add(record);
                added += 1;
            }
            continue;
        }
        let name = display_name(path);
        match corpus::ingest_path(path, &name, kind).await {
            Ok(record) => {
                println!("  + {} ({})", record.name, record.kind.as_str());
                session.corpus.add(record);
                added += 1;
            }
            Err(err) => eprintln!("  Skipped {}: {}", path.display(), truncate(&format!("{:#}", err), 160)),
        }
    }
    let loaded = session.corpus.len();
    locked.save()?;
    println!("  {} file(s) added, {} loaded.", added, loaded);
    Ok(())
}

async fn fetch(store: &SessionStore, config: &Config, dir: &Path, args: FetchArgs) -> Result<()> {
    let repo = match args.repo.as_deref() {
        Some(input) => RepoId::parse(input)
            .with_context(|| format!("'{}' is not owner/repo or a GitHub URL", input))?,
        None => github::get_remote_info(dir)?,
    };
    let cap = args.cap.unwrap_or(config.github_file_cap);

    eprintln!("  Fetching {} ...", repo);
    let client = GitHubClient::new(github::get_stored_token())?;
    let records = client.fetch_repo(&repo, cap).await?;

    let mut locked = store.open()?;
    for record in &records {
        println!("  + {} ({})", record.name, record.kind.as_str());
    }
    let count = records.len();
    locked.session.corpus.extend(records);
    locked.save()?;
    println!("  {} file(s) fetched from {}.", count, repo);
    Ok(())
}

/// Path as typed, with forward slashes so it can match import references.
fn display_name(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    raw.strip_prefix("./").unwrap_or(&raw).to_string()
}
