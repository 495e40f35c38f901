use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use clausease::auth::{MasterDirectory, ResetDelivery, SessionKeys};
use clausease::config::{Config, LoggingConfig};
use clausease::db::libsql::{MasterStore, TenantStore};
use clausease::db::{
    ChatStore, DocumentStore, GlossaryStore, GlossaryTermParams, SimplificationLevel,
    TenantUserStore,
};
use clausease::legal::LexiconWordCounter;
use clausease::pipeline::{DocumentInput, DocumentPipeline, ModelRegistry, PASSTHROUGH_MODEL};
use clausease::reporting::AdminReports;
use clausease::settings::Settings;
use clausease::tenancy::{Provisioner, TenantLocator};

#[derive(Parser, Debug)]
#[command(name = "clausease", version, about = "Multi-tenant legal document store")]
struct Cli {
    /// Settings file (TOML). Defaults to ./clausease.toml when present.
    #[arg(long, env = "CLAUSEEASE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the master directory and tenant root.
    Init,
    /// Register an account and provision its tenant store.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CLAUSEEASE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Authenticate and print a session token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CLAUSEEASE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Print the claims of a session token.
    VerifyToken { token: String },
    /// Issue a password reset token.
    RequestReset {
        #[arg(long)]
        email: String,
    },
    /// Set a new password with a reset token.
    ResetPassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        token: String,
        #[arg(long, env = "CLAUSEEASE_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Ensure an account's tenant store exists.
    Provision {
        #[arg(long)]
        email: String,
    },
    #[command(subcommand)]
    Glossary(GlossaryCommand),
    #[command(subcommand)]
    Documents(DocumentsCommand),
    /// Store a processed document and update the tenant glossary.
    Ingest {
        #[arg(long)]
        email: String,
        #[arg(long)]
        title: String,
        /// File holding the original text.
        #[arg(long)]
        original: PathBuf,
        /// File holding an already simplified text. Skips the model.
        #[arg(long, conflicts_with = "model")]
        simplified: Option<PathBuf>,
        #[arg(long, default_value = PASSTHROUGH_MODEL)]
        model: String,
        #[arg(long, default_value = "intermediate")]
        level: SimplificationLevel,
    },
    #[command(subcommand)]
    Chat(ChatCommand),
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Subcommand, Debug)]
enum GlossaryCommand {
    List {
        #[arg(long)]
        email: String,
    },
    /// Add or update a term by hand.
    Add {
        #[arg(long)]
        email: String,
        term: String,
        definition: String,
        #[arg(long)]
        category: Option<String>,
    },
    Delete {
        #[arg(long)]
        email: String,
        term: String,
    },
}

#[derive(Subcommand, Debug)]
enum DocumentsCommand {
    List {
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand, Debug)]
enum ChatCommand {
    Show {
        #[arg(long)]
        email: String,
        #[arg(long)]
        document: i64,
    },
    Clear {
        #[arg(long)]
        email: String,
        #[arg(long)]
        document: i64,
    },
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    /// All accounts, newest first.
    Accounts,
    /// Documents across every tenant.
    Documents,
    /// User and document counts for one tenant.
    Counts {
        #[arg(long)]
        email: String,
    },
    /// Dump an allow-listed table. With --tenant, reads that tenant's store.
    Table {
        name: String,
        #[arg(long)]
        tenant: Option<String>,
    },
}

struct App {
    config: Config,
    directory: MasterDirectory,
    provisioner: Provisioner,
    reports: AdminReports,
}

impl App {
    async fn open(config: Config) -> anyhow::Result<Self> {
        let master = Arc::new(
            MasterStore::open(&config.storage.master_db_path)
                .await
                .context("opening master directory")?,
        );
        let locator = TenantLocator::new(config.storage.tenant_root.clone());
        Ok(Self {
            directory: MasterDirectory::new(master.clone(), &config.auth),
            provisioner: Provisioner::new(locator.clone(), master.clone()),
            reports: AdminReports::new(master, locator),
            config,
        })
    }

    /// Provision on access, then open the tenant's store.
    async fn tenant_store(&self, email: &str) -> anyhow::Result<TenantStore> {
        let account = self
            .directory
            .account_by_email(email)
            .await?
            .with_context(|| format!("no account registered for {email}"))?;
        anyhow::ensure!(!account.is_admin, "{email} is an admin account without a tenant store");
        Ok(self
            .provisioner
            .ensure_and_open(&account.email, account.id)
            .await?)
    }

    async fn tenant_user_id(&self, store: &TenantStore, email: &str) -> anyhow::Result<i64> {
        let email = self.directory.normalize_email(email)?.email;
        store
            .get_user_id(&email)
            .await?
            .with_context(|| format!("tenant store has no user row for {email}"))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}

async fn read_text(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    let config = Config::resolve(&settings)?;
    init_logging(&config.logging)?;

    let app = App::open(config).await?;
    run(&app, cli.command).await
}

async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init => {
            let root = &app.config.storage.tenant_root;
            tokio::fs::create_dir_all(root)
                .await
                .with_context(|| format!("creating tenant root {}", root.display()))?;
            tracing::info!(
                master = %app.config.storage.master_db_path.display(),
                tenants = %root.display(),
                "Storage initialized"
            );
        }
        Command::Register { email, password } => {
            let account = app.directory.register(&email, &password).await?;
            if !account.is_admin {
                app.provisioner
                    .ensure_tenant_store(&account.email, account.account_id)
                    .await?;
            }
            print_json(&serde_json::json!({
                "account_id": account.account_id,
                "email": account.email,
                "is_admin": account.is_admin,
                "tenant_mapped": account.tenant_mapped,
            }))?;
        }
        Command::Login { email, password } => {
            let keys = SessionKeys::from_config(&app.config.auth)?;
            let account = app.directory.authenticate(&email, &password).await?;
            if !account.is_admin {
                app.provisioner
                    .ensure_tenant_store(&account.email, account.account_id)
                    .await?;
            }
            let token = keys.issue(&account.email, account.account_id, account.is_admin)?;
            println!("{token}");
        }
        Command::VerifyToken { token } => {
            let keys = SessionKeys::from_config(&app.config.auth)?;
            print_json(&keys.verify(&token)?)?;
        }
        Command::RequestReset { email } => match app.directory.request_reset(&email).await? {
            ResetDelivery::Delivered => println!("reset token sent"),
            ResetDelivery::Surfaced(token) => println!("{token}"),
        },
        Command::ResetPassword {
            email,
            token,
            password,
        } => {
            app.directory
                .reset_with_token(&email, &token, &password)
                .await?;
            println!("password updated");
        }
        Command::Provision { email } => {
            let store = app.tenant_store(&email).await?;
            println!("{}", store.path().display());
        }
        Command::Glossary(cmd) => run_glossary(app, cmd).await?,
        Command::Documents(DocumentsCommand::List { email }) => {
            let store = app.tenant_store(&email).await?;
            print_json(&store.list_documents().await?)?;
        }
        Command::Ingest {
            email,
            title,
            original,
            simplified,
            model,
            level,
        } => {
            let store = app.tenant_store(&email).await?;
            let input = DocumentInput {
                user_id: app.tenant_user_id(&store, &email).await?,
                original_file_name: original
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned()),
                title,
                original_text: read_text(&original).await?,
                level,
            };
            let pipeline = DocumentPipeline::new(
                Arc::new(ModelRegistry::with_builtin()),
                Arc::new(LexiconWordCounter),
            );
            let report = match simplified {
                Some(path) => {
                    let text = read_text(&path).await?;
                    pipeline.record(&store, input, text).await?
                }
                None => pipeline.process(&store, &model, input).await?,
            };
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            print_json(&serde_json::json!({
                "document_id": report.document_id,
                "is_legal": report.is_legal,
                "original_word_count": report.original_word_count,
                "simplified_word_count": report.simplified_word_count,
                "glossary_inserted": report.glossary.inserted,
                "glossary_updated": report.glossary.updated,
                "glossary_kept_manual": report.glossary.kept_manual,
            }))?;
        }
        Command::Chat(ChatCommand::Show { email, document }) => {
            let store = app.tenant_store(&email).await?;
            let user_id = app.tenant_user_id(&store, &email).await?;
            print_json(&store.load_chat(document, user_id).await?)?;
        }
        Command::Chat(ChatCommand::Clear { email, document }) => {
            let store = app.tenant_store(&email).await?;
            let user_id = app.tenant_user_id(&store, &email).await?;
            let removed = store.delete_chat(document, user_id).await?;
            println!("{}", if removed { "cleared" } else { "no transcript" });
        }
        Command::Admin(cmd) => run_admin(app, cmd).await?,
    }
    Ok(())
}

async fn run_glossary(app: &App, command: GlossaryCommand) -> anyhow::Result<()> {
    match command {
        GlossaryCommand::List { email } => {
            let store = app.tenant_store(&email).await?;
            print_json(&store.list_glossary().await?)?;
        }
        GlossaryCommand::Add {
            email,
            term,
            definition,
            category,
        } => {
            let store = app.tenant_store(&email).await?;
            let entry = store
                .upsert_glossary_term(&GlossaryTermParams {
                    term,
                    definition,
                    category,
                })
                .await?;
            print_json(&entry)?;
        }
        GlossaryCommand::Delete { email, term } => {
            let store = app.tenant_store(&email).await?;
            if !store.delete_glossary_term(&term).await? {
                anyhow::bail!("term '{term}' is not in the glossary");
            }
        }
    }
    Ok(())
}

async fn run_admin(app: &App, command: AdminCommand) -> anyhow::Result<()> {
    match command {
        AdminCommand::Accounts => print_json(&app.reports.list_accounts().await?),
        AdminCommand::Documents => print_json(&app.reports.all_documents().await?),
        AdminCommand::Counts { email } => print_json(&app.reports.tenant_counts(&email).await?),
        AdminCommand::Table { name, tenant } => {
            let dump = match tenant {
                Some(email) => app.reports.read_tenant_table(&email, &name).await?,
                None => app.reports.read_master_table(&name).await?,
            };
            print_json(&dump)
        }
    }
}
