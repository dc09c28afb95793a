//! Workboard CLI - serve and query Azure DevOps work item hierarchies.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;
use workboard::cli::{Cli, Commands, ConfigCommands};
use workboard::commands::{self, Output};
use workboard::config::{ConfigOverrides, ConfigPaths, ResolvedConfig, resolve_from_process_env};
use workboard::hierarchy::ClosureOptions;
use workboard::queries::Queries;
use workboard::server::{AppState, ServerInfo, start_server};
use workboard::store::{AdoClient, InMemoryStore, ItemStore, ProjectDirectory};
use workboard::{Error, Result};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "WB_LOG";
const DEFAULT_LOG_FILTER: &str = "workboard=info";

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    init_logging();

    if let Err(e) = run(cli) {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Where work items and project metadata come from for this invocation.
struct Backend {
    store: Arc<dyn ItemStore>,
    directory: Arc<dyn ProjectDirectory>,
    options: ClosureOptions,
}

impl Backend {
    /// A JSON fixture when given, otherwise the configured tracker.
    fn open(fixture: Option<&Path>, resolved: &ResolvedConfig) -> Result<Self> {
        let options = resolved.closure_options();
        match fixture {
            Some(path) => {
                let store = Arc::new(InMemoryStore::from_fixture_file(path)?);
                tracing::info!(path = %path.display(), items = store.len(), "using fixture store");
                Ok(Self {
                    store: store.clone(),
                    directory: store,
                    options,
                })
            }
            None => {
                let client = Arc::new(AdoClient::new(resolved.ado_settings()?).map_err(Error::store)?);
                Ok(Self {
                    store: client.clone(),
                    directory: client,
                    options,
                })
            }
        }
    }

    fn queries(&self) -> Queries<'_> {
        Queries::new(self.store.as_ref()).with_options(self.options)
    }
}

/// Settings shared by every command of one invocation.
struct Context {
    paths: ConfigPaths,
    overrides: ConfigOverrides,
    fixture: Option<PathBuf>,
}

impl Context {
    fn resolve(&self) -> Result<ResolvedConfig> {
        let config = self.paths.read_config()?;
        let state = self.paths.read_state()?;
        resolve_from_process_env(&config, &state, &self.overrides)
    }

    /// Runtime plus backend for a one-shot query.
    fn connect(&self) -> Result<(Runtime, Backend)> {
        let resolved = self.resolve()?;
        let backend = Backend::open(self.fixture.as_deref(), &resolved)?;
        Ok((Runtime::new()?, backend))
    }
}

fn run(cli: Cli) -> Result<()> {
    let human = cli.human_readable;
    let mut ctx = Context {
        paths: ConfigPaths::locate()?,
        overrides: ConfigOverrides {
            organization: cli.organization,
            project: cli.project,
            team: cli.team,
            ..ConfigOverrides::default()
        },
        fixture: cli.fixture,
    };

    match cli.command {
        Commands::Serve { host, port } => {
            ctx.overrides.host = host;
            ctx.overrides.port = port;
            let resolved = ctx.resolve()?;
            let backend = Backend::open(ctx.fixture.as_deref(), &resolved)?;
            let state = AppState {
                store: backend.store,
                directory: backend.directory,
                info: Arc::new(ServerInfo::new(
                    resolved.organization().map(str::to_string),
                    resolved.project().map(str::to_string),
                    resolved.is_configured(),
                )),
                options: backend.options,
            };
            Runtime::new()?.block_on(start_server(state, &resolved.host.value, resolved.port.value))?;
        }

        Commands::Tree {
            iteration,
            assigned_to,
        } => {
            let (rt, backend) = ctx.connect()?;
            let queries = backend.queries();
            let result = rt.block_on(commands::tree(&queries, &iteration, assigned_to.as_deref()))?;
            output(&result, human);
        }

        Commands::Items {
            work_item_type,
            iteration,
            assigned_to,
        } => {
            let (rt, backend) = ctx.connect()?;
            let queries = backend.queries();
            let result = rt.block_on(commands::items(
                &queries,
                work_item_type.as_deref(),
                iteration.as_deref(),
                assigned_to.as_deref(),
            ))?;
            output(&result, human);
        }

        Commands::Fetch { ids } => {
            let (rt, backend) = ctx.connect()?;
            let queries = backend.queries();
            let result = rt.block_on(commands::fetch(&queries, &ids))?;
            output(&result, human);
        }

        Commands::Children { id } => {
            let (rt, backend) = ctx.connect()?;
            let queries = backend.queries();
            let result = rt.block_on(commands::children(&queries, &id))?;
            output(&result, human);
        }

        Commands::Search {
            query,
            work_item_type,
        } => {
            let (rt, backend) = ctx.connect()?;
            let queries = backend.queries();
            let result = rt.block_on(commands::search(&queries, &query, work_item_type.as_deref()))?;
            output(&result, human);
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let resolved = ctx.resolve()?;
                output(&commands::config_show(&ctx.paths, &resolved), human);
            }
            ConfigCommands::Set { key, value } => {
                output(&commands::config_set(&ctx.paths, &key, &value)?, human);
            }
        },

        Commands::Version => output(&commands::version(), human),
    }

    Ok(())
}
