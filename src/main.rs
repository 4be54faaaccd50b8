// Entrypoint for the journal CLI.
// - Loads the config, resolves the user into a `Session`, then hands off
//   to the command loop until the user enters 0.
// - `init` and `add-user` manage the local database instead.

use anyhow::{Context, Result};
use journalapp::api::{HttpBackend, ReqwestBackend, Transport};
use journalapp::cli::{AdminCommand, CommandLineArgs};
use journalapp::config::{self, Config};
use journalapp::db::{self, SqliteUsers};
use journalapp::server::{JournalService, LocalGateway};
use journalapp::session::Session;
use journalapp::ui::{Console, Dispatcher, TerminalConsole};
use tracing_subscriber::{fmt::time::ChronoLocal, EnvFilter};

fn main() -> Result<()> {
    let args = CommandLineArgs::parse();
    init_tracing_subscriber(args.verbose());

    let config_path = args
        .config()
        .cloned()
        .unwrap_or_else(config::default_config_path);
    let config = Config::load(&config_path)?;

    match args.command() {
        Some(AdminCommand::Init) => {
            db::initialize_at(&config.database)?;
            println!("Database initialized at {}", config.database.display());
            return Ok(());
        }
        Some(AdminCommand::AddUser { username }) => {
            db::initialize_at(&config.database)?;
            let conn = db::connect(&config.database)
                .with_context(|| format!("Failed to open {}", config.database.display()))?;
            let id = db::add_user(&conn, username).context("Failed to add user")?;
            println!("{}", id);
            return Ok(());
        }
        None => {}
    }

    println!("** Welcome to JournalApp **");
    let mut console = TerminalConsole;

    let user_id = match args.user() {
        Some(id) => id.to_string(),
        None => console.prompt("Please enter your user ID")?,
    };
    let users = SqliteUsers::open(&config.database)?;
    let session = Session::resolve(&config.webservice, &user_id, &users)?;
    console.show(&format!("Welcome back, {}!", session.user().username));

    let backend: Box<dyn HttpBackend> = if args.local() {
        tracing::info!(db = %config.database.display(), "serving requests locally");
        Box::new(LocalGateway::new(
            session.base_url(),
            JournalService::new(config.database.clone()),
        ))
    } else {
        Box::new(ReqwestBackend::new()?)
    };

    let mut dispatcher = Dispatcher::new(session, Transport::new(backend), console);
    dispatcher.run();
    Ok(())
}

fn init_tracing_subscriber(verbose: bool) {
    let env_var = format!("{}_LOG_LEVEL", env!("CARGO_PKG_NAME").to_uppercase());
    let default_level = if verbose { "debug" } else { "warn" };
    let mut filter =
        EnvFilter::try_from_env(&env_var).unwrap_or_else(|_| EnvFilter::new(default_level));
    for directive in ["reqwest=warn", "hyper=warn", "rustls=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_timer(ChronoLocal::rfc_3339())
        .init();
}
