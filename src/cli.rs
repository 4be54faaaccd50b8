// Command line arguments: session flags plus the `init` and `add-user`
// admin subcommands for the local database.

use crate::config::CONFIG_PATH_ENV_VAR;
use std::ffi::OsString;
use std::path::PathBuf;

pub use clap::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(version, about = "Interactive client for the journal service", long_about = None)]
struct ClapArgs {
    /// Config file to use for this session.
    #[arg(short = 'c', long, env = CONFIG_PATH_ENV_VAR)]
    config: Option<PathBuf>,

    /// User id to sign in as. Prompted for when omitted.
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// Serve requests in-process against the configured database instead
    /// of calling the web service.
    #[arg(long, default_value_t = false)]
    local: bool,

    /// Print verbose messages.
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<AdminCommand>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Create the database schema if it does not exist.
    Init,
    /// Add a user and print the new id.
    AddUser { username: String },
}

#[derive(Debug, Clone)]
pub struct CommandLineArgs {
    config: Option<PathBuf>,
    user: Option<String>,
    local: bool,
    verbose: bool,
    command: Option<AdminCommand>,
}

impl From<ClapArgs> for CommandLineArgs {
    fn from(args: ClapArgs) -> Self {
        Self {
            config: args.config,
            user: args.user,
            local: args.local,
            verbose: args.verbose,
            command: args.command,
        }
    }
}

impl CommandLineArgs {
    pub fn parse() -> Self {
        ClapArgs::parse().into()
    }

    pub fn parse_from<I, T>(itr: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        ClapArgs::parse_from(itr).into()
    }

    pub fn config(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn command(&self) -> Option<&AdminCommand> {
        self.command.as_ref()
    }
}
