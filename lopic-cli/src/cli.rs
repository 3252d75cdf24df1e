use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lopic",
    version,
    about = "Command-line client for the lopic image host",
    long_about = "Log in to a lopic server, call its API with automatic token renewal, \
                  and watch upload and deletion events in real time."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LOPIC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server URL, overrides the configuration file
    #[arg(short, long, global = true, env = "LOPIC_SERVER")]
    pub server: Option<String>,

    /// Write daily-rotated log files to this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and save the session
    Login {
        /// Username or email
        username: String,

        /// Password (prompted when omitted)
        #[arg(long, env = "LOPIC_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// End the session and forget the saved credential
    Logout,

    /// Show the current session
    Status,

    /// GET an API path
    Get {
        /// API path, e.g. /api/images
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(long = "query", short = 'Q', value_parser = parse_key_val)]
        query: Vec<(String, String)>,
    },

    /// POST a JSON body to an API path
    Post {
        path: String,

        /// JSON request body
        #[arg(long, short)]
        data: Option<String>,
    },

    /// PUT a JSON body to an API path
    Put {
        path: String,

        /// JSON request body
        #[arg(long, short)]
        data: Option<String>,
    },

    /// DELETE an API path
    Delete { path: String },

    /// Print upload and deletion events as they arrive
    Watch {
        /// Only print these tags (e.g. upload_progress); repeatable
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value: no `=` found in `{s}`"))?;
    if key.is_empty() {
        return Err(format!("invalid key=value: empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
