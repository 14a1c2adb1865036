use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tab-logger", version, about = "Browser activity logging daemon")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Append events to this file (selects the file sink)
    #[arg(long, conflicts_with = "endpoint")]
    pub log_file: Option<PathBuf>,

    /// Send events to this logging server (selects the HTTP sink)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Bridge listen address (overrides config file setting)
    #[arg(long)]
    pub listen: Option<String>,
}
