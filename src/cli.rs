use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about = "Bidirectional Discord / Stoat message mirror")]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
}
