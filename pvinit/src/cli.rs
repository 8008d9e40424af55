use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pvinit", version, about = "PV initializer controller CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the initializer controller with a config file
    Start {
        #[arg(short, long)]
        config: PathBuf,

        /// Override the initializer name to answer to
        #[arg(long)]
        initializer_name: Option<String>,

        /// Override the annotation stamped on initialized volumes
        #[arg(long)]
        annotation: Option<String>,

        /// Override the attribute configmap name
        #[arg(long)]
        configmap: Option<String>,

        /// Override the attribute configmap namespace
        #[arg(long)]
        namespace: Option<String>,
    },
}
