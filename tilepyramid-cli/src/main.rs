//! TilePyramid CLI - Command-line interface
//!
//! This binary provides a command-line interface to the TilePyramid library.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use commands::generate::GenerateArgs;

#[derive(Parser)]
#[command(name = "tilepyramid")]
#[command(version = tilepyramid::VERSION)]
#[command(about = "Render map tile pyramids, skipping empty areas", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a tile pyramid for a bounding box or a tile list
    Generate(Box<GenerateArgs>),

    /// Write the default configuration file (~/.tilepyramid/config.ini)
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// List the named bounding boxes from config.ini
    Bboxes,

    /// Serve worker orders over stdin/stdout (started by process pools)
    #[command(hide = true)]
    Worker {
        /// Enable debug logging
        #[arg(short = 'd', long)]
        debug: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate(args) => commands::generate::run(*args),
        Commands::Init { force } => commands::init::run(force),
        Commands::Bboxes => commands::bboxes::run(),
        Commands::Worker { debug } => commands::worker::run(debug),
    };

    if let Err(e) = result {
        e.exit();
    }
}
