pub mod chunks;
pub mod fragment;
pub mod meta;
pub mod nav;
pub mod search;
pub mod state;
pub mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "codex-transcript-viewer",
    version,
    about = "Terminal viewer for chunked coding-agent transcript bundles"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a transcript bundle in the interactive viewer
    View {
        /// Bundle directory containing meta.json and chunks/
        bundle: PathBuf,

        /// Jump to a message anchor id on startup
        #[arg(long)]
        anchor: Option<String>,

        /// Render once and exit (headless-friendly)
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::View {
            bundle,
            anchor,
            once,
        } => ui::viewer::run_viewer(bundle, anchor, once),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(
                shell,
                &mut cmd,
                "codex-transcript-viewer",
                &mut std::io::stdout(),
            );
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "codex-transcript-viewer", "codex-transcript-viewer")
        .expect("project dirs available")
        .data_dir()
        .to_path_buf()
}
