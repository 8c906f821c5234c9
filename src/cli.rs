use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediaforge")]
#[command(author, version, about = "Streaming MP4/WebM/MPEG-TS/WAVE inspection and MP4 remuxing")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a media file and display its tracks
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the element or box tree of a file
    Dump {
        /// File to dump
        #[arg(required = true)]
        file: PathBuf,

        /// Deepest nesting level to print
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Write the padded movie box for the tracks of a file
    Moov {
        /// Input file
        #[arg(required = true)]
        file: PathBuf,

        /// Where to write the movie box
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Remux a file into a progressive MP4
    Remux {
        /// Input file
        #[arg(required = true)]
        file: PathBuf,

        /// Output MP4 file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
