use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the preview server.
    Serve {},

    /// Resolve a url and print the assembled preview as json.
    Inspect {
        /// A note, profile or instance url
        url: String,
    },

    /// Render the preview card of a note to a png file.
    Card {
        /// A note url
        url: String,

        /// Output file
        #[clap(short, long, default_value = "card.png")]
        output: PathBuf,
    },
}
