use clap::{Parser, Subcommand};

use crate::query::DEFAULT_SEARCH_LIMIT;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Base directory holding config, tables and the index
    /// (defaults to $PICSEARCH_BASE_PATH, then ~/.local/share/picsearch)
    #[clap(short = 'd', long)]
    pub dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bring the semantic index up to date with the description table
    Sync {},

    /// Search images by free-text description
    Search {
        /// Natural-language query
        query: String,

        /// Maximum number of results
        #[clap(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Record a description for an image file
    Add {
        /// Image file name under the pictures directory
        name: String,

        /// Free-text description of the image
        description: String,
    },

    /// Show counts for the table, the ledger and the index
    Stats {},

    /// Wipe the index collection (the processed ledger is kept)
    Clear {},
}
