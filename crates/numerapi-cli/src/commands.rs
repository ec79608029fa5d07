//! Available subcommands.

use std::path::PathBuf;

use clap::Subcommand;

/// Operations exposed by the `numerapi` command.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download any URL to a local file
    Download {
        /// Source URL
        url: String,
        /// Destination file
        dest: PathBuf,
        /// Continue from a previous partial download
        #[arg(long)]
        resume: bool,
        /// Fail unless the file has exactly this many bytes
        #[arg(long)]
        expected_size: Option<u64>,
    },

    /// Upload a local file to a URL
    Upload {
        /// File to send
        file: PathBuf,
        /// Target URL (usually pre-signed)
        url: String,
        /// Send as this multipart form field instead of a raw PUT
        #[arg(long)]
        field: Option<String>,
    },

    /// List the dataset files available for a round
    ListDatasets {
        /// Round number (defaults to the current round)
        #[arg(long)]
        round: Option<u32>,
    },

    /// Download a dataset file, e.g. "v5.0/train.parquet"
    DownloadDataset {
        /// Dataset file name as listed by list-datasets
        filename: String,
        /// Destination path (defaults to the file name in the current directory)
        #[arg(long)]
        dest: Option<PathBuf>,
        /// Round number (defaults to the current round)
        #[arg(long)]
        round: Option<u32>,
        /// Continue from a previous partial download
        #[arg(long)]
        resume: bool,
    },

    /// Print the number of the current round
    CurrentRound,

    /// List your models as name -> id
    Models,

    /// Print everything about your account as JSON
    Account,

    /// Print 1 if a round opened within the last HOURS, else 0
    CheckNewRound {
        /// Look-back window in hours
        #[arg(long, default_value_t = 12)]
        hours: u32,
    },

    /// Upload predictions and create a submission
    Submit {
        /// Predictions CSV
        file: PathBuf,
        /// Target model id (required for accounts with several models)
        #[arg(long)]
        model_id: Option<String>,
    },

    /// Upload predictions for diagnostics
    Diagnostics {
        /// Predictions CSV
        file: PathBuf,
        /// Target model id
        #[arg(long)]
        model_id: Option<String>,
    },

    /// Run a raw GraphQL query and print its data
    Query {
        /// Query text
        query: String,
        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,
        /// Send API keys with the query
        #[arg(long)]
        auth: bool,
    },
}
