use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins if set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a job over local files
    Submit {
        /// Glob spec for the input files
        #[arg(short, long)]
        input: String,

        /// Name of the workload
        #[arg(short, long)]
        workload: String,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Mapping cache file, read before and written after the run
        #[arg(short, long)]
        cache: Option<PathBuf>,

        /// Capacity of the channel between the map and reduce stages
        #[arg(long, default_value_t = 1)]
        capacity: usize,

        /// Auxiliary arguments to pass to the MapReduce application.
        #[clap(value_parser, last = true)]
        args: Vec<String>,
    },
}

/// A job as submitted on the command line.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: String,
    pub workload: String,
    pub output: PathBuf,
    pub cache: Option<PathBuf>,
    pub capacity: usize,
    pub args: Vec<String>,
}

impl From<Commands> for Job {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Submit {
                input,
                workload,
                output,
                cache,
                capacity,
                args,
            } => Job {
                input,
                workload,
                output,
                cache,
                capacity,
                args,
            },
        }
    }
}
