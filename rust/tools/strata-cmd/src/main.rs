use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

mod commands;
mod input;
mod utils;

#[derive(Parser)]
#[command(name = "strata-cmd")]
#[command(about = "Converts hierarchical tables into fixed-layout compound records")]
#[command(version)]
struct Cli {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every table of an input document and write the output container as JSON
    Convert {
        /// Input document with the namespaces and tables to convert
        input: String,

        /// Output file
        output: String,

        /// Replace the output file if it already exists
        #[arg(long)]
        overwrite: bool,

        /// Keep converting the remaining tables when one fails
        #[arg(long)]
        skip_failed: bool,

        /// Convert the tables of each namespace concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Print the record layout of every table of an input document
    Layout {
        /// Input document with the namespaces and tables to plan
        input: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();
    let _ = builder.try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Convert {
            input,
            output,
            overwrite,
            skip_failed,
            parallel,
        } => commands::convert::run(commands::convert::ConvertArgs {
            input,
            output,
            overwrite,
            skip_failed,
            parallel,
        }),
        Commands::Layout { input } => commands::layout::run(input),
    }
}
