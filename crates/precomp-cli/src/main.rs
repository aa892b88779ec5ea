use clap::Parser;
use clap_verbosity_flag::Verbosity;
use std::path::PathBuf;

mod commands;
mod error;
mod io;
mod manifest;

use commands::compile::OutputFormat;
use commands::ObserverKind;

#[derive(Parser, Debug)]
#[command(name = "precomp")]
#[command(about = "Ahead-of-time precompilation driver and dependency recorder", long_about = None)]
struct Args {
    #[command(flatten)]
    verbose: Verbosity,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the compile requests of a manifest
    Compile {
        /// Manifest describing the engine and the requests
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
        /// Replay the recorded trace and check that it is balanced
        #[arg(long)]
        verify: bool,
        /// Where the observer bridge looks for a tool
        #[arg(long, value_enum, default_value_t = ObserverKind::Memory)]
        observer: ObserverKind,
        /// What to print
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List the type definitions of a module
    Types {
        /// Manifest describing the engine
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
        /// Module name or file name
        #[arg(value_name = "MODULE")]
        module: String,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    match args.command {
        Command::Compile {
            manifest,
            verify,
            observer,
            format,
        } => commands::compile::handle_compile(manifest, observer, verify, format)?,
        Command::Types { manifest, module } => commands::types::handle_types(manifest, module)?,
    }
    Ok(())
}
