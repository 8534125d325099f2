//! CLI tool for extracting RAR archives through the UnRAR library.

mod commands;
mod exit_codes;
mod output;
mod password;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use unrar_session::engine::Engine;
use unrar_session::engine::native::NativeEngine;
use unrar_session::{EngineConfig, EngineHandle, EngineLoader};

use exit_codes::{ExitCode, error_to_exit_code};

/// Extract RAR archives through the UnRAR library
#[derive(Parser)]
#[command(name = "unrar-session")]
#[command(author, version, about = "Extract RAR archives through the UnRAR library", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Only print errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// UnRAR library to load
    #[arg(long, env = "UNRAR_LIB_PATH", global = true)]
    library: Option<PathBuf>,

    /// Directory for staged archive copies
    #[arg(long, env = "UNRAR_STAGING_DIR", global = true)]
    staging_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract files from archive (alias: x)
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short = 'o', long, default_value = "./output")]
        output: PathBuf,

        /// Password (will prompt if needed and not provided)
        #[arg(short = 'p', long)]
        password: Option<String>,

        /// Continue past entries that fail to extract
        #[arg(long)]
        keep_going: bool,

        /// Fail entries whose size differs from the header
        #[arg(long)]
        verify_size: bool,
    },

    /// List archive contents (alias: l)
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Password (will prompt if needed)
        #[arg(short = 'p', long)]
        password: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

fn load_engine(cli: &Cli) -> Result<EngineHandle, ExitCode> {
    let mut config = EngineConfig::new();
    if let Some(path) = &cli.library {
        config = config.library_path(path);
    }
    if let Some(dir) = &cli.staging_dir {
        config = config.staging_dir(dir);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .build()
        .map_err(|e| {
            eprintln!("Error starting runtime: {}", e);
            ExitCode::FatalError
        })?;

    let loader = EngineLoader::new(move || {
        let engine = NativeEngine::load(&config)?;
        Ok(Arc::new(engine) as Arc<dyn Engine>)
    });
    runtime.block_on(loader.acquire()).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!("Install the UnRAR library or point --library / UNRAR_LIB_PATH at it.");
        error_to_exit_code(&e)
    })
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
        command => match load_engine(&cli) {
            Err(code) => code,
            Ok(engine) => match command {
                Commands::Extract {
                    archive,
                    output,
                    password,
                    keep_going,
                    verify_size,
                } => commands::extract(
                    &engine,
                    &commands::ExtractConfig {
                        archive_path: archive,
                        output_dir: output,
                        password: password.clone(),
                        keep_going: *keep_going,
                        verify_size: *verify_size,
                        format: cli.format,
                        quiet: cli.quiet,
                    },
                ),
                Commands::List { archive, password } => {
                    commands::list(&engine, archive, password.clone(), cli.format, cli.quiet)
                }
                Commands::Completions { .. } => ExitCode::BadArgs,
            },
        },
    };

    std::process::exit(exit_code.code());
}
