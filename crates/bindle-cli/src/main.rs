#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bindle")]
#[command(author, version, about = "An asset pipeline for web projects", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Build the project into the output directory
    Build {
        /// Entry point file (defaults to src/main.tsx)
        entry: Option<PathBuf>,

        /// Output directory (defaults to dist)
        #[arg(long, short = 'o', value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Mode ("development" or "production"); controls which .env files
        /// are loaded and whether output is minified
        #[arg(long, short = 'm')]
        mode: Option<String>,

        /// Fold dynamic imports into their importer instead of splitting
        #[arg(long)]
        no_splitting: bool,

        /// Content-hash non-primary chunk filenames
        #[arg(long)]
        hashed_chunks: bool,
    },

    /// Start the development server with live reload
    Serve {
        /// Entry point file (defaults to src/main.tsx)
        entry: Option<PathBuf>,

        /// Port to listen on
        #[arg(long, short = 'p', default_value = "3600")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Mode (e.g. "development", "production"); controls which .env
        /// files are loaded
        #[arg(long, short = 'm', default_value = "development")]
        mode: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Build {
            entry,
            out_dir,
            mode,
            no_splitting,
            hashed_chunks,
        }) => {
            let action = commands::build::BuildAction {
                cwd,
                entry,
                out_dir,
                mode,
                splitting: !no_splitting,
                hashed_chunks,
            };
            commands::build::run(&action, cli.json)
        }
        Some(Commands::Serve {
            entry,
            port,
            host,
            mode,
        }) => {
            let action = commands::serve::ServeAction {
                cwd,
                entry,
                host,
                port,
                mode,
            };
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| miette::miette!("failed to start runtime: {e}"))?;
            rt.block_on(commands::serve::run(action))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["bindle", "serve"]).unwrap();
        match cli.command {
            Some(Commands::Serve { host, port, mode, entry }) => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, 3600);
                assert_eq!(mode, "development");
                assert!(entry.is_none());
            }
            other => panic!("expected serve command, got {other:?}"),
        }
    }

    #[test]
    fn test_serve_port_and_host_flags() {
        let cli =
            Cli::try_parse_from(["bindle", "serve", "--port", "4000", "--host", "0.0.0.0"])
                .unwrap();
        match cli.command {
            Some(Commands::Serve { host, port, .. }) => {
                assert_eq!(host, "0.0.0.0");
                assert_eq!(port, 4000);
            }
            other => panic!("expected serve command, got {other:?}"),
        }
    }

    #[test]
    fn test_build_flags() {
        let cli = Cli::try_parse_from([
            "bindle",
            "--json",
            "build",
            "-m",
            "production",
            "--no-splitting",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Some(Commands::Build { mode, no_splitting, hashed_chunks, .. }) => {
                assert_eq!(mode.as_deref(), Some("production"));
                assert!(no_splitting);
                assert!(!hashed_chunks);
            }
            other => panic!("expected build command, got {other:?}"),
        }
    }
}
