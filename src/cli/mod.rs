pub mod output;
pub mod report;
pub mod transfer;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use report::{process_report_command, ReportCommand};
use tracing::level_filters::LevelFilter;
use transfer::{
    process_clear_command, process_export_command, process_import_command, process_status_command,
};

use crate::{
    daemon::{args::HostArgs, start_daemon, storage::document_storage::FileDocumentStorage},
    utils::{
        clock::DefaultClock,
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX, HOST_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "sitetime", version, long_about = None)]
#[command(about = "Tracks how much time you spend on each website", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        env = "SITETIME_DIR",
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run the native messaging host in the current console. Used for debugging the browser integration"
    )]
    Serve {
        #[command(flatten)]
        host: HostArgs,
    },
    #[command(about = "Display time spent on websites")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Show what the host is currently tracking")]
    Status,
    #[command(about = "Export all statistics as json")]
    Export {
        #[arg(long, short, help = "File to write the export to. Defaults to stdout")]
        output: Option<PathBuf>,
    },
    #[command(about = "Replace all statistics with a previous export")]
    Import { file: PathBuf },
    #[command(about = "Remove all statistics")]
    Clear {
        #[arg(long, help = "Confirm removal")]
        yes: bool,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args
        .dir
        .map_or_else(create_application_default_path, ensure_dir)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let prefix = match args.commands {
        Commands::Serve { .. } => HOST_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir.join("logs"), logging_level, args.log)?;

    let storage = Arc::new(FileDocumentStorage::new(app_dir.join("data"))?);

    match args.commands {
        Commands::Serve { host } => start_daemon(app_dir, host.settings()).await,
        Commands::Report { command } => process_report_command(command, &storage).await,
        Commands::Status => process_status_command(&storage).await,
        Commands::Export { output } => {
            process_export_command(&storage, output.as_deref(), &DefaultClock).await
        }
        Commands::Import { file } => {
            process_import_command(storage, &file, Arc::new(DefaultClock)).await
        }
        Commands::Clear { yes } => {
            process_clear_command(storage, yes, Arc::new(DefaultClock)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, Commands};

    #[test]
    fn test_parse_commands() {
        let args = Args::parse_from(["sitetime", "clear", "--yes", "--dir", "/tmp/sitetime"]);
        assert!(matches!(args.commands, Commands::Clear { yes: true }));
        assert_eq!(args.dir, Some("/tmp/sitetime".into()));

        let args = Args::parse_from(["sitetime", "report", "--period", "week", "-p", "5%"]);
        assert!(matches!(args.commands, Commands::Report { .. }));

        let args = Args::parse_from(["sitetime", "serve", "--heartbeat", "15"]);
        let Commands::Serve { host } = args.commands else {
            panic!("expected serve");
        };
        assert_eq!(host.heartbeat, 15);

        assert!(Args::try_parse_from(["sitetime", "report", "--period", "month"]).is_err());
    }
}
