use std::{env::args, process::ExitCode};

use anyhow::Result;
use clap::Parser;
use sitetime::{
    daemon::{args::DaemonArgs, start_daemon},
    utils::{
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};
use tracing::{error, info};

/// Launched by the browser with stdin and stdout connected to the extension. Anything printed to
/// stdout would corrupt the channel, so failures are only logged and reflected in the exit code.
fn main() -> ExitCode {
    match run(DaemonArgs::parse_from(args())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Host failed {e:?}");
            eprintln!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: DaemonArgs) -> Result<()> {
    let app_dir = args
        .dir
        .map_or_else(create_application_default_path, ensure_dir)?;
    enable_logging(HOST_PREFIX, &app_dir.join("logs"), args.log, args.log_console)?;
    info!(
        "Started by {:?}, parent window {:?}",
        args.origin, args.parent_window
    );

    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(start_daemon(app_dir, args.host.settings()));
    // The stdin reader blocks on a separate thread and isn't woken by shutdown.
    runtime.shutdown_background();
    result
}
