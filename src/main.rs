//! mavftp-verify - Entry Point
//!
//! Uploads a script to an autopilot over MAVLink FTP, reads it back and
//! compares digests. Also lists remote directories and runs a UDP device
//! emulator for bench testing.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use mavftp_verify::cli::{Cli, Commands};
use mavftp_verify::config::{ClientConfig, EmulatorConfig};
use mavftp_verify::emulator::Emulator;
use mavftp_verify::error::CycleError;
use mavftp_verify::error::handlers::{EXIT_CONFIG, EXIT_LINK, error_to_exit_code, handle_error};
use mavftp_verify::link::{ConnectionDescriptor, Link, Session, connect};
use mavftp_verify::transfer::TransferDriver;
use mavftp_verify::utils::setup_logging;
use mavftp_verify::verify::{CycleOptions, run_cycle};

fn main() -> ExitCode {
    setup_logging();
    let cli = Cli::parse();

    let config = match ClientConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let outcome = match cli.command {
        Commands::Upload {
            connection,
            file,
            remote_dir,
            reboot,
            no_list,
        } => upload(&config, &connection, file, remote_dir, reboot, no_list),
        Commands::Ls { connection, path } => list(&config, &connection, &path),
        Commands::Emulate { bind, root } => return emulate(config.emulator, &bind, root),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            handle_error(&e);
            if let CycleError::VerificationFailure { local, remote, .. } = &e {
                println!("Local MD5:  {}", local);
                println!("Remote MD5: {}", remote);
            }
            println!("FAILED: {}", e);
            ExitCode::from(error_to_exit_code(&e))
        }
    }
}

fn open_session(
    config: &ClientConfig,
    connection: &ConnectionDescriptor,
) -> Result<Session<Box<dyn Link>>, CycleError> {
    println!("Connecting to {}", connection);
    let link = connect(connection, &config.link)?;
    println!("Waiting for heartbeat...");
    let session = Session::establish(link, config.link.handshake_timeout())?;
    println!("Connected to {}", session.peer());
    Ok(session)
}

fn upload(
    config: &ClientConfig,
    connection: &ConnectionDescriptor,
    file: PathBuf,
    remote_dir: Option<String>,
    reboot: bool,
    no_list: bool,
) -> Result<(), CycleError> {
    let mut verify = config.verify.clone();
    if let Some(dir) = remote_dir {
        verify.remote_dir = dir;
    }
    if no_list {
        verify.list_parent = false;
    }
    let options = CycleOptions::from_config(file, &verify, reboot);

    let mut session = open_session(config, connection)?;
    let driver = TransferDriver::new(config.transfer.clone());
    println!(
        "Uploading {} to {}",
        options.local_path.display(),
        options.remote_path
    );
    let report = run_cycle(&driver, &mut session, &options)?;

    if let Some(entries) = &report.listing {
        println!("Remote directory:");
        for entry in entries {
            println!("  {}", entry);
        }
    }
    println!("Local MD5:  {}", report.local_digest);
    println!("Remote MD5: {}", report.remote_digest);
    if let Some(side_file) = &report.side_file {
        println!("Read-back copy written to {}", side_file.display());
    }
    println!("OK: {} bytes verified at {}", report.bytes, report.remote_path);
    if report.restart_sent {
        println!("Restart requested");
    }
    Ok(())
}

fn list(
    config: &ClientConfig,
    connection: &ConnectionDescriptor,
    path: &str,
) -> Result<(), CycleError> {
    let mut session = open_session(config, connection)?;
    let driver = TransferDriver::new(config.transfer.clone());
    let result = driver.list(&mut session, path);

    if !result.success() {
        return Err(CycleError::Transfer {
            operation: result.operation(),
            remote_path: path.to_string(),
            status: result.into_status(),
        });
    }
    for entry in result.entries().unwrap_or_default() {
        println!("{}", entry);
    }
    Ok(())
}

fn emulate(config: EmulatorConfig, bind: &str, root: PathBuf) -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_LINK);
        }
    };

    info!("Launching device emulator...");
    let result = runtime.block_on(async {
        let emulator = Emulator::bind(bind, root, config).await?;
        emulator.run().await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Emulator stopped: {}", e);
            ExitCode::from(EXIT_LINK)
        }
    }
}
