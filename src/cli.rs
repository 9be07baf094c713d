//! Command line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::link::ConnectionDescriptor;

pub const DEFAULT_LOCAL_FILE: &str = "Cyphal.lua";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./mavftp-verify.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a file, read it back and compare digests
    Upload {
        /// udpin:HOST:PORT, udpout:HOST:PORT, tcp:HOST:PORT, or a serial
        /// device such as /dev/ttyACM0, COM3 or serial:PATH:BAUD
        #[arg(long, short = 'c')]
        connection: ConnectionDescriptor,

        /// Local file to upload
        #[arg(long, short, default_value = DEFAULT_LOCAL_FILE)]
        file: PathBuf,

        /// Remote directory receiving the file
        #[arg(long)]
        remote_dir: Option<String>,

        /// Restart the autopilot after a verified upload
        #[arg(long)]
        reboot: bool,

        /// Skip listing the remote directory between upload and read-back
        #[arg(long)]
        no_list: bool,
    },
    /// List a remote directory
    Ls {
        #[arg(long, short = 'c')]
        connection: ConnectionDescriptor,

        /// Remote directory, "/" when omitted
        #[arg(default_value = "/")]
        path: String,
    },
    /// Serve a local directory as an emulated autopilot over UDP
    Emulate {
        #[arg(long, default_value = "127.0.0.1:14550")]
        bind: String,

        #[arg(long)]
        root: PathBuf,
    },
}
