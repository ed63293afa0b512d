use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use certforge::ops::Workspace;
use certforge::request::Protocol;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    V1,
    V2,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::V1 => Protocol::V1,
            ProtocolArg::V2 => Protocol::V2,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "certforge",
    version,
    about = "Issue and inspect X.509 certificates through an artifact directory"
)]
struct Cli {
    /// Directory holding the input/cert/key/result artifact files.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Request/response format variant.
    #[arg(long, value_enum, default_value = "v2")]
    protocol: ProtocolArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue a certificate from the encoded request in the input artifact.
    Issue,
    /// Report the effective certificate of the stored chain.
    CertInfo,
    /// Match the stored key against the chain and report the pairing
    /// certificate.
    CertKeyInfo,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let workspace = Workspace::new(cli.dir, cli.protocol.into());
    let result = match cli.command {
        Command::Issue => workspace.issue(),
        Command::CertInfo => workspace.cert_info(),
        Command::CertKeyInfo => workspace.cert_key_info(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            // Result codes are grouped by phase and stay stable across
            // releases; the low byte is what the OS reports.
            ExitCode::from((err.code() & 0xff) as u8)
        }
    }
}
