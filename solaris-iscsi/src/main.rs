//! Solaris iSCSI initiator CLI
//!
//! Thin command-line front end over the connection manager. Results are
//! printed as JSON.

use std::net::IpAddr;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use solaris_iscsi::{
    ConnectionManager, InitiatorConfig, Iqn, SoftwareInitiator, SolarisConnectionManager,
    SolarisSoftwareInitiator,
};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "solaris-iscsi")]
#[command(about = "Manage the Solaris iSCSI initiator through iscsiadm")]
struct Args {
    /// Path to iscsiadm
    #[arg(long, env = "ISCSIADM_PATH", default_value = "iscsiadm")]
    iscsiadm: String,

    /// Path to pkginfo
    #[arg(long, env = "PKGINFO_PATH", default_value = "pkginfo")]
    pkginfo: String,

    /// Default discovery port
    #[arg(long, env = "ISCSI_DEFAULT_PORT", default_value = "3260")]
    default_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered targets
    Targets,
    /// Add a discovery address and print the target found through it
    Discover {
        address: IpAddr,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Remove a target's discovery address, or all of them
    Undiscover {
        #[arg(long)]
        iqn: Option<Iqn>,
    },
    /// Enable auto-login and print the target's sessions
    LoginAll { iqn: Iqn },
    /// Log out of every session to a target
    LogoutAll { iqn: Iqn },
    /// List active sessions
    Sessions {
        #[arg(long)]
        iqn: Option<Iqn>,
    },
    /// Rescan for new devices
    Rescan,
    /// Print or replace the initiator node name
    SourceIqn {
        /// New initiator node name (drops active sessions)
        #[arg(long)]
        set: Option<String>,
    },
    /// Size the per-target session count to the discovered endpoints
    SessionCount,
    /// Check whether the initiator packages are installed
    Installed,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = InitiatorConfig::default()
        .with_iscsiadm_path(args.iscsiadm)
        .with_pkginfo_path(args.pkginfo)
        .with_default_port(args.default_port);

    info!(
        iscsiadm = %config.iscsiadm_path,
        command = ?args.command,
        "Starting solaris-iscsi"
    );

    let manager = SolarisConnectionManager::with_process_runner(config.clone());

    match args.command {
        Command::Targets => print_json(&manager.get_discovered_targets()?)?,
        Command::Discover { address, port } => {
            let port = port.unwrap_or(config.default_port);
            print_json(&manager.discover(address, port)?)?
        }
        Command::Undiscover { iqn } => match iqn {
            Some(iqn) => {
                let target = manager.find_target(&iqn)?;
                manager.undiscover(Some(&target))?
            }
            None => manager.undiscover(None)?,
        },
        Command::LoginAll { iqn } => {
            let target = manager.find_target(&iqn)?;
            print_json(&manager.login_all(&target)?)?
        }
        Command::LogoutAll { iqn } => {
            let target = manager.find_target(&iqn)?;
            manager.logout_all(&target)?
        }
        Command::Sessions { iqn } => {
            let sessions = match iqn {
                Some(iqn) => {
                    let target = manager.find_target(&iqn)?;
                    manager.get_sessions(Some(&target))?
                }
                None => manager.get_sessions(None)?,
            };
            print_json(&sessions)?
        }
        Command::Rescan => manager.rescan()?,
        Command::SourceIqn { set } => match set {
            Some(iqn) => manager.set_source_identifier(&iqn)?,
            None => print_json(&manager.get_source_identifier()?)?,
        },
        Command::SessionCount => print_json(&manager.configure_session_count()?)?,
        Command::Installed => {
            let probe = SolarisSoftwareInitiator::with_process_runner(config);
            print_json(&probe.is_installed())?
        }
    }

    Ok(())
}
