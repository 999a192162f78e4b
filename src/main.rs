#![allow(clippy::multiple_crate_versions)]

use clap::{Arg, ArgAction, Command};

mod commands;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config_arg = || {
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("Path to a YAML configuration file (defaults to environment variables)")
    };

    let matches = Command::new("conclave")
        .version(VERSION)
        .about("Governed multi-agent coordination runtime")
        .subcommand(
            Command::new("run")
                .about("Run the governed loop until a shutdown signal is received")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("status")
                .about("Show configuration, storage, and policy status")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("doctor")
                .about("Check configuration and storage health")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("logs")
                .about("Show runtime logs")
                .arg(
                    Arg::new("follow")
                        .short('f')
                        .long("follow")
                        .action(ArgAction::SetTrue)
                        .help("Follow log output in real-time"),
                )
                .arg(
                    Arg::new("lines")
                        .short('n')
                        .long("lines")
                        .value_name("LINES")
                        .help("Number of recent log lines to show")
                        .default_value("50"),
                ),
        )
        .subcommand(
            Command::new("cert")
                .about("Verify a signed finality certificate")
                .arg(
                    Arg::new("envelope")
                        .value_name("ENVELOPE")
                        .help("The header.payload.signature certificate string")
                        .required(true),
                )
                .arg(
                    Arg::new("public-key")
                        .long("public-key")
                        .value_name("HEX")
                        .help("Hex-encoded Ed25519 verifying key")
                        .required(true),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("run", sub_matches)) => {
            commands::run::run(sub_matches).await;
        }
        Some(("status", sub_matches)) => {
            commands::status::run(sub_matches).await;
        }
        Some(("doctor", sub_matches)) => {
            commands::doctor::run(sub_matches).await;
        }
        Some(("logs", sub_matches)) => {
            commands::logs::run(sub_matches).await;
        }
        Some(("cert", sub_matches)) => {
            commands::cert::run(sub_matches).await;
        }
        _ => {
            println!("conclave v{VERSION}");
            println!("Use --help for available commands");
        }
    }
}
