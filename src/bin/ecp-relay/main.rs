mod config;
mod fetch;
mod utils;

use crate::config::Config;
use crate::fetch::Fetch;
use anyhow::Result;
use clap::{Parser, Subcommand};
use ecp_relay::ecp::error::EcpError;
use ecp_relay::settings::AppConfig;
use log::{error, LevelFilter};
use simple_logger::SimpleLogger;
use std::process;

/// Exit status when the service provider could not be logged into.
const ACCESS_DENIED: i32 = 77;

#[derive(Parser)]
#[clap(version, about = "Fetches SAML protected resources through the ECP profile")]
struct Opts {
    #[clap(short, long)]
    verbose: bool,
    #[clap(subcommand)]
    sub_command: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    Config(Config),
    Fetch(Fetch),
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt: Opts = Opts::parse();
    let mut settings = AppConfig::read_config()?;

    let level = match opt.verbose {
        true => LevelFilter::Debug,
        false => LevelFilter::Info,
    };
    SimpleLogger::new().with_level(level).init()?;

    let result = match opt.sub_command {
        SubCommand::Config(val) => val.run(&mut settings),
        SubCommand::Fetch(val) => val.run(settings).await,
    };

    if let Err(e) = &result {
        if let Some(ecp_error) = e.downcast_ref::<EcpError>() {
            if ecp_error.is_access_denied() {
                error!("access denied: {:#}", e);
                process::exit(ACCESS_DENIED);
            }
        }
    }

    result
}
