use anyhow::Result;
use clap::{Args, Subcommand};
use ecp_relay::settings::{AppConfig, Host};

#[derive(Args)]
pub struct Config {
    #[clap(subcommand)]
    sub_command: ConfigSubCommand,
}

#[derive(Subcommand)]
enum ConfigSubCommand {
    /// Remembers the username to log into a service provider with
    Add(ConfigAdd),
    /// Prints the effective settings
    Show,
}

#[derive(Args)]
struct ConfigAdd {
    #[clap(required = true, long)]
    sp_url: String,
    #[clap(required = true, short, long)]
    username: String,
}

impl Config {
    pub fn run(&self, settings: &mut AppConfig) -> Result<()> {
        match &self.sub_command {
            ConfigSubCommand::Add(val) => val.run(settings),
            ConfigSubCommand::Show => {
                println!("# {}", AppConfig::config_file()?.display());
                print!("{}", settings.to_toml()?);

                Ok(())
            }
        }
    }
}

impl ConfigAdd {
    fn run(&self, settings: &mut AppConfig) -> Result<()> {
        let host = Host::new(self.sp_url.clone(), self.username.clone())?;
        settings.add_host(host);
        settings.write_config()?;

        Ok(())
    }
}
