use crate::utils;
use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};
use ecp_relay::ecp::relay::EcpRelay;
use ecp_relay::http::exchange_client::ExchangeRequest;
use ecp_relay::http::response::HttpResponseWrapper;
use ecp_relay::settings::AppConfig;
use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde_json::json;
use std::collections::BTreeMap;
use std::io::{self, Write};
use url::Url;

#[derive(ValueEnum, PartialEq, Debug, Clone, Copy, Default)]
enum OutputOptions {
    #[default]
    Body,
    Json,
}

#[derive(Args)]
pub struct Fetch {
    url: String,
    #[clap(short = 'X', long, default_value = "GET")]
    method: String,
    #[clap(short, long)]
    data: Option<String>,
    /// Extra request header, as `Name: value`
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,
    #[clap(short, long)]
    username: Option<String>,
    #[clap(short, long)]
    with_password: bool,
    /// Do not offer the ECP profile to the service provider
    #[clap(long)]
    no_paos: bool,
    #[clap(long, value_enum, default_value_t)]
    output: OutputOptions,
}

impl Fetch {
    pub async fn run(&self, mut settings: AppConfig) -> Result<()> {
        let url = Url::parse(self.url.as_str())?;
        if self.no_paos {
            settings.set_advertise_paos(false);
        }
        let relay = EcpRelay::new(&settings.relay_options())?;

        let method = Method::from_bytes(self.method.to_uppercase().as_bytes())?;
        let mut request = ExchangeRequest::new(method, url.clone());
        for header in &self.headers {
            let (name, value) = utils::parse_header(header)?;
            request.headers.append(name, value);
        }
        if let Some(data) = &self.data {
            request.body = Some(data.clone().into_bytes());
        }

        if let Some(username) = self.find_username(&settings, &url) {
            let password =
                utils::get_password(&url, &username, self.with_password, settings.keyring_enabled())?;
            request
                .headers
                .insert(AUTHORIZATION, utils::basic_authorization(&username, &password)?);
        } else {
            debug!("no username for {}, fetching anonymously", url);
        }

        let mut response = relay.fetch(request).await?;

        print_response(&mut response, self.output)
    }

    fn find_username(&self, settings: &AppConfig, url: &Url) -> Option<String> {
        if let Some(username) = &self.username {
            return Some(username.clone());
        }

        let host = settings.find_host(url)?;
        debug!("using {} configured for {}", host.username(), host.sp_url());

        Some(host.username().to_string())
    }
}

fn print_response(response: &mut HttpResponseWrapper, output: OutputOptions) -> Result<()> {
    let content = response.take_content()?;

    match output {
        OutputOptions::Body => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
        }
        OutputOptions::Json => {
            let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (name, value) in response.headers() {
                let value = value
                    .to_str()
                    .map_err(|e| anyhow!("header {} is not printable: {}", name, e))?;
                headers
                    .entry(name.to_string())
                    .or_default()
                    .push(value.to_string());
            }

            let document = json!({
                "status": response.status().as_u16(),
                "url": response.url().map(|url| url.to_string()),
                "headers": headers,
                "body": String::from_utf8_lossy(&content),
            });
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }

    Ok(())
}
