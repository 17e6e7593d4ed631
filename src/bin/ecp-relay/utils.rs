use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{HeaderName, HeaderValue};
use std::io::{self, BufRead, Write};
use tmuntaner_keyring::KeyringClient;
use url::Url;

pub fn get_password(
    sp_url: &Url,
    username: &str,
    with_password: bool,
    keyring_enabled: bool,
) -> Result<String> {
    let sp_domain = sp_url
        .host_str()
        .ok_or_else(|| anyhow!("could not find service provider domain"))?;
    let service = format!("ecp-relay -- {}", sp_domain);

    let keyring = KeyringClient::new(username, service.as_str(), "ecp-relay")?;
    let password = if keyring_enabled {
        keyring.get_password()?
    } else {
        None
    };

    let password = match with_password {
        true => prompt_user_for_password(&keyring, keyring_enabled)?,
        false => match password {
            Some(password) => password,
            None => prompt_user_for_password(&keyring, keyring_enabled)?,
        },
    };

    Ok(password)
}

fn prompt_user_for_password(keyring: &KeyringClient, keyring_enabled: bool) -> Result<String> {
    let password = rpassword::prompt_password("Password: ")?;

    if keyring_enabled {
        eprint!("Save password? (y/n) ");
        let _ = io::stderr().flush();
        let mut buffer = String::new();
        io::stdin().lock().read_line(&mut buffer)?;

        if buffer.trim_end_matches(&['\r', '\n'][..]) == "y" {
            keyring.set_password(password.clone())?;
        }
    }

    Ok(password)
}

/// `Authorization` value for HTTP Basic authentication.
pub fn basic_authorization(username: &str, password: &str) -> Result<HeaderValue> {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    let mut value = HeaderValue::from_str(format!("Basic {}", encoded).as_str())?;
    value.set_sensitive(true);

    Ok(value)
}

/// Splits a `Name: value` command line header.
pub fn parse_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = header
        .split_once(':')
        .ok_or_else(|| anyhow!("header {} is not of the form `Name: value`", header))?;

    Ok((
        HeaderName::from_bytes(name.trim().as_bytes())?,
        HeaderValue::from_str(value.trim())?,
    ))
}
