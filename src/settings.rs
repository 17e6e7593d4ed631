use crate::ecp::relay::RelayOptions;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct AppConfig {
    keyring_enabled: Option<bool>,
    #[serde(default)]
    relay: RelaySettings,
    #[serde(default)]
    http: HttpSettings,
    hosts: Option<Vec<Host>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RelaySettings {
    #[serde(default = "default_true")]
    advertise_paos: bool,
    template_dir: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    max_redirects: usize,
    #[serde(default = "default_true")]
    cookie_store: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Host {
    sp_url: String,
    username: String,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    10
}

impl Default for RelaySettings {
    fn default() -> Self {
        RelaySettings {
            advertise_paos: true,
            template_dir: None,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            cookie_store: true,
        }
    }
}

impl AppConfig {
    pub fn add_host(&mut self, host: Host) {
        let hosts = self.hosts.get_or_insert(vec![]);
        match hosts.iter_mut().find(|i| i.sp_url == host.sp_url) {
            Some(existing) => {
                existing.username = host.username;
            }
            None => {
                hosts.push(host);
            }
        }
    }

    pub fn hosts(&self) -> &[Host] {
        self.hosts.as_deref().unwrap_or(&[])
    }

    /// The configured host for `url`: same origin, longest matching path.
    pub fn find_host(&self, url: &Url) -> Option<&Host> {
        self.hosts()
            .iter()
            .filter(|host| host.matches(url))
            .max_by_key(|host| host.sp_url.len())
    }

    pub fn keyring_enabled(&self) -> bool {
        self.keyring_enabled.unwrap_or(true)
    }

    pub fn set_advertise_paos(&mut self, advertise_paos: bool) {
        self.relay.advertise_paos = advertise_paos;
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            advertise_paos: self.relay.advertise_paos,
            timeout: match self.http.timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_redirects: self.http.max_redirects,
            cookie_store: self.http.cookie_store,
            template_dir: self.relay.template_dir.clone(),
        }
    }

    /// Reads the settings file, or the defaults when there is none yet.
    pub fn read_config() -> Result<Self> {
        AppConfig::read_from(&AppConfig::config_file()?)
    }

    pub fn read_from(config_file: &Path) -> Result<Self> {
        if !config_file.exists() {
            return Ok(AppConfig::default());
        }

        let config_contents = fs::read_to_string(config_file)?;
        let config: AppConfig = toml::from_str(config_contents.as_str())?;

        Ok(config)
    }

    pub fn write_config(&self) -> Result<()> {
        AppConfig::write_to(self, &AppConfig::config_file()?)
    }

    pub fn write_to(&self, config_file: &Path) -> Result<()> {
        if let Some(config_dir) = config_file.parent() {
            fs::create_dir_all(config_dir)?;
        }
        fs::write(config_file, self.to_toml()?)?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(&self)?)
    }

    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("could not determine config directory"))?
            .join("ecp-relay");

        Ok(config_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        let config_file = AppConfig::config_dir()?.join("settings.toml");

        Ok(config_file)
    }
}

impl Host {
    pub fn new(sp_url: String, username: String) -> Result<Self> {
        let mut sp_url = Url::parse(sp_url.as_str())?;

        // remove query
        sp_url.set_query(None);

        // remove trailing slash
        let sp_url_str = sp_url.to_string();
        sp_url
            .path_segments_mut()
            .map_err(|_| anyhow!("{} cannot be a base URL", sp_url_str))?
            .pop_if_empty();

        Ok(Host {
            sp_url: String::from(sp_url),
            username,
        })
    }

    pub fn sp_url(&self) -> &str {
        &self.sp_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn matches(&self, url: &Url) -> bool {
        let Ok(sp_url) = Url::parse(&self.sp_url) else {
            return false;
        };

        sp_url.origin() == url.origin() && url.path().starts_with(sp_url.path())
    }
}
