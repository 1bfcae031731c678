use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::{fs, net::IpAddr, path::PathBuf};
use url::Url;

use crate::{
    Cli, address::DEFAULT_ADDRESS_LOOKUP_URL, client::DEFAULT_API_BASE_URL,
    import::PollIntervals,
};

pub const DEFAULT_REGION: &str = "nyc3";
pub const DEFAULT_HTTP_PORT: u16 = 5379;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    region: Option<String>,
    http_port: Option<u16>,
    api_base_url: Option<Url>,
    address_lookup_url: Option<Url>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    do_api_base_url: Option<Url>,
    address_lookup_url: Option<Url>,
}

/// Everything a run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    pub image_file: PathBuf,
    pub name: String,
    pub region: String,
    pub http_port: u16,
    pub bind_address: Option<IpAddr>,
    pub wait_until_available: bool,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub api_base_url: Url,
    pub address_lookup_url: Url,
    pub poll_intervals: PollIntervals,
}

fn merge_config(cli: Cli, file: ConfigFile, env: ConfigEnv) -> Result<Config> {
    if cli.api_token.trim().is_empty() {
        return Err(anyhow!("API token must not be empty"));
    }

    let api_base_url = match env.do_api_base_url.or(file.api_base_url) {
        Some(url) => url,
        None => Url::parse(DEFAULT_API_BASE_URL)?,
    };
    let address_lookup_url = match env.address_lookup_url.or(file.address_lookup_url) {
        Some(url) => url,
        None => Url::parse(DEFAULT_ADDRESS_LOOKUP_URL)?,
    };

    Ok(Config {
        api_token: cli.api_token,
        image_file: cli.image_file,
        name: cli.name,
        region: cli
            .region
            .or(file.region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        http_port: cli.http_port.or(file.http_port).unwrap_or(DEFAULT_HTTP_PORT),
        bind_address: cli.bind_address,
        wait_until_available: cli.wait_until_available,
        description: cli.description,
        tags: cli.tags,
        api_base_url,
        address_lookup_url,
        poll_intervals: PollIntervals::default(),
    })
}

fn read_config_file() -> Result<ConfigFile> {
    let Some(project_dirs) = directories::ProjectDirs::from("com", "digitalocean", "do-image-uploader")
    else {
        return Ok(ConfigFile::default());
    };
    let config_file = project_dirs.config_dir().join("config.toml");

    match fs::read_to_string(&config_file) {
        Ok(contents) => toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", config_file.display())),
        Err(_) => Ok(ConfigFile::default()),
    }
}

pub fn read_config(cli: Cli) -> Result<Config> {
    let env_config = envy::from_env::<ConfigEnv>().unwrap_or_default();
    let file_config = read_config_file()?;

    merge_config(cli, file_config, env_config)
}
