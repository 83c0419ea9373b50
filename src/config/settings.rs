use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

#[derive(Debug, Clone)]
pub struct Config {
    pub listing_url: String,
    pub download_url: String,
    pub user_agent: String,
    pub auth_token: Option<String>,
    pub auth_cookie: String,
    pub data_path: String,
    pub save_dir: String,
    pub host: String,
    pub port: u16,
    pub fetch_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listing_url = env::var("BOARD_LISTING_URL").context("BOARD_LISTING_URL not set")?;
        let download_url =
            env::var("BOARD_DOWNLOAD_URL").context("BOARD_DOWNLOAD_URL not set")?;

        let user_agent =
            env::var("BROWSER_USER_AGENT").unwrap_or(DEFAULT_USER_AGENT.to_string());
        let auth_token = env::var("BOARD_AUTH_TOKEN").ok().filter(|t| !t.is_empty());
        let auth_cookie = env::var("BOARD_AUTH_COOKIE").unwrap_or("__cfduid".to_string());

        let data_path = env::var("DATA_PATH").unwrap_or(".".to_string());
        let save_dir = env::var("SAVE_DIR").unwrap_or(format!("{}/clips", data_path));

        let host = env::var("WEBSERVER_HOST").unwrap_or("127.0.0.1".to_string());
        let port = env::var("WEBSERVER_PORT")
            .unwrap_or("8080".to_string())
            .parse()
            .context("WEBSERVER_PORT must be a valid u16")?;

        let fetch_timeout = env::var("FETCH_TIMEOUT_SECS")
            .unwrap_or("300".to_string())
            .parse()
            .map(Duration::from_secs)
            .context("FETCH_TIMEOUT_SECS must be a number of seconds")?;

        Ok(Self {
            listing_url,
            download_url: with_trailing_slash(download_url),
            user_agent,
            auth_token,
            auth_cookie,
            data_path,
            save_dir,
            host,
            port,
            fetch_timeout,
        })
    }

    pub fn save_path(&self) -> PathBuf {
        PathBuf::from(&self.save_dir)
    }

    /// Per-thread endpoint, `<download>/res/<thread>.json`.
    pub fn thread_url(&self, thread_id: &str) -> String {
        format!("{}res/{}.json", self.download_url, thread_id)
    }

    pub fn clip_url(&self, remote_path: &str) -> String {
        format!("{}{}", self.download_url, remote_path.trim_start_matches('/'))
    }
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
pub fn test_config(download_url: &str, save_dir: &str) -> Config {
    Config {
        listing_url: format!("{}index.json", with_trailing_slash(download_url.to_string())),
        download_url: with_trailing_slash(download_url.to_string()),
        user_agent: "clipstream-test".to_string(),
        auth_token: Some("token".to_string()),
        auth_cookie: "__cfduid".to_string(),
        data_path: ".".to_string(),
        save_dir: save_dir.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        fetch_timeout: Duration::from_secs(10),
    }
}
