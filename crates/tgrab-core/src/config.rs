use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{errors::Error, Result};

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_GROUP_WINDOW: u32 = 100;

/// Typed runtime configuration, read once at startup from the environment
/// (with an optional `.env` file for convenience).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram API credentials (my.telegram.org)
    pub api_id: i32,
    pub api_hash: String,
    /// Phone number for first-run sign-in, international format.
    pub phone: Option<String>,

    // Files
    pub session_file: PathBuf,
    pub links_file: PathBuf,
    pub download_dir: PathBuf,

    // Pipeline tuning
    pub workers: usize,
    pub group_window: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let api_id = env_i32("TG_API_ID").ok_or_else(|| {
            Error::Config("TG_API_ID environment variable is required".to_string())
        })?;
        let api_hash = env_str("TG_API_HASH").and_then(non_empty).ok_or_else(|| {
            Error::Config("TG_API_HASH environment variable is required".to_string())
        })?;

        // Only needed when the session file is not authorized yet.
        let phone = env_str("TG_PHONE").and_then(non_empty);

        let session_file =
            env_path("TGRAB_SESSION_FILE").unwrap_or_else(|| PathBuf::from("tgrab.session"));
        let links_file =
            env_path("TGRAB_LINKS_FILE").unwrap_or_else(|| PathBuf::from("links.txt"));
        let download_dir =
            env_path("TGRAB_DOWNLOAD_DIR").unwrap_or_else(|| PathBuf::from("downloads"));

        let workers = env_usize("TGRAB_WORKERS").unwrap_or(DEFAULT_WORKERS).max(1);
        let group_window = env_u32("TGRAB_GROUP_WINDOW").unwrap_or(DEFAULT_GROUP_WINDOW);

        Ok(Self {
            api_id,
            api_hash,
            phone,
            session_file,
            links_file,
            download_dir,
            workers,
            group_window,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_i32(key: &str) -> Option<i32> {
    env_str(key).and_then(|s| s.trim().parse::<i32>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
