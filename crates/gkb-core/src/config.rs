use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded once at startup from the environment
/// (with an optional `.env` file that never overrides real env vars).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,

    // Persistence
    pub mongodb_uri: String,
    pub mongodb_database: String,

    // Local file storage
    pub images_dir: PathBuf,
    pub guides_dir: PathBuf,

    // Pending-reply continuations
    pub pending_reply_ttl: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let mongodb_uri = env_str("MONGODB_URI")
            .and_then(non_empty)
            .ok_or_else(|| Error::Config("MONGODB_URI environment variable is required".to_string()))?;
        let mongodb_database =
            env_str("MONGODB_DATABASE").unwrap_or_else(|| "gatekeeper".to_string());

        let images_dir = env_path("IMAGES_DIR").unwrap_or_else(|| PathBuf::from("./images"));
        let guides_dir = env_path("GUIDES_DIR").unwrap_or_else(|| PathBuf::from("./guides"));

        // Downloaded preview images land here; make sure it exists up front.
        fs::create_dir_all(&images_dir)?;

        let pending_reply_ttl =
            Duration::from_secs(env_u64("PENDING_REPLY_TTL_SECS").unwrap_or(600));

        Ok(Self {
            bot_token,
            mongodb_uri,
            mongodb_database,
            images_dir,
            guides_dir,
            pending_reply_ttl,
        })
    }

    /// Path of the static PDF for a guide id.
    pub fn guide_path(&self, guide: &crate::domain::GuideId) -> PathBuf {
        self.guides_dir.join(format!("{}.pdf", guide.0))
    }
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

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
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
