use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

pub const STORE_ROOT_VAR: &str = "PRESSROOM_STORE";
pub const WEBSITE_ROOT_VAR: &str = "PRESSROOM_WEBSITE";

/// Store root from `PRESSROOM_STORE`, falling back to a per-user default.
pub fn default_store_root() -> Result<PathBuf> {
    if let Ok(value) = env::var(STORE_ROOT_VAR) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }

    if cfg!(windows) {
        let app_data = env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows store root")?;
        return Ok(PathBuf::from(app_data)
            .join("Pressroom")
            .join("transactions"));
    }

    let home = env::var("HOME").context("HOME is not set; cannot resolve store root")?;
    Ok(PathBuf::from(home).join(".pressroom").join("transactions"))
}

pub fn website_root_from_env() -> Result<PathBuf> {
    let value = env::var(WEBSITE_ROOT_VAR)
        .with_context(|| format!("{WEBSITE_ROOT_VAR} is not set; cannot resolve website root"))?;
    if value.trim().is_empty() {
        return Err(anyhow!("{WEBSITE_ROOT_VAR} is set but blank"));
    }
    Ok(PathBuf::from(value))
}
