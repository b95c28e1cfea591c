//! trame apps: small web visualization apps started next to the notebook server
//!
//! Apps are found under `<dir>/trame/<app>/` for every directory of `JUPYTER_PATH`. Each app
//! directory has an `app.yml` (or `app.yaml`):
//!
//! ```yaml
//! name: Cone viewer            # display name
//! command: python cone.py $JUVIZ_ARGS
//! working_directory: src       # optional, relative to the app directory
//! ```

pub mod instance;

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::TrameError;

pub use instance::{InstanceParameters, LaunchOptions, TrameInstance};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrameApp {
    /// app directory name
    pub name: String,
    pub display_name: String,
    /// the app's config file
    pub path: PathBuf,
    pub command: String,
    pub working_directory: Option<PathBuf>,
}

#[derive(Deserialize)]
struct AppConfig {
    name: String,
    command: String,
    working_directory: Option<PathBuf>,
}

/// Every trame app below the directories of a `JUPYTER_PATH` value
pub fn discover_apps(jupyter_path: Option<&OsStr>) -> Result<Vec<TrameApp>, TrameError> {
    let Some(jupyter_path) = jupyter_path else {
        return Ok(Vec::new());
    };

    let mut apps = Vec::new();
    for path in std::env::split_paths(jupyter_path) {
        let trame_dir = path.join("trame");
        if !trame_dir.is_dir() {
            continue;
        }
        info!("Searching for trame apps in {}", trame_dir.display());

        let mut app_dirs = fs::read_dir(&trame_dir)
            .map_err(|err| TrameError::io(&trame_dir, err))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<PathBuf>, _>>()
            .map_err(|err| TrameError::io(&trame_dir, err))?;
        app_dirs.sort();

        for app_dir in app_dirs.iter().filter(|dir| dir.is_dir()) {
            apps.push(parse_app_config(app_dir)?);
        }
    }
    Ok(apps)
}

pub fn find_app<'a>(apps: &'a [TrameApp], name: &str) -> Result<&'a TrameApp, TrameError> {
    apps.iter()
        .find(|app| app.name == name)
        .ok_or_else(|| TrameError::UnknownApp(name.to_string()))
}

/// Read the app.yml (or app.yaml) of an app directory
pub fn parse_app_config(app_dir: &Path) -> Result<TrameApp, TrameError> {
    let config_path = ["app.yml", "app.yaml"]
        .iter()
        .map(|file| app_dir.join(file))
        .find(|path| path.exists())
        .ok_or_else(|| TrameError::MissingConfig(app_dir.display().to_string()))?;
    info!("Found trame app config at {}", config_path.display());

    let yaml = fs::read_to_string(&config_path).map_err(|err| TrameError::io(&config_path, err))?;
    let config: AppConfig = serde_yaml::from_str(&yaml).map_err(|source| TrameError::Config {
        path: config_path.display().to_string(),
        source,
    })?;

    let name = app_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(TrameApp {
        name,
        display_name: config.name,
        command: config.command,
        working_directory: config.working_directory.map(|dir| app_dir.join(dir)),
        path: config_path,
    })
}
