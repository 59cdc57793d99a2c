//! Configuration management.
//!
//! Configuration is hierarchical YAML. A file may pull in further files via
//! an `include` list (paths relative to the including file); includes load
//! depth-first, and later files override earlier ones key by key. Raw file
//! text goes through `$VAR` / `${VAR}` environment expansion before parsing,
//! and every canonical path that contributed to the final configuration is
//! recorded in [`Config::loaded_files`] so the hot-reload watcher can follow
//! all of them.
//!
//! ```yaml
//! include: [config/views.yml]
//! general:
//!   boardName: euphio
//!   maxNodes: 10
//! listeners:
//!   telnet: { enabled: true, port: 2323, initialView: welcome }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tokio::fs;

/// Top-level configuration. Read-only after boot; hot reload builds a whole
/// new instance and swaps it in.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub include: Vec<String>,
    pub general: GeneralConfig,
    pub paths: PathsConfig,
    pub loggers: Vec<LoggerConfig>,
    pub listeners: ListenersConfig,
    pub views: HashMap<String, ViewConfig>,
    pub prompts: HashMap<String, PromptConfig>,
    /// Every file that contributed to this configuration, canonicalized.
    #[serde(skip)]
    pub loaded_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneralConfig {
    pub board_name: String,
    pub pretty_board_name: String,
    pub description: String,
    pub hostname: String,
    pub website: String,
    pub max_nodes: i64,
    pub hot_reload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathsConfig {
    pub data: String,
    pub keys: String,
    pub art: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            data: "data".into(),
            keys: "keys".into(),
            art: "art".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggerConfig {
    pub stdout: bool,
    pub file: Option<String>,
    pub level: String,
    pub hide_time: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ListenersConfig {
    pub telnet: TelnetListenerConfig,
    pub ssh: SshListenerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TelnetListenerConfig {
    pub enabled: bool,
    pub port: u16,
    pub initial_view: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SshListenerConfig {
    pub enabled: bool,
    pub port: u16,
    pub initial_view: String,
    pub key_file: String,
}

/// A single screen in the navigation state machine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewConfig {
    #[serde(rename = "type")]
    pub view_type: String,
    pub module: Option<String>,
    pub art: Option<String>,
    pub prompt: Option<String>,
    /// Literal input string -> target view name, with the reserved targets
    /// `back` / `BACK`.
    pub actions: HashMap<String, String>,
    pub next: Option<NextConfig>,
    pub clear_screen: bool,
    pub hide_cursor: bool,
}

/// Automatic transition out of a view. A bare view name means "on any key"
/// (delay 0); the object form schedules the transition after a delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextConfig {
    View(String),
    Timed {
        view: String,
        #[serde(default)]
        delay: u64,
    },
}

impl NextConfig {
    pub fn view(&self) -> &str {
        match self {
            NextConfig::View(v) => v,
            NextConfig::Timed { view, .. } => view,
        }
    }

    /// Transition delay in milliseconds; 0 means key-triggered.
    pub fn delay_ms(&self) -> u64 {
        match self {
            NextConfig::View(_) => 0,
            NextConfig::Timed { delay, .. } => *delay,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptConfig {
    pub art: Option<String>,
    pub line_feed: bool,
}

impl Config {
    /// Load a configuration file and its transitive includes.
    pub async fn load(path: &str) -> Result<Self> {
        let mut merged = Value::Null;
        let mut loaded = Vec::new();
        let mut seen = HashSet::new();

        load_recursive(Path::new(path), &mut merged, &mut loaded, &mut seen).await?;

        let mut config: Config = serde_yaml::from_value(merged)
            .map_err(|e| anyhow!("failed to parse config file {}: {}", path, e))?;
        config.loaded_files = loaded;
        Ok(config)
    }

    /// Effective node capacity; non-positive values fall back to 10.
    pub fn max_nodes(&self) -> usize {
        if self.general.max_nodes <= 0 {
            10
        } else {
            self.general.max_nodes as usize
        }
    }
}

/// Depth-first include resolution. Includes apply first; the including
/// file's own keys then override them.
async fn load_recursive(
    path: &Path,
    merged: &mut Value,
    loaded: &mut Vec<PathBuf>,
    seen: &mut HashSet<PathBuf>,
) -> Result<()> {
    let abs = path
        .canonicalize()
        .with_context(|| format!("config file not found: {}", path.display()))?;
    if !seen.insert(abs.clone()) {
        return Ok(());
    }

    let raw = fs::read_to_string(&abs)
        .await
        .with_context(|| format!("failed to read config file {}", abs.display()))?;
    let expanded = expand_env(&raw);

    let value: Value = serde_yaml::from_str(&expanded)
        .map_err(|e| anyhow!("failed to parse config file {}: {}", abs.display(), e))?;

    // Resolve includes before applying this file so its keys win.
    let includes: Vec<String> = value
        .get("include")
        .and_then(|v| serde_yaml::from_value(v.clone()).ok())
        .unwrap_or_default();

    let base_dir = abs.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    for inc in includes {
        let inc_path = if Path::new(&inc).is_absolute() {
            PathBuf::from(&inc)
        } else {
            base_dir.join(&inc)
        };
        Box::pin(load_recursive(&inc_path, merged, loaded, seen))
            .await
            .with_context(|| format!("failed to load included config {}", inc_path.display()))?;
    }

    merge_value(merged, value);
    loaded.push(abs);
    Ok(())
}

/// Deep-merge `overlay` into `base`: mappings merge key by key, everything
/// else replaces wholesale.
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(slot) => merge_value(slot, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay) => *base_slot = overlay,
    }
}

/// Expand `$VAR` and `${VAR}` references against the process environment.
/// Unset variables expand to the empty string.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    name.push(c);
                }
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
            Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
                let mut name = String::new();
                while let Some(c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }
    out
}
