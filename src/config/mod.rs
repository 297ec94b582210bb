#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::TasklistError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ui: UiConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(alias = "url")]
    pub base_url: String,
    pub tasks_path: String,
    pub session_path: String,
    pub users_path: String,
    /// Sent verbatim as the `Cookie` header, e.g. `PHPSESSID=...`.
    pub cookie: String,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_owned(),
            tasks_path: "api/todos.php".to_owned(),
            session_path: "api/auth.php".to_owned(),
            users_path: "api/users.php".to_owned(),
            cookie: String::new(),
            timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// `base_url` and `cookie` with `$VAR` / `${VAR}` references expanded.
    #[must_use]
    pub fn resolved(&self) -> Self {
        Self {
            base_url: expand_env_vars(&self.base_url),
            cookie: expand_env_vars(&self.cookie),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    /// Field path to sort by on startup; empty keeps server order.
    pub default_sort: String,
    pub default_reverse: bool,
    pub icons: bool,
    pub tick_rate_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            default_sort: String::new(),
            default_reverse: false,
            icons: true,
            tick_rate_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Log destination while the terminal UI is running. Empty disables logging there.
    pub file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            file: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
}

pub fn default_paths() -> anyhow::Result<ConfigPaths> {
    if let Some(explicit) = std::env::var_os("TASKLIST_CONFIG") {
        return Ok(ConfigPaths {
            config_file: PathBuf::from(explicit),
        });
    }

    let unix = home_config_path_unix();
    if !cfg!(windows) || unix.exists() {
        return Ok(ConfigPaths { config_file: unix });
    }

    let proj = ProjectDirs::from("com", "tasklist", "tasklist")
        .context("failed to determine platform config directory")?;
    Ok(ConfigPaths {
        config_file: proj.config_dir().join("config.toml"),
    })
}

fn home_config_path_unix() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("~"));
    home.join(".config").join("tasklist").join("config.toml")
}

fn home_dir() -> Option<PathBuf> {
    if let Some(v) = std::env::var_os("HOME") {
        return Some(PathBuf::from(v));
    }
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[must_use]
pub fn expand_tilde(input: &str) -> String {
    if let Some(rest) = input.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest).to_string_lossy().to_string();
    }
    input.to_owned()
}

fn expand_env_vars(input: &str) -> String {
    // Expand $VAR and ${VAR}. Leave unknown vars untouched.
    let Ok(re) = regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") else {
        return input.to_owned();
    };
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        std::env::var(key).unwrap_or_else(|_| caps[0].to_owned())
    })
    .to_string()
}

pub fn load() -> anyhow::Result<(Config, ConfigPaths)> {
    let paths = default_paths()?;
    let (_doc, cfg) = load_from_file(&paths.config_file)?;
    cfg.validate()?;
    Ok((cfg, paths))
}

pub fn list_resolved_toml() -> anyhow::Result<String> {
    let (cfg, _paths) = load()?;
    Ok(toml::to_string_pretty(&cfg)?)
}

pub fn get_value_string(key: &str) -> anyhow::Result<Option<String>> {
    let paths = default_paths()?;
    get_value_string_at_path(&paths.config_file, key)
}

pub fn set_value_string(key: &str, value: &str) -> anyhow::Result<()> {
    let paths = default_paths()?;
    set_value_string_at_path(&paths.config_file, key, value)
}

fn load_from_file(path: &Path) -> anyhow::Result<(toml_edit::DocumentMut, Config)> {
    if !path.exists() {
        return Ok((toml_edit::DocumentMut::new(), Config::default()));
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let doc = raw
        .parse::<toml_edit::DocumentMut>()
        .with_context(|| format!("failed to parse TOML in {}", path.display()))?;

    let cfg: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to deserialize TOML in {}", path.display()))?;
    Ok((doc, cfg))
}

pub fn get_value_string_at_path(path: &Path, key: &str) -> anyhow::Result<Option<String>> {
    let (_doc, cfg) = load_from_file(path)?;
    cfg.validate()?;
    let value = lookup_value(&cfg, &normalize_key(key));
    Ok(value.map(format_value_for_stdout))
}

pub fn set_value_string_at_path(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let (mut doc, _cfg) = load_from_file(path)?;

    let norm = normalize_key(key);
    let key_type = key_type(&norm).ok_or_else(|| TasklistError::InvalidConfigKey(key.to_owned()))?;
    let invalid = |msg| TasklistError::InvalidConfigValue {
        key: key.to_owned(),
        msg,
    };
    let item = match key_type {
        KeyType::Bool => toml_edit::value(parse_bool(value).map_err(invalid)?),
        KeyType::Int => toml_edit::value(parse_int(value).map_err(invalid)?),
        KeyType::String => toml_edit::value(value),
    };
    apply_set(&mut doc, &norm, item)?;

    // Validate by re-parsing the updated doc into a Config.
    let new_raw = doc.to_string();
    let new_cfg: Config = toml::from_str(&new_raw)
        .with_context(|| format!("config update produced invalid TOML for {}", path.display()))?;
    new_cfg.validate()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, new_raw.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(key = %norm, path = %path.display(), "config updated");
    Ok(())
}

impl Config {
    pub fn validate(&self) -> Result<(), TasklistError> {
        let base = self.server.resolved().base_url;
        if base.trim().is_empty() {
            return Err(TasklistError::Config(
                "server.base_url must not be empty".to_owned(),
            ));
        }
        if let Err(e) = reqwest::Url::parse(&base) {
            return Err(TasklistError::Config(format!(
                "server.base_url '{base}' is not a valid URL: {e}"
            )));
        }
        for (key, path) in [
            ("server.tasks_path", &self.server.tasks_path),
            ("server.session_path", &self.server.session_path),
            ("server.users_path", &self.server.users_path),
        ] {
            if path.trim().is_empty() {
                return Err(TasklistError::Config(format!("{key} must not be empty")));
            }
        }
        if self.server.timeout_secs == 0 {
            return Err(TasklistError::Config(
                "server.timeout_secs must be >= 1".to_owned(),
            ));
        }
        if self.ui.tick_rate_ms == 0 {
            return Err(TasklistError::Config(
                "ui.tick_rate_ms must be >= 1".to_owned(),
            ));
        }
        if tracing_subscriber::EnvFilter::try_new(&self.log.level).is_err() {
            return Err(TasklistError::Config(format!(
                "log.level '{}' is not a valid filter",
                self.log.level
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    Bool,
    Int,
    String,
}

fn normalize_key(key: &str) -> String {
    match key {
        "server.url" => "server.base_url",
        "sort" => "ui.default_sort",
        _ => key,
    }
    .to_owned()
}

fn key_type(key: &str) -> Option<KeyType> {
    Some(match key {
        "server.base_url"
        | "server.tasks_path"
        | "server.session_path"
        | "server.users_path"
        | "server.cookie"
        | "ui.default_sort"
        | "log.level"
        | "log.file" => KeyType::String,

        "ui.default_reverse" | "ui.icons" => KeyType::Bool,

        "server.timeout_secs" | "ui.tick_rate_ms" => KeyType::Int,

        _ => return None,
    })
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected true|false, got '{other}'")),
    }
}

fn parse_int(s: &str) -> Result<i64, String> {
    s.trim()
        .parse::<i64>()
        .map_err(|e| format!("expected integer, got '{s}': {e}"))
}

fn apply_set(
    doc: &mut toml_edit::DocumentMut,
    key: &str,
    value: toml_edit::Item,
) -> anyhow::Result<()> {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let Some((leaf, tables)) = parts.split_last() else {
        return Err(TasklistError::InvalidConfigKey(key.to_owned()).into());
    };

    let mut cur = doc.as_table_mut();
    for seg in tables {
        if !cur.contains_key(seg) {
            let mut t = toml_edit::Table::new();
            t.set_implicit(true);
            cur.insert(seg, toml_edit::Item::Table(t));
        }
        cur = cur[seg].as_table_mut().ok_or_else(|| {
            TasklistError::Config(format!("cannot set {key}: '{seg}' is not a table"))
        })?;
    }
    cur.insert(leaf, value);
    Ok(())
}

fn lookup_value(cfg: &Config, key: &str) -> Option<serde_json::Value> {
    let mut v = serde_json::to_value(cfg).ok()?;
    for seg in key.split('.').filter(|s| !s.is_empty()) {
        match v {
            serde_json::Value::Object(mut map) => {
                v = map.remove(seg)?;
            }
            _ => return None,
        }
    }
    Some(v)
}

fn format_value_for_stdout(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_owned(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn config_validation_catches_invalid_values() {
        let mut cfg = Config::default();
        cfg.server.timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.server.base_url = "not a url".to_owned();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.server.users_path = " ".to_owned();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_set_and_get_dot_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        set_value_string_at_path(&path, "server.url", "https://tasks.example.org/").unwrap();
        assert_eq!(
            get_value_string_at_path(&path, "server.base_url")
                .unwrap()
                .as_deref(),
            Some("https://tasks.example.org/")
        );

        set_value_string_at_path(&path, "ui.icons", "false").unwrap();
        set_value_string_at_path(&path, "server.timeout_secs", "5").unwrap();
        assert_eq!(
            get_value_string_at_path(&path, "server.timeout_secs")
                .unwrap()
                .as_deref(),
            Some("5")
        );

        assert!(set_value_string_at_path(&path, "server.timeout_secs", "soon").is_err());
        assert!(set_value_string_at_path(&path, "server.timeout_secs", "0").is_err());
        assert!(set_value_string_at_path(&path, "nope.key", "1").is_err());

        let (_doc, cfg) = load_from_file(&path).unwrap();
        cfg.validate().unwrap();
        assert!(!cfg.ui.icons);
        assert_eq!(cfg.server.timeout_secs, 5);
        assert_eq!(cfg.server.tasks_path, "api/todos.php");
    }

    #[test]
    fn env_vars_expand_in_server_settings() {
        let cfg = ServerConfig {
            base_url: "http://${TASKLIST_TEST_UNSET_HOST_VAR}/".to_owned(),
            cookie: "PHPSESSID=$HOME".to_owned(),
            ..ServerConfig::default()
        };
        let resolved = cfg.resolved();
        assert_eq!(resolved.base_url, "http://${TASKLIST_TEST_UNSET_HOST_VAR}/");
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                resolved.cookie,
                format!("PHPSESSID={}", home.to_string_lossy())
            );
        }
    }
}
