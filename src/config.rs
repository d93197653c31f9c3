use directories::ProjectDirs;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use tracing::{debug, info, warn};

use crate::resolver::{AgentEntry, CatalogKey};
use crate::store::DEFAULT_RECENT_AGENTS_LIMIT;

/// File name of the project-level override file.
pub const PROJECT_CONFIG_FILE: &str = ".instant-req";

/// Status of config file loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLoadStatus {
    /// Config loaded successfully from existing file
    Loaded,
    /// Created default config file (first run)
    Created,
    /// Error occurred during loading, using defaults.
    Error(String),
}

fn default_catalog() -> Vec<AgentEntry> {
    vec![AgentEntry::general_purpose()]
}

/// Preset agent catalogs offered in the selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub spec_writers: Vec<AgentEntry>,
    pub implementers: Vec<AgentEntry>,
    pub issue_explorers: Vec<AgentEntry>,
    pub system_architects: Vec<AgentEntry>,
    pub senior_engineers: Vec<AgentEntry>,
    pub code_reviewers: Vec<AgentEntry>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            spec_writers: default_catalog(),
            implementers: default_catalog(),
            issue_explorers: default_catalog(),
            system_architects: default_catalog(),
            senior_engineers: default_catalog(),
            code_reviewers: default_catalog(),
        }
    }
}

impl AgentsConfig {
    pub fn catalog(&self, key: CatalogKey) -> &[AgentEntry] {
        match key {
            CatalogKey::SpecWriters => &self.spec_writers,
            CatalogKey::Implementers => &self.implementers,
            CatalogKey::IssueExplorers => &self.issue_explorers,
            CatalogKey::SystemArchitects => &self.system_architects,
            CatalogKey::SeniorEngineers => &self.senior_engineers,
            CatalogKey::CodeReviewers => &self.code_reviewers,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. `~` is expanded.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Recent agents history configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub recent_agents_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            recent_agents_limit: DEFAULT_RECENT_AGENTS_LIMIT,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Expand `~` to home directory in a path string
    pub fn expand_tilde(path: &str) -> PathBuf {
        if let Some(stripped) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(path)
    }

    /// Get the expanded storage database path
    pub fn storage_path(&self) -> PathBuf {
        Self::expand_tilde(&self.storage.path)
    }
}

/// Partial agents configuration for project overrides.
/// A catalog present in the project file replaces the global one wholesale.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialAgentsConfig {
    pub spec_writers: Option<Vec<AgentEntry>>,
    pub implementers: Option<Vec<AgentEntry>>,
    pub issue_explorers: Option<Vec<AgentEntry>>,
    pub system_architects: Option<Vec<AgentEntry>>,
    pub senior_engineers: Option<Vec<AgentEntry>>,
    pub code_reviewers: Option<Vec<AgentEntry>>,
}

/// Partial storage configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialStorageConfig {
    pub path: Option<String>,
}

/// Partial logging configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialLoggingConfig {
    pub level: Option<String>,
}

/// Partial history configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialHistoryConfig {
    pub recent_agents_limit: Option<usize>,
}

/// Project-specific configuration where every field is optional.
/// Parsed from `.instant-req` files. Fields that are `None` inherit from the global config.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialConfig {
    pub agents: PartialAgentsConfig,
    pub storage: PartialStorageConfig,
    pub logging: PartialLoggingConfig,
    pub history: PartialHistoryConfig,
}

fn pick<T: Clone>(project: &Option<T>, global: &T) -> T {
    project.clone().unwrap_or_else(|| global.clone())
}

/// Merge a global config with a project-level partial config.
/// Project values override global values where present.
pub fn merge_config(global: &Config, project: &PartialConfig) -> Config {
    let agents = &project.agents;
    Config {
        agents: AgentsConfig {
            spec_writers: pick(&agents.spec_writers, &global.agents.spec_writers),
            implementers: pick(&agents.implementers, &global.agents.implementers),
            issue_explorers: pick(&agents.issue_explorers, &global.agents.issue_explorers),
            system_architects: pick(&agents.system_architects, &global.agents.system_architects),
            senior_engineers: pick(&agents.senior_engineers, &global.agents.senior_engineers),
            code_reviewers: pick(&agents.code_reviewers, &global.agents.code_reviewers),
        },
        storage: StorageConfig {
            path: pick(&project.storage.path, &global.storage.path),
        },
        logging: LoggingConfig {
            level: pick(&project.logging.level, &global.logging.level),
        },
        history: HistoryConfig {
            recent_agents_limit: project
                .history
                .recent_agents_limit
                .unwrap_or(global.history.recent_agents_limit),
        },
    }
}

/// Loaded configuration with metadata
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_path: PathBuf,
    pub project_config_path: Option<PathBuf>,
    pub status: ConfigLoadStatus,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "instant-req", "instant-req")
}

/// Get the platform-appropriate config directory
fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default database location under the platform data directory.
fn default_storage_path() -> String {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("state.db").to_string_lossy().into_owned())
        .unwrap_or_else(|| "./instant-req.db".to_string())
}

/// Get the full path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.instant-req in current working directory).
pub fn get_project_config_path() -> Option<PathBuf> {
    let path = std::env::current_dir().ok()?.join(PROJECT_CONFIG_FILE);
    if path.exists() { Some(path) } else { None }
}

/// Load a project config from the given path.
fn load_project_config(path: &Path) -> Result<PartialConfig, String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_read_failed");
        format!("Failed to read {}: {}", PROJECT_CONFIG_FILE, e)
    })?;

    toml::from_str::<PartialConfig>(&contents).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_parse_failed");
        format!("Invalid {}: {}", PROJECT_CONFIG_FILE, e)
    })
}

/// Load configuration from file, environment, and defaults
pub fn load_config() -> LoadedConfig {
    let config_path = match get_config_path() {
        Some(path) => path,
        None => {
            warn!("config_dir_unavailable");
            return LoadedConfig {
                config: apply_env_overrides(Config::default()),
                config_path: PathBuf::from("config.toml"),
                project_config_path: None,
                status: ConfigLoadStatus::Error("Could not determine config directory".to_string()),
            };
        }
    };

    debug!(path = ?config_path, "config_path_resolved");

    let (mut config, mut status) = load_or_create_config(&config_path);

    let project_config_path = get_project_config_path();
    if let Some(ref project_path) = project_config_path {
        match load_project_config(project_path) {
            Ok(partial) => {
                config = merge_config(&config, &partial);
                info!(path = ?project_path, "project_config_loaded");
            }
            Err(e) => {
                warn!(path = ?project_path, error = %e, "project_config_error");
                if !matches!(status, ConfigLoadStatus::Error(_)) {
                    status = ConfigLoadStatus::Error(e);
                }
            }
        }
    }

    let config = apply_env_overrides(config);

    LoadedConfig {
        config,
        config_path,
        project_config_path,
        status,
    }
}

/// Result of reloading configuration, including separate error tracking.
pub struct ReloadedConfig {
    pub config: Config,
    pub global_error: Option<String>,
    pub project_error: Option<String>,
}

/// Reload configuration from global and optional project config paths.
/// Always returns a usable config (falls back to defaults).
pub fn reload_config(config_path: &Path, project_config_path: Option<&Path>) -> ReloadedConfig {
    let (mut config, global_error) = match fs::read_to_string(config_path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(c) => (c, None),
            Err(e) => {
                warn!(path = ?config_path, error = %e, "config_reload_parse_failed");
                (Config::default(), Some(format!("Invalid config: {}", e)))
            }
        },
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_reload_read_failed");
            (
                Config::default(),
                Some(format!("Failed to read config: {}", e)),
            )
        }
    };

    let project_error = match project_config_path {
        Some(project_path) if project_path.exists() => match load_project_config(project_path) {
            Ok(partial) => {
                config = merge_config(&config, &partial);
                None
            }
            Err(e) => Some(e),
        },
        // Project file deleted or never present: global config only.
        _ => None,
    };

    let config = apply_env_overrides(config);
    info!(path = ?config_path, "config_reloaded");

    ReloadedConfig {
        config,
        global_error,
        project_error,
    }
}

/// Save a config to the given file path.
pub fn save_config(config: &Config, config_path: &Path) -> Result<(), String> {
    let toml_content = toml::to_string_pretty(config).map_err(|e| {
        warn!(error = %e, "config_save_serialize_failed");
        format!("Failed to serialize config: {}", e)
    })?;

    fs::write(config_path, &toml_content).map_err(|e| {
        warn!(path = ?config_path, error = %e, "config_save_write_failed");
        format!("Failed to write config: {}", e)
    })?;

    info!(path = ?config_path, "config_saved");
    Ok(())
}

/// Load config from file, or create default if not exists
fn load_or_create_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    match fs::read_to_string(config_path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                info!(path = ?config_path, "config_loaded");
                (config, ConfigLoadStatus::Loaded)
            }
            Err(e) => {
                warn!(path = ?config_path, error = %e, "config_malformed");
                (
                    Config::default(),
                    ConfigLoadStatus::Error(format!("Malformed TOML: {}", e)),
                )
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_default_config(config_path),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(path = ?config_path, "config_permission_denied");
            (
                Config::default(),
                ConfigLoadStatus::Error("Permission denied reading config".to_string()),
            )
        }
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_read_failed");
            (
                Config::default(),
                ConfigLoadStatus::Error(format!("Read error: {}", e)),
            )
        }
    }
}

/// Create the default config file
fn create_default_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    let config = Config::default();

    if let Some(parent) = config_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(path = ?parent, error = %e, "config_dir_create_failed");
        return (
            config,
            ConfigLoadStatus::Error(format!("Could not create config directory: {}", e)),
        );
    }

    match save_config(&config, config_path) {
        Ok(()) => {
            info!(path = ?config_path, "default_config_created");
            (config, ConfigLoadStatus::Created)
        }
        Err(e) => (config, ConfigLoadStatus::Error(e)),
    }
}

/// Apply environment variable overrides to config
fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |key| env::var(key).ok())
}

fn apply_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(path) = lookup("INSTANT_REQ_DB") {
        debug!("storage_path_from_env");
        config.storage.path = path;
    }

    if let Some(level) = lookup("INSTANT_REQ_LOG") {
        debug!("log_level_from_env");
        config.logging.level = level;
    }

    config
}

/// Watches the config files for changes.
///
/// The watch is placed on the parent directories, since editors often replace
/// files by rename rather than writing in place.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<notify::Event>>,
    files: Vec<PathBuf>,
}

impl ConfigWatcher {
    pub fn new(config_path: &Path, project_config_path: Option<&Path>) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)?;

        let mut files = vec![config_path.to_path_buf()];
        if let Some(project) = project_config_path {
            files.push(project.to_path_buf());
        }

        let mut watched_dirs: Vec<PathBuf> = Vec::new();
        for file in &files {
            let Some(dir) = file.parent().filter(|d| d.is_dir()) else {
                continue;
            };
            if watched_dirs.iter().any(|d| d == dir) {
                continue;
            }
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            watched_dirs.push(dir.to_path_buf());
        }
        debug!(dirs = ?watched_dirs, "config_watch_started");

        Ok(Self {
            _watcher: watcher,
            rx,
            files,
        })
    }

    /// Drain pending events; true if any touched a watched config file.
    pub fn changed(&self) -> bool {
        let mut changed = false;
        loop {
            match self.rx.try_recv() {
                Ok(Ok(event)) => {
                    if event
                        .paths
                        .iter()
                        .any(|p| self.files.iter().any(|f| p.file_name() == f.file_name()))
                    {
                        changed = true;
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "config_watch_error"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }
}
