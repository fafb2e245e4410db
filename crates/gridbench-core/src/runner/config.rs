//! Benchmark configuration
//!
//! Settings are layered: defaults, then an optional file (TOML or JSON by
//! extension), then `GRIDBENCH_*` environment variables, then command line
//! overrides. The merged result is validated once at the end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};
use crate::executor::SolveMode;
use crate::llm::ProviderSettings;
use crate::recovery::RetryPolicy;
use crate::sandbox::PythonSandbox;
use crate::tasks::{TaskSelection, TaskSource};

const ENV_PREFIX: &str = "GRIDBENCH_";

fn default_dataset() -> PathBuf {
    PathBuf::from("data/dataset.json")
}

fn default_concurrency() -> usize {
    5
}

fn default_best_of() -> u32 {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_interval() -> usize {
    5
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_entry_point() -> String {
    "solve_task".to_string()
}

fn default_sandbox_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

/// Where and how often results are persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Completed tasks between incremental writes
    #[serde(default = "default_interval")]
    pub interval: usize,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            interval: default_interval(),
        }
    }
}

/// Interpreter used to run generated code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSettings {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Wall-clock limit per execution
    #[serde(default = "default_sandbox_timeout", with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            entry_point: default_entry_point(),
            timeout: default_sandbox_timeout(),
        }
    }
}

impl SandboxSettings {
    pub fn build(&self) -> PythonSandbox {
        PythonSandbox::new()
            .with_interpreter(&self.interpreter)
            .with_entry_point(&self.entry_point)
            .with_timeout(self.timeout)
    }
}

/// Configuration for a benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub mode: SolveMode,

    /// Dataset file, task directory or JSONL file
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,

    #[serde(default)]
    pub selection: TaskSelection,

    /// Tasks processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per task
    #[serde(default = "default_best_of")]
    pub best_of: u32,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub checkpoint: CheckpointSettings,

    #[serde(default)]
    pub sandbox: SandboxSettings,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            mode: SolveMode::default(),
            dataset: default_dataset(),
            selection: TaskSelection::default(),
            concurrency: default_concurrency(),
            best_of: default_best_of(),
            retry: RetryPolicy::default(),
            checkpoint: CheckpointSettings::default(),
            sandbox: SandboxSettings::default(),
        }
    }
}

impl BenchConfig {
    pub fn with_mode(mut self, mode: SolveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_best_of(mut self, best_of: u32) -> Self {
        self.best_of = best_of;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint.interval = interval;
        self
    }

    pub fn task_source(&self) -> TaskSource {
        TaskSource::detect(&self.dataset)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> EvalResult<()> {
        if self.concurrency == 0 {
            return Err(EvalError::config("concurrency must be at least 1"));
        }
        if self.best_of == 0 {
            return Err(EvalError::config("best_of must be at least 1"));
        }
        if self.checkpoint.interval == 0 {
            return Err(EvalError::config("checkpoint interval must be at least 1"));
        }
        let entry = &self.sandbox.entry_point;
        let valid_identifier = entry
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && entry.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_identifier {
            return Err(EvalError::config(format!(
                "entry point '{}' is not a valid identifier",
                entry
            )));
        }
        if self.provider.model.trim().is_empty() {
            return Err(EvalError::config("model must not be empty"));
        }
        Ok(())
    }

    /// Apply one `key = value` override
    pub fn apply_override(&mut self, key: &str, value: &str) -> EvalResult<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> EvalResult<T>
        where
            T::Err: std::fmt::Display,
        {
            value
                .trim()
                .parse()
                .map_err(|e| EvalError::config(format!("invalid value '{}' for {}: {}", value, key, e)))
        }

        fn duration(key: &str, value: &str) -> EvalResult<Duration> {
            humantime::parse_duration(value.trim())
                .map_err(|e| EvalError::config(format!("invalid duration '{}' for {}: {}", value, key, e)))
        }

        match key {
            "provider" => self.provider.kind = parse(key, value)?,
            "model" => self.provider.model = value.to_string(),
            "base_url" => self.provider.base_url = Some(value.to_string()),
            "api_key_env" => self.provider.api_key_env = Some(value.to_string()),
            "temperature" => self.provider.temperature = parse(key, value)?,
            "max_tokens" => self.provider.max_tokens = Some(parse(key, value)?),
            "chat_template" => self.provider.chat_template = parse(key, value)?,
            "mode" => self.mode = parse(key, value)?,
            "dataset" => self.dataset = PathBuf::from(value),
            "task_ids" => {
                self.selection.task_ids = value
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect();
            }
            "task_range" => self.selection.range = Some(parse(key, value)?),
            "max_tasks" => self.selection.max_tasks = Some(parse(key, value)?),
            "concurrency" => self.concurrency = parse(key, value)?,
            "best_of" => self.best_of = parse(key, value)?,
            "max_retries" => self.retry.max_retries = parse(key, value)?,
            "timeout" => self.retry.per_call_timeout = duration(key, value)?,
            "backoff" => self.retry.backoff = duration(key, value)?,
            "output_dir" => self.checkpoint.output_dir = PathBuf::from(value),
            "checkpoint_interval" => self.checkpoint.interval = parse(key, value)?,
            "interpreter" => self.sandbox.interpreter = value.to_string(),
            "entry_point" => self.sandbox.entry_point = value.to_string(),
            "sandbox_timeout" => self.sandbox.timeout = Some(duration(key, value)?),
            other => return Err(EvalError::config(format!("unknown setting '{}'", other))),
        }
        Ok(())
    }
}

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A TOML or JSON file
    File(PathBuf),
    /// `GRIDBENCH_*` variables from the process environment
    Environment,
    /// Explicit `key = value` overrides
    Overrides(Vec<(String, String)>),
}

/// Layered configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_file(self, path: impl AsRef<Path>) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    pub fn with_overrides(self, overrides: Vec<(String, String)>) -> Self {
        self.add_source(ConfigSource::Overrides(overrides))
    }

    /// Apply every source in order and validate the result
    pub fn load(self) -> EvalResult<BenchConfig> {
        let mut config = BenchConfig::default();
        for source in &self.sources {
            match source {
                ConfigSource::File(path) => {
                    tracing::debug!("Loading config from file: {}", path.display());
                    config = Self::load_file(path)?;
                }
                ConfigSource::Environment => {
                    tracing::debug!("Applying environment overrides");
                    Self::apply_env(&mut config, std::env::vars())?;
                }
                ConfigSource::Overrides(pairs) => {
                    for (key, value) in pairs {
                        config.apply_override(key, value)?;
                    }
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> EvalResult<BenchConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse_file(path, &content)
    }

    fn parse_file(path: &Path, content: &str) -> EvalResult<BenchConfig> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(content).map_err(|e| {
                EvalError::config(format!("invalid JSON config {}: {}", path.display(), e))
            }),
            _ => toml::from_str(content).map_err(|e| {
                EvalError::config(format!("invalid TOML config {}: {}", path.display(), e))
            }),
        }
    }

    /// Apply `GRIDBENCH_<KEY>` variables; unrelated variables are ignored
    pub fn apply_env(
        config: &mut BenchConfig,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> EvalResult<()> {
        let overrides: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(ENV_PREFIX)
                    .map(|key| (key.to_lowercase(), value))
            })
            .collect();

        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();
        for key in keys {
            config.apply_override(key, &overrides[key])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.best_of, 1);
        assert_eq!(config.checkpoint.interval, 5);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.per_call_timeout, Duration::from_secs(600));
        assert_eq!(config.sandbox.entry_point, "solve_task");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_file() {
        let content = r#"
            mode = "direct"
            concurrency = 8
            best_of = 3

            [provider]
            kind = "local_template"
            model = "phi-4"
            chat_template = "im_sep"

            [retry]
            per_call_timeout = "90s"

            [checkpoint]
            interval = 2

            [selection]
            task_ids = ["a", "b"]
        "#;
        let config = ConfigLoader::parse_file(Path::new("bench.toml"), content).unwrap();
        assert_eq!(config.mode, SolveMode::Direct);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.provider.kind, ProviderKind::LocalTemplate);
        assert_eq!(config.retry.per_call_timeout, Duration::from_secs(90));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.checkpoint.interval, 2);
        assert_eq!(config.checkpoint.output_dir, PathBuf::from("results"));
        assert_eq!(config.selection.task_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_json_file() {
        let content = r#"{"best_of": 2, "sandbox": {"timeout": "5s"}}"#;
        let config = ConfigLoader::parse_file(Path::new("bench.json"), content).unwrap();
        assert_eq!(config.best_of, 2);
        assert_eq!(config.sandbox.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.sandbox.interpreter, "python3");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BenchConfig::default();
        let vars = vec![
            ("GRIDBENCH_MODEL".to_string(), "qwen-72b".to_string()),
            ("GRIDBENCH_CONCURRENCY".to_string(), "12".to_string()),
            ("GRIDBENCH_TASK_RANGE".to_string(), "[0:10]".to_string()),
            ("GRIDBENCH_TIMEOUT".to_string(), "2m".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        ConfigLoader::apply_env(&mut config, vars).unwrap();

        assert_eq!(config.provider.model, "qwen-72b");
        assert_eq!(config.concurrency, 12);
        assert_eq!(config.selection.range.unwrap().end, Some(10));
        assert_eq!(config.retry.per_call_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_override_errors() {
        let mut config = BenchConfig::default();
        assert!(config.apply_override("concurrency", "many").is_err());
        assert!(config.apply_override("colour", "blue").is_err());
        assert!(config.apply_override("mode", "guess").is_err());
        config.apply_override("task_ids", "x, y,,z").unwrap();
        assert_eq!(config.selection.task_ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_validation() {
        assert!(BenchConfig::default().with_concurrency(0).validate().is_err());
        assert!(BenchConfig::default().with_best_of(0).validate().is_err());
        assert!(BenchConfig::default().with_checkpoint_interval(0).validate().is_err());

        let mut config = BenchConfig::default();
        config.sandbox.entry_point = "1solve".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_loader_layers_overrides_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        std::fs::write(&path, "best_of = 4\nconcurrency = 2\n").unwrap();

        let config = ConfigLoader::new()
            .with_file(&path)
            .with_overrides(vec![("concurrency".into(), "3".into())])
            .load()
            .unwrap();
        assert_eq!(config.best_of, 4);
        assert_eq!(config.concurrency, 3);

        let invalid = ConfigLoader::new()
            .with_overrides(vec![("best_of".into(), "0".into())])
            .load();
        assert!(invalid.is_err());
    }
}
