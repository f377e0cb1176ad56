//! YAML configuration.
//!
//! `config.yaml` is looked up in the working directory first, then in the
//! project root. Relative paths inside it are resolved against the folder the
//! file was read from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name searched for by [`Config::discover`].
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration file not found, searched: {0}")]
    NotFound(String),

    #[error("download_batch_size must be positive, got {0}")]
    InvalidBatchSize(i64),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default)]
    pub verbatim_mapping: VerbatimMappingConfig,
    #[serde(default)]
    pub llm_mapping: LlmMappingConfig,
    #[serde(default)]
    pub term_cleanup: TermCleanupConfig,
    /// Folder relative paths are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_log_folder")]
    pub log_folder: PathBuf,
    #[serde(default = "default_terms_folder")]
    pub terms_folder: PathBuf,
    #[serde(default = "default_batch_size")]
    pub download_batch_size: i64,
    #[serde(default = "default_index_file")]
    pub verbatim_mapping_index_file: PathBuf,
    #[serde(default = "default_responses_folder")]
    pub llm_mapper_responses_folder: PathBuf,
    /// Worker threads for index building; 0 means one per CPU
    #[serde(default)]
    pub max_cores: usize,
    #[serde(default)]
    pub show_progress: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_folder: default_log_folder(),
            terms_folder: default_terms_folder(),
            download_batch_size: default_batch_size(),
            verbatim_mapping_index_file: default_index_file(),
            llm_mapper_responses_folder: default_responses_folder(),
            max_cores: 0,
            show_progress: false,
        }
    }
}

/// Which vocabulary rows feed the verbatim index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerbatimMappingConfig {
    #[serde(default)]
    pub vocabularies: Vec<String>,
    #[serde(default)]
    pub domain_ids: Vec<String>,
    /// Include classification (`C`) concepts next to standard (`S`) ones
    #[serde(default)]
    pub include_classification_concepts: bool,
    #[serde(default = "default_true")]
    pub include_synonyms: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmMappingConfig {
    /// One system prompt per step, run in order
    #[serde(default)]
    pub system_prompts: Vec<String>,
    #[serde(default)]
    pub context: ContextSettings,
}

/// Candidate attributes included in the initial prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default = "default_true")]
    pub include_target_class: bool,
    #[serde(default = "default_true")]
    pub include_target_parents: bool,
    #[serde(default = "default_true")]
    pub include_target_domain: bool,
    #[serde(default)]
    pub include_target_vocabulary: bool,
    #[serde(default)]
    pub include_target_children: bool,
    #[serde(default = "default_true")]
    pub include_target_synonyms: bool,
    /// Re-insert full candidate rows into the first step's JSON answer
    #[serde(default)]
    pub re_insert_target_details: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            include_target_class: true,
            include_target_parents: true,
            include_target_domain: true,
            include_target_vocabulary: false,
            include_target_children: false,
            include_target_synonyms: true,
            re_insert_target_details: false,
        }
    }
}

impl ContextSettings {
    /// Only concept ID and name.
    pub fn minimal() -> Self {
        Self {
            include_target_class: false,
            include_target_parents: false,
            include_target_domain: false,
            include_target_vocabulary: false,
            include_target_children: false,
            include_target_synonyms: false,
            re_insert_target_details: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermCleanupConfig {
    #[serde(default)]
    pub system_prompt: String,
}

fn default_log_folder() -> PathBuf {
    PathBuf::from("logs")
}

fn default_terms_folder() -> PathBuf {
    PathBuf::from("terms")
}

fn default_batch_size() -> i64 {
    100_000
}

fn default_index_file() -> PathBuf {
    PathBuf::from("index/verbatim_index.bin")
}

fn default_responses_folder() -> PathBuf {
    PathBuf::from("llm_responses")
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Parse and validate configuration text. Relative paths resolve against `base_dir`.
    pub fn from_yaml_str(text: &str, base_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let mut config: Config = serde_yaml::from_str(text)?;
        config.base_dir = base_dir.into();
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_yaml_str(&text, base_dir)
    }

    /// Find `config.yaml` in the working directory, then in `project_root`.
    pub fn discover(project_root: Option<&Path>) -> ConfigResult<Self> {
        let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(root) = project_root {
            candidates.push(root.join(CONFIG_FILE_NAME));
        }

        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Self::load(path),
            None => Err(ConfigError::NotFound(
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.system.download_batch_size <= 0 {
            return Err(ConfigError::InvalidBatchSize(self.system.download_batch_size));
        }
        Ok(())
    }

    /// Resolve a configured path against the configuration folder.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn log_folder(&self) -> PathBuf {
        self.resolve(&self.system.log_folder)
    }

    pub fn terms_folder(&self) -> PathBuf {
        self.resolve(&self.system.terms_folder)
    }

    pub fn index_file(&self) -> PathBuf {
        self.resolve(&self.system.verbatim_mapping_index_file)
    }

    pub fn responses_folder(&self) -> PathBuf {
        self.resolve(&self.system.llm_mapper_responses_folder)
    }

    /// Validated download batch size.
    pub fn download_batch_size(&self) -> usize {
        self.system.download_batch_size.max(1) as usize
    }

    /// Worker count for index building.
    pub fn max_cores(&self) -> usize {
        effective_cores(self.system.max_cores)
    }
}

/// Map a configured worker count to an actual one (0 → number of CPUs).
pub fn effective_cores(max_cores: usize) -> usize {
    if max_cores == 0 {
        num_cpus::get()
    } else {
        max_cores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
system:
  terms_folder: data/terms
  download_batch_size: 500
  verbatim_mapping_index_file: /tmp/verbatim.bin
  max_cores: 4
verbatim_mapping:
  vocabularies: [SNOMED]
  domain_ids: [Condition]
llm_mapping:
  system_prompts:
    - "Pick the best match."
  context:
    include_target_children: true
term_cleanup:
  system_prompt: "Remove modifiers."
"#;

    #[test]
    fn test_parse_and_resolve() {
        let config = Config::from_yaml_str(SAMPLE, "/project").unwrap();

        assert_eq!(config.download_batch_size(), 500);
        assert_eq!(config.max_cores(), 4);
        assert_eq!(config.terms_folder(), PathBuf::from("/project/data/terms"));
        assert_eq!(config.index_file(), PathBuf::from("/tmp/verbatim.bin"));
        assert_eq!(config.responses_folder(), PathBuf::from("/project/llm_responses"));
        assert!(config.verbatim_mapping.include_synonyms);
        assert_eq!(config.verbatim_mapping.vocabularies, vec!["SNOMED".to_string()]);
    }

    #[test]
    fn test_context_defaults_with_override() {
        let config = Config::from_yaml_str(SAMPLE, ".").unwrap();
        let context = config.llm_mapping.context;

        assert!(context.include_target_children);
        assert!(context.include_target_class);
        assert!(!context.include_target_vocabulary);
        assert!(!context.re_insert_target_details);
    }

    #[test]
    fn test_non_positive_batch_size_rejected() {
        let text = SAMPLE.replace("download_batch_size: 500", "download_batch_size: 0");
        assert!(matches!(
            Config::from_yaml_str(&text, "."),
            Err(ConfigError::InvalidBatchSize(0))
        ));

        let text = SAMPLE.replace("download_batch_size: 500", "download_batch_size: -5");
        assert!(matches!(
            Config::from_yaml_str(&text, "."),
            Err(ConfigError::InvalidBatchSize(-5))
        ));
    }

    #[test]
    fn test_prompts_optional_without_llm() {
        let config = Config::from_yaml_str("system:\n  max_cores: 1\n", ".").unwrap();
        assert!(config.llm_mapping.system_prompts.is_empty());
        assert_eq!(config.max_cores(), 1);
    }

    #[test]
    fn test_load_from_file_uses_file_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.terms_folder(), dir.path().join("data/terms"));
    }

    #[test]
    fn test_zero_cores_means_all() {
        assert_eq!(effective_cores(0), num_cpus::get());
        assert_eq!(effective_cores(3), 3);
    }
}
