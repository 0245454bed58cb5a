//! Application configuration for hashstack.
//!
//! User config lives at `~/.hashstack/hashstack.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! Each section doubles as the value object handed to the component it
//! configures, so no component reads process-wide state.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HashstackError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "hashstack.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".hashstack";

// ---------------------------------------------------------------------------
// Config structs (matching hashstack.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Locator pool that units sample from.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Per-unit sample size bounds.
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Fetcher pool settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Excerpt truncation budgets.
    #[serde(default)]
    pub excerpt: ExcerptConfig,

    /// Units per bundle and bundles per super-bundle.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Where archives are written.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Publish collaborator settings.
    #[serde(default)]
    pub publish: PublishConfig,

    /// Ordered labeled pattern groups used to tag excerpts.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            sampling: SamplingConfig::default(),
            fetch: FetchConfig::default(),
            excerpt: ExcerptConfig::default(),
            batch: BatchConfig::default(),
            archive: ArchiveConfig::default(),
            publish: PublishConfig::default(),
            categories: default_categories(),
        }
    }
}

fn default_sources() -> Vec<String> {
    [
        "https://www.wikipedia.org/",
        "https://www.britannica.com/",
        "https://www.nature.com/",
        "https://www.sciencedirect.com/",
        "https://www.theguardian.com/",
        "https://www.reuters.com/",
        "https://www.bloomberg.com/",
        "https://www.nytimes.com/",
        "https://arxiv.org/",
        "https://www.ncbi.nlm.nih.gov/",
        "https://www.ieee.org/",
        "https://www.khanacademy.org/",
        "https://www.medium.com/",
        "https://www.ted.com/",
        "https://news.ycombinator.com/",
        "https://www.unesco.org/",
        "https://www.oecd.org/",
        "https://www.fastcompany.com/",
        "https://www.wired.com/",
        "https://www.economist.com/",
        "https://www.worldbank.org/",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[sampling]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Smallest sample size drawn for a unit.
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,

    /// Largest sample size drawn for a unit.
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_sources: default_min_sources(),
            max_sources: default_max_sources(),
        }
    }
}

fn default_min_sources() -> usize {
    10
}
fn default_max_sources() -> usize {
    30
}

/// Which fetch implementation backs the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// One request per locator bounded by the client timeout.
    #[default]
    Baseline,
    /// Hard wall-clock deadline per locator, short connect timeout.
    Accelerated,
}

impl FromStr for FetchMode {
    type Err = HashstackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "baseline" => Ok(Self::Baseline),
            "accelerated" => Ok(Self::Accelerated),
            other => Err(HashstackError::config(format!(
                "unknown fetch mode '{other}' (expected baseline or accelerated)"
            ))),
        }
    }
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Baseline => f.write_str("baseline"),
            Self::Accelerated => f.write_str("accelerated"),
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Worker cap `W` for one unit's fetch batch.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-request timeout for the baseline fetcher.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fetch implementation.
    #[serde(default)]
    pub mode: FetchMode,

    /// Hard deadline for the accelerated fetcher.
    #[serde(default = "default_accelerated_timeout_secs")]
    pub accelerated_timeout_secs: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Permit loopback/private hosts (mock servers in tests).
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            mode: FetchMode::default(),
            accelerated_timeout_secs: default_accelerated_timeout_secs(),
            user_agent: default_user_agent(),
            allow_private_hosts: false,
        }
    }
}

impl FetchConfig {
    /// Timeout for the selected mode.
    pub fn timeout(&self) -> Duration {
        match self.mode {
            FetchMode::Baseline => Duration::from_secs(self.timeout_secs),
            FetchMode::Accelerated => Duration::from_secs(self.accelerated_timeout_secs),
        }
    }
}

fn default_workers() -> usize {
    8
}
fn default_timeout_secs() -> u64 {
    12
}
fn default_accelerated_timeout_secs() -> u64 {
    4
}
fn default_user_agent() -> String {
    concat!("hashstack/", env!("CARGO_PKG_VERSION")).into()
}

/// `[excerpt]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcerptConfig {
    /// Character budget for a unit's snippet excerpt.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Character budget for the links-only excerpt.
    #[serde(default = "default_link_chars")]
    pub link_chars: usize,

    /// A sentence-boundary cut is only taken past this character offset.
    #[serde(default = "default_min_sentence_offset")]
    pub min_sentence_offset: usize,
}

impl Default for ExcerptConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            link_chars: default_link_chars(),
            min_sentence_offset: default_min_sentence_offset(),
        }
    }
}

fn default_max_chars() -> usize {
    600
}
fn default_link_chars() -> usize {
    280
}
fn default_min_sentence_offset() -> usize {
    200
}

/// `[batch]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Units embedded in every bundle.
    #[serde(default = "default_units_per_bundle")]
    pub units_per_bundle: usize,

    /// Bundles aggregated into every super-bundle.
    #[serde(default = "default_bundles_per_super")]
    pub bundles_per_super: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            units_per_bundle: default_units_per_bundle(),
            bundles_per_super: default_bundles_per_super(),
        }
    }
}

impl BatchConfig {
    /// Global index of the `n`th bundle (1-based) of a super-bundle.
    ///
    /// Super indexes start at 1. Indexes that do not fit a `u32` are errors.
    pub fn bundle_index(&self, super_index: u32, n: usize) -> Result<u32> {
        if super_index == 0 {
            return Err(HashstackError::validation("super index must be at least 1"));
        }
        let out_of_range = || {
            HashstackError::validation(format!(
                "bundle {n} of super-bundle {super_index} is out of range"
            ))
        };
        let per_super = u32::try_from(self.bundles_per_super).map_err(|_| out_of_range())?;
        let n = u32::try_from(n).map_err(|_| out_of_range())?;
        (super_index - 1)
            .checked_mul(per_super)
            .and_then(|base| base.checked_add(n))
            .ok_or_else(out_of_range)
    }
}

fn default_units_per_bundle() -> usize {
    10
}
fn default_bundles_per_super() -> usize {
    10
}

/// `[archive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Root directory for all archives.
    #[serde(default = "default_archive_root")]
    pub root: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: default_archive_root(),
        }
    }
}

impl ArchiveConfig {
    /// Local-only bundle archives.
    pub fn bundles_dir(&self) -> PathBuf {
        self.root.join("bundles")
    }

    /// Publishable super-bundle archives.
    pub fn super_dir(&self) -> PathBuf {
        self.root.join("super")
    }
}

fn default_archive_root() -> PathBuf {
    PathBuf::from("infinity_tokens")
}

/// `[publish]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Whether a run hands its super-bundle to the publisher at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Working tree the git commands run in.
    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,

    /// Remote to push to.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch (refspec) to push.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Prefix of every publish commit message.
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repo_dir: default_repo_dir(),
            remote: default_remote(),
            branch: default_branch(),
            commit_prefix: default_commit_prefix(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_repo_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_remote() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "HEAD".into()
}
fn default_commit_prefix() -> String {
    "[Infinity Grand Master]".into()
}

/// `[[categories]]` entry: one labeled pattern group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Family label written into the tag.
    pub name: String,
    /// Display colour written into the tag.
    pub color: String,
    /// Regex patterns, matched case-insensitively; the first hit wins.
    pub patterns: Vec<String>,
}

fn default_categories() -> Vec<CategoryConfig> {
    let group = |name: &str, color: &str, words: [&str; 4]| CategoryConfig {
        name: name.into(),
        color: color.into(),
        patterns: words.iter().map(|w| format!(r"\b{w}\b")).collect(),
    };

    vec![
        group("philosophy", "gold", ["meaning", "ethics?", "value", "purpose"]),
        group("science", "cyan", ["experiment", "data", "research", "model"]),
        group("technology", "magenta", ["algorithm", "compute", "software", "system"]),
        group("economy", "green", ["market", "price", "growth", "trade"]),
        group("society", "blue", ["culture", "education", "community", "policy"]),
        group("health", "red", ["health", "medicine", "therapy", "disease"]),
    ]
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject configurations a run cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(HashstackError::config("source pool is empty"));
        }
        for source in &self.sources {
            url::Url::parse(source)
                .map_err(|e| HashstackError::config(format!("invalid source '{source}': {e}")))?;
        }

        let sampling = &self.sampling;
        if sampling.min_sources == 0 || sampling.min_sources > sampling.max_sources {
            return Err(HashstackError::config(format!(
                "sampling bounds must satisfy 1 <= min ({}) <= max ({})",
                sampling.min_sources, sampling.max_sources
            )));
        }

        if self.fetch.workers == 0 {
            return Err(HashstackError::config("fetch.workers must be at least 1"));
        }

        if self.batch.units_per_bundle == 0 || self.batch.bundles_per_super == 0 {
            return Err(HashstackError::config("batch counts must be at least 1"));
        }

        if self.excerpt.min_sentence_offset >= self.excerpt.max_chars {
            return Err(HashstackError::config(
                "excerpt.min_sentence_offset must be below excerpt.max_chars",
            ));
        }

        for category in &self.categories {
            for pattern in &category.patterns {
                regex::Regex::new(pattern).map_err(|e| {
                    HashstackError::config(format!(
                        "category '{}' has invalid pattern '{pattern}': {e}",
                        category.name
                    ))
                })?;
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.hashstack/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HashstackError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.hashstack/hashstack.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HashstackError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        HashstackError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_at(&config_file_path()?)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| HashstackError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| HashstackError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| HashstackError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}
