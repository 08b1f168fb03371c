//! Configuration for the chattail binary.
//!
//! [`Config::load`] reads a TOML file; every section and field is optional.
//! [`Config::defaults`] describes the setup used when no file is given: one
//! public chat publisher printing to stdout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use chattail_logs::{
    AlignerConfig, Category, CompiledFilter, DEFAULT_HISTORY, DEFAULT_MAX_LENGTH,
    DEFAULT_PUBLISHER_NAME, DEFAULT_WINDOW, FilterError, FilterPresets, SchedulerConfig,
};

/// Buffer polled when a publisher does not name one
pub const DEFAULT_BUFFER: &str = "messages";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default = "default_publishers", rename = "publisher")]
    pub publishers: Vec<PublisherConfig>,
}

/// `[scheduler]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_clock_interval_ms")]
    pub clock_interval_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_min_interval_ms() -> u64 { 600 }
fn default_clock_interval_ms() -> u64 { 100 }
fn default_fetch_timeout_ms() -> u64 { 2000 }

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            clock_interval_ms: default_clock_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl SchedulerSection {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            min_interval: Duration::from_millis(self.min_interval_ms),
            clock_interval: Duration::from_millis(self.clock_interval_ms.max(1)),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// `[source]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    /// Snapshot document written by the exporter
    pub path: Option<PathBuf>,
}

/// Stock publisher setups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    PublicChat,
    Clan,
    GameMessages,
}

impl Preset {
    fn filter(self) -> CompiledFilter {
        match self {
            Preset::PublicChat => FilterPresets::public_chat(),
            Preset::Clan => FilterPresets::clan(),
            Preset::GameMessages => FilterPresets::game_messages(),
        }
    }
}

/// Where a publisher's batches go
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Stdout,
    File { path: PathBuf },
}

/// One `[[publisher]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    #[serde(default = "default_publisher_name")]
    pub name: String,
    #[serde(default = "default_buffer")]
    pub buffer: String,
    #[serde(default = "default_every_ticks")]
    pub every_ticks: u64,
    #[serde(default = "default_history")]
    pub history: usize,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub senders: Vec<String>,
    #[serde(default)]
    pub require_name: bool,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub invert: bool,
    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,
}

fn default_publisher_name() -> String { DEFAULT_PUBLISHER_NAME.to_string() }
fn default_buffer() -> String { DEFAULT_BUFFER.to_string() }
fn default_every_ticks() -> u64 { 1 }
fn default_history() -> usize { DEFAULT_HISTORY }
fn default_window() -> usize { DEFAULT_WINDOW }
fn default_max_length() -> usize { DEFAULT_MAX_LENGTH }
fn default_sinks() -> Vec<SinkConfig> { vec![SinkConfig::Stdout] }
fn default_publishers() -> Vec<PublisherConfig> { vec![PublisherConfig::public_chat()] }

impl PublisherConfig {
    /// Player-authored public chat printed to stdout
    pub fn public_chat() -> Self {
        Self {
            name: "public-chat".to_string(),
            buffer: default_buffer(),
            every_ticks: default_every_ticks(),
            history: default_history(),
            window: default_window(),
            max_length: default_max_length(),
            preset: Some(Preset::PublicChat),
            categories: Vec::new(),
            senders: Vec::new(),
            require_name: false,
            pattern: String::new(),
            case_insensitive: false,
            invert: false,
            sinks: default_sinks(),
        }
    }

    pub fn aligner_config(&self) -> AlignerConfig {
        AlignerConfig {
            history: self.history,
            window: self.window,
            max_length: self.max_length,
        }
    }

    /// Build the entry filter: preset first, then the explicit fields on top
    pub fn compile_filter(&self) -> Result<CompiledFilter, FilterError> {
        let mut filter = self
            .preset
            .map_or_else(CompiledFilter::any, Preset::filter)
            .with_pattern(&self.pattern, self.case_insensitive)?
            .with_categories(self.categories.iter().map(|name| Category::from_name(name)))
            .with_senders(self.senders.iter().cloned());

        if self.require_name {
            filter = filter.requiring_display_name();
        }
        if self.invert {
            filter = filter.inverted();
        }
        Ok(filter)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Built-in defaults, without touching the filesystem
    pub fn defaults() -> Self {
        Self {
            scheduler: SchedulerSection::default(),
            source: SourceSection::default(),
            publishers: default_publishers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chattail_logs::Entry;

    #[test]
    fn test_defaults() {
        let config = Config::defaults();
        assert_eq!(config.scheduler.min_interval_ms, 600);
        assert_eq!(config.scheduler.fetch_timeout(), Duration::from_secs(2));
        assert_eq!(config.publishers.len(), 1);

        let publisher = &config.publishers[0];
        assert_eq!(publisher.preset, Some(Preset::PublicChat));
        assert_eq!(publisher.aligner_config(), AlignerConfig::default());
        assert_eq!(publisher.sinks, vec![SinkConfig::Stdout]);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.publishers.len(), 1);
        assert!(config.source.path.is_none());
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
            [scheduler]
            min_interval_ms = 1200

            [source]
            path = "/tmp/snapshot.json"

            [[publisher]]
            name = "clan"
            preset = "clan"
            every_ticks = 2
            window = 5
            senders = ["Iron Bros"]
            sinks = [{ kind = "file", path = "clan.log" }, { kind = "stdout" }]

            [[publisher]]
            buffer = "game"
            categories = ["game_message"]
            pattern = "level"
            case_insensitive = true
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.min_interval_ms, 1200);
        assert_eq!(config.scheduler.fetch_timeout_ms, 2000);
        assert_eq!(config.source.path, Some(PathBuf::from("/tmp/snapshot.json")));
        assert_eq!(config.publishers.len(), 2);

        let clan = &config.publishers[0];
        assert_eq!(clan.every_ticks, 2);
        assert_eq!(clan.aligner_config().window, 5);
        assert_eq!(
            clan.sinks,
            vec![
                SinkConfig::File {
                    path: PathBuf::from("clan.log")
                },
                SinkConfig::Stdout
            ]
        );

        let game = &config.publishers[1];
        assert_eq!(game.name, DEFAULT_PUBLISHER_NAME);
        let filter = game.compile_filter().unwrap();
        assert!(filter.matches(&Entry::new("LEVEL up!", Category::GameMessage)));
        assert!(!filter.matches(&Entry::new("level up!", Category::PublicChat)));
    }

    #[test]
    fn test_preset_filter_with_overrides() {
        let mut publisher = PublisherConfig::public_chat();
        publisher.invert = true;
        let filter = publisher.compile_filter().unwrap();
        assert!(!filter.matches(&Entry::new("hi", Category::PublicChat).with_display_name("Bob")));
        assert!(filter.matches(&Entry::new("Welcome.", Category::GameMessage)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Config::parse("[scheduler]\nspeed = 3\n").is_err());
    }

    #[test]
    fn test_bad_pattern() {
        let mut publisher = PublisherConfig::public_chat();
        publisher.pattern = "(".to_string();
        assert!(publisher.compile_filter().is_err());
    }
}
