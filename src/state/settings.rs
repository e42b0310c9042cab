use anyhow::{Context, anyhow};
use bracket_engine::advance::AdvancePolicy;
use bracket_engine::config::TournamentConfig;
use bracket_engine::orchestrator::EngineSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_SNAPSHOT_PATH: &str = "bracketdesk-snapshot.json";

/// Optional settings, from the `desk` section of the config file or from the
/// environment. Later layers win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsOverrides {
    pub debounce_ms: Option<u64>,
    pub ledger_ttl_secs: Option<u64>,
    pub store_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub corrections: Option<AdvancePolicy>,
    pub log: Option<String>,
    pub snapshot_path: Option<PathBuf>,
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{key} must be a number, got '{raw}'")),
        None => Ok(None),
    }
}

impl SettingsOverrides {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let corrections = match lookup("BRACKETDESK_CORRECTIONS") {
            Some(raw) => Some(
                AdvancePolicy::parse(&raw)
                    .ok_or_else(|| anyhow!("BRACKETDESK_CORRECTIONS must be reject or overwrite"))?,
            ),
            None => None,
        };
        Ok(Self {
            debounce_ms: parse_var(&lookup, "BRACKETDESK_DEBOUNCE_MS")?,
            ledger_ttl_secs: parse_var(&lookup, "BRACKETDESK_LEDGER_TTL_SECS")?,
            store_retries: None,
            retry_delay_ms: None,
            corrections,
            log: lookup("BRACKETDESK_LOG"),
            snapshot_path: lookup("BRACKETDESK_SNAPSHOT").map(PathBuf::from),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeskSettings {
    pub engine: EngineSettings,
    pub log_filter: String,
    pub snapshot_path: PathBuf,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}

impl DeskSettings {
    pub fn resolve(layers: &[&SettingsOverrides]) -> Self {
        let mut settings = Self::default();
        for layer in layers {
            settings.apply(layer);
        }
        settings
    }

    fn apply(&mut self, overrides: &SettingsOverrides) {
        let engine = &mut self.engine;
        if let Some(ms) = overrides.debounce_ms {
            engine.debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = overrides.ledger_ttl_secs {
            engine.ledger_ttl = Duration::from_secs(secs);
        }
        if let Some(retries) = overrides.store_retries {
            engine.store_retries = retries;
        }
        if let Some(ms) = overrides.retry_delay_ms {
            engine.retry_delay = Duration::from_millis(ms);
        }
        if let Some(policy) = overrides.corrections {
            engine.corrections = policy;
        }
        if let Some(log) = &overrides.log {
            self.log_filter = log.clone();
        }
        if let Some(path) = &overrides.snapshot_path {
            self.snapshot_path = path.clone();
        }
    }
}

/// The config file: a tournament plus an optional `desk` settings section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeskFile {
    #[serde(flatten)]
    pub tournament: TournamentConfig,
    #[serde(default)]
    pub desk: SettingsOverrides,
}

impl DeskFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
