//! Series manifest (`plugins.yaml`)
//!
//! The manifest maps a plugin name to its series, each series key being
//! `<kind>-<name>` and each value a Prometheus query:
//!
//! ```yaml
//! magic:
//!   gauge-magic_smoke_level: rate(go_memstats_alloc_bytes[20s])
//!   counter-magic_bunnies: go_memstats_frees_total
//! ```
//!
//! Loading is all-or-nothing: one malformed series key rejects the manifest.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, warn};

/// File name looked up in the config directories
pub const MANIFEST_FILE: &str = "plugins.yaml";

/// Errors raised while loading the manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Malformed series name '{0}'; must begin with 'gauge-' or 'counter-'")]
    MalformedSeries(String),
    #[error("Empty plugin name in manifest")]
    EmptyPluginName,
    #[error("{file} not found in any of: {searched:?}")]
    NotFound { file: String, searched: Vec<PathBuf> },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid manifest YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Metric kind, carried through to the collectd type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    Counter,
    Gauge,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Counter => "counter",
            SeriesKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metric to poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    kind: SeriesKind,
    name: String,
    query: String,
}

impl Series {
    /// Build a series from a manifest entry (`"gauge-foo"`, `"rate(x[1m])"`)
    pub fn parse(key: &str, query: impl Into<String>) -> Result<Self, ManifestError> {
        let malformed = || ManifestError::MalformedSeries(key.to_string());

        let (prefix, name) = key.split_once('-').ok_or_else(malformed)?;
        let kind = prefix.parse::<SeriesKind>().map_err(|_| malformed())?;
        if name.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            kind,
            name: name.to_string(),
            query: query.into(),
        })
    }

    pub fn kind(&self) -> SeriesKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

impl FromStr for SeriesKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(SeriesKind::Counter),
            "gauge" => Ok(SeriesKind::Gauge),
            _ => Err(()),
        }
    }
}

/// Named group of series, used as the collectd plugin component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub name: String,
    pub series: Vec<Series>,
}

/// YAML representation: plugin name -> (series key -> query).
/// A plugin with no entries (`magic:`) deserializes as `None`.
type RawManifest = BTreeMap<String, Option<BTreeMap<String, String>>>;

/// Parse manifest text into validated plugins
pub fn parse_manifest(text: &str) -> Result<Vec<Plugin>, ManifestError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw: RawManifest = serde_yaml::from_str(text)?;
    let mut plugins = Vec::with_capacity(raw.len());

    for (plugin_name, entries) in raw {
        if plugin_name.is_empty() {
            return Err(ManifestError::EmptyPluginName);
        }

        let series = entries
            .unwrap_or_default()
            .into_iter()
            .map(|(key, query)| Series::parse(&key, query))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Plugin '{}' declares {} series", plugin_name, series.len());
        plugins.push(Plugin {
            name: plugin_name,
            series,
        });
    }

    Ok(plugins)
}

/// Read and parse a manifest file
pub async fn load_manifest(path: &Path) -> Result<Vec<Plugin>, ManifestError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let plugins = parse_manifest(&text)?;
    let series_count: usize = plugins.iter().map(|p| p.series.len()).sum();

    if series_count == 0 {
        warn!("Manifest {} declares no series", path.display());
    } else {
        info!(
            "Loaded {} plugins ({} series) from {}",
            plugins.len(),
            series_count,
            path.display()
        );
    }

    Ok(plugins)
}

/// Locate `plugins.yaml` in the config directories and load it
pub async fn load_plugins(dirs: &[PathBuf]) -> Result<Vec<Plugin>, ManifestError> {
    let path = crate::config::find_config_file(MANIFEST_FILE, dirs).ok_or_else(|| {
        ManifestError::NotFound {
            file: MANIFEST_FILE.to_string(),
            searched: dirs.iter().map(|d| d.join(MANIFEST_FILE)).collect(),
        }
    })?;

    load_manifest(&path).await
}
