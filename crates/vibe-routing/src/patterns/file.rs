use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;

use super::{Pattern, PatternRepository, normalize, validate};
use crate::error::PatternError;

/// On-disk pattern file layout
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternFile {
    version: String,
    #[serde(default)]
    patterns: Vec<Pattern>,
}

#[derive(Debug)]
struct Loaded {
    version: String,
    patterns: Arc<[Pattern]>,
}

/// Versioned pattern set loaded from a TOML file
///
/// ```toml
/// version = "2025-01"
///
/// [[patterns]]
/// id = "bookings"
/// domains = ["appointment", "booking"]
/// user_types = ["small_business"]
/// average_token_savings = 40
///
/// [patterns.requirements]
/// implicit = ["calendar sync"]
/// technical = { frontend = "react" }
/// ```
#[derive(Debug)]
pub struct TomlPatternRepository {
    path: PathBuf,
    loaded: RwLock<Loaded>,
}

impl TomlPatternRepository {
    /// Load and validate a pattern file
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PatternError> {
        let path = path.into();
        let loaded = read(&path)?;

        tracing::info!(
            path = %path.display(),
            version = %loaded.version,
            patterns = loaded.patterns.len(),
            "loaded pattern file"
        );

        Ok(Self {
            path,
            loaded: RwLock::new(loaded),
        })
    }

    /// Re-read the file, keeping the current set if the new one is invalid
    ///
    /// Returns the version now being served.
    pub fn reload(&self) -> Result<String, PatternError> {
        let fresh = read(&self.path)?;
        let version = fresh.version.clone();

        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        if loaded.version != fresh.version {
            tracing::info!(from = %loaded.version, to = %fresh.version, "pattern set updated");
        }
        *loaded = fresh;

        Ok(version)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PatternRepository for TomlPatternRepository {
    fn version(&self) -> String {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
            .clone()
    }

    fn patterns(&self) -> Result<Arc<[Pattern]>, PatternError> {
        Ok(Arc::clone(
            &self.loaded.read().unwrap_or_else(PoisonError::into_inner).patterns,
        ))
    }
}

fn read(path: &Path) -> Result<Loaded, PatternError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PatternError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse(&raw)
}

fn parse(raw: &str) -> Result<Loaded, PatternError> {
    let file: PatternFile = toml::from_str(raw).map_err(|e| PatternError::Parse(e.to_string()))?;

    if file.version.trim().is_empty() {
        return Err(PatternError::Invalid("version must not be empty".to_owned()));
    }

    let mut patterns = file.patterns;
    validate(&patterns)?;
    normalize(&mut patterns);

    Ok(Loaded {
        version: file.version,
        patterns: patterns.into(),
    })
}
