use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::debug;

use crate::defaults::{DefaultParams, DefaultRunParams};
use crate::utils::console::ConsoleSink;
use crate::utils::errors::PilotError;

/// The user-settable fields of a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunField {
    DataPath,
    FastaPath,
    GtfPath,
    OutPath,
    Analysis,
    Genome,
    Adapter,
    Strandedness,
    Aligner,
    Cores,
    RunName,
}

impl RunField {
    /// The four paths that have no default and must be given before a run.
    pub fn is_required_path(&self) -> bool {
        matches!(
            self,
            RunField::DataPath | RunField::FastaPath | RunField::GtfPath | RunField::OutPath
        )
    }

    pub fn default_value(&self) -> Option<&'static str> {
        match self {
            RunField::Analysis => Some(DefaultParams::ANALYSIS),
            RunField::Genome => Some(DefaultParams::GENOME),
            RunField::Adapter => Some(DefaultParams::ADAPTER),
            RunField::Strandedness => Some(DefaultParams::STRANDEDNESS),
            RunField::Aligner => Some(DefaultParams::ALIGNER),
            RunField::Cores => Some(DefaultParams::CORES),
            RunField::RunName => Some(DefaultParams::RUN_NAME),
            _ => None,
        }
    }
}

/// The values the user has supplied so far. Unset fields stay unset here;
/// defaults are only substituted when a value is read through
/// [`RunConfiguration::effective_value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunConfiguration {
    values: BTreeMap<RunField, String>,
}

impl RunConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored value, without defaults.
    pub fn get(&self, field: RunField) -> Option<&str> {
        self.values.get(&field).map(|s| s.as_str())
    }

    pub fn effective_value(&self, field: RunField) -> Option<&str> {
        self.get(field).or_else(|| field.default_value())
    }

    /// Store `value` exactly as given, without notifying anyone. An empty
    /// value clears the field. Returns `true` if the stored value changed.
    pub fn assign(&mut self, field: RunField, value: &str) -> bool {
        if self.get(field).unwrap_or("") == value {
            return false;
        }
        if value.is_empty() {
            self.values.remove(&field);
        } else {
            self.values.insert(field, value.to_owned());
        }
        true
    }

    /// Store `value` and report the change on `sink`. Writing the value the
    /// field already holds is a no-op and produces no notification.
    pub fn set(&mut self, field: RunField, value: &str, sink: &dyn ConsoleSink) -> bool {
        let changed = self.assign(field, value);
        if changed {
            sink.write_line(&format!("Updated `{}` to: `{}`", field, value));
        }
        changed
    }

    pub fn unset(&mut self, field: RunField, sink: &dyn ConsoleSink) -> bool {
        let changed = self.values.remove(&field).is_some();
        if changed {
            match field.default_value() {
                Some(d) => sink.write_line(&format!("Cleared `{}`; the default `{}` will be used", field, d)),
                None => sink.write_line(&format!("Cleared `{}`", field)),
            }
        }
        changed
    }

    pub fn path(&self, field: RunField) -> Option<PathBuf> {
        self.get(field).map(PathBuf::from)
    }

    /// Checks that the required paths exist and that the core count is a
    /// positive integer. Only a run needs this; `set` accepts anything.
    pub fn validate(&self) -> Result<(), PilotError> {
        for field in RunField::iter().filter(|f| f.is_required_path()) {
            let p = self
                .path(field)
                .ok_or(PilotError::MissingRequiredPath(field))?;
            // the output directory is created on demand
            if field != RunField::OutPath && !p.exists() {
                return Err(PilotError::PathNotFound { field, path: p });
            }
        }
        self.core_count()?;
        Ok(())
    }

    pub fn core_count(&self) -> Result<u32, PilotError> {
        let cores = self.effective_value(RunField::Cores).unwrap_or_default();
        match cores.parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(PilotError::InvalidCoreCount(cores.to_owned())),
        }
    }

    /// The adapter option may name several adapters separated by commas.
    pub fn adapters(&self) -> Vec<String> {
        self.effective_value(RunField::Adapter)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn load(p: &Path) -> anyhow::Result<RunConfiguration> {
        if !p.is_file() {
            debug!("no saved run configuration at {}; starting empty", p.display());
            return Ok(RunConfiguration::new());
        }
        let f = std::fs::File::open(p)
            .with_context(|| format!("could not open run configuration {}", p.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("could not parse run configuration {}; consider removing it", p.display()))
    }

    pub fn save(&self, p: &Path) -> anyhow::Result<()> {
        std::fs::write(p, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("could not write {}", p.display()))
    }
}
