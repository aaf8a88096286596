use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::constants::HELPER_SUBCOMMAND;
use crate::utils::errors::PilotError;
use crate::utils::run_config::{RunConfiguration, RunField};

/// An external command and its arguments, in order.
/// The first element is the program that will be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentVector(Vec<String>);

impl ArgumentVector {
    pub fn program(&self) -> &str {
        self.0.first().map(|s| s.as_str()).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// A fresh [`std::process::Command`] for this vector.
    pub fn to_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(self.program());
        cmd.args(self.args());
        cmd
    }
}

impl<S: Into<String>> From<Vec<S>> for ArgumentVector {
    fn from(v: Vec<S>) -> Self {
        ArgumentVector(v.into_iter().map(Into::into).collect())
    }
}

/// Renders the vector as a command line, for logs and error messages.
impl fmt::Display for ArgumentVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_slice().join(" "))
    }
}

/// Turns a [`RunConfiguration`] into the argument vector of the pipeline driver.
///
/// The order and the spelling of the flags are what the driver parses; changing
/// either breaks it.
#[derive(Debug, Clone)]
pub struct ArgumentBuilder {
    launcher: Vec<String>,
}

impl ArgumentBuilder {
    /// `launcher` is the executable (and any leading tokens, such as an
    /// interpreter and script, or a subcommand) that precede the arguments.
    pub fn new<S: Into<String>>(launcher: Vec<S>) -> Self {
        Self {
            launcher: launcher.into_iter().map(Into::into).collect(),
        }
    }

    /// Launches the `helper` subcommand of the currently running executable.
    pub fn for_current_exe() -> anyhow::Result<Self> {
        let exe = std::env::current_exe().context("could not determine the path of this executable")?;
        Ok(Self::new(vec![
            exe.to_string_lossy().into_owned(),
            HELPER_SUBCOMMAND.to_string(),
        ]))
    }

    pub fn build(&self, config: &RunConfiguration) -> Result<ArgumentVector, PilotError> {
        let required = |field: RunField| -> Result<String, PilotError> {
            match config.get(field) {
                Some(v) if !v.is_empty() => Ok(v.to_owned()),
                _ => Err(PilotError::MissingRequiredPath(field)),
            }
        };
        let option = |field: RunField| -> String {
            config
                .effective_value(field)
                .unwrap_or_default()
                .to_owned()
        };

        let mut argv = self.launcher.clone();
        argv.push(required(RunField::DataPath)?);
        argv.push(required(RunField::FastaPath)?);
        argv.push(required(RunField::GtfPath)?);

        for (flag, field) in [
            ("--analysis", RunField::Analysis),
            ("--genome", RunField::Genome),
            ("--aligner", RunField::Aligner),
            ("--adapter", RunField::Adapter),
            ("--strandedness", RunField::Strandedness),
            ("--cores", RunField::Cores),
        ] {
            argv.push(flag.to_string());
            argv.push(option(field));
        }

        argv.push(option(RunField::RunName));
        argv.push(required(RunField::OutPath)?);
        Ok(ArgumentVector(argv))
    }
}

impl Default for ArgumentBuilder {
    fn default() -> Self {
        Self::new(vec!["bcbio-pilot", HELPER_SUBCOMMAND])
    }
}
