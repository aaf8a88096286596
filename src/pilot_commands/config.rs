use crate::utils::console::StdoutSink;
use crate::utils::constants::RUN_CONFIG_PATH;
use crate::utils::run_config::{RunConfiguration, RunField};

use anyhow::Result;
use std::path::Path;
use strum::IntoEnumIterator;
use tabled::{settings::Style, Table, Tabled};
use tracing::info;

use super::ConfigCommands;

#[derive(Tabled)]
struct FieldEntry {
    field: String,
    stored: String,
    effective: String,
}

fn field_entries(run_config: &RunConfiguration) -> Vec<FieldEntry> {
    RunField::iter()
        .map(|f| FieldEntry {
            field: f.to_string(),
            stored: run_config.get(f).unwrap_or("").to_string(),
            effective: run_config.effective_value(f).unwrap_or("<required>").to_string(),
        })
        .collect()
}

/// ### Program Name
/// bcbio-pilot config
///
/// Changes are saved as soon as they are made; nothing is validated until a run
/// is started.
pub fn configure<T: AsRef<Path>>(pilot_home_path: T, command: ConfigCommands) -> Result<()> {
    let run_config_p = pilot_home_path.as_ref().join(RUN_CONFIG_PATH);
    let mut run_config = RunConfiguration::load(&run_config_p)?;

    match command {
        ConfigCommands::Set { field, value } => {
            if run_config.set(field, &value, &StdoutSink) {
                run_config.save(&run_config_p)?;
                info!("saved the run configuration to {}", run_config_p.display());
            }
        }
        ConfigCommands::Unset { field } => {
            if run_config.unset(field, &StdoutSink) {
                run_config.save(&run_config_p)?;
                info!("saved the run configuration to {}", run_config_p.display());
            }
        }
        ConfigCommands::Show {} => {
            println!(
                "{}",
                Table::new(field_entries(&run_config)).with(Style::rounded())
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_unset_persist() {
        let home = tempfile::tempdir().unwrap();
        configure(
            home.path(),
            ConfigCommands::Set {
                field: RunField::Genome,
                value: String::from("mm10"),
            },
        )
        .unwrap();
        let rc = RunConfiguration::load(&home.path().join(RUN_CONFIG_PATH)).unwrap();
        assert_eq!(rc.get(RunField::Genome), Some("mm10"));

        configure(home.path(), ConfigCommands::Unset { field: RunField::Genome }).unwrap();
        let rc = RunConfiguration::load(&home.path().join(RUN_CONFIG_PATH)).unwrap();
        assert_eq!(rc.get(RunField::Genome), None);
        assert_eq!(rc.effective_value(RunField::Genome), Some("hg38"));
    }

    #[test]
    fn entries_show_defaults_and_required_fields() {
        let mut rc = RunConfiguration::new();
        rc.assign(RunField::Cores, "4");
        let entries = field_entries(&rc);
        assert_eq!(entries.len(), 11);
        assert_eq!(entries[0].field, "data_path");
        assert_eq!(entries[0].effective, "<required>");
        let cores = entries.iter().find(|e| e.field == "cores").unwrap();
        assert_eq!((cores.stored.as_str(), cores.effective.as_str()), ("4", "4"));
    }
}
