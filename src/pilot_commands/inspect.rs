use crate::utils::constants::RUN_CONFIG_PATH;
use crate::utils::prog_utils::*;
use crate::utils::run_config::{RunConfiguration, RunField};
use strum::IntoEnumIterator;

use anyhow::Result;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

pub fn inspect_pilot(version: &str, pilot_home_path: PathBuf) -> Result<()> {
    let v: Value = inspect_pilot_home(pilot_home_path.as_path())?;

    let run_config_p = pilot_home_path.join(RUN_CONFIG_PATH);
    let run_config = RunConfiguration::load(&run_config_p)?;
    let mut effective = Map::new();
    for f in RunField::iter() {
        let val = match run_config.effective_value(f) {
            Some(s) => json!(s),
            None => Value::Null,
        };
        effective.insert(f.to_string(), val);
    }

    let inspect_v = json!({
        "bcbio_pilot_version" : version,
        "pilot_info" : v,
        "run_config_path" : run_config_p.display().to_string(),
        "run_config" : run_config,
        "effective_run_options" : effective
    });
    println!("{}", serde_json::to_string_pretty(&inspect_v)?);
    Ok(())
}
