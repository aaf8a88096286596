use crate::utils::prog_utils::*;

use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

pub fn refresh_prog_info(pilot_home_path: PathBuf) -> anyhow::Result<()> {
    let v: Value = inspect_pilot_home(pilot_home_path.as_path())?;
    let current_rp: ReqProgs = serde_json::from_value(v["prog_info"].clone())?;

    let new_rp = get_required_progs_from_paths(current_rp.bcbio.map(|p| p.exe_path))?;
    if let Some(pi) = &new_rp.bcbio {
        info!("bcbio_nextgen.py {} at {}", pi.version, pi.exe_path.display());
    }
    write_pilot_info(pilot_home_path.as_path(), &new_rp)
}
