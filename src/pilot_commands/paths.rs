use crate::utils::constants::PILOT_HOME;
use crate::utils::prog_utils::*;

use anyhow::bail;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use super::Commands;

pub fn set_paths(pilot_home_path: PathBuf, set_path_args: Commands) -> anyhow::Result<()> {
    match set_path_args {
        Commands::SetPaths { bcbio } => {
            // create PILOT_HOME if needed
            if !pilot_home_path.as_path().is_dir() {
                info!(
                    "The {} directory, {}, doesn't exist, creating...",
                    PILOT_HOME,
                    pilot_home_path.display()
                );
                fs::create_dir_all(pilot_home_path.as_path())?;
            }

            let rp = get_required_progs_from_paths(bcbio)?;
            if rp.bcbio.is_none() {
                bail!("Suitable bcbio_nextgen.py executable not found.");
            }
            write_pilot_info(pilot_home_path.as_path(), &rp)?;
        }
        _ => {
            bail!("unexpected command")
        }
    }
    Ok(())
}
