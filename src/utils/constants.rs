/// Environment variable pointing at the directory where bcbio-pilot keeps
/// its program registry and the saved run configuration.
pub(crate) static PILOT_HOME: &str = "BCBIO_PILOT_HOME";

pub(crate) static PILOT_INFO_PATH: &str = "pilot_info.json";
pub(crate) static RUN_CONFIG_PATH: &str = "run_config.json";

/// The bcbio entry point invoked for template expansion and for the run itself.
pub(crate) static BCBIO_EXE: &str = "bcbio_nextgen.py";
pub(crate) static BCBIO_VERSION_REQ: &str = ">=1.1.0, <2.0.0";

pub(crate) static TEMPLATE_FILE: &str = "template.yaml";
pub(crate) static MANIFEST_EXT: &str = "csv";

/// Subcommand token that follows the executable when the front-end
/// launches its own pipeline driver.
pub(crate) static HELPER_SUBCOMMAND: &str = "helper";
pub(crate) static DOCTOR_SUBCOMMAND: &str = "doctor";

pub(crate) static DOWNLOAD_CHUNK_SIZE: usize = 1024 * 64;
