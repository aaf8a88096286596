use anyhow::{anyhow, bail, Context, Result};
use cmd_lib::run_fun;
use indicatif::{ProgressBar, ProgressStyle};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use which::which;

use crate::utils::constants::*;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProgInfo {
    pub exe_path: PathBuf,
    pub version: String,
}

impl Default for ProgInfo {
    fn default() -> Self {
        Self {
            exe_path: PathBuf::from(""),
            version: String::from("0.0.0"),
        }
    }
}

// Holds the paths to the
// programs we'll need to run
// the pipeline.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ReqProgs {
    pub bcbio: Option<ProgInfo>,
}

/// Takes the output of `<prog> --version` and checks that the last
/// whitespace-separated token is a version satisfying `req_string`.
pub fn check_version_constraints<S1: AsRef<str>>(
    prog_name: &str,
    req_string: S1,
    prog_output: std::result::Result<String, std::io::Error>,
) -> Result<Version> {
    match prog_output {
        Ok(vs) => {
            let x = vs.split_whitespace();
            if let Some(version) = x.last() {
                // bcbio reports e.g. `1.2.9` but development builds add a suffix such as `1.2.9a`
                let cleaned: String = version
                    .trim_start_matches('v')
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '.')
                    .collect();
                let parsed_version = Version::parse(&cleaned).with_context(|| {
                    format!("could not parse `{}` as the version of {}", version, prog_name)
                })?;
                let req = VersionReq::parse(req_string.as_ref())?;
                if req.matches(&parsed_version) {
                    return Ok(parsed_version);
                } else {
                    return Err(anyhow!(
                        "parsed version {:?} of {} does not satisfy constraints {}",
                        version,
                        prog_name,
                        req
                    ));
                }
            }
        }
        Err(e) => {
            return Err(anyhow!("could not run `{} --version`: {}", prog_name, e));
        }
    }
    Err(anyhow!("invalid version string for {}", prog_name))
}

pub fn get_which_executable(prog_name: &str) -> Result<PathBuf> {
    match which(prog_name) {
        Ok(p) => {
            info!("found `{}` in the PATH at {}", prog_name, p.display());
            Ok(p)
        }
        Err(e) => Err(anyhow!(
            "could not find `{}` in your path: {}",
            prog_name,
            e
        )),
    }
}

pub fn get_required_progs_from_paths(bcbio_exe: Option<PathBuf>) -> Result<ReqProgs> {
    let mut rp = ReqProgs::default();

    // use the given path if we have it
    // otherwise, check `which`
    let bcbio = match bcbio_exe {
        Some(p) => p,
        None => get_which_executable(BCBIO_EXE)?,
    };

    let st = bcbio.display().to_string();
    let sr = run_fun!($st --version);
    let v = check_version_constraints(BCBIO_EXE, BCBIO_VERSION_REQ, sr)?;
    rp.bcbio = Some(ProgInfo {
        exe_path: bcbio,
        version: format!("{}", v),
    });

    Ok(rp)
}

/// Reads the program registry written by `set-paths`.
pub fn inspect_pilot_home(pilot_home_path: &Path) -> Result<Value> {
    let pilot_info_p = pilot_home_path.join(PILOT_INFO_PATH);
    let pilot_info_file = std::fs::File::open(&pilot_info_p).with_context({
        || {
            format!(
                "Could not open file {}; please run the set-paths command",
                pilot_info_p.display()
            )
        }
    })?;
    let pilot_info_reader = BufReader::new(pilot_info_file);
    let v: Value = serde_json::from_reader(pilot_info_reader)?;
    Ok(v)
}

pub fn write_pilot_info(pilot_home_path: &Path, rp: &ReqProgs) -> Result<()> {
    let pilot_info_file = pilot_home_path.join(PILOT_INFO_PATH);
    let pilot_info = serde_json::json!({ "prog_info": rp });
    std::fs::write(&pilot_info_file, serde_json::to_string_pretty(&pilot_info)?)
        .with_context(|| format!("could not write {}", pilot_info_file.display()))
}

/// The bcbio executable to launch: the one recorded by `set-paths` if there
/// is a home directory with a registry, otherwise whatever is on the PATH.
pub fn resolve_bcbio(pilot_home_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(home) = pilot_home_path {
        if home.join(PILOT_INFO_PATH).is_file() {
            let v = inspect_pilot_home(home)?;
            let rp: ReqProgs = serde_json::from_value(v["prog_info"].clone())?;
            if let Some(pi) = rp.bcbio {
                return Ok(pi.exe_path);
            }
            warn!("no bcbio executable is recorded in {}; searching the PATH", home.display());
        }
    }
    get_which_executable(BCBIO_EXE)
}

/// Fetch `url` into `dest`, showing a progress bar while bytes arrive.
/// Returns the number of bytes written.
pub fn download_to_file<T: AsRef<str>>(url: T, dest: &Path) -> Result<u64> {
    let url = url.as_ref();
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("could not create {}", parent.display()))?;
        }
    }

    info!("downloading {} to {}", url, dest.display());
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("request for {} failed", url))?;
    let total = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| url.to_string());
    let pb = match total {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };
    pb.set_message(name);

    let mut reader = response.into_body().into_reader();
    let mut file = std::io::BufWriter::new(
        std::fs::File::create(dest).with_context(|| format!("could not create {}", dest.display()))?,
    );
    let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("download of {} was interrupted", url))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .with_context(|| format!("could not write {}", dest.display()))?;
        written += n as u64;
        pb.inc(n as u64);
    }
    file.flush()?;
    pb.finish();

    if let Some(len) = total {
        if written != len {
            bail!(
                "expected {} bytes from {} but received {}",
                len,
                url,
                written
            );
        }
    }
    Ok(written)
}

/// Downloads `url` to `dest` and returns the blake3 digest of the written file.
pub fn download_to_file_compute_hash<T: AsRef<str>>(url: T, dest: &Path) -> Result<blake3::Hash> {
    download_to_file(url, dest)?;
    let mut hasher = blake3::Hasher::new();
    hasher
        .update_mmap(dest)
        .with_context(|| format!("could not hash {}", dest.display()))?;
    Ok(hasher.finalize())
}
