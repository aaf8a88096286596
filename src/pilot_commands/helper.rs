use crate::utils::arg_builder::ArgumentVector;
use crate::utils::console::{ConsoleSink, StdoutSink};
use crate::utils::descriptor::{self, RunTemplate};
use crate::utils::prog_utils::resolve_bcbio;
use crate::utils::run_config::{RunConfiguration, RunField};
use crate::utils::supervisor::{ExitOutcome, ProcessHandle};

use anyhow::{bail, Context};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::HelperOpts;

/// The files written for a run, with every path made absolute so bcbio can be
/// launched from inside the output directory.
#[derive(Debug)]
pub struct PreparedRun {
    pub out_dir: PathBuf,
    pub data_dir: PathBuf,
    pub manifest: PathBuf,
    pub template: PathBuf,
    pub stem: String,
    pub cores: u32,
}

impl PreparedRun {
    /// `bcbio_nextgen.py -w template template.yaml <run>.csv <data>`, run in the output directory.
    pub fn setup_command(&self, bcbio: &Path) -> ArgumentVector {
        ArgumentVector::from(vec![
            bcbio.to_string_lossy().into_owned(),
            String::from("-w"),
            String::from("template"),
            self.template.to_string_lossy().into_owned(),
            self.manifest.to_string_lossy().into_owned(),
            self.data_dir.to_string_lossy().into_owned(),
        ])
    }

    pub fn work_dir(&self) -> PathBuf {
        self.out_dir.join(&self.stem).join("work")
    }

    /// The configuration bcbio writes when it expands the template.
    pub fn run_yaml(&self) -> PathBuf {
        self.out_dir
            .join(&self.stem)
            .join("config")
            .join(format!("{}.yaml", self.stem))
    }

    /// `bcbio_nextgen.py ../config/<run>.yaml -n <cores>`, run in `<run>/work`.
    pub fn run_command(&self, bcbio: &Path) -> ArgumentVector {
        ArgumentVector::from(vec![
            bcbio.to_string_lossy().into_owned(),
            self.run_yaml().to_string_lossy().into_owned(),
            String::from("-n"),
            self.cores.to_string(),
        ])
    }
}

fn run_config_from_opts(opts: &HelperOpts) -> RunConfiguration {
    let mut rc = RunConfiguration::new();
    let paths = [
        (RunField::DataPath, &opts.data_path),
        (RunField::FastaPath, &opts.fasta_path),
        (RunField::GtfPath, &opts.gtf_path),
        (RunField::OutPath, &opts.outpath),
    ];
    for (field, p) in paths {
        if let Some(p) = p {
            rc.assign(field, &p.to_string_lossy());
        }
    }
    let options = [
        (RunField::Analysis, &opts.analysis),
        (RunField::Genome, &opts.genome),
        (RunField::Adapter, &opts.adapter),
        (RunField::Strandedness, &opts.strandedness),
        (RunField::Aligner, &opts.aligner),
        (RunField::RunName, &opts.run_name),
    ];
    for (field, v) in options {
        if let Some(v) = v {
            rc.assign(field, v);
        }
    }
    if let Some(c) = opts.cores {
        rc.assign(RunField::Cores, &c.to_string());
    }
    rc
}

fn absolute(p: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(p).with_context(|| format!("could not resolve {}", p.display()))
}

/// Creates the output directory, then writes the sample manifest and the run
/// template into it.
pub fn prepare_run(run_config: &RunConfiguration) -> anyhow::Result<PreparedRun> {
    run_config.validate()?;
    let cores = run_config.core_count()?;

    let mut abs_config = run_config.clone();
    let out_dir = match run_config.path(RunField::OutPath) {
        Some(p) => p,
        None => bail!("the output directory must be given"),
    };
    if !out_dir.is_dir() {
        info!("creating the output directory {}", out_dir.display());
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("could not create {}", out_dir.display()))?;
    }
    for field in [
        RunField::DataPath,
        RunField::FastaPath,
        RunField::GtfPath,
        RunField::OutPath,
    ] {
        if let Some(p) = run_config.path(field) {
            abs_config.assign(field, &absolute(&p)?.to_string_lossy());
        }
    }
    let out_dir = absolute(&out_dir)?;
    let data_dir = match abs_config.path(RunField::DataPath) {
        Some(p) => p,
        None => bail!("the FASTQ data directory must be given"),
    };

    let run_name = abs_config
        .effective_value(RunField::RunName)
        .unwrap_or_default()
        .to_string();
    let manifest = descriptor::write_manifest(&out_dir, &data_dir, &run_name)?;

    let template = RunTemplate::from_config(&abs_config)?;
    let template_path = descriptor::write_template(&out_dir, &template)?;
    info!("run template:\n{}", serde_yaml::to_string(&template)?);

    Ok(PreparedRun {
        out_dir,
        data_dir,
        manifest,
        template: template_path,
        stem: descriptor::run_stem(&run_name),
        cores,
    })
}

/// Expands the template with bcbio, then starts the run it describes.
fn start_bcbio(
    pilot_home_path: Option<&Path>,
    prepared: &PreparedRun,
    sink: Arc<dyn ConsoleSink>,
) -> anyhow::Result<()> {
    let bcbio = resolve_bcbio(pilot_home_path)?;
    let handle = ProcessHandle::new("bcbio");

    let setup = prepared.setup_command(&bcbio);
    info!("bcbio setup command : {}", setup);
    handle.start_in(setup, &prepared.out_dir, sink.clone())?;
    if handle.wait()? == ExitOutcome::Killed {
        bail!("bcbio was killed while setting up the run");
    }

    let work_dir = prepared.work_dir();
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("could not create {}", work_dir.display()))?;

    let run = prepared.run_command(&bcbio);
    info!("bcbio run command : {}", run);
    handle.start_in(run, &work_dir, sink)?;
    match handle.wait()? {
        ExitOutcome::Succeeded => info!("bcbio finished; results are in {}", prepared.out_dir.display()),
        ExitOutcome::Killed => warn!("bcbio was killed before the run finished"),
    }
    Ok(())
}

fn prepare_and_start(
    pilot_home_path: Option<&Path>,
    run_config: &RunConfiguration,
    prepare_only: bool,
) -> anyhow::Result<()> {
    let prepared = prepare_run(run_config)?;
    if prepare_only {
        info!(
            "wrote {} and {}; not starting bcbio",
            prepared.manifest.display(),
            prepared.template.display()
        );
        return Ok(());
    }
    start_bcbio(pilot_home_path, &prepared, Arc::new(StdoutSink))
}

fn describe(run_config: &RunConfiguration) -> String {
    let v = |f: RunField| run_config.effective_value(f).unwrap_or_default();
    format!(
        "These are your parameters:\n\n\
         Path to data: {}\n\
         Path to FASTA: {}\n\
         Path to GTF: {}\n\
         Output Directory: {}\n\
         Name of Run: {}\n\
         Number of Cores: {}\n",
        v(RunField::DataPath),
        v(RunField::FastaPath),
        v(RunField::GtfPath),
        v(RunField::OutPath),
        descriptor::manifest_file_name(v(RunField::RunName)),
        v(RunField::Cores),
    )
}

fn prompt_run_config(theme: &ColorfulTheme) -> anyhow::Result<RunConfiguration> {
    let mut rc = RunConfiguration::new();
    for (field, prompt) in [
        (RunField::DataPath, "Enter path to FASTQ data"),
        (RunField::FastaPath, "Enter path to the transcriptome FASTA"),
        (RunField::GtfPath, "Enter path to the transcriptome GTF"),
        (RunField::OutPath, "Enter your output directory"),
    ] {
        let v: String = Input::with_theme(theme).with_prompt(prompt).interact_text()?;
        rc.assign(field, &v);
    }
    let run_name: String = Input::with_theme(theme)
        .with_prompt("Enter the name of your run")
        .default(String::from(RunField::RunName.default_value().unwrap_or_default()))
        .interact_text()?;
    rc.assign(RunField::RunName, &run_name);
    let cores: u32 = Input::with_theme(theme)
        .with_prompt("Enter the number of vCPUs/cores you want to use")
        .default(12)
        .validate_with(|c: &u32| if *c > 0 { Ok(()) } else { Err("must be at least 1") })
        .interact_text()?;
    rc.assign(RunField::Cores, &cores.to_string());
    Ok(rc)
}

fn run_interactive(pilot_home_path: Option<&Path>, prepare_only: bool) -> anyhow::Result<()> {
    println!(
        "\nYou have activated interactive mode.\n\
         Interactive mode only uses the default bcbio options (hg38, hisat2, polya, unstranded).\n\
         Run `bcbio-pilot helper --help` to see how to pass other options.\n\
         Press Control+C at any time to cancel.\n"
    );
    let theme = ColorfulTheme::default();
    while Confirm::with_theme(&theme)
        .with_prompt("Would you like to continue?")
        .default(false)
        .interact()?
    {
        let rc = prompt_run_config(&theme)?;
        println!("\n{}", describe(&rc));
        if !Confirm::with_theme(&theme)
            .with_prompt("Would you like to continue?")
            .default(true)
            .interact()?
        {
            break;
        }
        prepare_and_start(pilot_home_path, &rc, prepare_only)?;
    }
    println!("Exiting...");
    Ok(())
}

/// ### Program Name
/// bcbio-pilot helper
///
/// Writes `<run>.csv` and `template.yaml` into the output directory, has bcbio
/// expand the template into `<run>/config/<run>.yaml` and then runs it from
/// `<run>/work`.
pub fn run_helper(pilot_home_path: Option<PathBuf>, opts: HelperOpts) -> anyhow::Result<()> {
    if opts.interactive {
        return run_interactive(pilot_home_path.as_deref(), opts.prepare_only);
    }
    let rc = run_config_from_opts(&opts);
    prepare_and_start(pilot_home_path.as_deref(), &rc, opts.prepare_only)
}
