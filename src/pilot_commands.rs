pub mod inspect;
pub use self::inspect::inspect_pilot;

pub mod refresh;
pub use self::refresh::refresh_prog_info;

pub mod paths;
pub use self::paths::set_paths;

pub mod config;
pub use self::config::configure;

pub mod helper;
pub use self::helper::run_helper;

pub mod doctor;
pub use self::doctor::run_doctor;

pub mod run;
pub use self::run::run_pipeline;

use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use strum::IntoEnumIterator;

use crate::utils::run_config::RunField;

fn run_field_parser(s: &str) -> Result<RunField, String> {
    RunField::from_str(s).map_err(|_| {
        let names = RunField::iter()
            .map(|f| f.to_string())
            .collect::<Vec<String>>()
            .join(", ");
        format!("Do not recognize field {}; expected one of: {}", s, names)
    })
}

#[derive(Args, Clone, Debug)]
#[command(arg_required_else_help = true)]
pub struct HelperOpts {
    /// activates interactive mode; only the default run options are used
    #[arg(
        short = 'i',
        conflicts_with_all = ["data_path", "fasta_path", "gtf_path", "run_name", "outpath",
            "analysis", "genome", "adapter", "strandedness", "aligner", "cores"]
    )]
    pub interactive: bool,

    /// folder containing the (gzipped) FASTQ files
    #[arg(required_unless_present = "interactive")]
    pub data_path: Option<PathBuf>,

    /// transcriptome FASTA file
    #[arg(required_unless_present = "interactive")]
    pub fasta_path: Option<PathBuf>,

    /// transcriptome GTF file
    #[arg(required_unless_present = "interactive")]
    pub gtf_path: Option<PathBuf>,

    /// name of the run; the sample manifest is written to <OUTPATH>/<RUN_NAME>.csv
    #[arg(required_unless_present = "interactive")]
    pub run_name: Option<String>,

    /// output directory (will be created if it doesn't exist)
    #[arg(required_unless_present = "interactive")]
    pub outpath: Option<PathBuf>,

    /// the analysis mode for bcbio [default: RNA-seq]
    #[arg(long, help_heading = "Run Options")]
    pub analysis: Option<String>,

    /// the genome build for bcbio [default: hg38]
    #[arg(long, help_heading = "Run Options")]
    pub genome: Option<String>,

    /// comma-separated adapters for bcbio [default: polya]
    #[arg(long, help_heading = "Run Options")]
    pub adapter: Option<String>,

    /// the strandedness of the library [default: unstranded]
    #[arg(long, help_heading = "Run Options")]
    pub strandedness: Option<String>,

    /// the aligner bcbio should use [default: hisat2]
    #[arg(long, help_heading = "Run Options")]
    pub aligner: Option<String>,

    /// number of cores bcbio may use [default: 12]
    #[arg(long, help_heading = "Run Options")]
    pub cores: Option<u32>,

    /// write the manifest and template, then stop without invoking bcbio
    #[arg(long)]
    pub prepare_only: bool,
}

#[derive(Args, Clone, Debug)]
#[command(arg_required_else_help = false)]
pub struct DoctorOpts {
    /// download reference files instead of running the diagnostics
    #[arg(short = 'd', long = "download", requires = "path")]
    pub download: bool,

    /// in download mode, download the Ensembl GTF (no `chr` prefix)
    #[arg(long, requires = "download")]
    pub gtf: bool,

    /// in download mode, download the UCSC GTF (with `chr` prefix)
    #[arg(long = "gtf_chr", requires = "download")]
    pub gtf_chr: bool,

    /// in download mode, download the Ensembl cDNA FASTA
    #[arg(long, requires = "download")]
    pub cdna: bool,

    /// folder of genome files to check or, with -d, where downloads are written
    pub path: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// store a value for one run field; an empty value clears it
    #[command(arg_required_else_help = true)]
    Set {
        /// one of data_path, fasta_path, gtf_path, out_path, analysis, genome,
        /// adapter, strandedness, aligner, cores, run_name
        #[arg(value_parser = run_field_parser)]
        field: RunField,
        /// the new value
        value: String,
    },
    /// clear a run field so that its default is used
    #[command(arg_required_else_help = true)]
    Unset {
        #[arg(value_parser = run_field_parser)]
        field: RunField,
    },
    /// print the stored and effective value of every field
    Show {},
}

#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
pub struct ConfigOpts {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// set the path to the bcbio_nextgen.py executable that will be launched
    SetPaths {
        /// path to bcbio_nextgen.py to use
        #[arg(short, long)]
        bcbio: Option<PathBuf>,
    },
    /// inspect the current configuration
    Inspect {},
    /// refreshes version information associated with the programs that are launched
    RefreshProgInfo {},
    /// view or change the saved run options
    Config(ConfigOpts),
    /// launch the pipeline for the saved run options and supervise it
    Run {},
    /// write the sample manifest and run template, then drive bcbio through a run
    Helper(HelperOpts),
    /// check a bcbio installation, or download reference files
    Doctor(DoctorOpts),
}
