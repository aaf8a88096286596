//! The two files bcbio expects next to a run: the sample manifest (CSV) and
//! the template it expands into its own run configuration (YAML).

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::utils::constants::{MANIFEST_EXT, TEMPLATE_FILE};
use crate::utils::errors::PilotError;
use crate::utils::run_config::{RunConfiguration, RunField};

/// Suffixes of first-of-pair read files. Reverse reads are not listed; bcbio
/// finds them itself next to the forward reads.
const FORWARD_READ_SUFFIXES: [&str; 2] = ["1.fq.gz", "1.fastq.gz"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRow {
    pub samplename: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSection {
    pub transcriptome_fasta: String,
    pub transcriptome_gtf: String,
    pub aligner: String,
    pub adapters: Vec<String>,
    pub strandedness: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailsSection {
    pub analysis: String,
    pub genome_build: String,
    pub algorithm: AlgorithmSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSection {
    pub dir: String,
}

/// The template bcbio turns into its run configuration.
/// Field order here is the order in the written file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTemplate {
    pub details: Vec<DetailsSection>,
    pub upload: UploadSection,
}

impl RunTemplate {
    pub fn from_config(config: &RunConfiguration) -> Result<RunTemplate, PilotError> {
        let required = |field: RunField| {
            config
                .get(field)
                .map(String::from)
                .ok_or(PilotError::MissingRequiredPath(field))
        };
        let option = |field: RunField| {
            config
                .effective_value(field)
                .unwrap_or_default()
                .to_string()
        };
        let out_path = PathBuf::from(required(RunField::OutPath)?);

        Ok(RunTemplate {
            details: vec![DetailsSection {
                analysis: option(RunField::Analysis),
                genome_build: option(RunField::Genome),
                algorithm: AlgorithmSection {
                    transcriptome_fasta: required(RunField::FastaPath)?,
                    transcriptome_gtf: required(RunField::GtfPath)?,
                    aligner: option(RunField::Aligner),
                    adapters: config.adapters(),
                    strandedness: option(RunField::Strandedness),
                },
            }],
            upload: UploadSection {
                dir: out_path.join("final").to_string_lossy().into_owned(),
            },
        })
    }
}

/// `run_1` and `run_1.csv` both name the manifest `run_1.csv`.
pub fn manifest_file_name(run_name: &str) -> String {
    let p = Path::new(run_name);
    match p.extension() {
        Some(ext) if ext == MANIFEST_EXT => run_name.to_string(),
        _ => format!("{}.{}", run_name, MANIFEST_EXT),
    }
}

/// The run name without the manifest extension; bcbio names its
/// `<name>/config` and `<name>/work` directories after it.
pub fn run_stem(run_name: &str) -> String {
    let file_name = manifest_file_name(run_name);
    file_name
        .strip_suffix(&format!(".{}", MANIFEST_EXT))
        .unwrap_or(&file_name)
        .to_string()
}

fn is_forward_read(name: &str) -> bool {
    FORWARD_READ_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Sample description: the file name up to its first underscore.
fn sample_description(file_name: &str) -> &str {
    file_name.split('_').next().unwrap_or(file_name)
}

/// All forward-read files below `sample_root`, sorted by path.
pub fn find_forward_reads(sample_root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut reads = Vec::new();
    for entry in WalkDir::new(sample_root).follow_links(true) {
        let entry = entry
            .with_context(|| format!("could not scan {} for FASTQ files", sample_root.display()))?;
        if entry.file_type().is_file() && is_forward_read(&entry.file_name().to_string_lossy()) {
            reads.push(entry.into_path());
        }
    }
    reads.sort();
    Ok(reads)
}

/// Writes the `samplename,description` manifest for every forward-read file
/// under `sample_root` to `output_dir/<run_name>.csv`, replacing any earlier one.
/// Nothing is written when no sample is found.
pub fn write_manifest(
    output_dir: &Path,
    sample_root: &Path,
    run_name: &str,
) -> anyhow::Result<PathBuf> {
    let reads = find_forward_reads(sample_root)?;
    if reads.is_empty() {
        return Err(PilotError::NoSamplesFound(sample_root.to_path_buf()).into());
    }

    let manifest_path = output_dir.join(manifest_file_name(run_name));
    let mut wtr = csv::Writer::from_path(&manifest_path)
        .with_context(|| format!("could not create {}", manifest_path.display()))?;
    for r in &reads {
        let file_name = r
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        wtr.serialize(ManifestRow {
            samplename: r.to_string_lossy().into_owned(),
            description: sample_description(&file_name).to_string(),
        })?;
    }
    wtr.flush()
        .with_context(|| format!("could not write {}", manifest_path.display()))?;

    info!(
        "wrote the manifest for {} samples to {}",
        reads.len(),
        manifest_path.display()
    );
    Ok(manifest_path)
}

/// Serializes `template` to `output_dir/template.yaml`, replacing any earlier one.
pub fn write_template(output_dir: &Path, template: &RunTemplate) -> anyhow::Result<PathBuf> {
    let template_path = output_dir.join(TEMPLATE_FILE);
    let yaml = serde_yaml::to_string(template)?;
    std::fs::write(&template_path, &yaml)
        .with_context(|| format!("could not write {}", template_path.display()))?;
    info!("wrote the run template to {}", template_path.display());
    Ok(template_path)
}

#[cfg(test)]
pub(crate) fn read_template(p: &Path) -> anyhow::Result<RunTemplate> {
    let s = std::fs::read_to_string(p).with_context(|| format!("could not read {}", p.display()))?;
    serde_yaml::from_str(&s).with_context(|| format!("could not parse {}", p.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(p: &Path) {
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(p, b"").unwrap();
    }

    #[test]
    fn test_manifest_lists_forward_reads() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&data.path().join("sample1_R1.fq.gz"));
        touch(&data.path().join("sample1_R2.fq.gz"));
        touch(&data.path().join("nested").join("sample2_R1.fq.gz"));
        touch(&data.path().join("nested").join("sample2_R2.fq.gz"));
        touch(&data.path().join("notes.txt"));

        let p = write_manifest(out.path(), data.path(), "run_1").unwrap();
        assert_eq!(p, out.path().join("run_1.csv"));

        let text = fs::read_to_string(&p).unwrap();
        assert!(text.starts_with("samplename,description\n"));

        let mut rdr = csv::Reader::from_path(&p).unwrap();
        let rows: Vec<ManifestRow> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        let mut descriptions: Vec<&str> = rows.iter().map(|r| r.description.as_str()).collect();
        descriptions.sort();
        assert_eq!(descriptions, vec!["sample1", "sample2"]);
        assert!(rows.iter().all(|r| r.samplename.ends_with("_R1.fq.gz")));
    }

    #[test]
    fn test_manifest_without_samples_writes_nothing() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&data.path().join("sample1_R2.fq.gz"));
        touch(&data.path().join("sample1.bam"));

        let e = write_manifest(out.path(), data.path(), "run_1").unwrap_err();
        assert!(matches!(
            e.downcast_ref::<PilotError>(),
            Some(PilotError::NoSamplesFound(_))
        ));
        assert!(!out.path().join("run_1.csv").exists());
    }

    #[test]
    fn test_manifest_is_overwritten() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        touch(&data.path().join("a_1.fastq.gz"));
        write_manifest(out.path(), data.path(), "run_1.csv").unwrap();
        touch(&data.path().join("b_1.fastq.gz"));
        let p = write_manifest(out.path(), data.path(), "run_1.csv").unwrap();
        let text = fs::read_to_string(p).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_run_names() {
        assert_eq!(manifest_file_name("run_1"), "run_1.csv");
        assert_eq!(manifest_file_name("run_1.csv"), "run_1.csv");
        assert_eq!(manifest_file_name("run.v2"), "run.v2.csv");
        assert_eq!(run_stem("run_1.csv"), "run_1");
        assert_eq!(run_stem("run_1"), "run_1");
        assert_eq!(sample_description("sample1_S1_L001_R1.fq.gz"), "sample1");
        assert_eq!(sample_description("plain1.fq.gz"), "plain1.fq.gz");
    }

    #[test]
    fn test_template_round_trip_keeps_order() {
        let out = tempfile::tempdir().unwrap();
        let mut rc = RunConfiguration::new();
        rc.assign(RunField::DataPath, "data");
        rc.assign(RunField::FastaPath, "genomes/Homo_sapiens.GRCh38.cdna.all.fa");
        rc.assign(RunField::GtfPath, "genomes/Homo_sapiens.GRCh38.96.chr.gtf");
        rc.assign(RunField::OutPath, "seq");
        rc.assign(RunField::Adapter, "nextera,polya");

        let template = RunTemplate::from_config(&rc).unwrap();
        assert_eq!(template.details[0].analysis, "RNA-seq");
        assert_eq!(template.details[0].algorithm.adapters, vec!["nextera", "polya"]);
        assert_eq!(template.upload.dir, Path::new("seq").join("final").to_string_lossy());

        let p = write_template(out.path(), &template).unwrap();
        assert_eq!(p, out.path().join("template.yaml"));
        assert_eq!(read_template(&p).unwrap(), template);

        let text = fs::read_to_string(&p).unwrap();
        let details = text.find("details:").unwrap();
        let upload = text.find("upload:").unwrap();
        assert!(details < upload);
        let keys = ["analysis:", "genome_build:", "algorithm:", "transcriptome_fasta:",
            "transcriptome_gtf:", "aligner:", "adapters:", "strandedness:"];
        let positions: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "unexpected key order:\n{}", text);
    }

    #[test]
    fn test_template_needs_paths() {
        let rc = RunConfiguration::new();
        assert!(matches!(
            RunTemplate::from_config(&rc),
            Err(PilotError::MissingRequiredPath(RunField::OutPath))
        ));
    }
}
