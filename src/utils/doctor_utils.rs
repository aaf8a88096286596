use anyhow::Context;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};
use tabled::Tabled;
use tracing::debug;

/// Reference files the doctor knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ReferenceFile {
    Cdna,
    Gtf,
    GtfChr,
}

impl ReferenceFile {
    pub fn url(&self) -> &'static str {
        match self {
            ReferenceFile::Cdna => "http://ftp.ensembl.org/pub/release-96/fasta/homo_sapiens/cdna/Homo_sapiens.GRCh38.cdna.all.fa.gz",
            ReferenceFile::Gtf => "http://ftp.ensembl.org/pub/release-96/gtf/homo_sapiens/Homo_sapiens.GRCh38.96.gtf.gz",
            ReferenceFile::GtfChr => "https://hgdownload.cse.ucsc.edu/goldenpath/hg38/bigZips/genes/hg38.ncbiRefSeq.gtf.gz",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ReferenceFile::Cdna => "Homo_sapiens.GRCh38.cdna.all.fa.gz",
            ReferenceFile::Gtf => "Homo_sapiens.GRCh38.96.gtf.gz",
            ReferenceFile::GtfChr => "hg38.ncbiRefSeq.gtf.gz",
        }
    }
}

/// One of the PATH entries a working bcbio installation puts in place.
#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct PathRequirement {
    #[tabled(rename = "path")]
    pub suffix: &'static str,
    #[tabled(display_with = "display_critical")]
    pub critical: bool,
    #[tabled(display_with = "display_found")]
    pub found: bool,
}

fn display_critical(c: &bool) -> String {
    if *c { String::from("CRITICAL") } else { String::new() }
}

fn display_found(f: &bool) -> String {
    if *f { String::from("FOUND") } else { String::from("NOT FOUND") }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathReport {
    pub requirements: Vec<PathRequirement>,
    /// The installation root, derived from the `bcbio/tools/bin` entry.
    pub install_root: Option<PathBuf>,
}

/// Looks for the bcbio entries in a PATH-like list of directories.
pub fn check_path_entries<I: IntoIterator<Item = PathBuf>>(entries: I) -> PathReport {
    let mut requirements = vec![
        PathRequirement { suffix: "bcbio/tools/bin", critical: true, found: false },
        PathRequirement { suffix: "bcbio/anaconda/bin", critical: false, found: false },
        PathRequirement { suffix: "bcbio", critical: false, found: false },
    ];
    let mut install_root = None;

    for p in entries {
        for req in requirements.iter_mut() {
            if p.ends_with(req.suffix) {
                req.found = true;
                if req.suffix == "bcbio/tools/bin" {
                    install_root = p.ancestors().nth(2).map(Path::to_path_buf);
                }
            }
        }
    }
    PathReport { requirements, install_root }
}

pub fn check_env_path() -> PathReport {
    match std::env::var_os("PATH") {
        Some(p) => check_path_entries(std::env::split_paths(&p)),
        None => check_path_entries(Vec::new()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenomeReport {
    pub genomes: Vec<String>,
    pub has_sam_fa_indices: bool,
}

/// Lists `genomes/<organism>/<build>` below the installation root and checks
/// for galaxy's `sam_fa_indices.loc`.
pub fn check_genomes(install_root: &Path) -> anyhow::Result<GenomeReport> {
    let mut genomes = Vec::new();
    let genomes_dir = install_root.join("genomes");
    if genomes_dir.is_dir() {
        for organism in std::fs::read_dir(&genomes_dir)
            .with_context(|| format!("could not list {}", genomes_dir.display()))?
        {
            let organism = organism?.path();
            if !organism.is_dir() {
                continue;
            }
            for build in std::fs::read_dir(&organism)? {
                genomes.push(build?.file_name().to_string_lossy().into_owned());
            }
        }
    }
    genomes.sort();
    let has_sam_fa_indices = install_root
        .join("galaxy")
        .join("tool-data")
        .join("sam_fa_indices.loc")
        .is_file();
    Ok(GenomeReport { genomes, has_sam_fa_indices })
}

fn files_with_suffixes(dir: &Path, suffixes: &[&str]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("could not list {}", dir.display()))? {
        let p = entry?.path();
        let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if p.is_file() && suffixes.iter().any(|s| name.ends_with(s)) {
            files.push(p);
        }
    }
    files.sort();
    Ok(files)
}

/// First line of `p` that satisfies `keep`, reading through gzip if needed.
fn first_line_where<F: Fn(&str) -> bool>(p: &Path, keep: F) -> anyhow::Result<Option<String>> {
    let (reader, format) = niffler::from_path(p).with_context(|| format!("could not open {}", p.display()))?;
    debug!("reading {} ({:?})", p.display(), format);
    for line in BufReader::new(reader).lines() {
        let line = line.with_context(|| format!("could not read {}", p.display()))?;
        if keep(&line) {
            return Ok(Some(line));
        }
    }
    Ok(None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneNameFormat {
    /// `ENST00000456328.2`
    Versioned,
    /// `ENST00000456328`
    Unversioned,
}

/// Reports whether the sequence names of each FASTA file carry a version suffix.
pub fn check_gene_names(genomes_path: &Path) -> anyhow::Result<Vec<(PathBuf, GeneNameFormat)>> {
    let mut out = Vec::new();
    for p in files_with_suffixes(genomes_path, &[".fa", ".fa.gz"])? {
        if let Some(header) = first_line_where(&p, |_| true)? {
            let name = header.split(' ').next().unwrap_or_default();
            let fmt = if name.contains('.') {
                GeneNameFormat::Versioned
            } else {
                GeneNameFormat::Unversioned
            };
            out.push((p, fmt));
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromosomeStyle {
    /// `chrX`
    Prefixed,
    /// `X`
    Bare,
}

/// Reports whether each GTF file names chromosomes with a `chr` prefix.
pub fn check_gene_annotation(genomes_path: &Path) -> anyhow::Result<Vec<(PathBuf, ChromosomeStyle)>> {
    let mut out = Vec::new();
    for p in files_with_suffixes(genomes_path, &[".gtf", ".gtf.gz"])? {
        if let Some(record) = first_line_where(&p, |l| !l.starts_with('#'))? {
            let seqname = record.split('\t').next().unwrap_or_default();
            let style = if seqname.contains("chr") {
                ChromosomeStyle::Prefixed
            } else {
                ChromosomeStyle::Bare
            };
            out.push((p, style));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::str::FromStr;

    #[test]
    fn test_reference_table() {
        assert_eq!(ReferenceFile::from_str("gtf_chr").unwrap(), ReferenceFile::GtfChr);
        assert_eq!(ReferenceFile::Cdna.to_string(), "cdna");
        for r in [ReferenceFile::Cdna, ReferenceFile::Gtf, ReferenceFile::GtfChr] {
            assert!(r.url().ends_with(r.file_name()));
        }
    }

    #[test]
    fn test_path_entries() {
        let report = check_path_entries(vec![
            PathBuf::from("/usr/bin"),
            PathBuf::from("/opt/bcbio/tools/bin"),
            PathBuf::from("/opt/bcbio/anaconda/bin"),
        ]);
        assert_eq!(report.install_root, Some(PathBuf::from("/opt/bcbio")));
        assert!(report.requirements[0].found);
        assert!(report.requirements[1].found);
        assert!(!report.requirements[2].found);

        let empty = check_path_entries(vec![PathBuf::from("/usr/bin")]);
        assert!(empty.install_root.is_none());
        assert!(empty.requirements.iter().all(|r| !r.found));
    }

    #[test]
    fn test_genomes_listing() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("genomes/Hsapiens/hg38")).unwrap();
        fs::create_dir_all(root.path().join("genomes/Mmusculus/mm10")).unwrap();
        let report = check_genomes(root.path()).unwrap();
        assert_eq!(report.genomes, vec!["hg38", "mm10"]);
        assert!(!report.has_sam_fa_indices);

        fs::create_dir_all(root.path().join("galaxy/tool-data")).unwrap();
        fs::write(root.path().join("galaxy/tool-data/sam_fa_indices.loc"), "").unwrap();
        assert!(check_genomes(root.path()).unwrap().has_sam_fa_indices);
    }

    #[test]
    fn test_gene_name_and_annotation_styles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("versioned.fa"), ">ENST00000456328.2 cdna\nACGT\n").unwrap();
        fs::write(dir.path().join("plain.fa"), ">ENST00000456328 cdna\nACGT\n").unwrap();
        fs::write(
            dir.path().join("ucsc.gtf"),
            "#!genome-build GRCh38\nchr1\tensembl\tgene\t1\t10\t.\t+\t.\tgene_id \"g\";\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("ensembl.gtf"),
            "1\tensembl\tgene\t1\t10\t.\t+\t.\tgene_id \"g\";\n",
        )
        .unwrap();

        let names = check_gene_names(dir.path()).unwrap();
        assert_eq!(
            names,
            vec![
                (dir.path().join("plain.fa"), GeneNameFormat::Unversioned),
                (dir.path().join("versioned.fa"), GeneNameFormat::Versioned),
            ]
        );
        let styles = check_gene_annotation(dir.path()).unwrap();
        assert_eq!(
            styles,
            vec![
                (dir.path().join("ensembl.gtf"), ChromosomeStyle::Bare),
                (dir.path().join("ucsc.gtf"), ChromosomeStyle::Prefixed),
            ]
        );
    }
}
