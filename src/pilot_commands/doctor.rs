use crate::utils::console::{ConsoleSink, StdoutSink};
use crate::utils::doctor_utils::*;
use crate::utils::prog_utils::download_to_file_compute_hash;

use anyhow::{bail, Result};
use std::path::Path;
use tabled::{settings::Style, Table};
use tracing::info;

use super::DoctorOpts;

fn separator(sink: &dyn ConsoleSink) {
    sink.write_line(&format!("{}\n", "_".repeat(25)));
}

/// The reference files named on the command line, in a fixed order.
pub fn selected_downloads(opts: &DoctorOpts) -> Vec<ReferenceFile> {
    let mut to_download = Vec::new();
    if opts.cdna {
        to_download.push(ReferenceFile::Cdna);
    }
    if opts.gtf {
        to_download.push(ReferenceFile::Gtf);
    }
    if opts.gtf_chr {
        to_download.push(ReferenceFile::GtfChr);
    }
    to_download
}

fn download_references(
    output_path: &Path,
    to_download: &[ReferenceFile],
    sink: &dyn ConsoleSink,
) -> Result<()> {
    if to_download.is_empty() {
        sink.write_line("No files specified for download");
        return Ok(());
    }
    sink.write_line("Running download script...");
    for r in to_download {
        let dest = output_path.join(r.file_name());
        let digest = download_to_file_compute_hash(r.url(), &dest)?;
        info!("{} blake3 digest {}", dest.display(), digest.to_hex());
        sink.write_line(&format!("downloaded {} to {}", r, dest.display()));
    }
    Ok(())
}

fn report_path(report: &PathReport, sink: &dyn ConsoleSink) {
    sink.write_line(
        "Here are the results of the $PATH search. Paths marked critical are required for bcbio to operate correctly.\n",
    );
    sink.write_line(
        &Table::new(report.requirements.iter().cloned())
            .with(Style::rounded())
            .to_string(),
    );
    sink.write_line(
        "\nIf the above does not look correct, check that the bcbio tools/bin and anaconda/bin directories are on your PATH.",
    );
}

fn report_genomes(install_root: Option<&Path>, sink: &dyn ConsoleSink) -> Result<()> {
    let root = match install_root {
        Some(r) => r,
        None => {
            sink.write_line("bcbio/tools/bin is not on the PATH; skipping the genome check");
            return Ok(());
        }
    };
    let report = check_genomes(root)?;
    if report.genomes.is_empty() {
        sink.write_line("genomes NOT FOUND!");
    } else {
        sink.write_line("genomes FOUND in bcbio: ");
        for g in &report.genomes {
            sink.write_line(g);
        }
    }
    if !report.has_sam_fa_indices {
        sink.write_line("`sam_fa_indices.loc` NOT FOUND! bcbio's galaxy tool-data is incomplete.");
    }
    Ok(())
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

fn report_gene_names(genomes_path: &Path, sink: &dyn ConsoleSink) -> Result<()> {
    for (p, fmt) in check_gene_names(genomes_path)? {
        match fmt {
            GeneNameFormat::Versioned => sink.write_line(&format!(
                "{} is in the format: XXXXXXXX.XX\n\
                 If this does not match your FASTQ files, remove the version suffixes from the FASTA headers.",
                file_name(&p)
            )),
            GeneNameFormat::Unversioned => {
                sink.write_line(&format!("{} is in the format: XXXXXXXX", file_name(&p)))
            }
        }
    }
    Ok(())
}

fn report_gene_annotation(genomes_path: &Path, sink: &dyn ConsoleSink) -> Result<()> {
    for (p, style) in check_gene_annotation(genomes_path)? {
        let annotation = match style {
            ChromosomeStyle::Prefixed => "chrX",
            ChromosomeStyle::Bare => "X",
        };
        sink.write_line(&format!("{} is annotated: {}", file_name(&p), annotation));
    }
    sink.write_line("\nYou can download a non-chr format with: bcbio-pilot doctor -d --gtf <output_path>");
    sink.write_line("You can download a chr format with: bcbio-pilot doctor -d --gtf_chr <output_path>\n");
    sink.write_line(
        "You can also run the following command to edit the annotation, although this is less reliable:\n\t\
         awk 'OFS=\"\\t\" {if (NR > 5) $1=\"chr\"$1; print}' input_name.gtf > output_name.gtf",
    );
    Ok(())
}

/// Writes the full diagnostic report for `path_report` and, if given, the
/// genome files under `genomes_path`.
fn diagnose(path_report: &PathReport, genomes_path: Option<&Path>, sink: &dyn ConsoleSink) -> Result<()> {
    separator(sink);
    report_path(path_report, sink);
    separator(sink);
    report_genomes(path_report.install_root.as_deref(), sink)?;
    separator(sink);

    if let Some(gp) = genomes_path {
        if !gp.is_dir() {
            bail!("the genomes path {} is not a directory", gp.display());
        }
        report_gene_names(gp, sink)?;
        separator(sink);
        report_gene_annotation(gp, sink)?;
        separator(sink);
    }
    Ok(())
}

/// ### Program Name
/// bcbio-pilot doctor
///
/// Either downloads reference files (`-d`) or checks the bcbio installation
/// found on the PATH, never both.
pub fn run_doctor(opts: DoctorOpts) -> Result<()> {
    let sink = StdoutSink;
    if opts.download {
        let output_path = match &opts.path {
            Some(p) => p.as_path(),
            None => bail!("an output path is required in download mode"),
        };
        return download_references(output_path, &selected_downloads(&opts), &sink);
    }
    diagnose(&check_env_path(), opts.path.as_deref(), &sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::console::MemorySink;
    use std::fs;
    use std::path::PathBuf;

    fn opts(cdna: bool, gtf: bool, gtf_chr: bool) -> DoctorOpts {
        DoctorOpts {
            download: true,
            gtf,
            gtf_chr,
            cdna,
            path: Some(PathBuf::from("genomes")),
        }
    }

    #[test]
    fn downloads_follow_flags() {
        assert!(selected_downloads(&opts(false, false, false)).is_empty());
        assert_eq!(
            selected_downloads(&opts(true, false, true)),
            vec![ReferenceFile::Cdna, ReferenceFile::GtfChr]
        );
    }

    #[test]
    fn nothing_selected_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::default();
        download_references(dir.path(), &[], &sink).unwrap();
        assert_eq!(sink.contents(), "No files specified for download\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn diagnosis_reports_installation_and_genomes() {
        let root = tempfile::tempdir().unwrap();
        let bcbio = root.path().join("bcbio");
        fs::create_dir_all(bcbio.join("genomes/Hsapiens/hg38")).unwrap();
        let genomes = root.path().join("refs");
        fs::create_dir_all(&genomes).unwrap();
        fs::write(genomes.join("tx.fa"), ">ENST00000456328.2 cdna\nACGT\n").unwrap();
        fs::write(genomes.join("tx.gtf"), "#!header\nchr1\tensembl\tgene\t1\t4\t.\t+\t.\t\n").unwrap();

        let report = check_path_entries(vec![bcbio.join("tools/bin")]);
        let sink = MemorySink::default();
        diagnose(&report, Some(&genomes), &sink).unwrap();

        let out = sink.contents();
        assert!(out.contains("bcbio/tools/bin"));
        assert!(out.contains("NOT FOUND"));
        assert!(out.contains("genomes FOUND in bcbio: \nhg38\n"));
        assert!(out.contains("`sam_fa_indices.loc` NOT FOUND!"));
        assert!(out.contains("tx.fa is in the format: XXXXXXXX.XX"));
        assert!(out.contains("tx.gtf is annotated: chrX"));
    }

    #[test]
    fn diagnosis_without_installation_skips_genomes() {
        let sink = MemorySink::default();
        let report = check_path_entries(vec![PathBuf::from("/usr/bin")]);
        diagnose(&report, None, &sink).unwrap();
        let out = sink.contents();
        assert!(out.contains("skipping the genome check"));
        assert!(!out.contains("is annotated"));
    }
}
