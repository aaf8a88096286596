/// default option values for a bcbio RNA-seq run
pub trait DefaultRunParams {
    const ANALYSIS: &'static str;
    const GENOME: &'static str;
    const ALIGNER: &'static str;
    const ADAPTER: &'static str;
    const STRANDEDNESS: &'static str;
    const CORES: &'static str;
    const RUN_NAME: &'static str;
}

pub struct DefaultParams;

impl DefaultRunParams for DefaultParams {
    const ANALYSIS: &'static str = "RNA-seq";
    const GENOME: &'static str = "hg38";
    const ALIGNER: &'static str = "hisat2";
    const ADAPTER: &'static str = "polya";
    const STRANDEDNESS: &'static str = "unstranded";
    const CORES: &'static str = "12";
    const RUN_NAME: &'static str = "unnamed";
}
