use clap::Parser;
use cygddm::{
    write_synthetic, DdmResult, SynthConfig, CYGNSS_DELAY_BINS, CYGNSS_DOPPLER_BINS,
    DEFAULT_OUTPUT_FILE,
};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

///
/// Write a synthetic CYGNSS Delay-Doppler Map for developing the web app.
///
/// The map is deterministic, running this again with the same options gives exactly the same
/// DDM.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "synthddm")]
#[clap(author, version, about)]
struct SynthDdmOptions {
    /// Output JSON file for the web app.
    #[clap(short, long)]
    #[clap(default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// Number of delay bins.
    #[clap(long)]
    #[clap(default_value_t = CYGNSS_DELAY_BINS)]
    delay_bins: usize,

    /// Number of doppler bins.
    #[clap(long)]
    #[clap(default_value_t = CYGNSS_DOPPLER_BINS)]
    doppler_bins: usize,

    /// Seed for the noise.
    #[clap(long)]
    #[clap(default_value_t = 0)]
    seed: u64,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> DdmResult<()> {
    let opts = SynthDdmOptions::parse();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    if opts.delay_bins == 0 || opts.doppler_bins == 0 {
        return Err("the grid needs at least one delay bin and one doppler bin".into());
    }

    let config = SynthConfig {
        delay_bins: opts.delay_bins,
        doppler_bins: opts.doppler_bins,
        seed: opts.seed,
        ..Default::default()
    };

    let summary = write_synthetic(&config, &opts.output)?;
    info!(
        "Generated {} DDM points in {}",
        summary.sample_points,
        summary.output_file.display()
    );

    Ok(())
}
