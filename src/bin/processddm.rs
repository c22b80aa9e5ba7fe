use clap::Parser;
use cygddm::{
    check_availability, process_directory, DdmResult, ExtractOptions, ProcessOptions, SynthConfig,
    TimeSelection, DEFAULT_DATA_DIR, DEFAULT_LINEAR_THRESHOLD, DEFAULT_MAX_FILES,
    DEFAULT_OUTPUT_FILE,
};
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/// Number of files listed in check mode before summarizing the rest.
const CHECK_LIST_LIMIT: usize = 10;

/*-------------------------------------------------------------------------------------------------
 *                                     Command Line Options
 *-----------------------------------------------------------------------------------------------*/
///
/// Extract Delay-Doppler Maps from CYGNSS NetCDF files into a JSON file for the web app.
///
/// If no DDM can be extracted from the files in the data directory, a synthetic DDM with the same
/// structure as the real data is written instead.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "processddm")]
#[clap(author, version, about)]
struct ProcessDdmOptionsInit {
    /// Directory containing downloaded CYGNSS NetCDF files.
    ///
    /// If this is not specified, then the program will check for it in the "CYGNSS_DATA_DIR"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CYGNSS_DATA_DIR")]
    #[clap(default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Output JSON file for the web app.
    #[clap(short, long)]
    #[clap(default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// Just check for available files without processing.
    #[clap(short, long)]
    check: bool,

    /// Maximum number of files to process.
    #[clap(long)]
    #[clap(default_value_t = DEFAULT_MAX_FILES)]
    max_files: usize,

    /// Which time sample to use from files with a time dimension, "middle" or "first".
    #[clap(long)]
    #[clap(default_value_t = TimeSelection::Middle)]
    time_selection: TimeSelection,

    /// Raw power values above this are treated as linear and converted to dB.
    #[clap(long)]
    #[clap(default_value_t = DEFAULT_LINEAR_THRESHOLD)]
    linear_threshold: f64,

    /// Fail instead of writing synthetic data when nothing could be extracted.
    #[clap(long)]
    no_fallback: bool,

    /// Seed for the noise in synthetic data.
    #[clap(long)]
    #[clap(default_value_t = 0)]
    seed: u64,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct ProcessDdmOptionsChecked {
    /// Settings passed on to the library.
    process: ProcessOptions,

    /// Only list the files.
    check: bool,

    /// Verbose output
    verbose: bool,
}

impl Display for ProcessDdmOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let p = &self.process;

        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "  Data directory: {}", p.data_dir.display())?;
        writeln!(f, "     Output file: {}", p.output_file.display())?;
        writeln!(f, "       Max files: {}", p.max_files)?;
        writeln!(f, "  Time selection: {}", p.extract.time_selection)?;
        writeln!(f, "Linear threshold: {}", p.extract.linear_threshold)?;
        writeln!(f, "        Fallback: {}", p.fallback)?;
        writeln!(f, "      Noise seed: {}", p.synth.seed)?;
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
fn parse_args() -> DdmResult<ProcessDdmOptionsChecked> {
    let ProcessDdmOptionsInit {
        data_dir,
        output,
        check,
        max_files,
        time_selection,
        linear_threshold,
        no_fallback,
        seed,
        verbose,
    } = ProcessDdmOptionsInit::parse();

    if max_files == 0 {
        return Err("--max-files must be at least 1".into());
    }

    if !linear_threshold.is_finite() {
        return Err("--linear-threshold must be a finite number".into());
    }

    let process = ProcessOptions {
        data_dir,
        output_file: output,
        max_files,
        extract: ExtractOptions {
            time_selection,
            linear_threshold,
            ..Default::default()
        },
        fallback: !no_fallback,
        synth: SynthConfig {
            seed,
            ..Default::default()
        },
    };

    Ok(ProcessDdmOptionsChecked {
        process,
        check,
        verbose,
    })
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> DdmResult<()> {
    let opts = parse_args()?;

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    if opts.verbose {
        info!("{}", opts);
    }

    if opts.check {
        return list_sources(&opts);
    }

    let summary = process_directory(&opts.process)?;

    info!("");
    for line in summary.to_string().lines() {
        info!("{}", line);
    }
    info!("");

    Ok(())
}

fn list_sources(opts: &ProcessDdmOptionsChecked) -> DdmResult<()> {
    let data_dir = &opts.process.data_dir;
    let files = check_availability(data_dir)?;

    if files.is_empty() {
        warn!("No CYGNSS files found in {}", data_dir.display());
        return Ok(());
    }

    info!("Found {} CYGNSS files:", files.len());
    for file in files.iter().take(CHECK_LIST_LIMIT) {
        info!("    {}", file);
    }
    if files.len() > CHECK_LIST_LIMIT {
        info!("    ... and {} more files", files.len() - CHECK_LIST_LIMIT);
    }

    Ok(())
}
