pub use dataset::{Dataset, Grid2D, MemoryDataset, Variable};
pub use ddm::{DataSource, DdmRecord, DdmSample, Metadata, ProcessingLevel};
pub use error::{Axis, DdmError};
pub use extract::{
    cf_time_to_datetime, default_delay, default_doppler, extract_ddm, load_coordinates,
    resolve_power_variable, resolve_timestamp, select_slice, to_decibels, DdmSlice,
    ExtractOptions, TimeSelection, DEFAULT_LINEAR_THRESHOLD, POWER_VARIABLE_ALIASES,
    TIME_VARIABLE_ALIASES,
};
pub use granule::GranuleName;
pub use netcdf::NetCdfFile;
pub use output::{OutputEnvelope, Status, DEFAULT_OUTPUT_FILE};
pub use pipeline::{
    check_availability, extract_all, extracted_or_synthetic, find_sources, process_directory,
    write_synthetic, ProcessOptions, RunSummary, SourceFile, DEFAULT_DATA_DIR, DEFAULT_MAX_FILES,
};
pub use synth::{
    cell_seed, synthesize, PlaceholderMetadata, ScatteringModel, SynthConfig, CYGNSS_DELAY_BINS,
    CYGNSS_DOPPLER_BINS,
};

/// Result type used throughout the crate.
pub type DdmResult<T> = Result<T, Box<dyn std::error::Error>>;

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod dataset;
mod ddm;
mod error;
mod extract;
mod granule;
mod netcdf;
mod output;
mod pipeline;
mod synth;
