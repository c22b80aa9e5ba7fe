/*!
 * Pull a single Delay-Doppler Map out of a CYGNSS science data file.
 *
 * CYGNSS level 1 files store their DDMs as a 4-D array of (time, channel, delay, doppler). Other
 * products and reprocessed files use different variable names and sometimes drop the leading
 * dimensions, so the variable is found by probing a list of known names and the slice is chosen
 * by looking at its rank.
 */

use crate::{
    dataset::{Dataset, Grid2D},
    ddm::{DdmRecord, DdmSample, Metadata, ProcessingLevel},
    error::{Axis, DdmError},
    granule::{GranuleName, UNKNOWN_SATELLITE},
    DdmResult,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{debug, warn};
use strum::{Display, EnumString};

/// Names of DDM power variables in priority order, first one present wins.
pub const POWER_VARIABLE_ALIASES: [&str; 6] = [
    "power_analog",
    "ddm_obs",
    "ddm_nbrcs",
    "power",
    "brcs",
    "power_ddm",
];

/// Names of per-sample time variables in priority order.
pub const TIME_VARIABLE_ALIASES: [&str; 3] = ["ddm_timestamp_utc", "time", "timestamp"];

/// Default delay resolution in chips.
pub const DELAY_SPACING_CHIPS: f64 = 0.5;

/// Default doppler resolution in Hz.
pub const DOPPLER_SPACING_HZ: f64 = 50.0;

/// Raw power values above this are taken to be linear and converted to dB.
pub const DEFAULT_LINEAR_THRESHOLD: f64 = 100.0;

/// Floor for values converted to dB so the logarithm is always defined.
const LINEAR_EPSILON: f64 = 1.0e-10;

/// Which time sample to take from a 4-D (time, channel, delay, doppler) variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TimeSelection {
    /// The middle sample, `len / 2`. Samples near the start of a file are often still empty.
    Middle,
    /// The first sample.
    First,
}

/// Knobs for the extractor.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub time_selection: TimeSelection,
    /// Raw values strictly greater than this are converted from linear to dB.
    pub linear_threshold: f64,
    /// Drop cells with power less than or equal to zero.
    pub reject_non_positive: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            time_selection: TimeSelection::Middle,
            linear_threshold: DEFAULT_LINEAR_THRESHOLD,
            reject_non_positive: true,
        }
    }
}

/// The delay value for a bin when the file doesn't provide coordinates.
pub fn default_delay(i: usize) -> f64 {
    i as f64 * DELAY_SPACING_CHIPS
}

/// The doppler value for a bin when the file doesn't provide coordinates.
///
/// The zero doppler bin is at `cols / 2` (integer division).
pub fn default_doppler(j: usize, cols: usize) -> f64 {
    (j as f64 - (cols / 2) as f64) * DOPPLER_SPACING_HZ
}

/// Convert a raw power value to dB if it looks like it is on a linear scale.
pub fn to_decibels(value: f64, linear_threshold: f64) -> f64 {
    if value > linear_threshold {
        10.0 * value.max(LINEAR_EPSILON).log10()
    } else {
        value
    }
}

/// Find the first known power variable in the dataset.
pub fn resolve_power_variable<D: Dataset>(ds: &D) -> Result<&'static str, DdmError> {
    POWER_VARIABLE_ALIASES
        .iter()
        .copied()
        .find(|name| ds.has_variable(name))
        .ok_or(DdmError::NoPowerVariableFound)
}

/// The 2-D slice chosen out of the power variable and where it came from.
#[derive(Debug, Clone)]
pub struct DdmSlice {
    pub grid: Grid2D,
    /// The time index, if the variable had a time dimension.
    pub time_index: Option<usize>,
    /// The channel index, if the variable had a channel dimension.
    pub channel_index: Option<usize>,
}

/// Select the 2-D DDM out of a power variable of rank 2, 3, or 4.
pub fn select_slice<D: Dataset>(
    ds: &D,
    var_name: &str,
    selection: TimeSelection,
) -> DdmResult<DdmSlice> {
    let var = ds
        .variable(var_name)?
        .ok_or_else(|| DdmError::MissingVariable(var_name.to_owned()))?;

    let shape = var.shape();
    match var.rank() {
        4 => {
            let time_index = match selection {
                TimeSelection::Middle => shape[0] / 2,
                TimeSelection::First => 0,
            };
            let channel_index = 0;
            let grid = var.read_slice_2d(&[time_index, channel_index])?;
            Ok(DdmSlice {
                grid,
                time_index: Some(time_index),
                channel_index: Some(channel_index),
            })
        }
        3 => {
            let grid = var.read_slice_2d(&[0])?;
            Ok(DdmSlice {
                grid,
                time_index: Some(0),
                channel_index: None,
            })
        }
        2 => {
            let grid = var.read_slice_2d(&[])?;
            Ok(DdmSlice {
                grid,
                time_index: None,
                channel_index: None,
            })
        }
        rank => Err(DdmError::UnsupportedRank(rank).into()),
    }
}

/**
 * Load coordinate values for an axis of length `axis_len`.
 *
 * Values past the end of the axis are ignored. A coordinate variable that is not 1-D, is shorter
 * than the axis, or holds values that are not finite is a [DdmError::CoordinateMismatch]; returns
 * `Ok(None)` when the dataset has no coordinate variable for the axis.
 */
pub fn load_coordinates<D: Dataset>(
    ds: &D,
    axis: Axis,
    axis_len: usize,
) -> DdmResult<Option<Vec<f64>>> {
    let var = match ds.variable(axis.variable_name())? {
        Some(var) => var,
        None => return Ok(None),
    };

    let mismatch = |coordinate_len| DdmError::CoordinateMismatch {
        axis,
        coordinate_len,
        axis_len,
    };

    if var.rank() != 1 || var.len() < axis_len {
        return Err(mismatch(var.len()).into());
    }

    let mut vals = var.read_all()?;
    vals.truncate(axis_len);

    if vals.iter().any(|v| !v.is_finite()) {
        return Err(mismatch(vals.len()).into());
    }

    Ok(Some(vals))
}

/// Coordinates for an axis, from the file where possible and the default spacing otherwise.
fn axis_values<D: Dataset>(
    ds: &D,
    axis: Axis,
    axis_len: usize,
    default: impl Fn(usize) -> f64,
) -> Vec<f64> {
    match load_coordinates(ds, axis, axis_len) {
        Ok(Some(vals)) => {
            debug!("{}: using {} {} coordinates", ds.name(), vals.len(), axis.variable_name());
            vals
        }
        Ok(None) => (0..axis_len).map(default).collect(),
        Err(err) => {
            warn!("{}: {}, using default axis", ds.name(), err);
            (0..axis_len).map(default).collect()
        }
    }
}

/// Turn a 2-D slice into samples, skipping invalid cells.
pub fn grid_to_samples(
    grid: &Grid2D,
    delays: &[f64],
    dopplers: &[f64],
    opts: &ExtractOptions,
) -> Vec<DdmSample> {
    let mut samples = Vec::with_capacity(grid.rows() * grid.cols());

    for i in 0..grid.rows() {
        for j in 0..grid.cols() {
            let value = grid.get(i, j);

            if !value.is_finite() || (opts.reject_non_positive && value <= 0.0) {
                continue;
            }

            samples.push(DdmSample {
                delay: delays[i],
                doppler: dopplers[j],
                power: to_decibels(value, opts.linear_threshold),
            });
        }
    }

    samples
}

/// Look up the observation time that goes with `time_index`.
///
/// Returns `None` if there isn't a usable time variable.
pub fn resolve_timestamp<D: Dataset>(ds: &D, time_index: Option<usize>) -> Option<String> {
    let name = TIME_VARIABLE_ALIASES
        .iter()
        .copied()
        .find(|name| ds.has_variable(name))?;

    let var = match ds.variable(name) {
        Ok(Some(var)) if var.rank() == 1 && !var.is_empty() => var,
        Ok(_) => return None,
        Err(err) => {
            warn!("{}: unable to read {}: {}", ds.name(), name, err);
            return None;
        }
    };

    let idx = time_index.filter(|&i| i < var.len()).unwrap_or(0);
    let value = match var.read_value(&[idx]) {
        Ok(v) if v.is_finite() => v,
        Ok(_) => return None,
        Err(err) => {
            warn!("{}: unable to read {}: {}", ds.name(), name, err);
            return None;
        }
    };

    let converted = ds
        .text_attribute(name, "units")
        .and_then(|units| cf_time_to_datetime(value, &units));

    Some(match converted {
        Some(dt) => dt.to_rfc3339(),
        None => value.to_string(),
    })
}

/**
 * Convert a CF conventions time value, e.g. `units = "seconds since 2018-08-05 00:00:00"`.
 *
 * Returns `None` if the units can't be understood.
 */
pub fn cf_time_to_datetime(value: f64, units: &str) -> Option<DateTime<Utc>> {
    let (unit, reference) = units.split_once(" since ")?;

    let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
        "minutes" | "minute" | "mins" | "min" => 60.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
        "days" | "day" | "d" => 86_400.0,
        _ => return None,
    };

    let reference = parse_reference_time(reference.trim())?;
    let millis = (value * seconds_per_unit * 1000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }

    reference.checked_add_signed(Duration::milliseconds(millis as i64))
}

fn parse_reference_time(reference: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(reference) {
        return Some(dt.with_timezone(&Utc));
    }

    let trimmed = reference
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .trim();

    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];
    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/**
 * Extract a DDM from a dataset.
 *
 * Returns `Ok(None)` if the DDM was found but every cell in it was invalid. A missing power
 * variable or an unusable rank is an error, but callers processing many files should log it and
 * move on to the next one.
 */
pub fn extract_ddm<D: Dataset>(ds: &D, opts: &ExtractOptions) -> DdmResult<Option<DdmRecord>> {
    let power_variable = resolve_power_variable(ds)?;
    debug!("{}: found power data in {}", ds.name(), power_variable);

    let slice = select_slice(ds, power_variable, opts.time_selection)?;
    let (rows, cols) = (slice.grid.rows(), slice.grid.cols());

    let delays = axis_values(ds, Axis::Delay, rows, default_delay);
    let dopplers = axis_values(ds, Axis::Doppler, cols, |j| default_doppler(j, cols));

    let samples = grid_to_samples(&slice.grid, &delays, &dopplers, opts);
    if samples.is_empty() {
        warn!("{}: no valid cells in {}", ds.name(), power_variable);
        return Ok(None);
    }

    let granule = GranuleName::parse(ds.name());
    let satellite = granule
        .map(|g| g.satellite_label())
        .unwrap_or_else(|| UNKNOWN_SATELLITE.to_owned());
    let level = granule
        .and_then(|g| g.level)
        .unwrap_or(ProcessingLevel::L1);

    let (timestamp, placeholder) = match resolve_timestamp(ds, slice.time_index) {
        Some(ts) => (ts, false),
        None => (Utc::now().to_rfc3339(), true),
    };

    let mut meta = Metadata::new(
        ds.name(),
        timestamp,
        satellite,
        level,
        rows,
        cols,
        format!("Real NASA CYGNSS Level {} data", level.number()),
    );
    meta.power_variable = Some(power_variable.to_owned());
    meta.processing_note = Some(processing_note(&slice));
    if placeholder {
        meta.timestamp_placeholder = Some(true);
    }

    debug!(
        "{}: extracted {} of {} DDM cells",
        ds.name(),
        samples.len(),
        rows * cols
    );

    Ok(Some(DdmRecord::new(samples, meta)))
}

fn processing_note(slice: &DdmSlice) -> String {
    match (slice.time_index, slice.channel_index) {
        (Some(t), Some(c)) => format!("Extracted from time sample {}, channel {}", t, c),
        (Some(t), None) => format!("Extracted from sample {} of the leading dimension", t),
        _ => "Extracted from a 2-D DDM variable".to_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dataset::MemoryDataset;

    fn two_by_two(var: &str) -> MemoryDataset {
        MemoryDataset::new("test.nc")
            .with_variable(var, &[2, 2], vec![f64::NAN, 5.0, 3.0, -1.0])
            .unwrap()
    }

    #[test]
    fn decibel_conversion() {
        assert!((to_decibels(1500.0, DEFAULT_LINEAR_THRESHOLD) - 31.760912590556813).abs() < 1e-12);
        assert_eq!(to_decibels(25.0, DEFAULT_LINEAR_THRESHOLD), 25.0);
        assert_eq!(to_decibels(100.0, DEFAULT_LINEAR_THRESHOLD), 100.0);
        assert_eq!(to_decibels(500.0, 1000.0), 500.0);
    }

    #[test]
    fn default_axes() {
        assert_eq!(default_delay(16), 8.0);
        assert_eq!(default_doppler(0, 11), -250.0);
        assert_eq!(default_doppler(5, 11), 0.0);
        assert_eq!(default_doppler(10, 11), 250.0);
        assert_eq!(default_doppler(0, 2), -50.0);
    }

    #[test]
    fn alias_priority() {
        let ds = two_by_two("brcs");
        assert_eq!(resolve_power_variable(&ds).unwrap(), "brcs");

        let ds = two_by_two("brcs")
            .with_variable("ddm_obs", &[1, 1], vec![1.0])
            .unwrap();
        assert_eq!(resolve_power_variable(&ds).unwrap(), "ddm_obs");

        let ds = two_by_two("something_else");
        assert_eq!(
            resolve_power_variable(&ds),
            Err(DdmError::NoPowerVariableFound)
        );
    }

    #[test]
    fn invalid_cells_are_skipped() {
        let ds = two_by_two("power");
        let record = extract_ddm(&ds, &ExtractOptions::default())
            .unwrap()
            .unwrap();

        // NaN at (0, 0) and -1 at (1, 1) are dropped, 3.0 at (1, 0) is kept.
        assert_eq!(
            record.samples(),
            &[
                DdmSample {
                    delay: 0.0,
                    doppler: 0.0,
                    power: 5.0
                },
                DdmSample {
                    delay: 0.5,
                    doppler: -50.0,
                    power: 3.0
                }
            ][..]
        );
        assert_eq!(record.metadata().total_points, 2);
        assert_eq!(record.metadata().delay_bins, 2);
        assert_eq!(record.metadata().doppler_bins, 2);
    }

    #[test]
    fn non_positive_cells_can_be_kept() {
        let ds = two_by_two("power");
        let opts = ExtractOptions {
            reject_non_positive: false,
            ..Default::default()
        };
        let record = extract_ddm(&ds, &opts).unwrap().unwrap();
        assert_eq!(record.len(), 3);
        assert!(record.samples().iter().all(|s| s.power.is_finite()));
    }

    #[test]
    fn all_invalid_gives_no_record() {
        let ds = MemoryDataset::new("empty.nc")
            .with_variable("power", &[1, 3], vec![f64::NAN, f64::INFINITY, 0.0])
            .unwrap();
        assert!(extract_ddm(&ds, &ExtractOptions::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn four_d_selects_time_and_channel() {
        // (time=3, channel=2, delay=2, doppler=3), value encodes its index.
        let mut values = vec![];
        for t in 0..3 {
            for c in 0..2 {
                for i in 0..2 {
                    for j in 0..3 {
                        values.push((1000 * t + 100 * c + 10 * i + j + 1) as f64);
                    }
                }
            }
        }
        let ds = MemoryDataset::new("cube.nc")
            .with_variable("power_analog", &[3, 2, 2, 3], values)
            .unwrap();

        let slice = select_slice(&ds, "power_analog", TimeSelection::Middle).unwrap();
        assert_eq!(slice.time_index, Some(1));
        assert_eq!(slice.channel_index, Some(0));
        assert_eq!(slice.grid.get(0, 0), 1001.0);
        assert_eq!(slice.grid.get(1, 2), 1013.0);

        let slice = select_slice(&ds, "power_analog", TimeSelection::First).unwrap();
        assert_eq!(slice.time_index, Some(0));
        assert_eq!(slice.grid.get(1, 2), 13.0);
    }

    #[test]
    fn three_d_takes_the_first_leading_index() {
        let ds = MemoryDataset::new("three.nc")
            .with_variable("ddm_obs", &[2, 1, 2], vec![1.0, 2.0, 3.0, 4.0])
            .unwrap();
        let slice = select_slice(&ds, "ddm_obs", TimeSelection::Middle).unwrap();
        assert_eq!(slice.grid, Grid2D::new(1, 2, vec![1.0, 2.0]).unwrap());
        assert_eq!(slice.time_index, Some(0));
    }

    #[test]
    fn unsupported_ranks() {
        let ds = MemoryDataset::new("flat.nc")
            .with_variable("power", &[4], vec![1.0, 2.0, 3.0, 4.0])
            .unwrap();
        let err = extract_ddm(&ds, &ExtractOptions::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DdmError>(),
            Some(&DdmError::UnsupportedRank(1))
        );

        let ds = MemoryDataset::new("five.nc")
            .with_variable("power", &[1, 1, 1, 1, 1], vec![1.0])
            .unwrap();
        let err = extract_ddm(&ds, &ExtractOptions::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DdmError>(),
            Some(&DdmError::UnsupportedRank(5))
        );
    }

    #[test]
    fn coordinates_from_the_file() {
        let ds = MemoryDataset::new("coords.nc")
            .with_variable("power", &[2, 2], vec![1.0, 2.0, 3.0, 4.0])
            .unwrap()
            .with_variable("delay", &[3], vec![-1.0, 0.0, 1.0])
            .unwrap()
            .with_variable("doppler", &[2], vec![-500.0, 500.0])
            .unwrap();

        let record = extract_ddm(&ds, &ExtractOptions::default())
            .unwrap()
            .unwrap();
        let pts: Vec<(f64, f64)> = record
            .samples()
            .iter()
            .map(|s| (s.delay, s.doppler))
            .collect();
        assert_eq!(
            pts,
            vec![(-1.0, -500.0), (-1.0, 500.0), (0.0, -500.0), (0.0, 500.0)]
        );
    }

    #[test]
    fn short_coordinates_fall_back_to_defaults() {
        let ds = MemoryDataset::new("short.nc")
            .with_variable("power", &[2, 3], vec![1.0; 6])
            .unwrap()
            .with_variable("doppler", &[2], vec![-10.0, 10.0])
            .unwrap();

        let err = load_coordinates(&ds, Axis::Doppler, 3).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DdmError>(),
            Some(&DdmError::CoordinateMismatch {
                axis: Axis::Doppler,
                coordinate_len: 2,
                axis_len: 3
            })
        );

        let record = extract_ddm(&ds, &ExtractOptions::default())
            .unwrap()
            .unwrap();
        let dopplers: Vec<f64> = record.samples()[..3].iter().map(|s| s.doppler).collect();
        assert_eq!(dopplers, vec![-50.0, 0.0, 50.0]);
    }

    #[test]
    fn metadata_from_granule_name_and_time_variable() {
        let name = "cyg04.ddmi.s20180805-120000-e20180805-125959.l1.power-brcs.a30.d31.nc";
        let ds = MemoryDataset::new(name)
            .with_variable("power_analog", &[3, 1, 1, 1], vec![2000.0, 3000.0, 4000.0])
            .unwrap()
            .with_variable("ddm_timestamp_utc", &[3], vec![0.0, 90.5, 181.0])
            .unwrap()
            .with_attribute(
                "ddm_timestamp_utc",
                "units",
                "seconds since 2018-08-05 12:00:00",
            );

        let record = extract_ddm(&ds, &ExtractOptions::default())
            .unwrap()
            .unwrap();
        let meta = record.metadata();

        assert_eq!(meta.file, name);
        assert_eq!(meta.satellite, "CYGNSS-04");
        assert_eq!(meta.level, ProcessingLevel::L1);
        assert_eq!(meta.power_variable.as_deref(), Some("power_analog"));
        assert_eq!(meta.timestamp, "2018-08-05T12:01:30.500+00:00");
        assert_eq!(meta.timestamp_placeholder, None);
        assert_eq!(meta.source, "Real NASA CYGNSS Level 1 data");
        assert_eq!(
            meta.processing_note.as_deref(),
            Some("Extracted from time sample 1, channel 0")
        );
        assert!((record.samples()[0].power - 10.0 * 3000f64.log10()).abs() < 1e-12);
    }

    #[test]
    fn missing_time_variable_is_marked() {
        let ds = two_by_two("power");
        let record = extract_ddm(&ds, &ExtractOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(record.metadata().timestamp_placeholder, Some(true));
        assert_eq!(record.metadata().satellite, UNKNOWN_SATELLITE);
        assert!(DateTime::parse_from_rfc3339(&record.metadata().timestamp).is_ok());
    }

    #[test]
    fn time_without_units_is_rendered_raw() {
        let ds = two_by_two("power")
            .with_variable("time", &[1], vec![1234.5])
            .unwrap();
        assert_eq!(resolve_timestamp(&ds, Some(7)).as_deref(), Some("1234.5"));
    }

    #[test]
    fn cf_time_units() {
        let dt = cf_time_to_datetime(1.5, "days since 2018-08-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2018-08-02T12:00:00+00:00");

        let dt = cf_time_to_datetime(60.0, "minutes since 2018-08-01T00:00:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2018-08-01T01:00:00+00:00");

        assert!(cf_time_to_datetime(1.0, "fortnights since 2018-08-01").is_none());
        assert!(cf_time_to_datetime(1.0, "seconds").is_none());
    }
}
