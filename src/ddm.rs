/*! The Delay-Doppler Map records shared by the extractor, synthesizer, and output file. */

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// A single cell of a Delay-Doppler Map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DdmSample {
    /// Code delay in chips.
    pub delay: f64,
    /// Doppler frequency offset in Hz.
    pub doppler: f64,
    /// Reflected signal power in dB.
    pub power: f64,
}

/// Processing level of the product a DDM came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
    IntoStaticStr,
)]
pub enum ProcessingLevel {
    L1,
    L2,
}

impl ProcessingLevel {
    /// The level as a number, e.g. 1 for L1.
    pub fn number(self) -> u8 {
        match self {
            ProcessingLevel::L1 => 1,
            ProcessingLevel::L2 => 2,
        }
    }
}

impl Default for ProcessingLevel {
    fn default() -> Self {
        ProcessingLevel::L1
    }
}

/**
 * Descriptive information about a DDM.
 *
 * The optional fields are left out of the JSON output when they are not known.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// File name the DDM came from, or a placeholder name for synthetic data.
    pub file: String,
    /// Observation time, ISO-8601 when it could be decoded.
    pub timestamp: String,
    /// Spacecraft label, e.g. "CYGNSS-01".
    pub satellite: String,
    pub level: ProcessingLevel,
    pub delay_bins: usize,
    pub doppler_bins: usize,
    /// Always equal to the number of samples in the record.
    pub total_points: usize,
    /// Human readable provenance of the data.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_note: Option<String>,
    /// Name of the variable the power values were read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specular_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specular_lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_prn: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_type: Option<String>,
    /// Set when no time variable was found and `timestamp` is the processing time instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_placeholder: Option<bool>,
}

impl Metadata {
    /// Metadata with all the optional fields unset and a zero point count.
    pub fn new(
        file: impl Into<String>,
        timestamp: impl Into<String>,
        satellite: impl Into<String>,
        level: ProcessingLevel,
        delay_bins: usize,
        doppler_bins: usize,
        source: impl Into<String>,
    ) -> Self {
        Metadata {
            file: file.into(),
            timestamp: timestamp.into(),
            satellite: satellite.into(),
            level,
            delay_bins,
            doppler_bins,
            total_points: 0,
            source: source.into(),
            processing_note: None,
            power_variable: None,
            quality: None,
            specular_lat: None,
            specular_lon: None,
            gps_prn: None,
            surface_type: None,
            timestamp_placeholder: None,
        }
    }
}

/// A Delay-Doppler Map as a flat list of samples in row-major (delay, then doppler) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordFields")]
pub struct DdmRecord {
    ddm_data: Vec<DdmSample>,
    metadata: Metadata,
}

/// A record as it appears in a file, before its point count is checked.
#[derive(Deserialize)]
struct RecordFields {
    ddm_data: Vec<DdmSample>,
    metadata: Metadata,
}

impl TryFrom<RecordFields> for DdmRecord {
    type Error = String;

    fn try_from(fields: RecordFields) -> Result<Self, Self::Error> {
        let RecordFields { ddm_data, metadata } = fields;

        if metadata.total_points != ddm_data.len() {
            return Err(format!(
                "total_points is {} but ddm_data has {} samples",
                metadata.total_points,
                ddm_data.len()
            ));
        }

        Ok(DdmRecord { ddm_data, metadata })
    }
}

impl DdmRecord {
    /// Build a record, setting `total_points` from the samples.
    pub fn new(ddm_data: Vec<DdmSample>, mut metadata: Metadata) -> Self {
        debug_assert!(ddm_data.len() <= metadata.delay_bins * metadata.doppler_bins);

        metadata.total_points = ddm_data.len();
        DdmRecord { ddm_data, metadata }
    }

    pub fn samples(&self) -> &[DdmSample] {
        &self.ddm_data
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.ddm_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ddm_data.is_empty()
    }

    /// The sample with the highest power, usually at or near the specular point.
    pub fn peak(&self) -> Option<&DdmSample> {
        self.ddm_data
            .iter()
            .max_by(|a, b| a.power.total_cmp(&b.power))
    }
}

/// Where the data in an output file came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataSource {
    /// Extracted from instrument files.
    Real,
    /// Synthesized to stand in for real data that could not be found.
    Structure,
    /// Synthesized on request for front-end development.
    Development,
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn metadata() -> Metadata {
        Metadata::new(
            "cyg01.nc",
            "2018-08-05T12:30:00Z",
            "CYGNSS-01",
            ProcessingLevel::L1,
            2,
            2,
            "test",
        )
    }

    #[test]
    fn record_counts_its_points() {
        let samples = vec![
            DdmSample {
                delay: 0.0,
                doppler: -50.0,
                power: 5.0,
            },
            DdmSample {
                delay: 0.5,
                doppler: 0.0,
                power: 9.0,
            },
        ];

        let mut meta = metadata();
        meta.total_points = 17;
        let record = DdmRecord::new(samples, meta);

        assert_eq!(record.metadata().total_points, 2);
        assert_eq!(record.len(), 2);
        assert_eq!(record.peak().map(|s| s.power), Some(9.0));
    }

    #[test]
    fn optional_metadata_is_omitted() {
        let record = DdmRecord::new(vec![], metadata());
        let json = serde_json::to_value(&record).unwrap();

        let meta = json["metadata"].as_object().unwrap();
        assert!(!meta.contains_key("power_variable"));
        assert!(!meta.contains_key("specular_lat"));
        assert_eq!(meta["level"], "L1");
        assert_eq!(json["ddm_data"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn loading_checks_the_point_count() {
        let samples = vec![DdmSample {
            delay: 0.0,
            doppler: 0.0,
            power: 5.0,
        }];
        let record = DdmRecord::new(samples, metadata());

        let text = serde_json::to_string(&record).unwrap();
        let loaded: DdmRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, record);

        let mut json = serde_json::to_value(&record).unwrap();
        json["metadata"]["total_points"] = 3.into();
        let err = serde_json::from_value::<DdmRecord>(json).unwrap_err();
        assert!(err.to_string().contains("total_points is 3"));
    }

    #[test]
    fn data_source_names() {
        assert_eq!(DataSource::Real.to_string(), "real");
        assert_eq!(
            DataSource::from_str("development").unwrap(),
            DataSource::Development
        );
        assert_eq!(
            serde_json::to_string(&DataSource::Structure).unwrap(),
            "\"structure\""
        );
    }
}
