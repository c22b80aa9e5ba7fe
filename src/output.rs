/*!
 * The JSON snapshot read by the web front end.
 *
 * The whole file is replaced on every run. It is written to a temporary file next to the
 * destination and renamed into place, so a reader sees either the old snapshot or the new one.
 */

use crate::{
    ddm::{DataSource, DdmRecord},
    error::DdmError,
    DdmResult,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};
use strum::{Display, EnumString};

/// Conventional location of the snapshot, relative to the web app's root.
pub const DEFAULT_OUTPUT_FILE: &str = "./public/cygnss_data.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Top level object of the output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEnvelope {
    pub status: Status,
    pub data_source: DataSource,
    /// ISO-8601 UTC time the envelope was assembled.
    pub processed_at: String,
    /// Number of sources that were found.
    pub total_files: usize,
    /// Number of sources that produced a DDM.
    pub processed_files: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The first DDM, or null if there are none.
    pub sample_ddm: Option<DdmRecord>,
    pub all_ddms: Vec<DdmRecord>,
}

impl OutputEnvelope {
    /// Wrap the records in an envelope.
    ///
    /// The status is "success" if there is at least one record and "error" otherwise.
    pub fn assemble(records: Vec<DdmRecord>, data_source: DataSource, total_files: usize) -> Self {
        let processed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let (status, message) = if records.is_empty() {
            (
                Status::Error,
                Some("No valid DDM data could be processed".to_owned()),
            )
        } else {
            let msg = match data_source {
                DataSource::Real => "CYGNSS satellite data successfully processed",
                DataSource::Structure => {
                    "No real CYGNSS data available, synthetic DDM with the real data structure"
                }
                DataSource::Development => {
                    "Synthetic CYGNSS DDM data structure for development and testing"
                }
            };
            (Status::Success, Some(msg.to_owned()))
        };

        OutputEnvelope {
            status,
            data_source,
            processed_at,
            total_files,
            processed_files: records.len(),
            message,
            sample_ddm: records.first().cloned(),
            all_ddms: records,
        }
    }

    /// Serialize with a two space indent.
    pub fn to_json_pretty(&self) -> DdmResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /**
     * Atomically replace the file at `path` with this envelope.
     *
     * Missing parent directories are created. Any failure is reported as a
     * [DdmError::PersistenceError] and leaves no partial file behind.
     */
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), DdmError> {
        let path = path.as_ref();
        self.write_json_inner(path).map_err(|err| {
            DdmError::PersistenceError(format!("{}: {}", path.display(), err))
        })
    }

    fn write_json_inner(&self, path: &Path) -> DdmResult<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        // Dropping the temporary file on an early return deletes it.
        let tmp = tempfile::Builder::new()
            .prefix(".cygnss_data")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        tmp.persist(path)?;
        log::debug!("saved {}", path.display());

        Ok(())
    }

    /// Load an envelope from a file.
    pub fn read_json<P: AsRef<Path>>(path: P) -> DdmResult<Self> {
        let f = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::synth::{synthesize, SynthConfig};

    #[test]
    fn empty_envelope_is_well_formed() {
        let env = OutputEnvelope::assemble(vec![], DataSource::Real, 0);
        assert_eq!(env.status, Status::Error);
        assert_eq!(env.processed_files, 0);

        let json = serde_json::to_value(&env).unwrap();
        assert!(json["sample_ddm"].is_null());
        assert_eq!(json["all_ddms"].as_array().unwrap().len(), 0);
        assert_eq!(json["processed_files"], 0);
        assert_eq!(json["status"], "error");
        assert_eq!(json["data_source"], "real");
    }

    #[test]
    fn sample_is_the_first_record() {
        let a = synthesize(&SynthConfig::default());
        let b = synthesize(&SynthConfig {
            seed: 1,
            ..Default::default()
        });

        let env = OutputEnvelope::assemble(vec![a.clone(), b], DataSource::Development, 3);
        assert_eq!(env.status, Status::Success);
        assert_eq!(env.total_files, 3);
        assert_eq!(env.processed_files, 2);
        assert_eq!(env.sample_ddm.as_ref(), Some(&a));
        assert_eq!(env.all_ddms.len(), 2);
        assert!(chrono::DateTime::parse_from_rfc3339(&env.processed_at).is_ok());
        assert!(env.processed_at.ends_with('Z'));
    }

    #[test]
    fn pretty_json_uses_two_spaces() {
        let env = OutputEnvelope::assemble(vec![], DataSource::Structure, 0);
        let text = env.to_json_pretty().unwrap();
        assert!(text.starts_with("{\n  \"status\": \"error\""));
    }
}
