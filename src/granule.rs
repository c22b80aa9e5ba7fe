/*! Contains all the information that can be learned from a CYGNSS granule file name. */

use crate::ddm::ProcessingLevel;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Number of spacecraft in the CYGNSS constellation.
pub const CONSTELLATION_SIZE: u8 = 8;

/**
 * The parts of a CYGNSS granule file name.
 *
 * A level 1 file name looks like
 * `cyg07.ddmi.s20180805-120000-e20180805-125959.l1.power-brcs.a30.d31.nc`, where `cyg07` is the
 * spacecraft, the `s` and `e` fields are the start and end of the observations, and `l1` is the
 * processing level.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GranuleName {
    /// Spacecraft number, 1 through 8.
    pub spacecraft: u8,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub level: Option<ProcessingLevel>,
}

impl GranuleName {
    /// Parse a file name, returning `None` if it isn't a CYGNSS granule name.
    pub fn parse(fname: &str) -> Option<Self> {
        let lower = fname.to_ascii_lowercase();
        let spacecraft = lower
            .strip_prefix("cyg")
            .and_then(|rest| rest.get(..2))
            .and_then(|num| num.parse::<u8>().ok())
            .filter(|num| (1..=CONSTELLATION_SIZE).contains(num))?;

        let mut start = None;
        let mut end = None;
        let mut level = None;

        for field in lower.split('.') {
            if let Some(times) = field.strip_prefix('s') {
                // s20180805-120000-e20180805-125959
                if let Some((s, e)) = times.split_once("-e") {
                    start = parse_scan_time(s);
                    end = parse_scan_time(e);
                } else {
                    start = parse_scan_time(times);
                }
            } else if field == "l1" {
                level = Some(ProcessingLevel::L1);
            } else if field == "l2" {
                level = Some(ProcessingLevel::L2);
            }
        }

        Some(GranuleName {
            spacecraft,
            start,
            end,
            level,
        })
    }

    /// Get a label for the spacecraft, e.g. "CYGNSS-07".
    pub fn satellite_label(&self) -> String {
        format!("CYGNSS-{:02}", self.spacecraft)
    }
}

/// Label to use when the file name doesn't identify the spacecraft.
pub const UNKNOWN_SATELLITE: &str = "CYGNSS";

/// Parse a time in the `YYYYmmdd-HHMMSS` format used in granule names.
fn parse_scan_time(field: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(field, "%Y%m%d-%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod test {
    use super::*;

    const L1_NAME: &str = "cyg07.ddmi.s20180805-120000-e20180805-125959.l1.power-brcs.a30.d31.nc";

    #[test]
    fn parses_a_level_1_name() {
        let gn = GranuleName::parse(L1_NAME).unwrap();

        assert_eq!(gn.spacecraft, 7);
        assert_eq!(gn.satellite_label(), "CYGNSS-07");
        assert_eq!(gn.level, Some(ProcessingLevel::L1));
        assert_eq!(
            gn.start.unwrap().to_rfc3339(),
            "2018-08-05T12:00:00+00:00"
        );
        assert_eq!(gn.end.unwrap().to_rfc3339(), "2018-08-05T12:59:59+00:00");
    }

    #[test]
    fn tolerates_missing_fields() {
        let gn = GranuleName::parse("CYG03_sample.nc").unwrap();
        assert_eq!(gn.spacecraft, 3);
        assert_eq!(gn.start, None);
        assert_eq!(gn.level, None);
    }

    #[test]
    fn rejects_other_names() {
        assert_eq!(GranuleName::parse("goes16_fdcc.nc"), None);
        assert_eq!(GranuleName::parse("cyg09.ddmi.nc"), None);
        assert_eq!(GranuleName::parse("cyg"), None);
    }
}
