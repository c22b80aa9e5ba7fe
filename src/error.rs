use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Which axis of a DDM a coordinate variable describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Delay,
    Doppler,
}

impl Axis {
    /// The name of the coordinate variable for this axis in CYGNSS files.
    pub fn variable_name(self) -> &'static str {
        match self {
            Axis::Delay => "delay",
            Axis::Doppler => "doppler",
        }
    }
}

/// The kinds of failure the extraction, synthesis, and output stages can report.
#[derive(Debug, Clone, PartialEq)]
pub enum DdmError {
    /// None of the known DDM power variable aliases is present in the dataset.
    NoPowerVariableFound,
    /// The power variable has a rank other than 2, 3, or 4.
    UnsupportedRank(usize),
    /// A coordinate variable does not describe the data axis it belongs to.
    CoordinateMismatch {
        axis: Axis,
        coordinate_len: usize,
        axis_len: usize,
    },
    /// The output file could not be written.
    PersistenceError(String),
    /// No source produced a DDM and synthesis was not allowed.
    NoProcessableSource,
    /// A variable requested by name is not in the dataset.
    MissingVariable(String),
    /// This build cannot read NetCDF files.
    NetCdfUnavailable,
}

impl Display for DdmError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        use DdmError::*;

        match self {
            NoPowerVariableFound => write!(f, "no recognized DDM power variable found"),
            UnsupportedRank(rank) => write!(f, "unsupported power variable rank: {}", rank),
            CoordinateMismatch {
                axis,
                coordinate_len,
                axis_len,
            } => write!(
                f,
                "{} coordinates have {} values but the data axis has {}",
                axis.variable_name(),
                coordinate_len,
                axis_len
            ),
            PersistenceError(msg) => write!(f, "error saving output: {}", msg),
            NoProcessableSource => write!(f, "no valid DDM data extracted from any source"),
            MissingVariable(name) => write!(f, "variable not found: {}", name),
            NetCdfUnavailable => write!(f, "built without NetCDF support"),
        }
    }
}

impl Error for DdmError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_mentions_the_axis() {
        let err = DdmError::CoordinateMismatch {
            axis: Axis::Doppler,
            coordinate_len: 5,
            axis_len: 11,
        };

        assert_eq!(
            err.to_string(),
            "doppler coordinates have 5 values but the data axis has 11"
        );
    }

    #[test]
    fn boxed_errors_downcast() {
        let boxed: Box<dyn Error> = DdmError::UnsupportedRank(5).into();
        assert_eq!(
            boxed.downcast_ref::<DdmError>(),
            Some(&DdmError::UnsupportedRank(5))
        );
    }
}
