/*!
 * A narrow view of a labeled, multi-dimensional science data file.
 *
 * The extractor only ever needs to look things up by name and read rectangular blocks of values,
 * so that is all this interface offers. [NetCdfFile](crate::NetCdfFile) implements it for real
 * granules and [MemoryDataset] implements it for data already in memory.
 */

use crate::{error::DdmError, DdmResult};
use rustc_hash::FxHashMap as HashMap;

/// Read access to named variables, dimensions, and attributes.
pub trait Dataset {
    /// A name for the data source, usually the file name.
    fn name(&self) -> &str;

    fn has_variable(&self, name: &str) -> bool;

    /// The length of each dimension of a variable, slowest varying first.
    fn variable_shape(&self, name: &str) -> DdmResult<Vec<usize>>;

    /// Read a block of values in row-major order.
    ///
    /// Missing and fill values come back as NaN.
    fn read_hyperslab(&self, name: &str, start: &[usize], count: &[usize]) -> DdmResult<Vec<f64>>;

    /// The length of a named dimension, or `None` if there isn't one.
    ///
    /// Offered for tools that inspect a file's layout. The extractor does not use it, DDM sizes
    /// always come from the shape of the power variable itself.
    fn dimension_size(&self, name: &str) -> Option<usize>;

    /// The value of a text attribute attached to a variable, if it exists.
    fn text_attribute(&self, variable: &str, attribute: &str) -> Option<String>;

    /// Get a handle to a variable, or `None` if there isn't one with this name.
    fn variable(&self, name: &str) -> DdmResult<Option<Variable<'_, Self>>>
    where
        Self: Sized,
    {
        if !self.has_variable(name) {
            return Ok(None);
        }

        let shape = self.variable_shape(name)?;
        Ok(Some(Variable {
            dataset: self,
            name: name.to_owned(),
            shape,
        }))
    }
}

/// A variable in a [Dataset] along with its shape.
#[derive(Debug)]
pub struct Variable<'a, D: Dataset> {
    dataset: &'a D,
    name: String,
    shape: Vec<usize>,
}

impl<'a, D: Dataset> Variable<'a, D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// The total number of values in the variable.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read every value in the variable.
    pub fn read_all(&self) -> DdmResult<Vec<f64>> {
        let start = vec![0; self.shape.len()];
        self.dataset.read_hyperslab(&self.name, &start, &self.shape)
    }

    /// Read a single value by its full index.
    pub fn read_value(&self, index: &[usize]) -> DdmResult<f64> {
        let count = vec![1; index.len()];
        let vals = self.dataset.read_hyperslab(&self.name, index, &count)?;
        vals.first()
            .copied()
            .ok_or_else(|| DdmError::MissingVariable(self.name.clone()).into())
    }

    /**
     * Read the 2-D slice formed by the two fastest varying dimensions.
     *
     * `leading` fixes an index on every other dimension, so it must have `rank - 2` entries.
     */
    pub fn read_slice_2d(&self, leading: &[usize]) -> DdmResult<Grid2D> {
        let rank = self.rank();
        if rank < 2 || leading.len() != rank - 2 {
            return Err(DdmError::UnsupportedRank(rank).into());
        }

        let rows = self.shape[rank - 2];
        let cols = self.shape[rank - 1];

        let mut start = leading.to_vec();
        start.extend_from_slice(&[0, 0]);
        let mut count = vec![1; leading.len()];
        count.extend_from_slice(&[rows, cols]);

        let values = self.dataset.read_hyperslab(&self.name, &start, &count)?;
        Grid2D::new(rows, cols, values)
    }
}

/// A row-major 2-D block of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2D {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Grid2D {
    pub fn new(rows: usize, cols: usize, values: Vec<f64>) -> DdmResult<Self> {
        if values.len() != rows * cols {
            return Err(format!(
                "grid of {}x{} needs {} values, got {}",
                rows,
                cols,
                rows * cols,
                values.len()
            )
            .into());
        }

        Ok(Grid2D { rows, cols, values })
    }

    /// Build a grid from nested rows, all of which must be the same length.
    pub fn from_rows(rows: &[&[f64]]) -> DdmResult<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let values: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::new(rows.len(), cols, values)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }
}

#[derive(Debug, Clone)]
struct MemoryVariable {
    shape: Vec<usize>,
    values: Vec<f64>,
    attributes: HashMap<String, String>,
}

/// A [Dataset] held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    name: String,
    variables: HashMap<String, MemoryVariable>,
    dimensions: HashMap<String, usize>,
}

impl MemoryDataset {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryDataset {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a variable with row-major `values`.
    pub fn with_variable(
        mut self,
        name: &str,
        shape: &[usize],
        values: Vec<f64>,
    ) -> DdmResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(format!(
                "variable {} with shape {:?} needs {} values, got {}",
                name,
                shape,
                expected,
                values.len()
            )
            .into());
        }

        self.variables.insert(
            name.to_owned(),
            MemoryVariable {
                shape: shape.to_vec(),
                values,
                attributes: HashMap::default(),
            },
        );
        Ok(self)
    }

    pub fn with_dimension(mut self, name: &str, len: usize) -> Self {
        self.dimensions.insert(name.to_owned(), len);
        self
    }

    pub fn with_attribute(mut self, variable: &str, attribute: &str, value: &str) -> Self {
        if let Some(var) = self.variables.get_mut(variable) {
            var.attributes
                .insert(attribute.to_owned(), value.to_owned());
        }
        self
    }

    fn get(&self, name: &str) -> DdmResult<&MemoryVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| DdmError::MissingVariable(name.to_owned()).into())
    }
}

impl Dataset for MemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn variable_shape(&self, name: &str) -> DdmResult<Vec<usize>> {
        Ok(self.get(name)?.shape.clone())
    }

    fn read_hyperslab(&self, name: &str, start: &[usize], count: &[usize]) -> DdmResult<Vec<f64>> {
        let var = self.get(name)?;
        let rank = var.shape.len();

        if start.len() != rank || count.len() != rank {
            return Err(format!("hyperslab rank mismatch for {}", name).into());
        }
        for d in 0..rank {
            if start[d] + count[d] > var.shape[d] {
                return Err(format!("hyperslab out of bounds for {} on dimension {}", name, d).into());
            }
        }

        // Row-major strides.
        let mut strides = vec![1; rank];
        for d in (0..rank.saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * var.shape[d + 1];
        }

        let total: usize = count.iter().product();
        let mut out = Vec::with_capacity(total);
        let mut idx = vec![0; rank];

        for _ in 0..total {
            let offset: usize = (0..rank).map(|d| (start[d] + idx[d]) * strides[d]).sum();
            out.push(var.values[offset]);

            // Odometer increment, fastest dimension last.
            for d in (0..rank).rev() {
                idx[d] += 1;
                if idx[d] < count[d] {
                    break;
                }
                idx[d] = 0;
            }
        }

        Ok(out)
    }

    fn dimension_size(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).copied()
    }

    fn text_attribute(&self, variable: &str, attribute: &str) -> Option<String> {
        self.variables
            .get(variable)
            .and_then(|v| v.attributes.get(attribute))
            .cloned()
    }
}
