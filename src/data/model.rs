use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayD, Axis, Slice};

// ---------------------------------------------------------------------------
// DatasetId – identity used as the first cache level
// ---------------------------------------------------------------------------

/// Identity of a dataset. Two datasets with equal contents still have
/// different ids and therefore separate cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(u64);

impl DatasetId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DatasetId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Dataset – realisations × variables (× time)
// ---------------------------------------------------------------------------

/// A multivariate dataset: `n` realisations of `p` variables, optionally over
/// `t` time steps.
///
/// Not `Clone`: a copy would share the identity. Use [`Dataset::duplicate`].
///
/// Mutating the array through [`Dataset::data_mut`] does **not** invalidate
/// cached results; callers must uncache the dataset themselves (the
/// calculator's `replace_data` does this).
#[derive(Debug)]
pub struct Dataset {
    id: DatasetId,
    name: String,
    data: ArrayD<f64>,
    var_names: Vec<String>,
    normalised: bool,
}

impl Dataset {
    /// Accepts 2-D (n×p) and 3-D (n×p×t) arrays.
    pub fn new(data: ArrayD<f64>) -> Result<Self> {
        check_dimensions(&data)?;
        let var_names = (0..data.len_of(Axis(1))).map(|j| format!("proc-{j}")).collect();
        Ok(Self {
            id: DatasetId::next(),
            name: String::new(),
            data,
            var_names,
            normalised: false,
        })
    }

    /// Build an n×p dataset from rows of equal length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = rows.len();
        let p = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != p) {
            bail!("Row {i} has {} values but row 0 has {p}", row.len());
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let array = Array2::from_shape_vec((n, p), flat)?;
        Self::new(array.into_dyn())
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_var_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.n_variables() {
            bail!(
                "{} variable names given for {} variables",
                names.len(),
                self.n_variables()
            );
        }
        self.var_names = names;
        Ok(self)
    }

    /// Z-score every variable (and time step) across realisations.
    /// Constant variables are only centred.
    pub fn normalised(mut self) -> Self {
        for mut lane in self.data.lanes_mut(Axis(0)) {
            let n = lane.len() as f64;
            if n == 0.0 {
                continue;
            }
            let mean = lane.sum() / n;
            let var = lane.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let sd = var.sqrt();
            let scale = if sd.abs() < 1e-12 { 1.0 } else { sd };
            lane.mapv_inplace(|v| (v - mean) / scale);
        }
        self.normalised = true;
        self
    }

    /// Keep only the first `n_observations` realisations and/or `n_variables`
    /// variables.
    pub fn subsample(
        mut self,
        n_observations: Option<usize>,
        n_variables: Option<usize>,
    ) -> Result<Self> {
        if let Some(n) = n_observations {
            if n == 0 || n > self.n_observations() {
                bail!("cannot subsample {n} of {} realisations", self.n_observations());
            }
            self.data = self.data.slice_axis(Axis(0), Slice::from(..n)).to_owned();
        }
        if let Some(p) = n_variables {
            if p == 0 || p > self.n_variables() {
                bail!("cannot subsample {p} of {} variables", self.n_variables());
            }
            self.data = self.data.slice_axis(Axis(1), Slice::from(..p)).to_owned();
            self.var_names.truncate(p);
        }
        Ok(self)
    }

    /// Same contents, fresh identity.
    pub fn duplicate(&self) -> Self {
        Self {
            id: DatasetId::next(),
            name: self.name.clone(),
            data: self.data.clone(),
            var_names: self.var_names.clone(),
            normalised: self.normalised,
        }
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// See the type-level note on stale cache entries.
    pub fn data_mut(&mut self) -> &mut ArrayD<f64> {
        &mut self.data
    }

    pub(crate) fn replace(&mut self, data: ArrayD<f64>) -> Result<()> {
        check_dimensions(&data)?;
        if data.len_of(Axis(1)) != self.var_names.len() {
            self.var_names = (0..data.len_of(Axis(1))).map(|j| format!("proc-{j}")).collect();
        }
        self.data = data;
        self.normalised = false;
        Ok(())
    }

    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn n_observations(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn n_variables(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn n_timesteps(&self) -> Option<usize> {
        (self.data.ndim() == 3).then(|| self.data.len_of(Axis(2)))
    }

    pub fn is_time_series(&self) -> bool {
        self.data.ndim() == 3
    }

    pub fn is_normalised(&self) -> bool {
        self.normalised
    }
}

fn check_dimensions(data: &ArrayD<f64>) -> Result<()> {
    match data.ndim() {
        2 | 3 => Ok(()),
        n => bail!("dataset must be n x p or n x p x t, got {n} dimensions"),
    }
}
