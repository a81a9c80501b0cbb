use crate::common_io::write_lines;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2};
use serde::{Deserialize, Serialize};

/// Column-wise z-score parameters fitted on a reference matrix
///
/// Statistics are always accumulated in `f64`, whatever the input
/// precision, so that `invert(apply(x))` gives `x` back to rounding
/// error. The standard deviation is the population one (`ddof = 0`).
///
/// A zero-variance column is not special-cased: standardizing it
/// yields NaN (0/0) or ±Inf and those values flow downstream.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardizationParams {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
    /// column minimum of the standardized reference matrix
    pub standardized_min: Array1<f64>,
    /// column maximum of the standardized reference matrix
    pub standardized_max: Array1<f64>,
}

impl StandardizationParams {
    /// Fit mean and standard deviation of each column of `x_nd`
    ///
    /// * `x_nd` - reference data (n x d)
    pub fn fit<S, A>(x_nd: &ArrayBase<S, Ix2>) -> anyhow::Result<Self>
    where
        S: Data<Elem = A>,
        A: Copy + Into<f64>,
    {
        let nn = x_nd.nrows();
        if nn == 0 {
            anyhow::bail!("can't standardize an empty matrix");
        }

        let x_nd = x_nd.mapv(|x| x.into());
        let mean = x_nd.sum_axis(Axis(0)) / nn as f64;
        let resid_nd = &x_nd - &mean;
        let var = resid_nd.mapv(|r| r * r).sum_axis(Axis(0)) / nn as f64;
        let std = var.mapv(f64::sqrt);

        let z_nd = &resid_nd / &std;
        let standardized_min = z_nd.fold_axis(Axis(0), f64::INFINITY, |&acc, &z| nan_min(acc, z));
        let standardized_max =
            z_nd.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &z| nan_max(acc, z));

        Ok(Self {
            mean,
            std,
            standardized_min,
            standardized_max,
        })
    }

    pub fn num_columns(&self) -> usize {
        self.mean.len()
    }

    /// `(x - mean) / std` for every row of `x_nd`
    pub fn apply<S>(&self, x_nd: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        debug_assert_eq!(x_nd.ncols(), self.num_columns());
        (x_nd - &self.mean) / &self.std
    }

    pub fn apply_row<S>(&self, x_d: &ArrayBase<S, Ix1>) -> Array1<f64>
    where
        S: Data<Elem = f64>,
    {
        (x_d - &self.mean) / &self.std
    }

    /// `z * std + mean` for every row of `z_nd`
    pub fn invert<S>(&self, z_nd: &ArrayBase<S, Ix2>) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        debug_assert_eq!(z_nd.ncols(), self.num_columns());
        z_nd * &self.std + &self.mean
    }

    pub fn invert_row<S>(&self, z_d: &ArrayBase<S, Ix1>) -> Array1<f64>
    where
        S: Data<Elem = f64>,
    {
        z_d * &self.std + &self.mean
    }

    /// Clamp a standardized row into the range observed in the
    /// reference data; columns with non-finite bounds are left alone.
    pub fn clamp_to_observed_range(&self, z_d: ArrayView1<f64>) -> Array1<f64> {
        let mut ret = z_d.to_owned();
        for ((z, &lb), &ub) in ret
            .iter_mut()
            .zip(self.standardized_min.iter())
            .zip(self.standardized_max.iter())
        {
            if lb.is_finite() && ub.is_finite() && lb <= ub {
                *z = z.clamp(lb, ub);
            }
        }
        ret
    }

    /// Save the parameters as a delimited table
    /// * `filename` - output file (gzipped if it ends with `.gz`)
    /// * `names` - one name per column
    /// * `sep` - separator
    pub fn save(&self, filename: &str, names: &[Box<str>], sep: &str) -> anyhow::Result<()> {
        let mut out = self.to_string_vec(names, sep)?;
        let header = format!("#name{}mu{}sig{}min{}max", sep, sep, sep, sep);
        out.insert(0, header.into_boxed_str());
        write_lines(&out, filename)
    }

    pub fn to_string_vec(&self, names: &[Box<str>], sep: &str) -> anyhow::Result<Vec<Box<str>>> {
        if names.len() != self.num_columns() {
            anyhow::bail!(
                "{} names for {} standardized columns",
                names.len(),
                self.num_columns()
            );
        }

        Ok((0..self.num_columns())
            .map(|j| {
                format!(
                    "{}{}{}{}{}{}{}{}{}",
                    names[j],
                    sep,
                    self.mean[j],
                    sep,
                    self.std[j],
                    sep,
                    self.standardized_min[j],
                    sep,
                    self.standardized_max[j]
                )
                .into_boxed_str()
            })
            .collect())
    }
}

fn nan_min(acc: f64, z: f64) -> f64 {
    if acc.is_nan() || z.is_nan() {
        f64::NAN
    } else {
        acc.min(z)
    }
}

fn nan_max(acc: f64, z: f64) -> f64 {
    if acc.is_nan() || z.is_nan() {
        f64::NAN
    } else {
        acc.max(z)
    }
}
