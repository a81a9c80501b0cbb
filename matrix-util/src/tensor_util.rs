use crate::traits::*;
use candle_util::candle_core::{DType, Device, Tensor};
use ndarray::{Array1, Array2};

/// Models run in `f32`; data matrices live in `f64`.
impl ConvertMatOps for Array2<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn from_tensor(x: &Tensor) -> anyhow::Result<Self::Mat> {
        let (nrow, ncol) = x.dims2()?;
        let data: Vec<f64> = x
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F64)?
            .flatten_all()?
            .to_vec1()?;
        Ok(Array2::from_shape_vec((nrow, ncol), data)?)
    }

    fn to_tensor(&self, dev: &Device) -> anyhow::Result<Tensor> {
        let (nrow, ncol) = self.dim();
        let data: Vec<f32> = self.iter().map(|&x| x as f32).collect();
        Ok(Tensor::from_vec(data, (nrow, ncol), dev)?)
    }
}

impl ConvertMatOps for Array1<f64> {
    type Mat = Self;
    type Scalar = f64;

    /// a `1 x d` or `d` tensor
    fn from_tensor(x: &Tensor) -> anyhow::Result<Self::Mat> {
        let data: Vec<f64> = x
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F64)?
            .flatten_all()?
            .to_vec1()?;
        Ok(Array1::from_vec(data))
    }

    /// always a `1 x d` row
    fn to_tensor(&self, dev: &Device) -> anyhow::Result<Tensor> {
        let data: Vec<f32> = self.iter().map(|&x| x as f32).collect();
        Ok(Tensor::from_vec(data, (1, self.len()), dev)?)
    }
}
