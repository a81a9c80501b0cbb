use candle_core::{Device, Result, Tensor, Var};
use candle_nn::{Module, VarMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

////////////////////////////////////////////////
// Dense layer with row-major [in, out] weight //
////////////////////////////////////////////////

/// `y = x * W + b` with `W` stored as `in_dim x out_dim`
#[derive(Clone, Debug)]
pub struct AffineLinear {
    in_dim: usize,
    out_dim: usize,
    weight_io: Tensor,
    bias_o: Tensor,
}

impl AffineLinear {
    pub fn new(weight_io: Tensor, bias_o: Tensor) -> Result<Self> {
        let (in_dim, out_dim) = weight_io.dims2()?;
        if bias_o.dims1()? != out_dim {
            candle_core::bail!(
                "bias of length {} for a {}x{} weight",
                bias_o.dims1()?,
                in_dim,
                out_dim
            );
        }
        Ok(Self {
            in_dim,
            out_dim,
            weight_io,
            bias_o,
        })
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight_io
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias_o
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }
}

impl Module for AffineLinear {
    fn forward(&self, x_ni: &Tensor) -> Result<Tensor> {
        x_ni.matmul(&self.weight_io)?.broadcast_add(&self.bias_o)
    }
}

/// Glorot/Xavier uniform initializer that registers every parameter
/// it draws in a [`VarMap`] under a caller-chosen name.
///
/// Draws come from a seeded [`StdRng`], so two models built with the
/// same seed in the same order start from identical parameters.
/// Fan sizes follow the usual convention: `[in, out]` for matrices
/// and `fan_in = fan_out = len` for vectors.
pub struct XavierInit<'a> {
    varmap: &'a VarMap,
    device: Device,
    rng: StdRng,
}

impl<'a> XavierInit<'a> {
    pub fn new(varmap: &'a VarMap, seed: u64, device: &Device) -> Self {
        Self {
            varmap,
            device: device.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw a `shape` tensor and register it as `name`
    pub fn get(&mut self, shape: &[usize], name: &str) -> Result<Tensor> {
        let (fan_in, fan_out) = match *shape {
            [n] => (n, n),
            [fan_in, fan_out] => (fan_in, fan_out),
            _ => candle_core::bail!("xavier init of a rank-{} tensor", shape.len()),
        };
        if fan_in + fan_out == 0 {
            candle_core::bail!("xavier init of an empty tensor `{}`", name);
        }

        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt() as f32;
        let numel = shape.iter().product::<usize>();
        let values: Vec<f32> = (0..numel)
            .map(|_| self.rng.random_range(-limit..limit))
            .collect();

        let var = Var::from_tensor(&Tensor::from_vec(values, shape, &self.device)?)?;
        let mut data = self
            .varmap
            .data()
            .lock()
            .map_err(|e| candle_core::Error::Msg(format!("varmap lock: {}", e)))?;
        data.insert(name.to_string(), var.clone());
        Ok(var.as_tensor().clone())
    }

    /// Weight `[in_dim, out_dim]` named `weight_name` plus bias
    /// `[out_dim]` named `bias_name`
    pub fn affine(
        &mut self,
        in_dim: usize,
        out_dim: usize,
        weight_name: &str,
        bias_name: &str,
    ) -> Result<AffineLinear> {
        let weight_io = self.get(&[in_dim, out_dim], weight_name)?;
        let bias_o = self.get(&[out_dim], bias_name)?;
        AffineLinear::new(weight_io, bias_o)
    }
}
