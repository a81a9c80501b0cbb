use candle_core::backprop::GradStore;
use candle_core::{Result, Var};
use candle_nn::Optimizer;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamsRmsProp {
    pub lr: f64,
    pub decay: f64,
    pub eps: f64,
}

impl Default for ParamsRmsProp {
    fn default() -> Self {
        Self {
            lr: 0.01,
            decay: 0.9,
            eps: 1e-10,
        }
    }
}

struct VarRmsProp {
    var: Var,
    mean_square: Var,
}

/// RMSProp without momentum
///
/// ms <- decay * ms + (1 - decay) * g^2
/// w  <- w - lr * g / sqrt(ms + eps)
///
/// The mean-square accumulator starts at one.
pub struct RmsProp {
    vars: Vec<VarRmsProp>,
    params: ParamsRmsProp,
}

impl Optimizer for RmsProp {
    type Config = ParamsRmsProp;

    fn new(vars: Vec<Var>, params: ParamsRmsProp) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let mean_square = Var::ones(var.shape(), var.dtype(), var.device())?;
                Ok(VarRmsProp { var, mean_square })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { vars, params })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        let decay = self.params.decay;
        for v in self.vars.iter() {
            if let Some(g) = grads.get(v.var.as_tensor()) {
                let ms = ((v.mean_square.as_tensor() * decay)? + (g.sqr()? * (1. - decay))?)?;
                let delta = (g / (ms.clone() + self.params.eps)?.sqrt()?)?;
                v.var.set(&v.var.sub(&(delta * self.params.lr)?)?)?;
                v.mean_square.set(&ms)?;
            }
        }
        Ok(())
    }
}
