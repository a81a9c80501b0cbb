use candle_core::{Device, Tensor};

/// `DataLoader` for minibatch learning with a moving cursor
pub trait DataLoader {
    /// Serve the next `batch_size` rows as an `f32` tensor
    /// (batch_size x d), moving the cursor forward and wrapping
    /// around at the end of an epoch
    fn next_minibatch(&mut self, batch_size: usize, target_device: &Device)
        -> anyhow::Result<Tensor>;

    fn num_examples(&self) -> usize;

    fn epochs_completed(&self) -> usize;
}

///
/// A simple data loader for an in-memory 2d tensor. Each row is a
/// feature vector and rows are served in order, wrapping around
/// without shuffling.
///
pub struct InMemoryData {
    data_nd: Tensor,
    index_in_epoch: usize,
    epochs_completed: usize,
}

impl InMemoryData {
    pub fn new(data_nd: Tensor) -> anyhow::Result<Self> {
        let (nn, _) = data_nd.dims2()?;
        if nn == 0 {
            anyhow::bail!("empty data");
        }
        Ok(Self {
            data_nd: data_nd.to_dtype(candle_core::DType::F32)?,
            index_in_epoch: 0,
            epochs_completed: 0,
        })
    }
}

impl DataLoader for InMemoryData {
    fn next_minibatch(
        &mut self,
        batch_size: usize,
        target_device: &Device,
    ) -> anyhow::Result<Tensor> {
        let nn = self.num_examples();
        if batch_size == 0 || batch_size > nn {
            anyhow::bail!("batch size {} for {} examples", batch_size, nn);
        }

        let start = self.index_in_epoch;
        let batch = if start + batch_size <= nn {
            self.index_in_epoch += batch_size;
            self.data_nd.narrow(0, start, batch_size)?
        } else {
            self.epochs_completed += 1;
            self.index_in_epoch = batch_size - (nn - start);
            let head = self.data_nd.narrow(0, 0, self.index_in_epoch)?;
            if start < nn {
                let tail = self.data_nd.narrow(0, start, nn - start)?;
                Tensor::cat(&[tail, head], 0)?
            } else {
                head
            }
        };
        Ok(batch.to_device(target_device)?)
    }

    fn num_examples(&self) -> usize {
        self.data_nd.dims()[0]
    }

    fn epochs_completed(&self) -> usize {
        self.epochs_completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_around_the_end() -> anyhow::Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::new(&[[0.0_f32], [1.0], [2.0]], &dev)?;
        let mut data = InMemoryData::new(x)?;

        let b1: Vec<Vec<f32>> = data.next_minibatch(2, &dev)?.to_vec2()?;
        let b2: Vec<Vec<f32>> = data.next_minibatch(2, &dev)?.to_vec2()?;
        assert_eq!(b1, vec![vec![0.0], vec![1.0]]);
        assert_eq!(b2, vec![vec![2.0], vec![0.0]]);
        assert_eq!(data.epochs_completed(), 1);
        assert!(data.next_minibatch(4, &dev).is_err());
        Ok(())
    }
}
