use candle_util::candle_core::{Device, Tensor};
use candle_util::candle_data_loader::InMemoryData;
use candle_util::*;

fn two_rows() -> anyhow::Result<Tensor> {
    Ok(Tensor::new(
        &[[-1.0_f32, -1.0, 1.0, -1.0], [1.0, 1.0, -1.0, 1.0]],
        &Device::Cpu,
    )?)
}

fn build(n_hidden_1: usize, seed: u64) -> anyhow::Result<Vae> {
    let arch = VaeArchitecture {
        n_input: 4,
        n_hidden_1,
        n_hidden_2: None,
        n_z: 2,
    };
    let options = VaeOptions {
        batch_size: 2,
        seed,
        ..Default::default()
    };
    Vae::new(arch, options, &Device::Cpu)
}

#[test]
fn one_epoch_then_checkpoint_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let x = two_rows()?;

    let mut vae = build(4, 11)?;
    let mut data = InMemoryData::new(x.clone())?;
    let config = TrainConfig {
        batch_size: 2,
        num_epochs: 1,
        checkpoint: CheckpointPolicy::AtEnd {
            dir: dir.path().to_path_buf(),
        },
        ..Default::default()
    };
    let log = train_vae(&mut vae, &mut data, &config, None)?;
    let cost = log.last_cost().ok_or(anyhow::anyhow!("no epochs"))?;
    assert!(cost.is_finite());

    let path = log.checkpoint.ok_or(anyhow::anyhow!("no checkpoint"))?;
    assert!(path.exists());

    let mut restored = build(4, 999)?;
    restored.restore(&path)?;

    vae.reseed_noise(5);
    restored.reseed_noise(5);
    let a: Vec<Vec<f32>> = vae.encode_and_decode(&x, true)?.to_vec2()?;
    let b: Vec<Vec<f32>> = restored.encode_and_decode(&x, true)?.to_vec2()?;
    assert_eq!(a, b);

    let za: Vec<Vec<f32>> = vae.calculate_z_mean(&x)?.to_vec2()?;
    let zb: Vec<Vec<f32>> = restored.calculate_z_mean(&x)?.to_vec2()?;
    assert_eq!(za, zb);
    Ok(())
}

#[test]
fn restore_into_a_different_architecture_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = build(4, 1)?.save(dir.path())?;

    let mut wider = build(6, 1)?;
    let err = wider.restore(&path).unwrap_err();
    match err.downcast_ref::<VaeError>() {
        Some(VaeError::CheckpointShapeMismatch { expected, found, .. }) => {
            assert_ne!(expected, found);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    Ok(())
}

#[test]
fn restore_without_a_saved_layer_fails() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let deeper = VaeArchitecture {
        n_input: 4,
        n_hidden_1: 4,
        n_hidden_2: Some(4),
        n_z: 2,
    };
    let options = VaeOptions {
        batch_size: 2,
        ..Default::default()
    };
    let path = Vae::new(deeper, options, &Device::Cpu)?.save(dir.path())?;

    let mut shallow = build(4, 1)?;
    let err = shallow.restore(&path).unwrap_err();
    match err.downcast_ref::<VaeError>() {
        Some(VaeError::UnexpectedParameter { name }) => {
            assert!(name.ends_with("_h2"), "{}", name);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    Ok(())
}

#[test]
fn every_epoch_checkpoint_survives_early_stopping() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let x = two_rows()?;
    let mut vae = build(4, 3)?;
    let mut data = InMemoryData::new(x.clone())?;
    let config = TrainConfig {
        batch_size: 2,
        num_epochs: 10,
        checkpoint: CheckpointPolicy::EveryEpoch {
            dir: dir.path().to_path_buf(),
        },
        early_stopping: Some(EarlyStopping {
            patience: 1,
            min_delta: 1e9,
        }),
        ..Default::default()
    };
    let log = train_vae(&mut vae, &mut data, &config, None)?;
    assert!(log.stopped_early);
    assert_eq!(log.avg_costs.len(), 2);

    let path = log.checkpoint.ok_or(anyhow::anyhow!("no checkpoint"))?;
    assert!(path.exists());

    let mut restored = build(4, 999)?;
    restored.restore(&path)?;
    let za: Vec<Vec<f32>> = vae.calculate_z_mean(&x)?.to_vec2()?;
    let zb: Vec<Vec<f32>> = restored.calculate_z_mean(&x)?.to_vec2()?;
    assert_eq!(za, zb);
    Ok(())
}

#[test]
fn missing_checkpoint_is_an_io_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut vae = build(4, 1)?;
    let err = vae.restore(&dir.path().join("nothing.safetensors")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VaeError>(),
        Some(VaeError::CheckpointIo { .. })
    ));
    Ok(())
}

#[test]
fn every_optimizer_and_transfer_trains() -> anyhow::Result<()> {
    let x = two_rows()?;
    for optimizer in OptimizerKind::all() {
        for transfer in TransferFn::all() {
            let arch = VaeArchitecture {
                n_input: 4,
                n_hidden_1: 3,
                n_hidden_2: Some(2),
                n_z: 1,
            };
            let options = VaeOptions {
                transfer,
                optimizer,
                learning_rate: 0.001,
                batch_size: 2,
                seed: 3,
            };
            let mut vae = Vae::new(arch, options, &Device::Cpu)?;
            let cost = vae.train_with_mini_batch(&x)?;
            assert!(cost.is_finite(), "{:?} {:?}", optimizer, transfer);
        }
    }
    Ok(())
}
