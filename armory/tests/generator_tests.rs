use armory::generator::SUCCESS_KEY;
use armory::*;
use candle_util::candle_core::Device;
use matrix_util::common_io::{create_temp_dir_file, write_lines};
use weapon_data::Record;

const WEAPONS: [&str; 13] = [
    "name,damages_first,damages_last,distances_last,type,firemode",
    "a,30,20,40,Rifle,Automatic",
    "b,25,18,35,Rifle,Semi",
    "c,80,40,15,Shotgun,Single",
    "d,90,45,12,Shotgun,Semi",
    "e,20,15,25,Pistol,Semi",
    "f,22,14,20,Pistol,Single",
    "g,18,12,30,SMG,Automatic",
    "h,17,11,28,SMG,Automatic",
    "i,100,95,120,Sniper,Single",
    "j,110,90,150,Sniper,Single",
    "k,28,24,60,MG,Automatic",
    "l,27,22,55,MG,Automatic",
];

fn scratch(suffix: &str) -> anyhow::Result<String> {
    let file = create_temp_dir_file(suffix)?;
    Ok(file.to_str().ok_or(anyhow::anyhow!("path"))?.to_string())
}

fn weapon_file(lines: &[&str]) -> anyhow::Result<String> {
    let file = scratch(".csv")?;
    let lines: Vec<Box<str>> = lines.iter().map(|&l| l.into()).collect();
    write_lines(&lines, &file)?;
    Ok(file)
}

fn small_config() -> anyhow::Result<GeneratorConfig> {
    Ok(GeneratorConfig {
        train_file: weapon_file(&WEAPONS)?,
        model_dir: scratch("")?,
        num_numerical: 3,
        n_hidden_1: 6,
        n_hidden_2: Some(4),
        batch_size: 4,
        num_epochs: 5,
        retrain_after: 2,
        generation_cost_threshold: 1e9,
        ..Default::default()
    })
}

fn request(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|&(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn dismantled_weapons_feed_the_next_run() -> anyhow::Result<()> {
    let mut generator = WeaponGenerator::setup(small_config()?, &Device::Cpu)?;
    let log = generator.train_one_run()?;
    assert_eq!(log.avg_costs.len(), 5);
    assert!(log.checkpoint.is_some());
    let report = std::path::Path::new(&generator.config().model_dir)
        .join(armory::generator::STANDARDIZATION_FILE);
    let num_features = generator.train_data().num_features();
    assert_eq!(std::fs::read_to_string(report)?.lines().count(), 1 + num_features);

    let response = generator.infer(&request(&[
        ("damages_first", "31"),
        ("type", "Rifle"),
        (SUCCESS_KEY, "false"),
    ]))?;
    assert!(response.success);
    assert!(!response.random_fallback);
    assert!(response.cost.is_some_and(f32::is_finite));
    assert_eq!(response.to_record()[SUCCESS_KEY], "true");
    for field in ["damages_first", "damages_last", "distances_last", "type_Rifle", "firemode_Single"] {
        assert!(response.weapon.contains_key(field), "missing {}", field);
    }
    assert_eq!(generator.num_dismantled(), 1);
    assert!(!generator.should_retrain());

    generator.infer(&request(&[("type_Shotgun", "0.9"), ("type_Rifle", "0.1")]))?;
    assert!(generator.should_retrain());

    generator.train_one_run()?;
    assert_eq!(generator.train_data().num_examples(), 14);
    assert_eq!(generator.num_dismantled(), 0);
    assert!(!generator.should_retrain());
    assert_eq!(generator.config().num_epochs, 15);
    Ok(())
}

#[test]
fn unfamiliar_requests_fall_back_to_random_weapons() -> anyhow::Result<()> {
    let config = GeneratorConfig {
        generation_cost_threshold: 0.0,
        ..small_config()?
    };
    let mut generator = WeaponGenerator::setup(config, &Device::Cpu)?;
    generator.train_one_run()?;

    let response = generator.infer(&request(&[("damages_first", "1000")]))?;
    assert!(response.success);
    assert!(response.random_fallback);
    assert_eq!(generator.num_dismantled(), 1);
    Ok(())
}

#[test]
fn requests_without_fields_fail_softly() -> anyhow::Result<()> {
    let mut generator = WeaponGenerator::setup(small_config()?, &Device::Cpu)?;
    generator.train_one_run()?;

    let response = generator.infer(&request(&[(SUCCESS_KEY, "true")]))?;
    assert!(!response.success);
    assert!(response.weapon.is_empty());
    assert_eq!(generator.num_dismantled(), 0);
    Ok(())
}

#[test]
fn reloaded_model_generates_the_same_weapons() -> anyhow::Result<()> {
    let config = small_config()?;
    let mut trained = WeaponGenerator::setup(config.clone(), &Device::Cpu)?;
    trained.train_one_run()?;
    let expected = trained.generate_random_weapons(3)?;

    let saved = GeneratorConfig::from_json_file(&config.saved_path().to_string_lossy())?;
    assert_eq!(saved, config);

    let mut reloaded = WeaponGenerator::setup(saved, &Device::Cpu)?;
    assert!(!reloaded.has_model());
    reloaded.load_model()?;
    assert_eq!(reloaded.generate_random_weapons(3)?, expected);
    Ok(())
}

#[test]
fn sweep_appends_one_row_per_configuration() -> anyhow::Result<()> {
    let base = GeneratorConfig {
        test_file: Some(weapon_file(&WEAPONS)?),
        n_hidden_2: None,
        num_epochs: 2,
        ..small_config()?
    };
    let grid = SweepGrid {
        n_hidden_1_start: 5,
        n_z_start: 2,
        batch_size_start: 4,
        transfers: vec![candle_util::TransferFn::Tanh],
        optimizers: vec![candle_util::OptimizerKind::AdamW],
    };
    let summary = scratch(".csv")?;

    assert_eq!(run_sweep(&base, &grid, &summary, false, &Device::Cpu)?, 2);
    assert_eq!(run_sweep(&base, &grid, &summary, false, &Device::Cpu)?, 2);

    let rows = metrics::read_summaries(&summary)?;
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].batch, 2);
    assert_eq!(rows[1].batch, 1);
    assert_eq!(rows[0].n_h_1, 3);
    assert_eq!(rows[0].n_h_2, 0);
    assert_eq!(rows[0].transf, "tanh");
    assert!(rows[0].train_log.starts_with("Epoch:0001 - Cost:"));
    assert_eq!(rows[0].train_log.lines().count(), 2);
    assert!(rows.iter().all(|r| r.avg_un_dist.is_finite()));
    Ok(())
}
