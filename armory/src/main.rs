use armory::config::GeneratorConfig;
use armory::generator::WeaponGenerator;
use armory::metrics::EpochCostWriter;
use armory::sweep::{run_sweep, SweepGrid};

use candle_util::candle_core;
use candle_util::{OptimizerKind, TransferFn};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use weapon_data::csv_io::{read_records_csv, write_records_csv};
use weapon_data::{Column, Record};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "ARMORY",
    long_about = "Generate weapon statistics with a variational autoencoder\n\
		  trained on a CSV table of existing weapons.\n\
		  `train` writes the model and its `config.json` into the model directory;\n\
		  `infer` and `generate` rebuild everything from there."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Train a model on a weapon table",
        long_about = "Train a fresh model on a weapon table and save\n\
		      {model_dir}/model.safetensors and {model_dir}/config.json.\n\
		      Settings come from a JSON config; flags override it."
    )]
    Train(TrainArgs),

    #[command(
        about = "Generate weapons from dismantled ones",
        long_about = "Read dismantled weapons (CSV; any subset of the fields,\n\
		      plain labels or per-label scores such as `type_Rifle`)\n\
		      and write one generated weapon per row."
    )]
    Infer(InferArgs),

    #[command(about = "Decode random draws from the latent prior")]
    Generate(GenerateArgs),

    #[command(
        about = "Hyper-parameter sweep",
        long_about = "Train and evaluate a grid of architectures, transfer functions\n\
		      and optimizers; append one summary row per configuration."
    )]
    Sweep(SweepArgs),

    /// write the default config as JSON
    InitConfig(InitConfigArgs),
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl ComputeDevice {
    fn device(&self) -> anyhow::Result<candle_core::Device> {
        Ok(match self {
            ComputeDevice::Metal => candle_core::Device::new_metal(0)?,
            ComputeDevice::Cuda => candle_core::Device::new_cuda(0)?,
            _ => candle_core::Device::Cpu,
        })
    }
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[arg(short, long, help = "JSON config file")]
    config: Option<Box<str>>,

    #[arg(long, help = "Training weapon table (CSV)")]
    train_file: Option<Box<str>>,

    #[arg(short, long, help = "Model directory")]
    model_dir: Option<Box<str>>,

    #[arg(short = 'e', long, help = "Number of epochs")]
    epochs: Option<usize>,

    #[arg(
        long,
        help = "Per-epoch cost table",
        long_help = "Write `epoch,avg_cost` rows of this run to a CSV file."
    )]
    cost_file: Option<Box<str>>,

    #[arg(long, value_enum, default_value = "cpu")]
    device: ComputeDevice,

    #[arg(long, short, help = "verbosity")]
    verbose: bool,
}

#[derive(Args, Debug)]
struct InferArgs {
    #[arg(short, long, required = true, help = "Model directory")]
    model_dir: Box<str>,

    #[arg(required = true, help = "Dismantled weapons (CSV)")]
    input: Box<str>,

    #[arg(short, long, default_value = "stdout", help = "Output CSV")]
    out: Box<str>,

    #[arg(long, value_enum, default_value = "cpu")]
    device: ComputeDevice,

    #[arg(long, short, help = "verbosity")]
    verbose: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(short, long, required = true, help = "Model directory")]
    model_dir: Box<str>,

    #[arg(short, long, default_value_t = 10, help = "Number of weapons")]
    num: usize,

    #[arg(short, long, default_value = "stdout", help = "Output CSV")]
    out: Box<str>,

    #[arg(long, value_enum, default_value = "cpu")]
    device: ComputeDevice,

    #[arg(long, short, help = "verbosity")]
    verbose: bool,
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[arg(long, required = true, help = "Training weapon table (CSV)")]
    train_file: Box<str>,

    #[arg(long, required = true, help = "Test weapon table (CSV)")]
    test_file: Box<str>,

    #[arg(short, long, required = true, help = "Summary CSV (appended)")]
    out: Box<str>,

    #[arg(long, default_value_t = 0.001, help = "Learning rate")]
    learning_rate: f64,

    #[arg(short = 'e', long, default_value_t = 20, help = "Epochs per configuration")]
    epochs: usize,

    #[arg(long, default_value_t = 10, help = "One step above the largest hidden width")]
    hidden_start: usize,

    #[arg(long, default_value_t = 4, help = "One step above the largest latent width")]
    latent_start: usize,

    #[arg(long, default_value_t = 20, help = "Twice the largest batch size")]
    batch_start: usize,

    #[arg(long, value_delimiter(','), help = "Transfer functions (comma-separated)")]
    transfers: Option<Vec<String>>,

    #[arg(long, value_delimiter(','), help = "Optimizers (comma-separated)")]
    optimizers: Option<Vec<String>>,

    #[arg(long, help = "Only count the configurations")]
    dry_run: bool,

    #[arg(long, value_enum, default_value = "cpu")]
    device: ComputeDevice,

    #[arg(long, short, help = "verbosity")]
    verbose: bool,
}

#[derive(Args, Debug)]
struct InitConfigArgs {
    #[arg(default_value = "config.json", help = "Output JSON file")]
    out: Box<str>,
}

fn init_logger(verbose: bool) {
    if verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Train(args) => {
            train(args)?;
        }
        Commands::Infer(args) => {
            infer(args)?;
        }
        Commands::Generate(args) => {
            generate(args)?;
        }
        Commands::Sweep(args) => {
            sweep(args)?;
        }
        Commands::InitConfig(args) => {
            GeneratorConfig::default().to_json_file(&args.out)?;
        }
    }

    info!("Done");
    Ok(())
}

fn train(args: &TrainArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let mut config = match args.config.as_deref() {
        Some(file) => GeneratorConfig::from_json_file(file)?,
        None => GeneratorConfig::default(),
    };
    if let Some(file) = args.train_file.as_deref() {
        config.train_file = file.into();
    }
    if let Some(dir) = args.model_dir.as_deref() {
        config.model_dir = dir.into();
    }
    if let Some(epochs) = args.epochs {
        config.num_epochs = epochs;
    }
    config.verbose = args.verbose;

    let mut generator = WeaponGenerator::setup(config, &args.device.device()?)?;
    let log = generator.train_one_run()?;

    if let Some(file) = args.cost_file.as_deref() {
        let mut writer = EpochCostWriter::create(file)?;
        writer.write_log(&log)?;
        writer.finish()?;
    }

    if let Some(cost) = log.last_cost() {
        info!("final cost {}", cost);
    }
    Ok(())
}

fn load_generator(model_dir: &str, device: &ComputeDevice) -> anyhow::Result<WeaponGenerator> {
    let config_file = std::path::Path::new(model_dir).join(armory::config::CONFIG_FILE);
    let mut config = GeneratorConfig::from_json_file(&config_file.to_string_lossy())?;
    config.model_dir = model_dir.into();
    let mut generator = WeaponGenerator::setup(config, &device.device()?)?;
    generator.load_model()?;
    Ok(generator)
}

/// numeric fields and per-label scores; the embedded block is never
/// decoded
fn output_columns(generator: &WeaponGenerator) -> Vec<Box<str>> {
    generator
        .train_data()
        .codec()
        .column_map()
        .columns()
        .iter()
        .filter(|c| !matches!(c, Column::Embedded { .. }))
        .map(|c| c.name())
        .collect()
}

fn infer(args: &InferArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let mut generator = load_generator(&args.model_dir, &args.device)?;
    let requests = read_records_csv(&args.input, &[])?;

    let mut weapons: Vec<Record> = Vec::with_capacity(requests.len());
    for request in requests.iter() {
        // empty cells count as missing fields
        let request: Record = request
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        weapons.push(generator.infer(&request)?.to_record());
    }

    if generator.should_retrain() {
        info!(
            "{} dismantled weapons collected; consider retraining",
            generator.num_dismantled()
        );
    }

    let mut columns = output_columns(&generator);
    columns.push(armory::generator::SUCCESS_KEY.into());
    let columns: Vec<&str> = columns.iter().map(|c| &**c).collect();
    write_records_csv(&args.out, &weapons, &columns)?;
    Ok(())
}

fn generate(args: &GenerateArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let mut generator = load_generator(&args.model_dir, &args.device)?;
    let weapons = generator.generate_random_weapons(args.num)?;

    let columns = output_columns(&generator);
    let columns: Vec<&str> = columns.iter().map(|c| &**c).collect();
    write_records_csv(&args.out, &weapons, &columns)?;
    Ok(())
}

fn parse_list<T: serde::de::DeserializeOwned>(names: &[String]) -> anyhow::Result<Vec<T>> {
    names
        .iter()
        .map(|x| {
            serde_json::from_value(serde_json::Value::String(x.to_lowercase()))
                .map_err(|_| anyhow::anyhow!("unknown name `{}`", x))
        })
        .collect()
}

fn sweep(args: &SweepArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let base = GeneratorConfig {
        train_file: args.train_file.to_string(),
        test_file: Some(args.test_file.to_string()),
        learning_rate: args.learning_rate,
        n_hidden_2: None,
        num_numerical: 15,
        num_epochs: args.epochs,
        ..Default::default()
    };

    let mut grid = SweepGrid {
        n_hidden_1_start: args.hidden_start,
        n_z_start: args.latent_start,
        batch_size_start: args.batch_start,
        ..Default::default()
    };
    if let Some(names) = &args.transfers {
        grid.transfers = parse_list::<TransferFn>(names)?;
    }
    if let Some(names) = &args.optimizers {
        grid.optimizers = parse_list::<OptimizerKind>(names)?;
    }

    let njobs = run_sweep(&base, &grid, &args.out, args.dry_run, &args.device.device()?)?;
    if args.dry_run {
        println!("{}", njobs);
    }
    Ok(())
}
