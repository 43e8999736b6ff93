use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use digit_network::mnist::{self, INPUT_NEURONS, MnistData, OUTPUT_NEURONS};
use digit_network::{ExportedModel, Hyperparameters, Network, argmax};
use ndarray_rand::rand::{SeedableRng, rngs::StdRng, thread_rng};
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "digit-network")]
#[command(about = "Train and inspect a handwritten digit classifier", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a network on MNIST and export its weights
    Train {
        /// Directory holding the gzipped MNIST IDX files
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Hidden layer sizes, input to output
        #[arg(long, value_delimiter = ',', default_value = "30")]
        hidden: Vec<usize>,

        #[arg(short, long, default_value_t = 30)]
        epochs: usize,

        #[arg(short, long, default_value_t = 10)]
        mini_batch_size: usize,

        #[arg(short = 'r', long, default_value_t = 3.0)]
        learning_rate: f64,

        /// Number of training images to use
        #[arg(long, default_value_t = 40_000)]
        training_samples: usize,

        /// Number of test images to evaluate against after each epoch
        #[arg(long, default_value_t = 10_000)]
        test_samples: usize,

        /// Seed for initialization and shuffling; random when omitted
        #[arg(long)]
        seed: Option<u64>,

        /// Log the mean training cost after every epoch
        #[arg(long)]
        monitor_cost: bool,

        /// Where to write the exported model
        #[arg(short, long, default_value = "static/network-weights.json")]
        output: PathBuf,
    },

    /// Run an exported model against the test images
    Inspect {
        #[arg(short, long, default_value = "static/network-weights.json")]
        model: PathBuf,

        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Number of test images to classify
        #[arg(short, long, default_value_t = 100)]
        samples: usize,

        /// Number of classified digits to draw
        #[arg(long, default_value_t = 5)]
        show: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Train {
            data_dir,
            hidden,
            epochs,
            mini_batch_size,
            learning_rate,
            training_samples,
            test_samples,
            seed,
            monitor_cost,
            output,
        } => {
            let hyperparameters = Hyperparameters {
                epochs,
                mini_batch_size,
                learning_rate,
                monitor_training_cost: monitor_cost,
            };
            train(
                &data_dir,
                hidden,
                &hyperparameters,
                training_samples,
                test_samples,
                seed,
                &output,
            )
        }
        Commands::Inspect {
            model,
            data_dir,
            samples,
            show,
        } => inspect(&model, &data_dir, samples, show),
    }
}

fn train(
    data_dir: &Path,
    hidden: Vec<usize>,
    hyperparameters: &Hyperparameters,
    training_samples: usize,
    test_samples: usize,
    seed: Option<u64>,
    output: &Path,
) -> Result<()> {
    hyperparameters.validate()?;

    let mut mnist_data = MnistData::load(data_dir, Some(training_samples), Some(test_samples))
        .with_context(|| format!("failed to load MNIST data from {}", data_dir.display()))?;

    info!(
        "Beginning training with {} training samples and {} test samples",
        mnist_data.training_data.len(),
        mnist_data.test_data.len()
    );

    let mut sizes = vec![INPUT_NEURONS];
    sizes.extend(hidden);
    sizes.push(OUTPUT_NEURONS);

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(thread_rng())?,
    };

    let mut network = Network::new_using(sizes, &mut rng)?;
    network.stochastic_gradient_descent(
        &mut mnist_data.training_data,
        hyperparameters,
        Some(mnist_data.test_data.as_slice()),
        &mut rng,
    )?;

    network
        .export_model()
        .save_json(output)
        .with_context(|| format!("failed to write model to {}", output.display()))?;
    info!("Model saved to {}", output.display());

    Ok(())
}

fn inspect(model_path: &Path, data_dir: &Path, samples: usize, show: usize) -> Result<()> {
    let model = ExportedModel::load_json(model_path)
        .with_context(|| format!("failed to load model from {}", model_path.display()))?;
    let network = Network::try_from(&model).context("model parameters are inconsistent")?;

    if network.sizes().first() != Some(&INPUT_NEURONS) {
        bail!(
            "model expects {:?} inputs, but MNIST images have {INPUT_NEURONS} pixels",
            network.sizes().first()
        );
    }

    let test_data = MnistData::load_test(data_dir, Some(samples))
        .with_context(|| format!("failed to load MNIST test data from {}", data_dir.display()))?;
    if test_data.is_empty() {
        bail!("no test samples to classify");
    }

    let mut correct = 0;
    for (index, sample) in test_data.iter().enumerate() {
        let predicted = argmax(&network.feedforward(&sample.input)?);
        let is_correct = predicted == Some(sample.expected_answer);
        if is_correct {
            correct += 1;
        }

        if index < show {
            println!("{}", mnist::render(sample));
            match predicted {
                Some(predicted) if is_correct => println!("Answer: {predicted}\n"),
                Some(predicted) => println!(
                    "Predicted: {predicted} (actual {})\n",
                    sample.expected_answer
                ),
                None => println!("No prediction\n"),
            }
        }
    }

    println!(
        "Prediction accuracy: {}% ({correct} / {})",
        correct as f64 / test_data.len() as f64 * 100.0,
        test_data.len()
    );

    Ok(())
}
