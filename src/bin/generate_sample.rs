use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, Float64Array, Float64Builder, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Write a synthetic multivariate dataset to Parquet.
///
/// Variables follow a shared latent factor plus noise, so covariance and
/// correlation statistics have structure to find. With `--timesteps` each
/// variable becomes a list column holding a random-walk series.
#[derive(Debug, Parser)]
#[command(name = "generate_sample", about)]
struct Args {
    #[arg(short = 'n', long, default_value_t = 200)]
    observations: usize,

    #[arg(short = 'p', long, default_value_t = 5)]
    variables: usize,

    /// Time steps per realisation; omit for a static n × p dataset.
    #[arg(short = 't', long)]
    timesteps: Option<usize>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(short, long, default_value = "sample_data.parquet")]
    output: PathBuf,
}

/// Normal draw with mean `mean` and spread `sd` (Box-Muller).
fn gauss<R: Rng>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    mean + sd * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Loading of variable `j` on the latent factor; later variables couple less.
fn loading(j: usize, p: usize) -> f64 {
    1.0 - j as f64 / (p as f64 + 1.0)
}

fn static_columns(args: &Args, rng: &mut StdRng) -> Vec<ArrayRef> {
    let mut columns = vec![Vec::with_capacity(args.observations); args.variables];
    for _ in 0..args.observations {
        let factor = gauss(rng, 0.0, 1.0);
        for (j, column) in columns.iter_mut().enumerate() {
            column.push(loading(j, args.variables) * factor + gauss(rng, 0.0, 0.5));
        }
    }
    columns
        .into_iter()
        .map(|c| Arc::new(Float64Array::from(c)) as ArrayRef)
        .collect()
}

fn series_columns(args: &Args, steps: usize, rng: &mut StdRng) -> Vec<ArrayRef> {
    let mut builders: Vec<_> = (0..args.variables)
        .map(|_| ListBuilder::new(Float64Builder::new()))
        .collect();
    for _ in 0..args.observations {
        let mut levels = vec![0.0; args.variables];
        let mut series = vec![Vec::with_capacity(steps); args.variables];
        for _ in 0..steps {
            let shock = gauss(rng, 0.0, 1.0);
            for j in 0..args.variables {
                levels[j] += loading(j, args.variables) * shock + gauss(rng, 0.0, 0.3);
                series[j].push(levels[j]);
            }
        }
        for (builder, values) in builders.iter_mut().zip(series) {
            builder.values().append_slice(&values);
            builder.append(true);
        }
    }
    builders
        .into_iter()
        .map(|mut b| Arc::new(b.finish()) as ArrayRef)
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.observations == 0 || args.variables == 0 {
        bail!("need at least one observation and one variable");
    }
    let mut rng = StdRng::seed_from_u64(args.seed);

    let (columns, item_type) = match args.timesteps {
        Some(0) => bail!("--timesteps must be positive"),
        Some(steps) => (
            series_columns(&args, steps, &mut rng),
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        ),
        None => (static_columns(&args, &mut rng), DataType::Float64),
    };

    let fields: Vec<Field> = (0..args.variables)
        .map(|j| Field::new(format!("proc-{j}"), item_type.clone(), false))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let batch =
        RecordBatch::try_new(schema.clone(), columns).context("assembling record batch")?;

    let file = std::fs::File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    let shape = match args.timesteps {
        Some(t) => format!("{} x {} x {t}", args.observations, args.variables),
        None => format!("{} x {}", args.observations, args.variables),
    };
    log::info!("Wrote a {shape} dataset to {}", args.output.display());
    println!("Wrote a {shape} dataset to {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn args(seed: u64) -> Args {
        let seed = seed.to_string();
        Args::parse_from(["generate_sample", "-n", "500", "-p", "3", "--seed", seed.as_str()])
    }

    #[test]
    fn same_seed_gives_the_same_dataset() {
        let draw = |seed| static_columns(&args(seed), &mut StdRng::seed_from_u64(seed));
        let (a, b, c) = (draw(7), draw(7), draw(8));
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].to_data(), b[0].to_data());
        assert_ne!(a[0].to_data(), c[0].to_data());
    }

    #[test]
    fn leading_variable_carries_the_most_factor() {
        let columns = static_columns(&args(1), &mut StdRng::seed_from_u64(1));
        let values: Vec<Vec<f64>> = columns
            .iter()
            .map(|c| c.as_any().downcast_ref::<Float64Array>().unwrap().values().to_vec())
            .collect();
        let variance = |v: &[f64]| {
            let mean = v.iter().sum::<f64>() / v.len() as f64;
            v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / v.len() as f64
        };
        assert!(variance(&values[0]) > variance(&values[2]));
    }

    #[test]
    fn series_have_one_entry_per_realisation() {
        let columns = series_columns(&args(3), 4, &mut StdRng::seed_from_u64(3));
        assert_eq!(columns.len(), 3);
        assert!(columns.iter().all(|c| c.len() == 500));
    }
}
