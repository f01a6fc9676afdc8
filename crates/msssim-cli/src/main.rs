use crate::output::Output;
use crate::summary::Stats;
use crate::synth::{distort, reference, Distortion};
use clap::{Parser, ValueEnum};
use indicatif::ProgressStyle;
use msssim::{EngineConfig, Reduction, Ssim, Strategy};
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, info_span, trace};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod output;
mod summary;
mod synth;

/// Scores a synthetic reference batch against increasingly distorted copies of itself with SSIM
/// and MS-SSIM.
///
/// Use the `RUST_LOG` environment variable to configure logging. The trace level prints an event
/// for every pyramid level.
#[derive(Parser, Debug)]
#[command(version, author)]
struct CliArgs {
    /// Select the metrics to compute. Defaults to all of them.
    #[arg(short, long)]
    metrics: Vec<Metric>,
    /// Distortion applied to the reference
    #[arg(short, long, value_enum, default_value = "noise")]
    distortion: Distortion,
    /// Number of distortion levels after the undistorted one
    #[arg(long, default_value = "5")]
    levels: usize,
    /// Strength of the last level. Levels are evenly spaced from 0. Defaults to 0.2 for noise
    /// and offset, and to a radius of 5 pixels for blur.
    #[arg(long)]
    max_level: Option<f64>,

    #[arg(long, default_value = "4")]
    batch: usize,
    #[arg(long, default_value = "3")]
    channels: usize,
    #[arg(long, default_value = "128")]
    height: usize,
    #[arg(long, default_value = "128")]
    width: usize,
    /// Seed of the generated images and noise
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Engine configuration as JSON. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Side of the Gaussian window
    #[arg(long)]
    window_size: Option<usize>,
    /// Standard deviation of the Gaussian window
    #[arg(long)]
    sigma: Option<f64>,
    /// Number of scales for MS-SSIM
    #[arg(long)]
    scales: Option<usize>,

    /// Run the whole sweep this many times with the same engines.
    #[arg(long, default_value = "1")]
    repeat: u32,

    /// Choose the CLI stdout format. Omit the option for the default.
    /// Status messages will be printed to stderr in all cases.
    #[arg(long, value_enum)]
    output: Option<Output>,
}

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum)]
pub enum Metric {
    /// Single-scale SSIM
    SSIM,
    /// Multi-scale SSIM
    MSSSIM,
}

impl CliArgs {
    fn has(&self, metric: Metric) -> bool {
        self.metrics.is_empty() || self.metrics.contains(&metric)
    }

    fn shape(&self) -> (usize, usize, usize, usize) {
        (self.batch, self.channels, self.height, self.width)
    }

    fn level_values(&self) -> Vec<f64> {
        if self.levels == 0 {
            return vec![0.0];
        }
        let max_level = self
            .max_level
            .unwrap_or_else(|| self.distortion.default_max_level());
        (0..=self.levels)
            .map(|i| max_level * i as f64 / self.levels as f64)
            .collect()
    }

    fn base_config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        let mut config: EngineConfig = match &self.config {
            Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
            None => EngineConfig::default(),
        };
        if let Some(window_size) = self.window_size {
            config.window_size = window_size;
        }
        if let Some(sigma) = self.sigma {
            config.sigma = sigma;
        }
        // Every sample of the batch is reported separately
        config.reduction = Reduction::PerSample;
        Ok(config)
    }

    fn engine(&self, metric: Metric) -> Result<Ssim, Box<dyn Error>> {
        let mut config = self.base_config()?;
        config.strategy = match metric {
            Metric::SSIM => Strategy::SingleScale,
            Metric::MSSSIM => {
                let configured = match config.strategy {
                    Strategy::MultiScale { scales } => scales,
                    Strategy::SingleScale => Strategy::DEFAULT_SCALES,
                };
                Strategy::MultiScale {
                    scales: self.scales.unwrap_or(configured),
                }
            }
        };
        Ok(Ssim::from_config(config)?)
    }

    fn output(&self) -> Output {
        self.output.unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct LevelScores {
    pub level: f64,
    pub scores: Vec<f64>,
    pub stats: Option<Stats>,
}

#[derive(Debug, Default, serde::Serialize)]
pub(crate) struct MetricSweep {
    pub levels: Vec<LevelScores>,
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct SweepResults {
    pub distortion: Distortion,
    pub shape: [usize; 4],
    pub ssim: Option<MetricSweep>,
    pub msssim: Option<MetricSweep>,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let mut env_filter = EnvFilter::builder();
    env_filter = if cfg!(debug_assertions) {
        env_filter.with_default_directive(LevelFilter::DEBUG.into())
    } else {
        env_filter.with_default_directive(LevelFilter::INFO.into())
    };
    let env_filter = env_filter.from_env_lossy();

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .without_time()
                .with_writer(indicatif_layer.get_stderr_writer())
                .with_filter(env_filter),
        )
        .with(indicatif_layer)
        .init();

    if args.batch == 0 || args.channels == 0 || args.height == 0 || args.width == 0 {
        error!("Batch, channels, height and width must all be at least 1");
        return ExitCode::FAILURE;
    }

    let engine = |metric| {
        args.has(metric)
            .then(|| args.engine(metric))
            .transpose()
            .map_err(|e| error!("Could not initialize {metric:?} engine : {e}"))
    };
    let Ok(ssim) = engine(Metric::SSIM) else {
        return ExitCode::FAILURE;
    };
    let Ok(msssim) = engine(Metric::MSSSIM) else {
        return ExitCode::FAILURE;
    };

    let results = match sweep(&args, ssim, msssim) {
        Ok(results) => results,
        Err(e) => {
            error!("Could not compute the sweep : {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = args.output().display_results(&results) {
        error!("Could not print results : {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn sweep(
    args: &CliArgs,
    mut ssim: Option<Ssim>,
    mut msssim: Option<Ssim>,
) -> Result<SweepResults, Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let img_ref = reference(&mut rng, args.shape());
    let levels = args.level_values();
    info!(
        distortion = ?args.distortion,
        shape = ?img_ref.dim(),
        levels = levels.len(),
        "Generated reference"
    );

    // Distortions are generated once so every repetition scores the same pairs.
    let distorted = levels
        .iter()
        .map(|&level| distort(&img_ref, args.distortion, level, &mut rng))
        .collect::<Result<Vec<_>, _>>()?;

    let engines = ssim.is_some() as u64 + msssim.is_some() as u64;
    let span = info_span!("pb");
    span.pb_set_style(&ProgressStyle::with_template(
        "{wide_bar} {pos}/{len} {msg} (eta: {eta})",
    )?);
    span.pb_set_length(args.repeat.max(1) as u64 * levels.len() as u64 * engines);
    span.pb_set_message("Computing");
    let pb = span.enter();

    let start = Instant::now();
    let mut ssim_sweep = None;
    let mut msssim_sweep = None;
    for run in 0..args.repeat.max(1) {
        trace!(run, "Sweep");
        ssim_sweep = ssim
            .as_mut()
            .map(|engine| score_levels(engine, &img_ref, &distorted, &levels, &span))
            .transpose()?;
        msssim_sweep = msssim
            .as_mut()
            .map(|engine| score_levels(engine, &img_ref, &distorted, &levels, &span))
            .transpose()?;
    }

    drop(pb);
    drop(span);

    let duration = start.elapsed();
    info!(
        "Scored {} image pairs in {:?}",
        args.repeat.max(1) as u64 * levels.len() as u64 * engines * args.batch as u64,
        duration
    );
    for (name, engine) in [("ssim", &ssim), ("msssim", &msssim)] {
        if let Some(engine) = engine {
            debug!(
                metric = name,
                window_rebuilds = engine.window_rebuilds(),
                "Window cache"
            );
        }
    }

    Ok(SweepResults {
        distortion: args.distortion,
        shape: [args.batch, args.channels, args.height, args.width],
        ssim: ssim_sweep,
        msssim: msssim_sweep,
    })
}

fn score_levels(
    engine: &mut Ssim,
    img_ref: &Array4<f64>,
    distorted: &[Array4<f64>],
    levels: &[f64],
    span: &tracing::Span,
) -> Result<MetricSweep, Box<dyn Error>> {
    let mut sweep = MetricSweep::default();
    for (&level, img_dis) in levels.iter().zip(distorted) {
        let score = engine.compute(img_ref.view(), img_dis.view())?;
        let scores = match score.per_sample() {
            Some(scores) => scores.to_vec(),
            None => vec![score.value()],
        };
        trace!(level, ?scores, "Scored level");
        sweep.levels.push(LevelScores {
            level,
            stats: Stats::compute(&scores),
            scores,
        });
        span.pb_inc(1);
    }
    Ok(sweep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        CliArgs::parse_from(
            ["msssim", "--batch", "2", "--channels", "1", "--height", "48", "--width", "48"]
                .iter()
                .chain(extra)
                .copied(),
        )
    }

    #[test]
    fn levels_are_evenly_spaced() {
        let args = args(&["--levels", "4", "--max-level", "1"]);
        assert_eq!(args.level_values(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let args = self::args(&["--levels", "0"]);
        assert_eq!(args.level_values(), vec![0.0]);
    }

    #[test]
    fn flags_override_config() -> Result<(), Box<dyn Error>> {
        let args = args(&["--window-size", "7", "--scales", "3", "-m", "msssim"]);
        assert!(!args.has(Metric::SSIM));
        let engine = args.engine(Metric::MSSSIM)?;
        assert_eq!(engine.config().window_size, 7);
        assert_eq!(engine.config().strategy, Strategy::MultiScale { scales: 3 });
        assert_eq!(engine.config().reduction, Reduction::PerSample);
        Ok(())
    }

    #[test]
    fn scores_degrade_with_noise() -> Result<(), Box<dyn Error>> {
        let args = args(&["--levels", "3", "--max-level", "0.3", "--scales", "3", "--repeat", "2"]);
        let results = sweep(
            &args,
            Some(args.engine(Metric::SSIM)?),
            Some(args.engine(Metric::MSSSIM)?),
        )?;
        for sweep in [results.ssim.unwrap(), results.msssim.unwrap()] {
            let means: Vec<f64> = sweep
                .levels
                .iter()
                .map(|l| l.stats.as_ref().unwrap().mean)
                .collect();
            assert_eq!(means.len(), 4);
            assert!((means[0] - 1.0).abs() < 1e-9);
            assert!(means.windows(2).all(|w| w[1] < w[0]), "{means:?}");
            assert!(sweep.levels.iter().all(|l| l.scores.len() == 2));
        }
        Ok(())
    }

    #[test]
    fn default_blur_sweep_degrades() -> Result<(), Box<dyn Error>> {
        let args = CliArgs::parse_from([
            "msssim", "--distortion", "blur", "--height", "32", "--width", "32", "--batch", "1",
        ]);
        assert_eq!(args.level_values(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let results = sweep(
            &args,
            Some(args.engine(Metric::SSIM)?),
            Some(args.engine(Metric::MSSSIM)?),
        )?;
        for sweep in [results.ssim.unwrap(), results.msssim.unwrap()] {
            let means: Vec<f64> = sweep
                .levels
                .iter()
                .map(|l| l.stats.as_ref().unwrap().mean)
                .collect();
            assert!((means[0] - 1.0).abs() < 1e-9);
            assert!(means.windows(2).all(|w| w[1] < w[0]), "{means:?}");
        }
        Ok(())
    }
}
