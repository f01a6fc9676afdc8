use crate::{MetricSweep, SweepResults};
use clap::ValueEnum;
use std::error::Error;
use std::io::stdout;

#[derive(Debug, Copy, Clone, Default, ValueEnum)]
pub(crate) enum Output {
    /// Default classic output for human reading. This won't print the score of each sample.
    #[default]
    Default,
    /// Json object output. Contains both per-sample scores and aggregated stats.
    Json,
    /// CSV output. Only contains per-sample scores.
    CSV,
}

impl Output {
    pub(crate) fn display_results(&self, results: &SweepResults) -> Result<(), Box<dyn Error>> {
        let metrics = [("ssim", &results.ssim), ("msssim", &results.msssim)];
        match self {
            Output::Default => {
                println!("Distortion: {:?}", results.distortion);
                for (name, sweep) in metrics {
                    let Some(sweep) = sweep else { continue };
                    println!("{}:", name.to_uppercase());
                    for level in &sweep.levels {
                        match &level.stats {
                            Some(stats) => println!(
                                "  level {:.3}: {:.4} (min: {:.4}, max: {:.4}, stddev: {:.4})",
                                level.level, stats.mean, stats.min, stats.max, stats.stddev
                            ),
                            None => println!("  level {:.3}: -", level.level),
                        }
                    }
                }
            }
            Output::Json => {
                println!("{}", serde_json::to_string_pretty(results)?);
            }
            Output::CSV => {
                let mut csv = csv::Writer::from_writer(stdout().lock());
                csv.write_record(["metric", "level", "sample", "score"])?;
                for (name, sweep) in metrics {
                    let Some(MetricSweep { levels }) = sweep else {
                        continue;
                    };
                    for level in levels {
                        for (sample, score) in level.scores.iter().enumerate() {
                            csv.write_record([
                                name.to_string(),
                                level.level.to_string(),
                                sample.to_string(),
                                score.to_string(),
                            ])?;
                        }
                    }
                }
                csv.flush()?;
            }
        }
        Ok(())
    }
}
