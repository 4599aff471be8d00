use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "stacktime")]
#[command(about = "Call-tree profiler demo for kernel-dispatch workloads")]
#[command(version)]
pub struct Cli {
    /// Prune frames below this percent of total time
    #[arg(long, short = 't', default_value = "0.1")]
    pub threshold: f64,

    /// Emit the JSON report instead of the text trees
    #[arg(long)]
    pub json: bool,

    /// JSON output path (defaults to a timestamped file name)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Synthetic workload running time
    #[arg(long, short = 'd', default_value = "250ms", value_parser = parse_duration)]
    pub duration: Duration,

    /// Timestep count in the synthetic workload
    #[arg(long, short = 's', default_value = "40")]
    pub steps: u32,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    // Try humantime first
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }

    // Try bare number as seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    Err(format!(
        "Invalid duration '{}'. Examples: 250ms, 30s, 5m, 90",
        s
    ))
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(format!(
                "Threshold must be a percentage between 0 and 100, got {}",
                self.threshold
            ));
        }

        if self.steps == 0 {
            return Err("Workload needs at least one step".to_string());
        }

        Ok(())
    }
}
