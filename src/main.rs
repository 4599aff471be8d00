use anyhow::Context;
use clap::Parser;
use stacktime::cli::Cli;
use stacktime::config::ReportConfig;
use stacktime::error::exit_code;
use stacktime::reduce::{NullCollective, distributed_env_active};
use stacktime::space::Space;
use stacktime::state::State;
use stacktime::tree::FrameKind;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(stacktime_err) = e.downcast_ref::<stacktime::Error>() {
                ExitCode::from(stacktime_err.exit_code() as u8)
            } else {
                ExitCode::from(exit_code::GENERAL_ERROR as u8)
            }
        }
    }
}

fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    cli.validate()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Invalid arguments")?;

    let config = ReportConfig {
        threshold: cli.threshold,
        json: cli.json || ReportConfig::json_requested_by_env(),
    };

    // The demo binary has no communicator to hand over; a real embedding
    // would pass its own Collective here.
    if distributed_env_active() {
        log::warn!("distributed launcher detected; reducing with the single-process collective");
    }

    let mut state = State::new();
    run_workload(&mut state, cli.duration, cli.steps)?;

    if config.json {
        let path = cli.output.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%y%m%d%H%M%S");
            PathBuf::from(format!("stacktime.{timestamp}.json"))
        });
        let mut file = std::fs::File::create(&path)
            .with_context(|| format!("Cannot create {}", path.display()))?;
        state.finalize(&NullCollective, &config, &mut file)?;
        eprintln!("Wrote {}", path.display());
    } else {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        state.finalize(&NullCollective, &config, &mut out)?;
    }

    Ok(())
}

/// Drive a synthetic stencil-style workload through the profiling state,
/// standing in for a host runtime's callback stream.
fn run_workload(state: &mut State, duration: Duration, steps: u32) -> stacktime::Result<()> {
    let step_budget = duration / (steps + 1);

    state.push_region("setup");
    state.allocate(Space::Host, "grid", 0x1000_0000, 64 << 20)?;
    state.allocate(Space::Host, "halo", 0x2000_0000, 1 << 20)?;
    let init = state.begin_kernel("initialize", FrameKind::For);
    spin(step_budget);
    state.end_kernel(init)?;
    state.pop_region()?;

    state.push_region("simulation");
    for _ in 0..steps {
        let update = state.begin_kernel("update", FrameKind::For);
        spin(step_budget / 2);
        state.end_kernel(update)?;

        let residual = state.begin_kernel("residual", FrameKind::Reduce);
        spin(step_budget / 4);
        state.end_kernel(residual)?;

        state.begin_deep_copy(Space::Host, "halo-mirror", Space::Host, "halo", 1 << 20);
        spin(step_budget / 8);
        state.end_deep_copy()?;
    }
    state.pop_region()?;

    state.deallocate(Space::Host, "halo", 0x2000_0000, 1 << 20);
    state.deallocate(Space::Host, "grid", 0x1000_0000, 64 << 20);
    Ok(())
}

fn spin(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::black_box(());
    }
}
