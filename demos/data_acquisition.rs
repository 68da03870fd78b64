// Data acquisition example
//
// This example configures a set of channels, streams samples for a number of reads and
// prints per-channel statistics from the resulting DataFrame.

use clap::Parser;
use di2108_rs::{DeviceId, InputRange, RusbTransport, SampleBatch, ScanController, SessionOptions};
use polars::prelude::DataFrame;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "data_acquisition")]
#[command(about = "Stream calibrated voltages from a DI-2108-P")]
struct Args {
    /// Range code per channel (0: ±10 V, 1: ±5 V, 2: ±2.5 V, 3: 0-10 V, 4: 0-5 V)
    #[arg(short, long, value_delimiter = ',', default_value = "0,0")]
    ranges: Vec<u8>,

    /// Number of streaming reads to collect
    #[arg(short = 'n', long, default_value_t = 10)]
    reads: usize,

    /// Timeout of each streaming read in milliseconds, 0 blocks indefinitely
    #[arg(short, long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let stream_timeout = match args.timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    let options = SessionOptions::new().stream_timeout(stream_timeout);

    println!("DI-2108-P Data Acquisition Example");
    println!("==================================\n");

    let mut daq = ScanController::with_options(
        RusbTransport::new()?,
        DeviceId::DI_2108_P,
        args.ranges.len(),
        options,
    )?;
    for (channel, &code) in args.ranges.iter().enumerate() {
        daq.set_range(channel, code)?;
        println!("   ch{}: {}", channel, InputRange::from_code(code)?.as_str());
    }

    daq.initialize()?;
    println!("\nConnected: {}\n", daq.device_info().unwrap_or("(no reply)"));

    daq.start_scan()?;
    let batch = daq.read_batch(args.reads);
    // Stop even when a read failed; the read error wins.
    let stopped = daq.stop_scan();
    if let (Err(e), Err(_)) = (&stopped, &batch) {
        log::warn!("Stopping the scan failed as well: {e}");
    }
    let batch = batch?;
    stopped?;

    println!("Collected {} samples over {} reads", batch.len(), args.reads);
    let channel_count = batch.channel_count();
    let df = batch.into_dataframe()?;
    for channel in 0..channel_count {
        print_data_summary(&df, &SampleBatch::column_name(channel))?;
    }

    daq.shutdown()?;
    Ok(())
}

// Helper function to print basic statistics about acquired data
fn print_data_summary(data: &DataFrame, column: &str) -> Result<(), Box<dyn std::error::Error>> {
    let values: Vec<f64> = data.column(column)?.f64()?.into_no_null_iter().collect();

    if !values.is_empty() {
        let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        println!("   {column}: {min:.3}V to {max:.3}V (mean: {mean:.3}V)");
    }

    Ok(())
}
