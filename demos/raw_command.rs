// Raw command example
//
// Sends one command line to the device and prints the reply, useful for exploring the protocol.

use clap::Parser;
use di2108_rs::ScanController;

#[derive(Parser)]
#[command(name = "raw_command")]
#[command(about = "Send a raw command to a DI-2108-P and print the reply")]
struct Args {
    /// Command text, e.g. "info 1"
    command: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::init();

    let mut daq = ScanController::connect(1)?;
    let reply = daq.send_message(&args.command)?;
    println!("{}", reply.trim_end());

    daq.shutdown()?;
    Ok(())
}
