// Basic connection example
//
// This example opens the DI-2108-P, prints its identification and closes the session again.

use di2108_rs::{DeviceId, ScanController};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (optional)
    env_logger::init();

    println!("DI-2108-P Connection Example");
    println!("============================\n");

    println!("1. Connecting to device {}...", DeviceId::DI_2108_P);
    let mut daq = ScanController::connect(1)?;
    println!("Successfully connected!");

    println!("\n2. Device information:");
    println!("   {}", daq.device_info().unwrap_or("(no reply)"));
    println!("   State: {}", daq.state());

    println!("\n3. Closing session...");
    daq.shutdown()?;
    println!("   State: {}", daq.state());

    println!("\nConnection test completed successfully!");
    Ok(())
}
