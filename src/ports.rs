//! MIDI port listing for `--list-ports`

use anyhow::Result;
use midir::{MidiInput, MidiOutput};

/// Names of the available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("organsound-scanner")?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

/// Names of the available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new("organsound-scanner")?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

/// Print input and output ports to stdout
pub fn list_ports_formatted() {
    use colored::*;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    for (title, ports) in [
        ("Input Ports (manuals):", list_input_ports()),
        ("Output Ports (synthesizers):", list_output_ports()),
    ] {
        println!("\n{}", title.bold());
        match ports {
            Ok(ports) if ports.is_empty() => println!("  {}", "No ports found".dimmed()),
            Ok(ports) => {
                for (i, name) in ports.iter().enumerate() {
                    println!("  {} {}", format!("[{}]", i).yellow(), name);
                }
            }
            Err(e) => println!("  {}", format!("Unavailable: {}", e).red()),
        }
    }
    println!();
}
