// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! midir backend.
//!
//! Provides a cross-platform implementation of the `MidiOutput` trait
//! so the engine can drive hardware or a virtual MIDI port.

use anyhow::{anyhow, Result};
use midir::{MidiOutput as MidirClient, MidiOutputConnection};

use super::MidiOutput;

const CLIENT_NAME: &str = "chordarp";

/// midir output connected to a single destination port.
pub struct MidirOutput {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidirOutput {
    /// Create a new output connected to the specified destination.
    ///
    /// # Arguments
    /// * `destination_index` - Index of the destination in the system's MIDI port list
    ///
    /// # Returns
    /// * `Ok(MidirOutput)` on success
    /// * `Err` if the client could not be created or the port is missing
    pub fn new(destination_index: usize) -> Result<Self> {
        let client = MidirClient::new(CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to create MIDI client: {}", e))?;

        let ports = client.ports();
        let port = ports.get(destination_index).ok_or_else(|| {
            anyhow!(
                "MIDI destination {} not found (only {} available)",
                destination_index,
                ports.len()
            )
        })?;
        let port_name = client
            .port_name(port)
            .unwrap_or_else(|_| format!("Unknown {}", destination_index));

        let connection = client
            .connect(port, "chordarp-out")
            .map_err(|e| anyhow!("Failed to connect to {}: {}", port_name, e))?;

        Ok(Self {
            connection,
            port_name,
        })
    }

    /// Create a new output connected to a destination by name.
    ///
    /// # Arguments
    /// * `name` - Partial name to match against destination names
    pub fn new_by_name(name: &str) -> Result<Self> {
        let destinations = list_destinations();
        let index = destinations
            .iter()
            .position(|(_, n)| n.to_lowercase().contains(&name.to_lowercase()))
            .ok_or_else(|| anyhow!("No MIDI destination matching '{}' found", name))?;

        Self::new(destinations[index].0)
    }

    /// Name of the connected port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiOutput for MidirOutput {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.connection
            .send(message)
            .map_err(|e| anyhow!("Failed to send MIDI message: {}", e))
    }
}

/// List all available MIDI destinations.
///
/// # Returns
/// A vector of (index, name) tuples. Empty when no MIDI client can be created.
pub fn list_destinations() -> Vec<(usize, String)> {
    let Ok(client) = MidirClient::new(CLIENT_NAME) else {
        return Vec::new();
    };

    client
        .ports()
        .iter()
        .enumerate()
        .map(|(i, port)| {
            let name = client
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown {}", i));
            (i, name)
        })
        .collect()
}

/// Print all available MIDI destinations to stdout.
pub fn print_destinations() {
    let destinations = list_destinations();
    if destinations.is_empty() {
        println!("No MIDI destinations found.");
    } else {
        println!("Available MIDI destinations:");
        for (i, name) in destinations {
            println!("  {}: {}", i, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_destinations() {
        // Listing must not panic even without a MIDI subsystem
        let destinations = list_destinations();
        for (expected, (index, _)) in destinations.iter().enumerate() {
            assert_eq!(expected, *index);
        }
    }

    #[test]
    fn test_missing_destination_is_an_error() {
        assert!(MidirOutput::new(usize::MAX).is_err());
    }
}
