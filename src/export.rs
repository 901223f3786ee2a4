//! Result output: JSON to stdout or a file, or a console banner.

use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::PowerReading;

/// Output renderings the CLI can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Console,
}

/// Export a reading in the requested format.
pub fn export(reading: &PowerReading, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    info!("exporting data in {format:?} format");
    match format {
        OutputFormat::Json => {
            export_json(reading, output)?;
        }
        OutputFormat::Console => export_console(reading),
    }
    Ok(())
}

/// Serialize a reading as pretty JSON, writing it to `output` when given
/// and to stdout otherwise. Returns the JSON text.
pub fn export_json(reading: &PowerReading, output: Option<&Path>) -> Result<String> {
    let json = serde_json::to_string_pretty(&reading.to_json())
        .map_err(|err| Error::export(format!("failed to serialize data to JSON: {err}")))?;

    match output {
        Some(path) => {
            info!("writing JSON to file: {}", path.display());
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        Error::export(format!(
                            "failed to create output directory {}: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }
            std::fs::write(path, &json).map_err(|err| {
                Error::export(format!("failed to export JSON to {}: {err}", path.display()))
            })?;
            debug!("JSON written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(json)
}

/// Render a reading as a fixed-width console banner with unit labels.
pub fn export_console(reading: &PowerReading) {
    let rule = "=".repeat(30);

    println!("{rule}");
    println!("enecoQ Data");
    println!("{rule}");
    println!();
    println!("Period: {}", reading.period);
    println!(
        "Timestamp: {}",
        reading.acquired_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();
    println!("Power Usage: {}", reading.usage);
    println!("Power Cost: {}", reading.cost);
    println!("CO2 Emission: {}", reading.co2);
    println!();
    println!("{rule}");

    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportingPeriod;

    fn reading() -> PowerReading {
        PowerReading::new(ReportingPeriod::Today, 12.5, 350.0, 6.25)
    }

    #[test]
    fn test_json_written_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("data.json");

        let json = export_json(&reading(), Some(&path)).unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, json);
        let parsed: serde_json::Value = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(parsed["usage"], 12.5);
        assert_eq!(parsed["period"], "today");
    }

    #[test]
    fn test_unwritable_path_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        // A file where a directory is expected makes create_dir_all fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let path = blocker.join("data.json");

        let err = export_json(&reading(), Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Export { .. }));
    }

    #[test]
    fn test_console_render_does_not_panic() {
        export_console(&reading());
    }
}
