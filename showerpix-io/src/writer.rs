//! Writers for reconstructed events.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use showerpix_stereo::EventReconstruction;

use crate::Result;

/// Column names of the CSV output.
pub const CSV_HEADER: &str = "event_id,telescope_ids,n_images,direction_x,direction_y,dispdiff,\
core_x,core_y,core_dispersion,energy,energy_spread,energy_quality,n_energy,max_axis_angle,\
geo_direction_x,geo_direction_y,geo_direction_dispersion,geo_core_x,geo_core_y,geo_core_dispersion";

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated values with a header row; telescope ids are joined
    /// with `;`.
    Csv,
    /// One JSON object per line.
    JsonLines,
}

impl OutputFormat {
    /// Picks the format from the file extension (`csv`, `jsonl`, `ndjson`).
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "jsonl" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Writer for event reconstruction results.
pub struct ResultWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    header_written: bool,
    count: usize,
}

impl ResultWriter<BufWriter<File>> {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, format: OutputFormat) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), format))
    }
}

impl<W: Write> ResultWriter<W> {
    #[must_use]
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            header_written: false,
            count: 0,
        }
    }

    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Records written so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Writes one result.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write(&mut self, result: &EventReconstruction) -> Result<()> {
        match self.format {
            OutputFormat::Csv => self.write_csv_row(result)?,
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, result)?;
                self.writer.write_all(b"\n")?;
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Writes a batch of results.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_all(&mut self, results: &[EventReconstruction]) -> Result<()> {
        for result in results {
            self.write(result)?;
        }
        Ok(())
    }

    fn write_csv_row(&mut self, r: &EventReconstruction) -> Result<()> {
        if !self.header_written {
            writeln!(self.writer, "{CSV_HEADER}")?;
            self.header_written = true;
        }
        let ids = r
            .telescope_ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(";");
        writeln!(
            self.writer,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            r.event_id,
            ids,
            r.n_images,
            r.direction_x,
            r.direction_y,
            r.dispdiff,
            r.core_x,
            r.core_y,
            r.core_dispersion,
            r.energy,
            r.energy_spread,
            r.energy_quality.as_str(),
            r.n_energy,
            r.max_axis_angle,
            r.geo_direction_x,
            r.geo_direction_y,
            r.geo_direction_dispersion,
            r.geo_core_x,
            r.geo_core_y,
            r.geo_core_dispersion
        )?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use showerpix_stereo::EnergyQuality;
    use tempfile::NamedTempFile;

    fn result(event_id: u64) -> EventReconstruction {
        EventReconstruction {
            event_id,
            telescope_ids: vec![1, 4],
            n_images: 2,
            direction_x: 0.5,
            direction_y: -0.25,
            dispdiff: 0.01,
            core_x: 12.5,
            core_y: -3.0,
            core_dispersion: 2.0,
            energy: 1.5,
            energy_spread: 0.1,
            energy_quality: EnergyQuality::ValidMulti,
            n_energy: 2,
            max_axis_angle: 85.0,
            geo_direction_x: 0.5,
            geo_direction_y: -0.25,
            geo_direction_dispersion: 0.0,
            geo_core_x: 12.0,
            geo_core_y: -3.5,
            geo_core_dispersion: 1.0,
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(OutputFormat::from_path("out.csv"), Some(OutputFormat::Csv));
        assert_eq!(
            OutputFormat::from_path("out.JSONL"),
            Some(OutputFormat::JsonLines)
        );
        assert_eq!(OutputFormat::from_path("out.txt"), None);
        assert_eq!(OutputFormat::from_path("out"), None);
    }

    #[test]
    fn test_write_csv() {
        let mut writer = ResultWriter::new(Vec::new(), OutputFormat::Csv);
        writer.write_all(&[result(7), result(8)]).unwrap();
        assert_eq!(writer.count(), 2);
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("7,1;4,2,0.5,-0.25,"));
        assert!(lines[1].contains(",valid_multi,"));
        assert_eq!(
            lines[1].split(',').count(),
            CSV_HEADER.split(',').count()
        );
    }

    #[test]
    fn test_write_json_lines_file() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ResultWriter::create(file.path(), OutputFormat::JsonLines).unwrap();
        writer.write(&result(3)).unwrap();
        writer.write(&result(4)).unwrap();
        writer.flush().unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let parsed: Vec<EventReconstruction> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, vec![result(3), result(4)]);
        assert!(content.contains("\"energy_quality\":\"valid_multi\""));
    }
}
