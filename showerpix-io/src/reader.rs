//! Readers for camera definitions, event files and reconstruction configs.
//!
//! Event files are JSON documents holding the camera definitions of the
//! array followed by the events:
//!
//! ```json
//! {
//!   "cameras": [{"telescope_type": 1, "layout": "hexagonal", "rings": 10, "spacing": 0.1}],
//!   "events": [{"event_id": 1, "pointing": {"zenith": 20.0, "azimuth": 0.0}, "telescopes": [...]}]
//! }
//! ```
//!
//! Long runs can instead be stored as JSON lines, one event per line, with
//! the cameras in a separate file (see [`EventLines`] and [`read_cameras`]).
//! Pixel columns other than `charge` may be omitted from a sample.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use showerpix_core::{CameraGeometry, TelescopeType};
use showerpix_stereo::{ArrayEvent, ReconstructionConfig};

use crate::{Error, Result};

/// Cameras of an array keyed by telescope type.
pub type CameraSet = HashMap<TelescopeType, Arc<CameraGeometry>>;

/// Pixel layout of one camera type as written in a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum CameraLayout {
    /// Explicit pixel positions with either listed neighbours or a
    /// neighbour radius.
    Pixels {
        x: Vec<f64>,
        y: Vec<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        neighbours: Option<Vec<Vec<usize>>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        neighbour_radius: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edge: Option<Vec<bool>>,
    },
    /// Regular hexagonal camera, see [`CameraGeometry::hexagonal`].
    Hexagonal { rings: usize, spacing: f64 },
}

/// One camera type of the array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDefinition {
    pub telescope_type: TelescopeType,
    #[serde(flatten)]
    pub layout: CameraLayout,
}

impl CameraDefinition {
    /// Builds the camera geometry.
    ///
    /// # Errors
    /// Returns an error if the layout is inconsistent or names no way to
    /// find neighbours.
    pub fn into_geometry(self) -> Result<CameraGeometry> {
        match self.layout {
            CameraLayout::Pixels {
                x,
                y,
                neighbours,
                neighbour_radius,
                edge,
            } => {
                let camera = match (neighbours, neighbour_radius) {
                    (Some(neighbours), _) => CameraGeometry::new(x, y, neighbours)?,
                    (None, Some(radius)) => CameraGeometry::from_positions(x, y, radius)?,
                    (None, None) => {
                        return Err(Error::InvalidFormat(format!(
                            "camera type {} has neither neighbours nor neighbour_radius",
                            self.telescope_type.0
                        )))
                    }
                };
                match edge {
                    Some(edge) => Ok(camera.with_edge_pixels(edge)?),
                    None => Ok(camera),
                }
            }
            CameraLayout::Hexagonal { rings, spacing } => {
                Ok(CameraGeometry::hexagonal(rings, spacing)?)
            }
        }
    }
}

/// Builds the camera set, rejecting repeated telescope types.
///
/// # Errors
/// Returns an error for duplicate types or invalid layouts.
pub fn build_cameras(definitions: Vec<CameraDefinition>) -> Result<CameraSet> {
    let mut cameras = CameraSet::with_capacity(definitions.len());
    for definition in definitions {
        let telescope_type = definition.telescope_type;
        if cameras.contains_key(&telescope_type) {
            return Err(Error::InvalidFormat(format!(
                "camera type {} defined twice",
                telescope_type.0
            )));
        }
        cameras.insert(telescope_type, Arc::new(definition.into_geometry()?));
    }
    Ok(cameras)
}

#[derive(Deserialize)]
struct CameraFileRecord {
    cameras: Vec<CameraDefinition>,
}

#[derive(Deserialize)]
struct EventFileRecord {
    #[serde(default)]
    cameras: Vec<CameraDefinition>,
    events: Vec<ArrayEvent>,
}

fn complete_event(event: &mut ArrayEvent) {
    for telescope in &mut event.telescopes {
        telescope.sample.fill_missing_columns();
    }
}

/// Reads a `{"cameras": [...]}` document.
///
/// # Errors
/// Returns an error if the file cannot be read or holds invalid cameras.
pub fn read_cameras<P: AsRef<Path>>(path: P) -> Result<CameraSet> {
    let file = File::open(path)?;
    let record: CameraFileRecord = serde_json::from_reader(BufReader::new(file))?;
    build_cameras(record.cameras)
}

/// Reads a reconstruction config. Fields missing from the file keep their
/// defaults.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, or if a setting
/// is out of range.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<ReconstructionConfig> {
    let file = File::open(path)?;
    let config: ReconstructionConfig = serde_json::from_reader(BufReader::new(file))?;
    config.validate()?;
    Ok(config)
}

/// A fully loaded event file.
#[derive(Debug, Clone)]
pub struct EventFile {
    pub cameras: CameraSet,
    pub events: Vec<ArrayEvent>,
}

impl EventFile {
    /// Opens and parses an event file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let parsed = Self::from_reader(BufReader::new(file))?;
        log::debug!(
            "{}: {} events, {} camera types",
            path.as_ref().display(),
            parsed.events.len(),
            parsed.cameras.len()
        );
        Ok(parsed)
    }

    /// Parses an event file from any reader.
    ///
    /// # Errors
    /// Returns an error if the document is malformed.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_record(serde_json::from_reader(reader)?)
    }

    /// Parses an event file from a string.
    ///
    /// # Errors
    /// Returns an error if the document is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_record(serde_json::from_str(json)?)
    }

    fn from_record(record: EventFileRecord) -> Result<Self> {
        let cameras = build_cameras(record.cameras)?;
        let mut events = record.events;
        events.iter_mut().for_each(complete_event);
        Ok(Self { cameras, events })
    }

    /// Telescope types used by the events, sorted.
    #[must_use]
    pub fn telescope_types(&self) -> Vec<TelescopeType> {
        let mut types: Vec<TelescopeType> = self
            .events
            .iter()
            .flat_map(|e| e.telescopes.iter().map(|t| t.telescope_type))
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    /// Number of telescope images over all events.
    #[must_use]
    pub fn n_images(&self) -> usize {
        self.events.iter().map(|e| e.telescopes.len()).sum()
    }
}

/// Streaming reader of JSON-lines event files. Blank lines are skipped.
pub struct EventLines<R> {
    lines: Lines<R>,
    line: usize,
}

impl EventLines<BufReader<File>> {
    /// Opens a JSON-lines event file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> EventLines<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for EventLines<R> {
    type Item = Result<ArrayEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(err) => return Some(Err(err.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            let line = self.line;
            return Some(
                serde_json::from_str::<ArrayEvent>(&text)
                    .map(|mut event| {
                        complete_event(&mut event);
                        event
                    })
                    .map_err(|source| Error::Line { line, source }),
            );
        }
    }
}
