//! showerpix-io: Event-file reading and result writing for showerpix.
//!
//! This crate reads camera definitions and array events from JSON (or
//! JSON-lines) files and writes event reconstructions as CSV or JSON lines.
//!

mod error;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use reader::{
    build_cameras, read_cameras, read_config, CameraDefinition, CameraLayout, CameraSet,
    EventFile, EventLines,
};
pub use writer::{OutputFormat, ResultWriter, CSV_HEADER};
