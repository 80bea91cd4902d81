use std::path::PathBuf;

use crate::{
    error::{Result, RideError},
    input::parse_coordinates,
    types::Coordinate,
};

/// Usage text shown at startup and after every finished ride
pub const HELP: &str = "\
Enter GPS location or command:
  - GPS: 'lat,lng' or '[lat,lng]' or '[[lat,lng], ...]'
  - File: 'read filename.geojson'
  - Exit: 'quit' or Ctrl+C";

/// One line of interactive input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Leave the program
    Quit,
    /// Load a route from a GeoJSON file
    Read(PathBuf),
    /// Teleport to, or ride through, the given coordinates
    Go(Vec<Coordinate>),
    /// Blank line
    Empty,
}

impl Command {
    /// Interpret one line of input
    ///
    /// # Errors
    ///
    /// Returns [`RideError::InvalidArgument`] for `read` without a file name and the
    /// parser's error for anything that is neither a command nor valid coordinates.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();

        match line {
            "" => return Ok(Self::Empty),
            "quit" | "exit" => return Ok(Self::Quit),
            "read" => {
                return Err(RideError::InvalidArgument(
                    "usage: read <filename>".to_string(),
                ))
            }
            _ => {}
        }

        if let Some(path) = line.strip_prefix("read ") {
            let path = path.trim();
            if path.is_empty() {
                return Err(RideError::InvalidArgument(
                    "usage: read <filename>".to_string(),
                ));
            }
            return Ok(Self::Read(PathBuf::from(path)));
        }

        parse_coordinates(line).map(Self::Go)
    }
}
