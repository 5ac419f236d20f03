use std::path::{Path, PathBuf};

use crate::foundation::core::Structure;
use crate::foundation::error::{ConfigError, MeshreelError, MeshreelResult};

/// Ordered vertex path read from a border file.
///
/// Border points are stored per surface face; the first vertex of each face is taken as the
/// point, so consecutive entries already form a connected path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BorderPath {
    /// Surface the border lies on (the root `Structure` attribute).
    pub structure: Structure,
    /// Border points in file order.
    pub vertices: Vec<u32>,
}

impl BorderPath {
    /// Read a border file from disk.
    pub fn load(path: impl AsRef<Path>) -> MeshreelResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::MissingResource {
                what: "border file".to_string(),
                path: path.to_path_buf(),
            }
            .into());
        }
        let xml = std::fs::read_to_string(path)
            .map_err(|e| MeshreelError::malformed(path, e.to_string()))?;
        Self::parse(&xml, path)
    }

    /// Parse border XML read from `path`.
    pub fn parse(xml: &str, path: impl Into<PathBuf>) -> MeshreelResult<Self> {
        let path = path.into();
        let malformed = |reason: &str| MeshreelError::malformed(&path, reason);

        let doc = roxmltree::Document::parse(xml).map_err(|e| malformed(&e.to_string()))?;
        let structure = doc
            .root_element()
            .attribute("Structure")
            .ok_or_else(|| malformed("Structure attribute not found"))?;
        let text = doc
            .descendants()
            .find(|n| n.has_tag_name("Vertices"))
            .ok_or_else(|| malformed("Vertices node not found"))?
            .text()
            .unwrap_or("");

        let vertices = text
            .lines()
            .filter_map(|line| line.split_ascii_whitespace().next())
            .map(|first| {
                first
                    .parse::<u32>()
                    .map_err(|_| malformed(&format!("'{first}' is not a vertex index")))
            })
            .collect::<MeshreelResult<Vec<_>>>()?;
        if vertices.is_empty() {
            return Err(malformed("border file is empty"));
        }

        Ok(Self {
            structure: Structure::new(structure),
            vertices,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/border.rs"]
mod tests;
