use anyhow::{Context as _, anyhow, bail};

use crate::mesh::graph::Mesh;

const INTENT_POINTSET: &str = "NIFTI_INTENT_POINTSET";
const INTENT_TRIANGLE: &str = "NIFTI_INTENT_TRIANGLE";

/// Parse an ASCII-encoded GIFTI surface into a [`Mesh`].
///
/// Only `Encoding="ASCII"` data arrays are understood. Binary surfaces are normalized first by
/// the workbench tool (see [`gifti_ascii_invocation`](crate::tools::workbench::gifti_ascii_invocation)).
pub fn parse_ascii_surface(xml: &str) -> anyhow::Result<Mesh> {
    let doc = roxmltree::Document::parse(xml).context("invalid GIFTI XML")?;

    let mut vertices = None;
    let mut faces = None;
    for array in doc.descendants().filter(|n| n.has_tag_name("DataArray")) {
        match array.attribute("Intent") {
            Some(INTENT_POINTSET) if vertices.is_none() => {
                let values = read_array::<f32>(array)?;
                vertices = Some(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect());
            }
            Some(INTENT_TRIANGLE) if faces.is_none() => {
                let values = read_array::<u32>(array)?;
                faces = Some(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect());
            }
            _ => {}
        }
    }

    Ok(Mesh {
        vertices: vertices.ok_or_else(|| anyhow!("surface has no {INTENT_POINTSET} array"))?,
        faces: faces.ok_or_else(|| anyhow!("surface has no {INTENT_TRIANGLE} array"))?,
    })
}

/// Read a two-dimensional `N x 3` data array in row-major order.
fn read_array<T>(array: roxmltree::Node<'_, '_>) -> anyhow::Result<Vec<T>>
where
    T: std::str::FromStr + Copy,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let intent = array.attribute("Intent").unwrap_or("?");
    let encoding = array.attribute("Encoding").unwrap_or("ASCII");
    if encoding != "ASCII" {
        bail!("{intent} array uses {encoding} encoding; convert the surface to ASCII first");
    }

    let rows = dim(array, "Dim0")?;
    let cols = dim(array, "Dim1")?;
    if cols != 3 {
        bail!("{intent} array has {cols} columns, expected 3");
    }

    let text = array
        .children()
        .find(|n| n.has_tag_name("Data"))
        .and_then(|n| n.text())
        .unwrap_or("");
    let values = text
        .split_ascii_whitespace()
        .map(|tok| tok.parse::<T>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("{intent} array holds a non-numeric value"))?;
    if values.len() != rows * cols {
        bail!(
            "{intent} array holds {} values, expected {rows}x{cols}",
            values.len()
        );
    }

    if array.attribute("ArrayIndexingOrder") == Some("ColumnMajorOrder") {
        let mut row_major = Vec::with_capacity(values.len());
        for r in 0..rows {
            for c in 0..cols {
                row_major.push(values[c * rows + r]);
            }
        }
        return Ok(row_major);
    }
    Ok(values)
}

fn dim(array: roxmltree::Node<'_, '_>, name: &str) -> anyhow::Result<usize> {
    array
        .attribute(name)
        .ok_or_else(|| anyhow!("data array is missing {name}"))?
        .trim()
        .parse::<usize>()
        .with_context(|| format!("data array has a non-numeric {name}"))
}

#[cfg(test)]
#[path = "../../tests/unit/mesh/gifti.rs"]
mod tests;
