use anyhow::{Context as _, anyhow, bail};

use crate::foundation::core::{Coordinates, Structure, SurfaceVertex, VolumeVoxel};
use crate::foundation::error::PlanError;

const BRAIN_MODELS: &str = "CIFTI_INDEX_TYPE_BRAIN_MODELS";
const SURFACE_MODEL: &str = "CIFTI_MODEL_TYPE_SURFACE";
const VOXEL_MODEL: &str = "CIFTI_MODEL_TYPE_VOXELS";

/// Rows 0..3 of a voxel-index to millimetre transform.
pub type VoxelTransform = [[f64; 4]; 3];

const IDENTITY: VoxelTransform = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
];

/// What a connectivity row stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowLocation {
    /// A vertex of a surface structure.
    Surface(SurfaceVertex),
    /// A voxel of a volume structure.
    Volume {
        /// The voxel.
        at: VolumeVoxel,
        /// Its centre in millimetres.
        xyz: Coordinates,
    },
}

/// Row layout of a connectivity file: which rows belong to which surface vertex or voxel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BrainModels {
    surfaces: Vec<SurfaceModel>,
    volumes: Vec<VolumeModel>,
    transform: Option<VoxelTransform>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct SurfaceModel {
    structure: Structure,
    offset: u32,
    surface_vertices: usize,
    /// Vertex per row, in row order.
    vertices: Vec<u32>,
    /// `(vertex, row)` sorted by vertex.
    by_vertex: Vec<(u32, u32)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct VolumeModel {
    structure: Structure,
    offset: u32,
    /// Voxel per row, in row order.
    voxels: Vec<[u32; 3]>,
    /// `(voxel, row)` sorted by voxel.
    by_voxel: Vec<([u32; 3], u32)>,
}

impl VolumeModel {
    fn new(structure: Structure, offset: u32, voxels: Vec<[u32; 3]>) -> Self {
        let mut by_voxel = voxels
            .iter()
            .zip(offset..)
            .map(|(&v, row)| (v, row))
            .collect::<Vec<_>>();
        by_voxel.sort_unstable();
        Self {
            structure,
            offset,
            voxels,
            by_voxel,
        }
    }
}

impl BrainModels {
    /// Parse the output of `wb_command -file-information <file> -only-cifti-xml`.
    ///
    /// Anything the tool prints before the `<CIFTI` root is skipped.
    pub fn from_tool_output(stdout: &str) -> anyhow::Result<Self> {
        let start = stdout
            .find("<CIFTI")
            .ok_or_else(|| anyhow!("no CIFTI XML in tool output"))?;
        Self::parse(&stdout[start..])
    }

    /// Parse a CIFTI-2 XML header.
    pub fn parse(xml: &str) -> anyhow::Result<Self> {
        let doc = roxmltree::Document::parse(xml.trim_end()).context("invalid CIFTI XML")?;

        let maps = doc
            .descendants()
            .filter(|n| {
                n.has_tag_name("MatrixIndicesMap")
                    && n.attribute("IndicesMapToDataType") == Some(BRAIN_MODELS)
            })
            .collect::<Vec<_>>();
        // Rows of a dense file run along dimension 1.
        let map = maps
            .iter()
            .find(|m| {
                m.attribute("AppliesToMatrixDimension")
                    .is_some_and(|dims| dims.split(',').any(|d| d.trim() == "1"))
            })
            .or_else(|| maps.first())
            .ok_or_else(|| anyhow!("CIFTI header has no brain-model mapping"))?;

        let mut surfaces = Vec::new();
        let mut volumes = Vec::new();
        for model in map.children().filter(|n| n.has_tag_name("BrainModel")) {
            let structure = Structure::new(
                model
                    .attribute("BrainStructure")
                    .ok_or_else(|| anyhow!("brain model without BrainStructure"))?,
            );
            let offset = number::<u32>(&model, "IndexOffset")?;
            let count = number::<usize>(&model, "IndexCount")?;

            match model.attribute("ModelType") {
                Some(SURFACE_MODEL) => {}
                Some(VOXEL_MODEL) => {
                    let voxels = parse_voxels(&model, &structure, count)?;
                    volumes.push(VolumeModel::new(structure, offset, voxels));
                    continue;
                }
                _ => continue,
            }
            let surface_vertices = number::<usize>(&model, "SurfaceNumberOfVertices")?;

            let vertices = model
                .children()
                .find(|n| n.has_tag_name("VertexIndices"))
                .and_then(|n| n.text())
                .unwrap_or("")
                .split_ascii_whitespace()
                .map(str::parse::<u32>)
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("{structure} has a non-numeric vertex index"))?;
            if vertices.len() != count {
                bail!(
                    "{structure} lists {} vertices but IndexCount is {count}",
                    vertices.len()
                );
            }

            let mut by_vertex = vertices
                .iter()
                .zip(offset..)
                .map(|(&v, row)| (v, row))
                .collect::<Vec<_>>();
            by_vertex.sort_unstable();

            surfaces.push(SurfaceModel {
                structure,
                offset,
                surface_vertices,
                vertices,
                by_vertex,
            });
        }

        let transform = match map.children().find(|n| n.has_tag_name("Volume")) {
            Some(volume) => Some(parse_transform(&volume)?),
            None if volumes.is_empty() => None,
            None => bail!("voxel models without a Volume transform"),
        };
        Ok(Self {
            surfaces,
            volumes,
            transform,
        })
    }

    /// Build a table directly, mainly for tests: each entry lists a structure, its vertex count
    /// and the vertex behind each consecutive row.
    pub fn from_surfaces(surfaces: impl IntoIterator<Item = (Structure, usize, Vec<u32>)>) -> Self {
        let mut offset = 0u32;
        let surfaces = surfaces
            .into_iter()
            .map(|(structure, surface_vertices, vertices)| {
                let mut by_vertex = vertices
                    .iter()
                    .zip(offset..)
                    .map(|(&v, row)| (v, row))
                    .collect::<Vec<_>>();
                by_vertex.sort_unstable();
                let model = SurfaceModel {
                    structure,
                    offset,
                    surface_vertices,
                    vertices,
                    by_vertex,
                };
                offset = offset.saturating_add(model.vertices.len() as u32);
                model
            })
            .collect();
        Self {
            surfaces,
            ..Self::default()
        }
    }

    /// Append a volume structure whose voxels take the rows after the existing ones.
    pub fn with_volume(mut self, structure: Structure, voxels: Vec<[u32; 3]>) -> Self {
        let offset = self.row_count();
        self.volumes.push(VolumeModel::new(structure, offset, voxels));
        self
    }

    /// Use `transform` to place voxels in millimetres. Voxel indices are used as-is without one.
    pub fn with_transform(mut self, transform: VoxelTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Number of rows covered by the table.
    pub fn row_count(&self) -> u32 {
        let surfaces = self
            .surfaces
            .iter()
            .map(|s| s.offset.saturating_add(s.vertices.len() as u32));
        let volumes = self
            .volumes
            .iter()
            .map(|v| v.offset.saturating_add(v.voxels.len() as u32));
        surfaces.chain(volumes).max().unwrap_or(0)
    }

    /// Surface vertex or voxel behind `row`.
    pub fn locate_row(&self, row: u32) -> Result<RowLocation, PlanError> {
        if let Ok(at) = self.row_to_vertex(row) {
            return Ok(RowLocation::Surface(at));
        }
        self.volumes
            .iter()
            .find_map(|v| {
                let i = row.checked_sub(v.offset)? as usize;
                v.voxels.get(i).map(|&ijk| {
                    let at = VolumeVoxel::new(v.structure.clone(), ijk);
                    let xyz = self.coordinates(ijk);
                    RowLocation::Volume { at, xyz }
                })
            })
            .ok_or(PlanError::UnmappableRow { row })
    }

    /// Row holding `at`, or `None` for voxels outside its structure.
    pub fn voxel_to_row(&self, at: &VolumeVoxel) -> Option<u32> {
        let model = self.volumes.iter().find(|v| v.structure == at.structure)?;
        model
            .by_voxel
            .binary_search_by_key(&at.ijk, |&(v, _)| v)
            .ok()
            .map(|i| model.by_voxel[i].1)
    }

    /// Millimetre position of the voxel at `ijk`.
    pub fn coordinates(&self, ijk: [u32; 3]) -> Coordinates {
        let m = self.transform.unwrap_or(IDENTITY);
        let [i, j, k] = ijk.map(f64::from);
        Coordinates(m.map(|r| r[0] * i + r[1] * j + r[2] * k + r[3]))
    }

    /// Surface vertex behind `row`.
    pub fn row_to_vertex(&self, row: u32) -> Result<SurfaceVertex, PlanError> {
        self.surfaces
            .iter()
            .find_map(|s| {
                let i = row.checked_sub(s.offset)? as usize;
                s.vertices
                    .get(i)
                    .map(|&v| SurfaceVertex::new(s.structure.clone(), v))
            })
            .ok_or(PlanError::UnmappableRow { row })
    }

    /// Row holding `at`, or `None` for vertices outside the table (e.g. the medial wall).
    pub fn vertex_to_row(&self, at: &SurfaceVertex) -> Option<u32> {
        let model = self.surface(&at.structure)?;
        model
            .by_vertex
            .binary_search_by_key(&at.vertex, |&(v, _)| v)
            .ok()
            .map(|i| model.by_vertex[i].1)
    }

    /// Number of vertices of the full surface for `structure`.
    pub fn surface_vertex_count(&self, structure: &Structure) -> Option<usize> {
        self.surface(structure).map(|s| s.surface_vertices)
    }

    fn surface(&self, structure: &Structure) -> Option<&SurfaceModel> {
        self.surfaces.iter().find(|s| s.structure == *structure)
    }
}

fn parse_voxels(
    model: &roxmltree::Node<'_, '_>,
    structure: &Structure,
    count: usize,
) -> anyhow::Result<Vec<[u32; 3]>> {
    let values = model
        .children()
        .find(|n| n.has_tag_name("VoxelIndicesIJK"))
        .and_then(|n| n.text())
        .unwrap_or("")
        .split_ascii_whitespace()
        .map(str::parse::<u32>)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("{structure} has a non-numeric voxel index"))?;
    if values.len() != count * 3 {
        bail!(
            "{structure} lists {} voxel indices but IndexCount is {count}",
            values.len()
        );
    }
    Ok(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

/// Read `TransformationMatrixVoxelIndicesIJKtoXYZ`, scaled to millimetres.
fn parse_transform(volume: &roxmltree::Node<'_, '_>) -> anyhow::Result<VoxelTransform> {
    let matrix = volume
        .children()
        .find(|n| n.has_tag_name("TransformationMatrixVoxelIndicesIJKtoXYZ"))
        .ok_or_else(|| anyhow!("Volume has no TransformationMatrixVoxelIndicesIJKtoXYZ"))?;
    let exponent = match matrix.attribute("MeterExponent") {
        Some(raw) => raw
            .trim()
            .parse::<i32>()
            .context("non-numeric MeterExponent")?,
        None => -3,
    };
    let values = matrix
        .text()
        .unwrap_or("")
        .split_ascii_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .context("non-numeric voxel transform")?;
    if values.len() != 16 {
        bail!("voxel transform has {} values, expected 16", values.len());
    }

    let scale = 10f64.powi(exponent + 3);
    let mut transform = [[0.0; 4]; 3];
    for (r, row) in transform.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = values[r * 4 + c] * scale;
        }
    }
    Ok(transform)
}

fn number<T>(node: &roxmltree::Node<'_, '_>, name: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    node.attribute(name)
        .ok_or_else(|| anyhow!("brain model is missing {name}"))?
        .trim()
        .parse::<T>()
        .with_context(|| format!("brain model has a non-numeric {name}"))
}

#[cfg(test)]
#[path = "../../tests/unit/scene/cifti.rs"]
mod tests;
