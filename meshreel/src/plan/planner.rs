use std::path::PathBuf;

use anyhow::anyhow;

use crate::foundation::core::{MeshPosition, Structure, SurfaceVertex, VolumeVoxel};
use crate::foundation::error::{ConfigError, MeshreelError, MeshreelResult, PlanError};
use crate::mesh::graph::{GraphError, MeshGraph};
use crate::mesh::voxel::voxel_line;
use crate::plan::traversal::{Traversal, TraversalTransform};
use crate::scene::atlas::SurfaceAtlas;
use crate::scene::border::BorderPath;
use crate::scene::cifti::RowLocation;

/// How the raw waypoint strings are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointMode {
    /// Each waypoint is a connectivity row, on a surface or in a volume.
    Rows,
    /// The first waypoint names a structure; the rest are vertices on it.
    Vertices,
    /// The single waypoint is a border file whose points are used as-is.
    Border,
}

impl WaypointMode {
    /// Pick the mode from the two CLI switches, which cannot be combined.
    pub fn from_flags(vertex_mode: bool, border_file: bool) -> Result<Self, ConfigError> {
        match (vertex_mode, border_file) {
            (true, true) => Err(ConfigError::InvalidModeCombination),
            (true, false) => Ok(Self::Vertices),
            (false, true) => Ok(Self::Border),
            (false, false) => Ok(Self::Rows),
        }
    }
}

/// Input to [`TraversalPlanner::plan`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanRequest {
    /// Raw waypoints, in order.
    pub waypoints: Vec<String>,
    /// Treat waypoints as `STRUCTURE v0 v1 ...`.
    pub vertex_mode: bool,
    /// Treat the single waypoint as a border file.
    pub border_file: bool,
    /// Transforms applied after densification.
    pub transform: TraversalTransform,
}

impl PlanRequest {
    /// Row-mode request over `waypoints`.
    pub fn rows<I, S>(waypoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            waypoints: waypoints.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Replace the transform.
    pub fn with_transform(mut self, transform: TraversalTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Interpretation selected by the mode switches.
    pub fn mode(&self) -> Result<WaypointMode, ConfigError> {
        WaypointMode::from_flags(self.vertex_mode, self.border_file)
    }
}

/// Turns waypoints into a densified, transformed [`Traversal`].
///
/// Consecutive surface waypoints are joined by the shortest path along mesh edges, so every
/// pair of neighbouring frames sits on adjacent vertices (or on the same vertex, where a
/// transform asks for it). Consecutive voxel waypoints are joined by the straight voxel line
/// between them, keeping only voxels that have a row. Waypoints keep their input order, and
/// repeated consecutive waypoints collapse into one frame.
pub struct TraversalPlanner<'a> {
    atlas: &'a dyn SurfaceAtlas,
}

impl<'a> TraversalPlanner<'a> {
    /// Plan against the rows and surfaces of `atlas`.
    pub fn new(atlas: &'a dyn SurfaceAtlas) -> Self {
        Self { atlas }
    }

    /// Plan `request`. Nothing is rendered; all errors surface here.
    #[tracing::instrument(skip_all, fields(waypoints = request.waypoints.len()))]
    pub fn plan(&self, request: &PlanRequest) -> MeshreelResult<Traversal> {
        let mode = request.mode()?;
        request.transform.validate()?;

        let waypoints = request
            .waypoints
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>();
        if waypoints.is_empty() {
            return Err(PlanError::EmptyWaypointList.into());
        }

        let resolved = match mode {
            WaypointMode::Rows => self.resolve_rows(&waypoints)?,
            WaypointMode::Vertices => self.resolve_vertices(&waypoints)?,
            WaypointMode::Border => self.resolve_border(waypoints[0])?,
        };
        let waypoint_count = resolved.len();

        let mut traversal = match mode {
            WaypointMode::Border => resolved,
            WaypointMode::Rows | WaypointMode::Vertices => self.densify(mode, &resolved)?,
        };

        let transform = request.transform;
        if transform.closed {
            traversal = self.close(mode, traversal)?;
        }
        if transform.reverse {
            traversal = traversal.reversed_back();
        }
        let traversal = traversal.repeated(transform.loops);

        tracing::info!(
            ?mode,
            waypoints = waypoint_count,
            frames = traversal.len(),
            closed = transform.closed,
            reverse = transform.reverse,
            loops = transform.loops,
            "planned traversal"
        );
        Ok(traversal)
    }

    fn resolve_rows(&self, waypoints: &[&str]) -> MeshreelResult<Traversal> {
        let positions = waypoints
            .iter()
            .map(|w| -> MeshreelResult<MeshPosition> {
                let row = parse_index(w)?;
                Ok(match self.atlas.locate_row(row)? {
                    RowLocation::Surface(at) => MeshPosition::Row { row, at },
                    RowLocation::Volume { at, xyz } => MeshPosition::Voxel { row, at, xyz },
                })
            })
            .collect::<MeshreelResult<Vec<_>>>()?;
        Traversal::new(positions).ok_or_else(|| PlanError::EmptyWaypointList.into())
    }

    fn resolve_vertices(&self, waypoints: &[&str]) -> MeshreelResult<Traversal> {
        let (structure, vertices) = waypoints
            .split_first()
            .ok_or(PlanError::EmptyWaypointList)?;
        let structure = Structure::new(structure);
        let vertices = vertices
            .iter()
            .map(|w| parse_index(w))
            .collect::<MeshreelResult<Vec<_>>>()?;
        self.positions_on(&structure, &vertices, |at, row| MeshPosition::Vertex { at, row })
    }

    fn resolve_border(&self, path: &str) -> MeshreelResult<Traversal> {
        let border = BorderPath::load(PathBuf::from(path))?;
        tracing::debug!(
            border = path,
            structure = %border.structure,
            points = border.vertices.len(),
            "loaded border"
        );
        self.positions_on(&border.structure, &border.vertices, |at, row| {
            MeshPosition::BorderPoint { at, row }
        })
    }

    fn positions_on(
        &self,
        structure: &Structure,
        vertices: &[u32],
        make: impl Fn(SurfaceVertex, Option<u32>) -> MeshPosition,
    ) -> MeshreelResult<Traversal> {
        if vertices.is_empty() {
            return Err(PlanError::EmptyWaypointList.into());
        }
        let graph = self.atlas.graph(structure)?;
        let positions = vertices
            .iter()
            .map(|&vertex| -> MeshreelResult<MeshPosition> {
                check_bounds(&graph, structure, vertex)?;
                let at = SurfaceVertex::new(structure.clone(), vertex);
                let row = self.atlas.vertex_to_row(&at)?;
                Ok(make(at, row))
            })
            .collect::<MeshreelResult<Vec<_>>>()?;
        Traversal::new(positions).ok_or_else(|| PlanError::EmptyWaypointList.into())
    }

    /// Join consecutive waypoints by shortest paths. The vertex shared by two segments is
    /// emitted once.
    fn densify(&self, mode: WaypointMode, waypoints: &Traversal) -> MeshreelResult<Traversal> {
        let positions = waypoints.positions();
        let mut out = vec![positions[0].clone()];
        for pair in positions.windows(2) {
            self.leg(mode, &pair[0], &pair[1], &mut out)?;
        }
        Traversal::new(out).ok_or_else(|| PlanError::EmptyWaypointList.into())
    }

    /// Walk back to the first position.
    fn close(&self, mode: WaypointMode, traversal: Traversal) -> MeshreelResult<Traversal> {
        let positions = traversal.positions();
        let first = positions[0].clone();
        if mode == WaypointMode::Border || positions.len() == 1 {
            return Ok(traversal.extend([first]));
        }

        let last = positions[positions.len() - 1].clone();
        let mut leg = Vec::new();
        self.leg(mode, &last, &first, &mut leg)?;
        Ok(traversal.extend(leg))
    }

    /// Append the path from `from` (exclusive) to `to` (inclusive) to `out`.
    fn leg(
        &self,
        mode: WaypointMode,
        from: &MeshPosition,
        to: &MeshPosition,
        out: &mut Vec<MeshPosition>,
    ) -> MeshreelResult<()> {
        let structure = from.structure();
        if structure != to.structure() {
            return Err(PlanError::CrossesStructures {
                from: structure.clone(),
                to: to.structure().clone(),
            }
            .into());
        }

        match (from, to) {
            (MeshPosition::Voxel { at: a, .. }, MeshPosition::Voxel { at: b, .. }) => {
                self.voxel_leg(a, b, to, out)
            }
            _ => match (from.surface_vertex(), to.surface_vertex()) {
                (Some(a), Some(b)) => self.surface_leg(mode, a, b, to, out),
                _ => Err(PlanError::CrossesStructures {
                    from: structure.clone(),
                    to: to.structure().clone(),
                }
                .into()),
            },
        }
    }

    fn surface_leg(
        &self,
        mode: WaypointMode,
        from: &SurfaceVertex,
        to: &SurfaceVertex,
        target: &MeshPosition,
        out: &mut Vec<MeshPosition>,
    ) -> MeshreelResult<()> {
        let structure = &from.structure;
        let graph = self.atlas.graph(structure)?;
        let path = graph
            .shortest_path(from.vertex, to.vertex)
            .map_err(|e| path_error(structure, e))?;
        tracing::debug!(%structure, from = from.vertex, to = to.vertex, steps = path.len() - 1, "shortest path");

        if path.len() < 2 {
            return Ok(());
        }
        for &vertex in &path[1..path.len() - 1] {
            let at = SurfaceVertex::new(structure.clone(), vertex);
            let row = self.atlas.vertex_to_row(&at)?;
            out.push(match (mode, row) {
                (WaypointMode::Rows, Some(row)) => MeshPosition::Row { row, at },
                _ => MeshPosition::Vertex { at, row },
            });
        }
        out.push(target.clone());
        Ok(())
    }

    /// Voxels on the line between two volume waypoints that belong to the structure.
    fn voxel_leg(
        &self,
        from: &VolumeVoxel,
        to: &VolumeVoxel,
        target: &MeshPosition,
        out: &mut Vec<MeshPosition>,
    ) -> MeshreelResult<()> {
        let line = voxel_line(from.ijk, to.ijk);
        tracing::debug!(structure = %from.structure, from = ?from.ijk, to = ?to.ijk, steps = line.len() - 1, "voxel line");

        if line.len() < 2 {
            return Ok(());
        }
        for &ijk in &line[1..line.len() - 1] {
            let voxel = VolumeVoxel::new(from.structure.clone(), ijk);
            let Some(row) = self.atlas.voxel_to_row(&voxel)? else {
                continue;
            };
            if let RowLocation::Volume { at, xyz } = self.atlas.locate_row(row)? {
                out.push(MeshPosition::Voxel { row, at, xyz });
            }
        }
        out.push(target.clone());
        Ok(())
    }
}

fn parse_index(raw: &str) -> MeshreelResult<u32> {
    raw.parse::<u32>().map_err(|_| {
        PlanError::InvalidWaypoint {
            value: raw.to_string(),
        }
        .into()
    })
}

fn check_bounds(graph: &MeshGraph, structure: &Structure, vertex: u32) -> MeshreelResult<()> {
    if (vertex as usize) < graph.vertex_count() {
        Ok(())
    } else {
        Err(PlanError::VertexOutOfRange {
            structure: structure.clone(),
            vertex,
            vertex_count: graph.vertex_count(),
        }
        .into())
    }
}

fn path_error(structure: &Structure, err: GraphError) -> MeshreelError {
    match err {
        GraphError::Disconnected { from, to } => PlanError::Disconnected {
            structure: structure.clone(),
            from,
            to,
        }
        .into(),
        GraphError::VertexOutOfRange {
            vertex,
            vertex_count,
        } => PlanError::VertexOutOfRange {
            structure: structure.clone(),
            vertex,
            vertex_count,
        }
        .into(),
        other => MeshreelError::Other(anyhow!(other)),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/plan/planner.rs"]
mod tests;
