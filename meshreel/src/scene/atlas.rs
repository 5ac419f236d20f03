use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;

use crate::foundation::core::{CancelToken, Structure, SurfaceVertex, VolumeVoxel};
use crate::foundation::error::{ConfigError, MeshreelError, MeshreelResult, PlanError};
use crate::mesh::gifti::parse_ascii_surface;
use crate::mesh::graph::{Mesh, MeshGraph};
use crate::scene::cifti::{BrainModels, RowLocation};
use crate::scene::document::SceneDocument;
use crate::tools::runner::{InvocationError, ToolRunner};
use crate::tools::workbench::{cifti_xml_invocation, gifti_ascii_invocation};

/// Everything the planner needs to know about the surfaces and volumes behind a scene.
///
/// Graphs are handed out behind `Arc`: each surface's graph is built at most once and then
/// shared read-only by every query.
pub trait SurfaceAtlas: Send + Sync {
    /// Surface vertex or voxel behind a connectivity row.
    fn locate_row(&self, row: u32) -> MeshreelResult<RowLocation>;

    /// Connectivity row behind a surface vertex, if it has one.
    fn vertex_to_row(&self, at: &SurfaceVertex) -> MeshreelResult<Option<u32>>;

    /// Connectivity row behind a voxel, if it has one.
    fn voxel_to_row(&self, at: &VolumeVoxel) -> MeshreelResult<Option<u32>>;

    /// Edge graph of the surface for `structure`.
    fn graph(&self, structure: &Structure) -> MeshreelResult<Arc<MeshGraph>>;
}

/// [`SurfaceAtlas`] over tables and meshes held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryAtlas {
    models: BrainModels,
    graphs: HashMap<Structure, Arc<MeshGraph>>,
}

impl InMemoryAtlas {
    /// Empty atlas: no rows, no surfaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `models` as the row table.
    pub fn with_rows(mut self, models: BrainModels) -> Self {
        self.models = models;
        self
    }

    /// Register the surface for `structure`.
    pub fn with_graph(mut self, structure: Structure, graph: MeshGraph) -> Self {
        self.graphs.insert(structure, Arc::new(graph));
        self
    }
}

impl SurfaceAtlas for InMemoryAtlas {
    fn locate_row(&self, row: u32) -> MeshreelResult<RowLocation> {
        Ok(self.models.locate_row(row)?)
    }

    fn vertex_to_row(&self, at: &SurfaceVertex) -> MeshreelResult<Option<u32>> {
        Ok(self.models.vertex_to_row(at))
    }

    fn voxel_to_row(&self, at: &VolumeVoxel) -> MeshreelResult<Option<u32>> {
        Ok(self.models.voxel_to_row(at))
    }

    fn graph(&self, structure: &Structure) -> MeshreelResult<Arc<MeshGraph>> {
        self.graphs.get(structure).cloned().ok_or_else(|| {
            PlanError::UnknownStructure {
                structure: structure.clone(),
            }
            .into()
        })
    }
}

/// [`SurfaceAtlas`] backed by the files a scene references.
///
/// The row table comes from the scene's connectivity file and each surface from its GIFTI
/// file; both are read lazily through the workbench tool and cached.
pub struct SceneAtlas {
    scene: Arc<SceneDocument>,
    renderer: PathBuf,
    runner: Arc<dyn ToolRunner>,
    cancel: CancelToken,
    scratch: PathBuf,
    timeout: Duration,
    models: Mutex<Option<Arc<BrainModels>>>,
    graphs: Mutex<HashMap<Structure, Arc<MeshGraph>>>,
}

impl SceneAtlas {
    /// Create an atlas for `scene`. Converted surfaces are written under `scratch`.
    pub fn new(
        scene: Arc<SceneDocument>,
        renderer: impl Into<PathBuf>,
        runner: Arc<dyn ToolRunner>,
        cancel: CancelToken,
        scratch: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scene,
            renderer: renderer.into(),
            runner,
            cancel,
            scratch: scratch.into(),
            timeout: Duration::from_secs(600),
            models: Mutex::new(None),
            graphs: Mutex::new(HashMap::new()),
        }
    }

    /// Limit each helper call to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn models(&self) -> MeshreelResult<Arc<BrainModels>> {
        let mut slot = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(models) = slot.as_ref() {
            return Ok(Arc::clone(models));
        }

        let cifti = self.scene.connectivity_file()?;
        require_file("connectivity file", cifti)?;
        let invocation = cifti_xml_invocation(&self.renderer, cifti, self.timeout);
        let output = self
            .runner
            .run(&invocation, &self.cancel)
            .map_err(|e| tool_error(e, "reading the connectivity header"))?;
        let models = BrainModels::from_tool_output(&output.stdout)
            .map_err(|e| MeshreelError::malformed(cifti, format!("{e:#}")))?;
        tracing::debug!(file = %cifti.display(), "loaded connectivity row table");

        let models = Arc::new(models);
        *slot = Some(Arc::clone(&models));
        Ok(models)
    }

    fn load_mesh(&self, structure: &Structure, surface: &Path) -> MeshreelResult<Mesh> {
        require_file("surface", surface)?;
        let direct = std::fs::read_to_string(surface)
            .map_err(anyhow::Error::from)
            .and_then(|xml| parse_ascii_surface(&xml));
        match direct {
            Ok(mesh) => return Ok(mesh),
            Err(e) => tracing::debug!(surface = %surface.display(), "converting surface to ASCII: {e:#}"),
        }

        std::fs::create_dir_all(&self.scratch).map_err(|e| {
            anyhow!(
                "failed to create scratch directory '{}': {e}",
                self.scratch.display()
            )
        })?;
        let converted = self.scratch.join(format!("{structure}.ascii.surf.gii"));
        let invocation = gifti_ascii_invocation(&self.renderer, surface, &converted, self.timeout);
        self.runner
            .run(&invocation, &self.cancel)
            .map_err(|e| tool_error(e, "converting the surface"))?;

        std::fs::read_to_string(&converted)
            .map_err(anyhow::Error::from)
            .and_then(|xml| parse_ascii_surface(&xml))
            .map_err(|e| MeshreelError::malformed(surface, format!("{e:#}")))
    }
}

impl std::fmt::Debug for SceneAtlas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneAtlas")
            .field("scene", &self.scene.path())
            .field("renderer", &self.renderer)
            .field("scratch", &self.scratch)
            .finish_non_exhaustive()
    }
}

impl SurfaceAtlas for SceneAtlas {
    fn locate_row(&self, row: u32) -> MeshreelResult<RowLocation> {
        Ok(self.models()?.locate_row(row)?)
    }

    fn vertex_to_row(&self, at: &SurfaceVertex) -> MeshreelResult<Option<u32>> {
        if self.scene.connectivity_file().is_err() {
            return Ok(None);
        }
        Ok(self.models()?.vertex_to_row(at))
    }

    fn voxel_to_row(&self, at: &VolumeVoxel) -> MeshreelResult<Option<u32>> {
        Ok(self.models()?.voxel_to_row(at))
    }

    fn graph(&self, structure: &Structure) -> MeshreelResult<Arc<MeshGraph>> {
        let mut cache = self.graphs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(graph) = cache.get(structure) {
            return Ok(Arc::clone(graph));
        }

        let surface = self
            .scene
            .surface_path(structure)
            .ok_or_else(|| PlanError::UnknownStructure {
                structure: structure.clone(),
            })?;
        let mesh = self.load_mesh(structure, surface)?;
        let graph = MeshGraph::from_mesh(&mesh)
            .map_err(|e| MeshreelError::malformed(surface, e.to_string()))?;
        tracing::info!(
            %structure,
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "built surface graph"
        );

        let graph = Arc::new(graph);
        cache.insert(structure.clone(), Arc::clone(&graph));
        Ok(graph)
    }
}

fn require_file(what: &str, path: &Path) -> MeshreelResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigError::MissingResource {
            what: what.to_string(),
            path: path.to_path_buf(),
        }
        .into())
    }
}

fn tool_error(err: InvocationError, doing: &str) -> MeshreelError {
    match err {
        InvocationError::Cancelled => MeshreelError::Cancelled,
        other => MeshreelError::Other(anyhow!("{doing} failed: {other}")),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/atlas.rs"]
mod tests;
