use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use crate::foundation::core::{MeshPosition, Structure};
use crate::foundation::error::{ConfigError, MeshreelError, MeshreelResult};

const PATH_OBJECTS: [&str; 4] = [
    "dataFileName_V2",
    "fileName",
    "m_selectedSurfacePathName",
    "primaryAnatomicalSurface",
];

/// A scene file with one named scene selected, ready to be re-emitted once per frame.
///
/// The file is parsed once. Relative file references inside the selected scene are resolved
/// against the scene file's directory, and every marker field is turned into a slot of a text
/// template, so [`render_with_marker`](Self::render_with_marker) is a plain string splice that
/// never touches shared state.
///
/// Surface positions fill the vertex fields; voxel positions fill the voxel index, the volume
/// and stereotaxic coordinates and the three slice coordinates. Fields a position has no value
/// for keep the scene's own text.
#[derive(Clone, Debug)]
pub struct SceneDocument {
    path: PathBuf,
    name: String,
    source: String,
    template: Vec<Piece>,
    data_files: Vec<PathBuf>,
    surfaces: Vec<(Structure, PathBuf)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Piece {
    Source(Range<usize>),
    Literal(String),
    Row,
    Marker { slot: Slot, original: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Vertex,
    VoxelIndex(usize),
    Coordinate(usize),
}

impl SceneDocument {
    /// Read and parse the scene file at `path`, selecting the full scene called `name`.
    pub fn load(path: impl AsRef<Path>, name: &str) -> MeshreelResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::MissingResource {
                what: "scene file".to_string(),
                path: path.to_path_buf(),
            }
            .into());
        }
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let source = std::fs::read_to_string(&path)
            .map_err(|e| MeshreelError::malformed(&path, e.to_string()))?;
        Self::parse(source, path, name)
    }

    /// Parse scene XML that was read from `path`.
    ///
    /// `path` is used to resolve relative file references and in error messages.
    pub fn parse(source: String, path: impl Into<PathBuf>, name: &str) -> MeshreelResult<Self> {
        let path = path.into();
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let doc = roxmltree::Document::parse(&source)
            .map_err(|e| MeshreelError::malformed(&path, e.to_string()))?;

        let scene = doc
            .descendants()
            .filter(|n| n.has_tag_name("Scene") && n.attribute("Type") == Some("SCENE_TYPE_FULL"))
            .find(|n| {
                n.children()
                    .find(|c| c.has_tag_name("Name"))
                    .and_then(|c| c.text())
                    == Some(name)
            })
            .ok_or_else(|| ConfigError::SceneNotFound {
                name: name.to_string(),
                path: path.clone(),
            })?;

        let mut edits = Vec::<(Range<usize>, Vec<Piece>)>::new();
        let mut data_files = Vec::new();
        for object_name in PATH_OBJECTS {
            for node in scene
                .descendants()
                .filter(|n| is_object(n, "Object", object_name) && n.attribute("Type") == Some("pathName"))
            {
                let Some(raw) = node.text().map(str::trim).filter(|t| !t.is_empty()) else {
                    continue;
                };
                let resolved = resolve(&base_dir, raw);
                let literal = Piece::Literal(escape_text(&resolved.to_string_lossy()));
                if let Some(edit) = content_edit(&source, node, |_| vec![literal]) {
                    edits.push(edit);
                }
                data_files.push(resolved);
            }
        }

        let mut surfaces = Vec::<(Structure, PathBuf)>::new();
        for brain in scene
            .descendants()
            .filter(|n| n.has_tag_name("Object") && n.attribute("Class") == Some("BrainStructure"))
        {
            let structure = brain
                .children()
                .find(|c| is_object(c, "Object", "m_structure"))
                .and_then(|c| c.text());
            let surface = brain
                .children()
                .find(|c| is_object(c, "Object", "primaryAnatomicalSurface"))
                .and_then(|c| c.text())
                .map(str::trim)
                .filter(|t| !t.is_empty());
            if let (Some(structure), Some(surface)) = (structure, surface) {
                let structure = Structure::new(structure);
                if !surfaces.iter().any(|(s, _)| *s == structure) {
                    surfaces.push((structure, resolve(&base_dir, surface)));
                }
            }
        }

        // Marker fields are edited across the whole file, not only the selected scene.
        for node in doc.descendants() {
            match (node.tag_name().name(), node.attribute("Name")) {
                ("Object", Some("m_rowIndex")) => {
                    edits.extend(content_edit(&source, node, |_| vec![Piece::Row]));
                }
                ("Object", Some("m_surfaceVertexIndex")) => {
                    edits.extend(marker(&source, node, Slot::Vertex));
                }
                ("Object", Some(name)) => {
                    if let Some(axis) = slice_axis(name) {
                        edits.extend(marker(&source, node, Slot::Coordinate(axis)));
                    }
                }
                ("ObjectArray", Some("m_surfaceNodeIndices")) => {
                    edits.extend(element_markers(&source, node, 1, |_| Slot::Vertex));
                }
                ("ObjectArray", Some("m_voxelIJK")) => {
                    edits.extend(element_markers(&source, node, 3, Slot::VoxelIndex));
                }
                ("ObjectArray", Some("m_volumeXYZ" | "m_stereotaxicXYZ")) => {
                    edits.extend(element_markers(&source, node, 3, Slot::Coordinate));
                }
                _ => {}
            }
        }

        drop(doc);
        let template = build_template(source.len(), edits);
        tracing::debug!(
            scene = %path.display(),
            name,
            files = data_files.len(),
            surfaces = surfaces.len(),
            "parsed scene"
        );

        Ok(Self {
            path,
            name: name.to_string(),
            source,
            template,
            data_files,
            surfaces,
        })
    }

    /// Name of the selected scene.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the scene file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute files referenced by the selected scene, in lookup order.
    pub fn data_files(&self) -> &[PathBuf] {
        &self.data_files
    }

    /// Anatomical surface the selected scene shows for `structure`.
    pub fn surface_path(&self, structure: &Structure) -> Option<&Path> {
        self.surfaces
            .iter()
            .find(|(s, _)| s == structure)
            .map(|(_, p)| p.as_path())
    }

    /// Structures with a surface in the selected scene.
    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.surfaces.iter().map(|(s, _)| s)
    }

    /// The connectivity file driving the scene: the first dense time series, else the first
    /// dense connectome.
    pub fn connectivity_file(&self) -> MeshreelResult<&Path> {
        [".dtseries.nii", ".dconn.nii"]
            .into_iter()
            .find_map(|ext| {
                self.data_files
                    .iter()
                    .find(|f| f.to_string_lossy().ends_with(ext))
            })
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                ConfigError::MissingResource {
                    what: "connectivity file (.dtseries.nii or .dconn.nii)".to_string(),
                    path: self.path.clone(),
                }
                .into()
            })
    }

    /// Scene file text with the active marker moved to `position`.
    ///
    /// Positions without a connectivity row write `-1` as the row index.
    pub fn render_with_marker(&self, position: &MeshPosition) -> String {
        let row = position.row().map_or_else(|| "-1".to_string(), |r| r.to_string());
        let vertex = position.vertex().map(|v| v.to_string());
        let voxel = position.voxel().map(|v| v.ijk.map(|c| c.to_string()));
        let xyz = position.coordinates().map(|c| c.0.map(|v| format!("{v:?}")));

        let mut out = String::with_capacity(self.source.len() + 64);
        for piece in &self.template {
            match piece {
                Piece::Source(range) => out.push_str(&self.source[range.clone()]),
                Piece::Literal(text) => out.push_str(text),
                Piece::Row => out.push_str(&row),
                Piece::Marker { slot, original } => {
                    let value = match *slot {
                        Slot::Vertex => vertex.as_deref(),
                        Slot::VoxelIndex(axis) => voxel.as_ref().map(|v| v[axis].as_str()),
                        Slot::Coordinate(axis) => xyz.as_ref().map(|v| v[axis].as_str()),
                    };
                    out.push_str(value.unwrap_or(original));
                }
            }
        }
        out
    }
}

fn is_object(node: &roxmltree::Node<'_, '_>, tag: &str, name: &str) -> bool {
    node.has_tag_name(tag) && node.attribute("Name") == Some(name)
}

fn resolve(base_dir: &Path, raw: &str) -> PathBuf {
    let joined = base_dir.join(raw);
    std::fs::canonicalize(&joined).unwrap_or_else(|_| normalize_lexically(&joined))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Slice coordinate fields, by the axis they hold.
fn slice_axis(name: &str) -> Option<usize> {
    match name {
        "m_sliceCoordinateParasagittal" => Some(0),
        "m_sliceCoordinateCoronal" => Some(1),
        "m_sliceCoordinateAxial" => Some(2),
        _ => None,
    }
}

fn marker(
    source: &str,
    node: roxmltree::Node<'_, '_>,
    slot: Slot,
) -> Option<(Range<usize>, Vec<Piece>)> {
    content_edit(source, node, |original| {
        vec![Piece::Marker {
            slot,
            original: original.to_string(),
        }]
    })
}

/// Markers for the `Element`s with `Index` 0..`count` of an `ObjectArray`.
fn element_markers(
    source: &str,
    array: roxmltree::Node<'_, '_>,
    count: usize,
    slot: impl Fn(usize) -> Slot,
) -> Vec<(Range<usize>, Vec<Piece>)> {
    (0..count)
        .filter_map(|axis| {
            let index = axis.to_string();
            let element = array.children().find(|c| {
                c.has_tag_name("Element") && c.attribute("Index") == Some(index.as_str())
            })?;
            marker(source, element, slot(axis))
        })
        .collect()
}

/// Replacement of `node`'s text content by the pieces `value` builds from the current raw
/// content.
///
/// Elements with child elements are left alone; empty and self-closing elements get content
/// inserted.
fn content_edit(
    source: &str,
    node: roxmltree::Node<'_, '_>,
    value: impl FnOnce(&str) -> Vec<Piece>,
) -> Option<(Range<usize>, Vec<Piece>)> {
    if node.children().any(|c| c.is_element()) {
        return None;
    }
    if let Some(text) = node.children().find(|c| c.is_text()) {
        let range = text.range();
        let original = source.get(range.clone())?;
        return Some((range, value(original)));
    }

    let range = node.range();
    let raw = source.get(range.clone())?;
    if raw.ends_with("/>") {
        let mut pieces = vec![Piece::Literal(">".to_string())];
        pieces.extend(value(""));
        pieces.push(Piece::Literal(format!("</{}>", node.tag_name().name())));
        return Some((range.end - 2..range.end, pieces));
    }
    let close = range.start + raw.rfind("</")?;
    Some((close..close, value("")))
}

fn build_template(len: usize, mut edits: Vec<(Range<usize>, Vec<Piece>)>) -> Vec<Piece> {
    edits.sort_by_key(|(range, _)| (range.start, range.end));
    let mut template = Vec::with_capacity(edits.len() * 2 + 1);
    let mut cursor = 0;
    for (range, pieces) in edits {
        if range.start < cursor {
            continue;
        }
        if range.start > cursor {
            template.push(Piece::Source(cursor..range.start));
        }
        template.extend(pieces);
        cursor = range.end;
    }
    if cursor < len {
        template.push(Piece::Source(cursor..len));
    }
    template
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/scene/document.rs"]
mod tests;
