use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Triangulated surface: vertex coordinates plus triangle faces indexing into them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// Vertex coordinates in surface space (millimetres for brain surfaces).
    pub vertices: Vec<[f32; 3]>,
    /// Triangles as vertex-index triples.
    pub faces: Vec<[u32; 3]>,
}

/// Errors produced by [`MeshGraph`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// No sequence of mesh edges joins the two vertices.
    #[error("no path between vertex {from} and vertex {to}")]
    Disconnected {
        /// Start vertex.
        from: u32,
        /// End vertex.
        to: u32,
    },

    /// A vertex index lies outside the mesh.
    #[error("vertex {vertex} is out of range ({vertex_count} vertices)")]
    VertexOutOfRange {
        /// Offending vertex.
        vertex: u32,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A face refers to a vertex that does not exist.
    #[error("face {face} refers to missing vertex {vertex}")]
    InvalidFace {
        /// Face index.
        face: usize,
        /// Offending vertex.
        vertex: u32,
    },
}

/// Edge graph of a [`Mesh`], weighted by Euclidean edge length.
///
/// Adjacency is stored in compressed rows: the neighbors of `v` are
/// `neighbors[offsets[v]..offsets[v + 1]]`, sorted ascending, with matching `weights`.
/// Built once per surface and shared read-only between queries.
#[derive(Clone, Debug)]
pub struct MeshGraph {
    offsets: Vec<usize>,
    neighbors: Vec<u32>,
    weights: Vec<f64>,
}

impl MeshGraph {
    /// Build the edge graph of `mesh`.
    pub fn from_mesh(mesh: &Mesh) -> Result<Self, GraphError> {
        let vertex_count = mesh.vertices.len();

        let mut edges = Vec::<(u32, u32)>::with_capacity(mesh.faces.len() * 6);
        for (face_idx, face) in mesh.faces.iter().enumerate() {
            for &v in face {
                if v as usize >= vertex_count {
                    return Err(GraphError::InvalidFace {
                        face: face_idx,
                        vertex: v,
                    });
                }
            }
            for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                if a != b {
                    edges.push((a, b));
                    edges.push((b, a));
                }
            }
        }
        edges.sort_unstable();
        edges.dedup();

        let mut offsets = vec![0usize; vertex_count + 1];
        for &(a, _) in &edges {
            offsets[a as usize + 1] += 1;
        }
        for i in 0..vertex_count {
            offsets[i + 1] += offsets[i];
        }

        let neighbors = edges.iter().map(|&(_, b)| b).collect::<Vec<_>>();
        let weights = edges
            .iter()
            .map(|&(a, b)| edge_length(mesh.vertices[a as usize], mesh.vertices[b as usize]))
            .collect::<Vec<_>>();

        Ok(Self {
            offsets,
            neighbors,
            weights,
        })
    }

    /// Number of vertices (including isolated ones).
    pub fn vertex_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.neighbors.len() / 2
    }

    /// Sorted neighbors of `v`. Empty for out-of-range vertices.
    pub fn neighbors(&self, v: u32) -> &[u32] {
        let v = v as usize;
        if v >= self.vertex_count() {
            return &[];
        }
        &self.neighbors[self.offsets[v]..self.offsets[v + 1]]
    }

    /// Return `true` when `a` and `b` share a mesh edge.
    pub fn are_adjacent(&self, a: u32, b: u32) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    /// Shortest path along mesh edges from `from` to `to`, both endpoints included.
    ///
    /// `from == to` yields a single-element path. The search order is fixed, so equal-length
    /// alternatives always resolve to the same path.
    pub fn shortest_path(&self, from: u32, to: u32) -> Result<Vec<u32>, GraphError> {
        self.check_vertex(from)?;
        self.check_vertex(to)?;
        if from == to {
            return Ok(vec![from]);
        }

        let n = self.vertex_count();
        let mut dist = vec![f64::INFINITY; n];
        let mut prev = vec![u32::MAX; n];
        let mut heap = BinaryHeap::new();

        dist[from as usize] = 0.0;
        heap.push(QueueEntry {
            dist: 0.0,
            vertex: from,
        });

        while let Some(QueueEntry { dist: d, vertex }) = heap.pop() {
            if vertex == to {
                break;
            }
            if d > dist[vertex as usize] {
                continue;
            }
            let start = self.offsets[vertex as usize];
            let end = self.offsets[vertex as usize + 1];
            for (&next, &w) in self.neighbors[start..end]
                .iter()
                .zip(&self.weights[start..end])
            {
                let candidate = d + w;
                if candidate < dist[next as usize] {
                    dist[next as usize] = candidate;
                    prev[next as usize] = vertex;
                    heap.push(QueueEntry {
                        dist: candidate,
                        vertex: next,
                    });
                }
            }
        }

        if dist[to as usize].is_infinite() {
            return Err(GraphError::Disconnected { from, to });
        }

        let mut path = vec![to];
        let mut cur = to;
        while cur != from {
            cur = prev[cur as usize];
            path.push(cur);
        }
        path.reverse();
        Ok(path)
    }

    fn check_vertex(&self, vertex: u32) -> Result<(), GraphError> {
        if (vertex as usize) < self.vertex_count() {
            Ok(())
        } else {
            Err(GraphError::VertexOutOfRange {
                vertex,
                vertex_count: self.vertex_count(),
            })
        }
    }
}

fn edge_length(a: [f32; 3], b: [f32; 3]) -> f64 {
    let dx = f64::from(a[0]) - f64::from(b[0]);
    let dy = f64::from(a[1]) - f64::from(b[1]);
    let dz = f64::from(a[2]) - f64::from(b[2]);
    (dx * dx + dy * dy + dz * dz).sqrt()
}

// Min-heap entry: `BinaryHeap` is a max-heap, so the ordering is inverted.
#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    dist: f64,
    vertex: u32,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mesh/graph.rs"]
mod tests;
