use super::*;
use crate::testkit::{CHAIN, chain_mesh, two_islands};

#[test]
fn same_vertex_yields_single_element_path() {
    let graph = MeshGraph::from_mesh(&chain_mesh()).unwrap();
    assert_eq!(graph.shortest_path(42, 42).unwrap(), vec![42]);
}

#[test]
fn path_follows_the_short_chain() {
    let graph = MeshGraph::from_mesh(&chain_mesh()).unwrap();
    assert_eq!(graph.vertex_count(), 100);
    assert_eq!(graph.shortest_path(10, 20).unwrap(), CHAIN.to_vec());
    assert_eq!(graph.shortest_path(20, 10).unwrap(), vec![20, 17, 14, 10]);
}

#[test]
fn path_is_weighted_by_edge_length_not_hop_count() {
    // 0-4-3 is two hops but ~20 units long; 0-1-2-3 is three hops and 3 units long.
    let mesh = Mesh {
        vertices: vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [3.0, 0.0, 0.0],
            [1.5, 10.0, 0.0],
        ],
        faces: vec![[0, 1, 4], [1, 2, 4], [2, 3, 4]],
    };
    let graph = MeshGraph::from_mesh(&mesh).unwrap();
    assert!(graph.are_adjacent(0, 4));
    assert!(graph.are_adjacent(4, 3));
    assert_eq!(graph.shortest_path(0, 3).unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn consecutive_path_vertices_are_adjacent() {
    let graph = MeshGraph::from_mesh(&chain_mesh()).unwrap();
    let path = graph.shortest_path(0, 99).unwrap();
    assert_eq!(path.first(), Some(&0));
    assert_eq!(path.last(), Some(&99));
    assert!(path.windows(2).all(|w| graph.are_adjacent(w[0], w[1])));
}

#[test]
fn separate_components_are_disconnected() {
    let graph = MeshGraph::from_mesh(&two_islands()).unwrap();
    assert_eq!(
        graph.shortest_path(0, 4),
        Err(GraphError::Disconnected { from: 0, to: 4 })
    );
}

#[test]
fn out_of_range_vertex_is_rejected() {
    let graph = MeshGraph::from_mesh(&two_islands()).unwrap();
    assert_eq!(
        graph.shortest_path(0, 6),
        Err(GraphError::VertexOutOfRange {
            vertex: 6,
            vertex_count: 6
        })
    );
}

#[test]
fn faces_with_missing_vertices_are_rejected() {
    let mesh = Mesh {
        vertices: vec![[0.0; 3]; 3],
        faces: vec![[0, 1, 3]],
    };
    assert_eq!(
        MeshGraph::from_mesh(&mesh).unwrap_err(),
        GraphError::InvalidFace { face: 0, vertex: 3 }
    );
}

#[test]
fn shared_edges_are_stored_once() {
    let mesh = Mesh {
        vertices: vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ],
        faces: vec![[0, 1, 2], [1, 3, 2]],
    };
    let graph = MeshGraph::from_mesh(&mesh).unwrap();
    assert_eq!(graph.edge_count(), 5);
    assert_eq!(graph.neighbors(1), &[0, 2, 3]);
}
