use super::*;

#[test]
fn structure_names_drop_cifti_prefix() {
    assert_eq!(
        Structure::new("CIFTI_STRUCTURE_CORTEX_LEFT"),
        Structure::new("CORTEX_LEFT")
    );
    assert_eq!(Structure::new("  CORTEX_RIGHT\n").as_str(), "CORTEX_RIGHT");
}

#[test]
fn position_accessors_agree_across_variants() {
    let at = SurfaceVertex::new(Structure::new("CORTEX_LEFT"), 7);

    let row = MeshPosition::Row {
        row: 3,
        at: at.clone(),
    };
    assert_eq!(row.vertex(), Some(7));
    assert_eq!(row.voxel(), None);
    assert_eq!(row.row(), Some(3));

    let vertex = MeshPosition::Vertex {
        at: at.clone(),
        row: None,
    };
    assert_eq!(vertex.structure().as_str(), "CORTEX_LEFT");
    assert_eq!(vertex.row(), None);

    let border = MeshPosition::BorderPoint { at, row: Some(9) };
    assert_eq!(border.row(), Some(9));
    assert_eq!(border.to_string(), "row 9 (CORTEX_LEFT:7)");
}

#[test]
fn voxel_positions_have_no_surface_vertex() {
    let voxel = MeshPosition::Voxel {
        row: 40,
        at: VolumeVoxel::new(Structure::new("CIFTI_STRUCTURE_THALAMUS_LEFT"), [10, 20, 30]),
        xyz: Coordinates([70.0, -86.0, -12.0]),
    };
    assert_eq!(voxel.surface_vertex(), None);
    assert_eq!(voxel.vertex(), None);
    assert_eq!(voxel.row(), Some(40));
    assert_eq!(voxel.structure().as_str(), "THALAMUS_LEFT");
    assert_eq!(voxel.coordinates(), Some(&Coordinates([70.0, -86.0, -12.0])));
    assert_eq!(voxel.to_string(), "row 40 (THALAMUS_LEFT:(10,20,30))");

    let json = serde_json::to_value(&voxel).unwrap();
    assert_eq!(json["kind"], "voxel");
    assert_eq!(json["at"]["ijk"], serde_json::json!([10, 20, 30]));
    assert_eq!(json["xyz"], serde_json::json!([70.0, -86.0, -12.0]));
}

#[test]
fn coordinates_compare_bit_for_bit() {
    use std::collections::HashSet;

    let a = Coordinates([1.0, 2.0, 3.0]);
    assert_eq!(a, Coordinates([1.0, 2.0, 3.0]));
    assert_ne!(Coordinates([0.0, 0.0, 0.0]), Coordinates([-0.0, 0.0, 0.0]));
    let set = [a, a, Coordinates([1.0, 2.0, 3.5])]
        .into_iter()
        .collect::<HashSet<_>>();
    assert_eq!(set.len(), 2);
}

#[test]
fn cancel_is_visible_through_clones() {
    let token = CancelToken::new();
    let worker_view = token.clone();
    assert!(!worker_view.is_cancelled());
    token.cancel();
    assert!(worker_view.is_cancelled());
}
