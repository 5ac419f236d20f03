use super::*;

fn surface(order: &str, coords: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<GIFTI Version="1.0" NumberOfDataArrays="2">
  <DataArray Intent="NIFTI_INTENT_POINTSET" DataType="NIFTI_TYPE_FLOAT32"
             ArrayIndexingOrder="{order}" Dimensionality="2" Dim0="4" Dim1="3" Encoding="ASCII">
    <Data>{coords}</Data>
  </DataArray>
  <DataArray Intent="NIFTI_INTENT_TRIANGLE" DataType="NIFTI_TYPE_INT32"
             ArrayIndexingOrder="RowMajorOrder" Dimensionality="2" Dim0="2" Dim1="3" Encoding="ASCII">
    <Data>
      0 1 2
      1 3 2
    </Data>
  </DataArray>
</GIFTI>"#
    )
}

#[test]
fn ascii_surface_parses_vertices_and_faces() {
    let xml = surface("RowMajorOrder", "0 0 0\n1 0 0\n0 1 0\n1 1 0.5");
    let mesh = parse_ascii_surface(&xml).unwrap();
    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.vertices[3], [1.0, 1.0, 0.5]);
    assert_eq!(mesh.faces, vec![[0, 1, 2], [1, 3, 2]]);
}

#[test]
fn column_major_arrays_are_transposed() {
    // x column, then y column, then z column.
    let xml = surface("ColumnMajorOrder", "0 1 0 1  0 0 1 1  0 0 0 0.5");
    let mesh = parse_ascii_surface(&xml).unwrap();
    assert_eq!(mesh.vertices[1], [1.0, 0.0, 0.0]);
    assert_eq!(mesh.vertices[3], [1.0, 1.0, 0.5]);
}

#[test]
fn binary_encodings_are_rejected_with_a_hint() {
    let xml = surface("RowMajorOrder", "AAAA").replacen(
        r#"Encoding="ASCII""#,
        r#"Encoding="GZipBase64Binary""#,
        1,
    );
    let err = parse_ascii_surface(&xml).unwrap_err();
    assert!(format!("{err:#}").contains("convert the surface to ASCII"));
}

#[test]
fn value_count_must_match_dimensions() {
    let xml = surface("RowMajorOrder", "0 0 0 1 0 0");
    let err = parse_ascii_surface(&xml).unwrap_err();
    assert!(err.to_string().contains("expected 4x3"));
}

#[test]
fn missing_triangles_are_reported() {
    let xml = r#"<GIFTI><DataArray Intent="NIFTI_INTENT_POINTSET" Dim0="1" Dim1="3"><Data>0 0 0</Data></DataArray></GIFTI>"#;
    let err = parse_ascii_surface(xml).unwrap_err();
    assert!(err.to_string().contains("NIFTI_INTENT_TRIANGLE"));
}
