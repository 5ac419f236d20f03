use super::*;
use crate::foundation::error::MeshreelError;
use crate::testkit::row_position;

fn traversal(vertices: &[u32]) -> Traversal {
    Traversal::new(vertices.iter().map(|&v| row_position(v, v)).collect()).unwrap()
}

fn vertices(t: &Traversal) -> Vec<u32> {
    t.into_iter().filter_map(MeshPosition::vertex).collect()
}

#[test]
fn empty_traversals_cannot_be_built() {
    assert!(Traversal::new(Vec::new()).is_none());
    assert!(!traversal(&[1]).is_empty());
}

#[test]
fn reversed_back_is_a_palindrome_without_a_doubled_turn() {
    let t = traversal(&[1, 2, 3]).reversed_back();
    assert_eq!(vertices(&t), vec![1, 2, 3, 2, 1]);

    let single = traversal(&[7]).reversed_back();
    assert_eq!(vertices(&single), vec![7]);
}

#[test]
fn repetition_is_exact_concatenation() {
    let t = traversal(&[1, 2]).repeated(3);
    assert_eq!(vertices(&t), vec![1, 2, 1, 2, 1, 2]);
    assert_eq!(traversal(&[1, 2]).repeated(1), traversal(&[1, 2]));
}

#[test]
fn transform_validation() {
    assert!(TraversalTransform::default().validate().is_ok());

    let both = TraversalTransform {
        closed: true,
        reverse: true,
        loops: 1,
    };
    assert!(matches!(
        both.validate(),
        Err(MeshreelError::Configuration(ConfigError::MutuallyExclusiveFlags))
    ));

    let no_loops = TraversalTransform {
        loops: 0,
        ..TraversalTransform::default()
    };
    assert!(matches!(
        no_loops.validate(),
        Err(MeshreelError::Configuration(ConfigError::Invalid(_)))
    ));
}

#[test]
fn traversal_serializes_as_position_list() {
    let json = serde_json::to_value(traversal(&[3])).unwrap();
    assert_eq!(json["positions"][0]["kind"], "row");
    assert_eq!(json["positions"][0]["at"]["vertex"], 3);
}
