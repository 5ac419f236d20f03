//! Traversal planning: waypoints in, ordered frame positions out.

/// Waypoint resolution and shortest-path densification.
pub mod planner;
/// The planned traversal and its transforms.
pub mod traversal;
