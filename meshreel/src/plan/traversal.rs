use crate::foundation::core::MeshPosition;
use crate::foundation::error::{ConfigError, MeshreelResult};

/// Post-processing applied to a densified path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TraversalTransform {
    /// Return to the first position at the end.
    pub closed: bool,
    /// Append the path walked backwards, without repeating the turning point.
    pub reverse: bool,
    /// Number of times the transformed path is played, at least 1.
    pub loops: u32,
}

impl Default for TraversalTransform {
    fn default() -> Self {
        Self {
            closed: false,
            reverse: false,
            loops: 1,
        }
    }
}

impl TraversalTransform {
    /// Reject `closed` together with `reverse` and a zero loop count.
    pub fn validate(&self) -> MeshreelResult<()> {
        if self.closed && self.reverse {
            return Err(ConfigError::MutuallyExclusiveFlags.into());
        }
        if self.loops == 0 {
            return Err(ConfigError::Invalid("loops must be >= 1".to_string()).into());
        }
        Ok(())
    }
}

/// Ordered positions to render, one frame each. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Traversal {
    positions: Vec<MeshPosition>,
}

impl Traversal {
    /// Wrap a non-empty position list; `None` when `positions` is empty.
    pub fn new(positions: Vec<MeshPosition>) -> Option<Self> {
        (!positions.is_empty()).then_some(Self { positions })
    }

    /// Positions in frame order.
    pub fn positions(&self) -> &[MeshPosition] {
        &self.positions
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Append the reversed path minus its last element: `[a, b, c]` becomes
    /// `[a, b, c, b, a]`.
    pub(crate) fn reversed_back(mut self) -> Self {
        let n = self.positions.len();
        let back = self.positions[..n - 1].iter().rev().cloned().collect::<Vec<_>>();
        self.positions.extend(back);
        self
    }

    /// Append positions as-is.
    pub(crate) fn extend(mut self, tail: impl IntoIterator<Item = MeshPosition>) -> Self {
        self.positions.extend(tail);
        self
    }

    /// Play the whole traversal `loops` times.
    pub(crate) fn repeated(self, loops: u32) -> Self {
        let loops = loops.max(1) as usize;
        let positions = (0..loops)
            .flat_map(|_| self.positions.iter().cloned())
            .collect();
        Self { positions }
    }
}

impl<'a> IntoIterator for &'a Traversal {
    type Item = &'a MeshPosition;
    type IntoIter = std::slice::Iter<'a, MeshPosition>;

    fn into_iter(self) -> Self::IntoIter {
        self.positions.iter()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/plan/traversal.rs"]
mod tests;
