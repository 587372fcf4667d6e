/// `feature` entry that marks a node as a leaf.
pub const LEAF_SENTINEL: i32 = -2;

/// Child entry of a leaf: "no child".
pub const NO_CHILD: i32 = -1;

/// A borrowed view of one node in a [`TreeModel`](crate::TreeModel).
///
/// The model stores parallel node arrays; this enum is how the rest of the
/// crate reads them without re-checking the sentinel encoding everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    /// An interior split node.
    Split {
        /// Feature column compared at this node.
        feature: usize,
        /// Samples with `sample[feature] <= threshold` go left.
        threshold: f64,
        /// Index of the left child.
        left: usize,
        /// Index of the right child.
        right: usize,
    },
    /// A terminal node.
    Leaf {
        /// Per-class counts or weights, in class order.
        value: &'a [f64],
    },
}

impl Node<'_> {
    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

/// Index of the largest entry, ties resolved to the lowest index.
///
/// Returns 0 for an empty slice.
pub(crate) fn argmax_lowest(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = idx;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(argmax_lowest(&[0.1, 0.7, 0.2]), 1);
    }

    #[test]
    fn argmax_ties_go_to_lowest_index() {
        assert_eq!(argmax_lowest(&[3.0, 5.0, 5.0, 1.0]), 1);
        assert_eq!(argmax_lowest(&[2.0, 2.0]), 0);
    }

    #[test]
    fn argmax_single_and_empty() {
        assert_eq!(argmax_lowest(&[4.0]), 0);
        assert_eq!(argmax_lowest(&[]), 0);
    }

    #[test]
    fn leaf_view_is_leaf() {
        let value = [1.0, 0.0];
        assert!(Node::Leaf { value: &value }.is_leaf());
        let split = Node::Split {
            feature: 0,
            threshold: 0.5,
            left: 1,
            right: 2,
        };
        assert!(!split.is_leaf());
    }
}
