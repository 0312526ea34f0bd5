//! BVH node model and its fixed-size wire record.
//!
//! In memory a node is a bounding box plus an explicit [`NodeKind`] tag.
//! On disk it is a 40-byte [`PackedBvhNode`]:
//!
//! ```text
//! [min: 3 x f32][tag: u32][max: 3 x f32][left_data: u32][right_data: u32][pad: u32]
//! ```
//!
//! | tag | kind           | left_data       | right_data      |
//! |-----|----------------|-----------------|-----------------|
//! | 0   | internal       | left child      | right child     |
//! | 1   | instance leaf  | instance index  | 0               |
//! | 2   | primitive leaf | first primitive | primitive count |

use bytemuck::{Pod, Zeroable};

use crate::util::{BBox3f, Error, Result, Vec3};

const TAG_INTERNAL: u32 = 0;
const TAG_INSTANCE_LEAF: u32 = 1;
const TAG_PRIMITIVE_LEAF: u32 = 2;

/// What a BVH node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Two children, as indices into the same node array.
    Internal { left: u32, right: u32 },
    /// Top-level leaf: exactly one mesh instance.
    InstanceLeaf { instance: u32 },
    /// Bottom-level leaf: a contiguous range of flattened triangles.
    PrimitiveLeaf { offset: u32, count: u32 },
}

/// A node of a flat BVH array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhNode {
    pub bbox: BBox3f,
    pub kind: NodeKind,
}

impl BvhNode {
    pub fn new(bbox: BBox3f, kind: NodeKind) -> Self {
        Self { bbox, kind }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, NodeKind::Internal { .. })
    }

    /// Child indices of an internal node.
    #[inline]
    pub fn children(&self) -> Option<(u32, u32)> {
        match self.kind {
            NodeKind::Internal { left, right } => Some((left, right)),
            _ => None,
        }
    }

    /// Shift child indices by `offset` when splicing a tree into a larger
    /// array. Leaf payloads are not node indices and stay untouched.
    #[inline]
    pub fn offset_child_nodes(&mut self, offset: u32) {
        if let NodeKind::Internal { left, right } = &mut self.kind {
            *left += offset;
            *right += offset;
        }
    }

    pub fn to_packed(&self) -> PackedBvhNode {
        let (tag, left_data, right_data) = match self.kind {
            NodeKind::Internal { left, right } => (TAG_INTERNAL, left, right),
            NodeKind::InstanceLeaf { instance } => (TAG_INSTANCE_LEAF, instance, 0),
            NodeKind::PrimitiveLeaf { offset, count } => (TAG_PRIMITIVE_LEAF, offset, count),
        };
        PackedBvhNode {
            min: self.bbox.min.to_array(),
            tag,
            max: self.bbox.max.to_array(),
            left_data,
            right_data,
            _pad: 0,
        }
    }

    pub fn from_packed(packed: &PackedBvhNode) -> Result<Self> {
        let kind = match packed.tag {
            TAG_INTERNAL => NodeKind::Internal {
                left: packed.left_data,
                right: packed.right_data,
            },
            TAG_INSTANCE_LEAF => NodeKind::InstanceLeaf {
                instance: packed.left_data,
            },
            TAG_PRIMITIVE_LEAF => NodeKind::PrimitiveLeaf {
                offset: packed.left_data,
                count: packed.right_data,
            },
            tag => return Err(Error::corrupt(format!("unknown BVH node tag {tag}"))),
        };
        Ok(Self {
            bbox: BBox3f::new(Vec3::from_array(packed.min), Vec3::from_array(packed.max)),
            kind,
        })
    }
}

/// Wire form of [`BvhNode`] (40 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PackedBvhNode {
    pub min: [f32; 3],
    pub tag: u32,
    pub max: [f32; 3],
    pub left_data: u32,
    pub right_data: u32,
    pub _pad: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BBox3f {
        BBox3f::new(Vec3::ZERO, Vec3::ONE)
    }

    #[test]
    fn test_packed_size() {
        assert_eq!(std::mem::size_of::<PackedBvhNode>(), 40);
    }

    #[test]
    fn test_offset_only_moves_internal_nodes() {
        let mut inner = BvhNode::new(unit_box(), NodeKind::Internal { left: 1, right: 2 });
        let mut leaf = BvhNode::new(unit_box(), NodeKind::PrimitiveLeaf { offset: 4, count: 3 });
        let mut inst = BvhNode::new(unit_box(), NodeKind::InstanceLeaf { instance: 0 });

        inner.offset_child_nodes(10);
        leaf.offset_child_nodes(10);
        inst.offset_child_nodes(10);

        assert_eq!(inner.children(), Some((11, 12)));
        assert_eq!(leaf.kind, NodeKind::PrimitiveLeaf { offset: 4, count: 3 });
        assert_eq!(inst.kind, NodeKind::InstanceLeaf { instance: 0 });
    }

    #[test]
    fn test_instance_zero_is_still_a_leaf() {
        // Instance 0 must not decode as a reference to node 0.
        let node = BvhNode::new(unit_box(), NodeKind::InstanceLeaf { instance: 0 });
        let back = BvhNode::from_packed(&node.to_packed()).unwrap();
        assert!(back.is_leaf());
        assert_eq!(back, node);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut packed = BvhNode::new(unit_box(), NodeKind::Internal { left: 1, right: 2 }).to_packed();
        packed.tag = 7;
        assert!(matches!(
            BvhNode::from_packed(&packed),
            Err(Error::CorruptContainer(_))
        ));
    }
}
