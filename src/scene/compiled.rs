//! Flattened, trace-ready scene.

use bytemuck::{Pod, Zeroable};

use super::camera::CompiledCamera;
use crate::bvh::{BvhNode, NodeKind};
use crate::material::{MaterialNode, TextureFormat, TextureMetadata};
use crate::util::{Error, Mat4, Result, Vec2, Vec4};

/// Placement of one mesh in the top-level tree (80 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompiledInstance {
    pub mesh_index: u32,
    /// Root of the mesh's bottom-level tree in `Scene::bvh_nodes`.
    pub bvh_root: u32,
    pub _pad: [u32; 2],
    /// World to object.
    pub inverse_transform: Mat4,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissiveKind {
    Area = 0,
    Environment = 1,
}

/// Light source record (80 bytes).
///
/// Area lights are one per emissive triangle per instance. The environment
/// record has an identity transform, zero area and `primitive_index == u32::MAX`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EmissivePrimitive {
    /// Object to world of the owning instance.
    pub transform: Mat4,
    /// Object-space triangle area.
    pub area: f32,
    pub primitive_index: u32,
    pub material_node: u32,
    pub kind: u32,
}

impl EmissivePrimitive {
    pub fn area_light(transform: Mat4, area: f32, primitive_index: u32, material_node: u32) -> Self {
        Self {
            transform,
            area,
            primitive_index,
            material_node,
            kind: EmissiveKind::Area as u32,
        }
    }

    pub fn environment(material_node: u32) -> Self {
        Self {
            transform: Mat4::IDENTITY,
            area: 0.0,
            primitive_index: u32::MAX,
            material_node,
            kind: EmissiveKind::Environment as u32,
        }
    }

    pub fn kind(&self) -> Option<EmissiveKind> {
        match self.kind {
            0 => Some(EmissiveKind::Area),
            1 => Some(EmissiveKind::Environment),
            _ => None,
        }
    }
}

/// Compiled scene.
///
/// `bvh_nodes` holds the top-level tree first (root at 0) followed by every
/// bottom-level tree. Triangle data is stored as a flat soup, three entries
/// per triangle in `vertices`, `normals` and `uvs`, in bottom-level leaf
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub bvh_nodes: Vec<BvhNode>,
    pub mesh_instances: Vec<CompiledInstance>,
    pub material_nodes: Vec<MaterialNode>,
    pub emissive_primitives: Vec<EmissivePrimitive>,
    pub texture_data: Vec<u8>,
    pub texture_metadata: Vec<TextureMetadata>,
    pub vertices: Vec<Vec4>,
    pub normals: Vec<Vec4>,
    pub uvs: Vec<Vec2>,
    /// Material root per triangle.
    pub material_indices: Vec<u32>,
    pub scene_diffuse_mat_index: i32,
    pub scene_emissive_mat_index: i32,
    pub camera: CompiledCamera,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            bvh_nodes: Vec::new(),
            mesh_instances: Vec::new(),
            material_nodes: Vec::new(),
            emissive_primitives: Vec::new(),
            texture_data: Vec::new(),
            texture_metadata: Vec::new(),
            vertices: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            material_indices: Vec::new(),
            scene_diffuse_mat_index: -1,
            scene_emissive_mat_index: -1,
            camera: CompiledCamera::default(),
        }
    }
}

impl Scene {
    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Check structural invariants, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        let tris = self.triangle_count();
        let node_count = self.bvh_nodes.len();
        let material_count = self.material_nodes.len();

        if self.vertices.len() % 3 != 0 {
            return Err(Error::invalid(format!("{} vertices is not a whole number of triangles", self.vertices.len())));
        }
        if self.normals.len() != self.vertices.len() || self.uvs.len() != self.vertices.len() {
            return Err(Error::invalid("normal/uv count differs from vertex count"));
        }
        if self.material_indices.len() != tris {
            return Err(Error::invalid(format!(
                "{} material indices for {tris} triangles",
                self.material_indices.len()
            )));
        }
        if let Some(m) = self.material_indices.iter().find(|&&m| m as usize >= material_count) {
            return Err(Error::invalid(format!("triangle material {m} out of range")));
        }

        if !self.mesh_instances.is_empty() && node_count == 0 {
            return Err(Error::invalid("instances without a BVH"));
        }
        for (i, node) in self.bvh_nodes.iter().enumerate() {
            match node.kind {
                NodeKind::Internal { left, right } => {
                    if left as usize >= node_count || right as usize >= node_count {
                        return Err(Error::invalid(format!("BVH node {i} has a child out of range")));
                    }
                }
                NodeKind::InstanceLeaf { instance } => {
                    if instance as usize >= self.mesh_instances.len() {
                        return Err(Error::invalid(format!("BVH node {i} references missing instance {instance}")));
                    }
                }
                NodeKind::PrimitiveLeaf { offset, count } => {
                    let end = offset as u64 + count as u64;
                    if end > tris as u64 {
                        return Err(Error::invalid(format!(
                            "BVH node {i} covers triangles {offset}..{end} of {tris}"
                        )));
                    }
                }
            }
        }
        check_acyclic("BVH", node_count, |i| {
            self.bvh_nodes[i].children().map(|(l, r)| [l, r]).into_iter().flatten()
        })?;

        for (i, inst) in self.mesh_instances.iter().enumerate() {
            if inst.bvh_root as usize >= node_count {
                return Err(Error::invalid(format!("instance {i} has BVH root out of range")));
            }
        }

        for (i, node) in self.material_nodes.iter().enumerate() {
            if node.kind().is_none() {
                return Err(Error::invalid(format!("material node {i} has unknown type {}", node.node_type)));
            }
            if node.children().iter().any(|&c| c as usize >= material_count) {
                return Err(Error::invalid(format!("material node {i} has a child out of range")));
            }
            let textures = if node.kind().is_some_and(|k| k.is_bxdf()) {
                &node.slots[..]
            } else {
                &node.slots[2..]
            };
            if textures
                .iter()
                .any(|&t| t < -1 || t >= self.texture_metadata.len() as i32)
            {
                return Err(Error::invalid(format!("material node {i} has a texture out of range")));
            }
        }
        check_acyclic("material", material_count, |i| self.material_nodes[i].children())?;

        for (i, meta) in self.texture_metadata.iter().enumerate() {
            let format = TextureFormat::from_u32(meta.format)
                .ok_or_else(|| Error::invalid(format!("texture {i} has unknown format {}", meta.format)))?;
            let end = (meta.width as u64 * meta.height as u64)
                .checked_mul(format.bytes_per_pixel() as u64)
                .and_then(|size| meta.offset.checked_add(size));
            if meta.offset % 4 != 0 || !end.is_some_and(|end| end <= self.texture_data.len() as u64) {
                return Err(Error::invalid(format!("texture {i} lies outside the texture data")));
            }
        }

        for (i, e) in self.emissive_primitives.iter().enumerate() {
            let in_range = match e.kind() {
                Some(EmissiveKind::Area) => (e.primitive_index as usize) < tris,
                Some(EmissiveKind::Environment) => e.primitive_index == u32::MAX,
                None => false,
            };
            if !in_range || e.material_node as usize >= material_count {
                return Err(Error::invalid(format!("emissive primitive {i} is malformed")));
            }
        }

        for (name, index) in [
            ("scene diffuse", self.scene_diffuse_mat_index),
            ("scene emissive", self.scene_emissive_mat_index),
        ] {
            if index < -1 || index >= material_count as i32 {
                return Err(Error::invalid(format!("{name} material index {index} out of range")));
            }
        }

        Ok(())
    }
}

/// Depth-first search with visiting marks over `count` nodes.
fn check_acyclic<I>(what: &str, count: usize, children: impl Fn(usize) -> I) -> Result<()>
where
    I: IntoIterator<Item = u32>,
{
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Visiting,
        Done,
    }

    let mut marks = vec![Mark::New; count];
    for start in 0..count {
        if marks[start] != Mark::New {
            continue;
        }
        // (node, children already pushed)
        let mut stack = vec![(start, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                marks[node] = Mark::Done;
                continue;
            }
            if marks[node] == Mark::Done {
                continue;
            }
            marks[node] = Mark::Visiting;
            stack.push((node, true));
            for c in children(node) {
                let c = c as usize;
                match marks[c] {
                    Mark::Visiting => {
                        return Err(Error::invalid(format!("cycle in {what} tree through node {c}")))
                    }
                    Mark::New => stack.push((c, false)),
                    Mark::Done => {}
                }
            }
        }
    }
    Ok(())
}
