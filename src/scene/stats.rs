//! Summary statistics for raw and compiled scenes.

use std::fmt;

use super::compiled::{EmissiveKind, Scene};
use super::raw::RawScene;
use crate::bvh::NodeKind;

/// Node, leaf and depth counts of one BVH level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneStats {
    pub top_level: TreeStats,
    pub bottom_level: TreeStats,
    pub instances: usize,
    pub triangles: usize,
    pub material_nodes: usize,
    pub area_lights: usize,
    pub environment_lights: usize,
    pub textures: usize,
    pub texture_bytes: usize,
    pub geometry_bytes: usize,
}

impl SceneStats {
    pub fn from_scene(scene: &Scene) -> Self {
        let nodes = &scene.bvh_nodes;

        let walk = |root: u32, stats: &mut TreeStats| {
            let mut stack = vec![(root, 1usize)];
            while let Some((index, depth)) = stack.pop() {
                let Some(node) = nodes.get(index as usize) else {
                    continue;
                };
                stats.nodes += 1;
                stats.max_depth = stats.max_depth.max(depth);
                match node.kind {
                    NodeKind::Internal { left, right } => {
                        stack.push((left, depth + 1));
                        stack.push((right, depth + 1));
                    }
                    NodeKind::InstanceLeaf { .. } | NodeKind::PrimitiveLeaf { .. } => stats.leaves += 1,
                }
            }
        };

        let mut top_level = TreeStats::default();
        if !nodes.is_empty() {
            walk(0, &mut top_level);
        }

        // Instances of one mesh share a tree; count each tree once.
        let mut roots: Vec<u32> = scene.mesh_instances.iter().map(|i| i.bvh_root).collect();
        roots.sort_unstable();
        roots.dedup();
        let mut bottom_level = TreeStats::default();
        for root in roots {
            let mut tree = TreeStats::default();
            walk(root, &mut tree);
            bottom_level.nodes += tree.nodes;
            bottom_level.leaves += tree.leaves;
            bottom_level.max_depth = bottom_level.max_depth.max(tree.max_depth);
        }

        let environment_lights = scene
            .emissive_primitives
            .iter()
            .filter(|e| e.kind() == Some(EmissiveKind::Environment))
            .count();

        Self {
            top_level,
            bottom_level,
            instances: scene.mesh_instances.len(),
            triangles: scene.triangle_count(),
            material_nodes: scene.material_nodes.len(),
            area_lights: scene.emissive_primitives.len() - environment_lights,
            environment_lights,
            textures: scene.texture_metadata.len(),
            texture_bytes: scene.texture_data.len(),
            geometry_bytes: std::mem::size_of_val(scene.vertices.as_slice())
                + std::mem::size_of_val(scene.normals.as_slice())
                + std::mem::size_of_val(scene.uvs.as_slice())
                + std::mem::size_of_val(scene.material_indices.as_slice()),
        }
    }
}

impl fmt::Display for SceneStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compiled scene:")?;
        writeln!(
            f,
            "  top-level BVH:    {} nodes, {} leaves, depth {}",
            self.top_level.nodes, self.top_level.leaves, self.top_level.max_depth
        )?;
        writeln!(
            f,
            "  bottom-level BVH: {} nodes, {} leaves, depth {}",
            self.bottom_level.nodes, self.bottom_level.leaves, self.bottom_level.max_depth
        )?;
        writeln!(f, "  instances:        {}", self.instances)?;
        writeln!(f, "  triangles:        {}", self.triangles)?;
        writeln!(f, "  material nodes:   {}", self.material_nodes)?;
        writeln!(
            f,
            "  emitters:         {} area, {} environment",
            self.area_lights, self.environment_lights
        )?;
        writeln!(f, "  textures:         {} ({} bytes)", self.textures, self.texture_bytes)?;
        write!(f, "  geometry:         {} bytes", self.geometry_bytes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawStats {
    pub meshes: usize,
    pub instances: usize,
    pub triangles: usize,
    pub materials: usize,
    pub used_materials: usize,
}

impl RawStats {
    pub fn from_raw(scene: &RawScene) -> Self {
        Self {
            meshes: scene.meshes.len(),
            instances: scene.mesh_instances.len(),
            triangles: scene.triangle_count(),
            materials: scene.materials.len(),
            used_materials: scene.materials.iter().filter(|m| m.used).count(),
        }
    }
}

impl fmt::Display for RawStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scene description:")?;
        writeln!(f, "  meshes:    {}", self.meshes)?;
        writeln!(f, "  instances: {}", self.instances)?;
        writeln!(f, "  triangles: {}", self.triangles)?;
        write!(f, "  materials: {} ({} used)", self.materials, self.used_materials)
    }
}
