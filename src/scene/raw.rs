//! Editable input scene.

use crate::material::ResourceContext;
use crate::util::{BBox3f, Transform, Vec2, Vec3};

/// Material used as a fallback surface for the whole scene.
pub const SCENE_DIFFUSE_MATERIAL: &str = "scene_diffuse_material";
/// Material used as the environment emitter.
pub const SCENE_EMISSIVE_MATERIAL: &str = "scene_emissive_material";

#[derive(Debug, Clone, PartialEq)]
pub struct RawTriangle {
    pub vertices: [Vec3; 3],
    pub normals: [Vec3; 3],
    pub uvs: [Vec2; 3],
    pub material_index: u32,
    bbox: BBox3f,
    centroid: Vec3,
}

impl RawTriangle {
    pub fn new(vertices: [Vec3; 3], normals: [Vec3; 3], uvs: [Vec2; 3], material_index: u32) -> Self {
        let bbox = BBox3f::from_points(vertices);
        Self {
            vertices,
            normals,
            uvs,
            material_index,
            bbox,
            centroid: bbox.center(),
        }
    }

    /// Triangle with the face normal at every vertex and zero UVs.
    pub fn flat(vertices: [Vec3; 3], material_index: u32) -> Self {
        let n = (vertices[1] - vertices[0])
            .cross(vertices[2] - vertices[0])
            .normalize_or_zero();
        Self::new(vertices, [n; 3], [Vec2::ZERO; 3], material_index)
    }

    #[inline]
    pub fn bbox(&self) -> BBox3f {
        self.bbox
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    pub fn area(&self) -> f32 {
        crate::util::triangle_area(self.vertices[0], self.vertices[1], self.vertices[2])
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawMesh {
    pub name: String,
    pub triangles: Vec<RawTriangle>,
    bbox: BBox3f,
    bbox_dirty: bool,
}

impl RawMesh {
    pub fn new(name: impl Into<String>, triangles: Vec<RawTriangle>) -> Self {
        Self {
            name: name.into(),
            triangles,
            bbox: BBox3f::EMPTY,
            bbox_dirty: true,
        }
    }

    /// Object-space bounds, recomputed if the triangles changed.
    pub fn bbox(&mut self) -> BBox3f {
        if self.bbox_dirty {
            self.bbox = self
                .triangles
                .iter()
                .fold(BBox3f::EMPTY, |b, t| b.union(&t.bbox()));
            self.bbox_dirty = false;
        }
        self.bbox
    }

    /// Bounds without touching the cache.
    pub fn compute_bbox(&self) -> BBox3f {
        if !self.bbox_dirty {
            return self.bbox;
        }
        self.triangles
            .iter()
            .fold(BBox3f::EMPTY, |b, t| b.union(&t.bbox()))
    }

    pub fn mark_bbox_dirty(&mut self) {
        self.bbox_dirty = true;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMeshInstance {
    pub mesh_index: u32,
    pub transform: Transform,
    bbox: BBox3f,
    centroid: Vec3,
}

impl RawMeshInstance {
    /// Place `mesh` (whose index is `mesh_index`) with `transform`.
    pub fn new(mesh_index: u32, mesh: &RawMesh, transform: Transform) -> Self {
        let bbox = mesh.compute_bbox().transformed(&transform.matrix);
        // An empty mesh still needs a finite position in the instance tree.
        let centroid = if bbox.is_empty() {
            transform.matrix.w_axis.truncate()
        } else {
            bbox.center()
        };
        Self {
            mesh_index,
            transform,
            bbox,
            centroid,
        }
    }

    /// World-space bounds.
    #[inline]
    pub fn bbox(&self) -> BBox3f {
        self.bbox
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMaterial {
    pub name: String,
    /// Material expression text.
    pub expression: String,
    pub resources: ResourceContext,
    pub used: bool,
}

impl RawMaterial {
    pub fn new(name: impl Into<String>, expression: impl Into<String>, resources: ResourceContext) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            resources,
            used: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub eye: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
}

impl Default for RawCamera {
    fn default() -> Self {
        Self {
            fov: 45.0,
            eye: Vec3::ZERO,
            look_at: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawScene {
    pub meshes: Vec<RawMesh>,
    pub mesh_instances: Vec<RawMeshInstance>,
    pub materials: Vec<RawMaterial>,
    pub camera: RawCamera,
}

impl RawScene {
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.triangles.len()).sum()
    }

    pub fn find_material(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.name == name)
    }

    /// Flag materials referenced by geometry and the two scene materials.
    pub fn mark_used_materials(&mut self) {
        for m in &mut self.materials {
            m.used = m.name == SCENE_DIFFUSE_MATERIAL || m.name == SCENE_EMISSIVE_MATERIAL;
        }
        for mesh in &self.meshes {
            for tri in &mesh.triangles {
                if let Some(m) = self.materials.get_mut(tri.material_index as usize) {
                    m.used = true;
                }
            }
        }
    }

    /// Move used materials to the front, keeping relative order, and remap
    /// triangle material indices. Unused materials stay in the list so they
    /// can still be referenced by name. Returns the number of unused
    /// materials.
    pub fn prune_unused_materials(&mut self) -> usize {
        self.mark_used_materials();

        let (used, unused): (Vec<usize>, Vec<usize>) = (0..self.materials.len()).partition(|&i| self.materials[i].used);
        let order: Vec<usize> = used.iter().chain(&unused).copied().collect();

        let mut remap = vec![0u32; order.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new as u32;
        }

        let mut old = std::mem::take(&mut self.materials)
            .into_iter()
            .map(Some)
            .collect::<Vec<_>>();
        self.materials = order.iter().filter_map(|&i| old[i].take()).collect();

        for mesh in &mut self.meshes {
            for tri in &mut mesh.triangles {
                if let Some(&m) = remap.get(tri.material_index as usize) {
                    tri.material_index = m;
                }
            }
        }

        unused.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Mat4;

    fn tri(material_index: u32) -> RawTriangle {
        RawTriangle::flat([Vec3::ZERO, Vec3::X, Vec3::Y], material_index)
    }

    fn material(name: &str) -> RawMaterial {
        RawMaterial::new(name, "diffuse()", ResourceContext::default())
    }

    #[test]
    fn test_triangle_cache() {
        let t = tri(0);
        assert_eq!(t.bbox(), BBox3f::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)));
        assert_eq!(t.normals[0], Vec3::Z);
        assert_eq!(t.area(), 0.5);
    }

    #[test]
    fn test_mesh_bbox_dirty() {
        let mut mesh = RawMesh::new("m", vec![tri(0)]);
        assert_eq!(mesh.bbox().max, Vec3::new(1.0, 1.0, 0.0));
        mesh.triangles.push(RawTriangle::flat([Vec3::ZERO, Vec3::splat(2.0), Vec3::X], 0));
        assert_eq!(mesh.bbox().max, Vec3::new(1.0, 1.0, 0.0));
        mesh.mark_bbox_dirty();
        assert_eq!(mesh.bbox().max, Vec3::splat(2.0));
    }

    #[test]
    fn test_instance_world_bbox() {
        let mesh = RawMesh::new("m", vec![tri(0)]);
        let inst = RawMeshInstance::new(0, &mesh, Transform::new(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0))));
        assert_eq!(inst.bbox().min, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(inst.centroid(), Vec3::new(5.5, 0.5, 0.0));
    }

    #[test]
    fn test_prune_orders_used_first() {
        let mut scene = RawScene {
            meshes: vec![RawMesh::new("m", vec![tri(2), tri(0)])],
            materials: vec![
                material("a"),
                material("unused"),
                material("c"),
                material(SCENE_EMISSIVE_MATERIAL),
                material("also_unused"),
            ],
            ..Default::default()
        };

        assert_eq!(scene.prune_unused_materials(), 2);
        let names: Vec<&str> = scene.materials.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a", "c", SCENE_EMISSIVE_MATERIAL, "unused", "also_unused"]);

        let indices: Vec<u32> = scene.meshes[0].triangles.iter().map(|t| t.material_index).collect();
        assert_eq!(indices, [1, 0]);
        assert!(scene.materials[..3].iter().all(|m| m.used));
        assert!(!scene.materials[3].used);
    }
}
