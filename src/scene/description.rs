//! JSON scene description.
//!
//! A thin interchange form of [`RawScene`]:
//!
//! ```json
//! {
//!   "materials": [{ "name": "red", "expression": "diffuse(reflectance: {0.8, 0.1, 0.1})" }],
//!   "meshes": [{
//!     "name": "quad",
//!     "triangles": [{ "vertices": [[0,0,0], [1,0,0], [0,1,0]], "material": "red" }]
//!   }],
//!   "instances": [{ "mesh": 0, "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 2,0,0,1] }],
//!   "camera": { "fov": 60, "eye": [0,1,5], "look_at": [0,0,0] }
//! }
//! ```
//!
//! Transforms are column-major. Normals default to the face normal and UVs
//! to zero. Texture names in material expressions resolve relative to the
//! description file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::raw::{RawCamera, RawMaterial, RawMesh, RawMeshInstance, RawScene, RawTriangle};
use crate::material::ResourceContext;
use crate::util::{Error, Mat4, Result, Transform, Vec2, Vec3};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub materials: Vec<MaterialDescription>,
    pub meshes: Vec<MeshDescription>,
    pub instances: Vec<InstanceDescription>,
    pub camera: Option<CameraDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDescription {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshDescription {
    pub name: String,
    pub triangles: Vec<TriangleDescription>,
}

/// Material selector: an index into `materials` or a material name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaterialSelector {
    Index(u32),
    Name(String),
}

impl Default for MaterialSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleDescription {
    pub vertices: [Vec3; 3],
    #[serde(default)]
    pub normals: Option<[Vec3; 3]>,
    #[serde(default)]
    pub uvs: Option<[Vec2; 3]>,
    #[serde(default)]
    pub material: MaterialSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDescription {
    pub mesh: u32,
    #[serde(default)]
    pub transform: Option<Mat4>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDescription {
    pub fov: f32,
    pub eye: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
}

impl Default for CameraDescription {
    fn default() -> Self {
        let c = RawCamera::default();
        Self {
            fov: c.fov,
            eye: c.eye,
            look_at: c.look_at,
            up: c.up,
        }
    }
}

impl SceneDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a description file and build the raw scene, resolving textures
    /// relative to the file.
    pub fn load(path: impl AsRef<Path>) -> Result<RawScene> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Resource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let base = path.parent().unwrap_or(Path::new(""));
        Self::from_json(&text)?.into_raw(base)
    }

    /// Build the raw scene. Caches, inverse transforms and the material
    /// `used` flags are computed here.
    pub fn into_raw(self, base_dir: &Path) -> Result<RawScene> {
        let resources = ResourceContext::new(base_dir);
        let materials: Vec<RawMaterial> = self
            .materials
            .into_iter()
            .map(|m| RawMaterial::new(m.name, m.expression, resources.clone()))
            .collect();

        let mut meshes = Vec::with_capacity(self.meshes.len());
        for (mesh_index, mesh) in self.meshes.into_iter().enumerate() {
            let mut triangles = Vec::with_capacity(mesh.triangles.len());
            for (i, t) in mesh.triangles.into_iter().enumerate() {
                let material_index = match &t.material {
                    MaterialSelector::Index(index) => *index,
                    MaterialSelector::Name(name) => materials
                        .iter()
                        .position(|m| &m.name == name)
                        .ok_or_else(|| {
                            Error::invalid(format!(
                                "mesh {mesh_index} triangle {i}: unknown material `{name}`"
                            ))
                        })? as u32,
                };
                let normals = t
                    .normals
                    .unwrap_or_else(|| RawTriangle::flat(t.vertices, material_index).normals);
                let uvs = t.uvs.unwrap_or([Vec2::ZERO; 3]);
                let tri = RawTriangle::new(t.vertices, normals, uvs, material_index);
                triangles.push(tri);
            }
            let mut raw = RawMesh::new(mesh.name, triangles);
            raw.bbox();
            meshes.push(raw);
        }

        let mut mesh_instances = Vec::with_capacity(self.instances.len());
        for (i, inst) in self.instances.into_iter().enumerate() {
            let mesh = meshes.get(inst.mesh as usize).ok_or_else(|| {
                Error::invalid(format!("instance {i} references missing mesh {}", inst.mesh))
            })?;
            let transform = Transform::new(inst.transform.unwrap_or(Mat4::IDENTITY));
            mesh_instances.push(RawMeshInstance::new(inst.mesh, mesh, transform));
        }

        let camera = self
            .camera
            .map(|c| RawCamera {
                fov: c.fov,
                eye: c.eye,
                look_at: c.look_at,
                up: c.up,
            })
            .unwrap_or_default();

        let mut scene = RawScene {
            meshes,
            mesh_instances,
            materials,
            camera,
        };
        scene.mark_used_materials();
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = r#"{
        "materials": [
            { "name": "red", "expression": "diffuse(reflectance: {0.8, 0.1, 0.1})" },
            { "name": "spare", "expression": "diffuse()" }
        ],
        "meshes": [{
            "name": "quad",
            "triangles": [
                { "vertices": [[0,0,0], [1,0,0], [1,1,0]], "material": "red" },
                { "vertices": [[0,0,0], [1,1,0], [0,1,0]], "material": 0,
                  "uvs": [[0,0], [1,1], [0,1]] }
            ]
        }],
        "instances": [
            { "mesh": 0 },
            { "mesh": 0, "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 3,0,0,1] }
        ],
        "camera": { "fov": 60, "eye": [0,0,5] }
    }"#;

    #[test]
    fn test_into_raw() {
        let raw = SceneDescription::from_json(QUAD)
            .unwrap()
            .into_raw(Path::new("/scenes"))
            .unwrap();

        assert_eq!(raw.meshes.len(), 1);
        assert_eq!(raw.triangle_count(), 2);
        assert_eq!(raw.meshes[0].triangles[1].uvs[1], Vec2::ONE);
        assert_eq!(raw.meshes[0].triangles[0].normals[0], Vec3::Z);

        assert_eq!(raw.mesh_instances.len(), 2);
        assert_eq!(raw.mesh_instances[1].bbox().min, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(
            raw.mesh_instances[1].transform.inverse.transform_point3(Vec3::new(3.0, 0.0, 0.0)),
            Vec3::ZERO
        );

        assert!(raw.materials[0].used);
        assert!(!raw.materials[1].used);
        assert_eq!(raw.materials[0].resources.base_dir(), Path::new("/scenes"));

        assert_eq!(raw.camera.fov, 60.0);
        assert_eq!(raw.camera.eye, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(raw.camera.up, Vec3::Y);
    }

    #[test]
    fn test_unknown_references() {
        let text = r#"{ "meshes": [{ "name": "m", "triangles": [] }], "instances": [{ "mesh": 3 }] }"#;
        let err = SceneDescription::from_json(text)
            .unwrap()
            .into_raw(Path::new(""))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidScene(_)));

        let text = r#"{ "meshes": [{ "name": "m", "triangles": [
            { "vertices": [[0,0,0], [1,0,0], [0,1,0]], "material": "ghost" }
        ] }] }"#;
        let err = SceneDescription::from_json(text)
            .unwrap()
            .into_raw(Path::new(""))
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(SceneDescription::from_json("{ nope"), Err(Error::Json(_))));
    }
}
