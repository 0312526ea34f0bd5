//! Raw scene to compiled scene.
//!
//! Phases, in order:
//! 1. lower the used materials into the shared node array
//! 2. build the instance-level tree (one instance per leaf)
//! 3. build one triangle tree per mesh, splice it after the nodes built so
//!    far and write its triangles into the flat buffers in leaf order
//! 4. clone emissive triangles once per instance of their mesh
//! 5. derive the camera matrices

use std::time::Instant;

use super::camera::CompiledCamera;
use super::compiled::{CompiledInstance, EmissivePrimitive, Scene};
use super::raw::{RawMeshInstance, RawScene, RawTriangle, SCENE_DIFFUSE_MATERIAL, SCENE_EMISSIVE_MATERIAL};
use crate::bvh::{BoundsAccessor, BvhBuilder, BvhNode, NodeKind, SahStrategy};
use crate::config::CompileOptions;
use crate::material::MaterialCompiler;
use crate::util::{BBox3f, Error, Result, Vec2, Vec3, Vec4};

struct InstanceBounds;

impl BoundsAccessor<RawMeshInstance> for InstanceBounds {
    fn bbox(&self, item: &RawMeshInstance) -> BBox3f {
        item.bbox()
    }
    fn centroid(&self, item: &RawMeshInstance) -> Vec3 {
        item.centroid()
    }
}

struct TriangleBounds;

impl BoundsAccessor<RawTriangle> for TriangleBounds {
    fn bbox(&self, item: &RawTriangle) -> BBox3f {
        item.bbox()
    }
    fn centroid(&self, item: &RawTriangle) -> Vec3 {
        item.centroid()
    }
}

/// Per raw material: the node every triangle using it points at.
struct MaterialTable {
    roots: Vec<u32>,
    emissive: Vec<bool>,
    scene_diffuse: i32,
    scene_emissive: i32,
}

/// Emissive triangle of a mesh, in flattened primitive indices.
struct EmissiveTriangle {
    primitive_index: u32,
    material_node: u32,
    area: f32,
}

/// Flattened triangle soup, sized once for the whole scene.
struct TriangleBuffers {
    vertices: Vec<Vec4>,
    normals: Vec<Vec4>,
    uvs: Vec<Vec2>,
    material_indices: Vec<u32>,
    cursor: u32,
}

impl TriangleBuffers {
    fn with_triangles(count: usize) -> Self {
        Self {
            vertices: vec![Vec4::ZERO; 3 * count],
            normals: vec![Vec4::ZERO; 3 * count],
            uvs: vec![Vec2::ZERO; 3 * count],
            material_indices: vec![0; count],
            cursor: 0,
        }
    }

    /// Store `tri` at the cursor and advance it.
    fn write(&mut self, tri: &RawTriangle, material_node: u32) -> u32 {
        let slot = self.cursor as usize;
        for k in 0..3 {
            self.vertices[3 * slot + k] = tri.vertices[k].extend(1.0);
            self.normals[3 * slot + k] = tri.normals[k].extend(0.0);
            self.uvs[3 * slot + k] = tri.uvs[k];
        }
        self.material_indices[slot] = material_node;
        self.cursor += 1;
        slot as u32
    }
}

/// Compiles one raw scene.
pub struct SceneCompiler<'a> {
    raw: &'a RawScene,
    options: &'a CompileOptions,
    pool: Option<rayon::ThreadPool>,
}

impl<'a> SceneCompiler<'a> {
    pub fn new(raw: &'a RawScene, options: &'a CompileOptions) -> Result<Self> {
        options.check()?;
        Ok(Self {
            raw,
            options,
            pool: options.thread_pool()?,
        })
    }

    fn builder(&self, options: crate::bvh::BuildOptions) -> BvhBuilder<'_> {
        let builder = BvhBuilder::new(SahStrategy, options);
        match &self.pool {
            Some(pool) => builder.with_pool(pool),
            None => builder,
        }
    }

    #[tracing::instrument(name = "compile_scene", skip_all, fields(
        meshes = self.raw.meshes.len(),
        instances = self.raw.mesh_instances.len(),
        triangles = self.raw.triangle_count(),
    ))]
    pub fn compile(&self) -> Result<Scene> {
        let start = Instant::now();
        self.validate_input()?;

        let mut materials = MaterialCompiler::new(&self.raw.materials);
        let table = self.compile_materials(&mut materials)?;

        let mut bvh_nodes = self.build_instance_tree()?;
        let top_level_nodes = bvh_nodes.len();

        let mut buffers = TriangleBuffers::with_triangles(self.raw.triangle_count());
        let (mesh_roots, mesh_emitters) = self.build_mesh_trees(&table, &mut bvh_nodes, &mut buffers)?;

        let mesh_instances: Vec<CompiledInstance> = self
            .raw
            .mesh_instances
            .iter()
            .map(|inst| CompiledInstance {
                mesh_index: inst.mesh_index,
                bvh_root: mesh_roots[inst.mesh_index as usize],
                _pad: [0; 2],
                inverse_transform: inst.transform.inverse,
            })
            .collect();

        let emissive_primitives = self.clone_emitters(&table, &mesh_emitters);
        let camera = CompiledCamera::new(&self.raw.camera, self.options.aspect_ratio);

        let (material_nodes, texture_data, texture_metadata) = materials.finish();
        let scene = Scene {
            bvh_nodes,
            mesh_instances,
            material_nodes,
            emissive_primitives,
            texture_data,
            texture_metadata,
            vertices: buffers.vertices,
            normals: buffers.normals,
            uvs: buffers.uvs,
            material_indices: buffers.material_indices,
            scene_diffuse_mat_index: table.scene_diffuse,
            scene_emissive_mat_index: table.scene_emissive,
            camera,
        };

        if cfg!(debug_assertions) {
            scene.validate()?;
        }

        tracing::info!(
            top_level_nodes,
            bvh_nodes = scene.bvh_nodes.len(),
            material_nodes = scene.material_nodes.len(),
            emitters = scene.emissive_primitives.len(),
            textures = scene.texture_metadata.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "scene compiled"
        );
        Ok(scene)
    }

    fn validate_input(&self) -> Result<()> {
        let raw = self.raw;
        if raw.mesh_instances.is_empty() {
            return Err(Error::EmptyScene);
        }
        for (i, inst) in raw.mesh_instances.iter().enumerate() {
            if inst.mesh_index as usize >= raw.meshes.len() {
                return Err(Error::invalid(format!(
                    "instance {i} references mesh {} of {}",
                    inst.mesh_index,
                    raw.meshes.len()
                )));
            }
        }
        for mesh in &raw.meshes {
            if let Some(t) = mesh
                .triangles
                .iter()
                .find(|t| t.material_index as usize >= raw.materials.len())
            {
                return Err(Error::invalid(format!(
                    "mesh `{}` uses material {} of {}",
                    mesh.name,
                    t.material_index,
                    raw.materials.len()
                )));
            }
        }
        Ok(())
    }

    fn compile_materials(&self, compiler: &mut MaterialCompiler<'_>) -> Result<MaterialTable> {
        let _span = tracing::info_span!("compile_materials").entered();
        let start = Instant::now();
        let raw = self.raw;

        let mut referenced = vec![false; raw.materials.len()];
        for tri in raw.meshes.iter().flat_map(|m| &m.triangles) {
            referenced[tri.material_index as usize] = true;
        }

        let mut resolved: Vec<Option<u32>> = vec![None; raw.materials.len()];
        let mut failed = 0usize;
        for (i, material) in raw.materials.iter().enumerate() {
            let scene_material = material.name == SCENE_DIFFUSE_MATERIAL || material.name == SCENE_EMISSIVE_MATERIAL;
            if !(material.used || referenced[i] || scene_material) {
                continue;
            }
            match compiler.compile(i) {
                Ok(root) => resolved[i] = Some(root),
                Err(e) if self.options.strict_materials => return Err(e),
                Err(e) => {
                    failed += 1;
                    tracing::error!(material = %material.name, "{e}");
                }
            }
        }

        let scene_root = |name: &str| {
            raw.find_material(name)
                .and_then(|i| resolved[i])
                .map_or(-1, |root| root as i32)
        };
        let scene_diffuse = scene_root(SCENE_DIFFUSE_MATERIAL);
        let scene_emissive = scene_root(SCENE_EMISSIVE_MATERIAL);

        let needs_fallback = (0..raw.materials.len()).any(|i| referenced[i] && resolved[i].is_none());
        let fallback = if needs_fallback {
            tracing::warn!("some geometry uses materials that failed to compile, substituting a default diffuse");
            Some(compiler.fallback_node())
        } else {
            None
        };

        let roots: Vec<u32> = resolved
            .iter()
            .map(|r| r.or(fallback).unwrap_or(0))
            .collect();
        let emissive: Vec<bool> = resolved
            .iter()
            .map(|r| r.is_some_and(|root| compiler.is_emissive(root)))
            .collect();

        tracing::info!(
            compiled = resolved.iter().filter(|r| r.is_some()).count(),
            failed,
            nodes = compiler.nodes().len(),
            textures = compiler.textures().len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "materials compiled"
        );

        Ok(MaterialTable {
            roots,
            emissive,
            scene_diffuse,
            scene_emissive,
        })
    }

    fn build_instance_tree(&self) -> Result<Vec<BvhNode>> {
        let _span = tracing::info_span!("build_instance_tree").entered();
        let built = self
            .builder(self.options.instance_build_options())
            .build(&self.raw.mesh_instances, &InstanceBounds, |indices| NodeKind::InstanceLeaf {
                instance: indices[0],
            })?;
        debug_assert_eq!(built.root, 0);
        Ok(built.nodes)
    }

    /// Returns the root of every mesh tree and every mesh's emissive
    /// triangles.
    fn build_mesh_trees(
        &self,
        table: &MaterialTable,
        bvh_nodes: &mut Vec<BvhNode>,
        buffers: &mut TriangleBuffers,
    ) -> Result<(Vec<u32>, Vec<Vec<EmissiveTriangle>>)> {
        let _span = tracing::info_span!("build_mesh_trees").entered();
        let start = Instant::now();
        let builder = self.builder(self.options.mesh_build_options());

        let mut roots = Vec::with_capacity(self.raw.meshes.len());
        let mut emitters = Vec::with_capacity(self.raw.meshes.len());

        for mesh in &self.raw.meshes {
            let offset = bvh_nodes.len() as u32;
            let mut mesh_emitters = Vec::new();

            if mesh.triangles.is_empty() {
                tracing::warn!(mesh = %mesh.name, "mesh has no triangles");
                bvh_nodes.push(BvhNode::new(
                    BBox3f::EMPTY,
                    NodeKind::PrimitiveLeaf {
                        offset: buffers.cursor,
                        count: 0,
                    },
                ));
                roots.push(offset);
                emitters.push(mesh_emitters);
                continue;
            }

            let built = builder.build(&mesh.triangles, &TriangleBounds, |indices| {
                let first = buffers.cursor;
                for &i in indices {
                    let tri = &mesh.triangles[i as usize];
                    let m = tri.material_index as usize;
                    let material_node = table.roots[m];
                    let primitive_index = buffers.write(tri, material_node);
                    if table.emissive[m] {
                        mesh_emitters.push(EmissiveTriangle {
                            primitive_index,
                            material_node,
                            area: tri.area(),
                        });
                    }
                }
                NodeKind::PrimitiveLeaf {
                    offset: first,
                    count: indices.len() as u32,
                }
            })?;

            tracing::debug!(
                mesh = %mesh.name,
                triangles = mesh.triangles.len(),
                nodes = built.nodes.len(),
                depth = built.stats.max_depth,
                "mesh tree built"
            );

            bvh_nodes.extend(built.nodes.into_iter().map(|mut node| {
                node.offset_child_nodes(offset);
                node
            }));
            roots.push(offset + built.root);
            emitters.push(mesh_emitters);
        }

        tracing::info!(
            meshes = roots.len(),
            nodes = bvh_nodes.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "mesh trees built"
        );
        Ok((roots, emitters))
    }

    fn clone_emitters(&self, table: &MaterialTable, mesh_emitters: &[Vec<EmissiveTriangle>]) -> Vec<EmissivePrimitive> {
        let mut out = Vec::new();
        for inst in &self.raw.mesh_instances {
            for tri in &mesh_emitters[inst.mesh_index as usize] {
                out.push(EmissivePrimitive::area_light(
                    inst.transform.matrix,
                    tri.area,
                    tri.primitive_index,
                    tri.material_node,
                ));
            }
        }

        if table.scene_emissive >= 0 {
            out.push(EmissivePrimitive::environment(table.scene_emissive as u32));
        }

        if out.is_empty() {
            tracing::warn!("scene has no emissive primitives, output will appear black");
        }
        out
    }
}

/// Compile `raw` with `options`.
pub fn compile(raw: &RawScene, options: &CompileOptions) -> Result<Scene> {
    SceneCompiler::new(raw, options)?.compile()
}
