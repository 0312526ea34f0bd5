//! End-to-end compilation tests: JSON description in, compiled scene out.

use std::path::{Path, PathBuf};

use scenebake::bvh::NodeKind;
use scenebake::material::TextureFormat;
use scenebake::prelude::*;
use scenebake::scene::{EmissiveKind, SCENE_DIFFUSE_MATERIAL, SCENE_EMISSIVE_MATERIAL};
use scenebake::util::{ValidationError, Vec3};
use scenebake::{compile_file, scene_stats, Stats};
use serde_json::{json, Value};

fn write_description(dir: &Path, description: &Value) -> PathBuf {
    let path = dir.join("scene.json");
    std::fs::write(&path, serde_json::to_string_pretty(description).unwrap()).unwrap();
    path
}

fn load(dir: &Path, description: &Value) -> RawScene {
    SceneDescription::load(write_description(dir, description)).unwrap()
}

/// Row of `n` unit triangles along +x, all using `material`.
fn strip(n: usize, material: &str) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let x = i as f32 * 1.5;
            json!({
                "vertices": [[x, 0.0, 0.0], [x + 1.0, 0.0, 0.0], [x, 1.0, (i % 3) as f32]],
                "material": material
            })
        })
        .collect()
}

fn translate(x: f32, y: f32, z: f32) -> Value {
    json!([1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, x, y, z, 1])
}

fn basic_scene() -> Value {
    json!({
        "materials": [
            { "name": "white", "expression": "diffuse(reflectance: {0.7, 0.7, 0.7})" },
            { "name": "light", "expression": "emissive(radiance: {4, 4, 4}, scale: 2)" },
            { "name": "chrome", "expression": "roughConductor(intIOR: \"gold\", roughness: 0.2)" }
        ],
        "meshes": [
            { "name": "floor", "triangles": strip(40, "white") },
            { "name": "lamp", "triangles": strip(2, "light") },
            { "name": "ball", "triangles": strip(25, "chrome") }
        ],
        "instances": [
            { "mesh": 0 },
            { "mesh": 1, "transform": translate(0.0, 5.0, 0.0) },
            { "mesh": 1, "transform": translate(10.0, 5.0, 0.0) },
            { "mesh": 1, "transform": translate(20.0, 5.0, 0.0) },
            { "mesh": 2, "transform": translate(3.0, 1.0, -2.0) }
        ],
        "camera": { "fov": 50, "eye": [0, 2, 10], "look_at": [0, 0, 0] }
    })
}

/// Every node's bounds contain its children's bounds.
fn assert_bounded(scene: &Scene) {
    for (i, node) in scene.bvh_nodes.iter().enumerate() {
        if let Some((l, r)) = node.children() {
            for c in [l, r] {
                let child = &scene.bvh_nodes[c as usize];
                assert!(
                    child.bbox.is_empty() || node.bbox.contains_box(&child.bbox),
                    "node {i} does not contain child {c}"
                );
            }
        }
    }
}

/// Leaves of the mesh trees cover every triangle exactly once.
fn assert_triangles_covered(scene: &Scene) {
    let mut roots: Vec<u32> = scene.mesh_instances.iter().map(|i| i.bvh_root).collect();
    roots.sort_unstable();
    roots.dedup();

    let mut seen = vec![0u32; scene.triangle_count()];
    for root in roots {
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            match scene.bvh_nodes[index as usize].kind {
                NodeKind::Internal { left, right } => stack.extend([left, right]),
                NodeKind::PrimitiveLeaf { offset, count } => {
                    for t in offset..offset + count {
                        seen[t as usize] += 1;
                    }
                }
                NodeKind::InstanceLeaf { .. } => panic!("instance leaf inside a mesh tree"),
            }
        }
    }
    assert!(seen.iter().all(|&n| n == 1), "coverage: {seen:?}");
}

#[test]
fn test_compiled_scene_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let raw = load(dir.path(), &basic_scene());
    let scene = compile(&raw, &CompileOptions::default()).unwrap();

    scene.validate().unwrap();
    assert_bounded(&scene);
    assert_triangles_covered(&scene);

    assert_eq!(scene.triangle_count(), 67);
    assert_eq!(scene.mesh_instances.len(), 5);

    // Top-level tree: one instance per leaf, rooted at 0.
    let instance_leaves: Vec<u32> = scene
        .bvh_nodes
        .iter()
        .filter_map(|n| match n.kind {
            NodeKind::InstanceLeaf { instance } => Some(instance),
            _ => None,
        })
        .collect();
    let mut sorted = instance_leaves.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, [0, 1, 2, 3, 4]);

    // Instances of one mesh share its tree.
    assert_eq!(scene.mesh_instances[1].bvh_root, scene.mesh_instances[3].bvh_root);
    assert_ne!(scene.mesh_instances[0].bvh_root, scene.mesh_instances[1].bvh_root);

    // No compiled scene material was named.
    assert_eq!(scene.scene_diffuse_mat_index, -1);
    assert_eq!(scene.scene_emissive_mat_index, -1);
}

#[test]
fn test_emissive_cloned_per_instance() {
    let dir = tempfile::tempdir().unwrap();
    let raw = load(dir.path(), &basic_scene());
    let scene = compile(&raw, &CompileOptions::default()).unwrap();

    // 2 emissive triangles x 3 lamp instances, no environment.
    assert_eq!(scene.emissive_primitives.len(), 6);
    for e in &scene.emissive_primitives {
        assert_eq!(e.kind(), Some(EmissiveKind::Area));
        assert!(e.area > 0.0);
        let m = scene.material_indices[e.primitive_index as usize];
        assert_eq!(m, e.material_node);
    }

    let xs: Vec<f32> = scene
        .emissive_primitives
        .iter()
        .map(|e| e.transform.w_axis.x)
        .collect();
    assert_eq!(xs, [0.0, 0.0, 10.0, 10.0, 20.0, 20.0]);
}

#[test]
fn test_environment_emitter_last() {
    let dir = tempfile::tempdir().unwrap();
    let mut description = basic_scene();
    description["materials"].as_array_mut().unwrap().push(json!({
        "name": SCENE_EMISSIVE_MATERIAL,
        "expression": "emissive(radiance: {0.2, 0.3, 0.5})"
    }));
    let raw = load(dir.path(), &description);
    let scene = compile(&raw, &CompileOptions::default()).unwrap();

    assert!(scene.scene_emissive_mat_index >= 0);
    let last = scene.emissive_primitives.last().unwrap();
    assert_eq!(last.kind(), Some(EmissiveKind::Environment));
    assert_eq!(last.primitive_index, u32::MAX);
    assert_eq!(last.material_node, scene.scene_emissive_mat_index as u32);
    assert_eq!(scene.emissive_primitives.len(), 7);
}

#[test]
fn test_compile_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let raw = load(dir.path(), &basic_scene());

    let a = compile(&raw, &CompileOptions::default()).unwrap();
    let b = compile(&raw, &CompileOptions::default()).unwrap();
    assert_eq!(a, b);
    assert_eq!(to_bytes(&a, 6).unwrap(), to_bytes(&b, 6).unwrap());

    // A dedicated pool scores the same candidates.
    let pooled = CompileOptions {
        worker_threads: 3,
        ..Default::default()
    };
    assert_eq!(compile(&raw, &pooled).unwrap(), a);
}

#[test]
fn test_texture_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let img = image::RgbaImage::from_fn(4, 2, |x, y| image::Rgba([x as u8 * 60, y as u8 * 120, 0, 255]));
    img.save(dir.path().join("checker.png")).unwrap();
    std::fs::create_dir(dir.path().join("maps")).unwrap();

    let description = json!({
        "materials": [
            { "name": "a", "expression": "diffuse(reflectance: \"checker.png\")" },
            { "name": "b", "expression": "conductor(specularity: \"maps/../checker.png\")" },
            { "name": "c", "expression": "bumpMap(diffuse(), \"./checker.png\")" },
            { "name": "d", "expression": "diffuse(reflectance: \"missing.png\")" }
        ],
        "meshes": [{
            "name": "m",
            "triangles": ([strip(1, "a"), strip(1, "b"), strip(1, "c"), strip(1, "d")].concat())
        }],
        "instances": [{ "mesh": 0 }]
    });
    let raw = load(dir.path(), &description);
    let scene = compile(&raw, &CompileOptions::default()).unwrap();
    scene.validate().unwrap();

    assert_eq!(scene.texture_metadata.len(), 1);
    let meta = scene.texture_metadata[0];
    assert_eq!((meta.width, meta.height), (4, 2));
    assert_eq!(meta.format, TextureFormat::Rgba8 as u32);
    assert_eq!(meta.offset, 0);
    assert_eq!(scene.texture_data.len(), 4 * 2 * 4);

    // BXDF slots are all textures; operators keep theirs in the last slot.
    let referencing = scene
        .material_nodes
        .iter()
        .filter(|n| match n.kind() {
            Some(kind) if kind.is_bxdf() => n.slots.contains(&0),
            Some(_) => n.slots[2] == 0,
            None => false,
        })
        .count();
    assert_eq!(referencing, 3);
}

#[test]
fn test_circular_reference() {
    let dir = tempfile::tempdir().unwrap();
    let description = json!({
        "materials": [
            { "name": "a", "expression": "mix(b, diffuse(), 0.5)" },
            { "name": "b", "expression": "a" },
            { "name": "ok", "expression": "diffuse()" }
        ],
        "meshes": [{ "name": "m", "triangles": ([strip(2, "a"), strip(2, "ok")].concat()) }],
        "instances": [{ "mesh": 0 }]
    });
    let raw = load(dir.path(), &description);

    // Lenient: the cycle leaves `a` unresolved and its triangles get the fallback.
    let scene = compile(&raw, &CompileOptions::default()).unwrap();
    scene.validate().unwrap();
    // `ok` compiles to one node, the fallback adds one more.
    assert_eq!(scene.material_nodes.len(), 2);
    let mut used: Vec<u32> = scene.material_indices.clone();
    used.sort_unstable();
    used.dedup();
    assert_eq!(used.len(), 2);

    // Strict: the whole compile fails and names the cycle.
    let strict = CompileOptions {
        strict_materials: true,
        ..Default::default()
    };
    let err = compile(&raw, &strict).unwrap_err();
    match err.validation() {
        Some(ValidationError::CircularReference { chain }) => {
            assert_eq!(chain.first(), chain.last());
            assert!(chain.contains(&"b".to_string()));
        }
        other => panic!("expected a circular reference, got {other:?} from {err}"),
    }
    assert!(err.to_string().contains("`a`"));
}

#[test]
fn test_energy_conservation_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let description = json!({
        "materials": [
            { "name": "hot", "expression": "diffuse(reflectance: {0.5, 1.0, 0.5})" }
        ],
        "meshes": [{ "name": "m", "triangles": strip(1, "hot") }],
        "instances": [{ "mesh": 0 }]
    });
    let raw = load(dir.path(), &description);
    let strict = CompileOptions {
        strict_materials: true,
        ..Default::default()
    };
    let err = compile(&raw, &strict).unwrap_err();
    assert!(matches!(
        err.validation(),
        Some(ValidationError::EnergyConservation { .. })
    ));

    // Lenient compile still produces a valid scene.
    compile(&raw, &CompileOptions::default()).unwrap().validate().unwrap();
}

#[test]
fn test_parse_error_reports_material() {
    let dir = tempfile::tempdir().unwrap();
    let description = json!({
        "materials": [{ "name": "typo", "expression": "difuse()" }],
        "meshes": [{ "name": "m", "triangles": strip(1, "typo") }],
        "instances": [{ "mesh": 0 }]
    });
    let raw = load(dir.path(), &description);
    let strict = CompileOptions {
        strict_materials: true,
        ..Default::default()
    };
    let err = compile(&raw, &strict).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("typo"), "{text}");
    assert!(text.contains("difuse"), "{text}");
}

#[test]
fn test_unused_materials_pruned() {
    let dir = tempfile::tempdir().unwrap();
    let description = json!({
        "materials": [
            { "name": "unused", "expression": "dielectric(intIOR: \"diamond\")" },
            { "name": "used", "expression": "diffuse()" },
            { "name": SCENE_DIFFUSE_MATERIAL, "expression": "diffuse(reflectance: 0.5)" }
        ],
        "meshes": [{ "name": "m", "triangles": strip(3, "used") }],
        "instances": [{ "mesh": 0 }]
    });
    let input = write_description(dir.path(), &description);
    let output = dir.path().join("scene.bin");

    let stats = compile_file(&input, &output, &CompileOptions::default()).unwrap();
    assert_eq!(stats.material_nodes, 2);

    let scene = read_scene(&output).unwrap();
    assert_eq!(scene.material_nodes.len(), 2);
    assert!(scene.scene_diffuse_mat_index >= 0);
    assert!(scene.material_indices.iter().all(|&m| m == scene.material_indices[0]));
}

#[test]
fn test_scene_stats_for_both_forms() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_description(dir.path(), &basic_scene());
    let output = dir.path().join("scene.bin");
    compile_file(&input, &output, &CompileOptions::default()).unwrap();

    match scene_stats(&input).unwrap() {
        Stats::Raw(raw) => {
            assert_eq!(raw.meshes, 3);
            assert_eq!(raw.instances, 5);
            assert_eq!(raw.used_materials, 3);
        }
        other => panic!("expected raw stats, got {other:?}"),
    }
    match scene_stats(&output).unwrap() {
        Stats::Compiled(stats) => {
            assert_eq!(stats.instances, 5);
            assert_eq!(stats.triangles, 67);
            assert_eq!(stats.top_level.leaves, 5);
            assert_eq!(stats.area_lights, 6);
        }
        other => panic!("expected compiled stats, got {other:?}"),
    }
}

#[test]
fn test_camera_compiled() {
    let dir = tempfile::tempdir().unwrap();
    let raw = load(dir.path(), &basic_scene());
    let options = CompileOptions {
        aspect_ratio: 2.0,
        ..Default::default()
    };
    let scene = compile(&raw, &options).unwrap();
    let cam = scene.camera;
    assert_eq!(cam.fov, 50.0);
    assert_eq!(cam.eye.truncate(), Vec3::new(0.0, 2.0, 10.0));
    assert_eq!((cam.pitch, cam.yaw, cam.invert_y), (0.0, 0.0, 0));

    // The eye maps to the view-space origin.
    let origin = cam.view.transform_point3(Vec3::new(0.0, 2.0, 10.0));
    assert!(origin.length() < 1e-4);
    // x scale of a perspective matrix is f / aspect.
    let f = 1.0 / (50f32.to_radians() / 2.0).tan();
    assert!((cam.proj.x_axis.x - f / 2.0).abs() < 1e-5);
}

#[test]
fn test_empty_scene_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let raw = load(dir.path(), &json!({ "meshes": [{ "name": "m", "triangles": strip(1, "x") }],
                                         "materials": [{ "name": "x", "expression": "diffuse()" }] }));
    assert!(matches!(compile(&raw, &CompileOptions::default()), Err(Error::EmptyScene)));
}
