//! Binary scene payload.
//!
//! The payload is a sequence of sections, each `[count: u64 LE][count records]`,
//! in this order:
//!
//! | section               | record               | size |
//! |-----------------------|----------------------|------|
//! | bvh_nodes             | `PackedBvhNode`      | 40   |
//! | mesh_instances        | `CompiledInstance`   | 80   |
//! | material_nodes        | `MaterialNode`       | 64   |
//! | emissive_primitives   | `EmissivePrimitive`  | 80   |
//! | texture_data          | `u8`                 | 1    |
//! | texture_metadata      | `TextureMetadata`    | 24   |
//! | vertices              | `Vec4`               | 16   |
//! | normals               | `Vec4`               | 16   |
//! | uvs                   | `Vec2`               | 8    |
//! | material_indices      | `u32`                | 4    |
//!
//! followed by `scene_diffuse_mat_index: i32`, `scene_emissive_mat_index: i32`
//! and one `CompiledCamera` (192 bytes). Records are little-endian POD.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytemuck::Pod;

use crate::bvh::{BvhNode, PackedBvhNode};
use crate::scene::{CompiledCamera, Scene};
use crate::util::{Error, Result};

/// Appends sections to a payload buffer.
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_section<T: Pod>(&mut self, records: &[T]) -> Result<()> {
        self.buf.write_u64::<LittleEndian>(records.len() as u64)?;
        self.buf.extend_from_slice(bytemuck::cast_slice(records));
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.buf.write_i32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_record<T: Pod>(&mut self, record: &T) {
        self.buf.extend_from_slice(bytemuck::bytes_of(record));
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads sections back, reporting the offset of truncated data.
pub struct PayloadReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    fn remaining(&self) -> u64 {
        let len = self.cursor.get_ref().len() as u64;
        len - self.position().min(len)
    }

    fn eof(&self) -> Error {
        Error::UnexpectedEof(self.position())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let pos = self.position();
        self.cursor
            .read_i32::<LittleEndian>()
            .map_err(|_| Error::UnexpectedEof(pos))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let pos = self.position();
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::UnexpectedEof(pos))
    }

    fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        if len > self.remaining() {
            return Err(self.eof());
        }
        let mut bytes = vec![0u8; len as usize];
        self.cursor.read_exact(&mut bytes).map_err(|_| self.eof())?;
        Ok(bytes)
    }

    pub fn read_section<T: Pod>(&mut self, what: &str) -> Result<Vec<T>> {
        let count = self.read_u64()?;
        let len = count
            .checked_mul(std::mem::size_of::<T>() as u64)
            .ok_or_else(|| Error::corrupt(format!("{what}: record count {count} overflows")))?;
        if len > self.remaining() {
            return Err(self.eof());
        }
        let bytes = self.read_bytes(len)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    pub fn read_record<T: Pod>(&mut self) -> Result<T> {
        let bytes = self.read_bytes(std::mem::size_of::<T>() as u64)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(Error::corrupt(format!("{n} trailing bytes after camera"))),
        }
    }
}

/// Serialize `scene` into an uncompressed payload.
pub fn encode_payload(scene: &Scene) -> Result<Vec<u8>> {
    let packed: Vec<PackedBvhNode> = scene.bvh_nodes.iter().map(BvhNode::to_packed).collect();

    let capacity = std::mem::size_of_val(packed.as_slice())
        + std::mem::size_of_val(scene.mesh_instances.as_slice())
        + std::mem::size_of_val(scene.material_nodes.as_slice())
        + std::mem::size_of_val(scene.emissive_primitives.as_slice())
        + scene.texture_data.len()
        + std::mem::size_of_val(scene.texture_metadata.as_slice())
        + std::mem::size_of_val(scene.vertices.as_slice())
        + std::mem::size_of_val(scene.normals.as_slice())
        + std::mem::size_of_val(scene.uvs.as_slice())
        + std::mem::size_of_val(scene.material_indices.as_slice())
        + 10 * 8
        + 8
        + std::mem::size_of::<CompiledCamera>();

    let mut w = PayloadWriter::with_capacity(capacity);
    w.write_section(&packed)?;
    w.write_section(&scene.mesh_instances)?;
    w.write_section(&scene.material_nodes)?;
    w.write_section(&scene.emissive_primitives)?;
    w.write_section(&scene.texture_data)?;
    w.write_section(&scene.texture_metadata)?;
    w.write_section(&scene.vertices)?;
    w.write_section(&scene.normals)?;
    w.write_section(&scene.uvs)?;
    w.write_section(&scene.material_indices)?;
    w.write_i32(scene.scene_diffuse_mat_index)?;
    w.write_i32(scene.scene_emissive_mat_index)?;
    w.write_record(&scene.camera);
    Ok(w.into_inner())
}

/// Parse an uncompressed payload.
///
/// The decoded scene must pass [`Scene::validate`]; a violation is reported
/// as a corrupt container.
pub fn decode_payload(data: &[u8]) -> Result<Scene> {
    let mut r = PayloadReader::new(data);

    let bvh_nodes = r
        .read_section::<PackedBvhNode>("bvh_nodes")?
        .iter()
        .map(BvhNode::from_packed)
        .collect::<Result<Vec<_>>>()?;

    let scene = Scene {
        bvh_nodes,
        mesh_instances: r.read_section("mesh_instances")?,
        material_nodes: r.read_section("material_nodes")?,
        emissive_primitives: r.read_section("emissive_primitives")?,
        texture_data: r.read_section("texture_data")?,
        texture_metadata: r.read_section("texture_metadata")?,
        vertices: r.read_section("vertices")?,
        normals: r.read_section("normals")?,
        uvs: r.read_section("uvs")?,
        material_indices: r.read_section("material_indices")?,
        scene_diffuse_mat_index: r.read_i32()?,
        scene_emissive_mat_index: r.read_i32()?,
        camera: r.read_record()?,
    };
    r.finish()?;
    scene.validate().map_err(|e| match e {
        Error::InvalidScene(msg) => Error::corrupt(msg),
        other => other,
    })?;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::NodeKind;
    use crate::material::{BxdfType, MaterialNode};
    use crate::util::{BBox3f, Vec2, Vec3, Vec4};

    fn scene() -> Scene {
        Scene {
            bvh_nodes: vec![BvhNode::new(
                BBox3f::new(Vec3::ZERO, Vec3::ONE),
                NodeKind::PrimitiveLeaf { offset: 0, count: 1 },
            )],
            vertices: vec![Vec4::ZERO, Vec4::X, Vec4::Y],
            normals: vec![Vec4::Z; 3],
            uvs: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
            material_indices: vec![0],
            material_nodes: vec![MaterialNode::bxdf(BxdfType::Emissive)],
            texture_data: vec![1, 2, 3, 4],
            scene_emissive_mat_index: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_layout() {
        let payload = encode_payload(&scene()).unwrap();
        // First section: one 40-byte node.
        assert_eq!(&payload[..8], &1u64.to_le_bytes());
        let expected = 10 * 8 + 40 + 64 + 4 + 3 * 16 * 2 + 3 * 8 + 4 + 8 + 192;
        assert_eq!(payload.len(), expected);
    }

    #[test]
    fn test_payload_roundtrip() {
        let s = scene();
        assert_eq!(decode_payload(&encode_payload(&s).unwrap()).unwrap(), s);
    }

    #[test]
    fn test_truncated_payload() {
        let payload = encode_payload(&scene()).unwrap();
        let err = decode_payload(&payload[..payload.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof(_)));

        let err = decode_payload(&payload[..4]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof(0)));
    }

    #[test]
    fn test_huge_count_rejected() {
        let mut payload = encode_payload(&scene()).unwrap();
        payload[..8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(decode_payload(&payload), Err(Error::CorruptContainer(_))));
        payload[..8].copy_from_slice(&1_000_000u64.to_le_bytes());
        assert!(matches!(decode_payload(&payload), Err(Error::UnexpectedEof(8))));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut payload = encode_payload(&scene()).unwrap();
        payload.push(0);
        assert!(matches!(decode_payload(&payload), Err(Error::CorruptContainer(_))));
    }

    #[test]
    fn test_bad_node_tag_rejected() {
        let mut payload = encode_payload(&scene()).unwrap();
        // tag sits after the count and the three min floats
        payload[8 + 12..8 + 16].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(decode_payload(&payload), Err(Error::CorruptContainer(_))));
    }

    #[test]
    fn test_structurally_invalid_scene_rejected() {
        let mut cyclic = scene();
        cyclic.bvh_nodes[0].kind = NodeKind::Internal { left: 0, right: 0 };
        let err = decode_payload(&encode_payload(&cyclic).unwrap()).unwrap_err();
        assert!(matches!(err, Error::CorruptContainer(_)));
        assert!(err.to_string().contains("cycle in BVH"), "{err}");

        let mut out_of_range = scene();
        out_of_range.material_nodes[0].slots[0] = 5;
        let err = decode_payload(&encode_payload(&out_of_range).unwrap()).unwrap_err();
        assert!(matches!(err, Error::CorruptContainer(_)));
    }
}
