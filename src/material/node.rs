//! Packed material node.
//!
//! Every node of every compiled material tree is one 64-byte record in a
//! flat array, so a tracer can index any node in O(1):
//!
//! ```text
//! offset  field
//!  0      node_type: u32
//!  4      slots: [i32; 3]   colour tex | left child,
//!                           transmittance tex | right child,
//!                           roughness tex | operator tex
//! 16      color_a: [f32; 4] reflectance / specularity / radiance, or disperse intIOR
//! 32      color_b: [f32; 4] transmittance, or disperse extIOR
//! 48      int_ior: f32
//! 52      ext_ior: f32
//! 56      scalar: f32       roughness or radiance scale
//! 60      weight: f32       mix weight
//! ```
//!
//! Texture slots hold `-1` when absent. Unary operators store their child in
//! the left slot.

use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;

use super::ast::{BxdfType, ParamType};
use crate::util::Vec3;

/// Default roughness of rough BXDFs.
pub const DEFAULT_ROUGHNESS: f32 = 0.1;
pub const DEFAULT_REFLECTANCE: f32 = 0.2;
pub const DEFAULT_SPECULARITY: f32 = 1.0;
pub const DEFAULT_TRANSMITTANCE: f32 = 1.0;
pub const DEFAULT_RADIANCE: f32 = 1.0;
pub const DEFAULT_RADIANCE_SCALE: f32 = 1.0;

/// Type tag stored in [`MaterialNode::node_type`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialNodeType {
    Diffuse = 0,
    Conductor = 1,
    RoughConductor = 2,
    Dielectric = 3,
    RoughDielectric = 4,
    Emissive = 5,
    Mix = 6,
    MixMap = 7,
    BumpMap = 8,
    NormalMap = 9,
    Disperse = 10,
}

impl MaterialNodeType {
    pub fn from_u32(v: u32) -> Option<Self> {
        use MaterialNodeType::*;
        Some(match v {
            0 => Diffuse,
            1 => Conductor,
            2 => RoughConductor,
            3 => Dielectric,
            4 => RoughDielectric,
            5 => Emissive,
            6 => Mix,
            7 => MixMap,
            8 => BumpMap,
            9 => NormalMap,
            10 => Disperse,
            _ => return None,
        })
    }

    pub fn is_bxdf(self) -> bool {
        (self as u32) <= MaterialNodeType::Emissive as u32
    }

    pub fn is_binary(self) -> bool {
        matches!(self, Self::Mix | Self::MixMap)
    }

    pub fn is_unary(self) -> bool {
        matches!(self, Self::BumpMap | Self::NormalMap | Self::Disperse)
    }
}

impl From<BxdfType> for MaterialNodeType {
    fn from(b: BxdfType) -> Self {
        match b {
            BxdfType::Diffuse => Self::Diffuse,
            BxdfType::Conductor => Self::Conductor,
            BxdfType::RoughConductor => Self::RoughConductor,
            BxdfType::Dielectric => Self::Dielectric,
            BxdfType::RoughDielectric => Self::RoughDielectric,
            BxdfType::Emissive => Self::Emissive,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialNode {
    pub node_type: u32,
    pub slots: [i32; 3],
    pub color_a: [f32; 4],
    pub color_b: [f32; 4],
    pub int_ior: f32,
    pub ext_ior: f32,
    pub scalar: f32,
    pub weight: f32,
}

impl MaterialNode {
    /// Blank node of the given type: no textures or children, glass inside,
    /// air outside.
    pub fn new(ty: MaterialNodeType) -> Self {
        Self {
            node_type: ty as u32,
            slots: [-1; 3],
            color_a: [0.0; 4],
            color_b: [0.0; 4],
            int_ior: known_ior::GLASS,
            ext_ior: known_ior::AIR,
            scalar: 0.0,
            weight: 0.0,
        }
    }

    /// BXDF node seeded with the per-type defaults.
    pub fn bxdf(bxdf: BxdfType) -> Self {
        let mut node = Self::new(bxdf.into());
        match bxdf {
            BxdfType::Diffuse => node.set_color(ParamType::Reflectance, Vec3::splat(DEFAULT_REFLECTANCE)),
            BxdfType::Conductor => node.set_color(ParamType::Specularity, Vec3::splat(DEFAULT_SPECULARITY)),
            BxdfType::RoughConductor => {
                node.set_color(ParamType::Specularity, Vec3::splat(DEFAULT_SPECULARITY));
                node.scalar = DEFAULT_ROUGHNESS;
            }
            BxdfType::Dielectric | BxdfType::RoughDielectric => {
                node.set_color(ParamType::Specularity, Vec3::splat(DEFAULT_SPECULARITY));
                node.set_color(ParamType::Transmittance, Vec3::splat(DEFAULT_TRANSMITTANCE));
                if bxdf == BxdfType::RoughDielectric {
                    node.scalar = DEFAULT_ROUGHNESS;
                }
            }
            BxdfType::Emissive => {
                node.set_color(ParamType::Radiance, Vec3::splat(DEFAULT_RADIANCE));
                node.scalar = DEFAULT_RADIANCE_SCALE;
            }
        }
        node
    }

    /// Operator node over one or two already-compiled children.
    pub fn operator(ty: MaterialNodeType, left: u32, right: Option<u32>) -> Self {
        debug_assert!(!ty.is_bxdf());
        let mut node = Self::new(ty);
        node.slots[0] = left as i32;
        node.slots[1] = right.map_or(-1, |r| r as i32);
        node
    }

    pub fn kind(&self) -> Option<MaterialNodeType> {
        MaterialNodeType::from_u32(self.node_type)
    }

    fn is(&self, ty: MaterialNodeType) -> bool {
        self.node_type == ty as u32
    }

    pub fn is_emissive(&self) -> bool {
        self.is(MaterialNodeType::Emissive)
    }

    pub fn set_color(&mut self, param: ParamType, v: Vec3) {
        match param {
            ParamType::Reflectance | ParamType::Specularity | ParamType::Radiance => {
                self.color_a = v.extend(0.0).to_array()
            }
            ParamType::Transmittance => self.color_b = v.extend(0.0).to_array(),
            _ => debug_assert!(false, "{param} is not a colour parameter"),
        }
    }

    /// Colour parameter, if this BXDF carries it.
    pub fn color(&self, param: ParamType) -> Option<Vec3> {
        let kind = self.kind()?;
        let slot = match (kind, param) {
            (MaterialNodeType::Diffuse, ParamType::Reflectance)
            | (MaterialNodeType::Emissive, ParamType::Radiance) => &self.color_a,
            (
                MaterialNodeType::Conductor
                | MaterialNodeType::RoughConductor
                | MaterialNodeType::Dielectric
                | MaterialNodeType::RoughDielectric,
                ParamType::Specularity,
            ) => &self.color_a,
            (MaterialNodeType::Dielectric | MaterialNodeType::RoughDielectric, ParamType::Transmittance) => {
                &self.color_b
            }
            _ => return None,
        };
        Some(Vec3::new(slot[0], slot[1], slot[2]))
    }

    fn texture_slot(param: ParamType) -> Option<usize> {
        match param {
            ParamType::Reflectance | ParamType::Specularity | ParamType::Radiance => Some(0),
            ParamType::Transmittance => Some(1),
            ParamType::Roughness => Some(2),
            _ => None,
        }
    }

    pub fn set_texture(&mut self, param: ParamType, texture: i32) {
        debug_assert!(self.kind().is_some_and(MaterialNodeType::is_bxdf));
        if let Some(slot) = Self::texture_slot(param) {
            self.slots[slot] = texture;
        }
    }

    /// Texture bound to a BXDF parameter, or -1.
    pub fn texture(&self, param: ParamType) -> i32 {
        match (self.kind(), Self::texture_slot(param)) {
            (Some(k), Some(slot)) if k.is_bxdf() => self.slots[slot],
            _ => -1,
        }
    }

    pub fn set_roughness(&mut self, roughness: f32) {
        self.scalar = roughness;
    }

    pub fn roughness(&self) -> Option<f32> {
        match self.kind()? {
            MaterialNodeType::RoughConductor | MaterialNodeType::RoughDielectric => Some(self.scalar),
            _ => None,
        }
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scalar = scale;
    }

    pub fn scale(&self) -> Option<f32> {
        self.is_emissive().then_some(self.scalar)
    }

    /// Blend weight of a `Mix` node.
    pub fn weight(&self) -> Option<f32> {
        self.is(MaterialNodeType::Mix).then_some(self.weight)
    }

    pub fn set_operator_texture(&mut self, texture: i32) {
        self.slots[2] = texture;
    }

    /// Texture of a `MixMap`, `BumpMap` or `NormalMap` node.
    pub fn operator_texture(&self) -> Option<i32> {
        match self.kind()? {
            MaterialNodeType::MixMap | MaterialNodeType::BumpMap | MaterialNodeType::NormalMap => {
                Some(self.slots[2])
            }
            _ => None,
        }
    }

    pub fn set_dispersion(&mut self, int_ior: Vec3, ext_ior: Vec3) {
        debug_assert!(self.is(MaterialNodeType::Disperse));
        self.color_a = int_ior.extend(0.0).to_array();
        self.color_b = ext_ior.extend(0.0).to_array();
    }

    /// Per-channel (int, ext) IOR of a `Disperse` node.
    pub fn dispersion(&self) -> Option<(Vec3, Vec3)> {
        self.is(MaterialNodeType::Disperse).then(|| {
            (
                Vec3::new(self.color_a[0], self.color_a[1], self.color_a[2]),
                Vec3::new(self.color_b[0], self.color_b[1], self.color_b[2]),
            )
        })
    }

    /// Child node indices of an operator node.
    pub fn children(&self) -> SmallVec<[u32; 2]> {
        let mut out = SmallVec::new();
        match self.kind() {
            Some(k) if k.is_binary() => {
                out.push(self.slots[0] as u32);
                out.push(self.slots[1] as u32);
            }
            Some(k) if k.is_unary() => out.push(self.slots[0] as u32),
            _ => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size() {
        assert_eq!(std::mem::size_of::<MaterialNode>(), 64);
    }

    #[test]
    fn test_bxdf_defaults() {
        let d = MaterialNode::bxdf(BxdfType::Diffuse);
        assert_eq!(d.color(ParamType::Reflectance), Some(Vec3::splat(0.2)));
        assert_eq!(d.texture(ParamType::Reflectance), -1);
        assert_eq!(d.int_ior, known_ior::GLASS);
        assert_eq!(d.ext_ior, known_ior::AIR);
        assert_eq!(d.roughness(), None);

        let rd = MaterialNode::bxdf(BxdfType::RoughDielectric);
        assert_eq!(rd.color(ParamType::Transmittance), Some(Vec3::ONE));
        assert_eq!(rd.roughness(), Some(0.1));

        let e = MaterialNode::bxdf(BxdfType::Emissive);
        assert_eq!(e.scale(), Some(1.0));
        assert_eq!(e.color(ParamType::Radiance), Some(Vec3::ONE));
    }

    #[test]
    fn test_accessors_check_tag() {
        let d = MaterialNode::bxdf(BxdfType::Diffuse);
        assert_eq!(d.color(ParamType::Transmittance), None);
        assert_eq!(d.weight(), None);
        assert_eq!(d.dispersion(), None);

        let mut m = MaterialNode::operator(MaterialNodeType::Mix, 3, Some(4));
        m.weight = 0.25;
        assert_eq!(m.weight(), Some(0.25));
        assert_eq!(m.children().as_slice(), &[3, 4]);
        assert_eq!(m.operator_texture(), None);
        assert_eq!(m.texture(ParamType::Reflectance), -1);
    }

    #[test]
    fn test_unary_operator() {
        let mut b = MaterialNode::operator(MaterialNodeType::BumpMap, 7, None);
        b.set_operator_texture(2);
        assert_eq!(b.children().as_slice(), &[7]);
        assert_eq!(b.operator_texture(), Some(2));
        assert_eq!(b.slots[1], -1);
    }
}
