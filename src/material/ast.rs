//! Material expression tree.

use std::fmt;

use crate::util::Vec3;

/// Scattering model of a leaf material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BxdfType {
    Diffuse,
    Conductor,
    RoughConductor,
    Dielectric,
    RoughDielectric,
    Emissive,
}

impl BxdfType {
    pub const ALL: [BxdfType; 6] = [
        Self::Diffuse,
        Self::Conductor,
        Self::RoughConductor,
        Self::Dielectric,
        Self::RoughDielectric,
        Self::Emissive,
    ];

    /// Keyword used in expressions.
    pub fn name(self) -> &'static str {
        match self {
            Self::Diffuse => "diffuse",
            Self::Conductor => "conductor",
            Self::RoughConductor => "roughConductor",
            Self::Dielectric => "dielectric",
            Self::RoughDielectric => "roughDielectric",
            Self::Emissive => "emissive",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

impl fmt::Display for BxdfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named BXDF parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Reflectance,
    Specularity,
    Transmittance,
    Radiance,
    IntIor,
    ExtIor,
    Scale,
    Roughness,
}

impl ParamType {
    pub const ALL: [ParamType; 8] = [
        Self::Reflectance,
        Self::Specularity,
        Self::Transmittance,
        Self::Radiance,
        Self::IntIor,
        Self::ExtIor,
        Self::Scale,
        Self::Roughness,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Reflectance => "reflectance",
            Self::Specularity => "specularity",
            Self::Transmittance => "transmittance",
            Self::Radiance => "radiance",
            Self::IntIor => "intIOR",
            Self::ExtIor => "extIOR",
            Self::Scale => "scale",
            Self::Roughness => "roughness",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// True for the two index-of-refraction parameters.
    pub fn is_ior(self) -> bool {
        matches!(self, Self::IntIor | Self::ExtIor)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Right-hand side of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(f32),
    Vector(Vec3),
    /// Texture file, resolved relative to the material's base directory.
    Texture(String),
    /// Name looked up in the known-IOR table.
    KnownIor(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Vector(v) => write!(f, "{{{}, {}, {}}}", v.x, v.y, v.z),
            Self::Texture(s) | Self::KnownIor(s) => write!(f, "\"{s}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BxdfParam {
    pub param: ParamType,
    pub value: ParamValue,
}

/// Parsed material expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bxdf {
        bxdf: BxdfType,
        params: Vec<BxdfParam>,
    },
    MaterialRef(String),
    Mix {
        left: Box<Expr>,
        right: Box<Expr>,
        weight: f32,
    },
    MixMap {
        left: Box<Expr>,
        right: Box<Expr>,
        texture: String,
    },
    BumpMap {
        child: Box<Expr>,
        texture: String,
    },
    NormalMap {
        child: Box<Expr>,
        texture: String,
    },
    Disperse {
        child: Box<Expr>,
        int_ior: ParamValue,
        ext_ior: ParamValue,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bxdf { bxdf, params } => {
                write!(f, "{bxdf}(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", p.param, p.value)?;
                }
                f.write_str(")")
            }
            Self::MaterialRef(name) => f.write_str(name),
            Self::Mix { left, right, weight } => write!(f, "mix({left}, {right}, {weight})"),
            Self::MixMap { left, right, texture } => write!(f, "mixMap({left}, {right}, \"{texture}\")"),
            Self::BumpMap { child, texture } => write!(f, "bumpMap({child}, \"{texture}\")"),
            Self::NormalMap { child, texture } => write!(f, "normalMap({child}, \"{texture}\")"),
            Self::Disperse { child, int_ior, ext_ior } => {
                write!(f, "disperse({child}, intIOR: {int_ior}, extIOR: {ext_ior})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for b in BxdfType::ALL {
            assert_eq!(BxdfType::from_name(b.name()), Some(b));
        }
        for p in ParamType::ALL {
            assert_eq!(ParamType::from_name(p.name()), Some(p));
        }
        assert_eq!(BxdfType::from_name("Diffuse"), None);
    }

    #[test]
    fn test_display() {
        let e = Expr::Mix {
            left: Box::new(Expr::Bxdf {
                bxdf: BxdfType::Diffuse,
                params: vec![BxdfParam {
                    param: ParamType::Reflectance,
                    value: ParamValue::Vector(Vec3::new(0.5, 0.25, 0.5)),
                }],
            }),
            right: Box::new(Expr::MaterialRef("gold".into())),
            weight: 0.5,
        };
        assert_eq!(
            e.to_string(),
            "mix(diffuse(reflectance: {0.5, 0.25, 0.5}), gold, 0.5)"
        );
    }
}
