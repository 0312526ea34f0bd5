//! Semantic checks on a parsed expression, run before lowering.

use super::ast::{BxdfParam, BxdfType, Expr, ParamType, ParamValue};
use crate::util::ValidationError;

/// Parameters each BXDF accepts.
pub fn allowed_params(bxdf: BxdfType) -> &'static [ParamType] {
    use ParamType::*;
    match bxdf {
        BxdfType::Diffuse => &[Reflectance],
        BxdfType::Conductor => &[Specularity, IntIor, ExtIor],
        BxdfType::RoughConductor => &[Specularity, IntIor, ExtIor, Roughness],
        BxdfType::Dielectric => &[Specularity, Transmittance, IntIor, ExtIor],
        BxdfType::RoughDielectric => &[Specularity, Transmittance, IntIor, ExtIor, Roughness],
        BxdfType::Emissive => &[Radiance, Scale],
    }
}

/// Validate `expr` and all of its sub-expressions.
///
/// Referenced materials are validated when they are compiled, not here.
pub fn validate(expr: &Expr) -> Result<(), ValidationError> {
    match expr {
        Expr::Bxdf { bxdf, params } => validate_bxdf(*bxdf, params),
        Expr::MaterialRef(name) => non_empty("material reference", name),
        Expr::Mix { left, right, weight } => {
            in_unit_range("mix weight", *weight)?;
            validate(left)?;
            validate(right)
        }
        Expr::MixMap { left, right, texture } => {
            non_empty("texture", texture)?;
            validate(left)?;
            validate(right)
        }
        Expr::BumpMap { child, texture } | Expr::NormalMap { child, texture } => {
            non_empty("texture", texture)?;
            validate(child)
        }
        Expr::Disperse {
            child,
            int_ior,
            ext_ior,
        } => {
            let int_zero = disperse_ior_is_zero(ParamType::IntIor, int_ior)?;
            let ext_zero = disperse_ior_is_zero(ParamType::ExtIor, ext_ior)?;
            if int_zero && ext_zero {
                return Err(ValidationError::DegenerateDisperse);
            }
            validate(child)
        }
    }
}

fn validate_bxdf(bxdf: BxdfType, params: &[BxdfParam]) -> Result<(), ValidationError> {
    let allowed = allowed_params(bxdf);
    let mut seen: Vec<ParamType> = Vec::with_capacity(params.len());

    for p in params {
        if !allowed.contains(&p.param) {
            return Err(ValidationError::DisallowedParameter {
                bxdf: bxdf.name(),
                param: p.param.name(),
            });
        }
        if seen.contains(&p.param) {
            return Err(ValidationError::DuplicateParameter { param: p.param.name() });
        }
        seen.push(p.param);
        validate_param(p)?;
    }
    Ok(())
}

fn validate_param(p: &BxdfParam) -> Result<(), ValidationError> {
    let name = p.param.name();
    let invalid = |expected| ValidationError::InvalidParamValue { param: name, expected };

    match (p.param, &p.value) {
        (ParamType::Reflectance | ParamType::Specularity | ParamType::Transmittance, value) => match value {
            ParamValue::Scalar(v) => energy_conserving(name, *v),
            ParamValue::Vector(v) => v.to_array().into_iter().try_for_each(|c| energy_conserving(name, c)),
            ParamValue::Texture(t) => non_empty("texture", t),
            ParamValue::KnownIor(_) => Err(invalid("a number, vector or texture")),
        },
        (ParamType::Radiance, value) => match value {
            ParamValue::Scalar(_) | ParamValue::Vector(_) => Ok(()),
            ParamValue::Texture(t) => non_empty("texture", t),
            ParamValue::KnownIor(_) => Err(invalid("a number, vector or texture")),
        },
        (ParamType::IntIor | ParamType::ExtIor, value) => match value {
            ParamValue::Scalar(_) => Ok(()),
            ParamValue::KnownIor(n) => non_empty("known IOR", n),
            _ => Err(invalid("a number or known IOR name")),
        },
        (ParamType::Scale, value) => match value {
            ParamValue::Scalar(_) => Ok(()),
            _ => Err(invalid("a number")),
        },
        (ParamType::Roughness, value) => match value {
            ParamValue::Scalar(v) => in_unit_range("roughness", *v),
            ParamValue::Texture(t) => non_empty("texture", t),
            _ => Err(invalid("a number or texture")),
        },
    }
}

fn disperse_ior_is_zero(param: ParamType, value: &ParamValue) -> Result<bool, ValidationError> {
    match value {
        ParamValue::Scalar(v) => Ok(*v == 0.0),
        ParamValue::Vector(v) => Ok(v.cmpeq(crate::util::Vec3::ZERO).all()),
        ParamValue::KnownIor(n) => non_empty("known IOR", n).map(|_| false),
        ParamValue::Texture(_) => Err(ValidationError::InvalidParamValue {
            param: param.name(),
            expected: "a number, vector or known IOR name",
        }),
    }
}

fn energy_conserving(param: &'static str, value: f32) -> Result<(), ValidationError> {
    if value < 1.0 {
        Ok(())
    } else {
        Err(ValidationError::EnergyConservation { param, value })
    }
}

fn in_unit_range(what: &'static str, value: f32) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            what,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

fn non_empty(what: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        Err(ValidationError::EmptyName { what })
    } else {
        Ok(())
    }
}
