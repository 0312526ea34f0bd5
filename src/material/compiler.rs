//! Lowering of material expressions into the flat packed-node array.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::ast::{BxdfParam, BxdfType, Expr, ParamType, ParamValue};
use super::node::{MaterialNode, MaterialNodeType};
use super::parser::{parse_expr, MAX_NESTING};
use super::resource::ResourceContext;
use super::texture::{TextureMetadata, TextureStore};
use super::validate::validate;
use crate::scene::RawMaterial;
use crate::util::{Error, Result, ValidationError, Vec3};

/// Compiles named materials into one shared node array and texture blob.
///
/// Material references are expanded in place: each reference compiles a
/// fresh copy of the referenced tree.
pub struct MaterialCompiler<'a> {
    materials: &'a [RawMaterial],
    by_name: HashMap<&'a str, usize>,
    nodes: Vec<MaterialNode>,
    textures: TextureStore,
    /// Materials currently being lowered, outermost first.
    chain: SmallVec<[usize; 8]>,
    /// Current lowering depth, counted across references.
    depth: usize,
    fallback: Option<u32>,
}

impl<'a> MaterialCompiler<'a> {
    pub fn new(materials: &'a [RawMaterial]) -> Self {
        let mut by_name = HashMap::with_capacity(materials.len());
        for (i, m) in materials.iter().enumerate() {
            by_name.entry(m.name.as_str()).or_insert(i);
        }
        Self {
            materials,
            by_name,
            nodes: Vec::new(),
            textures: TextureStore::new(),
            chain: SmallVec::new(),
            depth: 0,
            fallback: None,
        }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn nodes(&self) -> &[MaterialNode] {
        &self.nodes
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }

    /// Compile material `material_index`, returning its root node.
    ///
    /// On failure nothing this call appended survives: the node array and
    /// texture blob are restored to their previous state.
    #[tracing::instrument(level = "debug", skip(self), fields(name = tracing::field::Empty))]
    pub fn compile(&mut self, material_index: usize) -> Result<u32> {
        let materials = self.materials;
        let material = materials
            .get(material_index)
            .ok_or_else(|| Error::invalid(format!("material index {material_index} out of range")))?;
        tracing::Span::current().record("name", material.name.as_str());

        let node_count = self.nodes.len();
        let textures = self.textures.checkpoint();
        self.chain.clear();
        self.depth = 0;

        match self.compile_material(material_index) {
            Ok(root) => Ok(root),
            Err(e) => {
                self.nodes.truncate(node_count);
                self.textures.rollback(textures);
                if let Some(f) = self.fallback {
                    if f as usize >= node_count {
                        self.fallback = None;
                    }
                }
                Err(e.in_material(material.name.clone()))
            }
        }
    }

    /// Compile a material by name.
    pub fn compile_named(&mut self, name: &str) -> Result<u32> {
        let index = self
            .find(name)
            .ok_or_else(|| ValidationError::UnknownMaterial { name: name.to_string() })?;
        self.compile(index)
    }

    /// Default diffuse node for geometry whose material failed, created on
    /// first use.
    pub fn fallback_node(&mut self) -> u32 {
        match self.fallback {
            Some(index) => index,
            None => {
                let index = self.push(MaterialNode::bxdf(BxdfType::Diffuse));
                self.fallback = Some(index);
                index
            }
        }
    }

    /// True if the tree rooted at `root` contains an emissive BXDF.
    pub fn is_emissive(&self, root: u32) -> bool {
        let mut stack: SmallVec<[u32; 16]> = SmallVec::new();
        stack.push(root);
        while let Some(index) = stack.pop() {
            let Some(node) = self.nodes.get(index as usize) else {
                continue;
            };
            if node.is_emissive() {
                return true;
            }
            stack.extend(node.children());
        }
        false
    }

    pub fn finish(self) -> (Vec<MaterialNode>, Vec<u8>, Vec<TextureMetadata>) {
        let (data, metadata) = self.textures.into_parts();
        (self.nodes, data, metadata)
    }

    fn compile_material(&mut self, index: usize) -> Result<u32> {
        let materials = self.materials;
        let material = &materials[index];

        if self.chain.contains(&index) {
            let mut chain: Vec<String> = self
                .chain
                .iter()
                .map(|&i| materials[i].name.clone())
                .collect();
            chain.push(material.name.clone());
            return Err(ValidationError::CircularReference { chain }.into());
        }

        self.chain.push(index);
        let result = parse_expr(&material.expression)
            .map_err(Error::from)
            .and_then(|expr| {
                validate(&expr)?;
                self.lower(&expr, &material.resources)
            });
        self.chain.pop();
        result
    }

    fn push(&mut self, node: MaterialNode) -> u32 {
        self.nodes.push(node);
        (self.nodes.len() - 1) as u32
    }

    fn lower(&mut self, expr: &Expr, ctx: &ResourceContext) -> Result<u32> {
        if self.depth == MAX_NESTING {
            return Err(ValidationError::NestingTooDeep { limit: MAX_NESTING }.into());
        }
        self.depth += 1;
        let root = self.lower_expr(expr, ctx);
        self.depth -= 1;
        root
    }

    fn lower_expr(&mut self, expr: &Expr, ctx: &ResourceContext) -> Result<u32> {
        match expr {
            Expr::Bxdf { bxdf, params } => {
                let mut node = MaterialNode::bxdf(*bxdf);
                for param in params {
                    self.apply_param(&mut node, param, ctx)?;
                }
                Ok(self.push(node))
            }
            Expr::MaterialRef(name) => {
                let index = self
                    .find(name)
                    .ok_or_else(|| ValidationError::UnknownMaterial { name: name.clone() })?;
                self.compile_material(index)
            }
            Expr::Mix { left, right, weight } => {
                let l = self.lower(left, ctx)?;
                let r = self.lower(right, ctx)?;
                let mut node = MaterialNode::operator(MaterialNodeType::Mix, l, Some(r));
                node.weight = *weight;
                Ok(self.push(node))
            }
            Expr::MixMap { left, right, texture } => {
                let l = self.lower(left, ctx)?;
                let r = self.lower(right, ctx)?;
                let mut node = MaterialNode::operator(MaterialNodeType::MixMap, l, Some(r));
                node.set_operator_texture(self.textures.bake(ctx, texture)?);
                Ok(self.push(node))
            }
            Expr::BumpMap { child, texture } | Expr::NormalMap { child, texture } => {
                let ty = if matches!(expr, Expr::BumpMap { .. }) {
                    MaterialNodeType::BumpMap
                } else {
                    MaterialNodeType::NormalMap
                };
                let c = self.lower(child, ctx)?;
                let mut node = MaterialNode::operator(ty, c, None);
                node.set_operator_texture(self.textures.bake(ctx, texture)?);
                Ok(self.push(node))
            }
            Expr::Disperse {
                child,
                int_ior,
                ext_ior,
            } => {
                let c = self.lower(child, ctx)?;
                let mut node = MaterialNode::operator(MaterialNodeType::Disperse, c, None);
                node.set_dispersion(ior_vector(int_ior)?, ior_vector(ext_ior)?);
                Ok(self.push(node))
            }
        }
    }

    fn apply_param(&mut self, node: &mut MaterialNode, param: &BxdfParam, ctx: &ResourceContext) -> Result<()> {
        match (param.param, &param.value) {
            (ParamType::IntIor, value) => node.int_ior = ior_scalar(value)?,
            (ParamType::ExtIor, value) => node.ext_ior = ior_scalar(value)?,
            (ParamType::Scale, ParamValue::Scalar(v)) => node.set_scale(*v),
            (ParamType::Roughness, ParamValue::Scalar(v)) => node.set_roughness(*v),
            (p, ParamValue::Texture(name)) => {
                let texture = self.textures.bake(ctx, name)?;
                node.set_texture(p, texture);
            }
            (p, ParamValue::Scalar(v)) => node.set_color(p, Vec3::splat(*v)),
            (p, ParamValue::Vector(v)) => node.set_color(p, *v),
            (p, ParamValue::KnownIor(_)) => {
                return Err(ValidationError::InvalidParamValue {
                    param: p.name(),
                    expected: "a number, vector or texture",
                }
                .into())
            }
        }
        Ok(())
    }
}

fn lookup_ior(name: &str) -> Result<f32> {
    known_ior::lookup(name).map_err(|e| ValidationError::UnknownIor { name: e.name }.into())
}

fn ior_scalar(value: &ParamValue) -> Result<f32> {
    match value {
        ParamValue::Scalar(v) => Ok(*v),
        ParamValue::KnownIor(name) => lookup_ior(name),
        _ => Err(ValidationError::InvalidParamValue {
            param: "IOR",
            expected: "a number or known IOR name",
        }
        .into()),
    }
}

fn ior_vector(value: &ParamValue) -> Result<Vec3> {
    match value {
        ParamValue::Vector(v) => Ok(*v),
        other => ior_scalar(other).map(Vec3::splat),
    }
}
