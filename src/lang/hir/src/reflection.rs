//! Variable tables handed back to the caller when reflection is requested.

use crate::ir::{Precision, Type};

/// One attribute, varying, output or default-block uniform.
#[derive(PartialEq, Debug, Clone)]
pub struct ShaderVariable {
    pub name: String,
    /// Spelled-out source type, e.g. `vec4` or `mat3[2]`
    pub type_name: String,
    pub ty: Type,
    pub precision: Option<Precision>,
    /// 0 for a non-array
    pub array_size: u32,
    pub location: Option<u32>,
    /// Referenced anywhere reachable from `main`
    pub static_use: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct BlockFieldInfo {
    pub name: String,
    pub type_name: String,
    pub offset: u32,
    pub array_stride: Option<u32>,
    pub matrix_stride: Option<u32>,
    pub is_row_major: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct InterfaceBlockInfo {
    pub name: String,
    pub instance_name: Option<String>,
    pub layout: &'static str,
    pub binding: Option<u32>,
    /// std140 size in bytes
    pub data_size: u32,
    pub fields: Vec<BlockFieldInfo>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct ReflectionTable {
    pub attributes: Vec<ShaderVariable>,
    pub varyings: Vec<ShaderVariable>,
    pub outputs: Vec<ShaderVariable>,
    pub uniforms: Vec<ShaderVariable>,
    pub blocks: Vec<InterfaceBlockInfo>,
}
