//! Builtin function set and the signature table overload resolution runs
//! against.

use esslt_shared::{ShaderStage, ShaderVersion};

use crate::ir::SamplerType;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Intrinsic {
    Radians,
    Degrees,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Pow,
    Exp,
    Log,
    Exp2,
    Log2,
    Sqrt,
    InverseSqrt,
    Abs,
    Sign,
    Floor,
    Ceil,
    Fract,
    Mod,
    Min,
    Max,
    Clamp,
    Mix,
    Step,
    SmoothStep,
    Modf,
    Length,
    Distance,
    Dot,
    Cross,
    Normalize,
    FaceForward,
    Reflect,
    Refract,
    MatrixCompMult,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Equal,
    NotEqual,
    Any,
    All,
    Not,
    Texture2D,
    Texture2DProj,
    Texture2DLod,
    TextureCube,
    TextureCubeLod,
    Texture,
    TextureProj,
    TextureLod,
    DFdx,
    DFdy,
    Fwidth,
    PackHalf2x16,
    UnpackHalf2x16,
}

impl Intrinsic {
    /// Source-level spelling. Emitters map this further where a target
    /// renames the function.
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Radians => "radians",
            Intrinsic::Degrees => "degrees",
            Intrinsic::Sin => "sin",
            Intrinsic::Cos => "cos",
            Intrinsic::Tan => "tan",
            Intrinsic::Asin => "asin",
            Intrinsic::Acos => "acos",
            Intrinsic::Atan => "atan",
            Intrinsic::Pow => "pow",
            Intrinsic::Exp => "exp",
            Intrinsic::Log => "log",
            Intrinsic::Exp2 => "exp2",
            Intrinsic::Log2 => "log2",
            Intrinsic::Sqrt => "sqrt",
            Intrinsic::InverseSqrt => "inversesqrt",
            Intrinsic::Abs => "abs",
            Intrinsic::Sign => "sign",
            Intrinsic::Floor => "floor",
            Intrinsic::Ceil => "ceil",
            Intrinsic::Fract => "fract",
            Intrinsic::Mod => "mod",
            Intrinsic::Min => "min",
            Intrinsic::Max => "max",
            Intrinsic::Clamp => "clamp",
            Intrinsic::Mix => "mix",
            Intrinsic::Step => "step",
            Intrinsic::SmoothStep => "smoothstep",
            Intrinsic::Modf => "modf",
            Intrinsic::Length => "length",
            Intrinsic::Distance => "distance",
            Intrinsic::Dot => "dot",
            Intrinsic::Cross => "cross",
            Intrinsic::Normalize => "normalize",
            Intrinsic::FaceForward => "faceforward",
            Intrinsic::Reflect => "reflect",
            Intrinsic::Refract => "refract",
            Intrinsic::MatrixCompMult => "matrixCompMult",
            Intrinsic::LessThan => "lessThan",
            Intrinsic::LessThanEqual => "lessThanEqual",
            Intrinsic::GreaterThan => "greaterThan",
            Intrinsic::GreaterThanEqual => "greaterThanEqual",
            Intrinsic::Equal => "equal",
            Intrinsic::NotEqual => "notEqual",
            Intrinsic::Any => "any",
            Intrinsic::All => "all",
            Intrinsic::Not => "not",
            Intrinsic::Texture2D => "texture2D",
            Intrinsic::Texture2DProj => "texture2DProj",
            Intrinsic::Texture2DLod => "texture2DLod",
            Intrinsic::TextureCube => "textureCube",
            Intrinsic::TextureCubeLod => "textureCubeLod",
            Intrinsic::Texture => "texture",
            Intrinsic::TextureProj => "textureProj",
            Intrinsic::TextureLod => "textureLod",
            Intrinsic::DFdx => "dFdx",
            Intrinsic::DFdy => "dFdy",
            Intrinsic::Fwidth => "fwidth",
            Intrinsic::PackHalf2x16 => "packHalf2x16",
            Intrinsic::UnpackHalf2x16 => "unpackHalf2x16",
        }
    }

    /// `modf` writes through an out parameter; everything else is pure.
    pub fn has_side_effects(self) -> bool {
        matches!(self, Intrinsic::Modf)
    }

    pub fn is_texture_fetch(self) -> bool {
        matches!(
            self,
            Intrinsic::Texture2D
                | Intrinsic::Texture2DProj
                | Intrinsic::Texture2DLod
                | Intrinsic::TextureCube
                | Intrinsic::TextureCubeLod
                | Intrinsic::Texture
                | Intrinsic::TextureProj
                | Intrinsic::TextureLod
        )
    }

    /// Wrapper name when builtin emulation is requested. Only functions with
    /// known-broken driver implementations get a wrapper.
    pub fn emulation_name(self) -> Option<&'static str> {
        match self {
            Intrinsic::Dot => Some("webgl_dot_emu"),
            Intrinsic::Length => Some("webgl_length_emu"),
            Intrinsic::Normalize => Some("webgl_normalize_emu"),
            Intrinsic::Distance => Some("webgl_distance_emu"),
            Intrinsic::Reflect => Some("webgl_reflect_emu"),
            Intrinsic::FaceForward => Some("webgl_faceforward_emu"),
            _ => None,
        }
    }
}

/// Parameter shape pattern. All `Gen*` occurrences in one signature unify to
/// the same component count.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ParamType {
    /// float scalar or vecN
    Gen,
    /// float scalar, even when the signature's `Gen` is a vector
    GenScalar,
    /// int scalar or ivecN
    GenInt,
    GenIntScalar,
    /// uint scalar or uvecN
    GenUInt,
    GenUIntScalar,
    /// bool scalar or bvecN
    GenBool,
    /// float vecN, N >= 2
    Vec,
    /// int vecN, N >= 2
    IntVec,
    /// uint vecN, N >= 2
    UIntVec,
    /// bool vecN matching the signature's `Vec`/`IntVec`/`UIntVec` size
    BoolVec,
    Float,
    Vec2,
    Vec3,
    Vec4,
    /// Square matN, all sizes unify
    Mat,
    Sampler(SamplerType),
    /// `out` float scalar or vecN matching `Gen`
    OutGen,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ReturnType {
    /// Same shape as the unified `Gen`
    Gen,
    /// bool vector matching the unified `Vec` size
    BoolVec,
    Float,
    Bool,
    UInt,
    Vec2,
    Vec3,
    Vec4,
    /// Same matrix type as the unified `Mat`
    Mat,
}

/// Where a builtin is callable.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum StageSet {
    All,
    FragmentOnly,
    VertexOnly,
}

impl StageSet {
    pub fn allows(self, stage: ShaderStage) -> bool {
        match self {
            StageSet::All => true,
            StageSet::FragmentOnly => stage == ShaderStage::Fragment,
            StageSet::VertexOnly => stage == ShaderStage::Vertex,
        }
    }
}

pub struct IntrinsicDefinition {
    pub name: &'static str,
    pub intrinsic: Intrinsic,
    pub params: &'static [ParamType],
    pub returns: ReturnType,
    pub min_version: ShaderVersion,
    pub stages: StageSet,
}

const fn def(
    name: &'static str,
    intrinsic: Intrinsic,
    params: &'static [ParamType],
    returns: ReturnType,
) -> IntrinsicDefinition {
    IntrinsicDefinition {
        name,
        intrinsic,
        params,
        returns,
        min_version: ShaderVersion::Essl100,
        stages: StageSet::All,
    }
}

const fn def300(
    name: &'static str,
    intrinsic: Intrinsic,
    params: &'static [ParamType],
    returns: ReturnType,
) -> IntrinsicDefinition {
    IntrinsicDefinition {
        name,
        intrinsic,
        params,
        returns,
        min_version: ShaderVersion::Essl300,
        stages: StageSet::All,
    }
}

use ParamType as P;
use ReturnType as R;
use SamplerType as S;

pub static DEFINITIONS: &[IntrinsicDefinition] = &[
    // Angle and trigonometry
    def("radians", Intrinsic::Radians, &[P::Gen], R::Gen),
    def("degrees", Intrinsic::Degrees, &[P::Gen], R::Gen),
    def("sin", Intrinsic::Sin, &[P::Gen], R::Gen),
    def("cos", Intrinsic::Cos, &[P::Gen], R::Gen),
    def("tan", Intrinsic::Tan, &[P::Gen], R::Gen),
    def("asin", Intrinsic::Asin, &[P::Gen], R::Gen),
    def("acos", Intrinsic::Acos, &[P::Gen], R::Gen),
    def("atan", Intrinsic::Atan, &[P::Gen], R::Gen),
    def("atan", Intrinsic::Atan, &[P::Gen, P::Gen], R::Gen),
    // Exponential
    def("pow", Intrinsic::Pow, &[P::Gen, P::Gen], R::Gen),
    def("exp", Intrinsic::Exp, &[P::Gen], R::Gen),
    def("log", Intrinsic::Log, &[P::Gen], R::Gen),
    def("exp2", Intrinsic::Exp2, &[P::Gen], R::Gen),
    def("log2", Intrinsic::Log2, &[P::Gen], R::Gen),
    def("sqrt", Intrinsic::Sqrt, &[P::Gen], R::Gen),
    def("inversesqrt", Intrinsic::InverseSqrt, &[P::Gen], R::Gen),
    // Common
    def("abs", Intrinsic::Abs, &[P::Gen], R::Gen),
    def300("abs", Intrinsic::Abs, &[P::GenInt], R::Gen),
    def("sign", Intrinsic::Sign, &[P::Gen], R::Gen),
    def300("sign", Intrinsic::Sign, &[P::GenInt], R::Gen),
    def("floor", Intrinsic::Floor, &[P::Gen], R::Gen),
    def("ceil", Intrinsic::Ceil, &[P::Gen], R::Gen),
    def("fract", Intrinsic::Fract, &[P::Gen], R::Gen),
    def("mod", Intrinsic::Mod, &[P::Gen, P::Gen], R::Gen),
    def("mod", Intrinsic::Mod, &[P::Gen, P::GenScalar], R::Gen),
    def("min", Intrinsic::Min, &[P::Gen, P::Gen], R::Gen),
    def("min", Intrinsic::Min, &[P::Gen, P::GenScalar], R::Gen),
    def300("min", Intrinsic::Min, &[P::GenInt, P::GenInt], R::Gen),
    def300("min", Intrinsic::Min, &[P::GenInt, P::GenIntScalar], R::Gen),
    def300("min", Intrinsic::Min, &[P::GenUInt, P::GenUInt], R::Gen),
    def300("min", Intrinsic::Min, &[P::GenUInt, P::GenUIntScalar], R::Gen),
    def("max", Intrinsic::Max, &[P::Gen, P::Gen], R::Gen),
    def("max", Intrinsic::Max, &[P::Gen, P::GenScalar], R::Gen),
    def300("max", Intrinsic::Max, &[P::GenInt, P::GenInt], R::Gen),
    def300("max", Intrinsic::Max, &[P::GenInt, P::GenIntScalar], R::Gen),
    def300("max", Intrinsic::Max, &[P::GenUInt, P::GenUInt], R::Gen),
    def300("max", Intrinsic::Max, &[P::GenUInt, P::GenUIntScalar], R::Gen),
    def("clamp", Intrinsic::Clamp, &[P::Gen, P::Gen, P::Gen], R::Gen),
    def(
        "clamp",
        Intrinsic::Clamp,
        &[P::Gen, P::GenScalar, P::GenScalar],
        R::Gen,
    ),
    def300(
        "clamp",
        Intrinsic::Clamp,
        &[P::GenInt, P::GenInt, P::GenInt],
        R::Gen,
    ),
    def300(
        "clamp",
        Intrinsic::Clamp,
        &[P::GenInt, P::GenIntScalar, P::GenIntScalar],
        R::Gen,
    ),
    def300(
        "clamp",
        Intrinsic::Clamp,
        &[P::GenUInt, P::GenUInt, P::GenUInt],
        R::Gen,
    ),
    def300(
        "clamp",
        Intrinsic::Clamp,
        &[P::GenUInt, P::GenUIntScalar, P::GenUIntScalar],
        R::Gen,
    ),
    def("mix", Intrinsic::Mix, &[P::Gen, P::Gen, P::Gen], R::Gen),
    def("mix", Intrinsic::Mix, &[P::Gen, P::Gen, P::GenScalar], R::Gen),
    def300("mix", Intrinsic::Mix, &[P::Gen, P::Gen, P::GenBool], R::Gen),
    def("step", Intrinsic::Step, &[P::Gen, P::Gen], R::Gen),
    def("step", Intrinsic::Step, &[P::GenScalar, P::Gen], R::Gen),
    def(
        "smoothstep",
        Intrinsic::SmoothStep,
        &[P::Gen, P::Gen, P::Gen],
        R::Gen,
    ),
    def(
        "smoothstep",
        Intrinsic::SmoothStep,
        &[P::GenScalar, P::GenScalar, P::Gen],
        R::Gen,
    ),
    def300("modf", Intrinsic::Modf, &[P::Gen, P::OutGen], R::Gen),
    // Geometric
    def("length", Intrinsic::Length, &[P::Gen], R::Float),
    def("distance", Intrinsic::Distance, &[P::Gen, P::Gen], R::Float),
    def("dot", Intrinsic::Dot, &[P::Gen, P::Gen], R::Float),
    def("cross", Intrinsic::Cross, &[P::Vec3, P::Vec3], R::Vec3),
    def("normalize", Intrinsic::Normalize, &[P::Gen], R::Gen),
    def(
        "faceforward",
        Intrinsic::FaceForward,
        &[P::Gen, P::Gen, P::Gen],
        R::Gen,
    ),
    def("reflect", Intrinsic::Reflect, &[P::Gen, P::Gen], R::Gen),
    def(
        "refract",
        Intrinsic::Refract,
        &[P::Gen, P::Gen, P::Float],
        R::Gen,
    ),
    // Matrix
    def(
        "matrixCompMult",
        Intrinsic::MatrixCompMult,
        &[P::Mat, P::Mat],
        R::Mat,
    ),
    // Vector relational
    def("lessThan", Intrinsic::LessThan, &[P::Vec, P::Vec], R::BoolVec),
    def(
        "lessThan",
        Intrinsic::LessThan,
        &[P::IntVec, P::IntVec],
        R::BoolVec,
    ),
    def(
        "lessThanEqual",
        Intrinsic::LessThanEqual,
        &[P::Vec, P::Vec],
        R::BoolVec,
    ),
    def(
        "lessThanEqual",
        Intrinsic::LessThanEqual,
        &[P::IntVec, P::IntVec],
        R::BoolVec,
    ),
    def(
        "greaterThan",
        Intrinsic::GreaterThan,
        &[P::Vec, P::Vec],
        R::BoolVec,
    ),
    def(
        "greaterThan",
        Intrinsic::GreaterThan,
        &[P::IntVec, P::IntVec],
        R::BoolVec,
    ),
    def(
        "greaterThanEqual",
        Intrinsic::GreaterThanEqual,
        &[P::Vec, P::Vec],
        R::BoolVec,
    ),
    def(
        "greaterThanEqual",
        Intrinsic::GreaterThanEqual,
        &[P::IntVec, P::IntVec],
        R::BoolVec,
    ),
    def("equal", Intrinsic::Equal, &[P::Vec, P::Vec], R::BoolVec),
    def("equal", Intrinsic::Equal, &[P::IntVec, P::IntVec], R::BoolVec),
    def(
        "equal",
        Intrinsic::Equal,
        &[P::BoolVec, P::BoolVec],
        R::BoolVec,
    ),
    def("notEqual", Intrinsic::NotEqual, &[P::Vec, P::Vec], R::BoolVec),
    def(
        "notEqual",
        Intrinsic::NotEqual,
        &[P::IntVec, P::IntVec],
        R::BoolVec,
    ),
    def(
        "notEqual",
        Intrinsic::NotEqual,
        &[P::BoolVec, P::BoolVec],
        R::BoolVec,
    ),
    def("any", Intrinsic::Any, &[P::BoolVec], R::Bool),
    def("all", Intrinsic::All, &[P::BoolVec], R::Bool),
    def("not", Intrinsic::Not, &[P::BoolVec], R::BoolVec),
    // Texture lookup, ESSL 1.00 names
    def(
        "texture2D",
        Intrinsic::Texture2D,
        &[P::Sampler(S::Sampler2D), P::Vec2],
        R::Vec4,
    ),
    IntrinsicDefinition {
        name: "texture2D",
        intrinsic: Intrinsic::Texture2D,
        params: &[P::Sampler(S::Sampler2D), P::Vec2, P::Float],
        returns: R::Vec4,
        min_version: ShaderVersion::Essl100,
        stages: StageSet::FragmentOnly,
    },
    def(
        "texture2DProj",
        Intrinsic::Texture2DProj,
        &[P::Sampler(S::Sampler2D), P::Vec3],
        R::Vec4,
    ),
    def(
        "texture2DProj",
        Intrinsic::Texture2DProj,
        &[P::Sampler(S::Sampler2D), P::Vec4],
        R::Vec4,
    ),
    IntrinsicDefinition {
        name: "texture2DLod",
        intrinsic: Intrinsic::Texture2DLod,
        params: &[P::Sampler(S::Sampler2D), P::Vec2, P::Float],
        returns: R::Vec4,
        min_version: ShaderVersion::Essl100,
        stages: StageSet::VertexOnly,
    },
    def(
        "textureCube",
        Intrinsic::TextureCube,
        &[P::Sampler(S::SamplerCube), P::Vec3],
        R::Vec4,
    ),
    IntrinsicDefinition {
        name: "textureCubeLod",
        intrinsic: Intrinsic::TextureCubeLod,
        params: &[P::Sampler(S::SamplerCube), P::Vec3, P::Float],
        returns: R::Vec4,
        min_version: ShaderVersion::Essl100,
        stages: StageSet::VertexOnly,
    },
    // Texture lookup, ESSL 3.00 names
    def300(
        "texture",
        Intrinsic::Texture,
        &[P::Sampler(S::Sampler2D), P::Vec2],
        R::Vec4,
    ),
    def300(
        "texture",
        Intrinsic::Texture,
        &[P::Sampler(S::Sampler3D), P::Vec3],
        R::Vec4,
    ),
    def300(
        "texture",
        Intrinsic::Texture,
        &[P::Sampler(S::SamplerCube), P::Vec3],
        R::Vec4,
    ),
    def300(
        "texture",
        Intrinsic::Texture,
        &[P::Sampler(S::Sampler2DArray), P::Vec3],
        R::Vec4,
    ),
    def300(
        "texture",
        Intrinsic::Texture,
        &[P::Sampler(S::Sampler2DShadow), P::Vec3],
        R::Float,
    ),
    def300(
        "texture",
        Intrinsic::Texture,
        &[P::Sampler(S::SamplerCubeShadow), P::Vec4],
        R::Float,
    ),
    def300(
        "textureProj",
        Intrinsic::TextureProj,
        &[P::Sampler(S::Sampler2D), P::Vec3],
        R::Vec4,
    ),
    def300(
        "textureProj",
        Intrinsic::TextureProj,
        &[P::Sampler(S::Sampler2D), P::Vec4],
        R::Vec4,
    ),
    def300(
        "textureLod",
        Intrinsic::TextureLod,
        &[P::Sampler(S::Sampler2D), P::Vec2, P::Float],
        R::Vec4,
    ),
    def300(
        "textureLod",
        Intrinsic::TextureLod,
        &[P::Sampler(S::SamplerCube), P::Vec3, P::Float],
        R::Vec4,
    ),
    // Derivatives, fragment stage only
    IntrinsicDefinition {
        name: "dFdx",
        intrinsic: Intrinsic::DFdx,
        params: &[P::Gen],
        returns: R::Gen,
        min_version: ShaderVersion::Essl100,
        stages: StageSet::FragmentOnly,
    },
    IntrinsicDefinition {
        name: "dFdy",
        intrinsic: Intrinsic::DFdy,
        params: &[P::Gen],
        returns: R::Gen,
        min_version: ShaderVersion::Essl100,
        stages: StageSet::FragmentOnly,
    },
    IntrinsicDefinition {
        name: "fwidth",
        intrinsic: Intrinsic::Fwidth,
        params: &[P::Gen],
        returns: R::Gen,
        min_version: ShaderVersion::Essl100,
        stages: StageSet::FragmentOnly,
    },
    // Pack/unpack
    def300("packHalf2x16", Intrinsic::PackHalf2x16, &[P::Vec2], R::UInt),
    def300(
        "unpackHalf2x16",
        Intrinsic::UnpackHalf2x16,
        &[P::GenUIntScalar],
        R::Vec2,
    ),
];

/// All signatures visible under `name` for the given version and stage.
pub fn candidates(
    name: &str,
    version: ShaderVersion,
    stage: ShaderStage,
) -> impl Iterator<Item = &'static IntrinsicDefinition> + '_ {
    DEFINITIONS.iter().filter(move |d| {
        d.name == name && version >= d.min_version && d.stages.allows(stage)
    })
}

/// Whether `name` is a builtin in any version or stage. Used for
/// redeclaration diagnostics.
pub fn is_builtin_name(name: &str) -> bool {
    DEFINITIONS.iter().any(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_lod_is_vertex_only() {
        let frag: Vec<_> =
            candidates("texture2DLod", ShaderVersion::Essl100, ShaderStage::Fragment).collect();
        assert!(frag.is_empty());
        let vert: Vec<_> =
            candidates("texture2DLod", ShaderVersion::Essl100, ShaderStage::Vertex).collect();
        assert_eq!(vert.len(), 1);
    }

    #[test]
    fn essl3_names_hidden_in_essl1() {
        let hits: Vec<_> =
            candidates("texture", ShaderVersion::Essl100, ShaderStage::Fragment).collect();
        assert!(hits.is_empty());
        let hits: Vec<_> =
            candidates("texture", ShaderVersion::Essl300, ShaderStage::Fragment).collect();
        assert!(!hits.is_empty());
    }

    #[test]
    fn dot_has_emulation_wrapper() {
        assert_eq!(Intrinsic::Dot.emulation_name(), Some("webgl_dot_emu"));
        assert_eq!(Intrinsic::Sin.emulation_name(), None);
    }
}
