//! GLSL ES source-to-source shader translator.
//!
//! The pipeline crates do the work; this crate stitches them together into
//! one public surface. Most callers only need [`compile`] with an [`Input`]
//! describing the shader and the requested output target.

pub use esslt_shared::{
    parse_array_name, CompileOptions, Diagnostic, Diagnostics, OutputTarget, Severity,
    ShaderStage, ShaderVersion, SourceLocation, INVALID_INDEX,
};

pub use esslt_transform_preprocess::{
    DirectiveHandler, ExtensionBehavior, NullDirectiveHandler,
};

pub use esslt_lang_hir::reflection::{
    BlockFieldInfo, InterfaceBlockInfo, ReflectionTable, ShaderVariable,
};

pub use esslt_sequence_compile::{compile, CompileError, Input, Output};

/// The typed IR, for callers that consume the `Hir` target or plug in
/// their own code generator.
pub use esslt_lang_hir as hir;

#[cfg(test)]
pub mod tests;
