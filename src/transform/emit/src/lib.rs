//! Target-language output stage.
//!
//! Each backend consumes a typed [`Module`] that has already been run
//! through the legalization passes for its target and prints source text.
//! [`reflection`] builds the variable tables independently of any target.

use esslt_lang_hir::Module;
use esslt_shared::{CompileOptions, OutputTarget};

mod writer;

pub mod glsl;
pub mod hir;
pub mod hlsl;
pub mod reflection;
pub mod wgsl;

pub use glsl::Dialect;

pub fn emit(module: &Module, target: OutputTarget, options: CompileOptions) -> String {
    match target {
        OutputTarget::Essl => glsl::emit(module, Dialect::Essl, options),
        OutputTarget::Glsl(version) => glsl::emit(module, Dialect::Glsl(version), options),
        OutputTarget::Hlsl => hlsl::emit(module),
        OutputTarget::Wgsl => wgsl::emit(module),
        OutputTarget::Hir => hir::emit(module),
    }
}
