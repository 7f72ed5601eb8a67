//! Shared vocabulary for the translator pipeline: source locations,
//! shader descriptors, diagnostics and compile options.

use std::fmt;

pub mod diagnostics;

pub use diagnostics::{Diagnostic, DiagnosticId, Diagnostics, Severity};

/// A location in the input, packed as (source string index, line number).
///
/// Columns are not tracked: the preprocessor rewrites text heavily enough
/// that only line identity survives macro substitution.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct SourceLocation {
    pub file: u16,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: u16, line: u32) -> SourceLocation {
        SourceLocation { file, line }
    }

    pub fn none() -> SourceLocation {
        SourceLocation { file: 0, line: 0 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Wrapper to pair a node with a SourceLocation
#[derive(PartialEq, Debug, Clone)]
pub struct Located<T> {
    pub node: T,
    pub location: SourceLocation,
}

impl<T> Located<T> {
    pub fn new(node: T, location: SourceLocation) -> Located<T> {
        Located { node, location }
    }

    pub fn none(node: T) -> Located<T> {
        Located {
            node,
            location: SourceLocation::none(),
        }
    }

    pub fn to_node(self) -> T {
        self.node
    }
}

impl<T> std::ops::Deref for Located<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.node
    }
}

/// The pipeline stage a shader runs at.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// The ESSL language version of the input, selected by `#version`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum ShaderVersion {
    Essl100,
    Essl300,
    Essl310,
}

impl ShaderVersion {
    pub fn from_number(number: u16) -> Option<ShaderVersion> {
        match number {
            100 => Some(ShaderVersion::Essl100),
            300 => Some(ShaderVersion::Essl300),
            310 => Some(ShaderVersion::Essl310),
            _ => None,
        }
    }

    pub fn number(self) -> u16 {
        match self {
            ShaderVersion::Essl100 => 100,
            ShaderVersion::Essl300 => 300,
            ShaderVersion::Essl310 => 310,
        }
    }

    pub fn supports_arrays_of_arrays(self) -> bool {
        self >= ShaderVersion::Essl310
    }

    pub fn supports_uint(self) -> bool {
        self >= ShaderVersion::Essl300
    }

    pub fn supports_interface_blocks(self) -> bool {
        self >= ShaderVersion::Essl300
    }

    pub fn supports_location_qualifier(self) -> bool {
        self >= ShaderVersion::Essl300
    }

    pub fn supports_samplers_in_structs(self) -> bool {
        // Opaque struct members were only relaxed in 3.10
        self >= ShaderVersion::Essl310
    }
}

/// The language a compile emits.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum OutputTarget {
    /// ESSL at the same version as the input
    Essl,
    /// Desktop GLSL at the given version number (e.g. 410, 450)
    Glsl(u16),
    Hlsl,
    Wgsl,
    /// Textual dump of the typed IR, for a native code generator
    Hir,
}

bitflags::bitflags! {
    /// Per-compile behavior switches, the `options` argument of `compile()`.
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    pub struct CompileOptions: u32 {
        /// Produce translated object code
        const OBJECT_CODE           = 0x01;
        /// Collect the reflection table
        const VARIABLES             = 0x02;
        /// Route selected builtins through webgl_*_emu helpers
        const EMULATE_BUILTINS      = 0x04;
        /// Remove unused variables and functions
        const PRUNE_UNUSED          = 0x08;
        /// Zero-initialize output variables at the top of main
        const INIT_OUTPUT_VARIABLES = 0x10;
        /// Inject forward-progress guards into unprovable loops
        const LOOP_PROGRESS_GUARDS  = 0x20;
    }
}

/// Sentinel for an array index that failed to parse (e.g. `foo[-1]`).
pub const INVALID_INDEX: u32 = u32::MAX;

/// Splits a reflection resource name into its base name and subscript list.
///
/// Indices are returned outermost-last: `foo[12][34][56]` yields
/// `("foo", [56, 34, 12])`. A subscript that is not a plain decimal number
/// becomes `INVALID_INDEX`. Names that do not end directly in `]` (including
/// names with trailing whitespace) yield no indices at all.
pub fn parse_array_name(name: &str) -> (String, Vec<u32>) {
    let mut base = name;
    let mut indices = Vec::new();
    while base.ends_with(']') {
        let open = match base.rfind('[') {
            Some(sz) => sz,
            None => break,
        };
        let digits = &base[(open + 1)..(base.len() - 1)];
        let index = if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse::<u32>().unwrap_or(INVALID_INDEX)
        } else {
            INVALID_INDEX
        };
        indices.push(index);
        base = &base[..open];
    }
    (base.to_string(), indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_array_name_plain() {
        assert_eq!(parse_array_name("foo"), ("foo".to_string(), vec![]));
        assert_eq!(parse_array_name("foo[0]"), ("foo".to_string(), vec![0]));
    }

    #[test]
    fn parse_array_name_nested() {
        assert_eq!(
            parse_array_name("foo[12][34][56]"),
            ("foo".to_string(), vec![56, 34, 12])
        );
    }

    #[test]
    fn parse_array_name_invalid_index() {
        assert_eq!(
            parse_array_name("foo[-1]"),
            ("foo".to_string(), vec![INVALID_INDEX])
        );
        assert_eq!(
            parse_array_name("foo[]"),
            ("foo".to_string(), vec![INVALID_INDEX])
        );
    }

    #[test]
    fn parse_array_name_trailing_whitespace() {
        assert_eq!(parse_array_name("foo[1] "), ("foo[1] ".to_string(), vec![]));
    }

    #[test]
    fn version_gates() {
        assert!(!ShaderVersion::Essl100.supports_uint());
        assert!(ShaderVersion::Essl300.supports_uint());
        assert!(!ShaderVersion::Essl300.supports_arrays_of_arrays());
        assert!(ShaderVersion::Essl310.supports_arrays_of_arrays());
    }
}
