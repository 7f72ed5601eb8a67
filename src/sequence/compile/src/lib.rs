//! The full translation sequence, from source strings to target text.
//!
//! [`compile`] is the one public entry point. Shader errors are not Rust
//! errors: a shader that fails to translate produces an [`Output`] with
//! `success` false and the accumulated info log, matching how callers of
//! a GL driver consume compile results. [`CompileError`] is reserved for
//! misuse of the interface itself.

use esslt_lang_hir::reflection::ReflectionTable;
use esslt_lang_hir::{
    ExprKind, GlobalId, GlobalStorage, Literal, Module, ScalarType, Statement, Type, TypeLayout,
};
use esslt_shared::{
    CompileOptions, Diagnostics, OutputTarget, ShaderStage, ShaderVersion, SourceLocation,
};
use esslt_transform_passes::TargetCaps;
use esslt_transform_preprocess::{DirectiveHandler, ExtensionBehavior};
use tracing::debug;

pub struct Input<'a> {
    pub sources: &'a [&'a str],
    pub stage: ShaderStage,
    /// Version assumed when the source carries no `#version` directive.
    pub version: ShaderVersion,
    pub target: OutputTarget,
    pub options: CompileOptions,
    pub directive_handler: Option<&'a mut dyn DirectiveHandler>,
}

#[derive(Debug)]
pub struct Output {
    pub success: bool,
    pub object_code: Option<String>,
    pub info_log: String,
    pub reflection: Option<ReflectionTable>,
}

#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error("no source strings provided")]
    EmptyInput,
}

/// Forwards driver directives to the caller's handler, if any, and
/// remembers the `#version` so the sequence can pick the right language
/// rules. Without a caller handler, extensions and pragmas stay rejected.
struct DriverHandler<'a> {
    inner: Option<&'a mut dyn DirectiveHandler>,
    version: Option<u32>,
}

impl DirectiveHandler for DriverHandler<'_> {
    fn handle_version(&mut self, version: u32, loc: SourceLocation) -> bool {
        self.version = Some(version);
        let known = ShaderVersion::from_number(version as u16).is_some();
        match self.inner.as_mut() {
            Some(inner) => known && inner.handle_version(version, loc),
            None => known,
        }
    }

    fn handle_extension(
        &mut self,
        name: &str,
        behavior: ExtensionBehavior,
        loc: SourceLocation,
    ) -> bool {
        match self.inner.as_mut() {
            Some(inner) => inner.handle_extension(name, behavior, loc),
            None => false,
        }
    }

    fn handle_pragma(&mut self, name: &str, value: Option<&str>, loc: SourceLocation) -> bool {
        match self.inner.as_mut() {
            Some(inner) => inner.handle_pragma(name, value, loc),
            None => false,
        }
    }
}

pub fn compile(input: Input) -> Result<Output, CompileError> {
    if input.sources.is_empty() {
        return Err(CompileError::EmptyInput);
    }
    let span = tracing::info_span!("compile", stage = ?input.stage, target = ?input.target);
    let _enter = span.enter();

    let mut diagnostics = Diagnostics::new();
    let mut handler = DriverHandler {
        inner: input.directive_handler,
        version: None,
    };
    let text =
        esslt_transform_preprocess::preprocess(input.sources, &mut handler, &mut diagnostics);
    if diagnostics.has_errors() {
        return Ok(failure(diagnostics));
    }

    let version = handler
        .version
        .and_then(|v| ShaderVersion::from_number(v as u16))
        .unwrap_or(input.version);
    debug!(version = version.number(), "front end");

    let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
    let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
    if diagnostics.has_errors() {
        return Ok(failure(diagnostics));
    }

    let mut module =
        esslt_transform_ast_to_hir::type_check(&unit, version, input.stage, &mut diagnostics);
    esslt_transform_validate::validate(&module, &mut diagnostics);
    esslt_transform_passes::fold::run(&mut module, &mut diagnostics);
    if diagnostics.has_errors() {
        return Ok(failure(diagnostics));
    }

    if input.options.contains(CompileOptions::PRUNE_UNUSED) {
        esslt_transform_passes::prune::run(&mut module);
    }
    if input.options.contains(CompileOptions::LOOP_PROGRESS_GUARDS) {
        esslt_transform_passes::loop_progress::run(&mut module);
    }
    esslt_transform_passes::layout::run(&mut module);
    if input.options.contains(CompileOptions::INIT_OUTPUT_VARIABLES) {
        init_output_variables(&mut module);
    }
    let caps = match input.target {
        OutputTarget::Essl | OutputTarget::Glsl(_) | OutputTarget::Hir => TargetCaps::glsl(),
        OutputTarget::Hlsl => TargetCaps::hlsl(),
        OutputTarget::Wgsl => TargetCaps::wgsl(),
    };
    esslt_transform_passes::lower::run(&mut module, &caps);

    let object_code = if input.options.contains(CompileOptions::OBJECT_CODE) {
        let code = esslt_transform_emit::emit(&module, input.target, input.options);
        debug!(bytes = code.len(), "object code");
        Some(code)
    } else {
        None
    };
    let reflection = if input.options.contains(CompileOptions::VARIABLES) {
        Some(esslt_transform_emit::reflection::build(&module))
    } else {
        None
    };
    Ok(Output {
        success: true,
        object_code,
        info_log: diagnostics.info_log(),
        reflection,
    })
}

fn failure(diagnostics: Diagnostics) -> Output {
    debug!(errors = diagnostics.error_count(), "translation failed");
    Output {
        success: false,
        object_code: None,
        info_log: diagnostics.info_log(),
        reflection: None,
    }
}

fn zero_literal(scalar: ScalarType) -> Literal {
    match scalar {
        ScalarType::Bool => Literal::Bool(false),
        ScalarType::Int => Literal::Int(0),
        ScalarType::UInt => Literal::UInt(0),
        ScalarType::Float => Literal::Float(0.0),
    }
}

fn zero_value(module: &mut Module, layout: &TypeLayout) -> Option<esslt_lang_hir::ExprId> {
    let loc = SourceLocation::none();
    match *layout {
        TypeLayout::Scalar(scalar) => Some(module.alloc_expr(
            ExprKind::Literal(zero_literal(scalar)),
            Type::new(layout.clone()),
            loc,
        )),
        TypeLayout::Vector(scalar, _) => {
            let fill = module.alloc_expr(
                ExprKind::Literal(zero_literal(scalar)),
                Type::new(TypeLayout::Scalar(scalar)),
                loc,
            );
            Some(module.alloc_expr(
                ExprKind::Constructor(layout.clone(), vec![fill]),
                Type::new(layout.clone()),
                loc,
            ))
        }
        TypeLayout::Matrix(_, _) => {
            // mat(0.0) zeroes the diagonal too
            let fill = module.alloc_expr(
                ExprKind::Literal(Literal::Float(0.0)),
                Type::new(TypeLayout::Scalar(ScalarType::Float)),
                loc,
            );
            Some(module.alloc_expr(
                ExprKind::Constructor(layout.clone(), vec![fill]),
                Type::new(layout.clone()),
                loc,
            ))
        }
        _ => None,
    }
}

/// Writes zeros into every output variable at the top of `main`, so that
/// paths which never assign an output still produce defined values.
fn init_output_variables(module: &mut Module) {
    let main = match module.main_function() {
        Some(id) => id,
        None => return,
    };
    let loc = SourceLocation::none();
    let mut writes = Vec::new();
    for index in 0..module.globals.len() {
        let id = GlobalId(index as u32);
        let (storage, layout) = {
            let global = module.global(id);
            (global.storage, global.ty.layout.clone())
        };
        if storage != GlobalStorage::Output {
            continue;
        }
        match layout {
            TypeLayout::Array(ref element, Some(size)) => {
                for slot in 0..size {
                    let value = match zero_value(module, element) {
                        Some(value) => value,
                        None => break,
                    };
                    let base = module.alloc_expr(
                        ExprKind::Global(id),
                        Type::new(layout.clone()),
                        loc,
                    );
                    let subscript = module.alloc_expr(
                        ExprKind::Literal(Literal::Int(slot as i32)),
                        Type::new(TypeLayout::Scalar(ScalarType::Int)),
                        loc,
                    );
                    let target = module.alloc_expr(
                        ExprKind::Index(base, subscript),
                        Type::new((**element).clone()),
                        loc,
                    );
                    let assign = module.alloc_expr(
                        ExprKind::Assign(None, target, value),
                        Type::new((**element).clone()),
                        loc,
                    );
                    writes.push(Statement::Expression(assign));
                }
            }
            ref element => {
                let value = match zero_value(module, element) {
                    Some(value) => value,
                    None => continue,
                };
                let target =
                    module.alloc_expr(ExprKind::Global(id), Type::new(element.clone()), loc);
                let assign = module.alloc_expr(
                    ExprKind::Assign(None, target, value),
                    Type::new(element.clone()),
                    loc,
                );
                writes.push(Statement::Expression(assign));
            }
        }
    }
    module.functions[main.0 as usize].body.splice(0..0, writes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, stage: ShaderStage, target: OutputTarget, options: CompileOptions) -> Output {
        compile(Input {
            sources: &[source],
            stage,
            version: ShaderVersion::Essl100,
            target,
            options,
            directive_handler: None,
        })
        .unwrap()
    }

    #[test]
    fn empty_input_is_rejected() {
        let result = compile(Input {
            sources: &[],
            stage: ShaderStage::Vertex,
            version: ShaderVersion::Essl100,
            target: OutputTarget::Essl,
            options: CompileOptions::OBJECT_CODE,
            directive_handler: None,
        });
        assert!(matches!(result, Err(CompileError::EmptyInput)));
    }

    #[test]
    fn vertex_shader_translates_to_essl() {
        let output = run(
            "attribute vec4 position; void main() { gl_Position = position; }",
            ShaderStage::Vertex,
            OutputTarget::Essl,
            CompileOptions::OBJECT_CODE,
        );
        assert!(output.success, "log: {}", output.info_log);
        let code = output.object_code.unwrap();
        assert!(code.contains("attribute highp vec4 position;"));
        assert!(code.contains("void main()"));
        assert!(output.reflection.is_none());
    }

    #[test]
    fn version_directive_overrides_default() {
        let output = run(
            "#version 300 es\nin vec4 position; void main() { gl_Position = position; }",
            ShaderStage::Vertex,
            OutputTarget::Essl,
            CompileOptions::OBJECT_CODE,
        );
        assert!(output.success, "log: {}", output.info_log);
        let code = output.object_code.unwrap();
        assert!(code.starts_with("#version 300 es"));
        assert!(code.contains("in vec4 position;"));
    }

    #[test]
    fn broken_shader_reports_failure() {
        let output = run(
            "void main() { gl_Position = missing; }",
            ShaderStage::Vertex,
            OutputTarget::Essl,
            CompileOptions::OBJECT_CODE,
        );
        assert!(!output.success);
        assert!(output.object_code.is_none());
        assert!(output.info_log.contains("missing"));
    }

    #[test]
    fn reflection_is_collected_on_request() {
        let output = run(
            "attribute vec3 position; uniform mat4 mvp;\
             void main() { gl_Position = mvp * vec4(position, 1.0); }",
            ShaderStage::Vertex,
            OutputTarget::Essl,
            CompileOptions::OBJECT_CODE | CompileOptions::VARIABLES,
        );
        let table = output.reflection.unwrap();
        assert_eq!(table.attributes[0].name, "position");
        assert_eq!(table.uniforms[0].name, "mvp");
    }

    #[test]
    fn prune_removes_unused_globals_from_output() {
        let output = run(
            "uniform float unused; attribute vec4 position;\
             void main() { gl_Position = position; }",
            ShaderStage::Vertex,
            OutputTarget::Essl,
            CompileOptions::OBJECT_CODE | CompileOptions::PRUNE_UNUSED,
        );
        let code = output.object_code.unwrap();
        assert!(!code.contains("unused"));
    }

    #[test]
    fn output_variables_are_zero_initialized() {
        let output = run(
            "#version 300 es\nprecision mediump float; out vec4 color;\
             void main() { if (false) { color = vec4(1.0); } }",
            ShaderStage::Fragment,
            OutputTarget::Essl,
            CompileOptions::OBJECT_CODE | CompileOptions::INIT_OUTPUT_VARIABLES,
        );
        assert!(output.success, "log: {}", output.info_log);
        let code = output.object_code.unwrap();
        assert!(code.contains("color = vec4(0.0);"));
    }

    #[test]
    fn loop_guards_survive_to_hlsl() {
        let output = run(
            "uniform int n; attribute vec4 position;\
             void main() { for (int i = 0; i < n; i++) { } gl_Position = position; }",
            ShaderStage::Vertex,
            OutputTarget::Hlsl,
            CompileOptions::OBJECT_CODE | CompileOptions::LOOP_PROGRESS_GUARDS,
        );
        assert!(output.success, "log: {}", output.info_log);
        let code = output.object_code.unwrap();
        assert!(code.contains("esslt_loop_guard"));
    }

    #[test]
    fn hir_dump_target() {
        let output = run(
            "attribute vec4 position; void main() { gl_Position = position; }",
            ShaderStage::Vertex,
            OutputTarget::Hir,
            CompileOptions::OBJECT_CODE,
        );
        let code = output.object_code.unwrap();
        assert!(code.contains("; Vertex shader, version 100"));
        assert!(code.contains("fn main() -> void"));
    }
}
