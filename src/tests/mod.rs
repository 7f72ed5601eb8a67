use crate::{compile, CompileOptions, Input, Output, OutputTarget, ShaderStage, ShaderVersion};

mod errors;

const SIMPLE_VERT: &str = include_str!("simple.vert");
const LIGHTING_FRAG: &str = include_str!("lighting.frag");

pub fn translate(
    source: &str,
    stage: ShaderStage,
    target: OutputTarget,
    options: CompileOptions,
) -> Output {
    // Normalise line endings so git checkout settings cannot skew results
    let source = source.replace("\r\n", "\n");
    compile(Input {
        sources: &[&source],
        stage,
        version: ShaderVersion::Essl100,
        target,
        options: options | CompileOptions::OBJECT_CODE,
        directive_handler: None,
    })
    .expect("driver rejected the input")
}

fn object_code(source: &str, stage: ShaderStage, target: OutputTarget) -> String {
    let output = translate(source, stage, target, CompileOptions::empty());
    assert!(output.success, "log: {}", output.info_log);
    output.object_code.expect("no object code")
}

#[test]
fn simple_vert_to_essl() {
    let code = object_code(SIMPLE_VERT, ShaderStage::Vertex, OutputTarget::Essl);
    // Declarations carry the typer's default precisions in ESSL output
    assert!(code.contains("uniform highp mat4 mvp;"));
    assert!(code.contains("attribute highp vec3 position;"));
    assert!(code.contains("varying highp vec2 uv;"));
    assert!(code.contains("gl_Position = mvp * vec4(position, 1.0);"));
}

#[test]
fn simple_vert_to_desktop_glsl() {
    let code = object_code(SIMPLE_VERT, ShaderStage::Vertex, OutputTarget::Glsl(410));
    assert!(code.starts_with("#version 410"));
    assert!(code.contains("in vec3 position;"));
    assert!(code.contains("out vec2 uv;"));
    assert!(!code.contains("precision"));
}

#[test]
fn simple_vert_to_hlsl() {
    let code = object_code(SIMPLE_VERT, ShaderStage::Vertex, OutputTarget::Hlsl);
    assert!(code.contains("cbuffer DriverUniforms : register(b0)"));
    assert!(code.contains("float4x4 mvp;"));
    assert!(code.contains("VS_OUTPUT main(VS_INPUT input)"));
    assert!(code.contains("gl_main();"));
}

#[test]
fn simple_vert_to_wgsl() {
    let code = object_code(SIMPLE_VERT, ShaderStage::Vertex, OutputTarget::Wgsl);
    assert!(code.contains("@group(0) @binding(0) var<uniform> esslt_uniforms: DefaultUniforms;"));
    assert!(code.contains("@vertex"));
    assert!(code.contains("output.gl_Position = gl_Position;"));
}

#[test]
fn simple_vert_to_hir_dump() {
    let code = object_code(SIMPLE_VERT, ShaderStage::Vertex, OutputTarget::Hir);
    assert!(code.contains("; Vertex shader, version 100"));
    assert!(code.contains("(= gl_Position (* mvp (vec4 position 1.0)))"));
}

#[test]
fn lighting_frag_to_essl() {
    let code = object_code(LIGHTING_FRAG, ShaderStage::Fragment, OutputTarget::Essl);
    assert!(code.contains("precision mediump float;"));
    // Samplers default to lowp when the source sets no sampler precision
    assert!(code.contains("uniform lowp sampler2D albedo;"));
    assert!(code.contains("texture2D(albedo, uv)"));
}

#[test]
fn lighting_frag_to_hlsl_splits_samplers() {
    let code = object_code(LIGHTING_FRAG, ShaderStage::Fragment, OutputTarget::Hlsl);
    assert!(code.contains("Texture2D albedo_texture : register(t0);"));
    assert!(code.contains("SamplerState albedo_sampler : register(s0);"));
    assert!(code.contains("albedo_texture.Sample(albedo_sampler, uv)"));
}

#[test]
fn emulated_builtins_get_wrappers() {
    let output = translate(
        LIGHTING_FRAG,
        ShaderStage::Fragment,
        OutputTarget::Essl,
        CompileOptions::EMULATE_BUILTINS,
    );
    assert!(output.success, "log: {}", output.info_log);
    let code = output.object_code.unwrap();
    assert!(code.contains("float webgl_dot_emu(vec3 x, vec3 y)"));
    assert!(code.contains("vec3 webgl_normalize_emu(vec3 x)"));
    assert!(code.contains("webgl_dot_emu(webgl_normalize_emu(normal), light_dir)"));
}

#[test]
fn reflection_spans_both_stages() {
    let output = translate(
        LIGHTING_FRAG,
        ShaderStage::Fragment,
        OutputTarget::Essl,
        CompileOptions::VARIABLES,
    );
    let table = output.reflection.expect("no reflection table");
    assert_eq!(table.uniforms.len(), 2);
    assert!(table.uniforms.iter().any(|u| u.name == "albedo"));
    assert!(table.uniforms.iter().any(|u| u.name == "light_dir"));
    assert_eq!(table.varyings.len(), 2);
}

#[test]
fn pruned_output_is_stable() {
    let source = "uniform float unused_a; uniform float unused_b;\
                  attribute vec4 position; void main() { gl_Position = position; }";
    let first = object_code_pruned(source);
    // A pruned module has nothing left to prune
    let second = object_code_pruned(&first);
    assert!(!first.contains("unused_a"));
    assert_eq!(first, second);
}

fn object_code_pruned(source: &str) -> String {
    let output = translate(
        source,
        ShaderStage::Vertex,
        OutputTarget::Essl,
        CompileOptions::PRUNE_UNUSED,
    );
    assert!(output.success, "log: {}", output.info_log);
    output.object_code.unwrap()
}

#[test]
fn loop_guards_injected_on_request() {
    let source = "uniform int bound; attribute vec4 position;\
                  void main() { int i = 0; while (i < bound) { i++; } gl_Position = position; }";
    let output = translate(
        source,
        ShaderStage::Vertex,
        OutputTarget::Essl,
        CompileOptions::LOOP_PROGRESS_GUARDS,
    );
    assert!(output.success, "log: {}", output.info_log);
    let code = output.object_code.unwrap();
    assert!(code.contains("int esslt_loop_guard = 0;"));
    assert!(code.contains("if (++esslt_loop_guard > 65536) break;"));
}

#[test]
fn constant_folding_reaches_the_output() {
    let source = "void main() { gl_Position = vec4(1.0 + 2.0 * 3.0); }";
    let code = object_code(source, ShaderStage::Vertex, OutputTarget::Essl);
    assert!(code.contains("vec4(7.0)"));
}
