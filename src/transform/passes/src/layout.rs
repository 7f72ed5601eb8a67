//! std140 layout assignment.
//!
//! Computes byte offsets and strides for interface block fields and for the
//! default uniform block (loose uniforms), and flags the fields whose wire
//! layout a WGSL target cannot express directly.

use esslt_lang_hir::{GlobalStorage, Module, ScalarType, TypeLayout};

fn align_to(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}

/// std140 (size, base alignment) of a layout.
fn size_and_align(module: &Module, layout: &TypeLayout) -> (u32, u32) {
    match *layout {
        TypeLayout::Scalar(_) => (4, 4),
        TypeLayout::Vector(_, 2) => (8, 8),
        TypeLayout::Vector(_, 3) => (12, 16),
        TypeLayout::Vector(_, _) => (16, 16),
        TypeLayout::Matrix(c, _) => (c * 16, 16),
        TypeLayout::Array(ref inner, size) => {
            let stride = array_stride(module, inner);
            (stride * size.unwrap_or(0), 16)
        }
        TypeLayout::Struct(id) => {
            let mut cursor = 0;
            let mut align = 16;
            for member in &module.struct_def(id).members {
                let (size, member_align) = size_and_align(module, &member.ty.layout);
                align = align.max(align_to(member_align, 16));
                cursor = align_to(cursor, member_align) + size;
            }
            (align_to(cursor, align), align)
        }
        _ => (0, 4),
    }
}

/// std140 array element stride: element size rounded up to vec4 alignment.
fn array_stride(module: &Module, element: &TypeLayout) -> u32 {
    let (size, align) = size_and_align(module, element);
    align_to(size, align.max(16))
}

/// Whether a WGSL uniform buffer can carry this field without a padded
/// wrapper type.
fn needs_carrier(module: &Module, layout: &TypeLayout) -> bool {
    match *layout {
        TypeLayout::Scalar(ScalarType::Bool) | TypeLayout::Vector(ScalarType::Bool, _) => true,
        TypeLayout::Matrix(_, 2) => true,
        TypeLayout::Array(ref inner, _) => {
            let (size, _) = size_and_align(module, inner);
            size % 16 != 0 || needs_carrier(module, inner)
        }
        TypeLayout::Struct(id) => module
            .struct_def(id)
            .members
            .iter()
            .any(|m| needs_carrier(module, &m.ty.layout)),
        _ => false,
    }
}

pub fn run(module: &mut Module) {
    for index in 0..module.blocks.len() {
        let mut cursor = 0;
        for field_index in 0..module.blocks[index].fields.len() {
            let layout = module.blocks[index].fields[field_index].ty.layout.clone();
            let (size, align) = size_and_align(module, &layout);
            let offset = align_to(cursor, align);
            cursor = offset + size;

            let field_array_stride = match layout {
                TypeLayout::Array(ref inner, _) => Some(array_stride(module, inner)),
                _ => None,
            };
            let field_matrix_stride = match layout {
                TypeLayout::Matrix(_, _) => Some(16),
                TypeLayout::Array(ref inner, _) if matches!(**inner, TypeLayout::Matrix(_, _)) => {
                    Some(16)
                }
                _ => None,
            };
            let carrier = needs_carrier(module, &layout);

            let field = &mut module.blocks[index].fields[field_index];
            field.offset = Some(offset);
            field.array_stride = field_array_stride;
            field.matrix_stride = field_matrix_stride;
            field.needs_carrier = carrier;
        }
        module.blocks[index].data_size = Some(align_to(cursor, 16));
    }

    // Loose uniforms share one implicit block per module
    let mut cursor = 0;
    for index in 0..module.globals.len() {
        let global = &module.globals[index];
        if global.storage != GlobalStorage::Uniform {
            continue;
        }
        let layout = global.ty.layout.clone();
        if matches!(layout, TypeLayout::Sampler(_))
            || matches!(layout, TypeLayout::Array(ref inner, _) if matches!(**inner, TypeLayout::Sampler(_)))
        {
            continue;
        }
        let (size, align) = size_and_align(module, &layout);
        let offset = align_to(cursor, align);
        cursor = offset + size;
        module.globals[index].block_offset = Some(offset);
    }
    module.default_block_size = align_to(cursor, 16);
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::{Diagnostics, ShaderStage, ShaderVersion};

    fn layout_shader(source: &str) -> Module {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
        let text =
            esslt_transform_preprocess::preprocess(&[source], &mut handler, &mut diagnostics);
        let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
        let mut module = esslt_transform_ast_to_hir::type_check(
            &unit,
            ShaderVersion::Essl300,
            ShaderStage::Vertex,
            &mut diagnostics,
        );
        assert!(!diagnostics.has_errors(), "log: {}", diagnostics.info_log());
        run(&mut module);
        module
    }

    #[test]
    fn scalar_vec3_scalar_offsets() {
        let module = layout_shader(
            "#version 300 es\n\
             layout(std140) uniform Data { float a; vec3 b; float c; };\
             void main() { gl_Position = vec4(a + b.x + c); }",
        );
        let fields = &module.blocks[0].fields;
        assert_eq!(fields[0].offset, Some(0));
        assert_eq!(fields[1].offset, Some(16));
        assert_eq!(fields[2].offset, Some(28));
        assert_eq!(module.blocks[0].data_size, Some(32));
    }

    #[test]
    fn float_array_stride_is_sixteen() {
        let module = layout_shader(
            "#version 300 es\n\
             layout(std140) uniform Data { float values[4]; float tail; };\
             void main() { gl_Position = vec4(values[0] + tail); }",
        );
        let fields = &module.blocks[0].fields;
        assert_eq!(fields[0].array_stride, Some(16));
        assert_eq!(fields[1].offset, Some(64));
        assert!(fields[0].needs_carrier);
    }

    #[test]
    fn matrix_field_layout() {
        let module = layout_shader(
            "#version 300 es\n\
             layout(std140) uniform Data { mat4 m; vec2 v; };\
             void main() { gl_Position = m * vec4(v, 0.0, 1.0); }",
        );
        let fields = &module.blocks[0].fields;
        assert_eq!(fields[0].offset, Some(0));
        assert_eq!(fields[0].matrix_stride, Some(16));
        assert_eq!(fields[1].offset, Some(64));
        assert!(!fields[0].needs_carrier);
    }

    #[test]
    fn mat2_needs_carrier() {
        let module = layout_shader(
            "#version 300 es\n\
             layout(std140) uniform Data { mat2 m; };\
             void main() { gl_Position = vec4(m[0], 0.0, 1.0); }",
        );
        assert!(module.blocks[0].fields[0].needs_carrier);
    }

    #[test]
    fn bool_field_needs_carrier() {
        let module = layout_shader(
            "#version 300 es\n\
             layout(std140) uniform Data { bool flag; };\
             void main() { gl_Position = vec4(flag ? 1.0 : 0.0); }",
        );
        assert!(module.blocks[0].fields[0].needs_carrier);
    }

    #[test]
    fn loose_uniforms_get_default_block_offsets() {
        let module = layout_shader(
            "#version 300 es\n\
             uniform float scale; uniform vec3 offset;\
             void main() { gl_Position = vec4(offset * scale, 1.0); }",
        );
        assert_eq!(module.globals[0].block_offset, Some(0));
        assert_eq!(module.globals[1].block_offset, Some(16));
        assert_eq!(module.default_block_size, 32);
    }

    #[test]
    fn samplers_stay_out_of_the_default_block() {
        let module = layout_shader(
            "#version 300 es\n\
             uniform sampler2D tex; uniform float scale;\
             void main() { gl_Position = vec4(scale); }",
        );
        assert_eq!(module.globals[0].block_offset, None);
        assert_eq!(module.globals[1].block_offset, Some(0));
        assert_eq!(module.default_block_size, 16);
    }
}
