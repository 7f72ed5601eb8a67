//! Builds the variable tables handed back to the caller.

use esslt_lang_hir::reflection::{
    BlockFieldInfo, InterfaceBlockInfo, ReflectionTable, ShaderVariable,
};
use esslt_lang_hir::{GlobalStorage, GlobalVariable, Module, TypeLayout};
use esslt_shared::ShaderStage;

fn array_size(layout: &TypeLayout) -> u32 {
    match *layout {
        TypeLayout::Array(_, Some(size)) => size,
        _ => 0,
    }
}

fn variable(module: &Module, global: &GlobalVariable) -> ShaderVariable {
    ShaderVariable {
        name: global.name.clone(),
        type_name: module.type_name(&global.ty.layout),
        ty: global.ty.clone(),
        precision: global.ty.precision,
        array_size: array_size(&global.ty.layout),
        location: global.location,
        static_use: global.static_use,
    }
}

pub fn build(module: &Module) -> ReflectionTable {
    let mut table = ReflectionTable::default();
    for global in &module.globals {
        match (global.storage, module.stage) {
            (GlobalStorage::Input, ShaderStage::Vertex) => {
                table.attributes.push(variable(module, global))
            }
            (GlobalStorage::Output, ShaderStage::Vertex)
            | (GlobalStorage::Input, ShaderStage::Fragment) => {
                table.varyings.push(variable(module, global))
            }
            (GlobalStorage::Output, ShaderStage::Fragment) => {
                table.outputs.push(variable(module, global))
            }
            (GlobalStorage::Uniform, _) => table.uniforms.push(variable(module, global)),
            _ => {}
        }
    }
    for block in &module.blocks {
        table.blocks.push(InterfaceBlockInfo {
            name: block.name.clone(),
            instance_name: block.instance_name.clone(),
            layout: block.layout.name(),
            binding: block.binding,
            data_size: block.data_size.unwrap_or(0),
            fields: block
                .fields
                .iter()
                .map(|field| BlockFieldInfo {
                    name: field.name.clone(),
                    type_name: module.type_name(&field.ty.layout),
                    offset: field.offset.unwrap_or(0),
                    array_stride: field.array_stride,
                    matrix_stride: field.matrix_stride,
                    is_row_major: block.row_major,
                })
                .collect(),
        });
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::{Diagnostics, ShaderVersion};

    fn reflect(source: &str, version: ShaderVersion, stage: ShaderStage) -> ReflectionTable {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
        let text =
            esslt_transform_preprocess::preprocess(&[source], &mut handler, &mut diagnostics);
        let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
        let mut module =
            esslt_transform_ast_to_hir::type_check(&unit, version, stage, &mut diagnostics);
        assert!(!diagnostics.has_errors(), "log: {}", diagnostics.info_log());
        esslt_transform_passes::layout::run(&mut module);
        build(&module)
    }

    #[test]
    fn attributes_and_uniforms_reported() {
        let table = reflect(
            "attribute vec3 position; uniform mat4 mvp; varying vec2 uv;\
             void main() { uv = position.xy; gl_Position = mvp * vec4(position, 1.0); }",
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
        );
        assert_eq!(table.attributes.len(), 1);
        assert_eq!(table.attributes[0].name, "position");
        assert_eq!(table.attributes[0].type_name, "vec3");
        assert!(table.attributes[0].static_use);
        assert_eq!(table.uniforms.len(), 1);
        assert_eq!(table.uniforms[0].type_name, "mat4");
        assert_eq!(table.varyings.len(), 1);
        assert_eq!(table.varyings[0].name, "uv");
    }

    #[test]
    fn unreferenced_variable_loses_static_use() {
        let table = reflect(
            "attribute vec3 position; attribute vec3 unused;\
             void main() { gl_Position = vec4(position, 1.0); }",
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
        );
        assert!(table.attributes[0].static_use);
        assert!(!table.attributes[1].static_use);
    }

    #[test]
    fn array_uniform_size_reported() {
        let table = reflect(
            "uniform vec4 palette[8]; void main() { gl_Position = palette[0]; }",
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
        );
        assert_eq!(table.uniforms[0].array_size, 8);
        assert_eq!(table.uniforms[0].type_name, "vec4[8]");
    }

    #[test]
    fn block_layout_reported() {
        let table = reflect(
            "#version 300 es\n\
             layout(std140) uniform Scene { mat4 view; vec4 tint; } scene;\
             out vec4 color;\
             void main() { gl_Position = scene.view * scene.tint; color = scene.tint; }",
            ShaderVersion::Essl300,
            ShaderStage::Vertex,
        );
        assert_eq!(table.blocks.len(), 1);
        let block = &table.blocks[0];
        assert_eq!(block.name, "Scene");
        assert_eq!(block.instance_name.as_deref(), Some("scene"));
        assert_eq!(block.layout, "std140");
        assert_eq!(block.data_size, 80);
        assert_eq!(block.fields[0].offset, 0);
        assert_eq!(block.fields[0].matrix_stride, Some(16));
        assert_eq!(block.fields[1].offset, 64);
    }
}
