//! WGSL output.
//!
//! The GL shader interface maps onto module-scope `var<private>` globals,
//! copied from and to annotated entry-point structs by a generated wrapper
//! around the renamed user `main`. Loose uniforms collapse into one
//! uniform-buffer struct; planned sampler splits become separate texture
//! and sampler bindings. Runs after `lower` with the WGSL capability set,
//! so assignments and increments only appear in statement position and
//! multi-component swizzle stores are already expanded.

use esslt_lang_hir::{
    BuiltinVar, CaseLabel, ExprId, ExprKind, ForInit, FunctionDefinition, GlobalStorage,
    Intrinsic, Literal, Module, ParamDirection, RootDefinition, SamplerType, ScalarType,
    Statement, TypeLayout, UnaryOp,
};
use esslt_shared::ShaderStage;

use crate::writer::{bin_op_precedence, bin_op_symbol, float_literal, Writer};

const UNIFORMS_NAME: &str = "esslt_uniforms";

pub fn emit(module: &Module) -> String {
    let emitter = Emitter {
        module,
        used_builtins: collect_builtins(module),
    };
    let mut writer = Writer::new();
    emitter.structs(&mut writer);
    emitter.uniform_buffers(&mut writer);
    emitter.texture_bindings(&mut writer);
    emitter.private_globals(&mut writer);
    emitter.io_structs(&mut writer);
    for def in &module.root_order {
        if let RootDefinition::Function(id) = *def {
            emitter.function(id, &mut writer);
        }
    }
    emitter.entry_point(&mut writer);
    writer.finish()
}

fn collect_builtins(module: &Module) -> Vec<BuiltinVar> {
    let mut found = Vec::new();
    for id in module.exprs.handles() {
        if let ExprKind::Builtin(builtin) = module.expr(id).kind {
            if !found.contains(&builtin) {
                found.push(builtin);
            }
        }
    }
    found
}

fn scalar_name(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Bool => "bool",
        ScalarType::Int => "i32",
        ScalarType::UInt => "u32",
        ScalarType::Float => "f32",
    }
}

fn type_name(module: &Module, layout: &TypeLayout) -> String {
    match *layout {
        TypeLayout::Void => unreachable!("void has no WGSL spelling"),
        TypeLayout::Scalar(scalar) => scalar_name(scalar).to_string(),
        TypeLayout::Vector(scalar, size) => format!("vec{}<{}>", size, scalar_name(scalar)),
        TypeLayout::Matrix(c, r) => format!("mat{}x{}<f32>", c, r),
        TypeLayout::Sampler(_) => "sampler".to_string(),
        TypeLayout::Struct(id) => module.struct_def(id).name.clone(),
        TypeLayout::Array(ref inner, size) => match size {
            Some(n) => format!("array<{}, {}>", type_name(module, inner), n),
            None => format!("array<{}>", type_name(module, inner)),
        },
        TypeLayout::Error => "<error>".to_string(),
    }
}

fn texture_type(sampler: SamplerType) -> &'static str {
    match sampler {
        SamplerType::Sampler2D => "texture_2d<f32>",
        SamplerType::Sampler3D => "texture_3d<f32>",
        SamplerType::SamplerCube => "texture_cube<f32>",
        SamplerType::Sampler2DArray => "texture_2d_array<f32>",
        SamplerType::Sampler2DShadow => "texture_depth_2d",
        SamplerType::SamplerCubeShadow => "texture_depth_cube",
    }
}

/// bool has no uniform-buffer representation; carrier fields are stored
/// as u32 and compared on read.
fn field_type_name(module: &Module, layout: &TypeLayout) -> String {
    match *layout {
        TypeLayout::Scalar(ScalarType::Bool) => "u32".to_string(),
        TypeLayout::Vector(ScalarType::Bool, size) => format!("vec{}<u32>", size),
        _ => type_name(module, layout),
    }
}

fn is_bool_carrier(layout: &TypeLayout) -> bool {
    matches!(
        *layout,
        TypeLayout::Scalar(ScalarType::Bool) | TypeLayout::Vector(ScalarType::Bool, _)
    )
}

struct Emitter<'m> {
    module: &'m Module,
    used_builtins: Vec<BuiltinVar>,
}

impl<'m> Emitter<'m> {
    fn loose_uniforms(&self) -> Vec<&'m esslt_lang_hir::GlobalVariable> {
        self.module
            .globals
            .iter()
            .filter(|g| g.storage == GlobalStorage::Uniform)
            .filter(|g| !g.ty.layout.is_opaque())
            .filter(|g| !matches!(g.ty.layout, TypeLayout::Array(ref inner, _) if inner.is_opaque()))
            .collect()
    }

    fn structs(&self, writer: &mut Writer) {
        for def in &self.module.root_order {
            let id = match *def {
                RootDefinition::Struct(id) => id,
                _ => continue,
            };
            let s = self.module.struct_def(id);
            writer.line();
            writer.write(&format!("struct {} {{", s.name));
            writer.indent();
            for member in &s.members {
                writer.line();
                writer.write(&format!(
                    "{}: {},",
                    member.name,
                    type_name(self.module, &member.ty.layout)
                ));
            }
            writer.unindent();
            writer.line();
            writer.write("};");
        }
    }

    fn uniform_buffers(&self, writer: &mut Writer) {
        let mut binding = 0;
        let loose = self.loose_uniforms();
        if !loose.is_empty() {
            writer.line();
            writer.write("struct DefaultUniforms {");
            writer.indent();
            for global in &loose {
                writer.line();
                writer.write(&format!(
                    "@align(16) {}: {},",
                    global.name,
                    field_type_name(self.module, &global.ty.layout)
                ));
            }
            writer.unindent();
            writer.line();
            writer.write("};");
            writer.line();
            writer.write(&format!(
                "@group(0) @binding({}) var<uniform> {}: DefaultUniforms;",
                binding, UNIFORMS_NAME
            ));
            binding += 1;
        }
        for block in &self.module.blocks {
            writer.line();
            writer.write(&format!("struct {}_Data {{", block.name));
            writer.indent();
            for field in &block.fields {
                writer.line();
                if field.needs_carrier {
                    writer.write("@align(16) ");
                }
                writer.write(&format!(
                    "{}: {},",
                    field.name,
                    field_type_name(self.module, &field.ty.layout)
                ));
            }
            writer.unindent();
            writer.line();
            writer.write("};");
            writer.line();
            writer.write(&format!(
                "@group(0) @binding({}) var<uniform> {}: {}_Data;",
                block.binding.unwrap_or(binding),
                self.block_instance(block),
                block.name
            ));
            binding += 1;
        }
    }

    fn block_instance(&self, block: &esslt_lang_hir::InterfaceBlock) -> String {
        match block.instance_name {
            Some(ref instance) => instance.clone(),
            None => format!("{}_fields", block.name),
        }
    }

    fn texture_bindings(&self, writer: &mut Writer) {
        for (index, split) in self.module.sampler_splits.iter().enumerate() {
            let global = self.module.global(split.global);
            let sampler = match global.ty.layout {
                TypeLayout::Sampler(sampler) => sampler,
                TypeLayout::Array(ref inner, _) => match **inner {
                    TypeLayout::Sampler(sampler) => sampler,
                    _ => continue,
                },
                _ => continue,
            };
            writer.line();
            writer.write(&format!(
                "@group(1) @binding({}) var {}: {};",
                index * 2,
                split.texture_name,
                texture_type(sampler)
            ));
            writer.line();
            let state = if sampler.is_shadow() {
                "sampler_comparison"
            } else {
                "sampler"
            };
            writer.write(&format!(
                "@group(1) @binding({}) var {}: {};",
                index * 2 + 1,
                split.sampler_name,
                state
            ));
        }
    }

    fn private_globals(&self, writer: &mut Writer) {
        for global in &self.module.globals {
            match global.storage {
                GlobalStorage::Const => {
                    writer.line();
                    writer.write(&format!(
                        "const {}: {} = ",
                        global.name,
                        type_name(self.module, &global.ty.layout)
                    ));
                    if let Some(init) = global.init {
                        self.expr(init, None, 16, writer);
                    }
                    writer.write(";");
                }
                GlobalStorage::Input | GlobalStorage::Output | GlobalStorage::Plain => {
                    writer.line();
                    writer.write(&format!(
                        "var<private> {}: {}",
                        global.name,
                        type_name(self.module, &global.ty.layout)
                    ));
                    if let Some(init) = global.init {
                        writer.write(" = ");
                        self.expr(init, None, 16, writer);
                    }
                    writer.write(";");
                }
                GlobalStorage::Uniform => {}
            }
        }
        for &builtin in &self.used_builtins {
            writer.line();
            let ty = match builtin {
                BuiltinVar::FragDepth | BuiltinVar::PointSize => "f32",
                BuiltinVar::FrontFacing => "bool",
                BuiltinVar::VertexId | BuiltinVar::InstanceId => "i32",
                BuiltinVar::PointCoord => "vec2<f32>",
                BuiltinVar::FragData => "array<vec4<f32>, 4>",
                _ => "vec4<f32>",
            };
            writer.write(&format!("var<private> {}: {};", builtin.name(), ty));
        }
        if self.uses_loop_guard() {
            writer.line();
            writer.write("var<private> esslt_loop_guard: i32 = 0;");
        }
    }

    fn uses_loop_guard(&self) -> bool {
        self.module.functions.iter().any(|function| {
            let mut found = false;
            visit(&function.body, &mut |statement| {
                if *statement == Statement::ForwardProgressGuard {
                    found = true;
                }
            });
            found
        })
    }

    fn varyings(&self) -> Vec<&'m esslt_lang_hir::GlobalVariable> {
        let wanted = match self.module.stage {
            ShaderStage::Vertex => GlobalStorage::Output,
            ShaderStage::Fragment => GlobalStorage::Input,
            ShaderStage::Compute => return Vec::new(),
        };
        self.module
            .globals
            .iter()
            .filter(|g| g.storage == wanted)
            .collect()
    }

    fn io_structs(&self, writer: &mut Writer) {
        match self.module.stage {
            ShaderStage::Vertex => {
                let inputs: Vec<_> = self
                    .module
                    .globals
                    .iter()
                    .filter(|g| g.storage == GlobalStorage::Input)
                    .collect();
                writer.line();
                writer.write("struct VertexInput {");
                writer.indent();
                for (slot, global) in inputs.iter().enumerate() {
                    writer.line();
                    writer.write(&format!(
                        "@location({}) {}: {},",
                        global.location.unwrap_or(slot as u32),
                        global.name,
                        type_name(self.module, &global.ty.layout)
                    ));
                }
                if self.used_builtins.contains(&BuiltinVar::VertexId) {
                    writer.line();
                    writer.write("@builtin(vertex_index) gl_VertexID: u32,");
                }
                if self.used_builtins.contains(&BuiltinVar::InstanceId) {
                    writer.line();
                    writer.write("@builtin(instance_index) gl_InstanceID: u32,");
                }
                writer.unindent();
                writer.line();
                writer.write("};");

                writer.line();
                writer.write("struct VertexOutput {");
                writer.indent();
                writer.line();
                writer.write("@builtin(position) gl_Position: vec4<f32>,");
                for (slot, global) in self.varyings().iter().enumerate() {
                    writer.line();
                    writer.write(&format!(
                        "@location({}) {}: {},",
                        global.location.unwrap_or(slot as u32),
                        global.name,
                        type_name(self.module, &global.ty.layout)
                    ));
                }
                writer.unindent();
                writer.line();
                writer.write("};");
            }
            ShaderStage::Fragment => {
                writer.line();
                writer.write("struct FragmentInput {");
                writer.indent();
                if self.used_builtins.contains(&BuiltinVar::FragCoord) {
                    writer.line();
                    writer.write("@builtin(position) gl_FragCoord: vec4<f32>,");
                }
                if self.used_builtins.contains(&BuiltinVar::FrontFacing) {
                    writer.line();
                    writer.write("@builtin(front_facing) gl_FrontFacing: bool,");
                }
                for (slot, global) in self.varyings().iter().enumerate() {
                    writer.line();
                    writer.write(&format!(
                        "@location({}) {}: {},",
                        global.location.unwrap_or(slot as u32),
                        global.name,
                        type_name(self.module, &global.ty.layout)
                    ));
                }
                writer.unindent();
                writer.line();
                writer.write("};");

                writer.line();
                writer.write("struct FragmentOutput {");
                writer.indent();
                let mut slot = 0;
                for global in &self.module.globals {
                    if global.storage != GlobalStorage::Output {
                        continue;
                    }
                    writer.line();
                    writer.write(&format!(
                        "@location({}) {}: {},",
                        global.location.unwrap_or(slot),
                        global.name,
                        type_name(self.module, &global.ty.layout)
                    ));
                    slot += 1;
                }
                if self.used_builtins.contains(&BuiltinVar::FragColor) {
                    writer.line();
                    writer.write("@location(0) gl_FragColor: vec4<f32>,");
                }
                if self.used_builtins.contains(&BuiltinVar::FragDepth) {
                    writer.line();
                    writer.write("@builtin(frag_depth) gl_FragDepth: f32,");
                }
                writer.unindent();
                writer.line();
                writer.write("};");
            }
            ShaderStage::Compute => {}
        }
    }

    fn user_name(&self, id: esslt_lang_hir::FunctionId) -> String {
        let name = &self.module.function(id).name;
        if name == "main" {
            "esslt_main".to_string()
        } else {
            name.clone()
        }
    }

    fn function(&self, id: esslt_lang_hir::FunctionId, writer: &mut Writer) {
        let function = self.module.function(id);
        if !function.defined {
            return;
        }
        writer.line();
        writer.write(&format!("fn {}(", self.user_name(id)));
        for (index, param) in function.params.iter().enumerate() {
            if index > 0 {
                writer.write(", ");
            }
            match param.direction {
                ParamDirection::In => writer.write(&format!(
                    "{}: {}",
                    param.name,
                    type_name(self.module, &param.ty.layout)
                )),
                ParamDirection::Out | ParamDirection::InOut => writer.write(&format!(
                    "{}: ptr<function, {}>",
                    param.name,
                    type_name(self.module, &param.ty.layout)
                )),
            }
        }
        writer.write(")");
        if function.return_type.layout != TypeLayout::Void {
            writer.write(&format!(
                " -> {}",
                type_name(self.module, &function.return_type.layout)
            ));
        }
        writer.write(" {");
        writer.indent();
        self.statements(&function.body, function, writer);
        writer.unindent();
        writer.line();
        writer.write("}");
    }

    fn statements(
        &self,
        statements: &[Statement],
        function: &FunctionDefinition,
        writer: &mut Writer,
    ) {
        for statement in statements {
            self.statement(statement, function, writer);
        }
    }

    fn statement(
        &self,
        statement: &Statement,
        function: &FunctionDefinition,
        writer: &mut Writer,
    ) {
        let f = Some(function);
        match *statement {
            Statement::Expression(id) => {
                writer.line();
                self.expr(id, f, 16, writer);
                writer.write(";");
            }
            Statement::Var(ref def) => {
                writer.line();
                let local = &function.locals[def.id.0 as usize];
                writer.write(&format!(
                    "var {}: {}",
                    local.name,
                    type_name(self.module, &local.ty.layout)
                ));
                if let Some(init) = def.init {
                    writer.write(" = ");
                    self.expr(init, f, 16, writer);
                }
                writer.write(";");
            }
            Statement::Block(ref inner) => {
                writer.line();
                writer.write("{");
                writer.indent();
                self.statements(inner, function, writer);
                writer.unindent();
                writer.line();
                writer.write("}");
            }
            Statement::If(cond, ref then_block, ref else_block) => {
                writer.line();
                writer.write("if (");
                self.expr(cond, f, 16, writer);
                writer.write(") {");
                writer.indent();
                self.statements(then_block, function, writer);
                writer.unindent();
                writer.line();
                writer.write("}");
                if let Some(else_block) = else_block {
                    writer.write(" else {");
                    writer.indent();
                    self.statements(else_block, function, writer);
                    writer.unindent();
                    writer.line();
                    writer.write("}");
                }
            }
            Statement::For(ref init, cond, step, ref body) => {
                // WGSL for-init takes one declaration; a multi-declarator
                // init moves in front of the loop, in order
                let mut header_init = init;
                if let ForInit::Definition(ref defs) = *init {
                    if defs.len() > 1 {
                        for def in defs {
                            self.statement(&Statement::Var(def.clone()), function, writer);
                        }
                        header_init = &ForInit::Empty;
                    }
                }
                writer.line();
                writer.write("for (");
                match *header_init {
                    ForInit::Empty => {}
                    ForInit::Expression(id) => self.expr(id, f, 16, writer),
                    ForInit::Definition(ref defs) => {
                        let def = &defs[0];
                        let local = &function.locals[def.id.0 as usize];
                        writer.write(&format!(
                            "var {}: {}",
                            local.name,
                            type_name(self.module, &local.ty.layout)
                        ));
                        if let Some(value) = def.init {
                            writer.write(" = ");
                            self.expr(value, f, 16, writer);
                        }
                    }
                }
                writer.write("; ");
                if let Some(cond) = cond {
                    self.expr(cond, f, 16, writer);
                }
                writer.write("; ");
                if let Some(step) = step {
                    self.expr(step, f, 16, writer);
                }
                writer.write(") {");
                writer.indent();
                self.statements(body, function, writer);
                writer.unindent();
                writer.line();
                writer.write("}");
            }
            Statement::While(cond, ref body) => {
                writer.line();
                writer.write("while (");
                self.expr(cond, f, 16, writer);
                writer.write(") {");
                writer.indent();
                self.statements(body, function, writer);
                writer.unindent();
                writer.line();
                writer.write("}");
            }
            Statement::DoWhile(ref body, cond) => {
                writer.line();
                writer.write("loop {");
                writer.indent();
                self.statements(body, function, writer);
                writer.line();
                writer.write("if (!(");
                self.expr(cond, f, 16, writer);
                writer.write(")) { break; }");
                writer.unindent();
                writer.line();
                writer.write("}");
            }
            Statement::Switch(value, ref cases) => {
                writer.line();
                writer.write("switch (");
                self.expr(value, f, 16, writer);
                writer.write(") {");
                writer.indent();
                let has_default = cases
                    .iter()
                    .any(|case| case.label == CaseLabel::Default);
                for case in cases {
                    writer.line();
                    match case.label {
                        CaseLabel::Case(id) => {
                            writer.write("case ");
                            self.expr(id, f, 16, writer);
                            writer.write(": {");
                        }
                        CaseLabel::Default => writer.write("default: {"),
                    }
                    writer.indent();
                    self.statements(&case.statements, function, writer);
                    writer.unindent();
                    writer.line();
                    writer.write("}");
                }
                if !has_default {
                    writer.line();
                    writer.write("default: {}");
                }
                writer.unindent();
                writer.line();
                writer.write("}");
            }
            Statement::Return(value) => {
                writer.line();
                match value {
                    Some(id) => {
                        writer.write("return ");
                        self.expr(id, f, 16, writer);
                        writer.write(";");
                    }
                    None => writer.write("return;"),
                }
            }
            Statement::Break => {
                writer.line();
                writer.write("break;");
            }
            Statement::Continue => {
                writer.line();
                writer.write("continue;");
            }
            Statement::Discard => {
                writer.line();
                writer.write("discard;");
            }
            Statement::ForwardProgressGuard => {
                writer.line();
                writer.write("esslt_loop_guard++;");
                writer.line();
                writer.write("if (esslt_loop_guard > 65536) { break; }");
            }
        }
    }

    fn entry_point(&self, writer: &mut Writer) {
        let main = match self.module.main_function() {
            Some(id) => id,
            None => return,
        };
        match self.module.stage {
            ShaderStage::Vertex => {
                writer.line();
                writer.write("@vertex");
                writer.line();
                writer.write("fn main(input: VertexInput) -> VertexOutput {");
                writer.indent();
                for global in &self.module.globals {
                    if global.storage == GlobalStorage::Input {
                        writer.line();
                        writer.write(&format!("{0} = input.{0};", global.name));
                    }
                }
                if self.used_builtins.contains(&BuiltinVar::VertexId) {
                    writer.line();
                    writer.write("gl_VertexID = i32(input.gl_VertexID);");
                }
                if self.used_builtins.contains(&BuiltinVar::InstanceId) {
                    writer.line();
                    writer.write("gl_InstanceID = i32(input.gl_InstanceID);");
                }
                writer.line();
                writer.write(&format!("{}();", self.user_name(main)));
                writer.line();
                writer.write("var output: VertexOutput;");
                writer.line();
                writer.write("output.gl_Position = gl_Position;");
                for global in self.varyings() {
                    writer.line();
                    writer.write(&format!("output.{0} = {0};", global.name));
                }
                writer.line();
                writer.write("return output;");
                writer.unindent();
                writer.line();
                writer.write("}");
            }
            ShaderStage::Fragment => {
                writer.line();
                writer.write("@fragment");
                writer.line();
                writer.write("fn main(input: FragmentInput) -> FragmentOutput {");
                writer.indent();
                if self.used_builtins.contains(&BuiltinVar::FragCoord) {
                    writer.line();
                    writer.write("gl_FragCoord = input.gl_FragCoord;");
                }
                if self.used_builtins.contains(&BuiltinVar::FrontFacing) {
                    writer.line();
                    writer.write("gl_FrontFacing = input.gl_FrontFacing;");
                }
                for global in self.varyings() {
                    writer.line();
                    writer.write(&format!("{0} = input.{0};", global.name));
                }
                writer.line();
                writer.write(&format!("{}();", self.user_name(main)));
                writer.line();
                writer.write("var output: FragmentOutput;");
                for global in &self.module.globals {
                    if global.storage == GlobalStorage::Output {
                        writer.line();
                        writer.write(&format!("output.{0} = {0};", global.name));
                    }
                }
                if self.used_builtins.contains(&BuiltinVar::FragColor) {
                    writer.line();
                    writer.write("output.gl_FragColor = gl_FragColor;");
                }
                if self.used_builtins.contains(&BuiltinVar::FragDepth) {
                    writer.line();
                    writer.write("output.gl_FragDepth = gl_FragDepth;");
                }
                writer.line();
                writer.write("return output;");
                writer.unindent();
                writer.line();
                writer.write("}");
            }
            ShaderStage::Compute => {
                writer.line();
                writer.write("@compute @workgroup_size(1)");
                writer.line();
                writer.write("fn main() {");
                writer.indent();
                writer.line();
                writer.write(&format!("{}();", self.user_name(main)));
                writer.unindent();
                writer.line();
                writer.write("}");
            }
        }
    }

    fn sampled_call(
        &self,
        intrinsic: Intrinsic,
        args: &[ExprId],
        function: Option<&FunctionDefinition>,
        writer: &mut Writer,
    ) -> bool {
        let global = match args.first().map(|&a| self.module.expr(a).kind.clone()) {
            Some(ExprKind::Global(global)) => global,
            _ => return false,
        };
        let split = match self
            .module
            .sampler_splits
            .iter()
            .find(|s| s.global == global)
        {
            Some(split) => split,
            None => return false,
        };
        let sampler = match self.module.global(global).ty.layout {
            TypeLayout::Sampler(sampler) => sampler,
            _ => return false,
        };
        let lod = matches!(
            intrinsic,
            Intrinsic::Texture2DLod | Intrinsic::TextureCubeLod | Intrinsic::TextureLod
        );
        if sampler.is_shadow() {
            // GLSL packs the reference into the last coordinate component
            writer.write(&format!(
                "textureSampleCompare({}, {}, (",
                split.texture_name, split.sampler_name
            ));
            self.expr(args[1], function, 15, writer);
            writer.write(").xy, (");
            self.expr(args[1], function, 15, writer);
            writer.write(").z)");
            return true;
        }
        let name = if lod {
            "textureSampleLevel"
        } else {
            "textureSample"
        };
        writer.write(&format!(
            "{}({}, {}, ",
            name, split.texture_name, split.sampler_name
        ));
        for (index, &arg) in args.iter().skip(1).enumerate() {
            if index > 0 {
                writer.write(", ");
            }
            self.expr(arg, function, 15, writer);
        }
        writer.write(")");
        true
    }

    fn expr(
        &self,
        id: ExprId,
        function: Option<&FunctionDefinition>,
        outer: u32,
        writer: &mut Writer,
    ) {
        let node = self.module.expr(id);
        match node.kind {
            ExprKind::Literal(lit) => match lit {
                Literal::Bool(v) => writer.write(if v { "true" } else { "false" }),
                Literal::Int(v) => writer.write(&format!("{}", v)),
                Literal::UInt(v) => writer.write(&format!("{}u", v)),
                Literal::Float(v) => writer.write(&float_literal(v)),
            },
            ExprKind::Local(local) => {
                let function = function.expect("local outside a function");
                let name = &function.locals[local.0 as usize].name;
                let deref = (local.0 as usize) < function.params.len()
                    && function.params[local.0 as usize].direction != ParamDirection::In;
                if deref {
                    writer.write(&format!("(*{})", name));
                } else {
                    writer.write(name);
                }
            }
            ExprKind::Global(global) => {
                let g = self.module.global(global);
                if g.storage == GlobalStorage::Uniform && !g.ty.layout.is_opaque() {
                    if is_bool_carrier(&g.ty.layout) {
                        writer.write(&format!("({}.{} != 0u)", UNIFORMS_NAME, g.name));
                    } else {
                        writer.write(&format!("{}.{}", UNIFORMS_NAME, g.name));
                    }
                } else {
                    writer.write(&g.name);
                }
            }
            ExprKind::BlockMember(block, field) => {
                let block = self.module.block(block);
                let field = &block.fields[field];
                let instance = self.block_instance(block);
                if is_bool_carrier(&field.ty.layout) {
                    writer.write(&format!("({}.{} != 0u)", instance, field.name));
                } else {
                    writer.write(&format!("{}.{}", instance, field.name));
                }
            }
            ExprKind::Builtin(builtin) => writer.write(builtin.name()),
            ExprKind::Unary(op, inner) => match op {
                UnaryOp::PostfixIncrement | UnaryOp::PrefixIncrement => {
                    // Statement position only after lowering
                    self.expr(inner, function, 1, writer);
                    writer.write("++");
                }
                UnaryOp::PostfixDecrement | UnaryOp::PrefixDecrement => {
                    self.expr(inner, function, 1, writer);
                    writer.write("--");
                }
                _ => {
                    let prec = 2;
                    let paren = outer < prec;
                    if paren {
                        writer.write("(");
                    }
                    let symbol = match op {
                        UnaryOp::Plus => "+",
                        UnaryOp::Minus => "-",
                        UnaryOp::LogicalNot => "!",
                        UnaryOp::BitwiseNot => "~",
                        _ => unreachable!(),
                    };
                    writer.write(symbol);
                    self.expr(inner, function, prec, writer);
                    if paren {
                        writer.write(")");
                    }
                }
            },
            ExprKind::Binary(op, lhs, rhs) => {
                let prec = bin_op_precedence(op);
                let paren = outer <= prec;
                if paren {
                    writer.write("(");
                }
                self.expr(lhs, function, prec, writer);
                let symbol = match op {
                    esslt_lang_hir::BinOp::LogicalXor => "!=",
                    other => bin_op_symbol(other),
                };
                writer.write(&format!(" {} ", symbol));
                self.expr(rhs, function, prec, writer);
                if paren {
                    writer.write(")");
                }
            }
            ExprKind::Ternary(cond, a, b) => {
                writer.write("select(");
                self.expr(b, function, 15, writer);
                writer.write(", ");
                self.expr(a, function, 15, writer);
                writer.write(", ");
                self.expr(cond, function, 15, writer);
                writer.write(")");
            }
            ExprKind::Assign(op, lhs, rhs) => {
                // lower() keeps assignments at statement position
                self.expr(lhs, function, 14, writer);
                match op {
                    Some(op) => writer.write(&format!(" {}= ", bin_op_symbol(op))),
                    None => writer.write(" = "),
                }
                self.expr(rhs, function, 15, writer);
            }
            ExprKind::Swizzle(base, ref components) => {
                self.expr(base, function, 1, writer);
                writer.write(".");
                for &component in components {
                    writer.write(component.name());
                }
            }
            ExprKind::Member(base, field) => {
                self.expr(base, function, 1, writer);
                let name = match self.module.expr(base).ty.layout {
                    TypeLayout::Struct(id) => {
                        self.module.struct_def(id).members[field].name.clone()
                    }
                    _ => unreachable!("member access on a non-struct"),
                };
                writer.write(&format!(".{}", name));
            }
            ExprKind::Index(base, index) => {
                self.expr(base, function, 1, writer);
                writer.write("[");
                self.expr(index, function, 16, writer);
                writer.write("]");
            }
            ExprKind::Call(target, ref args) => {
                writer.write(&self.user_name(target));
                writer.write("(");
                let params = &self.module.function(target).params;
                for (index, &arg) in args.iter().enumerate() {
                    if index > 0 {
                        writer.write(", ");
                    }
                    if params
                        .get(index)
                        .is_some_and(|p| p.direction != ParamDirection::In)
                    {
                        writer.write("&");
                    }
                    self.expr(arg, function, 15, writer);
                }
                writer.write(")");
            }
            ExprKind::Intrinsic(intrinsic, ref args) => {
                if self.sampled_call(intrinsic, args, function, writer) {
                    return;
                }
                self.intrinsic_call(intrinsic, args, function, writer);
            }
            ExprKind::Constructor(ref layout, ref args) => {
                writer.write(&type_name(self.module, layout));
                writer.write("(");
                for (index, &arg) in args.iter().enumerate() {
                    if index > 0 {
                        writer.write(", ");
                    }
                    self.expr(arg, function, 15, writer);
                }
                writer.write(")");
            }
            ExprKind::Comma(_, _) => unreachable!("comma survived lowering"),
            ExprKind::Error => writer.write("<error>"),
        }
    }

    fn intrinsic_call(
        &self,
        intrinsic: Intrinsic,
        args: &[ExprId],
        function: Option<&FunctionDefinition>,
        writer: &mut Writer,
    ) {
        // GLSL mod() is floor-mod; WGSL % truncates
        if intrinsic == Intrinsic::Mod && args.len() == 2 {
            writer.write("(");
            self.expr(args[0], function, 15, writer);
            writer.write(" - ");
            self.expr(args[1], function, 3, writer);
            writer.write(" * floor(");
            self.expr(args[0], function, 15, writer);
            writer.write(" / ");
            self.expr(args[1], function, 15, writer);
            writer.write("))");
            return;
        }
        if let Some(symbol) = comparison_symbol(intrinsic) {
            writer.write("(");
            self.expr(args[0], function, 6, writer);
            writer.write(&format!(" {} ", symbol));
            self.expr(args[1], function, 6, writer);
            writer.write(")");
            return;
        }
        if intrinsic == Intrinsic::Not {
            writer.write("!(");
            self.expr(args[0], function, 16, writer);
            writer.write(")");
            return;
        }
        let name = match intrinsic {
            Intrinsic::InverseSqrt => "inverseSqrt",
            Intrinsic::Fract => "fract",
            Intrinsic::Mix => "mix",
            Intrinsic::DFdx => "dpdx",
            Intrinsic::DFdy => "dpdy",
            Intrinsic::Atan if args.len() == 2 => "atan2",
            Intrinsic::PackHalf2x16 => "pack2x16float",
            Intrinsic::UnpackHalf2x16 => "unpack2x16float",
            Intrinsic::SmoothStep => "smoothstep",
            _ => intrinsic.name(),
        };
        writer.write(name);
        writer.write("(");
        for (index, &arg) in args.iter().enumerate() {
            if index > 0 {
                writer.write(", ");
            }
            self.expr(arg, function, 15, writer);
        }
        writer.write(")");
    }
}

fn comparison_symbol(intrinsic: Intrinsic) -> Option<&'static str> {
    match intrinsic {
        Intrinsic::LessThan => Some("<"),
        Intrinsic::LessThanEqual => Some("<="),
        Intrinsic::GreaterThan => Some(">"),
        Intrinsic::GreaterThanEqual => Some(">="),
        Intrinsic::Equal => Some("=="),
        Intrinsic::NotEqual => Some("!="),
        _ => None,
    }
}

fn visit<F: FnMut(&Statement)>(statements: &[Statement], f: &mut F) {
    for statement in statements {
        f(statement);
        match *statement {
            Statement::Block(ref inner) => visit(inner, f),
            Statement::If(_, ref then_block, ref else_block) => {
                visit(then_block, f);
                if let Some(else_block) = else_block {
                    visit(else_block, f);
                }
            }
            Statement::For(_, _, _, ref body)
            | Statement::While(_, ref body)
            | Statement::DoWhile(ref body, _) => visit(body, f),
            Statement::Switch(_, ref cases) => {
                for case in cases {
                    visit(&case.statements, f);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::{Diagnostics, ShaderVersion};
    use esslt_transform_passes::TargetCaps;

    fn translate(source: &str, stage: ShaderStage) -> String {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
        let text =
            esslt_transform_preprocess::preprocess(&[source], &mut handler, &mut diagnostics);
        let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
        let mut module = esslt_transform_ast_to_hir::type_check(
            &unit,
            ShaderVersion::Essl100,
            stage,
            &mut diagnostics,
        );
        assert!(!diagnostics.has_errors(), "log: {}", diagnostics.info_log());
        esslt_transform_passes::layout::run(&mut module);
        esslt_transform_passes::lower::run(&mut module, &TargetCaps::wgsl());
        emit(&module)
    }

    #[test]
    fn vertex_entry_copies_interface() {
        let text = translate(
            "attribute vec3 position; varying vec2 uv; uniform mat4 mvp;\
             void main() { uv = position.xy; gl_Position = mvp * vec4(position, 1.0); }",
            ShaderStage::Vertex,
        );
        assert!(text.contains("struct DefaultUniforms {"));
        assert!(text.contains("@group(0) @binding(0) var<uniform> esslt_uniforms: DefaultUniforms;"));
        assert!(text.contains("var<private> position: vec3<f32>;"));
        assert!(text.contains("@builtin(position) gl_Position: vec4<f32>,"));
        assert!(text.contains("@vertex"));
        assert!(text.contains("position = input.position;"));
        assert!(text.contains("esslt_main();"));
        assert!(text.contains("esslt_uniforms.mvp * vec4<f32>(position, 1.0)"));
    }

    #[test]
    fn textures_get_separate_bindings() {
        let text = translate(
            "precision mediump float; uniform sampler2D albedo; varying vec2 uv;\
             void main() { gl_FragColor = texture2D(albedo, uv); }",
            ShaderStage::Fragment,
        );
        assert!(text.contains("@group(1) @binding(0) var albedo_texture: texture_2d<f32>;"));
        assert!(text.contains("@group(1) @binding(1) var albedo_sampler: sampler;"));
        assert!(text.contains("textureSample(albedo_texture, albedo_sampler, uv)"));
        assert!(text.contains("@fragment"));
        assert!(text.contains("output.gl_FragColor = gl_FragColor;"));
    }

    #[test]
    fn bool_uniform_reads_compare_against_carrier() {
        let text = translate(
            "uniform bool enabled;\
             void main() { if (enabled) { gl_Position = vec4(1.0); } }",
            ShaderStage::Vertex,
        );
        assert!(text.contains("@align(16) enabled: u32,"));
        assert!(text.contains("if ((esslt_uniforms.enabled != 0u)) {"));
    }

    #[test]
    fn ternary_becomes_select() {
        let text = translate(
            "uniform float a; void main() { gl_Position = vec4(a > 0.0 ? 1.0 : 2.0); }",
            ShaderStage::Vertex,
        );
        assert!(text.contains("select(2.0, 1.0, esslt_uniforms.a > 0.0)"));
    }

    #[test]
    fn out_params_become_pointers() {
        let text = translate(
            "void fill(out float x) { x = 1.0; }\
             void main() { float v; fill(v); gl_Position = vec4(v); }",
            ShaderStage::Vertex,
        );
        assert!(text.contains("fn fill(x: ptr<function, f32>) {"));
        assert!(text.contains("(*x) = 1.0;"));
        assert!(text.contains("fill(&v);"));
    }

    #[test]
    fn guards_use_private_counter() {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
        let source = "uniform bool cond; void main() { while (cond) { } gl_Position = vec4(0.0); }";
        let text =
            esslt_transform_preprocess::preprocess(&[source], &mut handler, &mut diagnostics);
        let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
        let mut module = esslt_transform_ast_to_hir::type_check(
            &unit,
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
            &mut diagnostics,
        );
        assert!(!diagnostics.has_errors());
        esslt_transform_passes::loop_progress::run(&mut module);
        esslt_transform_passes::lower::run(&mut module, &TargetCaps::wgsl());
        let text = emit(&module);
        assert!(text.contains("var<private> esslt_loop_guard: i32 = 0;"));
        assert!(text.contains("esslt_loop_guard++;"));
        assert!(text.contains("if (esslt_loop_guard > 65536) { break; }"));
    }
}
