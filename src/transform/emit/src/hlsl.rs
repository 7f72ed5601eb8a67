//! HLSL output.
//!
//! Uniforms land in cbuffers, combined samplers become
//! `Texture*`/`SamplerState` pairs from the planned splits, and the GL
//! shader interface is bridged through static globals: inputs and outputs
//! are copied between annotated I/O structs and statics by a generated
//! entry point that calls the renamed user `main`. Struct constructors and
//! dynamically indexed vectors have no HLSL spelling and go through
//! generated helper functions; array-valued returns become trailing `out`
//! parameters.

use esslt_lang_hir::{
    BuiltinVar, CaseLabel, ExprId, ExprKind, ForInit, FunctionDefinition, FunctionId,
    GlobalStorage, Intrinsic, Literal, Module, RootDefinition, SamplerType, ScalarType,
    Statement, StructId, TypeLayout, UnaryOp,
};
use esslt_shared::ShaderStage;

use crate::writer::{bin_op_precedence, bin_op_symbol, float_literal, Writer};

pub fn emit(module: &Module) -> String {
    let emitter = Emitter {
        module,
        used_builtins: collect_builtins(module),
        dynamic_indexes: collect_dynamic_indexes(module),
    };
    let mut writer = Writer::new();
    emitter.uniforms(&mut writer);
    emitter.samplers(&mut writer);
    emitter.statics(&mut writer);
    emitter.io_structs(&mut writer);
    for &(scalar, size) in &emitter.dynamic_indexes {
        emitter.index_helper(scalar, size, &mut writer);
    }
    for def in &module.root_order {
        match *def {
            RootDefinition::Struct(id) => emitter.struct_def(id, &mut writer),
            RootDefinition::Function(id) => emitter.function(id, &mut writer),
            // Globals and blocks were already emitted as statics/cbuffers
            _ => {}
        }
    }
    emitter.entry_point(&mut writer);
    writer.finish()
}

fn scalar_name(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Bool => "bool",
        ScalarType::Int => "int",
        ScalarType::UInt => "uint",
        ScalarType::Float => "float",
    }
}

fn type_name(module: &Module, layout: &TypeLayout) -> String {
    match *layout {
        TypeLayout::Void => "void".to_string(),
        TypeLayout::Scalar(scalar) => scalar_name(scalar).to_string(),
        TypeLayout::Vector(scalar, size) => format!("{}{}", scalar_name(scalar), size),
        TypeLayout::Matrix(c, r) => format!("float{}x{}", r, c),
        TypeLayout::Sampler(_) => "SamplerState".to_string(),
        TypeLayout::Struct(id) => module.struct_def(id).name.clone(),
        TypeLayout::Array(ref inner, _) => type_name(module, inner),
        TypeLayout::Error => "<error>".to_string(),
    }
}

/// Declarator array dimensions, outermost first.
fn array_dims(layout: &TypeLayout) -> String {
    let mut dims = String::new();
    let mut layout = layout;
    while let TypeLayout::Array(ref inner, size) = *layout {
        match size {
            Some(n) => dims.push_str(&format!("[{}]", n)),
            None => dims.push_str("[]"),
        }
        layout = inner;
    }
    dims
}

fn texture_type(sampler: SamplerType) -> &'static str {
    match sampler {
        SamplerType::Sampler2D | SamplerType::Sampler2DShadow => "Texture2D",
        SamplerType::Sampler3D => "Texture3D",
        SamplerType::SamplerCube | SamplerType::SamplerCubeShadow => "TextureCube",
        SamplerType::Sampler2DArray => "Texture2DArray",
    }
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

/// Vector reads indexed by a non-constant expression, as (scalar, size).
fn collect_dynamic_indexes(module: &Module) -> Vec<(ScalarType, u32)> {
    let mut found = Vec::new();
    for id in module.exprs.handles() {
        if let ExprKind::Index(base, index) = module.expr(id).kind {
            if let TypeLayout::Vector(scalar, size) = module.expr(base).ty.layout {
                let constant = matches!(module.expr(index).kind, ExprKind::Literal(_));
                if !constant && !found.contains(&(scalar, size)) {
                    found.push((scalar, size));
                }
            }
        }
    }
    found
}

fn returns_array(function: &FunctionDefinition) -> bool {
    function.return_type.layout.is_array()
}

struct Emitter<'m> {
    module: &'m Module,
    used_builtins: Vec<BuiltinVar>,
    dynamic_indexes: Vec<(ScalarType, u32)>,
}

impl<'m> Emitter<'m> {
    fn uniforms(&self, writer: &mut Writer) {
        let loose: Vec<_> = self
            .module
            .globals
            .iter()
            .filter(|g| g.storage == GlobalStorage::Uniform && !g.ty.layout.is_opaque())
            .filter(|g| !matches!(g.ty.layout, TypeLayout::Array(ref inner, _) if inner.is_opaque()))
            .collect();
        if !loose.is_empty() {
            writer.write("cbuffer DriverUniforms : register(b0) {");
            writer.indent();
            for global in &loose {
                writer.line();
                writer.write(&format!(
                    "{} {}{};",
                    type_name(self.module, &global.ty.layout),
                    global.name,
                    array_dims(&global.ty.layout)
                ));
            }
            writer.unindent();
            writer.line();
            writer.write("};");
        }
        for (index, block) in self.module.blocks.iter().enumerate() {
            writer.line();
            writer.write(&format!(
                "cbuffer {} : register(b{}) {{",
                block.name,
                index + 1
            ));
            writer.indent();
            for field in &block.fields {
                writer.line();
                writer.write(&format!(
                    "{} {}{};",
                    type_name(self.module, &field.ty.layout),
                    self.block_field_name(block, &field.name),
                    array_dims(&field.ty.layout)
                ));
            }
            writer.unindent();
            writer.line();
            writer.write("};");
        }
    }

    fn block_field_name(&self, block: &esslt_lang_hir::InterfaceBlock, field: &str) -> String {
        match block.instance_name {
            Some(ref instance) => format!("{}_{}", instance, field),
            None => field.to_string(),
        }
    }

    fn samplers(&self, writer: &mut Writer) {
        for (slot, split) in self.module.sampler_splits.iter().enumerate() {
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
                "{} {}{} : register(t{});",
                texture_type(sampler),
                split.texture_name,
                array_dims(&global.ty.layout),
                slot
            ));
            writer.line();
            let state = if sampler.is_shadow() {
                "SamplerComparisonState"
            } else {
                "SamplerState"
            };
            writer.write(&format!(
                "{} {}{} : register(s{});",
                state,
                split.sampler_name,
                array_dims(&global.ty.layout),
                slot
            ));
        }
    }

    /// Shader-interface globals become statics the user code reads and
    /// writes; the entry point copies them from/to the I/O structs.
    fn statics(&self, writer: &mut Writer) {
        for global in &self.module.globals {
            match global.storage {
                GlobalStorage::Input | GlobalStorage::Output => {
                    writer.line();
                    writer.write(&format!(
                        "static {} {}{};",
                        type_name(self.module, &global.ty.layout),
                        global.name,
                        array_dims(&global.ty.layout)
                    ));
                }
                GlobalStorage::Const | GlobalStorage::Plain => {
                    writer.line();
                    let prefix = if global.storage == GlobalStorage::Const {
                        "static const "
                    } else {
                        "static "
                    };
                    writer.write(&format!(
                        "{}{} {}{}",
                        prefix,
                        type_name(self.module, &global.ty.layout),
                        global.name,
                        array_dims(&global.ty.layout)
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
            let decl = match builtin {
                BuiltinVar::FragData => "static float4 gl_FragData[4];".to_string(),
                BuiltinVar::FragDepth => "static float gl_FragDepth;".to_string(),
                BuiltinVar::FrontFacing => "static bool gl_FrontFacing;".to_string(),
                BuiltinVar::PointSize => "static float gl_PointSize;".to_string(),
                BuiltinVar::VertexId => "static int gl_VertexID;".to_string(),
                BuiltinVar::InstanceId => "static int gl_InstanceID;".to_string(),
                BuiltinVar::PointCoord => "static float2 gl_PointCoord;".to_string(),
                _ => format!("static float4 {};", builtin.name()),
            };
            writer.write(&decl);
        }
        if self.uses_loop_guard() {
            writer.line();
            writer.write("static int esslt_loop_guard = 0;");
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

    fn io_structs(&self, writer: &mut Writer) {
        let (input_name, output_name) = match self.module.stage {
            ShaderStage::Fragment => ("PS_INPUT", "PS_OUTPUT"),
            _ => ("VS_INPUT", "VS_OUTPUT"),
        };
        writer.line();
        writer.write(&format!("struct {} {{", input_name));
        writer.indent();
        let mut slot = 0;
        for global in &self.module.globals {
            if global.storage != GlobalStorage::Input {
                continue;
            }
            writer.line();
            writer.write(&format!(
                "{} {}{} : TEXCOORD{};",
                type_name(self.module, &global.ty.layout),
                global.name,
                array_dims(&global.ty.layout),
                global.location.unwrap_or(slot)
            ));
            slot += 1;
        }
        for &builtin in &self.used_builtins {
            if let Some(decl) = self.builtin_input_field(builtin) {
                writer.line();
                writer.write(&decl);
            }
        }
        writer.unindent();
        writer.line();
        writer.write("};");

        writer.line();
        writer.write(&format!("struct {} {{", output_name));
        writer.indent();
        let mut slot = 0;
        for global in &self.module.globals {
            if global.storage != GlobalStorage::Output {
                continue;
            }
            writer.line();
            let semantic = match self.module.stage {
                ShaderStage::Fragment => format!("SV_TARGET{}", global.location.unwrap_or(slot)),
                _ => format!("TEXCOORD{}", global.location.unwrap_or(slot)),
            };
            writer.write(&format!(
                "{} {}{} : {};",
                type_name(self.module, &global.ty.layout),
                global.name,
                array_dims(&global.ty.layout),
                semantic
            ));
            slot += 1;
        }
        for &builtin in &self.used_builtins {
            if let Some(decl) = self.builtin_output_field(builtin) {
                writer.line();
                writer.write(&decl);
            }
        }
        writer.unindent();
        writer.line();
        writer.write("};");
    }

    fn builtin_input_field(&self, builtin: BuiltinVar) -> Option<String> {
        let decl = match (builtin, self.module.stage) {
            (BuiltinVar::FragCoord, ShaderStage::Fragment) => {
                "float4 gl_FragCoord : SV_POSITION;"
            }
            (BuiltinVar::FrontFacing, ShaderStage::Fragment) => {
                "bool gl_FrontFacing : SV_ISFRONTFACE;"
            }
            (BuiltinVar::VertexId, ShaderStage::Vertex) => "int gl_VertexID : SV_VERTEXID;",
            (BuiltinVar::InstanceId, ShaderStage::Vertex) => {
                "int gl_InstanceID : SV_INSTANCEID;"
            }
            _ => return None,
        };
        Some(decl.to_string())
    }

    fn builtin_output_field(&self, builtin: BuiltinVar) -> Option<String> {
        let decl = match (builtin, self.module.stage) {
            (BuiltinVar::Position, ShaderStage::Vertex) => {
                "float4 gl_Position : SV_POSITION;".to_string()
            }
            (BuiltinVar::PointSize, ShaderStage::Vertex) => {
                "float gl_PointSize : PSIZE;".to_string()
            }
            (BuiltinVar::FragColor, ShaderStage::Fragment) => {
                "float4 gl_FragColor : SV_TARGET0;".to_string()
            }
            (BuiltinVar::FragData, ShaderStage::Fragment) => {
                "float4 gl_FragData[4] : SV_TARGET0;".to_string()
            }
            (BuiltinVar::FragDepth, ShaderStage::Fragment) => {
                "float gl_FragDepth : SV_DEPTH;".to_string()
            }
            _ => return None,
        };
        Some(decl)
    }

    fn index_helper(&self, scalar: ScalarType, size: u32, writer: &mut Writer) {
        let vector = format!("{}{}", scalar_name(scalar), size);
        writer.line();
        writer.write(&format!(
            "{} esslt_index_{}({} v, int i) {{",
            scalar_name(scalar),
            vector,
            vector
        ));
        writer.indent();
        let names = ["x", "y", "z", "w"];
        for component in 0..size - 1 {
            writer.line();
            writer.write(&format!(
                "if (i == {}) return v.{};",
                component, names[component as usize]
            ));
        }
        writer.line();
        writer.write(&format!("return v.{};", names[(size - 1) as usize]));
        writer.unindent();
        writer.line();
        writer.write("}");
    }

    fn struct_def(&self, id: StructId, writer: &mut Writer) {
        let def = self.module.struct_def(id);
        writer.line();
        writer.write(&format!("struct {} {{", def.name));
        writer.indent();
        for member in &def.members {
            writer.line();
            writer.write(&format!(
                "{} {}{};",
                type_name(self.module, &member.ty.layout),
                member.name,
                array_dims(&member.ty.layout)
            ));
        }
        writer.unindent();
        writer.line();
        writer.write("};");
        // HLSL has no struct constructor syntax
        writer.line();
        let params: Vec<String> = def
            .members
            .iter()
            .map(|m| {
                format!(
                    "{} {}{}",
                    type_name(self.module, &m.ty.layout),
                    m.name,
                    array_dims(&m.ty.layout)
                )
            })
            .collect();
        writer.write(&format!(
            "{} {}_ctor({}) {{",
            def.name,
            def.name,
            params.join(", ")
        ));
        writer.indent();
        writer.line();
        writer.write(&format!("{} s;", def.name));
        for member in &def.members {
            writer.line();
            writer.write(&format!("s.{} = {};", member.name, member.name));
        }
        writer.line();
        writer.write("return s;");
        writer.unindent();
        writer.line();
        writer.write("}");
    }

    fn user_name(&self, id: FunctionId) -> String {
        let name = &self.module.function(id).name;
        if name == "main" {
            "gl_main".to_string()
        } else {
            name.clone()
        }
    }

    fn function(&self, id: FunctionId, writer: &mut Writer) {
        let function = self.module.function(id);
        if !function.defined {
            return;
        }
        writer.line();
        let rewrite_return = returns_array(function);
        let ret = if rewrite_return {
            "void".to_string()
        } else {
            type_name(self.module, &function.return_type.layout)
        };
        writer.write(&format!("{} {}(", ret, self.user_name(id)));
        for (index, param) in function.params.iter().enumerate() {
            if index > 0 {
                writer.write(", ");
            }
            match param.direction {
                esslt_lang_hir::ParamDirection::In => {}
                esslt_lang_hir::ParamDirection::Out => writer.write("out "),
                esslt_lang_hir::ParamDirection::InOut => writer.write("inout "),
            }
            writer.write(&format!(
                "{} {}{}",
                type_name(self.module, &param.ty.layout),
                param.name,
                array_dims(&param.ty.layout)
            ));
        }
        if rewrite_return {
            if !function.params.is_empty() {
                writer.write(", ");
            }
            writer.write(&format!(
                "out {} esslt_ret{}",
                type_name(self.module, &function.return_type.layout),
                array_dims(&function.return_type.layout)
            ));
        }
        writer.write(") {");
        writer.indent();
        self.statements(&function.body, function, rewrite_return, writer);
        writer.unindent();
        writer.line();
        writer.write("}");
    }

    fn statements(
        &self,
        statements: &[Statement],
        function: &FunctionDefinition,
        rewrite_return: bool,
        writer: &mut Writer,
    ) {
        for statement in statements {
            self.statement(statement, function, rewrite_return, writer);
        }
    }

    /// A call to a function whose array return value was rewritten to an
    /// out parameter.
    fn array_call(&self, id: ExprId) -> Option<(FunctionId, &Vec<ExprId>)> {
        match self.module.expr(id).kind {
            ExprKind::Call(target, ref args) if returns_array(self.module.function(target)) => {
                Some((target, args))
            }
            _ => None,
        }
    }

    fn array_call_into(
        &self,
        target: FunctionId,
        args: &[ExprId],
        dest: &str,
        function: &FunctionDefinition,
        writer: &mut Writer,
    ) {
        writer.write(&format!("{}(", self.user_name(target)));
        for &arg in args {
            self.expr(arg, Some(function), 15, writer);
            writer.write(", ");
        }
        writer.write(dest);
        writer.write(");");
    }

    fn statement(
        &self,
        statement: &Statement,
        function: &FunctionDefinition,
        rewrite_return: bool,
        writer: &mut Writer,
    ) {
        let f = Some(function);
        match *statement {
            Statement::Expression(id) => {
                if let ExprKind::Assign(None, lhs, rhs) = self.module.expr(id).kind {
                    if let Some((target, args)) = self.array_call(rhs) {
                        writer.line();
                        let mut dest = Writer::new();
                        self.expr(lhs, f, 1, &mut dest);
                        let dest = dest.finish();
                        self.array_call_into(target, args, dest.trim_end(), function, writer);
                        return;
                    }
                }
                writer.line();
                self.expr(id, f, 16, writer);
                writer.write(";");
            }
            Statement::Var(ref def) => {
                let local = &function.locals[def.id.0 as usize];
                if let Some(init) = def.init {
                    if let Some((target, args)) = self.array_call(init) {
                        writer.line();
                        writer.write(&format!(
                            "{} {}{};",
                            type_name(self.module, &local.ty.layout),
                            local.name,
                            array_dims(&local.ty.layout)
                        ));
                        writer.line();
                        self.array_call_into(target, args, &local.name, function, writer);
                        return;
                    }
                }
                writer.line();
                writer.write(&format!(
                    "{} {}{}",
                    type_name(self.module, &local.ty.layout),
                    local.name,
                    array_dims(&local.ty.layout)
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
                self.statements(inner, function, rewrite_return, writer);
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
                self.statements(then_block, function, rewrite_return, writer);
                writer.unindent();
                writer.line();
                writer.write("}");
                if let Some(else_block) = else_block {
                    writer.write(" else {");
                    writer.indent();
                    self.statements(else_block, function, rewrite_return, writer);
                    writer.unindent();
                    writer.line();
                    writer.write("}");
                }
            }
            Statement::For(ref init, cond, step, ref body) => {
                writer.line();
                writer.write("for (");
                match *init {
                    ForInit::Empty => {}
                    ForInit::Expression(id) => self.expr(id, f, 16, writer),
                    ForInit::Definition(ref defs) => {
                        for (index, def) in defs.iter().enumerate() {
                            let local = &function.locals[def.id.0 as usize];
                            if index == 0 {
                                writer.write(&format!(
                                    "{} ",
                                    type_name(self.module, &local.ty.layout)
                                ));
                            } else {
                                writer.write(", ");
                            }
                            writer.write(&local.name);
                            if let Some(value) = def.init {
                                writer.write(" = ");
                                self.expr(value, f, 16, writer);
                            }
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
                self.statements(body, function, rewrite_return, writer);
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
                self.statements(body, function, rewrite_return, writer);
                writer.unindent();
                writer.line();
                writer.write("}");
            }
            Statement::DoWhile(ref body, cond) => {
                writer.line();
                writer.write("do {");
                writer.indent();
                self.statements(body, function, rewrite_return, writer);
                writer.unindent();
                writer.line();
                writer.write("} while (");
                self.expr(cond, f, 16, writer);
                writer.write(");");
            }
            Statement::Switch(value, ref cases) => {
                writer.line();
                writer.write("switch (");
                self.expr(value, f, 16, writer);
                writer.write(") {");
                writer.indent();
                for case in cases {
                    writer.line();
                    match case.label {
                        CaseLabel::Case(id) => {
                            writer.write("case ");
                            self.expr(id, f, 16, writer);
                            writer.write(":");
                        }
                        CaseLabel::Default => writer.write("default:"),
                    }
                    writer.indent();
                    self.statements(&case.statements, function, rewrite_return, writer);
                    writer.unindent();
                }
                writer.unindent();
                writer.line();
                writer.write("}");
            }
            Statement::Return(value) => {
                writer.line();
                match value {
                    Some(id) if rewrite_return => {
                        writer.write("esslt_ret = ");
                        self.expr(id, f, 16, writer);
                        writer.write(";");
                        writer.line();
                        writer.write("return;");
                    }
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
                writer.write("if (++esslt_loop_guard > 65536) break;");
            }
        }
    }

    fn entry_point(&self, writer: &mut Writer) {
        let main = match self.module.main_function() {
            Some(id) => id,
            None => return,
        };
        let (input_name, output_name) = match self.module.stage {
            ShaderStage::Fragment => ("PS_INPUT", "PS_OUTPUT"),
            _ => ("VS_INPUT", "VS_OUTPUT"),
        };
        writer.line();
        writer.write(&format!("{} main({} input) {{", output_name, input_name));
        writer.indent();
        for global in &self.module.globals {
            if global.storage == GlobalStorage::Input {
                writer.line();
                writer.write(&format!("{0} = input.{0};", global.name));
            }
        }
        for &builtin in &self.used_builtins {
            if self.builtin_input_field(builtin).is_some() {
                writer.line();
                writer.write(&format!("{0} = input.{0};", builtin.name()));
            }
        }
        writer.line();
        writer.write(&format!("{}();", self.user_name(main)));
        writer.line();
        writer.write(&format!("{} output;", output_name));
        for global in &self.module.globals {
            if global.storage == GlobalStorage::Output {
                writer.line();
                writer.write(&format!("output.{0} = {0};", global.name));
            }
        }
        for &builtin in &self.used_builtins {
            if self.builtin_output_field(builtin).is_some() {
                writer.line();
                writer.write(&format!("output.{0} = {0};", builtin.name()));
            }
        }
        writer.line();
        writer.write("return output;");
        writer.unindent();
        writer.line();
        writer.write("}");
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
        let shadow = match self.module.global(global).ty.layout {
            TypeLayout::Sampler(sampler) => sampler.is_shadow(),
            _ => false,
        };
        if shadow {
            // GLSL packs the reference into the last coordinate component
            writer.write(&format!(
                "{}.SampleCmp({}, (",
                split.texture_name, split.sampler_name
            ));
            self.expr(args[1], function, 15, writer);
            writer.write(").xy, (");
            self.expr(args[1], function, 15, writer);
            writer.write(").z)");
            return true;
        }
        let method = match intrinsic {
            Intrinsic::Texture2DLod | Intrinsic::TextureCubeLod | Intrinsic::TextureLod => {
                "SampleLevel"
            }
            _ => "Sample",
        };
        writer.write(&format!(
            "{}.{}({}, ",
            split.texture_name, method, split.sampler_name
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

    fn intrinsic_name(&self, intrinsic: Intrinsic, args: &[ExprId]) -> String {
        let renamed = match intrinsic {
            Intrinsic::Mix => "lerp",
            Intrinsic::Fract => "frac",
            Intrinsic::InverseSqrt => "rsqrt",
            Intrinsic::Mod => "fmod",
            Intrinsic::DFdx => "ddx",
            Intrinsic::DFdy => "ddy",
            Intrinsic::Atan if args.len() == 2 => "atan2",
            _ => intrinsic.name(),
        };
        renamed.to_string()
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
                let name = function
                    .map(|f| f.locals[local.0 as usize].name.as_str())
                    .unwrap_or("<local>");
                writer.write(name);
            }
            ExprKind::Global(global) => writer.write(&self.module.global(global).name),
            ExprKind::BlockMember(block, field) => {
                let block = self.module.block(block);
                writer.write(&self.block_field_name(block, &block.fields[field].name));
            }
            ExprKind::Builtin(builtin) => writer.write(builtin.name()),
            ExprKind::Unary(op, inner) => {
                let prec = 2;
                let paren = outer < prec;
                if paren {
                    writer.write("(");
                }
                let (before, after) = match op {
                    UnaryOp::Plus => ("+", ""),
                    UnaryOp::Minus => ("-", ""),
                    UnaryOp::LogicalNot => ("!", ""),
                    UnaryOp::BitwiseNot => ("~", ""),
                    UnaryOp::PrefixIncrement => ("++", ""),
                    UnaryOp::PrefixDecrement => ("--", ""),
                    UnaryOp::PostfixIncrement => ("", "++"),
                    UnaryOp::PostfixDecrement => ("", "--"),
                };
                writer.write(before);
                self.expr(inner, function, if after.is_empty() { prec } else { 1 }, writer);
                writer.write(after);
                if paren {
                    writer.write(")");
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                // GLSL mat*vec linear algebra is mul() in HLSL
                let linear = matches!(op, esslt_lang_hir::BinOp::Multiply)
                    && (matches!(self.module.expr(lhs).ty.layout, TypeLayout::Matrix(_, _))
                        || matches!(self.module.expr(rhs).ty.layout, TypeLayout::Matrix(_, _)));
                if linear {
                    writer.write("mul(");
                    self.expr(rhs, function, 15, writer);
                    writer.write(", ");
                    self.expr(lhs, function, 15, writer);
                    writer.write(")");
                    return;
                }
                let prec = bin_op_precedence(op);
                let paren = outer <= prec;
                if paren {
                    writer.write("(");
                }
                self.expr(lhs, function, prec, writer);
                writer.write(&format!(" {} ", bin_op_symbol(op)));
                self.expr(rhs, function, prec, writer);
                if paren {
                    writer.write(")");
                }
            }
            ExprKind::Ternary(cond, a, b) => {
                let paren = outer <= 13;
                if paren {
                    writer.write("(");
                }
                self.expr(cond, function, 13, writer);
                writer.write(" ? ");
                self.expr(a, function, 13, writer);
                writer.write(" : ");
                self.expr(b, function, 13, writer);
                if paren {
                    writer.write(")");
                }
            }
            ExprKind::Assign(op, lhs, rhs) => {
                let paren = outer < 14;
                if paren {
                    writer.write("(");
                }
                self.expr(lhs, function, 14, writer);
                match op {
                    Some(op) => writer.write(&format!(" {}= ", bin_op_symbol(op))),
                    None => writer.write(" = "),
                }
                self.expr(rhs, function, 15, writer);
                if paren {
                    writer.write(")");
                }
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
                if let TypeLayout::Vector(scalar, size) = self.module.expr(base).ty.layout {
                    if !matches!(self.module.expr(index).kind, ExprKind::Literal(_)) {
                        writer.write(&format!(
                            "esslt_index_{}{}(",
                            scalar_name(scalar),
                            size
                        ));
                        self.expr(base, function, 15, writer);
                        writer.write(", ");
                        self.expr(index, function, 15, writer);
                        writer.write(")");
                        return;
                    }
                }
                self.expr(base, function, 1, writer);
                writer.write("[");
                self.expr(index, function, 16, writer);
                writer.write("]");
            }
            ExprKind::Call(target, ref args) => {
                writer.write(&self.user_name(target));
                self.call_args(args, function, writer);
            }
            ExprKind::Intrinsic(intrinsic, ref args) => {
                if self.sampled_call(intrinsic, args, function, writer) {
                    return;
                }
                // HLSL's matrix `*` is already componentwise
                if intrinsic == Intrinsic::MatrixCompMult && args.len() == 2 {
                    writer.write("(");
                    self.expr(args[0], function, 3, writer);
                    writer.write(" * ");
                    self.expr(args[1], function, 3, writer);
                    writer.write(")");
                    return;
                }
                writer.write(&self.intrinsic_name(intrinsic, args));
                self.call_args(args, function, writer);
            }
            ExprKind::Constructor(ref layout, ref args) => {
                match *layout {
                    TypeLayout::Struct(id) => {
                        writer.write(&format!("{}_ctor", self.module.struct_def(id).name));
                        self.call_args(args, function, writer);
                    }
                    TypeLayout::Vector(_, _) | TypeLayout::Matrix(_, _)
                        if args.len() == 1
                            && self.module.expr(args[0]).ty.layout.component_count() == 1 =>
                    {
                        // Scalar splat is a cast in HLSL
                        writer.write(&format!("(({})(", type_name(self.module, layout)));
                        self.expr(args[0], function, 16, writer);
                        writer.write("))");
                    }
                    _ => {
                        writer.write(&type_name(self.module, layout));
                        self.call_args(args, function, writer);
                    }
                }
            }
            ExprKind::Comma(a, b) => {
                let paren = outer <= 15;
                if paren {
                    writer.write("(");
                }
                self.expr(a, function, 15, writer);
                writer.write(", ");
                self.expr(b, function, 15, writer);
                if paren {
                    writer.write(")");
                }
            }
            ExprKind::Error => writer.write("<error>"),
        }
    }

    fn call_args(
        &self,
        args: &[ExprId],
        function: Option<&FunctionDefinition>,
        writer: &mut Writer,
    ) {
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
        esslt_transform_passes::lower::run(&mut module, &TargetCaps::hlsl());
        emit(&module)
    }

    #[test]
    fn vertex_interface_bridged_through_statics() {
        let text = translate(
            "attribute vec3 position; varying vec2 uv; uniform mat4 mvp;\
             void main() { uv = position.xy; gl_Position = mvp * vec4(position, 1.0); }",
            ShaderStage::Vertex,
        );
        assert!(text.contains("cbuffer DriverUniforms : register(b0)"));
        assert!(text.contains("float4x4 mvp;"));
        assert!(text.contains("static float3 position;"));
        assert!(text.contains("float4 gl_Position : SV_POSITION;"));
        assert!(text.contains("void gl_main() {"));
        assert!(text.contains("position = input.position;"));
        assert!(text.contains("output.gl_Position = gl_Position;"));
        assert!(text.contains("mul(float4(position, 1.0), mvp)"));
    }

    #[test]
    fn sampler_split_into_texture_and_state() {
        let text = translate(
            "precision mediump float; uniform sampler2D albedo; varying vec2 uv;\
             void main() { gl_FragColor = texture2D(albedo, uv); }",
            ShaderStage::Fragment,
        );
        assert!(text.contains("Texture2D albedo_texture : register(t0);"));
        assert!(text.contains("SamplerState albedo_sampler : register(s0);"));
        assert!(text.contains("albedo_texture.Sample(albedo_sampler, uv)"));
        assert!(text.contains("float4 gl_FragColor : SV_TARGET0;"));
    }

    #[test]
    fn intrinsics_renamed() {
        let text = translate(
            "uniform float a; uniform float b;\
             void main() { gl_Position = vec4(mix(a, b, 0.5), fract(a), 0.0, 1.0); }",
            ShaderStage::Vertex,
        );
        assert!(text.contains("lerp(a, b, 0.5)"));
        assert!(text.contains("frac(a)"));
    }

    #[test]
    fn dynamic_vector_index_goes_through_helper() {
        let text = translate(
            "uniform vec4 v; uniform int i;\
             void main() { gl_Position = vec4(v[i]); }",
            ShaderStage::Vertex,
        );
        assert!(text.contains("float esslt_index_float4(float4 v, int i) {"));
        assert!(text.contains("esslt_index_float4(v, i)"));
    }

    #[test]
    fn struct_constructor_helper_emitted() {
        let text = translate(
            "struct Light { vec3 dir; float power; };\
             void main() { Light l = Light(vec3(0.0, 1.0, 0.0), 2.0);\
             gl_Position = vec4(l.power); }",
            ShaderStage::Vertex,
        );
        assert!(text.contains("Light Light_ctor(float3 dir, float power) {"));
        assert!(text.contains("Light_ctor(float3(0.0, 1.0, 0.0), 2.0)"));
    }

    #[test]
    fn scalar_splat_becomes_cast() {
        let text = translate(
            "uniform float x; void main() { gl_Position = vec4(x); }",
            ShaderStage::Vertex,
        );
        assert!(text.contains("((float4)(x))"));
    }
}
