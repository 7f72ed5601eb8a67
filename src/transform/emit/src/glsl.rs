//! GLSL and ESSL output.
//!
//! Walks `root_order` and spells the module back out for the requested
//! dialect: `attribute`/`varying` vs `in`/`out`, precision qualifiers only
//! for ESSL, layout qualifiers where the version allows them. Optional
//! builtin emulation replaces a fixed set of intrinsics with `webgl_*_emu`
//! wrapper functions injected ahead of the user code.

use esslt_lang_hir::{
    CaseLabel, ExprId, ExprKind, ForInit, FunctionDefinition, GlobalStorage, GlobalVariable,
    Interpolation, Intrinsic, Literal, Module, Precision, RootDefinition, Statement, TypeLayout,
    UnaryOp,
};
use esslt_shared::{CompileOptions, ShaderStage, ShaderVersion};

use crate::writer::{bin_op_precedence, bin_op_symbol, float_literal, Writer};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Dialect {
    Essl,
    Glsl(u16),
}

impl Dialect {
    fn is_essl(self) -> bool {
        self == Dialect::Essl
    }
}

const LOOP_GUARD_NAME: &str = "esslt_loop_guard";
const LOOP_GUARD_LIMIT: u32 = 65536;

/// Intrinsics that get `webgl_*_emu` wrappers, keyed with the component
/// count of the first argument.
type EmulationKey = (Intrinsic, u32);

pub fn emit(module: &Module, dialect: Dialect, options: CompileOptions) -> String {
    let emulated = if options.contains(CompileOptions::EMULATE_BUILTINS) {
        collect_emulated(module)
    } else {
        Vec::new()
    };
    let emitter = Emitter {
        module,
        dialect,
        emulated,
    };
    let mut writer = Writer::new();
    emitter.header(&mut writer);
    if emitter.uses_loop_guard() {
        writer.line();
        writer.write(&format!("int {} = 0;", LOOP_GUARD_NAME));
    }
    for &key in &emitter.emulated {
        emitter.emulation_body(key, &mut writer);
    }
    for def in &module.root_order {
        match *def {
            RootDefinition::Struct(id) => emitter.struct_def(id, &mut writer),
            RootDefinition::Global(id) => emitter.global(id, &mut writer),
            RootDefinition::Block(id) => emitter.block(id, &mut writer),
            RootDefinition::Function(id) => emitter.function(id, &mut writer),
        }
    }
    writer.finish()
}

fn emulation_name(intrinsic: Intrinsic) -> String {
    format!("webgl_{}_emu", intrinsic.name())
}

fn is_emulatable(intrinsic: Intrinsic) -> bool {
    matches!(
        intrinsic,
        Intrinsic::Dot
            | Intrinsic::Length
            | Intrinsic::Normalize
            | Intrinsic::Distance
            | Intrinsic::Reflect
            | Intrinsic::FaceForward
    )
}

/// The emulation signatures referenced by live code, in first-seen order.
fn collect_emulated(module: &Module) -> Vec<EmulationKey> {
    let mut keys: Vec<EmulationKey> = Vec::new();
    for def in &module.root_order {
        let function = match *def {
            RootDefinition::Function(id) => module.function(id),
            _ => continue,
        };
        for_each_expr(module, &function.body, &mut |id| {
            if let ExprKind::Intrinsic(intrinsic, ref args) = module.expr(id).kind {
                if is_emulatable(intrinsic) {
                    if let Some(&first) = args.first() {
                        let size = module.expr(first).ty.layout.component_count();
                        if size >= 1 && !keys.contains(&(intrinsic, size)) {
                            keys.push((intrinsic, size));
                        }
                    }
                }
            }
        });
    }
    keys
}

fn for_each_expr<F: FnMut(ExprId)>(module: &Module, statements: &[Statement], f: &mut F) {
    let mut roots = Vec::new();
    collect_statement_exprs(statements, &mut roots);
    while let Some(id) = roots.pop() {
        f(id);
        match module.expr(id).kind {
            ExprKind::Unary(_, a) => roots.push(a),
            ExprKind::Binary(_, a, b) | ExprKind::Assign(_, a, b) | ExprKind::Comma(a, b) => {
                roots.extend([a, b])
            }
            ExprKind::Ternary(a, b, c) => roots.extend([a, b, c]),
            ExprKind::Swizzle(a, _) | ExprKind::Member(a, _) => roots.push(a),
            ExprKind::Index(a, b) => roots.extend([a, b]),
            ExprKind::Call(_, ref args)
            | ExprKind::Intrinsic(_, ref args)
            | ExprKind::Constructor(_, ref args) => roots.extend(args.iter().copied()),
            _ => {}
        }
    }
}

fn collect_statement_exprs(statements: &[Statement], out: &mut Vec<ExprId>) {
    for statement in statements {
        match *statement {
            Statement::Expression(id) => out.push(id),
            Statement::Var(ref def) => out.extend(def.init),
            Statement::Block(ref inner) => collect_statement_exprs(inner, out),
            Statement::If(cond, ref then_block, ref else_block) => {
                out.push(cond);
                collect_statement_exprs(then_block, out);
                if let Some(else_block) = else_block {
                    collect_statement_exprs(else_block, out);
                }
            }
            Statement::For(ref init, cond, step, ref body) => {
                match *init {
                    ForInit::Expression(id) => out.push(id),
                    ForInit::Definition(ref defs) => {
                        out.extend(defs.iter().filter_map(|d| d.init))
                    }
                    ForInit::Empty => {}
                }
                out.extend(cond);
                out.extend(step);
                collect_statement_exprs(body, out);
            }
            Statement::While(cond, ref body) => {
                out.push(cond);
                collect_statement_exprs(body, out);
            }
            Statement::DoWhile(ref body, cond) => {
                collect_statement_exprs(body, out);
                out.push(cond);
            }
            Statement::Switch(value, ref cases) => {
                out.push(value);
                for case in cases {
                    if let CaseLabel::Case(id) = case.label {
                        out.push(id);
                    }
                    collect_statement_exprs(&case.statements, out);
                }
            }
            Statement::Return(value) => out.extend(value),
            _ => {}
        }
    }
}

struct Emitter<'m> {
    module: &'m Module,
    dialect: Dialect,
    emulated: Vec<EmulationKey>,
}

impl<'m> Emitter<'m> {
    fn header(&self, writer: &mut Writer) {
        match self.dialect {
            Dialect::Essl => match self.module.version {
                ShaderVersion::Essl100 => {}
                ShaderVersion::Essl300 => writer.write("#version 300 es"),
                ShaderVersion::Essl310 => writer.write("#version 310 es"),
            },
            Dialect::Glsl(version) => writer.write(&format!("#version {}", version)),
        }
        if self.dialect.is_essl() {
            writer.line();
            match self.module.stage {
                ShaderStage::Fragment => writer.write("precision mediump float;"),
                _ => writer.write("precision highp float;"),
            }
        }
        for &builtin in &self.module.invariant_builtins {
            writer.line();
            writer.write(&format!("invariant {};", builtin.name()));
        }
    }

    fn uses_loop_guard(&self) -> bool {
        self.module.functions.iter().any(|f| {
            let mut found = false;
            visit(&f.body, &mut |statement| {
                if *statement == Statement::ForwardProgressGuard {
                    found = true;
                }
            });
            found
        })
    }

    fn emulation_body(&self, key: EmulationKey, writer: &mut Writer) {
        let (intrinsic, size) = key;
        let ty = if size == 1 {
            "float".to_string()
        } else {
            format!("vec{}", size)
        };
        let name = emulation_name(intrinsic);
        let dot = |a: &str, b: &str| {
            if size == 1 {
                format!("({} * {})", a, b)
            } else {
                let terms: Vec<String> = ["x", "y", "z", "w"][..size as usize]
                    .iter()
                    .map(|c| format!("{}.{} * {}.{}", a, c, b, c))
                    .collect();
                format!("({})", terms.join(" + "))
            }
        };
        writer.line();
        match intrinsic {
            Intrinsic::Dot => {
                writer.write(&format!(
                    "float {}({} x, {} y) {{ return {}; }}",
                    name,
                    ty,
                    ty,
                    dot("x", "y")
                ));
            }
            Intrinsic::Length => {
                writer.write(&format!(
                    "float {}({} x) {{ return sqrt({}); }}",
                    name,
                    ty,
                    dot("x", "x")
                ));
            }
            Intrinsic::Normalize => {
                writer.write(&format!(
                    "{} {}({} x) {{ return x / sqrt({}); }}",
                    ty,
                    name,
                    ty,
                    dot("x", "x")
                ));
            }
            Intrinsic::Distance => {
                writer.write(&format!(
                    "float {0}({1} x, {1} y) {{ {1} d = x - y; return sqrt({2}); }}",
                    name,
                    ty,
                    dot("d", "d")
                ));
            }
            Intrinsic::Reflect => {
                writer.write(&format!(
                    "{0} {1}({0} i, {0} n) {{ return i - 2.0 * {2} * n; }}",
                    ty,
                    name,
                    dot("n", "i")
                ));
            }
            Intrinsic::FaceForward => {
                writer.write(&format!(
                    "{0} {1}({0} n, {0} i, {0} nref) {{ return {2} < 0.0 ? n : -n; }}",
                    ty,
                    name,
                    dot("nref", "i")
                ));
            }
            _ => unreachable!("not an emulated intrinsic"),
        }
    }

    fn precision_prefix(&self, precision: Option<Precision>) -> &'static str {
        if !self.dialect.is_essl() {
            return "";
        }
        match precision {
            Some(Precision::Lowp) => "lowp ",
            Some(Precision::Mediump) => "mediump ",
            Some(Precision::Highp) => "highp ",
            None => "",
        }
    }

    /// Base type plus declarator array dimensions, outermost first.
    fn declaration_parts(&self, layout: &TypeLayout) -> (String, String) {
        let mut dims = String::new();
        let mut layout = layout;
        while let TypeLayout::Array(ref inner, size) = *layout {
            match size {
                Some(n) => dims.push_str(&format!("[{}]", n)),
                None => dims.push_str("[]"),
            }
            layout = inner;
        }
        (self.module.type_name(layout), dims)
    }

    fn struct_def(&self, id: esslt_lang_hir::StructId, writer: &mut Writer) {
        let def = self.module.struct_def(id);
        writer.line();
        writer.write(&format!("struct {} {{", def.name));
        writer.indent();
        for member in &def.members {
            writer.line();
            let (base, dims) = self.declaration_parts(&member.ty.layout);
            writer.write(&format!(
                "{}{} {}{};",
                self.precision_prefix(member.ty.precision),
                base,
                member.name,
                dims
            ));
        }
        writer.unindent();
        writer.line();
        writer.write("};");
    }

    fn storage_spelling(&self, global: &GlobalVariable) -> &'static str {
        let legacy = self.dialect.is_essl() && self.module.version == ShaderVersion::Essl100;
        match (global.storage, self.module.stage) {
            (GlobalStorage::Const, _) => "const ",
            (GlobalStorage::Uniform, _) => "uniform ",
            (GlobalStorage::Input, ShaderStage::Vertex) if legacy => "attribute ",
            (GlobalStorage::Input, _) if legacy => "varying ",
            (GlobalStorage::Input, _) => "in ",
            (GlobalStorage::Output, _) if legacy => "varying ",
            (GlobalStorage::Output, _) => "out ",
            (GlobalStorage::Plain, _) => "",
        }
    }

    fn global(&self, id: esslt_lang_hir::GlobalId, writer: &mut Writer) {
        let global = self.module.global(id);
        writer.line();
        if global.location.is_some() && self.module.version.supports_location_qualifier() {
            writer.write(&format!("layout(location = {}) ", global.location.unwrap()));
        }
        if global.invariant {
            writer.write("invariant ");
        }
        if global.centroid {
            writer.write("centroid ");
        }
        if global.interpolation == Some(Interpolation::Flat) {
            writer.write("flat ");
        }
        writer.write(self.storage_spelling(global));
        let (base, dims) = self.declaration_parts(&global.ty.layout);
        writer.write(&format!(
            "{}{} {}{}",
            self.precision_prefix(global.ty.precision),
            base,
            global.name,
            dims
        ));
        if let Some(init) = global.init {
            writer.write(" = ");
            self.expr(init, None, 16, writer);
        }
        writer.write(";");
    }

    fn block(&self, id: esslt_lang_hir::BlockId, writer: &mut Writer) {
        let block = self.module.block(id);
        writer.line();
        let mut qualifiers = vec![block.layout.name().to_string()];
        if block.row_major {
            qualifiers.push("row_major".to_string());
        }
        if let Some(binding) = block.binding {
            qualifiers.push(format!("binding = {}", binding));
        }
        writer.write(&format!(
            "layout({}) uniform {} {{",
            qualifiers.join(", "),
            block.name
        ));
        writer.indent();
        for field in &block.fields {
            writer.line();
            let (base, dims) = self.declaration_parts(&field.ty.layout);
            writer.write(&format!(
                "{}{} {}{};",
                self.precision_prefix(field.ty.precision),
                base,
                field.name,
                dims
            ));
        }
        writer.unindent();
        writer.line();
        match block.instance_name {
            Some(ref instance) => writer.write(&format!("}} {};", instance)),
            None => writer.write("};"),
        }
    }

    fn function(&self, id: esslt_lang_hir::FunctionId, writer: &mut Writer) {
        let function = self.module.function(id);
        if !function.defined {
            return;
        }
        writer.line();
        let (ret_base, ret_dims) = self.declaration_parts(&function.return_type.layout);
        writer.write(&format!("{}{} {}(", ret_base, ret_dims, function.name));
        for (index, param) in function.params.iter().enumerate() {
            if index > 0 {
                writer.write(", ");
            }
            match param.direction {
                esslt_lang_hir::ParamDirection::In => {}
                esslt_lang_hir::ParamDirection::Out => writer.write("out "),
                esslt_lang_hir::ParamDirection::InOut => writer.write("inout "),
            }
            let (base, dims) = self.declaration_parts(&param.ty.layout);
            writer.write(&format!(
                "{}{} {}{}",
                self.precision_prefix(param.ty.precision),
                base,
                param.name,
                dims
            ));
        }
        writer.write(") {");
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
                self.var_def(def, function, writer);
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
                writer.line();
                writer.write("for (");
                match *init {
                    ForInit::Empty => {}
                    ForInit::Expression(id) => self.expr(id, f, 16, writer),
                    ForInit::Definition(ref defs) => {
                        for (index, def) in defs.iter().enumerate() {
                            if index == 0 {
                                self.var_def(def, function, writer);
                            } else {
                                writer.write(", ");
                                self.var_declarator(def, function, writer);
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
                writer.write("do {");
                writer.indent();
                self.statements(body, function, writer);
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
                    self.statements(&case.statements, function, writer);
                    writer.unindent();
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
                writer.write(&format!(
                    "if (++{} > {}) break;",
                    LOOP_GUARD_NAME, LOOP_GUARD_LIMIT
                ));
            }
        }
    }

    fn var_def(&self, def: &esslt_lang_hir::VarDef, function: &FunctionDefinition, writer: &mut Writer) {
        let local = &function.locals[def.id.0 as usize];
        let (base, _) = self.declaration_parts(&local.ty.layout);
        writer.write(&format!(
            "{}{} ",
            self.precision_prefix(local.ty.precision),
            base
        ));
        self.var_declarator(def, function, writer);
    }

    fn var_declarator(
        &self,
        def: &esslt_lang_hir::VarDef,
        function: &FunctionDefinition,
        writer: &mut Writer,
    ) {
        let local = &function.locals[def.id.0 as usize];
        let (_, dims) = self.declaration_parts(&local.ty.layout);
        writer.write(&format!("{}{}", local.name, dims));
        if let Some(init) = def.init {
            writer.write(" = ");
            self.expr(init, Some(function), 16, writer);
        }
    }

    fn intrinsic_name(&self, intrinsic: Intrinsic, args: &[ExprId]) -> String {
        if let Some(&first) = args.first() {
            let size = self.module.expr(first).ty.layout.component_count();
            if self.emulated.contains(&(intrinsic, size)) {
                return emulation_name(intrinsic);
            }
        }
        if let Dialect::Glsl(version) = self.dialect {
            if version >= 150 {
                let renamed = match intrinsic {
                    Intrinsic::Texture2D | Intrinsic::TextureCube => Some("texture"),
                    Intrinsic::Texture2DProj => Some("textureProj"),
                    Intrinsic::Texture2DLod | Intrinsic::TextureCubeLod => Some("textureLod"),
                    _ => None,
                };
                if let Some(name) = renamed {
                    return name.to_string();
                }
            }
        }
        intrinsic.name().to_string()
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
                match block.instance_name {
                    Some(ref instance) => {
                        writer.write(&format!("{}.{}", instance, block.fields[field].name))
                    }
                    None => writer.write(&block.fields[field].name),
                }
            }
            ExprKind::Builtin(builtin) => writer.write(builtin.name()),
            ExprKind::Unary(op, inner) => {
                let prec = 2;
                let paren = outer < prec;
                if paren {
                    writer.write("(");
                }
                match op {
                    UnaryOp::Plus => {
                        writer.write("+");
                        self.expr(inner, function, prec, writer);
                    }
                    UnaryOp::Minus => {
                        writer.write("-");
                        self.expr(inner, function, prec, writer);
                    }
                    UnaryOp::LogicalNot => {
                        writer.write("!");
                        self.expr(inner, function, prec, writer);
                    }
                    UnaryOp::BitwiseNot => {
                        writer.write("~");
                        self.expr(inner, function, prec, writer);
                    }
                    UnaryOp::PrefixIncrement => {
                        writer.write("++");
                        self.expr(inner, function, prec, writer);
                    }
                    UnaryOp::PrefixDecrement => {
                        writer.write("--");
                        self.expr(inner, function, prec, writer);
                    }
                    UnaryOp::PostfixIncrement => {
                        self.expr(inner, function, 1, writer);
                        writer.write("++");
                    }
                    UnaryOp::PostfixDecrement => {
                        self.expr(inner, function, 1, writer);
                        writer.write("--");
                    }
                }
                if paren {
                    writer.write(")");
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
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
                self.expr(base, function, 1, writer);
                writer.write("[");
                self.expr(index, function, 16, writer);
                writer.write("]");
            }
            ExprKind::Call(target, ref args) => {
                writer.write(&self.module.function(target).name);
                self.call_args(args, function, writer);
            }
            ExprKind::Intrinsic(intrinsic, ref args) => {
                writer.write(&self.intrinsic_name(intrinsic, args));
                self.call_args(args, function, writer);
            }
            ExprKind::Constructor(ref layout, ref args) => {
                writer.write(&self.module.type_name(layout));
                self.call_args(args, function, writer);
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
    use esslt_shared::Diagnostics;

    fn translate(
        source: &str,
        version: ShaderVersion,
        stage: ShaderStage,
        dialect: Dialect,
        options: CompileOptions,
    ) -> String {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
        let text =
            esslt_transform_preprocess::preprocess(&[source], &mut handler, &mut diagnostics);
        let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
        let mut module =
            esslt_transform_ast_to_hir::type_check(&unit, version, stage, &mut diagnostics);
        assert!(!diagnostics.has_errors(), "log: {}", diagnostics.info_log());
        if options.contains(CompileOptions::LOOP_PROGRESS_GUARDS) {
            esslt_transform_passes::loop_progress::run(&mut module);
        }
        emit(&module, dialect, options)
    }

    fn essl(source: &str) -> String {
        translate(
            source,
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
            Dialect::Essl,
            CompileOptions::OBJECT_CODE,
        )
    }

    #[test]
    fn legacy_qualifier_spelling() {
        let text = essl(
            "attribute vec3 position; varying vec2 uv; uniform mat4 mvp;\
             void main() { uv = position.xy; gl_Position = mvp * vec4(position, 1.0); }",
        );
        assert!(text.contains("attribute vec3 position;"));
        assert!(text.contains("varying vec2 uv;"));
        assert!(text.contains("uniform mat4 mvp;"));
        assert!(text.contains("gl_Position = mvp * vec4(position, 1.0);"));
    }

    #[test]
    fn essl300_uses_in_out_and_header() {
        let text = translate(
            "#version 300 es\nin vec3 position; out vec2 uv;\
             void main() { uv = position.xy; gl_Position = vec4(position, 1.0); }",
            ShaderVersion::Essl300,
            ShaderStage::Vertex,
            Dialect::Essl,
            CompileOptions::OBJECT_CODE,
        );
        assert!(text.starts_with("#version 300 es"));
        assert!(text.contains("in vec3 position;"));
        assert!(text.contains("out vec2 uv;"));
    }

    #[test]
    fn desktop_glsl_strips_precision() {
        let text = translate(
            "uniform highp vec4 color; void main() { gl_Position = color; }",
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
            Dialect::Glsl(330),
            CompileOptions::OBJECT_CODE,
        );
        assert!(text.starts_with("#version 330"));
        assert!(!text.contains("highp"));
        assert!(!text.contains("precision "));
    }

    #[test]
    fn fragment_gets_default_precision() {
        let text = translate(
            "void main() { gl_FragColor = vec4(1.0); }",
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
            Dialect::Essl,
            CompileOptions::OBJECT_CODE,
        );
        assert!(text.contains("precision mediump float;"));
    }

    #[test]
    fn dot_emulation_injected() {
        let text = translate(
            "uniform float u; void main() { gl_Position = vec4(dot(u, 1.0), 1, 1, 1); }",
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
            Dialect::Essl,
            CompileOptions::OBJECT_CODE | CompileOptions::EMULATE_BUILTINS,
        );
        assert!(text.contains("float webgl_dot_emu(float x, float y)"));
        assert!(text.contains("webgl_dot_emu(u, 1.0)"));
    }

    #[test]
    fn emulation_not_injected_without_option() {
        let text = translate(
            "uniform vec3 u; uniform vec3 v;\
             void main() { gl_Position = vec4(dot(u, v)); }",
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
            Dialect::Essl,
            CompileOptions::OBJECT_CODE,
        );
        assert!(!text.contains("webgl_dot_emu"));
        assert!(text.contains("dot(u, v)"));
    }

    #[test]
    fn loop_guard_spelled_out() {
        let text = translate(
            "uniform bool cond; void main() { while (cond) { } gl_Position = vec4(0.0); }",
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
            Dialect::Essl,
            CompileOptions::OBJECT_CODE | CompileOptions::LOOP_PROGRESS_GUARDS,
        );
        assert!(text.contains("int esslt_loop_guard = 0;"));
        assert!(text.contains("if (++esslt_loop_guard > 65536) break;"));
    }

    #[test]
    fn precedence_parenthesizes_only_when_needed() {
        let text = essl(
            "uniform float a; uniform float b; uniform float c;\
             void main() { gl_Position = vec4((a + b) * c - a / b); }",
        );
        assert!(text.contains("(a + b) * c - a / b"));
    }

    #[test]
    fn interface_block_emitted_with_layout() {
        let text = translate(
            "#version 300 es\nlayout(std140) uniform Scene { mat4 view; } scene;\
             void main() { gl_Position = scene.view[0]; }",
            ShaderVersion::Essl300,
            ShaderStage::Vertex,
            Dialect::Essl,
            CompileOptions::OBJECT_CODE,
        );
        assert!(text.contains("layout(std140) uniform Scene {"));
        assert!(text.contains("} scene;"));
        assert!(text.contains("scene.view[0]"));
    }

    #[test]
    fn struct_and_function_roundtrip() {
        let text = essl(
            "struct Light { vec3 dir; float power; };\
             float shade(Light l) { return l.power; }\
             void main() { Light l = Light(vec3(0.0, 1.0, 0.0), 2.0);\
             gl_Position = vec4(shade(l)); }",
        );
        assert!(text.contains("struct Light {"));
        assert!(text.contains("float shade(Light l) {"));
        assert!(text.contains("return l.power;"));
        assert!(text.contains("Light(vec3(0.0, 1.0, 0.0), 2.0)"));
    }
}
