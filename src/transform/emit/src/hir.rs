//! Debug dump of the typed IR.
//!
//! This is the target a native code generator would consume; the textual
//! form exists for tests and for the `--target hir` mode of the driver.

use esslt_lang_hir::{
    CaseLabel, ExprId, ExprKind, ForInit, FunctionDefinition, GlobalStorage, Module,
    RootDefinition, Statement,
};

use crate::writer::{bin_op_symbol, float_literal, Writer};

pub fn emit(module: &Module) -> String {
    let mut writer = Writer::new();
    writer.write(&format!(
        "; {:?} shader, version {}",
        module.stage,
        module.version.number()
    ));
    for def in &module.root_order {
        match *def {
            RootDefinition::Struct(id) => {
                let s = module.struct_def(id);
                writer.line();
                writer.write(&format!("struct {}", s.name));
                writer.indent();
                for member in &s.members {
                    writer.line();
                    writer.write(&format!(
                        "{}: {}",
                        member.name,
                        module.type_name(&member.ty.layout)
                    ));
                }
                writer.unindent();
            }
            RootDefinition::Global(id) => {
                let global = module.global(id);
                writer.line();
                writer.write(&format!(
                    "{} {}: {}",
                    storage_name(global.storage),
                    global.name,
                    module.type_name(&global.ty.layout)
                ));
                if let Some(init) = global.init {
                    writer.write(&format!(" = {}", expr_string(module, None, init)));
                }
            }
            RootDefinition::Block(id) => {
                let block = module.block(id);
                writer.line();
                writer.write(&format!("block {}", block.name));
                writer.indent();
                for field in &block.fields {
                    writer.line();
                    writer.write(&format!(
                        "{}: {}",
                        field.name,
                        module.type_name(&field.ty.layout)
                    ));
                    if let Some(offset) = field.offset {
                        writer.write(&format!(" @{}", offset));
                    }
                }
                writer.unindent();
            }
            RootDefinition::Function(id) => {
                let function = module.function(id);
                if !function.defined {
                    continue;
                }
                writer.line();
                let params: Vec<String> = function
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, module.type_name(&p.ty.layout)))
                    .collect();
                writer.write(&format!(
                    "fn {}({}) -> {}",
                    function.name,
                    params.join(", "),
                    module.type_name(&function.return_type.layout)
                ));
                writer.indent();
                emit_statements(module, function, &function.body, &mut writer);
                writer.unindent();
            }
        }
    }
    writer.finish()
}

fn storage_name(storage: GlobalStorage) -> &'static str {
    match storage {
        GlobalStorage::Const => "const",
        GlobalStorage::Input => "in",
        GlobalStorage::Output => "out",
        GlobalStorage::Uniform => "uniform",
        GlobalStorage::Plain => "global",
    }
}

fn emit_statements(
    module: &Module,
    function: &FunctionDefinition,
    statements: &[Statement],
    writer: &mut Writer,
) {
    for statement in statements {
        emit_statement(module, function, statement, writer);
    }
}

fn emit_statement(
    module: &Module,
    function: &FunctionDefinition,
    statement: &Statement,
    writer: &mut Writer,
) {
    let f = Some(function);
    match *statement {
        Statement::Expression(id) => {
            writer.line();
            writer.write(&expr_string(module, f, id));
        }
        Statement::Var(ref def) => {
            writer.line();
            let local = &function.locals[def.id.0 as usize];
            writer.write(&format!(
                "var {}: {}",
                local.name,
                module.type_name(&local.ty.layout)
            ));
            if let Some(init) = def.init {
                writer.write(&format!(" = {}", expr_string(module, f, init)));
            }
        }
        Statement::Block(ref inner) => {
            writer.line();
            writer.write("block");
            writer.indent();
            emit_statements(module, function, inner, writer);
            writer.unindent();
        }
        Statement::If(cond, ref then_block, ref else_block) => {
            writer.line();
            writer.write(&format!("if {}", expr_string(module, f, cond)));
            writer.indent();
            emit_statements(module, function, then_block, writer);
            writer.unindent();
            if let Some(else_block) = else_block {
                writer.line();
                writer.write("else");
                writer.indent();
                emit_statements(module, function, else_block, writer);
                writer.unindent();
            }
        }
        Statement::For(ref init, cond, step, ref body) => {
            writer.line();
            let init_text = match *init {
                ForInit::Empty => String::new(),
                ForInit::Expression(id) => expr_string(module, f, id),
                ForInit::Definition(ref defs) => defs
                    .iter()
                    .map(|def| {
                        let local = &function.locals[def.id.0 as usize];
                        match def.init {
                            Some(value) => {
                                format!("{} = {}", local.name, expr_string(module, f, value))
                            }
                            None => local.name.clone(),
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            };
            let cond_text = cond.map_or(String::new(), |c| expr_string(module, f, c));
            let step_text = step.map_or(String::new(), |s| expr_string(module, f, s));
            writer.write(&format!("for [{}; {}; {}]", init_text, cond_text, step_text));
            writer.indent();
            emit_statements(module, function, body, writer);
            writer.unindent();
        }
        Statement::While(cond, ref body) => {
            writer.line();
            writer.write(&format!("while {}", expr_string(module, f, cond)));
            writer.indent();
            emit_statements(module, function, body, writer);
            writer.unindent();
        }
        Statement::DoWhile(ref body, cond) => {
            writer.line();
            writer.write("do");
            writer.indent();
            emit_statements(module, function, body, writer);
            writer.unindent();
            writer.line();
            writer.write(&format!("while {}", expr_string(module, f, cond)));
        }
        Statement::Switch(value, ref cases) => {
            writer.line();
            writer.write(&format!("switch {}", expr_string(module, f, value)));
            writer.indent();
            for case in cases {
                writer.line();
                match case.label {
                    CaseLabel::Case(id) => {
                        writer.write(&format!("case {}", expr_string(module, f, id)))
                    }
                    CaseLabel::Default => writer.write("default"),
                }
                writer.indent();
                emit_statements(module, function, &case.statements, writer);
                writer.unindent();
            }
            writer.unindent();
        }
        Statement::Return(value) => {
            writer.line();
            match value {
                Some(id) => writer.write(&format!("return {}", expr_string(module, f, id))),
                None => writer.write("return"),
            }
        }
        Statement::Break => {
            writer.line();
            writer.write("break");
        }
        Statement::Continue => {
            writer.line();
            writer.write("continue");
        }
        Statement::Discard => {
            writer.line();
            writer.write("discard");
        }
        Statement::ForwardProgressGuard => {
            writer.line();
            writer.write("loop-guard");
        }
    }
}

fn expr_string(module: &Module, function: Option<&FunctionDefinition>, id: ExprId) -> String {
    let node = module.expr(id);
    match node.kind {
        ExprKind::Literal(lit) => match lit {
            esslt_lang_hir::Literal::Bool(v) => format!("{}", v),
            esslt_lang_hir::Literal::Int(v) => format!("{}", v),
            esslt_lang_hir::Literal::UInt(v) => format!("{}u", v),
            esslt_lang_hir::Literal::Float(v) => float_literal(v),
        },
        ExprKind::Local(local) => match function {
            Some(f) => f.locals[local.0 as usize].name.clone(),
            None => format!("local#{}", local.0),
        },
        ExprKind::Global(global) => module.global(global).name.clone(),
        ExprKind::BlockMember(block, field) => format!(
            "{}.{}",
            module.block(block).name,
            module.block(block).fields[field].name
        ),
        ExprKind::Builtin(builtin) => builtin.name().to_string(),
        ExprKind::Unary(op, inner) => {
            format!("({:?} {})", op, expr_string(module, function, inner))
        }
        ExprKind::Binary(op, lhs, rhs) => format!(
            "({} {} {})",
            bin_op_symbol(op),
            expr_string(module, function, lhs),
            expr_string(module, function, rhs)
        ),
        ExprKind::Ternary(cond, a, b) => format!(
            "(select {} {} {})",
            expr_string(module, function, cond),
            expr_string(module, function, a),
            expr_string(module, function, b)
        ),
        ExprKind::Assign(op, lhs, rhs) => {
            let symbol = match op {
                Some(op) => format!("{}=", bin_op_symbol(op)),
                None => "=".to_string(),
            };
            format!(
                "({} {} {})",
                symbol,
                expr_string(module, function, lhs),
                expr_string(module, function, rhs)
            )
        }
        ExprKind::Swizzle(base, ref components) => {
            let swizzle: String = components.iter().map(|c| c.name()).collect();
            format!("{}.{}", expr_string(module, function, base), swizzle)
        }
        ExprKind::Member(base, field) => {
            let name = match module.expr(base).ty.layout {
                esslt_lang_hir::TypeLayout::Struct(id) => {
                    module.struct_def(id).members[field].name.clone()
                }
                _ => format!("#{}", field),
            };
            format!("{}.{}", expr_string(module, function, base), name)
        }
        ExprKind::Index(base, index) => format!(
            "{}[{}]",
            expr_string(module, function, base),
            expr_string(module, function, index)
        ),
        ExprKind::Call(target, ref args) => format!(
            "(call {}{})",
            module.function(target).name,
            args_string(module, function, args)
        ),
        ExprKind::Intrinsic(intrinsic, ref args) => format!(
            "({}{})",
            intrinsic.name(),
            args_string(module, function, args)
        ),
        ExprKind::Constructor(ref layout, ref args) => format!(
            "({}{})",
            module.type_name(layout),
            args_string(module, function, args)
        ),
        ExprKind::Comma(a, b) => format!(
            "(comma {} {})",
            expr_string(module, function, a),
            expr_string(module, function, b)
        ),
        ExprKind::Error => "<error>".to_string(),
    }
}

fn args_string(
    module: &Module,
    function: Option<&FunctionDefinition>,
    args: &[ExprId],
) -> String {
    let mut text = String::new();
    for &arg in args {
        text.push(' ');
        text.push_str(&expr_string(module, function, arg));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::{Diagnostics, ShaderStage, ShaderVersion};

    fn dump(source: &str) -> String {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
        let text =
            esslt_transform_preprocess::preprocess(&[source], &mut handler, &mut diagnostics);
        let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
        let module = esslt_transform_ast_to_hir::type_check(
            &unit,
            ShaderVersion::Essl100,
            ShaderStage::Vertex,
            &mut diagnostics,
        );
        assert!(!diagnostics.has_errors(), "log: {}", diagnostics.info_log());
        emit(&module)
    }

    #[test]
    fn globals_and_main_are_dumped() {
        let text = dump(
            "uniform mat4 mvp; attribute vec3 position;\
             void main() { gl_Position = mvp * vec4(position, 1.0); }",
        );
        assert!(text.contains("uniform mvp: mat4"));
        assert!(text.contains("in position: vec3"));
        assert!(text.contains("fn main() -> void"));
        assert!(text.contains("(= gl_Position (* mvp (vec4 position 1.0)))"));
    }

    #[test]
    fn control_flow_is_indented() {
        let text = dump(
            "void main() { for (int i = 0; i < 4; i++) { if (i == 2) { continue; } } }",
        );
        assert!(text.contains("for [i = 0; (< i 4);"));
        assert!(text.contains("\t\tif (== i 2)"));
        assert!(text.contains("continue"));
    }
}
