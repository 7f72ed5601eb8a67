//! Target legalization.
//!
//! Rewrites constructs some output languages cannot express: assignments,
//! increments and commas in expression position become their own statements
//! (with temporaries where value order matters), multi-component swizzle
//! stores become per-component stores, and combined samplers are planned
//! into texture/sampler pairs for targets with separate objects.

use esslt_lang_hir::{
    ExprId, ExprKind, ForInit, GlobalStorage, Local, LocalId, Module, SamplerSplit, Statement,
    SwizzleComponent, Type, TypeLayout, UnaryOp, VarDef,
};

use crate::walk;

/// What the output language can express directly.
pub struct TargetCaps {
    /// Assignments and increments may appear inside larger expressions
    pub expression_assignments: bool,
    /// `v.xy = e` is a legal store
    pub swizzle_assignment: bool,
    /// Combined samplers must be split into texture + sampler objects
    pub split_samplers: bool,
}

impl TargetCaps {
    pub fn glsl() -> TargetCaps {
        TargetCaps {
            expression_assignments: true,
            swizzle_assignment: true,
            split_samplers: false,
        }
    }

    pub fn hlsl() -> TargetCaps {
        TargetCaps {
            expression_assignments: true,
            swizzle_assignment: true,
            split_samplers: true,
        }
    }

    pub fn wgsl() -> TargetCaps {
        TargetCaps {
            expression_assignments: false,
            swizzle_assignment: false,
            split_samplers: true,
        }
    }
}

pub fn run(module: &mut Module, caps: &TargetCaps) {
    if caps.split_samplers {
        plan_sampler_splits(module);
    }
    if !caps.expression_assignments || !caps.swizzle_assignment {
        for index in 0..module.functions.len() {
            let body = std::mem::take(&mut module.functions[index].body);
            let mut locals = std::mem::take(&mut module.functions[index].locals);
            let lowered = lower_statements(module, body, &mut locals, caps);
            module.functions[index].locals = locals;
            module.functions[index].body = lowered;
        }
    }
}

fn plan_sampler_splits(module: &mut Module) {
    module.sampler_splits.clear();
    let mut splits = Vec::new();
    for (index, global) in module.globals.iter().enumerate() {
        if global.storage != GlobalStorage::Uniform {
            continue;
        }
        let sampled = match global.ty.layout {
            TypeLayout::Sampler(_) => true,
            TypeLayout::Array(ref inner, _) => matches!(**inner, TypeLayout::Sampler(_)),
            _ => false,
        };
        if sampled {
            splits.push(SamplerSplit {
                global: esslt_lang_hir::GlobalId(index as u32),
                texture_name: format!("{}_texture", global.name),
                sampler_name: format!("{}_sampler", global.name),
            });
        }
    }
    module.sampler_splits = splits;
}

fn fresh_local(locals: &mut Vec<Local>, ty: Type) -> LocalId {
    let id = LocalId(locals.len() as u32);
    locals.push(Local {
        name: format!("esslt_tmp_{}", locals.len()),
        ty,
    });
    id
}

/// A value node that is safe to drop or duplicate.
fn is_pure_value(kind: &ExprKind) -> bool {
    matches!(
        *kind,
        ExprKind::Literal(_)
            | ExprKind::Local(_)
            | ExprKind::Global(_)
            | ExprKind::Builtin(_)
            | ExprKind::BlockMember(_, _)
            | ExprKind::Error
    )
}

/// Hoists assignments, commas and increments out of the expression rooted
/// at `id`, pushing the side effects onto `out` in evaluation order. The
/// node itself is rewritten in place to the resulting value.
fn hoist_expr(
    module: &mut Module,
    id: ExprId,
    locals: &mut Vec<Local>,
    out: &mut Vec<Statement>,
    root: bool,
) {
    let kind = module.expr(id).kind.clone();
    match kind {
        ExprKind::Assign(_, lhs, rhs) => {
            hoist_expr(module, rhs, locals, out, false);
            hoist_expr(module, lhs, locals, out, false);
            if !root {
                let node = module.expr(id).clone();
                let hoisted = module.exprs.alloc(node);
                out.push(Statement::Expression(hoisted));
                let lvalue = module.expr(lhs).clone();
                module.exprs[id].kind = lvalue.kind;
            }
        }
        ExprKind::Comma(a, b) => {
            hoist_expr(module, a, locals, out, false);
            if !is_pure_value(&module.expr(a).kind) {
                out.push(Statement::Expression(a));
            }
            hoist_expr(module, b, locals, out, false);
            let value = module.expr(b).clone();
            module.exprs[id].kind = value.kind;
        }
        ExprKind::Unary(op, inner) if op.is_increment_or_decrement() && !root => {
            hoist_expr(module, inner, locals, out, false);
            let postfix = matches!(
                op,
                UnaryOp::PostfixIncrement | UnaryOp::PostfixDecrement
            );
            if postfix {
                // The expression's value is the counter before the step
                let inner_node = module.expr(inner).clone();
                let temp = fresh_local(locals, inner_node.ty.clone());
                let init = module.exprs.alloc(inner_node);
                out.push(Statement::Var(VarDef {
                    id: temp,
                    init: Some(init),
                }));
                let step = module.expr(id).clone();
                let hoisted = module.exprs.alloc(step);
                out.push(Statement::Expression(hoisted));
                module.exprs[id].kind = ExprKind::Local(temp);
            } else {
                let step = module.expr(id).clone();
                let hoisted = module.exprs.alloc(step);
                out.push(Statement::Expression(hoisted));
                let value = module.expr(inner).clone();
                module.exprs[id].kind = value.kind;
            }
        }
        other => {
            for child in walk::expr_children(&other) {
                hoist_expr(module, child, locals, out, false);
            }
        }
    }
}

/// Splits `base.xy = value` into one store per component through a
/// temporary, so the value is evaluated once.
fn expand_swizzle_store(
    module: &mut Module,
    id: ExprId,
    locals: &mut Vec<Local>,
    out: &mut Vec<Statement>,
) -> bool {
    let (op, lhs, rhs) = match module.expr(id).kind {
        ExprKind::Assign(op, lhs, rhs) => (op, lhs, rhs),
        _ => return false,
    };
    let (base, components) = match module.expr(lhs).kind.clone() {
        ExprKind::Swizzle(base, components) if components.len() > 1 => (base, components),
        _ => return false,
    };
    let loc = module.expr(id).loc;
    let value_ty = module.expr(lhs).ty.clone();

    // Fold a compound store into a plain one first
    let rhs = match op {
        Some(binop) => {
            let read = module.expr(lhs).clone();
            let read_id = module.exprs.alloc(read);
            module.alloc_expr(
                ExprKind::Binary(binop, read_id, rhs),
                value_ty.clone(),
                loc,
            )
        }
        None => rhs,
    };

    let temp = fresh_local(locals, value_ty.clone());
    out.push(Statement::Var(VarDef {
        id: temp,
        init: Some(rhs),
    }));

    let scalar = match value_ty.layout {
        TypeLayout::Vector(scalar, _) => scalar,
        _ => return false,
    };
    let scalar_ty = Type::with_precision(TypeLayout::Scalar(scalar), value_ty.precision);
    let source_components = [
        SwizzleComponent::X,
        SwizzleComponent::Y,
        SwizzleComponent::Z,
        SwizzleComponent::W,
    ];
    for (index, component) in components.iter().enumerate() {
        let target = module.alloc_expr(
            ExprKind::Swizzle(base, vec![*component]),
            scalar_ty.clone(),
            loc,
        );
        let temp_ref = module.alloc_expr(ExprKind::Local(temp), value_ty.clone(), loc);
        let source = module.alloc_expr(
            ExprKind::Swizzle(temp_ref, vec![source_components[index]]),
            scalar_ty.clone(),
            loc,
        );
        let store = module.alloc_expr(
            ExprKind::Assign(None, target, source),
            scalar_ty.clone(),
            loc,
        );
        out.push(Statement::Expression(store));
    }
    true
}

fn lower_statements(
    module: &mut Module,
    statements: Vec<Statement>,
    locals: &mut Vec<Local>,
    caps: &TargetCaps,
) -> Vec<Statement> {
    let mut out = Vec::new();
    for statement in statements {
        match statement {
            Statement::Expression(id) => {
                if !caps.expression_assignments {
                    hoist_expr(module, id, locals, &mut out, true);
                }
                if !caps.swizzle_assignment && expand_swizzle_store(module, id, locals, &mut out)
                {
                    continue;
                }
                if !is_pure_value(&module.expr(id).kind) {
                    out.push(Statement::Expression(id));
                }
            }
            Statement::Var(def) => {
                if !caps.expression_assignments {
                    if let Some(init) = def.init {
                        hoist_expr(module, init, locals, &mut out, false);
                    }
                }
                out.push(Statement::Var(def));
            }
            Statement::Block(inner) => {
                let inner = lower_statements(module, inner, locals, caps);
                out.push(Statement::Block(inner));
            }
            Statement::If(cond, then_block, else_block) => {
                if !caps.expression_assignments {
                    hoist_expr(module, cond, locals, &mut out, false);
                }
                let then_block = lower_statements(module, then_block, locals, caps);
                let else_block =
                    else_block.map(|block| lower_statements(module, block, locals, caps));
                out.push(Statement::If(cond, then_block, else_block));
            }
            Statement::For(init, cond, step, body) => {
                // Loop headers run per iteration and are left alone; only
                // the one-shot init may be hoisted in front of the loop
                let init = match init {
                    ForInit::Definition(defs) => {
                        if !caps.expression_assignments {
                            for def in &defs {
                                if let Some(value) = def.init {
                                    hoist_expr(module, value, locals, &mut out, false);
                                }
                            }
                        }
                        ForInit::Definition(defs)
                    }
                    other => other,
                };
                let body = lower_statements(module, body, locals, caps);
                out.push(Statement::For(init, cond, step, body));
            }
            Statement::While(cond, body) => {
                let body = lower_statements(module, body, locals, caps);
                out.push(Statement::While(cond, body));
            }
            Statement::DoWhile(body, cond) => {
                let body = lower_statements(module, body, locals, caps);
                out.push(Statement::DoWhile(body, cond));
            }
            Statement::Switch(value, cases) => {
                if !caps.expression_assignments {
                    hoist_expr(module, value, locals, &mut out, false);
                }
                let cases = cases
                    .into_iter()
                    .map(|mut case| {
                        case.statements =
                            lower_statements(module, case.statements, locals, caps);
                        case
                    })
                    .collect();
                out.push(Statement::Switch(value, cases));
            }
            Statement::Return(Some(id)) => {
                if !caps.expression_assignments {
                    hoist_expr(module, id, locals, &mut out, false);
                }
                out.push(Statement::Return(Some(id)));
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::{Diagnostics, ShaderStage, ShaderVersion};

    fn lower_shader(source: &str, caps: &TargetCaps) -> Module {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
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
        assert!(!diagnostics.has_errors(), "log: {}", diagnostics.info_log());
        run(&mut module, caps);
        module
    }

    fn main_body(module: &Module) -> &[Statement] {
        let main = module.main_function().unwrap();
        &module.function(main).body
    }

    fn is_plain_assign(module: &Module, statement: &Statement) -> bool {
        match *statement {
            Statement::Expression(id) => {
                matches!(module.expr(id).kind, ExprKind::Assign(_, _, _))
            }
            _ => false,
        }
    }

    #[test]
    fn chained_assignment_is_split() {
        let module = lower_shader(
            "void main() { float a; float b; a = b = 1.0; }",
            &TargetCaps::wgsl(),
        );
        let body = main_body(&module);
        // float a; float b; b = 1.0; a = b;
        assert_eq!(body.len(), 4);
        assert!(is_plain_assign(&module, &body[2]));
        assert!(is_plain_assign(&module, &body[3]));
        if let Statement::Expression(id) = body[3] {
            if let ExprKind::Assign(_, _, rhs) = module.expr(id).kind {
                assert!(matches!(module.expr(rhs).kind, ExprKind::Local(_)));
            }
        }
    }

    #[test]
    fn comma_statement_is_split() {
        let module = lower_shader(
            "void main() { float a; float b; a = 1.0, b = 2.0; }",
            &TargetCaps::wgsl(),
        );
        let body = main_body(&module);
        assert_eq!(body.len(), 4);
        assert!(is_plain_assign(&module, &body[2]));
        assert!(is_plain_assign(&module, &body[3]));
    }

    #[test]
    fn postfix_increment_uses_a_temporary() {
        let module = lower_shader(
            "void main() { float x = 0.0; float y = x++ + 1.0; }",
            &TargetCaps::wgsl(),
        );
        let body = main_body(&module);
        // x = 0.0; tmp = x; x++; y = tmp + 1.0
        assert_eq!(body.len(), 4);
        assert!(matches!(body[1], Statement::Var(_)));
        assert!(matches!(body[2], Statement::Expression(_)));
        if let Statement::Var(ref def) = body[3] {
            let init = def.init.unwrap();
            if let ExprKind::Binary(_, lhs, _) = module.expr(init).kind {
                assert!(matches!(module.expr(lhs).kind, ExprKind::Local(_)));
            } else {
                panic!("expected binary initializer");
            }
        } else {
            panic!("expected variable definition");
        }
    }

    #[test]
    fn swizzle_store_is_expanded() {
        let module = lower_shader(
            "void main() { vec4 v = vec4(0.0); v.xy = vec2(1.0, 2.0); }",
            &TargetCaps::wgsl(),
        );
        let body = main_body(&module);
        // v = ...; tmp = vec2(1.0, 2.0); v.x = tmp.x; v.y = tmp.y
        assert_eq!(body.len(), 4);
        assert!(matches!(body[1], Statement::Var(_)));
        for statement in &body[2..] {
            if let Statement::Expression(id) = *statement {
                match module.expr(id).kind {
                    ExprKind::Assign(None, lhs, _) => {
                        match module.expr(lhs).kind {
                            ExprKind::Swizzle(_, ref components) => {
                                assert_eq!(components.len(), 1)
                            }
                            _ => panic!("expected swizzle store"),
                        }
                    }
                    _ => panic!("expected assignment"),
                }
            }
        }
    }

    #[test]
    fn sampler_split_planned() {
        let module = lower_shader(
            "uniform sampler2D albedo; void main() {}",
            &TargetCaps::wgsl(),
        );
        assert_eq!(module.sampler_splits.len(), 1);
        assert_eq!(module.sampler_splits[0].texture_name, "albedo_texture");
        assert_eq!(module.sampler_splits[0].sampler_name, "albedo_sampler");
    }

    #[test]
    fn glsl_caps_leave_module_unchanged() {
        let source = "void main() { float a; float b; a = b = 1.0; }";
        let module = lower_shader(source, &TargetCaps::glsl());
        assert_eq!(main_body(&module).len(), 3);
        assert!(module.sampler_splits.is_empty());
    }
}
