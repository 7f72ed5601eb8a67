//! Small traversal helpers shared by the passes.

use esslt_lang_hir::{ExprId, ExprKind, ForInit, Statement};

/// Direct child expressions of a node.
pub fn expr_children(kind: &ExprKind) -> Vec<ExprId> {
    match *kind {
        ExprKind::Literal(_)
        | ExprKind::Local(_)
        | ExprKind::Global(_)
        | ExprKind::BlockMember(_, _)
        | ExprKind::Builtin(_)
        | ExprKind::Error => Vec::new(),
        ExprKind::Unary(_, a) | ExprKind::Swizzle(a, _) | ExprKind::Member(a, _) => vec![a],
        ExprKind::Binary(_, a, b)
        | ExprKind::Assign(_, a, b)
        | ExprKind::Index(a, b)
        | ExprKind::Comma(a, b) => vec![a, b],
        ExprKind::Ternary(a, b, c) => vec![a, b, c],
        ExprKind::Call(_, ref args)
        | ExprKind::Intrinsic(_, ref args)
        | ExprKind::Constructor(_, ref args) => args.clone(),
    }
}

/// The expressions a statement refers to directly (not recursing into
/// nested statements).
pub fn statement_exprs(statement: &Statement) -> Vec<ExprId> {
    match *statement {
        Statement::Expression(id) | Statement::While(id, _) | Statement::DoWhile(_, id) => {
            vec![id]
        }
        Statement::Var(ref def) => def.init.into_iter().collect(),
        Statement::If(cond, _, _) | Statement::Switch(cond, _) => vec![cond],
        Statement::For(ref init, cond, step, _) => {
            let mut ids = Vec::new();
            match *init {
                ForInit::Empty => {}
                ForInit::Expression(id) => ids.push(id),
                ForInit::Definition(ref defs) => {
                    ids.extend(defs.iter().filter_map(|d| d.init));
                }
            }
            ids.extend(cond);
            ids.extend(step);
            ids
        }
        Statement::Return(id) => id.into_iter().collect(),
        Statement::Block(_)
        | Statement::Break
        | Statement::Continue
        | Statement::Discard
        | Statement::ForwardProgressGuard => Vec::new(),
    }
}

/// Calls `f` on every statement in the tree, including nested ones and
/// switch case bodies.
pub fn visit_statements<'m, F: FnMut(&'m Statement)>(statements: &'m [Statement], f: &mut F) {
    for statement in statements {
        f(statement);
        match *statement {
            Statement::Block(ref inner)
            | Statement::While(_, ref inner)
            | Statement::DoWhile(ref inner, _)
            | Statement::For(_, _, _, ref inner) => visit_statements(inner, f),
            Statement::If(_, ref then_block, ref else_block) => {
                visit_statements(then_block, f);
                if let Some(else_block) = else_block {
                    visit_statements(else_block, f);
                }
            }
            Statement::Switch(_, ref cases) => {
                for case in cases {
                    visit_statements(&case.statements, f);
                }
            }
            _ => {}
        }
    }
}
