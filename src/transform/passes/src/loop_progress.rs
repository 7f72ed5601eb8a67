//! Forward-progress guards for loops that cannot be proven to terminate.
//!
//! A `for` loop with a single integer counter, a constant bound, a constant
//! step in the right direction and a body that never writes the counter is
//! provably making progress and left alone. Every other loop gets a
//! `ForwardProgressGuard` statement at the top of its body; the emitters
//! turn it into a bounded iteration check.

use esslt_lang_hir::{
    BinOp, ExprId, ExprKind, ForInit, LocalId, Module, Statement, UnaryOp,
};

use crate::walk;

pub fn run(module: &mut Module) {
    for index in 0..module.functions.len() {
        let mut body = std::mem::take(&mut module.functions[index].body);
        process(module, &mut body);
        module.functions[index].body = body;
    }
}

fn process(module: &Module, statements: &mut Vec<Statement>) {
    for statement in statements.iter_mut() {
        match *statement {
            Statement::Block(ref mut inner) => process(module, inner),
            Statement::If(_, ref mut then_block, ref mut else_block) => {
                process(module, then_block);
                if let Some(else_block) = else_block {
                    process(module, else_block);
                }
            }
            Statement::Switch(_, ref mut cases) => {
                for case in cases {
                    process(module, &mut case.statements);
                }
            }
            Statement::For(ref init, cond, step, ref mut body) => {
                process(module, body);
                if !provable(module, init, cond, step, body) {
                    insert_guard(body);
                }
            }
            Statement::While(_, ref mut body) => {
                process(module, body);
                insert_guard(body);
            }
            Statement::DoWhile(ref mut body, _) => {
                process(module, body);
                insert_guard(body);
            }
            _ => {}
        }
    }
}

fn insert_guard(body: &mut Vec<Statement>) {
    if body.first() != Some(&Statement::ForwardProgressGuard) {
        body.insert(0, Statement::ForwardProgressGuard);
    }
}

fn provable(
    module: &Module,
    init: &ForInit,
    cond: Option<ExprId>,
    step: Option<ExprId>,
    body: &[Statement],
) -> bool {
    let counter = match *init {
        ForInit::Definition(ref defs) if defs.len() == 1 => {
            let def = &defs[0];
            match def.init {
                Some(value) if module.eval_const_int(value).is_some() => def.id,
                _ => return false,
            }
        }
        _ => return false,
    };

    let ascending = match cond.and_then(|c| condition_direction(module, c, counter)) {
        Some(direction) => direction,
        None => return false,
    };
    match step.and_then(|s| step_direction(module, s, counter)) {
        Some(step_ascending) if step_ascending == ascending => {}
        _ => return false,
    }

    !writes_local(module, body, counter)
}

fn is_counter(module: &Module, id: ExprId, counter: LocalId) -> bool {
    matches!(module.expr(id).kind, ExprKind::Local(local) if local == counter)
}

/// `true` for an upper bound (`i < n`), `false` for a lower bound.
fn condition_direction(module: &Module, cond: ExprId, counter: LocalId) -> Option<bool> {
    match module.expr(cond).kind {
        ExprKind::Binary(op, lhs, rhs) => {
            let (op, bound) = if is_counter(module, lhs, counter) {
                (op, rhs)
            } else if is_counter(module, rhs, counter) {
                let mirrored = match op {
                    BinOp::LessThan => BinOp::GreaterThan,
                    BinOp::LessEqual => BinOp::GreaterEqual,
                    BinOp::GreaterThan => BinOp::LessThan,
                    BinOp::GreaterEqual => BinOp::LessEqual,
                    other => other,
                };
                (mirrored, lhs)
            } else {
                return None;
            };
            module.eval_const_int(bound)?;
            match op {
                BinOp::LessThan | BinOp::LessEqual => Some(true),
                BinOp::GreaterThan | BinOp::GreaterEqual => Some(false),
                _ => None,
            }
        }
        _ => None,
    }
}

/// `true` when the step increases the counter by a positive constant.
fn step_direction(module: &Module, step: ExprId, counter: LocalId) -> Option<bool> {
    match module.expr(step).kind {
        ExprKind::Unary(op, inner) if is_counter(module, inner, counter) => match op {
            UnaryOp::PrefixIncrement | UnaryOp::PostfixIncrement => Some(true),
            UnaryOp::PrefixDecrement | UnaryOp::PostfixDecrement => Some(false),
            _ => None,
        },
        ExprKind::Assign(Some(op), lhs, rhs) if is_counter(module, lhs, counter) => {
            let amount = module.eval_const_int(rhs)?;
            match op {
                BinOp::Add if amount > 0 => Some(true),
                BinOp::Add if amount < 0 => Some(false),
                BinOp::Subtract if amount > 0 => Some(false),
                BinOp::Subtract if amount < 0 => Some(true),
                _ => None,
            }
        }
        ExprKind::Assign(None, lhs, rhs) if is_counter(module, lhs, counter) => {
            match module.expr(rhs).kind {
                ExprKind::Binary(op, a, b) if is_counter(module, a, counter) => {
                    let amount = module.eval_const_int(b)?;
                    match op {
                        BinOp::Add if amount > 0 => Some(true),
                        BinOp::Add if amount < 0 => Some(false),
                        BinOp::Subtract if amount > 0 => Some(false),
                        BinOp::Subtract if amount < 0 => Some(true),
                        _ => None,
                    }
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Whether any statement in `body` can modify `counter`.
fn writes_local(module: &Module, body: &[Statement], counter: LocalId) -> bool {
    let mut written = false;
    walk::visit_statements(body, &mut |statement| {
        let mut stack = walk::statement_exprs(statement);
        while let Some(id) = stack.pop() {
            let kind = &module.expr(id).kind;
            let writes = match *kind {
                ExprKind::Assign(_, lhs, _) => assign_base(module, lhs) == Some(counter),
                ExprKind::Unary(op, inner) if op.is_increment_or_decrement() => {
                    assign_base(module, inner) == Some(counter)
                }
                _ => false,
            };
            if writes {
                written = true;
            }
            stack.extend(walk::expr_children(kind));
        }
    });
    written
}

/// The local at the root of an lvalue chain, if any.
fn assign_base(module: &Module, id: ExprId) -> Option<LocalId> {
    match module.expr(id).kind {
        ExprKind::Local(local) => Some(local),
        ExprKind::Swizzle(base, _) | ExprKind::Member(base, _) | ExprKind::Index(base, _) => {
            assign_base(module, base)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::{Diagnostics, ShaderStage, ShaderVersion};

    fn guard_shader(source: &str) -> Module {
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
        run(&mut module);
        module
    }

    fn count_guards(module: &Module) -> usize {
        let main = module.main_function().unwrap();
        let mut count = 0;
        walk::visit_statements(&module.function(main).body, &mut |statement| {
            if *statement == Statement::ForwardProgressGuard {
                count += 1;
            }
        });
        count
    }

    #[test]
    fn counted_loop_needs_no_guard() {
        let module = guard_shader(
            "void main() { float s = 0.0;\
             for (int i = 0; i < 8; i++) { s += 1.0; }\
             gl_Position = vec4(s); }",
        );
        assert_eq!(count_guards(&module), 0);
    }

    #[test]
    fn descending_loop_needs_no_guard() {
        let module = guard_shader(
            "void main() { float s = 0.0;\
             for (int i = 8; i > 0; i -= 2) { s += 1.0; }\
             gl_Position = vec4(s); }",
        );
        assert_eq!(count_guards(&module), 0);
    }

    #[test]
    fn while_loop_gets_guard() {
        let module = guard_shader(
            "uniform bool cond;\
             void main() { while (cond) { } gl_Position = vec4(0.0); }",
        );
        assert_eq!(count_guards(&module), 1);
    }

    #[test]
    fn counter_written_in_body_gets_guard() {
        let module = guard_shader(
            "void main() { for (int i = 0; i < 8; i++) { i = 0; }\
             gl_Position = vec4(0.0); }",
        );
        assert_eq!(count_guards(&module), 1);
    }

    #[test]
    fn non_constant_bound_gets_guard() {
        let module = guard_shader(
            "uniform float limit;\
             void main() { for (int i = 0; float(i) < limit; i++) { }\
             gl_Position = vec4(0.0); }",
        );
        assert_eq!(count_guards(&module), 1);
    }

    #[test]
    fn wrong_direction_step_gets_guard() {
        let module = guard_shader(
            "void main() { for (int i = 0; i < 8; i--) { }\
             gl_Position = vec4(0.0); }",
        );
        assert_eq!(count_guards(&module), 1);
    }

    #[test]
    fn guard_insertion_is_idempotent() {
        let mut module = guard_shader(
            "uniform bool cond; void main() { while (cond) { } }",
        );
        let before = module.clone();
        run(&mut module);
        assert_eq!(module, before);
    }
}
