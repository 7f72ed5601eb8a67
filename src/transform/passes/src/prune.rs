//! Removal of unused locals, globals and functions.
//!
//! Locals go first: a declaration nothing reads is dropped, except that an
//! initializer with side effects stays behind as a plain expression
//! statement. Reachability then starts at `main`: functions called from
//! live code and globals referenced by live code or by live initializers
//! stay. Pruning drops the dead entries from `root_order` and clears their
//! `static_use` flag; the backing tables keep their slots so ids stay
//! valid. Running the pass twice changes nothing.

use std::collections::HashSet;

use esslt_lang_hir::{
    BlockId, ExprId, ExprKind, FunctionId, GlobalId, LocalId, Module, RootDefinition, Statement,
    StructId, TypeLayout,
};

use crate::walk;

pub fn run(module: &mut Module) {
    for index in 0..module.functions.len() {
        let mut body = std::mem::take(&mut module.functions[index].body);
        prune_locals(module, &mut body);
        module.functions[index].body = body;
    }

    let mut marker = Marker {
        module: &*module,
        functions: HashSet::new(),
        globals: HashSet::new(),
        blocks: HashSet::new(),
        pending: Vec::new(),
    };
    if let Some(main) = module.main_function() {
        marker.mark_function(main);
    }
    marker.drain();
    let live_functions = marker.functions;
    let live_globals = marker.globals;
    let live_blocks = marker.blocks;

    let live_structs = live_struct_set(module, &live_functions, &live_globals, &live_blocks);

    module.root_order.retain(|def| match *def {
        RootDefinition::Function(id) => live_functions.contains(&id),
        RootDefinition::Global(id) => live_globals.contains(&id),
        RootDefinition::Block(id) => live_blocks.contains(&id),
        RootDefinition::Struct(id) => live_structs.contains(&id),
    });
    for (index, global) in module.globals.iter_mut().enumerate() {
        if !live_globals.contains(&GlobalId(index as u32)) {
            global.static_use = false;
        }
    }
}

/// Drops unreferenced `Var` statements until none are left. A drop can
/// orphan a local the dead initializer was the only reader of, hence the
/// repeat.
fn prune_locals(module: &Module, body: &mut Vec<Statement>) {
    loop {
        let mut used = HashSet::new();
        walk::visit_statements(body, &mut |statement| {
            for id in walk::statement_exprs(statement) {
                collect_local_uses(module, id, &mut used);
            }
        });
        if !remove_dead_defs(module, body, &used) {
            return;
        }
    }
}

fn collect_local_uses(module: &Module, id: ExprId, used: &mut HashSet<LocalId>) {
    let kind = &module.expr(id).kind;
    if let ExprKind::Local(local) = *kind {
        used.insert(local);
    }
    for child in walk::expr_children(kind) {
        collect_local_uses(module, child, used);
    }
}

fn init_has_side_effects(module: &Module, id: ExprId) -> bool {
    let kind = &module.expr(id).kind;
    match *kind {
        ExprKind::Assign(_, _, _) => true,
        // User functions may write outputs or out parameters
        ExprKind::Call(_, _) => true,
        ExprKind::Unary(op, _) if op.is_increment_or_decrement() => true,
        ExprKind::Intrinsic(intrinsic, _) if intrinsic.has_side_effects() => true,
        _ => walk::expr_children(kind)
            .into_iter()
            .any(|child| init_has_side_effects(module, child)),
    }
}

fn remove_dead_defs(
    module: &Module,
    statements: &mut Vec<Statement>,
    used: &HashSet<LocalId>,
) -> bool {
    let mut changed = false;
    let mut index = 0;
    while index < statements.len() {
        if let Statement::Var(ref def) = statements[index] {
            if !used.contains(&def.id) {
                changed = true;
                match def.init {
                    Some(init) if init_has_side_effects(module, init) => {
                        statements[index] = Statement::Expression(init);
                        index += 1;
                    }
                    _ => {
                        statements.remove(index);
                    }
                }
                continue;
            }
        }
        match statements[index] {
            Statement::Block(ref mut inner)
            | Statement::While(_, ref mut inner)
            | Statement::DoWhile(ref mut inner, _)
            | Statement::For(_, _, _, ref mut inner) => {
                changed |= remove_dead_defs(module, inner, used);
            }
            Statement::If(_, ref mut then_block, ref mut else_block) => {
                changed |= remove_dead_defs(module, then_block, used);
                if let Some(else_block) = else_block {
                    changed |= remove_dead_defs(module, else_block, used);
                }
            }
            Statement::Switch(_, ref mut cases) => {
                for case in cases {
                    changed |= remove_dead_defs(module, &mut case.statements, used);
                }
            }
            _ => {}
        }
        index += 1;
    }
    changed
}

struct Marker<'a> {
    module: &'a Module,
    functions: HashSet<FunctionId>,
    globals: HashSet<GlobalId>,
    blocks: HashSet<BlockId>,
    pending: Vec<ExprId>,
}

impl<'a> Marker<'a> {
    fn mark_function(&mut self, id: FunctionId) {
        if !self.functions.insert(id) {
            return;
        }
        let module = self.module;
        let mut found = Vec::new();
        walk::visit_statements(&module.function(id).body, &mut |statement| {
            found.extend(walk::statement_exprs(statement));
        });
        self.pending.extend(found);
    }

    fn drain(&mut self) {
        let module = self.module;
        while let Some(id) = self.pending.pop() {
            let kind = &module.expr(id).kind;
            match *kind {
                ExprKind::Global(global) => {
                    if self.globals.insert(global) {
                        if let Some(init) = module.global(global).init {
                            self.pending.push(init);
                        }
                    }
                }
                ExprKind::BlockMember(block, _) => {
                    self.blocks.insert(block);
                }
                ExprKind::Call(function, _) => {
                    self.pending.extend(walk::expr_children(kind));
                    self.mark_function(function);
                    continue;
                }
                _ => {}
            }
            self.pending.extend(walk::expr_children(kind));
        }
    }
}

fn mark_layout(module: &Module, layout: &TypeLayout, out: &mut HashSet<StructId>) {
    match *layout {
        TypeLayout::Struct(id) => {
            if out.insert(id) {
                for member in &module.struct_def(id).members {
                    mark_layout(module, &member.ty.layout, out);
                }
            }
        }
        TypeLayout::Array(ref inner, _) => mark_layout(module, inner, out),
        _ => {}
    }
}

fn live_struct_set(
    module: &Module,
    functions: &HashSet<FunctionId>,
    globals: &HashSet<GlobalId>,
    blocks: &HashSet<BlockId>,
) -> HashSet<StructId> {
    let mut live = HashSet::new();
    for &id in functions {
        let function = module.function(id);
        mark_layout(module, &function.return_type.layout, &mut live);
        for local in &function.locals {
            mark_layout(module, &local.ty.layout, &mut live);
        }
    }
    for &id in globals {
        mark_layout(module, &module.global(id).ty.layout, &mut live);
    }
    for &id in blocks {
        for field in &module.block(id).fields {
            mark_layout(module, &field.ty.layout, &mut live);
        }
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::{Diagnostics, ShaderStage, ShaderVersion};

    fn prune_shader(source: &str) -> Module {
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

    fn emitted_functions(module: &Module) -> Vec<&str> {
        module
            .root_order
            .iter()
            .filter_map(|def| match *def {
                RootDefinition::Function(id) => Some(module.function(id).name.as_str()),
                _ => None,
            })
            .collect()
    }

    fn emitted_globals(module: &Module) -> Vec<&str> {
        module
            .root_order
            .iter()
            .filter_map(|def| match *def {
                RootDefinition::Global(id) => Some(module.global(id).name.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn unused_function_removed() {
        let module = prune_shader(
            "float helper(float x) { return x; }\
             float unused(float x) { return x + 1.0; }\
             void main() { gl_Position = vec4(helper(1.0)); }",
        );
        assert_eq!(emitted_functions(&module), vec!["helper", "main"]);
    }

    #[test]
    fn unused_global_removed() {
        let module = prune_shader(
            "uniform float used; uniform float dead;\
             void main() { gl_Position = vec4(used); }",
        );
        assert_eq!(emitted_globals(&module), vec!["used"]);
    }

    #[test]
    fn initializer_references_keep_globals_alive() {
        let module = prune_shader(
            "const float base = 2.0; float derived = base * 3.0;\
             void main() { gl_Position = vec4(derived); }",
        );
        assert_eq!(emitted_globals(&module), vec!["base", "derived"]);
    }

    #[test]
    fn transitive_calls_survive() {
        let module = prune_shader(
            "float inner(float x) { return x; }\
             float outer(float x) { return inner(x); }\
             void main() { gl_Position = vec4(outer(1.0)); }",
        );
        assert_eq!(emitted_functions(&module), vec!["inner", "outer", "main"]);
    }

    #[test]
    fn unused_local_removed() {
        let module = prune_shader("void main() { float dead = 1.0; gl_Position = vec4(0.0); }");
        let main = module.main_function().unwrap();
        assert!(module
            .function(main)
            .body
            .iter()
            .all(|s| !matches!(s, Statement::Var(_))));
    }

    #[test]
    fn chained_dead_locals_removed() {
        let module = prune_shader(
            "void main() { float a = 1.0; float b = a * 2.0;\
             gl_Position = vec4(0.0); }",
        );
        let main = module.main_function().unwrap();
        assert!(module
            .function(main)
            .body
            .iter()
            .all(|s| !matches!(s, Statement::Var(_))));
    }

    #[test]
    fn side_effecting_initializer_demoted() {
        let module = prune_shader(
            "float next() { return 1.0; }\
             void main() { float dead = next(); gl_Position = vec4(0.0); }",
        );
        assert_eq!(emitted_functions(&module), vec!["next", "main"]);
        let main = module.main_function().unwrap();
        let body = &module.function(main).body;
        assert!(body.iter().all(|s| !matches!(s, Statement::Var(_))));
        assert!(matches!(body[0], Statement::Expression(_)));
    }

    #[test]
    fn dead_local_does_not_keep_globals() {
        let module = prune_shader(
            "uniform float scale;\
             void main() { float dead = scale; gl_Position = vec4(0.0); }",
        );
        assert!(emitted_globals(&module).is_empty());
    }

    #[test]
    fn prune_is_idempotent() {
        let mut module = prune_shader(
            "uniform float used; uniform float dead;\
             void main() { gl_Position = vec4(used); }",
        );
        let before = module.clone();
        run(&mut module);
        assert_eq!(module, before);
    }

    #[test]
    fn unused_struct_removed() {
        let module = prune_shader(
            "struct Used { float a; }; struct Dead { float b; };\
             void main() { Used u = Used(1.0); gl_Position = vec4(u.a); }",
        );
        let structs: Vec<&str> = module
            .root_order
            .iter()
            .filter_map(|def| match *def {
                RootDefinition::Struct(id) => Some(module.struct_def(id).name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(structs, vec!["Used"]);
    }
}
