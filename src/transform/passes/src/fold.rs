//! Constant folding.
//!
//! Nodes are rewritten in place. Allocation order guarantees children come
//! before parents in the arena, so one forward sweep folds transitively.
//! Integer arithmetic wraps; division by a constant zero and out-of-range
//! constant shifts are reported and left unfolded.

use esslt_lang_hir::{BinOp, ExprKind, Literal, Module, UnaryOp};
use esslt_shared::{DiagnosticId, Diagnostics};

pub fn run(module: &mut Module, diagnostics: &mut Diagnostics) {
    let ids: Vec<_> = module.exprs.handles().collect();
    for id in ids {
        if let Some(kind) = folded(module, id, diagnostics) {
            module.exprs[id].kind = kind;
        }
    }
}

fn literal_of(module: &Module, id: esslt_lang_hir::ExprId) -> Option<Literal> {
    match module.expr(id).kind {
        ExprKind::Literal(lit) => Some(lit),
        _ => None,
    }
}

fn folded(
    module: &Module,
    id: esslt_lang_hir::ExprId,
    diagnostics: &mut Diagnostics,
) -> Option<ExprKind> {
    let loc = module.expr(id).loc;
    match module.expr(id).kind {
        ExprKind::Unary(op, inner) => {
            let lit = literal_of(module, inner)?;
            fold_unary(op, lit).map(ExprKind::Literal)
        }
        ExprKind::Binary(op, lhs, rhs) => {
            let a = literal_of(module, lhs)?;
            let b = literal_of(module, rhs)?;
            if division_by_zero(op, b) {
                diagnostics.report(
                    DiagnosticId::DivisionByZero,
                    loc,
                    "division by a constant zero",
                );
                return None;
            }
            if let Some(shift) = undefined_shift(op, a, b) {
                diagnostics.report(
                    DiagnosticId::UndefinedShift,
                    loc,
                    format!("'{}' : shift amount is undefined", shift),
                );
                return None;
            }
            fold_binary(op, a, b).map(ExprKind::Literal)
        }
        ExprKind::Ternary(cond, a, b) => match literal_of(module, cond)? {
            Literal::Bool(true) => Some(module.expr(a).kind.clone()),
            Literal::Bool(false) => Some(module.expr(b).kind.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn division_by_zero(op: BinOp, divisor: Literal) -> bool {
    if !matches!(op, BinOp::Divide | BinOp::Modulus) {
        return false;
    }
    matches!(divisor, Literal::Int(0) | Literal::UInt(0))
}

/// A constant shift amount outside 0..32 for the left operand's width.
fn undefined_shift(op: BinOp, _value: Literal, amount: Literal) -> Option<i64> {
    if !matches!(op, BinOp::LeftShift | BinOp::RightShift) {
        return None;
    }
    let amount = match amount {
        Literal::Int(v) => v as i64,
        Literal::UInt(v) => v as i64,
        _ => return None,
    };
    if !(0..32).contains(&amount) {
        Some(amount)
    } else {
        None
    }
}

fn fold_unary(op: UnaryOp, lit: Literal) -> Option<Literal> {
    let result = match (op, lit) {
        (UnaryOp::Plus, lit) => lit,
        (UnaryOp::Minus, Literal::Int(v)) => Literal::Int(v.wrapping_neg()),
        (UnaryOp::Minus, Literal::UInt(v)) => Literal::UInt(v.wrapping_neg()),
        (UnaryOp::Minus, Literal::Float(v)) => Literal::Float(-v),
        (UnaryOp::LogicalNot, Literal::Bool(v)) => Literal::Bool(!v),
        (UnaryOp::BitwiseNot, Literal::Int(v)) => Literal::Int(!v),
        (UnaryOp::BitwiseNot, Literal::UInt(v)) => Literal::UInt(!v),
        _ => return None,
    };
    Some(result)
}

fn fold_binary(op: BinOp, a: Literal, b: Literal) -> Option<Literal> {
    use Literal::*;
    let result = match (op, a, b) {
        (BinOp::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (BinOp::Subtract, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (BinOp::Multiply, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (BinOp::Divide, Int(a), Int(b)) => Int(a.wrapping_div(b)),
        (BinOp::Modulus, Int(a), Int(b)) => Int(a.wrapping_rem(b)),
        (BinOp::LeftShift, Int(a), Int(b)) => Int(a.wrapping_shl(b as u32)),
        (BinOp::RightShift, Int(a), Int(b)) => Int(a.wrapping_shr(b as u32)),
        (BinOp::BitwiseAnd, Int(a), Int(b)) => Int(a & b),
        (BinOp::BitwiseOr, Int(a), Int(b)) => Int(a | b),
        (BinOp::BitwiseXor, Int(a), Int(b)) => Int(a ^ b),

        (BinOp::Add, UInt(a), UInt(b)) => UInt(a.wrapping_add(b)),
        (BinOp::Subtract, UInt(a), UInt(b)) => UInt(a.wrapping_sub(b)),
        (BinOp::Multiply, UInt(a), UInt(b)) => UInt(a.wrapping_mul(b)),
        (BinOp::Divide, UInt(a), UInt(b)) => UInt(a.wrapping_div(b)),
        (BinOp::Modulus, UInt(a), UInt(b)) => UInt(a.wrapping_rem(b)),
        (BinOp::LeftShift, UInt(a), UInt(b)) => UInt(a.wrapping_shl(b)),
        (BinOp::RightShift, UInt(a), UInt(b)) => UInt(a.wrapping_shr(b)),
        (BinOp::BitwiseAnd, UInt(a), UInt(b)) => UInt(a & b),
        (BinOp::BitwiseOr, UInt(a), UInt(b)) => UInt(a | b),
        (BinOp::BitwiseXor, UInt(a), UInt(b)) => UInt(a ^ b),

        (BinOp::Add, Float(a), Float(b)) => Float(a + b),
        (BinOp::Subtract, Float(a), Float(b)) => Float(a - b),
        (BinOp::Multiply, Float(a), Float(b)) => Float(a * b),
        (BinOp::Divide, Float(a), Float(b)) if b != 0.0 => Float(a / b),

        (BinOp::LessThan, Int(a), Int(b)) => Bool(a < b),
        (BinOp::LessEqual, Int(a), Int(b)) => Bool(a <= b),
        (BinOp::GreaterThan, Int(a), Int(b)) => Bool(a > b),
        (BinOp::GreaterEqual, Int(a), Int(b)) => Bool(a >= b),
        (BinOp::Equality, Int(a), Int(b)) => Bool(a == b),
        (BinOp::Inequality, Int(a), Int(b)) => Bool(a != b),

        (BinOp::LessThan, UInt(a), UInt(b)) => Bool(a < b),
        (BinOp::LessEqual, UInt(a), UInt(b)) => Bool(a <= b),
        (BinOp::GreaterThan, UInt(a), UInt(b)) => Bool(a > b),
        (BinOp::GreaterEqual, UInt(a), UInt(b)) => Bool(a >= b),
        (BinOp::Equality, UInt(a), UInt(b)) => Bool(a == b),
        (BinOp::Inequality, UInt(a), UInt(b)) => Bool(a != b),

        (BinOp::LessThan, Float(a), Float(b)) => Bool(a < b),
        (BinOp::LessEqual, Float(a), Float(b)) => Bool(a <= b),
        (BinOp::GreaterThan, Float(a), Float(b)) => Bool(a > b),
        (BinOp::GreaterEqual, Float(a), Float(b)) => Bool(a >= b),
        (BinOp::Equality, Float(a), Float(b)) => Bool(a == b),
        (BinOp::Inequality, Float(a), Float(b)) => Bool(a != b),

        (BinOp::LogicalAnd, Bool(a), Bool(b)) => Bool(a && b),
        (BinOp::LogicalOr, Bool(a), Bool(b)) => Bool(a || b),
        (BinOp::LogicalXor, Bool(a), Bool(b)) => Bool(a != b),
        (BinOp::Equality, Bool(a), Bool(b)) => Bool(a == b),
        (BinOp::Inequality, Bool(a), Bool(b)) => Bool(a != b),

        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_lang_hir::Statement;
    use esslt_shared::{ShaderStage, ShaderVersion};

    fn fold_shader(source: &str, version: ShaderVersion) -> (Module, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
        let text =
            esslt_transform_preprocess::preprocess(&[source], &mut handler, &mut diagnostics);
        let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
        let mut module =
            esslt_transform_ast_to_hir::type_check(&unit, version, ShaderStage::Vertex, &mut diagnostics);
        run(&mut module, &mut diagnostics);
        (module, diagnostics)
    }

    fn first_local_init(module: &Module) -> ExprKind {
        let main = module.main_function().unwrap();
        for statement in &module.function(main).body {
            if let Statement::Var(ref def) = *statement {
                let init = def.init.unwrap();
                return module.expr(init).kind.clone();
            }
        }
        panic!("no local definition in main");
    }

    #[test]
    fn folds_float_arithmetic() {
        let (module, diags) =
            fold_shader("void main() { float x = 2.0 * 3.0 + 1.0; }", ShaderVersion::Essl100);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
        assert_eq!(first_local_init(&module), ExprKind::Literal(Literal::Float(7.0)));
    }

    #[test]
    fn folds_wrapping_int_multiply() {
        let (module, diags) = fold_shader(
            "#version 300 es\nvoid main() { int x = 0x40000000 * 4; }",
            ShaderVersion::Essl300,
        );
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
        assert_eq!(first_local_init(&module), ExprKind::Literal(Literal::Int(0)));
    }

    #[test]
    fn folds_transitively() {
        let (module, diags) = fold_shader(
            "void main() { float x = (1.0 + 2.0) * (3.0 - 1.0); }",
            ShaderVersion::Essl100,
        );
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
        assert_eq!(first_local_init(&module), ExprKind::Literal(Literal::Float(6.0)));
    }

    #[test]
    fn constant_division_by_zero_reported() {
        let (_, diags) = fold_shader("void main() { int x = 1 / 0; }", ShaderVersion::Essl100);
        assert!(diags.contains(DiagnosticId::DivisionByZero));
    }

    #[test]
    fn out_of_range_shift_warns() {
        let (_, diags) = fold_shader(
            "#version 300 es\nvoid main() { int x = 1 << 33; }",
            ShaderVersion::Essl300,
        );
        assert!(diags.contains(DiagnosticId::UndefinedShift));
        assert!(!diags.has_errors());
    }

    #[test]
    fn folds_constant_ternary() {
        let (module, diags) = fold_shader(
            "void main() { float x = true ? 1.0 : 2.0; }",
            ShaderVersion::Essl100,
        );
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
        assert_eq!(first_local_init(&module), ExprKind::Literal(Literal::Float(1.0)));
    }

    #[test]
    fn runtime_values_left_alone() {
        let (module, diags) = fold_shader(
            "uniform float u; void main() { float x = u * 2.0; }",
            ShaderVersion::Essl100,
        );
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
        assert!(matches!(first_local_init(&module), ExprKind::Binary(_, _, _)));
    }
}
