//! Typing and name resolution: untyped tree in, typed IR out.
//!
//! Every failure is reported and replaced with an error node, so one pass
//! over a broken shader still surfaces most of its problems. Error types
//! absorb further checks silently to avoid cascading noise.

use std::collections::{HashMap, HashSet};

use esslt_lang_ast as ast;
use esslt_lang_hir::{
    higher_precision, BinOp, BlockField, BlockId, BlockLayoutKind, BuiltinVar, CaseLabel, ExprId,
    ExprKind, ForInit, FunctionDefinition, FunctionId, GlobalId, GlobalStorage, GlobalVariable,
    InterfaceBlock, Interpolation, Literal, Local, LocalId, Module, Param, ParamDirection,
    Precision, RootDefinition, SamplerType, ScalarType, Statement, StructDefinition, StructId,
    StructMember, SwitchCase, SwizzleComponent, Type, TypeLayout, UnaryOp, VarDef,
};
use esslt_shared::{DiagnosticId, Diagnostics, Located, ShaderStage, ShaderVersion, SourceLocation};

use crate::intrinsics as overloads;

pub fn type_check(
    unit: &ast::TranslationUnit,
    version: ShaderVersion,
    stage: ShaderStage,
    diagnostics: &mut Diagnostics,
) -> Module {
    let mut typer = Typer {
        module: Module::new(version, stage),
        scopes: vec![Scope::default()],
        functions: HashMap::new(),
        locals: Vec::new(),
        const_locals: HashSet::new(),
        current_return: None,
        loop_depth: 0,
        switch_depth: 0,
        diagnostics,
    };
    typer.seed_default_precisions();
    typer.seed_builtins();
    for def in &unit.defs {
        typer.root_definition(def);
    }
    typer.module
}

#[derive(Clone)]
enum VarEntry {
    Local(LocalId),
    Global(GlobalId),
    Builtin(BuiltinVar),
    BlockMember(BlockId, usize),
    BlockInstance(BlockId),
}

#[derive(Default)]
struct Scope {
    variables: HashMap<String, VarEntry>,
    structs: HashMap<String, StructId>,
    /// Default precisions set in this scope; they expire with it
    precisions: HashMap<PrecKey, Precision>,
}

#[derive(PartialEq, Eq, Hash, Clone, Copy)]
enum PrecKey {
    Float,
    Int,
    Sampler(SamplerType),
}

fn precision_key(layout: &TypeLayout) -> Option<PrecKey> {
    match *layout {
        TypeLayout::Scalar(ScalarType::Float)
        | TypeLayout::Vector(ScalarType::Float, _)
        | TypeLayout::Matrix(_, _) => Some(PrecKey::Float),
        TypeLayout::Scalar(ScalarType::Int)
        | TypeLayout::Scalar(ScalarType::UInt)
        | TypeLayout::Vector(ScalarType::Int, _)
        | TypeLayout::Vector(ScalarType::UInt, _) => Some(PrecKey::Int),
        TypeLayout::Sampler(s) => Some(PrecKey::Sampler(s)),
        TypeLayout::Array(ref inner, _) => precision_key(inner),
        _ => None,
    }
}

fn scalar_of(layout: &TypeLayout) -> Option<ScalarType> {
    layout.to_scalar()
}

fn convert_scalar(s: ast::Scalar) -> ScalarType {
    match s {
        ast::Scalar::Bool => ScalarType::Bool,
        ast::Scalar::Int => ScalarType::Int,
        ast::Scalar::UInt => ScalarType::UInt,
        ast::Scalar::Float => ScalarType::Float,
    }
}

fn convert_precision(p: ast::Precision) -> Precision {
    match p {
        ast::Precision::Lowp => Precision::Lowp,
        ast::Precision::Mediump => Precision::Mediump,
        ast::Precision::Highp => Precision::Highp,
    }
}

fn convert_sampler(s: ast::SamplerKind) -> SamplerType {
    match s {
        ast::SamplerKind::Sampler2D => SamplerType::Sampler2D,
        ast::SamplerKind::Sampler3D => SamplerType::Sampler3D,
        ast::SamplerKind::SamplerCube => SamplerType::SamplerCube,
        ast::SamplerKind::Sampler2DShadow => SamplerType::Sampler2DShadow,
        ast::SamplerKind::Sampler2DArray => SamplerType::Sampler2DArray,
        ast::SamplerKind::SamplerCubeShadow => SamplerType::SamplerCubeShadow,
    }
}

fn convert_binop(op: ast::BinOp) -> BinOp {
    match op {
        ast::BinOp::Add => BinOp::Add,
        ast::BinOp::Subtract => BinOp::Subtract,
        ast::BinOp::Multiply => BinOp::Multiply,
        ast::BinOp::Divide => BinOp::Divide,
        ast::BinOp::Modulus => BinOp::Modulus,
        ast::BinOp::LeftShift => BinOp::LeftShift,
        ast::BinOp::RightShift => BinOp::RightShift,
        ast::BinOp::LessThan => BinOp::LessThan,
        ast::BinOp::LessEqual => BinOp::LessEqual,
        ast::BinOp::GreaterThan => BinOp::GreaterThan,
        ast::BinOp::GreaterEqual => BinOp::GreaterEqual,
        ast::BinOp::Equality => BinOp::Equality,
        ast::BinOp::Inequality => BinOp::Inequality,
        ast::BinOp::BitwiseAnd => BinOp::BitwiseAnd,
        ast::BinOp::BitwiseOr => BinOp::BitwiseOr,
        ast::BinOp::BitwiseXor => BinOp::BitwiseXor,
        ast::BinOp::LogicalAnd => BinOp::LogicalAnd,
        ast::BinOp::LogicalOr => BinOp::LogicalOr,
        ast::BinOp::LogicalXor => BinOp::LogicalXor,
    }
}

fn convert_unop(op: ast::UnaryOp) -> UnaryOp {
    match op {
        ast::UnaryOp::Plus => UnaryOp::Plus,
        ast::UnaryOp::Minus => UnaryOp::Minus,
        ast::UnaryOp::LogicalNot => UnaryOp::LogicalNot,
        ast::UnaryOp::BitwiseNot => UnaryOp::BitwiseNot,
        ast::UnaryOp::PrefixIncrement => UnaryOp::PrefixIncrement,
        ast::UnaryOp::PrefixDecrement => UnaryOp::PrefixDecrement,
        ast::UnaryOp::PostfixIncrement => UnaryOp::PostfixIncrement,
        ast::UnaryOp::PostfixDecrement => UnaryOp::PostfixDecrement,
    }
}

fn assign_binop(op: ast::AssignOp) -> Option<BinOp> {
    match op {
        ast::AssignOp::Assign => None,
        ast::AssignOp::SumAssign => Some(BinOp::Add),
        ast::AssignOp::DifferenceAssign => Some(BinOp::Subtract),
        ast::AssignOp::ProductAssign => Some(BinOp::Multiply),
        ast::AssignOp::QuotientAssign => Some(BinOp::Divide),
        ast::AssignOp::RemainderAssign => Some(BinOp::Modulus),
        ast::AssignOp::LeftShiftAssign => Some(BinOp::LeftShift),
        ast::AssignOp::RightShiftAssign => Some(BinOp::RightShift),
        ast::AssignOp::AndAssign => Some(BinOp::BitwiseAnd),
        ast::AssignOp::OrAssign => Some(BinOp::BitwiseOr),
        ast::AssignOp::XorAssign => Some(BinOp::BitwiseXor),
    }
}

/// Type names usable as constructors.
fn constructor_target(name: &str) -> Option<TypeLayout> {
    let layout = match name {
        "float" => TypeLayout::Scalar(ScalarType::Float),
        "int" => TypeLayout::Scalar(ScalarType::Int),
        "uint" => TypeLayout::Scalar(ScalarType::UInt),
        "bool" => TypeLayout::Scalar(ScalarType::Bool),
        "vec2" => TypeLayout::Vector(ScalarType::Float, 2),
        "vec3" => TypeLayout::Vector(ScalarType::Float, 3),
        "vec4" => TypeLayout::Vector(ScalarType::Float, 4),
        "ivec2" => TypeLayout::Vector(ScalarType::Int, 2),
        "ivec3" => TypeLayout::Vector(ScalarType::Int, 3),
        "ivec4" => TypeLayout::Vector(ScalarType::Int, 4),
        "uvec2" => TypeLayout::Vector(ScalarType::UInt, 2),
        "uvec3" => TypeLayout::Vector(ScalarType::UInt, 3),
        "uvec4" => TypeLayout::Vector(ScalarType::UInt, 4),
        "bvec2" => TypeLayout::Vector(ScalarType::Bool, 2),
        "bvec3" => TypeLayout::Vector(ScalarType::Bool, 3),
        "bvec4" => TypeLayout::Vector(ScalarType::Bool, 4),
        "mat2" => TypeLayout::Matrix(2, 2),
        "mat3" => TypeLayout::Matrix(3, 3),
        "mat4" => TypeLayout::Matrix(4, 4),
        "mat2x2" => TypeLayout::Matrix(2, 2),
        "mat2x3" => TypeLayout::Matrix(2, 3),
        "mat2x4" => TypeLayout::Matrix(2, 4),
        "mat3x2" => TypeLayout::Matrix(3, 2),
        "mat3x3" => TypeLayout::Matrix(3, 3),
        "mat3x4" => TypeLayout::Matrix(3, 4),
        "mat4x2" => TypeLayout::Matrix(4, 2),
        "mat4x3" => TypeLayout::Matrix(4, 3),
        "mat4x4" => TypeLayout::Matrix(4, 4),
        _ => return None,
    };
    Some(layout)
}

struct Typer<'a> {
    module: Module,
    scopes: Vec<Scope>,
    functions: HashMap<String, Vec<FunctionId>>,
    locals: Vec<Local>,
    const_locals: HashSet<u32>,
    current_return: Option<Type>,
    loop_depth: u32,
    switch_depth: u32,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Typer<'a> {
    fn version(&self) -> ShaderVersion {
        self.module.version
    }

    fn stage(&self) -> ShaderStage {
        self.module.stage
    }

    fn report(&mut self, id: DiagnosticId, loc: SourceLocation, text: impl Into<String>) {
        self.diagnostics.report(id, loc, text);
    }

    fn seed_default_precisions(&mut self) {
        let stage = self.stage();
        let essl1 = self.version() == ShaderVersion::Essl100;
        let root = &mut self.scopes[0].precisions;
        match stage {
            ShaderStage::Vertex | ShaderStage::Compute => {
                root.insert(PrecKey::Float, Precision::Highp);
                root.insert(PrecKey::Int, Precision::Highp);
            }
            ShaderStage::Fragment => {
                // Fragment float has no default precision; a declaration
                // without one is an error
                let int_default = if essl1 {
                    Precision::Mediump
                } else {
                    Precision::Highp
                };
                root.insert(PrecKey::Int, int_default);
            }
        }
        for sampler in [
            SamplerType::Sampler2D,
            SamplerType::Sampler3D,
            SamplerType::SamplerCube,
            SamplerType::Sampler2DShadow,
            SamplerType::Sampler2DArray,
            SamplerType::SamplerCubeShadow,
        ] {
            root.insert(PrecKey::Sampler(sampler), Precision::Lowp);
        }
    }

    fn default_precision(&self, key: PrecKey) -> Option<Precision> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.precisions.get(&key).copied())
    }

    fn set_default_precision(
        &mut self,
        precision: ast::Precision,
        specifier: &ast::TypeSpecifier,
        loc: SourceLocation,
    ) {
        let layout = self.resolve_specifier(specifier, loc);
        match precision_key(&layout) {
            Some(key) => {
                let converted = convert_precision(precision);
                self.scopes
                    .last_mut()
                    .unwrap()
                    .precisions
                    .insert(key, converted);
            }
            None => {
                self.report(
                    DiagnosticId::QualifierNotAllowed,
                    loc,
                    "precision does not apply to this type",
                );
            }
        }
    }

    fn builtin_var_type(&self, var: BuiltinVar) -> Type {
        let vec4 = TypeLayout::Vector(ScalarType::Float, 4);
        match var {
            BuiltinVar::Position => Type::with_precision(vec4, Some(Precision::Highp)),
            BuiltinVar::PointSize => Type::with_precision(
                TypeLayout::Scalar(ScalarType::Float),
                Some(Precision::Mediump),
            ),
            BuiltinVar::FragCoord => {
                let precision = if self.version() == ShaderVersion::Essl100 {
                    Precision::Mediump
                } else {
                    Precision::Highp
                };
                Type::with_precision(vec4, Some(precision))
            }
            BuiltinVar::FrontFacing => Type::bool(),
            BuiltinVar::PointCoord => Type::with_precision(
                TypeLayout::Vector(ScalarType::Float, 2),
                Some(Precision::Mediump),
            ),
            BuiltinVar::FragColor => Type::with_precision(vec4, Some(Precision::Mediump)),
            BuiltinVar::FragData => Type::with_precision(
                TypeLayout::Array(Box::new(vec4), Some(4)),
                Some(Precision::Mediump),
            ),
            BuiltinVar::FragDepth => Type::with_precision(
                TypeLayout::Scalar(ScalarType::Float),
                Some(Precision::Highp),
            ),
            BuiltinVar::VertexId | BuiltinVar::InstanceId => Type::with_precision(
                TypeLayout::Scalar(ScalarType::Int),
                Some(Precision::Highp),
            ),
        }
    }

    fn seed_builtins(&mut self) {
        let mut vars: Vec<BuiltinVar> = Vec::new();
        match self.stage() {
            ShaderStage::Vertex => {
                vars.push(BuiltinVar::Position);
                vars.push(BuiltinVar::PointSize);
                if self.version() >= ShaderVersion::Essl300 {
                    vars.push(BuiltinVar::VertexId);
                    vars.push(BuiltinVar::InstanceId);
                }
            }
            ShaderStage::Fragment => {
                vars.push(BuiltinVar::FragCoord);
                vars.push(BuiltinVar::FrontFacing);
                vars.push(BuiltinVar::PointCoord);
                if self.version() == ShaderVersion::Essl100 {
                    vars.push(BuiltinVar::FragColor);
                    vars.push(BuiltinVar::FragData);
                } else {
                    vars.push(BuiltinVar::FragDepth);
                }
            }
            ShaderStage::Compute => {}
        }
        for var in vars {
            self.scopes[0]
                .variables
                .insert(var.name().to_string(), VarEntry::Builtin(var));
        }
    }

    // ------------------------------------------------------------------
    // Scopes

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<VarEntry> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.variables.get(name).cloned())
    }

    fn lookup_struct(&self, name: &str) -> Option<StructId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.structs.get(name).copied())
    }

    fn declare(&mut self, name: &str, entry: VarEntry, loc: SourceLocation) {
        if name.starts_with("gl_") {
            self.report(
                DiagnosticId::ReservedIdentifier,
                loc,
                format!("'{}' : reserved identifier", name),
            );
            return;
        }
        // Variables and functions share the global namespace
        if self.scopes.len() == 1 && self.functions.contains_key(name) {
            self.report(
                DiagnosticId::Redefinition,
                loc,
                format!("'{}' : redefinition of a function name", name),
            );
            return;
        }
        let scope = self.scopes.last_mut().unwrap();
        if scope.variables.contains_key(name) {
            self.report(
                DiagnosticId::Redefinition,
                loc,
                format!("'{}' : redefinition", name),
            );
            return;
        }
        scope.variables.insert(name.to_string(), entry);
    }

    // ------------------------------------------------------------------
    // Types

    fn resolve_specifier(
        &mut self,
        spec: &ast::TypeSpecifier,
        loc: SourceLocation,
    ) -> TypeLayout {
        match *spec {
            ast::TypeSpecifier::Void => TypeLayout::Void,
            ast::TypeSpecifier::Scalar(s) => {
                let scalar = convert_scalar(s);
                if scalar == ScalarType::UInt && !self.version().supports_uint() {
                    self.report(
                        DiagnosticId::UnknownType,
                        loc,
                        "'uint' : requires #version 300 es",
                    );
                }
                TypeLayout::Scalar(scalar)
            }
            ast::TypeSpecifier::Vector(s, n) => {
                let scalar = convert_scalar(s);
                if scalar == ScalarType::UInt && !self.version().supports_uint() {
                    self.report(
                        DiagnosticId::UnknownType,
                        loc,
                        "'uvec' : requires #version 300 es",
                    );
                }
                TypeLayout::Vector(scalar, n)
            }
            ast::TypeSpecifier::Matrix(c, r) => {
                if c != r && self.version() == ShaderVersion::Essl100 {
                    self.report(
                        DiagnosticId::UnknownType,
                        loc,
                        "non-square matrices require #version 300 es",
                    );
                }
                TypeLayout::Matrix(c, r)
            }
            ast::TypeSpecifier::Sampler(s) => TypeLayout::Sampler(convert_sampler(s)),
            ast::TypeSpecifier::Named(ref name) => match self.lookup_struct(name) {
                Some(id) => TypeLayout::Struct(id),
                None => {
                    self.report(
                        DiagnosticId::UnknownType,
                        loc,
                        format!("'{}' : unknown type", name),
                    );
                    TypeLayout::Error
                }
            },
            ast::TypeSpecifier::Struct(ref def) => match self.resolve_struct(def) {
                Some(id) => TypeLayout::Struct(id),
                None => TypeLayout::Error,
            },
        }
    }

    fn resolve_struct(&mut self, def: &ast::StructDefinition) -> Option<StructId> {
        let name = match def.name {
            Some(ref name) => name.node.clone(),
            None => "<anonymous>".to_string(),
        };
        let mut members = Vec::new();
        for member in &def.members {
            for declarator in &member.declarators {
                let member_loc = declarator.name.location;
                let base = self.resolve_type(&member.ty, member_loc);
                let layout =
                    self.apply_array_sizes(base.layout, &declarator.array_sizes, member_loc, true);
                let ty = Type::with_precision(layout, base.precision);
                if members
                    .iter()
                    .any(|m: &StructMember| m.name == declarator.name.node)
                {
                    self.report(
                        DiagnosticId::InvalidStructField,
                        member_loc,
                        format!("'{}' : duplicate field name", declarator.name.node),
                    );
                    continue;
                }
                members.push(StructMember {
                    name: declarator.name.node.clone(),
                    ty,
                });
            }
        }
        let id = StructId(self.module.structs.len() as u32);
        self.module.structs.push(StructDefinition {
            name: name.clone(),
            members,
        });
        if let Some(ref located) = def.name {
            let scope = self.scopes.last_mut().unwrap();
            if scope.structs.contains_key(&name) {
                self.report(
                    DiagnosticId::Redefinition,
                    located.location,
                    format!("'{}' : redefinition of struct", name),
                );
            } else {
                scope.structs.insert(name, id);
            }
        }
        Some(id)
    }

    /// Resolves qualifiers and specifier to a type, applying default
    /// precision where none was declared.
    fn resolve_type(&mut self, ty: &ast::TypeName, loc: SourceLocation) -> Type {
        let layout = self.resolve_specifier(&ty.specifier, loc);
        let layout = self.apply_array_sizes(layout, &ty.array_sizes, loc, false);
        let declared = ty.precision.map(convert_precision);
        let precision = match precision_key(&layout) {
            Some(key) => {
                let resolved = declared.or_else(|| self.default_precision(key));
                if resolved.is_none() {
                    self.report(
                        DiagnosticId::PrecisionNotSpecified,
                        loc,
                        format!(
                            "'{}' : no default precision in this shader stage",
                            self.module.type_name(&layout)
                        ),
                    );
                }
                resolved
            }
            None => declared,
        };
        Type::with_precision(layout, precision)
    }

    /// Folds `[size]` suffixes onto a layout, outermost size first.
    fn apply_array_sizes(
        &mut self,
        base: TypeLayout,
        sizes: &[Option<Located<ast::Expression>>],
        loc: SourceLocation,
        allow_only_sized: bool,
    ) -> TypeLayout {
        if sizes.is_empty() {
            return base;
        }
        let nested = sizes.len() > 1 || base.is_array();
        if nested && !self.version().supports_arrays_of_arrays() {
            self.report(
                DiagnosticId::ArraysOfArraysNotSupported,
                loc,
                "arrays of arrays require #version 310 es",
            );
        }
        let mut layout = base;
        for size in sizes.iter().rev() {
            let resolved = match size {
                Some(expr) => self.const_array_size(expr),
                None => {
                    if allow_only_sized {
                        self.report(
                            DiagnosticId::UnsizedArrayNotAllowed,
                            loc,
                            "array size must be specified",
                        );
                    }
                    None
                }
            };
            layout = TypeLayout::Array(Box::new(layout), resolved);
        }
        layout
    }

    fn const_array_size(&mut self, expr: &Located<ast::Expression>) -> Option<u32> {
        let loc = expr.location;
        let id = self.expr(expr);
        if self.module.expr(id).ty.is_error() {
            return None;
        }
        match self.module.eval_const_int(id) {
            Some(value) if value > 0 => Some(value as u32),
            Some(_) => {
                self.report(
                    DiagnosticId::ArraySizeMustBePositive,
                    loc,
                    "array size must be greater than zero",
                );
                None
            }
            None => {
                self.report(
                    DiagnosticId::ArraySizeMustBeConstant,
                    loc,
                    "array size must be a constant integer expression",
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Expression helpers

    fn alloc(&mut self, kind: ExprKind, ty: Type, loc: SourceLocation) -> ExprId {
        self.module.alloc_expr(kind, ty, loc)
    }

    fn error_expr(&mut self, loc: SourceLocation) -> ExprId {
        self.alloc(ExprKind::Error, Type::error(), loc)
    }

    fn ty_of(&self, id: ExprId) -> Type {
        self.module.expr(id).ty.clone()
    }

    /// Wraps an int-family expression in a float constructor of the same
    /// shape.
    fn floatify(&mut self, id: ExprId) -> ExprId {
        let node = self.module.expr(id).clone();
        let target = node.ty.layout.clone().transform_scalar(ScalarType::Float);
        self.alloc(
            ExprKind::Constructor(target.clone(), vec![id]),
            Type::with_precision(target, node.ty.precision),
            node.loc,
        )
    }

    /// Brings two operands to a common scalar family, converting the int
    /// side to float where mixed. `None` when no common family exists.
    fn harmonize(&mut self, lhs: ExprId, rhs: ExprId) -> Option<(ExprId, ExprId, ScalarType)> {
        let l = scalar_of(&self.module.expr(lhs).ty.layout)?;
        let r = scalar_of(&self.module.expr(rhs).ty.layout)?;
        match (l, r) {
            _ if l == r => Some((lhs, rhs, l)),
            (ScalarType::Float, ScalarType::Int) | (ScalarType::Float, ScalarType::UInt) => {
                Some((lhs, self.floatify(rhs), ScalarType::Float))
            }
            (ScalarType::Int, ScalarType::Float) | (ScalarType::UInt, ScalarType::Float) => {
                Some((self.floatify(lhs), rhs, ScalarType::Float))
            }
            _ => None,
        }
    }

    /// Converts `id` to `target` if the types match directly or via the
    /// int-to-float widening.
    fn try_convert(&mut self, id: ExprId, target: &TypeLayout) -> Option<ExprId> {
        let layout = self.module.expr(id).ty.layout.clone();
        if layout == *target {
            return Some(id);
        }
        let widened = layout.clone().transform_scalar(ScalarType::Float);
        let is_int = matches!(
            scalar_of(&layout),
            Some(ScalarType::Int) | Some(ScalarType::UInt)
        );
        if is_int && !layout.is_array() && widened == *target {
            return Some(self.floatify(id));
        }
        None
    }

    fn check_condition(&mut self, id: ExprId, loc: SourceLocation, what: &str) {
        let ty = &self.module.expr(id).ty;
        if ty.is_error() {
            return;
        }
        if ty.layout != TypeLayout::Scalar(ScalarType::Bool) {
            self.report(
                DiagnosticId::ConditionNotBoolean,
                loc,
                format!("'{}' : condition must be a boolean scalar", what),
            );
        }
    }

    /// Validates that `id` may be written through. Reports and returns
    /// false otherwise.
    fn check_lvalue(&mut self, id: ExprId, loc: SourceLocation) -> bool {
        match self.module.expr(id).kind.clone() {
            ExprKind::Error => true,
            ExprKind::Local(local) => {
                if self.const_locals.contains(&local.0) {
                    self.report(
                        DiagnosticId::LValueRequired,
                        loc,
                        format!("'{}' : cannot assign to a constant", self.locals[local.0 as usize].name),
                    );
                    false
                } else {
                    true
                }
            }
            ExprKind::Global(global) => {
                let storage = self.module.global(global).storage;
                match storage {
                    GlobalStorage::Output | GlobalStorage::Plain => true,
                    _ => {
                        let name = self.module.global(global).name.clone();
                        self.report(
                            DiagnosticId::LValueRequired,
                            loc,
                            format!("'{}' : cannot assign to this variable", name),
                        );
                        false
                    }
                }
            }
            ExprKind::Builtin(var) => {
                if var.is_writable(self.stage()) {
                    true
                } else {
                    self.report(
                        DiagnosticId::WriteToReadOnlyBuiltin,
                        loc,
                        format!("'{}' : cannot write to a read-only builtin", var.name()),
                    );
                    false
                }
            }
            ExprKind::BlockMember(_, _) => {
                self.report(
                    DiagnosticId::LValueRequired,
                    loc,
                    "cannot assign to a uniform block member",
                );
                false
            }
            ExprKind::Swizzle(base, ref components) => {
                let mut seen = [false; 4];
                for component in components {
                    let index = component.offset() as usize;
                    if seen[index] {
                        self.report(
                            DiagnosticId::LValueRequired,
                            loc,
                            "swizzle with repeated components is not assignable",
                        );
                        return false;
                    }
                    seen[index] = true;
                }
                self.check_lvalue(base, loc)
            }
            ExprKind::Member(base, _) | ExprKind::Index(base, _) => self.check_lvalue(base, loc),
            _ => {
                self.report(
                    DiagnosticId::LValueRequired,
                    loc,
                    "expression is not assignable",
                );
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions

    fn expr(&mut self, e: &Located<ast::Expression>) -> ExprId {
        let loc = e.location;
        match e.node {
            ast::Expression::Literal(lit) => self.literal(lit, loc),
            ast::Expression::Ident(ref name) => self.ident(name, loc),
            ast::Expression::Unary(op, ref inner) => self.unary(op, inner, loc),
            ast::Expression::Binary(op, ref lhs, ref rhs) => self.binary(op, lhs, rhs, loc),
            ast::Expression::Ternary(ref cond, ref a, ref b) => self.ternary(cond, a, b, loc),
            ast::Expression::Assignment(op, ref lhs, ref rhs) => {
                self.assignment(op, lhs, rhs, loc)
            }
            ast::Expression::Call(ref name, ref args) => self.call(name, args, loc),
            ast::Expression::Member(ref base, ref member) => self.member(base, member, loc),
            ast::Expression::Index(ref base, ref index) => self.index(base, index, loc),
            ast::Expression::Comma(ref lhs, ref rhs) => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);
                let ty = self.ty_of(rhs);
                self.alloc(ExprKind::Comma(lhs, rhs), ty, loc)
            }
        }
    }

    fn literal(&mut self, lit: ast::Literal, loc: SourceLocation) -> ExprId {
        let (literal, ty) = match lit {
            ast::Literal::Bool(v) => (Literal::Bool(v), Type::bool()),
            ast::Literal::Int(v) => (Literal::Int(v as i32), Type::int()),
            ast::Literal::UInt(v) => {
                if !self.version().supports_uint() {
                    self.report(
                        DiagnosticId::TypeMismatch,
                        loc,
                        "unsigned literals require #version 300 es",
                    );
                }
                (Literal::UInt(v), Type::uint())
            }
            ast::Literal::Float(v) => (Literal::Float(v as f32), Type::float()),
        };
        self.alloc(ExprKind::Literal(literal), ty, loc)
    }

    fn ident(&mut self, name: &str, loc: SourceLocation) -> ExprId {
        match self.lookup(name) {
            Some(VarEntry::Local(local)) => {
                let ty = self.locals[local.0 as usize].ty.clone();
                self.alloc(ExprKind::Local(local), ty, loc)
            }
            Some(VarEntry::Global(global)) => {
                self.module.global_mut(global).static_use = true;
                let ty = self.module.global(global).ty.clone();
                self.alloc(ExprKind::Global(global), ty, loc)
            }
            Some(VarEntry::Builtin(var)) => {
                let ty = self.builtin_var_type(var);
                self.alloc(ExprKind::Builtin(var), ty, loc)
            }
            Some(VarEntry::BlockMember(block, field)) => {
                let ty = self.module.block(block).fields[field].ty.clone();
                self.alloc(ExprKind::BlockMember(block, field), ty, loc)
            }
            Some(VarEntry::BlockInstance(_)) => {
                self.report(
                    DiagnosticId::TypeMismatch,
                    loc,
                    format!("'{}' : a block instance is not a value", name),
                );
                self.error_expr(loc)
            }
            None => {
                self.report(
                    DiagnosticId::UndeclaredIdentifier,
                    loc,
                    format!("'{}' : undeclared identifier", name),
                );
                self.error_expr(loc)
            }
        }
    }

    fn unary(
        &mut self,
        op: ast::UnaryOp,
        inner: &Located<ast::Expression>,
        loc: SourceLocation,
    ) -> ExprId {
        let op = convert_unop(op);
        let id = self.expr(inner);
        let ty = self.ty_of(id);
        if ty.is_error() {
            return self.error_expr(loc);
        }
        let ok = match op {
            UnaryOp::Plus | UnaryOp::Minus => {
                matches!(scalar_of(&ty.layout), Some(s) if s != ScalarType::Bool)
            }
            UnaryOp::LogicalNot => ty.layout == TypeLayout::Scalar(ScalarType::Bool),
            UnaryOp::BitwiseNot => {
                if self.version() == ShaderVersion::Essl100 {
                    self.report(
                        DiagnosticId::TypeMismatch,
                        loc,
                        "'~' : requires #version 300 es",
                    );
                }
                matches!(
                    scalar_of(&ty.layout),
                    Some(ScalarType::Int) | Some(ScalarType::UInt)
                ) && !ty.layout.is_array()
            }
            _ => {
                // increment / decrement
                let numeric = matches!(
                    scalar_of(&ty.layout),
                    Some(ScalarType::Int) | Some(ScalarType::UInt) | Some(ScalarType::Float)
                ) && !matches!(ty.layout, TypeLayout::Matrix(_, _));
                numeric && self.check_lvalue(id, loc)
            }
        };
        if !ok {
            self.report(
                DiagnosticId::TypeMismatch,
                loc,
                "unary operator does not apply to this type",
            );
            return self.error_expr(loc);
        }
        self.alloc(ExprKind::Unary(op, id), ty, loc)
    }

    fn binary(
        &mut self,
        op: ast::BinOp,
        lhs: &Located<ast::Expression>,
        rhs: &Located<ast::Expression>,
        loc: SourceLocation,
    ) -> ExprId {
        let op = convert_binop(op);
        let lhs = self.expr(lhs);
        let rhs = self.expr(rhs);
        match self.binary_result(op, lhs, rhs, loc) {
            Some((lhs, rhs, ty)) => self.alloc(ExprKind::Binary(op, lhs, rhs), ty, loc),
            None => self.error_expr(loc),
        }
    }

    /// Applies operand conversion and computes the result type of a binary
    /// operator. Reports on failure.
    fn binary_result(
        &mut self,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
        loc: SourceLocation,
    ) -> Option<(ExprId, ExprId, Type)> {
        let lt = self.ty_of(lhs);
        let rt = self.ty_of(rhs);
        if lt.is_error() || rt.is_error() {
            return None;
        }
        let precision = higher_precision(lt.precision, rt.precision);
        let mismatch = |typer: &mut Typer, text: &str| {
            typer.report(DiagnosticId::TypeMismatch, loc, text.to_string());
        };

        match op {
            BinOp::Add | BinOp::Subtract | BinOp::Multiply | BinOp::Divide => {
                let (lhs, rhs, family) = match self.harmonize(lhs, rhs) {
                    Some(found) => found,
                    None => {
                        mismatch(self, "operands have incompatible types");
                        return None;
                    }
                };
                if family == ScalarType::Bool {
                    mismatch(self, "arithmetic on booleans is not allowed");
                    return None;
                }
                let l = self.module.expr(lhs).ty.layout.clone();
                let r = self.module.expr(rhs).ty.layout.clone();
                let layout = if op == BinOp::Multiply {
                    match (&l, &r) {
                        (&TypeLayout::Matrix(c1, r1), &TypeLayout::Matrix(c2, r2)) => {
                            if c1 == r2 {
                                Some(TypeLayout::Matrix(c2, r1))
                            } else {
                                None
                            }
                        }
                        (&TypeLayout::Matrix(c, r), &TypeLayout::Vector(_, n)) if n == c => {
                            Some(TypeLayout::Vector(ScalarType::Float, r))
                        }
                        (&TypeLayout::Vector(_, n), &TypeLayout::Matrix(c, r)) if n == r => {
                            Some(TypeLayout::Vector(ScalarType::Float, c))
                        }
                        _ => componentwise(&l, &r),
                    }
                } else {
                    componentwise(&l, &r)
                };
                match layout {
                    Some(layout) => Some((lhs, rhs, Type::with_precision(layout, precision))),
                    None => {
                        mismatch(self, "operand shapes do not match");
                        None
                    }
                }
            }
            BinOp::Modulus
            | BinOp::LeftShift
            | BinOp::RightShift
            | BinOp::BitwiseAnd
            | BinOp::BitwiseOr
            | BinOp::BitwiseXor => {
                if self.version() == ShaderVersion::Essl100 {
                    mismatch(self, "integer operators require #version 300 es");
                    return None;
                }
                let l_ok = matches!(
                    scalar_of(&lt.layout),
                    Some(ScalarType::Int) | Some(ScalarType::UInt)
                ) && !matches!(lt.layout, TypeLayout::Matrix(_, _));
                let r_ok = matches!(
                    scalar_of(&rt.layout),
                    Some(ScalarType::Int) | Some(ScalarType::UInt)
                ) && !matches!(rt.layout, TypeLayout::Matrix(_, _));
                if !l_ok || !r_ok {
                    mismatch(self, "operator requires integer operands");
                    return None;
                }
                if matches!(op, BinOp::LeftShift | BinOp::RightShift) {
                    // Shift result takes the left operand's type; the right
                    // operand may be a scalar applied to each component
                    let ok = match (&lt.layout, &rt.layout) {
                        (_, TypeLayout::Scalar(_)) => true,
                        (TypeLayout::Vector(_, n), TypeLayout::Vector(_, m)) => n == m,
                        (TypeLayout::Scalar(_), TypeLayout::Vector(_, _)) => false,
                        _ => false,
                    };
                    if !ok {
                        mismatch(self, "shift operand shapes do not match");
                        return None;
                    }
                    return Some((lhs, rhs, Type::with_precision(lt.layout, precision)));
                }
                if scalar_of(&lt.layout) != scalar_of(&rt.layout) {
                    mismatch(self, "operands have incompatible types");
                    return None;
                }
                match componentwise(&lt.layout, &rt.layout) {
                    Some(layout) => Some((lhs, rhs, Type::with_precision(layout, precision))),
                    None => {
                        mismatch(self, "operand shapes do not match");
                        None
                    }
                }
            }
            BinOp::LessThan | BinOp::LessEqual | BinOp::GreaterThan | BinOp::GreaterEqual => {
                let (lhs, rhs, family) = match self.harmonize(lhs, rhs) {
                    Some(found) => found,
                    None => {
                        mismatch(self, "operands have incompatible types");
                        return None;
                    }
                };
                let l = self.module.expr(lhs).ty.layout.clone();
                let r = self.module.expr(rhs).ty.layout.clone();
                let scalars = matches!(l, TypeLayout::Scalar(_)) && l == r;
                if family == ScalarType::Bool || !scalars {
                    mismatch(self, "relational operators apply to numeric scalars");
                    return None;
                }
                Some((lhs, rhs, Type::bool()))
            }
            BinOp::Equality | BinOp::Inequality => {
                let (lhs, rhs) = match self.harmonize(lhs, rhs) {
                    Some((l, r, _)) => (l, r),
                    None => (lhs, rhs),
                };
                let l = self.module.expr(lhs).ty.layout.clone();
                let r = self.module.expr(rhs).ty.layout.clone();
                if l != r || l.is_opaque() {
                    mismatch(self, "equality operands must have the same type");
                    return None;
                }
                Some((lhs, rhs, Type::bool()))
            }
            BinOp::LogicalAnd | BinOp::LogicalOr | BinOp::LogicalXor => {
                let wanted = TypeLayout::Scalar(ScalarType::Bool);
                if lt.layout != wanted || rt.layout != wanted {
                    mismatch(self, "logical operators apply to boolean scalars");
                    return None;
                }
                Some((lhs, rhs, Type::bool()))
            }
        }
    }

    fn ternary(
        &mut self,
        cond: &Located<ast::Expression>,
        a: &Located<ast::Expression>,
        b: &Located<ast::Expression>,
        loc: SourceLocation,
    ) -> ExprId {
        let cond_id = self.expr(cond);
        self.check_condition(cond_id, cond.location, "?:");
        let a_id = self.expr(a);
        let b_id = self.expr(b);
        let at = self.ty_of(a_id);
        let bt = self.ty_of(b_id);
        if at.is_error() || bt.is_error() {
            return self.error_expr(loc);
        }
        let (a_id, b_id) = match self.harmonize(a_id, b_id) {
            Some((a, b, _)) => (a, b),
            None => (a_id, b_id),
        };
        let al = self.module.expr(a_id).ty.layout.clone();
        let bl = self.module.expr(b_id).ty.layout.clone();
        if al != bl {
            self.report(
                DiagnosticId::TypeMismatch,
                loc,
                "'?:' : branches have different types",
            );
            return self.error_expr(loc);
        }
        let precision = higher_precision(at.precision, bt.precision);
        self.alloc(
            ExprKind::Ternary(cond_id, a_id, b_id),
            Type::with_precision(al, precision),
            loc,
        )
    }

    fn assignment(
        &mut self,
        op: ast::AssignOp,
        lhs: &Located<ast::Expression>,
        rhs: &Located<ast::Expression>,
        loc: SourceLocation,
    ) -> ExprId {
        let lhs_id = self.expr(lhs);
        let rhs_id = self.expr(rhs);
        let lt = self.ty_of(lhs_id);
        let rt = self.ty_of(rhs_id);
        if lt.is_error() || rt.is_error() {
            return self.error_expr(loc);
        }
        if !self.check_lvalue(lhs_id, loc) {
            return self.error_expr(loc);
        }
        match assign_binop(op) {
            None => match self.try_convert(rhs_id, &lt.layout.clone()) {
                Some(rhs_id) => {
                    self.alloc(ExprKind::Assign(None, lhs_id, rhs_id), lt, loc)
                }
                None => {
                    self.report(
                        DiagnosticId::TypeMismatch,
                        loc,
                        "'=' : cannot convert right operand to the left operand's type",
                    );
                    self.error_expr(loc)
                }
            },
            Some(binop) => match self.binary_result(binop, lhs_id, rhs_id, loc) {
                Some((lhs_conv, rhs_id, result)) => {
                    if lhs_conv != lhs_id || result.layout != lt.layout {
                        self.report(
                            DiagnosticId::TypeMismatch,
                            loc,
                            "compound assignment result does not match the left operand",
                        );
                        return self.error_expr(loc);
                    }
                    self.alloc(ExprKind::Assign(Some(binop), lhs_id, rhs_id), lt, loc)
                }
                None => self.error_expr(loc),
            },
        }
    }

    fn member(
        &mut self,
        base: &Located<ast::Expression>,
        member: &str,
        loc: SourceLocation,
    ) -> ExprId {
        // An instance-qualified block member resolves in one step
        if let ast::Expression::Ident(ref name) = base.node {
            if let Some(VarEntry::BlockInstance(block)) = self.lookup(name) {
                let fields = &self.module.block(block).fields;
                match fields.iter().position(|f| f.name == member) {
                    Some(index) => {
                        let ty = self.module.block(block).fields[index].ty.clone();
                        return self.alloc(ExprKind::BlockMember(block, index), ty, loc);
                    }
                    None => {
                        let block_name = self.module.block(block).name.clone();
                        self.report(
                            DiagnosticId::UndeclaredIdentifier,
                            loc,
                            format!("'{}' : no such member in block '{}'", member, block_name),
                        );
                        return self.error_expr(loc);
                    }
                }
            }
        }

        let base_id = self.expr(base);
        let base_ty = self.ty_of(base_id);
        match base_ty.layout {
            TypeLayout::Error => self.error_expr(loc),
            TypeLayout::Struct(struct_id) => {
                let members = &self.module.struct_def(struct_id).members;
                match members.iter().position(|m| m.name == member) {
                    Some(index) => {
                        let ty = self.module.struct_def(struct_id).members[index].ty.clone();
                        self.alloc(ExprKind::Member(base_id, index), ty, loc)
                    }
                    None => {
                        let name = self.module.struct_def(struct_id).name.clone();
                        self.report(
                            DiagnosticId::UndeclaredIdentifier,
                            loc,
                            format!("'{}' : no such field in struct '{}'", member, name),
                        );
                        self.error_expr(loc)
                    }
                }
            }
            TypeLayout::Vector(scalar, size) => {
                self.swizzle(base_id, scalar, size, member, base_ty.precision, loc)
            }
            _ => {
                self.report(
                    DiagnosticId::InvalidSwizzle,
                    loc,
                    format!("'{}' : field selection requires a struct or vector", member),
                );
                self.error_expr(loc)
            }
        }
    }

    fn swizzle(
        &mut self,
        base: ExprId,
        scalar: ScalarType,
        size: u32,
        text: &str,
        precision: Option<Precision>,
        loc: SourceLocation,
    ) -> ExprId {
        const SETS: [&str; 3] = ["xyzw", "rgba", "stpq"];
        let invalid = || format!("'{}' : invalid swizzle", text);
        if text.is_empty() || text.len() > 4 {
            let text = invalid();
            self.report(DiagnosticId::InvalidSwizzle, loc, text);
            return self.error_expr(loc);
        }
        let set = SETS
            .iter()
            .find(|set| text.chars().all(|c| set.contains(c)));
        let set = match set {
            Some(set) => *set,
            None => {
                let text = invalid();
                self.report(DiagnosticId::InvalidSwizzle, loc, text);
                return self.error_expr(loc);
            }
        };
        let mut components = Vec::new();
        for c in text.chars() {
            let offset = set.find(c).unwrap() as u32;
            if offset >= size {
                let text = format!("'{}' : component out of range for this vector", text);
                self.report(DiagnosticId::InvalidSwizzle, loc, text);
                return self.error_expr(loc);
            }
            components.push(match offset {
                0 => SwizzleComponent::X,
                1 => SwizzleComponent::Y,
                2 => SwizzleComponent::Z,
                _ => SwizzleComponent::W,
            });
        }
        let layout = if components.len() == 1 {
            TypeLayout::Scalar(scalar)
        } else {
            TypeLayout::Vector(scalar, components.len() as u32)
        };
        self.alloc(
            ExprKind::Swizzle(base, components),
            Type::with_precision(layout, precision),
            loc,
        )
    }

    fn index(
        &mut self,
        base: &Located<ast::Expression>,
        index: &Located<ast::Expression>,
        loc: SourceLocation,
    ) -> ExprId {
        let base_id = self.expr(base);
        let index_id = self.expr(index);
        let base_ty = self.ty_of(base_id);
        let index_ty = self.ty_of(index_id);
        if base_ty.is_error() || index_ty.is_error() {
            return self.error_expr(loc);
        }
        if !matches!(
            index_ty.layout,
            TypeLayout::Scalar(ScalarType::Int) | TypeLayout::Scalar(ScalarType::UInt)
        ) {
            self.report(
                DiagnosticId::TypeMismatch,
                loc,
                "index must be an integer scalar",
            );
            return self.error_expr(loc);
        }
        let element = match base_ty.layout.indexed() {
            Some(element) => element,
            None => {
                self.report(
                    DiagnosticId::IndexingNonArray,
                    loc,
                    "only arrays, vectors and matrices can be indexed",
                );
                return self.error_expr(loc);
            }
        };
        // Bounds check constant indices against known sizes
        if let Some(value) = self.module.eval_const_int(index_id) {
            let limit = match base_ty.layout {
                TypeLayout::Vector(_, n) => Some(n as i64),
                TypeLayout::Matrix(c, _) => Some(c as i64),
                TypeLayout::Array(_, Some(n)) => Some(n as i64),
                _ => None,
            };
            if value < 0 || limit.is_some_and(|limit| value >= limit) {
                self.report(
                    DiagnosticId::TypeMismatch,
                    loc,
                    format!("'{}' : index out of range", value),
                );
            }
        }
        self.alloc(
            ExprKind::Index(base_id, index_id),
            Type::with_precision(element, base_ty.precision),
            loc,
        )
    }

    fn call(
        &mut self,
        name: &str,
        args: &[Located<ast::Expression>],
        loc: SourceLocation,
    ) -> ExprId {
        let arg_ids: Vec<ExprId> = args.iter().map(|a| self.expr(a)).collect();
        if arg_ids.iter().any(|&id| self.module.expr(id).ty.is_error()) {
            return self.error_expr(loc);
        }

        if let Some(target) = constructor_target(name) {
            return self.constructor(target, arg_ids, loc);
        }
        if let Some(struct_id) = self.lookup_struct(name) {
            return self.constructor(TypeLayout::Struct(struct_id), arg_ids, loc);
        }
        if let Some(candidates) = self.functions.get(name).cloned() {
            return self.user_call(name, &candidates, arg_ids, loc);
        }

        let arg_layouts: Vec<TypeLayout> = arg_ids
            .iter()
            .map(|&id| self.module.expr(id).ty.layout.clone())
            .collect();
        match overloads::resolve(name, &arg_layouts, self.version(), self.stage()) {
            Some(found) => {
                let mut converted = arg_ids;
                for (i, conversion) in found.conversions.iter().enumerate() {
                    if conversion.is_some() {
                        converted[i] = self.floatify(converted[i]);
                    }
                }
                for &out_index in &found.out_args {
                    self.check_lvalue(converted[out_index], loc);
                }
                let precision = converted
                    .iter()
                    .fold(None, |acc, &id| {
                        higher_precision(acc, self.module.expr(id).ty.precision)
                    });
                self.alloc(
                    ExprKind::Intrinsic(found.intrinsic, converted),
                    Type::with_precision(found.return_layout, precision),
                    loc,
                )
            }
            None => {
                if esslt_lang_hir::intrinsics::is_builtin_name(name) {
                    self.report(
                        DiagnosticId::NoMatchingOverload,
                        loc,
                        format!("'{}' : no matching overloaded function found", name),
                    );
                } else {
                    self.report(
                        DiagnosticId::UndeclaredIdentifier,
                        loc,
                        format!("'{}' : no such function", name),
                    );
                }
                self.error_expr(loc)
            }
        }
    }

    fn constructor(
        &mut self,
        target: TypeLayout,
        args: Vec<ExprId>,
        loc: SourceLocation,
    ) -> ExprId {
        let wrong = |typer: &mut Typer, text: &str| {
            typer.report(
                DiagnosticId::ConstructorWrongArguments,
                loc,
                format!("'{}' : {}", typer.module.type_name(&target), text),
            );
        };
        let precision = args.iter().fold(None, |acc, &id| {
            higher_precision(acc, self.module.expr(id).ty.precision)
        });

        if let TypeLayout::Struct(struct_id) = target {
            let members = self.module.struct_def(struct_id).members.clone();
            if members.len() != args.len() {
                wrong(self, "wrong number of constructor arguments");
                return self.error_expr(loc);
            }
            for (member, &arg) in members.iter().zip(args.iter()) {
                if self.module.expr(arg).ty.layout != member.ty.layout {
                    wrong(self, "constructor argument type does not match field");
                    return self.error_expr(loc);
                }
            }
            return self.alloc(
                ExprKind::Constructor(target.clone(), args),
                Type::new(target),
                loc,
            );
        }

        let needed = target.component_count();
        if needed == 0 {
            wrong(self, "type cannot be constructed");
            return self.error_expr(loc);
        }
        if args.is_empty() {
            wrong(self, "constructor requires arguments");
            return self.error_expr(loc);
        }

        if args.len() == 1 {
            let arg_layout = self.module.expr(args[0]).ty.layout.clone();
            let ok = match (&target, &arg_layout) {
                (_, TypeLayout::Scalar(_)) => true,
                (&TypeLayout::Matrix(_, _), &TypeLayout::Matrix(_, _)) => true,
                (&TypeLayout::Matrix(_, _), _) | (_, &TypeLayout::Matrix(_, _)) => false,
                _ => arg_layout.component_count() >= needed,
            };
            if !ok {
                wrong(self, "cannot construct from this argument");
                return self.error_expr(loc);
            }
        } else {
            let mut total = 0;
            for &arg in &args {
                let layout = self.module.expr(arg).ty.layout.clone();
                match layout {
                    TypeLayout::Scalar(_) | TypeLayout::Vector(_, _) => {
                        total += layout.component_count();
                    }
                    _ => {
                        wrong(self, "invalid constructor argument");
                        return self.error_expr(loc);
                    }
                }
            }
            if total != needed {
                wrong(self, "wrong number of components in constructor");
                return self.error_expr(loc);
            }
        }

        self.alloc(
            ExprKind::Constructor(target.clone(), args),
            Type::with_precision(target, precision),
            loc,
        )
    }

    fn user_call(
        &mut self,
        name: &str,
        candidates: &[FunctionId],
        args: Vec<ExprId>,
        loc: SourceLocation,
    ) -> ExprId {
        let arg_layouts: Vec<TypeLayout> = args
            .iter()
            .map(|&id| self.module.expr(id).ty.layout.clone())
            .collect();

        let mut chosen = None;
        for allow_conversion in [false, true] {
            let mut matches = Vec::new();
            for &fid in candidates {
                let params = &self.module.function(fid).params;
                if params.len() != arg_layouts.len() {
                    continue;
                }
                let fits = params.iter().zip(arg_layouts.iter()).all(|(p, a)| {
                    if p.ty.layout == *a {
                        return true;
                    }
                    if !allow_conversion || p.direction != ParamDirection::In {
                        return false;
                    }
                    let widened = a.clone().transform_scalar(ScalarType::Float);
                    matches!(
                        scalar_of(a),
                        Some(ScalarType::Int) | Some(ScalarType::UInt)
                    ) && !a.is_array()
                        && widened == p.ty.layout
                });
                if fits {
                    matches.push(fid);
                }
            }
            match matches.len() {
                0 => continue,
                1 => {
                    chosen = Some(matches[0]);
                    break;
                }
                _ => {
                    self.report(
                        DiagnosticId::NoMatchingOverload,
                        loc,
                        format!("'{}' : ambiguous call", name),
                    );
                    return self.error_expr(loc);
                }
            }
        }
        let fid = match chosen {
            Some(fid) => fid,
            None => {
                self.report(
                    DiagnosticId::NoMatchingOverload,
                    loc,
                    format!("'{}' : no matching overloaded function found", name),
                );
                return self.error_expr(loc);
            }
        };

        let params = self.module.function(fid).params.clone();
        let mut converted = args;
        for (i, param) in params.iter().enumerate() {
            if self.module.expr(converted[i]).ty.layout != param.ty.layout {
                converted[i] = self.floatify(converted[i]);
            }
            if param.direction != ParamDirection::In {
                self.check_lvalue(converted[i], loc);
            }
        }
        let return_type = self.module.function(fid).return_type.clone();
        self.alloc(ExprKind::Call(fid, converted), return_type, loc)
    }

    // ------------------------------------------------------------------
    // Statements

    fn nested_block(&mut self, statement: &ast::Statement) -> Vec<Statement> {
        self.push_scope();
        let mut out = Vec::new();
        self.statement(statement, &mut out);
        self.pop_scope();
        out
    }

    fn statement(&mut self, statement: &ast::Statement, out: &mut Vec<Statement>) {
        match *statement {
            ast::Statement::Empty => {}
            ast::Statement::Expression(ref expr) => {
                let id = self.expr(expr);
                out.push(Statement::Expression(id));
            }
            ast::Statement::Var(ref def) => self.local_var_def(def, out),
            ast::Statement::Precision(precision, ref specifier) => {
                self.set_default_precision(precision, &specifier.node, specifier.location);
            }
            ast::Statement::Block(ref statements) => {
                self.push_scope();
                let mut inner = Vec::new();
                for statement in statements {
                    self.statement(statement, &mut inner);
                }
                self.pop_scope();
                out.push(Statement::Block(inner));
            }
            ast::Statement::If(ref cond, ref then_branch, ref else_branch) => {
                let cond_id = self.expr(cond);
                self.check_condition(cond_id, cond.location, "if");
                let then_block = self.nested_block(then_branch);
                let else_block = else_branch.as_ref().map(|s| self.nested_block(s));
                out.push(Statement::If(cond_id, then_block, else_block));
            }
            ast::Statement::For(ref init, ref cond, ref step, ref body) => {
                self.push_scope();
                let init = match *init {
                    ast::ForInit::Empty => ForInit::Empty,
                    ast::ForInit::Expression(ref expr) => {
                        ForInit::Expression(self.expr(expr))
                    }
                    ast::ForInit::Definition(ref def) => {
                        let mut defs = Vec::new();
                        self.local_var_def_into(def, &mut defs);
                        ForInit::Definition(defs)
                    }
                };
                let cond_id = cond.as_ref().map(|c| {
                    let id = self.expr(c);
                    self.check_condition(id, c.location, "for");
                    id
                });
                let step_id = step.as_ref().map(|s| self.expr(s));
                self.loop_depth += 1;
                let body = self.nested_block(body);
                self.loop_depth -= 1;
                self.pop_scope();
                out.push(Statement::For(init, cond_id, step_id, body));
            }
            ast::Statement::While(ref cond, ref body) => {
                let cond_id = self.expr(cond);
                self.check_condition(cond_id, cond.location, "while");
                self.loop_depth += 1;
                let body = self.nested_block(body);
                self.loop_depth -= 1;
                out.push(Statement::While(cond_id, body));
            }
            ast::Statement::DoWhile(ref body, ref cond) => {
                self.loop_depth += 1;
                let body = self.nested_block(body);
                self.loop_depth -= 1;
                let cond_id = self.expr(cond);
                self.check_condition(cond_id, cond.location, "do");
                out.push(Statement::DoWhile(body, cond_id));
            }
            ast::Statement::Switch(ref value, ref cases) => {
                let value_id = self.expr(value);
                let value_ty = self.ty_of(value_id);
                if !value_ty.is_error()
                    && !matches!(
                        value_ty.layout,
                        TypeLayout::Scalar(ScalarType::Int) | TypeLayout::Scalar(ScalarType::UInt)
                    )
                {
                    self.report(
                        DiagnosticId::TypeMismatch,
                        value.location,
                        "'switch' : selector must be an integer scalar",
                    );
                }
                let mut hir_cases = Vec::new();
                self.switch_depth += 1;
                for case in cases {
                    let label = match case.label {
                        ast::CaseLabel::Case(ref expr) => CaseLabel::Case(self.expr(expr)),
                        ast::CaseLabel::Default => CaseLabel::Default,
                    };
                    self.push_scope();
                    let mut statements = Vec::new();
                    for statement in &case.statements {
                        self.statement(statement, &mut statements);
                    }
                    self.pop_scope();
                    hir_cases.push(SwitchCase { label, statements });
                }
                self.switch_depth -= 1;
                out.push(Statement::Switch(value_id, hir_cases));
            }
            ast::Statement::Return(ref value) => {
                let expected = self.current_return.clone().unwrap_or_else(Type::void);
                match *value {
                    Some(ref expr) => {
                        let loc = expr.location;
                        let id = self.expr(expr);
                        if expected.layout == TypeLayout::Void {
                            self.report(
                                DiagnosticId::ReturnTypeMismatch,
                                loc,
                                "'return' : void function cannot return a value",
                            );
                            out.push(Statement::Return(None));
                        } else if self.module.expr(id).ty.is_error() {
                            out.push(Statement::Return(Some(id)));
                        } else {
                            match self.try_convert(id, &expected.layout) {
                                Some(id) => out.push(Statement::Return(Some(id))),
                                None => {
                                    self.report(
                                        DiagnosticId::ReturnTypeMismatch,
                                        loc,
                                        "'return' : value does not match the function's return type",
                                    );
                                    out.push(Statement::Return(Some(id)));
                                }
                            }
                        }
                    }
                    None => {
                        if expected.layout != TypeLayout::Void {
                            self.report(
                                DiagnosticId::ReturnTypeMismatch,
                                SourceLocation::none(),
                                "'return' : non-void function must return a value",
                            );
                        }
                        out.push(Statement::Return(None));
                    }
                }
            }
            ast::Statement::Break => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    self.report(
                        DiagnosticId::SyntaxError,
                        SourceLocation::none(),
                        "'break' : only valid inside a loop or switch",
                    );
                }
                out.push(Statement::Break);
            }
            ast::Statement::Continue => {
                if self.loop_depth == 0 {
                    self.report(
                        DiagnosticId::SyntaxError,
                        SourceLocation::none(),
                        "'continue' : only valid inside a loop",
                    );
                }
                out.push(Statement::Continue);
            }
            ast::Statement::Discard => {
                if self.stage() != ShaderStage::Fragment {
                    self.report(
                        DiagnosticId::SyntaxError,
                        SourceLocation::none(),
                        "'discard' : only valid in a fragment shader",
                    );
                }
                out.push(Statement::Discard);
            }
        }
    }

    fn local_var_def(&mut self, def: &ast::VarDef, out: &mut Vec<Statement>) {
        let mut defs = Vec::new();
        self.local_var_def_into(def, &mut defs);
        for var in defs {
            out.push(Statement::Var(var));
        }
    }

    fn local_var_def_into(&mut self, def: &ast::VarDef, out: &mut Vec<VarDef>) {
        let is_const = def.ty.storage == Some(ast::StorageQualifier::Const);
        if !is_const && def.ty.storage.is_some() {
            self.report(
                DiagnosticId::QualifierNotAllowed,
                def.declarators
                    .first()
                    .map(|d| d.name.location)
                    .unwrap_or_else(SourceLocation::none),
                "storage qualifiers are not allowed on local variables",
            );
        }
        // Resolve the type once so an inline struct registers a single type
        let base = self.resolve_type(
            &def.ty,
            def.declarators
                .first()
                .map(|d| d.name.location)
                .unwrap_or_else(SourceLocation::none),
        );
        for declarator in &def.declarators {
            let loc = declarator.name.location;
            if !def.ty.array_sizes.is_empty() && !declarator.array_sizes.is_empty() {
                self.report(
                    DiagnosticId::MixedArrayDeclarators,
                    loc,
                    "array specifiers on both the type and the declarator",
                );
            }
            let mut layout =
                self.apply_array_sizes(base.layout.clone(), &declarator.array_sizes, loc, false);

            let init = declarator.init.as_ref().map(|init| self.expr(init));

            // Unsized declarations take their size from the initializer
            if matches!(layout, TypeLayout::Array(_, None)) {
                match init {
                    Some(init_id) => {
                        let init_layout = self.module.expr(init_id).ty.layout.clone();
                        if matches!(init_layout, TypeLayout::Array(_, Some(_))) {
                            layout = init_layout;
                        }
                    }
                    None => {
                        self.report(
                            DiagnosticId::UnsizedArrayNotAllowed,
                            loc,
                            "unsized array needs an initializer",
                        );
                    }
                }
            }

            let init = match init {
                Some(init_id) if !self.module.expr(init_id).ty.is_error() => {
                    match self.try_convert(init_id, &layout) {
                        Some(converted) => Some(converted),
                        None => {
                            self.report(
                                DiagnosticId::TypeMismatch,
                                loc,
                                format!(
                                    "'{}' : initializer does not match the declared type",
                                    declarator.name.node
                                ),
                            );
                            Some(init_id)
                        }
                    }
                }
                other => other,
            };

            if is_const && init.is_none() {
                self.report(
                    DiagnosticId::ConstRequiresInitializer,
                    loc,
                    format!("'{}' : const requires an initializer", declarator.name.node),
                );
            }

            let id = LocalId(self.locals.len() as u32);
            self.locals.push(Local {
                name: declarator.name.node.clone(),
                ty: Type::with_precision(layout, base.precision),
            });
            if is_const {
                self.const_locals.insert(id.0);
            }
            self.declare(&declarator.name.node, VarEntry::Local(id), loc);
            out.push(VarDef { id, init });
        }
    }

    // ------------------------------------------------------------------
    // Root definitions

    fn root_definition(&mut self, def: &Located<ast::RootDefinition>) {
        let loc = def.location;
        match def.node {
            ast::RootDefinition::Struct(ref struct_def) => {
                if let Some(id) = self.resolve_struct(struct_def) {
                    self.module.root_order.push(RootDefinition::Struct(id));
                }
            }
            ast::RootDefinition::Var(ref var_def) => self.root_var(var_def, loc),
            ast::RootDefinition::Function(ref fn_def) => self.root_function(fn_def, loc),
            ast::RootDefinition::Block(ref block_def) => self.root_block(block_def, loc),
            ast::RootDefinition::Precision(precision, ref specifier) => {
                self.set_default_precision(precision, specifier, loc);
            }
            ast::RootDefinition::InvariantRedeclaration(ref name) => {
                match self.lookup(&name.node) {
                    Some(VarEntry::Builtin(var)) => {
                        if !self.module.invariant_builtins.contains(&var) {
                            self.module.invariant_builtins.push(var);
                        }
                    }
                    Some(VarEntry::Global(global)) => {
                        self.module.global_mut(global).invariant = true;
                    }
                    _ => {
                        self.report(
                            DiagnosticId::UndeclaredIdentifier,
                            name.location,
                            format!("'{}' : undeclared identifier", name.node),
                        );
                    }
                }
            }
        }
    }

    fn global_storage(&mut self, ty: &ast::TypeName, loc: SourceLocation) -> GlobalStorage {
        let is_essl1 = self.version() == ShaderVersion::Essl100;
        match ty.storage {
            Some(ast::StorageQualifier::Const) => GlobalStorage::Const,
            Some(ast::StorageQualifier::Uniform) => GlobalStorage::Uniform,
            Some(ast::StorageQualifier::Attribute) => {
                if !is_essl1 {
                    self.report(
                        DiagnosticId::QualifierNotAllowed,
                        loc,
                        "'attribute' : not available after #version 100",
                    );
                }
                if self.stage() == ShaderStage::Fragment {
                    self.report(
                        DiagnosticId::QualifierNotAllowed,
                        loc,
                        "'attribute' : not allowed in fragment shaders",
                    );
                }
                GlobalStorage::Input
            }
            Some(ast::StorageQualifier::Varying) => {
                if !is_essl1 {
                    self.report(
                        DiagnosticId::QualifierNotAllowed,
                        loc,
                        "'varying' : not available after #version 100",
                    );
                }
                match self.stage() {
                    ShaderStage::Vertex => GlobalStorage::Output,
                    _ => GlobalStorage::Input,
                }
            }
            Some(ast::StorageQualifier::In) => {
                if is_essl1 {
                    self.report(
                        DiagnosticId::QualifierNotAllowed,
                        loc,
                        "'in' : requires #version 300 es",
                    );
                }
                GlobalStorage::Input
            }
            Some(ast::StorageQualifier::Out) => {
                if is_essl1 {
                    self.report(
                        DiagnosticId::QualifierNotAllowed,
                        loc,
                        "'out' : requires #version 300 es",
                    );
                }
                GlobalStorage::Output
            }
            None => GlobalStorage::Plain,
        }
    }

    fn root_var(&mut self, def: &ast::VarDef, loc: SourceLocation) {
        // A qualifier-only declaration like `struct S {...};` came through
        // with no declarators and was handled by the caller
        let storage = self.global_storage(&def.ty, loc);

        // Resolve once so inline struct definitions register a single type
        let base = self.resolve_type(&def.ty, loc);

        let location = def.ty.layout.as_ref().and_then(|layout| {
            let value = layout.find("location")??;
            if value >= 0 {
                Some(value as u32)
            } else {
                None
            }
        });
        if def.ty.layout.is_some() && !self.version().supports_location_qualifier() {
            self.report(
                DiagnosticId::LayoutQualifierNotAllowed,
                loc,
                "layout qualifiers require #version 300 es",
            );
        }

        for declarator in &def.declarators {
            let decl_loc = declarator.name.location;
            if !def.ty.array_sizes.is_empty() && !declarator.array_sizes.is_empty() {
                self.report(
                    DiagnosticId::MixedArrayDeclarators,
                    decl_loc,
                    "array specifiers on both the type and the declarator",
                );
            }
            let mut layout = self.apply_array_sizes(
                base.layout.clone(),
                &declarator.array_sizes,
                decl_loc,
                false,
            );

            let init = declarator.init.as_ref().map(|init| self.expr(init));
            if matches!(layout, TypeLayout::Array(_, None)) {
                match init {
                    Some(init_id) => {
                        let init_layout = self.module.expr(init_id).ty.layout.clone();
                        if matches!(init_layout, TypeLayout::Array(_, Some(_))) {
                            layout = init_layout;
                        }
                    }
                    None => {
                        self.report(
                            DiagnosticId::UnsizedArrayNotAllowed,
                            decl_loc,
                            "unsized array needs an initializer",
                        );
                    }
                }
            }

            let init = match init {
                Some(init_id) if !self.module.expr(init_id).ty.is_error() => {
                    match self.try_convert(init_id, &layout) {
                        Some(converted) => Some(converted),
                        None => {
                            self.report(
                                DiagnosticId::TypeMismatch,
                                decl_loc,
                                format!(
                                    "'{}' : initializer does not match the declared type",
                                    declarator.name.node
                                ),
                            );
                            Some(init_id)
                        }
                    }
                }
                other => other,
            };

            let id = GlobalId(self.module.globals.len() as u32);
            self.module.globals.push(GlobalVariable {
                name: declarator.name.node.clone(),
                ty: Type::with_precision(layout, base.precision),
                storage,
                interpolation: def.ty.interpolation.map(|i| match i {
                    ast::Interpolation::Flat => Interpolation::Flat,
                    ast::Interpolation::Smooth => Interpolation::Smooth,
                }),
                invariant: def.ty.invariant,
                centroid: def.ty.centroid,
                location,
                init,
                static_use: false,
                block_offset: None,
            });
            self.declare(&declarator.name.node, VarEntry::Global(id), decl_loc);
            self.module.root_order.push(RootDefinition::Global(id));
        }
    }

    fn root_block(&mut self, def: &ast::InterfaceBlockDef, loc: SourceLocation) {
        if !self.version().supports_interface_blocks() {
            self.report(
                DiagnosticId::QualifierNotAllowed,
                loc,
                "interface blocks require #version 300 es",
            );
        }
        let mut layout_kind = BlockLayoutKind::Shared;
        let mut row_major = false;
        let mut binding = None;
        if let Some(ref layout) = def.layout {
            for (name, value) in &layout.0 {
                match name.as_str() {
                    "std140" => layout_kind = BlockLayoutKind::Std140,
                    "packed" => layout_kind = BlockLayoutKind::Packed,
                    "shared" => layout_kind = BlockLayoutKind::Shared,
                    "row_major" => row_major = true,
                    "column_major" => row_major = false,
                    "binding" => {
                        binding = value.and_then(|v| if v >= 0 { Some(v as u32) } else { None });
                    }
                    other => {
                        self.report(
                            DiagnosticId::LayoutQualifierNotAllowed,
                            loc,
                            format!("'{}' : unknown layout qualifier", other),
                        );
                    }
                }
            }
        }

        let mut fields = Vec::new();
        for member in &def.members {
            for declarator in &member.declarators {
                let member_loc = declarator.name.location;
                let base = self.resolve_type(&member.ty, member_loc);
                let layout = self.apply_array_sizes(
                    base.layout,
                    &declarator.array_sizes,
                    member_loc,
                    true,
                );
                fields.push(BlockField {
                    name: declarator.name.node.clone(),
                    ty: Type::with_precision(layout, base.precision),
                    offset: None,
                    array_stride: None,
                    matrix_stride: None,
                    needs_carrier: false,
                });
            }
        }

        let id = BlockId(self.module.blocks.len() as u32);
        self.module.blocks.push(InterfaceBlock {
            name: def.name.node.clone(),
            instance_name: def.instance.as_ref().map(|(name, _)| name.node.clone()),
            fields,
            layout: layout_kind,
            row_major,
            binding,
            data_size: None,
        });

        match def.instance {
            Some((ref instance, _)) => {
                self.declare(
                    &instance.node,
                    VarEntry::BlockInstance(id),
                    instance.location,
                );
            }
            None => {
                // Members of an anonymous block join the global namespace
                let count = self.module.block(id).fields.len();
                for index in 0..count {
                    let name = self.module.block(id).fields[index].name.clone();
                    self.declare(&name, VarEntry::BlockMember(id, index), loc);
                }
            }
        }
        self.module.root_order.push(RootDefinition::Block(id));
    }

    fn root_function(&mut self, def: &ast::FunctionDefinition, loc: SourceLocation) {
        let name = &def.name.node;
        let return_type = if def.returntype.specifier == ast::TypeSpecifier::Void {
            Type::void()
        } else {
            self.resolve_type(&def.returntype, loc)
        };

        let mut params = Vec::new();
        for param in &def.params {
            let param_loc = param
                .name
                .as_ref()
                .map(|n| n.location)
                .unwrap_or(loc);
            let base = self.resolve_type(&param.ty, param_loc);
            let layout =
                self.apply_array_sizes(base.layout, &param.array_sizes, param_loc, true);
            params.push(Param {
                name: param
                    .name
                    .as_ref()
                    .map(|n| n.node.clone())
                    .unwrap_or_default(),
                ty: Type::with_precision(layout, base.precision),
                direction: match param.direction {
                    Some(ast::ParamDirection::Out) => ParamDirection::Out,
                    Some(ast::ParamDirection::InOut) => ParamDirection::InOut,
                    _ => ParamDirection::In,
                },
            });
        }

        if name.starts_with("gl_") {
            self.report(
                DiagnosticId::ReservedIdentifier,
                def.name.location,
                format!("'{}' : reserved identifier", name),
            );
            return;
        }
        // Builtins visible in this stage and version cannot be redeclared;
        // a builtin that only exists elsewhere is a free name here
        if esslt_lang_hir::intrinsics::candidates(name, self.version(), self.stage())
            .next()
            .is_some()
        {
            self.report(
                DiagnosticId::RedeclaringBuiltIn,
                def.name.location,
                format!("'{}' : redeclaring a built-in function", name),
            );
            return;
        }
        if self.scopes[0].variables.contains_key(name) {
            self.report(
                DiagnosticId::Redefinition,
                def.name.location,
                format!("'{}' : redefinition of a variable name", name),
            );
            return;
        }
        if name == "main" && (!params.is_empty() || return_type.layout != TypeLayout::Void) {
            self.report(
                DiagnosticId::MainWrongSignature,
                def.name.location,
                "'main' : must be declared as void main()",
            );
        }

        // Find an existing overload with this exact signature
        let existing = self.functions.get(name).and_then(|candidates| {
            candidates
                .iter()
                .copied()
                .find(|&fid| {
                    let fn_params = &self.module.function(fid).params;
                    fn_params.len() == params.len()
                        && fn_params
                            .iter()
                            .zip(params.iter())
                            .all(|(a, b)| a.ty.layout == b.ty.layout)
                })
        });

        let fid = match existing {
            Some(fid) => {
                if def.body.is_some() && self.module.function(fid).defined {
                    self.report(
                        DiagnosticId::Redefinition,
                        def.name.location,
                        format!("'{}' : redefinition", name),
                    );
                    return;
                }
                fid
            }
            None => {
                let fid = FunctionId(self.module.functions.len() as u32);
                self.module.functions.push(FunctionDefinition {
                    name: name.clone(),
                    return_type: return_type.clone(),
                    params: params.clone(),
                    locals: Vec::new(),
                    body: Vec::new(),
                    defined: false,
                });
                self.functions.entry(name.clone()).or_default().push(fid);
                fid
            }
        };

        if let Some(ref body) = def.body {
            self.locals = params
                .iter()
                .map(|p| Local {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                })
                .collect();
            self.const_locals.clear();
            self.current_return = Some(return_type);
            self.push_scope();
            for (index, param) in params.iter().enumerate() {
                if !param.name.is_empty() {
                    self.declare(
                        &param.name,
                        VarEntry::Local(LocalId(index as u32)),
                        def.name.location,
                    );
                }
            }
            let mut statements = Vec::new();
            for statement in body {
                self.statement(statement, &mut statements);
            }
            self.pop_scope();
            self.current_return = None;

            let function = &mut self.module.functions[fid.0 as usize];
            function.locals = std::mem::take(&mut self.locals);
            function.body = statements;
            function.defined = true;
            self.module.root_order.push(RootDefinition::Function(fid));
        }
    }
}

fn componentwise(l: &TypeLayout, r: &TypeLayout) -> Option<TypeLayout> {
    match (l, r) {
        _ if l == r => Some(l.clone()),
        (&TypeLayout::Scalar(_), &TypeLayout::Vector(_, _))
        | (&TypeLayout::Scalar(_), &TypeLayout::Matrix(_, _)) => Some(r.clone()),
        (&TypeLayout::Vector(_, _), &TypeLayout::Scalar(_))
        | (&TypeLayout::Matrix(_, _), &TypeLayout::Scalar(_)) => Some(l.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::Diagnostics;

    fn check(source: &str, version: ShaderVersion, stage: ShaderStage) -> (Module, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut handler = esslt_transform_preprocess::NullDirectiveHandler;
        let text =
            esslt_transform_preprocess::preprocess(&[source], &mut handler, &mut diagnostics);
        let tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = esslt_transform_tok_to_ast::parse(&tokens, &mut diagnostics);
        let module = type_check(&unit, version, stage, &mut diagnostics);
        (module, diagnostics)
    }

    fn check_vs1(source: &str) -> (Module, Diagnostics) {
        check(source, ShaderVersion::Essl100, ShaderStage::Vertex)
    }

    #[test]
    fn minimal_vertex_shader() {
        let source = "attribute vec4 position; void main() { gl_Position = position; }";
        let (module, diags) = check_vs1(source);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
        assert!(module.main_function().is_some());
        assert_eq!(module.globals.len(), 1);
        assert_eq!(module.globals[0].storage, GlobalStorage::Input);
        assert!(module.globals[0].static_use);
    }

    #[test]
    fn precision_statement_applies_to_the_rest_of_the_block() {
        let source = "void main() {\
            precision mediump float;\
            float a = 1.0;\
            gl_FragColor = vec4(a);\
        }";
        let (_, diags) = check(source, ShaderVersion::Essl100, ShaderStage::Fragment);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn precision_statement_expires_with_its_block() {
        let source = "void main() {\
            { precision mediump float; float a = 1.0; gl_FragColor = vec4(a); }\
            float b = 1.0;\
        }";
        let (_, diags) = check(source, ShaderVersion::Essl100, ShaderStage::Fragment);
        assert!(diags.has_errors());
        assert!(diags.info_log().contains("no default precision"));
    }

    #[test]
    fn function_then_variable_redefinition_fails() {
        let source = "float fun(float a) { return a; } float fun;";
        let (_, diags) = check_vs1(source);
        assert!(diags.contains(DiagnosticId::Redefinition));
    }

    #[test]
    fn redeclaring_visible_builtin_fails() {
        let source = "float dot(float a, float b) { return a * b; } void main() {}";
        let (_, diags) = check_vs1(source);
        assert!(diags.contains(DiagnosticId::RedeclaringBuiltIn));
    }

    #[test]
    fn redeclaring_out_of_stage_builtin_is_allowed() {
        // texture2DLod is vertex-only, so a fragment shader may reuse the name
        let source = "precision mediump float;\
            float texture2DLod(float x) { return x; } void main() {}";
        let (_, diags) = check(source, ShaderVersion::Essl100, ShaderStage::Fragment);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn undeclared_identifier_reported() {
        let (_, diags) = check_vs1("void main() { gl_Position = missing; }");
        assert!(diags.contains(DiagnosticId::UndeclaredIdentifier));
    }

    #[test]
    fn overload_resolution_picks_exact() {
        let source = "float pick(float x) { return x; }\
            float pick(int x) { return 2.0; }\
            void main() { float a = pick(1); float b = pick(1.0); }";
        let (_, diags) = check_vs1(source);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn no_matching_overload_reported() {
        let (_, diags) = check_vs1("void main() { float x = dot(1.0, vec2(1.0)); }");
        assert!(diags.contains(DiagnosticId::NoMatchingOverload));
    }

    #[test]
    fn swizzle_types() {
        let source = "void main() { vec4 v = vec4(1.0); vec2 a = v.xy; float b = v.w; vec3 c = v.rgb; }";
        let (_, diags) = check_vs1(source);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn mixed_swizzle_sets_rejected() {
        let (_, diags) = check_vs1("void main() { vec4 v = vec4(1.0); vec2 a = v.xg; }");
        assert!(diags.contains(DiagnosticId::InvalidSwizzle));
    }

    #[test]
    fn swizzle_out_of_range_rejected() {
        let (_, diags) = check_vs1("void main() { vec2 v = vec2(1.0); float a = v.z; }");
        assert!(diags.contains(DiagnosticId::InvalidSwizzle));
    }

    #[test]
    fn repeated_swizzle_not_assignable() {
        let (_, diags) = check_vs1("void main() { vec4 v = vec4(1.0); v.xx = vec2(1.0); }");
        assert!(diags.contains(DiagnosticId::LValueRequired));
    }

    #[test]
    fn array_size_must_be_constant() {
        let (_, diags) = check_vs1("void main() { int n = 3; float a[n]; }");
        assert!(diags.contains(DiagnosticId::ArraySizeMustBeConstant));
    }

    #[test]
    fn array_size_must_be_positive() {
        let (_, diags) = check_vs1("void main() { float a[0]; }");
        assert!(diags.contains(DiagnosticId::ArraySizeMustBePositive));
    }

    #[test]
    fn const_folded_array_size_is_accepted() {
        let (_, diags) = check_vs1("const int N = 2; void main() { float a[N * 2]; }");
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn arrays_of_arrays_gated() {
        let (_, diags) = check_vs1("void main() { float a[2][3]; }");
        assert!(diags.contains(DiagnosticId::ArraysOfArraysNotSupported));
        let (_, diags) = check(
            "#version 310 es\nvoid main() { float a[2][3]; }",
            ShaderVersion::Essl310,
            ShaderStage::Vertex,
        );
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn condition_must_be_boolean() {
        let (_, diags) = check_vs1("void main() { if (1) { } }");
        assert!(diags.contains(DiagnosticId::ConditionNotBoolean));
    }

    #[test]
    fn main_signature_checked() {
        let (_, diags) = check_vs1("float main() { return 1.0; }");
        assert!(diags.contains(DiagnosticId::MainWrongSignature));
    }

    #[test]
    fn fragment_float_needs_precision() {
        let (_, diags) = check(
            "varying vec2 uv; void main() {}",
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        );
        assert!(diags.contains(DiagnosticId::PrecisionNotSpecified));
    }

    #[test]
    fn precision_statement_sets_default() {
        let (_, diags) = check(
            "precision highp float; varying vec2 uv; void main() {}",
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        );
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn const_assignment_rejected() {
        let (_, diags) = check_vs1("void main() { const float x = 1.0; x = 2.0; }");
        assert!(diags.contains(DiagnosticId::LValueRequired));
    }

    #[test]
    fn uniform_assignment_rejected() {
        let (_, diags) = check_vs1("uniform float u; void main() { u = 1.0; }");
        assert!(diags.contains(DiagnosticId::LValueRequired));
    }

    #[test]
    fn readonly_builtin_write_rejected() {
        let (_, diags) = check(
            "precision mediump float; void main() { gl_FragCoord = vec4(0.0); }",
            ShaderVersion::Essl100,
            ShaderStage::Fragment,
        );
        assert!(diags.contains(DiagnosticId::WriteToReadOnlyBuiltin));
    }

    #[test]
    fn int_to_float_conversion_in_initializer() {
        let (_, diags) = check_vs1("void main() { float x = 1; vec2 v = vec2(1, 2); }");
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn incompatible_assignment_rejected() {
        let (_, diags) = check_vs1("void main() { float x = 1.0; bvec2 b = bvec2(true); x = b; }");
        assert!(diags.contains(DiagnosticId::TypeMismatch));
    }

    #[test]
    fn matrix_vector_multiply() {
        let source = "void main() { mat4 m = mat4(1.0); vec4 v = vec4(1.0); vec4 r = m * v; }";
        let (_, diags) = check_vs1(source);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn struct_member_access() {
        let source = "struct Light { vec3 dir; float power; };\
            void main() { Light l = Light(vec3(1.0), 2.0); float p = l.power; }";
        let (_, diags) = check_vs1(source);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn struct_constructor_arity_checked() {
        let source = "struct Light { vec3 dir; float power; };\
            void main() { Light l = Light(vec3(1.0)); }";
        let (_, diags) = check_vs1(source);
        assert!(diags.contains(DiagnosticId::ConstructorWrongArguments));
    }

    #[test]
    fn constructor_component_count_checked() {
        let (_, diags) = check_vs1("void main() { vec3 v = vec3(1.0, 2.0); }");
        assert!(diags.contains(DiagnosticId::ConstructorWrongArguments));
    }

    #[test]
    fn interface_block_members_resolve() {
        let source = "#version 300 es\nlayout(std140) uniform Matrices { mat4 view; } mats;\
            void main() { gl_Position = mats.view * vec4(1.0); }";
        let (module, diags) = check(source, ShaderVersion::Essl300, ShaderStage::Vertex);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
        assert_eq!(module.blocks.len(), 1);
        assert_eq!(module.blocks[0].layout, BlockLayoutKind::Std140);
    }

    #[test]
    fn anonymous_block_members_are_global() {
        let source = "#version 300 es\nuniform Matrices { mat4 view; };\
            void main() { gl_Position = view * vec4(1.0); }";
        let (_, diags) = check(source, ShaderVersion::Essl300, ShaderStage::Vertex);
        assert!(!diags.has_errors(), "log: {}", diags.info_log());
    }

    #[test]
    fn uint_literal_gated_by_version() {
        let (_, diags) = check_vs1("void main() { int x = 1; x = int(2u); }");
        assert!(diags.contains(DiagnosticId::TypeMismatch));
    }

    #[test]
    fn out_param_requires_lvalue() {
        let source = "void set(out float x) { x = 1.0; } void main() { set(2.0); }";
        let (_, diags) = check_vs1(source);
        assert!(diags.contains(DiagnosticId::LValueRequired));
    }

    #[test]
    fn break_outside_loop_reported() {
        let (_, diags) = check_vs1("void main() { break; }");
        assert!(diags.contains(DiagnosticId::SyntaxError));
    }

    #[test]
    fn discard_in_vertex_reported() {
        let (_, diags) = check_vs1("void main() { discard; }");
        assert!(diags.contains(DiagnosticId::SyntaxError));
    }

    #[test]
    fn constant_index_bounds_checked() {
        let (_, diags) = check_vs1("void main() { vec3 v = vec3(1.0); float x = v[3]; }");
        assert!(diags.contains(DiagnosticId::TypeMismatch));
    }
}
