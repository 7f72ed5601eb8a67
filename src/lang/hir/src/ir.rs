//! The typed IR.
//!
//! Every expression node carries its resolved type and lives in the module's
//! arena, addressed by `ExprId`. Optimization passes rewrite nodes in place;
//! nothing here owns memory outside the module, so dropping the module frees
//! the whole compile in one step.

use esslt_arena::{Arena, Handle};
use esslt_shared::{ShaderStage, ShaderVersion, SourceLocation};

use crate::intrinsics::Intrinsic;

/// Basic scalar types
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ScalarType {
    Bool,
    Int,
    UInt,
    Float,
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum Precision {
    Lowp,
    Mediump,
    Highp,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum SamplerType {
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Sampler2DShadow,
    Sampler2DArray,
    SamplerCubeShadow,
}

impl SamplerType {
    pub fn is_shadow(self) -> bool {
        matches!(
            self,
            SamplerType::Sampler2DShadow | SamplerType::SamplerCubeShadow
        )
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct StructId(pub u32);

#[derive(PartialEq, Eq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct GlobalId(pub u32);

#[derive(PartialEq, Eq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub u32);

#[derive(PartialEq, Eq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

#[derive(PartialEq, Eq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct LocalId(pub u32);

pub type ExprId = Handle<ExprNode>;

#[derive(PartialEq, Debug, Clone)]
pub enum TypeLayout {
    Void,
    Scalar(ScalarType),
    Vector(ScalarType, u32),
    /// (columns, rows); float-only in ESSL
    Matrix(u32, u32),
    Sampler(SamplerType),
    Struct(StructId),
    /// `None` is an unsized dimension (only legal in limited positions)
    Array(Box<TypeLayout>, Option<u32>),
    /// A node whose typing failed; an error has already been reported
    Error,
}

impl TypeLayout {
    pub fn to_scalar(&self) -> Option<ScalarType> {
        match *self {
            TypeLayout::Scalar(scalar) | TypeLayout::Vector(scalar, _) => Some(scalar),
            TypeLayout::Matrix(_, _) => Some(ScalarType::Float),
            _ => None,
        }
    }

    pub fn vector_size(&self) -> Option<u32> {
        match *self {
            TypeLayout::Vector(_, x) => Some(x),
            _ => None,
        }
    }

    pub fn component_count(&self) -> u32 {
        match *self {
            TypeLayout::Scalar(_) => 1,
            TypeLayout::Vector(_, x) => x,
            TypeLayout::Matrix(c, r) => c * r,
            _ => 0,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            *self,
            TypeLayout::Scalar(_) | TypeLayout::Vector(_, _) | TypeLayout::Matrix(_, _)
        )
    }

    pub fn is_opaque(&self) -> bool {
        matches!(*self, TypeLayout::Sampler(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(*self, TypeLayout::Array(_, _))
    }

    pub fn is_error(&self) -> bool {
        matches!(*self, TypeLayout::Error)
    }

    /// The type produced by indexing this one.
    pub fn indexed(&self) -> Option<TypeLayout> {
        match *self {
            TypeLayout::Vector(scalar, _) => Some(TypeLayout::Scalar(scalar)),
            TypeLayout::Matrix(_, rows) => Some(TypeLayout::Vector(ScalarType::Float, rows)),
            TypeLayout::Array(ref inner, _) => Some((**inner).clone()),
            _ => None,
        }
    }

    pub fn transform_scalar(self, to_scalar: ScalarType) -> TypeLayout {
        match self {
            TypeLayout::Scalar(_) => TypeLayout::Scalar(to_scalar),
            TypeLayout::Vector(_, x) => TypeLayout::Vector(to_scalar, x),
            other => other,
        }
    }
}

/// A full type: layout plus precision. Cheap value semantics; struct bodies
/// live once in the module's struct table.
#[derive(PartialEq, Debug, Clone)]
pub struct Type {
    pub layout: TypeLayout,
    pub precision: Option<Precision>,
}

impl Type {
    pub fn new(layout: TypeLayout) -> Type {
        Type {
            layout,
            precision: None,
        }
    }

    pub fn with_precision(layout: TypeLayout, precision: Option<Precision>) -> Type {
        Type { layout, precision }
    }

    pub fn void() -> Type {
        Type::new(TypeLayout::Void)
    }

    pub fn error() -> Type {
        Type::new(TypeLayout::Error)
    }

    pub fn float() -> Type {
        Type::new(TypeLayout::Scalar(ScalarType::Float))
    }

    pub fn int() -> Type {
        Type::new(TypeLayout::Scalar(ScalarType::Int))
    }

    pub fn uint() -> Type {
        Type::new(TypeLayout::Scalar(ScalarType::UInt))
    }

    pub fn bool() -> Type {
        Type::new(TypeLayout::Scalar(ScalarType::Bool))
    }

    pub fn vec(size: u32) -> Type {
        Type::new(TypeLayout::Vector(ScalarType::Float, size))
    }

    pub fn is_error(&self) -> bool {
        self.layout.is_error()
    }
}

/// Combines operand precisions: binary op result precision is the highest
/// of the operands; absent precisions do not lower the result.
pub fn higher_precision(a: Option<Precision>, b: Option<Precision>) -> Option<Precision> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Literal {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
}

impl Literal {
    pub fn scalar_type(&self) -> ScalarType {
        match *self {
            Literal::Bool(_) => ScalarType::Bool,
            Literal::Int(_) => ScalarType::Int,
            Literal::UInt(_) => ScalarType::UInt,
            Literal::Float(_) => ScalarType::Float,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    LeftShift,
    RightShift,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Equality,
    Inequality,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UnaryOp {
    Plus,
    Minus,
    LogicalNot,
    BitwiseNot,
    PrefixIncrement,
    PrefixDecrement,
    PostfixIncrement,
    PostfixDecrement,
}

impl UnaryOp {
    pub fn is_increment_or_decrement(self) -> bool {
        matches!(
            self,
            UnaryOp::PrefixIncrement
                | UnaryOp::PrefixDecrement
                | UnaryOp::PostfixIncrement
                | UnaryOp::PostfixDecrement
        )
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SwizzleComponent {
    X,
    Y,
    Z,
    W,
}

impl SwizzleComponent {
    pub fn offset(self) -> u32 {
        match self {
            SwizzleComponent::X => 0,
            SwizzleComponent::Y => 1,
            SwizzleComponent::Z => 2,
            SwizzleComponent::W => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SwizzleComponent::X => "x",
            SwizzleComponent::Y => "y",
            SwizzleComponent::Z => "z",
            SwizzleComponent::W => "w",
        }
    }
}

/// Special variables the language pre-declares per stage.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BuiltinVar {
    Position,
    PointSize,
    FragCoord,
    FrontFacing,
    PointCoord,
    FragColor,
    FragData,
    FragDepth,
    VertexId,
    InstanceId,
}

impl BuiltinVar {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinVar::Position => "gl_Position",
            BuiltinVar::PointSize => "gl_PointSize",
            BuiltinVar::FragCoord => "gl_FragCoord",
            BuiltinVar::FrontFacing => "gl_FrontFacing",
            BuiltinVar::PointCoord => "gl_PointCoord",
            BuiltinVar::FragColor => "gl_FragColor",
            BuiltinVar::FragData => "gl_FragData",
            BuiltinVar::FragDepth => "gl_FragDepth",
            BuiltinVar::VertexId => "gl_VertexID",
            BuiltinVar::InstanceId => "gl_InstanceID",
        }
    }

    pub fn is_writable(self, stage: ShaderStage) -> bool {
        match (self, stage) {
            (BuiltinVar::Position, ShaderStage::Vertex) => true,
            (BuiltinVar::PointSize, ShaderStage::Vertex) => true,
            (BuiltinVar::FragColor, ShaderStage::Fragment) => true,
            (BuiltinVar::FragData, ShaderStage::Fragment) => true,
            (BuiltinVar::FragDepth, ShaderStage::Fragment) => true,
            _ => false,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Local(LocalId),
    Global(GlobalId),
    /// A member of an interface block, by field index
    BlockMember(BlockId, usize),
    Builtin(BuiltinVar),
    Unary(UnaryOp, ExprId),
    Binary(BinOp, ExprId, ExprId),
    Ternary(ExprId, ExprId, ExprId),
    /// `Some(op)` for compound assignment, `None` for plain `=`
    Assign(Option<BinOp>, ExprId, ExprId),
    Swizzle(ExprId, Vec<SwizzleComponent>),
    /// Struct member access by field index
    Member(ExprId, usize),
    Index(ExprId, ExprId),
    Call(FunctionId, Vec<ExprId>),
    Intrinsic(Intrinsic, Vec<ExprId>),
    Constructor(TypeLayout, Vec<ExprId>),
    Comma(ExprId, ExprId),
    /// Placeholder for an expression whose typing failed
    Error,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub ty: Type,
    pub loc: SourceLocation,
}

#[derive(PartialEq, Debug, Clone)]
pub struct VarDef {
    pub id: LocalId,
    pub init: Option<ExprId>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ForInit {
    Empty,
    Expression(ExprId),
    Definition(Vec<VarDef>),
}

#[derive(PartialEq, Debug, Clone)]
pub enum CaseLabel {
    Case(ExprId),
    Default,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SwitchCase {
    pub label: CaseLabel,
    pub statements: Vec<Statement>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Statement {
    Expression(ExprId),
    Var(VarDef),
    Block(Vec<Statement>),
    If(ExprId, Vec<Statement>, Option<Vec<Statement>>),
    For(ForInit, Option<ExprId>, Option<ExprId>, Vec<Statement>),
    While(ExprId, Vec<Statement>),
    DoWhile(Vec<Statement>, ExprId),
    Switch(ExprId, Vec<SwitchCase>),
    Return(Option<ExprId>),
    Break,
    Continue,
    Discard,
    /// Runtime check injected at the top of loops whose termination could
    /// not be proven statically
    ForwardProgressGuard,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum GlobalStorage {
    Const,
    /// Vertex attribute / `in`
    Input,
    /// Varying / `out`
    Output,
    Uniform,
    /// Global with no storage qualifier, private to the shader
    Plain,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Interpolation {
    Flat,
    Smooth,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: Type,
    pub storage: GlobalStorage,
    pub interpolation: Option<Interpolation>,
    pub invariant: bool,
    pub centroid: bool,
    pub location: Option<u32>,
    pub init: Option<ExprId>,
    /// Set by the typer when the variable is referenced anywhere
    pub static_use: bool,
    /// std140 offset in the default uniform block, set by the layout pass
    pub block_offset: Option<u32>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
}

#[derive(PartialEq, Debug, Clone)]
pub struct StructDefinition {
    pub name: String,
    pub members: Vec<StructMember>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BlockLayoutKind {
    Shared,
    Packed,
    Std140,
}

impl BlockLayoutKind {
    pub fn name(self) -> &'static str {
        match self {
            BlockLayoutKind::Shared => "shared",
            BlockLayoutKind::Packed => "packed",
            BlockLayoutKind::Std140 => "std140",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct BlockField {
    pub name: String,
    pub ty: Type,
    /// Filled in by the layout pass
    pub offset: Option<u32>,
    pub array_stride: Option<u32>,
    pub matrix_stride: Option<u32>,
    /// The target cannot express this field's wire layout natively and the
    /// emitter must wrap it in an alignment-padded carrier
    pub needs_carrier: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct InterfaceBlock {
    pub name: String,
    pub instance_name: Option<String>,
    pub fields: Vec<BlockField>,
    pub layout: BlockLayoutKind,
    pub row_major: bool,
    pub binding: Option<u32>,
    /// Total std140 size, set by the layout pass
    pub data_size: Option<u32>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub direction: ParamDirection,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Local {
    pub name: String,
    pub ty: Type,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Param>,
    /// All locals of the function, indexed by `LocalId`; parameters occupy
    /// the first `params.len()` slots
    pub locals: Vec<Local>,
    pub body: Vec<Statement>,
    /// Prototype only; kept for diagnostics but never emitted without a body
    pub defined: bool,
}

/// Emission order of top-level constructs, preserved from the source.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RootDefinition {
    Struct(StructId),
    Global(GlobalId),
    Block(BlockId),
    Function(FunctionId),
}

/// Planned sampler/texture split for targets with separate objects.
#[derive(PartialEq, Debug, Clone)]
pub struct SamplerSplit {
    pub global: GlobalId,
    pub texture_name: String,
    pub sampler_name: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Module {
    pub version: ShaderVersion,
    pub stage: ShaderStage,
    pub exprs: Arena<ExprNode>,
    pub structs: Vec<StructDefinition>,
    pub globals: Vec<GlobalVariable>,
    pub functions: Vec<FunctionDefinition>,
    pub blocks: Vec<InterfaceBlock>,
    pub root_order: Vec<RootDefinition>,
    pub sampler_splits: Vec<SamplerSplit>,
    /// Builtins re-declared `invariant` at global scope
    pub invariant_builtins: Vec<BuiltinVar>,
    /// Total std140 size of the default uniform block, set by the layout pass
    pub default_block_size: u32,
}

impl Module {
    pub fn new(version: ShaderVersion, stage: ShaderStage) -> Module {
        Module {
            version,
            stage,
            exprs: Arena::new(),
            structs: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            blocks: Vec::new(),
            root_order: Vec::new(),
            sampler_splits: Vec::new(),
            invariant_builtins: Vec::new(),
            default_block_size: 0,
        }
    }

    pub fn alloc_expr(&mut self, kind: ExprKind, ty: Type, loc: SourceLocation) -> ExprId {
        self.exprs.alloc(ExprNode { kind, ty, loc })
    }

    pub fn expr(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id]
    }

    pub fn expr_type(&self, id: ExprId) -> &Type {
        &self.exprs[id].ty
    }

    pub fn struct_def(&self, id: StructId) -> &StructDefinition {
        &self.structs[id.0 as usize]
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.0 as usize]
    }

    pub fn global_mut(&mut self, id: GlobalId) -> &mut GlobalVariable {
        &mut self.globals[id.0 as usize]
    }

    pub fn function(&self, id: FunctionId) -> &FunctionDefinition {
        &self.functions[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &InterfaceBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn main_function(&self) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == "main" && f.defined)
            .map(|i| FunctionId(i as u32))
    }

    /// Whether the expression is a constant expression: literals, constant
    /// globals and pure operators over them.
    pub fn is_const_expr(&self, id: ExprId) -> bool {
        match self.exprs[id].kind {
            ExprKind::Literal(_) => true,
            ExprKind::Global(global) => {
                let g = self.global(global);
                g.storage == GlobalStorage::Const && g.init.is_some_and(|init| self.is_const_expr(init))
            }
            ExprKind::Unary(_, inner) => self.is_const_expr(inner),
            ExprKind::Binary(_, lhs, rhs) => self.is_const_expr(lhs) && self.is_const_expr(rhs),
            ExprKind::Ternary(cond, a, b) => {
                self.is_const_expr(cond) && self.is_const_expr(a) && self.is_const_expr(b)
            }
            ExprKind::Swizzle(base, _) | ExprKind::Member(base, _) => self.is_const_expr(base),
            ExprKind::Index(base, index) => self.is_const_expr(base) && self.is_const_expr(index),
            ExprKind::Constructor(_, ref args) => {
                args.iter().all(|&arg| self.is_const_expr(arg))
            }
            ExprKind::Comma(_, rhs) => self.is_const_expr(rhs),
            _ => false,
        }
    }

    /// Evaluates an integer constant expression. `None` when the expression
    /// is not constant or not integral.
    pub fn eval_const_int(&self, id: ExprId) -> Option<i64> {
        match self.exprs[id].kind {
            ExprKind::Literal(Literal::Int(v)) => Some(v as i64),
            ExprKind::Literal(Literal::UInt(v)) => Some(v as i64),
            ExprKind::Global(global) => {
                let g = self.global(global);
                if g.storage == GlobalStorage::Const {
                    g.init.and_then(|init| self.eval_const_int(init))
                } else {
                    None
                }
            }
            ExprKind::Unary(op, inner) => {
                let value = self.eval_const_int(inner)?;
                match op {
                    UnaryOp::Plus => Some(value),
                    UnaryOp::Minus => Some(value.wrapping_neg()),
                    UnaryOp::BitwiseNot => Some(!value),
                    UnaryOp::LogicalNot => Some((value == 0) as i64),
                    _ => None,
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let a = self.eval_const_int(lhs)?;
                let b = self.eval_const_int(rhs)?;
                match op {
                    BinOp::Add => Some(a.wrapping_add(b)),
                    BinOp::Subtract => Some(a.wrapping_sub(b)),
                    BinOp::Multiply => Some(a.wrapping_mul(b)),
                    BinOp::Divide if b != 0 => Some(a.wrapping_div(b)),
                    BinOp::Modulus if b != 0 => Some(a.wrapping_rem(b)),
                    BinOp::LeftShift => Some(a.wrapping_shl((b & 63) as u32)),
                    BinOp::RightShift => Some(a.wrapping_shr((b & 63) as u32)),
                    BinOp::BitwiseAnd => Some(a & b),
                    BinOp::BitwiseOr => Some(a | b),
                    BinOp::BitwiseXor => Some(a ^ b),
                    _ => None,
                }
            }
            ExprKind::Ternary(cond, a, b) => {
                let cond = self.eval_const_bool(cond)?;
                self.eval_const_int(if cond { a } else { b })
            }
            ExprKind::Comma(_, rhs) => self.eval_const_int(rhs),
            _ => None,
        }
    }

    pub fn eval_const_bool(&self, id: ExprId) -> Option<bool> {
        match self.exprs[id].kind {
            ExprKind::Literal(Literal::Bool(v)) => Some(v),
            ExprKind::Unary(UnaryOp::LogicalNot, inner) => Some(!self.eval_const_bool(inner)?),
            ExprKind::Binary(op, lhs, rhs) => match op {
                BinOp::LogicalAnd => Some(self.eval_const_bool(lhs)? && self.eval_const_bool(rhs)?),
                BinOp::LogicalOr => Some(self.eval_const_bool(lhs)? || self.eval_const_bool(rhs)?),
                BinOp::LogicalXor => Some(self.eval_const_bool(lhs)? != self.eval_const_bool(rhs)?),
                BinOp::LessThan => Some(self.eval_const_int(lhs)? < self.eval_const_int(rhs)?),
                BinOp::GreaterThan => Some(self.eval_const_int(lhs)? > self.eval_const_int(rhs)?),
                BinOp::LessEqual => Some(self.eval_const_int(lhs)? <= self.eval_const_int(rhs)?),
                BinOp::GreaterEqual => Some(self.eval_const_int(lhs)? >= self.eval_const_int(rhs)?),
                BinOp::Equality => Some(self.eval_const_int(lhs)? == self.eval_const_int(rhs)?),
                BinOp::Inequality => Some(self.eval_const_int(lhs)? != self.eval_const_int(rhs)?),
                _ => None,
            },
            ExprKind::Global(global) => {
                let g = self.global(global);
                if g.storage == GlobalStorage::Const {
                    g.init.and_then(|init| self.eval_const_bool(init))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Spelled-out type name, used by the IR dump and diagnostics.
    pub fn type_name(&self, layout: &TypeLayout) -> String {
        match *layout {
            TypeLayout::Void => "void".to_string(),
            TypeLayout::Scalar(ScalarType::Bool) => "bool".to_string(),
            TypeLayout::Scalar(ScalarType::Int) => "int".to_string(),
            TypeLayout::Scalar(ScalarType::UInt) => "uint".to_string(),
            TypeLayout::Scalar(ScalarType::Float) => "float".to_string(),
            TypeLayout::Vector(scalar, x) => {
                let prefix = match scalar {
                    ScalarType::Bool => "bvec",
                    ScalarType::Int => "ivec",
                    ScalarType::UInt => "uvec",
                    ScalarType::Float => "vec",
                };
                format!("{}{}", prefix, x)
            }
            TypeLayout::Matrix(c, r) if c == r => format!("mat{}", c),
            TypeLayout::Matrix(c, r) => format!("mat{}x{}", c, r),
            TypeLayout::Sampler(sampler) => match sampler {
                SamplerType::Sampler2D => "sampler2D",
                SamplerType::Sampler3D => "sampler3D",
                SamplerType::SamplerCube => "samplerCube",
                SamplerType::Sampler2DShadow => "sampler2DShadow",
                SamplerType::Sampler2DArray => "sampler2DArray",
                SamplerType::SamplerCubeShadow => "samplerCubeShadow",
            }
            .to_string(),
            TypeLayout::Struct(id) => self.struct_def(id).name.clone(),
            TypeLayout::Array(ref inner, size) => match size {
                Some(n) => format!("{}[{}]", self.type_name(inner), n),
                None => format!("{}[]", self.type_name(inner)),
            },
            TypeLayout::Error => "<error>".to_string(),
        }
    }
}
