//! Untyped syntax tree produced by the parser.
//!
//! This mirrors source shape: qualifiers are kept as written and no name
//! resolution or typing has happened yet. The typer turns this into the
//! typed IR.

use esslt_shared::Located;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Scalar {
    Bool,
    Int,
    UInt,
    Float,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Precision {
    Lowp,
    Mediump,
    Highp,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SamplerKind {
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Sampler2DShadow,
    Sampler2DArray,
    SamplerCubeShadow,
}

#[derive(PartialEq, Debug, Clone)]
pub enum TypeSpecifier {
    Void,
    Scalar(Scalar),
    Vector(Scalar, u32),
    /// Matrices are float-only in ESSL; (columns, rows)
    Matrix(u32, u32),
    Sampler(SamplerKind),
    /// Reference to a previously declared struct type
    Named(String),
    /// Inline struct definition in a declaration
    Struct(StructDefinition),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum StorageQualifier {
    Const,
    Attribute,
    Varying,
    Uniform,
    In,
    Out,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Interpolation {
    Flat,
    Smooth,
}

/// The contents of a `layout(...)` qualifier, uninterpreted name/value pairs.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct LayoutQualifier(pub Vec<(String, Option<i32>)>);

impl LayoutQualifier {
    pub fn find(&self, name: &str) -> Option<Option<i32>> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }
}

/// A fully qualified type as written at a declaration.
#[derive(PartialEq, Debug, Clone)]
pub struct TypeName {
    pub layout: Option<LayoutQualifier>,
    pub invariant: bool,
    pub interpolation: Option<Interpolation>,
    pub centroid: bool,
    pub storage: Option<StorageQualifier>,
    pub precision: Option<Precision>,
    pub specifier: TypeSpecifier,
    /// `float[2] x;` style array suffix on the type itself
    pub array_sizes: Vec<Option<Located<Expression>>>,
}

impl TypeName {
    pub fn from_specifier(specifier: TypeSpecifier) -> TypeName {
        TypeName {
            layout: None,
            invariant: false,
            interpolation: None,
            centroid: false,
            storage: None,
            precision: None,
            specifier,
            array_sizes: Vec::new(),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Literal {
    Bool(bool),
    Int(u32),
    UInt(u32),
    Float(f64),
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

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AssignOp {
    Assign,
    SumAssign,
    DifferenceAssign,
    ProductAssign,
    QuotientAssign,
    RemainderAssign,
    LeftShiftAssign,
    RightShiftAssign,
    AndAssign,
    OrAssign,
    XorAssign,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Ident(String),
    Unary(UnaryOp, Box<Located<Expression>>),
    Binary(BinOp, Box<Located<Expression>>, Box<Located<Expression>>),
    Ternary(
        Box<Located<Expression>>,
        Box<Located<Expression>>,
        Box<Located<Expression>>,
    ),
    Assignment(AssignOp, Box<Located<Expression>>, Box<Located<Expression>>),
    /// Function call or constructor; the callee in ESSL is always a name
    Call(String, Vec<Located<Expression>>),
    Member(Box<Located<Expression>>, String),
    Index(Box<Located<Expression>>, Box<Located<Expression>>),
    Comma(Box<Located<Expression>>, Box<Located<Expression>>),
}

/// One `name[sizes] = init` element of an init-declarator list.
#[derive(PartialEq, Debug, Clone)]
pub struct InitDeclarator {
    pub name: Located<String>,
    /// Outermost first; `None` is an unsized dimension
    pub array_sizes: Vec<Option<Located<Expression>>>,
    pub init: Option<Located<Expression>>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct VarDef {
    pub ty: TypeName,
    pub declarators: Vec<InitDeclarator>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MemberDeclarator {
    pub name: Located<String>,
    pub array_sizes: Vec<Option<Located<Expression>>>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct StructMember {
    pub ty: TypeName,
    pub declarators: Vec<MemberDeclarator>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct StructDefinition {
    pub name: Option<Located<String>>,
    pub members: Vec<StructMember>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FunctionParam {
    pub direction: Option<ParamDirection>,
    pub ty: TypeName,
    pub name: Option<Located<String>>,
    pub array_sizes: Vec<Option<Located<Expression>>>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FunctionDefinition {
    pub returntype: TypeName,
    pub name: Located<String>,
    pub params: Vec<FunctionParam>,
    /// `None` for a prototype
    pub body: Option<Vec<Statement>>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ForInit {
    Empty,
    Expression(Located<Expression>),
    Definition(VarDef),
}

#[derive(PartialEq, Debug, Clone)]
pub enum CaseLabel {
    Case(Located<Expression>),
    Default,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SwitchCase {
    pub label: CaseLabel,
    pub statements: Vec<Statement>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Statement {
    Empty,
    Expression(Located<Expression>),
    Var(VarDef),
    /// Default precision statement scoped to the enclosing block
    Precision(Precision, Located<TypeSpecifier>),
    Block(Vec<Statement>),
    If(
        Located<Expression>,
        Box<Statement>,
        Option<Box<Statement>>,
    ),
    For(
        ForInit,
        Option<Located<Expression>>,
        Option<Located<Expression>>,
        Box<Statement>,
    ),
    While(Located<Expression>, Box<Statement>),
    DoWhile(Box<Statement>, Located<Expression>),
    Switch(Located<Expression>, Vec<SwitchCase>),
    Return(Option<Located<Expression>>),
    Break,
    Continue,
    Discard,
}

#[derive(PartialEq, Debug, Clone)]
pub struct InterfaceBlockDef {
    pub layout: Option<LayoutQualifier>,
    pub storage: StorageQualifier,
    pub name: Located<String>,
    pub members: Vec<StructMember>,
    pub instance: Option<(Located<String>, Vec<Option<Located<Expression>>>)>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum RootDefinition {
    Struct(StructDefinition),
    Var(VarDef),
    Function(FunctionDefinition),
    Block(InterfaceBlockDef),
    Precision(Precision, TypeSpecifier),
    /// `invariant gl_Position;` style re-declaration
    InvariantRedeclaration(Located<String>),
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct TranslationUnit {
    pub defs: Vec<Located<RootDefinition>>,
}
