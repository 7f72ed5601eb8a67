use esslt_shared::SourceLocation;

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Identifier(pub String);

/// One preprocessed lexical unit.
#[derive(PartialEq, Debug, Clone)]
pub enum Token {
    Eof, // Marks the end of a stream

    Id(Identifier),
    LiteralInt(u32),
    LiteralUInt(u32),
    LiteralFloat(f64),
    True,
    False,

    /// A keyword reserved by the language but never valid in a program
    /// (e.g. `goto`, `typedef`). Reported by the parser, not the lexer, so
    /// lexing can keep going.
    ReservedWord(String),

    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftSquareBracket,
    RightSquareBracket,
    Semicolon,
    Comma,
    QuestionMark,
    Colon,
    Period,

    Plus,
    Minus,
    ForwardSlash,
    Percent,
    Asterix,
    VerticalBar,
    Ampersand,
    Hat,
    Equals,
    ExclamationPoint,
    Tilde,
    LeftAngleBracket,
    RightAngleBracket,

    DoubleEquals,
    ExclamationEquals,
    LessEquals,
    GreaterEquals,
    DoubleAmpersand,
    DoubleVerticalBar,
    DoubleHat,
    LeftShift,
    RightShift,
    DoublePlus,
    DoubleMinus,

    PlusEquals,
    MinusEquals,
    AsterixEquals,
    ForwardSlashEquals,
    PercentEquals,
    LeftShiftEquals,
    RightShiftEquals,
    AmpersandEquals,
    VerticalBarEquals,
    HatEquals,

    If,
    Else,
    For,
    While,
    Do,
    Switch,
    Case,
    Default,
    Return,
    Break,
    Continue,
    Discard,

    Struct,
    Precision,
    Layout,
    Invariant,

    Attribute,
    Varying,
    Uniform,
    Const,
    In,
    Out,
    InOut,
    Centroid,
    Flat,
    Smooth,

    Lowp,
    Mediump,
    Highp,
}

impl Token {
    /// Spelling used in diagnostics.
    pub fn describe(&self) -> String {
        match *self {
            Token::Eof => "<end of file>".to_string(),
            Token::Id(Identifier(ref name)) => name.clone(),
            Token::LiteralInt(v) => v.to_string(),
            Token::LiteralUInt(v) => format!("{}u", v),
            Token::LiteralFloat(v) => v.to_string(),
            Token::ReservedWord(ref word) => word.clone(),
            ref other => format!("{:?}", other),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct LexToken(pub Token, pub SourceLocation);

impl LexToken {
    pub fn with_no_loc(token: Token) -> LexToken {
        LexToken(token, SourceLocation::none())
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Tokens {
    pub stream: Vec<LexToken>,
}
