//! Turns preprocessed text into a token stream.
//!
//! Locations come from the preprocessor's per-line table, never from the
//! flattened text itself. An unrecognized character is reported, skipped and
//! lexing continues.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, digit1, hex_digit1, oct_digit0};
use nom::combinator::{map, opt, recognize};
use nom::sequence::{pair, preceded, tuple};
use nom::IResult;

use esslt_lang_tok::{Identifier, LexToken, Token, Tokens};
use esslt_shared::{DiagnosticId, Diagnostics};
use esslt_transform_preprocess::PreprocessedText;

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Keywords that produce their own token.
fn keyword(word: &str) -> Option<Token> {
    let token = match word {
        "true" => Token::True,
        "false" => Token::False,
        "if" => Token::If,
        "else" => Token::Else,
        "for" => Token::For,
        "while" => Token::While,
        "do" => Token::Do,
        "switch" => Token::Switch,
        "case" => Token::Case,
        "default" => Token::Default,
        "return" => Token::Return,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "discard" => Token::Discard,
        "struct" => Token::Struct,
        "precision" => Token::Precision,
        "layout" => Token::Layout,
        "invariant" => Token::Invariant,
        "attribute" => Token::Attribute,
        "varying" => Token::Varying,
        "uniform" => Token::Uniform,
        "const" => Token::Const,
        "in" => Token::In,
        "out" => Token::Out,
        "inout" => Token::InOut,
        "centroid" => Token::Centroid,
        "flat" => Token::Flat,
        "smooth" => Token::Smooth,
        "lowp" => Token::Lowp,
        "mediump" => Token::Mediump,
        "highp" => Token::Highp,
        _ => return None,
    };
    Some(token)
}

/// Keywords the language reserves but never uses. The parser reports them;
/// the lexer only tags them.
const RESERVED_WORDS: &[&str] = &[
    "asm", "class", "union", "enum", "typedef", "template", "this", "packed", "goto", "inline",
    "noinline", "volatile", "public", "static", "extern", "external", "interface", "long", "short",
    "double", "half", "fixed", "unsigned", "superp", "input", "output", "sizeof", "cast",
    "namespace", "using",
];

fn word(input: &str) -> IResult<&str, Token> {
    let (rest, name) = recognize(pair(
        take_while1(is_ident_start),
        take_while(is_ident_char),
    ))(input)?;
    // take_while1 accepts runs; constrain the start to a single char class
    if !name.chars().next().is_some_and(is_ident_start) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Alpha,
        )));
    }
    let token = match keyword(name) {
        Some(token) => token,
        None if RESERVED_WORDS.contains(&name) => Token::ReservedWord(name.to_string()),
        None => Token::Id(Identifier(name.to_string())),
    };
    Ok((rest, token))
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        alt((char('e'), char('E'))),
        opt(alt((char('+'), char('-')))),
        digit1,
    )))(input)
}

/// Float literal forms: `1.0`, `.5`, `1.`, `1e3`, `1.5e-3`, with an optional
/// `f` suffix.
fn literal_float(input: &str) -> IResult<&str, Token> {
    let (rest, text) = alt((
        recognize(tuple((digit1, char('.'), take_while(|c: char| c.is_ascii_digit()), opt(exponent)))),
        recognize(tuple((char('.'), digit1, opt(exponent)))),
        recognize(pair(digit1, exponent)),
    ))(input)?;
    let (rest, _) = opt(alt((char('f'), char('F'))))(rest)?;
    match text.parse::<f64>() {
        Ok(value) => Ok((rest, Token::LiteralFloat(value))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

enum IntParse {
    Value(u64),
    OutOfRange,
}

fn int_digits(input: &str) -> IResult<&str, IntParse> {
    let hex = map(preceded(alt((tag("0x"), tag("0X"))), hex_digit1), |d: &str| {
        match u64::from_str_radix(d, 16) {
            Ok(v) => IntParse::Value(v),
            Err(_) => IntParse::OutOfRange,
        }
    });
    let octal = map(preceded(char('0'), oct_digit0), |d: &str| {
        if d.is_empty() {
            IntParse::Value(0)
        } else {
            match u64::from_str_radix(d, 8) {
                Ok(v) => IntParse::Value(v),
                Err(_) => IntParse::OutOfRange,
            }
        }
    });
    let decimal = map(digit1, |d: &str| match d.parse::<u64>() {
        Ok(v) => IntParse::Value(v),
        Err(_) => IntParse::OutOfRange,
    });
    alt((hex, octal, decimal))(input)
}

fn literal_int(input: &str) -> IResult<&str, (IntParse, bool)> {
    let (rest, value) = int_digits(input)?;
    let (rest, suffix) = opt(alt((char('u'), char('U'))))(rest)?;
    Ok((rest, (value, suffix.is_some())))
}

const PUNCTUATION: &[(&str, Token)] = &[
    ("<<=", Token::LeftShiftEquals),
    (">>=", Token::RightShiftEquals),
    ("<<", Token::LeftShift),
    (">>", Token::RightShift),
    ("<=", Token::LessEquals),
    (">=", Token::GreaterEquals),
    ("==", Token::DoubleEquals),
    ("!=", Token::ExclamationEquals),
    ("&&", Token::DoubleAmpersand),
    ("||", Token::DoubleVerticalBar),
    ("^^", Token::DoubleHat),
    ("+=", Token::PlusEquals),
    ("-=", Token::MinusEquals),
    ("*=", Token::AsterixEquals),
    ("/=", Token::ForwardSlashEquals),
    ("%=", Token::PercentEquals),
    ("&=", Token::AmpersandEquals),
    ("|=", Token::VerticalBarEquals),
    ("^=", Token::HatEquals),
    ("++", Token::DoublePlus),
    ("--", Token::DoubleMinus),
    ("{", Token::LeftBrace),
    ("}", Token::RightBrace),
    ("(", Token::LeftParen),
    (")", Token::RightParen),
    ("[", Token::LeftSquareBracket),
    ("]", Token::RightSquareBracket),
    (";", Token::Semicolon),
    (",", Token::Comma),
    ("?", Token::QuestionMark),
    (":", Token::Colon),
    (".", Token::Period),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("/", Token::ForwardSlash),
    ("%", Token::Percent),
    ("*", Token::Asterix),
    ("|", Token::VerticalBar),
    ("&", Token::Ampersand),
    ("^", Token::Hat),
    ("=", Token::Equals),
    ("!", Token::ExclamationPoint),
    ("~", Token::Tilde),
    ("<", Token::LeftAngleBracket),
    (">", Token::RightAngleBracket),
];

fn punctuation(input: &str) -> IResult<&str, Token> {
    for (text, token) in PUNCTUATION {
        if let Some(rest) = input.strip_prefix(text) {
            return Ok((rest, token.clone()));
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Tag,
    )))
}

/// Lexes the whole preprocessed text. Every token carries the location of
/// the source line it came from.
pub fn lex(text: &PreprocessedText, diagnostics: &mut Diagnostics) -> Tokens {
    let code: &str = &text.code;
    let mut stream = Vec::new();
    let mut rest = code;
    let mut line = 0usize;

    loop {
        // Whitespace separates tokens; newlines advance the line table
        let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() && c != '\n');
        let (after_newlines, newlines) = {
            let mut r = trimmed;
            let mut n = 0;
            while let Some(next) = r.strip_prefix('\n') {
                r = next.trim_start_matches(|c: char| c.is_ascii_whitespace() && c != '\n');
                n += 1;
            }
            (r, n)
        };
        line += newlines;
        rest = after_newlines;
        if rest.is_empty() {
            break;
        }
        let loc = text.location_of_line(line);

        if let Ok((next, token)) = literal_float(rest) {
            stream.push(LexToken(token, loc));
            rest = next;
            continue;
        }
        if let Ok((next, (value, unsigned))) = literal_int(rest) {
            let token = match (value, unsigned) {
                (IntParse::Value(v), false) if v <= u32::MAX as u64 => Token::LiteralInt(v as u32),
                (IntParse::Value(v), true) if v <= u32::MAX as u64 => Token::LiteralUInt(v as u32),
                _ => {
                    diagnostics.report(
                        DiagnosticId::LiteralOutOfRange,
                        loc,
                        "integer literal out of range",
                    );
                    Token::LiteralInt(0)
                }
            };
            stream.push(LexToken(token, loc));
            rest = next;
            continue;
        }
        if let Ok((next, token)) = word(rest) {
            stream.push(LexToken(token, loc));
            rest = next;
            continue;
        }
        if let Ok((next, token)) = punctuation(rest) {
            stream.push(LexToken(token, loc));
            rest = next;
            continue;
        }

        let bad = rest.chars().next().unwrap();
        diagnostics.report(
            DiagnosticId::InvalidCharacter,
            loc,
            format!("'{}' : invalid character", bad),
        );
        rest = &rest[bad.len_utf8()..];
    }

    let end = text.location_of_line(text.lines.len().saturating_sub(1));
    stream.push(LexToken(Token::Eof, end));
    Tokens { stream }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_shared::SourceLocation;

    fn lex_str(code: &str) -> (Vec<Token>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let text = PreprocessedText {
            code: code.to_string(),
            lines: code
                .split('\n')
                .enumerate()
                .map(|(i, _)| SourceLocation::new(0, i as u32 + 1))
                .collect(),
        };
        let tokens = lex(&text, &mut diagnostics);
        (
            tokens.stream.into_iter().map(|LexToken(t, _)| t).collect(),
            diagnostics,
        )
    }

    #[test]
    fn keywords_and_identifiers() {
        let (tokens, diags) = lex_str("uniform float x;");
        assert!(!diags.has_errors());
        assert_eq!(
            tokens,
            vec![
                Token::Uniform,
                Token::Id(Identifier("float".to_string())),
                Token::Id(Identifier("x".to_string())),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn float_forms() {
        let (tokens, diags) = lex_str("1.0 .5 2. 1e3 1.5e-3 3.0f");
        assert!(!diags.has_errors());
        assert_eq!(
            tokens,
            vec![
                Token::LiteralFloat(1.0),
                Token::LiteralFloat(0.5),
                Token::LiteralFloat(2.0),
                Token::LiteralFloat(1000.0),
                Token::LiteralFloat(0.0015),
                Token::LiteralFloat(3.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn int_forms() {
        let (tokens, diags) = lex_str("42 0x1F 017 7u 0");
        assert!(!diags.has_errors());
        assert_eq!(
            tokens,
            vec![
                Token::LiteralInt(42),
                Token::LiteralInt(31),
                Token::LiteralInt(15),
                Token::LiteralUInt(7),
                Token::LiteralInt(0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn out_of_range_literal_reported() {
        let (tokens, diags) = lex_str("4294967296");
        assert!(diags.contains(DiagnosticId::LiteralOutOfRange));
        assert_eq!(tokens[0], Token::LiteralInt(0));
    }

    #[test]
    fn operators_longest_match() {
        let (tokens, diags) = lex_str("a <<= b << c <= d");
        assert!(!diags.has_errors());
        assert_eq!(tokens[1], Token::LeftShiftEquals);
        assert_eq!(tokens[3], Token::LeftShift);
        assert_eq!(tokens[5], Token::LessEquals);
    }

    #[test]
    fn reserved_words_tagged() {
        let (tokens, diags) = lex_str("goto");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0], Token::ReservedWord("goto".to_string()));
    }

    #[test]
    fn invalid_character_skipped() {
        let (tokens, diags) = lex_str("int $ x");
        assert!(diags.contains(DiagnosticId::InvalidCharacter));
        assert_eq!(tokens.len(), 3); // int, x, eof
    }

    #[test]
    fn locations_follow_lines() {
        let mut diagnostics = Diagnostics::new();
        let text = PreprocessedText {
            code: "int a;\nint b;\n".to_string(),
            lines: vec![SourceLocation::new(0, 10), SourceLocation::new(0, 20)],
        };
        let tokens = lex(&text, &mut diagnostics);
        assert_eq!(tokens.stream[0].1, SourceLocation::new(0, 10));
        assert_eq!(tokens.stream[3].1, SourceLocation::new(0, 20));
    }
}
