//! Integer constant expression evaluator for `#if` / `#elif`.
//!
//! Operates on already macro-expanded text. Arithmetic wraps at 64 bits;
//! identifiers that survive expansion evaluate to zero.

use thiserror::Error;

#[derive(PartialEq, Eq, Debug, Clone, Error)]
pub enum ConditionError {
    #[error("'{0}' : invalid expression")]
    Invalid(String),
    #[error("division by zero in constant expression")]
    DivisionByZero,
}

#[derive(PartialEq, Debug, Clone)]
enum CTok {
    Int(i64),
    Punct(&'static str),
}

const PUNCTS: &[&str] = &[
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "%", "(", ")", "!", "~",
    "<", ">", "&", "|", "^", "?", ":",
];

fn tokenize(text: &str) -> Result<Vec<CTok>, ConditionError> {
    let mut toks = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    'outer: while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let (radix, digits_from) = if c == '0' && i + 1 < bytes.len() {
                match bytes[i + 1] as char {
                    'x' | 'X' => (16, i + 2),
                    _ => (8, i + 1),
                }
            } else {
                (10, i)
            };
            i = digits_from.max(start + 1);
            if radix == 16 {
                i = digits_from;
                while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
                    i += 1;
                }
            } else {
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
            }
            let digits = &text[digits_from..i];
            // A bare `0` parses as octal with no digits
            let value = if digits.is_empty() {
                0
            } else {
                i64::from_str_radix(digits, radix)
                    .map_err(|_| ConditionError::Invalid(text[start..i].to_string()))?
            };
            // Optional unsigned suffix
            if i < bytes.len() && matches!(bytes[i] as char, 'u' | 'U') {
                i += 1;
            }
            toks.push(CTok::Int(value));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            while i < bytes.len()
                && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] as char == '_')
            {
                i += 1;
            }
            // Unexpanded identifier: not a macro, evaluates to 0
            toks.push(CTok::Int(0));
            continue;
        }
        for punct in PUNCTS {
            if text[i..].starts_with(punct) {
                toks.push(CTok::Punct(punct));
                i += punct.len();
                continue 'outer;
            }
        }
        return Err(ConditionError::Invalid(c.to_string()));
    }
    Ok(toks)
}

struct Scanner {
    toks: Vec<CTok>,
    pos: usize,
}

impl Scanner {
    fn peek_punct(&self) -> Option<&'static str> {
        match self.toks.get(self.pos) {
            Some(CTok::Punct(p)) => Some(p),
            _ => None,
        }
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ConditionError> {
        if self.peek_punct() == Some(p) {
            self.bump();
            Ok(())
        } else {
            Err(ConditionError::Invalid(p.to_string()))
        }
    }
}

fn binary_precedence(op: &str) -> Option<u8> {
    let prec = match op {
        "*" | "/" | "%" => 10,
        "+" | "-" => 9,
        "<<" | ">>" => 8,
        "<" | ">" | "<=" | ">=" => 7,
        "==" | "!=" => 6,
        "&" => 5,
        "^" => 4,
        "|" => 3,
        "&&" => 2,
        "||" => 1,
        _ => return None,
    };
    Some(prec)
}

fn apply_binary(op: &str, lhs: i64, rhs: i64) -> Result<i64, ConditionError> {
    let value = match op {
        "*" => lhs.wrapping_mul(rhs),
        "/" => {
            if rhs == 0 {
                return Err(ConditionError::DivisionByZero);
            }
            lhs.wrapping_div(rhs)
        }
        "%" => {
            if rhs == 0 {
                return Err(ConditionError::DivisionByZero);
            }
            lhs.wrapping_rem(rhs)
        }
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "<<" => lhs.wrapping_shl((rhs & 63) as u32),
        ">>" => lhs.wrapping_shr((rhs & 63) as u32),
        "<" => (lhs < rhs) as i64,
        ">" => (lhs > rhs) as i64,
        "<=" => (lhs <= rhs) as i64,
        ">=" => (lhs >= rhs) as i64,
        "==" => (lhs == rhs) as i64,
        "!=" => (lhs != rhs) as i64,
        "&" => lhs & rhs,
        "^" => lhs ^ rhs,
        "|" => lhs | rhs,
        "&&" => (lhs != 0 && rhs != 0) as i64,
        "||" => (lhs != 0 || rhs != 0) as i64,
        _ => return Err(ConditionError::Invalid(op.to_string())),
    };
    Ok(value)
}

fn parse_primary(scanner: &mut Scanner) -> Result<i64, ConditionError> {
    match scanner.toks.get(scanner.pos).cloned() {
        Some(CTok::Int(value)) => {
            scanner.bump();
            Ok(value)
        }
        Some(CTok::Punct("(")) => {
            scanner.bump();
            let value = parse_ternary(scanner)?;
            scanner.expect_punct(")")?;
            Ok(value)
        }
        Some(CTok::Punct(p)) => Err(ConditionError::Invalid(p.to_string())),
        None => Err(ConditionError::Invalid("<end of line>".to_string())),
    }
}

fn parse_unary(scanner: &mut Scanner) -> Result<i64, ConditionError> {
    match scanner.peek_punct() {
        Some("+") => {
            scanner.bump();
            parse_unary(scanner)
        }
        Some("-") => {
            scanner.bump();
            Ok(parse_unary(scanner)?.wrapping_neg())
        }
        Some("!") => {
            scanner.bump();
            Ok((parse_unary(scanner)? == 0) as i64)
        }
        Some("~") => {
            scanner.bump();
            Ok(!parse_unary(scanner)?)
        }
        _ => parse_primary(scanner),
    }
}

fn parse_binary(scanner: &mut Scanner, min_prec: u8) -> Result<i64, ConditionError> {
    let mut lhs = parse_unary(scanner)?;
    while let Some(op) = scanner.peek_punct() {
        let prec = match binary_precedence(op) {
            Some(p) if p >= min_prec => p,
            _ => break,
        };
        scanner.bump();
        let rhs = parse_binary(scanner, prec + 1)?;
        lhs = apply_binary(op, lhs, rhs)?;
    }
    Ok(lhs)
}

fn parse_ternary(scanner: &mut Scanner) -> Result<i64, ConditionError> {
    let cond = parse_binary(scanner, 1)?;
    if scanner.peek_punct() == Some("?") {
        scanner.bump();
        let then_value = parse_ternary(scanner)?;
        scanner.expect_punct(":")?;
        let else_value = parse_ternary(scanner)?;
        Ok(if cond != 0 { then_value } else { else_value })
    } else {
        Ok(cond)
    }
}

pub fn evaluate(text: &str) -> Result<i64, ConditionError> {
    let mut scanner = Scanner {
        toks: tokenize(text)?,
        pos: 0,
    };
    if scanner.toks.is_empty() {
        return Err(ConditionError::Invalid("<empty expression>".to_string()));
    }
    let value = parse_ternary(&mut scanner)?;
    if scanner.pos != scanner.toks.len() {
        return Err(ConditionError::Invalid("<trailing tokens>".to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence() {
        assert_eq!(evaluate("1 + 2 * 3"), Ok(7));
        assert_eq!(evaluate("(1 + 2) * 3"), Ok(9));
        assert_eq!(evaluate("1 << 4 | 2"), Ok(18));
        assert_eq!(evaluate("3 % 2 == 1 && 4 > 3"), Ok(1));
    }

    #[test]
    fn unary_and_ternary() {
        assert_eq!(evaluate("-3 + 5"), Ok(2));
        assert_eq!(evaluate("!0"), Ok(1));
        assert_eq!(evaluate("~0"), Ok(-1));
        assert_eq!(evaluate("1 ? 10 : 20"), Ok(10));
        assert_eq!(evaluate("0 ? 10 : 20"), Ok(20));
    }

    #[test]
    fn radixes() {
        assert_eq!(evaluate("0x10"), Ok(16));
        assert_eq!(evaluate("010"), Ok(8));
        assert_eq!(evaluate("0"), Ok(0));
        assert_eq!(evaluate("42u"), Ok(42));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(evaluate("1 / 0"), Err(ConditionError::DivisionByZero));
        assert_eq!(evaluate("1 % 0"), Err(ConditionError::DivisionByZero));
    }

    #[test]
    fn unexpanded_identifier_is_zero() {
        assert_eq!(evaluate("FOO + 1"), Ok(1));
    }

    #[test]
    fn malformed() {
        assert!(evaluate("1 +").is_err());
        assert!(evaluate("").is_err());
        assert!(evaluate("1 2").is_err());
    }
}
