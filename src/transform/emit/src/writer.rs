//! Indentation-tracking text sink shared by all emitters.

pub struct Writer {
    buffer: String,
    indent: u32,
}

impl Writer {
    pub fn new() -> Writer {
        Writer {
            buffer: String::new(),
            indent: 0,
        }
    }

    pub fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn space(&mut self) {
        self.buffer.push(' ');
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn unindent(&mut self) {
        assert!(self.indent > 0);
        self.indent -= 1;
    }

    /// Starts a fresh line at the current indentation.
    pub fn line(&mut self) {
        self.buffer.push('\n');
        for _ in 0..self.indent {
            self.buffer.push('\t');
        }
    }

    pub fn finish(mut self) -> String {
        if !self.buffer.ends_with('\n') {
            self.buffer.push('\n');
        }
        self.buffer
    }
}

impl Default for Writer {
    fn default() -> Writer {
        Writer::new()
    }
}

/// GLSL-family operator spelling shared by the C-like emitters.
pub fn bin_op_symbol(op: esslt_lang_hir::BinOp) -> &'static str {
    use esslt_lang_hir::BinOp;
    match op {
        BinOp::Add => "+",
        BinOp::Subtract => "-",
        BinOp::Multiply => "*",
        BinOp::Divide => "/",
        BinOp::Modulus => "%",
        BinOp::LeftShift => "<<",
        BinOp::RightShift => ">>",
        BinOp::LessThan => "<",
        BinOp::LessEqual => "<=",
        BinOp::GreaterThan => ">",
        BinOp::GreaterEqual => ">=",
        BinOp::Equality => "==",
        BinOp::Inequality => "!=",
        BinOp::BitwiseAnd => "&",
        BinOp::BitwiseOr => "|",
        BinOp::BitwiseXor => "^",
        BinOp::LogicalAnd => "&&",
        BinOp::LogicalOr => "||",
        BinOp::LogicalXor => "^^",
    }
}

/// C operator precedence, lower binds tighter. Parenthesize when the
/// surrounding precedence is at or below the operator's own.
pub fn bin_op_precedence(op: esslt_lang_hir::BinOp) -> u32 {
    use esslt_lang_hir::BinOp;
    match op {
        BinOp::Multiply | BinOp::Divide | BinOp::Modulus => 3,
        BinOp::Add | BinOp::Subtract => 4,
        BinOp::LeftShift | BinOp::RightShift => 5,
        BinOp::LessThan | BinOp::LessEqual | BinOp::GreaterThan | BinOp::GreaterEqual => 6,
        BinOp::Equality | BinOp::Inequality => 7,
        BinOp::BitwiseAnd => 8,
        BinOp::BitwiseXor => 9,
        BinOp::BitwiseOr => 10,
        BinOp::LogicalAnd => 11,
        BinOp::LogicalXor => 12,
        BinOp::LogicalOr => 12,
    }
}

/// GLSL float literal spelling; keeps a decimal point so the result stays
/// a float literal.
pub fn float_literal(value: f32) -> String {
    let text = format!("{}", value);
    if text.contains('.') || text.contains('e') || text.contains("inf") || text.contains("NaN") {
        text
    } else {
        format!("{}.0", text)
    }
}
