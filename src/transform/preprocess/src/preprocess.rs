//! Directive execution and macro expansion.
//!
//! Input arrives as a list of source strings; locations are (string index,
//! line) pairs. Output is a single flattened text plus a per-line location
//! table, so later stages never re-derive positions from raw input.
//!
//! The preprocessor recovers from every error it reports: a bad directive is
//! dropped, a bad macro call expands to nothing, and processing continues so
//! one compile can surface several problems.

use std::collections::HashMap;

use esslt_shared::{DiagnosticId, Diagnostics, SourceLocation};

use crate::condition_parser::{self, ConditionError};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ExtensionBehavior {
    Require,
    Enable,
    Warn,
    Disable,
}

impl ExtensionBehavior {
    fn parse(word: &str) -> Option<ExtensionBehavior> {
        match word {
            "require" => Some(ExtensionBehavior::Require),
            "enable" => Some(ExtensionBehavior::Enable),
            "warn" => Some(ExtensionBehavior::Warn),
            "disable" => Some(ExtensionBehavior::Disable),
            _ => None,
        }
    }
}

/// Receives the directives that concern the driver of the preprocessor
/// rather than the preprocessor itself. Returning `false` means the
/// name/version was not recognized.
pub trait DirectiveHandler {
    fn handle_version(&mut self, version: u32, loc: SourceLocation) -> bool {
        let _ = (version, loc);
        true
    }

    fn handle_extension(
        &mut self,
        name: &str,
        behavior: ExtensionBehavior,
        loc: SourceLocation,
    ) -> bool {
        let _ = (name, behavior, loc);
        false
    }

    fn handle_pragma(&mut self, name: &str, value: Option<&str>, loc: SourceLocation) -> bool {
        let _ = (name, value, loc);
        false
    }
}

/// Ignores everything. Used by tests and by the standalone preprocess mode.
pub struct NullDirectiveHandler;

impl DirectiveHandler for NullDirectiveHandler {}

/// Flattened output text plus the origin of every line in it.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct PreprocessedText {
    pub code: String,
    /// `lines[n]` is the source location of line `n` (0-based) of `code`
    pub lines: Vec<SourceLocation>,
}

impl PreprocessedText {
    pub fn location_of_line(&self, line: usize) -> SourceLocation {
        self.lines
            .get(line)
            .copied()
            .unwrap_or_else(SourceLocation::none)
    }
}

#[derive(PartialEq, Debug, Clone)]
struct Macro {
    /// `None` for object-like macros
    params: Option<Vec<String>>,
    body: Vec<String>,
}

fn is_reserved_macro_name(name: &str) -> bool {
    name.starts_with("GL_") || name.contains("__")
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits text into preprocessing tokens: identifiers, pp-numbers and
/// punctuation. Whitespace separates tokens and is otherwise discarded.
fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            // pp-number: digits, dots, exponents and hex prefixes in one token
            let start = i;
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                if is_ident_char(d) || d == '.' {
                    i += 1;
                } else if (d == '+' || d == '-')
                    && matches!(chars[i - 1], 'e' | 'E')
                {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(chars[start..i].iter().collect());
        } else {
            // Longest-match punctuation
            const MULTI: &[&str] = &[
                "<<=", ">>=", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "^^", "+=", "-=",
                "*=", "/=", "%=", "&=", "|=", "^=", "++", "--",
            ];
            let rest: String = chars[i..].iter().collect();
            let mut matched = None;
            for punct in MULTI {
                if rest.starts_with(punct) {
                    matched = Some(*punct);
                    break;
                }
            }
            match matched {
                Some(punct) => {
                    tokens.push(punct.to_string());
                    i += punct.len();
                }
                None => {
                    tokens.push(c.to_string());
                    i += 1;
                }
            }
        }
    }
    tokens
}

/// One source line after continuation splicing and comment removal.
struct LogicalLine {
    loc: SourceLocation,
    text: String,
}

/// Comment stripping state carries across lines and across source strings.
fn split_logical_lines(sources: &[&str], diagnostics: &mut Diagnostics) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    let mut in_block_comment = false;
    let mut last_loc = SourceLocation::none();

    for (file, source) in sources.iter().enumerate() {
        let file = file as u16;
        let mut raw_lines = source.split('\n').enumerate().peekable();
        while let Some((index, raw)) = raw_lines.next() {
            let line_no = index as u32 + 1;
            let loc = SourceLocation::new(file, line_no);
            last_loc = loc;

            // Continuation splicing happens before comment removal
            let mut spliced = raw.strip_suffix('\r').unwrap_or(raw).to_string();
            while spliced.ends_with('\\') {
                spliced.pop();
                match raw_lines.next() {
                    Some((_, next)) => {
                        spliced.push_str(next.strip_suffix('\r').unwrap_or(next));
                    }
                    None => break,
                }
            }

            let mut text = String::new();
            let chars: Vec<char> = spliced.chars().collect();
            let mut i = 0;
            while i < chars.len() {
                if in_block_comment {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        in_block_comment = false;
                        text.push(' ');
                        i += 2;
                    } else {
                        i += 1;
                    }
                } else if chars[i] == '/' && chars.get(i + 1) == Some(&'/') {
                    break;
                } else if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                    in_block_comment = true;
                    i += 2;
                } else {
                    text.push(chars[i]);
                    i += 1;
                }
            }

            lines.push(LogicalLine { loc, text });
        }
    }

    if in_block_comment {
        diagnostics.report(
            DiagnosticId::UnterminatedComment,
            last_loc,
            "unterminated block comment",
        );
    }

    lines
}

struct ConditionBlock {
    /// Every enclosing block was active and this arm was taken
    active: bool,
    parent_active: bool,
    any_taken: bool,
    seen_else: bool,
    loc: SourceLocation,
}

struct Preprocessor<'a> {
    macros: HashMap<String, Macro>,
    blocks: Vec<ConditionBlock>,
    output: PreprocessedText,
    diagnostics: &'a mut Diagnostics,
    handler: &'a mut dyn DirectiveHandler,
    version_number: u32,
    seen_version: bool,
    seen_code: bool,
    /// Set by #line: added to physical line numbers from that point on
    line_delta: i64,
    file_override: Option<u16>,
}

pub fn preprocess(
    sources: &[&str],
    handler: &mut dyn DirectiveHandler,
    diagnostics: &mut Diagnostics,
) -> PreprocessedText {
    let lines = split_logical_lines(sources, diagnostics);
    let mut pp = Preprocessor {
        macros: HashMap::new(),
        blocks: Vec::new(),
        output: PreprocessedText::default(),
        diagnostics,
        handler,
        version_number: 100,
        seen_version: false,
        seen_code: false,
        line_delta: 0,
        file_override: None,
    };
    pp.run(&lines);
    pp.output
}

impl<'a> Preprocessor<'a> {
    fn run(&mut self, lines: &[LogicalLine]) {
        for line in lines {
            let loc = self.map_loc(line.loc);
            let trimmed = line.text.trim_start();
            if let Some(directive) = trimmed.strip_prefix('#') {
                self.handle_directive(directive.trim(), loc, line.loc);
            } else if self.active() {
                let tokens = split_tokens(&line.text);
                if tokens.is_empty() {
                    continue;
                }
                self.seen_code = true;
                let mut active_macros = Vec::new();
                let expanded = self.expand(&tokens, &mut active_macros, loc);
                if !expanded.is_empty() {
                    self.output.code.push_str(&expanded.join(" "));
                    self.output.code.push('\n');
                    self.output.lines.push(loc);
                }
            }
        }
        while let Some(block) = self.blocks.pop() {
            self.diagnostics.report(
                DiagnosticId::ConditionalUnterminated,
                block.loc,
                "unterminated #if",
            );
        }
    }

    fn map_loc(&self, loc: SourceLocation) -> SourceLocation {
        let line = (loc.line as i64 + self.line_delta).max(0) as u32;
        SourceLocation::new(self.file_override.unwrap_or(loc.file), line)
    }

    fn active(&self) -> bool {
        self.blocks.iter().all(|b| b.active)
    }

    fn handle_directive(&mut self, directive: &str, loc: SourceLocation, raw_loc: SourceLocation) {
        let (name, rest) = match directive.chars().next() {
            None => return, // null directive
            Some(c) if is_ident_start(c) => {
                let end = directive
                    .find(|c: char| !is_ident_char(c))
                    .unwrap_or(directive.len());
                (&directive[..end], directive[end..].trim())
            }
            Some(_) => {
                if self.active() {
                    self.diagnostics.report(
                        DiagnosticId::InvalidDirective,
                        loc,
                        format!("'#{}' : invalid directive", directive),
                    );
                }
                return;
            }
        };

        // Conditional directives run even inside skipped regions so nesting
        // stays balanced
        match name {
            "if" => return self.handle_if(rest, loc),
            "ifdef" => return self.handle_ifdef(rest, loc, false),
            "ifndef" => return self.handle_ifdef(rest, loc, true),
            "elif" => return self.handle_elif(rest, loc),
            "else" => return self.handle_else(rest, loc),
            "endif" => return self.handle_endif(loc),
            _ => {}
        }
        if !self.active() {
            return;
        }

        match name {
            "define" => self.handle_define(rest, loc),
            "undef" => self.handle_undef(rest, loc),
            "version" => self.handle_version(rest, loc),
            "extension" => self.handle_extension(rest, loc),
            "pragma" => self.handle_pragma(rest, loc),
            "line" => self.handle_line(rest, loc, raw_loc),
            "error" => {
                self.seen_code = true;
                self.diagnostics
                    .report(DiagnosticId::ErrorDirective, loc, rest.to_string());
            }
            _ => {
                self.seen_code = true;
                self.diagnostics.report(
                    DiagnosticId::UnknownDirective,
                    loc,
                    format!("'#{}' : unknown directive", name),
                );
            }
        }
    }

    fn handle_define(&mut self, rest: &str, loc: SourceLocation) {
        self.seen_code = true;
        let mut chars = rest.char_indices();
        let name_end = match chars.next() {
            Some((_, c)) if is_ident_start(c) => rest
                .find(|c: char| !is_ident_char(c))
                .unwrap_or(rest.len()),
            _ => {
                self.diagnostics.report(
                    DiagnosticId::InvalidDirective,
                    loc,
                    "'#define' : macro name expected",
                );
                return;
            }
        };
        let name = &rest[..name_end];
        if is_reserved_macro_name(name) {
            self.diagnostics.report(
                DiagnosticId::MacroNameReserved,
                loc,
                format!("'{}' : reserved macro name", name),
            );
            return;
        }
        let after_name = &rest[name_end..];

        // A parenthesis directly after the name, with no whitespace, makes
        // the macro function-like
        let (params, body_text) = if let Some(param_text) = after_name.strip_prefix('(') {
            match param_text.find(')') {
                Some(close) => {
                    let list = &param_text[..close];
                    let mut params = Vec::new();
                    let mut ok = true;
                    if !list.trim().is_empty() {
                        for param in list.split(',') {
                            let param = param.trim();
                            if !param.is_empty() && param.chars().all(is_ident_char) {
                                params.push(param.to_string());
                            } else {
                                ok = false;
                            }
                        }
                    }
                    if !ok {
                        self.diagnostics.report(
                            DiagnosticId::InvalidDirective,
                            loc,
                            format!("'{}' : invalid macro parameter list", name),
                        );
                        return;
                    }
                    (Some(params), &param_text[close + 1..])
                }
                None => {
                    self.diagnostics.report(
                        DiagnosticId::InvalidDirective,
                        loc,
                        format!("'{}' : unterminated macro parameter list", name),
                    );
                    return;
                }
            }
        } else {
            (None, after_name)
        };

        let definition = Macro {
            params,
            body: split_tokens(body_text),
        };
        if let Some(existing) = self.macros.get(name) {
            // Token-identical redefinition is allowed
            if *existing != definition {
                self.diagnostics.report(
                    DiagnosticId::MacroRedefined,
                    loc,
                    format!("'{}' : macro redefined", name),
                );
            }
            return;
        }
        self.macros.insert(name.to_string(), definition);
    }

    fn handle_undef(&mut self, rest: &str, loc: SourceLocation) {
        self.seen_code = true;
        let name = rest.trim();
        if name.is_empty() || !name.chars().all(is_ident_char) {
            self.diagnostics.report(
                DiagnosticId::InvalidDirective,
                loc,
                "'#undef' : macro name expected",
            );
            return;
        }
        if is_reserved_macro_name(name) {
            self.diagnostics.report(
                DiagnosticId::MacroNameReserved,
                loc,
                format!("'{}' : reserved macro name", name),
            );
            return;
        }
        self.macros.remove(name);
    }

    fn handle_version(&mut self, rest: &str, loc: SourceLocation) {
        if self.seen_code || self.seen_version {
            self.diagnostics.report(
                DiagnosticId::VersionNotFirstStatement,
                loc,
                "#version must occur before any other statement",
            );
        }
        self.seen_version = true;
        let tokens = split_tokens(rest);
        let valid = match tokens.as_slice() {
            [number] if number == "100" => Some(100),
            [number, es] if es == "es" => match number.as_str() {
                "300" => Some(300),
                "310" => Some(310),
                _ => None,
            },
            _ => None,
        };
        match valid {
            Some(number) => {
                self.version_number = number;
                if !self.handler.handle_version(number, loc) {
                    self.diagnostics.report(
                        DiagnosticId::InvalidVersionDirective,
                        loc,
                        format!("'{}' : unsupported shader version", rest),
                    );
                }
            }
            None => {
                self.diagnostics.report(
                    DiagnosticId::InvalidVersionDirective,
                    loc,
                    format!("'{}' : invalid version directive", rest),
                );
            }
        }
    }

    fn handle_extension(&mut self, rest: &str, loc: SourceLocation) {
        self.seen_code = true;
        let parts: Vec<&str> = rest.splitn(2, ':').collect();
        let (name, behavior_text) = match parts.as_slice() {
            [name, behavior] => (name.trim(), behavior.trim()),
            _ => {
                self.diagnostics.report(
                    DiagnosticId::InvalidExtensionDirective,
                    loc,
                    "'#extension' : expected 'name : behavior'",
                );
                return;
            }
        };
        let behavior = match ExtensionBehavior::parse(behavior_text) {
            Some(behavior) => behavior,
            None => {
                self.diagnostics.report(
                    DiagnosticId::InvalidExtensionDirective,
                    loc,
                    format!("'{}' : invalid extension behavior", behavior_text),
                );
                return;
            }
        };
        if name == "all" {
            if matches!(
                behavior,
                ExtensionBehavior::Require | ExtensionBehavior::Enable
            ) {
                self.diagnostics.report(
                    DiagnosticId::InvalidExtensionDirective,
                    loc,
                    "'all' : extension cannot have 'require' or 'enable' behavior",
                );
            }
            return;
        }
        if !self.handler.handle_extension(name, behavior, loc) {
            if behavior == ExtensionBehavior::Require {
                self.diagnostics.report(
                    DiagnosticId::InvalidExtensionDirective,
                    loc,
                    format!("'{}' : required extension is not supported", name),
                );
            } else {
                self.diagnostics.report(
                    DiagnosticId::UnknownExtension,
                    loc,
                    format!("'{}' : extension is not supported", name),
                );
            }
        }
    }

    fn handle_pragma(&mut self, rest: &str, loc: SourceLocation) {
        // Pragmas never affect seen_code: they are allowed before #version
        let tokens = split_tokens(rest);
        let recognized = match tokens.as_slice() {
            [name] => self.handler.handle_pragma(name, None, loc),
            [name, open, value, close] if open == "(" && close == ")" => {
                self.handler.handle_pragma(name, Some(value), loc)
            }
            // STDGL pragmas carry a second word before the argument
            [stdgl, name, open, value, close]
                if stdgl == "STDGL" && open == "(" && close == ")" =>
            {
                self.handler.handle_pragma(name, Some(value), loc)
            }
            [] => return,
            _ => {
                self.diagnostics.report(
                    DiagnosticId::InvalidPragmaDirective,
                    loc,
                    format!("'{}' : invalid pragma", rest),
                );
                return;
            }
        };
        if !recognized {
            self.diagnostics.report(
                DiagnosticId::UnknownPragma,
                loc,
                format!("'{}' : unknown pragma", rest),
            );
        }
    }

    fn handle_line(&mut self, rest: &str, loc: SourceLocation, raw_loc: SourceLocation) {
        self.seen_code = true;
        let mut active_macros = Vec::new();
        let tokens = split_tokens(rest);
        let expanded = self.expand(&tokens, &mut active_macros, loc);
        let parse_u32 = |t: &String| t.parse::<u32>().ok();
        let (line, file) = match expanded.as_slice() {
            [line] => (parse_u32(line), None),
            [line, file] => (parse_u32(line), Some(parse_u32(file))),
            _ => (None, None),
        };
        match (line, file) {
            (Some(line), file) => {
                let file = match file {
                    None => None,
                    Some(Some(f)) if f <= u16::MAX as u32 => Some(f as u16),
                    Some(_) => {
                        self.diagnostics.report(
                            DiagnosticId::InvalidLineDirective,
                            loc,
                            format!("'{}' : invalid line directive", rest),
                        );
                        return;
                    }
                };
                // The line after the directive reports as `line + 1`
                self.line_delta = line as i64 - raw_loc.line as i64;
                if file.is_some() {
                    self.file_override = file;
                }
            }
            _ => {
                self.diagnostics.report(
                    DiagnosticId::InvalidLineDirective,
                    loc,
                    format!("'{}' : invalid line directive", rest),
                );
            }
        }
    }

    fn handle_if(&mut self, rest: &str, loc: SourceLocation) {
        self.seen_code = true;
        let parent_active = self.active();
        let taken = parent_active && self.evaluate_condition(rest, loc);
        self.blocks.push(ConditionBlock {
            active: taken,
            parent_active,
            any_taken: taken,
            seen_else: false,
            loc,
        });
    }

    fn handle_ifdef(&mut self, rest: &str, loc: SourceLocation, negate: bool) {
        self.seen_code = true;
        let parent_active = self.active();
        let name = rest.trim();
        let mut defined = false;
        if name.is_empty() || !name.chars().all(is_ident_char) {
            if parent_active {
                self.diagnostics.report(
                    DiagnosticId::InvalidDirective,
                    loc,
                    "macro name expected in #ifdef",
                );
            }
        } else {
            defined = self.is_defined(name);
        }
        let taken = parent_active && (defined != negate);
        self.blocks.push(ConditionBlock {
            active: taken,
            parent_active,
            any_taken: taken,
            seen_else: false,
            loc,
        });
    }

    fn handle_elif(&mut self, rest: &str, loc: SourceLocation) {
        let evaluate = match self.blocks.last() {
            Some(block) => {
                if block.seen_else {
                    self.diagnostics.report(
                        DiagnosticId::ConditionalElseWithoutIf,
                        loc,
                        "#elif after #else",
                    );
                    return;
                }
                block.parent_active && !block.any_taken
            }
            None => {
                self.diagnostics.report(
                    DiagnosticId::ConditionalElseWithoutIf,
                    loc,
                    "#elif without #if",
                );
                return;
            }
        };
        let taken = evaluate && self.evaluate_condition(rest, loc);
        let block = self.blocks.last_mut().unwrap();
        block.active = taken;
        block.any_taken |= taken;
    }

    fn handle_else(&mut self, rest: &str, loc: SourceLocation) {
        if !rest.is_empty() {
            self.diagnostics.report(
                DiagnosticId::InvalidDirective,
                loc,
                "unexpected tokens after #else",
            );
        }
        match self.blocks.last_mut() {
            Some(block) => {
                if block.seen_else {
                    self.diagnostics.report(
                        DiagnosticId::ConditionalElseWithoutIf,
                        loc,
                        "#else after #else",
                    );
                    return;
                }
                block.seen_else = true;
                block.active = block.parent_active && !block.any_taken;
                block.any_taken = true;
            }
            None => {
                self.diagnostics.report(
                    DiagnosticId::ConditionalElseWithoutIf,
                    loc,
                    "#else without #if",
                );
            }
        }
    }

    fn handle_endif(&mut self, loc: SourceLocation) {
        if self.blocks.pop().is_none() {
            self.diagnostics.report(
                DiagnosticId::ConditionalEndWithoutIf,
                loc,
                "#endif without #if",
            );
        }
    }

    fn is_defined(&self, name: &str) -> bool {
        matches!(name, "GL_ES" | "__VERSION__" | "__LINE__" | "__FILE__")
            || self.macros.contains_key(name)
    }

    fn evaluate_condition(&mut self, text: &str, loc: SourceLocation) -> bool {
        let tokens = split_tokens(text);

        // `defined` is resolved before macro expansion
        let mut resolved = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i] == "defined" {
                let (name, consumed) = if tokens.get(i + 1).map(String::as_str) == Some("(") {
                    match (tokens.get(i + 2), tokens.get(i + 3).map(String::as_str)) {
                        (Some(name), Some(")")) => (Some(name.clone()), 4),
                        _ => (None, 1),
                    }
                } else {
                    match tokens.get(i + 1) {
                        Some(name) if name.chars().next().is_some_and(is_ident_start) => {
                            (Some(name.clone()), 2)
                        }
                        _ => (None, 1),
                    }
                };
                match name {
                    Some(name) => {
                        resolved.push(if self.is_defined(&name) { "1" } else { "0" }.to_string());
                        i += consumed;
                    }
                    None => {
                        self.diagnostics.report(
                            DiagnosticId::InvalidConditionExpression,
                            loc,
                            "'defined' : macro name expected",
                        );
                        return false;
                    }
                }
            } else {
                resolved.push(tokens[i].clone());
                i += 1;
            }
        }

        let mut active_macros = Vec::new();
        let expanded = self.expand(&resolved, &mut active_macros, loc);
        match condition_parser::evaluate(&expanded.join(" ")) {
            Ok(value) => value != 0,
            Err(ConditionError::DivisionByZero) => {
                self.diagnostics.report(
                    DiagnosticId::DivisionByZeroInCondition,
                    loc,
                    "division by zero in #if condition",
                );
                false
            }
            Err(error) => {
                self.diagnostics.report(
                    DiagnosticId::InvalidConditionExpression,
                    loc,
                    error.to_string(),
                );
                false
            }
        }
    }

    /// Macro expansion over a token list. `active_macros` blocks recursive
    /// self-reference; a macro name inside its own expansion passes through
    /// unexpanded.
    fn expand(
        &mut self,
        tokens: &[String],
        active_macros: &mut Vec<String>,
        loc: SourceLocation,
    ) -> Vec<String> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            i += 1;
            if !token.chars().next().is_some_and(is_ident_start) {
                out.push(token.clone());
                continue;
            }
            match token.as_str() {
                "__LINE__" => {
                    out.push(loc.line.to_string());
                    continue;
                }
                "__FILE__" => {
                    out.push(loc.file.to_string());
                    continue;
                }
                "__VERSION__" => {
                    out.push(self.version_number.to_string());
                    continue;
                }
                "GL_ES" => {
                    out.push("1".to_string());
                    continue;
                }
                _ => {}
            }
            if active_macros.iter().any(|m| m == token) {
                out.push(token.clone());
                continue;
            }
            let definition = match self.macros.get(token) {
                Some(definition) => definition.clone(),
                None => {
                    out.push(token.clone());
                    continue;
                }
            };
            match definition.params {
                None => {
                    active_macros.push(token.clone());
                    let expanded = self.expand(&definition.body, active_macros, loc);
                    active_macros.pop();
                    out.extend(expanded);
                }
                Some(ref params) => {
                    // Function-like macro without arguments is not a call
                    if tokens.get(i).map(String::as_str) != Some("(") {
                        out.push(token.clone());
                        continue;
                    }
                    let (args, consumed) = match collect_arguments(&tokens[i + 1..]) {
                        Some(found) => found,
                        None => {
                            self.diagnostics.report(
                                DiagnosticId::MacroArgumentMismatch,
                                loc,
                                format!("'{}' : unterminated macro call", token),
                            );
                            return out;
                        }
                    };
                    i += 1 + consumed;
                    if args.len() != params.len() {
                        self.diagnostics.report(
                            DiagnosticId::MacroArgumentMismatch,
                            loc,
                            format!(
                                "'{}' : expected {} arguments, got {}",
                                token,
                                params.len(),
                                args.len()
                            ),
                        );
                        continue;
                    }
                    // Arguments expand before substitution
                    let expanded_args: Vec<Vec<String>> = args
                        .iter()
                        .map(|arg| self.expand(arg, active_macros, loc))
                        .collect();
                    let mut substituted = Vec::new();
                    for body_token in &definition.body {
                        match params.iter().position(|p| p == body_token) {
                            Some(index) => substituted.extend(expanded_args[index].clone()),
                            None => substituted.push(body_token.clone()),
                        }
                    }
                    active_macros.push(token.clone());
                    let expanded = self.expand(&substituted, active_macros, loc);
                    active_macros.pop();
                    out.extend(expanded);
                }
            }
        }
        out
    }
}

/// Splits the tokens of a macro call after the opening parenthesis into
/// per-argument token lists. Returns the arguments and the token count
/// consumed including the closing parenthesis, or `None` when the call never
/// closes.
fn collect_arguments(tokens: &[String]) -> Option<(Vec<Vec<String>>, usize)> {
    let mut args = vec![Vec::new()];
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "(" => {
                depth += 1;
                args.last_mut().unwrap().push(token.clone());
            }
            ")" => {
                if depth == 0 {
                    // `()` is zero arguments, not one empty argument
                    if args.len() == 1 && args[0].is_empty() {
                        args.clear();
                    }
                    return Some((args, i + 1));
                }
                depth -= 1;
                args.last_mut().unwrap().push(token.clone());
            }
            "," if depth == 0 => args.push(Vec::new()),
            _ => args.last_mut().unwrap().push(token.clone()),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (PreprocessedText, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut handler = NullDirectiveHandler;
        let text = preprocess(&[source], &mut handler, &mut diagnostics);
        (text, diagnostics)
    }

    #[test]
    fn object_macro_expands() {
        let (text, diags) = run("#define N 4\nfloat x [ N ] ;");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "float x [ 4 ] ;\n");
    }

    #[test]
    fn function_macro_expands() {
        let (text, diags) = run("#define SQ(x) ((x)*(x))\nfloat y = SQ(a + 1);");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "float y = ( ( a + 1 ) * ( a + 1 ) ) ;\n");
    }

    #[test]
    fn identical_redefinition_allowed() {
        let (_, diags) = run("#define N 4\n#define N 4\n");
        assert!(!diags.has_errors());
    }

    #[test]
    fn differing_redefinition_reported() {
        let (_, diags) = run("#define N 4\n#define N 5\n");
        assert!(diags.contains(DiagnosticId::MacroRedefined));
    }

    #[test]
    fn whitespace_differences_do_not_redefine() {
        let (_, diags) = run("#define N (1+2)\n#define N ( 1 + 2 )\n");
        assert!(!diags.has_errors());
    }

    #[test]
    fn self_reference_does_not_recurse() {
        let (text, diags) = run("#define A A + 1\nint x = A;");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "int x = A + 1 ;\n");
    }

    #[test]
    fn reserved_macro_names_rejected() {
        let (_, diags) = run("#define GL_FOO 1\n");
        assert!(diags.contains(DiagnosticId::MacroNameReserved));
        let (_, diags) = run("#define a__b 1\n");
        assert!(diags.contains(DiagnosticId::MacroNameReserved));
    }

    #[test]
    fn argument_count_mismatch_reported() {
        let (_, diags) = run("#define F(a, b) a b\nF(1)\n");
        assert!(diags.contains(DiagnosticId::MacroArgumentMismatch));
    }

    #[test]
    fn conditional_chain() {
        let source = "#define MODE 2\n#if MODE == 1\nint a;\n#elif MODE == 2\nint b;\n#else\nint c;\n#endif\n";
        let (text, diags) = run(source);
        assert!(!diags.has_errors());
        assert_eq!(text.code, "int b ;\n");
    }

    #[test]
    fn ifdef_and_ifndef() {
        let (text, diags) = run("#define X\n#ifdef X\nint a;\n#endif\n#ifndef X\nint b;\n#endif\n");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "int a ;\n");
    }

    #[test]
    fn defined_operator() {
        let (text, diags) = run("#define X 1\n#if defined(X) && defined X\nint a;\n#endif\n");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "int a ;\n");
    }

    #[test]
    fn unterminated_if_reported() {
        let (_, diags) = run("#if 1\nint a;\n");
        assert!(diags.contains(DiagnosticId::ConditionalUnterminated));
    }

    #[test]
    fn else_without_if_reported() {
        let (_, diags) = run("#else\n");
        assert!(diags.contains(DiagnosticId::ConditionalElseWithoutIf));
        let (_, diags) = run("#endif\n");
        assert!(diags.contains(DiagnosticId::ConditionalEndWithoutIf));
    }

    #[test]
    fn division_by_zero_in_condition() {
        let (_, diags) = run("#if 1 / 0\n#endif\n");
        assert!(diags.contains(DiagnosticId::DivisionByZeroInCondition));
    }

    #[test]
    fn skipped_regions_do_not_evaluate() {
        // The inner #if with a bad expression sits in a dead region
        let (text, diags) = run("#if 0\n#if !\nint a;\n#endif\n#else\nint b;\n#endif\n");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "int b ;\n");
    }

    #[test]
    fn error_directive() {
        let (_, diags) = run("#error something broke\n");
        assert!(diags.contains(DiagnosticId::ErrorDirective));
        assert!(diags.info_log().contains("something broke"));
    }

    #[test]
    fn version_must_be_first() {
        let (_, diags) = run("int a;\n#version 100\n");
        assert!(diags.contains(DiagnosticId::VersionNotFirstStatement));
    }

    #[test]
    fn version_forms() {
        let (_, diags) = run("#version 100\n");
        assert!(!diags.has_errors());
        let (_, diags) = run("#version 300 es\n");
        assert!(!diags.has_errors());
        let (_, diags) = run("#version 300\n");
        assert!(diags.contains(DiagnosticId::InvalidVersionDirective));
        let (_, diags) = run("#version 420\n");
        assert!(diags.contains(DiagnosticId::InvalidVersionDirective));
    }

    #[test]
    fn version_macro_tracks_version() {
        let (text, diags) = run("#version 300 es\n#if __VERSION__ == 300\nint a;\n#endif\n");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "int a ;\n");
    }

    #[test]
    fn gl_es_predefined() {
        let (text, _) = run("#ifdef GL_ES\nint a;\n#endif\n");
        assert_eq!(text.code, "int a ;\n");
    }

    #[test]
    fn comments_stripped() {
        let (text, diags) = run("int a; // trailing\nint /* mid */ b;\n");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "int a ;\nint b ;\n");
    }

    #[test]
    fn block_comment_spans_lines() {
        let (text, diags) = run("int a; /* one\ntwo */ int b;\n");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "int a ;\nint b ;\n");
        assert_eq!(text.lines[0], SourceLocation::new(0, 1));
        assert_eq!(text.lines[1], SourceLocation::new(0, 2));
    }

    #[test]
    fn unterminated_comment_reported() {
        let (_, diags) = run("int a; /* never closed\n");
        assert!(diags.contains(DiagnosticId::UnterminatedComment));
    }

    #[test]
    fn line_continuation_splices() {
        let (text, diags) = run("#define LONG 1 + \\\n2\nint x = LONG;\n");
        assert!(!diags.has_errors());
        assert_eq!(text.code, "int x = 1 + 2 ;\n");
    }

    #[test]
    fn line_directive_rebases_locations() {
        let (text, _) = run("#line 100\nint a;\n#line 5 3\nint b;\n");
        assert_eq!(text.lines[0], SourceLocation::new(0, 101));
        assert_eq!(text.lines[1], SourceLocation::new(3, 6));
    }

    #[test]
    fn multiple_strings_map_files() {
        let mut diagnostics = Diagnostics::new();
        let mut handler = NullDirectiveHandler;
        let text = preprocess(&["int a;\n", "int b;\n"], &mut handler, &mut diagnostics);
        assert_eq!(text.lines[0], SourceLocation::new(0, 1));
        assert_eq!(text.lines[1], SourceLocation::new(1, 1));
    }

    #[test]
    fn line_macro_expands() {
        let (text, _) = run("int a;\nint x = __LINE__;\n");
        assert_eq!(text.code, "int a ;\nint x = 2 ;\n");
    }

    #[test]
    fn unknown_directive_reported() {
        let (_, diags) = run("#include \"foo\"\n");
        assert!(diags.contains(DiagnosticId::UnknownDirective));
    }
}
