//! Recursive-descent parser for mcdoc modules.
//!
//! PEG-style: alternatives are tried in a fixed order and the first match
//! wins, so there is no backtracking across statements and parse time stays
//! linear in the input. Every rule consumes trailing whitespace and `//` /
//! `///` comments. A failure inside a top-level statement is recorded and the
//! parser skips to the next statement boundary (blank line or top-level
//! keyword), so one parse reports every broken statement.

use crate::ast::*;
use crate::error::{ParseError, ParseErrorKind};
use mcdoc_diagnostics::Span;

/// Outcome of parsing one module. The AST is always produced; statements the
/// parser could not make sense of are absent from it and recorded in `errors`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    pub module: Module,
    pub errors: Vec<ParseError>,
}

/// Parse a single module's text. Deterministic, no I/O.
pub fn parse(module_path: &str, text: &str) -> ParseResult {
    let mut parser = Parser::new(text);
    let items = parser.parse_items();
    ParseResult {
        module: Module {
            path: module_path.to_string(),
            items,
            span: Span::new(0, text.len()),
        },
        errors: parser.errors,
    }
}

const KEYWORDS: &[&str] = &["use", "type", "struct", "enum", "dispatch"];

type PResult<T> = Result<T, ParseError>;

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            errors: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Cursor primitives
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            self.skip_trivia();
            true
        } else {
            false
        }
    }

    /// Like [`eat`](Self::eat) but without consuming trailing trivia.
    fn eat_raw(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.src[self.pos..].starts_with(s) {
            self.pos += s.len();
            self.skip_trivia();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: u8, what: &'static str) -> PResult<()> {
        if self.eat(ch) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let kind = if self.at_eof() {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::UnexpectedToken
        };
        ParseError::expecting(kind, self.here(), expected)
    }

    fn here(&self) -> Span {
        let end = (self.pos + 1).min(self.bytes.len());
        Span::new(self.pos.min(self.bytes.len()), end)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.pos)
    }

    /// Skip whitespace and `//`-style comments (`///` included).
    fn skip_trivia(&mut self) {
        loop {
            while let Some(b) = self.peek() {
                if b.is_ascii_whitespace() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if self.src[self.pos..].starts_with("//") {
                while let Some(b) = self.peek() {
                    self.pos += 1;
                    if b == b'\n' {
                        break;
                    }
                }
            } else {
                return;
            }
        }
    }

    // ------------------------------------------------------------------
    // Words, identifiers, literals
    // ------------------------------------------------------------------

    fn is_ident_start(b: u8) -> bool {
        b.is_ascii_alphabetic() || b == b'_'
    }

    fn is_ident_continue(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_'
    }

    /// The identifier-shaped word at the cursor, without consuming it.
    fn peek_word(&self) -> Option<&'a str> {
        let b = self.peek()?;
        if !Self::is_ident_start(b) {
            return None;
        }
        let start = self.pos;
        let mut end = start;
        while end < self.bytes.len() && Self::is_ident_continue(self.bytes[end]) {
            end += 1;
        }
        Some(&self.src[start..end])
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_word() == Some(kw) {
            self.pos += kw.len();
            self.skip_trivia();
            true
        } else {
            false
        }
    }

    fn parse_ident(&mut self, what: &'static str) -> PResult<Ident> {
        let start = self.pos;
        let word = self.peek_word().ok_or_else(|| self.unexpected(what))?;
        self.pos += word.len();
        let span = self.span_from(start);
        self.skip_trivia();
        Ok(Ident::new(word, span))
    }

    fn parse_string_literal(&mut self) -> PResult<(String, Span)> {
        let start = self.pos;
        if !self.eat_raw(b'"') {
            return Err(self.unexpected("string literal"));
        }
        let mut out = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::expecting(
                        ParseErrorKind::UnclosedDelimiter,
                        self.span_from(start),
                        "\"",
                    ))
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or(ParseError::expecting(
                        ParseErrorKind::UnclosedDelimiter,
                        self.span_from(start),
                        "\"",
                    ))?;
                    self.pos += 1;
                    out.push(match escaped {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        other => other as char,
                    });
                }
                Some(_) => {
                    // Multi-byte UTF-8 is copied through unchanged.
                    let ch_start = self.pos;
                    let ch = self.src[ch_start..].chars().next().unwrap_or('\u{fffd}');
                    self.pos += ch.len_utf8();
                    out.push(ch);
                }
            }
        }
        let span = self.span_from(start);
        self.skip_trivia();
        Ok((out, span))
    }

    fn at_number_start(&self) -> bool {
        match self.peek() {
            Some(b) if b.is_ascii_digit() => true,
            Some(b'-') => self.peek_at(1).is_some_and(|b| b.is_ascii_digit()),
            _ => false,
        }
    }

    /// Scan a number literal. A `.` immediately followed by another `.` is a
    /// range operator, not a decimal point.
    fn parse_number(&mut self) -> PResult<(Literal, Span)> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        if !self.peek().is_some_and(|b| b.is_ascii_digit()) {
            return Err(self.unexpected("number"));
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E'))
            && self
                .peek_at(1)
                .is_some_and(|b| b.is_ascii_digit() || b == b'+' || b == b'-')
        {
            is_float = true;
            self.pos += 2;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let span = self.span_from(start);
        let text = &self.src[span.start..span.end];
        self.skip_trivia();
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::expecting(ParseErrorKind::UnexpectedToken, span, "number"))?;
            Ok((Literal::Float(value), span))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| ParseError::expecting(ParseErrorKind::UnexpectedToken, span, "number"))?;
            Ok((Literal::Int(value), span))
        }
    }

    // ------------------------------------------------------------------
    // Module and statements
    // ------------------------------------------------------------------

    fn parse_items(&mut self) -> Vec<Item> {
        let mut items = Vec::new();
        self.skip_trivia();
        while !self.at_eof() {
            let start = self.pos;
            match self.parse_statement() {
                Ok(item) => items.push(item),
                Err(err) => {
                    self.recover_to_statement_boundary();
                    // The recorded span covers everything that was skipped.
                    self.errors.push(ParseError {
                        span: Span::new(start, self.pos.max(start)),
                        kind: err.kind,
                        expected: err.expected,
                    });
                }
            }
            self.skip_trivia();
        }
        items
    }

    /// Skip to the next blank line or line starting with a top-level keyword.
    fn recover_to_statement_boundary(&mut self) {
        // Always make progress, even if the error position is a boundary.
        if !self.at_eof() {
            self.pos += 1;
        }
        while !self.at_eof() {
            // Advance to the end of the current line.
            while let Some(b) = self.peek() {
                self.pos += 1;
                if b == b'\n' {
                    break;
                }
            }
            // Blank line ends recovery.
            let line_start = self.pos;
            let mut probe = line_start;
            while probe < self.bytes.len() && (self.bytes[probe] == b' ' || self.bytes[probe] == b'\t') {
                probe += 1;
            }
            match self.bytes.get(probe) {
                None => {
                    self.pos = self.bytes.len();
                    return;
                }
                Some(b'\n') | Some(b'\r') => {
                    self.pos = probe;
                    return;
                }
                _ => {}
            }
            // A top-level keyword or attribute opener also ends recovery.
            let rest = &self.src[probe..];
            if rest.starts_with("#[") || KEYWORDS.iter().any(|kw| starts_with_word(rest, kw)) {
                self.pos = probe;
                return;
            }
        }
    }

    fn parse_statement(&mut self) -> PResult<Item> {
        let start = self.pos;
        let attributes = self.parse_attributes()?;
        let kind = match self.peek_word() {
            Some("use") => {
                self.eat_keyword("use");
                ItemKind::Use(UseItem {
                    path: self.parse_module_path()?,
                })
            }
            Some("type") => ItemKind::TypeAlias(self.parse_type_alias()?),
            Some("struct") => ItemKind::Struct(self.parse_struct_def()?),
            Some("enum") => ItemKind::Enum(self.parse_enum_def()?),
            Some("dispatch") => ItemKind::Dispatch(self.parse_dispatch()?),
            _ => return Err(self.unexpected("use, type, struct, enum or dispatch")),
        };
        Ok(Item {
            attributes,
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_module_path(&mut self) -> PResult<ModulePath> {
        let start = self.pos;
        let absolute = self.eat_str("::");
        let mut segments = Vec::new();
        loop {
            let word = self.peek_word().ok_or_else(|| self.unexpected("path segment"))?;
            self.pos += word.len();
            segments.push(if word == "super" {
                PathSegment::Super
            } else {
                PathSegment::Ident(word.to_string())
            });
            // `::` continues the path; a single `:` belongs to a dispatcher ref.
            if self.src[self.pos..].starts_with("::") {
                self.pos += 2;
            } else {
                break;
            }
        }
        let span = self.span_from(start);
        self.skip_trivia();
        Ok(ModulePath {
            absolute,
            segments,
            span,
        })
    }

    fn parse_type_alias(&mut self) -> PResult<TypeAlias> {
        self.eat_keyword("type");
        let name = self.parse_ident("type name")?;
        let params = self.parse_generic_params()?;
        self.expect(b'=', "=")?;
        let ty = self.parse_type()?;
        Ok(TypeAlias { name, params, ty })
    }

    fn parse_generic_params(&mut self) -> PResult<Vec<Ident>> {
        let mut params = Vec::new();
        if self.eat(b'<') {
            loop {
                params.push(self.parse_ident("generic parameter")?);
                if !self.eat(b',') {
                    break;
                }
                if self.peek() == Some(b'>') {
                    break;
                }
            }
            self.expect(b'>', ">")?;
        }
        Ok(params)
    }

    fn parse_struct_def(&mut self) -> PResult<StructDef> {
        self.eat_keyword("struct");
        let name = self.parse_ident("struct name")?;
        let params = self.parse_generic_params()?;
        let fields = self.parse_struct_body()?;
        Ok(StructDef {
            name,
            params,
            fields,
        })
    }

    fn parse_struct_body(&mut self) -> PResult<Vec<StructField>> {
        let open = self.pos;
        self.expect(b'{', "{")?;
        let mut fields = Vec::new();
        loop {
            if self.eat(b'}') {
                return Ok(fields);
            }
            if self.at_eof() {
                return Err(ParseError::expecting(
                    ParseErrorKind::UnclosedDelimiter,
                    Span::new(open, self.pos),
                    "}",
                ));
            }
            fields.push(self.parse_struct_field()?);
            if !self.eat(b',') {
                self.expect(b'}', "} or ,")?;
                return Ok(fields);
            }
        }
    }

    fn parse_struct_field(&mut self) -> PResult<StructField> {
        let start = self.pos;
        let attributes = self.parse_attributes()?;
        let kind = if self.eat_str("...") {
            FieldKind::Spread {
                ty: self.parse_type()?,
            }
        } else if self.peek() == Some(b'[') {
            self.eat(b'[');
            let key = self.parse_type()?;
            self.expect(b']', "]")?;
            self.expect(b':', ":")?;
            let value = self.parse_type()?;
            FieldKind::Computed { key, value }
        } else {
            let name = if self.peek() == Some(b'"') {
                let (name, span) = self.parse_string_literal()?;
                Ident::new(name, span)
            } else {
                self.parse_ident("field name")?
            };
            let optional = self.eat(b'?');
            self.expect(b':', ":")?;
            let ty = self.parse_type()?;
            FieldKind::Named { name, optional, ty }
        };
        Ok(StructField {
            attributes,
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_enum_def(&mut self) -> PResult<EnumDef> {
        self.eat_keyword("enum");
        self.expect(b'(', "(")?;
        let base_start = self.pos;
        let base_word = self.parse_ident("enum base type")?;
        let base = Primitive::from_keyword(&base_word.name)
            .ok_or_else(|| ParseError::expecting(ParseErrorKind::UnexpectedToken, base_word.span, "primitive type"))?;
        let base_span = self.span_from(base_start);
        self.expect(b')', ")")?;
        let name = self.parse_ident("enum name")?;
        self.expect(b'{', "{")?;
        let mut entries = Vec::new();
        loop {
            if self.eat(b'}') {
                break;
            }
            let entry_start = self.pos;
            let attributes = self.parse_attributes()?;
            let entry_name = self.parse_ident("enum entry name")?;
            self.expect(b'=', "=")?;
            let value = self.parse_literal()?;
            entries.push(EnumEntry {
                attributes,
                name: entry_name,
                value,
                span: self.span_from(entry_start),
            });
            if !self.eat(b',') {
                self.expect(b'}', "} or ,")?;
                break;
            }
        }
        Ok(EnumDef {
            base,
            base_span,
            name,
            entries,
        })
    }

    fn parse_literal(&mut self) -> PResult<Literal> {
        if self.peek() == Some(b'"') {
            let (s, _) = self.parse_string_literal()?;
            return Ok(Literal::String(s));
        }
        if self.at_number_start() {
            let (lit, _) = self.parse_number()?;
            return Ok(lit);
        }
        if self.eat_keyword("true") {
            return Ok(Literal::Bool(true));
        }
        if self.eat_keyword("false") {
            return Ok(Literal::Bool(false));
        }
        Err(self.unexpected("literal"))
    }

    // ------------------------------------------------------------------
    // Dispatch statements
    // ------------------------------------------------------------------

    fn parse_dispatch(&mut self) -> PResult<DispatchItem> {
        let start = self.pos;
        self.eat_keyword("dispatch");
        let namespace = self.parse_ident("dispatcher namespace")?;
        self.expect(b':', ":")?;
        let resource = self.parse_resource_path()?;
        self.expect(b'[', "[")?;
        let mut keys = Vec::new();
        loop {
            keys.push(self.parse_dispatch_key()?);
            if !self.eat(b',') {
                break;
            }
            if self.peek() == Some(b']') {
                break;
            }
        }
        self.expect(b']', "]")?;
        let params = self.parse_generic_params()?;
        if !self.eat_keyword("to") {
            return Err(self.unexpected("to"));
        }
        let target = if self.peek_word() == Some("struct") {
            // `struct Name { … }` names the struct; a bare `struct { … }`
            // stays an anonymous literal.
            let checkpoint = self.pos;
            self.eat_keyword("struct");
            if self.peek_word().is_some() {
                self.pos = checkpoint;
                DispatchTarget::Struct(self.parse_struct_def()?)
            } else {
                self.pos = checkpoint;
                DispatchTarget::Type(self.parse_type()?)
            }
        } else {
            DispatchTarget::Type(self.parse_type()?)
        };
        Ok(DispatchItem {
            namespace,
            resource,
            keys,
            params,
            target,
            span: self.span_from(start),
        })
    }

    fn parse_resource_path(&mut self) -> PResult<Vec<Ident>> {
        let mut segments = vec![self.parse_resource_segment()?];
        while self.peek() == Some(b'/') {
            self.pos += 1;
            segments.push(self.parse_resource_segment()?);
        }
        self.skip_trivia();
        Ok(segments)
    }

    /// Resource path segments without consuming trailing trivia, so `/` joins
    /// stay unambiguous.
    fn parse_resource_segment(&mut self) -> PResult<Ident> {
        let start = self.pos;
        let word = self
            .peek_word()
            .ok_or_else(|| self.unexpected("resource path segment"))?;
        self.pos += word.len();
        Ok(Ident::new(word, self.span_from(start)))
    }

    fn parse_dispatch_key(&mut self) -> PResult<DispatchKey> {
        let start = self.pos;
        if self.peek() == Some(b'%') {
            self.pos += 1;
            let word = self.parse_ident("dispatch key")?;
            return match word.name.as_str() {
                "fallback" | "unknown" | "none" => Ok(DispatchKey::Fallback {
                    span: self.span_from(start),
                }),
                _ => Err(ParseError::expecting(
                    ParseErrorKind::UnexpectedToken,
                    word.span,
                    "%fallback, %unknown or %none",
                )),
            };
        }
        if self.peek() == Some(b'"') {
            let (name, span) = self.parse_string_literal()?;
            return Ok(DispatchKey::Name { name, span });
        }
        let segments = self.parse_resource_path()?;
        let name = segments
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>()
            .join("/");
        Ok(DispatchKey::Name {
            name,
            span: self.span_from(start),
        })
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn parse_type(&mut self) -> PResult<TypeExpr> {
        if self.peek() == Some(b'#') {
            let attributes = self.parse_attributes()?;
            let ty = self.parse_type_no_attributes()?;
            return Ok(TypeExpr::Attributed {
                attributes,
                ty: Box::new(ty),
            });
        }
        self.parse_type_no_attributes()
    }

    fn parse_type_no_attributes(&mut self) -> PResult<TypeExpr> {
        let base = self.parse_type_base()?;
        self.parse_type_postfix(base)
    }

    fn parse_type_postfix(&mut self, mut ty: TypeExpr) -> PResult<TypeExpr> {
        // Generic instantiation binds tighter than `@`.
        if matches!(ty, TypeExpr::Ident(_) | TypeExpr::Path(_)) && self.peek() == Some(b'<') {
            let start = ty.span().start;
            self.eat(b'<');
            let mut args = Vec::new();
            loop {
                args.push(self.parse_type()?);
                if !self.eat(b',') {
                    break;
                }
                if self.peek() == Some(b'>') {
                    break;
                }
            }
            self.expect(b'>', ">")?;
            ty = TypeExpr::Generic {
                base: Box::new(ty),
                args,
                span: self.span_from(start),
            };
        }
        if self.eat(b'@') {
            let range = self.parse_range()?;
            ty = match ty {
                // `[T] @ 1..4` constrains the array length.
                TypeExpr::Array { elem, len: None, span } => TypeExpr::Array {
                    elem,
                    len: Some(range),
                    span: span.cover(range.span),
                },
                other => {
                    let span = other.span().cover(range.span);
                    TypeExpr::Constrained {
                        base: Box::new(other),
                        range,
                        span,
                    }
                }
            };
        }
        Ok(ty)
    }

    fn parse_type_base(&mut self) -> PResult<TypeExpr> {
        let start = self.pos;
        match self.peek() {
            Some(b'(') => self.parse_union(),
            Some(b'[') => {
                self.eat(b'[');
                let elem = self.parse_type()?;
                self.expect(b']', "]")?;
                Ok(TypeExpr::Array {
                    elem: Box::new(elem),
                    len: None,
                    span: self.span_from(start),
                })
            }
            Some(b'"') => {
                let (s, span) = self.parse_string_literal()?;
                Ok(TypeExpr::Literal {
                    value: Literal::String(s),
                    span,
                })
            }
            Some(_) if self.at_number_start() => {
                let (value, span) = self.parse_number()?;
                Ok(TypeExpr::Literal { value, span })
            }
            _ => {
                if self.src[self.pos..].starts_with("::") {
                    return Ok(TypeExpr::Path(self.parse_module_path()?));
                }
                let word = self.peek_word().ok_or_else(|| self.unexpected("type"))?;
                if word == "struct" {
                    return self.parse_struct_literal();
                }
                if word == "true" || word == "false" {
                    let span = Span::new(self.pos, self.pos + word.len());
                    let value = Literal::Bool(word == "true");
                    self.pos += word.len();
                    self.skip_trivia();
                    return Ok(TypeExpr::Literal { value, span });
                }
                if let Some(prim) = Primitive::from_keyword(word) {
                    let span = Span::new(self.pos, self.pos + word.len());
                    self.pos += word.len();
                    self.skip_trivia();
                    return Ok(TypeExpr::Primitive { prim, span });
                }
                // Identifier: may open a dispatcher reference (`ns:…`) or a
                // `::` path; otherwise it is a plain reference.
                if self.src[self.pos + word.len()..].starts_with("::") {
                    return Ok(TypeExpr::Path(self.parse_module_path()?));
                }
                if self.src[self.pos + word.len()..].starts_with(':')
                    && !self.src[self.pos + word.len()..].starts_with("::")
                {
                    return self.parse_complex_ref();
                }
                let ident = self.parse_ident("type")?;
                Ok(TypeExpr::Ident(ident))
            }
        }
    }

    fn parse_union(&mut self) -> PResult<TypeExpr> {
        let start = self.pos;
        self.expect(b'(', "(")?;
        let mut members = Vec::new();
        if self.eat(b')') {
            // `()` is not a type; report where the member should have been.
            return Err(ParseError::expecting(
                ParseErrorKind::UnexpectedToken,
                self.span_from(start),
                "type",
            ));
        }
        loop {
            members.push(self.parse_type()?);
            if !self.eat(b'|') {
                break;
            }
            if self.peek() == Some(b')') {
                break; // trailing |
            }
        }
        self.expect(b')', ")")?;
        let span = self.span_from(start);
        if members.len() == 1 {
            // Parenthesized single type, not a union.
            return Ok(members.into_iter().next().unwrap());
        }
        Ok(TypeExpr::Union { members, span })
    }

    fn parse_struct_literal(&mut self) -> PResult<TypeExpr> {
        let start = self.pos;
        self.eat_keyword("struct");
        let fields = self.parse_struct_body()?;
        Ok(TypeExpr::StructLiteral {
            fields,
            span: self.span_from(start),
        })
    }

    fn parse_complex_ref(&mut self) -> PResult<TypeExpr> {
        let start = self.pos;
        let namespace = self.parse_ident("namespace")?;
        self.expect(b':', ":")?;
        let resource = self.parse_resource_path()?;
        let index = self.parse_dispatch_index()?;
        let mut args = Vec::new();
        if self.eat(b'<') {
            loop {
                args.push(self.parse_type()?);
                if !self.eat(b',') {
                    break;
                }
                if self.peek() == Some(b'>') {
                    break;
                }
            }
            self.expect(b'>', ">")?;
        }
        Ok(TypeExpr::Complex(ComplexRef {
            namespace,
            resource,
            index,
            args,
            span: self.span_from(start),
        }))
    }

    fn parse_dispatch_index(&mut self) -> PResult<DispatchIndex> {
        let start = self.pos;
        if self.src[self.pos..].starts_with("[[") {
            self.pos += 2;
            self.skip_trivia();
            let accessor = self.parse_accessor(start)?;
            if !self.eat_str("]]") {
                return Err(ParseError::expecting(
                    ParseErrorKind::UnclosedDelimiter,
                    self.span_from(start),
                    "]]",
                ));
            }
            return Ok(DispatchIndex::Dynamic(accessor));
        }
        self.expect(b'[', "[")?;
        let key = match self.parse_dispatch_key()? {
            DispatchKey::Name { name, .. } => name,
            DispatchKey::Fallback { .. } => "%fallback".to_string(),
        };
        self.expect(b']', "]")?;
        Ok(DispatchIndex::Static {
            key,
            span: self.span_from(start),
        })
    }

    fn parse_accessor(&mut self, start: usize) -> PResult<Accessor> {
        let root = if self.peek() == Some(b'%') {
            self.pos += 1;
            let word = self.parse_ident("accessor")?;
            match word.name.as_str() {
                "key" => AccessorRoot::Key,
                "parent" => AccessorRoot::Parent,
                "fallback" | "unknown" | "none" => AccessorRoot::Fallback,
                _ => {
                    return Err(ParseError::expecting(
                        ParseErrorKind::UnexpectedToken,
                        word.span,
                        "%key, %parent, %fallback, %unknown or %none",
                    ))
                }
            }
        } else {
            let word = self.parse_ident("accessor")?;
            AccessorRoot::Field(word.name)
        };
        let mut path = Vec::new();
        while self.peek() == Some(b'.') {
            self.pos += 1;
            let word = self.parse_ident("accessor segment")?;
            path.push(word.name);
        }
        Ok(Accessor {
            root,
            path,
            span: self.span_from(start),
        })
    }

    // ------------------------------------------------------------------
    // Ranges
    // ------------------------------------------------------------------

    /// Everything after `@`: a bare number or a `..` range with optional
    /// exclusive markers.
    fn parse_range(&mut self) -> PResult<RangeExpr> {
        let start = self.pos;
        let mut min = None;
        if self.at_number_start() {
            let (lit, _) = self.parse_number()?;
            min = Some(literal_to_f64(&lit));
        }
        let min_exclusive = if self.src[self.pos..].starts_with("<..") {
            self.pos += 1;
            true
        } else {
            false
        };
        if !self.eat_str("..") {
            return match (min, min_exclusive) {
                // Bare number: exact value.
                (Some(value), false) => Ok(RangeExpr {
                    min: Some(value),
                    max: Some(value),
                    min_exclusive: false,
                    max_exclusive: false,
                    span: self.span_from(start),
                }),
                _ => Err(ParseError::expecting(
                    ParseErrorKind::IllegalRange,
                    self.span_from(start),
                    "range",
                )),
            };
        }
        let max_exclusive = self.eat(b'<');
        let mut max = None;
        if self.at_number_start() {
            let (lit, _) = self.parse_number()?;
            max = Some(literal_to_f64(&lit));
        }
        let span = self.span_from(start);
        if min.is_none() && max.is_none() {
            return Err(ParseError::expecting(
                ParseErrorKind::IllegalRange,
                span,
                "at least one endpoint",
            ));
        }
        if let (Some(a), Some(b)) = (min, max) {
            if a > b {
                return Err(ParseError::expecting(
                    ParseErrorKind::IllegalRange,
                    span,
                    "min <= max",
                ));
            }
        }
        Ok(RangeExpr {
            min,
            max,
            min_exclusive,
            max_exclusive,
            span,
        })
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Zero or more `#[…]` groups; each group may carry several items.
    fn parse_attributes(&mut self) -> PResult<Vec<Attribute>> {
        let mut attributes = Vec::new();
        while self.peek() == Some(b'#') {
            let open = self.pos;
            self.pos += 1;
            self.expect(b'[', "[")?;
            loop {
                attributes.push(self.parse_attribute_item()?);
                if !self.eat(b',') {
                    break;
                }
                if self.peek() == Some(b']') {
                    break;
                }
            }
            if !self.eat(b']') {
                return Err(ParseError::expecting(
                    ParseErrorKind::UnclosedDelimiter,
                    Span::new(open, self.pos),
                    "]",
                ));
            }
        }
        Ok(attributes)
    }

    fn parse_attribute_item(&mut self) -> PResult<Attribute> {
        let start = self.pos;
        let name = self.parse_ident("attribute name")?;
        let value = if self.eat(b'=') {
            if self.peek() == Some(b'(') {
                Some(self.parse_attr_args()?)
            } else {
                Some(self.parse_attr_value()?)
            }
        } else if self.peek() == Some(b'(') {
            Some(self.parse_attr_args()?)
        } else {
            None
        };
        Ok(Attribute {
            name,
            value,
            span: self.span_from(start),
        })
    }

    fn parse_attr_args(&mut self) -> PResult<AttributeValue> {
        let start = self.pos;
        self.expect(b'(', "(")?;
        let mut items = Vec::new();
        if !self.eat(b')') {
            loop {
                items.push(self.parse_attr_value()?);
                if !self.eat(b',') {
                    break;
                }
                if self.peek() == Some(b')') {
                    break;
                }
            }
            self.expect(b')', ")")?;
        }
        Ok(AttributeValue::Args {
            items,
            span: self.span_from(start),
        })
    }

    fn parse_attr_value(&mut self) -> PResult<AttributeValue> {
        let start = self.pos;
        if self.peek() == Some(b'"') {
            let (s, span) = self.parse_string_literal()?;
            return Ok(AttributeValue::Literal {
                value: Literal::String(s),
                span,
            });
        }
        if self.at_number_start() {
            let (value, span) = self.parse_number()?;
            return Ok(AttributeValue::Literal { value, span });
        }
        if self.peek() == Some(b'[') {
            self.eat(b'[');
            let mut items = Vec::new();
            if !self.eat(b']') {
                loop {
                    items.push(self.parse_attr_value()?);
                    if !self.eat(b',') {
                        break;
                    }
                    if self.peek() == Some(b']') {
                        break;
                    }
                }
                self.expect(b']', "]")?;
            }
            return Ok(AttributeValue::Array {
                items,
                span: self.span_from(start),
            });
        }
        let word = self.peek_word().ok_or_else(|| self.unexpected("attribute value"))?;
        if word == "true" || word == "false" {
            let span = Span::new(self.pos, self.pos + word.len());
            let value = Literal::Bool(word == "true");
            self.pos += word.len();
            self.skip_trivia();
            return Ok(AttributeValue::Literal { value, span });
        }
        let ident = self.parse_ident("attribute value")?;
        if self.peek() == Some(b'(') {
            let args = match self.parse_attr_args()? {
                AttributeValue::Args { items, .. } => items,
                _ => unreachable!(),
            };
            return Ok(AttributeValue::Call {
                name: ident,
                args,
                span: self.span_from(start),
            });
        }
        Ok(AttributeValue::Word(ident))
    }
}

fn literal_to_f64(lit: &Literal) -> f64 {
    match lit {
        Literal::Int(i) => *i as f64,
        Literal::Float(x) => *x,
        Literal::Bool(_) | Literal::String(_) => f64::NAN,
    }
}

fn starts_with_word(s: &str, word: &str) -> bool {
    s.starts_with(word)
        && !s[word.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> Module {
        let result = parse("test::module", text);
        assert!(
            result.errors.is_empty(),
            "unexpected parse errors: {:?}",
            result.errors
        );
        result.module
    }

    #[test]
    fn parses_use_statement() {
        let module = parse_ok("use super::data::Thing\n");
        let ItemKind::Use(use_item) = &module.items[0].kind else {
            panic!("expected use item");
        };
        assert!(!use_item.path.absolute);
        assert_eq!(use_item.path.segments.len(), 3);
        assert_eq!(use_item.path.leaf(), Some("Thing"));
        assert_eq!(use_item.path.segments[0], PathSegment::Super);
    }

    #[test]
    fn parses_struct_with_optional_and_spread() {
        let module = parse_ok(
            "struct Biome {\n\ttemperature: float,\n\tdownfall?: float @ 0..1,\n\t...Base,\n}\n",
        );
        let ItemKind::Struct(def) = &module.items[0].kind else {
            panic!("expected struct");
        };
        assert_eq!(def.name.name, "Biome");
        assert_eq!(def.fields.len(), 3);
        let FieldKind::Named { name, optional, .. } = &def.fields[1].kind else {
            panic!("expected named field");
        };
        assert_eq!(name.name, "downfall");
        assert!(optional);
        assert!(matches!(def.fields[2].kind, FieldKind::Spread { .. }));
    }

    #[test]
    fn parses_computed_field() {
        let module = parse_ok("struct Pools {\n\t[string]: [int],\n}\n");
        let ItemKind::Struct(def) = &module.items[0].kind else {
            panic!("expected struct");
        };
        let FieldKind::Computed { key, value } = &def.fields[0].kind else {
            panic!("expected computed field");
        };
        assert!(matches!(key, TypeExpr::Primitive { prim: Primitive::String, .. }));
        assert!(matches!(value, TypeExpr::Array { .. }));
    }

    #[test]
    fn parses_enum() {
        let module = parse_ok("enum(string) Color {\n\tRed = \"red\",\n\tBlue = \"blue\",\n}\n");
        let ItemKind::Enum(def) = &module.items[0].kind else {
            panic!("expected enum");
        };
        assert_eq!(def.base, Primitive::String);
        assert_eq!(def.entries.len(), 2);
        assert_eq!(def.entries[0].value, Literal::String("red".to_string()));
    }

    #[test]
    fn parses_dispatch_to_inline_struct() {
        let module =
            parse_ok("dispatch minecraft:worldgen/biome[plains] to struct Plains { depth: float }\n");
        let ItemKind::Dispatch(item) = &module.items[0].kind else {
            panic!("expected dispatch");
        };
        assert_eq!(item.namespace.name, "minecraft");
        assert_eq!(item.resource.len(), 2);
        assert!(matches!(&item.keys[0], DispatchKey::Name { name, .. } if name == "plains"));
        assert!(matches!(item.target, DispatchTarget::Struct(_)));
    }

    #[test]
    fn parses_dispatch_fallback_key() {
        let module = parse_ok("dispatch minecraft:loot_function[%unknown] to struct Unknown {}\n");
        let ItemKind::Dispatch(item) = &module.items[0].kind else {
            panic!("expected dispatch");
        };
        assert!(matches!(item.keys[0], DispatchKey::Fallback { .. }));
    }

    #[test]
    fn parses_dynamic_dispatcher_reference() {
        let module = parse_ok("type Ref = minecraft:chunk_generator[[type]]\n");
        let ItemKind::TypeAlias(alias) = &module.items[0].kind else {
            panic!("expected alias");
        };
        let TypeExpr::Complex(complex) = &alias.ty else {
            panic!("expected complex ref, got {:?}", alias.ty);
        };
        assert_eq!(complex.resource_id(), "minecraft:chunk_generator");
        let DispatchIndex::Dynamic(accessor) = &complex.index else {
            panic!("expected dynamic index");
        };
        assert_eq!(accessor.root, AccessorRoot::Field("type".to_string()));
    }

    #[test]
    fn parses_parent_accessor() {
        let module = parse_ok("type Ref = minecraft:block_state[[%parent.Name]]\n");
        let ItemKind::TypeAlias(alias) = &module.items[0].kind else {
            panic!("expected alias");
        };
        let TypeExpr::Complex(complex) = &alias.ty else {
            panic!("expected complex ref");
        };
        let DispatchIndex::Dynamic(accessor) = &complex.index else {
            panic!("expected dynamic index");
        };
        assert_eq!(accessor.root, AccessorRoot::Parent);
        assert_eq!(accessor.path, vec!["Name".to_string()]);
    }

    #[test]
    fn parses_union_with_trailing_pipe() {
        let module = parse_ok("type T = (int @ 0..10 | string |)\n");
        let ItemKind::TypeAlias(alias) = &module.items[0].kind else {
            panic!("expected alias");
        };
        let TypeExpr::Union { members, .. } = &alias.ty else {
            panic!("expected union, got {:?}", alias.ty);
        };
        assert_eq!(members.len(), 2);
        assert!(matches!(members[0], TypeExpr::Constrained { .. }));
    }

    #[test]
    fn parenthesized_single_type_is_not_a_union() {
        let module = parse_ok("type T = (int)\n");
        let ItemKind::TypeAlias(alias) = &module.items[0].kind else {
            panic!("expected alias");
        };
        assert!(matches!(alias.ty, TypeExpr::Primitive { prim: Primitive::Int, .. }));
    }

    #[test]
    fn parses_range_forms() {
        for (text, min, max, min_ex, max_ex) in [
            ("type A = int @ 1..5", Some(1.0), Some(5.0), false, false),
            ("type B = int @ 1..", Some(1.0), None, false, false),
            ("type C = int @ ..5", None, Some(5.0), false, false),
            ("type D = int @ 1<..5", Some(1.0), Some(5.0), true, false),
            ("type E = int @ 1..<5", Some(1.0), Some(5.0), false, true),
            ("type F = int @ 1<..<5", Some(1.0), Some(5.0), true, true),
            ("type G = float @ 3", Some(3.0), Some(3.0), false, false),
        ] {
            let module = parse_ok(text);
            let ItemKind::TypeAlias(alias) = &module.items[0].kind else {
                panic!("expected alias for {}", text);
            };
            let TypeExpr::Constrained { range, .. } = &alias.ty else {
                panic!("expected constrained type for {}", text);
            };
            assert_eq!((range.min, range.max), (min, max), "{}", text);
            assert_eq!(
                (range.min_exclusive, range.max_exclusive),
                (min_ex, max_ex),
                "{}",
                text
            );
        }
    }

    #[test]
    fn rejects_inverted_range() {
        let result = parse("m", "type T = int @ 5..1\n");
        assert!(result
            .errors
            .iter()
            .any(|e| e.kind == ParseErrorKind::IllegalRange));
    }

    #[test]
    fn parses_array_with_length_range() {
        let module = parse_ok("type T = [int] @ 1..3\n");
        let ItemKind::TypeAlias(alias) = &module.items[0].kind else {
            panic!("expected alias");
        };
        let TypeExpr::Array { len: Some(len), .. } = &alias.ty else {
            panic!("expected array with length, got {:?}", alias.ty);
        };
        assert_eq!(len.min, Some(1.0));
        assert_eq!(len.max, Some(3.0));
    }

    #[test]
    fn parses_attributes_on_items_and_fields() {
        let module = parse_ok(
            "#[since=\"1.19\"]\nstruct S {\n\t#[until=\"1.20.1\"] old?: int,\n\tid: #[id=\"item\"] string,\n}\n",
        );
        let item = &module.items[0];
        assert_eq!(item.attributes.len(), 1);
        assert_eq!(item.attributes[0].name.name, "since");
        assert_eq!(item.attributes[0].string_value(), Some("1.19"));
        let ItemKind::Struct(def) = &item.kind else {
            panic!("expected struct");
        };
        assert_eq!(def.fields[0].attributes[0].name.name, "until");
        let FieldKind::Named { ty, .. } = &def.fields[1].kind else {
            panic!("expected named field");
        };
        assert!(matches!(ty, TypeExpr::Attributed { .. }));
    }

    #[test]
    fn parses_attribute_arg_forms() {
        let module = parse_ok("#[a, b=1, c(x, 2), d=(y)]\nstruct S {}\n");
        let attrs = &module.items[0].attributes;
        assert_eq!(attrs.len(), 4);
        assert!(attrs[0].value.is_none());
        assert!(matches!(attrs[1].value, Some(AttributeValue::Literal { .. })));
        assert!(matches!(attrs[2].value, Some(AttributeValue::Args { .. })));
        assert!(matches!(attrs[3].value, Some(AttributeValue::Args { .. })));
    }

    #[test]
    fn parses_generics() {
        let module = parse_ok("type Pair<A, B> = struct { first: A, second: B }\n");
        let ItemKind::TypeAlias(alias) = &module.items[0].kind else {
            panic!("expected alias");
        };
        assert_eq!(alias.params.len(), 2);

        let module = parse_ok("type T = Pair<int, string>\n");
        let ItemKind::TypeAlias(alias) = &module.items[0].kind else {
            panic!("expected alias");
        };
        assert!(matches!(&alias.ty, TypeExpr::Generic { args, .. } if args.len() == 2));
    }

    #[test]
    fn comments_are_trivia() {
        let module = parse_ok(
            "// plain comment\n/// doc comment\nstruct S {\n\t// leading\n\tx: int, // trailing\n}\n",
        );
        assert_eq!(module.items.len(), 1);
    }

    #[test]
    fn recovers_after_broken_statement() {
        let result = parse("m", "struct Broken {\n\tx int\n}\n\nstruct Fine { y: int }\n");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.module.items.len(), 1);
        let ItemKind::Struct(def) = &result.module.items[0].kind else {
            panic!("expected the recovered struct");
        };
        assert_eq!(def.name.name, "Fine");
    }

    #[test]
    fn spans_are_within_source() {
        let text = "struct S { a: int, b: [string] @ 1.., c?: (int | boolean) }\n";
        let result = parse("m", text);
        assert!(result.errors.is_empty());
        for item in &result.module.items {
            assert!(item.span.start <= item.span.end);
            assert!(item.span.end <= text.len());
        }
    }

    #[test]
    fn unexpected_eof_is_reported() {
        let result = parse("m", "struct S {\n\tx: int,\n");
        assert!(!result.errors.is_empty());
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e.kind, ParseErrorKind::UnclosedDelimiter | ParseErrorKind::UnexpectedEof)));
    }
}
