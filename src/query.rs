//! Query compilation boundary.
//!
//! A [`QueryCompiler`] turns query text into SQL over the store's [`SchemaLayout`].
//! Full SPARQL lives outside this crate; [`PatternCompiler`] handles basic graph
//! patterns:
//!
//! ```text
//! PREFIX ex: <http://example.org/ex#>
//! SELECT ?doc ?title WHERE {
//!     ?doc a ex:Document .
//!     ?doc ex:title ?title .
//!     ?doc fts:match "rust" .
//! } LIMIT 10
//! ```
//!
//! `~name` placeholders are filled from the bindings passed alongside the text.

use std::collections::HashMap;
use std::fmt::Write as _;

use rusqlite::types::Value as SqlValue;

use crate::error::{FormatError, Result};
use crate::ontology::{vocab, DataType, Ontology, Property};
use crate::schema::{quote, SchemaLayout, FTS_TABLE, RESOURCE_TABLE};
use crate::value::{encode_literal, Literal, Term};

/// Executable form of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub variables: Vec<String>,
    /// How to decode each output column.
    pub column_types: Vec<DataType>,
}

pub trait QueryCompiler: Send + Sync {
    fn compile(
        &self,
        ontology: &Ontology,
        layout: &SchemaLayout,
        text: &str,
        bindings: &[(&str, Term)],
    ) -> Result<CompiledQuery>;
}

/// Compiles basic graph patterns with constant predicates.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternCompiler;

impl QueryCompiler for PatternCompiler {
    fn compile(
        &self,
        ontology: &Ontology,
        layout: &SchemaLayout,
        text: &str,
        bindings: &[(&str, Term)],
    ) -> Result<CompiledQuery> {
        let tokens = tokenize(text)?;
        let parsed = Parser::new(tokens).parse()?;
        Planner::new(ontology, layout, &parsed.prefixes, bindings).plan(&parsed)
    }
}

fn query_error(message: impl Into<String>) -> crate::error::Error {
    FormatError::Query(message.into()).into()
}

// --- Lexing -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Var(String),
    Param(String),
    Iri(String),
    PName(String),
    Literal {
        value: String,
        language: Option<String>,
        datatype: Option<Box<Token>>,
    },
    Number(String),
    Word(String),
    LBrace,
    RBrace,
    Dot,
    Star,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':')
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let take_name = |start: usize| -> (String, usize) {
        let mut end = start;
        while end < chars.len()
            && (is_name_char(chars[end])
                || (chars[end] == '.' && chars.get(end + 1).is_some_and(|c| is_name_char(*c))))
        {
            end += 1;
        }
        (chars[start..end].iter().collect(), end)
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '?' | '$' | '~' => {
                let (name, end) = take_name(i + 1);
                if name.is_empty() {
                    return Err(query_error(format!("empty variable name at offset {i}")));
                }
                tokens.push(if c == '~' { Token::Param(name) } else { Token::Var(name) });
                i = end;
            }
            '<' => {
                let end = chars[i..]
                    .iter()
                    .position(|&c| c == '>')
                    .map(|p| i + p)
                    .ok_or_else(|| query_error("unterminated IRI"))?;
                tokens.push(Token::Iri(chars[i + 1..end].iter().collect()));
                i = end + 1;
            }
            '"' | '\'' => {
                let quote_char = c;
                let mut value = String::new();
                i += 1;
                loop {
                    let Some(&c) = chars.get(i) else {
                        return Err(query_error("unterminated string literal"));
                    };
                    i += 1;
                    match c {
                        '\\' => {
                            let escaped = chars.get(i).copied().ok_or_else(|| query_error("dangling escape"))?;
                            i += 1;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                        }
                        c if c == quote_char => break,
                        c => value.push(c),
                    }
                }
                let mut language = None;
                let mut datatype = None;
                if chars.get(i) == Some(&'@') {
                    let (lang, end) = take_name(i + 1);
                    language = Some(lang);
                    i = end;
                } else if chars.get(i) == Some(&'^') && chars.get(i + 1) == Some(&'^') {
                    i += 2;
                    let dt = if chars.get(i) == Some(&'<') {
                        let end = chars[i..]
                            .iter()
                            .position(|&c| c == '>')
                            .map(|p| i + p)
                            .ok_or_else(|| query_error("unterminated datatype IRI"))?;
                        let iri = chars[i + 1..end].iter().collect();
                        i = end + 1;
                        Token::Iri(iri)
                    } else {
                        let (name, end) = take_name(i);
                        i = end;
                        Token::PName(name)
                    };
                    datatype = Some(Box::new(dt));
                }
                tokens.push(Token::Literal {
                    value,
                    language,
                    datatype,
                });
            }
            _ if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || matches!(chars[i], 'e' | 'E')
                        || (chars[i] == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)))
                {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            _ if is_name_char(c) => {
                let (name, end) = take_name(i);
                i = end;
                tokens.push(if name.contains(':') { Token::PName(name) } else { Token::Word(name) });
            }
            other => return Err(query_error(format!("unexpected character {other:?} at offset {i}"))),
        }
    }
    Ok(tokens)
}

// --- Parsing ------------------------------------------------------------------------

#[derive(Debug)]
struct Pattern {
    subject: Token,
    predicate: Token,
    object: Token,
}

#[derive(Debug, Default)]
struct Parsed {
    prefixes: HashMap<String, String>,
    /// `None` projects every variable in order of appearance.
    projection: Option<Vec<String>>,
    patterns: Vec<Pattern>,
    limit: Option<u64>,
}

struct Parser {
    tokens: std::iter::Peekable<std::vec::IntoIter<Token>>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into_iter().peekable(),
        }
    }

    fn is_word(token: Option<&Token>, word: &str) -> bool {
        matches!(token, Some(Token::Word(w)) if w.eq_ignore_ascii_case(word))
    }

    fn parse(mut self) -> Result<Parsed> {
        let mut parsed = Parsed::default();

        while Self::is_word(self.tokens.peek(), "prefix") {
            self.tokens.next();
            let Some(Token::PName(name)) = self.tokens.next() else {
                return Err(query_error("PREFIX must be followed by `name:`"));
            };
            let Some(Token::Iri(iri)) = self.tokens.next() else {
                return Err(query_error(format!("PREFIX {name} must be followed by an IRI")));
            };
            parsed.prefixes.insert(name.trim_end_matches(':').to_string(), iri);
        }

        let braced = if Self::is_word(self.tokens.peek(), "select") {
            self.tokens.next();
            let mut vars = Vec::new();
            let mut star = false;
            loop {
                match self.tokens.next() {
                    Some(Token::Var(v)) => vars.push(v),
                    Some(Token::Star) => star = true,
                    Some(Token::Word(w)) if w.eq_ignore_ascii_case("where") => break,
                    Some(Token::LBrace) => {
                        parsed.projection = (!star).then_some(vars);
                        return self.body(parsed, true);
                    }
                    other => return Err(query_error(format!("unexpected {other:?} in SELECT clause"))),
                }
            }
            parsed.projection = (!star).then_some(vars);
            if self.tokens.next() != Some(Token::LBrace) {
                return Err(query_error("expected `{` after WHERE"));
            }
            true
        } else if self.tokens.peek() == Some(&Token::LBrace) {
            self.tokens.next();
            true
        } else {
            false
        };
        self.body(parsed, braced)
    }

    fn body(mut self, mut parsed: Parsed, braced: bool) -> Result<Parsed> {
        loop {
            match self.tokens.peek() {
                None if !braced => break,
                None => return Err(query_error("missing closing `}`")),
                Some(Token::RBrace) if braced => {
                    self.tokens.next();
                    break;
                }
                Some(Token::Dot) => {
                    self.tokens.next();
                }
                Some(_) => {
                    let mut term = || self.tokens.next().ok_or_else(|| query_error("incomplete triple pattern"));
                    let subject = term()?;
                    let predicate = term()?;
                    let object = term()?;
                    parsed.patterns.push(Pattern {
                        subject,
                        predicate,
                        object,
                    });
                }
            }
        }

        if Self::is_word(self.tokens.peek(), "limit") {
            self.tokens.next();
            let Some(Token::Number(n)) = self.tokens.next() else {
                return Err(query_error("LIMIT must be followed by a number"));
            };
            parsed.limit = Some(n.parse().map_err(|_| query_error(format!("invalid LIMIT {n}")))?);
        }
        if let Some(extra) = self.tokens.next() {
            return Err(query_error(format!("unexpected {extra:?} after query")));
        }
        if parsed.patterns.is_empty() {
            return Err(query_error("query has no triple patterns"));
        }
        Ok(parsed)
    }
}

// --- Planning -----------------------------------------------------------------------

struct Binding {
    expr: String,
    data_type: DataType,
}

struct Planner<'a> {
    ontology: &'a Ontology,
    layout: &'a SchemaLayout,
    prefixes: &'a HashMap<String, String>,
    bindings: &'a [(&'a str, Term)],
    from: Vec<String>,
    conditions: Vec<String>,
    params: Vec<SqlValue>,
    vars: Vec<String>,
    bound: HashMap<String, Binding>,
}

impl<'a> Planner<'a> {
    fn new(
        ontology: &'a Ontology,
        layout: &'a SchemaLayout,
        prefixes: &'a HashMap<String, String>,
        bindings: &'a [(&'a str, Term)],
    ) -> Self {
        Self {
            ontology,
            layout,
            prefixes,
            bindings,
            from: Vec::new(),
            conditions: Vec::new(),
            params: Vec::new(),
            vars: Vec::new(),
            bound: HashMap::new(),
        }
    }

    fn expand(&self, name: &str) -> Result<String> {
        if let Some((prefix, local)) = name.split_once(':') {
            if let Some(base) = self.prefixes.get(prefix) {
                return Ok(format!("{base}{local}"));
            }
        }
        self.ontology
            .expand_name(name)
            .ok_or_else(|| query_error(format!("unknown prefix in {name}")))
    }

    /// Resolve a constant token (or `~param`) to a term.
    fn constant(&self, token: &Token) -> Result<Option<Term>> {
        Ok(Some(match token {
            Token::Var(_) => return Ok(None),
            Token::Iri(iri) => Term::iri(iri.clone()),
            Token::PName(name) => Term::iri(self.expand(name)?),
            Token::Word(w) if w == "true" || w == "false" => Term::boolean(w == "true"),
            Token::Number(n) if n.contains(['.', 'e', 'E']) => Term::typed(n.clone(), DataType::Double),
            Token::Number(n) => Term::typed(n.clone(), DataType::Integer),
            Token::Literal {
                value,
                language,
                datatype,
            } => {
                let datatype = match datatype.as_deref() {
                    Some(Token::Iri(iri)) => Some(iri.clone()),
                    Some(Token::PName(name)) => Some(self.expand(name)?),
                    _ => None,
                };
                Term::Literal(Literal {
                    value: value.clone(),
                    datatype,
                    language: language.clone(),
                })
            }
            Token::Param(name) => self
                .bindings
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t.clone())
                .ok_or_else(|| query_error(format!("no value bound for ~{name}")))?,
            other => return Err(query_error(format!("unexpected {other:?} in triple pattern"))),
        }))
    }

    fn predicate(&self, token: &Token) -> Result<Predicate<'a>> {
        let uri = match token {
            Token::Word(w) if w == "a" => vocab::RDF_TYPE.to_string(),
            Token::Var(v) => return Err(query_error(format!("variable predicate ?{v} is not supported"))),
            other => match self.constant(other)? {
                Some(Term::Iri(iri)) => iri,
                _ => return Err(query_error(format!("predicate must be an IRI, got {other:?}"))),
            },
        };
        if uri == vocab::FTS_MATCH {
            return Ok(Predicate::FullText);
        }
        self.ontology
            .property_by_uri(&uri)
            .map(Predicate::Property)
            .ok_or_else(|| query_error(format!("unknown property <{uri}>")))
    }

    /// Bind `token` to `expr`: first use of a variable defines it, later uses and
    /// constants add conditions.
    fn bind(&mut self, token: &Token, expr: String, data_type: DataType) -> Result<()> {
        if let Token::Var(name) = token {
            match self.bound.get(name) {
                Some(existing) => self.conditions.push(format!("{expr} = {}", existing.expr)),
                None => {
                    self.vars.push(name.clone());
                    self.bound.insert(name.clone(), Binding { expr, data_type });
                }
            }
            return Ok(());
        }

        let Some(term) = self.constant(token)? else {
            return Ok(());
        };
        match (data_type, &term) {
            (DataType::Resource, Term::Iri(iri) | Term::BlankNode(iri)) => {
                self.conditions
                    .push(format!("{expr} = (SELECT ID FROM {RESOURCE_TABLE} WHERE Uri = ?)"));
                self.params.push(SqlValue::Text(iri.clone()));
            }
            (DataType::Resource, Term::Literal(_)) => {
                return Err(query_error(format!("{term} cannot match a resource")));
            }
            (_, Term::Literal(literal)) => {
                let value = encode_literal(data_type, literal).map_err(query_error)?;
                self.conditions.push(format!("{expr} = ?"));
                self.params.push(value);
            }
            (_, _) => return Err(query_error(format!("{term} cannot match a {data_type} value"))),
        }
        Ok(())
    }

    fn plan(mut self, parsed: &Parsed) -> Result<CompiledQuery> {
        for (i, pattern) in parsed.patterns.iter().enumerate() {
            let alias = format!("t{i}");
            match self.predicate(&pattern.predicate)? {
                Predicate::FullText => {
                    self.from.push(format!("{RESOURCE_TABLE} AS {alias}"));
                    self.bind(&pattern.subject, format!("{alias}.ID"), DataType::Resource)?;
                    let Some(Term::Literal(text)) = self.constant(&pattern.object)? else {
                        return Err(query_error("fts:match needs a literal search expression"));
                    };
                    self.conditions
                        .push(format!("{alias}.ID IN (SELECT rowid FROM {FTS_TABLE} WHERE {FTS_TABLE} MATCH ?)"));
                    self.params.push(SqlValue::Text(text.value));
                }
                Predicate::Property(property) => {
                    let storage = self.layout.storage(property.id());
                    let column = format!("{alias}.{}", quote(storage.column()));
                    self.from.push(format!("{} AS {alias}", quote(storage.table())));
                    if !storage.is_table() {
                        self.conditions.push(format!("{column} IS NOT NULL"));
                    }
                    self.bind(&pattern.subject, format!("{alias}.ID"), DataType::Resource)?;

                    if property.id() == self.ontology.rdf_type() && !matches!(pattern.object, Token::Var(_)) {
                        self.bind_class(&pattern.object, &column)?;
                    } else {
                        self.bind(&pattern.object, column, property.data_type())?;
                    }
                }
            }
        }

        let variables = match &parsed.projection {
            Some(vars) => {
                if let Some(missing) = vars.iter().find(|v| !self.bound.contains_key(*v)) {
                    return Err(query_error(format!("?{missing} is projected but never bound")));
                }
                vars.clone()
            }
            None => self.vars.clone(),
        };

        let mut sql = String::from("SELECT ");
        let mut column_types = Vec::with_capacity(variables.len());
        if variables.is_empty() {
            sql.push('1');
        }
        for (i, var) in variables.iter().enumerate() {
            let binding = &self.bound[var];
            if i > 0 {
                sql.push_str(", ");
            }
            if binding.data_type == DataType::Resource {
                let _ = write!(sql, "(SELECT Uri FROM {RESOURCE_TABLE} WHERE ID = {})", binding.expr);
            } else {
                sql.push_str(&binding.expr);
            }
            column_types.push(binding.data_type);
        }
        let _ = write!(sql, " FROM {}", self.from.join(", "));
        if !self.conditions.is_empty() {
            let _ = write!(sql, " WHERE {}", self.conditions.join(" AND "));
        }
        if let Some(limit) = parsed.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }

        tracing::debug!(sql = %sql, params = self.params.len(), "query compiled");
        Ok(CompiledQuery {
            sql,
            params: self.params,
            variables,
            column_types,
        })
    }

    /// `?x a ex:Class` matches instances of the class and of every descendant, each once.
    fn bind_class(&mut self, token: &Token, column: &str) -> Result<()> {
        let Some(Term::Iri(uri)) = self.constant(token)? else {
            return Err(query_error("rdf:type object must be a class IRI"));
        };
        let class = self
            .ontology
            .class_by_uri(&uri)
            .ok_or_else(|| query_error(format!("unknown class <{uri}>")))?;
        // Instances carry a type row for every ancestor, so the class's own id matches
        // subclass instances exactly once.
        let id = class
            .numeric_id()
            .ok_or_else(|| query_error(format!("class <{uri}> has no stored id")))?;
        self.conditions.push(format!("{column} = {id}"));
        Ok(())
    }
}

enum Predicate<'a> {
    Property(&'a Property),
    FullText,
}
