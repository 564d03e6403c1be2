//! Parser for qualified-name specs.
//!
//! A spec names a type (and optionally one of its members) across parcels:
//!
//! ```text
//! Spec   := Id ('/' Id)? (':' Id)? Args? ('::' Id)?
//! Args   := '[' Spec (',' Spec)* ']'
//! ```
//!
//! An `Id` starts with a letter, `_`, `%`, or `$` and continues with
//! alphanumerics or `_`. Whitespace never appears inside a spec; the first
//! whitespace character terminates it.
//!
//! [`SpecParser`] is a pure tokenizer: it drives a [`SpecEval`] callback in
//! token order and stops at the first ill-formed character, reporting it via
//! [`SpecEval::syntax_err`]. Sequences that are token-legal but semantically
//! out of order (say, a `::` member before a `/` segment) are accepted here;
//! [`QualifiedName`] and the resolver reject them.

use std::fmt;

use crate::intern::Str;

/// Callback interface driven by [`SpecParser::parse`] in token order.
pub trait SpecEval {
    /// The leading id of a spec (the parcel head).
    fn root_id(&mut self, id: &Str);
    /// An id following `/`.
    fn slash_id(&mut self, id: &Str);
    /// An id following `:`.
    fn colon_id(&mut self, id: &Str);
    /// An id following `::`.
    fn dbl_colon_id(&mut self, id: &Str);
    /// A `[` opening an argument list.
    fn open_args(&mut self);
    /// A `]` closing an argument list.
    fn close_args(&mut self);
    /// The first ill-formed character; parsing stops after this.
    fn syntax_err(&mut self);
}

fn is_id_head(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '%' || c == '$'
}

fn is_id_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Tokenizer for qualified-name specs.
#[derive(Debug, Default)]
pub struct SpecParser;

/// Which separator an expected id follows.
#[derive(Clone, Copy)]
enum IdRole {
    Root,
    Slash,
    Colon,
    DblColon,
}

impl SpecParser {
    /// Parses `input`, driving `eval` in token order.
    ///
    /// Returns true iff no [`SpecEval::syntax_err`] was emitted. The emitted
    /// event sequence is always a prefix of a valid spec when this returns
    /// true.
    pub fn parse(input: &str, eval: &mut impl SpecEval) -> bool {
        let mut rest = input;
        let mut depth = 0usize;

        // A spec always leads with an id.
        let Some(tail) = Self::take_id(rest, IdRole::Root, eval) else {
            return false;
        };
        rest = tail;

        loop {
            let Some(c) = rest.chars().next() else {
                return true;
            };
            if c.is_whitespace() {
                // Whitespace terminates the spec; the rest is not ours.
                return true;
            }
            if let Some(tail) = rest.strip_prefix("::") {
                let Some(tail) = Self::take_id(tail, IdRole::DblColon, eval) else {
                    return false;
                };
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix(':') {
                let Some(tail) = Self::take_id(tail, IdRole::Colon, eval) else {
                    return false;
                };
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix('/') {
                let Some(tail) = Self::take_id(tail, IdRole::Slash, eval) else {
                    return false;
                };
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix('[') {
                eval.open_args();
                depth += 1;
                let Some(tail) = Self::take_id(tail, IdRole::Root, eval) else {
                    return false;
                };
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix(',') {
                if depth == 0 {
                    eval.syntax_err();
                    return false;
                }
                let Some(tail) = Self::take_id(tail, IdRole::Root, eval) else {
                    return false;
                };
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix(']') {
                if depth == 0 {
                    eval.syntax_err();
                    return false;
                }
                eval.close_args();
                depth -= 1;
                rest = tail;
            } else {
                eval.syntax_err();
                return false;
            }
        }
    }

    /// Consumes one id from the front of `rest` and emits it under `role`.
    /// Emits `syntax_err` and returns `None` if no id starts there.
    fn take_id<'a>(rest: &'a str, role: IdRole, eval: &mut impl SpecEval) -> Option<&'a str> {
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_id_head(c) => {}
            _ => {
                eval.syntax_err();
                return None;
            }
        }
        let end = chars
            .find(|&(_, c)| !is_id_continue(c))
            .map_or(rest.len(), |(i, _)| i);
        let id = Str::from(&rest[..end]);
        match role {
            IdRole::Root => eval.root_id(&id),
            IdRole::Slash => eval.slash_id(&id),
            IdRole::Colon => eval.colon_id(&id),
            IdRole::DblColon => eval.dbl_colon_id(&id),
        }
        Some(&rest[end..])
    }
}

/// Reasons a spec string fails to denote a qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// The tokenizer reported an ill-formed character.
    Syntax,
    /// Token-legal but out-of-order events (e.g. a `/` segment after `::`).
    IllFormed,
    /// The spec carries an argument list, which the linker cannot resolve.
    UnsupportedArgs,
    /// The spec names a parcel or module but no type.
    MissingTypeName,
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "ill-formed character in spec"),
            Self::IllFormed => write!(f, "spec segments out of order"),
            Self::UnsupportedArgs => write!(f, "argument lists are not resolvable"),
            Self::MissingTypeName => write!(f, "spec does not name a type"),
        }
    }
}

impl std::error::Error for SpecError {}

/// A parsed qualified name: `head(/path)*:name(::member)?`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    head: Str,
    path: Vec<Str>,
    name: Str,
    member: Option<Str>,
}

impl QualifiedName {
    /// Parses a spec string into a qualified name.
    ///
    /// Beyond tokenization this enforces segment order (head, then path
    /// segments, then the type name, then at most one member) and rejects
    /// argument lists.
    pub fn parse(spec: &str) -> Result<Self, SpecError> {
        let mut builder = Builder::default();
        SpecParser::parse(spec, &mut builder);
        builder.finish()
    }

    /// The parcel head.
    #[must_use]
    pub fn head(&self) -> &Str {
        &self.head
    }

    /// Module path segments under the parcel, outermost first.
    #[must_use]
    pub fn path(&self) -> &[Str] {
        &self.path
    }

    /// The module path joined with `/`, empty for the parcel's root module.
    #[must_use]
    pub fn path_string(&self) -> String {
        self.path.iter().map(Str::as_str).collect::<Vec<_>>().join("/")
    }

    /// The unqualified type name.
    #[must_use]
    pub fn name(&self) -> &Str {
        &self.name
    }

    /// The member segment, if any.
    #[must_use]
    pub fn member(&self) -> Option<&Str> {
        self.member.as_ref()
    }

    /// Rebuilds this name under a different parcel head.
    #[must_use]
    pub(crate) fn with_head(&self, head: Str) -> Self {
        Self {
            head,
            path: self.path.clone(),
            name: self.name.clone(),
            member: self.member.clone(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        for seg in &self.path {
            write!(f, "/{seg}")?;
        }
        write!(f, ":{}", self.name)?;
        if let Some(member) = &self.member {
            write!(f, "::{member}")?;
        }
        Ok(())
    }
}

/// Collects parser events into a [`QualifiedName`], enforcing segment order.
#[derive(Default)]
struct Builder {
    head: Option<Str>,
    path: Vec<Str>,
    name: Option<Str>,
    member: Option<Str>,
    err: Option<SpecError>,
}

impl Builder {
    fn fail(&mut self, err: SpecError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    fn finish(self) -> Result<QualifiedName, SpecError> {
        if let Some(err) = self.err {
            return Err(err);
        }
        let Some(head) = self.head else {
            return Err(SpecError::Syntax);
        };
        let Some(name) = self.name else {
            return Err(SpecError::MissingTypeName);
        };
        Ok(QualifiedName {
            head,
            path: self.path,
            name,
            member: self.member,
        })
    }
}

impl SpecEval for Builder {
    fn root_id(&mut self, id: &Str) {
        if self.head.is_some() {
            // A second root id only arises inside args.
            self.fail(SpecError::UnsupportedArgs);
        } else {
            self.head = Some(id.clone());
        }
    }

    fn slash_id(&mut self, id: &Str) {
        if self.name.is_some() || self.member.is_some() {
            self.fail(SpecError::IllFormed);
        } else {
            self.path.push(id.clone());
        }
    }

    fn colon_id(&mut self, id: &Str) {
        if self.name.is_some() || self.member.is_some() {
            self.fail(SpecError::IllFormed);
        } else {
            self.name = Some(id.clone());
        }
    }

    fn dbl_colon_id(&mut self, id: &Str) {
        if self.member.is_some() || self.name.is_none() {
            self.fail(SpecError::IllFormed);
        } else {
            self.member = Some(id.clone());
        }
    }

    fn open_args(&mut self) {
        self.fail(SpecError::UnsupportedArgs);
    }

    fn close_args(&mut self) {
        self.fail(SpecError::UnsupportedArgs);
    }

    fn syntax_err(&mut self) {
        self.fail(SpecError::Syntax);
    }
}
