#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

pub mod span {
    use serde::Serialize;
    use std::fmt;

    /// Line/column position in the source text, 1-based.
    ///
    /// `line == 0` means the location is unknown (errors raised outside any
    /// particular source position).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
    pub struct SourceLocation {
        pub line: u32,
        pub column: u32,
    }

    impl SourceLocation {
        pub const START: SourceLocation = SourceLocation { line: 1, column: 1 };
        pub const UNKNOWN: SourceLocation = SourceLocation { line: 0, column: 0 };

        /// Advance past one character of input.
        pub fn advance(&mut self, c: char) {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    impl fmt::Display for SourceLocation {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.line == 0 || self.column == 0 {
                write!(f, "(SourceLocation N/A)")
            } else {
                write!(f, "(SourceLocation {} {})", self.line, self.column)
            }
        }
    }
}

pub mod ast {
    use super::span::SourceLocation;
    use serde::Serialize;
    use std::collections::BTreeSet;

    /// Index of a node in the [`Ast`] arena.
    ///
    /// Stack layers and closures refer to expressions by id, never by
    /// pointer, so the whole machine state stays plain data.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
    pub struct ExprId(u32);

    impl ExprId {
        pub fn index(self) -> usize {
            self.0 as usize
        }
    }

    #[derive(Clone, Debug, Serialize)]
    pub struct Ident {
        pub text: String,
        pub sl: SourceLocation,
    }

    /// One `name value` pair in a letrec binding list.
    #[derive(Clone, Debug, Serialize)]
    pub struct Binding {
        pub name: Ident,
        pub value: ExprId,
    }

    #[derive(Clone, Debug, Serialize)]
    pub enum ExprKind {
        Int(i64),
        /// Raw quoted text as it appeared in the source; unquoting happens
        /// when the runtime string value is materialized.
        Str(String),
        Var(String),
        Lambda {
            params: Vec<Ident>,
            body: ExprId,
        },
        Letrec {
            bindings: Vec<Binding>,
            body: ExprId,
        },
        If {
            cond: ExprId,
            then_branch: ExprId,
            else_branch: ExprId,
        },
        /// Braced sequence; never empty.
        Seq(Vec<ExprId>),
        Intrinsic {
            name: String,
            args: Vec<ExprId>,
        },
        Call {
            callee: ExprId,
            args: Vec<ExprId>,
        },
        /// `@ field target`: project a binding out of a closure's
        /// captured environment.
        At {
            field: Ident,
            target: ExprId,
        },
    }

    #[derive(Clone, Debug, Serialize)]
    pub struct Node {
        pub kind: ExprKind,
        pub sl: SourceLocation,
        /// Identifiers used but not bound inside this subtree. Written by
        /// analysis, empty until then.
        pub free_vars: BTreeSet<String>,
        /// True iff this node's value is returned from the enclosing
        /// function body without further computation. Written by analysis.
        pub tail: bool,
    }

    /// The parsed program: an arena of nodes plus the root expression.
    #[derive(Clone, Debug, Default, Serialize)]
    pub struct Ast {
        nodes: Vec<Node>,
        root: ExprId,
    }

    impl Ast {
        pub fn push(&mut self, kind: ExprKind, sl: SourceLocation) -> ExprId {
            let id = ExprId(self.nodes.len() as u32);
            self.nodes.push(Node {
                kind,
                sl,
                free_vars: BTreeSet::new(),
                tail: false,
            });
            id
        }

        pub fn set_root(&mut self, root: ExprId) {
            self.root = root;
        }

        pub fn root(&self) -> ExprId {
            self.root
        }

        pub fn node(&self, id: ExprId) -> &Node {
            &self.nodes[id.index()]
        }

        pub fn node_mut(&mut self, id: ExprId) -> &mut Node {
            &mut self.nodes[id.index()]
        }

        pub fn len(&self) -> usize {
            self.nodes.len()
        }

        pub fn is_empty(&self) -> bool {
            self.nodes.is_empty()
        }

        /// Iterate over all node ids in arena order.
        pub fn ids(&self) -> impl Iterator<Item = ExprId> {
            (0..self.nodes.len() as u32).map(ExprId)
        }
    }
}

pub mod strings {
    //! The quoted-string codec shared by the lexer, literal
    //! pre-allocation, and the `.quote` / `.unquote` intrinsics.

    use std::fmt;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum UnquoteError {
        NotQuoted,
        InvalidEscape,
        IncompleteEscape,
    }

    impl fmt::Display for UnquoteError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                UnquoteError::NotQuoted => write!(f, "invalid quoted string"),
                UnquoteError::InvalidEscape => write!(f, "invalid escape sequence"),
                UnquoteError::IncompleteEscape => write!(f, "incomplete escape sequence"),
            }
        }
    }

    impl std::error::Error for UnquoteError {}

    /// Decode one escape byte (the `c` of `\c`).
    pub fn decode_escape(b: u8) -> Option<u8> {
        match b {
            b'\\' => Some(b'\\'),
            b'"' => Some(b'"'),
            b't' => Some(b'\t'),
            b'n' => Some(b'\n'),
            _ => None,
        }
    }

    /// Wrap `s` in quotes, escaping only backslashes and quotes. Tabs and
    /// newlines pass through verbatim; `unquote` accepts both spellings.
    ///
    /// Runtime strings are raw byte sequences, so the codec works on
    /// bytes; source literals are ASCII by the lexer's character set.
    pub fn quote(s: &[u8]) -> Vec<u8> {
        let mut r = Vec::with_capacity(s.len() + 2);
        r.push(b'"');
        for &b in s {
            match b {
                b'\\' => r.extend_from_slice(b"\\\\"),
                b'"' => r.extend_from_slice(b"\\\""),
                _ => r.push(b),
            }
        }
        r.push(b'"');
        r
    }

    /// Strip surrounding quotes and decode escapes.
    pub fn unquote(s: &[u8]) -> Result<Vec<u8>, UnquoteError> {
        let inner = s
            .strip_prefix(b"\"")
            .and_then(|rest| rest.strip_suffix(b"\""))
            .ok_or(UnquoteError::NotQuoted)?;
        let mut r = Vec::with_capacity(inner.len());
        let mut bytes = inner.iter().copied();
        while let Some(b) = bytes.next() {
            if b == b'\\' {
                let esc = bytes.next().ok_or(UnquoteError::IncompleteEscape)?;
                r.push(decode_escape(esc).ok_or(UnquoteError::InvalidEscape)?);
            } else {
                r.push(b);
            }
        }
        Ok(r)
    }

}
