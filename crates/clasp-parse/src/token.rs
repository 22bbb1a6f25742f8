use clasp_ast::span::SourceLocation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokKind {
    Int(i64),
    /// Raw quoted text, surrounding quotes included.
    Str(String),
    Ident(String),
    /// Intrinsic name including the leading dot, e.g. `.s+`.
    Intrinsic(String),
    KwLambda,
    KwLetrec,
    KwIf,
    LParen,
    RParen,
    LBrace,
    RBrace,
    At,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Tok {
    pub kind: TokKind,
    pub sl: SourceLocation,
}
