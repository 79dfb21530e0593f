//! Tokeniser for the event script language.
//!
//! Hand-rolled single pass over the bytes of the source.  Comments (`//`
//! and `/* */`) and whitespace are skipped; every token carries the line
//! and column it started at so parse errors can point into the config
//! file's script lines.

use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f32),
    Str(String),
    Ident(String),

    // Keywords
    Var,
    If,
    Else,
    For,
    While,
    Break,
    Continue,
    Return,
    Goto,
    True,
    False,
    This,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    AndAnd,
    OrOr,
    Shl,
    Shr,
    Assign,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    PlusPlus,
    MinusMinus,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
    pub column: u32,
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let mut lx = Lexer {
        src: source.as_bytes(),
        pos: 0,
        line: 1,
        column: 1,
    };
    let mut out = Vec::new();
    loop {
        lx.skip_trivia()?;
        let (line, column) = (lx.line, lx.column);
        let tok = lx.next_tok()?;
        let done = tok == Tok::Eof;
        out.push(Token { tok, line, column });
        if done {
            return Ok(out);
        }
    }
}

impl Lexer<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.src.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), ScriptError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_tok(&mut self) -> Result<Tok, ScriptError> {
        let Some(c) = self.peek() else {
            return Ok(Tok::Eof);
        };
        if c.is_ascii_digit() {
            return self.number();
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return Ok(self.word());
        }
        if c == b'"' || c == b'\'' {
            return self.string(c);
        }
        self.bump();
        let next = self.peek();
        let two = |lx: &mut Self, t: Tok| {
            lx.bump();
            t
        };
        let tok = match (c, next) {
            (b'+', Some(b'+')) => two(self, Tok::PlusPlus),
            (b'+', Some(b'=')) => two(self, Tok::PlusAssign),
            (b'-', Some(b'-')) => two(self, Tok::MinusMinus),
            (b'-', Some(b'=')) => two(self, Tok::MinusAssign),
            (b'*', Some(b'=')) => two(self, Tok::StarAssign),
            (b'/', Some(b'=')) => two(self, Tok::SlashAssign),
            (b'%', Some(b'=')) => two(self, Tok::PercentAssign),
            (b'&', Some(b'&')) => two(self, Tok::AndAnd),
            (b'|', Some(b'|')) => two(self, Tok::OrOr),
            (b'<', Some(b'<')) => two(self, Tok::Shl),
            (b'>', Some(b'>')) => two(self, Tok::Shr),
            (b'<', Some(b'=')) => two(self, Tok::Le),
            (b'>', Some(b'=')) => two(self, Tok::Ge),
            (b'=', Some(b'=')) => two(self, Tok::EqEq),
            (b'!', Some(b'=')) => two(self, Tok::Ne),
            (b'+', _) => Tok::Plus,
            (b'-', _) => Tok::Minus,
            (b'*', _) => Tok::Star,
            (b'/', _) => Tok::Slash,
            (b'%', _) => Tok::Percent,
            (b'&', _) => Tok::Amp,
            (b'|', _) => Tok::Pipe,
            (b'^', _) => Tok::Caret,
            (b'~', _) => Tok::Tilde,
            (b'!', _) => Tok::Bang,
            (b'<', _) => Tok::Lt,
            (b'>', _) => Tok::Gt,
            (b'=', _) => Tok::Assign,
            (b'(', _) => Tok::LParen,
            (b')', _) => Tok::RParen,
            (b'{', _) => Tok::LBrace,
            (b'}', _) => Tok::RBrace,
            (b'[', _) => Tok::LBracket,
            (b']', _) => Tok::RBracket,
            (b';', _) => Tok::Semi,
            (b',', _) => Tok::Comma,
            (b'.', _) => Tok::Dot,
            _ => return Err(self.error(format!("unexpected character '{}'", c as char))),
        };
        Ok(tok)
    }

    fn number(&mut self) -> Result<Tok, ScriptError> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.bump();
            self.bump();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = ascii(&self.src[digits_start..self.pos]);
            return i64::from_str_radix(digits, 16)
                .ok()
                .filter(|v| *v <= i64::from(u32::MAX))
                .map(Tok::Int)
                .ok_or_else(|| self.error("bad hex literal"));
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let is_float = self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
            let text = ascii(&self.src[start..self.pos]);
            return text
                .parse::<f32>()
                .map(Tok::Float)
                .map_err(|_| self.error("bad float literal"));
        }
        let text = ascii(&self.src[start..self.pos]);
        text.parse::<i64>()
            .ok()
            .filter(|v| *v <= i64::from(u32::MAX))
            .map(Tok::Int)
            .ok_or_else(|| self.error("integer literal out of range"))
    }

    fn word(&mut self) -> Tok {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.bump();
        }
        match ascii(&self.src[start..self.pos]) {
            "var" => Tok::Var,
            "if" => Tok::If,
            "else" => Tok::Else,
            "for" => Tok::For,
            "while" => Tok::While,
            "break" => Tok::Break,
            "continue" => Tok::Continue,
            "return" => Tok::Return,
            "goto" => Tok::Goto,
            "true" => Tok::True,
            "false" => Tok::False,
            "this" => Tok::This,
            other => Tok::Ident(other.to_string()),
        }
    }

    fn string(&mut self, quote: u8) -> Result<Tok, ScriptError> {
        self.bump();
        let mut bytes = Vec::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string"));
            };
            if c == quote {
                break;
            }
            if c != b'\\' {
                bytes.push(c);
                continue;
            }
            let Some(esc) = self.bump() else {
                return Err(self.error("unterminated string"));
            };
            bytes.push(match esc {
                b'n' => b'\n',
                b't' => b'\t',
                b'r' => b'\r',
                b'0' => 0,
                b'\\' | b'"' | b'\'' => esc,
                _ => return Err(self.error(format!("unknown escape '\\{}'", esc as char))),
            });
        }
        String::from_utf8(bytes)
            .map(Tok::Str)
            .map_err(|_| self.error("string is not UTF-8"))
    }
}

/// Slices handed here only ever span ASCII bytes the lexer matched.
fn ascii(bytes: &[u8]) -> &str {
    core::str::from_utf8(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn statement_tokens() {
        assert_eq!(
            toks("sensor[i].en = false;"),
            vec![
                Tok::Ident("sensor".into()),
                Tok::LBracket,
                Tok::Ident("i".into()),
                Tok::RBracket,
                Tok::Dot,
                Tok::Ident("en".into()),
                Tok::Assign,
                Tok::False,
                Tok::Semi,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(toks("42 0x1F 1.5"), vec![Tok::Int(42), Tok::Int(31), Tok::Float(1.5), Tok::Eof]);
        assert!(tokenize("99999999999").is_err());
    }

    #[test]
    fn comments_and_positions() {
        let t = tokenize("/* a\n b */ x // tail\n  y").unwrap();
        assert_eq!(t[0].tok, Tok::Ident("x".into()));
        assert_eq!((t[0].line, t[0].column), (2, 6));
        assert_eq!(t[1].tok, Tok::Ident("y".into()));
        assert_eq!((t[1].line, t[1].column), (3, 3));
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            toks(r#"printf("\n- %d", 'a\'b')"#)[2],
            Tok::Str("\n- %d".into())
        );
        assert_eq!(toks(r"'a\'b'")[0], Tok::Str("a'b".into()));
        assert!(tokenize("\"open").is_err());
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            toks("i++ += -= <= >= == != && || << >>"),
            vec![
                Tok::Ident("i".into()),
                Tok::PlusPlus,
                Tok::PlusAssign,
                Tok::MinusAssign,
                Tok::Le,
                Tok::Ge,
                Tok::EqEq,
                Tok::Ne,
                Tok::AndAnd,
                Tok::OrOr,
                Tok::Shl,
                Tok::Shr,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        assert!(matches!(tokenize("/* open"), Err(ScriptError::Parse { .. })));
    }
}
