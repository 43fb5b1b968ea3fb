//! The C++ preprocessing tokenizer: a pipeline of streaming decoders
//! feeding a single-character state machine over roughly fifty states.
//!
//! [`tokenize`] is the entry point: it drives a [`Tokenizer`] over a byte
//! slice and collects the result into a [`VectorTokenStream`].

use crate::decoders::{LineSplicer, NewlineEnder, TrigraphDecoder, UniversalCharacterNameDecoder};
use crate::error::PptError;
use crate::text::{
    encode_utf8, is_allowed_identifier_body_character, is_allowed_identifier_first_character,
    is_digit, is_hex_digit, is_space, Utf8Decoder, EOF,
};

/// The closed set of preprocessing-token kinds. Kinds only affect how
/// literals are delimited; the codec downstream only ever looks at
/// spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Operator,
    Identifier,
    Number,
    CharacterLiteral,
    StringLiteral,
    HeaderName,
}

/// A recognised preprocessing token: its kind and its exact spelling after
/// trigraph, UCN, splicing and newline-ending normalization.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub spelling: String,
}

/// A raw newline observed in the untransformed source, paired with the
/// index of the token that begins the following logical line.
#[derive(Debug, Clone, Copy)]
pub struct RawNewline {
    pub token_index: u32,
    pub file_offset: u32,
}

/// Callback sink the tokenizer drives. One method per grammar production;
/// this mirrors the decoder pipeline's "feed one, get callbacks" shape and
/// keeps the state machine decoupled from how its output is collected.
pub trait TokenSink {
    fn emit_whitespace_sequence(&mut self) {}
    fn emit_new_line(&mut self) {}
    fn emit_raw_newline(&mut self, file_offset: u32);
    fn emit_header_name(&mut self, spelling: &str);
    fn emit_identifier(&mut self, spelling: &str);
    fn emit_pp_number(&mut self, spelling: &str);
    fn emit_character_literal(&mut self, spelling: &str);
    fn emit_user_defined_character_literal(&mut self, spelling: &str);
    fn emit_string_literal(&mut self, spelling: &str);
    fn emit_user_defined_string_literal(&mut self, spelling: &str);
    fn emit_preprocessing_op_or_punc(&mut self, spelling: &str);
    fn emit_non_whitespace_char(&mut self, spelling: &str) -> Result<(), PptError>;
    fn emit_eof(&mut self) {}
}

/// Collects every emitted token and raw-newline marker in order. The
/// reference (and default) token sink; most callers just want the vector.
#[derive(Debug, Default)]
pub struct VectorTokenStream {
    pub tokens: Vec<Token>,
    pub newlines: Vec<RawNewline>,
}

impl TokenSink for VectorTokenStream {
    fn emit_raw_newline(&mut self, file_offset: u32) {
        self.newlines.push(RawNewline {
            token_index: self.tokens.len() as u32,
            file_offset,
        });
    }

    fn emit_header_name(&mut self, spelling: &str) {
        self.tokens.push(Token { kind: TokenKind::HeaderName, spelling: spelling.to_string() });
    }

    fn emit_identifier(&mut self, spelling: &str) {
        self.tokens.push(Token { kind: TokenKind::Identifier, spelling: spelling.to_string() });
    }

    fn emit_pp_number(&mut self, spelling: &str) {
        self.tokens.push(Token { kind: TokenKind::Number, spelling: spelling.to_string() });
    }

    fn emit_character_literal(&mut self, spelling: &str) {
        self.tokens.push(Token { kind: TokenKind::CharacterLiteral, spelling: spelling.to_string() });
    }

    fn emit_user_defined_character_literal(&mut self, spelling: &str) {
        self.emit_character_literal(spelling);
    }

    fn emit_string_literal(&mut self, spelling: &str) {
        self.tokens.push(Token { kind: TokenKind::StringLiteral, spelling: spelling.to_string() });
    }

    fn emit_user_defined_string_literal(&mut self, spelling: &str) {
        self.emit_string_literal(spelling);
    }

    fn emit_preprocessing_op_or_punc(&mut self, spelling: &str) {
        self.tokens.push(Token { kind: TokenKind::Operator, spelling: spelling.to_string() });
    }

    fn emit_non_whitespace_char(&mut self, spelling: &str) -> Result<(), PptError> {
        Err(PptError::InvalidToken {
            path: String::new(),
            offset: 0,
            message: format!("non-whitespace character not allowed here: {spelling:?}"),
        })
    }
}

fn is_character_literal_encoding_prefix(s: &str) -> bool {
    matches!(s, "u" | "U" | "L")
}

fn is_string_literal_encoding_prefix(s: &str) -> bool {
    matches!(s, "u8" | "u" | "U" | "L")
}

fn is_raw_string_literal_prefix(s: &str) -> bool {
    matches!(s, "u8R" | "uR" | "UR" | "LR" | "R")
}

fn is_digraph_keyword(s: &str) -> bool {
    matches!(
        s,
        "new" | "delete" | "and" | "and_eq" | "bitand" | "bitor" | "compl" | "not" | "not_eq"
            | "or" | "or_eq" | "xor" | "xor_eq"
    )
}

fn is_simple_escape_char(c: i32) -> bool {
    matches!(
        c,
        x if x == '\'' as i32 || x == '"' as i32 || x == '?' as i32 || x == '\\' as i32
            || x == 'a' as i32 || x == 'b' as i32 || x == 'f' as i32 || x == 'n' as i32
            || x == 'r' as i32 || x == 't' as i32 || x == 'v' as i32
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
enum State {
    Start,
    Equals,
    Colon,
    Hash,
    Langle,
    Langle2,
    LangleColon,
    LangleColon2,
    Rangle,
    Rangle2,
    Percent,
    PercentColon,
    PercentColonPercent,
    Asterisk,
    Plus,
    Dash,
    DashRangle,
    Hat,
    Ampersand,
    Bar,
    Exclamation,
    Dot,
    Dot2,
    PpNumber,
    PpNumberE,
    Identifier,
    Whitespace,
    ForwardSlash,
    WhitespaceForwardSlash,
    InlineComment,
    InlineCommentEnding,
    SingleLineComment,
    CharacterLiteral,
    CharacterLiteralBackslash,
    CharacterLiteralHex,
    CharacterLiteralSuffix,
    UserDefinedCharacterLiteral,
    StringLiteral,
    StringLiteralBackslash,
    StringLiteralHex,
    StringLiteralSuffix,
    UserDefinedStringLiteral,
    RawStringLiteral,
    RawStringBody,
    HeaderNameH,
    HeaderNameQ,
    Done,
}

/// Side-state tracking whether `<...>`/`"..."` should be read as a header
/// name: set once a logical line starts with `#`/`%:` then `include`, and
/// reset on every newline or any other token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderNameState {
    /// start of logical line: a leading `#`/`%:` can still begin `#include`.
    LineStart,
    /// saw `#`/`%:`, waiting to see whether next identifier is `include`.
    SawHash,
    /// saw `#include`: the next `<` or `"` opens a header name.
    SawInclude,
    /// nothing pending.
    None,
}

/// Drives the decoder pipeline and the state machine over one file's
/// bytes, emitting tokens and raw-newline markers into a [`TokenSink`].
pub struct Tokenizer<'a, S: TokenSink> {
    path: &'a str,
    rawpos: u32,
    output: S,
    header_name_state: HeaderNameState,
    state: State,
    raw_mode: bool,
    utf8_decoder: Utf8Decoder,
    ucn_decoder: UniversalCharacterNameDecoder,
    trigraph_decoder: TrigraphDecoder,
    line_splicer: LineSplicer,
    line_ender: NewlineEnder,
    lookahead: i32,
    accumulator: Vec<i32>,
    raw_string_delim: Vec<i32>,
    raw_string_match: usize,
}

impl<'a, S: TokenSink> Tokenizer<'a, S> {
    pub fn new(path: &'a str, output: S) -> Self {
        Tokenizer {
            path,
            rawpos: 0,
            output,
            header_name_state: HeaderNameState::LineStart,
            state: State::Start,
            raw_mode: false,
            utf8_decoder: Utf8Decoder::new(),
            ucn_decoder: UniversalCharacterNameDecoder::default(),
            trigraph_decoder: TrigraphDecoder::default(),
            line_splicer: LineSplicer::default(),
            line_ender: NewlineEnder::default(),
            lookahead: 0,
            accumulator: Vec::new(),
            raw_string_delim: Vec::new(),
            raw_string_match: 0,
        }
    }

    pub fn into_output(self) -> S {
        self.output
    }

    fn accumulator_utf8(&self) -> Result<String, PptError> {
        encode_utf8(&self.accumulator).map_err(|_| self.err_invalid("invalid code point in token"))
    }

    fn err_invalid(&self, message: impl Into<String>) -> PptError {
        PptError::InvalidToken {
            path: self.path.to_string(),
            offset: self.rawpos as usize,
            message: message.into(),
        }
    }

    fn err_unterminated_literal(&self) -> PptError {
        PptError::UnterminatedLiteral { path: self.path.to_string(), offset: self.rawpos as usize }
    }

    fn err_unterminated_raw_string(&self) -> PptError {
        PptError::UnterminatedRawString { path: self.path.to_string(), offset: self.rawpos as usize }
    }

    fn err_unterminated_comment(&self) -> PptError {
        PptError::UnterminatedComment { path: self.path.to_string(), offset: self.rawpos as usize }
    }

    fn emit_new_line(&mut self) {
        self.header_name_state = HeaderNameState::LineStart;
        self.output.emit_new_line();
    }

    fn emit_header_name(&mut self, data: &str) {
        self.header_name_state = HeaderNameState::None;
        self.output.emit_header_name(data);
    }

    fn emit_identifier(&mut self, data: &str) {
        self.header_name_state = if self.header_name_state == HeaderNameState::SawHash && data == "include" {
            HeaderNameState::SawInclude
        } else {
            HeaderNameState::None
        };
        self.output.emit_identifier(data);
    }

    fn emit_preprocessing_op_or_punc(&mut self, data: &str) {
        self.header_name_state = if self.header_name_state == HeaderNameState::LineStart && (data == "#" || data == "%:") {
            HeaderNameState::SawHash
        } else {
            HeaderNameState::None
        };
        self.output.emit_preprocessing_op_or_punc(data);
    }

    fn emit_other(&mut self) {
        self.header_name_state = HeaderNameState::None;
    }

    /// Feeds one raw byte (or [`EOF`]) through the full pipeline.
    pub fn process(&mut self, c0: i32) -> Result<(), PptError> {
        if c0 == '\n' as i32 {
            self.output.emit_raw_newline(self.rawpos);
        }

        if !self.raw_mode {
            for c1 in self
                .utf8_decoder
                .decode(c0)
                .map_err(|_| PptError::InvalidUtf8 { path: self.path.to_string(), offset: self.rawpos as usize })?
            {
                for c2 in self.trigraph_decoder.decode(c1) {
                    for c3 in self.ucn_decoder.decode(c2) {
                        for c4 in self.line_splicer.decode(c3) {
                            for c5 in self.line_ender.decode(c4) {
                                self.lookahead = c5;
                                self.next_state()?;
                            }
                        }
                    }
                }
            }
        } else {
            for c1 in
                self.utf8_decoder.decode(c0).map_err(|_| PptError::InvalidUtf8 {
                    path: self.path.to_string(),
                    offset: self.rawpos as usize,
                })?
            {
                self.lookahead = c1;
                self.next_state()?;
            }
        }

        if c0 == '\n' as i32 {
            // linenum tracking lives on the caller's side via raw newline markers.
        }
        Ok(())
    }

    fn keep_wait(&mut self, s: State) -> Result<(), PptError> {
        self.accumulator.push(self.lookahead);
        self.state = s;
        Ok(())
    }

    fn clear_wait(&mut self, s: State) -> Result<(), PptError> {
        self.accumulator.clear();
        self.state = s;
        Ok(())
    }

    fn keep_redirect(&mut self, s: State) -> Result<(), PptError> {
        self.state = s;
        self.next_state()
    }

    fn clear_redirect(&mut self, s: State) -> Result<(), PptError> {
        self.accumulator.clear();
        self.state = s;
        self.next_state()
    }

    fn next_state(&mut self) -> Result<(), PptError> {
        use State::*;
        let la = self.lookahead;
        match self.state {
            Start => self.state_start(la),
            Equals => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("=="); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("="); self.clear_redirect(Start) }
            },
            Colon => match la {
                x if x == '>' as i32 => { self.emit_preprocessing_op_or_punc(":>"); self.clear_wait(Start) }
                x if x == ':' as i32 => { self.emit_preprocessing_op_or_punc("::"); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc(":"); self.clear_redirect(Start) }
            },
            Hash => match la {
                x if x == '#' as i32 => { self.emit_preprocessing_op_or_punc("##"); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("#"); self.clear_redirect(Start) }
            },
            Langle => match la {
                x if x == '<' as i32 => self.keep_wait(Langle2),
                x if x == ':' as i32 => self.keep_wait(LangleColon),
                x if x == '%' as i32 => { self.emit_preprocessing_op_or_punc("<%"); self.clear_wait(Start) }
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("<="); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("<"); self.clear_redirect(Start) }
            },
            Langle2 => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("<<="); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("<<"); self.clear_redirect(Start) }
            },
            LangleColon => match la {
                x if x == ':' as i32 => self.keep_wait(LangleColon2),
                _ => { self.emit_preprocessing_op_or_punc("<:"); self.clear_redirect(Start) }
            },
            LangleColon2 => match la {
                x if x == ':' as i32 => {
                    self.emit_preprocessing_op_or_punc("<:");
                    self.emit_preprocessing_op_or_punc("::");
                    self.clear_wait(Start)
                }
                x if x == '>' as i32 => {
                    self.emit_preprocessing_op_or_punc("<:");
                    self.emit_preprocessing_op_or_punc(":>");
                    self.clear_wait(Start)
                }
                _ => {
                    self.emit_preprocessing_op_or_punc("<");
                    self.emit_preprocessing_op_or_punc("::");
                    self.clear_redirect(Start)
                }
            },
            Rangle => match la {
                x if x == '>' as i32 => self.keep_wait(Rangle2),
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc(">="); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc(">"); self.clear_redirect(Start) }
            },
            Rangle2 => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc(">>="); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc(">>"); self.clear_redirect(Start) }
            },
            Percent => match la {
                x if x == '>' as i32 => { self.emit_preprocessing_op_or_punc("%>"); self.clear_wait(Start) }
                x if x == ':' as i32 => self.keep_wait(PercentColon),
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("%="); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("%"); self.clear_redirect(Start) }
            },
            PercentColon => match la {
                x if x == '%' as i32 => self.keep_wait(PercentColonPercent),
                _ => { self.emit_preprocessing_op_or_punc("%:"); self.clear_redirect(Start) }
            },
            PercentColonPercent => match la {
                x if x == '>' as i32 => {
                    self.emit_preprocessing_op_or_punc("%:");
                    self.emit_preprocessing_op_or_punc("%>");
                    self.clear_wait(Start)
                }
                x if x == ':' as i32 => { self.emit_preprocessing_op_or_punc("%:%:"); self.clear_wait(Start) }
                x if x == '=' as i32 => {
                    self.emit_preprocessing_op_or_punc("%:");
                    self.emit_preprocessing_op_or_punc("%=");
                    self.clear_wait(Start)
                }
                _ => {
                    self.emit_preprocessing_op_or_punc("%:");
                    self.emit_preprocessing_op_or_punc("%");
                    self.clear_redirect(Start)
                }
            },
            Asterisk => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("*="); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("*"); self.clear_redirect(Start) }
            },
            Plus => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("+="); self.clear_wait(Start) }
                x if x == '+' as i32 => { self.emit_preprocessing_op_or_punc("++"); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("+"); self.clear_redirect(Start) }
            },
            Dash => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("-="); self.clear_wait(Start) }
                x if x == '-' as i32 => { self.emit_preprocessing_op_or_punc("--"); self.clear_wait(Start) }
                x if x == '>' as i32 => self.keep_wait(DashRangle),
                _ => { self.emit_preprocessing_op_or_punc("-"); self.clear_redirect(Start) }
            },
            DashRangle => match la {
                x if x == '*' as i32 => { self.emit_preprocessing_op_or_punc("->*"); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("->"); self.clear_redirect(Start) }
            },
            Hat => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("^="); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("^"); self.clear_redirect(Start) }
            },
            Ampersand => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("&="); self.clear_wait(Start) }
                x if x == '&' as i32 => { self.emit_preprocessing_op_or_punc("&&"); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("&"); self.clear_redirect(Start) }
            },
            Bar => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("|="); self.clear_wait(Start) }
                x if x == '|' as i32 => { self.emit_preprocessing_op_or_punc("||"); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("|"); self.clear_redirect(Start) }
            },
            Exclamation => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("!="); self.clear_wait(Start) }
                _ => { self.emit_preprocessing_op_or_punc("!"); self.clear_redirect(Start) }
            },
            Dot => {
                if is_digit(la) {
                    return self.keep_wait(PpNumber);
                }
                match la {
                    x if x == '.' as i32 => self.keep_wait(Dot2),
                    x if x == '*' as i32 => { self.emit_preprocessing_op_or_punc(".*"); self.clear_wait(Start) }
                    _ => { self.emit_preprocessing_op_or_punc("."); self.clear_redirect(Start) }
                }
            }
            Dot2 => {
                if is_digit(la) {
                    self.emit_preprocessing_op_or_punc(".");
                    self.accumulator = vec!['.' as i32];
                    return self.keep_wait(PpNumber);
                }
                match la {
                    x if x == '.' as i32 => { self.emit_preprocessing_op_or_punc("..."); self.clear_wait(Start) }
                    x if x == '*' as i32 => {
                        self.emit_preprocessing_op_or_punc(".");
                        self.emit_preprocessing_op_or_punc(".*");
                        self.clear_wait(Start)
                    }
                    _ => {
                        self.emit_preprocessing_op_or_punc(".");
                        self.emit_preprocessing_op_or_punc(".");
                        self.clear_redirect(Start)
                    }
                }
            }
            PpNumber => {
                if la == 'E' as i32 || la == 'e' as i32 {
                    self.keep_wait(PpNumberE)
                } else if is_allowed_identifier_body_character(la) || la == '.' as i32 {
                    self.keep_wait(PpNumber)
                } else {
                    let spelling = self.accumulator_utf8()?;
                    self.output.emit_pp_number(&spelling);
                    self.emit_other();
                    self.clear_redirect(Start)
                }
            }
            PpNumberE => {
                if la == '+' as i32 || la == '-' as i32 {
                    self.keep_wait(PpNumber)
                } else {
                    self.keep_redirect(PpNumber)
                }
            }
            Identifier => {
                if is_allowed_identifier_body_character(la) {
                    return self.keep_wait(Identifier);
                }
                let spelling = self.accumulator_utf8()?;
                if la == '\'' as i32 && is_character_literal_encoding_prefix(&spelling) {
                    self.keep_wait(CharacterLiteral)
                } else if la == '"' as i32 && is_string_literal_encoding_prefix(&spelling) {
                    self.keep_wait(StringLiteral)
                } else if la == '"' as i32 && is_raw_string_literal_prefix(&spelling) {
                    self.raw_mode = true;
                    self.raw_string_delim = vec![')' as i32];
                    self.keep_wait(RawStringLiteral)
                } else if is_digraph_keyword(&spelling) {
                    self.emit_preprocessing_op_or_punc(&spelling);
                    self.clear_redirect(Start)
                } else {
                    self.emit_identifier(&spelling);
                    self.clear_redirect(Start)
                }
            }
            Whitespace => {
                if is_space(la) && la != '\n' as i32 {
                    self.keep_wait(Whitespace)
                } else if la == '/' as i32 {
                    self.keep_wait(WhitespaceForwardSlash)
                } else {
                    self.output.emit_whitespace_sequence();
                    self.clear_redirect(Start)
                }
            }
            ForwardSlash => match la {
                x if x == '=' as i32 => { self.emit_preprocessing_op_or_punc("/="); self.clear_wait(Start) }
                x if x == '*' as i32 => self.keep_wait(InlineComment),
                x if x == '/' as i32 => self.keep_wait(SingleLineComment),
                _ => { self.emit_preprocessing_op_or_punc("/"); self.clear_redirect(Start) }
            },
            WhitespaceForwardSlash => match la {
                x if x == '=' as i32 => {
                    self.output.emit_whitespace_sequence();
                    self.emit_preprocessing_op_or_punc("/=");
                    self.clear_wait(Start)
                }
                x if x == '*' as i32 => self.keep_wait(InlineComment),
                x if x == '/' as i32 => self.keep_wait(SingleLineComment),
                _ => {
                    self.output.emit_whitespace_sequence();
                    self.emit_preprocessing_op_or_punc("/");
                    self.clear_redirect(Start)
                }
            },
            InlineComment => {
                if la == '*' as i32 {
                    self.keep_wait(InlineCommentEnding)
                } else if la == EOF {
                    Err(self.err_unterminated_comment())
                } else {
                    self.keep_wait(InlineComment)
                }
            }
            InlineCommentEnding => {
                if la == '*' as i32 {
                    self.keep_wait(InlineCommentEnding)
                } else if la == '/' as i32 {
                    self.keep_wait(Whitespace)
                } else {
                    self.keep_wait(InlineComment)
                }
            }
            SingleLineComment => {
                if la == '\n' as i32 {
                    self.output.emit_whitespace_sequence();
                    self.clear_redirect(Start)
                } else {
                    self.keep_wait(SingleLineComment)
                }
            }
            CharacterLiteral => {
                if la == '\'' as i32 {
                    self.keep_wait(CharacterLiteralSuffix)
                } else if la == '\\' as i32 {
                    self.keep_wait(CharacterLiteralBackslash)
                } else if la == '\n' as i32 || la == EOF {
                    Err(self.err_unterminated_literal())
                } else {
                    self.keep_wait(CharacterLiteral)
                }
            }
            CharacterLiteralBackslash => {
                if is_simple_escape_char(la) || (la >= '0' as i32 && la <= '7' as i32) {
                    self.keep_wait(CharacterLiteral)
                } else if la == 'x' as i32 {
                    self.keep_wait(CharacterLiteralHex)
                } else {
                    Err(self.err_invalid("invalid escape sequence"))
                }
            }
            CharacterLiteralHex => {
                if is_hex_digit(la) {
                    self.keep_wait(CharacterLiteral)
                } else {
                    Err(self.err_invalid("invalid hex escape sequence"))
                }
            }
            CharacterLiteralSuffix => {
                if is_allowed_identifier_first_character(la) {
                    self.keep_wait(UserDefinedCharacterLiteral)
                } else {
                    let spelling = self.accumulator_utf8()?;
                    self.output.emit_character_literal(&spelling);
                    self.emit_other();
                    self.clear_redirect(Start)
                }
            }
            UserDefinedCharacterLiteral => {
                if is_allowed_identifier_body_character(la) {
                    self.keep_wait(UserDefinedCharacterLiteral)
                } else {
                    let spelling = self.accumulator_utf8()?;
                    self.output.emit_user_defined_character_literal(&spelling);
                    self.emit_other();
                    self.clear_redirect(Start)
                }
            }
            StringLiteral => {
                if la == '"' as i32 {
                    self.keep_wait(StringLiteralSuffix)
                } else if la == '\\' as i32 {
                    self.keep_wait(StringLiteralBackslash)
                } else if la == '\n' as i32 || la == EOF {
                    Err(self.err_unterminated_literal())
                } else {
                    self.keep_wait(StringLiteral)
                }
            }
            StringLiteralBackslash => {
                if is_simple_escape_char(la) || (la >= '0' as i32 && la <= '7' as i32) {
                    self.keep_wait(StringLiteral)
                } else if la == 'x' as i32 {
                    self.keep_wait(StringLiteralHex)
                } else {
                    Err(self.err_invalid("invalid escape sequence"))
                }
            }
            StringLiteralHex => {
                if is_hex_digit(la) {
                    self.keep_wait(StringLiteral)
                } else {
                    Err(self.err_invalid("invalid hex escape sequence"))
                }
            }
            StringLiteralSuffix => {
                if is_allowed_identifier_first_character(la) {
                    self.keep_wait(UserDefinedStringLiteral)
                } else {
                    let spelling = self.accumulator_utf8()?;
                    self.output.emit_string_literal(&spelling);
                    self.emit_other();
                    self.clear_redirect(Start)
                }
            }
            UserDefinedStringLiteral => {
                if is_allowed_identifier_body_character(la) {
                    self.keep_wait(UserDefinedStringLiteral)
                } else {
                    let spelling = self.accumulator_utf8()?;
                    self.output.emit_user_defined_string_literal(&spelling);
                    self.emit_other();
                    self.clear_redirect(Start)
                }
            }
            RawStringLiteral => {
                if la == '(' as i32 {
                    self.raw_string_delim.push('"' as i32);
                    self.raw_string_match = 0;
                    if self.raw_string_delim.len() > 18 {
                        return Err(self.err_invalid("raw string delimiter too long"));
                    }
                    self.keep_wait(RawStringBody)
                } else if la == ')' as i32 || la == '\\' as i32 || is_space(la) {
                    Err(self.err_invalid("invalid characters in raw string delimiter"))
                } else if la == EOF {
                    Err(self.err_unterminated_raw_string())
                } else {
                    self.raw_string_delim.push(la);
                    self.keep_wait(RawStringLiteral)
                }
            }
            RawStringBody => {
                if la == EOF {
                    return Err(self.err_unterminated_raw_string());
                }
                if la == self.raw_string_delim[self.raw_string_match] {
                    self.raw_string_match += 1;
                    if self.raw_string_match == self.raw_string_delim.len() {
                        self.raw_mode = false;
                        self.keep_wait(StringLiteralSuffix)
                    } else {
                        self.keep_wait(RawStringBody)
                    }
                } else if la == self.raw_string_delim[0] {
                    self.raw_string_match = 1;
                    self.keep_wait(RawStringBody)
                } else {
                    self.raw_string_match = 0;
                    self.keep_wait(RawStringBody)
                }
            }
            HeaderNameH => match la {
                x if x == '>' as i32 => {
                    self.accumulator.push('>' as i32);
                    let spelling = self.accumulator_utf8()?;
                    self.emit_header_name(&spelling);
                    self.clear_wait(Start)
                }
                EOF => Err(self.err_invalid("unterminated header name")),
                x if x == '\n' as i32 => Err(self.err_invalid("unterminated header name")),
                _ => self.keep_wait(HeaderNameH),
            },
            HeaderNameQ => match la {
                x if x == '"' as i32 => {
                    self.accumulator.push('"' as i32);
                    let spelling = self.accumulator_utf8()?;
                    self.emit_header_name(&spelling);
                    self.clear_wait(Start)
                }
                EOF => Err(self.err_invalid("unterminated header name")),
                x if x == '\n' as i32 => Err(self.err_invalid("unterminated header name")),
                _ => self.keep_wait(HeaderNameQ),
            },
            Done => Err(self.err_invalid("tokenizer already reached end of file")),
        }
    }

    fn state_start(&mut self, la: i32) -> Result<(), PptError> {
        use State::*;
        if is_digit(la) {
            return self.keep_wait(PpNumber);
        }
        if is_allowed_identifier_first_character(la) {
            return self.keep_wait(Identifier);
        }
        match la {
            0x20 | 0x09 | 0x0B | 0x0C | 0x0D => self.keep_wait(Whitespace),
            x if x == '\n' as i32 => { self.emit_new_line(); self.clear_wait(Start) }
            x if x == '"' as i32 => {
                if self.header_name_state == HeaderNameState::SawInclude {
                    self.keep_wait(HeaderNameQ)
                } else {
                    self.keep_wait(StringLiteral)
                }
            }
            x if x == '\'' as i32 => self.keep_wait(CharacterLiteral),
            x if x == '/' as i32 => self.keep_wait(ForwardSlash),
            x if x == '.' as i32 => self.keep_wait(Dot),
            x if x == '{' as i32 || x == '}' as i32 || x == '[' as i32 || x == ']' as i32
                || x == '(' as i32 || x == ')' as i32 || x == ';' as i32 || x == '?' as i32
                || x == ',' as i32 || x == '~' as i32 =>
            {
                let spelling = encode_utf8(&[x]).unwrap_or_default();
                self.emit_preprocessing_op_or_punc(&spelling);
                self.clear_wait(Start)
            }
            x if x == '=' as i32 => self.keep_wait(Equals),
            x if x == ':' as i32 => self.keep_wait(Colon),
            x if x == '#' as i32 => self.keep_wait(Hash),
            x if x == '<' as i32 => {
                if self.header_name_state == HeaderNameState::SawInclude {
                    self.keep_wait(HeaderNameH)
                } else {
                    self.keep_wait(Langle)
                }
            }
            x if x == '>' as i32 => self.keep_wait(Rangle),
            x if x == '%' as i32 => self.keep_wait(Percent),
            x if x == '*' as i32 => self.keep_wait(Asterisk),
            x if x == '+' as i32 => self.keep_wait(Plus),
            x if x == '-' as i32 => self.keep_wait(Dash),
            x if x == '^' as i32 => self.keep_wait(Hat),
            x if x == '&' as i32 => self.keep_wait(Ampersand),
            x if x == '|' as i32 => self.keep_wait(Bar),
            x if x == '!' as i32 => self.keep_wait(Exclamation),
            EOF => { self.output.emit_eof(); self.clear_wait(Done) }
            _ => {
                let spelling = encode_utf8(&[la]).unwrap_or_default();
                self.output.emit_non_whitespace_char(&spelling)?;
                self.emit_other();
                self.clear_wait(Start)
            }
        }
    }
}

/// Tokenizes `source` (the raw bytes of one file, named `path` for error
/// messages) into a [`VectorTokenStream`].
pub fn tokenize(path: &str, source: &[u8]) -> Result<VectorTokenStream, PptError> {
    let mut tokenizer = Tokenizer::new(path, VectorTokenStream::default());
    for (i, &byte) in source.iter().enumerate() {
        tokenizer.rawpos = i as u32;
        tokenizer.process(byte as i32)?;
    }
    tokenizer.rawpos = source.len() as u32;
    tokenizer.process(EOF)?;
    Ok(tokenizer.into_output())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spellings(stream: &VectorTokenStream) -> Vec<(TokenKind, &str)> {
        stream.tokens.iter().map(|t| (t.kind, t.spelling.as_str())).collect()
    }

    #[test]
    fn tokenize_basic_declaration() {
        let stream = tokenize("t.cc", b"int x = 42;\n").unwrap();
        assert_eq!(
            spellings(&stream),
            vec![
                (TokenKind::Identifier, "int"),
                (TokenKind::Identifier, "x"),
                (TokenKind::Operator, "="),
                (TokenKind::Number, "42"),
                (TokenKind::Operator, ";"),
            ]
        );
        assert_eq!(stream.newlines.len(), 1);
        assert_eq!(stream.newlines[0].file_offset, 11);
    }

    #[test]
    fn tokenize_raw_string_literal() {
        let stream = tokenize("t.cc", br#"R"foo(a)b)foo""#).unwrap();
        assert_eq!(spellings(&stream), vec![(TokenKind::StringLiteral, r#"R"foo(a)b)foo""#)]);
    }

    #[test]
    fn tokenize_digraph_as_operator() {
        let stream = tokenize("t.cc", b"and").unwrap();
        assert_eq!(spellings(&stream), vec![(TokenKind::Operator, "and")]);
    }

    #[test]
    fn tokenize_include_header_name_angle() {
        let stream = tokenize("t.cc", b"#include <foo.h>\n").unwrap();
        assert_eq!(
            spellings(&stream),
            vec![
                (TokenKind::Operator, "#"),
                (TokenKind::Identifier, "include"),
                (TokenKind::HeaderName, "<foo.h>"),
            ]
        );
    }

    #[test]
    fn tokenize_include_header_name_quoted() {
        let stream = tokenize("t.cc", b"#include \"foo.h\"\n").unwrap();
        assert_eq!(
            spellings(&stream),
            vec![
                (TokenKind::Operator, "#"),
                (TokenKind::Identifier, "include"),
                (TokenKind::HeaderName, "\"foo.h\""),
            ]
        );
    }

    #[test]
    fn header_name_state_resets_each_line() {
        let stream = tokenize("t.cc", b"#include\nx < 1 > 2;\n").unwrap();
        assert!(spellings(&stream).contains(&(TokenKind::Operator, "<")));
    }

    #[test]
    fn comments_collapse_to_nothing() {
        let stream = tokenize("t.cc", b"a /* comment */ b // trailer\nc\n").unwrap();
        assert_eq!(
            spellings(&stream),
            vec![
                (TokenKind::Identifier, "a"),
                (TokenKind::Identifier, "b"),
                (TokenKind::Identifier, "c"),
            ]
        );
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        let err = tokenize("t.cc", b"/* never closed").unwrap_err();
        assert!(matches!(err, PptError::UnterminatedComment { .. }));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("t.cc", b"\"never closed\n").unwrap_err();
        assert!(matches!(err, PptError::UnterminatedLiteral { .. }));
    }

    #[test]
    fn unterminated_raw_string_is_an_error() {
        let err = tokenize("t.cc", br#"R"(abc"#).unwrap_err();
        assert!(matches!(err, PptError::UnterminatedRawString { .. }));
    }

    #[test]
    fn user_defined_literal_suffix_is_kept_with_token() {
        let stream = tokenize("t.cc", br#""ms"_ms"#).unwrap();
        assert_eq!(spellings(&stream), vec![(TokenKind::StringLiteral, r#""ms"_ms"#)]);
    }

    #[test]
    fn determinism_same_input_same_tokens() {
        let src: &[u8] = b"for (int i = 0; i < 10; ++i) { sum += i; }\n";
        let a = tokenize("t.cc", src).unwrap();
        let b = tokenize("t.cc", src).unwrap();
        assert_eq!(spellings(&a), spellings(&b));
    }

    proptest::proptest! {
        #[test]
        fn tokenizing_never_panics(bytes in proptest::collection::vec(proptest::any::<u8>(), 0..64)) {
            let _ = tokenize("fuzz.cc", &bytes);
        }
    }
}
