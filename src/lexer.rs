//! Turns one filter expression into tokens.
//!
//! Primitives leave the lexer fully bound: keyword, operator, operand and
//! any `not` written directly in front of them. A `not` in front of a
//! parenthesised group is emitted as its own [`Token::Not`].

use pnet::ipnetwork::IpNetwork;
use pnet::packet::ip::IpNextHeaderProtocols;
use std::fmt;
use std::net::IpAddr;

use crate::error::FilterError;
use crate::primitive::AddrMask;
use crate::primitive::Operator;
use crate::primitive::Primitive;
use crate::primitive::PrimitiveToken;
use crate::primitive::TcpFlag;
use crate::primitive::protocol_by_name;

const IP_FIELDS: &[&str] = &[
    "vers", "version", "hl", "ihl", "id", "tos", "dscp", "ecn", "ttl", "len", "proto", "ce",
    "frag", "unfrag",
];
const IP6_FIELDS: &[&str] = &["flow", "plen", "hlim", "nxt"];
const TCP_FIELDS: &[&str] = &["opt", "flags", "win", "window"];
const QUALIFIABLE: &[&str] = &["host", "net", "src", "dst", "port"];
const SYMBOLS: &[&str] = &["&&", "||", "==", "!=", ">=", "<="];
const RESERVED: &[&str] = &["and", "&&", "or", "||", "not", "!", "(", ")"];

const MAX_U4: u32 = 0xF;
const MAX_U8: u32 = 0xFF;
const MAX_U16: u32 = 0xFFFF;
const MAX_FLOW_LABEL: u32 = 0xF_FFFF;
const MAX_DSCP: u32 = 0x3F;
const MAX_ECN: u32 = 0x3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Primitive(PrimitiveToken),
    And,
    Or,
    Not,
    OpenParen,
    CloseParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Primitive(primitive) => write!(f, "{}", primitive),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::OpenParen => write!(f, "("),
            Token::CloseParen => write!(f, ")"),
        }
    }
}

/// A lowercased word of the input and its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Word {
    text: String,
    pos: usize,
}

impl Word {
    fn new(text: &str, pos: usize) -> Self {
        Word {
            text: text.to_lowercase(),
            pos,
        }
    }
    fn unexpected(&self) -> FilterError {
        FilterError::UnexpectedToken {
            token: self.text.clone(),
            pos: self.pos,
        }
    }
    fn value_error(&self, target: &str, e: impl ToString) -> FilterError {
        FilterError::ValueError {
            parameter: self.text.clone(),
            target: target.to_string(),
            pos: self.pos,
            e: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Space,
    Paren,
    Operator,
    Text,
}

fn char_class(c: char) -> CharClass {
    match c {
        c if c.is_whitespace() => CharClass::Space,
        '(' | ')' => CharClass::Paren,
        '=' | '!' | '<' | '>' | '&' | '|' => CharClass::Operator,
        _ => CharClass::Text,
    }
}

/// Cut a run of operator characters into symbols, longest first.
fn push_symbols(words: &mut Vec<Word>, run: &str, start: usize) {
    let mut offset = 0;
    while offset < run.len() {
        let rest = &run[offset..];
        let len = SYMBOLS
            .iter()
            .find(|symbol| rest.starts_with(*symbol))
            .map_or(1, |symbol| symbol.len());
        words.push(Word::new(&rest[..len], start + offset));
        offset += len;
    }
}

/// Split on whitespace. Parentheses are words of their own and runs of
/// operator characters are split from the text around them.
fn split_words(input: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Option<(usize, CharClass)> = None;
    let flush = |words: &mut Vec<Word>, start: usize, end: usize, class: CharClass| {
        match class {
            CharClass::Operator => push_symbols(words, &input[start..end], start),
            _ => words.push(Word::new(&input[start..end], start)),
        }
    };
    for (pos, c) in input.char_indices() {
        let class = char_class(c);
        if let Some((start, run)) = current {
            if run == class && class != CharClass::Paren {
                continue;
            }
            flush(&mut words, start, pos, run);
            current = None;
        }
        if class != CharClass::Space {
            current = Some((pos, class));
        }
    }
    if let Some((start, run)) = current {
        flush(&mut words, start, input.len(), run);
    }
    words
}

fn parse_integer(word: &Word, max: u32) -> Result<u32, FilterError> {
    let target = format!("integer in 0..={}", max);
    let value = match word.text.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => word.text.parse::<u32>(),
    }
    .map_err(|e| word.value_error(&target, e))?;
    if value > max {
        return Err(word.value_error(&target, "out of range"));
    }
    Ok(value)
}

fn parse_addr(word: &Word) -> Result<IpAddr, FilterError> {
    word.text
        .parse::<IpAddr>()
        .map_err(|e| word.value_error("IpAddr", e))
}

/// Prefix length of a dotted IPv4 mask; the ones must be contiguous.
fn parse_mask(addr: IpAddr, word: &Word) -> Result<u8, FilterError> {
    match (addr, parse_addr(word)?) {
        (IpAddr::V4(_), IpAddr::V4(mask)) => {
            let m = u32::from(mask);
            if m.leading_ones() + m.trailing_zeros() != u32::BITS {
                return Err(word.value_error("IPv4 mask", "non-contiguous mask"));
            }
            Ok(m.leading_ones() as u8)
        }
        _ => Err(word.value_error("IPv4 mask", "mask form only supported for IPv4")),
    }
}

/// One recognized primitive, or a protocol qualifier joined to the
/// primitive it qualifies (`tcp port 80`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Single(PrimitiveToken),
    Conjunction(PrimitiveToken, PrimitiveToken),
}

struct Lexer {
    words: Vec<Word>,
    index: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            words: split_words(input),
            index: 0,
        }
    }
    fn peek(&self) -> Option<&Word> {
        self.words.get(self.index)
    }
    fn advance(&mut self) -> Option<Word> {
        let word = self.words.get(self.index).cloned();
        if word.is_some() {
            self.index += 1;
        }
        word
    }
    fn advance_if(&mut self, names: &[&str]) -> Option<Word> {
        match self.peek() {
            Some(word) if names.contains(&word.text.as_str()) => self.advance(),
            _ => None,
        }
    }
    fn tokens(mut self) -> Result<Vec<Token>, FilterError> {
        let mut tokens = Vec::new();
        let mut pending_not: Option<usize> = None;
        while let Some(word) = self.advance() {
            match word.text.as_str() {
                "not" | "!" => {
                    // double negation cancels
                    pending_not = match pending_not {
                        Some(_) => None,
                        None => Some(word.pos),
                    };
                }
                "and" | "&&" | "or" | "||" | ")" => {
                    if let Some(pos) = pending_not {
                        return Err(FilterError::DanglingNot { pos });
                    }
                    tokens.push(match word.text.as_str() {
                        "and" | "&&" => Token::And,
                        "or" | "||" => Token::Or,
                        _ => Token::CloseParen,
                    });
                }
                "(" => {
                    if pending_not.take().is_some() {
                        tokens.push(Token::Not);
                    }
                    tokens.push(Token::OpenParen);
                }
                _ => {
                    let negated = pending_not.take().is_some();
                    match self.primitive(&word)? {
                        Lexeme::Single(primitive) => {
                            let primitive = if negated {
                                primitive.negated_clone()
                            } else {
                                primitive
                            };
                            tokens.push(Token::Primitive(primitive));
                        }
                        Lexeme::Conjunction(qualifier, primitive) => {
                            if negated {
                                tokens.push(Token::Not);
                            }
                            tokens.extend([
                                Token::OpenParen,
                                Token::Primitive(qualifier),
                                Token::And,
                                Token::Primitive(primitive),
                                Token::CloseParen,
                            ]);
                        }
                    }
                }
            }
        }
        match pending_not {
            Some(pos) => Err(FilterError::DanglingNot { pos }),
            None => Ok(tokens),
        }
    }
    fn primitive(&mut self, word: &Word) -> Result<Lexeme, FilterError> {
        let keyword = word.text.as_str();
        let primitive = match keyword {
            k if IP_FIELDS.contains(&k) => self.ip_field(word)?,
            k if QUALIFIABLE.contains(&k) => self.qualifiable(word)?,
            "-" | "true" => self.flag(word, Primitive::Constant(true))?,
            "false" => self.flag(word, Primitive::Constant(false))?,
            "ip" => match self.advance_if(IP_FIELDS) {
                Some(field) => self.ip_field(&field)?,
                None => return self.qualified(Primitive::Version(4)),
            },
            "ip6" => match self.advance_if(IP6_FIELDS) {
                Some(field) => self.ip6_field(&field)?,
                None => return self.qualified(Primitive::Version(6)),
            },
            _ => {
                let Some(protocol) = protocol_by_name(keyword) else {
                    return Err(word.unexpected());
                };
                if protocol == IpNextHeaderProtocols::Tcp {
                    if let Some(field) = self.advance_if(TCP_FIELDS) {
                        return Ok(Lexeme::Single(self.tcp_field(&field)?));
                    }
                }
                return self.qualified(Primitive::Proto(protocol.0));
            }
        };
        Ok(Lexeme::Single(primitive))
    }
    /// `ip`, `ip6` or a transport protocol, alone or in front of an
    /// address or port primitive.
    fn qualified(&mut self, base: Primitive) -> Result<Lexeme, FilterError> {
        let base = PrimitiveToken::new(base, None, false);
        match self.advance_if(QUALIFIABLE) {
            Some(word) => Ok(Lexeme::Conjunction(base, self.qualifiable(&word)?)),
            None => Ok(Lexeme::Single(base)),
        }
    }
    fn qualifiable(&mut self, word: &Word) -> Result<PrimitiveToken, FilterError> {
        match word.text.as_str() {
            "host" => {
                let operator = self.comparison();
                let addr = self.address(word)?;
                Ok(PrimitiveToken::new(Primitive::Host(AddrMask::host(addr)), operator, false))
            }
            "net" => {
                let operator = self.comparison();
                let net = self.network(word)?;
                Ok(PrimitiveToken::new(Primitive::Net(net), operator, false))
            }
            "port" => self.field(word, MAX_U16, |v| Primitive::Port(v as u16)),
            "src" | "dst" => self.directional(word),
            _ => Err(word.unexpected()),
        }
    }
    /// `src`/`dst` followed by `host`, `net`, `port` or directly by an address.
    fn directional(&mut self, word: &Word) -> Result<PrimitiveToken, FilterError> {
        let source = word.text == "src";
        let qualifier = self.advance_if(&["host", "net", "port"]);
        let keyword = qualifier.as_ref().unwrap_or(word);
        match qualifier.as_ref().map(|w| w.text.as_str()) {
            Some("port") => {
                if source {
                    self.field(keyword, MAX_U16, |v| Primitive::SrcPort(v as u16))
                } else {
                    self.field(keyword, MAX_U16, |v| Primitive::DstPort(v as u16))
                }
            }
            Some("net") => {
                let operator = self.comparison();
                let net = self.network(keyword)?;
                let kind = if source {
                    Primitive::SrcNet(net)
                } else {
                    Primitive::DstNet(net)
                };
                Ok(PrimitiveToken::new(kind, operator, false))
            }
            _ => {
                let operator = self.comparison();
                let host = AddrMask::host(self.address(keyword)?);
                let kind = if source {
                    Primitive::SrcHost(host)
                } else {
                    Primitive::DstHost(host)
                };
                Ok(PrimitiveToken::new(kind, operator, false))
            }
        }
    }
    fn ip_field(&mut self, word: &Word) -> Result<PrimitiveToken, FilterError> {
        match word.text.as_str() {
            "vers" | "version" => self.field(word, MAX_U4, |v| Primitive::Version(v as u8)),
            "hl" | "ihl" => self.field(word, MAX_U4, |v| Primitive::HeaderLength(v as u8)),
            "id" => self.field(word, MAX_U16, |v| Primitive::Id(v as u16)),
            "tos" => self.field(word, MAX_U8, |v| Primitive::Tos(v as u8)),
            "dscp" => self.field(word, MAX_DSCP, |v| Primitive::Dscp(v as u8)),
            "ecn" => self.field(word, MAX_ECN, |v| Primitive::Ecn(v as u8)),
            "ttl" => self.field(word, MAX_U8, |v| Primitive::Ttl(v as u8)),
            "len" => self.field(word, MAX_U16, |v| Primitive::Length(v as u16)),
            "proto" => self.protocol_field(word, Primitive::Proto),
            "ce" => self.flag(word, Primitive::Ce),
            "frag" => self.flag(word, Primitive::Frag),
            "unfrag" => self.flag(word, Primitive::Unfrag),
            _ => Err(word.unexpected()),
        }
    }
    fn ip6_field(&mut self, word: &Word) -> Result<PrimitiveToken, FilterError> {
        match word.text.as_str() {
            "flow" => self.field(word, MAX_FLOW_LABEL, Primitive::FlowLabel),
            "plen" => self.field(word, MAX_U16, |v| Primitive::PayloadLength(v as u16)),
            "hlim" => self.field(word, MAX_U8, |v| Primitive::HopLimit(v as u8)),
            "nxt" => self.protocol_field(word, Primitive::NextHeader),
            _ => Err(word.unexpected()),
        }
    }
    fn tcp_field(&mut self, word: &Word) -> Result<PrimitiveToken, FilterError> {
        match word.text.as_str() {
            "opt" | "flags" => {
                self.flag_operator(word)?;
                let name = self.operand(word, "a TCP flag name")?;
                let flag = name
                    .text
                    .parse::<TcpFlag>()
                    .map_err(|e| name.value_error("TcpFlag", e))?;
                Ok(PrimitiveToken::new(Primitive::TcpFlag(flag), None, false))
            }
            "win" | "window" => self.field(word, MAX_U16, |v| Primitive::TcpWindow(v as u16)),
            _ => Err(word.unexpected()),
        }
    }
    fn field(
        &mut self,
        keyword: &Word,
        max: u32,
        kind: impl FnOnce(u32) -> Primitive,
    ) -> Result<PrimitiveToken, FilterError> {
        let operator = self.comparison();
        let word = self.operand(keyword, "an integer")?;
        let value = parse_integer(&word, max)?;
        Ok(PrimitiveToken::new(kind(value), operator, false))
    }
    fn protocol_field(
        &mut self,
        keyword: &Word,
        kind: fn(u8) -> Primitive,
    ) -> Result<PrimitiveToken, FilterError> {
        let operator = self.comparison();
        let word = self.operand(keyword, "a protocol number or name")?;
        let protocol = match protocol_by_name(&word.text) {
            Some(protocol) => protocol.0,
            None => parse_integer(&word, MAX_U8)? as u8,
        };
        Ok(PrimitiveToken::new(kind(protocol), operator, false))
    }
    fn flag(&mut self, keyword: &Word, kind: Primitive) -> Result<PrimitiveToken, FilterError> {
        self.flag_operator(keyword)?;
        Ok(PrimitiveToken::new(kind, None, false))
    }
    /// Boolean primitives tolerate a redundant `==` and nothing else.
    fn flag_operator(&mut self, keyword: &Word) -> Result<(), FilterError> {
        let Some(word) = self.peek() else {
            return Ok(());
        };
        match word.text.parse::<Operator>() {
            Ok(Operator::Eq) => {
                self.index += 1;
                Ok(())
            }
            Ok(_) => Err(FilterError::UnsupportedOperator {
                op: word.text.clone(),
                keyword: keyword.text.clone(),
                pos: word.pos,
            }),
            Err(_) => Ok(()),
        }
    }
    fn comparison(&mut self) -> Option<Operator> {
        let operator = self.peek()?.text.parse::<Operator>().ok()?;
        self.index += 1;
        Some(operator)
    }
    fn operand(&mut self, keyword: &Word, expected: &str) -> Result<Word, FilterError> {
        match self.peek() {
            Some(word) if !RESERVED.contains(&word.text.as_str()) => {
                self.advance().ok_or(FilterError::IncompleteFilter {
                    msg: format!("{} requires {}", keyword.text, expected),
                })
            }
            _ => Err(FilterError::MissingOperand {
                keyword: keyword.text.clone(),
                pos: keyword.pos,
                expected: expected.to_string(),
            }),
        }
    }
    fn address(&mut self, keyword: &Word) -> Result<IpAddr, FilterError> {
        let word = self.operand(keyword, "an IPv4 or IPv6 address")?;
        parse_addr(&word)
    }
    /// CIDR, `ADDR mask MASK` or a bare address.
    fn network(&mut self, keyword: &Word) -> Result<AddrMask, FilterError> {
        let word = self.operand(keyword, "a network")?;
        if word.text.contains('/') {
            let network = word
                .text
                .parse::<IpNetwork>()
                .map_err(|e| word.value_error("IpNetwork", e))?;
            return Ok(AddrMask::network(network));
        }
        let addr = parse_addr(&word)?;
        match self.advance_if(&["mask"]) {
            Some(mask_keyword) => {
                let mask = self.operand(&mask_keyword, "an IPv4 mask")?;
                let prefix = parse_mask(addr, &mask)?;
                let network =
                    IpNetwork::new(addr, prefix).map_err(|e| mask.value_error("IpNetwork", e))?;
                Ok(AddrMask::network(network))
            }
            None => Ok(AddrMask::host(addr)),
        }
    }
}

/// Split one expression into tokens.
pub fn lex(input: &str) -> Result<Vec<Token>, FilterError> {
    Lexer::new(input).tokens()
}
