//! Canonical string form -> `Individual`.
//!
//! Grammar, whitespace and newlines ignored between tokens:
//!
//! ```text
//! expr  := NAME '(' expr (',' expr)* ')' | 'data' | SLOT '=' value
//! value := 'text' | "text" | True | False | number
//! ```

use super::individual::{Individual, Node};
use crate::error::{AutopipeError, Result};
use crate::functions::Catalog;
use crate::types::{SlotType, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Text(String),
    Number(String),
    Open,
    Close,
    Comma,
    Equals,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
        }
    }

    fn take_while(&mut self, first: char, keep: impl Fn(char, char) -> bool) -> String {
        let mut text = String::from(first);
        while let Some(&(_, c)) = self.chars.peek() {
            let prev = text.chars().last().unwrap_or(first);
            if !keep(prev, c) {
                break;
            }
            text.push(c);
            self.chars.next();
        }
        text
    }

    fn tokens(mut self) -> Result<Vec<(usize, Token)>> {
        let mut tokens = Vec::new();
        while let Some((pos, c)) = self.chars.next() {
            let token = match c {
                c if c.is_whitespace() => continue,
                '(' => Token::Open,
                ')' => Token::Close,
                ',' => Token::Comma,
                '=' => Token::Equals,
                '\'' | '"' => {
                    let mut text = String::new();
                    loop {
                        match self.chars.next() {
                            Some((_, q)) if q == c => break,
                            Some((_, other)) => text.push(other),
                            None => {
                                return Err(AutopipeError::Parse(format!(
                                    "unterminated string starting at {}",
                                    pos
                                )))
                            }
                        }
                    }
                    Token::Text(text)
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                    Token::Number(self.take_while(c, |prev, next| {
                        next.is_ascii_alphanumeric()
                            || next == '.'
                            || ((next == '-' || next == '+') && (prev == 'e' || prev == 'E'))
                    }))
                }
                c if c.is_alphabetic() || c == '_' => Token::Ident(
                    self.take_while(c, |_, next| next.is_alphanumeric() || next == '_' || next == '.'),
                ),
                other => {
                    return Err(AutopipeError::Parse(format!(
                        "unexpected character '{}' at {}",
                        other, pos
                    )))
                }
            };
            tokens.push((pos, token));
        }
        Ok(tokens)
    }
}

struct Parser<'a> {
    tokens: Vec<(usize, Token)>,
    at: usize,
    catalog: &'a Catalog,
    nodes: Vec<Node>,
}

impl Parser<'_> {
    fn next(&mut self) -> Result<(usize, Token)> {
        let token = self
            .tokens
            .get(self.at)
            .cloned()
            .ok_or_else(|| AutopipeError::Parse("unexpected end of input".to_string()))?;
        self.at += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let (pos, token) = self.next()?;
        if token != expected {
            return Err(AutopipeError::Parse(format!(
                "expected {:?} at {}, found {:?}",
                expected, pos, token
            )));
        }
        Ok(())
    }

    fn peek_is(&self, token: &Token) -> bool {
        self.tokens.get(self.at).is_some_and(|(_, t)| t == token)
    }

    fn expr(&mut self, expected: &SlotType) -> Result<()> {
        let (pos, token) = self.next()?;
        let Token::Ident(name) = token else {
            return Err(AutopipeError::Parse(format!(
                "expected a name at {}, found {:?}",
                pos, token
            )));
        };

        if self.peek_is(&Token::Equals) {
            self.at += 1;
            return self.terminal(pos, &name, expected);
        }
        if name == "data" {
            if expected != &SlotType::Data {
                return Err(AutopipeError::Parse(format!(
                    "'data' at {} used where {} is required",
                    pos, expected
                )));
            }
            self.nodes.push(Node::Data);
            return Ok(());
        }

        let primitive = self
            .catalog
            .primitive(&name)
            .cloned()
            .ok_or_else(|| AutopipeError::Parse(format!("unknown primitive '{}' at {}", name, pos)))?;
        if &primitive.output != expected {
            return Err(AutopipeError::Parse(format!(
                "'{}' at {} produces {} where {} is required",
                name, pos, primitive.output, expected
            )));
        }
        self.nodes.push(Node::Primitive(primitive.clone()));

        self.expect(Token::Open)?;
        for (i, input) in primitive.inputs.iter().enumerate() {
            if i > 0 {
                self.expect(Token::Comma)?;
            }
            self.expr(input)?;
        }
        self.expect(Token::Close)
    }

    fn terminal(&mut self, pos: usize, slot_name: &str, expected: &SlotType) -> Result<()> {
        let slot = SlotType::Hyper(slot_name.to_string());
        if &slot != expected {
            return Err(AutopipeError::Parse(format!(
                "'{}' at {} fills a slot of type {}",
                slot_name, pos, expected
            )));
        }
        let (value_pos, token) = self.next()?;
        let value = match token {
            Token::Text(text) => Value::String(text),
            Token::Ident(word) if word == "True" => Value::Bool(true),
            Token::Ident(word) if word == "False" => Value::Bool(false),
            Token::Number(text) => parse_number(&text).ok_or_else(|| {
                AutopipeError::Parse(format!("malformed number '{}' at {}", text, value_pos))
            })?,
            other => {
                return Err(AutopipeError::Parse(format!(
                    "expected a value at {}, found {:?}",
                    value_pos, other
                )))
            }
        };

        let terminal = self
            .catalog
            .terminals_for(&slot)
            .iter()
            .find(|t| t.value.matches(&value))
            .cloned()
            .ok_or_else(|| {
                AutopipeError::Parse(format!(
                    "{}={} is not in the catalog domain",
                    slot_name, value
                ))
            })?;
        self.nodes.push(Node::Terminal(terminal));
        Ok(())
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let is_float = text.contains(['.', 'e', 'E']) || text.contains("inf") || text.contains("nan");
    if is_float {
        text.parse::<f64>().ok().map(Value::Float)
    } else {
        text.parse::<i64>().ok().map(Value::Integer)
    }
}

/// Parses the canonical nested-call form of a pipeline. Names and values are
/// resolved against `catalog`, so a parsed individual is always type-correct.
pub fn parse_individual(input: &str, catalog: &Catalog) -> Result<Individual> {
    let tokens = Lexer::new(input).tokens()?;
    let mut parser = Parser {
        tokens,
        at: 0,
        catalog,
        nodes: Vec::new(),
    };
    parser.expr(&SlotType::Prediction)?;
    if let Some((pos, token)) = parser.tokens.get(parser.at) {
        return Err(AutopipeError::Parse(format!(
            "unexpected {:?} at {} after a complete pipeline",
            token, pos
        )));
    }
    Ok(Individual::new(parser.nodes))
}
