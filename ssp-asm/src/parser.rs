//! AST layer: turns a [`Lexer`]'s token stream into generic, opcode-agnostic
//! instruction nodes (spec.md §4.2), grounded on
//! `original_source/ssp/scripting/assembler/parser.py`'s `Parser`/`Instruction`
//! (the opcode-aware parts of that file now live one layer up, in
//! [`crate::assembler`], matching spec.md's "Parser does not know opcodes").

use crate::lexer::{LexError, Lexer, Literal, Token, TokenType};
use ssp_vm::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Identifier,
    IntLiteral,
    RealLiteral,
    StrLiteral,
    ListLiteral,
    DictLiteral,
}

impl NodeType {
    pub fn type_name(self) -> &'static str {
        match self {
            NodeType::Identifier => "identifier",
            NodeType::IntLiteral => "integer",
            NodeType::RealLiteral => "real",
            NodeType::StrLiteral => "string",
            NodeType::ListLiteral => "list",
            NodeType::DictLiteral => "dictionary",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Int(i64),
    Real(f64),
    Str(String),
    List(Vec<Node>),
    Dict(Vec<(String, Node)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeType,
    pub value: NodeValue,
    pub line: u32,
    pub col: u32,
}

/// Symbol table mapping `LABEL` names to the instruction offset they were
/// defined at (spec.md §3: "label → int-literal-node(offset)").
pub type LabelTable = HashMap<String, i64>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollapseError {
    #[error("undefined label '{0}'")]
    UndefinedLabel(String),
}

impl Node {
    fn int(value: i64, line: u32, col: u32) -> Self {
        Node {
            kind: NodeType::IntLiteral,
            value: NodeValue::Int(value),
            line,
            col,
        }
    }

    /// Recursively resolves identifier nodes through `labels` and produces
    /// a concrete runtime [`Value`] (spec.md §3's `collapse_to_value`).
    pub fn collapse_to_value(&self, labels: &LabelTable) -> Result<Value, CollapseError> {
        match &self.value {
            NodeValue::Int(i) => Ok(Value::Int(*i)),
            NodeValue::Real(r) => Ok(Value::Real(*r)),
            NodeValue::Str(s) => {
                if self.kind == NodeType::Identifier {
                    labels
                        .get(s)
                        .map(|offset| Value::Int(*offset))
                        .ok_or_else(|| CollapseError::UndefinedLabel(s.clone()))
                } else {
                    Ok(Value::Str(s.clone()))
                }
            }
            NodeValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.collapse_to_value(labels)?);
                }
                Ok(Value::List(out))
            }
            NodeValue::Dict(entries) => {
                let mut map = ssp_vm::ValueMap::new();
                for (key, value_node) in entries {
                    map.insert(Value::Str(key.clone()), value_node.collapse_to_value(labels)?);
                }
                Ok(Value::Map(map))
            }
        }
    }

    /// The resolved label offset as an int-literal node, used so a
    /// resolved identifier can itself be type-checked as `IntLiteral`
    /// (spec.md §4.3: "for identifier nodes, the type of the label's
    /// resolved node").
    pub fn resolved_type(&self, labels: &LabelTable) -> NodeType {
        if self.kind == NodeType::Identifier {
            NodeType::IntLiteral
        } else {
            self.kind
        }
    }
}

/// A parsed but not-yet-typechecked instruction: an opcode identifier plus
/// its raw parameter nodes (spec.md §4.2: "emits a generic instruction
/// AST... opcode-as-identifier-node + parameter nodes").
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInstruction {
    pub opcode_name: String,
    pub parameters: Vec<Node>,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("expected identifier at start of instruction [{line}:{col}]")]
    ExpectedIdentifier { line: u32, col: u32 },
    #[error("unexpected token {found}, expected {expected} [{line}:{col}]")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        line: u32,
        col: u32,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: &'static str },
    #[error("trailing comma not allowed [{line}:{col}]")]
    TrailingComma { line: u32, col: u32 },
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Parser { lexer }
    }

    /// Parses one instruction: an identifier followed by zero or more
    /// parameters on the same source line (spec.md §4.2). Returns `Ok(None)`
    /// at end of input.
    pub fn parse_instruction(&mut self) -> Result<Option<ParsedInstruction>, ParseError> {
        let operation = match self.lexer.get_token()? {
            Some(tok) => tok,
            None => return Ok(None),
        };
        if operation.kind != TokenType::Identifier {
            return Err(ParseError::ExpectedIdentifier {
                line: operation.line,
                col: operation.col,
            });
        }
        let opcode_name = match operation.literal {
            Literal::Str(s) => s,
            _ => unreachable!("identifier tokens always carry a string literal"),
        };

        let mut parameters = Vec::new();
        while !self.lexer.is_eof()?
            && self.lexer.peek_token()?.map(|t| t.line) == Some(operation.line)
        {
            let tok = self.lexer.get_token()?.unwrap();
            parameters.push(self.parse_value(tok)?);
        }

        Ok(Some(ParsedInstruction {
            opcode_name,
            parameters,
            line: operation.line,
            col: operation.col,
        }))
    }

    fn parse_value(&mut self, token: Token) -> Result<Node, ParseError> {
        match token.kind {
            TokenType::Identifier => {
                let name = match token.literal {
                    Literal::Str(s) => s,
                    _ => unreachable!(),
                };
                Ok(Node {
                    kind: NodeType::Identifier,
                    value: NodeValue::Str(name),
                    line: token.line,
                    col: token.col,
                })
            }
            TokenType::Integer => {
                let v = match token.literal {
                    Literal::Int(i) => i,
                    _ => unreachable!(),
                };
                Ok(Node::int(v, token.line, token.col))
            }
            TokenType::Real => {
                let v = match token.literal {
                    Literal::Real(r) => r,
                    _ => unreachable!(),
                };
                Ok(Node {
                    kind: NodeType::RealLiteral,
                    value: NodeValue::Real(v),
                    line: token.line,
                    col: token.col,
                })
            }
            TokenType::String => {
                let v = match token.literal {
                    Literal::Str(s) => s,
                    _ => unreachable!(),
                };
                Ok(Node {
                    kind: NodeType::StrLiteral,
                    value: NodeValue::Str(v),
                    line: token.line,
                    col: token.col,
                })
            }
            TokenType::StartList => self.parse_list(token.line, token.col),
            TokenType::StartDict => self.parse_dict(token.line, token.col),
            other => Err(ParseError::UnexpectedToken {
                found: other.type_name().to_string(),
                expected: "a parameter value",
                line: token.line,
                col: token.col,
            }),
        }
    }

    fn parse_list(&mut self, line: u32, col: u32) -> Result<Node, ParseError> {
        let mut items = Vec::new();
        let mut first = true;
        loop {
            let peeked = self
                .lexer
                .peek_token()?
                .ok_or(ParseError::UnexpectedEof {
                    expected: "']' or a list element",
                })?
                .clone();
            if peeked.kind == TokenType::EndList {
                self.lexer.get_token()?;
                break;
            }
            if !first {
                let comma = self.lexer.get_token()?.unwrap();
                if comma.kind != TokenType::Comma {
                    return Err(ParseError::UnexpectedToken {
                        found: comma.kind.type_name().to_string(),
                        expected: "','",
                        line: comma.line,
                        col: comma.col,
                    });
                }
                let after_comma = self
                    .lexer
                    .peek_token()?
                    .ok_or(ParseError::UnexpectedEof {
                        expected: "a list element",
                    })?;
                if after_comma.kind == TokenType::EndList {
                    return Err(ParseError::TrailingComma {
                        line: after_comma.line,
                        col: after_comma.col,
                    });
                }
            }
            let tok = self.lexer.get_token()?.unwrap();
            items.push(self.parse_value(tok)?);
            first = false;
        }
        Ok(Node {
            kind: NodeType::ListLiteral,
            value: NodeValue::List(items),
            line,
            col,
        })
    }

    fn parse_dict(&mut self, line: u32, col: u32) -> Result<Node, ParseError> {
        let mut entries = Vec::new();
        let mut first = true;
        loop {
            let peeked = self
                .lexer
                .peek_token()?
                .ok_or(ParseError::UnexpectedEof {
                    expected: "'}' or a dictionary entry",
                })?
                .clone();
            if peeked.kind == TokenType::EndDict {
                self.lexer.get_token()?;
                break;
            }
            if !first {
                let comma = self.lexer.get_token()?.unwrap();
                if comma.kind != TokenType::Comma {
                    return Err(ParseError::UnexpectedToken {
                        found: comma.kind.type_name().to_string(),
                        expected: "','",
                        line: comma.line,
                        col: comma.col,
                    });
                }
                let after_comma = self
                    .lexer
                    .peek_token()?
                    .ok_or(ParseError::UnexpectedEof {
                        expected: "a dictionary entry",
                    })?;
                if after_comma.kind == TokenType::EndDict {
                    return Err(ParseError::TrailingComma {
                        line: after_comma.line,
                        col: after_comma.col,
                    });
                }
            }

            let key_tok = self
                .lexer
                .get_token()?
                .ok_or(ParseError::UnexpectedEof { expected: "a string key" })?;
            if key_tok.kind != TokenType::String {
                return Err(ParseError::UnexpectedToken {
                    found: key_tok.kind.type_name().to_string(),
                    expected: "a string key",
                    line: key_tok.line,
                    col: key_tok.col,
                });
            }
            let key = match key_tok.literal {
                Literal::Str(s) => s,
                _ => unreachable!(),
            };

            let colon = self
                .lexer
                .get_token()?
                .ok_or(ParseError::UnexpectedEof { expected: "':'" })?;
            if colon.kind != TokenType::Colon {
                return Err(ParseError::UnexpectedToken {
                    found: colon.kind.type_name().to_string(),
                    expected: "':'",
                    line: colon.line,
                    col: colon.col,
                });
            }

            let value_tok = self
                .lexer
                .get_token()?
                .ok_or(ParseError::UnexpectedEof { expected: "a value" })?;
            let value_node = self.parse_value(value_tok)?;
            entries.push((key, value_node));
            first = false;
        }
        Ok(Node {
            kind: NodeType::DictLiteral,
            value: NodeValue::Dict(entries),
            line,
            col,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(src: &str) -> Vec<ParsedInstruction> {
        let mut parser = Parser::new(Lexer::new(src));
        let mut out = Vec::new();
        while let Some(inst) = parser.parse_instruction().unwrap() {
            out.push(inst);
        }
        out
    }

    #[test]
    fn instruction_ends_at_line_boundary() {
        let insts = parse_all("PUSH 1\nPUSH 2\n");
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0].opcode_name, "PUSH");
        assert_eq!(insts[0].parameters.len(), 1);
    }

    #[test]
    fn list_and_dict_literals() {
        let insts = parse_all("PUSH [1, 2, \"x\"]\nPUSH {\"a\": 1, \"b\": 2}");
        assert_eq!(insts.len(), 2);
        match &insts[0].parameters[0].value {
            NodeValue::List(items) => assert_eq!(items.len(), 3),
            other => panic!("expected list, got {:?}", other),
        }
        match &insts[1].parameters[0].value {
            NodeValue::Dict(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected dict, got {:?}", other),
        }
    }

    #[test]
    fn trailing_comma_is_an_error() {
        let mut parser = Parser::new(Lexer::new("PUSH [1, 2,]"));
        assert!(matches!(
            parser.parse_instruction(),
            Err(ParseError::TrailingComma { .. })
        ));
    }

    #[test]
    fn missing_colon_in_dict_is_an_error() {
        let mut parser = Parser::new(Lexer::new("PUSH {\"a\" 1}"));
        assert!(matches!(
            parser.parse_instruction(),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn collapse_resolves_identifier_through_label_table() {
        let mut labels = LabelTable::new();
        labels.insert("start".to_string(), 3);
        let node = Node {
            kind: NodeType::Identifier,
            value: NodeValue::Str("start".to_string()),
            line: 1,
            col: 1,
        };
        assert_eq!(node.collapse_to_value(&labels).unwrap(), Value::Int(3));
    }

    #[test]
    fn collapse_fails_on_undefined_label() {
        let labels = LabelTable::new();
        let node = Node {
            kind: NodeType::Identifier,
            value: NodeValue::Str("nope".to_string()),
            line: 1,
            col: 1,
        };
        assert!(matches!(
            node.collapse_to_value(&labels),
            Err(CollapseError::UndefinedLabel(_))
        ));
    }
}
