//! Three-pass assembler: ingest, label/type-check, emit (spec.md §4.3),
//! grounded on `original_source/ssp/scripting/assembler/__init__.py`'s
//! `Assembler`/`TYPE_INFO`/`AssemblerMessage`.
//!
//! Unlike the original (which writes instructions to the output stream as
//! it collapses them, so a late undefined-label error can still leave a
//! partial file on disk), this assembler buffers the fully-collapsed
//! program in memory and only returns it when zero `ERROR`/`INT_ERROR`
//! diagnostics were raised, matching spec.md §6's CLI contract ("on
//! assemble errors, no binary is produced").

use crate::diagnostics::{Diagnostic, Severity};
use crate::lexer::Lexer;
use crate::parser::{LabelTable, Node, NodeType, ParseError, Parser, ParsedInstruction};
use ssp_util::EnumFromStr;
use ssp_vm::{Instruction, Opcode, Program};
use std::collections::HashMap;

const LABEL_PSEUDO_OP: &str = "LABEL";

/// One argument position's accepted node types, or `None` for "any type".
type ArgTypes = Option<&'static [NodeType]>;

struct OpcodeInfo {
    max_args: usize,
    arg_types: &'static [ArgTypes],
}

fn opcode_info(op: Opcode) -> OpcodeInfo {
    const LIST: &[NodeType] = &[NodeType::ListLiteral];
    const INT: &[NodeType] = &[NodeType::IntLiteral];
    const INT_OR_STR: &[NodeType] = &[NodeType::IntLiteral, NodeType::StrLiteral];

    match op {
        Opcode::Nop
        | Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Recv
        | Opcode::Len
        | Opcode::Gt
        | Opcode::Lt
        | Opcode::Zero => OpcodeInfo {
            max_args: 0,
            arg_types: &[],
        },
        Opcode::Push => OpcodeInfo {
            max_args: 1,
            arg_types: &[None],
        },
        Opcode::Send | Opcode::Sendi => OpcodeInfo {
            max_args: 1,
            arg_types: &[Some(LIST)],
        },
        Opcode::Swap
        | Opcode::Dup
        | Opcode::Append
        | Opcode::Pop
        | Opcode::Listen
        | Opcode::Dict
        | Opcode::List
        | Opcode::Put => OpcodeInfo {
            max_args: 1,
            arg_types: &[Some(INT)],
        },
        Opcode::Lookup => OpcodeInfo {
            max_args: 1,
            arg_types: &[Some(INT_OR_STR)],
        },
        Opcode::Ji | Opcode::Jn | Opcode::Jmp => OpcodeInfo {
            max_args: 1,
            arg_types: &[Some(INT)],
        },
    }
}

/// One emitted-but-not-yet-collapsed instruction: opcode plus parameter
/// nodes, pinned to the source position it came from.
struct PendingInstruction {
    opcode: Opcode,
    parameters: Vec<Node>,
    line: u32,
    col: u32,
}

pub struct AssembleResult {
    pub program: Option<Program>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AssembleResult {
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.level == Severity::Error)
    }

    pub fn internal_errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == Severity::InternalError)
    }

    pub fn all_errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level != Severity::Warning)
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.warnings().count(),
            self.errors().count(),
            self.internal_errors().count(),
        )
    }

    pub fn succeeded(&self) -> bool {
        self.program.is_some()
    }
}

#[derive(Default)]
pub struct Assembler {
    diagnostics: Vec<Diagnostic>,
    labels: LabelTable,
    pending: Vec<PendingInstruction>,
}

impl Assembler {
    pub fn new() -> Self {
        Assembler::default()
    }

    pub fn assemble(mut self, source: &str) -> AssembleResult {
        self.ingest(source);
        if !self.has_blocking_errors() {
            let program = self.collapse();
            if !self.has_blocking_errors() {
                return AssembleResult {
                    program: Some(program),
                    diagnostics: self.diagnostics,
                };
            }
        }
        AssembleResult {
            program: None,
            diagnostics: self.diagnostics,
        }
    }

    fn has_blocking_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level != Severity::Warning)
    }

    /// Pass 1: drive the parser, resolve `LABEL` pseudo-ops against the
    /// current offset, and type/arity-check every real instruction's
    /// parameter nodes (without collapsing them to values yet).
    fn ingest(&mut self, source: &str) {
        let mut parser = Parser::new(Lexer::new(source));
        let mut offset: i64 = 0;

        loop {
            let parsed = match parser.parse_instruction() {
                Ok(Some(inst)) => inst,
                Ok(None) => break,
                Err(err) => {
                    self.push_error_from_parse(err);
                    break;
                }
            };

            if parsed.opcode_name.to_uppercase() == LABEL_PSEUDO_OP {
                self.handle_label(&parsed, offset);
                continue;
            }

            let opcode = match Opcode::from_str(&parsed.opcode_name) {
                Ok(op) => op,
                Err(_) => {
                    self.error(
                        parsed.line,
                        parsed.col,
                        format!("unknown opcode: {}", parsed.opcode_name),
                    );
                    continue;
                }
            };

            let info = opcode_info(opcode);
            if parsed.parameters.len() > info.max_args {
                self.error(
                    parsed.line,
                    parsed.col,
                    format!(
                        "too many parameters to opcode {} (max: {})",
                        parsed.opcode_name, info.max_args
                    ),
                );
                continue;
            }

            let mut bad = false;
            for (index, param) in parsed.parameters.iter().enumerate() {
                if let Some(expected) = info.arg_types.get(index).copied().flatten() {
                    let actual = param.resolved_type(&self.labels);
                    if !expected.contains(&actual) {
                        bad = true;
                        let valid: Vec<&str> = expected.iter().map(|t| t.type_name()).collect();
                        self.error(
                            parsed.line,
                            parsed.col,
                            format!(
                                "param {} of {} is type {}, valid types: {}",
                                index + 1,
                                parsed.opcode_name,
                                actual.type_name(),
                                valid.join(", ")
                            ),
                        );
                    }
                }
            }
            if bad {
                continue;
            }

            self.pending.push(PendingInstruction {
                opcode,
                parameters: parsed.parameters,
                line: parsed.line,
                col: parsed.col,
            });
            offset += 1;
        }
    }

    fn handle_label(&mut self, parsed: &ParsedInstruction, offset: i64) {
        if parsed.parameters.len() != 1 {
            self.error(
                parsed.line,
                parsed.col,
                "label statements take one identifier parameter".to_string(),
            );
            return;
        }
        let label_node = &parsed.parameters[0];
        if label_node.kind != NodeType::Identifier {
            self.error(
                parsed.line,
                parsed.col,
                "label statement argument must be an identifier".to_string(),
            );
            return;
        }
        let name = match &label_node.value {
            crate::parser::NodeValue::Str(s) => s.clone(),
            _ => unreachable!("identifier nodes always carry a string value"),
        };
        if self.labels.contains_key(&name) {
            self.error(
                parsed.line,
                parsed.col,
                format!("redefinition of label '{}'", name),
            );
        } else {
            self.labels.insert(name, offset);
        }
    }

    /// Pass 2/3: collapse every pending instruction's parameter nodes to
    /// concrete `Value`s through the now-complete label table.
    fn collapse(&mut self) -> Program {
        let mut program = Program::new();
        let labels = std::mem::take(&mut self.labels);
        let pending = std::mem::take(&mut self.pending);
        for pending_inst in pending {
            let mut values = Vec::with_capacity(pending_inst.parameters.len());
            let mut ok = true;
            for param in &pending_inst.parameters {
                match param.collapse_to_value(&labels) {
                    Ok(v) => values.push(v),
                    Err(err) => {
                        ok = false;
                        self.error(pending_inst.line, pending_inst.col, err.to_string());
                    }
                }
            }
            if ok {
                program.push(
                    Instruction::new(pending_inst.opcode, values)
                        .at(pending_inst.line, pending_inst.col),
                );
            }
        }
        self.labels = labels;
        program
    }

    fn push_error_from_parse(&mut self, err: ParseError) {
        let (line, col) = parse_error_position(&err);
        self.error(line, col, err.to_string());
    }

    fn error(&mut self, line: u32, col: u32, message: String) {
        self.diagnostics.push(Diagnostic {
            level: Severity::Error,
            line,
            col,
            message,
        });
    }

    #[allow(dead_code)]
    fn warn(&mut self, line: u32, col: u32, message: String) {
        self.diagnostics.push(Diagnostic {
            level: Severity::Warning,
            line,
            col,
            message,
        });
    }

    #[allow(dead_code)]
    fn internal_error(&mut self, line: u32, col: u32, message: String) {
        self.diagnostics.push(Diagnostic {
            level: Severity::InternalError,
            line,
            col,
            message,
        });
    }
}

fn parse_error_position(err: &ParseError) -> (u32, u32) {
    match err {
        ParseError::Lex(lex) => (lex.line(), lex.col()),
        ParseError::ExpectedIdentifier { line, col } => (*line, *col),
        ParseError::UnexpectedToken { line, col, .. } => (*line, *col),
        ParseError::UnexpectedEof { .. } => (0, 0),
        ParseError::TrailingComma { line, col } => (*line, *col),
    }
}

/// Convenience entry point mirroring the original's module-level `assemble`.
pub fn assemble(source: &str) -> AssembleResult {
    Assembler::new().assemble(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssp_vm::Value;

    #[test]
    fn add_two_and_three() {
        let result = assemble("PUSH 2\nPUSH 3\nADD\n");
        assert!(result.succeeded());
        let program = result.program.unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(program[2].opcode(), Opcode::Add);
    }

    #[test]
    fn too_many_args_is_exactly_one_error_and_no_output() {
        let result = assemble("ADD 1 2\n");
        assert!(!result.succeeded());
        assert_eq!(result.counts(), (0, 1, 0));
        let err = result.errors().next().unwrap();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn label_resolves_independent_of_definition_order() {
        let result = assemble("JMP start\nLABEL start\nPUSH 1\n");
        assert!(result.succeeded());
        let program = result.program.unwrap();
        assert_eq!(program[0].opcode(), Opcode::Jmp);
        assert_eq!(program[0].parameters(), &[Value::Int(1)]);
    }

    #[test]
    fn forward_and_backward_label_reference_agree() {
        let a = assemble("LABEL start\nPUSH 1\nJMP start\n");
        let b = assemble("JMP start\nLABEL start\nPUSH 1\n");
        assert!(a.succeeded() && b.succeeded());
        let pa = a.program.unwrap();
        let pb = b.program.unwrap();
        assert_eq!(pa[1].parameters(), &[Value::Int(0)]);
        assert_eq!(pb[0].parameters(), &[Value::Int(1)]);
    }

    #[test]
    fn label_redefinition_is_a_hard_error() {
        let result = assemble("LABEL a\nNOP\nLABEL a\nNOP\n");
        assert!(!result.succeeded());
        assert_eq!(result.errors().count(), 1);
    }

    #[test]
    fn undefined_label_is_an_error() {
        let result = assemble("JMP nowhere\n");
        assert!(!result.succeeded());
        assert!(result
            .errors()
            .next()
            .unwrap()
            .message
            .contains("undefined label"));
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        let result = assemble("FROB 1\n");
        assert!(!result.succeeded());
        assert!(result.errors().next().unwrap().message.contains("unknown opcode"));
    }

    #[test]
    fn send_requires_list_literal_parameter() {
        let result = assemble("SEND 5\n");
        assert!(!result.succeeded());
    }

    #[test]
    fn zero_append_is_idempotent_on_stack_shape() {
        let result = assemble("PUSH [1, 2, 3]\nLIST 0\nAPPEND 0\n");
        assert!(result.succeeded());
        let program = result.program.unwrap();
        assert_eq!(program.len(), 3);
    }
}
