//! Binary encoding of assembled programs.
//!
//! The wire format is a stream of self-describing MessagePack values
//! (spec.md §4.3/§6): each [`Instruction`] occupies exactly two
//! back-to-back values — the opcode as an integer, then its parameter
//! list as an array. End-of-stream at a frame boundary is normal
//! termination; a value that starts but doesn't finish (a partial frame)
//! surfaces as a [`CodecError::Decode`].

use crate::instruction::{Instruction, Program};
use crate::opcode::Opcode;
use crate::value::{Value, ValueMap};
use num_traits::FromPrimitive;
use rmpv::decode::read_value;
use rmpv::encode::write_value;
use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed messagepack frame: {0}")]
    Decode(String),
    #[error("unknown opcode {0} in binary stream")]
    UnknownOpcode(i64),
    #[error("opcode frame was not an integer: {0:?}")]
    OpcodeNotInteger(rmpv::Value),
    #[error("parameter frame was not an array: {0:?}")]
    ParametersNotArray(rmpv::Value),
    #[error("value {0:?} cannot be represented as a runtime Value")]
    UnrepresentableValue(rmpv::Value),
}

fn value_to_rmpv(value: &Value) -> rmpv::Value {
    match value {
        Value::Int(i) => rmpv::Value::Integer((*i).into()),
        Value::Real(r) => rmpv::Value::F64(*r),
        Value::Str(s) => rmpv::Value::String(s.as_str().into()),
        Value::Bool(b) => rmpv::Value::Boolean(*b),
        Value::List(items) => rmpv::Value::Array(items.iter().map(value_to_rmpv).collect()),
        Value::Map(map) => rmpv::Value::Map(
            map.iter()
                .map(|(k, v)| (value_to_rmpv(k), value_to_rmpv(v)))
                .collect(),
        ),
    }
}

fn rmpv_to_value(value: rmpv::Value) -> Result<Value, CodecError> {
    Ok(match value {
        rmpv::Value::Nil => Value::Bool(false),
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(i) => Value::Int(
            i.as_i64()
                .ok_or_else(|| CodecError::UnrepresentableValue(rmpv::Value::Integer(i)))?,
        ),
        rmpv::Value::F32(f) => Value::Real(f as f64),
        rmpv::Value::F64(f) => Value::Real(f),
        rmpv::Value::String(s) => Value::Str(
            s.into_str()
                .ok_or_else(|| CodecError::UnrepresentableValue(rmpv::Value::Nil))?,
        ),
        rmpv::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(rmpv_to_value(item)?);
            }
            Value::List(out)
        }
        rmpv::Value::Map(entries) => {
            let mut map = ValueMap::new();
            for (k, v) in entries {
                map.insert(rmpv_to_value(k)?, rmpv_to_value(v)?);
            }
            Value::Map(map)
        }
        other => return Err(CodecError::UnrepresentableValue(other)),
    })
}

pub fn write_instruction<W: Write>(writer: &mut W, inst: &Instruction) -> Result<(), CodecError> {
    write_value(writer, &rmpv::Value::Integer((inst.opcode().to_i64()).into()))
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    let params = rmpv::Value::Array(inst.parameters().iter().map(value_to_rmpv).collect());
    write_value(writer, &params).map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(())
}

pub fn write_program<W: Write>(writer: &mut W, program: &Program) -> Result<(), CodecError> {
    for inst in program {
        write_instruction(writer, inst)?;
    }
    Ok(())
}

/// Reads one instruction (two frames) from `reader`. Returns `Ok(None)` at
/// a clean end-of-stream (no bytes at all before the opcode frame); any
/// other failure, including running out of bytes partway through a frame,
/// is an error. EOF is detected by peeking a single byte ourselves rather
/// than inspecting the decoder's error variants, since a partial frame and
/// a clean stream end both surface as decode failures past that point.
pub fn read_instruction<R: Read>(reader: &mut R) -> Result<Option<Instruction>, CodecError> {
    let mut lookahead = [0u8; 1];
    let n = reader.read(&mut lookahead)?;
    if n == 0 {
        return Ok(None);
    }
    let mut chained = io::Cursor::new(lookahead).chain(&mut *reader);

    let opcode_value =
        read_value(&mut chained).map_err(|e| CodecError::Decode(e.to_string()))?;
    let opcode_int = opcode_value
        .as_i64()
        .ok_or_else(|| CodecError::OpcodeNotInteger(opcode_value.clone()))?;
    let opcode = Opcode::from_i64(opcode_int).ok_or(CodecError::UnknownOpcode(opcode_int))?;

    let params_value =
        read_value(&mut chained).map_err(|e| CodecError::Decode(e.to_string()))?;
    let params = match params_value {
        rmpv::Value::Array(items) => items,
        other => return Err(CodecError::ParametersNotArray(other)),
    };
    let mut parameters = Vec::with_capacity(params.len());
    for item in params {
        parameters.push(rmpv_to_value(item)?);
    }

    Ok(Some(Instruction::new(opcode, parameters)))
}

pub fn read_program<R: Read>(reader: &mut R) -> Result<Program, CodecError> {
    let mut program = Vec::new();
    while let Some(inst) = read_instruction(reader)? {
        program.push(inst);
    }
    Ok(program)
}
