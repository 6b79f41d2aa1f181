//! Reverse of the assembler: turns the binary instruction stream back into
//! `OPCODE param1 param2 ...` text (spec.md §4.3 "Disassembler"), grounded
//! on `original_source/ssp/scripting/assembler/__init__.py`'s
//! `Assembler.disassemble`. `Instruction`'s `Display` impl in `ssp-vm`
//! already produces the canonical literal syntax this needs, so this is a
//! thin driver over [`ssp_vm::codec::read_program`].

use ssp_vm::codec::{read_program, CodecError};
use std::io::{Read, Write};

pub fn disassemble<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<(), CodecError> {
    let program = read_program(reader)?;
    for inst in &program {
        writeln!(writer, "{}", inst).map_err(CodecError::Io)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use ssp_vm::codec::write_program;

    #[test]
    fn round_trip_recovers_opcode_and_parameters() {
        let result = assemble("PUSH 2\nPUSH 3\nADD\n");
        let program = result.program.unwrap();

        let mut bytes = Vec::new();
        write_program(&mut bytes, &program).unwrap();

        let mut out = Vec::new();
        disassemble(&mut std::io::Cursor::new(bytes), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text, "PUSH 2\nPUSH 3\nADD\n");
    }
}
