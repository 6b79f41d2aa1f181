use num_derive::{FromPrimitive, ToPrimitive};
use ssp_derive::{EnumDisplay, EnumFromStr};
use ssp_util::EnumFromStr;

/// The exhaustive opcode set (spec.md §3). Each variant is assigned a
/// stable small integer via `num-derive`'s `FromPrimitive`/`ToPrimitive`,
/// the same mechanism the processor this runtime is modeled after uses
/// for its own `OpCode`/`OpCodeR` enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, EnumFromStr, EnumDisplay)]
pub enum Opcode {
    Nop = 0,
    Push = 1,
    Send = 2,
    Swap = 3,
    Dup = 4,
    Append = 5,
    Add = 6,
    Sub = 7,
    Mul = 8,
    Div = 9,
    Recv = 10,
    Listen = 11,
    Dict = 12,
    List = 13,
    Put = 14,
    Lookup = 15,
    Len = 16,
    Sendi = 17,
    Pop = 18,
    Zero = 19,
    Gt = 20,
    Lt = 21,
    Ji = 22,
    Jn = 23,
    Jmp = 24,
}

impl Opcode {
    pub const COUNT: usize = 25;

    pub fn to_i64(self) -> i64 {
        self as i64
    }
}
