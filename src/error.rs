use thiserror::Error;

/// Runtime error taxonomy for the emulator (spec.md §7: bounds / type /
/// underflow / decode / arithmetic / address). Every variant here is
/// surfaced exclusively through `Emulator::trigger_error`, which always
/// halts the emulator — there is no other way for one of these to escape.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("instruction pointer {0} exceeded program memory (len {1})")]
    InstructionPointerOutOfRange(i64, usize),

    #[error("attempted to jump out of bounds: {0}")]
    JumpOutOfBounds(i64),

    #[error("attempted to pop {requested} with only {available} on stack")]
    StackUnderflow { requested: usize, available: usize },

    #[error("swap requires a stack depth of at least 2")]
    SwapUnderflow,

    #[error("unknown opcode {0}")]
    UnknownOpcode(i64),

    #[error("unimplemented opcode {0}")]
    UnimplementedOpcode(String),

    #[error("{opcode} expected {expected} arguments, got {got}")]
    WrongArity {
        opcode: String,
        expected: String,
        got: usize,
    },

    #[error("{context}: expected {expected}, got {got}")]
    TypeMismatch {
        context: String,
        expected: String,
        got: String,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("lookup index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("dup offset must be < 0, got {0}")]
    BadDupOffset(i64),

    #[error("send expects a target in position 0 of a non-empty list")]
    MalformedSendPayload,

    #[error("no receiver for address \"{0}\"")]
    NoReceiver(String),

    #[error("remote machine \"{0}\" not found")]
    RemoteMachineMissing(String),
}
