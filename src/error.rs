use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Expected \"{expected}\" to end, got the handle for \"{actual}\"")]
    FrameMismatch { expected: String, actual: String },

    #[error("Program ended before \"{0}\" ended")]
    UnterminatedFrame(String),

    #[error("Frame end with no frame open")]
    StackUnderflow,

    #[error("Allocation (\"{name}\", 0x{ptr:x}, {size}) is already in the live set")]
    DoubleAllocate { name: String, ptr: u64, size: u64 },

    #[error("Unrecognized memory space handle \"{0}\"")]
    UnknownSpace(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGUMENTS: i32 = 2;
    pub const PROTOCOL_VIOLATION: i32 = 3;
    pub const ALLOCATION_ERROR: i32 = 4;
    pub const UNKNOWN_SPACE: i32 = 5;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::FrameMismatch { .. } | Error::UnterminatedFrame(_) | Error::StackUnderflow => {
                exit_code::PROTOCOL_VIOLATION
            }
            Error::DoubleAllocate { .. } => exit_code::ALLOCATION_ERROR,
            Error::UnknownSpace(_) => exit_code::UNKNOWN_SPACE,
            Error::InvalidArgument(_) => exit_code::INVALID_ARGUMENTS,
            _ => exit_code::GENERAL_ERROR,
        }
    }
}
