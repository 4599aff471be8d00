use std::fmt;

use crate::error::{Error, Result};

/// A distinct memory domain tagged on every allocation and deep-copy event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Space {
    Host,
    Cuda,
    Hip,
    Sycl,
    OpenMpTarget,
}

pub const NSPACES: usize = 5;

impl Space {
    /// Report order.
    pub const ALL: [Space; NSPACES] = [
        Space::Host,
        Space::Cuda,
        Space::Hip,
        Space::Sycl,
        Space::OpenMpTarget,
    ];

    /// Classify a space handle by its name prefix.
    ///
    /// The set of valid prefixes is closed and guaranteed by the host
    /// runtime: `C` is CUDA, `S` is SYCL, `O` is OpenMPTarget, and `H` is
    /// HIP when followed by `I`, host memory otherwise. Anything else is a
    /// broken contract, not a recoverable condition.
    pub fn from_handle(name: &str) -> Result<Space> {
        let mut chars = name.chars();
        match chars.next() {
            Some('C') => Ok(Space::Cuda),
            Some('S') => Ok(Space::Sycl),
            Some('O') => Ok(Space::OpenMpTarget),
            Some('H') => match chars.next() {
                Some('I') => Ok(Space::Hip),
                _ => Ok(Space::Host),
            },
            _ => Err(Error::UnknownSpace(name.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Space::Host => "HOST",
            Space::Cuda => "CUDA",
            Space::Hip => "HIP",
            Space::Sycl => "SYCL",
            Space::OpenMpTarget => "OpenMPTarget",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
