//! Chain execution mode.

/// How the stages of a chain are wired and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    /// All stages run concurrently, wired directly into one pipeline.
    Simultaneous,
    /// Stages run one at a time with a mediator buffer between neighbours.
    Sequential,
}

impl ChainMode {
    pub fn from_simultaneous(simultaneous: bool) -> Self {
        if simultaneous {
            ChainMode::Simultaneous
        } else {
            ChainMode::Sequential
        }
    }

    pub fn is_simultaneous(self) -> bool {
        self == ChainMode::Simultaneous
    }
}

impl std::fmt::Display for ChainMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainMode::Simultaneous => write!(f, "simultaneous"),
            ChainMode::Sequential => write!(f, "sequential"),
        }
    }
}
