//! Per-entry outcomes of a chain build.

use crate::logging::marker;

/// What happened to one configured stage type during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Stage built and appended to the chain.
    Built { name: String },
    /// Name did not resolve to a known stage type.
    SkippedInvalid { name: String },
    /// Factory returned no stage.
    SkippedFailed { name: String },
    /// Unexpected fault while building the entry.
    SkippedFatal { name: String, error: String },
    /// Entry dropped because the chain was cut short by a missing mediator.
    Truncated { name: String, error: Option<String> },
}

impl EntryOutcome {
    pub fn name(&self) -> &str {
        match self {
            EntryOutcome::Built { name }
            | EntryOutcome::SkippedInvalid { name }
            | EntryOutcome::SkippedFailed { name }
            | EntryOutcome::SkippedFatal { name, .. }
            | EntryOutcome::Truncated { name, .. } => name,
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self, EntryOutcome::Built { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub entries: Vec<EntryOutcome>,
}

impl BuildReport {
    pub fn push(&mut self, outcome: EntryOutcome) {
        self.entries.push(outcome);
    }

    pub fn built(&self) -> usize {
        self.entries.iter().filter(|e| e.is_built()).count()
    }

    pub fn skipped(&self) -> usize {
        self.entries.len() - self.built()
    }

    /// Names that did not resolve to a stage type.
    pub fn invalid_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| matches!(e, EntryOutcome::SkippedInvalid { .. }))
            .map(EntryOutcome::name)
            .collect()
    }

    /// Log every non-built entry at its severity, then a summary line.
    pub fn log(&self) {
        for entry in &self.entries {
            match entry {
                EntryOutcome::Built { .. } => {}
                EntryOutcome::SkippedInvalid { name } => {
                    tracing::error!(marker = marker::ERR, load_type = %name, "Wrong load type \"{}\", skipped", name);
                }
                EntryOutcome::SkippedFailed { name } => {
                    tracing::error!(marker = marker::ERR, load_type = %name, "No stage instanced for \"{}\"", name);
                }
                EntryOutcome::SkippedFatal { name, error } => {
                    crate::fatal!(marker = marker::ERR, load_type = %name, error = %error, "Unexpected failure while building \"{}\"", name);
                }
                EntryOutcome::Truncated { name, error: Some(error) } => {
                    tracing::error!(marker = marker::ERR, load_type = %name, error = %error, "No mediator buffer instanced, chain truncated at \"{}\"", name);
                }
                EntryOutcome::Truncated { name, error: None } => {
                    tracing::error!(marker = marker::ERR, load_type = %name, "Chain truncated, \"{}\" not built", name);
                }
            }
        }

        tracing::info!(
            marker = marker::MSG,
            requested = self.entries.len(),
            built = self.built(),
            skipped = self.skipped(),
            "Chain build finished"
        );
    }
}
