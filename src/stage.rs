//! Stages a deployment run moves through.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    NotStarted,
    /// Full config dump written
    Dumped,
    /// Reduced config written and re-imported
    ReducedPersisted,
    /// Locales and build options computed
    Planned,
    /// Command batch handed to the dispatcher
    Dispatched,
    Deployed,
    Skipped,
    Failed,
}

impl DeployStage {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStage::NotStarted => "not_started",
            DeployStage::Dumped => "dumped",
            DeployStage::ReducedPersisted => "reduced_persisted",
            DeployStage::Planned => "planned",
            DeployStage::Dispatched => "dispatched",
            DeployStage::Deployed => "deployed",
            DeployStage::Skipped => "skipped",
            DeployStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployStage::Deployed | DeployStage::Skipped | DeployStage::Failed
        )
    }

    /// Terminal and not an error
    pub fn is_success(&self) -> bool {
        matches!(self, DeployStage::Deployed | DeployStage::Skipped)
    }
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
