//! Error types for the overlay core
//!
//! Contract violations and collaborator failures are reported through these
//! enums. Field-level validity failures are carried as [`FieldErrors`] maps
//! rather than as separate error variants.

use super::types::{OverlayId, RequestId};
use super::wizard::FieldErrors;

/// Confirmation broker errors
#[derive(Debug, thiserror::Error)]
pub enum ConfirmError {
    #[error("confirmation requested outside of an active confirmation broker")]
    NoActiveBroker,

    #[error("confirmation request '{0}' is not pending")]
    UnknownRequest(RequestId),

    #[error("confirmed action failed: {0}")]
    ActionFailed(#[source] anyhow::Error),
}

/// Wizard navigation and submission errors
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("wizard must have at least one step")]
    NoSteps,

    #[error("wizard '{0}' is not open")]
    NotOpen(OverlayId),

    #[error("step {step} is outside 1..={total}")]
    StepOutOfRange { step: usize, total: usize },

    #[error("step {step} has not been reached yet (current step {current})")]
    StepLocked { step: usize, current: usize },

    #[error("step {step} is not valid")]
    StepBlocked { step: usize, errors: FieldErrors },

    #[error("already at the last step ({0})")]
    AtLastStep(usize),

    #[error("submission is only allowed on the last step (current {current} of {total})")]
    NotAtLastStep { current: usize, total: usize },

    #[error("wizard submission failed: {0}")]
    SubmitFailed(#[source] anyhow::Error),
}

/// Payload modal errors
#[derive(Debug, thiserror::Error)]
pub enum ModalError {
    #[error("modal '{0}' is not open")]
    NotOpen(OverlayId),

    #[error("modal '{0}' is already submitting")]
    AlreadySubmitting(OverlayId),

    #[error("modal submission failed: {0}")]
    SubmitFailed(#[source] anyhow::Error),
}

/// Entity drawer errors
#[derive(Debug, thiserror::Error)]
pub enum DrawerError {
    #[error("unknown entity kind '{0}'")]
    UnknownEntityKind(String),

    #[error("drawer '{0}' has no location configured")]
    NoLocation(OverlayId),
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("priority_step must be greater than 0")]
    NonPositivePriorityStep,

    #[error("{0} must not be empty")]
    EmptyParam(&'static str),

    #[error("drawer_param and entity_param must differ (both '{0}')")]
    DuplicateParam(String),
}
