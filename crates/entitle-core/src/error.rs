//! Error types for `entitle-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::availability::AvailabilityResult;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or missing input; rejected before any state change.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: Uuid },

  #[error("{entity} cannot move from {from} to {to}")]
  InvalidTransition {
    entity: &'static str,
    from:   &'static str,
    to:     &'static str,
  },

  #[error("precondition failed: {0}")]
  Precondition(String),

  /// Ticket creation refused by the availability calculator.
  #[error("cannot open ticket: {}", .0.reason)]
  Unavailable(Box<AvailabilityResult>),

  #[error("company {company_id} already has active entitlement {existing}")]
  ActiveEntitlementExists { company_id: Uuid, existing: Uuid },

  #[error("job {0:?} is already running")]
  JobLocked(String),

  #[error("forbidden: {0}")]
  Forbidden(String),
}

/// Coarse classification used by transport layers to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Validation,
  NotFound,
  Conflict,
  Forbidden,
}

impl Error {
  pub fn not_found(entity: &'static str, id: Uuid) -> Self {
    Self::NotFound { entity, id }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::Forbidden(_) => ErrorKind::Forbidden,
      Self::InvalidTransition { .. }
      | Self::Precondition(_)
      | Self::Unavailable(_)
      | Self::ActiveEntitlementExists { .. }
      | Self::JobLocked(_) => ErrorKind::Conflict,
    }
  }

  /// The availability snapshot that caused a refusal, if any.
  pub fn availability(&self) -> Option<&AvailabilityResult> {
    match self {
      Self::Unavailable(result) => Some(result),
      _ => None,
    }
  }
}

/// Implemented by backend error types so callers can recover the domain
/// error without knowing which backend produced it.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn as_core(&self) -> Option<&Error>;
}

impl StoreError for Error {
  fn as_core(&self) -> Option<&Error> { Some(self) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
