//! The identity on whose behalf an operation runs.
//!
//! Identity is supplied by an upstream layer and trusted as-is; this module
//! only answers "may this caller touch that company's records".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  /// Internal support staff.
  Admin,
  /// A user of a customer company; scoped to `company_id`.
  Tenant,
  /// Scheduled jobs and automatic side effects.
  System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub id:         Option<Uuid>,
  pub role:       Role,
  pub company_id: Option<Uuid>,
}

impl Actor {
  pub fn admin(id: Uuid) -> Self {
    Self { id: Some(id), role: Role::Admin, company_id: None }
  }

  pub fn tenant(id: Uuid, company_id: Uuid) -> Self {
    Self { id: Some(id), role: Role::Tenant, company_id: Some(company_id) }
  }

  pub fn system() -> Self {
    Self { id: None, role: Role::System, company_id: None }
  }

  pub fn is_staff(&self) -> bool { matches!(self.role, Role::Admin | Role::System) }

  pub fn require_staff(&self) -> Result<()> {
    if self.is_staff() {
      Ok(())
    } else {
      Err(Error::Forbidden("administrative operation".into()))
    }
  }

  /// Staff may act on any company; tenants only on their own.
  pub fn ensure_company(&self, company_id: Uuid) -> Result<()> {
    if self.is_staff() || self.company_id == Some(company_id) {
      Ok(())
    } else {
      Err(Error::Forbidden(format!(
        "record belongs to company {company_id}"
      )))
    }
  }
}
