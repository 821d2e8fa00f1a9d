//! The [`Caller`] extractor.
//!
//! Credentials are verified upstream; the identity layer forwards the
//! result in trusted headers:
//!
//! | Header | Value |
//! |--------|-------|
//! | `X-Actor-Id` | uuid, required |
//! | `X-Actor-Role` | `admin` or `tenant`, required |
//! | `X-Company-Id` | uuid, required for `tenant` |

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use entitle_core::actor::Actor;
use uuid::Uuid;

use crate::error::ApiError;

pub const ACTOR_ID: &str = "x-actor-id";
pub const ACTOR_ROLE: &str = "x-actor-role";
pub const COMPANY_ID: &str = "x-company-id";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Actor);

impl Caller {
  pub fn actor(&self) -> Actor { self.0 }

  pub fn is_admin(&self) -> bool { self.0.is_staff() }

  pub fn require_admin(&self) -> Result<(), ApiError> {
    if self.is_admin() {
      Ok(())
    } else {
      Err(ApiError::Forbidden("administrators only".into()))
    }
  }

  pub fn ensure_company(&self, company_id: Uuid) -> Result<(), ApiError> {
    self.0.ensure_company(company_id).map_err(ApiError::from_store)
  }

  /// Tenants are pinned to their own company; admins may pass any filter.
  pub fn scope(&self, requested: Option<Uuid>) -> Option<Uuid> {
    if self.is_admin() { requested } else { self.0.company_id }
  }
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, ApiError> {
  headers
    .get(name)
    .map(|v| {
      v.to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("{name} is not a valid uuid")))
    })
    .transpose()
}

pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
  let id = header_uuid(headers, ACTOR_ID)?
    .ok_or_else(|| ApiError::Unauthorized(format!("missing {ACTOR_ID}")))?;
  let role = headers
    .get(ACTOR_ROLE)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| ApiError::Unauthorized(format!("missing {ACTOR_ROLE}")))?;

  match role.trim().to_ascii_lowercase().as_str() {
    "admin" => Ok(Caller(Actor::admin(id))),
    "tenant" => {
      let company = header_uuid(headers, COMPANY_ID)?
        .ok_or_else(|| ApiError::Unauthorized(format!("tenant requires {COMPANY_ID}")))?;
      Ok(Caller(Actor::tenant(id, company)))
    }
    other => Err(ApiError::Unauthorized(format!("unknown role {other:?}"))),
  }
}

impl<S> FromRequestParts<S> for Caller
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    caller_from_headers(&parts.headers)
  }
}
