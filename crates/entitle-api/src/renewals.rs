//! `POST /renewals`: run one renewal batch as of the store's today.
//!
//! Body: `{"dry_run":true,"lead_days":3}`, both optional. Admin only. A
//! run that overlaps another answers 409.

use std::sync::Arc;

use axum::{Json, extract::State};
use entitle_core::{
  renewal::{RenewalOptions, RenewalReport, run_renewals},
  store::SupportStore,
};

use crate::{caller::Caller, error::ApiError};

pub async fn run<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(options): Json<RenewalOptions>,
) -> Result<Json<RenewalReport>, ApiError> {
  caller.require_admin()?;
  let today = store.today();
  let report = run_renewals(store.as_ref(), today, options)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(report))
}
