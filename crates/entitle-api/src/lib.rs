//! JSON REST API for the entitlement engine.
//!
//! Exposes an axum [`Router`] backed by any
//! [`entitle_core::store::SupportStore`]. The caller identity comes from
//! trusted headers (see [`caller`]); credential checks, TLS and transport
//! are the embedding server's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", entitle_api::api_router(store.clone()))
//! ```

pub mod caller;
pub mod catalog;
pub mod entitlements;
pub mod error;
pub mod payments;
pub mod renewals;
pub mod tickets;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use entitle_core::store::SupportStore;

pub use caller::Caller;
pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: SupportStore + 'static,
{
  Router::new()
    // Catalog
    .route(
      "/support-types",
      get(catalog::list_types::<S>).post(catalog::create_type::<S>),
    )
    .route(
      "/support-types/{id}",
      get(catalog::get_type::<S>).patch(catalog::update_type::<S>),
    )
    .route("/support-types/{id}/active", post(catalog::set_type_active::<S>))
    .route("/plans", get(catalog::list_plans::<S>).post(catalog::create_plan::<S>))
    .route("/plans/{id}", get(catalog::get_plan::<S>))
    .route(
      "/subscriptions",
      get(catalog::list_subscriptions::<S>).post(catalog::create_subscription::<S>),
    )
    .route("/subscriptions/{id}", get(catalog::get_subscription::<S>))
    // Entitlements
    .route(
      "/entitlements",
      get(entitlements::list::<S>).post(entitlements::create::<S>),
    )
    .route(
      "/entitlements/{id}",
      get(entitlements::get::<S>).patch(entitlements::update::<S>),
    )
    .route(
      "/entitlements/{id}/availability",
      get(entitlements::availability::<S>),
    )
    .route("/entitlements/{id}/status", post(entitlements::change_status::<S>))
    .route("/entitlements/{id}/renew", post(entitlements::renew::<S>))
    .route("/entitlements/{id}/history", get(entitlements::history::<S>))
    .route("/entitlements/{id}/payments", get(entitlements::payments::<S>))
    .route(
      "/companies/{id}/entitlement",
      get(entitlements::active_for_company::<S>),
    )
    // Tickets
    .route("/tickets", get(tickets::list::<S>).post(tickets::create::<S>))
    .route("/tickets/stats", get(tickets::stats::<S>))
    .route("/tickets/{id}", get(tickets::get::<S>))
    .route("/tickets/{id}/close", post(tickets::close::<S>))
    .route("/tickets/{id}/reopen", post(tickets::reopen::<S>))
    .route("/tickets/{id}/cancel", post(tickets::cancel::<S>))
    .route("/tickets/{id}/status", post(tickets::change_status::<S>))
    .route("/tickets/{id}/priority", post(tickets::set_priority::<S>))
    .route("/tickets/{id}/assign", post(tickets::assign::<S>))
    .route(
      "/tickets/{id}/comments",
      get(tickets::list_comments::<S>).post(tickets::add_comment::<S>),
    )
    .route("/tickets/{id}/history", get(tickets::history::<S>))
    // Payments
    .route("/payments", post(payments::record::<S>))
    .route("/payments/{id}/status", post(payments::change_status::<S>))
    // Renewals
    .route("/renewals", post(renewals::run::<S>))
    .with_state(store)
}
