//! The `SupportStore` trait.
//!
//! Implemented by storage backends (e.g. `entitle-store-sqlite`). The API
//! and the renewal runner depend on this abstraction, not on any concrete
//! backend.
//!
//! Every mutating method is atomic: it either commits all of its effects
//! (status change, counters, system comment, audit event) or none.

use std::future::Future;

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::{
  StoreError,
  actor::Actor,
  audit::StatusEvent,
  availability::AvailabilityResult,
  catalog::{NewSupportType, SupportType, SupportTypePatch},
  entitlement::{
    EntitlementPatch, EntitlementQuery, EntitlementStatus, NewEntitlement,
    RenewEntitlement, SupportEntitlement,
  },
  payment::{NewPayment, PaymentLedger, PaymentStatus, SupportPayment},
  subscription::{NewPlan, NewSubscription, Plan, PlanSubscription},
  ticket::{
    NewComment, NewTicket, Priority, SupportTicket, TicketComment,
    TicketQuery, TicketStats, TicketStatus,
  },
};

/// Abstraction over an entitlement store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait SupportStore: Send + Sync {
  type Error: StoreError;

  /// Today's date in the tenant zone, from the store's clock.
  fn today(&self) -> NaiveDate;

  // ── Catalog ───────────────────────────────────────────────────────────

  fn create_support_type(
    &self,
    input: NewSupportType,
  ) -> impl Future<Output = Result<SupportType, Self::Error>> + Send + '_;

  fn get_support_type(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<SupportType>, Self::Error>> + Send + '_;

  fn list_support_types(
    &self,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<SupportType>, Self::Error>> + Send + '_;

  /// Edit a type in place. The merged result must pass the same checks as
  /// a new type. Prices already snapshotted into entitlements do not move.
  fn update_support_type(
    &self,
    id: Uuid,
    patch: SupportTypePatch,
  ) -> impl Future<Output = Result<SupportType, Self::Error>> + Send + '_;

  /// Soft-disable or re-enable a type. Disabled types cannot back new
  /// entitlements; existing ones are unaffected.
  fn set_support_type_active(
    &self,
    id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<SupportType, Self::Error>> + Send + '_;

  fn create_plan(
    &self,
    input: NewPlan,
  ) -> impl Future<Output = Result<Plan, Self::Error>> + Send + '_;

  fn get_plan(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Plan>, Self::Error>> + Send + '_;

  fn list_plans(
    &self,
  ) -> impl Future<Output = Result<Vec<Plan>, Self::Error>> + Send + '_;

  /// The price paid is the plan's current price for the chosen period.
  fn create_subscription(
    &self,
    input: NewSubscription,
    actor: Actor,
  ) -> impl Future<Output = Result<PlanSubscription, Self::Error>> + Send + '_;

  fn get_subscription(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<PlanSubscription>, Self::Error>>
  + Send
  + '_;

  fn list_subscriptions(
    &self,
    company_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<PlanSubscription>, Self::Error>>
  + Send
  + '_;

  // ── Entitlements ──────────────────────────────────────────────────────

  /// Snapshots the support type's price into `current_price`. Refused with
  /// `ActiveEntitlementExists` if the new row would be a second active one.
  fn create_entitlement(
    &self,
    input: NewEntitlement,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportEntitlement, Self::Error>> + Send + '_;

  fn get_entitlement(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<SupportEntitlement>, Self::Error>>
  + Send
  + '_;

  fn list_entitlements<'a>(
    &'a self,
    query: &'a EntitlementQuery,
  ) -> impl Future<Output = Result<Vec<SupportEntitlement>, Self::Error>>
  + Send
  + 'a;

  /// The company's active entitlement that is in force today, if any.
  fn active_entitlement(
    &self,
    company_id: Uuid,
  ) -> impl Future<Output = Result<Option<SupportEntitlement>, Self::Error>>
  + Send
  + '_;

  fn change_entitlement_status(
    &self,
    id: Uuid,
    status: EntitlementStatus,
    actor: Actor,
    reason: Option<String>,
  ) -> impl Future<Output = Result<SupportEntitlement, Self::Error>> + Send + '_;

  /// Edit `auto_renew`, `notes` or `end_date`. Staff only.
  fn update_entitlement(
    &self,
    id: Uuid,
    patch: EntitlementPatch,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportEntitlement, Self::Error>> + Send + '_;

  /// Administrative renewal. Expires the predecessor and returns the new,
  /// always-active successor.
  fn renew_entitlement(
    &self,
    id: Uuid,
    input: RenewEntitlement,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportEntitlement, Self::Error>> + Send + '_;

  fn entitlement_history(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<StatusEvent>, Self::Error>> + Send + '_;

  /// Point-in-time availability, computed against the store's clock.
  fn availability(
    &self,
    entitlement_id: Uuid,
  ) -> impl Future<Output = Result<AvailabilityResult, Self::Error>> + Send + '_;

  // ── Tickets ───────────────────────────────────────────────────────────

  /// Creates an `open` ticket. Fails with `Unavailable` when availability
  /// refuses; no consumption is applied.
  fn create_ticket(
    &self,
    input: NewTicket,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportTicket, Self::Error>> + Send + '_;

  fn get_ticket(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<SupportTicket>, Self::Error>> + Send + '_;

  fn list_tickets<'a>(
    &'a self,
    query: &'a TicketQuery,
  ) -> impl Future<Output = Result<Vec<SupportTicket>, Self::Error>> + Send + 'a;

  fn ticket_stats(
    &self,
    company_id: Option<Uuid>,
  ) -> impl Future<Output = Result<TicketStats, Self::Error>> + Send + '_;

  /// The single ticket mutation path. Entering `closed` applies consumption
  /// exactly once in the same transaction; leaving it never reverses it.
  fn change_ticket_status(
    &self,
    id: Uuid,
    status: TicketStatus,
    actor: Actor,
    reason: Option<String>,
  ) -> impl Future<Output = Result<SupportTicket, Self::Error>> + Send + '_;

  fn close_ticket(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportTicket, Self::Error>> + Send + '_ {
    self.change_ticket_status(id, TicketStatus::Closed, actor, None)
  }

  fn reopen_ticket(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportTicket, Self::Error>> + Send + '_ {
    self.change_ticket_status(id, TicketStatus::Open, actor, None)
  }

  fn cancel_ticket(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportTicket, Self::Error>> + Send + '_ {
    self.change_ticket_status(id, TicketStatus::Canceled, actor, None)
  }

  fn set_ticket_priority(
    &self,
    id: Uuid,
    priority: Priority,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportTicket, Self::Error>> + Send + '_;

  fn assign_ticket(
    &self,
    id: Uuid,
    assignee: Option<Uuid>,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportTicket, Self::Error>> + Send + '_;

  /// Adds a comment; moves `open`/`in_progress` tickets to
  /// `awaiting_reply` as a side effect.
  fn add_comment(
    &self,
    ticket_id: Uuid,
    input: NewComment,
    actor: Actor,
  ) -> impl Future<Output = Result<TicketComment, Self::Error>> + Send + '_;

  /// Chronological.
  fn list_comments(
    &self,
    ticket_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TicketComment>, Self::Error>> + Send + '_;

  fn ticket_history(
    &self,
    ticket_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StatusEvent>, Self::Error>> + Send + '_;

  // ── Payments ──────────────────────────────────────────────────────────

  /// A payment recorded as `successful` against a `pending_payment`
  /// entitlement activates it.
  fn record_payment(
    &self,
    input: NewPayment,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportPayment, Self::Error>> + Send + '_;

  fn change_payment_status(
    &self,
    id: Uuid,
    status: PaymentStatus,
    actor: Actor,
  ) -> impl Future<Output = Result<SupportPayment, Self::Error>> + Send + '_;

  fn list_payments(
    &self,
    entitlement_id: Uuid,
  ) -> impl Future<Output = Result<PaymentLedger, Self::Error>> + Send + '_;

  // ── Renewal ───────────────────────────────────────────────────────────

  /// Active subscriptions whose `end_date <= cutoff`.
  fn expiring_subscriptions(
    &self,
    cutoff: NaiveDate,
  ) -> impl Future<Output = Result<Vec<PlanSubscription>, Self::Error>>
  + Send
  + '_;

  /// Active entitlements whose `end_date <= cutoff`.
  fn expiring_entitlements(
    &self,
    cutoff: NaiveDate,
  ) -> impl Future<Output = Result<Vec<SupportEntitlement>, Self::Error>>
  + Send
  + '_;

  /// Creates the successor subscription and marks the predecessor
  /// `inactive`. Returns the successor.
  fn renew_subscription(
    &self,
    id: Uuid,
    today: NaiveDate,
  ) -> impl Future<Output = Result<PlanSubscription, Self::Error>> + Send + '_;

  fn lapse_subscription(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<PlanSubscription, Self::Error>> + Send + '_;

  /// Creates the successor entitlement (current catalog price, counters
  /// reset) and marks the predecessor `expired`. Returns the successor.
  fn auto_renew_entitlement(
    &self,
    id: Uuid,
    today: NaiveDate,
  ) -> impl Future<Output = Result<SupportEntitlement, Self::Error>> + Send + '_;

  fn lapse_entitlement(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<SupportEntitlement, Self::Error>> + Send + '_;

  /// Fails with `JobLocked` while another holder's lock is unexpired.
  fn acquire_job_lock<'a>(
    &'a self,
    name: &'a str,
    holder: Uuid,
    ttl: Duration,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn release_job_lock<'a>(
    &'a self,
    name: &'a str,
    holder: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
