//! [`SqliteStore`], the SQLite implementation of [`SupportStore`].

use std::{path::Path, sync::Arc};

use chrono::{Duration, NaiveDate};
use entitle_core::{
  actor::Actor,
  audit::{AuditSubject, StatusEvent},
  availability::AvailabilityResult,
  catalog::{NewSupportType, SupportType, SupportTypePatch},
  clock::{Clock, SystemClock},
  entitlement::{
    EntitlementPatch, EntitlementQuery, EntitlementStatus, NewEntitlement,
    RenewEntitlement, SupportEntitlement,
  },
  payment::{NewPayment, PaymentLedger, PaymentStatus, SupportPayment},
  store::SupportStore,
  subscription::{NewPlan, NewSubscription, Plan, PlanSubscription},
  ticket::{
    NewComment, NewTicket, Priority, SupportTicket, TicketComment,
    TicketQuery, TicketStats, TicketStatus,
  },
};
use rusqlite::TransactionBehavior;
use uuid::Uuid;

use crate::{
  Result,
  ops::{audit, catalog, entitlements, payments, renewals, tickets},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An entitlement store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and clock are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, clock: Arc::new(SystemClock::default()) })
  }

  /// Replace the time source (tenant zone included).
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn clock(&self) -> &Arc<dyn Clock> { &self.clock }

  /// Run `f` inside one `BEGIN IMMEDIATE` transaction. `Err` rolls back.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match f(&tx) {
          Ok(out) => {
            tx.commit()?;
            Ok(Ok(out))
          }
          // Dropping `tx` rolls it back.
          Err(e) => Ok(Err(e)),
        }
      })
      .await?
  }

  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── SupportStore impl ───────────────────────────────────────────────────────

impl SupportStore for SqliteStore {
  type Error = crate::Error;

  fn today(&self) -> NaiveDate { self.clock.today() }

  // ── Catalog ───────────────────────────────────────────────────────────────

  async fn create_support_type(&self, input: NewSupportType) -> Result<SupportType> {
    let now = self.clock.now();
    self.write(move |c| catalog::create_support_type(c, input, now)).await
  }

  async fn get_support_type(&self, id: Uuid) -> Result<Option<SupportType>> {
    self.read(move |c| catalog::get_support_type(c, id)).await
  }

  async fn list_support_types(&self, include_inactive: bool) -> Result<Vec<SupportType>> {
    self.read(move |c| catalog::list_support_types(c, include_inactive)).await
  }

  async fn update_support_type(
    &self,
    id: Uuid,
    patch: SupportTypePatch,
  ) -> Result<SupportType> {
    let now = self.clock.now();
    self.write(move |c| catalog::update_support_type(c, id, patch, now)).await
  }

  async fn set_support_type_active(&self, id: Uuid, active: bool) -> Result<SupportType> {
    let now = self.clock.now();
    self.write(move |c| catalog::set_support_type_active(c, id, active, now)).await
  }

  async fn create_plan(&self, input: NewPlan) -> Result<Plan> {
    let now = self.clock.now();
    self.write(move |c| catalog::create_plan(c, input, now)).await
  }

  async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>> {
    self.read(move |c| catalog::get_plan(c, id)).await
  }

  async fn list_plans(&self) -> Result<Vec<Plan>> {
    self.read(catalog::list_plans).await
  }

  async fn create_subscription(
    &self,
    input: NewSubscription,
    actor: Actor,
  ) -> Result<PlanSubscription> {
    let now = self.clock.now();
    self.write(move |c| catalog::create_subscription(c, input, &actor, now)).await
  }

  async fn get_subscription(&self, id: Uuid) -> Result<Option<PlanSubscription>> {
    self.read(move |c| catalog::get_subscription(c, id)).await
  }

  async fn list_subscriptions(&self, company_id: Option<Uuid>) -> Result<Vec<PlanSubscription>> {
    self.read(move |c| catalog::list_subscriptions(c, company_id)).await
  }

  // ── Entitlements ──────────────────────────────────────────────────────────

  async fn create_entitlement(
    &self,
    input: NewEntitlement,
    actor: Actor,
  ) -> Result<SupportEntitlement> {
    let now = self.clock.now();
    self.write(move |c| entitlements::create(c, input, &actor, now)).await
  }

  async fn get_entitlement(&self, id: Uuid) -> Result<Option<SupportEntitlement>> {
    self.read(move |c| entitlements::get(c, id)).await
  }

  async fn list_entitlements(&self, query: &EntitlementQuery) -> Result<Vec<SupportEntitlement>> {
    let query = query.clone();
    self.read(move |c| entitlements::list(c, &query)).await
  }

  async fn active_entitlement(&self, company_id: Uuid) -> Result<Option<SupportEntitlement>> {
    let today = self.clock.today();
    self.read(move |c| entitlements::active_for_company(c, company_id, today)).await
  }

  async fn change_entitlement_status(
    &self,
    id: Uuid,
    status: EntitlementStatus,
    actor: Actor,
    reason: Option<String>,
  ) -> Result<SupportEntitlement> {
    let now = self.clock.now();
    self
      .write(move |c| entitlements::change_status(c, id, status, &actor, reason.as_deref(), now))
      .await
  }

  async fn update_entitlement(
    &self,
    id: Uuid,
    patch: EntitlementPatch,
    actor: Actor,
  ) -> Result<SupportEntitlement> {
    let now = self.clock.now();
    self.write(move |c| entitlements::update(c, id, patch, &actor, now)).await
  }

  async fn renew_entitlement(
    &self,
    id: Uuid,
    input: RenewEntitlement,
    actor: Actor,
  ) -> Result<SupportEntitlement> {
    let now = self.clock.now();
    let today = self.clock.today();
    self.write(move |c| entitlements::renew(c, id, input, &actor, today, now)).await
  }

  async fn entitlement_history(&self, id: Uuid) -> Result<Vec<StatusEvent>> {
    self
      .read(move |c| {
        entitlements::require(c, id)?;
        audit::history(c, AuditSubject::Entitlement, id)
      })
      .await
  }

  async fn availability(&self, entitlement_id: Uuid) -> Result<AvailabilityResult> {
    let now = self.clock.local_now();
    self.read(move |c| entitlements::availability(c, entitlement_id, now)).await
  }

  // ── Tickets ───────────────────────────────────────────────────────────────

  async fn create_ticket(&self, input: NewTicket, actor: Actor) -> Result<SupportTicket> {
    let now = self.clock.now();
    let zone = self.clock.zone();
    self.write(move |c| tickets::create(c, input, &actor, now, zone)).await
  }

  async fn get_ticket(&self, id: Uuid) -> Result<Option<SupportTicket>> {
    self.read(move |c| tickets::get(c, id)).await
  }

  async fn list_tickets(&self, query: &TicketQuery) -> Result<Vec<SupportTicket>> {
    let query = query.clone();
    self.read(move |c| tickets::list(c, &query)).await
  }

  async fn ticket_stats(&self, company_id: Option<Uuid>) -> Result<TicketStats> {
    self.read(move |c| tickets::stats(c, company_id)).await
  }

  async fn change_ticket_status(
    &self,
    id: Uuid,
    status: TicketStatus,
    actor: Actor,
    reason: Option<String>,
  ) -> Result<SupportTicket> {
    let now = self.clock.now();
    self
      .write(move |c| tickets::transition(c, id, status, &actor, reason.as_deref(), now))
      .await
  }

  async fn set_ticket_priority(
    &self,
    id: Uuid,
    priority: Priority,
    actor: Actor,
  ) -> Result<SupportTicket> {
    let now = self.clock.now();
    self.write(move |c| tickets::set_priority(c, id, priority, &actor, now)).await
  }

  async fn assign_ticket(
    &self,
    id: Uuid,
    assignee: Option<Uuid>,
    actor: Actor,
  ) -> Result<SupportTicket> {
    let now = self.clock.now();
    self.write(move |c| tickets::assign(c, id, assignee, &actor, now)).await
  }

  async fn add_comment(
    &self,
    ticket_id: Uuid,
    input: NewComment,
    actor: Actor,
  ) -> Result<TicketComment> {
    let now = self.clock.now();
    self.write(move |c| tickets::add_comment(c, ticket_id, input, &actor, now)).await
  }

  async fn list_comments(&self, ticket_id: Uuid) -> Result<Vec<TicketComment>> {
    self.read(move |c| tickets::list_comments(c, ticket_id)).await
  }

  async fn ticket_history(&self, ticket_id: Uuid) -> Result<Vec<StatusEvent>> {
    self
      .read(move |c| {
        tickets::require(c, ticket_id)?;
        audit::history(c, AuditSubject::Ticket, ticket_id)
      })
      .await
  }

  // ── Payments ──────────────────────────────────────────────────────────────

  async fn record_payment(&self, input: NewPayment, actor: Actor) -> Result<SupportPayment> {
    let now = self.clock.now();
    self.write(move |c| payments::record(c, input, &actor, now)).await
  }

  async fn change_payment_status(
    &self,
    id: Uuid,
    status: PaymentStatus,
    actor: Actor,
  ) -> Result<SupportPayment> {
    let now = self.clock.now();
    self.write(move |c| payments::change_status(c, id, status, &actor, now)).await
  }

  async fn list_payments(&self, entitlement_id: Uuid) -> Result<PaymentLedger> {
    self.read(move |c| payments::list(c, entitlement_id)).await
  }

  // ── Renewal ───────────────────────────────────────────────────────────────

  async fn expiring_subscriptions(&self, cutoff: NaiveDate) -> Result<Vec<PlanSubscription>> {
    self.read(move |c| renewals::expiring_subscriptions(c, cutoff)).await
  }

  async fn expiring_entitlements(&self, cutoff: NaiveDate) -> Result<Vec<SupportEntitlement>> {
    self.read(move |c| entitlements::expiring(c, cutoff)).await
  }

  async fn renew_subscription(&self, id: Uuid, today: NaiveDate) -> Result<PlanSubscription> {
    let now = self.clock.now();
    self.write(move |c| renewals::renew_subscription(c, id, today, now)).await
  }

  async fn lapse_subscription(&self, id: Uuid) -> Result<PlanSubscription> {
    let now = self.clock.now();
    self.write(move |c| renewals::lapse_subscription(c, id, now)).await
  }

  async fn auto_renew_entitlement(
    &self,
    id: Uuid,
    today: NaiveDate,
  ) -> Result<SupportEntitlement> {
    let now = self.clock.now();
    self.write(move |c| entitlements::auto_renew(c, id, today, now)).await
  }

  async fn lapse_entitlement(&self, id: Uuid) -> Result<SupportEntitlement> {
    let now = self.clock.now();
    self.write(move |c| entitlements::lapse(c, id, now)).await
  }

  async fn acquire_job_lock(&self, name: &str, holder: Uuid, ttl: Duration) -> Result<()> {
    let now = self.clock.now();
    let name = name.to_owned();
    self.write(move |c| renewals::acquire_lock(c, &name, holder, ttl, now)).await
  }

  async fn release_job_lock(&self, name: &str, holder: Uuid) -> Result<()> {
    let name = name.to_owned();
    self.write(move |c| renewals::release_lock(c, &name, holder)).await
  }
}
