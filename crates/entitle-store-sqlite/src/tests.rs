//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use entitle_core::{
  Error as CoreError, ErrorKind, StoreError,
  actor::Actor,
  catalog::{Modality, NewSupportType, ServiceTier, SupportType, SupportTypePatch},
  clock::{DEFAULT_ZONE, ManualClock},
  entitlement::{
    EntitlementPatch, EntitlementQuery, EntitlementStatus, NewEntitlement,
    RenewEntitlement, SupportEntitlement,
  },
  payment::{NewPayment, PaymentStatus},
  renewal::{RenewalAction, RenewalOptions, RENEWAL_JOB, renewal_lock_ttl, run_renewals},
  store::SupportStore,
  subscription::{
    BillingPeriod, NewPlan, NewSubscription, Plan, PlanSubscription,
    SubscriptionStatus,
  },
  ticket::{NewComment, NewTicket, Priority, SupportTicket, TicketQuery, TicketStatus},
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{Error, SqliteStore};

// ─── Fixture ─────────────────────────────────────────────────────────────────

fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

/// Tenant-local wall-clock time as a UTC instant.
fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
  DEFAULT_ZONE
    .with_ymd_and_hms(y, m, d, h, 0, 0)
    .unwrap()
    .with_timezone(&Utc)
}

fn kind(err: &Error) -> Option<ErrorKind> { err.as_core().map(CoreError::kind) }

struct Fixture {
  store:        SqliteStore,
  clock:        Arc<ManualClock>,
  admin:        Actor,
  company:      Uuid,
  tenant:       Actor,
  plan:         Plan,
  subscription: PlanSubscription,
}

impl Fixture {
  /// Monday 2025-03-03, 10:00 in Bogota.
  async fn new() -> Self {
    let clock = Arc::new(ManualClock::new(DEFAULT_ZONE, local(2025, 3, 3, 10)));
    let store = SqliteStore::open_in_memory()
      .await
      .expect("in-memory store")
      .with_clock(clock.clone());
    let admin = Actor::admin(Uuid::new_v4());
    let company = Uuid::new_v4();
    let tenant = Actor::tenant(Uuid::new_v4(), company);

    let plan = store
      .create_plan(NewPlan {
        name:          "Pro".into(),
        description:   None,
        monthly_price: Decimal::from(100),
        yearly_price:  Decimal::from(1000),
      })
      .await
      .unwrap();

    let mut f = Self {
      store,
      clock,
      admin,
      company,
      tenant,
      subscription: placeholder_subscription(),
      plan,
    };
    f.subscription = f.subscription_for(company, day(2025, 12, 31), false).await;
    f
  }

  async fn subscription_for(
    &self,
    company: Uuid,
    end: NaiveDate,
    auto_renew: bool,
  ) -> PlanSubscription {
    self
      .store
      .create_subscription(
        NewSubscription {
          company_id: company,
          plan_id: self.plan.plan_id,
          period: BillingPeriod::Monthly,
          discount_percent: Decimal::from(10),
          start_date: day(2025, 3, 1),
          end_date: Some(end),
          auto_renew,
          notes: None,
        },
        self.admin,
      )
      .await
      .unwrap()
  }

  async fn support_type(&self, modality: Modality, cap: Option<u32>) -> SupportType {
    self.support_type_with(modality, cap, ServiceTier::Standard).await
  }

  async fn support_type_with(
    &self,
    modality: Modality,
    cap: Option<u32>,
    tier: ServiceTier,
  ) -> SupportType {
    let (max_tickets, max_hours) = match modality {
      Modality::ByTicketCount => (cap, None),
      Modality::ByHourCount => (None, cap),
      _ => (None, None),
    };
    self
      .store
      .create_support_type(NewSupportType {
        name: format!("{} support", modality.as_str()),
        description: None,
        modality,
        tier,
        price: Decimal::from(250),
        max_tickets,
        max_hours,
      })
      .await
      .unwrap()
  }

  fn new_entitlement(&self, ty: &SupportType) -> NewEntitlement {
    NewEntitlement {
      company_id:      self.company,
      subscription_id: self.subscription.subscription_id,
      support_type_id: ty.support_type_id,
      start_date:      day(2025, 3, 1),
      end_date:        Some(day(2025, 3, 31)),
      auto_renew:      false,
      pending_payment: false,
      notes:           None,
    }
  }

  async fn entitlement(&self, ty: &SupportType) -> SupportEntitlement {
    self
      .store
      .create_entitlement(self.new_entitlement(ty), self.admin)
      .await
      .unwrap()
  }

  /// A second company with its own subscription and entitlement.
  async fn other_company(&self, ty: &SupportType, auto_renew: bool) -> SupportEntitlement {
    let company = Uuid::new_v4();
    let sub = self.subscription_for(company, day(2025, 12, 31), false).await;
    self
      .store
      .create_entitlement(
        NewEntitlement {
          company_id: company,
          subscription_id: sub.subscription_id,
          auto_renew,
          ..self.new_entitlement(ty)
        },
        self.admin,
      )
      .await
      .unwrap()
  }

  async fn ticket(&self, ent: &SupportEntitlement) -> SupportTicket {
    self
      .store
      .create_ticket(NewTicket::new(ent.entitlement_id, "printer on fire"), self.tenant)
      .await
      .unwrap()
  }

  async fn reload(&self, ent: &SupportEntitlement) -> SupportEntitlement {
    self.store.get_entitlement(ent.entitlement_id).await.unwrap().unwrap()
  }
}

fn placeholder_subscription() -> PlanSubscription {
  PlanSubscription {
    subscription_id:  Uuid::nil(),
    company_id:       Uuid::nil(),
    plan_id:          Uuid::nil(),
    period:           BillingPeriod::Monthly,
    price_paid:       Decimal::ZERO,
    discount_percent: Decimal::ZERO,
    status:           SubscriptionStatus::Active,
    start_date:       day(2025, 1, 1),
    end_date:         None,
    auto_renew:       false,
    predecessor_id:   None,
    notes:            None,
    created_by:       None,
    created_at:       Utc::now(),
    updated_at:       Utc::now(),
  }
}

// ─── Consumption scenarios ───────────────────────────────────────────────────

#[tokio::test]
async fn ticket_count_exhaustion() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(2)).await;
  let ent = f.entitlement(&ty).await;

  let a = f.ticket(&ent).await;
  f.store.close_ticket(a.ticket_id, f.admin).await.unwrap();
  assert_eq!(f.reload(&ent).await.tickets_consumed, 1);

  let b = f.ticket(&ent).await;
  f.store.close_ticket(b.ticket_id, f.admin).await.unwrap();
  assert_eq!(f.reload(&ent).await.tickets_consumed, 2);

  let availability = f.store.availability(ent.entitlement_id).await.unwrap();
  assert!(!availability.can_open);
  assert_eq!(availability.available, Some(Decimal::ZERO));

  let err = f
    .store
    .create_ticket(NewTicket::new(ent.entitlement_id, "third"), f.tenant)
    .await
    .unwrap_err();
  let refused = err.as_core().and_then(CoreError::availability).expect("availability attached");
  assert!(!refused.can_open);
  assert_eq!(refused.available, Some(Decimal::ZERO));
  assert_eq!(kind(&err), Some(ErrorKind::Conflict));
}

#[tokio::test]
async fn hour_accumulation() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByHourCount, Some(5)).await;
  let ent = f.entitlement(&ty).await;

  let t = f.ticket(&ent).await;
  f.clock.advance(Duration::hours(2));
  let closed = f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();
  assert_eq!(closed.closed_at, Some(t.created_at + Duration::hours(2)));

  let ent = f.reload(&ent).await;
  assert_eq!(ent.hours_consumed, Decimal::from(2));
  assert_eq!(ent.tickets_consumed, 0);

  let availability = f.store.availability(ent.entitlement_id).await.unwrap();
  assert_eq!(availability.available, Some(Decimal::from(3)));
  assert!(availability.can_open);
}

#[tokio::test]
async fn hours_exhaust_and_never_increase_availability() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByHourCount, Some(5)).await;
  let ent = f.entitlement(&ty).await;

  let mut last = Decimal::from(5);
  for hours in [2, 2, 2] {
    let t = f.ticket(&ent).await;
    f.clock.advance(Duration::hours(hours));
    f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();
    let available = f.store.availability(ent.entitlement_id).await.unwrap().available.unwrap();
    assert!(available <= last);
    last = available;
  }

  let availability = f.store.availability(ent.entitlement_id).await.unwrap();
  assert_eq!(availability.available, Some(Decimal::ZERO));
  assert!(!availability.can_open);
  assert_eq!(f.reload(&ent).await.hours_consumed, Decimal::from(6));
}

#[tokio::test]
async fn canceled_tickets_are_free() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(1)).await;
  let ent = f.entitlement(&ty).await;

  let a = f.ticket(&ent).await;
  let canceled = f.store.cancel_ticket(a.ticket_id, f.tenant).await.unwrap();
  assert_eq!(canceled.status, TicketStatus::Canceled);

  assert_eq!(f.reload(&ent).await.tickets_consumed, 0);
  let availability = f.store.availability(ent.entitlement_id).await.unwrap();
  assert!(availability.can_open);
  assert_eq!(availability.available, Some(Decimal::ONE));
}

#[tokio::test]
async fn open_tickets_reserve_allowance() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(1)).await;
  let ent = f.entitlement(&ty).await;

  f.ticket(&ent).await;
  assert_eq!(f.reload(&ent).await.tickets_consumed, 0);
  assert!(!f.store.availability(ent.entitlement_id).await.unwrap().can_open);
}

#[tokio::test]
async fn closing_twice_is_rejected() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(5)).await;
  let ent = f.entitlement(&ty).await;
  let t = f.ticket(&ent).await;

  f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();
  let err = f.store.close_ticket(t.ticket_id, f.admin).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::InvalidTransition { .. })));
  assert_eq!(f.reload(&ent).await.tickets_consumed, 1);
}

#[tokio::test]
async fn reopen_keeps_consumption_and_does_not_recount() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(5)).await;
  let ent = f.entitlement(&ty).await;
  let t = f.ticket(&ent).await;
  f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();

  let err = f.store.reopen_ticket(t.ticket_id, f.tenant).await.unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Forbidden));

  let reopened = f.store.reopen_ticket(t.ticket_id, f.admin).await.unwrap();
  assert_eq!(reopened.status, TicketStatus::Open);
  assert_eq!(reopened.closed_at, None);
  assert_eq!(f.reload(&ent).await.tickets_consumed, 1);

  f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();
  assert_eq!(f.reload(&ent).await.tickets_consumed, 1);
}

#[tokio::test]
async fn unlimited_closure_counts_nothing() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f.entitlement(&ty).await;
  let t = f.ticket(&ent).await;
  f.clock.advance(Duration::hours(3));
  f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();

  let ent = f.reload(&ent).await;
  assert_eq!(ent.tickets_consumed, 0);
  assert_eq!(ent.hours_consumed, Decimal::ZERO);
}

#[tokio::test]
async fn canceled_ticket_cannot_be_closed() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(3)).await;
  let ent = f.entitlement(&ty).await;
  let t = f.ticket(&ent).await;
  f.store.cancel_ticket(t.ticket_id, f.tenant).await.unwrap();

  assert!(f.store.close_ticket(t.ticket_id, f.admin).await.is_err());
  assert!(f.store.reopen_ticket(t.ticket_id, f.admin).await.is_err());
  assert_eq!(f.reload(&ent).await.tickets_consumed, 0);
}

// ─── Ticket lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn comments_hand_over_and_leave_a_trail() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Yearly, None).await;
  let ent = f.entitlement(&ty).await;
  let t = f.ticket(&ent).await;

  f.store
    .add_comment(t.ticket_id, NewComment::new("any update?"), f.tenant)
    .await
    .unwrap();
  let t2 = f.store.get_ticket(t.ticket_id).await.unwrap().unwrap();
  assert_eq!(t2.status, TicketStatus::AwaitingReply);

  let comments = f.store.list_comments(t.ticket_id).await.unwrap();
  assert_eq!(comments.len(), 2);
  assert_eq!(comments[0].body, "any update?");
  assert!(!comments[0].is_staff());
  assert_eq!(comments[1].body, "[System] Status: open → awaiting_reply");

  // Already awaiting a reply: no further transition.
  f.store
    .add_comment(t.ticket_id, NewComment::new("working on it"), f.admin)
    .await
    .unwrap();
  assert_eq!(f.store.list_comments(t.ticket_id).await.unwrap().len(), 3);

  let history = f.store.ticket_history(t.ticket_id).await.unwrap();
  let steps: Vec<_> = history
    .iter()
    .map(|e| (e.old_status.as_deref(), e.new_status.as_str()))
    .collect();
  assert_eq!(steps, vec![(None, "open"), (Some("open"), "awaiting_reply")]);
}

#[tokio::test]
async fn tenants_are_confined_to_their_company() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Yearly, None).await;
  let ent = f.entitlement(&ty).await;
  let stranger = Actor::tenant(Uuid::new_v4(), Uuid::new_v4());

  let err = f
    .store
    .create_ticket(NewTicket::new(ent.entitlement_id, "hello"), stranger)
    .await
    .unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Forbidden));

  let t = f.ticket(&ent).await;
  let err = f
    .store
    .add_comment(t.ticket_id, NewComment::new("hi"), stranger)
    .await
    .unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Forbidden));

  let err = f.store.assign_ticket(t.ticket_id, Some(Uuid::new_v4()), f.tenant).await.unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Forbidden));
}

#[tokio::test]
async fn pending_entitlement_cannot_open_tickets() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f
    .store
    .create_entitlement(
      NewEntitlement { pending_payment: true, ..f.new_entitlement(&ty) },
      f.admin,
    )
    .await
    .unwrap();
  assert_eq!(ent.status, EntitlementStatus::PendingPayment);

  let err = f
    .store
    .create_ticket(NewTicket::new(ent.entitlement_id, "x"), f.tenant)
    .await
    .unwrap_err();
  let refused = err.as_core().and_then(CoreError::availability).unwrap();
  assert_eq!(refused.reason, "entitlement is pending_payment");
}

#[tokio::test]
async fn out_of_period_entitlement_refuses() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f.entitlement(&ty).await;
  f.clock.set(local(2025, 4, 2, 10));

  let availability = f.store.availability(ent.entitlement_id).await.unwrap();
  assert!(!availability.can_open);
  assert_eq!(availability.reason, "entitlement not currently in force");
  assert!(f.store.active_entitlement(f.company).await.unwrap().is_none());
}

#[tokio::test]
async fn basic_tier_accepts_weekend_tickets_with_deferral() {
  let f = Fixture::new().await;
  let ty = f
    .support_type_with(Modality::Monthly, None, ServiceTier::Basic)
    .await;
  let ent = f.entitlement(&ty).await;
  f.clock.set(local(2025, 3, 8, 11));

  let availability = f.store.availability(ent.entitlement_id).await.unwrap();
  assert!(availability.can_open);
  assert!(availability.requires_business_hours);
  assert!(availability.reason.contains("outside business hours"));
  f.ticket(&ent).await;
}

#[tokio::test]
async fn listing_and_stats() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Yearly, None).await;
  let ent = f.entitlement(&ty).await;
  let a = f.ticket(&ent).await;
  let b = f.ticket(&ent).await;
  let c = f.ticket(&ent).await;

  f.store.set_ticket_priority(a.ticket_id, Priority::Critical, f.admin).await.unwrap();
  f.store.close_ticket(b.ticket_id, f.admin).await.unwrap();
  let assignee = Uuid::new_v4();
  f.store.assign_ticket(c.ticket_id, Some(assignee), f.admin).await.unwrap();

  let open = f
    .store
    .list_tickets(&TicketQuery { status: Some(TicketStatus::Open), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(open.len(), 2);

  let mine = f
    .store
    .list_tickets(&TicketQuery { assignee: Some(assignee), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(mine.len(), 1);
  assert_eq!(mine[0].ticket_id, c.ticket_id);

  let stats = f.store.ticket_stats(Some(f.company)).await.unwrap();
  assert_eq!(stats.open, 2);
  assert_eq!(stats.closed, 1);
  assert_eq!(stats.critical_open, 1);

  let comments = f.store.list_comments(a.ticket_id).await.unwrap();
  assert_eq!(comments[0].body, "[System] Priority: medium → critical");
}

// ─── Entitlement lifecycle ───────────────────────────────────────────────────

#[tokio::test]
async fn one_active_entitlement_per_company() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let first = f.entitlement(&ty).await;

  let err = f
    .store
    .create_entitlement(f.new_entitlement(&ty), f.admin)
    .await
    .unwrap_err();
  assert!(matches!(
    err.as_core(),
    Some(CoreError::ActiveEntitlementExists { existing, .. }) if *existing == first.entitlement_id
  ));

  let pending = f
    .store
    .create_entitlement(
      NewEntitlement { pending_payment: true, ..f.new_entitlement(&ty) },
      f.admin,
    )
    .await
    .unwrap();
  let err = f
    .store
    .change_entitlement_status(pending.entitlement_id, EntitlementStatus::Active, f.admin, None)
    .await
    .unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Conflict));

  f.store
    .change_entitlement_status(first.entitlement_id, EntitlementStatus::Canceled, f.admin, None)
    .await
    .unwrap();
  let active = f
    .store
    .change_entitlement_status(pending.entitlement_id, EntitlementStatus::Active, f.admin, None)
    .await
    .unwrap();
  assert_eq!(active.status, EntitlementStatus::Active);

  let actives = f
    .store
    .list_entitlements(&EntitlementQuery {
      company_id: Some(f.company),
      status:     Some(EntitlementStatus::Active),
    })
    .await
    .unwrap();
  assert_eq!(actives.len(), 1);
}

#[tokio::test]
async fn canceled_entitlement_stays_canceled() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f.entitlement(&ty).await;
  f.store
    .change_entitlement_status(ent.entitlement_id, EntitlementStatus::Canceled, f.admin, Some("churned".into()))
    .await
    .unwrap();

  for next in [EntitlementStatus::Active, EntitlementStatus::PendingPayment, EntitlementStatus::Expired] {
    let err = f
      .store
      .change_entitlement_status(ent.entitlement_id, next, f.admin, None)
      .await
      .unwrap_err();
    assert!(matches!(err.as_core(), Some(CoreError::InvalidTransition { .. })));
  }
  assert_eq!(f.reload(&ent).await.status, EntitlementStatus::Canceled);

  let history = f.store.entitlement_history(ent.entitlement_id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[1].reason.as_deref(), Some("churned"));
  assert_eq!(history[1].actor, f.admin);
}

#[tokio::test]
async fn tenants_cannot_administer_entitlements() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let err = f
    .store
    .create_entitlement(f.new_entitlement(&ty), f.tenant)
    .await
    .unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Forbidden));
}

#[tokio::test]
async fn disabled_type_cannot_back_new_entitlements() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  f.store.set_support_type_active(ty.support_type_id, false).await.unwrap();

  let err = f
    .store
    .create_entitlement(f.new_entitlement(&ty), f.admin)
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::Precondition(_))));
  assert!(f.store.list_support_types(false).await.unwrap().is_empty());
  assert_eq!(f.store.list_support_types(true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn subscription_must_belong_to_company() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let err = f
    .store
    .create_entitlement(
      NewEntitlement { company_id: Uuid::new_v4(), ..f.new_entitlement(&ty) },
      f.admin,
    )
    .await
    .unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Validation));
}

#[tokio::test]
async fn editing_a_type_leaves_snapshots_alone() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(4)).await;
  let ent = f.entitlement(&ty).await;

  let edited = f
    .store
    .update_support_type(
      ty.support_type_id,
      SupportTypePatch {
        price: Some(Decimal::from(400)),
        max_tickets: Some(6),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert_eq!(edited.price, Decimal::from(400));
  assert_eq!(edited.max_tickets, Some(6));
  assert_eq!(
    f.store.get_support_type(ty.support_type_id).await.unwrap().unwrap().price,
    Decimal::from(400)
  );
  assert_eq!(f.reload(&ent).await.current_price, Decimal::from(250));

  let err = f
    .store
    .update_support_type(
      ty.support_type_id,
      SupportTypePatch { modality: Some(Modality::ByHourCount), ..Default::default() },
    )
    .await
    .unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Validation));

  let err = f
    .store
    .update_support_type(Uuid::new_v4(), SupportTypePatch::default())
    .await
    .unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn entitlement_edits_are_staff_only_and_validated() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f.entitlement(&ty).await;

  let patch = EntitlementPatch {
    auto_renew: Some(true),
    notes: Some("renegotiated".into()),
    end_date: Some(day(2025, 4, 15)),
  };
  let err = f
    .store
    .update_entitlement(ent.entitlement_id, patch.clone(), f.tenant)
    .await
    .unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Forbidden));

  let edited = f
    .store
    .update_entitlement(ent.entitlement_id, patch, f.admin)
    .await
    .unwrap();
  assert!(edited.auto_renew);
  assert_eq!(edited.notes.as_deref(), Some("renegotiated"));
  assert_eq!(edited.end_date, Some(day(2025, 4, 15)));
  assert_eq!(edited.status, EntitlementStatus::Active);

  let stored = f.reload(&ent).await;
  assert!(stored.auto_renew);
  assert_eq!(stored.end_date, Some(day(2025, 4, 15)));

  let err = f
    .store
    .update_entitlement(
      ent.entitlement_id,
      EntitlementPatch { end_date: Some(day(2025, 2, 1)), ..Default::default() },
      f.admin,
    )
    .await
    .unwrap_err();
  assert_eq!(kind(&err), Some(ErrorKind::Validation));
  assert_eq!(f.reload(&ent).await.end_date, Some(day(2025, 4, 15)));
}

#[tokio::test]
async fn price_is_snapshotted() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f.entitlement(&ty).await;
  assert_eq!(ent.current_price, Decimal::from(250));
  assert_eq!(
    f.store.active_entitlement(f.company).await.unwrap().map(|e| e.entitlement_id),
    Some(ent.entitlement_id)
  );
}

#[tokio::test]
async fn administrative_renewal() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(4)).await;
  let ent = f.entitlement(&ty).await;
  let t = f.ticket(&ent).await;
  f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();

  let next = f
    .store
    .renew_entitlement(ent.entitlement_id, RenewEntitlement::default(), f.admin)
    .await
    .unwrap();
  assert_eq!(next.status, EntitlementStatus::Active);
  assert_eq!(next.start_date, day(2025, 3, 31));
  assert_eq!(next.end_date, Some(day(2025, 4, 30)));
  assert_eq!(next.tickets_consumed, 0);
  assert_eq!(next.predecessor_id, Some(ent.entitlement_id));
  assert_eq!(f.reload(&ent).await.status, EntitlementStatus::Expired);

  let third = f
    .store
    .renew_entitlement(
      next.entitlement_id,
      RenewEntitlement { reset_counters: true, end_date: Some(day(2025, 12, 31)) },
      f.admin,
    )
    .await
    .unwrap();
  assert_eq!(third.tickets_consumed, 0);
  assert_eq!(third.end_date, Some(day(2025, 12, 31)));
}

#[tokio::test]
async fn renewal_restarts_ticket_counter_and_carries_hours() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(2)).await;
  let ent = f.entitlement(&ty).await;
  for _ in 0..2 {
    let t = f.ticket(&ent).await;
    f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();
  }

  let next = f
    .store
    .renew_entitlement(ent.entitlement_id, RenewEntitlement::default(), f.admin)
    .await
    .unwrap();
  assert_eq!(next.tickets_consumed, 0);

  f.clock.set(local(2025, 4, 2, 10));
  let availability = f.store.availability(next.entitlement_id).await.unwrap();
  assert!(availability.can_open);
  assert_eq!(availability.consumed, Decimal::ZERO);
  assert_eq!(availability.available, Some(Decimal::from(2)));

  // Hours are a running balance and do carry unless reset.
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByHourCount, Some(10)).await;
  let ent = f.entitlement(&ty).await;
  let t = f.ticket(&ent).await;
  f.clock.advance(Duration::hours(3));
  f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();

  let next = f
    .store
    .renew_entitlement(ent.entitlement_id, RenewEntitlement::default(), f.admin)
    .await
    .unwrap();
  assert_eq!(next.hours_consumed, Decimal::from(3));
  assert_eq!(next.tickets_consumed, 0);
}

#[tokio::test]
async fn pending_entitlement_cannot_be_renewed() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f
    .store
    .create_entitlement(
      NewEntitlement { pending_payment: true, ..f.new_entitlement(&ty) },
      f.admin,
    )
    .await
    .unwrap();
  let err = f
    .store
    .renew_entitlement(ent.entitlement_id, RenewEntitlement::default(), f.admin)
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::Precondition(_))));
}

// ─── Payments ────────────────────────────────────────────────────────────────

fn payment(ent: &SupportEntitlement, status: PaymentStatus) -> NewPayment {
  NewPayment {
    entitlement_id: ent.entitlement_id,
    amount:         Decimal::from(250),
    paid_at:        None,
    method:         "transfer".into(),
    reference:      Some("TX-1".into()),
    status,
    details:        serde_json::Value::Null,
  }
}

#[tokio::test]
async fn successful_payment_activates_pending_entitlement() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f
    .store
    .create_entitlement(
      NewEntitlement { pending_payment: true, ..f.new_entitlement(&ty) },
      f.admin,
    )
    .await
    .unwrap();

  let p = f.store.record_payment(payment(&ent, PaymentStatus::Pending), f.admin).await.unwrap();
  assert_eq!(f.reload(&ent).await.status, EntitlementStatus::PendingPayment);

  f.store.change_payment_status(p.payment_id, PaymentStatus::Successful, f.admin).await.unwrap();
  assert_eq!(f.reload(&ent).await.status, EntitlementStatus::Active);

  let history = f.store.entitlement_history(ent.entitlement_id).await.unwrap();
  let last = history.last().unwrap();
  assert_eq!(last.new_status, "active");
  assert_eq!(last.actor, f.admin);

  // Reverting the payment does not touch the entitlement.
  f.store.change_payment_status(p.payment_id, PaymentStatus::Failed, f.admin).await.unwrap();
  assert_eq!(f.reload(&ent).await.status, EntitlementStatus::Active);
  assert!(
    f.store
      .change_payment_status(p.payment_id, PaymentStatus::Successful, f.admin)
      .await
      .is_err()
  );

  f.store.record_payment(payment(&ent, PaymentStatus::Successful), f.admin).await.unwrap();
  let ledger = f.store.list_payments(ent.entitlement_id).await.unwrap();
  assert_eq!(ledger.payments.len(), 2);
  assert_eq!(ledger.successful_total, Decimal::from(250));
}

#[tokio::test]
async fn payment_activation_conflict_rolls_back() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  f.entitlement(&ty).await;
  let pending = f
    .store
    .create_entitlement(
      NewEntitlement { pending_payment: true, ..f.new_entitlement(&ty) },
      f.admin,
    )
    .await
    .unwrap();

  let err = f
    .store
    .record_payment(payment(&pending, PaymentStatus::Successful), f.admin)
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::ActiveEntitlementExists { .. })));
  assert!(f.store.list_payments(pending.entitlement_id).await.unwrap().payments.is_empty());
  assert_eq!(f.reload(&pending).await.status, EntitlementStatus::PendingPayment);
}

// ─── Renewal batch ───────────────────────────────────────────────────────────

#[tokio::test]
async fn auto_renew_versus_lapse() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::ByTicketCount, Some(3)).await;
  let renewing = f.other_company(&ty, true).await;
  let lapsing = f.other_company(&ty, false).await;

  let t = f
    .store
    .create_ticket(NewTicket::new(renewing.entitlement_id, "x"), f.admin)
    .await
    .unwrap();
  f.store.close_ticket(t.ticket_id, f.admin).await.unwrap();

  f.clock.set(local(2025, 3, 31, 9));
  let report = run_renewals(&f.store, f.store.today(), RenewalOptions::default())
    .await
    .unwrap();
  assert!(report.is_clean());
  assert_eq!(report.entitlements_renewed, 1);
  assert_eq!(report.entitlements_lapsed, 1);

  let renewed = report
    .outcomes
    .iter()
    .find(|o| o.record_id == renewing.entitlement_id)
    .unwrap();
  assert_eq!(renewed.action, RenewalAction::Renewed);
  let successor = f
    .store
    .get_entitlement(renewed.successor_id.unwrap())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(successor.status, EntitlementStatus::Active);
  assert_eq!(successor.tickets_consumed, 0);
  assert_eq!(successor.start_date, day(2025, 3, 31));
  assert_eq!(successor.end_date, Some(day(2025, 4, 30)));
  assert!(successor.auto_renew);

  assert_eq!(f.reload(&renewing).await.status, EntitlementStatus::Expired);
  assert_eq!(f.reload(&lapsing).await.status, EntitlementStatus::Expired);
  let lapsed_company = f
    .store
    .list_entitlements(&EntitlementQuery { company_id: Some(lapsing.company_id), status: None })
    .await
    .unwrap();
  assert_eq!(lapsed_company.len(), 1);

  // Already processed: a second run finds nothing.
  let again = run_renewals(&f.store, f.store.today(), RenewalOptions::default())
    .await
    .unwrap();
  assert!(again.outcomes.is_empty());
}

#[tokio::test]
async fn switching_auto_renew_off_lapses_instead() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f.other_company(&ty, true).await;

  f.store
    .update_entitlement(
      ent.entitlement_id,
      EntitlementPatch { auto_renew: Some(false), ..Default::default() },
      f.admin,
    )
    .await
    .unwrap();

  f.clock.set(local(2025, 3, 31, 9));
  let report = run_renewals(&f.store, f.store.today(), RenewalOptions::default())
    .await
    .unwrap();
  assert_eq!(report.entitlements_renewed, 0);
  assert_eq!(report.entitlements_lapsed, 1);
  let outcome = report
    .outcomes
    .iter()
    .find(|o| o.record_id == ent.entitlement_id)
    .unwrap();
  assert_eq!(outcome.action, RenewalAction::Lapsed);
  assert_eq!(outcome.successor_id, None);
  assert_eq!(f.reload(&ent).await.status, EntitlementStatus::Expired);
}

#[tokio::test]
async fn renewal_isolates_malformed_records() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let first = f.other_company(&ty, true).await;
  let broken = f.other_company(&ty, true).await;
  let third = f.other_company(&ty, true).await;

  f.store
    .execute_raw(format!(
      "PRAGMA foreign_keys = OFF;
       UPDATE entitlements SET support_type_id = '{}' WHERE entitlement_id = '{}';",
      Uuid::new_v4(),
      broken.entitlement_id
    ))
    .await
    .unwrap();

  f.clock.set(local(2025, 3, 31, 9));
  let report = run_renewals(&f.store, f.store.today(), RenewalOptions::default())
    .await
    .unwrap();

  assert_eq!(report.entitlements_renewed, 2);
  assert_eq!(report.errors.len(), 1);
  assert_eq!(report.errors[0].record_id, broken.entitlement_id);
  assert_eq!(f.reload(&first).await.status, EntitlementStatus::Expired);
  assert_eq!(f.reload(&third).await.status, EntitlementStatus::Expired);
  assert_eq!(f.reload(&broken).await.status, EntitlementStatus::Active);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  let ent = f.other_company(&ty, true).await;
  f.clock.set(local(2025, 3, 31, 9));

  let report = run_renewals(
    &f.store,
    f.store.today(),
    RenewalOptions { dry_run: true, lead_days: 0 },
  )
  .await
  .unwrap();
  assert!(report.dry_run);
  assert_eq!(report.entitlements_renewed, 1);
  assert_eq!(report.outcomes[0].action, RenewalAction::WouldRenew);
  assert_eq!(report.outcomes[0].successor_id, None);
  assert_eq!(f.reload(&ent).await.status, EntitlementStatus::Active);
}

#[tokio::test]
async fn lead_days_widen_the_window() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  f.other_company(&ty, false).await;
  f.clock.set(local(2025, 3, 28, 9));

  let narrow = run_renewals(&f.store, f.store.today(), RenewalOptions { dry_run: true, lead_days: 2 })
    .await
    .unwrap();
  assert!(narrow.outcomes.is_empty());

  let wide = run_renewals(&f.store, f.store.today(), RenewalOptions { dry_run: true, lead_days: 3 })
    .await
    .unwrap();
  assert_eq!(wide.cutoff, day(2025, 3, 31));
  assert_eq!(wide.entitlements_lapsed, 1);
}

#[tokio::test]
async fn subscriptions_renew_at_current_plan_price() {
  let f = Fixture::new().await;
  let company = Uuid::new_v4();
  let sub = f.subscription_for(company, day(2025, 3, 31), true).await;
  let lapsing = f.subscription_for(Uuid::new_v4(), day(2025, 3, 31), false).await;
  f.clock.set(local(2025, 3, 31, 9));

  let report = run_renewals(&f.store, f.store.today(), RenewalOptions::default())
    .await
    .unwrap();
  assert_eq!(report.plans_renewed, 1);
  assert_eq!(report.plans_lapsed, 1);

  let subs = f.store.list_subscriptions(Some(company)).await.unwrap();
  assert_eq!(subs.len(), 2);
  let successor = subs.iter().find(|s| s.predecessor_id == Some(sub.subscription_id)).unwrap();
  assert_eq!(successor.status, SubscriptionStatus::Active);
  assert_eq!(successor.price_paid, Decimal::from(100));
  assert_eq!(successor.discount_percent, Decimal::from(10));
  assert_eq!(successor.start_date, day(2025, 3, 31));
  assert_eq!(successor.end_date, Some(day(2025, 4, 30)));

  let old = f.store.get_subscription(sub.subscription_id).await.unwrap().unwrap();
  assert_eq!(old.status, SubscriptionStatus::Inactive);
  let old = f.store.get_subscription(lapsing.subscription_id).await.unwrap().unwrap();
  assert_eq!(old.status, SubscriptionStatus::Inactive);
}

#[tokio::test]
async fn concurrent_runs_are_locked_out() {
  let f = Fixture::new().await;
  let ty = f.support_type(Modality::Monthly, None).await;
  f.other_company(&ty, false).await;
  f.clock.set(local(2025, 3, 31, 9));

  let other = Uuid::new_v4();
  f.store.acquire_job_lock(RENEWAL_JOB, other, renewal_lock_ttl()).await.unwrap();

  let err = run_renewals(&f.store, f.store.today(), RenewalOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(CoreError::JobLocked(_))));

  // Dry runs take no lock.
  assert!(
    run_renewals(&f.store, f.store.today(), RenewalOptions { dry_run: true, lead_days: 0 })
      .await
      .is_ok()
  );

  // A stale lock is taken over.
  f.clock.advance(Duration::hours(7));
  let report = run_renewals(&f.store, f.store.today(), RenewalOptions::default())
    .await
    .unwrap();
  assert_eq!(report.entitlements_lapsed, 1);

  // And released afterwards.
  f.store.acquire_job_lock(RENEWAL_JOB, other, renewal_lock_ttl()).await.unwrap();
}
