//! Core types and trait definitions for the support-entitlement engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! owns the closed state enumerations and their transition tables, the pure
//! availability / consumption / renewal-period computations, and the
//! [`store::SupportStore`] abstraction every backend implements.

pub mod actor;
pub mod audit;
pub mod availability;
pub mod catalog;
pub mod clock;
pub mod consumption;
pub mod entitlement;
pub mod error;
pub mod payment;
pub mod renewal;
pub mod store;
pub mod subscription;
pub mod ticket;

pub use error::{Error, ErrorKind, Result, StoreError};
