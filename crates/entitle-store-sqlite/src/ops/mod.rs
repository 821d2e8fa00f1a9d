//! Synchronous database operations.
//!
//! Every function takes a `&Connection` that is, for writes, the open
//! IMMEDIATE transaction provided by [`crate::SqliteStore`]. Functions never
//! commit; an `Err` return rolls the whole operation back.

pub mod audit;
pub mod catalog;
pub mod entitlements;
pub mod payments;
pub mod renewals;
pub mod tickets;

use rusqlite::{Connection, OptionalExtension as _, Params, Row};

use crate::Result;

/// Run a single-row query and decode it, `None` if no row matched.
pub(crate) fn query_one<R, T, P>(
  conn: &Connection,
  sql: &str,
  params: P,
  from_row: fn(&Row<'_>) -> rusqlite::Result<R>,
  decode: fn(R) -> Result<T>,
) -> Result<Option<T>>
where
  P: Params,
{
  conn
    .query_row(sql, params, from_row)
    .optional()?
    .map(decode)
    .transpose()
}

/// Run a query and decode every row.
pub(crate) fn query_all<R, T, P>(
  conn: &Connection,
  sql: &str,
  params: P,
  from_row: fn(&Row<'_>) -> rusqlite::Result<R>,
  decode: fn(R) -> Result<T>,
) -> Result<Vec<T>>
where
  P: Params,
{
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params, from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(decode).collect()
}
