//! The driver and its three execution modes.
//!
//! Each mode acquires one connection, hands the unit of work a handle of the
//! matching tier, acts on what the unit of work returned and releases the
//! connection on every exit path. Connection state changed for the call is
//! restored before release; a connection that cannot be restored is detached
//! from its pool.

use crate::db::connection::{BoxConnection, Connection, ConnectionSource};
use crate::db::handle::{ReadWriteHandle, ReadonlyHandle, TransactionHandle};
use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// What a read-write unit of work asks the driver to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    Commit(T),
    /// Roll back, with a reason for the logs.
    Rollback(String),
}

impl<T> Outcome<T> {
    pub fn rollback(reason: impl Into<String>) -> Self {
        Self::Rollback(reason.into())
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, Self::Commit(_))
    }

    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback(_))
    }

    /// The committed value, if the unit of work committed.
    pub fn into_committed(self) -> Option<T> {
        match self {
            Self::Commit(value) => Some(value),
            Self::Rollback(_) => None,
        }
    }

    pub fn rollback_reason(&self) -> Option<&str> {
        match self {
            Self::Commit(_) => None,
            Self::Rollback(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    ReadOnly,
    ReadWrite,
    MultiTransaction,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::ReadOnly => "read_only",
            Mode::ReadWrite => "read_write",
            Mode::MultiTransaction => "multi_transaction",
        }
    }
}

/// Runs units of work against an injected connection source.
///
/// Construct one at startup and pass it by reference; cloning shares the
/// source.
#[derive(Clone, Default)]
pub struct Driver {
    source: Option<Arc<dyn ConnectionSource>>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("configured", &self.source.is_some())
            .finish()
    }
}

impl Driver {
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// A driver without a connection source. Every mode fails with a
    /// configuration error until one is set.
    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn set_source(&mut self, source: Arc<dyn ConnectionSource>) {
        self.source = Some(source);
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    async fn acquire(&self, store: Option<&str>) -> DbResult<BoxConnection> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| DbError::configuration("No connection source has been configured"))?;
        source.acquire(store).await
    }

    /// Run a unit of work on a read-only connection of the default store.
    ///
    /// An error from the unit of work is re-raised as an access error
    /// carrying the original message.
    pub async fn read_only<T, F>(&self, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'h> FnOnce(&'h mut ReadonlyHandle) -> BoxFuture<'h, DbResult<T>> + Send,
    {
        self.read_only_inner(None, work).await
    }

    /// Run a unit of work on a read-only connection of a named store.
    pub async fn read_only_on<T, F>(&self, store: &str, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'h> FnOnce(&'h mut ReadonlyHandle) -> BoxFuture<'h, DbResult<T>> + Send,
    {
        self.read_only_inner(Some(store), work).await
    }

    /// Run a unit of work in one transaction on the default store.
    ///
    /// [`Outcome::Commit`] commits and [`Outcome::Rollback`] rolls back; the
    /// outcome acted on is returned. An error, including a failed commit,
    /// rolls back and is re-raised as an access error carrying the original
    /// message.
    pub async fn read_write<T, F>(&self, work: F) -> DbResult<Outcome<T>>
    where
        T: Send,
        F: for<'h> FnOnce(&'h mut ReadWriteHandle) -> BoxFuture<'h, DbResult<Outcome<T>>> + Send,
    {
        self.read_write_inner(None, work).await
    }

    pub async fn read_write_on<T, F>(&self, store: &str, work: F) -> DbResult<Outcome<T>>
    where
        T: Send,
        F: for<'h> FnOnce(&'h mut ReadWriteHandle) -> BoxFuture<'h, DbResult<Outcome<T>>> + Send,
    {
        self.read_write_inner(Some(store), work).await
    }

    /// Hand the unit of work explicit control over transaction boundaries on
    /// one connection of the default store.
    pub async fn multi_transaction<T, F>(&self, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'h> FnOnce(&'h mut TransactionHandle) -> BoxFuture<'h, DbResult<T>> + Send,
    {
        self.multi_transaction_inner(None, work).await
    }

    pub async fn multi_transaction_on<T, F>(&self, store: &str, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'h> FnOnce(&'h mut TransactionHandle) -> BoxFuture<'h, DbResult<T>> + Send,
    {
        self.multi_transaction_inner(Some(store), work).await
    }

    async fn read_only_inner<T, F>(&self, store: Option<&str>, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'h> FnOnce(&'h mut ReadonlyHandle) -> BoxFuture<'h, DbResult<T>> + Send,
    {
        let span = unit_of_work_span(Mode::ReadOnly, store);
        async move {
            let mut conn = self.acquire(store).await?;
            let result = match conn.set_read_only(true).await {
                Ok(()) => {
                    let mut handle = ReadonlyHandle::new(conn);
                    let result = work(&mut handle).await;
                    conn = handle.into_connection();
                    result
                }
                Err(e) => Err(e),
            };
            let result = result.map_err(|e| {
                warn!(error = %e, "Read-only unit of work failed");
                DbError::unit_of_work_failed(e)
            });

            if let Err(e) = conn.set_read_only(false).await {
                warn!(error = %e, "Failed to clear read-only flag, detaching connection");
                conn.detach();
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn read_write_inner<T, F>(&self, store: Option<&str>, work: F) -> DbResult<Outcome<T>>
    where
        T: Send,
        F: for<'h> FnOnce(&'h mut ReadWriteHandle) -> BoxFuture<'h, DbResult<Outcome<T>>> + Send,
    {
        let span = unit_of_work_span(Mode::ReadWrite, store);
        async move {
            let mut conn = self.acquire(store).await?;
            let outcome = match conn.set_auto_commit(false).await {
                Ok(()) => {
                    let mut handle = ReadWriteHandle::new(conn);
                    let outcome = work(&mut handle).await;
                    conn = handle.into_connection();
                    outcome
                }
                Err(e) => Err(e),
            };

            let result = match outcome {
                Ok(Outcome::Commit(value)) => match conn.commit().await {
                    Ok(()) => {
                        info!("Unit of work committed");
                        Ok(Outcome::Commit(value))
                    }
                    Err(e) => {
                        warn!(error = %e, "Commit failed, rolling back");
                        rollback_quietly(&mut conn).await;
                        Err(DbError::unit_of_work_failed(e))
                    }
                },
                Ok(Outcome::Rollback(reason)) => conn.rollback().await.map(|()| {
                    info!(reason = %reason, "Unit of work rolled back");
                    Outcome::Rollback(reason)
                }),
                Err(e) => {
                    warn!(error = %e, "Unit of work failed, rolling back");
                    rollback_quietly(&mut conn).await;
                    Err(DbError::unit_of_work_failed(e))
                }
            };

            restore_auto_commit(conn).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn multi_transaction_inner<T, F>(&self, store: Option<&str>, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'h> FnOnce(&'h mut TransactionHandle) -> BoxFuture<'h, DbResult<T>> + Send,
    {
        let span = unit_of_work_span(Mode::MultiTransaction, store);
        async move {
            let conn = self.acquire(store).await?;
            let mut handle = TransactionHandle::new(conn);
            let result = work(&mut handle).await;
            let mut conn = handle.into_connection();

            let result = match result {
                Ok(value) => {
                    if conn.in_transaction() {
                        warn!("Transaction left open by the unit of work, rolling back");
                        rollback_quietly(&mut conn).await;
                    }
                    Ok(value)
                }
                Err(e) => {
                    warn!(error = %e, "Unit of work failed, rolling back");
                    rollback_quietly(&mut conn).await;
                    Err(DbError::unit_of_work_failed(e))
                }
            };

            restore_auto_commit(conn).await;
            result
        }
        .instrument(span)
        .await
    }
}

fn unit_of_work_span(mode: Mode, store: Option<&str>) -> tracing::Span {
    let id = format!("uow_{}", Uuid::new_v4().simple());
    info_span!(
        "unit_of_work",
        id = %id,
        mode = mode.as_str(),
        store = store.unwrap_or("default")
    )
}

/// Roll back, logging instead of propagating a failure so it never masks the
/// error that caused it.
async fn rollback_quietly(conn: &mut BoxConnection) {
    if let Err(e) = conn.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}

/// Re-enable auto-commit before release. A transaction still open here means
/// its rollback failed; re-enabling would commit it, so the connection is
/// detached instead.
async fn restore_auto_commit(mut conn: BoxConnection) {
    if conn.in_transaction() {
        warn!("Transaction still open at release, detaching connection");
        conn.detach();
        return;
    }
    if let Err(e) = conn.set_auto_commit(true).await {
        warn!(error = %e, "Failed to restore auto-commit, detaching connection");
        conn.detach();
    }
}
