//! Scoped, move-only database transaction guard with commit-then-callback
//! sequencing (§4.7).

use async_trait::async_trait;
use flux::{GatewayError, GatewayResult};
use slog::Logger;
use std::future::Future;
use std::pin::Pin;

/// What a concrete database client plugs in: parameterized exec and a
/// commit that suspends until the driver's own ack callback fires. Kept
/// generic here since the gateway core names no concrete SQL driver.
#[async_trait]
pub trait TransactionDriver: Send {
    async fn exec(&mut self, sql: &str, params: &[String]) -> GatewayResult<u64>;

    /// Consumes the driver, issuing COMMIT and waiting for the
    /// acknowledgement. Returns whether the database confirmed success.
    async fn commit_ack(self: Box<Self>) -> bool;

    fn rollback(&mut self);
}

type CommitCallback = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
    Open,
    Committed,
    RolledBack,
}

/// RAII-scoped transaction. Move-only (holding `Option<Box<dyn
/// TransactionDriver>>` rather than `Clone`); drop without a terminal
/// transition rolls back and logs a warning, matching the reference's
/// destructor behavior.
pub struct TransactionGuard {
    driver: Option<Box<dyn TransactionDriver>>,
    state: GuardState,
    commit_callbacks: Vec<CommitCallback>,
    logger: Logger,
}

impl TransactionGuard {
    pub fn create(driver: Box<dyn TransactionDriver>, logger: Logger) -> TransactionGuard {
        TransactionGuard {
            driver: Some(driver),
            state: GuardState::Open,
            commit_callbacks: Vec::new(),
            logger,
        }
    }

    fn require_open(&self) -> GatewayResult<()> {
        match self.state {
            GuardState::Open => Ok(()),
            _ => Err(GatewayError::transaction_terminated()),
        }
    }

    pub async fn exec(&mut self, sql: &str, params: &[String]) -> GatewayResult<u64> {
        self.require_open()?;
        let driver = self.driver.as_mut().expect("open guard always holds a driver");
        driver.exec(sql, params).await
    }

    /// Registers a callback run, in registration order, only after the
    /// database has confirmed the commit.
    pub fn on_commit<F, Fut>(&mut self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.commit_callbacks.push(Box::new(move || Box::pin(callback())));
    }

    /// Commits, suspending until the driver's ack fires, then runs every
    /// post-commit callback sequentially. Callback failures are logged,
    /// never propagated — they must not undo an already-confirmed commit.
    pub async fn commit(&mut self) -> GatewayResult<()> {
        self.require_open()?;
        let driver = self.driver.take().expect("open guard always holds a driver");

        let success = driver.commit_ack().await;
        self.state = GuardState::Committed;

        if !success {
            return Err(GatewayError::commit_failed("database reported commit failure"));
        }

        for callback in self.commit_callbacks.drain(..) {
            callback().await;
        }

        slog::debug!(self.logger, "transaction committed");
        Ok(())
    }

    pub fn rollback(&mut self) -> GatewayResult<()> {
        match self.state {
            GuardState::Committed => Err(GatewayError::transaction_terminated()),
            GuardState::RolledBack => Ok(()),
            GuardState::Open => {
                if let Some(driver) = self.driver.as_mut() {
                    driver.rollback();
                }
                self.state = GuardState::RolledBack;
                slog::debug!(self.logger, "transaction rolled back");
                Ok(())
            }
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state == GuardState::Committed
    }

    pub fn is_rolled_back(&self) -> bool {
        self.state == GuardState::RolledBack
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.state == GuardState::Open {
            if let Some(driver) = self.driver.as_mut() {
                slog::warn!(self.logger, "transaction auto-rollback on drop");
                driver.rollback();
            }
            self.state = GuardState::RolledBack;
        }
    }
}
