//! Cooperative cancellation and per-page time budgets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Document-level cancellation flag shared by all page workers.
///
/// Clones observe the same flag. Workers poll it between steps; once set,
/// the conversion returns [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Deadline and cancellation state for one page worker.
#[derive(Debug, Clone)]
pub struct PageBudget {
    page: u32,
    deadline: Option<Instant>,
    token: Option<CancellationToken>,
}

impl PageBudget {
    /// A budget that never expires.
    pub fn unlimited(page: u32) -> Self {
        Self {
            page,
            deadline: None,
            token: None,
        }
    }

    /// A budget expiring `timeout` from now. A zero timeout is already
    /// expired.
    pub fn new(page: u32, timeout: Duration) -> Self {
        Self {
            page,
            deadline: Some(Instant::now() + timeout),
            token: None,
        }
    }

    /// Attach a cancellation token.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, `None` when unlimited.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Checkpoint: cancellation first, then the deadline.
    pub fn check(&self) -> Result<()> {
        self.check_cancelled()?;
        if self.is_expired() {
            return Err(Error::Timeout { page: self.page });
        }
        Ok(())
    }

    /// Checkpoint that ignores the deadline.
    pub fn check_cancelled(&self) -> Result<()> {
        match &self.token {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    /// Checkpoint after `done` units of work. Before the first unit only
    /// cancellation is checked, so an expired page still yields a prefix.
    pub fn check_progress(&self, done: usize) -> Result<()> {
        if done == 0 {
            self.check_cancelled()
        } else {
            self.check()
        }
    }
}

/// Page time limit and cancellation for one ingestion pass.
///
/// Every page gets a fresh [`PageBudget`] when its reading starts.
#[derive(Debug, Clone, Default)]
pub struct IngestBudget {
    page_timeout: Option<Duration>,
    token: Option<CancellationToken>,
}

impl IngestBudget {
    /// No deadline and no cancellation.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Each page may take up to `page_timeout`.
    pub fn new(page_timeout: Duration) -> Self {
        Self {
            page_timeout: Some(page_timeout),
            token: None,
        }
    }

    /// Attach a cancellation token.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Start the budget of one page.
    pub fn page(&self, page: u32) -> PageBudget {
        let budget = match self.page_timeout {
            Some(timeout) => PageBudget::new(page, timeout),
            None => PageBudget::unlimited(page),
        };
        match &self.token {
            Some(token) => budget.with_token(token.clone()),
            None => budget,
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        match &self.token {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}
