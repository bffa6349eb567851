//! Tree-wide edit locks.
//!
//! A lock on a path covers that node and its subtree. Two users conflict
//! when either locked path is a prefix of the other. Locks lapse at their
//! deadline.

use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("\"{path}\" is locked by user {holder}")]
    Held { path: String, holder: u32 },

    #[error("\"{path}\" is not locked by user {user}")]
    NotHeld { path: String, user: u32 },
}

#[derive(Debug, Clone)]
struct EditLock {
    segments: Vec<String>,
    user: u32,
    expires: Instant,
}

impl EditLock {
    fn live(&self, now: Instant) -> bool {
        self.expires > now
    }
}

#[derive(Debug, Default)]
pub struct LockTable {
    locks: Vec<EditLock>,
}

fn segments(path: &str) -> Vec<String> {
    path.split_whitespace().map(str::to_string).collect()
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    let n = a.len().min(b.len());
    a[..n] == b[..n]
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take or refresh a lock on `path` for `timeout`.
    pub fn lock(&mut self, path: &str, user: u32, timeout: Duration) -> Result<(), LockError> {
        let now = Instant::now();
        self.locks.retain(|l| l.live(now));
        let wanted = segments(path);

        if let Some(other) = self
            .locks
            .iter()
            .find(|l| l.user != user && overlaps(&l.segments, &wanted))
        {
            return Err(LockError::Held { path: path.to_string(), holder: other.user });
        }

        let expires = now + timeout;
        match self.locks.iter_mut().find(|l| l.user == user && l.segments == wanted) {
            Some(existing) => existing.expires = expires,
            None => self.locks.push(EditLock { segments: wanted, user, expires }),
        }
        tracing::debug!(path = %path, user, ?timeout, "edit lock taken");
        Ok(())
    }

    pub fn unlock(&mut self, path: &str, user: u32) -> Result<(), LockError> {
        let now = Instant::now();
        let wanted = segments(path);
        let before = self.locks.len();
        self.locks.retain(|l| !(l.user == user && l.segments == wanted));
        let released = self.locks.len() != before;
        self.locks.retain(|l| l.live(now));
        if released {
            tracing::debug!(path = %path, user, "edit lock released");
            Ok(())
        } else {
            Err(LockError::NotHeld { path: path.to_string(), user })
        }
    }

    /// Fails when another user holds a live lock overlapping `path`.
    pub fn check(&self, path: &str, user: u32) -> Result<(), LockError> {
        let now = Instant::now();
        let wanted = segments(path);
        match self
            .locks
            .iter()
            .find(|l| l.live(now) && l.user != user && overlaps(&l.segments, &wanted))
        {
            Some(other) => Err(LockError::Held { path: path.to_string(), holder: other.user }),
            None => Ok(()),
        }
    }

    /// Number of live locks.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.locks.iter().filter(|l| l.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
