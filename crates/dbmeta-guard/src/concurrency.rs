//! Concurrency gate bounding simultaneous catalog sessions

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("concurrency gate is closed")]
pub struct GateClosed;

/// Counting admission gate. A limit of 0 disables it entirely.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Option<Arc<Semaphore>>,
}

/// Held for the duration of one admitted call; dropping it frees the slot.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Self {
        let semaphore = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        Self { semaphore }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Wait for a free slot. Returns immediately when the gate is unbounded.
    pub async fn acquire(&self) -> Result<GatePermit, GateClosed> {
        match &self.semaphore {
            None => Ok(GatePermit { _permit: None }),
            Some(semaphore) => {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| GateClosed)?;
                Ok(GatePermit {
                    _permit: Some(permit),
                })
            }
        }
    }

    /// Free slots right now, or `None` when unbounded
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unbounded_never_blocks() {
        let gate = ConcurrencyGate::unbounded();
        let permits: Vec<_> = acquire_many(&gate, 100).await;
        assert_eq!(permits.len(), 100);
        assert_eq!(gate.available(), None);
    }

    async fn acquire_many(gate: &ConcurrencyGate, n: usize) -> Vec<GatePermit> {
        let mut permits = Vec::with_capacity(n);
        for _ in 0..n {
            let permit = tokio::time::timeout(Duration::from_millis(50), gate.acquire())
                .await
                .expect("unbounded gate must not block")
                .unwrap();
            permits.push(permit);
        }
        permits
    }

    #[tokio::test]
    async fn test_blocks_when_full_until_release() {
        let gate = ConcurrencyGate::new(2);
        let first = gate.acquire().await.unwrap();
        let _second = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), Some(0));

        let blocked = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(blocked.is_err(), "third acquire should wait");

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be admitted after release")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_permit_released_on_error_path() {
        let gate = ConcurrencyGate::new(1);

        async fn failing(gate: &ConcurrencyGate) -> Result<(), &'static str> {
            let _permit = gate.acquire().await.map_err(|_| "closed")?;
            Err("assembly failed")
        }

        assert!(failing(&gate).await.is_err());
        assert_eq!(gate.available(), Some(1));
    }

    #[tokio::test]
    async fn test_permit_released_on_panic() {
        let gate = ConcurrencyGate::new(1);
        let task = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await.unwrap();
                let faulty = true;
                if faulty {
                    panic!("unexpected fault");
                }
            })
        };
        assert!(task.await.is_err());
        assert_eq!(gate.available(), Some(1));
    }
}
