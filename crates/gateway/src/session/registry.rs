//! Registry of pending sessions.
//!
//! A session is registered after it authenticates and stays here until a
//! browser claims it or the reaper expires it. Claim and reap both remove the
//! entry atomically, so exactly one of them ever owns a given session.
//!
//! The registry also keeps the live-session count used by the ceiling. A
//! create call reserves a slot with [`SessionRegistry::reserve`] before it
//! dials out, so connects that are still in flight count toward the ceiling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::shell::{RemoteShell, SessionError, SessionId};
use crate::admission::{self, AdmissionError};

/// Default age after which an unclaimed session is expired.
pub const DEFAULT_SESSION_GRACE: Duration = Duration::from_secs(30);

/// Default period of the reaper task.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

struct Entry {
    shell: RemoteShell,
    created_at: Instant,
}

/// Thread-safe map of session id to pending session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Entry>,
    /// Registered sessions plus outstanding reservations.
    slots: AtomicUsize,
}

/// A slot held by a create call while it connects.
///
/// Dropping it without calling [`SessionSlot::register`] gives the slot back.
#[must_use = "dropping a slot releases it"]
pub struct SessionSlot<'a> {
    registry: &'a SessionRegistry,
    armed: bool,
}

impl SessionSlot<'_> {
    /// Parks the session under the reserved slot and returns its id.
    pub fn register(mut self, shell: RemoteShell) -> SessionId {
        self.armed = false;
        self.registry.insert(shell)
    }
}

impl Drop for SessionSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release_slot();
        }
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a slot if fewer than `max` sessions are live or connecting.
    pub fn reserve(&self, max: usize) -> Result<SessionSlot<'_>, AdmissionError> {
        self.slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                admission::try_admit(live, max).ok().map(|()| live + 1)
            })
            .map_err(|live| AdmissionError::AtCapacity { pending: live, max })?;
        Ok(SessionSlot {
            registry: self,
            armed: true,
        })
    }

    /// Registers a pending session outside the ceiling and returns its id.
    pub fn create(&self, shell: RemoteShell) -> SessionId {
        self.slots.fetch_add(1, Ordering::SeqCst);
        self.insert(shell)
    }

    fn insert(&self, shell: RemoteShell) -> SessionId {
        let id = shell.id().clone();
        self.sessions.insert(
            id.clone(),
            Entry {
                shell,
                created_at: Instant::now(),
            },
        );
        tracing::info!(session_id = %id, pending = self.sessions.len(), "Registered session");
        id
    }

    /// Removes and returns the session. Succeeds at most once per id.
    pub fn claim(&self, id: &str) -> Result<RemoteShell, SessionError> {
        match self.sessions.remove(id) {
            Some((_, entry)) => {
                self.release_slot();
                tracing::debug!(
                    session_id = %id,
                    waited_ms = entry.created_at.elapsed().as_millis() as u64,
                    "Claimed session"
                );
                Ok(entry.shell)
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    fn release_slot(&self) {
        let _ = self
            .slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Sessions counted against the ceiling: pending plus still connecting.
    pub fn live(&self) -> usize {
        self.slots.load(Ordering::SeqCst)
    }

    /// Number of pending sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Closes and removes every session older than `grace`. Returns how many
    /// were expired.
    pub async fn reap(&self, grace: Duration) -> usize {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.created_at.elapsed() > grace)
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = 0;
        for id in expired {
            // A claim may have won the race since the scan.
            let Some((id, entry)) = self
                .sessions
                .remove_if(&id, |_, entry| entry.created_at.elapsed() > grace)
            else {
                continue;
            };
            self.release_slot();
            entry.shell.close().await;
            tracing::info!(session_id = %id, "Expired unclaimed session");
            reaped += 1;
        }
        reaped
    }

    /// Closes and removes every pending session.
    pub async fn close_all(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, entry)) = self.sessions.remove(&id) {
                self.release_slot();
                entry.shell.close().await;
            }
        }
    }

    /// Starts a background task that reaps expired sessions every `interval`
    /// until `token` is cancelled.
    pub fn start_reaper(
        self: &Arc<Self>,
        interval: Duration,
        grace: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = registry.reap(grace).await;
                        if reaped > 0 {
                            tracing::debug!(reaped, pending = registry.len(), "Reaper pass");
                        }
                    }
                }
            }
            tracing::debug!("Session reaper stopped");
        })
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("pending", &self.sessions.len())
            .field("live", &self.live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::super::shell::testing::loopback_shell;
    use super::*;

    #[tokio::test]
    async fn test_claim_removes_session() {
        let registry = SessionRegistry::new();
        let (shell, _) = loopback_shell(1024);
        let id = registry.create(shell);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&id));

        let shell = registry.claim(&id).unwrap();
        assert_eq!(shell.id(), &id);
        assert!(registry.is_empty());

        let again = registry.claim(&id);
        assert!(matches!(again, Err(SessionError::NotFound(_))));
        shell.close().await;
    }

    #[tokio::test]
    async fn test_claim_unknown_id() {
        let registry = SessionRegistry::new();
        let err = registry.claim("nope").unwrap_err();
        assert_eq!(err.kind(), super::super::shell::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_claim_single_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let (shell, _) = loopback_shell(1024);
        let id = registry.create(shell);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            handles.push(tokio::spawn(async move { registry.claim(&id).ok() }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            if let Some(shell) = handle.await.unwrap() {
                winners.push(shell);
            }
        }
        assert_eq!(winners.len(), 1);
        for shell in winners {
            shell.close().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_expires_old_sessions() {
        let registry = SessionRegistry::new();
        let (old, old_probe) = loopback_shell(1024);
        let old_id = registry.create(old);

        tokio::time::advance(Duration::from_secs(20)).await;
        let (fresh, fresh_probe) = loopback_shell(1024);
        let fresh_id = registry.create(fresh);

        // Exactly at the grace boundary nothing has expired yet.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(registry.reap(DEFAULT_SESSION_GRACE).await, 0);
        assert!(registry.contains(&old_id));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(registry.reap(DEFAULT_SESSION_GRACE).await, 1);

        assert!(!registry.contains(&old_id));
        assert!(registry.contains(&fresh_id));
        assert_eq!(old_probe.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(fresh_probe.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claimed_session_is_not_reaped() {
        let registry = SessionRegistry::new();
        let (shell, probe) = loopback_shell(1024);
        let id = registry.create(shell);

        let claimed = registry.claim(&id).unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(registry.reap(DEFAULT_SESSION_GRACE).await, 0);
        assert_eq!(probe.disconnects.load(Ordering::SeqCst), 0);
        assert!(!claimed.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_task_runs_until_cancelled() {
        let registry = Arc::new(SessionRegistry::new());
        let token = CancellationToken::new();
        let handle =
            registry.start_reaper(DEFAULT_REAP_INTERVAL, DEFAULT_SESSION_GRACE, token.clone());

        let (shell, probe) = loopback_shell(1024);
        registry.create(shell);

        // The tick at 30s sees the entry exactly at grace and keeps it; the
        // tick at 60s expires it.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(registry.len(), 1);
        assert_eq!(probe.disconnects.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(registry.is_empty());
        assert_eq!(probe.disconnects.load(Ordering::SeqCst), 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reserve_enforces_ceiling() {
        let registry = SessionRegistry::new();

        let first = registry.reserve(2).unwrap();
        let second = registry.reserve(2).unwrap();
        assert_eq!(registry.live(), 2);
        assert!(registry.is_empty());
        assert_eq!(
            registry.reserve(2).err(),
            Some(AdmissionError::AtCapacity { pending: 2, max: 2 })
        );

        // A failed connect hands its slot back.
        drop(first);
        assert_eq!(registry.live(), 1);

        let (shell, _) = loopback_shell(1024);
        let id = second.register(shell);
        assert_eq!(registry.live(), 1);
        assert!(registry.contains(&id));

        let third = registry.reserve(2).unwrap();
        assert!(registry.reserve(2).is_err());
        drop(third);

        let shell = registry.claim(&id).unwrap();
        assert_eq!(registry.live(), 0);
        shell.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_reserve_never_exceeds_ceiling() {
        let registry = Arc::new(SessionRegistry::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                let Ok(slot) = registry.reserve(3) else {
                    return false;
                };
                // Hold the slot across a yield, as a connect would.
                tokio::task::yield_now().await;
                let (shell, _) = loopback_shell(1024);
                slot.register(shell);
                true
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.live(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_and_close_all_release_slots() {
        let registry = SessionRegistry::new();
        let (shell, _) = loopback_shell(1024);
        registry.reserve(1).unwrap().register(shell);
        assert!(registry.reserve(1).is_err());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(registry.reap(DEFAULT_SESSION_GRACE).await, 1);
        assert_eq!(registry.live(), 0);

        let (shell, _) = loopback_shell(1024);
        registry.reserve(1).unwrap().register(shell);
        registry.close_all().await;
        assert_eq!(registry.live(), 0);
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = SessionRegistry::new();
        let mut probes = Vec::new();
        for _ in 0..3 {
            let (shell, probe) = loopback_shell(1024);
            registry.create(shell);
            probes.push(probe);
        }

        registry.close_all().await;
        assert!(registry.is_empty());
        for probe in probes {
            assert_eq!(probe.disconnects.load(Ordering::SeqCst), 1);
        }
    }
}
