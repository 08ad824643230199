//! Per-agent task dispatch queue.
//!
//! Durable FIFO per agent with priority classes; `poll` is non-destructive
//! and non-blocking, `ack` is idempotent, heartbeats drive liveness. Each
//! agent's queue has a single writer (keyed lock); queues for different
//! agents are fully independent.

use std::sync::Arc;

use tracing::debug;

use guildnet_core::clock::Clock;
use guildnet_core::constants::{LIVENESS_WINDOW_SECS, MAX_POLL_LIMIT};
use guildnet_core::error::GuildError;
use guildnet_core::records::{DispatchTask, Priority};
use guildnet_core::types::{AgentId, TaskId};
use guildnet_state::{KeyedLocks, StateDb};

#[derive(Clone)]
pub struct DispatchQueue {
    db: Arc<StateDb>,
    locks: KeyedLocks,
    clock: Arc<dyn Clock>,
}

impl DispatchQueue {
    pub fn new(db: Arc<StateDb>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            locks: KeyedLocks::new(),
            clock,
        }
    }

    /// Enqueue a task for `agent` with the given priority and TTL. Returns
    /// the assigned task id.
    pub fn enqueue(
        &self,
        agent: &AgentId,
        payload: serde_json::Value,
        priority: Priority,
        ttl_secs: i64,
    ) -> Result<TaskId, GuildError> {
        let lock = self.locks.lock_for(agent.as_bytes());
        let _guard = lock.lock().unwrap();

        let now = self.clock.now();
        let task_id = TaskId::from_bytes(rand::random());
        let task = DispatchTask {
            task_id,
            agent_id: *agent,
            payload,
            priority,
            created_at: now,
            expires_at: now + ttl_secs,
            acknowledged_at: None,
        };
        self.db.put_dispatch_task(&task)?;
        debug!(agent = %agent, task = %task_id, "task enqueued");
        Ok(task_id)
    }

    /// Return up to `limit` pending tasks for `agent` in queue order, plus a
    /// flag for whether more remain. Rows stay queued until acknowledged;
    /// expired rows are skipped and dropped.
    pub fn poll(
        &self,
        agent: &AgentId,
        limit: usize,
    ) -> Result<(Vec<DispatchTask>, bool), GuildError> {
        let lock = self.locks.lock_for(agent.as_bytes());
        let _guard = lock.lock().unwrap();

        let now = self.clock.now();
        self.db.put_heartbeat(agent, now)?;

        let limit = limit.min(MAX_POLL_LIMIT);
        let mut tasks = Vec::with_capacity(limit);
        let mut has_more = false;

        for task in self.db.iter_dispatch_for_agent(agent)? {
            if task.is_expired(now) {
                // Lazy cleanup: expired rows will never be delivered.
                self.db.remove_dispatch_task(&task)?;
                continue;
            }
            if task.acknowledged_at.is_some() {
                continue;
            }
            if tasks.len() == limit {
                has_more = true;
                break;
            }
            tasks.push(task);
        }

        Ok((tasks, has_more))
    }

    /// Mark tasks acknowledged. Unknown ids and already-acknowledged rows are
    /// ignored, so retries are safe.
    pub fn ack(&self, agent: &AgentId, task_ids: &[TaskId]) -> Result<(), GuildError> {
        let lock = self.locks.lock_for(agent.as_bytes());
        let _guard = lock.lock().unwrap();

        let now = self.clock.now();
        for mut task in self.db.iter_dispatch_for_agent(agent)? {
            if task_ids.contains(&task.task_id) && task.acknowledged_at.is_none() {
                task.acknowledged_at = Some(now);
                self.db.put_dispatch_task(&task)?;
            }
        }
        Ok(())
    }

    /// Record a liveness ping without polling.
    pub fn heartbeat(&self, agent: &AgentId) -> Result<(), GuildError> {
        self.db.put_heartbeat(agent, self.clock.now())
    }

    /// Alive iff the agent polled or pinged within the liveness window.
    pub fn is_alive(&self, agent: &AgentId) -> Result<bool, GuildError> {
        let now = self.clock.now();
        Ok(match self.db.get_heartbeat(agent)? {
            Some(last_poll) => now - last_poll < LIVENESS_WINDOW_SECS,
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildnet_core::clock::ManualClock;

    fn queue(name: &str) -> (DispatchQueue, Arc<ManualClock>) {
        let dir = std::env::temp_dir().join(format!("guildnet_dispatch_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        let db = Arc::new(StateDb::open(&dir).expect("open temp db"));
        let clock = Arc::new(ManualClock::new(1_000));
        (DispatchQueue::new(db, clock.clone()), clock)
    }

    fn agent(tag: u8) -> AgentId {
        AgentId::from_bytes([tag; 32])
    }

    #[test]
    fn poll_returns_priority_order_and_fifo_within_class() {
        let (q, clock) = queue("order");
        let a = agent(1);
        q.enqueue(&a, serde_json::json!({"n": 1}), Priority::Low, 600).unwrap();
        clock.advance(1);
        q.enqueue(&a, serde_json::json!({"n": 2}), Priority::High, 600).unwrap();
        clock.advance(1);
        q.enqueue(&a, serde_json::json!({"n": 3}), Priority::High, 600).unwrap();
        clock.advance(1);
        q.enqueue(&a, serde_json::json!({"n": 4}), Priority::Normal, 600).unwrap();

        let (tasks, has_more) = q.poll(&a, 10).unwrap();
        assert!(!has_more);
        let ns: Vec<i64> = tasks.iter().map(|t| t.payload["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3, 4, 1]);
    }

    #[test]
    fn poll_is_non_destructive_until_ack() {
        let (q, _clock) = queue("nondestructive");
        let a = agent(1);
        let id = q.enqueue(&a, serde_json::json!({}), Priority::Normal, 600).unwrap();

        let (first, _) = q.poll(&a, 10).unwrap();
        assert_eq!(first.len(), 1);
        let (second, _) = q.poll(&a, 10).unwrap();
        assert_eq!(second.len(), 1, "unacked task re-delivered");

        q.ack(&a, &[id]).unwrap();
        let (third, _) = q.poll(&a, 10).unwrap();
        assert!(third.is_empty());
    }

    #[test]
    fn ack_is_idempotent() {
        let (q, _clock) = queue("ack_idem");
        let a = agent(1);
        let id = q.enqueue(&a, serde_json::json!({}), Priority::Normal, 600).unwrap();
        q.ack(&a, &[id]).unwrap();
        q.ack(&a, &[id]).unwrap();
        q.ack(&a, &[TaskId::from_bytes([0xFF; 32])]).unwrap();
    }

    #[test]
    fn expired_tasks_are_skipped() {
        let (q, clock) = queue("expiry");
        let a = agent(1);
        q.enqueue(&a, serde_json::json!({"n": 1}), Priority::Normal, 10).unwrap();
        clock.advance(11);
        let (tasks, _) = q.poll(&a, 10).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn poll_limit_and_has_more() {
        let (q, clock) = queue("limit");
        let a = agent(1);
        for n in 0..5 {
            q.enqueue(&a, serde_json::json!({"n": n}), Priority::Normal, 600).unwrap();
            clock.advance(1);
        }
        let (tasks, has_more) = q.poll(&a, 3).unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(has_more);
    }

    #[test]
    fn liveness_window() {
        let (q, clock) = queue("liveness");
        let a = agent(1);
        assert!(!q.is_alive(&a).unwrap());

        q.heartbeat(&a).unwrap();
        assert!(q.is_alive(&a).unwrap());

        clock.advance(LIVENESS_WINDOW_SECS + 1);
        assert!(!q.is_alive(&a).unwrap());
    }

    #[test]
    fn queues_are_independent_across_agents() {
        let (q, _clock) = queue("independent");
        q.enqueue(&agent(1), serde_json::json!({}), Priority::Normal, 600).unwrap();
        let (tasks, _) = q.poll(&agent(2), 10).unwrap();
        assert!(tasks.is_empty());
    }
}
