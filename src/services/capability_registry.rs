//! Capability registry: agent advertisements, routing queries, role-task
//! dispatch, and contract-net auctions.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::domain::models::{
    AgentCapabilityAdvertisement, ExecuteRoleTask, SwarmRole,
};
use crate::services::blackboard::{keys, BlackboardStore, BoardScope};
use crate::services::ui_stream::UiEventStream;

/// A bid submitted in response to a call for proposals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractNetBid {
    pub agent_id: String,
    pub estimated_cost: u64,
    pub estimated_time_ms: u64,
}

/// The award announcement sent to the winning bidder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractNetAward {
    pub task_id: String,
    pub role: SwarmRole,
    pub agent_id: String,
}

/// Messages delivered to a registered agent's mailbox.
#[derive(Debug)]
pub enum AgentMessage {
    /// Execute a role task on behalf of the swarm.
    ExecuteRole(ExecuteRoleTask),
    /// Solicit a bid for a task; reply on the provided channel.
    BidRequest {
        task_id: String,
        role: SwarmRole,
        description: String,
        reply: mpsc::Sender<ContractNetBid>,
    },
    /// Contract-net award for a previously solicited bid.
    Award(ContractNetAward),
    /// Opaque peer-to-peer payload forwarded through the dispatcher.
    Peer { payload: String },
}

/// Outcome of a role-task dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleTaskOutcome {
    Dispatched { agent_id: String },
    Failed { reason: String },
}

/// A resolved peer agent.
pub struct PeerResolution {
    pub agent_id: String,
    pub endpoint: String,
    pub sender: mpsc::Sender<AgentMessage>,
}

struct AgentEntry {
    advertisement: AgentCapabilityAdvertisement,
    sender: mpsc::Sender<AgentMessage>,
    last_heartbeat: DateTime<Utc>,
    consecutive_failures: u32,
}

/// Maps agent identifiers to capabilities, load, provider, budget and health.
pub struct CapabilityRegistry {
    agents: RwLock<HashMap<String, AgentEntry>>,
    blackboard: Arc<BlackboardStore>,
    ui: Arc<UiEventStream>,
    heartbeat_interval: Duration,
}

impl CapabilityRegistry {
    pub fn new(
        blackboard: Arc<BlackboardStore>,
        ui: Arc<UiEventStream>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            blackboard,
            ui,
            heartbeat_interval,
        }
    }

    /// Insert or refresh an advertisement, resetting the heartbeat stamp.
    pub async fn advertise(
        &self,
        advertisement: AgentCapabilityAdvertisement,
        sender: mpsc::Sender<AgentMessage>,
    ) {
        let agent_id = advertisement.agent_id.clone();
        let mut agents = self.agents.write().await;
        let is_new = !agents.contains_key(&agent_id);
        agents.insert(
            agent_id.clone(),
            AgentEntry {
                advertisement,
                sender,
                last_heartbeat: Utc::now(),
                consecutive_failures: 0,
            },
        );
        drop(agents);

        if is_new {
            self.blackboard
                .set(BoardScope::Global, keys::agent_joined(&agent_id), "1")
                .await;
            info!(agent_id = %agent_id, "Agent advertised capabilities");
        }
    }

    /// Refresh an agent's heartbeat timestamp.
    pub async fn heartbeat(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.write().await;
        match agents.get_mut(agent_id) {
            Some(entry) => {
                entry.last_heartbeat = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Record an explicit success: resets the consecutive-failure counter.
    pub async fn record_success(&self, agent_id: &str) {
        let mut agents = self.agents.write().await;
        if let Some(entry) = agents.get_mut(agent_id) {
            entry.consecutive_failures = 0;
            entry.last_heartbeat = Utc::now();
        }
    }

    pub async fn record_failure(&self, agent_id: &str) {
        let mut agents = self.agents.write().await;
        if let Some(entry) = agents.get_mut(agent_id) {
            entry.consecutive_failures += 1;
        }
    }

    /// Add used tokens to an agent's budget accounting.
    pub async fn record_usage(&self, agent_id: &str, tokens: u64) {
        let mut agents = self.agents.write().await;
        if let Some(entry) = agents.get_mut(agent_id) {
            let used = entry.advertisement.budget.used_tokens.unwrap_or(0);
            entry.advertisement.budget.used_tokens = Some(used + tokens);
        }
    }

    /// Deregister agents whose last heartbeat exceeds 3x the interval.
    pub async fn prune_stale(&self) -> Vec<String> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(self.heartbeat_interval * 3)
                .unwrap_or_else(|_| ChronoDuration::seconds(90));
        let mut agents = self.agents.write().await;
        let stale: Vec<String> = agents
            .iter()
            .filter(|(_, e)| e.last_heartbeat < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for agent_id in &stale {
            agents.remove(agent_id);
        }
        drop(agents);

        for agent_id in &stale {
            warn!(agent_id = %agent_id, "Pruning agent: heartbeat expired");
            self.blackboard
                .set(BoardScope::Global, keys::agent_left(agent_id), "1")
                .await;
        }
        stale
    }

    async fn circuit_open(&self, adapter_id: &str) -> bool {
        self.blackboard
            .get(&BoardScope::Global, &keys::adapter_circuit(adapter_id))
            .await
            .as_deref()
            == Some("open")
    }

    /// Enumerate agents by capability. `preference="cheapest"` orders by
    /// provider type (subscription < api), then load.
    pub async fn query(
        &self,
        capability: Option<SwarmRole>,
        preference: Option<&str>,
    ) -> Vec<AgentCapabilityAdvertisement> {
        let agents = self.agents.read().await;
        let mut matches: Vec<AgentCapabilityAdvertisement> = agents
            .values()
            .filter(|e| capability.is_none_or(|role| e.advertisement.can_perform(role)))
            .map(|e| e.advertisement.clone())
            .collect();
        drop(agents);

        match preference {
            Some("cheapest") => {
                matches.sort_by_key(|a| {
                    (a.provider.provider_type.cost_rank(), a.current_load, a.agent_id.clone())
                });
            }
            _ => {
                matches.sort_by_key(|a| (a.current_load, a.agent_id.clone()));
            }
        }
        matches
    }

    /// Select the best eligible agent for a role and forward the task.
    ///
    /// Eligibility: capability present, budget not exhausted, adapter circuit
    /// not open. Healthy-budget candidates are preferred over low-budget
    /// ones; within a tier, lowest load wins.
    pub async fn execute_role_task(
        &self,
        role: SwarmRole,
        task: ExecuteRoleTask,
    ) -> RoleTaskOutcome {
        let agents = self.agents.read().await;
        let mut candidates: Vec<(&String, &AgentEntry)> = agents
            .iter()
            .filter(|(_, e)| e.advertisement.can_perform(role))
            .collect();

        if candidates.is_empty() {
            return RoleTaskOutcome::Failed {
                reason: format!("no agent advertises capability {role}"),
            };
        }

        // Budget filter first: exhausted agents are never selectable.
        candidates.retain(|(_, e)| !e.advertisement.budget.is_exhausted());
        if candidates.is_empty() {
            return RoleTaskOutcome::Failed {
                reason: "budget exhausted".to_string(),
            };
        }

        let mut eligible: Vec<(String, bool, u32, mpsc::Sender<AgentMessage>)> = Vec::new();
        for (agent_id, entry) in candidates {
            if self.circuit_open(&entry.advertisement.provider.adapter).await {
                debug!(agent_id = %agent_id, "Skipping agent: adapter circuit open");
                continue;
            }
            eligible.push((
                agent_id.clone(),
                entry.advertisement.budget.is_low(),
                entry.advertisement.current_load,
                entry.sender.clone(),
            ));
        }
        drop(agents);

        if eligible.is_empty() {
            return RoleTaskOutcome::Failed {
                reason: "no eligible agent: circuits open".to_string(),
            };
        }

        // Healthy budget beats low budget; then lowest load; then stable id.
        eligible.sort_by_key(|(id, low, load, _)| (*low, *load, id.clone()));
        let (agent_id, _, _, sender) = eligible.remove(0);

        if sender.send(AgentMessage::ExecuteRole(task)).await.is_err() {
            self.record_failure(&agent_id).await;
            return RoleTaskOutcome::Failed {
                reason: format!("agent {agent_id} mailbox closed"),
            };
        }
        RoleTaskOutcome::Dispatched { agent_id }
    }

    /// Resolve a peer agent for message forwarding.
    pub async fn resolve_peer(&self, agent_id: &str) -> Option<PeerResolution> {
        let agents = self.agents.read().await;
        agents.get(agent_id).map(|e| PeerResolution {
            agent_id: agent_id.to_string(),
            endpoint: e.advertisement.endpoint.clone(),
            sender: e.sender.clone(),
        })
    }

    /// Contract-Net auction: broadcast a bid request to every capable agent,
    /// collect bids until the window elapses or every solicited agent has
    /// replied, then award the lowest estimated cost (ties: lowest estimated
    /// time, then earliest arrival).
    pub async fn call_for_proposals(
        &self,
        task_id: &str,
        role: SwarmRole,
        description: &str,
        window: Duration,
    ) -> Option<ContractNetAward> {
        let agents = self.agents.read().await;
        let solicited: Vec<mpsc::Sender<AgentMessage>> = agents
            .values()
            .filter(|e| e.advertisement.can_perform(role))
            .map(|e| e.sender.clone())
            .collect();
        drop(agents);

        if solicited.is_empty() {
            return None;
        }

        let (bid_tx, mut bid_rx) = mpsc::channel(solicited.len().max(1));
        let mut reached = 0usize;
        for sender in &solicited {
            let request = AgentMessage::BidRequest {
                task_id: task_id.to_string(),
                role,
                description: description.to_string(),
                reply: bid_tx.clone(),
            };
            if sender.send(request).await.is_ok() {
                reached += 1;
            }
        }
        drop(bid_tx);

        let mut bids: Vec<ContractNetBid> = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while bids.len() < reached {
            match tokio::time::timeout_at(deadline, bid_rx.recv()).await {
                Ok(Some(bid)) => bids.push(bid),
                Ok(None) | Err(_) => break,
            }
        }

        if bids.is_empty() {
            return None;
        }

        // Arrival order is the vector order; a stable sort keeps it as the
        // final tie-break.
        let mut indexed: Vec<(usize, ContractNetBid)> = bids.into_iter().enumerate().collect();
        indexed.sort_by_key(|(arrival, bid)| (bid.estimated_cost, bid.estimated_time_ms, *arrival));
        let winner = indexed.remove(0).1;

        let award = ContractNetAward {
            task_id: task_id.to_string(),
            role,
            agent_id: winner.agent_id.clone(),
        };

        if let Some(peer) = self.resolve_peer(&winner.agent_id).await {
            let _ = peer.sender.send(AgentMessage::Award(award.clone())).await;
        }
        self.ui.publish(
            "contract_net.award",
            format!(
                "task={task_id} role={role} winner={} cost={}",
                award.agent_id, winner.estimated_cost
            ),
        );
        Some(award)
    }

    pub async fn len(&self) -> usize {
        let agents = self.agents.read().await;
        agents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentBudget, ProviderType};

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new(
            Arc::new(BlackboardStore::new()),
            Arc::new(UiEventStream::new(16)),
            Duration::from_secs(30),
        )
    }

    fn builder_agent(id: &str, budget: AgentBudget) -> AgentCapabilityAdvertisement {
        AgentCapabilityAdvertisement::new(id, format!("http://{id}"))
            .with_capability(SwarmRole::Builder)
            .with_budget(budget)
    }

    fn role_task() -> ExecuteRoleTask {
        ExecuteRoleTask::new("t1", SwarmRole::Builder, "Smoke", "Verify")
    }

    #[tokio::test]
    async fn test_budget_exhausted_agent_skipped() {
        let registry = registry();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry
            .advertise(builder_agent("exhausted", AgentBudget::with_tokens(100, 100)), tx_a)
            .await;
        registry
            .advertise(builder_agent("healthy", AgentBudget::with_tokens(100, 20)), tx_b)
            .await;

        let outcome = registry.execute_role_task(SwarmRole::Builder, role_task()).await;
        assert_eq!(
            outcome,
            RoleTaskOutcome::Dispatched {
                agent_id: "healthy".to_string()
            }
        );
        assert!(matches!(
            rx_b.try_recv(),
            Ok(AgentMessage::ExecuteRole(_))
        ));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_all_exhausted_reports_budget() {
        let registry = registry();
        let (tx, _rx) = mpsc::channel(4);
        registry
            .advertise(builder_agent("a", AgentBudget::with_tokens(10, 10)), tx)
            .await;
        let outcome = registry.execute_role_task(SwarmRole::Builder, role_task()).await;
        assert_eq!(
            outcome,
            RoleTaskOutcome::Failed {
                reason: "budget exhausted".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_low_budget_only_when_no_healthy() {
        let registry = registry();
        let (tx_low, mut rx_low) = mpsc::channel(4);
        registry
            .advertise(
                builder_agent("low", AgentBudget::with_tokens(100, 90)),
                tx_low,
            )
            .await;

        let outcome = registry.execute_role_task(SwarmRole::Builder, role_task()).await;
        assert_eq!(
            outcome,
            RoleTaskOutcome::Dispatched {
                agent_id: "low".to_string()
            }
        );
        assert!(rx_low.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_circuit_open_excludes_agent() {
        let blackboard = Arc::new(BlackboardStore::new());
        let registry = CapabilityRegistry::new(
            blackboard.clone(),
            Arc::new(UiEventStream::new(16)),
            Duration::from_secs(30),
        );
        let (tx, _rx) = mpsc::channel(4);
        registry
            .advertise(
                builder_agent("a", AgentBudget::default())
                    .with_provider("flaky-cli", ProviderType::Subscription),
                tx,
            )
            .await;

        blackboard
            .set(BoardScope::Global, keys::adapter_circuit("flaky-cli"), "open")
            .await;

        let outcome = registry.execute_role_task(SwarmRole::Builder, role_task()).await;
        assert!(matches!(outcome, RoleTaskOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_cheapest_preference_orders_subscription_first() {
        let registry = registry();
        let (tx, _rx) = mpsc::channel(4);
        registry
            .advertise(
                builder_agent("api-agent", AgentBudget::default())
                    .with_provider("api-cli", ProviderType::Api),
                tx.clone(),
            )
            .await;
        registry
            .advertise(
                builder_agent("sub-agent", AgentBudget::default())
                    .with_provider("sub-cli", ProviderType::Subscription),
                tx,
            )
            .await;

        let ordered = registry.query(Some(SwarmRole::Builder), Some("cheapest")).await;
        assert_eq!(ordered[0].agent_id, "sub-agent");
        assert_eq!(ordered[1].agent_id, "api-agent");
    }

    #[tokio::test]
    async fn test_contract_net_awards_lowest_cost() {
        let registry = Arc::new(registry());
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry
            .advertise(builder_agent("bidder-1", AgentBudget::default()), tx_a)
            .await;
        registry
            .advertise(builder_agent("bidder-2", AgentBudget::default()), tx_b)
            .await;

        // Bidder tasks answer their bid requests
        tokio::spawn(async move {
            if let Some(AgentMessage::BidRequest { reply, .. }) = rx_a.recv().await {
                let _ = reply
                    .send(ContractNetBid {
                        agent_id: "bidder-1".to_string(),
                        estimated_cost: 1,
                        estimated_time_ms: 100,
                    })
                    .await;
            }
            // Keep the mailbox open for the award
            let _ = rx_a.recv().await;
        });
        tokio::spawn(async move {
            if let Some(AgentMessage::BidRequest { reply, .. }) = rx_b.recv().await {
                let _ = reply
                    .send(ContractNetBid {
                        agent_id: "bidder-2".to_string(),
                        estimated_cost: 3,
                        estimated_time_ms: 500,
                    })
                    .await;
            }
        });

        let started = std::time::Instant::now();
        let award = registry
            .call_for_proposals("task-cnp", SwarmRole::Builder, "build it", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(award.agent_id, "bidder-1");
        // All solicited agents bid, so the award lands before the window elapses
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_contract_net_tie_breaks_on_time() {
        let registry = Arc::new(registry());
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry
            .advertise(builder_agent("slow", AgentBudget::default()), tx_a)
            .await;
        registry
            .advertise(builder_agent("fast", AgentBudget::default()), tx_b)
            .await;

        tokio::spawn(async move {
            if let Some(AgentMessage::BidRequest { reply, .. }) = rx_a.recv().await {
                let _ = reply
                    .send(ContractNetBid {
                        agent_id: "slow".to_string(),
                        estimated_cost: 2,
                        estimated_time_ms: 900,
                    })
                    .await;
            }
        });
        tokio::spawn(async move {
            if let Some(AgentMessage::BidRequest { reply, .. }) = rx_b.recv().await {
                let _ = reply
                    .send(ContractNetBid {
                        agent_id: "fast".to_string(),
                        estimated_cost: 2,
                        estimated_time_ms: 100,
                    })
                    .await;
            }
            let _ = rx_b.recv().await;
        });

        let award = registry
            .call_for_proposals("t", SwarmRole::Builder, "d", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(award.agent_id, "fast");
    }

    #[tokio::test]
    async fn test_heartbeat_and_prune() {
        let registry = CapabilityRegistry::new(
            Arc::new(BlackboardStore::new()),
            Arc::new(UiEventStream::new(16)),
            Duration::from_millis(1),
        );
        let (tx, _rx) = mpsc::channel(4);
        registry
            .advertise(builder_agent("a", AgentBudget::default()), tx)
            .await;
        assert!(registry.heartbeat("a").await);
        assert!(!registry.heartbeat("ghost").await);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let pruned = registry.prune_stale().await;
        assert_eq!(pruned, vec!["a".to_string()]);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_resolve_peer() {
        let registry = registry();
        let (tx, _rx) = mpsc::channel(4);
        registry
            .advertise(builder_agent("peer-1", AgentBudget::default()), tx)
            .await;
        let resolved = registry.resolve_peer("peer-1").await.unwrap();
        assert_eq!(resolved.endpoint, "http://peer-1");
        assert!(registry.resolve_peer("nope").await.is_none());
    }
}
