//! Agent capability domain models.
//!
//! Agents advertise the roles they can perform, the provider that backs them,
//! and their token budget. The capability registry answers routing queries
//! over these advertisements.

use serde::{Deserialize, Serialize};

/// A named functional capability an agent can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmRole {
    Orchestrator,
    Planner,
    Builder,
    Reviewer,
    Researcher,
    Debugger,
    Tester,
}

impl SwarmRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::Planner => "planner",
            Self::Builder => "builder",
            Self::Reviewer => "reviewer",
            Self::Researcher => "researcher",
            Self::Debugger => "debugger",
            Self::Tester => "tester",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "orchestrator" => Some(Self::Orchestrator),
            "planner" => Some(Self::Planner),
            "builder" => Some(Self::Builder),
            "reviewer" => Some(Self::Reviewer),
            "researcher" => Some(Self::Researcher),
            "debugger" => Some(Self::Debugger),
            "tester" => Some(Self::Tester),
            _ => None,
        }
    }

    /// Review roles run on the reviewer pool; everything else on workers.
    pub fn is_review(&self) -> bool {
        matches!(self, Self::Reviewer)
    }
}

impl std::fmt::Display for SwarmRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Isolation level the agent executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxLevel {
    /// Raw CLI invocation, no isolation.
    BareCli,
    /// Wrapped in the OS native sandbox tool.
    OsSandboxed,
    /// Wrapped in a container runtime.
    Container,
}

impl Default for SandboxLevel {
    fn default() -> Self {
        Self::BareCli
    }
}

/// How the agent's execution capability is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Api,
    Subscription,
    Internal,
}

impl ProviderType {
    /// Ordering used by the "cheapest" routing preference:
    /// subscription < api < internal.
    pub fn cost_rank(&self) -> u8 {
        match self {
            Self::Subscription => 0,
            Self::Api => 1,
            Self::Internal => 2,
        }
    }
}

/// The adapter backing an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub adapter: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
}

/// Token budget attached to an agent advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBudget {
    #[serde(rename = "type")]
    pub budget_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_tokens: Option<u64>,
    /// Ratio at which the agent is considered low-budget.
    pub warning_threshold: f64,
    /// Ratio at which the agent is considered exhausted.
    pub hard_limit: f64,
}

impl Default for AgentBudget {
    fn default() -> Self {
        Self {
            budget_type: "tokens".to_string(),
            total_tokens: None,
            used_tokens: None,
            warning_threshold: 0.8,
            hard_limit: 1.0,
        }
    }
}

impl AgentBudget {
    pub fn with_tokens(total: u64, used: u64) -> Self {
        Self {
            total_tokens: Some(total),
            used_tokens: Some(used),
            ..Default::default()
        }
    }

    /// used/total ratio; None when the budget is unmetered.
    pub fn usage_ratio(&self) -> Option<f64> {
        match (self.used_tokens, self.total_tokens) {
            (Some(used), Some(total)) if total > 0 => Some(used as f64 / total as f64),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_ratio().is_some_and(|r| r >= self.hard_limit)
    }

    pub fn is_low(&self) -> bool {
        !self.is_exhausted() && self.usage_ratio().is_some_and(|r| r >= self.warning_threshold)
    }
}

/// An agent's capability advertisement, as registered with the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapabilityAdvertisement {
    pub agent_id: String,
    pub endpoint: String,
    pub capabilities: Vec<SwarmRole>,
    pub current_load: u32,
    #[serde(default)]
    pub sandbox_level: SandboxLevel,
    pub provider: ProviderInfo,
    #[serde(default)]
    pub budget: AgentBudget,
    /// When > 0, the agent self-terminates after this idle window.
    #[serde(default)]
    pub idle_ttl_seconds: u64,
}

impl AgentCapabilityAdvertisement {
    pub fn new(agent_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            endpoint: endpoint.into(),
            capabilities: Vec::new(),
            current_load: 0,
            sandbox_level: SandboxLevel::default(),
            provider: ProviderInfo {
                adapter: "local-echo".to_string(),
                provider_type: ProviderType::Internal,
            },
            budget: AgentBudget::default(),
            idle_ttl_seconds: 0,
        }
    }

    pub fn with_capability(mut self, role: SwarmRole) -> Self {
        if !self.capabilities.contains(&role) {
            self.capabilities.push(role);
        }
        self
    }

    pub fn with_provider(mut self, adapter: impl Into<String>, provider_type: ProviderType) -> Self {
        self.provider = ProviderInfo {
            adapter: adapter.into(),
            provider_type,
        };
        self
    }

    pub fn with_budget(mut self, budget: AgentBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_load(mut self, load: u32) -> Self {
        self.current_load = load;
        self
    }

    pub fn can_perform(&self, role: SwarmRole) -> bool {
        self.capabilities.contains(&role)
    }
}

/// Discoverable agent card, served at `/.well-known/agent-card.json`.
/// The HTTP surface is external; the document shape lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub agent_id: String,
    pub name: String,
    pub version: String,
    pub protocol: String,
    pub capabilities: Vec<SwarmRole>,
    pub provider: ProviderInfo,
    pub sandbox_level: SandboxLevel,
    pub endpoint_url: String,
}

impl AgentCard {
    pub fn from_advertisement(adv: &AgentCapabilityAdvertisement, name: impl Into<String>) -> Self {
        Self {
            agent_id: adv.agent_id.clone(),
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol: "a2a".to_string(),
            capabilities: adv.capabilities.clone(),
            provider: adv.provider.clone(),
            sandbox_level: adv.sandbox_level,
            endpoint_url: adv.endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_ratios() {
        let exhausted = AgentBudget::with_tokens(100, 100);
        assert!(exhausted.is_exhausted());
        assert!(!exhausted.is_low());

        let low = AgentBudget::with_tokens(100, 85);
        assert!(!low.is_exhausted());
        assert!(low.is_low());

        let healthy = AgentBudget::with_tokens(100, 20);
        assert!(!healthy.is_exhausted());
        assert!(!healthy.is_low());

        let unmetered = AgentBudget::default();
        assert!(!unmetered.is_exhausted());
        assert!(!unmetered.is_low());
    }

    #[test]
    fn test_cheapest_cost_rank() {
        assert!(ProviderType::Subscription.cost_rank() < ProviderType::Api.cost_rank());
        assert!(ProviderType::Api.cost_rank() < ProviderType::Internal.cost_rank());
    }

    #[test]
    fn test_agent_card_shape() {
        let adv = AgentCapabilityAdvertisement::new("agent-1", "http://localhost:7700")
            .with_capability(SwarmRole::Builder);
        let card = AgentCard::from_advertisement(&adv, "builder-agent");
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["agentId"], "agent-1");
        assert_eq!(json["protocol"], "a2a");
        assert_eq!(json["endpointUrl"], "http://localhost:7700");
        assert_eq!(json["capabilities"][0], "builder");
    }

    #[test]
    fn test_role_round_trip() {
        for role in [
            SwarmRole::Orchestrator,
            SwarmRole::Planner,
            SwarmRole::Builder,
            SwarmRole::Reviewer,
            SwarmRole::Researcher,
            SwarmRole::Debugger,
            SwarmRole::Tester,
        ] {
            assert_eq!(SwarmRole::from_str(role.as_str()), Some(role));
        }
    }
}
