//! # Playbook Engine
//!
//! Automated response playbooks: ordered conditions (AND semantics) over
//! incoming threat events, and an ordered action sequence executed on
//! match. Playbooks are kept sorted by priority; only the
//! highest-priority matching playbook executes per event.
//!
//! Action failures are logged and counted but do not halt the sequence
//! unless the action is marked fatal.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::threat::{ResponseAction, ThreatEvent, ThreatLevel, ThreatType};
use crate::{HiveError, Result};

/// Playbook table capacity.
pub const MAX_PLAYBOOKS: usize = 32;

/// A match condition; all conditions of a playbook must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybookCondition {
    /// Threat level at or above.
    LevelGte(ThreatLevel),
    /// Exact threat type.
    TypeEq(ThreatType),
    /// Signature (or source file) contains the pattern.
    SignatureContains(String),
    /// Correlated affected-agent count at or above.
    AgentCountGte(usize),
    /// Event timestamp within [start, end] seconds-of-day.
    WithinTimeRange { start_sec: u32, end_sec: u32 },
}

impl PlaybookCondition {
    fn matches(&self, event: &ThreatEvent, affected_agents: usize) -> bool {
        match self {
            PlaybookCondition::LevelGte(level) => event.level >= *level,
            PlaybookCondition::TypeEq(t) => event.threat_type == *t,
            PlaybookCondition::SignatureContains(pattern) => {
                event.signature.contains(pattern.as_str())
                    || event
                        .source_file
                        .as_deref()
                        .is_some_and(|f| f.contains(pattern.as_str()))
            }
            PlaybookCondition::AgentCountGte(n) => affected_agents >= *n,
            PlaybookCondition::WithinTimeRange { start_sec, end_sec } => {
                let sec_of_day = (event.timestamp % 86_400) as u32;
                sec_of_day >= *start_sec && sec_of_day <= *end_sec
            }
        }
    }
}

/// One response step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookAction {
    pub action: ResponseAction,
    /// Seconds to wait before this step runs.
    pub delay_sec: u64,
    /// Free-form parameter blob for the executor.
    pub params: String,
    /// A failing fatal action aborts the remaining sequence.
    pub fatal: bool,
}

impl PlaybookAction {
    pub fn new(action: ResponseAction) -> Self {
        Self {
            action,
            delay_sec: 0,
            params: String::new(),
            fatal: false,
        }
    }

    pub fn with_delay(mut self, delay_sec: u64) -> Self {
        self.delay_sec = delay_sec;
        self
    }

    pub fn with_params(mut self, params: &str) -> Self {
        self.params = params.to_string();
        self
    }
}

/// A named response playbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    /// Lower value runs first.
    pub priority: u32,
    pub conditions: Vec<PlaybookCondition>,
    pub actions: Vec<PlaybookAction>,
    pub executions: u64,
    pub last_execution: u64,
}

impl Playbook {
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            enabled: true,
            priority,
            conditions: Vec::new(),
            actions: Vec::new(),
            executions: 0,
            last_execution: 0,
        }
    }

    fn matches(&self, event: &ThreatEvent, affected_agents: usize) -> bool {
        self.enabled
            && self
                .conditions
                .iter()
                .all(|c| c.matches(event, affected_agents))
    }
}

/// Executes playbook actions. The default implementation logs; a real
/// deployment wires this to the fleet command channel.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, action: &PlaybookAction, event: &ThreatEvent) -> Result<()>;
}

/// Log-only executor.
pub struct TracingExecutor;

impl ActionExecutor for TracingExecutor {
    fn execute(&self, action: &PlaybookAction, event: &ThreatEvent) -> Result<()> {
        tracing::info!(
            action = ?action.action,
            params = %action.params,
            event = event.event_id,
            "playbook action executed"
        );
        Ok(())
    }
}

/// The playbook engine.
pub struct PlaybookEngine {
    playbooks: Mutex<Vec<Playbook>>,
    executor: Box<dyn ActionExecutor>,
    /// Disabled in tests so delayed actions run immediately.
    delays_enabled: bool,
    pub actions_failed: Mutex<u64>,
}

impl PlaybookEngine {
    pub fn new(executor: Box<dyn ActionExecutor>) -> Self {
        Self {
            playbooks: Mutex::new(Vec::new()),
            executor,
            delays_enabled: true,
            actions_failed: Mutex::new(0),
        }
    }

    /// Engine with the log-only executor and the built-in playbooks.
    pub fn with_defaults() -> Self {
        let engine = Self::new(Box::new(TracingExecutor));
        for pb in default_playbooks() {
            engine.add(pb).expect("defaults fit");
        }
        engine
    }

    /// Disable inter-action delays (test harness).
    pub fn without_delays(mut self) -> Self {
        self.delays_enabled = false;
        self
    }

    /// Register a playbook, keeping the table sorted by ascending
    /// priority (FIFO within equal priority).
    pub fn add(&self, playbook: Playbook) -> Result<()> {
        let mut playbooks = self.playbooks.lock().expect("playbook lock");
        if playbooks.len() >= MAX_PLAYBOOKS {
            return Err(HiveError::Exhausted("playbook table".into()));
        }
        if playbooks.iter().any(|p| p.name == playbook.name) {
            return Err(HiveError::Exists(format!("playbook '{}'", playbook.name)));
        }
        let pos = playbooks
            .iter()
            .position(|p| p.priority > playbook.priority)
            .unwrap_or(playbooks.len());
        playbooks.insert(pos, playbook);
        Ok(())
    }

    /// Handle one threat event: the highest-priority matching playbook
    /// executes its actions in order. Returns the name of the executed
    /// playbook, if any.
    ///
    /// `affected_agents` carries correlation context; plain events pass 1.
    pub fn handle_event(&self, event: &ThreatEvent, affected_agents: usize) -> Option<String> {
        // Pick the winner under the lock, run actions outside it.
        let (name, actions) = {
            let mut playbooks = self.playbooks.lock().expect("playbook lock");
            let pb = playbooks
                .iter_mut()
                .find(|p| p.matches(event, affected_agents))?;
            pb.executions += 1;
            pb.last_execution = crate::hive::now_secs();
            (pb.name.clone(), pb.actions.clone())
        };

        tracing::info!(playbook = %name, event = event.event_id, "playbook matched");
        for action in &actions {
            if self.delays_enabled && action.delay_sec > 0 {
                std::thread::sleep(Duration::from_secs(action.delay_sec));
            }
            if let Err(err) = self.executor.execute(action, event) {
                *self.actions_failed.lock().expect("counter") += 1;
                tracing::warn!(playbook = %name, ?err, "playbook action failed");
                if action.fatal {
                    break;
                }
            }
        }
        Some(name)
    }

    /// Copies of the registered playbooks in execution order.
    pub fn playbooks(&self) -> Vec<Playbook> {
        self.playbooks.lock().expect("playbook lock").clone()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut playbooks = self.playbooks.lock().expect("playbook lock");
        match playbooks.iter_mut().find(|p| p.name == name) {
            Some(pb) => {
                pb.enabled = enabled;
                Ok(())
            }
            None => Err(HiveError::NotFound(format!("playbook '{name}'"))),
        }
    }
}

/// The built-in response playbooks.
pub fn default_playbooks() -> Vec<Playbook> {
    let mut critical = Playbook::new("Critical Threat Response", 1);
    critical.description = "Auto-isolate on critical threats".into();
    critical
        .conditions
        .push(PlaybookCondition::LevelGte(ThreatLevel::Critical));
    critical.actions.push(PlaybookAction::new(ResponseAction::Alert));
    critical
        .actions
        .push(PlaybookAction::new(ResponseAction::Isolate).with_delay(5));

    let mut reverse_shell = Playbook::new("Reverse Shell Detection", 2);
    reverse_shell.description = "Block and alert on reverse shell patterns".into();
    reverse_shell
        .conditions
        .push(PlaybookCondition::SignatureContains("4444".into()));
    reverse_shell
        .actions
        .push(PlaybookAction::new(ResponseAction::Block));
    reverse_shell.actions.push(
        PlaybookAction::new(ResponseAction::Alert).with_params("FORENSIC_SNAPSHOT"),
    );

    let mut creds = Playbook::new("Credential Access", 3);
    creds.description = "Alert on sensitive file access".into();
    creds
        .conditions
        .push(PlaybookCondition::SignatureContains("shadow".into()));
    creds
        .conditions
        .push(PlaybookCondition::SignatureContains("ssh".into()));
    creds.actions.push(PlaybookAction::new(ResponseAction::Alert));

    let mut lateral = Playbook::new("Lateral Movement Response", 1);
    lateral.description = "Isolate hosts in a lateral movement chain".into();
    lateral.conditions.push(PlaybookCondition::AgentCountGte(3));
    lateral.actions.push(
        PlaybookAction::new(ResponseAction::Isolate).with_params("ALL_AFFECTED_HOSTS"),
    );

    vec![critical, reverse_shell, creds, lateral]
}
