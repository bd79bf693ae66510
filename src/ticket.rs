//! Build plan and ticket state machine.
//!
//! A plan owns an ordered collection of tickets with dependency edges.
//! Each ticket cycles through a fixed lifecycle; completion (and,
//! deliberately, skipping) cascades through dependents so one abandoned
//! ticket cannot stall the rest of the plan.
//!
//! `depends_on` is the single source of truth for prerequisites. The
//! serialized `blocked_by` set is a view recomputed after every
//! transition, never hand-mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

use crate::engine_err;
use crate::error::EngineError;

// =============================================================================
// TYPES
// =============================================================================

/// Ticket lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Planning,
    Backlog,
    AwaitingInput,
    Generating,
    Applying,
    Testing,
    PrReview,
    Done,
    Blocked,
    Failed,
    Skipped,
}

impl TicketStatus {
    /// Done and skipped both satisfy dependents.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, TicketStatus::Done | TicketStatus::Skipped)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Done | TicketStatus::Skipped)
    }

    /// States in which a build is actively running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TicketStatus::Generating
                | TicketStatus::Applying
                | TicketStatus::Testing
                | TicketStatus::PrReview
        )
    }
}

/// One discrete, independently buildable feature unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub description: String,
    pub ticket_type: String,
    pub priority: String,
    pub complexity: String,
    pub status: TicketStatus,
    /// Prerequisite ticket ids, resolved from titles at planning time.
    pub depends_on: Vec<String>,
    /// Derived view of currently unsatisfied prerequisites.
    pub blocked_by: Vec<String>,
    /// Backlog presentation and selection order.
    pub order: u32,
    pub retry_count: u32,
    pub progress: u8,
    pub actual_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub requires_input: bool,
    pub input_requests: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Build mode for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Auto,
    Manual,
}

/// The full ticket collection plus dependency graph for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPlan {
    pub tickets: Vec<Ticket>,
    pub build_mode: BuildMode,
    /// FIFO of backlog ticket ids awaiting explicit user-triggered build.
    pub manual_queue: VecDeque<String>,
    /// Planning-time diagnostics (e.g. dropped dependency titles).
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why one ticket is not currently buildable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StuckTicket {
    pub id: String,
    pub title: String,
    pub waiting_on: Vec<String>,
}

// =============================================================================
// PLAN OPERATIONS
// =============================================================================

impl BuildPlan {
    pub fn new(tickets: Vec<Ticket>, build_mode: BuildMode) -> Self {
        let now = Utc::now();
        let mut plan = Self {
            tickets,
            build_mode,
            manual_queue: VecDeque::new(),
            warnings: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        plan.recompute_blocked();
        plan
    }

    pub fn ticket(&self, id: &str) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    fn ticket_mut(&mut self, id: &str) -> Result<&mut Ticket, EngineError> {
        self.tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| engine_err!(TicketNotFound, "no ticket with id {}", id))
    }

    fn status_of(&self, id: &str) -> Option<TicketStatus> {
        self.ticket(id).map(|t| t.status)
    }

    /// Dependencies of `id` not yet done or skipped. Unknown ids (edges
    /// pruned after a delete) never block.
    fn unmet_dependencies(&self, id: &str) -> Vec<String> {
        let Some(ticket) = self.ticket(id) else {
            return Vec::new();
        };
        ticket
            .depends_on
            .iter()
            .filter(|dep| {
                self.status_of(dep)
                    .map(|s| !s.satisfies_dependents())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Recompute every ticket's `blocked_by` view and flip tickets
    /// between `backlog` and `blocked` as the view empties or fills.
    fn recompute_blocked(&mut self) {
        let ids: Vec<String> = self.tickets.iter().map(|t| t.id.clone()).collect();
        for id in ids {
            let unmet = self.unmet_dependencies(&id);
            let ticket = self.ticket_mut(&id).expect("id came from the plan");
            let was = ticket.status;
            ticket.blocked_by = unmet;
            match was {
                TicketStatus::Backlog if !ticket.blocked_by.is_empty() => {
                    ticket.status = TicketStatus::Blocked;
                }
                TicketStatus::Blocked if ticket.blocked_by.is_empty() => {
                    ticket.status = TicketStatus::Backlog;
                }
                _ => {}
            }
        }
        self.updated_at = Utc::now();
    }

    /// First backlog ticket (by `order`) whose every dependency is
    /// satisfied, or `None` — the caller must wait or surface a stuck
    /// plan. A linear re-scan; ticket counts are tens, not thousands.
    pub fn next_buildable(&self) -> Option<&Ticket> {
        let mut backlog: Vec<&Ticket> = self
            .tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Backlog)
            .collect();
        backlog.sort_by_key(|t| t.order);
        backlog
            .into_iter()
            .find(|t| self.unmet_dependencies(&t.id).is_empty())
    }

    /// Advance a ticket through its lifecycle, validating the transition.
    pub fn advance(&mut self, id: &str, to: TicketStatus) -> Result<(), EngineError> {
        let from = self
            .status_of(id)
            .ok_or_else(|| engine_err!(TicketNotFound, "no ticket with id {}", id))?;
        if !transition_allowed(from, to) {
            return Err(engine_err!(
                TicketNotBuildable,
                "ticket {} cannot move {:?} -> {:?}",
                id,
                from,
                to
            ));
        }
        {
            let ticket = self.ticket_mut(id)?;
            ticket.status = to;
            ticket.updated_at = Utc::now();
            if to == TicketStatus::Done {
                ticket.progress = 100;
            }
        }
        if to.satisfies_dependents() {
            self.recompute_blocked();
        }
        Ok(())
    }

    /// Record a build failure; any active state may fail.
    pub fn record_failure(&mut self, id: &str, error: &str) -> Result<(), EngineError> {
        let ticket = self.ticket_mut(id)?;
        if !ticket.status.is_active() {
            return Err(engine_err!(
                TicketNotBuildable,
                "ticket {} is not building ({:?})",
                id,
                ticket.status
            ));
        }
        ticket.status = TicketStatus::Failed;
        ticket.error = Some(error.to_string());
        ticket.updated_at = Utc::now();
        Ok(())
    }

    /// Send a failed ticket back to the backlog for another attempt.
    pub fn retry(&mut self, id: &str) -> Result<(), EngineError> {
        let ticket = self.ticket_mut(id)?;
        if ticket.status != TicketStatus::Failed {
            return Err(engine_err!(
                TicketNotBuildable,
                "ticket {} is not failed ({:?})",
                id,
                ticket.status
            ));
        }
        ticket.status = TicketStatus::Backlog;
        ticket.retry_count += 1;
        ticket.error = None;
        ticket.updated_at = Utc::now();
        self.recompute_blocked();
        Ok(())
    }

    /// Retry within a budget (see `EngineConfig::max_ticket_retries`).
    /// Returns false, leaving the ticket failed, once the budget is
    /// spent; the orchestration loop then moves on or surfaces the
    /// failure.
    pub fn auto_retry(&mut self, id: &str, max_retries: u32) -> Result<bool, EngineError> {
        let ticket = self.ticket_mut(id)?;
        if ticket.status != TicketStatus::Failed {
            return Err(engine_err!(
                TicketNotBuildable,
                "ticket {} is not failed ({:?})",
                id,
                ticket.status
            ));
        }
        if ticket.retry_count >= max_retries {
            return Ok(false);
        }
        self.retry(id)?;
        Ok(true)
    }

    /// Skip a ticket. Dependents are unblocked exactly as if it were
    /// done, so one non-critical ticket cannot stall the plan.
    pub fn skip(&mut self, id: &str) -> Result<(), EngineError> {
        let from = self
            .status_of(id)
            .ok_or_else(|| engine_err!(TicketNotFound, "no ticket with id {}", id))?;
        if !matches!(
            from,
            TicketStatus::Backlog | TicketStatus::Blocked | TicketStatus::Failed
        ) {
            return Err(engine_err!(
                TicketNotBuildable,
                "ticket {} cannot be skipped from {:?}",
                id,
                from
            ));
        }
        let ticket = self.ticket_mut(id)?;
        ticket.status = TicketStatus::Skipped;
        ticket.updated_at = Utc::now();
        self.manual_queue.retain(|queued| queued.as_str() != id);
        self.recompute_blocked();
        Ok(())
    }

    /// User-initiated delete: removes the ticket and prunes dangling
    /// references from every other ticket and the manual queue.
    pub fn delete(&mut self, id: &str) -> Result<(), EngineError> {
        if self.ticket(id).is_none() {
            return Err(engine_err!(TicketNotFound, "no ticket with id {}", id));
        }
        self.tickets.retain(|t| t.id != id);
        for ticket in &mut self.tickets {
            ticket.depends_on.retain(|dep| dep.as_str() != id);
        }
        self.manual_queue.retain(|queued| queued.as_str() != id);
        self.recompute_blocked();
        Ok(())
    }

    pub fn record_progress(&mut self, id: &str, progress: u8) -> Result<(), EngineError> {
        let ticket = self.ticket_mut(id)?;
        ticket.progress = progress.min(100);
        ticket.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_files(&mut self, id: &str, files: &[String]) -> Result<(), EngineError> {
        let ticket = self.ticket_mut(id)?;
        ticket.actual_files = files.to_vec();
        ticket.updated_at = Utc::now();
        Ok(())
    }

    /// Mark an awaiting-input ticket ready once its inputs arrive.
    pub fn resolve_input(&mut self, id: &str) -> Result<(), EngineError> {
        let ticket = self.ticket_mut(id)?;
        if ticket.status != TicketStatus::AwaitingInput {
            return Err(engine_err!(
                TicketNotBuildable,
                "ticket {} is not awaiting input ({:?})",
                id,
                ticket.status
            ));
        }
        ticket.requires_input = false;
        ticket.status = TicketStatus::Backlog;
        ticket.updated_at = Utc::now();
        self.recompute_blocked();
        Ok(())
    }

    // =========================================================================
    // MANUAL MODE
    // =========================================================================

    /// Enqueue a backlog ticket for an explicit user-triggered build.
    pub fn queue_ticket_for_manual_build(&mut self, id: &str) -> Result<(), EngineError> {
        let status = self
            .status_of(id)
            .ok_or_else(|| engine_err!(TicketNotFound, "no ticket with id {}", id))?;
        if status != TicketStatus::Backlog {
            return Err(engine_err!(
                TicketNotBuildable,
                "ticket {} is not in backlog ({:?})",
                id,
                status
            ));
        }
        if !self.manual_queue.contains(&id.to_string()) {
            self.manual_queue.push_back(id.to_string());
        }
        Ok(())
    }

    /// Dequeue the next manual ticket, re-validating backlog status and
    /// dependencies at dequeue time — a dependency may have regressed
    /// since enqueue.
    pub fn take_manual_ticket(&mut self) -> Result<Option<String>, EngineError> {
        let Some(id) = self.manual_queue.pop_front() else {
            return Ok(None);
        };
        if self.status_of(&id) != Some(TicketStatus::Backlog) {
            return Err(engine_err!(
                TicketNotBuildable,
                "queued ticket {} left the backlog before building",
                id
            ));
        }
        let unmet = self.unmet_dependencies(&id);
        if !unmet.is_empty() {
            return Err(engine_err!(
                TicketNotBuildable,
                "queued ticket {} has unmet dependencies: {}",
                id,
                unmet.join(", ")
            ));
        }
        Ok(Some(id))
    }

    // =========================================================================
    // REPORTING / PERSISTENCE
    // =========================================================================

    /// Percent of tickets in a terminal state.
    pub fn progress_percent(&self) -> u8 {
        if self.tickets.is_empty() {
            return 0;
        }
        let finished = self
            .tickets
            .iter()
            .filter(|t| t.status.is_terminal())
            .count();
        ((finished as f32 / self.tickets.len() as f32) * 100.0) as u8
    }

    /// Non-terminal tickets with nothing buildable: the steady state a
    /// caller detects by polling. Empty when the plan can still move.
    pub fn diagnose_stuck(&self) -> Vec<StuckTicket> {
        if self.next_buildable().is_some() {
            return Vec::new();
        }
        let any_active = self.tickets.iter().any(|t| t.status.is_active());
        if any_active {
            return Vec::new();
        }
        self.tickets
            .iter()
            .filter(|t| !t.status.is_terminal() && t.status != TicketStatus::Failed)
            .map(|t| StuckTicket {
                id: t.id.clone(),
                title: t.title.clone(),
                waiting_on: self.unmet_dependencies(&t.id),
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let rendered = serde_json::to_string_pretty(self)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        let mut plan: BuildPlan = serde_json::from_str(&content)?;
        plan.recompute_blocked();
        Ok(plan)
    }
}

/// Legal lifecycle moves. `failed` and `skipped` entries are handled by
/// their dedicated operations; this covers the forward path.
fn transition_allowed(from: TicketStatus, to: TicketStatus) -> bool {
    use TicketStatus::*;
    matches!(
        (from, to),
        (Planning, Backlog)
            | (Planning, AwaitingInput)
            | (AwaitingInput, Backlog)
            | (Backlog, Generating)
            | (Generating, Applying)
            | (Applying, Testing)
            | (Testing, PrReview)
            | (Testing, Done)
            | (PrReview, Done)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{create_plan, DraftTicket};

    fn draft(title: &str, deps: &[&str]) -> DraftTicket {
        DraftTicket {
            title: title.to_string(),
            description: format!("{} description", title),
            ticket_type: "feature".to_string(),
            priority: "medium".to_string(),
            complexity: "medium".to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            input_requests: Vec::new(),
        }
    }

    fn plan_of(drafts: Vec<DraftTicket>, mode: BuildMode) -> BuildPlan {
        create_plan(drafts, mode).unwrap()
    }

    fn finish(plan: &mut BuildPlan, id: &str) {
        plan.advance(id, TicketStatus::Generating).unwrap();
        plan.advance(id, TicketStatus::Applying).unwrap();
        plan.advance(id, TicketStatus::Testing).unwrap();
        plan.advance(id, TicketStatus::Done).unwrap();
    }

    #[test]
    fn test_unmet_dependency_gates_selection() {
        let plan = plan_of(
            vec![draft("Auth", &[]), draft("Profile", &["Auth"])],
            BuildMode::Auto,
        );
        let next = plan.next_buildable().unwrap();
        assert_eq!(next.title, "Auth");
        // Profile is derived-blocked, not silently backlogged.
        let profile = plan.tickets.iter().find(|t| t.title == "Profile").unwrap();
        assert_eq!(profile.status, TicketStatus::Blocked);
        assert_eq!(profile.blocked_by, vec![plan.tickets[0].id.clone()]);
    }

    #[test]
    fn test_done_cascades_unblock() {
        let mut plan = plan_of(
            vec![draft("Auth", &[]), draft("Profile", &["Auth"])],
            BuildMode::Auto,
        );
        let auth_id = plan.tickets[0].id.clone();
        finish(&mut plan, &auth_id);

        let profile = plan.tickets.iter().find(|t| t.title == "Profile").unwrap();
        assert_eq!(profile.status, TicketStatus::Backlog);
        assert!(profile.blocked_by.is_empty());
        assert_eq!(plan.next_buildable().unwrap().title, "Profile");
    }

    #[test]
    fn test_skip_unblocks_like_done() {
        let mut plan = plan_of(
            vec![draft("Auth", &[]), draft("Profile", &["Auth"])],
            BuildMode::Auto,
        );
        let auth_id = plan.tickets[0].id.clone();
        plan.skip(&auth_id).unwrap();

        let profile = plan.tickets.iter().find(|t| t.title == "Profile").unwrap();
        assert_eq!(profile.status, TicketStatus::Backlog);
        assert!(profile.blocked_by.is_empty());
    }

    #[test]
    fn test_selection_respects_order() {
        let plan = plan_of(
            vec![draft("First", &[]), draft("Second", &[])],
            BuildMode::Auto,
        );
        assert_eq!(plan.next_buildable().unwrap().title, "First");
    }

    #[test]
    fn test_failed_then_retry() {
        let mut plan = plan_of(vec![draft("Auth", &[])], BuildMode::Auto);
        let id = plan.tickets[0].id.clone();
        plan.advance(&id, TicketStatus::Generating).unwrap();
        plan.record_failure(&id, "model returned nothing").unwrap();
        assert_eq!(plan.ticket(&id).unwrap().status, TicketStatus::Failed);
        assert!(plan.ticket(&id).unwrap().error.is_some());

        plan.retry(&id).unwrap();
        let ticket = plan.ticket(&id).unwrap();
        assert_eq!(ticket.status, TicketStatus::Backlog);
        assert_eq!(ticket.retry_count, 1);
        assert!(ticket.error.is_none());
    }

    #[test]
    fn test_auto_retry_respects_budget() {
        let mut plan = plan_of(vec![draft("Auth", &[])], BuildMode::Auto);
        let id = plan.tickets[0].id.clone();
        for _ in 0..2 {
            plan.advance(&id, TicketStatus::Generating).unwrap();
            plan.record_failure(&id, "boom").unwrap();
            assert!(plan.auto_retry(&id, 2).unwrap());
        }
        plan.advance(&id, TicketStatus::Generating).unwrap();
        plan.record_failure(&id, "boom").unwrap();
        // Budget exhausted: the ticket stays failed for manual triage.
        assert!(!plan.auto_retry(&id, 2).unwrap());
        assert_eq!(plan.ticket(&id).unwrap().status, TicketStatus::Failed);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut plan = plan_of(vec![draft("Auth", &[])], BuildMode::Auto);
        let id = plan.tickets[0].id.clone();
        let err = plan.advance(&id, TicketStatus::Done).unwrap_err();
        assert_eq!(err.category, "plan");
    }

    #[test]
    fn test_manual_queue_validates_at_dequeue() {
        let mut plan = plan_of(
            vec![draft("Auth", &[]), draft("Profile", &["Auth"])],
            BuildMode::Manual,
        );
        let auth_id = plan.tickets[0].id.clone();
        plan.queue_ticket_for_manual_build(&auth_id).unwrap();

        // The ticket started building through some other path before the
        // queued build ran; dequeue must refuse, not build twice.
        plan.advance(&auth_id, TicketStatus::Generating).unwrap();
        let err = plan.take_manual_ticket().unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::TicketNotBuildable as u16);
    }

    #[test]
    fn test_manual_queue_only_accepts_backlog() {
        let mut plan = plan_of(
            vec![draft("Auth", &[]), draft("Profile", &["Auth"])],
            BuildMode::Manual,
        );
        let profile_id = plan.tickets[1].id.clone();
        // Profile is blocked, not backlog.
        assert!(plan.queue_ticket_for_manual_build(&profile_id).is_err());
    }

    #[test]
    fn test_delete_prunes_references() {
        let mut plan = plan_of(
            vec![draft("Auth", &[]), draft("Profile", &["Auth"])],
            BuildMode::Auto,
        );
        let auth_id = plan.tickets[0].id.clone();
        plan.delete(&auth_id).unwrap();

        let profile = plan.tickets.iter().find(|t| t.title == "Profile").unwrap();
        assert!(profile.depends_on.is_empty());
        assert_eq!(profile.status, TicketStatus::Backlog);
        assert_eq!(plan.tickets.len(), 1);
    }

    #[test]
    fn test_progress_counts_terminal_states() {
        let mut plan = plan_of(
            vec![draft("A", &[]), draft("B", &[]), draft("C", &[]), draft("D", &[])],
            BuildMode::Auto,
        );
        let a = plan.tickets[0].id.clone();
        let b = plan.tickets[1].id.clone();
        finish(&mut plan, &a);
        plan.skip(&b).unwrap();
        assert_eq!(plan.progress_percent(), 50);
    }

    #[test]
    fn test_diagnose_stuck_names_blockers() {
        let mut plan = plan_of(
            vec![draft("Auth", &[]), draft("Profile", &["Auth"])],
            BuildMode::Auto,
        );
        let auth_id = plan.tickets[0].id.clone();
        plan.advance(&auth_id, TicketStatus::Generating).unwrap();
        plan.record_failure(&auth_id, "boom").unwrap();

        let stuck = plan.diagnose_stuck();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].title, "Profile");
        assert_eq!(stuck[0].waiting_on, vec![auth_id]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        let mut plan = plan_of(
            vec![draft("Auth", &[]), draft("Profile", &["Auth"])],
            BuildMode::Manual,
        );
        let auth_id = plan.tickets[0].id.clone();
        finish(&mut plan, &auth_id);
        plan.save(&path).unwrap();

        let loaded = BuildPlan::load(&path).unwrap();
        assert_eq!(loaded.tickets.len(), 2);
        assert_eq!(loaded.ticket(&auth_id).unwrap().status, TicketStatus::Done);
        assert_eq!(loaded.next_buildable().unwrap().title, "Profile");
        assert_eq!(loaded.build_mode, BuildMode::Manual);
    }
}
