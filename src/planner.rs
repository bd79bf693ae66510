//! Plan creation.
//!
//! The external planning call explodes a prompt into draft ticket
//! descriptors whose dependencies are expressed as *titles*. This module
//! resolves those titles to stable ids, assigns backlog order by list
//! position, records unresolvable titles as plan warnings instead of
//! silently dropping the edge, and rejects dependency cycles outright —
//! a cyclic plan would make every involved ticket permanently
//! non-buildable with no diagnostic.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::engine_err;
use crate::error::EngineError;
use crate::ticket::{BuildMode, BuildPlan, Ticket, TicketStatus};

/// One ticket descriptor as returned by the planning call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftTicket {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_type")]
    pub ticket_type: String,
    #[serde(default = "default_level")]
    pub priority: String,
    #[serde(default = "default_level")]
    pub complexity: String,
    /// Dependency *titles*, resolved to ids here.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub input_requests: Vec<String>,
}

fn default_type() -> String {
    "feature".to_string()
}

fn default_level() -> String {
    "medium".to_string()
}

/// Resolve drafts into a build plan.
pub fn create_plan(drafts: Vec<DraftTicket>, mode: BuildMode) -> Result<BuildPlan, EngineError> {
    let ids: Vec<String> = (1..=drafts.len()).map(|n| format!("ticket-{}", n)).collect();
    let by_title: HashMap<String, String> = drafts
        .iter()
        .zip(&ids)
        .map(|(draft, id)| (normalize_title(&draft.title), id.clone()))
        .collect();

    let mut warnings = Vec::new();
    let now = Utc::now();
    let tickets: Vec<Ticket> = drafts
        .iter()
        .zip(&ids)
        .enumerate()
        .map(|(index, (draft, id))| {
            let mut depends_on = Vec::new();
            for dep_title in &draft.dependencies {
                match by_title.get(&normalize_title(dep_title)) {
                    Some(dep_id) if dep_id != id => depends_on.push(dep_id.clone()),
                    Some(_) => warnings.push(format!(
                        "ticket '{}' depends on itself; edge dropped",
                        draft.title
                    )),
                    None => warnings.push(format!(
                        "ticket '{}' depends on unknown title '{}'; edge dropped",
                        draft.title, dep_title
                    )),
                }
            }
            let requires_input = !draft.input_requests.is_empty();
            Ticket {
                id: id.clone(),
                title: draft.title.clone(),
                description: draft.description.clone(),
                ticket_type: draft.ticket_type.clone(),
                priority: draft.priority.clone(),
                complexity: draft.complexity.clone(),
                status: if requires_input {
                    TicketStatus::AwaitingInput
                } else {
                    TicketStatus::Backlog
                },
                depends_on,
                blocked_by: Vec::new(),
                order: index as u32,
                retry_count: 0,
                progress: 0,
                actual_files: Vec::new(),
                error: None,
                requires_input,
                input_requests: draft.input_requests.clone(),
                updated_at: now,
            }
        })
        .collect();

    if let Some(cycle) = find_cycle(&tickets) {
        return Err(engine_err!(
            DependencyCycle,
            "dependency cycle: {}",
            cycle.join(" -> ")
        ));
    }

    let mut plan = BuildPlan::new(tickets, mode);
    plan.warnings = warnings;
    Ok(plan)
}

fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// DFS three-color cycle search over the resolved graph. Returns the
/// cycle path (ids, first repeated at the end) when one exists.
fn find_cycle(tickets: &[Ticket]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Grey,
        Black,
    }

    let index: HashMap<&str, &Ticket> =
        tickets.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut marks: HashMap<&str, Mark> =
        tickets.iter().map(|t| (t.id.as_str(), Mark::White)).collect();

    fn visit<'a>(
        id: &'a str,
        index: &HashMap<&'a str, &'a Ticket>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(id, Mark::Grey);
        stack.push(id);
        if let Some(ticket) = index.get(id) {
            for dep in &ticket.depends_on {
                let dep = dep.as_str();
                match marks.get(dep).copied().unwrap_or(Mark::Black) {
                    Mark::Grey => {
                        let start = stack.iter().position(|s| *s == dep).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|s| s.to_string()).collect();
                        cycle.push(dep.to_string());
                        return Some(cycle);
                    }
                    Mark::White => {
                        if index.contains_key(dep) {
                            if let Some(found) = visit(dep, index, marks, stack) {
                                return Some(found);
                            }
                        }
                    }
                    Mark::Black => {}
                }
            }
        }
        stack.pop();
        marks.insert(id, Mark::Black);
        None
    }

    let ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
    for id in ids {
        if marks.get(id) == Some(&Mark::White) {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(id, &index, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, deps: &[&str]) -> DraftTicket {
        DraftTicket {
            title: title.to_string(),
            description: String::new(),
            ticket_type: default_type(),
            priority: default_level(),
            complexity: default_level(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            input_requests: Vec::new(),
        }
    }

    #[test]
    fn test_titles_resolve_to_ids_in_order() {
        let plan = create_plan(
            vec![draft("Auth", &[]), draft("Profile", &["Auth"])],
            BuildMode::Auto,
        )
        .unwrap();
        assert_eq!(plan.tickets[0].id, "ticket-1");
        assert_eq!(plan.tickets[1].depends_on, vec!["ticket-1"]);
        assert_eq!(plan.tickets[0].order, 0);
        assert_eq!(plan.tickets[1].order, 1);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_title_resolution_is_case_insensitive() {
        let plan = create_plan(
            vec![draft("Auth Flow", &[]), draft("Profile", &["auth flow"])],
            BuildMode::Auto,
        )
        .unwrap();
        assert_eq!(plan.tickets[1].depends_on, vec!["ticket-1"]);
    }

    #[test]
    fn test_unknown_title_becomes_warning_not_silence() {
        let plan = create_plan(
            vec![draft("Profile", &["Billing"])],
            BuildMode::Auto,
        )
        .unwrap();
        assert!(plan.tickets[0].depends_on.is_empty());
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("Billing"));
    }

    #[test]
    fn test_self_dependency_dropped_with_warning() {
        let plan = create_plan(vec![draft("Auth", &["Auth"])], BuildMode::Auto).unwrap();
        assert!(plan.tickets[0].depends_on.is_empty());
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_cycle_is_a_planning_error() {
        let err = create_plan(
            vec![
                draft("A", &["C"]),
                draft("B", &["A"]),
                draft("C", &["B"]),
            ],
            BuildMode::Auto,
        )
        .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::DependencyCycle as u16);
        assert!(err.message.contains("->"));
    }

    #[test]
    fn test_input_requests_gate_initial_status() {
        let mut with_input = draft("Payments", &[]);
        with_input.input_requests = vec!["Stripe API key".to_string()];
        let plan = create_plan(vec![with_input], BuildMode::Auto).unwrap();
        assert_eq!(plan.tickets[0].status, TicketStatus::AwaitingInput);
        assert!(plan.tickets[0].requires_input);
    }

    #[test]
    fn test_draft_deserializes_with_defaults() {
        let draft: DraftTicket =
            serde_json::from_str(r#"{"title": "Auth"}"#).unwrap();
        assert_eq!(draft.ticket_type, "feature");
        assert_eq!(draft.priority, "medium");
        assert!(draft.dependencies.is_empty());
    }
}
