//! The apply pipeline: one parsed AI response in, a consistent bootable
//! file tree out.
//!
//! Processing is strictly sequential — packages, then files in planned
//! write order, then the entrypoint/placeholder post-pass, then commands
//! — because write order is a correctness invariant for a live dev
//! server. Every sandbox call is awaited before the next item starts.
//!
//! Individual item failures are recorded and the run continues; only a
//! sandbox that is unreachable before the first write is fatal. The
//! stream always ends with exactly one `complete` or `error` event.

use async_stream::stream;
use futures_core::Stream;
use std::collections::BTreeMap;

use crate::engine_err;
use crate::entrypoint::patch_entrypoints;
use crate::parser::ParsedArtifacts;
use crate::paths::normalize_path;
use crate::placeholder::reconcile_placeholders;
use crate::progress::{ApplyResults, ProgressEvent};
use crate::sandbox::Sandbox;
use crate::session::SandboxSession;
use crate::write_order::plan_write_order;

/// Apply one parsed response to the sandbox, yielding ordered progress
/// events. Taking the session `&mut` for the whole run is what enforces
/// one run at a time per sandbox.
pub fn apply_response<'a>(
    sandbox: &'a dyn Sandbox,
    session: &'a mut SandboxSession,
    parsed: &'a ParsedArtifacts,
) -> impl Stream<Item = ProgressEvent> + 'a {
    stream! {
        let mut results = ApplyResults::default();

        // A sandbox-connection failure before any write is fatal for the
        // run; no partial results are attempted.
        if sandbox.sandbox_info().is_none() {
            yield ProgressEvent::Error {
                error: engine_err!(SandboxUnavailable, "sandbox is not reachable"),
            };
            return;
        }
        match sandbox.list_files().await {
            Ok(files) => session.refresh_known_files(files),
            Err(e) => {
                yield ProgressEvent::Error { error: e };
                return;
            }
        }

        // Normalize paths for the active template, dropping generated
        // configuration the scaffold owns.
        let mut batch: BTreeMap<String, String> = BTreeMap::new();
        let mut dropped: Vec<String> = Vec::new();
        for file in &parsed.files {
            match normalize_path(&file.path, session.template_target) {
                Some(path) => {
                    batch.insert(path, file.content.clone());
                }
                None => dropped.push(file.path.clone()),
            }
        }

        yield ProgressEvent::Start {
            message: format!(
                "Applying response: {} files, {} packages, {} commands",
                batch.len(),
                parsed.packages.len(),
                parsed.commands.len()
            ),
            total_files: batch.len(),
        };
        for path in &dropped {
            yield ProgressEvent::Warning {
                message: format!("skipped generated config file: {}", path),
            };
        }
        for file in parsed.files.iter().filter(|f| !f.is_complete) {
            yield ProgressEvent::Warning {
                message: format!("file {} looks truncated; applying anyway", file.path),
            };
        }

        // ---- Packages -------------------------------------------------------
        if !parsed.packages.is_empty() {
            let partition = session
                .packages
                .partition(&session.sandbox_id, &parsed.packages);
            if !partition.already_installed.is_empty() {
                yield ProgressEvent::Info {
                    message: format!(
                        "{} packages already installed: {}",
                        partition.already_installed.len(),
                        partition.already_installed.join(", ")
                    ),
                };
                results.packages_already_installed = partition.already_installed.clone();
            }
            if !partition.to_install.is_empty() {
                yield ProgressEvent::Step {
                    message: format!("Installing {} packages", partition.to_install.len()),
                };
                let total = partition.to_install.len();
                for (i, pkg) in partition.to_install.iter().enumerate() {
                    yield ProgressEvent::PackageProgress {
                        message: pkg.clone(),
                        current: i + 1,
                        total,
                    };
                }
                match sandbox.install_packages(&partition.to_install).await {
                    Ok(outcome) if outcome.success => {
                        session
                            .packages
                            .mark_installed(&session.sandbox_id, &outcome.installed_packages);
                        results.packages_installed = outcome.installed_packages;
                    }
                    Ok(_) => {
                        results.packages_failed = partition.to_install.clone();
                        results.errors.push("package install reported failure".to_string());
                        yield ProgressEvent::Warning {
                            message: "package install reported failure; continuing".to_string(),
                        };
                    }
                    Err(e) => {
                        results.packages_failed = partition.to_install.clone();
                        results.errors.push(e.to_string());
                        yield ProgressEvent::Warning {
                            message: format!("package install failed: {}; continuing", e),
                        };
                    }
                }
            }
        }

        // ---- Files ----------------------------------------------------------
        let mut ordered: Vec<String> = batch.keys().cloned().collect();
        plan_write_order(&mut ordered);

        let total = ordered.len();
        let mut written: Vec<(String, String)> = Vec::new();
        for (i, path) in ordered.iter().enumerate() {
            let content = &batch[path];
            yield ProgressEvent::FileProgress {
                file_name: path.clone(),
                current: i + 1,
                total,
            };
            match sandbox.write_file(path, content).await {
                Ok(()) => {
                    let action = if session.has_file(path) { "updated" } else { "created" };
                    if action == "created" {
                        results.files_created.push(path.clone());
                    } else {
                        results.files_updated.push(path.clone());
                    }
                    session.note_file(path);
                    written.push((path.clone(), content.clone()));
                    yield ProgressEvent::FileComplete {
                        file_name: path.clone(),
                        action: action.to_string(),
                    };
                }
                Err(e) => {
                    results.errors.push(format!("{}: {}", path, e));
                    yield ProgressEvent::FileError {
                        file_name: path.clone(),
                        error: e.to_string(),
                    };
                }
            }
        }

        // ---- Entrypoint post-pass -------------------------------------------
        let patches = patch_entrypoints(sandbox, &batch, session.known_files()).await;
        for patch in patches {
            yield ProgressEvent::Step {
                message: format!("Repointing entrypoint reference in {}", patch.path),
            };
            match sandbox.write_file(&patch.path, &patch.content).await {
                Ok(()) => {
                    if !results.files_updated.contains(&patch.path) {
                        results.files_updated.push(patch.path.clone());
                    }
                    session.note_file(&patch.path);
                    written.push((patch.path.clone(), patch.content.clone()));
                    yield ProgressEvent::FileComplete {
                        file_name: patch.path,
                        action: "updated".to_string(),
                    };
                }
                Err(e) => {
                    results.errors.push(format!("{}: {}", patch.path, e));
                    yield ProgressEvent::FileError {
                        file_name: patch.path,
                        error: e.to_string(),
                    };
                }
            }
        }

        // ---- Placeholder post-pass ------------------------------------------
        let stubs = reconcile_placeholders(&written, session.known_files());
        for stub in stubs {
            yield ProgressEvent::Step {
                message: format!("Creating placeholder module {}", stub.path),
            };
            match sandbox.write_file(&stub.path, &stub.content).await {
                Ok(()) => {
                    results.files_created.push(stub.path.clone());
                    session.note_file(&stub.path);
                    yield ProgressEvent::FileComplete {
                        file_name: stub.path,
                        action: "created".to_string(),
                    };
                }
                Err(e) => {
                    results.errors.push(format!("{}: {}", stub.path, e));
                    yield ProgressEvent::FileError {
                        file_name: stub.path,
                        error: e.to_string(),
                    };
                }
            }
        }

        // ---- Commands -------------------------------------------------------
        let total = parsed.commands.len();
        for (i, command) in parsed.commands.iter().enumerate() {
            yield ProgressEvent::CommandProgress {
                command: command.clone(),
                current: i + 1,
                total,
            };
            match sandbox.run_command(command).await {
                Ok(output) => {
                    if !output.stdout.trim().is_empty() {
                        yield ProgressEvent::CommandOutput {
                            command: command.clone(),
                            output: output.stdout.clone(),
                        };
                    }
                    if output.exit_code != 0 {
                        results.errors.push(format!(
                            "command '{}' exited {}: {}",
                            command,
                            output.exit_code,
                            output.stderr.trim()
                        ));
                    }
                    results.commands_executed.push(command.clone());
                    yield ProgressEvent::CommandComplete {
                        command: command.clone(),
                        exit_code: output.exit_code,
                    };
                }
                Err(e) => {
                    results.errors.push(format!("command '{}': {}", command, e));
                    yield ProgressEvent::CommandError {
                        command: command.clone(),
                        error: e.to_string(),
                    };
                }
            }
        }

        // Partial success is still `complete`; consumers must check
        // `errors` rather than assume a clean run.
        yield ProgressEvent::Complete { results };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::parser::parse_response;
    use crate::paths::TemplateTarget;
    use crate::sandbox::DirSandbox;
    use futures::StreamExt;
    use tempfile::TempDir;

    async fn collect(
        sandbox: &DirSandbox,
        session: &mut SandboxSession,
        parsed: &ParsedArtifacts,
    ) -> Vec<ProgressEvent> {
        let stream = apply_response(sandbox, session, parsed);
        futures::pin_mut!(stream);
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        events
    }

    fn session_for(sandbox: &DirSandbox) -> SandboxSession {
        SandboxSession::new(&sandbox.sandbox_info().unwrap(), &EngineConfig::default())
    }

    fn final_results(events: &[ProgressEvent]) -> ApplyResults {
        match events.last().unwrap() {
            ProgressEvent::Complete { results } => results.clone(),
            other => panic!("run did not end with complete: {:?}", other),
        }
    }

    const RESPONSE: &str = r#"
<file path="src/App.jsx">
import React from 'react'
import Button from './components/Button'
export default function App() { return <Button/> }
</file>
<file path="components/Button.jsx">
export default function Button() { return <button>go</button> }
</file>
<command>echo done</command>
"#;

    #[tokio::test]
    async fn test_full_run_creates_files_in_order() {
        let tmp = TempDir::new().unwrap();
        let sandbox = DirSandbox::new(tmp.path(), TemplateTarget::SinglePageApp);
        let mut session = session_for(&sandbox);
        let parsed = parse_response(RESPONSE);

        let events = collect(&sandbox, &mut session, &parsed).await;
        let results = final_results(&events);

        assert!(results.files_created.contains(&"src/App.jsx".to_string()));
        assert!(results
            .files_created
            .contains(&"src/components/Button.jsx".to_string()));
        assert!(results.errors.is_empty());
        assert_eq!(results.commands_executed, vec!["echo done"]);

        // Button (leaf) must be written before App (entrypoint rank).
        let file_order: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::FileComplete { file_name, action } if action == "created" => {
                    Some(file_name.as_str())
                }
                _ => None,
            })
            .collect();
        let button = file_order
            .iter()
            .position(|f| *f == "src/components/Button.jsx")
            .unwrap();
        let app = file_order.iter().position(|f| *f == "src/App.jsx").unwrap();
        assert!(button < app);

        assert!(sandbox.read_file("src/App.jsx").await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_sandbox_is_terminal_error() {
        let sandbox = DirSandbox::new("/nope/not/here", TemplateTarget::SinglePageApp);
        let info = crate::sandbox::SandboxInfo {
            sandbox_id: "sb".to_string(),
            template_target: TemplateTarget::SinglePageApp,
        };
        let mut session = SandboxSession::new(&info, &EngineConfig::default());
        let parsed = parse_response(RESPONSE);

        let events = collect(&sandbox, &mut session, &parsed).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProgressEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_packages_cached_across_runs() {
        let tmp = TempDir::new().unwrap();
        let sandbox = DirSandbox::new(tmp.path(), TemplateTarget::SinglePageApp);
        let mut session = session_for(&sandbox);
        let parsed =
            parse_response("<file path=\"src/a.js\">\nimport axios from 'axios'\nexport default axios\n</file>");

        let first = final_results(&collect(&sandbox, &mut session, &parsed).await);
        assert_eq!(first.packages_installed, vec!["axios"]);
        assert!(first.packages_already_installed.is_empty());

        let second = final_results(&collect(&sandbox, &mut session, &parsed).await);
        assert!(second.packages_installed.is_empty());
        assert_eq!(second.packages_already_installed, vec!["axios"]);
    }

    #[tokio::test]
    async fn test_placeholder_created_for_missing_import() {
        let tmp = TempDir::new().unwrap();
        let sandbox = DirSandbox::new(tmp.path(), TemplateTarget::SinglePageApp);
        let mut session = session_for(&sandbox);
        let parsed = parse_response(
            "<file path=\"src/App.jsx\">\nimport Hero from './components/Hero'\nexport default function App() { return <Hero/> }\n</file>",
        );

        let results = final_results(&collect(&sandbox, &mut session, &parsed).await);
        assert!(results
            .files_created
            .contains(&"src/components/Hero.jsx".to_string()));
        let stub = sandbox.read_file("src/components/Hero.jsx").await.unwrap();
        assert!(stub.contains("Hero"));
    }

    #[tokio::test]
    async fn test_second_run_reports_updates() {
        let tmp = TempDir::new().unwrap();
        let sandbox = DirSandbox::new(tmp.path(), TemplateTarget::SinglePageApp);
        let mut session = session_for(&sandbox);
        let parsed = parse_response("<file path=\"src/a.js\">\nexport default 1\n</file>");

        let first = final_results(&collect(&sandbox, &mut session, &parsed).await);
        assert_eq!(first.files_created, vec!["src/a.js"]);

        let second = final_results(&collect(&sandbox, &mut session, &parsed).await);
        assert!(second.files_created.is_empty());
        assert_eq!(second.files_updated, vec!["src/a.js"]);
    }

    #[tokio::test]
    async fn test_failing_command_is_partial_success() {
        let tmp = TempDir::new().unwrap();
        let sandbox = DirSandbox::new(tmp.path(), TemplateTarget::SinglePageApp);
        let mut session = session_for(&sandbox);
        let parsed = parse_response(
            "<file path=\"src/a.js\">\nexport default 1\n</file>\n<command>exit 3</command>",
        );

        let events = collect(&sandbox, &mut session, &parsed).await;
        let results = final_results(&events);
        assert_eq!(results.files_created, vec!["src/a.js"]);
        assert_eq!(results.errors.len(), 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressEvent::CommandComplete { exit_code: 3, .. })));
    }

    #[tokio::test]
    async fn test_config_files_dropped_with_warning() {
        let tmp = TempDir::new().unwrap();
        let sandbox = DirSandbox::new(tmp.path(), TemplateTarget::SinglePageApp);
        let mut session = session_for(&sandbox);
        let parsed = parse_response(
            "<file path=\"vite.config.js\">\nexport default {}\n</file>\n<file path=\"src/a.js\">\nexport default 1\n</file>",
        );

        let events = collect(&sandbox, &mut session, &parsed).await;
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::Warning { message } if message.contains("vite.config.js")
        )));
        let results = final_results(&events);
        assert_eq!(results.files_created, vec!["src/a.js"]);
        assert!(sandbox.read_file("vite.config.js").await.is_err());
    }

    #[tokio::test]
    async fn test_events_strictly_ordered() {
        let tmp = TempDir::new().unwrap();
        let sandbox = DirSandbox::new(tmp.path(), TemplateTarget::SinglePageApp);
        let mut session = session_for(&sandbox);
        let parsed = parse_response(RESPONSE);

        let events = collect(&sandbox, &mut session, &parsed).await;
        assert!(matches!(events.first().unwrap(), ProgressEvent::Start { .. }));
        assert!(events.last().unwrap().is_terminal());
        // No event after the terminal one, and files precede commands.
        let first_command = events
            .iter()
            .position(|e| matches!(e, ProgressEvent::CommandProgress { .. }))
            .unwrap();
        let last_file = events
            .iter()
            .rposition(|e| matches!(e, ProgressEvent::FileComplete { .. }))
            .unwrap();
        assert!(last_file < first_command);
    }
}
