// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley status` command implementation.
//!
//! Connects to the configured stores and prints their health together with
//! the queue length and the number of active dialogs and topics. With the
//! in-memory state backend the numbers describe this process only.

use std::io::IsTerminal;
use std::sync::Arc;

use parley_config::model::{ParleyConfig, StateBackend};
use parley_core::{HealthStatus, ParleyError, RecordStore};
use parley_engine::Engine;
use parley_storage::SqliteRecords;
use serde::Serialize;

/// Health of one backend.
#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub healthy: bool,
    pub detail: Option<String>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state_backend: String,
    pub backends: Vec<BackendStatus>,
    pub queue_length: usize,
    pub active_dialogs: usize,
    pub active_topics: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StatusResponse {
    fn healthy(&self) -> bool {
        self.backends.iter().all(|b| b.healthy)
    }
}

/// The in-memory store lives inside `parley serve`; a separate CLI process
/// only ever sees its own empty copy.
fn backend_note(backend: StateBackend) -> Option<String> {
    match backend {
        StateBackend::Memory => Some(
            "state.backend is \"memory\": live state of a running `parley serve` is not \
             visible from this process, so counts are always zero"
                .to_string(),
        ),
        StateBackend::Redis => None,
    }
}

fn backend_status(name: String, health: HealthStatus) -> BackendStatus {
    match health {
        HealthStatus::Healthy => BackendStatus {
            name,
            healthy: true,
            detail: None,
        },
        HealthStatus::Degraded(detail) => BackendStatus {
            name,
            healthy: true,
            detail: Some(detail),
        },
        HealthStatus::Unhealthy(detail) => BackendStatus {
            name,
            healthy: false,
            detail: Some(detail),
        },
    }
}

/// Collects the status of the stores behind `engine`.
pub async fn collect_status(
    engine: &Engine,
    backend: StateBackend,
) -> Result<StatusResponse, ParleyError> {
    let backends = engine
        .health()
        .await
        .into_iter()
        .map(|(name, health)| backend_status(name, health))
        .collect();
    Ok(StatusResponse {
        state_backend: backend.to_string(),
        backends,
        queue_length: engine.queue_len().await?,
        active_dialogs: engine.dialogs().active_count().await?,
        active_topics: engine.topics().active_count().await?,
        note: backend_note(backend),
    })
}

/// Run the `parley status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(config: &ParleyConfig, json: bool, plain: bool) -> Result<(), ParleyError> {
    let store = parley_state::connect(&config.state).await?;
    let records = SqliteRecords::new(config.storage.clone());
    records.initialize().await?;
    let records: Arc<dyn RecordStore> = Arc::new(records);
    let engine = Engine::new(config.engine.clone(), store, records);

    let status = collect_status(&engine, config.state.backend).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&status, use_color);
    }
    engine.shutdown().await
}

/// Print status with optional colors.
fn print_status(status: &StatusResponse, use_color: bool) {
    println!();
    println!("  parley status");
    println!("  {}", "-".repeat(35));

    for backend in &status.backends {
        let detail = backend
            .detail
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        if use_color {
            use colored::Colorize;
            let mark = if backend.healthy {
                "✓".green()
            } else {
                "✗".red()
            };
            println!("    {:<10}{mark} {}{detail}", backend.name, health_word(backend));
        } else {
            let mark = if backend.healthy { "[OK]" } else { "[FAIL]" };
            println!("    {:<10}{mark} {}{detail}", backend.name, health_word(backend));
        }
    }

    println!("    Backend:  {}", status.state_backend);
    println!("    Queue:    {}", status.queue_length);
    println!("    Dialogs:  {}", status.active_dialogs);
    println!("    Topics:   {}", status.active_topics);
    if let Some(note) = &status.note {
        println!();
        println!("  Note: {note}");
    }
    if !status.healthy() {
        println!();
        println!("  One or more backends are unhealthy.");
    }
    println!();
}

fn health_word(backend: &BackendStatus) -> &'static str {
    match (backend.healthy, backend.detail.is_some()) {
        (true, false) => "healthy",
        (true, true) => "degraded",
        (false, _) => "unhealthy",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_backend_marks_status_unhealthy() {
        let status = StatusResponse {
            state_backend: "memory".to_string(),
            backends: vec![
                backend_status("memory".to_string(), HealthStatus::Healthy),
                backend_status("sqlite".to_string(), HealthStatus::Unhealthy("locked".into())),
            ],
            queue_length: 0,
            active_dialogs: 0,
            active_topics: 0,
            note: None,
        };
        assert!(!status.healthy());
        assert_eq!(health_word(&status.backends[1]), "unhealthy");
    }

    #[test]
    fn degraded_backend_is_still_healthy() {
        let backend = backend_status("redis".to_string(), HealthStatus::Degraded("slow".into()));
        assert!(backend.healthy);
        assert_eq!(health_word(&backend), "degraded");
    }

    #[test]
    fn status_response_serializes() {
        let status = StatusResponse {
            state_backend: "memory".to_string(),
            backends: vec![backend_status("memory".to_string(), HealthStatus::Healthy)],
            queue_length: 3,
            active_dialogs: 1,
            active_topics: 2,
            note: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"queue_length\":3"));
        assert!(json.contains("\"healthy\":true"));
        assert!(!json.contains("note"));
    }

    #[test]
    fn memory_backend_status_carries_visibility_note() {
        let note = backend_note(StateBackend::Memory).unwrap();
        assert!(note.contains("not visible"));
        assert_eq!(backend_note(StateBackend::Redis), None);
    }
}
