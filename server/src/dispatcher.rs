//! The request dispatcher: JSON command in, JSON response out.
//!
//! Transports own the sockets; they hand each command body to
//! [`Dispatcher::handle_command`] and write back whatever string comes
//! out. The optional `id` field is an opaque correlation value echoed on
//! every response, error responses included, so WebSocket clients can
//! match responses to requests.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use cinder_types::{U128, U256};
use cinder_work::{achieved_difficulty, from_multiplier, to_multiplier, validate_work, work_value};

use crate::config::Config;
use crate::error::ServerError;
use crate::job::JobRequest;
use crate::scheduler::WorkScheduler;

#[derive(Deserialize)]
struct CommandRequest {
    action: Option<String>,
    hash: Option<String>,
    work: Option<String>,
    difficulty: Option<String>,
    multiplier: Option<f64>,
    priority: Option<u32>,
    id: Option<String>,
}

pub struct Dispatcher {
    config: Config,
    scheduler: Arc<WorkScheduler>,
}

impl Dispatcher {
    pub fn new(config: Config, scheduler: Arc<WorkScheduler>) -> Self {
        Self { config, scheduler }
    }

    /// Decode and execute one command body.
    pub async fn handle_command(&self, body: &str) -> String {
        let request: CommandRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => return error_response(None, &format!("invalid request: {e}")),
        };
        let id = request.id.clone();

        let result = match request.action.as_deref() {
            Some("work_generate") => self.generate(&request).await,
            Some("work_validate") => self.validate(&request),
            Some("work_cancel") => self.cancel(&request),
            _ => Err(ServerError::InvalidAction),
        };

        match result {
            Ok(mut response) => {
                attach_correlation_id(&id, &mut response);
                response.to_string()
            }
            Err(e) => {
                tracing::info!(error = %e, "reporting request error to the client");
                error_response(id.as_deref(), &e.to_string())
            }
        }
    }

    /// The queue introspection entry point (`GET` on the queue resource).
    pub fn handle_queue_list(&self) -> String {
        let snapshot = self.scheduler.snapshot();
        json!({
            "queued": snapshot.queued.iter().map(job_json).collect::<Vec<_>>(),
            "active": snapshot.active.iter().map(job_json).collect::<Vec<_>>(),
            "completed": snapshot.completed.iter().map(job_json).collect::<Vec<_>>(),
        })
        .to_string()
    }

    /// The queue purge entry point (`DELETE` on the queue resource).
    pub fn handle_queue_purge(&self) -> String {
        if self.scheduler.purge() {
            json!({ "success": true }).to_string()
        } else {
            error_response(None, &ServerError::ControlDisabled.to_string())
        }
    }

    async fn generate(&self, request: &CommandRequest) -> Result<serde_json::Value, ServerError> {
        if self.scheduler.device_count() == 0 {
            return Err(ServerError::NoDevice);
        }

        let root_hash = required_hash(request, "work_generate")?;
        let difficulty = self.requested_difficulty(request)?;
        let base = self.config.work.base_difficulty;

        let priority = request.priority.unwrap_or(0);
        let priority = if self.config.server.allow_prioritization {
            priority
        } else {
            if priority > 0 {
                tracing::info!(
                    root = %root_hash,
                    "priority field ignored, prioritization is disabled"
                );
            }
            0
        };

        tracing::info!(
            root = %root_hash,
            difficulty = %difficulty,
            priority,
            "work requested"
        );

        let (job_id, outcome_rx) = self.scheduler.submit(
            JobRequest {
                root_hash,
                difficulty,
                multiplier: to_multiplier(difficulty, base),
            },
            priority,
        )?;
        tracing::debug!(job_id, "work request queued");

        let outcome = outcome_rx
            .await
            .map_err(|_| ServerError::Other("worker pool shut down".to_string()))??;

        let mut response = json!({
            "work": format!("{:016X}", outcome.work),
            "difficulty": outcome.difficulty.to_string(),
            "multiplier": outcome.multiplier,
        });
        if outcome.mock {
            response["testing"] = json!(true);
        }
        Ok(response)
    }

    fn validate(&self, request: &CommandRequest) -> Result<serde_json::Value, ServerError> {
        let root_hash = required_hash(request, "work_validate")?;
        let work = request
            .work
            .as_deref()
            .ok_or(ServerError::MissingField {
                action: "work_validate",
                field: "work",
            })
            .and_then(|hex| U128::from_hex(hex).map_err(ServerError::from))?;
        let difficulty = self.requested_difficulty(request)?;
        let base = self.config.work.base_difficulty;

        let nonce = work.low_u64();
        let valid = validate_work(&root_hash, nonce, difficulty);
        let achieved = U128::from_u64(achieved_difficulty(work_value(&root_hash, nonce)));

        Ok(json!({
            "valid": if valid { "1" } else { "0" },
            "difficulty": achieved.to_string(),
            "multiplier": to_multiplier(achieved, base),
        }))
    }

    fn cancel(&self, request: &CommandRequest) -> Result<serde_json::Value, ServerError> {
        let root_hash = required_hash(request, "work_cancel")?;
        if self.scheduler.cancel(&root_hash) {
            tracing::info!(root = %root_hash, "cancelled queued work request");
            Ok(json!({ "status": "cancelled" }))
        } else {
            Err(ServerError::NotFound)
        }
    }

    /// The normalized difficulty of a request: the configured base unless
    /// a difficulty is supplied, and a strictly positive multiplier
    /// overrides both.
    fn requested_difficulty(&self, request: &CommandRequest) -> Result<U128, ServerError> {
        let base = self.config.work.base_difficulty;
        let mut difficulty = match request.difficulty.as_deref() {
            Some(hex) => U128::from_hex(hex)?,
            None => base,
        };
        if let Some(multiplier) = request.multiplier {
            if multiplier > 0.0 {
                difficulty = from_multiplier(multiplier, base);
            }
        }
        Ok(difficulty)
    }
}

fn required_hash(request: &CommandRequest, action: &'static str) -> Result<U256, ServerError> {
    request
        .hash
        .as_deref()
        .ok_or(ServerError::MissingField {
            action,
            field: "hash",
        })
        .and_then(|hex| U256::from_hex(hex).map_err(ServerError::from))
}

fn attach_correlation_id(id: &Option<String>, response: &mut serde_json::Value) {
    if let Some(id) = id {
        response["id"] = json!(id);
    }
}

fn error_response(id: Option<&str>, message: &str) -> String {
    let mut response = json!({ "error": message });
    if let Some(id) = id {
        response["id"] = json!(id);
    }
    response.to_string()
}

fn job_json(job: &crate::job::Job) -> serde_json::Value {
    json!({
        "id": job.id(),
        "priority": job.priority(),
        "start": job.start_ms(),
        "end": job.end_ms(),
        "request": {
            "hash": job.request.root_hash.to_hex(),
            "difficulty": job.request.difficulty.to_string(),
            "multiplier": job.request.multiplier,
        },
        "result": {
            "work": format!("{:016X}", job.result.work.low_u64()),
            "difficulty": job.result.difficulty.to_string(),
            "multiplier": job.result.multiplier,
        },
    })
}
