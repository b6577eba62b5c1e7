//! One report load: fetch, normalize, publish.
//!
//! Each load takes a fresh generation number. A result is published only if
//! its generation is still the newest when it completes, so a manual retry
//! makes any earlier in-flight load's result stale.

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::Policy;
use crate::fetch::{AuditSource, FetchError, ReportQuery};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::model::AuditViewModel;
use crate::normalize::normalize;

#[derive(Debug, Clone, PartialEq)]
pub enum ReportState {
    Idle,
    Loading { generation: u64 },
    Ready { generation: u64, model: Arc<AuditViewModel> },
    Failed { generation: u64, message: String },
}

#[derive(Debug)]
pub enum LoadOutcome {
    Published(Arc<AuditViewModel>),
    Failed(FetchError),
    /// A newer load started before this one finished; its result was dropped.
    Superseded { generation: u64, current: u64 },
}

pub struct ReportSession<S> {
    source: S,
    policy: Policy,
    generation: AtomicU64,
    state: Mutex<ReportState>,
}

impl<S: AuditSource + Send + Sync> ReportSession<S> {
    pub fn new(source: S, policy: Policy) -> Self {
        Self {
            source,
            policy,
            generation: AtomicU64::new(0),
            state: Mutex::new(ReportState::Idle),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> ReportState {
        self.lock_state().clone()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn load(&self, query: &ReportQuery) -> LoadOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.lock_state();
            if self.current_generation() == generation {
                *state = ReportState::Loading { generation };
            }
        }
        log(
            Level::Info,
            Domain::Session,
            "load_start",
            obj(&[
                ("generation", json!(generation)),
                ("client", query.client.as_deref().map(v_str).unwrap_or_default()),
                ("row", query.row.as_deref().map(v_str).unwrap_or_default()),
            ]),
        );

        let result = self
            .source
            .fetch(query)
            .await
            .map(|raw| Arc::new(normalize(&raw, &self.policy)));

        // check and publish under one lock so a newer load cannot interleave
        let mut state = self.lock_state();
        let current = self.current_generation();
        if current != generation {
            log(
                Level::Warn,
                Domain::Session,
                "stale_result",
                obj(&[("generation", json!(generation)), ("current", json!(current))]),
            );
            return LoadOutcome::Superseded {
                generation,
                current,
            };
        }

        match result {
            Ok(model) => {
                log(
                    Level::Info,
                    Domain::Session,
                    "published",
                    obj(&[
                        ("generation", json!(generation)),
                        ("company", v_str(&model.company_name)),
                        ("fingerprint", v_str(&model.fingerprint())),
                    ]),
                );
                *state = ReportState::Ready {
                    generation,
                    model: Arc::clone(&model),
                };
                LoadOutcome::Published(model)
            }
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Session,
                    "load_failed",
                    obj(&[
                        ("generation", json!(generation)),
                        ("kind", v_str(err.kind())),
                        ("msg", v_str(&err.to_string())),
                    ]),
                );
                *state = ReportState::Failed {
                    generation,
                    message: err.to_string(),
                };
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Manual retry: a full new load. Nothing is retried automatically.
    pub async fn retry(&self, query: &ReportQuery) -> LoadOutcome {
        self.load(query).await
    }

    fn lock_state(&self) -> MutexGuard<'_, ReportState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
