//! One-time side effects of a completed job.
//!
//! A [`CompletionRecord`] is derived from the final snapshot and queued to an
//! audit worker task over an mpsc channel. The orchestrator never waits on the
//! sink: the caller gets an [`AuditTicket`] it may await, and every outcome is
//! logged and counted in [`AuditStats`] whether or not anyone awaits it.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::collaborators::AuditSink;
use crate::error::{AuditError, ValidationError};
use crate::state_machine::{CompletionRecord, JobHandle, JobSnapshot, ValidationClass};

/// Characters treated as markup and removed from the synopsis.
const MARKUP: &[char] = &['#', '*', '_', '`', '>', '|', '~', '[', ']'];

const ELLIPSIS: &str = "...";

/// Size limits of the synopsis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynopsisBudget {
    pub lines: usize,
    pub words: usize,
}

impl Default for SynopsisBudget {
    fn default() -> Self {
        Self { lines: 5, words: 60 }
    }
}

/// Condense a stage result into a short plain-text synopsis.
///
/// Takes the first `budget.lines` lines that are non-empty once markup is
/// stripped, collapses whitespace, and cuts at `budget.words` words with a
/// trailing `...` when anything was dropped.
pub fn synopsis(text: &str, budget: SynopsisBudget) -> String {
    let kept: Vec<String> = text
        .lines()
        .map(strip_markup)
        .filter(|line| !line.is_empty())
        .take(budget.lines)
        .collect();

    let words: Vec<&str> = kept.iter().flat_map(|l| l.split_whitespace()).collect();
    if words.len() > budget.words {
        format!("{}{ELLIPSIS}", words[..budget.words].join(" "))
    } else {
        words.join(" ")
    }
}

fn strip_markup(line: &str) -> String {
    let cleaned: String = line.chars().filter(|c| !MARKUP.contains(c)).collect();
    // List bullets and rule lines ("- item", "---", "===").
    cleaned
        .trim()
        .trim_start_matches(['-', '+', '='])
        .trim()
        .to_string()
}

const REJECTION: &[&str] = &["reject", "rejected"];

const ADJUSTMENT: &[&str] = &["adjusted"];

/// Classify the final audit stage by keyword precedence:
/// rejection beats adjustment, which beats the default `Validated`.
///
/// Keywords match whole words only, so "no adjustments required" stays
/// `Validated`.
pub fn classify(text: &str) -> ValidationClass {
    let lower = text.to_lowercase();
    if mentions(&lower, REJECTION) {
        ValidationClass::Rejected
    } else if mentions(&lower, ADJUSTMENT) {
        ValidationClass::AdjustedAndValidated
    } else {
        ValidationClass::Validated
    }
}

fn mentions(text: &str, keywords: &[&str]) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| keywords.iter().any(|k| *k == word))
}

/// Build the record for a completed job.
///
/// The synopsis comes from stage 1; the classification from the last stage
/// that produced a result.
pub fn derive_record(
    handle: &JobHandle,
    snapshot: &JobSnapshot,
    identity: String,
    subject: String,
    budget: SynopsisBudget,
) -> CompletionRecord {
    let synopsis = snapshot
        .result_of(1)
        .map(|text| synopsis(text, budget))
        .unwrap_or_default();
    let classification = snapshot
        .last_result()
        .map(|r| classify(&r.result))
        .unwrap_or(ValidationClass::Validated);

    CompletionRecord {
        handle: handle.clone(),
        identity,
        subject,
        synopsis,
        classification,
        created_at: Utc::now(),
    }
}

/// Delivery counters of the audit worker.
#[derive(Debug, Default)]
pub struct AuditStats {
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl AuditStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Observable outcome of one queued completion record.
#[derive(Debug)]
pub struct AuditTicket {
    handle: JobHandle,
    outcome: oneshot::Receiver<Result<(), AuditError>>,
}

impl AuditTicket {
    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// Wait for the sink's answer.
    pub async fn outcome(self) -> Result<(), AuditError> {
        self.outcome.await.unwrap_or(Err(AuditError::WorkerGone))
    }
}

struct AuditTask {
    record: CompletionRecord,
    reply: oneshot::Sender<Result<(), AuditError>>,
}

/// Queue of completion records with a per-handle exactly-once guard.
///
/// Recorded handles are kept for the lifetime of the orchestrator, one entry
/// per completed job, and survive `reset` so a discarded job can never be
/// recorded twice.
pub struct CompletionSideEffects {
    queue: mpsc::UnboundedSender<AuditTask>,
    recorded: HashSet<JobHandle>,
    stats: Arc<AuditStats>,
}

impl CompletionSideEffects {
    /// Spawn the audit worker on the current tokio runtime.
    pub fn spawn<A: AuditSink>(sink: A) -> Self {
        let (queue, mut tasks) = mpsc::unbounded_channel::<AuditTask>();
        let stats = Arc::new(AuditStats::default());
        let worker_stats = stats.clone();

        tokio::spawn(async move {
            while let Some(task) = tasks.recv().await {
                let result = sink.record(&task.record).await;
                match &result {
                    Ok(()) => {
                        worker_stats.delivered.fetch_add(1, Ordering::Relaxed);
                        info!(
                            job = %task.record.handle,
                            classification = %task.record.classification,
                            "Completion record delivered"
                        );
                    }
                    Err(err) => {
                        worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(job = %task.record.handle, error = %err, "Completion record not delivered");
                    }
                }
                // Nobody may be waiting on the ticket.
                let _ = task.reply.send(result);
            }
        });

        Self {
            queue,
            recorded: HashSet::new(),
            stats,
        }
    }

    pub fn is_recorded(&self, handle: &JobHandle) -> bool {
        self.recorded.contains(handle)
    }

    pub fn stats(&self) -> Arc<AuditStats> {
        self.stats.clone()
    }

    /// Queue `record` unless one was already queued for its handle.
    pub fn submit(&mut self, record: CompletionRecord) -> Result<AuditTicket, ValidationError> {
        let handle = record.handle.clone();
        if !self.recorded.insert(handle.clone()) {
            return Err(ValidationError::AlreadyRecorded(handle.to_string()));
        }

        let (reply, outcome) = oneshot::channel();
        if self.queue.send(AuditTask { record, reply }).is_err() {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(job = %handle, "Audit worker stopped; completion record dropped");
        }
        Ok(AuditTicket { handle, outcome })
    }
}
