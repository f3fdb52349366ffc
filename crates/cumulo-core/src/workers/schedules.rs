// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schedule worker table and cron engine.
//!
//! Each active schedule owns a ticking task that synthesizes an interval
//! trigger and dispatches it through the same path a manual HTTP trigger
//! takes. Rate cadences run on a plain interval (`days` units are rewritten
//! to hours because the interval engine has no day granularity); cron
//! cadences sleep until each next occurrence computed by `croner`.
//!
//! Schedule names are global: a second service registering an existing name
//! is a hard conflict, rejected with a descriptive message while the first
//! registrant keeps the schedule.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use croner::Cron;
use cumulo_protocol::messages::{
    ScheduleSpec, ScheduleTrigger, TriggerRequest, schedule_spec, trigger_request,
};
use cumulo_protocol::stream::PeekableStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::bus::TableSnapshot;
use crate::dispatch::{WorkerChannel, expect_ack};
use crate::error::{CoreError, ProjectErrors};
use crate::workers::{Worker, WorkerTable, reject_registration};

/// A schedule cadence compiled into something the engine can tick on.
pub enum CompiledCadence {
    /// Fixed interval with its normalized rate string (e.g. `"24 hours"`).
    Interval {
        /// Normalized rate expression.
        every: String,
        /// Tick period.
        period: Duration,
    },
    /// Parsed cron expression, kept alongside its source text for logs.
    Cron {
        /// The expression as registered.
        expression: String,
        /// The compiled schedule.
        cron: Box<Cron>,
    },
}

impl CompiledCadence {
    /// Short human-readable form for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Interval { every, .. } => format!("every {}", every),
            Self::Cron { expression, .. } => format!("cron {}", expression),
        }
    }
}

/// Compile a registered cadence.
pub fn compile_cadence(
    schedule: &str,
    cadence: Option<&schedule_spec::Cadence>,
) -> Result<CompiledCadence, CoreError> {
    match cadence {
        Some(schedule_spec::Cadence::Rate(rate)) => {
            let (every, period) = parse_rate(rate).map_err(|reason| CoreError::InvalidCadence {
                schedule: schedule.to_string(),
                cadence: rate.clone(),
                reason,
            })?;
            Ok(CompiledCadence::Interval { every, period })
        }
        Some(schedule_spec::Cadence::Cron(expression)) => {
            let cron = Cron::new(expression)
                .parse()
                .map_err(|e| CoreError::InvalidCadence {
                    schedule: schedule.to_string(),
                    cadence: expression.clone(),
                    reason: e.to_string(),
                })?;
            Ok(CompiledCadence::Cron {
                expression: expression.clone(),
                cron: Box::new(cron),
            })
        }
        None => Err(CoreError::InvalidCadence {
            schedule: schedule.to_string(),
            cadence: String::new(),
            reason: "no cadence supplied".to_string(),
        }),
    }
}

/// Parse a rate expression like `"5 minutes"`, `"every 5 minutes"`, or
/// `"1 days"` into its normalized form and tick period.
///
/// `days` rewrites to hours: the interval engine has no day granularity,
/// and `"1 days"` means "once per 24-hour interval", not "daily at a fixed
/// wall-clock time".
pub fn parse_rate(rate: &str) -> Result<(String, Duration), String> {
    let trimmed = rate.trim();
    let without_prefix = trimmed.strip_prefix("every ").unwrap_or(trimmed);

    let mut parts = without_prefix.split_whitespace();
    let count: u64 = parts
        .next()
        .ok_or_else(|| "empty rate expression".to_string())?
        .parse()
        .map_err(|_| format!("'{}' is not a number", without_prefix))?;
    let unit = parts
        .next()
        .ok_or_else(|| "rate is missing a unit".to_string())?;
    if parts.next().is_some() {
        return Err(format!("trailing input in rate '{}'", without_prefix));
    }
    if count == 0 {
        return Err("rate must be positive".to_string());
    }

    let (count, unit, seconds_per_unit) = match unit {
        "second" | "seconds" => (count, "seconds", 1),
        "minute" | "minutes" => (count, "minutes", 60),
        "hour" | "hours" => (count, "hours", 3_600),
        "day" | "days" => (count * 24, "hours", 3_600),
        other => return Err(format!("unknown rate unit '{}'", other)),
    };

    Ok((
        format!("{} {}", count, unit),
        Duration::from_secs(count * seconds_per_unit),
    ))
}

/// Worker table for schedules, plus the cron tasks they own.
pub struct ScheduleTable {
    table: WorkerTable<ScheduleSpec>,
    errors: Arc<ProjectErrors>,
    cron_tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl ScheduleTable {
    /// Create an empty table; conflicts are recorded in `errors`.
    pub fn new(errors: Arc<ProjectErrors>) -> Self {
        Self {
            table: WorkerTable::new("schedule"),
            errors,
            cron_tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a schedule unless a different service already owns the name.
    /// The same service re-registering (a restarted worker) is fine.
    pub fn try_register(&self, worker: Worker<ScheduleSpec>) -> Result<(), CoreError> {
        let schedule = worker.spec.schedule.clone();
        let existing = self.table.workers_for(&schedule);
        if let Some(current) = existing.iter().find(|w| w.service != worker.service) {
            let conflict = CoreError::ScheduleConflict {
                schedule,
                existing_service: current.service.clone(),
                service: worker.service.clone(),
            };
            self.errors.record(conflict.clone());
            return Err(conflict);
        }
        self.table.register(&schedule, worker);
        Ok(())
    }

    /// Remove a worker and synchronously stop its cron task.
    pub fn unregister(&self, schedule: &str, service: &str, worker_id: Uuid) {
        if let Some(handle) = self
            .cron_tasks
            .lock()
            .expect("cron task lock poisoned")
            .remove(&worker_id)
        {
            handle.abort();
            debug!(schedule, worker = %worker_id, "cron task stopped");
        }
        self.table.unregister(schedule, service, worker_id);
    }

    fn attach_cron_task(&self, worker_id: Uuid, handle: JoinHandle<()>) {
        self.cron_tasks
            .lock()
            .expect("cron task lock poisoned")
            .insert(worker_id, handle);
    }

    /// Current workers for a schedule.
    pub fn workers_for(&self, schedule: &str) -> Vec<Worker<ScheduleSpec>> {
        self.table.workers_for(schedule)
    }

    /// Sorted, deduplicated schedule names currently registered.
    pub fn resource_names(&self) -> Vec<String> {
        self.table.resource_names()
    }

    /// Defensive copy of the current state.
    pub fn snapshot(&self) -> TableSnapshot<ScheduleSpec> {
        self.table.snapshot()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot<ScheduleSpec>> {
        self.table.subscribe()
    }
}

/// Dispatch one interval trigger to a schedule worker. Both the cron engine
/// and the manual HTTP trigger go through here.
pub async fn fire_schedule(channel: &dyn WorkerChannel, schedule: &str) -> Result<()> {
    expect_ack(
        channel,
        TriggerRequest {
            trigger: Some(trigger_request::Trigger::Schedule(ScheduleTrigger {
                schedule: schedule.to_string(),
            })),
        },
    )
    .await
}

/// Serve a schedule registration stream for its whole lifetime.
pub async fn serve_schedule_worker<T>(
    schedules: Arc<ScheduleTable>,
    service: String,
    spec: ScheduleSpec,
    channel: Arc<dyn WorkerChannel>,
    stream: PeekableStream<T>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let compiled = match compile_cadence(&spec.schedule, spec.cadence.as_ref()) {
        Ok(compiled) => compiled,
        Err(invalid) => {
            schedules.errors.record(invalid.clone());
            return reject_registration("schedule", stream, &invalid).await;
        }
    };

    let worker = Worker::new(service, spec, channel);
    let schedule = worker.spec.schedule.clone();
    let service = worker.service.clone();
    let worker_id = worker.id;

    match schedules.try_register(worker.clone()) {
        Ok(()) => {
            info!(
                schedule = %schedule,
                cadence = %compiled.describe(),
                "schedule activated"
            );
            let task_schedule = schedule.clone();
            let handle =
                tokio::spawn(
                    async move { run_schedule_loop(task_schedule, worker, compiled).await },
                );
            schedules.attach_cron_task(worker_id, handle);

            super::acknowledge_and_hold("schedule", stream, || {
                schedules.unregister(&schedule, &service, worker_id)
            })
            .await
        }
        Err(conflict) => reject_registration("schedule", stream, &conflict).await,
    }
}

/// Tick loop for one active schedule entry.
async fn run_schedule_loop(
    schedule: String,
    worker: Worker<ScheduleSpec>,
    compiled: CompiledCadence,
) {
    loop {
        match &compiled {
            CompiledCadence::Interval { period, .. } => {
                tokio::time::sleep(*period).await;
            }
            CompiledCadence::Cron { cron, .. } => {
                let now = Utc::now();
                let next = match cron.find_next_occurrence(&now, false) {
                    Ok(next) => next,
                    Err(e) => {
                        error!(schedule = %schedule, "no next cron occurrence: {}", e);
                        return;
                    }
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
            }
        }

        debug!(schedule = %schedule, "schedule tick");
        if let Err(e) = fire_schedule(worker.channel.as_ref(), &schedule).await {
            error!(schedule = %schedule, "schedule dispatch failed: {}", e);
        }
    }
}
