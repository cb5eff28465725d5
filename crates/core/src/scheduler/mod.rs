//! Weekly scheduled trigger.
//!
//! Fires a full scheduled run at a fixed weekday and time. A tick that finds
//! the coordinator busy is logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::coordinator::RunCoordinator;
use crate::runlog::{RunMode, TriggerKind};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid schedule time {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    #[error("invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),
}

/// A weekday and time in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    day: Weekday,
    time: NaiveTime,
    offset: FixedOffset,
}

impl WeeklySchedule {
    pub fn new(
        day: Weekday,
        hour: u32,
        minute: u32,
        utc_offset_minutes: i32,
    ) -> Result<Self, SchedulerError> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or(SchedulerError::InvalidTime { hour, minute })?;
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or(SchedulerError::InvalidOffset(utc_offset_minutes))?;
        Ok(Self { day, time, offset })
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::new(
            config.day,
            config.hour,
            config.minute,
            config.utc_offset_minutes,
        )
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let days_ahead = (i64::from(self.day.num_days_from_monday())
            - i64::from(local.weekday().num_days_from_monday()))
        .rem_euclid(7);

        let date = local.date_naive() + chrono::Duration::days(days_ahead);
        let local_fire = date.and_time(self.time);
        let utc_fire = local_fire - chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()));
        let candidate = DateTime::<Utc>::from_naive_utc_and_offset(utc_fire, Utc);

        if candidate > now {
            candidate
        } else {
            candidate + chrono::Duration::days(7)
        }
    }
}

/// Background task that triggers scheduled runs.
pub struct Scheduler {
    enabled: bool,
    description: String,
    schedule: WeeklySchedule,
    coordinator: Arc<RunCoordinator>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(
        config: &SchedulerConfig,
        coordinator: Arc<RunCoordinator>,
    ) -> Result<Self, SchedulerError> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            enabled: config.enabled,
            description: config.describe(),
            schedule: WeeklySchedule::from_config(config)?,
            coordinator,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        })
    }

    /// Trigger one scheduled run. Returns the run id if it was accepted.
    pub async fn fire(&self) -> Option<String> {
        fire(&self.coordinator).await
    }

    /// Spawn the timer loop. Does nothing when the schedule is disabled.
    pub fn start(&self) {
        if !self.enabled {
            info!("Scheduler disabled");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        let schedule = self.schedule;
        let coordinator = Arc::clone(&self.coordinator);
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!(schedule = %self.description, "Scheduler started");

        tokio::spawn(async move {
            let mut last_tick = Utc::now();
            loop {
                let next = schedule.next_after(last_tick);
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                info!(next = %next, "Next scheduled run");

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {
                        last_tick = next;
                        fire(&coordinator).await;
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
            info!("Scheduler stopped");
        });
    }

    pub fn stop(&self) {
        if self.running.load(Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Human readable schedule.
    pub fn description(&self) -> &str {
        &self.description
    }
}

async fn fire(coordinator: &RunCoordinator) -> Option<String> {
    match coordinator
        .trigger(TriggerKind::Scheduled, RunMode::Full)
        .await
    {
        Ok(run_id) => {
            info!(run_id = %run_id, "Scheduled run triggered");
            Some(run_id)
        }
        Err(e) => {
            warn!(error = %e, "Scheduled run skipped");
            None
        }
    }
}
