//! The scheduler: fires scoring jobs on their cron schedules.
//!
//! RULES:
//!   - Jobs fire in registration order whenever several are due at once.
//!   - Firings are strictly sequential; a job never overlaps itself.
//!   - Missed occurrences collapse into one firing flagged past-due.
//!   - A failed run is logged and retried at the next occurrence.

use crate::{
    clock::{JobClock, TimerInfo},
    config::ConnectionSettings,
    error::ScoringResult,
    job::{RunOutcome, ScoringJob},
    sink::EventSink,
};
use chrono::{DateTime, Utc};
use std::time::Duration;

pub struct Scheduler {
    db: ConnectionSettings,
    sink: Option<Box<dyn EventSink>>,
    jobs: Vec<(ScoringJob, JobClock)>,
}

impl Scheduler {
    pub fn new(db: ConnectionSettings, sink: Option<Box<dyn EventSink>>) -> Self {
        Self { db, sink, jobs: Vec::new() }
    }

    /// Register a job and arm its first occurrence after `now`.
    pub fn register(&mut self, job: ScoringJob, now: DateTime<Utc>) -> ScoringResult<()> {
        let clock = JobClock::parse(&job.config().schedule, now)?;
        log::info!(
            "registered {} on '{}' (next run {:?})",
            job.name(),
            job.config().schedule,
            clock.next_fire()
        );
        self.jobs.push((job, clock));
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|(job, _)| job.name()).collect()
    }

    /// Earliest pending occurrence across all jobs.
    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.jobs.iter().filter_map(|(_, clock)| clock.next_fire()).min()
    }

    /// Run every job whose occurrence is due at `now`.
    pub fn run_due(&mut self, now: DateTime<Utc>) -> Vec<(String, RunOutcome)> {
        let sink = self.sink.as_deref();
        let mut outcomes = Vec::new();
        for (job, clock) in &mut self.jobs {
            let Some(timer) = clock.fire(now) else {
                continue;
            };
            log::debug!("{}: firing (scheduled {})", job.name(), timer.scheduled_for);
            outcomes.push((job.name().to_string(), job.run(&self.db, sink, &timer)));
        }
        outcomes
    }

    /// Run every job once, immediately, ignoring schedules.
    pub fn run_all_now(&self) -> Vec<(String, RunOutcome)> {
        let sink = self.sink.as_deref();
        let timer = TimerInfo::immediate(Utc::now());
        self.jobs
            .iter()
            .map(|(job, _)| (job.name().to_string(), job.run(&self.db, sink, &timer)))
            .collect()
    }

    /// Block forever, sleeping until the next occurrence.
    pub fn run_forever(&mut self) -> ScoringResult<()> {
        if self.jobs.is_empty() {
            log::warn!("no jobs registered, scheduler exiting");
            return Ok(());
        }
        loop {
            let Some(next) = self.next_wakeup() else {
                log::warn!("no further occurrences scheduled, scheduler exiting");
                return Ok(());
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
            for (name, outcome) in self.run_due(Utc::now()) {
                if let RunOutcome::Failed(reason) = outcome {
                    log::warn!("{name}: run failed, will retry next occurrence: {reason}");
                }
            }
        }
    }
}
