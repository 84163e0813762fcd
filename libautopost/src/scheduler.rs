//! Background posting scheduler
//!
//! A [`Scheduler`] is stopped or running. Starting it spawns one loop that
//! wakes every [`POLL_INTERVAL`], fires any configured time of day that has
//! passed since the previous wake, and exits on the first wake after
//! [`Scheduler::stop`]. Stopping is therefore best-effort within one poll
//! interval, and a cycle already in progress always runs to completion.
//!
//! Operator-facing progress goes to an [`ActivityLog`] ring buffer, which the
//! control surface exposes; every line is mirrored to `tracing`.

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDateTime, NaiveTime};
use rand::Rng;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ScheduleConfig;
use crate::credentials::Redactor;
use crate::error::Result;

/// How often the loop checks for due triggers and the stop flag
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Lines kept in the activity log
pub const LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Skip,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    /// Local time, `%H:%M:%S`
    pub time: String,
    pub level: LogLevel,
    pub message: String,
}

/// Shared ring buffer of operator-facing log lines
///
/// Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    lines: Arc<Mutex<VecDeque<LogLine>>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success | LogLevel::Skip => {
                info!(target: "autopost::activity", kind = ?level, "{}", message)
            }
            LogLevel::Warning => warn!(target: "autopost::activity", "{}", message),
            LogLevel::Error => error!(target: "autopost::activity", "{}", message),
        }

        let mut lines = self.lock();
        lines.push_back(LogLine {
            time: Local::now().format("%H:%M:%S").to_string(),
            level,
            message,
        });
        while lines.len() > self.capacity {
            lines.pop_front();
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(LogLevel::Success, message);
    }

    pub fn skip(&self, message: impl Into<String>) {
        self.push(LogLevel::Skip, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    /// The newest `count` lines, oldest first
    pub fn recent(&self, count: usize) -> Vec<LogLine> {
        let lines = self.lock();
        let start = lines.len().saturating_sub(count);
        lines.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LogLine>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Triggers and guards derived from the schedule configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePlan {
    pub times: Vec<NaiveTime>,
    pub jitter_minutes: u32,
    /// Monday = 0 ... Sunday = 6; empty means every day
    pub active_days: Vec<u8>,
}

impl SchedulePlan {
    /// Build a plan, dropping (and logging) times that are not `HH:MM`
    pub fn from_config(config: &ScheduleConfig) -> Self {
        let times = config
            .fixed_times
            .iter()
            .filter_map(|raw| match NaiveTime::parse_from_str(raw.trim(), "%H:%M") {
                Ok(time) => Some(time),
                Err(_) => {
                    warn!("Ignoring invalid schedule time: {:?}", raw);
                    None
                }
            })
            .collect();
        Self {
            times,
            jitter_minutes: config.jitter_minutes,
            active_days: config.active_days.clone(),
        }
    }

    /// Trigger times in `(after, until]`
    pub fn due_between(&self, after: NaiveDateTime, until: NaiveDateTime) -> Vec<NaiveDateTime> {
        let mut due = Vec::new();
        let mut date = after.date();
        while date <= until.date() {
            for time in &self.times {
                let at = date.and_time(*time);
                if at > after && at <= until {
                    due.push(at);
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        due.sort();
        due
    }

    pub fn is_active_day(&self, at: NaiveDateTime) -> bool {
        let weekday = at.weekday().num_days_from_monday() as u8;
        self.active_days.is_empty() || self.active_days.contains(&weekday)
    }

    /// Uniform delay in `[0, jitter_minutes * 60]` whole seconds
    pub fn jitter_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.jitter_minutes == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(rng.gen_range(0..=u64::from(self.jitter_minutes) * 60))
    }
}

/// One scheduled posting cycle
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self, log: &ActivityLog) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub logs: Vec<LogLine>,
    /// Local time of the loop's last wake, `%Y-%m-%d %H:%M:%S`
    pub last_tick: Option<String>,
}

/// Owned scheduler state; several independent schedulers may coexist
#[derive(Clone)]
pub struct Scheduler {
    running: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    last_tick: Arc<Mutex<Option<NaiveDateTime>>>,
    log: ActivityLog,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(log: ActivityLog) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            last_tick: Arc::new(Mutex::new(None)),
            log,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Running flag plus the newest `log_count` log lines
    pub fn status(&self, log_count: usize) -> SchedulerStatus {
        let last_tick = self
            .last_tick
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        SchedulerStatus {
            running: self.is_running(),
            logs: self.log.recent(log_count),
            last_tick,
        }
    }

    /// Spawn the loop unless one is already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        plan: SchedulePlan,
        runner: Arc<dyn CycleRunner>,
        redactor: Redactor,
    ) -> StartOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return StartOutcome::AlreadyRunning;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let times: Vec<String> = plan.times.iter().map(|t| t.format("%H:%M").to_string()).collect();
        self.log
            .info(format!("Scheduler started (times: {})", times.join(", ")));

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop(generation, plan, runner, redactor).await;
        });
        StartOutcome::Started
    }

    /// Ask the loop to exit at its next wake
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            self.log.info("Scheduler stopped");
        }
        was_running
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_loop(
        &self,
        generation: u64,
        plan: SchedulePlan,
        runner: Arc<dyn CycleRunner>,
        redactor: Redactor,
    ) {
        let mut last = Local::now().naive_local();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if !self.is_current(generation) {
                debug!("Scheduler loop {} exiting", generation);
                break;
            }

            let now = Local::now().naive_local();
            *self
                .last_tick
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(now);

            for at in plan.due_between(last, now) {
                fire(&plan, at, runner.as_ref(), &self.log, &redactor).await;
            }
            last = now;
        }
    }
}

/// Run one trigger: rest-day guard, jitter, then the cycle
///
/// Errors from the cycle are logged (redacted) and swallowed.
pub async fn fire(
    plan: &SchedulePlan,
    at: NaiveDateTime,
    runner: &dyn CycleRunner,
    log: &ActivityLog,
    redactor: &Redactor,
) {
    if !plan.is_active_day(at) {
        log.skip(format!("{} is a rest day, skipping", at.format("%A")));
        return;
    }

    let delay = plan.jitter_delay(&mut rand::thread_rng());
    if !delay.is_zero() {
        let secs = delay.as_secs();
        log.info(format!("Jitter delay: {}m{}s", secs / 60, secs % 60));
        tokio::time::sleep(delay).await;
    }

    if let Err(e) = runner.run_cycle(log).await {
        log.error(format!("Post failed: {}", redactor.redact(&e.to_string())));
    }
}
