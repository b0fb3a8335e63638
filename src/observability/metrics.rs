//! Thread-safe metrics collection
//!
//! Atomic counters for task runs, payouts and notifications, plus
//! mutex-protected per-tool statistics.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

const MAX_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    tasks_created: AtomicU64,
    tasks_started: AtomicU64,
    tasks_running: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    run_times: Mutex<Vec<u64>>,

    tool_stats: Mutex<HashMap<String, ToolExecutionStats>>,

    payouts_sent: AtomicU64,
    payouts_failed: AtomicU64,
    payouts_skipped: AtomicU64,

    notifications_sent: AtomicU64,
    notifications_skipped: AtomicU64,
    notifications_failed: AtomicU64,

    uptime_start: AtomicU64,
    healthy: AtomicBool,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_created: AtomicU64::new(0),
            tasks_started: AtomicU64::new(0),
            tasks_running: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            run_times: Mutex::new(Vec::new()),
            tool_stats: Mutex::new(HashMap::new()),
            payouts_sent: AtomicU64::new(0),
            payouts_failed: AtomicU64::new(0),
            payouts_skipped: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_skipped: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
            healthy: AtomicBool::new(true),
        }
    }

    // Task metrics
    pub fn task_created(&self) {
        self.tasks_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_run_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
        self.tasks_running.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_run_completed(&self, duration: Duration) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.finish_run(duration);
    }

    pub fn task_run_failed(&self, duration: Duration) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        self.finish_run(duration);
    }

    fn finish_run(&self, duration: Duration) {
        let _ = self
            .tasks_running
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        if let Ok(mut times) = self.run_times.lock() {
            push_bounded(&mut times, duration.as_millis() as u64);
        }
    }

    // Tool metrics
    pub fn tool_executed(&self, tool_name: &str, duration: Duration, success: bool) {
        if let Ok(mut stats) = self.tool_stats.lock() {
            let entry = stats
                .entry(tool_name.to_string())
                .or_insert_with(|| ToolExecutionStats {
                    name: tool_name.to_string(),
                    ..Default::default()
                });
            entry.executions += 1;
            entry.last_execution = current_timestamp();
            push_bounded(&mut entry.execution_times, duration.as_millis() as u64);
            if !success {
                entry.failures += 1;
            }
        }
    }

    // Payout metrics
    pub fn payout_sent(&self) {
        self.payouts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payout_failed(&self) {
        self.payouts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payout_skipped(&self) {
        self.payouts_skipped.fetch_add(1, Ordering::Relaxed);
    }

    // Notification metrics
    pub fn notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notification_skipped(&self) {
        self.notifications_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notification_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_health_status(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.tasks_created,
            &self.tasks_started,
            &self.tasks_running,
            &self.tasks_completed,
            &self.tasks_failed,
            &self.payouts_sent,
            &self.payouts_failed,
            &self.payouts_skipped,
            &self.notifications_sent,
            &self.notifications_skipped,
            &self.notifications_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut times) = self.run_times.lock() {
            times.clear();
        }
        if let Ok(mut stats) = self.tool_stats.lock() {
            stats.clear();
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        self.healthy.store(true, Ordering::Relaxed);
    }

    fn task_metrics(&self) -> TaskMetrics {
        let mut sorted = self
            .run_times
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();
        sorted.sort_unstable();
        let avg = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<u64>() as f64 / sorted.len() as f64
        };

        TaskMetrics {
            tasks_created: self.tasks_created.load(Ordering::Relaxed),
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_running: self.tasks_running.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            avg_run_time_ms: avg,
            run_time_p50_ms: percentile(&sorted, 50.0),
            run_time_p95_ms: percentile(&sorted, 95.0),
        }
    }

    fn tool_metrics(&self) -> ToolMetrics {
        let Ok(stats) = self.tool_stats.lock() else {
            return ToolMetrics::default();
        };
        let mut metrics = ToolMetrics::default();
        for (name, stats) in stats.iter() {
            metrics.total_executions += stats.executions;
            metrics.total_failures += stats.failures;
            metrics.tool_stats.insert(name.clone(), stats.snapshot());
        }
        metrics
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        MetricsSnapshot {
            tasks: self.task_metrics(),
            tools: self.tool_metrics(),
            payouts: PayoutMetrics {
                sent: self.payouts_sent.load(Ordering::Relaxed),
                failed: self.payouts_failed.load(Ordering::Relaxed),
                skipped: self.payouts_skipped.load(Ordering::Relaxed),
            },
            notifications: NotificationMetrics {
                sent: self.notifications_sent.load(Ordering::Relaxed),
                skipped: self.notifications_skipped.load(Ordering::Relaxed),
                failed: self.notifications_failed.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            healthy: self.healthy.load(Ordering::Relaxed),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct ToolExecutionStats {
    name: String,
    executions: u64,
    failures: u64,
    execution_times: Vec<u64>,
    last_execution: u64,
}

impl ToolExecutionStats {
    fn snapshot(&self) -> ToolExecutionStatsSnapshot {
        let avg_execution_time_ms = if self.execution_times.is_empty() {
            0.0
        } else {
            self.execution_times.iter().sum::<u64>() as f64 / self.execution_times.len() as f64
        };
        let success_rate = if self.executions == 0 {
            0.0
        } else {
            (self.executions - self.failures) as f64 / self.executions as f64
        };
        ToolExecutionStatsSnapshot {
            name: self.name.clone(),
            executions: self.executions,
            failures: self.failures,
            avg_execution_time_ms,
            last_execution: self.last_execution,
            success_rate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub tasks: TaskMetrics,
    pub tools: ToolMetrics,
    pub payouts: PayoutMetrics,
    pub notifications: NotificationMetrics,
    pub uptime_seconds: u64,
    pub healthy: bool,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct TaskMetrics {
    pub tasks_created: u64,
    pub tasks_started: u64,
    pub tasks_running: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub avg_run_time_ms: f64,
    pub run_time_p50_ms: f64,
    pub run_time_p95_ms: f64,
}

#[derive(Debug, Default, Serialize)]
pub struct ToolMetrics {
    pub tool_stats: HashMap<String, ToolExecutionStatsSnapshot>,
    pub total_executions: u64,
    pub total_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct ToolExecutionStatsSnapshot {
    pub name: String,
    pub executions: u64,
    pub failures: u64,
    pub avg_execution_time_ms: f64,
    pub last_execution: u64,
    pub success_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct PayoutMetrics {
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug, Serialize)]
pub struct NotificationMetrics {
    pub sent: u64,
    pub skipped: u64,
    pub failed: u64,
}

fn push_bounded(samples: &mut Vec<u64>, value: u64) {
    samples.push(value);
    if samples.len() > MAX_SAMPLES {
        samples.remove(0);
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;
    lower + (upper - lower) * index.fract()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_task_metrics() {
        let collector = MetricsCollector::new();

        collector.task_created();
        collector.task_run_started();
        collector.task_run_completed(Duration::from_millis(1500));

        let metrics = collector.get_metrics();
        assert_eq!(metrics.tasks.tasks_created, 1);
        assert_eq!(metrics.tasks.tasks_completed, 1);
        assert_eq!(metrics.tasks.tasks_running, 0);
        assert!(metrics.tasks.avg_run_time_ms > 1400.0);
    }

    #[test]
    fn test_running_never_underflows() {
        let collector = MetricsCollector::new();
        collector.task_run_failed(Duration::from_millis(1));
        assert_eq!(collector.get_metrics().tasks.tasks_running, 0);
        assert_eq!(collector.get_metrics().tasks.tasks_failed, 1);
    }

    #[test]
    fn test_tool_metrics() {
        let collector = MetricsCollector::new();

        collector.tool_executed("research_tavily", Duration::from_millis(500), true);
        collector.tool_executed("research_tavily", Duration::from_millis(300), false);

        let metrics = collector.get_metrics();
        let stats = metrics.tools.tool_stats.get("research_tavily").unwrap();

        assert_eq!(stats.executions, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.success_rate, 0.5);
        assert!(stats.avg_execution_time_ms > 350.0);
        assert_eq!(metrics.tools.total_failures, 1);
    }

    #[test]
    fn test_payout_and_notification_counters() {
        let collector = MetricsCollector::new();
        collector.payout_sent();
        collector.payout_skipped();
        collector.notification_sent();
        collector.notification_failed();
        collector.notification_failed();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.payouts.sent, 1);
        assert_eq!(metrics.payouts.skipped, 1);
        assert_eq!(metrics.notifications.failed, 2);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.task_created();
                        collector.notification_sent();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.tasks.tasks_created, 1000);
        assert_eq!(metrics.notifications.sent, 1000);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        assert!((percentile(&data, 50.0) - 5.5).abs() < 0.1);
        assert!((percentile(&data, 95.0) - 9.55).abs() < 0.1);
        assert!((percentile(&data, 0.0) - 1.0).abs() < 0.1);
        assert!((percentile(&data, 100.0) - 10.0).abs() < 0.1);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_run_time_samples_are_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..1500 {
            collector.task_run_completed(Duration::from_millis(i));
        }
        let len = collector.run_times.lock().unwrap().len();
        assert_eq!(len, MAX_SAMPLES);
    }

    #[test]
    fn test_reset_functionality() {
        let collector = MetricsCollector::new();

        collector.task_created();
        collector.payout_failed();
        collector.tool_executed("x402_demo_call", Duration::from_millis(100), true);
        collector.update_health_status(false);

        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.tasks.tasks_created, 0);
        assert_eq!(metrics.payouts.failed, 0);
        assert!(metrics.tools.tool_stats.is_empty());
        assert!(metrics.healthy);
    }
}
