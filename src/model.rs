/// Point-in-time snapshot of pool state and lifetime counters.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub active_workers: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub rejected_tasks: usize,
    pub discarded_tasks: usize,
}

impl PoolMetrics {
    /// Share of live workers currently running a task.
    pub fn utilization(&self) -> f64 {
        if self.active_workers == 0 {
            return 0.0;
        }
        let busy = self.active_workers.saturating_sub(self.idle_workers);
        busy as f64 / self.active_workers as f64
    }

    pub fn success_rate(&self) -> f64 {
        let finished = self.completed_tasks + self.failed_tasks;
        if finished == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / finished as f64
    }

    /// Tasks that were accepted but never ran plus tasks refused outright.
    pub fn shed_tasks(&self) -> usize {
        self.rejected_tasks + self.discarded_tasks
    }
}
