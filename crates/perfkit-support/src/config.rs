use std::time::Duration;

use crate::logging::LoggingConfig;

/// Plain-data settings an embedding binary assembles before constructing a
/// pipeline [`Manager`](../perfkit_core/manager/struct.Manager.html). There
/// is deliberately no `from_file`/`from_args` constructor here — reading
/// these values from a config file or CLI flags is the transport's job.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub logging: LoggingConfig,
    /// Upper bound on how long the shared scheduler thread can oversleep
    /// past a deadline before it is considered stalled. Informational only;
    /// the scheduler itself always wakes as soon as the condition variable
    /// is signalled or the deadline elapses, whichever comes first.
    pub shared_scheduler_tick: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            logging: LoggingConfig::default(),
            shared_scheduler_tick: Duration::from_millis(1),
        }
    }
}
