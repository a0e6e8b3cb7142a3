//! Sources, targets and the collection cycle that connects them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

use crate::document::Document;
use crate::error::CollectorError;

/// Produces a fresh batch of documents on every call.
pub trait Source {
    fn name(&self) -> &str;

    /// Re-samples and returns the assembled documents.
    fn docs(&mut self) -> Result<Vec<Document>, CollectorError>;
}

/// Accepts documents one at a time. Delivery problems are the target's own
/// business and never reach the collector.
pub trait Target {
    fn name(&self) -> &str;

    fn push(&mut self, doc: &Document);
}

/// A source whose `docs()` failed during a cycle.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: CollectorError,
}

/// Outcome of one [`Collector::collect`] call.
#[derive(Debug, Default)]
pub struct CollectReport {
    pub documents: usize,
    pub pushes: usize,
    pub failures: Vec<SourceFailure>,
}

/// Ordered sources fanned out to ordered targets.
#[derive(Default)]
pub struct Collector {
    sources: Vec<Box<dyn Source>>,
    targets: Vec<Box<dyn Target>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: Box<dyn Source>) {
        self.sources.push(source);
    }

    pub fn add_target(&mut self, target: Box<dyn Target>) {
        self.targets.push(target);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Runs one cycle: every document of every source goes to every target,
    /// in source order, then emission order, then target order.
    ///
    /// A failing source is recorded in the report and the remaining sources
    /// are still collected.
    #[instrument(skip(self))]
    pub fn collect(&mut self) -> CollectReport {
        let mut report = CollectReport::default();

        for source in self.sources.iter_mut() {
            let docs = match source.docs() {
                Ok(docs) => docs,
                Err(e) => {
                    error!("Source {} failed: {}", source.name(), e);
                    report.failures.push(SourceFailure {
                        source: source.name().to_string(),
                        error: e,
                    });
                    continue;
                }
            };
            debug!("Source {} produced {} documents", source.name(), docs.len());

            for doc in &docs {
                for target in self.targets.iter_mut() {
                    target.push(doc);
                    report.pushes += 1;
                }
            }
            report.documents += docs.len();
        }

        info!(
            "{} documents pushed to {} targets ({} pushes)",
            report.documents,
            self.targets.len(),
            report.pushes
        );
        report
    }

    /// Collects every `interval` until `stop` is set. A zero interval runs
    /// exactly one cycle. Returns the number of cycles run.
    ///
    /// `stop` is checked between cycles and while waiting; a running cycle
    /// is never interrupted.
    pub fn run(&mut self, interval: Duration, stop: &AtomicBool) -> usize {
        let mut cycles = 0;
        loop {
            let started = Instant::now();
            self.collect();
            cycles += 1;

            if interval.is_zero() {
                break;
            }
            while started.elapsed() < interval {
                if stop.load(Ordering::Relaxed) {
                    return cycles;
                }
                thread::sleep(STOP_POLL.min(interval.saturating_sub(started.elapsed())));
            }
            if stop.load(Ordering::Relaxed) {
                break;
            }
        }
        cycles
    }
}

/// How often `run` looks at the stop flag while waiting.
const STOP_POLL: Duration = Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    struct Failing;

    impl Source for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn docs(&mut self) -> Result<Vec<Document>, CollectorError> {
            Err(CollectorError::BadParameterName("../tasks".into()))
        }
    }

    struct One;

    impl Source for One {
        fn name(&self) -> &str {
            "one"
        }

        fn docs(&mut self) -> Result<Vec<Document>, CollectorError> {
            Ok(vec![Document::new("one", "Test", Map::new())])
        }
    }

    struct Counter(usize);

    impl Target for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn push(&mut self, _doc: &Document) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_failing_source_does_not_stop_cycle() {
        let mut c = Collector::new();
        c.add_source(Box::new(Failing));
        c.add_source(Box::new(One));
        c.add_target(Box::new(Counter(0)));

        let report = c.collect();
        assert_eq!(report.documents, 1);
        assert_eq!(report.pushes, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, "failing");
        assert!(matches!(
            report.failures[0].error,
            CollectorError::BadParameterName(_)
        ));
    }

    #[test]
    fn test_zero_interval_runs_once() {
        let mut c = Collector::new();
        c.add_source(Box::new(One));
        let stop = AtomicBool::new(false);

        assert_eq!(c.run(Duration::ZERO, &stop), 1);
    }

    #[test]
    fn test_stop_flag_ends_interval_loop() {
        let mut c = Collector::new();
        c.add_source(Box::new(One));
        let stop = AtomicBool::new(true);

        assert_eq!(c.run(Duration::from_secs(3600), &stop), 1);
    }

    #[test]
    fn test_no_targets_counts_documents_only() {
        let mut c = Collector::new();
        c.add_source(Box::new(One));

        let report = c.collect();
        assert_eq!(report.documents, 1);
        assert_eq!(report.pushes, 0);
        assert_eq!(c.source_count(), 1);
        assert_eq!(c.target_count(), 0);
    }
}
