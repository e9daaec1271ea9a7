//! Progress reporting, kept deliberately separate from `tracing`: this is
//! for a caller driving a progress bar, not for an operator reading logs.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// Which stage of a job is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Staging,
    Indexing,
    Classifying,
    Planning,
    Building,
    Packaging,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Self::Staging => "staging reference tree",
            Self::Indexing => "indexing staged reference",
            Self::Classifying => "classifying generated files",
            Self::Planning => "planning archive chunks",
            Self::Building => "building archives",
            Self::Packaging => "assembling package",
        }
    }
}

/// One unit of progress, reported by the orchestrator as a job runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent<'a> {
    PhaseStarted {
        phase: Phase,
    },
    PhaseFinished {
        phase: Phase,
    },
    ChunkBuilt {
        current: usize,
        total: usize,
        name: &'a str,
    },
}

/// Receives progress events from the orchestrator. Implementations decide
/// what to do with them (render a bar, tally counts, discard).
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent<'_>);
}

/// A sink that discards every event.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent<'_>) {}
}

/// Renders job progress to a terminal spinner/bar via `indicatif`.
pub struct IndicatifProgressSink {
    bar: Mutex<ProgressBar>,
}

impl IndicatifProgressSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar: Mutex::new(bar) }
    }
}

impl Default for IndicatifProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for IndicatifProgressSink {
    fn on_event(&self, event: ProgressEvent<'_>) {
        let bar = self.bar.lock().expect("progress bar poisoned");
        match event {
            ProgressEvent::PhaseStarted { phase } => {
                bar.set_message(phase.label());
                bar.tick();
            }
            ProgressEvent::PhaseFinished { .. } => bar.tick(),
            ProgressEvent::ChunkBuilt { current, total, name } => {
                bar.set_message(format!("built chunk {name} ({current}/{total})"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);

    impl ProgressSink for CountingSink {
        fn on_event(&self, _event: ProgressEvent<'_>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn sink_receives_every_event() {
        let sink = CountingSink(AtomicUsize::new(0));
        sink.on_event(ProgressEvent::PhaseStarted { phase: Phase::Staging });
        sink.on_event(ProgressEvent::PhaseFinished { phase: Phase::Staging });
        assert_eq!(sink.0.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn null_sink_does_not_panic() {
        let sink = NullProgressSink;
        sink.on_event(ProgressEvent::PhaseStarted { phase: Phase::Indexing });
    }

    #[test]
    fn indicatif_sink_handles_the_full_event_sequence() {
        let sink = IndicatifProgressSink::new();
        sink.on_event(ProgressEvent::PhaseStarted { phase: Phase::Building });
        sink.on_event(ProgressEvent::ChunkBuilt {
            current: 1,
            total: 2,
            name: "Mod.bsa",
        });
        sink.on_event(ProgressEvent::PhaseFinished { phase: Phase::Building });
    }
}
