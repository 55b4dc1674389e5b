use tokio::sync::mpsc;

use crate::execution::{EngineEvent, RunId, RunOutcome};

/// Output pane state, fed only from the presentation context.
///
/// A `RunStarted` event clears the pane and makes that run current; events
/// of any other run are ignored, so output of two runs never mixes.
#[derive(Debug, Default)]
pub struct OutputSink {
    current: Option<RunId>,
    text: String,
    last_outcome: Option<RunOutcome>,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the pane changed.
    pub fn apply(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::RunStarted { run, command, .. } => {
                log::debug!("Output now follows {} (`{}`)", run, command);
                self.current = Some(run);
                self.text.clear();
                self.last_outcome = None;
                true
            }
            EngineEvent::Output { run, text } if self.current == Some(run) => {
                self.text.push_str(&text);
                true
            }
            EngineEvent::RunFinished { run, outcome } if self.current == Some(run) => {
                self.text.push_str(&outcome.render());
                self.last_outcome = Some(outcome);
                true
            }
            stale => {
                log::debug!("Dropping event of superseded {}", stale.run());
                false
            }
        }
    }

    /// Apply everything already queued without waiting.
    pub fn drain(&mut self, events: &mut mpsc::UnboundedReceiver<EngineEvent>) -> usize {
        let mut applied = 0;
        while let Ok(event) = events.try_recv() {
            if self.apply(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Replace the pane with a message that belongs to no run.
    pub fn show(&mut self, text: impl Into<String>) {
        self.current = None;
        self.last_outcome = None;
        self.text = text.into();
    }

    pub fn clear(&mut self) {
        self.show(String::new());
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.current
    }

    pub fn last_outcome(&self) -> Option<&RunOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some() && self.last_outcome.is_none()
    }
}
