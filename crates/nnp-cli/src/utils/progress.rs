use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use nnpforge::engine::progress::{Progress, ProgressCallback, ProgressReporter};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;
const PHASE_TEMPLATE: &str = "{spinner:.green} {msg}";
const EVALUATION_TEMPLATE: &str =
    "{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} molecules, {msg} ({elapsed})";

/// Terminal state behind the callback: one bar plus the pairs seen in the running evaluation.
struct Display {
    bar: ProgressBar,
    pairs: u64,
}

impl Display {
    fn begin_phase(&mut self, name: &str) {
        self.bar.reset();
        self.bar.set_length(0);
        self.bar.set_style(style(PHASE_TEMPLATE));
        self.bar.set_prefix("");
        self.bar.set_message(name.to_string());
        self.bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    }

    fn begin_evaluation(&mut self, molecules: u64, chunks: u64) {
        self.pairs = 0;
        self.bar.disable_steady_tick();
        self.bar.reset();
        self.bar.set_length(molecules);
        self.bar.set_style(style(EVALUATION_TEMPLATE).progress_chars("=> "));
        self.bar.set_prefix(match chunks {
            1 => "1 pass".to_string(),
            n => format!("{n} chunks"),
        });
        self.bar.set_message("0 pairs");
    }

    fn record_chunk(&mut self, molecules: u64, pairs: u64) {
        self.pairs += pairs;
        self.bar.inc(molecules);
        self.bar.set_message(format!("{} pairs", self.pairs));
    }

    fn finish_evaluation(&mut self) {
        if let Some(length) = self.bar.length() {
            self.bar.set_position(length);
        }
        self.bar.finish();
    }

    fn finish_phase(&mut self) {
        self.bar.disable_steady_tick();
        self.bar.finish_with_message("✓ Done");
    }

    /// Printed above a running bar, or shown in place of a finished one.
    fn note(&mut self, text: String) {
        if self.bar.is_finished() {
            self.bar.set_message(text);
        } else {
            self.bar.println(format!("  {text}"));
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Renders workflow progress on stderr: a spinner per phase, and a molecule bar with a running
/// pair count while a batch is evaluated chunk by chunk.
#[derive(Clone)]
pub struct CliProgressHandler {
    display: Arc<Mutex<Display>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    /// A handler whose bar is never drawn, for `--quiet` runs.
    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target).with_style(style(PHASE_TEMPLATE));
        bar.finish_and_clear();
        Self {
            display: Arc::new(Mutex::new(Display { bar, pairs: 0 })),
        }
    }

    pub fn reporter(&self) -> ProgressReporter<'static> {
        ProgressReporter::with_callback(self.get_callback())
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let display = self.display.clone();
        Box::new(move |event: Progress| {
            let Ok(mut display) = display.lock() else {
                warn!("Progress display mutex was poisoned; dropping event.");
                return;
            };
            match event {
                Progress::PhaseStart { name } => display.begin_phase(name),
                Progress::PhaseFinish => display.finish_phase(),
                Progress::EvaluationStart { molecules, chunks } => {
                    display.begin_evaluation(molecules, chunks)
                }
                Progress::ChunkEvaluated { molecules, pairs } => {
                    display.record_chunk(molecules, pairs)
                }
                Progress::EvaluationFinish => display.finish_evaluation(),
                Progress::Message(text) => display.note(text),
            }
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn snapshot(handler: &CliProgressHandler) -> (u64, Option<u64>, String, bool) {
        let display = handler.display.lock().unwrap();
        (
            display.bar.position(),
            display.bar.length(),
            display.bar.message(),
            display.bar.is_finished(),
        )
    }

    #[test]
    fn handler_starts_finished_and_empty() {
        let handler = CliProgressHandler::hidden();
        assert_eq!(snapshot(&handler), (0, Some(0), String::new(), true));
    }

    #[test]
    fn chunked_evaluation_counts_molecules_and_accumulates_pairs() {
        let handler = CliProgressHandler::hidden();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Evaluation" });
        assert_eq!(snapshot(&handler).2, "Evaluation");

        callback(Progress::EvaluationStart {
            molecules: 5,
            chunks: 3,
        });
        assert_eq!(handler.display.lock().unwrap().bar.prefix(), "3 chunks");
        callback(Progress::ChunkEvaluated {
            molecules: 2,
            pairs: 40,
        });
        callback(Progress::ChunkEvaluated {
            molecules: 2,
            pairs: 6,
        });
        assert_eq!(
            snapshot(&handler),
            (4, Some(5), "46 pairs".to_string(), false)
        );

        callback(Progress::EvaluationFinish);
        let (position, _, message, finished) = snapshot(&handler);
        assert_eq!(position, 5);
        assert_eq!(message, "46 pairs");
        assert!(finished);

        callback(Progress::PhaseFinish);
        assert_eq!(snapshot(&handler).2, "✓ Done");
    }

    #[test]
    fn a_new_evaluation_restarts_the_pair_count() {
        let handler = CliProgressHandler::hidden();
        let reporter = handler.reporter();
        for _ in 0..2 {
            reporter.report(Progress::EvaluationStart {
                molecules: 1,
                chunks: 1,
            });
            reporter.report(Progress::ChunkEvaluated {
                molecules: 1,
                pairs: 12,
            });
        }
        assert_eq!(snapshot(&handler).2, "12 pairs");
        assert_eq!(handler.display.lock().unwrap().bar.prefix(), "1 pass");
    }

    #[test]
    fn message_after_finish_replaces_the_bar_message() {
        let handler = CliProgressHandler::hidden();
        handler.reporter().message("Fitted self energies for 3 elements.");
        assert_eq!(snapshot(&handler).2, "Fitted self energies for 3 elements.");
    }

    #[test]
    fn events_from_another_thread_reach_the_display() {
        let handler = CliProgressHandler::hidden();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::PhaseStart {
                name: "Self-energy regression",
            });
            callback(Progress::PhaseFinish);
        })
        .join()
        .unwrap();

        let (_, _, message, finished) = snapshot(&handler);
        assert!(finished);
        assert_eq!(message, "✓ Done");
    }
}
