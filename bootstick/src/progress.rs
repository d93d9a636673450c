//! Terminal rendering of a run: one line per step and a progress bar for the
//! raw write and the optional verification pass.
use bootstick_core::{RunObserver, RunState, Step, StepOutcome, WriteProgress};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{prefix:12} [{elapsed_precise}] [{bar:40.COLOR/black}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

fn bar(total: u64, prefix: &'static str, color: &str) -> ProgressBar {
    let template = BAR_TEMPLATE.replace("COLOR", color);
    let style = ProgressStyle::default_bar()
        .template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("■ ");
    let pb = ProgressBar::new(total);
    pb.set_prefix(prefix);
    pb.set_style(style);
    pb
}

#[derive(Default)]
pub struct TerminalObserver {
    write_pb: Option<ProgressBar>,
    verify_pb: Option<ProgressBar>,
}

impl TerminalObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops any live bar so later output is not drawn over.
    fn finish_bars(&mut self, message: &'static str) {
        for pb in [self.write_pb.take(), self.verify_pb.take()].into_iter().flatten() {
            if pb.is_finished() {
                continue;
            }
            pb.abandon_with_message(message);
        }
    }
}

impl WriteProgress for TerminalObserver {
    fn on_write_start(&mut self, total: u64) {
        self.write_pb = Some(bar(total, "Writing", "green"));
    }

    fn on_write_progress(&mut self, written: u64) {
        if let Some(pb) = &self.write_pb {
            pb.set_position(written);
        }
    }

    fn on_verify_start(&mut self, total: u64) {
        if let Some(pb) = &self.write_pb {
            pb.finish_with_message("Write complete.");
        }
        self.verify_pb = Some(bar(total, "Verifying", "magenta"));
    }

    fn on_verify_progress(&mut self, verified: u64) {
        if let Some(pb) = &self.verify_pb {
            pb.set_position(verified);
        }
    }
}

impl RunObserver for TerminalObserver {
    fn on_state(&mut self, state: &RunState) {
        let label = match state {
            RunState::Provisioning => "Writing partition table",
            RunState::Formatting => "Creating and formatting partition",
            RunState::Writing => "Writing image",
            _ => return,
        };
        println!("{} {}", style("==>").cyan().bold(), label);
    }

    fn on_step_finished(&mut self, step: Step, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Success => {
                if let Some(pb) = self.verify_pb.as_ref().or(self.write_pb.as_ref()) {
                    pb.finish();
                }
                self.write_pb = None;
                self.verify_pb = None;
                println!("    {} {step}", style("✓").green());
            }
            StepOutcome::Skipped => {
                println!("    {} {step} (not requested)", style("-").dim());
            }
            StepOutcome::Failed(_) => {
                self.finish_bars("❌ Operation failed.");
                println!("    {} {step}", style("✗").red());
            }
        }
    }
}
