//! Sequences one destructive run.
//!
//! A run moves through
//! `Idle → Confirming → Provisioning → Formatting → Writing → Done`.
//! Every requested step is resolved before the operator is asked anything: a
//! missing tool, an unsupported filesystem or a target the step cannot address
//! fails that step with no delegate invoked. Steps the operator did not ask
//! for are recorded as skipped and never touch their delegate. The first
//! failing step ends the run in
//! [`RunState::Failed`]; declining the confirmation ends it in
//! [`RunState::Aborted`] before any delegate is invoked. Nothing is retried.
use crate::config::Config;
use crate::confirm;
use crate::delegate::Runner;
use crate::error::{ConfigError, FailureKind, StepError};
use crate::format::Formatter;
use crate::platform::{self, Platform};
use crate::provision::Provisioner;
use crate::target::TargetSpec;
use crate::write::{ImageSource, RawImager, WriteProgress};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process exit status for a run that reached [`RunState::Done`].
pub const EXIT_DONE: i32 = 0;
/// Process exit status for a run that ended in [`RunState::Failed`].
pub const EXIT_FAILED: i32 = 1;
/// Process exit status for a run the operator declined.
pub const EXIT_ABORTED: i32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// The privilege check made before anything is asked or touched.
    Preflight,
    Provisioning,
    Formatting,
    Writing,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Preflight => "Preflight",
            Step::Provisioning => "Provisioning",
            Step::Formatting => "Formatting",
            Step::Writing => "Writing",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Skipped,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Confirming,
    Provisioning,
    Formatting,
    Writing,
    Done,
    Aborted,
    Failed {
        step: Step,
        kind: FailureKind,
        reason: String,
    },
}

impl RunState {
    fn entering(step: Step) -> Self {
        match step {
            Step::Preflight => RunState::Idle,
            Step::Provisioning => RunState::Provisioning,
            Step::Formatting => RunState::Formatting,
            Step::Writing => RunState::Writing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Done | RunState::Aborted | RunState::Failed { .. }
        )
    }
}

/// One entry of an [`OperationPlan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedStep {
    pub step: Step,
    pub requested: bool,
}

/// The destructive steps of a run, always in the order
/// provisioning, formatting, writing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationPlan {
    steps: [PlannedStep; 3],
}

impl OperationPlan {
    pub fn new(target: &TargetSpec, image: Option<&ImageSource>) -> Self {
        Self {
            steps: [
                PlannedStep {
                    step: Step::Provisioning,
                    requested: target.scheme.is_some(),
                },
                PlannedStep {
                    step: Step::Formatting,
                    requested: target.filesystem.is_some(),
                },
                PlannedStep {
                    step: Step::Writing,
                    requested: image.is_some(),
                },
            ],
        }
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn is_requested(&self, step: Step) -> bool {
        self.steps.iter().any(|s| s.step == step && s.requested)
    }

    /// Whether the run would change nothing on the device.
    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(|s| !s.requested)
    }
}

/// What happened during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub target: String,
    pub state: RunState,
    /// Outcomes of the steps reached, in plan order.
    pub outcomes: Vec<(Step, StepOutcome)>,
    pub bytes_written: Option<u64>,
}

impl RunReport {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            state: RunState::Idle,
            outcomes: Vec::new(),
            bytes_written: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }

    pub fn exit_code(&self) -> i32 {
        match self.state {
            RunState::Done => EXIT_DONE,
            RunState::Aborted => EXIT_ABORTED,
            _ => EXIT_FAILED,
        }
    }
}

/// Watches a run. All methods default to doing nothing.
pub trait RunObserver: WriteProgress {
    fn on_state(&mut self, _state: &RunState) {}
    fn on_step_finished(&mut self, _step: Step, _outcome: &StepOutcome) {}
}

impl RunObserver for () {}

/// The components of a run, bound before anything is touched.
struct Prepared<'r, R: Runner> {
    provisioner: Option<Provisioner<'r, R>>,
    formatter: Option<Formatter<'r, R>>,
    imager: Option<RawImager<'r, R>>,
}

pub struct Orchestrator<'r, R: Runner> {
    platform: Platform,
    runner: &'r R,
    config: Config,
    elevated: Box<dyn Fn() -> bool + 'r>,
}

impl<'r, R: Runner> Orchestrator<'r, R> {
    /// Creates an orchestrator whose privilege check is [`platform::is_elevated`].
    pub fn new(platform: Platform, runner: &'r R, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            platform,
            runner,
            config,
            elevated: Box::new(platform::is_elevated),
        })
    }

    /// Replaces the privilege check queried at the start of every run.
    pub fn with_privilege_check(mut self, check: impl Fn() -> bool + 'r) -> Self {
        self.elevated = Box::new(check);
        self
    }

    /// Runs the plan derived from `target` and `image`.
    ///
    /// `prompt` is only called when `auto_yes` is false; see
    /// [`confirm::confirm`]. Clearing `running` stops the run at the next step
    /// boundary or copy block.
    pub fn run<P, O>(
        &self,
        target: &TargetSpec,
        image: Option<&ImageSource>,
        auto_yes: bool,
        prompt: P,
        running: &AtomicBool,
        observer: &mut O,
    ) -> RunReport
    where
        P: FnOnce(&str) -> io::Result<String>,
        O: RunObserver + ?Sized,
    {
        let mut report = RunReport::new(&target.device);
        let plan = OperationPlan::new(target, image);
        observer.on_state(&report.state);

        if !(self.elevated)() {
            let reason = match self.platform {
                Platform::Windows => "Administrator privileges are required",
                _ => "root privileges are required (run with sudo)",
            };
            self.fail(
                &mut report,
                observer,
                Step::Preflight,
                FailureKind::PreconditionFailed,
                reason.to_string(),
            );
            return report;
        }

        let prepared = match self.prepare(target, image) {
            Ok(prepared) => prepared,
            Err((step, e)) => {
                self.fail(&mut report, observer, step, e.kind(), e.to_string());
                return report;
            }
        };

        self.transition(&mut report, observer, RunState::Confirming);
        if confirm::confirm(&target.device, auto_yes, prompt).is_err() {
            self.transition(&mut report, observer, RunState::Aborted);
            return report;
        }

        let mut touched = false;
        for planned in plan.steps() {
            let step = planned.step;
            if !planned.requested {
                log::debug!("{step}: skipped");
                self.record(&mut report, observer, step, StepOutcome::Skipped);
                continue;
            }

            if !running.load(Ordering::SeqCst) {
                if touched {
                    let reason = format!(
                        "interrupted before {step}; {} may be partially modified",
                        target.device
                    );
                    self.fail(&mut report, observer, step, FailureKind::Interrupted, reason);
                } else {
                    self.transition(&mut report, observer, RunState::Aborted);
                }
                return report;
            }

            self.transition(&mut report, observer, RunState::entering(step));
            touched = true;
            match self.execute(&prepared, step, target, image, running, observer) {
                Ok(written) => {
                    if written.is_some() {
                        report.bytes_written = written;
                    }
                    self.record(&mut report, observer, step, StepOutcome::Success);
                }
                Err(e) => {
                    self.fail(&mut report, observer, step, e.kind(), e.to_string());
                    return report;
                }
            }
        }

        self.transition(&mut report, observer, RunState::Done);
        report
    }

    /// Resolves the component of every requested step, in plan order.
    fn prepare(
        &self,
        target: &TargetSpec,
        image: Option<&ImageSource>,
    ) -> Result<Prepared<'r, R>, (Step, StepError)> {
        let provisioner = match target.scheme {
            Some(_) => {
                let (provisioner, strategy) = Provisioner::resolve(self.platform, self.runner)
                    .and_then(|p| p.prepare(target).map(|strategy| (p, strategy)))
                    .map_err(|e| (Step::Provisioning, StepError::from(e)))?;
                log::debug!("{}: provisioning with {strategy:?}", target.device);
                Some(provisioner)
            }
            None => None,
        };
        let formatter = match &target.filesystem {
            Some(fs) => Some(
                Formatter::resolve(self.platform, self.runner, &self.config, fs)
                    .and_then(|f| f.check_target(target).map(|_| f))
                    .map_err(|e| (Step::Formatting, StepError::from(e)))?,
            ),
            None => None,
        };
        let imager = match image {
            Some(_) => Some(
                RawImager::resolve(self.platform, self.runner, &self.config)
                    .map_err(|e| (Step::Writing, StepError::from(e)))?,
            ),
            None => None,
        };
        Ok(Prepared {
            provisioner,
            formatter,
            imager,
        })
    }

    fn execute<O>(
        &self,
        prepared: &Prepared<'r, R>,
        step: Step,
        target: &TargetSpec,
        image: Option<&ImageSource>,
        running: &AtomicBool,
        observer: &mut O,
    ) -> Result<Option<u64>, StepError>
    where
        O: RunObserver + ?Sized,
    {
        match (step, image) {
            (Step::Provisioning, _) => {
                if let Some(provisioner) = &prepared.provisioner {
                    provisioner.provision(target)?;
                }
                Ok(None)
            }
            (Step::Formatting, _) => {
                if let Some(formatter) = &prepared.formatter {
                    formatter.format(target)?;
                }
                Ok(None)
            }
            (Step::Writing, Some(image)) => match &prepared.imager {
                Some(imager) => Ok(Some(imager.write_image(image, target, running, observer)?)),
                None => Ok(None),
            },
            // Unrequested steps never reach here.
            _ => Ok(None),
        }
    }

    fn transition<O>(&self, report: &mut RunReport, observer: &mut O, state: RunState)
    where
        O: RunObserver + ?Sized,
    {
        if state.is_terminal() {
            log::info!("{}: {:?} -> {:?}", report.target, report.state, state);
        } else {
            log::debug!("{}: {:?} -> {:?}", report.target, report.state, state);
        }
        report.state = state;
        observer.on_state(&report.state);
    }

    fn record<O>(&self, report: &mut RunReport, observer: &mut O, step: Step, outcome: StepOutcome)
    where
        O: RunObserver + ?Sized,
    {
        observer.on_step_finished(step, &outcome);
        report.outcomes.push((step, outcome));
    }

    fn fail<O>(
        &self,
        report: &mut RunReport,
        observer: &mut O,
        step: Step,
        kind: FailureKind,
        reason: String,
    ) where
        O: RunObserver + ?Sized,
    {
        log::error!("{step} failed ({kind}): {reason}");
        if step != Step::Preflight {
            self.record(report, observer, step, StepOutcome::Failed(reason.clone()));
        }
        self.transition(report, observer, RunState::Failed { step, kind, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{FilesystemKind, PartitionScheme};

    #[test]
    fn plan_order_is_fixed() {
        let target = TargetSpec::new("/dev/sdb").with_filesystem(FilesystemKind::Ext4);
        let plan = OperationPlan::new(&target, None);
        let order: Vec<Step> = plan.steps().iter().map(|s| s.step).collect();
        assert_eq!(order, [Step::Provisioning, Step::Formatting, Step::Writing]);
        assert!(!plan.is_requested(Step::Provisioning));
        assert!(plan.is_requested(Step::Formatting));
        assert!(!plan.is_requested(Step::Writing));
    }

    #[test]
    fn empty_plan() {
        assert!(OperationPlan::new(&TargetSpec::new("1"), None).is_empty());
        let target = TargetSpec::new("1").with_scheme(PartitionScheme::Mbr);
        assert!(!OperationPlan::new(&target, None).is_empty());
    }

    #[test]
    fn exit_codes_distinguish_abort_from_failure() {
        let mut report = RunReport::new("/dev/sdb");
        report.state = RunState::Done;
        assert_eq!(report.exit_code(), EXIT_DONE);
        report.state = RunState::Aborted;
        assert_eq!(report.exit_code(), EXIT_ABORTED);
        report.state = RunState::Failed {
            step: Step::Writing,
            kind: FailureKind::DelegateFailed,
            reason: "I/O error".to_string(),
        };
        assert_eq!(report.exit_code(), EXIT_FAILED);
    }
}
