//! Event-chain orchestration.
//!
//! A [`TriggerSession`] owns one analysis session: it loads a path
//! descriptor, starts the target application, and walks a path's
//! constraint chain in order, turning each constraint into live queries,
//! a solve, and a trigger command. Per-constraint failures are reported
//! and skipped; channel loss and reply timeouts end the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::channel::{Command, ControlLink, Field, ListenerKind, QueryCategory};
use crate::device::DeviceControl;
use crate::error::{ConstraintError, TriggerError, TriggerResult};
use crate::path::{Constraint, ConstraintKind, PathDescriptor};
use crate::program::SymbolicProgram;
use crate::solver::{self, Observed};
use crate::synth::{self, fields, ConcreteInput};

/// Fixed advance applied to the observed device time, milliseconds.
pub const TIME_ADVANCE_MS: i64 = 300_000;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on each correlated INFO query.
    pub query_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
        }
    }
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No application loaded.
    Idle,
    /// Descriptor loaded and package started.
    AppLoaded,
    /// A trigger request is walking an event chain.
    Triggering,
}

/// Outcome of one constraint in a walked chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Trigger (or component launch) was issued.
    Triggered,
    /// Constraint was reported and skipped.
    Skipped {
        reason: String,
    },
}

/// Per-constraint record of a walked chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintOutcome {
    /// Position in the chain.
    pub index: usize,
    /// Raw type tag of the constraint.
    pub kind: String,
    /// What happened.
    pub outcome: Outcome,
}

/// Report for one trigger request; partial completion is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathReport {
    path_id: String,
    outcomes: Vec<ConstraintOutcome>,
}

impl PathReport {
    fn new(path_id: &str) -> Self {
        Self {
            path_id: path_id.to_string(),
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, index: usize, kind: &str, outcome: Outcome) {
        self.outcomes.push(ConstraintOutcome {
            index,
            kind: kind.to_string(),
            outcome,
        });
    }

    /// The path this report describes.
    #[must_use]
    pub fn path_id(&self) -> &str {
        &self.path_id
    }

    /// Outcomes in chain order.
    #[must_use]
    pub fn outcomes(&self) -> &[ConstraintOutcome] {
        &self.outcomes
    }

    /// Number of constraints that fired.
    #[must_use]
    pub fn triggered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == Outcome::Triggered)
            .count()
    }

    /// Number of constraints skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.triggered()
    }

    /// Returns true if every constraint fired.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.skipped() == 0
    }
}

enum Launch {
    Activity,
    Service,
}

/// One analysis session against a live instance.
pub struct TriggerSession {
    link: Arc<ControlLink>,
    device: Arc<dyn DeviceControl>,
    config: SessionConfig,
    descriptor: Option<PathDescriptor>,
    analysis_dir: Option<PathBuf>,
    state: SessionState,
}

impl TriggerSession {
    /// Creates an idle session over a connected link.
    #[must_use]
    pub fn new(
        link: Arc<ControlLink>,
        device: Arc<dyn DeviceControl>,
        config: SessionConfig,
    ) -> Self {
        Self {
            link,
            device,
            config,
            descriptor: None,
            analysis_dir: None,
            state: SessionState::Idle,
        }
    }

    /// Current orchestrator state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The loaded descriptor, if any.
    #[must_use]
    pub fn descriptor(&self) -> Option<&PathDescriptor> {
        self.descriptor.as_ref()
    }

    /// The control link this session drives.
    #[must_use]
    pub fn link(&self) -> &ControlLink {
        &self.link
    }

    /// Loads a descriptor from an analysis directory, starts analysis for
    /// the package, and launches its main activity.
    ///
    /// # Errors
    ///
    /// Descriptor, channel, or device errors; the session stays idle on
    /// failure.
    pub fn load_application(&mut self, dir: &Path) -> TriggerResult<()> {
        let descriptor = PathDescriptor::load(dir)?;

        self.link.send(&Command::Start {
            package: descriptor.package_name.clone(),
        })?;
        self.device.start_activity(&descriptor.main_activity_name())?;

        info!(
            package = %descriptor.package_name,
            paths = descriptor.call_paths.len(),
            "application loaded"
        );

        self.analysis_dir = Some(dir.to_path_buf());
        self.descriptor = Some(descriptor);
        self.state = SessionState::AppLoaded;
        Ok(())
    }

    /// Walks one path's event chain in order.
    ///
    /// Per-constraint failures are recorded in the report and do not halt
    /// the chain.
    ///
    /// # Errors
    ///
    /// `TriggerError::State` before an application is loaded,
    /// `TriggerError::Descriptor` for an unknown path id, and any
    /// chain-fatal channel/timeout error; the latter also end the
    /// session after an orderly close attempt.
    pub fn trigger_path(&mut self, path_id: &str) -> TriggerResult<PathReport> {
        if self.state == SessionState::Idle {
            return Err(TriggerError::state(
                "load an application before triggering paths",
            ));
        }

        let chain: Vec<Constraint> = {
            let descriptor = self
                .descriptor
                .as_ref()
                .ok_or_else(|| TriggerError::state("no descriptor loaded"))?;
            descriptor
                .chain(path_id)
                .ok_or_else(|| TriggerError::descriptor(format!("unknown path id '{path_id}'")))?
                .to_vec()
        };

        self.state = SessionState::Triggering;
        info!(path_id, constraints = chain.len(), "triggering path");

        let mut report = PathReport::new(path_id);
        for (index, constraint) in chain.iter().enumerate() {
            match self.apply_constraint(constraint) {
                Ok(()) => {
                    report.record(index, &constraint.tag, Outcome::Triggered);
                }
                Err(e) if e.is_chain_fatal() => {
                    warn!(index, kind = %constraint.tag, error = %e, "aborting session");
                    self.close();
                    return Err(e);
                }
                Err(e) => {
                    warn!(index, kind = %constraint.tag, error = %e, "constraint skipped");
                    report.record(
                        index,
                        &constraint.tag,
                        Outcome::Skipped {
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        self.state = SessionState::AppLoaded;
        Ok(report)
    }

    /// Sends a raw passthrough line.
    ///
    /// # Errors
    ///
    /// Channel errors.
    pub fn execute_raw(&self, raw: &str) -> TriggerResult<()> {
        self.link.send(&Command::Execute {
            raw: raw.to_string(),
        })
    }

    /// Ends the session: orderly channel close and back to idle.
    pub fn close(&mut self) {
        self.link.close();
        self.descriptor = None;
        self.analysis_dir = None;
        self.state = SessionState::Idle;
    }

    fn apply_constraint(&self, constraint: &Constraint) -> TriggerResult<()> {
        match constraint.kind() {
            Some(ConstraintKind::Boot) => self.trigger_boot(),
            Some(ConstraintKind::Alarm) => self.trigger_alarm(),
            Some(ConstraintKind::Time) => self.trigger_time(),
            Some(ConstraintKind::Location) => self.trigger_location(constraint),
            Some(ConstraintKind::Sms) => self.trigger_sms(constraint),
            Some(ConstraintKind::Activity) => self.launch_component(constraint, Launch::Activity),
            Some(ConstraintKind::Service) => self.launch_component(constraint, Launch::Service),
            None => Err(ConstraintError::UnknownConstraintType {
                tag: constraint.tag.clone(),
            }
            .into()),
        }
    }

    fn trigger_boot(&self) -> TriggerResult<()> {
        self.link.send(&Command::Trigger {
            category: "boot".to_string(),
            id: None,
            payload: None,
        })
    }

    fn trigger_alarm(&self) -> TriggerResult<()> {
        let id = self.link.registry().current_id(ListenerKind::Alarm);
        let reply = self
            .link
            .query(QueryCategory::Alarm, Some(&id), self.config.query_timeout)?;

        let when = field_value(&reply, fields::WHEN).ok_or_else(|| {
            ConstraintError::MissingMetadata {
                field: fields::WHEN.to_string(),
            }
        })?;

        self.link.send(&Command::Trigger {
            category: "alarm".to_string(),
            id: Some(id),
            payload: Some(when.to_string()),
        })
    }

    fn trigger_time(&self) -> TriggerResult<()> {
        let now = self.query_device_time()?;
        self.link.send(&Command::Trigger {
            category: "time".to_string(),
            id: None,
            payload: Some((now + TIME_ADVANCE_MS).to_string()),
        })
    }

    fn trigger_location(&self, constraint: &Constraint) -> TriggerResult<()> {
        let id = self.link.registry().current_id(ListenerKind::Location);
        let reply =
            self.link
                .query(QueryCategory::Location, Some(&id), self.config.query_timeout)?;

        let prev = synth::location::PreviousFix {
            latitude: field_f64(&reply, fields::PREV_LATITUDE).unwrap_or(0.0),
            longitude: field_f64(&reply, fields::PREV_LONGITUDE).unwrap_or(0.0),
        };

        let program = self.load_program(constraint)?.ok_or_else(|| {
            ConstraintError::MissingMetadata {
                field: "constraintsFile".to_string(),
            }
        })?;

        let bindings = observed_bindings(&reply);
        let derived = synth::location::displacement_assertions(constraint, prev);
        let model = solver::solve(&program, constraint, &bindings, &derived)?;
        let payload = synth::location::synthesize(&model, constraint, prev)?;

        self.link.send(&Command::Trigger {
            category: "location".to_string(),
            id: Some(id),
            payload: render_payload(&payload),
        })
    }

    fn trigger_sms(&self, constraint: &Constraint) -> TriggerResult<()> {
        let now = self.query_device_time()?;

        let payload = match self.load_program(constraint)? {
            Some(program) => {
                let bindings = vec![(fields::SYSTEM_PREV_TIME.to_string(), Observed::Int(now))];
                let model = solver::solve(&program, constraint, &bindings, &[])?;
                synth::sms::synthesize(&model, constraint)
            }
            // No program: inject an empty message envelope.
            None => ConcreteInput::new(),
        };

        self.link.send(&Command::Trigger {
            category: "sms".to_string(),
            id: Some("0".to_string()),
            payload: render_payload(&payload),
        })
    }

    fn launch_component(&self, constraint: &Constraint, launch: Launch) -> TriggerResult<()> {
        let component =
            constraint
                .component
                .as_deref()
                .ok_or_else(|| ConstraintError::MissingMetadata {
                    field: "component".to_string(),
                })?;

        let descriptor = self
            .descriptor
            .as_ref()
            .ok_or_else(|| TriggerError::state("no descriptor loaded"))?;
        let name = descriptor.component_name(component);

        match launch {
            Launch::Activity => self.device.start_activity(&name)?,
            Launch::Service => self.device.start_service(&name)?,
        }
        Ok(())
    }

    fn query_device_time(&self) -> TriggerResult<i64> {
        let reply = self
            .link
            .query(QueryCategory::Time, None, self.config.query_timeout)?;

        field_value(&reply, fields::TIME)
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| {
                ConstraintError::MissingMetadata {
                    field: fields::TIME.to_string(),
                }
                .into()
            })
    }

    /// Loads the constraint's symbolic program, if it references one.
    fn load_program(&self, constraint: &Constraint) -> TriggerResult<Option<SymbolicProgram>> {
        let Some(file) = constraint.constraints_file.as_deref() else {
            return Ok(None);
        };
        let dir = self
            .analysis_dir
            .as_ref()
            .ok_or_else(|| TriggerError::state("no analysis directory loaded"))?;
        SymbolicProgram::load(&dir.join(file)).map(Some)
    }
}

fn field_value<'a>(fields: &'a [Field], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.value.as_str())
}

fn field_f64(fields: &[Field], name: &str) -> Option<f64> {
    field_value(fields, name).and_then(|v| v.parse().ok())
}

/// Every parseable observed field, ready for binding translation.
fn observed_bindings(fields: &[Field]) -> Vec<(String, Observed)> {
    fields
        .iter()
        .filter_map(|f| Observed::parse(&f.value).map(|obs| (f.name.clone(), obs)))
        .collect()
}

fn render_payload(payload: &ConcreteInput) -> Option<String> {
    if payload.is_empty() {
        None
    } else {
        Some(payload.render(':'))
    }
}
