/// Flow graph: the static registry of named flows and its validation.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::schema::step::{Position, Step, StepAction};

/// Authoring errors. Raised when a graph is built, or, for lookups, when
/// a caller asks for a position the graph does not contain.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("unknown flow '{0}'")]
    UnknownFlow(String),
    #[error("step {index} out of bounds for flow '{flow}'")]
    StepOutOfBounds { flow: String, index: usize },
    #[error("flow '{0}' has no steps")]
    EmptyFlow(String),
    #[error("entry flow '{0}' is not defined")]
    UnknownEntry(String),
    #[error("flow '{0}' is defined more than once")]
    DuplicateFlow(String),
    #[error("step {step} of flow '{flow}' branches to unknown flow '{target}'")]
    DanglingBranch {
        flow: String,
        step: usize,
        target: String,
    },
    #[error("step {step} of flow '{flow}' declares both next_flow and auto_redirect")]
    ConflictingAction { flow: String, step: usize },
    #[error("flow '{0}' ends without a branch or redirect")]
    FallsOffEnd(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A named, ordered, non-empty sequence of steps.
#[derive(Debug, Clone)]
pub struct Flow {
    pub name: String,
    pub steps: Vec<Step>,
}

/// Read-only registry of flows. Every branch target resolves and every
/// flow ends in a branch or redirect; both are checked at construction.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    entry: String,
    flows: FxHashMap<String, Flow>,
    /// Declaration order of flow names.
    order: Vec<String>,
}

// RON file shape. Steps use the flat authoring form and are converted
// into `StepAction` once, here.

#[derive(Debug, Deserialize)]
struct RonStep {
    text: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    next_flow: Option<String>,
    #[serde(default)]
    auto_redirect: bool,
}

#[derive(Debug, Deserialize)]
struct RonFlow {
    name: String,
    steps: Vec<RonStep>,
}

#[derive(Debug, Deserialize)]
struct RonGraph {
    entry: String,
    flows: Vec<RonFlow>,
}

/// A lint finding that does not prevent the graph from being used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintWarning {
    UnreachableFlow(String),
    UnreachableStep { flow: String, step: usize },
    /// The step can only be left by advancing, but offers no advance label.
    NoAdvanceLabel { flow: String, step: usize },
}

impl std::fmt::Display for LintWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnreachableFlow(name) => {
                write!(f, "flow '{name}' is never reached from the entry flow")
            }
            Self::UnreachableStep { flow, step } => {
                write!(
                    f,
                    "step {step} of flow '{flow}' follows a branch or redirect and is never shown"
                )
            }
            Self::NoAdvanceLabel { flow, step } => {
                write!(f, "step {step} of flow '{flow}' has no advance label")
            }
        }
    }
}

impl FlowGraph {
    /// Build a graph from flows in declaration order, validating it.
    pub fn new(entry: impl Into<String>, flows: Vec<Flow>) -> Result<FlowGraph, FlowError> {
        let entry = entry.into();
        if let Some(error) = Self::check(&entry, &flows).into_iter().next() {
            return Err(error);
        }

        let order = flows.iter().map(|flow| flow.name.clone()).collect();
        let flows = flows
            .into_iter()
            .map(|flow| (flow.name.clone(), flow))
            .collect();

        tracing::debug!(entry = %entry, "flow graph built");
        Ok(FlowGraph {
            entry,
            flows,
            order,
        })
    }

    /// Load a graph from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<FlowGraph, FlowError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a graph from a RON string.
    pub fn parse_ron(input: &str) -> Result<FlowGraph, FlowError> {
        let (entry, flows) = Self::parse_flows(input)?;
        Self::new(entry, flows)
    }

    /// Parse a RON string into unvalidated flows, converting each step's
    /// authoring form into a `StepAction`.
    pub fn parse_flows(input: &str) -> Result<(String, Vec<Flow>), FlowError> {
        let raw: RonGraph = ron::from_str(input)?;
        let mut flows = Vec::with_capacity(raw.flows.len());
        for ron_flow in raw.flows {
            let mut steps = Vec::with_capacity(ron_flow.steps.len());
            for (index, ron_step) in ron_flow.steps.into_iter().enumerate() {
                let action = match (ron_step.next_flow, ron_step.auto_redirect) {
                    (Some(_), true) => {
                        return Err(FlowError::ConflictingAction {
                            flow: ron_flow.name,
                            step: index,
                        })
                    }
                    (Some(target), false) => StepAction::Branch(target),
                    (None, true) => StepAction::Redirect,
                    (None, false) => StepAction::Continue,
                };
                steps.push(Step {
                    text: ron_step.text,
                    advance_label: ron_step.label,
                    action,
                });
            }
            flows.push(Flow {
                name: ron_flow.name,
                steps,
            });
        }
        Ok((raw.entry, flows))
    }

    /// Every configuration error in `flows`, in declaration order.
    pub fn check(entry: &str, flows: &[Flow]) -> Vec<FlowError> {
        let mut errors = Vec::new();
        let mut names = FxHashSet::default();
        for flow in flows {
            if !names.insert(flow.name.as_str()) {
                errors.push(FlowError::DuplicateFlow(flow.name.clone()));
            }
        }

        if !names.contains(entry) {
            errors.push(FlowError::UnknownEntry(entry.to_string()));
        }

        for flow in flows {
            let Some(last) = flow.steps.last() else {
                errors.push(FlowError::EmptyFlow(flow.name.clone()));
                continue;
            };
            for (index, step) in flow.steps.iter().enumerate() {
                if let StepAction::Branch(target) = &step.action {
                    if !names.contains(target.as_str()) {
                        errors.push(FlowError::DanglingBranch {
                            flow: flow.name.clone(),
                            step: index,
                            target: target.clone(),
                        });
                    }
                }
            }
            if last.action == StepAction::Continue {
                errors.push(FlowError::FallsOffEnd(flow.name.clone()));
            }
        }

        errors
    }

    /// Non-fatal findings for an already valid graph.
    pub fn lint(&self) -> Vec<LintWarning> {
        let mut warnings = Vec::new();

        // Flows reachable from the entry by following branches.
        let mut reached = FxHashSet::default();
        let mut pending = vec![self.entry.as_str()];
        while let Some(name) = pending.pop() {
            if !reached.insert(name) {
                continue;
            }
            for step in &self.flows[name].steps {
                if let StepAction::Branch(target) = &step.action {
                    pending.push(target.as_str());
                }
            }
        }

        for name in &self.order {
            if !reached.contains(name.as_str()) {
                warnings.push(LintWarning::UnreachableFlow(name.clone()));
            }
            let flow = &self.flows[name];
            let mut cut = false;
            for (index, step) in flow.steps.iter().enumerate() {
                if cut {
                    warnings.push(LintWarning::UnreachableStep {
                        flow: name.clone(),
                        step: index,
                    });
                    continue;
                }
                if !step.action.is_terminal() && step.advance_label.is_none() {
                    warnings.push(LintWarning::NoAdvanceLabel {
                        flow: name.clone(),
                        step: index,
                    });
                }
                cut = step.action != StepAction::Continue;
            }
        }

        warnings
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Step 0 of the entry flow.
    pub fn opening(&self) -> Position {
        Position::start_of(self.entry.clone())
    }

    pub fn contains(&self, flow: &str) -> bool {
        self.flows.contains_key(flow)
    }

    pub fn flow(&self, flow: &str) -> Result<&Flow, FlowError> {
        self.flows
            .get(flow)
            .ok_or_else(|| FlowError::UnknownFlow(flow.to_string()))
    }

    pub fn get_step(&self, flow: &str, index: usize) -> Result<&Step, FlowError> {
        self.flow(flow)?
            .steps
            .get(index)
            .ok_or_else(|| FlowError::StepOutOfBounds {
                flow: flow.to_string(),
                index,
            })
    }

    pub fn step_at(&self, position: &Position) -> Result<&Step, FlowError> {
        self.get_step(&position.flow, position.step)
    }

    pub fn flow_length(&self, flow: &str) -> Result<usize, FlowError> {
        Ok(self.flow(flow)?.steps.len())
    }

    /// Flow names in declaration order.
    pub fn flow_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(name: &str, steps: Vec<Step>) -> Flow {
        Flow {
            name: name.to_string(),
            steps,
        }
    }

    fn two_flow_graph() -> FlowGraph {
        FlowGraph::new(
            "a",
            vec![
                flow("a", vec![Step::new("hi").labeled("GO").branch("b")]),
                flow("b", vec![Step::new("bye").redirect()]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn get_step_and_length() {
        let graph = two_flow_graph();
        assert_eq!(graph.get_step("a", 0).unwrap().text, "hi");
        assert_eq!(graph.flow_length("b").unwrap(), 1);
        assert_eq!(graph.opening(), Position::new("a", 0));
        assert_eq!(graph.flow_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn get_step_unknown_flow() {
        let graph = two_flow_graph();
        assert!(matches!(
            graph.get_step("zzz", 0),
            Err(FlowError::UnknownFlow(name)) if name == "zzz"
        ));
    }

    #[test]
    fn get_step_out_of_bounds() {
        let graph = two_flow_graph();
        assert!(matches!(
            graph.get_step("a", 1),
            Err(FlowError::StepOutOfBounds { index: 1, .. })
        ));
    }

    #[test]
    fn dangling_branch_rejected() {
        let result = FlowGraph::new(
            "a",
            vec![flow("a", vec![Step::new("hi").branch("nowhere")])],
        );
        assert!(matches!(
            result,
            Err(FlowError::DanglingBranch { target, .. }) if target == "nowhere"
        ));
    }

    #[test]
    fn fall_through_at_end_rejected() {
        let result = FlowGraph::new(
            "a",
            vec![flow("a", vec![Step::new("one").labeled("GO"), Step::new("two")])],
        );
        assert!(matches!(result, Err(FlowError::FallsOffEnd(name)) if name == "a"));
    }

    #[test]
    fn empty_flow_and_unknown_entry_rejected() {
        let errors = FlowGraph::check("missing", &[flow("a", vec![])]);
        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], FlowError::UnknownEntry(name) if name == "missing"));
        assert!(matches!(&errors[1], FlowError::EmptyFlow(name) if name == "a"));
    }

    #[test]
    fn duplicate_flow_rejected() {
        let result = FlowGraph::new(
            "a",
            vec![
                flow("a", vec![Step::new("x").redirect()]),
                flow("a", vec![Step::new("y").redirect()]),
            ],
        );
        assert!(matches!(result, Err(FlowError::DuplicateFlow(_))));
    }

    #[test]
    fn parse_ron_converts_actions() {
        let graph = FlowGraph::parse_ron(
            r#"#![enable(implicit_some)]
            (
                entry: "a",
                flows: [
                    (name: "a", steps: [
                        (text: "one", label: "NEXT"),
                        (text: "two", label: "ON", next_flow: "b"),
                    ]),
                    (name: "b", steps: [(text: "bye", auto_redirect: true)]),
                ],
            )"#,
        )
        .unwrap();

        assert_eq!(graph.get_step("a", 0).unwrap().action, StepAction::Continue);
        assert_eq!(
            graph.get_step("a", 1).unwrap().action,
            StepAction::Branch("b".to_string())
        );
        assert_eq!(graph.get_step("b", 0).unwrap().action, StepAction::Redirect);
        assert_eq!(graph.get_step("b", 0).unwrap().advance_label, None);
    }

    #[test]
    fn parse_ron_rejects_conflicting_action() {
        let result = FlowGraph::parse_ron(
            r#"#![enable(implicit_some)]
            (
                entry: "a",
                flows: [(name: "a", steps: [(text: "x", next_flow: "a", auto_redirect: true)])],
            )"#,
        );
        assert!(matches!(
            result,
            Err(FlowError::ConflictingAction { step: 0, .. })
        ));
    }

    #[test]
    fn lint_finds_unreachable_and_unlabeled() {
        let graph = FlowGraph::new(
            "a",
            vec![
                flow(
                    "a",
                    vec![
                        Step::new("one").branch("c"),
                        Step::new("never").redirect(),
                    ],
                ),
                flow("b", vec![Step::new("orphan").redirect()]),
                flow("c", vec![Step::new("end").redirect()]),
            ],
        )
        .unwrap();

        let warnings = graph.lint();
        assert!(warnings.contains(&LintWarning::NoAdvanceLabel {
            flow: "a".to_string(),
            step: 0
        }));
        assert!(warnings.contains(&LintWarning::UnreachableStep {
            flow: "a".to_string(),
            step: 1
        }));
        assert!(warnings.contains(&LintWarning::UnreachableFlow("b".to_string())));
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn landing_script_is_valid() {
        let path = std::path::PathBuf::from("content/landing.ron");
        let graph = FlowGraph::load_from_ron(&path).unwrap();
        assert_eq!(graph.entry(), "start");
        assert_eq!(graph.flow_length("how").unwrap(), 11);
        assert!(graph.lint().is_empty());
    }
}
