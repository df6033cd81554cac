//! Guarded transition graph for domain status enums.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while defining or querying a transition graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The definition contained no source states.
    #[error("Transition map must define at least one source state")]
    EmptyDefinition,

    /// A source state listed an empty target list.
    #[error("State {state} lists no targets; omit it to forbid all transitions")]
    EmptyTargets { state: String },

    /// The current state was never registered as a source.
    #[error("No transitions defined for state {state}")]
    NoTransitionsDefined { state: String },

    /// The requested transition is not in the graph.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

type Comparator<S> = Arc<dyn Fn(&S, &S) -> bool + Send + Sync>;

/// Explicit map of legal `state -> state` transitions.
///
/// Unlike [`TrackingState`](crate::TrackingState), this is a strict guarded
/// machine: anything not listed is rejected.
///
/// ```
/// use domain::TransitionGraph;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Status { Active, Inactive, Archived }
///
/// let mut graph = TransitionGraph::new();
/// graph
///     .define_transitions([
///         (Status::Active, vec![Status::Inactive]),
///         (Status::Inactive, vec![Status::Active, Status::Archived]),
///     ])
///     .unwrap();
///
/// assert!(graph.can_transition_to(&Status::Active, &Status::Inactive).unwrap());
/// assert!(!graph.can_transition_to(&Status::Active, &Status::Archived).unwrap());
/// assert!(graph.can_transition_to(&Status::Archived, &Status::Active).is_err());
/// ```
pub struct TransitionGraph<S> {
    transitions: Vec<(S, Vec<S>)>,
    comparator: Comparator<S>,
}

impl<S: PartialEq + 'static> TransitionGraph<S> {
    /// Creates an empty graph comparing states with `==`.
    pub fn new() -> Self {
        Self::with_comparator(|a: &S, b: &S| a == b)
    }
}

impl<S: PartialEq + 'static> Default for TransitionGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> TransitionGraph<S> {
    /// Creates an empty graph comparing states with `comparator`.
    pub fn with_comparator<F>(comparator: F) -> Self
    where
        F: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        Self {
            transitions: Vec::new(),
            comparator: Arc::new(comparator),
        }
    }

    /// Returns true if `state` has been registered as a source.
    pub fn is_defined(&self, state: &S) -> bool {
        self.position(state).is_some()
    }

    /// Returns the number of source states.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    fn position(&self, state: &S) -> Option<usize> {
        self.transitions
            .iter()
            .position(|(source, _)| (self.comparator)(source, state))
    }
}

impl<S: fmt::Debug> TransitionGraph<S> {
    /// Replaces the graph with `definition`.
    ///
    /// The whole definition is checked before anything is stored, so a
    /// rejected definition leaves the previous graph untouched. A source
    /// listed twice keeps its last target list.
    pub fn define_transitions<I>(&mut self, definition: I) -> Result<(), TransitionError>
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
    {
        let mut next = Self {
            transitions: Vec::new(),
            comparator: Arc::clone(&self.comparator),
        };

        for (source, targets) in definition {
            if targets.is_empty() {
                return Err(TransitionError::EmptyTargets {
                    state: format!("{source:?}"),
                });
            }
            match next.position(&source) {
                Some(index) => next.transitions[index] = (source, targets),
                None => next.transitions.push((source, targets)),
            }
        }

        if next.transitions.is_empty() {
            return Err(TransitionError::EmptyDefinition);
        }

        self.transitions = next.transitions;
        Ok(())
    }

    /// Returns the targets reachable from `current`.
    pub fn allowed_targets(&self, current: &S) -> Result<&[S], TransitionError> {
        self.position(current)
            .map(|index| self.transitions[index].1.as_slice())
            .ok_or_else(|| TransitionError::NoTransitionsDefined {
                state: format!("{current:?}"),
            })
    }

    /// Returns whether `current -> next` is a listed transition.
    ///
    /// Fails with [`TransitionError::NoTransitionsDefined`] if `current`
    /// was never registered as a source.
    pub fn can_transition_to(&self, current: &S, next: &S) -> Result<bool, TransitionError> {
        let targets = self.allowed_targets(current)?;
        Ok(targets.iter().any(|target| (self.comparator)(target, next)))
    }

    /// Fails unless `current -> next` is a listed transition.
    pub fn validate_transition(&self, current: &S, next: &S) -> Result<(), TransitionError> {
        if self.can_transition_to(current, next)? {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                from: format!("{current:?}"),
                to: format!("{next:?}"),
            })
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for TransitionGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.transitions.iter().map(|(s, t)| (s, t)))
            .finish()
    }
}
