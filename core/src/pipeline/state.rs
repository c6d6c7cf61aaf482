//! Transition table for the research and curriculum pipelines.
//!
//! Each action names the statuses it may start from, an optional status held
//! while it runs, and the status it lands on. A failed action returns the
//! entity to exactly the status it had before the action started.

use std::fmt;

use crate::error::{CoreError, Result};

#[derive(Debug)]
pub struct Transition<S: 'static> {
    pub action: &'static str,
    pub precursors: &'static [S],
    pub in_progress: Option<S>,
    pub done: S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// A started action: remembers where the entity came from.
#[derive(Debug, Clone, Copy)]
pub struct Attempt<S: 'static> {
    transition: &'static Transition<S>,
    prior: S,
}

impl<S> Attempt<S>
where
    S: Copy + PartialEq + fmt::Display + 'static,
{
    /// Start `transition` from `current`, or refuse with `PipelineState`.
    pub fn begin(transition: &'static Transition<S>, current: S) -> Result<Self> {
        if !transition.precursors.contains(&current) {
            let allowed = transition
                .precursors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(CoreError::PipelineState(format!(
                "Cannot {} while status is '{current}' (allowed from: {allowed})",
                transition.action
            )));
        }
        Ok(Self {
            transition,
            prior: current,
        })
    }

    pub fn action(&self) -> &'static str {
        self.transition.action
    }

    pub fn prior(&self) -> S {
        self.prior
    }

    /// Status persisted while the action runs.
    pub fn marker(&self) -> S {
        self.transition.in_progress.unwrap_or(self.prior)
    }

    pub fn settle(&self, outcome: Outcome) -> S {
        match outcome {
            Outcome::Succeeded => self.transition.done,
            Outcome::Failed => self.prior,
        }
    }
}

pub mod research {
    use super::Transition;
    use crate::models::ResearchStatus::{self, *};

    pub static RESEARCH: Transition<ResearchStatus> = Transition {
        action: "research",
        precursors: &[TopicInput, ResearchComplete],
        in_progress: Some(Researching),
        done: ResearchComplete,
    };

    pub static GENERATE_LESSON: Transition<ResearchStatus> = Transition {
        action: "generate a lesson",
        precursors: &[ResearchComplete, Generated, Ready],
        in_progress: Some(Generating),
        done: Generated,
    };

    pub static DISCOVER_MEDIA: Transition<ResearchStatus> = Transition {
        action: "discover media",
        precursors: &[Generated, Ready],
        in_progress: Some(Enriching),
        done: Ready,
    };

    pub static PUBLISH: Transition<ResearchStatus> = Transition {
        action: "publish",
        precursors: &[Ready],
        in_progress: None,
        done: Published,
    };

    pub static ALL: [&Transition<ResearchStatus>; 4] =
        [&RESEARCH, &GENERATE_LESSON, &DISCOVER_MEDIA, &PUBLISH];
}

pub mod curriculum {
    use super::Transition;
    use crate::models::CurriculumStatus::{self, *};

    pub static GENERATE_OUTLINE: Transition<CurriculumStatus> = Transition {
        action: "generate an outline",
        precursors: &[Planning, OutlineReady],
        in_progress: Some(Planning),
        done: OutlineReady,
    };

    pub static GENERATE_LESSONS: Transition<CurriculumStatus> = Transition {
        action: "generate lessons",
        precursors: &[OutlineReady, Complete],
        in_progress: Some(Generating),
        done: Complete,
    };

    pub static PUBLISH: Transition<CurriculumStatus> = Transition {
        action: "publish",
        precursors: &[Complete],
        in_progress: None,
        done: Published,
    };

    pub static ALL: [&Transition<CurriculumStatus>; 3] =
        [&GENERATE_OUTLINE, &GENERATE_LESSONS, &PUBLISH];
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::models::{CurriculumStatus, ResearchStatus};
    use pretty_assertions::assert_eq;

    /// Position in the fixed stage order.
    trait StageOrder: Copy + PartialEq + 'static {
        const ORDER: &'static [Self];

        fn rank(self) -> usize {
            Self::ORDER
                .iter()
                .position(|stage| *stage == self)
                .unwrap_or(usize::MAX)
        }
    }

    impl StageOrder for ResearchStatus {
        const ORDER: &'static [Self] = ResearchStatus::ALL;
    }

    impl StageOrder for CurriculumStatus {
        const ORDER: &'static [Self] = CurriculumStatus::ALL;
    }

    /// Success lands one stage past the marker, or past the lone precursor
    /// for actions without one.
    fn assert_single_steps<S>(table: &[&'static Transition<S>])
    where
        S: StageOrder + fmt::Debug + fmt::Display,
    {
        for transition in table {
            let from = match transition.in_progress {
                Some(marker) => marker,
                None => {
                    assert_eq!(transition.precursors.len(), 1, "{}", transition.action);
                    transition.precursors[0]
                }
            };
            assert_eq!(
                transition.done.rank(),
                from.rank() + 1,
                "{} must advance one stage",
                transition.action
            );
        }
    }

    fn assert_failures_restore<S>(table: &[&'static Transition<S>])
    where
        S: StageOrder + fmt::Debug + fmt::Display,
    {
        for transition in table {
            for &current in transition.precursors {
                let attempt = Attempt::begin(transition, current)
                    .unwrap_or_else(|e| panic!("{} from {current}: {e}", transition.action));
                assert_eq!(attempt.settle(Outcome::Failed), current);
            }
        }
    }

    #[test]
    fn test_forward_moves_are_single_steps() {
        assert_single_steps(&research::ALL);
        assert_single_steps(&curriculum::ALL);
    }

    #[test]
    fn test_failures_restore_prior_status() {
        assert_failures_restore(&research::ALL);
        assert_failures_restore(&curriculum::ALL);
    }

    #[test]
    fn test_canonical_precursor_is_one_step_before_marker() {
        for transition in research::ALL {
            if let Some(marker) = transition.in_progress {
                assert!(
                    transition
                        .precursors
                        .iter()
                        .any(|p| p.rank() + 1 == marker.rank()),
                    "{}",
                    transition.action
                );
            }
        }
    }

    #[test]
    fn test_disallowed_start_is_rejected() {
        let err = Attempt::begin(&research::PUBLISH, ResearchStatus::Generated).err();
        match err {
            Some(CoreError::PipelineState(message)) => {
                assert_eq!(
                    message,
                    "Cannot publish while status is 'generated' (allowed from: ready)"
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(Attempt::begin(&curriculum::GENERATE_LESSONS, CurriculumStatus::Planning).is_err());
        assert!(Attempt::begin(&research::RESEARCH, ResearchStatus::Researching).is_err());
    }

    #[test]
    fn test_markers_and_retrigger() {
        let attempt = Attempt::begin(&research::GENERATE_LESSON, ResearchStatus::Ready)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(attempt.marker(), ResearchStatus::Generating);
        assert_eq!(attempt.settle(Outcome::Succeeded), ResearchStatus::Generated);
        assert_eq!(attempt.settle(Outcome::Failed), ResearchStatus::Ready);

        let publish = Attempt::begin(&curriculum::PUBLISH, CurriculumStatus::Complete)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(publish.marker(), CurriculumStatus::Complete);
        assert_eq!(publish.settle(Outcome::Succeeded), CurriculumStatus::Published);
    }
}
