//! Status events streamed from a running job to whoever invoked it.
//!
//! The channel is unbounded; the consumer is expected to drain it. Dropping the
//! receiver cancels the job at the next stage boundary.

use crate::error::DeviationError;
use crossbeam::channel::{self, Receiver, Sender};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dataset {
    Reference,
    Candidate,
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Reference => f.write_str("reference"),
            Dataset::Candidate => f.write_str("candidate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Validate,
    Clean(Dataset),
    Presplit(Dataset),
    Junctions(Dataset),
    JunctionMatching,
    /// Cutpoints placed on the given dataset.
    Cutpoints(Dataset),
    Resegment(Dataset),
    CandidateSearch,
    Scoring,
    Selection,
    NameSimilarity,
    Results,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validate => write!(f, "validating input"),
            Stage::Clean(d) => write!(f, "cleaning {d} dataset"),
            Stage::Presplit(d) => write!(f, "presplitting {d} lines"),
            Stage::Junctions(d) => write!(f, "generating {d} junctions"),
            Stage::JunctionMatching => write!(f, "junction matching"),
            Stage::Cutpoints(d) => write!(f, "creating cutpoints for {d} dataset"),
            Stage::Resegment(d) => write!(f, "splitting {d} lines at cutpoints"),
            Stage::CandidateSearch => write!(f, "collecting potential matches"),
            Stage::Scoring => write!(f, "scoring potential matches"),
            Stage::Selection => write!(f, "selecting matching pairs"),
            Stage::NameSimilarity => write!(f, "computing name similarity"),
            Stage::Results => write!(f, "building result layers"),
            Stage::Publish => write!(f, "publishing collections"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProgressEvent {
    Started { stage: Stage },
    Finished { stage: Stage, items: usize },
    Note { stage: Stage, message: String },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Started { stage } => write!(f, "{stage}..."),
            ProgressEvent::Finished { stage, items } => write!(f, "{stage}: done ({items})"),
            ProgressEvent::Note { stage, message } => write!(f, "{stage}: {message}"),
        }
    }
}

/// Sending side handed to the pipeline.
#[derive(Debug, Clone)]
pub struct Progress {
    sender: Option<Sender<ProgressEvent>>,
}

impl Progress {
    /// A reporter plus the stream the caller should drain.
    pub fn channel() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = channel::unbounded();
        (Self { sender: Some(tx) }, rx)
    }

    /// Reporter that nobody listens to and that never cancels.
    pub fn silent() -> Self {
        Self { sender: None }
    }

    fn send(&self, event: ProgressEvent, stage: Stage) -> Result<(), DeviationError> {
        match &self.sender {
            Some(tx) => tx.send(event).map_err(|_| DeviationError::Cancelled(stage)),
            None => Ok(()),
        }
    }

    /// Announce a stage. Fails once the consumer has hung up.
    pub fn started(&self, stage: Stage) -> Result<(), DeviationError> {
        log::info!("{stage}");
        self.send(ProgressEvent::Started { stage }, stage)
    }

    pub fn finished(&self, stage: Stage, items: usize) -> Result<(), DeviationError> {
        log::debug!("{stage}: {items} items");
        self.send(ProgressEvent::Finished { stage, items }, stage)
    }

    pub fn note(&self, stage: Stage, message: impl Into<String>) -> Result<(), DeviationError> {
        self.send(
            ProgressEvent::Note {
                stage,
                message: message.into(),
            },
            stage,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (progress, rx) = Progress::channel();
        progress.started(Stage::JunctionMatching).unwrap();
        progress.finished(Stage::JunctionMatching, 4).unwrap();
        drop(progress);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                ProgressEvent::Started {
                    stage: Stage::JunctionMatching
                },
                ProgressEvent::Finished {
                    stage: Stage::JunctionMatching,
                    items: 4
                },
            ]
        );
    }

    #[test]
    fn test_dropped_receiver_cancels() {
        let (progress, rx) = Progress::channel();
        drop(rx);
        let err = progress.started(Stage::Scoring).unwrap_err();
        assert!(matches!(err, DeviationError::Cancelled(Stage::Scoring)));
    }

    #[test]
    fn test_silent_never_cancels() {
        assert!(Progress::silent().started(Stage::Scoring).is_ok());
    }
}
