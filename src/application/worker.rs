//! Background submission worker.
//!
//! Runs assess → recommend → save on its own thread so a front end can keep
//! redrawing while the advisor or a networked store is slow to answer.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::domain::PatientInput;

use super::{AppContext, Submission};

/// Progress updates from the submission worker.
#[derive(Debug, Clone)]
pub enum SubmissionProgress {
    /// Validating input and computing metrics
    Assessing,
    /// Waiting on the advisor
    Advising,
    /// Writing the record
    Saving,
    /// Submission finished (possibly via fallback; see the outcome's warnings)
    Complete(Box<Submission>),
    /// Submission failed
    Error(String),
}

impl SubmissionProgress {
    /// Whether no further updates will follow.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }
}

/// Handle to a running submission.
pub struct SubmissionHandle {
    /// Receiver for progress updates
    pub progress_rx: Receiver<SubmissionProgress>,
    _handle: JoinHandle<()>,
}

impl SubmissionHandle {
    /// Try to receive the next progress update (non-blocking).
    #[must_use]
    pub fn try_recv(&self) -> Option<SubmissionProgress> {
        self.progress_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next update.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SubmissionProgress> {
        match self.progress_rx.recv_timeout(timeout) {
            Ok(progress) => Some(progress),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Block until the final update, discarding intermediate ones.
    ///
    /// Returns `SubmissionProgress::Error` if the worker exits without one.
    #[must_use]
    pub fn wait(self) -> SubmissionProgress {
        for progress in self.progress_rx.iter() {
            if progress.is_final() {
                return progress;
            }
        }
        SubmissionProgress::Error("Submission worker exited unexpectedly".to_string())
    }
}

/// Worker that runs a submission in the background.
pub struct SubmissionWorker;

impl SubmissionWorker {
    /// Spawn a background submission.
    ///
    /// Returns a handle to receive progress updates.
    pub fn spawn(context: Arc<AppContext>, input: PatientInput) -> SubmissionHandle {
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            Self::run_with_progress(&context, input, &tx);
        });

        SubmissionHandle {
            progress_rx: rx,
            _handle: handle,
        }
    }

    fn run_with_progress(context: &AppContext, input: PatientInput, tx: &Sender<SubmissionProgress>) {
        let _ = tx.send(SubmissionProgress::Assessing);
        let assessment = match context.assessments().assess(input) {
            Ok(a) => a,
            Err(e) => {
                let _ = tx.send(SubmissionProgress::Error(e.to_string()));
                return;
            }
        };

        let _ = tx.send(SubmissionProgress::Advising);
        let recommendation = context.assessments().recommend(&assessment);
        let record = context
            .assessments()
            .build_record(&assessment, &recommendation, context.actor());

        let _ = tx.send(SubmissionProgress::Saving);
        match context.save(&record) {
            Ok(outcome) => {
                let _ = tx.send(SubmissionProgress::Complete(Box::new(Submission {
                    assessment,
                    recommendation,
                    record,
                    saved: Some(outcome),
                })));
            }
            Err(e) => {
                tracing::error!("Submission of record {} failed: {}", record.id, e);
                let _ = tx.send(SubmissionProgress::Error(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::sample_input;

    fn context() -> Arc<AppContext> {
        Arc::new(AppContext::build(AppConfig::default()).expect("Should build"))
    }

    #[test]
    fn test_progress_sequence() {
        let handle = SubmissionWorker::spawn(context(), sample_input());
        let updates: Vec<SubmissionProgress> = handle.progress_rx.iter().collect();

        assert_eq!(updates.len(), 4);
        assert!(matches!(updates[0], SubmissionProgress::Assessing));
        assert!(matches!(updates[1], SubmissionProgress::Advising));
        assert!(matches!(updates[2], SubmissionProgress::Saving));
        match &updates[3] {
            SubmissionProgress::Complete(s) => {
                assert_eq!(s.record.risk_level, "High Risk");
                assert!(s.saved.is_some());
            }
            other => panic!("Unexpected final update: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_input_reports_error() {
        let input = PatientInput {
            weight: -1.0,
            ..sample_input()
        };
        let final_update = SubmissionWorker::spawn(context(), input).wait();
        assert!(matches!(final_update, SubmissionProgress::Error(msg) if msg.contains("weight")));
    }

    #[test]
    fn test_saved_record_is_listed() {
        let ctx = context();
        let final_update = SubmissionWorker::spawn(ctx.clone(), sample_input()).wait();
        let SubmissionProgress::Complete(submission) = final_update else {
            panic!("Should complete");
        };
        let listing = ctx.records().list().expect("Should list");
        assert_eq!(listing.records, vec![submission.record]);
    }
}
