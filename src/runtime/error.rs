use crate::model::DeadLetter;
use std::fmt;

/// Terminal, caller-visible outcome of an acquisition that did not complete.
#[derive(Debug)]
pub enum AcquisitionError {
    /// The listing endpoint kept failing even for single-item pages.
    ListingExhausted {
        address: String,
        skip: u64,
        source: anyhow::Error,
    },
    /// At least one item exceeded its retry cap.
    DeadLettered { dead_letters: Vec<DeadLetter> },
    /// The join barrier resolved but results and dead letters do not cover the work set.
    Incomplete {
        expected: usize,
        completed: usize,
        dead_lettered: usize,
    },
    Cancelled,
}

impl AcquisitionError {
    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<AcquisitionError>(),
            Some(AcquisitionError::Cancelled)
        )
    }

    pub fn dead_letters(&self) -> &[DeadLetter] {
        match self {
            AcquisitionError::DeadLettered { dead_letters } => dead_letters,
            _ => &[],
        }
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionError::ListingExhausted {
                address,
                skip,
                source,
            } => write!(
                f,
                "failed to list unspents for {address} at skip {skip} even with page size 1: {source}"
            ),
            AcquisitionError::DeadLettered { dead_letters } => {
                write!(f, "{} item(s) exceeded their retry cap", dead_letters.len())?;
                if let Some(first) = dead_letters.first() {
                    write!(
                        f,
                        " (first: {} after {} attempt(s): {})",
                        first.item.id(),
                        first.attempts,
                        first.last_error
                    )?;
                }
                Ok(())
            }
            AcquisitionError::Incomplete {
                expected,
                completed,
                dead_lettered,
            } => write!(
                f,
                "acquisition finished with {completed} result(s) and {dead_lettered} dead letter(s) \
                 for {expected} item(s)"
            ),
            AcquisitionError::Cancelled => f.write_str("acquisition cancelled"),
        }
    }
}

impl std::error::Error for AcquisitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AcquisitionError::ListingExhausted { source, .. } => Some(&**source),
            _ => None,
        }
    }
}
