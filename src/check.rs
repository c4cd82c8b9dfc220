// The protocol-agnostic half of the check: drive a mailbox session through
// count / optional delete / close and turn the count into a result.

use error_stack::Result;
use tracing::{debug, info, warn};

use crate::configuration::{Action, CheckConfig};
use crate::errors::CheckError;
use crate::thresholds::{self, Status};

/// One authenticated mailbox session, reduced to the three operations the
/// check needs.  Implemented by [`crate::pop3::Pop3Session`] for real
/// servers and by test doubles in the unit tests.
pub trait MailboxSession {
    /// Number of messages currently in the mailbox.
    fn count(&mut self) -> Result<u32, CheckError>;

    /// Requests deletion of the message at the given 1-based sequence index.
    fn delete(&mut self, index: u32) -> Result<(), CheckError>;

    /// Ends the session, releasing the server-side maildrop lock (and, for
    /// POP3, committing any pending deletions).
    fn close(&mut self) -> Result<(), CheckError>;
}

/// Terminal outcome of one invocation.
#[derive(Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub status: Status,
    pub count: u32,
    pub message: String,
}

impl CheckResult {
    fn new(action: Action, count: u32, status: Status) -> Self {
        let verb = match action {
            Action::Count => "Counted",
            Action::Delete => "Deleted",
        };
        let plural = if count == 1 { "" } else { "s" };
        CheckResult {
            status,
            count,
            message: format!("{verb} {count} message{plural}"),
        }
    }
}

/// Runs one check against an already-connected session.
///
/// `close()` is called on every exit path, including after a failed count
/// or a failed delete; skipping it would leak the server-side session lock.
#[tracing::instrument(skip(config, session), fields(action = ?config.action))]
pub fn run_check<S: MailboxSession>(
    config: &CheckConfig,
    session: &mut S,
) -> Result<CheckResult, CheckError> {
    let outcome = count_and_maybe_delete(config, session);

    if let Err(close_err) = session.close() {
        // Not fatal on its own: the count (if we got one) is still valid.
        warn!("failed to close the session cleanly: {close_err:?}");
    }

    let count = outcome?;
    let status = thresholds::evaluate(count, config.warning.as_ref(), config.critical.as_ref());
    debug!("count {count} evaluated to {status}");

    Ok(CheckResult::new(config.action, count, status))
}

fn count_and_maybe_delete<S: MailboxSession>(
    config: &CheckConfig,
    session: &mut S,
) -> Result<u32, CheckError> {
    let count = session.count()?;
    info!("mailbox holds {count} messages");

    if config.action == Action::Delete {
        // Every observed message is targeted, and one failed request does
        // not stop the rest.  The reported total stays the pre-deletion
        // count even when some requests fail, matching what the summary
        // line promises the supervisor.
        let mut failed = 0u32;
        for index in 1..=count {
            if let Err(delete_err) = session.delete(index) {
                warn!("delete request for message {index} failed: {delete_err:?}");
                failed += 1;
            }
        }
        if failed > 0 {
            warn!("{failed} of {count} delete requests failed");
        }
    }

    Ok(count)
}
