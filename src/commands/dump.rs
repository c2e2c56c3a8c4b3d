//! `dump-running-homeegrams`: print the homeegrams that are currently running.

use super::next_message;
use crate::error::AppError;
use crate::hub::HubSession;
use crate::protocol::{HubMessage, RunningRoutine, Snapshot};
use crate::watchdog::Watchdog;
use std::io::Write;
use tracing::trace;

enum State {
    AwaitingSnapshot,
    Done,
}

/// Wait for the full state and write the running homeegrams to `out` as a
/// pretty-printed JSON array.
pub async fn dump_running_homeegrams<S, W>(
    session: &mut S,
    watchdog: &Watchdog,
    out: &mut W,
) -> Result<(), AppError>
where
    S: HubSession + ?Sized,
    W: Write,
{
    let mut state = State::AwaitingSnapshot;
    loop {
        state = match state {
            State::AwaitingSnapshot => match next_message(session, watchdog).await? {
                HubMessage::Snapshot(snapshot) => {
                    let routines = running_routines(&snapshot)?;
                    writeln!(out, "{}", serde_json::to_string_pretty(&routines)?)?;
                    out.flush()?;
                    State::Done
                }
                other => {
                    trace!(?other, "Ignoring message while awaiting snapshot");
                    State::AwaitingSnapshot
                }
            },
            State::Done => return Ok(()),
        };
    }
}

/// Running homeegrams in snapshot order, skipping any without usable numbers.
pub fn running_routines(snapshot: &Snapshot) -> Result<Vec<RunningRoutine>, AppError> {
    let homeegrams = snapshot
        .homeegrams
        .as_ref()
        .ok_or_else(|| AppError::Protocol("Homee failed to send homeegrams.".to_string()))?;

    Ok(homeegrams
        .iter()
        .filter_map(RunningRoutine::from_homeegram)
        .collect())
}
