//! Command handlers.
//!
//! Each handler is a small state machine driven by the hub's messages. The
//! handler waits for the next message with [`next_message`], which also
//! enforces the watchdog.

pub mod dump;
pub mod update;

use crate::config::Preferences;
use crate::error::AppError;
use crate::hub::{DeviceSession, HubSession};
use crate::protocol::HubMessage;
use crate::watchdog::Watchdog;

pub use dump::dump_running_homeegrams;
pub use update::update_s_day_phase_start;

/// Open the hub session, giving up when the watchdog expires.
pub async fn connect(prefs: &Preferences, watchdog: &Watchdog) -> Result<DeviceSession, AppError> {
    tokio::select! {
        session = DeviceSession::connect(
            &prefs.hub_host,
            &prefs.username,
            &prefs.password,
            prefs.timeout,
        ) => session,
        () = watchdog.expired() => Err(AppError::Timeout),
    }
}

/// Wait for the next inbound message while the watchdog runs.
///
/// A message that has already arrived wins over an expired watchdog.
pub async fn next_message<S>(session: &mut S, watchdog: &Watchdog) -> Result<HubMessage, AppError>
where
    S: HubSession + ?Sized,
{
    tokio::select! {
        biased;
        message = session.recv() => message,
        () = watchdog.expired() => Err(AppError::Timeout),
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeHub;
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_next_message_times_out() {
        let mut hub = FakeHub::new([]).stalling();
        let mut watchdog = Watchdog::new(Duration::from_secs(10));
        watchdog.arm();

        let err = next_message(&mut hub, &watchdog).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_message_beats_expired_watchdog() {
        let mut hub = FakeHub::new([HubMessage::Other]);
        let mut watchdog = Watchdog::new(Duration::from_secs(1));
        watchdog.arm();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(next_message(&mut hub, &watchdog).await.unwrap(), HubMessage::Other);
    }

    #[tokio::test]
    async fn test_closed_session_reports_connection_lost() {
        let mut hub = FakeHub::new([]);
        let watchdog = Watchdog::new(Duration::from_secs(10));
        let err = next_message(&mut hub, &watchdog).await.unwrap_err();
        assert!(matches!(err, AppError::ConnectionLost));
    }
}
