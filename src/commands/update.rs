//! `update-s-day-phase-start`: move the s.-day phase homeegram's time trigger
//! according to last night's sleep.
//!
//! 1. Find the homeegram's time trigger in the full state.
//! 2. Read the sleep times, compute the new trigger and send it.
//! 3. Wait for the hub to echo the trigger back and compare it.

use super::next_message;
use crate::clock::extract_sleep_times;
use crate::config::PhaseSettings;
use crate::error::AppError;
use crate::hub::HubSession;
use crate::input::SleepTextSource;
use crate::protocol::{Homeegram, HubCommand, HubMessage, Snapshot};
use crate::trigger::TimeTriggerUpdate;
use crate::watchdog::Watchdog;
use chrono::Local;
use std::io::Write;
use tracing::{debug, trace};

enum State {
    AwaitingSnapshot,
    AwaitingEcho { expected: TimeTriggerUpdate },
    Done,
}

pub async fn update_s_day_phase_start<S, T, W>(
    session: &mut S,
    watchdog: &mut Watchdog,
    settings: &PhaseSettings,
    source: &mut T,
    out: &mut W,
) -> Result<(), AppError>
where
    S: HubSession + ?Sized,
    T: SleepTextSource + ?Sized,
    W: Write,
{
    let mut state = State::AwaitingSnapshot;
    loop {
        state = match state {
            State::AwaitingSnapshot => match next_message(session, watchdog).await? {
                HubMessage::Snapshot(snapshot) => {
                    let trigger_id = find_time_trigger_id(&snapshot, settings.homeegram_id)
                        .ok_or_else(|| {
                            AppError::Protocol(
                                "Couldn't determine time trigger ID in answer to `GET:all` \
                                 command. Does the homeegram and a time trigger for it exist?"
                                    .to_string(),
                            )
                        })?;

                    // Reading the sleep times waits on the user, not on the hub.
                    watchdog.suspend();
                    let expected =
                        send_update(session, settings, source, trigger_id, out).await?;
                    watchdog.arm();

                    State::AwaitingEcho { expected }
                }
                other => {
                    trace!(?other, "Ignoring message while awaiting snapshot");
                    State::AwaitingSnapshot
                }
            },
            State::AwaitingEcho { expected } => match next_message(session, watchdog).await? {
                HubMessage::Homeegram(homeegram)
                    if homeegram.id == Some(settings.homeegram_id) =>
                {
                    if !echo_matches(&homeegram, settings.homeegram_id, &expected) {
                        return Err(AppError::Protocol(
                            "Homee failed to update time trigger.".to_string(),
                        ));
                    }
                    writeln!(
                        out,
                        "Received confirmation about time trigger update from Homee."
                    )?;
                    State::Done
                }
                other => {
                    trace!(?other, "Ignoring message while awaiting trigger echo");
                    State::AwaitingEcho { expected }
                }
            },
            State::Done => return Ok(()),
        };
    }
}

/// ID of the first time trigger owned by the homeegram.
fn find_time_trigger_id(snapshot: &Snapshot, homeegram_id: i64) -> Option<i64> {
    snapshot
        .homeegrams
        .as_ref()?
        .iter()
        .find(|homeegram| homeegram.id == Some(homeegram_id))?
        .time_triggers()
        .iter()
        .find(|trigger| trigger.homeegram_id == Some(homeegram_id))?
        .id
}

async fn send_update<S, T, W>(
    session: &mut S,
    settings: &PhaseSettings,
    source: &mut T,
    trigger_id: i64,
    out: &mut W,
) -> Result<TimeTriggerUpdate, AppError>
where
    S: HubSession + ?Sized,
    T: SleepTextSource + ?Sized,
    W: Write,
{
    let origin = source.origin();
    let text = source.read_text().await?;
    if origin.is_interactive() && !session.is_connected() {
        return Err(AppError::ConnectionLost);
    }

    let sleep = extract_sleep_times(&text, origin.noun())?;
    let suffix = if origin.is_interactive() {
        String::new()
    } else {
        format!(" from {}", origin.noun())
    };
    writeln!(
        out,
        "Using sleep start {} and end {}{}.",
        sleep.start.text, sleep.end.text, suffix
    )?;

    let fire_at = settings.model.phase_start(sleep.start.time, sleep.end.time);
    let update = TimeTriggerUpdate::new(trigger_id, fire_at, &Local::now());
    debug!(?update, "Computed time trigger");

    session
        .send(&HubCommand::UpdateTimeTrigger {
            homeegram_id: settings.homeegram_id,
            update: update.clone(),
        })
        .await?;
    writeln!(
        out,
        "Requested Homee to update homeegram's time trigger to {}.",
        fire_at
    )?;

    Ok(update)
}

/// Whether the echoed homeegram carries exactly the trigger that was sent.
fn echo_matches(homeegram: &Homeegram, homeegram_id: i64, expected: &TimeTriggerUpdate) -> bool {
    homeegram
        .time_triggers()
        .iter()
        .find(|trigger| {
            trigger.homeegram_id == Some(homeegram_id) && trigger.id == Some(expected.trigger_id)
        })
        .is_some_and(|trigger| {
            trigger.dtstart.as_deref() == Some(expected.dtstart.as_str())
                && trigger.rrule.as_deref() == Some(expected.rrule.as_str())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fake::FakeHub;
    use crate::input::TextOrigin;
    use crate::protocol::{TimeTrigger, Triggers};
    use crate::trigger::SleepModel;
    use async_trait::async_trait;
    use std::time::Duration;

    const HOMEEGRAM_ID: i64 = 13;
    const TRIGGER_ID: i64 = 42;

    struct FixedText {
        text: &'static str,
        origin: TextOrigin,
        delay: Duration,
    }

    impl FixedText {
        fn clipboard(text: &'static str) -> Self {
            Self {
                text,
                origin: TextOrigin::Clipboard,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl SleepTextSource for FixedText {
        fn origin(&self) -> TextOrigin {
            self.origin
        }

        async fn read_text(&mut self) -> Result<String, AppError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.text.to_string())
        }
    }

    fn settings() -> PhaseSettings {
        PhaseSettings {
            homeegram_id: HOMEEGRAM_ID,
            model: SleepModel::new(8.4167, 8.0, 0.4).unwrap(),
        }
    }

    fn snapshot() -> HubMessage {
        HubMessage::decode(
            r#"{"all":{"homeegrams":[
                {"id":12,"play":false,"triggers":{"time_triggers":[{"id":1,"homeegram_id":12}]}},
                {"id":13,"play":false,"triggers":{"time_triggers":[
                    {"id":42,"homeegram_id":13,"dtstart":"20230101T000000Z",
                     "rrule":"FREQ=DAILY;INTERVAL=1;BYHOUR=15;BYMINUTE=0;BYSECOND=0"}]}}]}}"#,
        )
        .unwrap()
    }

    fn echo(dtstart: &str, rrule: &str) -> HubMessage {
        HubMessage::Homeegram(Homeegram {
            id: Some(HOMEEGRAM_ID),
            triggers: Some(Triggers {
                time_triggers: Some(vec![TimeTrigger {
                    id: Some(TRIGGER_ID),
                    homeegram_id: Some(HOMEEGRAM_ID),
                    dtstart: Some(dtstart.to_string()),
                    rrule: Some(rrule.to_string()),
                }]),
            }),
            ..Homeegram::default()
        })
    }

    /// Hub that echoes each trigger update, passing the rrule through `edit`.
    fn echoing_hub(edit: fn(&str) -> String) -> FakeHub {
        FakeHub::new([HubMessage::Other, snapshot()]).replying(move |command| match command {
            HubCommand::UpdateTimeTrigger { update, .. } => {
                Some(echo(&update.dtstart, &edit(&update.rrule)))
            }
            HubCommand::GetAll => None,
        })
    }

    async fn run(
        hub: &mut FakeHub,
        source: &mut FixedText,
    ) -> (Result<(), AppError>, String) {
        let mut watchdog = Watchdog::new(Duration::from_secs(10));
        watchdog.arm();
        let mut out = Vec::new();
        let result =
            update_s_day_phase_start(hub, &mut watchdog, &settings(), source, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_update_confirmed_by_echo() {
        let mut hub = echoing_hub(str::to_string);
        let mut source = FixedText::clipboard("Sleep: 11:00pm - 7:00am");

        let (result, output) = run(&mut hub, &mut source).await;
        result.unwrap();

        let HubCommand::UpdateTimeTrigger {
            homeegram_id,
            update,
        } = &hub.sent[0]
        else {
            panic!("expected a trigger update");
        };
        assert_eq!(*homeegram_id, HOMEEGRAM_ID);
        assert_eq!(update.trigger_id, TRIGGER_ID);
        assert_eq!(
            update.rrule,
            "FREQ=DAILY;INTERVAL=1;BYHOUR=14;BYMINUTE=50;BYSECOND=0"
        );
        assert_eq!(update.dtstart.len(), "20240101T000000Z".len());

        assert_eq!(
            output,
            "Using sleep start 11:00pm and end 7:00am from clipboard.\n\
             Requested Homee to update homeegram's time trigger to 14:50.\n\
             Received confirmation about time trigger update from Homee.\n"
        );
    }

    #[tokio::test]
    async fn test_echo_mismatch_fails() {
        let mut hub = echoing_hub(|rrule| rrule.replace("BYMINUTE=50", "BYMINUTE=55"));
        let mut source = FixedText::clipboard("23:00 07:00");

        let (result, output) = run(&mut hub, &mut source).await;
        let err = result.unwrap_err();
        assert!(matches!(err, AppError::Protocol(_)));
        assert_eq!(err.to_string(), "Homee failed to update time trigger.");
        assert!(!output.contains("confirmation"));
    }

    #[tokio::test]
    async fn test_echo_for_other_homeegram_ignored() {
        let mut hub = FakeHub::new([snapshot()]).replying(|command| match command {
            HubCommand::UpdateTimeTrigger { .. } => Some(HubMessage::Homeegram(Homeegram {
                id: Some(99),
                ..Homeegram::default()
            })),
            HubCommand::GetAll => None,
        });
        let mut source = FixedText::clipboard("23:00 07:00");

        // Nothing else arrives, so the closed fake ends the wait.
        let (result, _) = run(&mut hub, &mut source).await;
        assert!(matches!(result, Err(AppError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_missing_trigger_fails_before_reading_input() {
        let mut hub = FakeHub::new([HubMessage::decode(
            r#"{"all":{"homeegrams":[{"id":13,"play":false,"triggers":{"time_triggers":[]}}]}}"#,
        )
        .unwrap()]);
        let mut source = FixedText::clipboard("23:00 07:00");

        let (result, output) = run(&mut hub, &mut source).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Does the homeegram and a time trigger for it exist?"));
        assert!(output.is_empty());
        assert!(hub.sent.is_empty());
    }

    #[tokio::test]
    async fn test_bad_input_sends_nothing() {
        let mut hub = echoing_hub(str::to_string);
        let mut source = FixedText::clipboard("only 23:00");

        let (result, _) = run(&mut hub, &mut source).await;
        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Couldn't find exactly two clock times in the clipboard."
        );
        assert!(hub.sent.is_empty());
    }

    #[tokio::test]
    async fn test_connection_lost_during_prompt() {
        let mut hub = echoing_hub(str::to_string);
        hub.connected = false;
        let mut source = FixedText {
            text: "23:00 07:00",
            origin: TextOrigin::Prompt,
            delay: Duration::ZERO,
        };

        let (result, _) = run(&mut hub, &mut source).await;
        assert!(matches!(result, Err(AppError::ConnectionLost)));
        assert!(hub.sent.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_prompt_does_not_time_out() {
        let mut hub = echoing_hub(str::to_string).stalling();
        let mut source = FixedText {
            text: "23:00 07:00",
            origin: TextOrigin::Prompt,
            delay: Duration::from_secs(120),
        };

        let (result, output) = run(&mut hub, &mut source).await;
        result.unwrap();
        assert!(output.starts_with("Using sleep start 23:00 and end 07:00.\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_echo_times_out() {
        let mut hub = FakeHub::new([snapshot()]).stalling();
        let mut source = FixedText::clipboard("23:00 07:00");

        let (result, output) = run(&mut hub, &mut source).await;
        assert!(matches!(result, Err(AppError::Timeout)));
        assert_eq!(hub.sent.len(), 1);
        assert!(output.contains("Requested Homee"));
    }
}
