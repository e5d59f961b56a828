use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use super::catalog;
use super::models::{ProfileContext, TestId, TestOutcome, TestRunReport, TestRunSummary};
use super::DeviceError;
use crate::config::ConfigurationProfile;
use crate::serial::{CancelToken, SerialError, SerialInterface};

pub const DEFAULT_INTER_TEST_DELAY: Duration = Duration::from_millis(100);

const CANCELLED_DETAIL: &str = "run cancelled";

/// Runs an ordered list of catalog tests over one interface.
///
/// Individual failures never stop the run: every requested test ends up as
/// exactly one outcome and the summary is always produced. Cancellation
/// marks the current and remaining tests as failed.
pub struct TestSequencer<'a> {
    interface: &'a mut SerialInterface,
    inter_test_delay: Duration,
    cancel: CancelToken,
    profile: Option<ProfileContext>,
}

impl<'a> TestSequencer<'a> {
    pub fn new(interface: &'a mut SerialInterface) -> Self {
        Self {
            interface,
            inter_test_delay: DEFAULT_INTER_TEST_DELAY,
            cancel: CancelToken::never(),
            profile: None,
        }
    }

    /// Pause between consecutive tests; zero disables it
    pub fn with_inter_test_delay(mut self, delay: Duration) -> Self {
        self.inter_test_delay = delay;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Attach the product settings under test to the report
    pub fn with_profile(mut self, profile: &ConfigurationProfile) -> Self {
        self.profile = Some(ProfileContext::from(profile));
        self
    }

    /// Run the whole catalog in its fixed order
    pub async fn run_all<P>(&mut self, progress: P) -> TestRunReport
    where
        P: FnMut(&str, u8),
    {
        let keys: Vec<&str> = TestId::ALL.iter().map(|id| id.key()).collect();
        self.run(&keys, progress).await
    }

    /// Run `identifiers` in order, calling `progress(test_name, percent)` before each test
    pub async fn run<S, P>(&mut self, identifiers: &[S], mut progress: P) -> TestRunReport
    where
        S: AsRef<str>,
        P: FnMut(&str, u8),
    {
        let total = identifiers.len();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        log::info!("Starting test run {} with {} tests", run_id, total);

        // Reads observe the run's token until `scope` drops, even if this future is dropped early
        let mut scope = TokenScope::install(&mut *self.interface, self.cancel.clone());

        let mut outcomes = Vec::with_capacity(total);
        let mut cancelled = false;

        for (index, identifier) in identifiers.iter().enumerate() {
            let identifier = identifier.as_ref();
            let parsed = identifier.parse::<TestId>();
            let test_name = match &parsed {
                Ok(id) => id.display_name(),
                Err(_) => identifier,
            };

            if cancelled || self.cancel.is_cancelled() {
                cancelled = true;
                outcomes.push(TestOutcome::failed(test_name, parsed.ok(), CANCELLED_DETAIL));
                continue;
            }

            let percent = ((index + 1) * 100 / total) as u8;
            progress(test_name, percent);

            let outcome = match parsed {
                Ok(id) => match catalog::run_test_id(id, scope.interface()).await {
                    Ok(verdict) => TestOutcome::from_verdict(id, id.command_code(), verdict),
                    Err(DeviceError::SerialError(SerialError::Cancelled)) => {
                        cancelled = true;
                        TestOutcome::failed(test_name, Some(id), CANCELLED_DETAIL)
                    }
                    Err(e) => TestOutcome::failed(test_name, Some(id), e.to_string()),
                },
                Err(e) => {
                    log::warn!("Skipping {:?}: {}", identifier, e);
                    TestOutcome::failed(test_name, None, e.to_string())
                }
            };
            outcomes.push(outcome);

            if index + 1 < total && !self.inter_test_delay.is_zero() && !cancelled {
                tokio::select! {
                    _ = tokio::time::sleep(self.inter_test_delay) => {}
                    _ = self.cancel.cancelled() => cancelled = true,
                }
            }
        }

        drop(scope);

        let summary = TestRunSummary::from_outcomes(&outcomes, started_at, Utc::now(), clock.elapsed());

        if cancelled {
            log::warn!("Test run {} cancelled", run_id);
        }
        log::info!(
            "Test run {} finished: {}/{} passed ({:.2}%) in {:.2}s",
            run_id,
            summary.passed,
            summary.total,
            summary.pass_rate,
            summary.elapsed.as_secs_f64()
        );

        TestRunReport {
            run_id,
            profile: self.profile.clone(),
            outcomes,
            summary,
        }
    }
}

/// Installs a run's cancel token on an interface and puts the previous one back on drop
struct TokenScope<'i> {
    interface: &'i mut SerialInterface,
    previous: Option<CancelToken>,
}

impl<'i> TokenScope<'i> {
    fn install(interface: &'i mut SerialInterface, token: CancelToken) -> Self {
        let previous = interface.replace_cancel_token(token);
        Self {
            interface,
            previous: Some(previous),
        }
    }

    fn interface(&mut self) -> &mut SerialInterface {
        self.interface
    }
}

impl Drop for TokenScope<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.interface.set_cancel_token(previous);
        }
    }
}
