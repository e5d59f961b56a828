use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DeviceError;
use crate::config::ConfigurationProfile;

/// The hardware tests a bench can run, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestId {
    Touch,
    Doppler,
    Ir,
    OutletRelay,
    LightRelay,
    Metering,
    Led,
    Buzzer,
}

impl TestId {
    pub const ALL: [TestId; 8] = [
        TestId::Touch,
        TestId::Doppler,
        TestId::Ir,
        TestId::OutletRelay,
        TestId::LightRelay,
        TestId::Metering,
        TestId::Led,
        TestId::Buzzer,
    ];

    /// Stable identifier used on the command line and in exported reports
    pub fn key(self) -> &'static str {
        match self {
            TestId::Touch => "touch",
            TestId::Doppler => "doppler",
            TestId::Ir => "ir",
            TestId::OutletRelay => "outlet_relay",
            TestId::LightRelay => "light_relay",
            TestId::Metering => "metering",
            TestId::Led => "led",
            TestId::Buzzer => "buzzer",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            TestId::Touch => "Touch",
            TestId::Doppler => "Doppler sensor",
            TestId::Ir => "IR",
            TestId::OutletRelay => "Outlet relay",
            TestId::LightRelay => "Light relay",
            TestId::Metering => "Metering",
            TestId::Led => "LED",
            TestId::Buzzer => "Buzzer",
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for TestId {
    type Err = DeviceError;

    /// Accepts the key or the display name, ignoring case, spaces and dashes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");

        TestId::ALL
            .into_iter()
            .find(|id| {
                id.key() == normalized
                    || id.display_name().to_ascii_lowercase().replace(' ', "_") == normalized
            })
            .ok_or_else(|| DeviceError::InvalidTestId(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestResult {
    Pass,
    Fail,
}

/// How the catalog judged one device response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestVerdict {
    pub result: TestResult,
    pub detail: Option<String>,
    pub metering_value: Option<u16>,
}

impl TestVerdict {
    pub fn pass() -> Self {
        Self {
            result: TestResult::Pass,
            detail: None,
            metering_value: None,
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            result: TestResult::Fail,
            detail: Some(detail.into()),
            metering_value: None,
        }
    }

    pub fn with_metering_value(mut self, value: u16) -> Self {
        self.metering_value = Some(value);
        self
    }

    pub fn is_pass(&self) -> bool {
        self.result == TestResult::Pass
    }
}

/// One recorded test execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_name: String,
    pub test_id: Option<TestId>,
    pub command_code: Option<u8>,
    pub result: TestResult,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    pub metering_value: Option<u16>,
}

impl TestOutcome {
    pub fn from_verdict(id: TestId, command_code: u8, verdict: TestVerdict) -> Self {
        Self {
            test_name: id.display_name().to_string(),
            test_id: Some(id),
            command_code: Some(command_code),
            result: verdict.result,
            timestamp: Utc::now(),
            error: verdict.detail,
            metering_value: verdict.metering_value,
        }
    }

    /// A test that could not be judged on a device response
    pub fn failed(test_name: impl Into<String>, test_id: Option<TestId>, error: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            test_id,
            command_code: None,
            result: TestResult::Fail,
            timestamp: Utc::now(),
            error: Some(error.into()),
            metering_value: None,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.result == TestResult::Pass
    }
}

/// Counts and timing for one run, derived from its outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl TestRunSummary {
    pub fn from_outcomes(
        outcomes: &[TestOutcome],
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let total = outcomes.len();
        let passed = outcomes.iter().filter(|o| o.is_pass()).count();

        Self {
            total,
            passed,
            failed: total - passed,
            pass_rate: pass_rate(passed, total),
            started_at,
            finished_at,
            elapsed,
        }
    }
}

/// Percentage of passes rounded to two decimals; 0 for an empty run
pub fn pass_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = passed as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Product settings the run was performed against, for result tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileContext {
    pub product_type: u8,
    pub product_label: String,
    pub light_circuits: u8,
    pub outlet_circuits: u8,
    pub dimming_type: u8,
}

impl From<&ConfigurationProfile> for ProfileContext {
    fn from(profile: &ConfigurationProfile) -> Self {
        Self {
            product_type: profile.product_type.code(),
            product_label: profile.product_label().to_string(),
            light_circuits: profile.light_circuits,
            outlet_circuits: profile.outlet_circuits,
            dimming_type: profile.dimming_type,
        }
    }
}

/// Everything the UI needs to render or export a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunReport {
    pub run_id: Uuid,
    pub profile: Option<ProfileContext>,
    pub outcomes: Vec<TestOutcome>,
    pub summary: TestRunSummary,
}

impl TestRunReport {
    pub fn all_passed(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn failed_tests(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_pass())
            .map(|o| o.test_name.as_str())
            .collect()
    }
}
