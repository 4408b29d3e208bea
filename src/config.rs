use crate::error::ControlError;
use crate::kernel::Kernel;
use crate::trigger::Trigger;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub testing: TestingConfig,
    pub behaviour: BehaviourConfig,
    pub kernel: KernelConfig,
    pub policy: PolicyConfig,
    pub init: InitConfig,
    pub output: OutputConfig,
}

/// Contact and transmission model parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of persons in the (fully-connected) population.
    pub n_persons: usize,
    /// Expected number of contacts per person per period.
    pub contact_rate: f64,
    /// Probability that a contact with an infectious person transmits.
    pub prob_transmission: f64,
    /// Periods from infection to becoming infectious.
    pub latent_period: usize,
    /// Periods a person stays infectious.
    pub infectious_period: usize,
    /// Periods from infection to symptom onset (symptomatic cases only).
    pub incubation_period: usize,
    /// Probability that an infection is symptomatic.
    pub prob_symptomatic: f64,
    /// Probability that a symptomatic infection requires hospital care.
    pub prob_severe: f64,
}

/// Testing parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TestingConfig {
    /// Probability that a person is tested on the day symptoms begin.
    pub prob_test_symptomatic: f64,
    /// Probability that a test on an infected person is positive.
    pub test_sensitivity: f64,
}

/// Individual behaviour parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BehaviourConfig {
    /// Probability of self-isolating when the exposure signal is high.
    pub prob_compliance: f64,
    /// Exposure signal at or above which a person considers self-isolation.
    pub self_isolation_exposure: f64,
    /// Minimum number of periods spent self-isolating.
    pub self_isolation_period: usize,
    /// Contact rate multiplier while self-isolating.
    pub isolation_contact_factor: f64,
    /// Contact rate multiplier under lockdown.
    pub lockdown_contact_factor: f64,
}

/// Exposure risk kernel.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KernelConfig {
    Explicit {
        offset: i64,
        density: Vec<f64>,
        target_sum: f64,
    },
    Decay {
        offset: i64,
        length: usize,
        ratio: f64,
        target_sum: f64,
    },
}

impl KernelConfig {
    pub fn build(&self) -> Result<Kernel, ControlError> {
        match self {
            KernelConfig::Explicit {
                offset,
                density,
                target_sum,
            } => Kernel::new(*offset, density.clone(), *target_sum),
            KernelConfig::Decay {
                offset,
                length,
                ratio,
                target_sum,
            } => Kernel::decay(*offset, *length, *ratio, *target_sum),
        }
    }
}

/// Population-wide control policy.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyConfig {
    NoControl,
    ReactiveLockdown(LockdownConfig),
}

impl PolicyConfig {
    pub fn lockdown(&self) -> Option<&LockdownConfig> {
        match self {
            PolicyConfig::NoControl => None,
            PolicyConfig::ReactiveLockdown(lockdown) => Some(lockdown),
        }
    }

    /// Number of periods the outbreak indicators are aggregated over.
    pub fn trigger_window(&self) -> usize {
        self.lockdown().map_or(1, |lockdown| lockdown.trigger_window)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct LockdownConfig {
    /// Indicator level that must be confidently exceeded to start a lockdown.
    pub lockdown_start_trigger: f64,
    /// Indicator level the indicator must confidently drop below to release.
    pub lockdown_release_trigger: f64,
    /// Indicator driving the lockdown decisions.
    pub lockdown_trigger_value: Trigger,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Number of persons screened each period.
    #[serde(default)]
    pub screening_sample_size: usize,
    #[serde(default = "default_trigger_window")]
    pub trigger_window: usize,
}

fn default_confidence() -> f64 {
    0.95
}

fn default_trigger_window() -> usize {
    7
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Number of persons infected at the start.
    pub n_infected: usize,
    /// Random seed, drawn from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of periods simulated per trajectory file.
    pub steps_per_file: usize,
    /// Number of periods between saved records.
    pub steps_per_save: usize,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate().context("invalid model")?;
        self.testing.validate().context("invalid testing")?;
        self.behaviour.validate().context("invalid behaviour")?;

        self.kernel.build().context("invalid kernel")?;

        if let Some(lockdown) = self.policy.lockdown() {
            lockdown.validate().context("invalid policy")?;
            check_num(lockdown.screening_sample_size, 0..=self.model.n_persons)
                .context("invalid screening sample size")?;
        }

        check_num(self.init.n_infected, 0..=self.model.n_persons)
            .context("invalid initial number of infected persons")?;

        check_num(self.output.steps_per_file, 1..1_000_000)
            .context("invalid number of steps per file")?;
        check_num(self.output.steps_per_save, 1..=self.output.steps_per_file)
            .context("invalid number of steps per save")?;
        if self.output.steps_per_file % self.output.steps_per_save != 0 {
            bail!("number of steps per file must be a multiple of the number of steps per save");
        }

        Ok(())
    }
}

impl OutputConfig {
    pub fn saves_per_file(&self) -> usize {
        self.steps_per_file / self.steps_per_save
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<()> {
        check_num(self.n_persons, 2..1_000_000).context("invalid number of persons")?;
        check_num(self.contact_rate, 0.0..1000.0).context("invalid contact rate")?;
        check_num(self.prob_transmission, 0.0..=1.0)
            .context("invalid transmission probability")?;
        check_num(self.latent_period, 0..1000).context("invalid latent period")?;
        check_num(self.infectious_period, 1..1000).context("invalid infectious period")?;
        check_num(
            self.incubation_period,
            1..self.latent_period + self.infectious_period,
        )
        .context("invalid incubation period")?;
        check_num(self.prob_symptomatic, 0.0..=1.0)
            .context("invalid symptomatic probability")?;
        check_num(self.prob_severe, 0.0..=1.0).context("invalid severe probability")?;
        Ok(())
    }
}

impl TestingConfig {
    fn validate(&self) -> Result<()> {
        check_num(self.prob_test_symptomatic, 0.0..=1.0)
            .context("invalid symptomatic testing probability")?;
        check_num(self.test_sensitivity, 0.0..=1.0).context("invalid test sensitivity")?;
        Ok(())
    }
}

impl BehaviourConfig {
    fn validate(&self) -> Result<()> {
        check_num(self.prob_compliance, 0.0..=1.0).context("invalid compliance probability")?;
        check_num(self.self_isolation_exposure, 0.0..f64::INFINITY)
            .context("invalid self-isolation exposure")?;
        check_num(self.self_isolation_period, 1..1000)
            .context("invalid self-isolation period")?;
        check_num(self.isolation_contact_factor, 0.0..=1.0)
            .context("invalid isolation contact factor")?;
        check_num(self.lockdown_contact_factor, 0.0..=1.0)
            .context("invalid lockdown contact factor")?;
        Ok(())
    }
}

impl LockdownConfig {
    fn validate(&self) -> Result<()> {
        check_num(self.lockdown_start_trigger, 0.0..=1.0)
            .context("invalid lockdown start trigger")?;
        check_num(self.lockdown_release_trigger, 0.0..=1.0)
            .context("invalid lockdown release trigger")?;
        // Equal thresholds would let the policy flap on sampling noise.
        if self.lockdown_release_trigger >= self.lockdown_start_trigger {
            bail!(
                "release trigger ({}) must be below start trigger ({})",
                self.lockdown_release_trigger,
                self.lockdown_start_trigger
            );
        }
        check_num(self.confidence, 0.5..1.0).context("invalid confidence level")?;
        check_num(self.trigger_window, 1..1000).context("invalid trigger window")?;
        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CONFIG: &str = r#"
[model]
n_persons = 200
contact_rate = 6.0
prob_transmission = 0.08
latent_period = 2
infectious_period = 6
incubation_period = 4
prob_symptomatic = 0.6
prob_severe = 0.1

[testing]
prob_test_symptomatic = 0.8
test_sensitivity = 0.9

[behaviour]
prob_compliance = 0.7
self_isolation_exposure = 0.5
self_isolation_period = 7
isolation_contact_factor = 0.2
lockdown_contact_factor = 0.3

[kernel]
kind = "explicit"
offset = 1
density = [4.0, 3.0, 2.0, 1.0]
target_sum = 1.0

[policy]
model = "REACTIVE_LOCKDOWN"
lockdown_start_trigger = 0.05
lockdown_release_trigger = 0.01
lockdown_trigger_value = "HOSPITAL_BURDEN"
screening_sample_size = 20

[init]
n_infected = 5
seed = 42

[output]
steps_per_file = 60
steps_per_save = 5
"#;

    pub(crate) fn config() -> Config {
        toml::from_str(CONFIG).unwrap()
    }

    #[test]
    fn parses_and_validates() {
        let cfg = config();
        cfg.validate().unwrap();
        let lockdown = cfg.policy.lockdown().unwrap();
        assert_eq!(lockdown.lockdown_trigger_value, Trigger::HospitalBurden);
        assert_eq!(lockdown.confidence, 0.95);
        assert_eq!(lockdown.trigger_window, 7);
        assert_eq!(cfg.output.saves_per_file(), 12);
    }

    #[test]
    fn parses_no_control_policy() {
        let contents = CONFIG.replace(
            "model = \"REACTIVE_LOCKDOWN\"",
            "model = \"NO_CONTROL\"\n[unused]",
        );
        let cfg: Config = toml::from_str(&contents).unwrap();
        assert_eq!(cfg.policy, PolicyConfig::NoControl);
        assert_eq!(cfg.policy.trigger_window(), 1);
    }

    #[test]
    fn rejects_thresholds_without_hysteresis() {
        let mut cfg = config();
        if let PolicyConfig::ReactiveLockdown(lockdown) = &mut cfg.policy {
            lockdown.lockdown_release_trigger = lockdown.lockdown_start_trigger;
        }
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_kernel() {
        let mut cfg = config();
        cfg.kernel = KernelConfig::Explicit {
            offset: 0,
            density: vec![0.0; 4],
            target_sum: 1.0,
        };
        let error = cfg.validate().unwrap_err();
        assert!(
            error
                .chain()
                .any(|cause| cause.downcast_ref::<ControlError>()
                    == Some(&ControlError::DegenerateKernel))
        );
    }
}
