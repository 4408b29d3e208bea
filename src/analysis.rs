use crate::config::Config;
use crate::stats::{Accumulator, AccumulatorReport};
use crate::trigger::Trigger;
use crate::types::Record;
use anyhow::{Context, Result};
use rmp_serde::{decode, encode};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Stats(AccumulatorReport),
    Count(u64),
}

/// Observable computed over the saved records of a run.
pub trait Obs {
    fn name(&self) -> &'static str;
    fn update(&mut self, record: &Record);
    fn report(&self) -> Report;
}

/// Fraction of saved periods spent under lockdown.
pub struct InLockdown {
    acc: Accumulator,
}

impl Obs for InLockdown {
    fn name(&self) -> &'static str {
        "in_lockdown"
    }

    fn update(&mut self, record: &Record) {
        self.acc.add(if record.policy.is_lockdown() { 1.0 } else { 0.0 });
    }

    fn report(&self) -> Report {
        Report::Stats(self.acc.report())
    }
}

/// Number of lockdown episodes seen in the saved periods.
pub struct LockdownEpisodes {
    n_episodes: u64,
    in_lockdown: bool,
}

impl Obs for LockdownEpisodes {
    fn name(&self) -> &'static str {
        "lockdown_episodes"
    }

    fn update(&mut self, record: &Record) {
        let in_lockdown = record.policy.is_lockdown();
        if in_lockdown && !self.in_lockdown {
            self.n_episodes += 1;
        }
        self.in_lockdown = in_lockdown;
    }

    fn report(&self) -> Report {
        Report::Count(self.n_episodes)
    }
}

/// Observed proportion of one outbreak indicator.
pub struct Indicator {
    trigger: Trigger,
    acc: Accumulator,
}

impl Obs for Indicator {
    fn name(&self) -> &'static str {
        self.trigger.name()
    }

    fn update(&mut self, record: &Record) {
        if let Some(val) = record.indicator(self.trigger).proportion() {
            self.acc.add(val);
        }
    }

    fn report(&self) -> Report {
        Report::Stats(self.acc.report())
    }
}

/// Infectious fraction of the catchment.
pub struct Prevalence {
    acc: Accumulator,
}

impl Obs for Prevalence {
    fn name(&self) -> &'static str {
        "prevalence"
    }

    fn update(&mut self, record: &Record) {
        let counts = &record.counts;
        if counts.catchment > 0 {
            self.acc.add(counts.infectious as f64 / counts.catchment as f64);
        }
    }

    fn report(&self) -> Report {
        Report::Stats(self.acc.report())
    }
}

pub struct CumulativeInfections {
    last: u64,
}

impl Obs for CumulativeInfections {
    fn name(&self) -> &'static str {
        "cumulative_infections"
    }

    fn update(&mut self, record: &Record) {
        self.last = record.cumulative_infections;
    }

    fn report(&self) -> Report {
        Report::Count(self.last)
    }
}

pub struct Analyzer {
    cfg: Config,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: Config) -> Self {
        let mut obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(InLockdown {
                acc: Accumulator::new(),
            }),
            Box::new(LockdownEpisodes {
                n_episodes: 0,
                in_lockdown: false,
            }),
            Box::new(Prevalence {
                acc: Accumulator::new(),
            }),
            Box::new(CumulativeInfections { last: 0 }),
        ];
        for trigger in Trigger::ALL {
            obs_ptr_vec.push(Box::new(Indicator {
                trigger,
                acc: Accumulator::new(),
            }));
        }
        Self { cfg, obs_ptr_vec }
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        for _ in 0..self.cfg.output.saves_per_file() {
            let record = decode::from_read(&mut reader).context("failed to read record")?;
            self.add_record(&record);
        }
        Ok(())
    }

    pub fn add_record(&mut self, record: &Record) {
        for obs in &mut self.obs_ptr_vec {
            obs.update(record);
        }
    }

    pub fn results(&self) -> BTreeMap<&'static str, Report> {
        self.obs_ptr_vec
            .iter()
            .map(|obs| (obs.name(), obs.report()))
            .collect()
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let results = self.results();
        for (name, report) in &results {
            log::info!("{name}: {report:?}");
        }
        encode::write_named(&mut writer, &results).context("failed to serialize results")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binomial::Binomial;
    use crate::config::tests::config;
    use crate::model::SurveyCounts;
    use crate::policy::{Phase, Policy};

    fn record(time: usize, lockdown: bool, hospitalised: u64, cumulative: u64) -> Record {
        let phase = if lockdown { Phase::Lockdown } else { Phase::Monitor };
        Record {
            time,
            policy: Policy::ReactiveLockdown(phase),
            n_normal: 100,
            n_self_isolating: 0,
            n_isolating: 0,
            counts: SurveyCounts {
                catchment: 100,
                infectious: 10,
                hospitalised,
                ..SurveyCounts::default()
            },
            cumulative_infections: cumulative,
            test_positivity: Binomial::empty(),
            screening_test_positivity: Binomial::empty(),
            test_count: Binomial::empty(),
            hospital_burden: Binomial::new(hospitalised, 100).unwrap(),
        }
    }

    #[test]
    fn summarises_lockdown_episodes() {
        let mut analyzer = Analyzer::new(config());
        let pattern = [false, true, true, false, true, false];
        for (time, &lockdown) in pattern.iter().enumerate() {
            analyzer.add_record(&record(time, lockdown, time as u64, 10 + time as u64));
        }
        let results = analyzer.results();

        assert_eq!(results["lockdown_episodes"], Report::Count(2));
        assert_eq!(results["cumulative_infections"], Report::Count(15));
        let Report::Stats(in_lockdown) = &results["in_lockdown"] else {
            panic!("expected stats");
        };
        assert!((in_lockdown.mean - 0.5).abs() < 1e-12);
        let Report::Stats(burden) = &results["HOSPITAL_BURDEN"] else {
            panic!("expected stats");
        };
        assert!((burden.max - 0.05).abs() < 1e-12);
        let Report::Stats(prevalence) = &results["prevalence"] else {
            panic!("expected stats");
        };
        assert!((prevalence.mean - 0.1).abs() < 1e-12);
        // no tests were recorded
        let Report::Stats(positivity) = &results["TEST_POSITIVITY"] else {
            panic!("expected stats");
        };
        assert_eq!(positivity.n_vals, 0);
    }
}
