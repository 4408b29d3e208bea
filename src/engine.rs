use crate::behaviour::Behaviour;
use crate::config::Config;
use crate::epidemic::{ContactModel, Infection};
use crate::machine::Rng;
use crate::model::{OutbreakState, PersonState};
use crate::policy::Policy;
use crate::population::{Outbreak, Person, Settings};
use crate::types::Record;
use anyhow::{Context, Result};
use rand::seq::index;
use rand::{Rng as _, SeedableRng};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Simulation engine.
///
/// Holds the configuration and the outbreak (population, policy and every
/// random number generator), and provides methods to initialize, run, save,
/// and load simulations.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    outbreak: Outbreak,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a random initial state.
    ///
    /// Every person gets its own stream of the seeded generator, stream 0
    /// belongs to the outbreak.
    pub fn generate_initial_condition(cfg: Config) -> Result<Self> {
        let seed = match cfg.init.seed {
            Some(seed) => seed,
            None => Rng::try_from_os_rng()?.random(),
        };
        log::info!("seed = {seed}");

        let mut rng = Rng::seed_from_u64(seed);
        let model = ContactModel::new(cfg.model.clone());

        let n_persons = cfg.model.n_persons;
        let mut infected = vec![false; n_persons];
        for i_person in index::sample(&mut rng, n_persons, cfg.init.n_infected) {
            infected[i_person] = true;
        }

        let persons = infected
            .into_iter()
            .enumerate()
            .map(|(id, infected)| {
                let mut person_rng = Rng::seed_from_u64(seed);
                person_rng.set_stream(id as u64 + 1);
                let infection = if infected {
                    model.infect(0, &mut person_rng)
                } else {
                    Infection::Susceptible
                };
                let state = PersonState::initial(id, Behaviour::Normal, infection);
                Person::new(state, person_rng)
            })
            .collect();

        // Seeded infections are reported by the first survey, like any other
        // infection acquired during period 0.
        let state = OutbreakState::initial(Policy::initial(&cfg.policy), n_persons as u64, 0);
        let outbreak = Outbreak::new(state, persons, rng);

        Ok(Self { cfg, outbreak })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    /// Perform the simulation and save the resulting records to a binary file.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let kernel = self.cfg.kernel.build().context("failed to build kernel")?;
        log::debug!(
            "kernel support = {:?}, target sum = {}",
            kernel.support(),
            kernel.target_sum()
        );
        let settings = Settings {
            policy: &self.cfg.policy,
            behaviour: &self.cfg.behaviour,
            testing: &self.cfg.testing,
            kernel: &kernel,
        };
        let model = ContactModel::new(self.cfg.model.clone());

        let saves_per_file = self.cfg.output.saves_per_file();
        for i_save in 0..saves_per_file {
            for _ in 0..self.cfg.output.steps_per_save {
                self.outbreak
                    .advance(&settings, &model)
                    .context("failed to perform step")?;
            }

            let record = Record::new(&self.outbreak);
            encode::write_named(&mut writer, &record).context("failed to serialize record")?;

            log::debug!("saved period {}", self.outbreak.time());

            let progress = 100.0 * (i_save + 1) as f64 / saves_per_file as f64;
            log::info!("completed {progress:06.2}%");
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later. Every sealed state and
    /// history record is included, so the file grows with persons times
    /// periods simulated so far.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write_named(&mut writer, &self).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::config;
    use std::{env, fs};

    #[test]
    fn initial_condition_follows_config() {
        let cfg = config();
        let engine = Engine::generate_initial_condition(cfg.clone()).unwrap();
        let persons = engine.outbreak.persons();

        assert_eq!(persons.len(), cfg.model.n_persons);
        let n_infected = persons
            .iter()
            .filter(|person| person.state().infection().is_active())
            .count();
        assert_eq!(n_infected, cfg.init.n_infected);
        assert_eq!(engine.outbreak.time(), 0);
    }

    fn run(engine: &mut Engine, periods: usize) {
        let cfg = engine.cfg.clone();
        let kernel = cfg.kernel.build().unwrap();
        let settings = Settings {
            policy: &cfg.policy,
            behaviour: &cfg.behaviour,
            testing: &cfg.testing,
            kernel: &kernel,
        };
        let model = ContactModel::new(cfg.model.clone());
        for _ in 0..periods {
            engine.outbreak.advance(&settings, &model).unwrap();
        }
    }

    fn ever_infected(engine: &Engine) -> u64 {
        engine
            .outbreak
            .persons()
            .iter()
            .filter(|person| person.state().infection() != Infection::Susceptible)
            .count() as u64
    }

    #[test]
    fn seeded_infections_are_counted_once() {
        let mut cfg = config();
        cfg.model.contact_rate = 0.0;
        let mut engine = Engine::generate_initial_condition(cfg.clone()).unwrap();
        run(&mut engine, 1);

        let state = engine.outbreak.state();
        assert_eq!(state.counts().new_infections, cfg.init.n_infected as u64);
        assert_eq!(state.cumulative_infections(), cfg.init.n_infected as u64);
        assert_eq!(state.cumulative_infections(), ever_infected(&engine));
    }

    #[test]
    fn cumulative_infections_match_persons_ever_infected() {
        let mut engine = Engine::generate_initial_condition(config()).unwrap();
        for _ in 0..20 {
            run(&mut engine, 1);
            assert_eq!(
                engine.outbreak.state().cumulative_infections(),
                ever_infected(&engine)
            );
        }
    }

    #[test]
    fn checkpoint_resumes_the_same_trajectory() {
        let dir = env::temp_dir().join(format!("outbreak-engine-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let mut cfg = config();
        cfg.output.steps_per_file = 10;
        cfg.output.steps_per_save = 5;

        let mut engine = Engine::generate_initial_condition(cfg).unwrap();
        engine.save_checkpoint(dir.join("checkpoint.msgpack")).unwrap();
        let mut resumed = Engine::load_checkpoint(dir.join("checkpoint.msgpack")).unwrap();

        engine.perform_simulation(dir.join("a.msgpack")).unwrap();
        resumed.perform_simulation(dir.join("b.msgpack")).unwrap();

        assert_eq!(engine.outbreak.time(), 10);
        assert_eq!(engine.outbreak.state(), resumed.outbreak.state());

        // a checkpoint carries every sealed record, so resuming keeps the full past
        engine.save_checkpoint(dir.join("checkpoint.msgpack")).unwrap();
        let reloaded = Engine::load_checkpoint(dir.join("checkpoint.msgpack")).unwrap();
        assert_eq!(reloaded.outbreak.timeline().states().len(), 11);
        let pairs = reloaded.outbreak.persons().iter().zip(engine.outbreak.persons());
        for (person, original) in pairs {
            assert_eq!(person.timeline().states(), original.timeline().states());
            assert_eq!(person.timeline().history(), original.timeline().history());
        }
        assert_eq!(
            fs::read(dir.join("a.msgpack")).unwrap(),
            fs::read(dir.join("b.msgpack")).unwrap()
        );

        fs::remove_dir_all(&dir).ok();
    }
}
