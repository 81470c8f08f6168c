use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use worldcore::{recipe, Placement, SimpleModule, SingleStore, SystemKind, World};

const HEALTH: SystemKind = SystemKind::new("health");

#[derive(Debug, Parser)]
#[command(author, version, about = "worldcore demo: a decaying-health arena")]
struct Cli {
    /// Path to a scenario YAML file (built-in default when omitted)
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Override tick count
    #[arg(long)]
    ticks: Option<u64>,

    /// Seconds simulated per tick
    #[arg(long, default_value_t = 1.0)]
    dt: f64,

    /// Emit the per-tick summary as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Scenario {
    name: String,
    seed: u64,
    ticks: u64,
    combatants: Vec<CombatantSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CombatantSpec {
    max_health: f64,
    decay_per_second: f64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "arena".into(),
            seed: 7,
            ticks: 20,
            combatants: vec![
                CombatantSpec {
                    max_health: 15.0,
                    decay_per_second: 1.0,
                },
                CombatantSpec {
                    max_health: 40.0,
                    decay_per_second: 2.5,
                },
                CombatantSpec {
                    max_health: 8.0,
                    decay_per_second: 0.5,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HealthValue {
    max_health: f64,
    cur_health: f64,
    decay_per_second: f64,
}

impl SimpleModule for HealthValue {}

#[derive(Debug, Serialize)]
struct TickSummary {
    tick: u64,
    alive: usize,
    total_health: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let scenario = match &cli.scenario {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading scenario {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("parsing scenario {}", path.display()))?
        }
        None => Scenario::default(),
    };
    let ticks = cli.ticks.unwrap_or(scenario.ticks);

    let mut world = World::new(vec![Box::new(SingleStore::<HealthValue>::new(HEALTH))])?;
    let mut rng = ChaCha8Rng::seed_from_u64(scenario.seed);
    for spec in &scenario.combatants {
        let placement = Placement::from_pos(Vec3::new(
            rng.gen_range(-10.0..10.0),
            0.0,
            rng.gen_range(-10.0..10.0),
        ));
        world.make_entity(
            &[recipe(
                HealthValue {
                    max_health: spec.max_health,
                    cur_health: spec.max_health,
                    decay_per_second: spec.decay_per_second,
                },
                HEALTH,
            )],
            placement,
        )?;
    }

    for tick in 1..=ticks {
        world.update(cli.dt, |frame, systems| {
            let health = systems
                .get_mut::<SingleStore<HealthValue>>(HEALTH)
                .context("health store missing from registry")?;
            let dt = frame.dt;
            let defer = &mut *frame.defer;
            health.for_each(frame.entities, |id, _entity, hp| {
                hp.cur_health -= hp.decay_per_second * dt;
                if hp.cur_health <= f64::EPSILON {
                    defer.delete_entity_next_frame(id);
                }
            });
            Ok(())
        })?;

        let health = world
            .systems()
            .get::<SingleStore<HealthValue>>(HEALTH)
            .context("health store missing from registry")?;
        let summary = TickSummary {
            tick,
            alive: world.entity_count(),
            total_health: health.iter().map(|(_, hp)| hp.cur_health.max(0.0)).sum(),
        };
        if cli.json {
            println!("{}", serde_json::to_string(&summary)?);
        } else {
            println!(
                "tick {:3}: {} alive, {:.1} total health",
                summary.tick, summary.alive, summary.total_health
            );
        }
        if world.entity_count() == 0 {
            break;
        }
    }

    println!(
        "Scenario '{}' finished with {} survivor(s).",
        scenario.name,
        world.entity_count()
    );
    Ok(())
}
