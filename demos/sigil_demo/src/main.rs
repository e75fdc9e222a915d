// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two simulated clients share marker state over an in-memory bus.
//!
//! The game master client is loaded from the start and tags two entities.
//! The player client loads later, catches up through replay, turns its
//! camera, and removes a marker. At the end the demo checks that both
//! clients render the same markers and writes a Chrome trace.
//!
//! ```text
//! cargo run -p sigil_demo -- [CONFIG.toml] [TRACE.json]
//! ```
//!
//! Set `RUST_LOG` to change log verbosity (default `info`). Set
//! `SIGIL_PRETTY=1` to also print every trace event to stderr.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sigil_core::catalog::TokenCatalog;
use sigil_core::config::{ConfigError, DEFAULT_TOPIC, MarkerConfig};
use sigil_core::entity::{EntityId, SENTINEL};
use sigil_core::host::Anchor;
use sigil_core::time::Timebase;
use sigil_debug::chrome;
use sigil_debug::pretty::PrettyPrintSink;
use sigil_sync_harness::{FakeScene, Simulation};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const GM: usize = 0;
const PLAYER: usize = 1;
const TICKS: u32 = 120;

#[derive(Debug, Error)]
enum DemoError {
    #[error("cannot read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Entity(#[from] sigil_core::entity::InvalidEntityId),
    #[error("cannot write trace")]
    Trace(#[from] std::io::Error),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<MarkerConfig, DemoError> {
    let Some(path) = path else {
        return Ok(MarkerConfig::ring());
    };
    let text = std::fs::read_to_string(path).map_err(|source| DemoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: MarkerConfig = toml::from_str(&text).map_err(|source| DemoError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    tracing::info!(path = %path.display(), layout = ?config.layout, "loaded config");
    Ok(config)
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        tracing::error!(error = %err, "demo failed");
        std::process::exit(1);
    }
}

fn run() -> Result<(), DemoError> {
    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let config = load_config(args.next().as_deref())?;
    let trace_path = args
        .next()
        .unwrap_or_else(|| std::env::temp_dir().join("sigil-trace.json"));

    let catalog = TokenCatalog::from_tokens(["bleeding", "fire", "poison", "prone"]);
    let goblin = EntityId::new("goblin")?;
    let ogre = EntityId::new("ogre")?;
    let scene = FakeScene::new()
        .with_entity(&goblin, Anchor::at([0.0, 0.0, 2.0]))
        .with_entity(
            &ogre,
            Anchor {
                position: [3.0, 0.0, 2.0],
                head_height: 2.5,
                visual_scale: 2.0,
            },
        );

    let mut sim = Simulation::default();
    sim.add_client(config.clone(), scene.clone().loaded(true))?;
    sim.add_client(config, scene)?;

    for tick in 0..TICKS {
        script(&mut sim, tick, &catalog, &goblin, &ogre);
        for report in sim.tick_all() {
            if let Some(menu) = report.menu {
                let offered: Vec<_> = catalog
                    .tokens()
                    .iter()
                    .map(|t| (t.as_str(), menu.active.contains(t)))
                    .collect();
                tracing::info!(entity = %menu.entity, ?offered, "menu opened");
            }
        }
    }

    let report = sim.convergence();
    if report.is_converged() {
        tracing::info!(
            clients = report.clients_checked,
            entities = report.entities_checked,
            "clients converged"
        );
    } else {
        for d in &report.divergences {
            tracing::warn!(
                client = d.client,
                entity = %d.entity,
                expected = ?d.expected,
                rendered = ?d.rendered,
                "client diverged"
            );
        }
    }

    if std::env::var_os("SIGIL_PRETTY").is_some() {
        let mut sink = PrettyPrintSink::stderr(Timebase::NANOS);
        for event in sim.recorders().iter().flat_map(|r| r.events()) {
            event.replay(&mut sink);
        }
    }

    let recordings: Vec<_> = sim.recorders().iter().map(|r| r.events()).collect();
    let mut out = BufWriter::new(File::create(&trace_path)?);
    chrome::export_clients(&recordings, Timebase::NANOS, &mut out)?;
    out.flush()?;
    tracing::info!(path = %trace_path.display(), "wrote chrome trace");
    Ok(())
}

/// Scripted input for one round, applied before the clients tick.
fn script(
    sim: &mut Simulation,
    tick: u32,
    catalog: &TokenCatalog,
    goblin: &EntityId,
    ogre: &EntityId,
) {
    let toggle = |sim: &mut Simulation, client: usize, entity: &EntityId, token: &str| {
        if !catalog.contains(token) {
            tracing::warn!(token, "token not in catalog");
            return;
        }
        if let Err(err) = sim.toggle(client, entity, token) {
            tracing::warn!(error = %err, "toggle rejected");
        }
    };

    match tick {
        5 => {
            toggle(sim, GM, goblin, "fire");
            toggle(sim, GM, goblin, "poison");
        }
        8 => toggle(sim, GM, ogre, "prone"),
        12 => {
            // A tool writing with an unset entity id.
            let _ = sim.bus().publish_raw(SENTINEL, DEFAULT_TOPIC, "[fire]");
        }
        20 => {
            tracing::info!("player scene loaded");
            sim.scene_mut(PLAYER).set_loaded(true);
        }
        40..=59 => sim.scene_mut(PLAYER).set_yaw(f64::from(tick - 40) * 3.0),
        60 => toggle(sim, PLAYER, goblin, "poison"),
        70 => {
            for client in [GM, PLAYER] {
                sim.scene_mut(client).move_entity(ogre, [6.0, 0.0, 2.0]);
            }
            sim.client_mut(GM).on_entity_dropped(ogre);
        }
        80 => {
            sim.scene_mut(GM).select(Some(goblin.clone()));
            sim.scene_mut(GM).trigger_menu();
        }
        90 => {
            sim.scene_mut(PLAYER).set_hidden(ogre, true);
        }
        100 => {
            sim.scene_mut(PLAYER).set_hidden(ogre, false);
        }
        _ => {}
    }
}
