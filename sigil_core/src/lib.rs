// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Readiness-gated marker synchronization and billboard placement.
//!
//! `sigil_core` keeps a small piece of shared, eventually consistent state
//! (an ordered list of marker tokens per entity) in sync across clients and
//! renders it as camera-facing markers anchored to each entity. Changes may
//! arrive before the local scene is built; they are buffered, retried, and
//! applied so that every client converges on the last published list.
//!
//! # Architecture
//!
//! ```text
//!   Transport ──► MarkerSystem::on_change_notification()
//!                     │
//!                     ▼
//!                 Backlog ◄── ReadinessGate ◄── Environment::environment_loaded()
//!                     │ (buffered / drained / forwarded)
//!                     ▼
//!   codec::decode ──► Reconciler::reconcile() ──► MarkerSurface (create/destroy)
//!                     │
//!                     ▼
//!   camera yaw ──► PlacementEngine::update() ──► MarkerSurface (set_pose)
//! ```
//!
//! **[`codec`]**: Bracket-delimited [`TokenList`](codec::TokenList)
//! encoding. Decoding is lossy: malformed input yields an empty list.
//!
//! **[`readiness`]**: Tri-state [`ReadinessGate`](readiness::ReadinessGate)
//! with an optional population settle probe.
//!
//! **[`backlog`]**: Ordered buffer of
//! [`ChangeNotification`](backlog::ChangeNotification)s drained in bounded
//! retry passes.
//!
//! **[`reconcile`]**: Per-entity marker state, rebuilt from a token list
//! with a capacity clamp.
//!
//! **[`placement`]**: Ring and stack layouts plus dirty-tracked lazy
//! recomputation via `understory_dirty`.
//!
//! **[`driver`]**: [`MarkerSystem`](driver::MarkerSystem), the periodic
//! driver that wires everything to the host.
//!
//! **[`host`]**: Collaborator traits the host implements.
//!
//! **[`config`]**: [`MarkerConfig`](config::MarkerConfig) with `ring` and
//! `stack` presets.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types,
//! with the [`Tracer`](trace::Tracer) dispatch wrapper.
//!
//! **[`catalog`]**: Token ids offered in the marker menu.
//!
//! # Crate features
//!
//! - `serde` (disabled by default): Derives `Serialize`/`Deserialize` for
//!   configuration types.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod backlog;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod dirty;
pub mod driver;
pub mod entity;
pub mod host;
pub mod placement;
pub mod readiness;
pub mod reconcile;
pub mod time;
pub mod trace;
pub mod transform;
