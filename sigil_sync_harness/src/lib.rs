// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multi-client test and demo harness for `sigil_core`.
//!
//! - [`bus::Bus`]: last-writer-wins store with per-client FIFO queues.
//! - [`scene::FakeScene`] and [`surface::FakeSurface`]: scriptable host
//!   collaborators.
//! - [`simulation::Simulation`]: clients sharing one bus, each with a
//!   [`RecorderSink`](sigil_debug::recorder::RecorderSink), plus a
//!   convergence check.

pub mod bus;
pub mod scene;
pub mod simulation;
pub mod surface;

pub use bus::{Bus, BusPort};
pub use scene::FakeScene;
pub use simulation::{Client, ConvergenceReport, Simulation};
pub use surface::FakeSurface;
