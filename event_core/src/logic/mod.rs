//! SPDX-License-Identifier: GPL-3.0-or-later

mod context;
mod event_states;
mod fsm;
mod intent;
mod machine;
mod timer;

pub use context::EventState;
pub use event_states::EventStatus;
pub use intent::{Intent, StopReason};
pub use machine::EventMachine;
