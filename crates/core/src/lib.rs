// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony-core: value types shared by the colony agent runtime

pub mod agent;
pub mod clock;
pub mod id;
pub mod message;
pub mod panic;
pub mod signal;
pub mod state;
pub mod task;

#[cfg(any(test, feature = "test-support"))]
#[allow(clippy::panic)]
pub mod test_support;

pub use agent::{AgentId, AgentStatus};
pub use clock::{deadline_after, Clock, FakeClock, SystemClock};
pub use id::uuid_string;
pub use message::{
    Content, ConversationId, Message, MessageError, MessageId, MessageKind, Priority, BROADCAST,
    GROUP_PREFIX,
};
pub use panic::{catch_panic, panic_message};
pub use signal::{join_with_timeout, JoinError, StopSignal};
pub use state::{AgentState, StateError, StateMetadata, StateStore};
pub use task::{Task, TaskError, TaskId, TaskResult, TaskStatus, DEFAULT_TASK_TYPE};
