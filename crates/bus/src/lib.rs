// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! colony-bus: publish/subscribe transport and message routing

pub mod bus;
pub mod error;
pub mod router;

pub use bus::{BusConfig, PubSubBus, Subscriber, SubscriptionId, DEFAULT_QUEUE_CAPACITY};
pub use error::{BusError, DeliveryError};
pub use router::{FallbackHandler, MessageRouter};
