// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Receiver-address resolution on top of the bus.
//!
//! Resolution order, first match wins:
//!
//! 1. `"broadcast"` publishes once on the broadcast topic
//! 2. `"group:<id>"` publishes a readdressed copy to each member with a route
//! 3. a registered agent id publishes to that agent's topic
//! 4. fallback handlers, in registration order
//! 5. otherwise the message is undeliverable (`Ok(false)`)

use crate::bus::{PubSubBus, SubscriptionId};
use crate::error::{BusError, DeliveryError};
use colony_core::{catch_panic, AgentId, Message, BROADCAST};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Last-resort handler; returns true if it took the message.
pub type FallbackHandler = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
struct Route {
    topic: String,
    subscription: SubscriptionId,
}

#[derive(Default)]
struct Tables {
    routes: HashMap<AgentId, Route>,
    groups: HashMap<String, Vec<AgentId>>,
}

/// Routes messages to agents, groups and broadcast via a shared bus.
pub struct MessageRouter {
    bus: Arc<PubSubBus>,
    tables: Mutex<Tables>,
    fallbacks: Mutex<Vec<FallbackHandler>>,
}

impl MessageRouter {
    pub fn new(bus: Arc<PubSubBus>) -> Self {
        Self {
            bus,
            tables: Mutex::new(Tables::default()),
            fallbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn bus(&self) -> &Arc<PubSubBus> {
        &self.bus
    }

    /// Route `agent_id` to `topic` and subscribe `inbox` there.
    ///
    /// Re-registering an id replaces its previous route and subscription.
    pub fn register_agent<F>(&self, agent_id: impl Into<AgentId>, topic: impl Into<String>, inbox: F)
    where
        F: Fn(&Message) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        let agent_id = agent_id.into();
        let topic = topic.into();
        let subscription = self.bus.subscribe(topic.clone(), inbox);
        let previous = self.tables.lock().routes.insert(
            agent_id.clone(),
            Route {
                topic: topic.clone(),
                subscription,
            },
        );
        if let Some(old) = previous {
            self.bus.unsubscribe(&old.topic, old.subscription);
        }
        tracing::debug!(agent_id = %agent_id, %topic, "registered route");
    }

    /// Remove the route and retract its bus subscription.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let Some(route) = self.tables.lock().routes.remove(agent_id) else {
            return false;
        };
        self.bus.unsubscribe(&route.topic, route.subscription);
        tracing::debug!(%agent_id, topic = %route.topic, "unregistered route");
        true
    }

    /// Define (or redefine) a named group of agents.
    pub fn register_agent_group(&self, group_id: impl Into<String>, members: Vec<AgentId>) {
        let group_id = group_id.into();
        tracing::debug!(%group_id, members = members.len(), "registered group");
        self.tables.lock().groups.insert(group_id, members);
    }

    pub fn unregister_agent_group(&self, group_id: &str) -> bool {
        self.tables.lock().groups.remove(group_id).is_some()
    }

    pub fn add_fallback_handler<F>(&self, handler: F)
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.fallbacks.lock().push(Arc::new(handler));
    }

    /// Deliver `message` according to its receiver.
    ///
    /// Returns `Ok(false)` when nothing could take the message. Publish
    /// failures are returned; a failing group copy aborts the remaining ones.
    pub fn route_message(&self, message: Message) -> Result<bool, BusError> {
        tracing::debug!(
            message_id = %message.id(),
            sender = %message.sender(),
            receiver = %message.receiver(),
            "routing"
        );

        if message.is_broadcast() {
            self.bus.publish(BROADCAST, message)?;
            return Ok(true);
        }

        if let Some(group_id) = message.group_id() {
            let targets = {
                let tables = self.tables.lock();
                tables.groups.get(group_id).map(|members| {
                    members
                        .iter()
                        .filter_map(|m| tables.routes.get(m).map(|r| (m.clone(), r.topic.clone())))
                        .collect::<Vec<_>>()
                })
            };
            if let Some(targets) = targets {
                for (member, topic) in targets {
                    self.bus.publish(topic, message.readdressed(member.as_str()))?;
                }
                return Ok(true);
            }
        }

        let topic = self
            .tables
            .lock()
            .routes
            .get(message.receiver())
            .map(|r| r.topic.clone());
        if let Some(topic) = topic {
            self.bus.publish(topic, message)?;
            return Ok(true);
        }

        let fallbacks = self.fallbacks.lock().clone();
        for handler in &fallbacks {
            match catch_panic(|| handler(&message)) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(panic) => {
                    tracing::error!(message_id = %message.id(), %panic, "fallback handler panicked")
                }
            }
        }

        tracing::warn!(
            message_id = %message.id(),
            receiver = %message.receiver(),
            "undeliverable message"
        );
        Ok(false)
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.tables.lock().routes.contains_key(agent_id)
    }

    pub fn topic_for(&self, agent_id: &str) -> Option<String> {
        self.tables
            .lock()
            .routes
            .get(agent_id)
            .map(|r| r.topic.clone())
    }

    /// Agent id to topic.
    pub fn routes(&self) -> HashMap<AgentId, String> {
        self.tables
            .lock()
            .routes
            .iter()
            .map(|(id, r)| (id.clone(), r.topic.clone()))
            .collect()
    }

    pub fn groups(&self) -> HashMap<String, Vec<AgentId>> {
        self.tables.lock().groups.clone()
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
