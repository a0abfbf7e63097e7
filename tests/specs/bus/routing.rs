//! Router addressing: direct, `group:<gid>`, broadcast and fallbacks.

use crate::prelude::*;
use colony_core::test_support::{chat_message, Recorder};
use colony_core::{AgentId, MessageKind};
use serde_json::json;

#[test]
fn group_message_gives_each_member_its_own_copy() {
    let runtime = runtime();
    let lead = runtime.spawn_agent("lead").unwrap();
    let members = ["m1", "m2", "m3"];
    let recorders: Vec<Recorder> = members
        .iter()
        .map(|id| record(&runtime.spawn_agent(*id).unwrap(), MessageKind::Notification))
        .collect();
    runtime.router().register_agent_group(
        "crew",
        members.iter().map(|id| AgentId::new(*id)).collect(),
    );

    assert!(lead
        .send_message("group:crew", MessageKind::Notification, json!({"text": "standup"}))
        .unwrap());

    for (recorder, member) in recorders.iter().zip(members) {
        assert!(settles_at(recorder, 1));
        let copy = &recorder.messages()[0];
        assert_eq!(copy.receiver(), member);
        assert_eq!(copy.sender(), "lead");
        assert_eq!(copy.content_str("text"), Some("standup"));
    }
    let copies: Vec<_> = recorders.iter().map(|r| r.messages()[0].clone()).collect();
    assert_ne!(copies[0].id(), copies[1].id());
    assert_eq!(copies[0].conversation_id(), copies[2].conversation_id());
}

#[test]
fn group_members_without_routes_are_skipped() {
    let runtime = runtime();
    let lead = runtime.spawn_agent("lead").unwrap();
    let present = record(&runtime.spawn_agent("m1").unwrap(), MessageKind::Notification);
    runtime
        .router()
        .register_agent_group("crew", vec![AgentId::new("m1"), AgentId::new("ghost")]);

    assert!(lead
        .send_message("group:crew", MessageKind::Notification, json!({"text": "hi"}))
        .unwrap());
    assert!(settles_at(&present, 1));
}

#[test]
fn broadcast_reaches_everyone_but_the_sender() {
    let runtime = runtime();
    let herald = runtime.spawn_agent("herald").unwrap();
    let own = record(&herald, MessageKind::Broadcast);
    let listeners: Vec<Recorder> = ["a", "b"]
        .iter()
        .map(|id| record(&runtime.spawn_agent(*id).unwrap(), MessageKind::Broadcast))
        .collect();

    assert!(herald
        .send_message("broadcast", MessageKind::Broadcast, json!({"text": "hello all"}))
        .unwrap());

    for recorder in &listeners {
        assert!(settles_at(recorder, 1));
    }
    assert!(own.is_empty());
}

#[test]
fn unknown_receiver_falls_back_then_reports_undeliverable() {
    let runtime = runtime();
    let sender = runtime.spawn_agent("s").unwrap();
    assert!(!sender
        .send_message("nobody", MessageKind::Chat, json!({"text": "anyone?"}))
        .unwrap());

    let caught = Recorder::new();
    let sink = caught.clone();
    runtime.router().add_fallback_handler(move |msg| {
        sink.record(msg);
        true
    });
    assert!(runtime
        .router()
        .route_message(chat_message("s", "nobody", "anyone?"))
        .unwrap());
    assert_eq!(caught.len(), 1);
}

#[test]
fn reregistered_agent_gets_no_replay_on_its_new_topic() {
    let runtime = runtime();
    let router = runtime.router();
    let old_inbox = Recorder::new();
    let sink = old_inbox.clone();
    router.register_agent("bob", "agent.bob.v1", move |msg| {
        sink.record(msg);
        Ok(())
    });
    for text in ["one", "two", "three"] {
        router.route_message(chat_message("alice", "bob", text)).unwrap();
    }
    assert!(settles_at(&old_inbox, 3));

    assert!(router.unregister_agent("bob"));
    let new_inbox = Recorder::new();
    let sink = new_inbox.clone();
    router.register_agent("bob", "agent.bob.v2", move |msg| {
        sink.record(msg);
        Ok(())
    });
    router.route_message(chat_message("alice", "bob", "four")).unwrap();

    assert!(settles_at(&new_inbox, 1));
    assert_eq!(new_inbox.messages()[0].content_str("text"), Some("four"));
    assert_eq!(old_inbox.len(), 3);
}
