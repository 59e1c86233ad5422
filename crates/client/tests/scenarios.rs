//! End-to-end scenarios across server render, envelope handoff and live
//! updates.

use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::block_on;
use serde_json::json;
use tether_client::{
    ArgsInput, ArgsSource, CanonicalArgs, Client, ClientConfig, DisabledChannel, Envelope, Loaded,
    MemoryChannel, PreloadOutcome, QueryOptions, QueryRef, ReadinessProbe, ReadyCallback,
    RemoteError, Value,
};

fn live_client() -> (Rc<MemoryChannel>, Client, QueryRef) {
    let channel = Rc::new(MemoryChannel::new());
    let mut client = Client::new(channel.clone(), ClientConfig::new());
    let tasks = client.register("tasks.get");
    (channel, client, tasks)
}

#[test]
fn test_tasks_data_then_error() {
    let (channel, client, tasks) = live_client();
    let view = client.query(&tasks, json!({}), QueryOptions::new());
    assert!(view.state().unwrap().is_loading);

    channel.publish(&tasks, &CanonicalArgs::empty(), Ok(json!([{ "id": 1, "text": "a" }])));
    let state = view.state().unwrap();
    assert_eq!(state.data, Some(json!([{ "id": 1, "text": "a" }])));
    assert!(!state.is_loading);

    channel.publish(&tasks, &CanonicalArgs::empty(), Err(RemoteError::new("disconnected")));
    let state = view.state().unwrap();
    assert_eq!(state.error.map(|e| e.message), Some("disconnected".to_string()));
    assert_eq!(state.data, None);
}

#[test]
fn test_envelope_with_disabled_transport_keeps_seed() {
    let mut client = Client::new(Rc::new(DisabledChannel), ClientConfig::new());
    client.register("tasks.get");

    let wire = json!({
        "kind": "query-envelope",
        "refName": "tasks.get",
        "args": {},
        "data": [{ "id": 1, "text": "a" }]
    });
    let live = client.decode(&wire).unwrap();

    for _ in 0..3 {
        assert_eq!(live.state().data, Some(json!([{ "id": 1, "text": "a" }])));
    }
    assert!(!live.is_subscribed());
    assert_eq!(client.cache().entry_count(), 0);
}

#[test]
fn test_server_to_client_handoff() {
    // Server render pass
    let backend = Rc::new(MemoryChannel::new());
    let mut server = Client::new(backend.clone(), ClientConfig::server());
    let tasks = server.register("tasks.get");
    let args = CanonicalArgs::from_value(json!({ "list": "inbox", "limit": 20 })).unwrap();
    backend.publish(&tasks, &args, Ok(json!(["t1"])));

    let request = json!({ "limit": 20, "list": "inbox" });
    let loaded = block_on(server.load_once(&tasks, request)).unwrap();
    let envelope = match loaded {
        Loaded::Envelope(envelope) => envelope,
        Loaded::Live(_) => panic!("server render must produce an envelope"),
    };
    let wire = server.encode(&Envelope::QueryEnvelope(envelope)).unwrap();
    server.shutdown();
    assert_eq!(backend.active_subscriptions(), 0);

    // The wire form survives a string round trip
    let wire: Value = serde_json::from_str(&wire.to_string()).unwrap();

    // Client hydration
    let channel = Rc::new(MemoryChannel::new());
    let mut client = Client::new(channel.clone(), ClientConfig::new());
    client.register("tasks.get");
    let live = client.decode(&wire).unwrap();
    assert_eq!(live.state().data, Some(json!(["t1"])));
    assert_eq!(live.args(), &args);

    channel.publish(&tasks, &args, Ok(json!(["t1", "t2"])));
    assert_eq!(live.state().data, Some(json!(["t1", "t2"])));
}

#[test]
fn test_view_shares_entry_with_decoded_subscription() {
    let (channel, client, tasks) = live_client();
    let wire = json!({ "kind": "query-envelope", "refName": "tasks.get", "args": {}, "data": [] });
    let live = client.decode(&wire).unwrap();
    let view = client.query(&tasks, json!({}), QueryOptions::new().initial_data(json!([])));
    view.state().unwrap();

    assert_eq!(channel.subscribe_calls(), 1);
    channel.publish(&tasks, &CanonicalArgs::empty(), Ok(json!(["x"])));
    assert_eq!(live.state().data, view.state().unwrap().data);
}

#[test]
fn test_decode_unknown_reference_fails_fast() {
    let (_, client, _) = live_client();
    let wire = json!({
        "kind": "query-envelope",
        "refName": "projects.list",
        "args": {},
        "data": []
    });
    let err = client.decode(&wire).unwrap_err();
    assert!(err.to_string().contains("projects.list"));
}

#[test]
fn test_prefetch_never_shows_loading() {
    let (channel, client, tasks) = live_client();
    let args = CanonicalArgs::from_value(json!({ "page": 2 })).unwrap();
    channel.publish(&tasks, &args, Ok(json!(["p2"])));

    let prefetched = block_on(client.prefetch(&tasks, json!({ "page": 2 }))).unwrap();
    let state = prefetched.state();
    assert!(!state.is_loading);
    assert_eq!(state.data, Some(json!(["p2"])));
    assert_eq!(channel.active_for(&tasks, &args), 1);
}

#[test]
fn test_pagination_keeps_previous_page() {
    let (channel, client, tasks) = live_client();
    let page = Rc::new(RefCell::new(1));
    let page_arg = page.clone();
    let view = client.query(
        &tasks,
        ArgsSource::thunk(move || Ok(ArgsInput::Value(json!({ "page": *page_arg.borrow() })))),
        QueryOptions::new().keep_previous_data(true),
    );

    view.state().unwrap();
    let page1 = CanonicalArgs::from_value(json!({ "page": 1 })).unwrap();
    channel.publish(&tasks, &page1, Ok(json!(["p1"])));

    *page.borrow_mut() = 2;
    let state = view.state().unwrap();
    assert_eq!(state.data, Some(json!(["p1"])));
    assert!(state.is_stale);

    let page2 = CanonicalArgs::from_value(json!({ "page": 2 })).unwrap();
    channel.publish(&tasks, &page2, Ok(json!(["p2"])));
    let state = view.state().unwrap();
    assert_eq!(state.data, Some(json!(["p2"])));
    assert!(!state.is_stale);
}

#[test]
fn test_optimistic_write_then_server_confirms() {
    let (channel, client, tasks) = live_client();
    let view = client.query(&tasks, json!({}), QueryOptions::new());
    view.state().unwrap();
    channel.publish(&tasks, &CanonicalArgs::empty(), Ok(json!(["a"])));

    let token = view
        .with_override(|current| {
            let mut items = current.and_then(Value::as_array).cloned().unwrap_or_default();
            items.push(json!("b"));
            Value::Array(items)
        })
        .unwrap();
    assert_eq!(view.state().unwrap().data, Some(json!(["a", "b"])));

    channel.publish(&tasks, &CanonicalArgs::empty(), Ok(json!(["a", "b"])));
    token.release();
    assert_eq!(view.state().unwrap().data, Some(json!(["a", "b"])));
    assert!(!view.has_override());
}

/// Probe that holds the swap until the test says the image has loaded.
#[derive(Clone, Default)]
struct HeldProbe {
    waiting: Rc<RefCell<Vec<ReadyCallback>>>,
}

impl HeldProbe {
    fn complete(&self) {
        let waiting: Vec<ReadyCallback> = self.waiting.borrow_mut().drain(..).collect();
        for ready in waiting {
            ready(PreloadOutcome::Ready);
        }
    }
}

impl ReadinessProbe for HeldProbe {
    fn prepare(&self, _resource: &str, ready: ReadyCallback) {
        self.waiting.borrow_mut().push(ready);
    }
}

#[test]
fn test_user_image_swap_is_gated() {
    let channel = Rc::new(MemoryChannel::new());
    let mut client = Client::new(channel.clone(), ClientConfig::new());
    let me = client.register("users.current");
    let probe = HeldProbe::default();

    let wire = client
        .encode(&Envelope::user(json!({ "id": "u1", "image": null })))
        .unwrap();
    let user = client
        .decode_user(&wire, &me, CanonicalArgs::empty(), Rc::new(probe.clone()))
        .unwrap();

    let signed_in = json!({ "id": "u1", "image": "http://x/img.png" });
    channel.publish(&me, &CanonicalArgs::empty(), Ok(signed_in));
    assert_eq!(user.current(), json!({ "id": "u1", "image": null }));

    probe.complete();
    assert_eq!(user.current(), json!({ "id": "u1", "image": "http://x/img.png" }));
}

#[test]
fn test_user_resource_field_from_config() {
    let channel = Rc::new(MemoryChannel::new());
    let config = ClientConfig::from_json_str(r#"{ "user_resource_field": "avatar" }"#).unwrap();
    let client = Client::new(channel.clone(), config);
    let me = QueryRef::new("users.current");
    let probe = HeldProbe::default();

    let user = client
        .decode_user(
            &json!({ "kind": "user-envelope", "data": { "avatar": null } }),
            &me,
            CanonicalArgs::empty(),
            Rc::new(probe.clone()),
        )
        .unwrap();
    assert_eq!(user.resource_field(), "avatar");

    channel.publish(&me, &CanonicalArgs::empty(), Ok(json!({ "avatar": "a.png" })));
    assert!(user.is_pending());
    probe.complete();
    assert_eq!(user.current(), json!({ "avatar": "a.png" }));
}

#[test]
fn test_skip_never_subscribes() {
    let (channel, client, tasks) = live_client();
    let view = client.query(&tasks, ArgsSource::skip(), QueryOptions::new());
    let state = view.state().unwrap();

    assert!(!state.is_loading);
    assert_eq!(state.data, None);
    assert_eq!(state.error, None);
    assert!(!state.is_stale);
    assert_eq!(channel.subscribe_calls(), 0);
}

#[test]
fn test_skip_string_marker() {
    let (channel, client, tasks) = live_client();
    let view = client.query(&tasks, json!("skip"), QueryOptions::new());
    assert!(!view.state().unwrap().is_loading);
    assert_eq!(channel.subscribe_calls(), 0);
}
