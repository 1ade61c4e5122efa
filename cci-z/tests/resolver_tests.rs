//! Integration tests for originator-driven broker resolution.

mod common;

use cci_z::prelude::*;
use cci_z::resolver::DEFAULT_BROKER_NAME;

/// Components in a private subtree register with the private broker; the
/// rest of the hierarchy only sees the default one.
#[test]
fn test_private_subtree_is_isolated() {
    common::init_tracing();
    let resolver = BrokerResolver::new();
    let secret = Originator::from_object("top.secret").expect("originator");
    let private = resolver.new_private_broker(&secret).expect("private");

    let leaf = Originator::from_object("top.secret.leaf").expect("originator");
    let hidden = resolver
        .create_param(&leaf, "key", 42_u32)
        .build()
        .expect("hidden");
    let public = resolver
        .create_param(&Originator::from_object("top.cpu").expect("originator"), "freq", 1_u32)
        .build()
        .expect("public");

    assert_eq!(hidden.name(), "top.secret.leaf.key");
    assert!(hidden.broker().same_as(&private));
    assert!(public.broker().same_as(resolver.default_broker()));

    assert!(!resolver.default_broker().exists_param("top.secret.leaf.key"));
    assert_eq!(private.get_param_list(""), ["top.secret.leaf.key"]);
    assert_eq!(resolver.default_broker().get_param_list(""), ["top.cpu.freq"]);
}

/// A subtree that already declared parameters keeps resolving to the broker
/// that holds them.
#[test]
fn test_private_broker_refused_for_populated_context() {
    let resolver = BrokerResolver::new();
    let cpu = Originator::from_object("top.cpu").expect("originator");
    let freq = resolver
        .create_param(&cpu, "freq", 100_u32)
        .build()
        .expect("freq");

    let top = Originator::from_object("top").expect("originator");
    assert_eq!(
        resolver.new_private_broker(&top).expect_err("top is populated"),
        Error::ContextInUse {
            context: "top".into(),
            broker: DEFAULT_BROKER_NAME.into(),
        }
    );
    assert!(matches!(
        resolver.register_broker(&cpu, Broker::new("late")),
        Err(Error::ContextInUse { .. })
    ));

    let tool_view = resolver
        .resolve(&cpu)
        .get_param("top.cpu.freq")
        .expect("still reachable");
    assert_eq!(&tool_view, freq.handle());

    // Unpopulated siblings may still go private
    let mem = Originator::from_object("top.mem").expect("originator");
    let private = resolver.new_private_broker(&mem).expect("private mem");
    assert!(resolver.resolve(&mem).same_as(&private));

    // Once the parameters are gone the context is free again
    drop(freq);
    resolver.new_private_broker(&top).expect("top is empty now");
}

/// A tool outside the hierarchy resolves to the default broker unless a
/// broker was registered for its name.
#[test]
fn test_tool_resolution() {
    let resolver = BrokerResolver::new();
    let tool = Originator::from_name("config_tool").expect("originator");
    assert!(resolver.resolve(&tool).same_as(resolver.default_broker()));

    let own = Broker::new("tool_broker");
    resolver.register_broker(&tool, own.clone()).expect("register");
    assert!(resolver.resolve(&tool).same_as(&own));
}

/// Resolver built around an existing broker reuses it and its boundary.
#[test]
fn test_resolver_with_existing_default() {
    let lifecycle = Lifecycle::new();
    let broker = Broker::builder("global")
        .with_lifecycle(lifecycle.clone())
        .with_init_value("top.x", "5")
        .build()
        .expect("broker");
    let resolver = BrokerResolver::builder()
        .with_default_broker(broker.clone())
        .build()
        .expect("resolver");

    assert!(resolver.default_broker().same_as(&broker));
    assert!(resolver.lifecycle().same_as(&lifecycle));

    let top = Originator::from_object("top").expect("originator");
    let x = resolver.create_param(&top, "x", 0_i64).build().expect("x");
    assert_eq!(x.get(), 5);
}

/// Originators with nothing to identify them are rejected up front.
#[test]
fn test_originator_requires_context() {
    assert_eq!(Originator::new(None, None), Err(Error::MissingOriginator));
    assert_eq!(Originator::new(Some(""), Some("")), Err(Error::MissingOriginator));
    assert!(Originator::from_object("top").expect("originator").get_parent().is_unknown());
}
