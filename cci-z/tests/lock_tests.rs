//! Integration tests for locking and mutability classes.

mod common;

use common::*;
use cci_z::prelude::*;

/// p1 = 0, locked without password: set fails, unlock succeeds, set applies.
#[test]
fn test_lock_without_password_scenario() {
    let (broker, owner) = broker_with_owner("top");
    let p1 = broker
        .create_param(&owner, "p1", 0_i32)
        .top_level()
        .build()
        .expect("p1");

    p1.lock().expect("lock");
    assert_eq!(p1.set(5), Err(AccessError::Locked));
    assert_eq!(p1.get(), 0);

    p1.unlock().expect("unlock");
    p1.set(5).expect("set after unlock");
    assert_eq!(p1.get(), 5);
}

/// A tool holding only a handle is subject to the same lock as the owner.
#[test]
fn test_tool_cannot_bypass_password_lock() {
    let (broker, owner) = broker_with_owner("top");
    let p = broker.create_param(&owner, "p", 1_i32).build().expect("p");
    let token = p.lock_with_token().expect("lock");

    let tool_view = broker.get_param("top.p").expect("registered");
    assert_eq!(tool_view.set_string("2"), Err(AccessError::Locked));
    assert_eq!(tool_view.unlock(), Err(AccessError::WrongToken));
    assert_eq!(tool_view.lock(), Err(AccessError::AlreadyLocked));
    assert!(tool_view.is_locked());
    assert_eq!(p.get(), 1);

    // The owner writes through its own lock
    p.set_with_token(7, &token).expect("write with token");
    tool_view
        .set_string_with_token("8", &token)
        .expect("token is transferable");
    assert_eq!(p.get(), 8);
    assert!(p.is_locked());

    p.unlock_with_token(&token).expect("unlock");
    tool_view.set_string("9").expect("unlocked");
    assert_eq!(p.get(), 9);
}

/// Tokens from another parameter's lock are not accepted.
#[test]
fn test_token_is_per_lock() {
    let (broker, owner) = broker_with_owner("top");
    let a = broker.create_param(&owner, "a", 0_u8).build().expect("a");
    let b = broker.create_param(&owner, "b", 0_u8).build().expect("b");
    let token_a = a.lock_with_token().expect("lock a");
    let token_b = b.lock_with_token().expect("lock b");
    assert_ne!(token_a, token_b);

    assert_eq!(a.set_with_token(1, &token_b), Err(AccessError::WrongToken));
    assert_eq!(a.unlock_with_token(&token_b), Err(AccessError::WrongToken));

    // Relocking after unlock hands out a fresh token
    a.unlock_with_token(&token_a).expect("unlock a");
    let again = a.lock_with_token().expect("relock a");
    assert_ne!(again, token_a);
    assert_eq!(a.unlock_with_token(&token_a), Err(AccessError::WrongToken));
}

/// A write refused by the lock has already passed pre_write; post_write never fires.
#[test]
fn test_locked_write_after_pre_write() {
    let (broker, owner) = broker_with_owner("top");
    let p = broker.create_param(&owner, "p", 0_i32).build().expect("p");
    let log = CallLog::new();
    p.register_callback(
        CallbackType::PreWrite,
        ObserverId::new(),
        log.recorder("pre", CallbackReturn::Nothing),
    )
    .expect("pre_write");
    p.register_callback(
        CallbackType::PostWrite,
        ObserverId::new(),
        log.recorder("post", CallbackReturn::Nothing),
    )
    .expect("post_write");

    p.lock().expect("lock");
    assert_eq!(p.set(1), Err(AccessError::Locked));
    assert_eq!(log.entries(), ["pre:pre_write:top.p"]);
}

/// `immutable` accepts one explicit value and nothing after it.
#[test]
fn test_immutable() {
    let (broker, owner) = broker_with_owner("top");
    let p = broker
        .create_param(&owner, "id", 0_u32)
        .with_mutability(Mutability::Immutable)
        .build()
        .expect("id");
    let handle = broker.get_param("top.id").expect("registered");

    handle.set_string("1").expect("first explicit value");
    assert_eq!(handle.set_string("2"), Err(AccessError::Immutable));
    assert_eq!(p.set(3), Err(AccessError::Immutable));
    assert_eq!(p.get(), 1);
}

/// `elaboration_time` parameters close at the boundary, others stay writable.
#[test]
fn test_elaboration_boundary() {
    let resolver = BrokerResolver::new();
    let owner = Originator::from_object("top").expect("originator");
    let base = resolver
        .create_param(&owner, "base", 0_u64)
        .with_mutability(Mutability::ElaborationTime)
        .build()
        .expect("base");
    let other = resolver
        .create_param(&owner, "other", 0_u64)
        .with_mutability(Mutability::Other)
        .build()
        .expect("other");

    base.set(0x1000).expect("during elaboration");
    resolver.lifecycle().end_of_elaboration();
    assert_eq!(resolver.lifecycle().phase(), Phase::Simulation);

    assert_eq!(base.set(0x2000), Err(AccessError::ElaborationClosed));
    assert_eq!(base.get(), 0x1000);
    other.set(1).expect("other behaves like mutable");
    other.set(2).expect("other behaves like mutable");
}

/// Private brokers created by the resolver share its boundary.
#[test]
fn test_private_broker_shares_boundary() {
    let resolver = BrokerResolver::new();
    let sub = Originator::from_object("top.sub").expect("originator");
    let private = resolver.new_private_broker(&sub).expect("private broker");
    let p = private
        .create_param(&sub, "p", 0_i32)
        .with_mutability(Mutability::ElaborationTime)
        .build()
        .expect("p");

    resolver.lifecycle().end_of_elaboration();
    assert_eq!(p.set(1), Err(AccessError::ElaborationClosed));
}
