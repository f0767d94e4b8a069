//! Integration tests for participant search.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use checkin_core::types::{HolderIdentity, RegistrationStatus, UserId};
use checkin_testing::fixtures;
use common::{Harness, OTHER, W};

#[tokio::test]
async fn short_queries_return_nothing() {
    let h = Harness::new(fixtures::workshop(W.get(), None)).await;
    assert!(h.service.search_participants("").await.unwrap().is_empty());
    assert!(h.service.search_participants("  a ").await.unwrap().is_empty());
}

#[tokio::test]
async fn matches_name_case_insensitively_with_registrations_across_workshops() {
    let h = Harness::new(fixtures::workshop(W.get(), None)).await;
    let here = h.seed(W, 1, "HERE2345").await;
    let there = h.seed(OTHER, 1, "THER2345").await;
    h.service
        .resolve("HERE2345", W, fixtures::operator())
        .await
        .unwrap();

    let matches = h.service.search_participants("LOVELACE").await.unwrap();
    assert_eq!(matches.len(), 1);
    let ada = &matches[0];
    assert_eq!(ada.holder.user_id, UserId::new(1));
    assert_eq!(ada.registrations.len(), 2);

    let by_id = |id| ada.registrations.iter().find(|r| r.registration_id == id).unwrap();
    assert!(by_id(here.id).attended);
    assert_eq!(by_id(here.id).status, RegistrationStatus::Attended);
    assert_eq!(by_id(here.id).workshop_title, "Workshop 7");
    assert!(!by_id(there.id).attended);
    assert_eq!(by_id(there.id).workshop_title, "Workshop 8");
}

#[tokio::test]
async fn matches_email_and_secondary_id() {
    let h = Harness::new(fixtures::workshop(W.get(), None)).await;
    h.directory.add(HolderIdentity {
        secondary_id: Some("S-20931".into()),
        ..fixtures::person(3, "linus@example.org", "Linus")
    });

    let by_email = h.service.search_participants("navy.mil").await.unwrap();
    assert_eq!(by_email.len(), 1);
    assert_eq!(by_email[0].holder.display_name, "Grace Hopper");
    assert!(by_email[0].registrations.is_empty());

    let by_secondary = h.service.search_participants("s-2093").await.unwrap();
    assert_eq!(by_secondary.len(), 1);
    assert_eq!(by_secondary[0].holder.user_id, UserId::new(3));
}

#[tokio::test]
async fn walk_ins_never_appear() {
    let h = Harness::new(fixtures::workshop(W.get(), None)).await;
    h.service
        .resolve("Ada from the hallway", W, fixtures::operator())
        .await
        .unwrap();

    let matches = h.service.search_participants("ada").await.unwrap();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].registrations.is_empty());
}
