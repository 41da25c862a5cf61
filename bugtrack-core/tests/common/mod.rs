#![allow(dead_code)]

use bugtrack_core::{
    Actor, BugId, BugTracker, Caller, InMemoryRepository, NewBug, NewUser, Priority, Repository,
    Role,
};

/// A tracker with one admin, two developers and two testers.
pub struct Team {
    pub tracker: BugTracker,
    pub admin: Actor,
    pub dev: Actor,
    pub other_dev: Actor,
    pub tester: Actor,
    pub other_tester: Actor,
}

impl Team {
    pub async fn new() -> Self {
        Self::with_repository(InMemoryRepository::new()).await
    }

    pub async fn with_repository(repo: impl Repository + 'static) -> Self {
        let tracker = BugTracker::new(repo);
        let admin = register(&tracker, "Ada", "ada@example.com", Role::Admin).await;
        let dev = register(&tracker, "Dennis", "dennis@example.com", Role::Developer).await;
        let other_dev = register(&tracker, "Ken", "ken@example.com", Role::Developer).await;
        let tester = register(&tracker, "Tess", "tess@example.com", Role::Tester).await;
        let other_tester = register(&tracker, "Otto", "otto@example.com", Role::Tester).await;
        Self {
            tracker,
            admin,
            dev,
            other_dev,
            tester,
            other_tester,
        }
    }

    /// Everyone on the team, admin first.
    pub fn members(&self) -> [Actor; 5] {
        [
            self.admin,
            self.dev,
            self.other_dev,
            self.tester,
            self.other_tester,
        ]
    }

    /// A bug reported by `tester`.
    pub async fn reported_bug(&self) -> BugId {
        self.tracker
            .create_bug(
                &caller(self.tester),
                NewBug::new("Save button does nothing", "Click save, nothing happens", Priority::High),
            )
            .await
            .unwrap()
            .bug
            .id
    }
}

pub async fn register(tracker: &BugTracker, name: &str, email: &str, role: Role) -> Actor {
    let user = tracker
        .register_user(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            role,
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
        })
        .await
        .unwrap();
    Actor::new(user.id, user.role)
}

pub fn caller(actor: Actor) -> Caller {
    Caller::User(actor)
}
