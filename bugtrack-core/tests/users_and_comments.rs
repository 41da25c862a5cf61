//! User management and comment scenarios.

mod common;

use async_trait::async_trait;
use bugtrack_core::{
    Bug, BugFilter, BugId, BugPatch, BugStatus, Caller, Comment, CommentId, CoreError,
    InMemoryRepository, NewBug, NewUser, Repository, RepositoryError, Role, User, UserId,
    UserPatch,
};
use bugtrack_core::model::NewComment;
use common::{caller, register, Team};

#[tokio::test]
async fn test_deleting_developer_unassigns_their_bugs() {
    let team = Team::new().await;
    let first = team.reported_bug().await;
    let second = team.reported_bug().await;
    let untouched = team.reported_bug().await;

    for id in [first, second] {
        team.tracker
            .update_bug(&caller(team.admin), id, BugPatch::new().assign(team.dev.id))
            .await
            .unwrap();
    }
    team.tracker
        .update_bug(
            &caller(team.dev),
            second,
            BugPatch::new().status(BugStatus::InProgress),
        )
        .await
        .unwrap();
    team.tracker
        .update_bug(
            &caller(team.admin),
            untouched,
            BugPatch::new().assign(team.other_dev.id),
        )
        .await
        .unwrap();

    let removal = team
        .tracker
        .delete_user(&caller(team.admin), team.dev.id)
        .await
        .unwrap();
    assert_eq!(removal.user.id, team.dev.id);
    assert_eq!(removal.unassigned_bugs, vec![first, second]);

    for id in [first, second] {
        let details = team.tracker.get_bug(&caller(team.admin), id).await.unwrap();
        assert_eq!(details.view.bug.status, BugStatus::Open);
        assert_eq!(details.view.bug.assigned_to, None);
    }
    let details = team
        .tracker
        .get_bug(&caller(team.admin), untouched)
        .await
        .unwrap();
    assert_eq!(details.view.bug.assigned_to, Some(team.other_dev.id));
}

#[tokio::test]
async fn test_deleted_creator_resolves_to_none() {
    let team = Team::new().await;
    let id = team.reported_bug().await;
    team.tracker
        .create_comment(&caller(team.tester), id, "Screenshot attached")
        .await
        .unwrap();

    team.tracker
        .delete_user(&caller(team.admin), team.tester.id)
        .await
        .unwrap();

    let details = team.tracker.get_bug(&caller(team.admin), id).await.unwrap();
    assert_eq!(details.view.bug.created_by, team.tester.id);
    assert!(details.view.creator.is_none());
    assert_eq!(details.comments.len(), 1);
    assert!(details.comments[0].author.is_none());
}

#[tokio::test]
async fn test_only_admin_deletes_users_and_never_themselves() {
    let team = Team::new().await;

    assert!(matches!(
        team.tracker
            .delete_user(&caller(team.tester), team.other_tester.id)
            .await,
        Err(CoreError::Forbidden)
    ));
    assert!(matches!(
        team.tracker
            .delete_user(&caller(team.admin), team.admin.id)
            .await,
        Err(CoreError::Forbidden)
    ));
    assert!(matches!(
        team.tracker
            .delete_user(&caller(team.admin), UserId(404))
            .await,
        Err(CoreError::NotFound { entity: "user", .. })
    ));
}

#[tokio::test]
async fn test_list_users_is_admin_only_and_excludes_self() {
    let team = Team::new().await;

    let users = team.tracker.list_users(&caller(team.admin)).await.unwrap();
    assert_eq!(users.len(), 4);
    assert!(users.iter().all(|u| u.id != team.admin.id));

    assert!(matches!(
        team.tracker.list_users(&caller(team.dev)).await,
        Err(CoreError::Forbidden)
    ));
}

#[tokio::test]
async fn test_duplicate_email_is_a_validation_error() {
    let team = Team::new().await;
    let err = team
        .tracker
        .register_user(NewUser {
            name: "Impostor".to_string(),
            email: " Tess@Example.com ".to_string(),
            role: Role::Admin,
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap_err();
    match err {
        CoreError::Validation { field, message } => {
            assert_eq!(field, "email");
            assert_eq!(message, "has already been taken");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_email_is_rejected() {
    let team = Team::new().await;
    let err = team
        .tracker
        .register_user(NewUser {
            name: "Nobody".to_string(),
            email: "not-an-email".to_string(),
            role: Role::Tester,
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "email"));
}

#[tokio::test]
async fn test_profile_edits() {
    let team = Team::new().await;

    let me = team.tracker.current_user(&caller(team.dev)).await.unwrap();
    assert_eq!(me.email, "dennis@example.com");

    let updated = team
        .tracker
        .update_user(
            &caller(team.dev),
            team.dev.id,
            UserPatch {
                name: Some("  Dennis R.  ".to_string()),
                email: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Dennis R.");

    assert!(matches!(
        team.tracker
            .update_user(&caller(team.dev), team.tester.id, UserPatch::default())
            .await,
        Err(CoreError::Forbidden)
    ));

    let err = team
        .tracker
        .update_user(
            &caller(team.admin),
            team.dev.id,
            UserPatch {
                name: None,
                email: Some("ken@example.com".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "email"));
}

#[tokio::test]
async fn test_viewing_profiles() {
    let team = Team::new().await;
    assert_eq!(
        team.tracker
            .get_user(&caller(team.tester), team.tester.id)
            .await
            .unwrap()
            .role,
        Role::Tester
    );
    assert!(team
        .tracker
        .get_user(&caller(team.admin), team.tester.id)
        .await
        .is_ok());
    assert!(matches!(
        team.tracker.get_user(&caller(team.tester), team.dev.id).await,
        Err(CoreError::Forbidden)
    ));
    assert!(matches!(
        team.tracker.current_user(&Caller::Anonymous).await,
        Err(CoreError::Unauthenticated)
    ));
}

#[tokio::test]
async fn test_anyone_comments_on_any_bug() {
    let team = Team::new().await;
    let id = team.reported_bug().await;

    // The developer cannot view this unassigned bug but may still comment.
    let comment = team
        .tracker
        .create_comment(&caller(team.dev), id, "  Looking into it  ")
        .await
        .unwrap();
    assert_eq!(comment.comment.text, "Looking into it");
    assert_eq!(comment.comment.user_id, team.dev.id);
    assert_eq!(comment.author.map(|a| a.id), Some(team.dev.id));

    let details = team.tracker.get_bug(&caller(team.tester), id).await.unwrap();
    assert_eq!(details.comments.len(), 1);
    assert_eq!(
        details.comments[0].author.as_ref().map(|a| a.name.as_str()),
        Some("Dennis")
    );
}

#[tokio::test]
async fn test_comment_validation_and_missing_bug() {
    let team = Team::new().await;
    let id = team.reported_bug().await;

    assert!(matches!(
        team.tracker.create_comment(&caller(team.tester), id, "   ").await,
        Err(CoreError::Validation { .. })
    ));
    assert!(matches!(
        team.tracker
            .create_comment(&caller(team.tester), bugtrack_core::BugId(77), "hi")
            .await,
        Err(CoreError::NotFound { entity: "bug", id: 77 })
    ));
    assert!(matches!(
        team.tracker.create_comment(&Caller::Anonymous, id, "hi").await,
        Err(CoreError::Unauthenticated)
    ));
}

#[tokio::test]
async fn test_comment_deletion_rules() {
    let team = Team::new().await;
    let id = team.reported_bug().await;
    let by_dev = team
        .tracker
        .create_comment(&caller(team.dev), id, "dev note")
        .await
        .unwrap()
        .comment
        .id;
    let by_tester = team
        .tracker
        .create_comment(&caller(team.tester), id, "tester note")
        .await
        .unwrap()
        .comment
        .id;

    assert!(matches!(
        team.tracker.delete_comment(&caller(team.tester), by_dev).await,
        Err(CoreError::Forbidden)
    ));
    team.tracker
        .delete_comment(&caller(team.dev), by_dev)
        .await
        .unwrap();
    team.tracker
        .delete_comment(&caller(team.admin), by_tester)
        .await
        .unwrap();

    let details = team.tracker.get_bug(&caller(team.admin), id).await.unwrap();
    assert!(details.comments.is_empty());
}

#[tokio::test]
async fn test_deleting_bug_removes_its_comments() {
    let team = Team::new().await;
    let id = team.reported_bug().await;
    let comment = team
        .tracker
        .create_comment(&caller(team.tester), id, "bye")
        .await
        .unwrap()
        .comment
        .id;

    team.tracker.delete_bug(&caller(team.tester), id).await.unwrap();
    assert!(team
        .tracker
        .repository()
        .get_comment(comment)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_registration_trims_name() {
    let team = Team::new().await;
    let actor = register(&team.tracker, "  Barbara  ", "barbara@example.com", Role::Developer).await;
    let me = team.tracker.current_user(&caller(actor)).await.unwrap();
    assert_eq!(me.name, "Barbara");
    assert_eq!(me.role, Role::Developer);
}

/// Stand-in for a real password hasher.
fn fake_hash(password: &str) -> String {
    format!("hashed:{}", password)
}

async fn register_with_password(team: &Team, email: &str, password: &str) -> UserId {
    team.tracker
        .register_user(NewUser {
            name: "Grace".to_string(),
            email: email.to_string(),
            role: Role::Tester,
            password_hash: fake_hash(password),
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_login_resolves_actor() {
    let team = Team::new().await;
    let id = register_with_password(&team, "grace@example.com", "hopper42").await;

    let actor = team
        .tracker
        .authenticate(" Grace@Example.com ", |stored| stored == fake_hash("hopper42"))
        .await
        .unwrap();
    assert_eq!(actor.id, id);
    assert_eq!(actor.role, Role::Tester);

    let me = team.tracker.current_user(&caller(actor)).await.unwrap();
    assert_eq!(me.email, "grace@example.com");
}

#[tokio::test]
async fn test_login_failures_are_unauthenticated() {
    let team = Team::new().await;
    register_with_password(&team, "grace@example.com", "hopper42").await;

    let wrong_password = team
        .tracker
        .authenticate("grace@example.com", |stored| stored == fake_hash("letmein"))
        .await
        .unwrap_err();
    assert!(matches!(wrong_password, CoreError::Unauthenticated));

    let mut consulted = false;
    let unknown_email = team
        .tracker
        .authenticate("nobody@example.com", |_| {
            consulted = true;
            true
        })
        .await
        .unwrap_err();
    assert!(matches!(unknown_email, CoreError::Unauthenticated));
    assert!(!consulted);
}

/// Delegates to an in-memory store but refuses to delete bugs.
struct RefusesBugDeletes(InMemoryRepository);

#[async_trait]
impl Repository for RefusesBugDeletes {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        self.0.insert_user(user).await
    }
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.0.get_user(id).await
    }
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.0.find_user_by_email(email).await
    }
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        self.0.list_users().await
    }
    async fn update_user(&self, user: &User) -> Result<bool, RepositoryError> {
        self.0.update_user(user).await
    }
    async fn delete_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.0.delete_user(id).await
    }
    async fn insert_bug(&self, created_by: UserId, bug: NewBug) -> Result<Bug, RepositoryError> {
        self.0.insert_bug(created_by, bug).await
    }
    async fn get_bug(&self, id: BugId) -> Result<Option<Bug>, RepositoryError> {
        self.0.get_bug(id).await
    }
    async fn update_bug(&self, bug: &Bug) -> Result<bool, RepositoryError> {
        self.0.update_bug(bug).await
    }
    async fn delete_bug(&self, _id: BugId) -> Result<Option<Bug>, RepositoryError> {
        Err(RepositoryError::storage("delete_bug", "disk full"))
    }
    async fn list_bugs(&self, filter: &BugFilter) -> Result<Vec<Bug>, RepositoryError> {
        self.0.list_bugs(filter).await
    }
    async fn unassign_bugs(&self, user: UserId) -> Result<Vec<BugId>, RepositoryError> {
        self.0.unassign_bugs(user).await
    }
    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, RepositoryError> {
        self.0.insert_comment(comment).await
    }
    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        self.0.get_comment(id).await
    }
    async fn list_comments(&self, bug: BugId) -> Result<Vec<Comment>, RepositoryError> {
        self.0.list_comments(bug).await
    }
    async fn delete_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        self.0.delete_comment(id).await
    }
}

#[tokio::test]
async fn test_failed_bug_delete_keeps_comments() {
    let team = Team::with_repository(RefusesBugDeletes(InMemoryRepository::new())).await;
    let id = team.reported_bug().await;
    team.tracker
        .create_comment(&caller(team.tester), id, "still here")
        .await
        .unwrap();

    let err = team
        .tracker
        .delete_bug(&caller(team.admin), id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "storage");

    let details = team.tracker.get_bug(&caller(team.admin), id).await.unwrap();
    assert_eq!(details.comments.len(), 1);
}
