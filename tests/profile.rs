mod common;

use axum::http::StatusCode;
use common::{location, text, TestApp};
use goodneighbor::{
    auth::users::{self, Metadata},
    db::{profiles, Category, Role, School},
    feed::{ChangeKind, Row, Table},
};

fn version(page: &str) -> String {
    let start = page.find(r#"name="version" value=""#).unwrap() + r#"name="version" value=""#.len();
    let end = start + page[start..].find('"').unwrap();
    page[start..end].to_owned()
}

#[tokio::test]
async fn profile_is_created_from_identity_metadata_on_first_view() {
    let app = TestApp::new().await;
    let identity = users::find_or_create(
        &app.state.db_pool,
        "sam@stmarks.org",
        Metadata { name: Some("Sam Roe".to_owned()), role: Some(Role::Teacher), school: Some(School::StMarks) },
    )
    .await
    .unwrap();
    app.post_form("/auth/magic-link", &[("email", "sam@stmarks.org")], None).await;
    let redeemed = app.get(&app.mailed_path("sam@stmarks.org"), None).await;
    let cookie = common::session_cookie(&redeemed).unwrap();

    assert!(profiles::get(&app.state.db_pool, identity.id).await.unwrap().is_none());

    let page = text(app.get("/profile", Some(&cookie)).await).await;
    assert!(page.contains("Sam Roe"));
    assert!(page.contains("Teacher"));
    assert!(page.contains("You have not posted any listings yet."));

    let profile = profiles::get(&app.state.db_pool, identity.id).await.unwrap().unwrap();
    assert_eq!(profile.role, Role::Teacher);
    assert_eq!(profile.school, School::StMarks);
}

#[tokio::test]
async fn profile_lists_own_listings() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.signed_in("pat@hockaday.org", "Pat Lee").await;
    app.listing(user_id, "Navy Backpack", Category::Backpacks).await;

    let page = text(app.get("/profile", Some(&cookie)).await).await;
    assert!(page.contains("Navy Backpack"));
    assert!(!page.contains("You have not posted any listings yet."));
}

#[tokio::test]
async fn save_updates_profile_and_announces_it() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.signed_in("pat@hockaday.org", "Pat Lee").await;
    let mut updates = app.state.feed.subscribe(Table::Profiles, ChangeKind::Update, None);

    let edit = text(app.get("/profile?edit=1", Some(&cookie)).await).await;
    let seen = version(&edit);

    let response = app
        .post_form(
            "/profile",
            &[("name", "Pat Lee-Park"), ("role", "Parent"), ("school", "St. Mark's School of Texas"), ("version", &seen)],
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile");

    let profile = profiles::get(&app.state.db_pool, user_id).await.unwrap().unwrap();
    assert_eq!(profile.name, "Pat Lee-Park");
    assert_eq!(profile.role, Role::Parent);

    match updates.next().await {
        Some(Row::Profile(updated)) => assert_eq!(updated.name, "Pat Lee-Park"),
        other => panic!("expected the profile update on the feed, got {other:?}"),
    }

    let home = text(app.get("/", Some(&cookie)).await).await;
    assert!(home.contains("Pat Lee-Park"));
}

#[tokio::test]
async fn stale_edit_is_refused() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.signed_in("pat@hockaday.org", "Pat Lee").await;

    let stale = version(&text(app.get("/profile?edit=1", Some(&cookie)).await).await);
    let edit = |name| [("name", name), ("role", "Student"), ("school", "The Hockaday School"), ("version", stale.as_str())];

    let first = app.post_form("/profile", &edit("From Laptop"), Some(&cookie)).await;
    assert_eq!(first.status(), StatusCode::SEE_OTHER);

    let second = app.post_form("/profile", &edit("From Phone"), Some(&cookie)).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert!(text(second).await.contains("Your profile was changed elsewhere. Reload and try again."));

    let profile = profiles::get(&app.state.db_pool, user_id).await.unwrap().unwrap();
    assert_eq!(profile.name, "From Laptop");
}

#[tokio::test]
async fn profile_needs_a_session() {
    let app = TestApp::new().await;

    let page = text(app.get("/profile", None).await).await;
    assert!(page.contains("Please sign in to view your profile."));

    let save = app.post_form("/profile", &[("name", "x")], None).await;
    assert_eq!(location(&save), "/auth");
}
