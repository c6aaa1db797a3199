mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{bytes, location, multipart, text, TestApp};
use goodneighbor::{
    db::{listings::{self, ListingFilter}, Category},
    feed::{ChangeKind, Row, Table},
};
use uuid::Uuid;

#[tokio::test]
async fn browse_by_category_lists_newest_first() {
    let app = TestApp::new().await;
    let seller = Uuid::now_v7();

    app.listing(seller, "Algebra II Textbook", Category::Textbooks).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    app.listing(seller, "TI-84 Calculator", Category::Calculators).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    app.listing(seller, "Chemistry Textbook", Category::Textbooks).await;

    let found = listings::browse(
        &app.state.db_pool,
        &ListingFilter { category: Some(Category::Textbooks), ..Default::default() },
    )
    .await
    .unwrap();
    let titles: Vec<&str> = found.iter().map(|listing| listing.title.as_str()).collect();
    assert_eq!(titles, ["Chemistry Textbook", "Algebra II Textbook"]);

    let page = text(app.get("/browse?category=Textbooks&school=all", None).await).await;
    let newer = page.find("Chemistry Textbook").unwrap();
    let older = page.find("Algebra II Textbook").unwrap();
    assert!(newer < older);
    assert!(!page.contains("TI-84 Calculator"));
    assert!(page.contains(r#"<option value="Textbooks" selected>"#));
}

#[tokio::test]
async fn browse_search_matches_title_substring_case_insensitively() {
    let app = TestApp::new().await;
    let seller = Uuid::now_v7();
    app.listing(seller, "Algebra II Textbook", Category::Textbooks).await;
    app.listing(seller, "Lacrosse Stick", Category::SportsGear).await;

    let page = text(app.get("/browse?search=ALGEBRA", None).await).await;
    assert!(page.contains("Algebra II Textbook"));
    assert!(!page.contains("Lacrosse Stick"));

    let none = text(app.get("/browse?search=100%25", None).await).await;
    assert!(none.contains("No listings found."));
}

#[tokio::test]
async fn sell_page_signed_out_shows_dialog_then_redirects() {
    let app = TestApp::new().await;

    let response = app.get("/sell", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = text(response).await;
    assert!(body.contains("You must be signed in to post a listing"));
    assert!(body.contains(r#"<meta http-equiv="refresh" content="2;url=/auth">"#));
    assert!(!body.contains("Post a New Listing"));
}

#[tokio::test]
async fn sell_submit_signed_out_redirects_to_auth() {
    let app = TestApp::new().await;
    let body = multipart(&[("title", "Backpack")], None);

    let response = app.post_multipart("/sell", body, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth");
}

#[tokio::test]
async fn sell_uploads_image_and_posts_listing() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.signed_in("pat@hockaday.org", "Pat Lee").await;
    let mut inserts = app.state.feed.subscribe(Table::Listings, ChangeKind::Insert, None);

    let image: &[u8] = b"\x89PNG\r\n\x1a\nnot really a png";
    let body = multipart(
        &[
            ("title", "Navy Backpack"),
            ("description", "Two zip pockets"),
            ("price", "12.5"),
            ("category", "Backpacks"),
            ("condition", "Like New"),
            ("school", "The Hockaday School"),
        ],
        Some(("Photo.PNG", image)),
    );
    let response = app.post_multipart("/sell", body, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/browse");

    let mine = listings::by_owner(&app.state.db_pool, user_id).await.unwrap();
    assert_eq!(mine.len(), 1);
    let listing = &mine[0];
    assert_eq!(listing.price, 12.5);
    assert_eq!(listing.seller_name, "Pat Lee");

    let url = listing.image_url.as_deref().unwrap();
    let path = url.strip_prefix(&app.state.config.public_url).unwrap();
    assert!(path.starts_with(&format!("/storage/listing-images/{user_id}-")));
    assert!(path.ends_with(".png"));

    let served = app.get(path, None).await;
    assert_eq!(served.status(), StatusCode::OK);
    assert_eq!(bytes(served).await, image);

    match inserts.next().await {
        Some(Row::Listing(announced)) => assert_eq!(announced.id, listing.id),
        other => panic!("expected the new listing on the feed, got {other:?}"),
    }
}

#[tokio::test]
async fn sell_rejects_negative_price() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.signed_in("pat@hockaday.org", "Pat Lee").await;

    let body = multipart(
        &[
            ("title", "Calculator"),
            ("description", "Works"),
            ("price", "-3"),
            ("category", "Calculators"),
            ("condition", "Used"),
            ("school", "The Hockaday School"),
        ],
        None,
    );
    let response = app.post_multipart("/sell", body, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = text(response).await;
    assert!(page.contains("Price must be a number of at least 0."));
    assert!(page.contains(r#"value="Calculator""#));

    assert!(listings::by_owner(&app.state.db_pool, user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn detail_offers_message_seller_to_other_signed_in_users() {
    let app = TestApp::new().await;
    let (seller_id, seller_cookie) = app.signed_in("pat@hockaday.org", "Pat Lee").await;
    let (_, buyer_cookie) = app.signed_in("sam@stmarks.org", "Sam Roe").await;
    let listing = app.listing(seller_id, "Algebra II Textbook", Category::Textbooks).await;
    let uri = format!("/browse/{}", listing.id);
    let chat_link = format!("/messages/{}/{}", listing.id, seller_id);

    let as_buyer = text(app.get(&uri, Some(&buyer_cookie)).await).await;
    assert!(as_buyer.contains("Algebra II Textbook"));
    assert!(as_buyer.contains("$10.00"));
    assert!(as_buyer.contains(&chat_link));

    let as_owner = text(app.get(&uri, Some(&seller_cookie)).await).await;
    assert!(!as_owner.contains("Message Seller"));

    let signed_out = text(app.get(&uri, None).await).await;
    assert!(!signed_out.contains("Message Seller"));
}

#[tokio::test]
async fn unknown_listing_shows_placeholder() {
    let app = TestApp::new().await;

    for uri in [format!("/browse/{}", Uuid::now_v7()), "/browse/not-an-id".to_owned()] {
        let response = app.get(&uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(text(response).await.contains("Listing not found."));
    }
}

fn backpack_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("title", "Navy Backpack"),
        ("description", "Two zip pockets"),
        ("price", "15"),
        ("category", "Backpacks"),
        ("condition", "Used"),
        ("school", "The Hockaday School"),
    ]
}

#[tokio::test]
async fn sell_accepts_phone_sized_photos() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.signed_in("pat@hockaday.org", "Pat Lee").await;

    let photo = vec![0xA5u8; 3 * 1024 * 1024];
    let body = multipart(&backpack_fields(), Some(("photo.jpg", photo.as_slice())));
    let response = app.post_multipart("/sell", body, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/browse");

    let mine = listings::by_owner(&app.state.db_pool, user_id).await.unwrap();
    assert_eq!(mine.len(), 1);
    let url = mine[0].image_url.as_deref().unwrap();
    let path = url.strip_prefix(&app.state.config.public_url).unwrap();
    assert!(path.ends_with(".jpg"));
    assert_eq!(bytes(app.get(path, None).await).await.len(), photo.len());
}

#[tokio::test]
async fn broken_sell_body_is_reported_inline() {
    let app = TestApp::new().await;
    let (user_id, cookie) = app.signed_in("pat@hockaday.org", "Pat Lee").await;

    let mut body = multipart(&backpack_fields(), Some(("photo.jpg", &[1u8, 2, 3][..])));
    // cut the closing boundary off
    body.truncate(body.len() - 30);
    let response = app.post_multipart("/sell", body, Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = text(response).await;
    assert!(page.contains("Image upload failed: "));
    assert!(page.contains("Post a New Listing"));

    assert!(listings::by_owner(&app.state.db_pool, user_id).await.unwrap().is_empty());
}
