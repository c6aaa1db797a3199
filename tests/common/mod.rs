#![allow(dead_code)]

use std::net::SocketAddr;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use goodneighbor::{
    app,
    auth::users,
    config::Config,
    db::{self, listings::{self, NewListing}, Category, Condition, Listing, School},
    AppState,
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "hunter22";
pub const BOUNDARY: &str = "goodneighbor-boundary";

pub struct TestApp {
    pub state: AppState,
    router: Router,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_url: format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display()),
            storage_dir: dir.path().join("storage"),
            ..Config::default()
        };
        let db_pool = db::connect(&config.database_url, 4).await.unwrap();
        let state = AppState::new(db_pool, config).unwrap();

        TestApp {
            router: app(state.clone()),
            state,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::get(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, pairs: &[(&str, &str)], cookie: Option<&str>) -> Response {
        let mut request = Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::from(form(pairs))).unwrap()).await
    }

    pub async fn post_multipart(&self, uri: &str, body: Vec<u8>, cookie: Option<&str>) -> Response {
        let mut request = Request::post(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::from(body)).unwrap()).await
    }

    /// Serves the app on an ephemeral local port, for clients that need a real socket.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        addr
    }

    /// Path of the newest mailed link to `email`, without the public origin.
    pub fn mailed_path(&self, email: &str) -> String {
        let mail = self.state.mailer.last_to(email).expect("no mail sent");
        mail.link
            .strip_prefix(&self.state.config.public_url)
            .expect("link outside the public origin")
            .to_owned()
    }

    pub async fn sign_up(&self, email: &str, name: &str) -> Response {
        self.post_form(
            "/auth/signup",
            &[
                ("name", name),
                ("email", email),
                ("password", PASSWORD),
                ("role", "Student"),
                ("school", "The Hockaday School"),
            ],
            None,
        )
        .await
    }

    /// Signs up, follows the verification link and signs in. Returns the identity id
    /// and the session cookie.
    pub async fn signed_in(&self, email: &str, name: &str) -> (Uuid, String) {
        self.sign_up(email, name).await;
        let verified = self.get(&self.mailed_path(email), None).await;
        assert!(verified.status().is_success());

        let response = self
            .post_form("/auth/signin", &[("email", email), ("password", PASSWORD)], None)
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = session_cookie(&response).expect("sign-in did not set a session");

        let identity = users::find_by_email(&self.state.db_pool, email).await.unwrap().unwrap();
        (identity.id, cookie)
    }

    pub async fn listing(&self, user_id: Uuid, title: &str, category: Category) -> Listing {
        listings::create(
            &self.state.db_pool,
            &self.state.feed,
            NewListing {
                title: title.to_owned(),
                description: format!("{title}, barely used"),
                price: 10.0,
                category,
                condition: Condition::Used,
                school: School::Hockaday,
                image_url: None,
                user_id,
                seller_name: "Pat Lee".to_owned(),
            },
        )
        .await
        .unwrap()
    }
}

/// `name=value` part of the session cookie set by `response`.
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("id="))
        .and_then(|value| value.split(';').next())
        .map(str::to_owned)
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

pub async fn bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn text(response: Response) -> String {
    String::from_utf8(bytes(response).await).unwrap()
}

pub fn form(pairs: &[(&str, &str)]) -> String {
    serde_urlencoded::to_string(pairs).unwrap()
}

/// Text fields followed by an optional `image` file part.
pub fn multipart(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
