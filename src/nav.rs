use crate::{include_res, res::esc, session::Viewer};

/// Navigation bar: who is signed in, or a sign-in dialog offering a magic link and OAuth.
pub fn render(viewer: &Viewer) -> String {
    let account = match viewer.user() {
        Some(user) => include_res!(str, "/pages/nav_signed_in.html")
            .replace("{name}", &esc(user.display_name())),
        None => include_res!(str, "/pages/nav_signed_out.html").to_owned(),
    };

    include_res!(str, "/pages/nav.html").replace("{account}", &account)
}
