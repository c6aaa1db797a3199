use std::sync::Arc;

use axum::{
    body::Bytes,
    debug_handler,
    extract::{multipart::MultipartError, Multipart, State},
    response::{IntoResponse, Redirect, Response},
};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    config::Config,
    db::{listings::{self, NewListing}, Category, Condition, School},
    feed::ChangeFeed,
    include_res,
    res::{self, attr, esc},
    session::Viewer,
    storage::{self, ObjectStore, LISTING_IMAGES},
    AppResult, AppState,
};

const REQUIRED: &str = "All fields are required.";
const BAD_PRICE: &str = "Price must be a number of at least 0.";

/// Raw form values, kept as typed so a rejected form comes back filled in.
#[derive(Debug, Default)]
struct SellForm {
    title: String,
    description: String,
    price: String,
    category: String,
    condition: String,
    school: String,
}

struct Checked {
    price: f64,
    category: Category,
    condition: Condition,
    school: School,
}

impl SellForm {
    fn check(&self) -> Result<Checked, &'static str> {
        if self.title.trim().is_empty() || self.description.trim().is_empty() || self.price.trim().is_empty() {
            return Err(REQUIRED);
        }
        let (Ok(category), Ok(condition), Ok(school)) = (
            self.category.parse::<Category>(),
            self.condition.parse::<Condition>(),
            self.school.parse::<School>(),
        ) else {
            return Err(REQUIRED);
        };
        let price = match self.price.trim().parse::<f64>() {
            Ok(price) if price.is_finite() && price >= 0.0 => price,
            _ => return Err(BAD_PRICE),
        };

        Ok(Checked { price, category, condition, school })
    }
}

fn gate(viewer: &Viewer, seconds: u64) -> Response {
    let body = include_res!(str, "/pages/sell_gate.html").replace("{seconds}", &seconds.to_string());
    res::page("Post a Listing", viewer, &body).into_response()
}

fn render_form(viewer: &Viewer, form: &SellForm, error: Option<&str>) -> Response {
    let selected = |value: &str, first: &'static str| if value.is_empty() { first.to_owned() } else { value.to_owned() };
    let category = selected(&form.category, Category::Textbooks.as_str());
    let condition = selected(&form.condition, Condition::New.as_str());
    let school = selected(&form.school, School::default().as_str());

    let body = include_res!(str, "/pages/sell.html")
        .replace("{category_options}", &res::options(Category::labels(), Some(category.as_str())))
        .replace("{condition_options}", &res::options(Condition::labels(), Some(condition.as_str())))
        .replace("{school_options}", &res::options(School::labels(), Some(school.as_str())))
        .replace("{error}", &res::error(error))
        .replace("{title}", &attr(&form.title))
        .replace("{price}", &attr(&form.price))
        .replace("{description}", &esc(&form.description));

    res::page("Post a Listing", viewer, &body).into_response()
}

/// Fills `form` from the multipart body and returns the image part, if one was chosen.
async fn read_fields(
    multipart: &mut Multipart,
    form: &mut SellForm,
) -> Result<Option<(String, Bytes)>, MultipartError> {
    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await?;
                if !file_name.is_empty() && !bytes.is_empty() {
                    image = Some((file_name, bytes));
                }
            }
            "title" => form.title = field.text().await?,
            "description" => form.description = field.text().await?,
            "price" => form.price = field.text().await?,
            "category" => form.category = field.text().await?,
            "condition" => form.condition = field.text().await?,
            "school" => form.school = field.text().await?,
            _ => {}
        }
    }
    Ok(image)
}

/// Signed out visitors get a dialog and are sent on to `/auth` after a fixed wait.
#[debug_handler(state = AppState)]
pub(crate) async fn sell_page(
    State(config): State<Arc<Config>>,
    viewer: Viewer,
) -> Response {
    if viewer.user().is_none() {
        return gate(&viewer, config.sell_redirect_seconds);
    }
    render_form(&viewer, &SellForm::default(), None)
}

#[debug_handler(state = AppState)]
pub(crate) async fn sell(
    State(db_pool): State<SqlitePool>,
    State(feed): State<ChangeFeed>,
    State(storage): State<ObjectStore>,
    viewer: Viewer,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let Some(user) = viewer.user() else {
        return Ok(Redirect::to("/auth").into_response());
    };

    let mut form = SellForm::default();
    let image = match read_fields(&mut multipart, &mut form).await {
        Ok(image) => image,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "sell form could not be read");
            return Ok(render_form(&viewer, &form, Some(&format!("Image upload failed: {e}"))));
        }
    };

    let checked = match form.check() {
        Ok(checked) => checked,
        Err(message) => return Ok(render_form(&viewer, &form, Some(message))),
    };

    let image_url = match image {
        Some((file_name, bytes)) => {
            let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
            let object = storage::image_name(user.id, millis, &file_name);
            if let Err(e) = storage.upload(LISTING_IMAGES, &object, &bytes).await {
                warn!(user_id = %user.id, error = %e, "listing image upload failed");
                return Ok(render_form(&viewer, &form, Some(&format!("Image upload failed: {e}"))));
            }
            Some(storage.public_url(LISTING_IMAGES, &object))
        }
        None => None,
    };

    let new = NewListing {
        title: form.title.trim().to_owned(),
        description: form.description.trim().to_owned(),
        price: checked.price,
        category: checked.category,
        condition: checked.condition,
        school: checked.school,
        image_url,
        user_id: user.id,
        seller_name: user.seller_name().to_owned(),
    };
    if let Err(e) = listings::create(&db_pool, &feed, new).await {
        warn!(user_id = %user.id, error = ?e, "listing insert failed");
        return Ok(render_form(&viewer, &form, Some(&e.to_string())));
    }

    Ok(Redirect::to("/browse").into_response())
}
