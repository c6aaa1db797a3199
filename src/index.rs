use axum::{debug_handler, response::{IntoResponse, Response}};

use crate::{db::Category, include_res, res, session::Viewer, AppResult, AppState};

struct Featured {
    title: &'static str,
    description: &'static str,
    price: &'static str,
    category: Category,
    rating: f32,
}

const FEATURED: &[Featured] = &[
    Featured {
        title: "Algebra II Textbook",
        description: "Gently used Algebra II textbook, 2022 edition. No writing inside.",
        price: "Free",
        category: Category::Textbooks,
        rating: 5.0,
    },
    Featured {
        title: "Graphing Calculator (TI-84)",
        description: "Fully functional, includes cover. Great for high school math.",
        price: "Free",
        category: Category::Calculators,
        rating: 4.9,
    },
    Featured {
        title: "School Uniform (Boys, M)",
        description: "Like new, washed and ready. Includes shirt and pants.",
        price: "Free",
        category: Category::Uniforms,
        rating: 4.8,
    },
];

#[debug_handler(state = AppState)]
pub async fn index(viewer: Viewer) -> AppResult<Response> {
    let featured: String = FEATURED
        .iter()
        .map(|item| {
            include_res!(str, "/pages/featured_item.html")
                .replace("{title}", item.title)
                .replace("{description}", item.description)
                .replace("{price}", item.price)
                .replace("{rating}", &format!("{:.1}", item.rating))
                .replace("{category_query}", &item.category.as_str().replace(' ', "+"))
                .replace("{category}", item.category.as_str())
        })
        .collect();

    let body = include_res!(str, "/pages/home.html")
        .replace("{hero}", &res::markdown(include_res!(str, "/pages/home.md")))
        .replace("{featured}", &featured);

    Ok(res::page("Good Neighbor", &viewer, &body).into_response())
}
