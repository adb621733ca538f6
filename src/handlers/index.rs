use axum::response::Html;

// minimal upload front-end, served as-is
pub async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../../assets/index.html"))
}
