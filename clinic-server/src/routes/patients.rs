use axum::{
    Router,
    extract::DefaultBodyLimit,
    handler::Handler,
    routing::{get, post, put},
};

use crate::{
    AppState,
    handlers::{images, patients, visits},
};

/// Routes mounted under `/api/patients`. Multipart routes get the upload
/// body limit, everything else keeps axum's default.
pub fn create_patients_router(state: AppState) -> Router<AppState> {
    let upload_limit = DefaultBodyLimit::max(state.config().max_upload_bytes);

    Router::new()
        .route("/", post(patients::create_patient))
        .route("/search", get(patients::search_patients))
        .route(
            "/{id}",
            put(patients::update_patient).delete(patients::delete_patient),
        )
        .route(
            "/{id}/visits",
            get(patients::get_patient_visits).post(visits::add_visit.layer(upload_limit)),
        )
        .route(
            "/visits/{visit_id}",
            put(visits::update_visit).delete(visits::delete_visit),
        )
        .route(
            "/visits/{visit_id}/images",
            post(images::add_image_to_visit.layer(upload_limit)),
        )
        .route(
            "/images/{image_id}",
            put(images::update_visit_image.layer(upload_limit)).delete(images::delete_visit_image),
        )
}
