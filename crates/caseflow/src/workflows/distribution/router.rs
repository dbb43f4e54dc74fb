use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::domain::{CaseId, LawyerId, OfferId};
use super::engine::DistributionError;
use super::repository::{CaseRepository, LawyerRepository, OfferRepository, RepositoryError};
use super::service::{DistributionService, OfferResponseError};

type SharedService<C, L, O> = Arc<DistributionService<C, L, O>>;

/// Router builder exposing distribution, offer responses and quota lookups.
pub fn distribution_router<C, L, O>(service: SharedService<C, L, O>) -> Router
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/cases/:case_id/distribute",
            post(distribute_handler::<C, L, O>),
        )
        .route(
            "/api/v1/cases/:case_id/redistribute",
            post(redistribute_handler::<C, L, O>),
        )
        .route(
            "/api/v1/cases/:case_id/offers",
            get(case_offers_handler::<C, L, O>),
        )
        .route(
            "/api/v1/cases/:case_id/lawyers/:lawyer_id/score",
            get(explain_handler::<C, L, O>),
        )
        .route("/api/v1/offers/sweep", post(sweep_handler::<C, L, O>))
        .route(
            "/api/v1/offers/:offer_id/view",
            post(view_handler::<C, L, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/accept",
            post(accept_handler::<C, L, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/decline",
            post(decline_handler::<C, L, O>),
        )
        .route(
            "/api/v1/lawyers/:lawyer_id/quota",
            get(quota_handler::<C, L, O>),
        )
        .with_state(service)
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}

fn repository_status(error: &RepositoryError) -> StatusCode {
    match error {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict => StatusCode::CONFLICT,
        RepositoryError::DuplicateId(_) | RepositoryError::Unavailable(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn distribution_error_response(error: DistributionError) -> Response {
    let status = match &error {
        DistributionError::CaseNotFound(_) | DistributionError::LawyerNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DistributionError::InvalidState { .. } => StatusCode::CONFLICT,
        DistributionError::Repository(inner) => repository_status(inner),
    };
    error_body(status, error.to_string())
}

fn offer_error_response(error: OfferResponseError) -> Response {
    match error {
        OfferResponseError::OfferNotFound(_) => {
            error_body(StatusCode::NOT_FOUND, error.to_string())
        }
        OfferResponseError::InvalidTransition { .. } => {
            error_body(StatusCode::CONFLICT, error.to_string())
        }
        OfferResponseError::Distribution(inner) => distribution_error_response(inner),
        OfferResponseError::Repository(inner) => {
            error_body(repository_status(&inner), inner.to_string())
        }
    }
}

pub(crate) async fn distribute_handler<C, L, O>(
    State(service): State<SharedService<C, L, O>>,
    Path(case_id): Path<String>,
) -> Response
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.distribute(&CaseId(case_id)) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => distribution_error_response(error),
    }
}

pub(crate) async fn redistribute_handler<C, L, O>(
    State(service): State<SharedService<C, L, O>>,
    Path(case_id): Path<String>,
) -> Response
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.redistribute(&CaseId(case_id)) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => distribution_error_response(error),
    }
}

pub(crate) async fn case_offers_handler<C, L, O>(
    State(service): State<SharedService<C, L, O>>,
    Path(case_id): Path<String>,
) -> Response
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.case_offers(&CaseId(case_id)) {
        Ok(offers) => (StatusCode::OK, axum::Json(offers)).into_response(),
        Err(error) => distribution_error_response(error),
    }
}

pub(crate) async fn explain_handler<C, L, O>(
    State(service): State<SharedService<C, L, O>>,
    Path((case_id, lawyer_id)): Path<(String, String)>,
) -> Response
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.explain(&CaseId(case_id), &LawyerId(lawyer_id)) {
        Ok(score) => (StatusCode::OK, axum::Json(score)).into_response(),
        Err(error) => distribution_error_response(error),
    }
}

pub(crate) async fn sweep_handler<C, L, O>(
    State(service): State<SharedService<C, L, O>>,
) -> Response
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.sweep() {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_body(repository_status(&error), error.to_string()),
    }
}

pub(crate) async fn view_handler<C, L, O>(
    State(service): State<SharedService<C, L, O>>,
    Path(offer_id): Path<String>,
) -> Response
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.view_offer(&OfferId(offer_id)) {
        Ok(offer) => (StatusCode::OK, axum::Json(offer)).into_response(),
        Err(error) => offer_error_response(error),
    }
}

pub(crate) async fn accept_handler<C, L, O>(
    State(service): State<SharedService<C, L, O>>,
    Path(offer_id): Path<String>,
) -> Response
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.accept_offer(&OfferId(offer_id)) {
        Ok(offer) => (StatusCode::OK, axum::Json(offer)).into_response(),
        Err(error) => offer_error_response(error),
    }
}

pub(crate) async fn decline_handler<C, L, O>(
    State(service): State<SharedService<C, L, O>>,
    Path(offer_id): Path<String>,
) -> Response
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.decline_offer(&OfferId(offer_id)) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => offer_error_response(error),
    }
}

pub(crate) async fn quota_handler<C, L, O>(
    State(service): State<SharedService<C, L, O>>,
    Path(lawyer_id): Path<String>,
) -> Response
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.quota_status(&LawyerId(lawyer_id)) {
        Ok(status) => (StatusCode::OK, axum::Json(status)).into_response(),
        Err(error) => distribution_error_response(error),
    }
}
