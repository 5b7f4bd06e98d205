use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::catalog::{AccommodationQuery, CatalogError};
use super::domain::{
    AccommodationId, ActionKind, MemberId, NewAccommodation, NewCampus, NewMember, NewSlot,
    NewSpecialist, NewUniversity, RatingId, ReservationId, University, UniversityContext,
};
use super::identity::{AuthError, RegistrationError};
use super::lifecycle::{ReservationError, ReservationRequest};
use super::notification::MailChannel;
use super::ratings::{ModerationRequest, PageRequest, RatingError, RatingSubmission};
use super::service::UniHavenService;
use super::store::{HousingStore, StoreError};

type SharedService<S, M> = Arc<UniHavenService<S, M>>;

/// Router exposing registration, catalog, reservation, rating and audit endpoints.
pub fn housing_router<S, M>(service: SharedService<S, M>) -> Router
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    Router::new()
        .route(
            "/api/universities",
            post(register_university::<S, M>).get(list_universities::<S, M>),
        )
        .route("/api/members", post(register_member::<S, M>))
        .route(
            "/api/members/:member_id/reservations",
            get(member_reservations::<S, M>),
        )
        .route("/api/specialists", post(register_specialist::<S, M>))
        .route("/api/campuses", post(register_campus::<S, M>))
        .route("/api/accommodations", post(register_accommodation::<S, M>))
        .route(
            "/api/accommodations/search",
            get(search_accommodations::<S, M>),
        )
        .route(
            "/api/accommodations/:accommodation_id",
            get(accommodation_detail::<S, M>).delete(remove_accommodation::<S, M>),
        )
        .route(
            "/api/accommodations/:accommodation_id/mark-unavailable",
            post(mark_unavailable::<S, M>),
        )
        .route(
            "/api/accommodations/:accommodation_id/slots",
            post(add_slot::<S, M>),
        )
        .route(
            "/api/accommodations/:accommodation_id/ratings",
            get(accommodation_ratings::<S, M>),
        )
        .route(
            "/api/reservations",
            post(create_reservation::<S, M>).get(list_reservations::<S, M>),
        )
        .route(
            "/api/reservations/:reservation_id",
            get(reservation_detail::<S, M>),
        )
        .route(
            "/api/reservations/:reservation_id/cancel",
            post(cancel_reservation::<S, M>),
        )
        .route(
            "/api/reservations/:reservation_id/sign-contract",
            post(sign_contract::<S, M>),
        )
        .route("/api/ratings", post(rate::<S, M>))
        .route("/api/ratings/pending", get(pending_ratings::<S, M>))
        .route("/api/ratings/:rating_id/moderate", post(moderate::<S, M>))
        .route("/api/action-logs", get(action_logs::<S, M>))
        .with_state(service)
}

/// University resolved from the `Authorization: Token <uuid>` header.
///
/// Rejection happens before the handler body runs, so an unauthenticated request never
/// reaches the domain services.
#[derive(Debug, Clone)]
pub struct AuthenticatedUniversity(pub UniversityContext);

#[async_trait]
impl<S, M> FromRequestParts<SharedService<S, M>> for AuthenticatedUniversity
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        service: &SharedService<S, M>,
    ) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| AuthError::Malformed)?),
            None => None,
        };
        let university = service.registry().authenticate(header)?;
        Ok(Self(UniversityContext::from(&university)))
    }
}

/// JSON error response: `{"error": <message>, "code": <machine code>}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl ToString) -> Self {
        Self {
            status,
            code,
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, error = %self.message, "request failed");
        }
        let body = Json(json!({ "error": self.message, "code": self.code }));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(_) => Self::new(StatusCode::CONFLICT, "conflict", value),
            StoreError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, "not_found", value),
            StoreError::SlotTaken(_) => {
                Self::new(StatusCode::CONFLICT, "slot_unavailable", value)
            }
            StoreError::StaleStatus { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_transition", value)
            }
            StoreError::Overlap { .. } => Self::new(StatusCode::BAD_REQUEST, "validation", value),
            StoreError::InUse { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "active_reservations", value)
            }
            StoreError::Unavailable(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable", value)
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::Missing => Self::new(StatusCode::UNAUTHORIZED, "missing_token", value),
            AuthError::Malformed => Self::new(StatusCode::UNAUTHORIZED, "malformed_token", value),
            AuthError::InvalidToken => Self::new(StatusCode::UNAUTHORIZED, "invalid_token", value),
            AuthError::Store(err) => err.into(),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(value: RegistrationError) -> Self {
        match value {
            RegistrationError::Validation(err) => {
                Self::new(StatusCode::BAD_REQUEST, "validation", err)
            }
            RegistrationError::Store(err) => err.into(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, "validation", value),
            CatalogError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, "not_found", value),
            CatalogError::Forbidden => Self::new(StatusCode::FORBIDDEN, "forbidden", value),
            CatalogError::Conflict(_) => Self::new(StatusCode::CONFLICT, "conflict", value),
            CatalogError::InUse { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "active_reservations", value)
            }
            CatalogError::Store(err) => err.into(),
        }
    }
}

impl From<ReservationError> for ApiError {
    fn from(value: ReservationError) -> Self {
        match value {
            ReservationError::SlotUnavailable(_) => {
                Self::new(StatusCode::CONFLICT, "slot_unavailable", value)
            }
            ReservationError::NotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "not_found", value)
            }
            ReservationError::InvalidTransition { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_transition", value)
            }
            ReservationError::Forbidden => Self::new(StatusCode::FORBIDDEN, "forbidden", value),
            ReservationError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation", value)
            }
            ReservationError::Store(err) => err.into(),
        }
    }
}

impl From<RatingError> for ApiError {
    fn from(value: RatingError) -> Self {
        match value {
            RatingError::Validation(_) | RatingError::NotRateable(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation", value)
            }
            RatingError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, "not_found", value),
            RatingError::Forbidden => Self::new(StatusCode::FORBIDDEN, "forbidden", value),
            RatingError::AlreadyRated(_) => Self::new(StatusCode::CONFLICT, "conflict", value),
            RatingError::Store(err) => err.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "malformed_body", value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "malformed_query", value.body_text())
    }
}

#[derive(Debug, Serialize)]
struct Registration {
    #[serde(flatten)]
    university: University,
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ActionLogFilter {
    #[serde(default)]
    action: Option<ActionKind>,
}

async fn register_university<S, M>(
    State(service): State<SharedService<S, M>>,
    payload: Result<Json<NewUniversity>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Json(draft) = payload?;
    let (university, token) = service.registry().register(draft)?;
    let body = Registration {
        university,
        token: token.as_str().to_string(),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn list_universities<S, M>(
    State(service): State<SharedService<S, M>>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let universities = service.store().universities()?;
    Ok(Json(universities).into_response())
}

async fn register_member<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    payload: Result<Json<NewMember>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Json(draft) = payload?;
    let member = service.catalog().register_member(&ctx, draft)?;
    Ok((StatusCode::CREATED, Json(member)).into_response())
}

async fn register_specialist<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    payload: Result<Json<NewSpecialist>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Json(draft) = payload?;
    let specialist = service.catalog().register_specialist(&ctx, draft)?;
    Ok((StatusCode::CREATED, Json(specialist)).into_response())
}

async fn register_campus<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    payload: Result<Json<NewCampus>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Json(draft) = payload?;
    let campus = service.catalog().register_campus(&ctx, draft)?;
    Ok((StatusCode::CREATED, Json(campus)).into_response())
}

async fn register_accommodation<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    payload: Result<Json<NewAccommodation>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Json(draft) = payload?;
    let accommodation = service.catalog().register_accommodation(&ctx, draft)?;
    Ok((StatusCode::CREATED, Json(accommodation)).into_response())
}

async fn search_accommodations<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    query: Result<Query<AccommodationQuery>, QueryRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Query(query) = query?;
    let results = service.catalog().search(&ctx, &query)?;
    Ok(Json(results).into_response())
}

async fn accommodation_detail<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(accommodation_id): Path<AccommodationId>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let view = service.catalog().accommodation(&ctx, accommodation_id)?;
    Ok(Json(view).into_response())
}

async fn mark_unavailable<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(accommodation_id): Path<AccommodationId>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let accommodation = service.catalog().mark_unavailable(&ctx, accommodation_id)?;
    Ok(Json(accommodation).into_response())
}

async fn remove_accommodation<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(accommodation_id): Path<AccommodationId>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let removed = service.catalog().remove_accommodation(&ctx, accommodation_id)?;
    let status = format!("accommodation '{}' deleted", removed.name);
    Ok(Json(json!({ "status": status, "id": removed.id })).into_response())
}

async fn add_slot<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(accommodation_id): Path<AccommodationId>,
    payload: Result<Json<NewSlot>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Json(draft) = payload?;
    let slot = service.catalog().add_slot(&ctx, accommodation_id, draft)?;
    Ok((StatusCode::CREATED, Json(slot)).into_response())
}

async fn accommodation_ratings<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(accommodation_id): Path<AccommodationId>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let ratings = service.catalog().ratings(&ctx, accommodation_id)?;
    Ok(Json(ratings).into_response())
}

async fn create_reservation<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Json(request) = payload?;
    let reservation = service.lifecycle().create(&ctx, request)?;
    Ok((StatusCode::CREATED, Json(reservation)).into_response())
}

async fn list_reservations<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let reservations = service.lifecycle().list(&ctx)?;
    Ok(Json(reservations).into_response())
}

async fn member_reservations<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(member_id): Path<MemberId>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let reservations = service.lifecycle().for_member(&ctx, member_id)?;
    Ok(Json(reservations).into_response())
}

async fn reservation_detail<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(reservation_id): Path<ReservationId>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let reservation = service.lifecycle().get(&ctx, reservation_id)?;
    Ok(Json(reservation).into_response())
}

async fn cancel_reservation<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(reservation_id): Path<ReservationId>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let reservation = service.lifecycle().cancel(&ctx, reservation_id)?;
    Ok(Json(reservation).into_response())
}

async fn sign_contract<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(reservation_id): Path<ReservationId>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let reservation = service.lifecycle().sign_contract(&ctx, reservation_id)?;
    Ok(Json(reservation).into_response())
}

async fn rate<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    payload: Result<Json<RatingSubmission>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Json(submission) = payload?;
    let rating = service.ratings().rate(&ctx, submission)?;
    Ok((StatusCode::CREATED, Json(rating)).into_response())
}

async fn pending_ratings<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Query(page) = page?;
    let queue = service.ratings().pending(&ctx, page)?;
    Ok(Json(queue).into_response())
}

async fn moderate<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    Path(rating_id): Path<RatingId>,
    payload: Result<Json<ModerationRequest>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Json(request) = payload?;
    let rating = service.ratings().moderate(&ctx, rating_id, request)?;
    Ok(Json(rating).into_response())
}

async fn action_logs<S, M>(
    State(service): State<SharedService<S, M>>,
    AuthenticatedUniversity(ctx): AuthenticatedUniversity,
    filter: Result<Query<ActionLogFilter>, QueryRejection>,
) -> Result<Response, ApiError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let Query(filter) = filter?;
    let entries = service.audit().entries(&ctx, filter.action)?;
    Ok(Json(entries).into_response())
}
