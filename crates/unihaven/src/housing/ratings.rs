use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::audit::AuditTrail;
use super::domain::{
    ActionKind, Moderation, NewActionLog, NewRating, Rating, RatingId, RatingScore,
    ReservationId, ReservationStatus, SpecialistId, UniversityContext, ValidationError,
};
use super::store::{HousingStore, StoreError};

/// Raw submission; the score is validated before anything is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RatingSubmission {
    pub reservation_id: ReservationId,
    pub score: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModerationRequest {
    pub specialist_id: SpecialistId,
    #[serde(default = "approve_by_default")]
    pub approved: bool,
    #[serde(default)]
    pub note: String,
}

fn approve_by_default() -> bool {
    true
}

/// Ratings per page of the moderation queue.
pub const PENDING_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    /// One-based; defaults to the first page.
    #[serde(default)]
    pub page: Option<usize>,
}

/// One page of the moderation queue, oldest rating first.
#[derive(Debug, Clone, Serialize)]
pub struct RatingPage {
    pub count: usize,
    pub page: usize,
    pub has_next: bool,
    pub results: Vec<Rating>,
}

#[derive(Debug, thiserror::Error)]
pub enum RatingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("university may not rate or moderate this record")]
    Forbidden,
    #[error("only reservations with a signed contract can be rated (reservation is {0})")]
    NotRateable(ReservationStatus),
    #[error("reservation {0} has already been rated")]
    AlreadyRated(ReservationId),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RatingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Store(other),
        }
    }
}

pub struct RatingService<S> {
    store: Arc<S>,
    audit: AuditTrail<S>,
}

impl<S> RatingService<S>
where
    S: HousingStore + 'static,
{
    pub fn new(store: Arc<S>, audit: AuditTrail<S>) -> Self {
        Self { store, audit }
    }

    pub fn rate(
        &self,
        ctx: &UniversityContext,
        submission: RatingSubmission,
    ) -> Result<Rating, RatingError> {
        let score = RatingScore::try_from(submission.score)?;
        let reservation_id = submission.reservation_id;

        let reservation = self
            .store
            .reservation(reservation_id)?
            .ok_or(RatingError::NotFound {
                entity: "reservation",
                id: reservation_id.0,
            })?;
        let member = self
            .store
            .member(reservation.member)?
            .ok_or(RatingError::NotFound {
                entity: "member",
                id: reservation.member.0,
            })?;
        if member.university != ctx.university_id {
            return Err(RatingError::Forbidden);
        }
        if reservation.status != ReservationStatus::ContractSigned {
            return Err(RatingError::NotRateable(reservation.status));
        }

        let rating = self
            .store
            .insert_rating(NewRating {
                accommodation: reservation.accommodation,
                member: member.id,
                reservation: reservation.id,
                score,
                comment: submission.comment.trim().to_string(),
                created_at: Utc::now(),
            })
            .map_err(|err| match err {
                StoreError::Conflict(_) => RatingError::AlreadyRated(reservation_id),
                other => RatingError::from(other),
            })?;

        info!(rating = %rating.id, score = score.value(), "rating recorded");
        self.audit.record(
            NewActionLog::new(
                ActionKind::CreateRating,
                ctx.university_id,
                format!("{} rated {} star(s)", member.name, score.value()),
            )
            .accommodation(rating.accommodation)
            .reservation(reservation.id)
            .rating(rating.id),
        );
        Ok(rating)
    }

    /// Ratings no specialist has moderated yet, for accommodations offered to the university.
    pub fn pending(
        &self,
        ctx: &UniversityContext,
        request: PageRequest,
    ) -> Result<RatingPage, RatingError> {
        let mut queue = Vec::new();
        for rating in self.store.ratings()? {
            if rating.moderation.moderated_by.is_some() {
                continue;
            }
            let offered = self
                .store
                .accommodation(rating.accommodation)?
                .is_some_and(|accommodation| accommodation.is_offered_to(ctx.university_id));
            if offered {
                queue.push(rating);
            }
        }
        queue.sort_by_key(|rating| (rating.created_at, rating.id));

        let page = request.page.unwrap_or(1).max(1);
        let count = queue.len();
        let skip = (page - 1).saturating_mul(PENDING_PAGE_SIZE);
        let results: Vec<_> = queue.into_iter().skip(skip).take(PENDING_PAGE_SIZE).collect();
        Ok(RatingPage {
            count,
            page,
            has_next: skip.saturating_add(results.len()) < count,
            results,
        })
    }

    /// Approves or hides a rating. The specialist must belong to the acting university and the
    /// accommodation must be offered to it.
    pub fn moderate(
        &self,
        ctx: &UniversityContext,
        id: RatingId,
        request: ModerationRequest,
    ) -> Result<Rating, RatingError> {
        let rating = self.store.rating(id)?.ok_or(RatingError::NotFound {
            entity: "rating",
            id: id.0,
        })?;
        let specialist = self
            .store
            .specialist(request.specialist_id)?
            .ok_or(RatingError::NotFound {
                entity: "specialist",
                id: request.specialist_id.0,
            })?;
        let offered = self
            .store
            .accommodation(rating.accommodation)?
            .is_some_and(|accommodation| accommodation.is_offered_to(ctx.university_id));
        if specialist.university != ctx.university_id || !offered {
            return Err(RatingError::Forbidden);
        }

        let moderated = self.store.update_moderation(
            id,
            Moderation {
                approved: request.approved,
                moderated_by: Some(specialist.id),
                moderated_at: Some(Utc::now()),
                note: request.note.trim().to_string(),
            },
        )?;

        let verdict = if request.approved { "approved" } else { "rejected" };
        info!(rating = %id, specialist = %specialist.id, verdict, "rating moderated");
        self.audit.record(
            NewActionLog::new(
                ActionKind::ModerateRating,
                ctx.university_id,
                format!("rating {verdict}: {}", moderated.moderation.note),
            )
            .accommodation(moderated.accommodation)
            .rating(id),
        );
        Ok(moderated)
    }
}
