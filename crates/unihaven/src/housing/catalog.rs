use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::audit::AuditTrail;
use super::domain::{
    average_score, require_text, Accommodation, AccommodationId, AccommodationKind, ActionKind,
    AvailabilitySlot, Campus, CampusId, Member, NewAccommodation, NewActionLog, NewCampus,
    NewMember, NewSlot, NewSpecialist, Rating, Specialist, UniversityContext, ValidationError,
};
use super::store::{HousingStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("accommodation is not offered to this university")]
    Forbidden,
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("accommodation {accommodation} still has {active} active reservation(s)")]
    InUse {
        accommodation: AccommodationId,
        active: usize,
    },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CatalogError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Conflict(what) => Self::Conflict(what),
            StoreError::InUse {
                accommodation,
                active,
            } => Self::InUse {
                accommodation,
                active,
            },
            StoreError::Overlap { start, end } => {
                Self::Validation(ValidationError::OverlappingSlot { start, end })
            }
            other => Self::Store(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Distance,
    PriceAsc,
    PriceDesc,
}

/// Search filters; every field is optional.
///
/// `available_from` and `available_to` form one window: either both are given, in which case an
/// open slot must cover the whole window, or neither is and any open slot qualifies. Giving only
/// one of them is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccommodationQuery {
    #[serde(default, rename = "type")]
    pub kind: Option<AccommodationKind>,
    #[serde(default)]
    pub min_beds: Option<u32>,
    #[serde(default)]
    pub min_bedrooms: Option<u32>,
    #[serde(default)]
    pub min_rent: Option<u32>,
    #[serde(default)]
    pub max_rent: Option<u32>,
    #[serde(default)]
    pub available_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub available_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub campus_id: Option<CampusId>,
    #[serde(default)]
    pub sort_by: Option<SortOrder>,
}

impl AccommodationQuery {
    fn validate(&self) -> Result<(), ValidationError> {
        match (self.available_from, self.available_to) {
            (Some(_), None) => Err(ValidationError::IncompleteWindow {
                missing: "available_to",
            }),
            (None, Some(_)) => Err(ValidationError::IncompleteWindow {
                missing: "available_from",
            }),
            _ => Ok(()),
        }
    }

    fn admits(&self, accommodation: &Accommodation) -> bool {
        accommodation.available
            && self
                .kind
                .map_or(true, |kind| accommodation.kind == kind)
            && self.min_beds.map_or(true, |beds| accommodation.num_beds >= beds)
            && self
                .min_bedrooms
                .map_or(true, |rooms| accommodation.num_bedrooms >= rooms)
            && self
                .min_rent
                .map_or(true, |rent| accommodation.monthly_rent >= rent)
            && self
                .max_rent
                .map_or(true, |rent| accommodation.monthly_rent <= rent)
    }

    fn has_open_slot(&self, slots: &[AvailabilitySlot]) -> bool {
        let mut open = slots.iter().filter(|slot| slot.available);
        match (self.available_from, self.available_to) {
            (Some(from), Some(to)) => open.any(|slot| slot.covers(from, to)),
            _ => open.next().is_some(),
        }
    }
}

/// Accommodation with its slots and derived rating figures.
#[derive(Debug, Clone, Serialize)]
pub struct AccommodationView {
    #[serde(flatten)]
    pub accommodation: Accommodation,
    pub type_display: &'static str,
    pub slots: Vec<AvailabilitySlot>,
    pub average_rating: Option<f64>,
    pub rating_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

/// Registration of members, specialists, campuses, accommodations and slots, plus search.
pub struct Catalog<S> {
    store: Arc<S>,
    audit: AuditTrail<S>,
}

impl<S> Catalog<S>
where
    S: HousingStore + 'static,
{
    pub fn new(store: Arc<S>, audit: AuditTrail<S>) -> Self {
        Self { store, audit }
    }

    pub fn register_member(
        &self,
        ctx: &UniversityContext,
        draft: NewMember,
    ) -> Result<Member, CatalogError> {
        require_text("name", &draft.name)?;
        require_text("email", &draft.email)?;
        require_text("phone", &draft.phone)?;
        let member = self.store.insert_member(ctx.university_id, draft)?;
        info!(member = %member.id, university = %ctx.university_id, "member registered");
        Ok(member)
    }

    pub fn register_specialist(
        &self,
        ctx: &UniversityContext,
        draft: NewSpecialist,
    ) -> Result<Specialist, CatalogError> {
        require_text("name", &draft.name)?;
        require_text("email", &draft.email)?;
        let specialist = self.store.insert_specialist(ctx.university_id, draft)?;
        info!(
            specialist = %specialist.id,
            university = %ctx.university_id,
            "specialist registered"
        );
        Ok(specialist)
    }

    pub fn register_campus(
        &self,
        ctx: &UniversityContext,
        draft: NewCampus,
    ) -> Result<Campus, CatalogError> {
        require_text("name", &draft.name)?;
        Ok(self.store.insert_campus(ctx.university_id, draft)?)
    }

    /// The registering university is always among the accommodation's universities.
    pub fn register_accommodation(
        &self,
        ctx: &UniversityContext,
        mut draft: NewAccommodation,
    ) -> Result<Accommodation, CatalogError> {
        require_text("name", &draft.name)?;
        require_text("building_name", &draft.building_name)?;
        require_text("address", &draft.address)?;
        require_text("owner.name", &draft.owner.name)?;
        require_text("owner.email", &draft.owner.email)?;

        let mut universities: BTreeSet<_> = draft.university_ids.drain(..).collect();
        universities.insert(ctx.university_id);

        let accommodation = self.store.insert_accommodation(draft, universities)?;
        info!(
            accommodation = %accommodation.id,
            name = %accommodation.name,
            "accommodation registered"
        );
        self.audit.record(
            NewActionLog::new(
                ActionKind::CreateAccommodation,
                ctx.university_id,
                format!(
                    "created accommodation '{}' for universities {:?}",
                    accommodation.name,
                    accommodation
                        .universities
                        .iter()
                        .map(|id| id.0)
                        .collect::<Vec<_>>()
                ),
            )
            .accommodation(accommodation.id),
        );
        Ok(accommodation)
    }

    pub fn add_slot(
        &self,
        ctx: &UniversityContext,
        accommodation_id: AccommodationId,
        draft: NewSlot,
    ) -> Result<AvailabilitySlot, CatalogError> {
        draft.validate()?;
        self.offered(ctx, accommodation_id)?;

        let slot = self.store.insert_slot(accommodation_id, draft)?;
        info!(slot = %slot.id, accommodation = %accommodation_id, "availability slot added");
        self.audit.record(
            NewActionLog::new(
                ActionKind::AddAvailability,
                ctx.university_id,
                format!("slot {} - {}", slot.start.to_rfc3339(), slot.end.to_rfc3339()),
            )
            .accommodation(accommodation_id),
        );
        Ok(slot)
    }

    /// Takes the listing off the market. Its slots and reservations are left as they are.
    pub fn mark_unavailable(
        &self,
        ctx: &UniversityContext,
        id: AccommodationId,
    ) -> Result<Accommodation, CatalogError> {
        self.offered(ctx, id)?;
        let accommodation = self.store.set_listed(id, false)?;
        info!(accommodation = %id, university = %ctx.university_id, "accommodation unlisted");
        self.audit.record(
            NewActionLog::new(
                ActionKind::MarkUnavailable,
                ctx.university_id,
                format!("marked accommodation '{}' as unavailable", accommodation.name),
            )
            .accommodation(id),
        );
        Ok(accommodation)
    }

    /// Deletes an accommodation that no Pending or Confirmed reservation holds.
    pub fn remove_accommodation(
        &self,
        ctx: &UniversityContext,
        id: AccommodationId,
    ) -> Result<Accommodation, CatalogError> {
        self.offered(ctx, id)?;
        let removed = self.store.remove_accommodation(id)?;
        info!(accommodation = %id, university = %ctx.university_id, "accommodation deleted");
        self.audit.record(
            NewActionLog::new(
                ActionKind::DeleteAccommodation,
                ctx.university_id,
                format!("deleted accommodation '{}'", removed.name),
            )
            .accommodation(id),
        );
        Ok(removed)
    }

    pub fn accommodation(
        &self,
        ctx: &UniversityContext,
        id: AccommodationId,
    ) -> Result<AccommodationView, CatalogError> {
        let accommodation = self.offered(ctx, id)?;
        self.view(accommodation, None)
    }

    /// Approved ratings of an accommodation offered to the university.
    pub fn ratings(
        &self,
        ctx: &UniversityContext,
        id: AccommodationId,
    ) -> Result<Vec<Rating>, CatalogError> {
        self.offered(ctx, id)?;
        Ok(self
            .store
            .ratings_for(id)?
            .into_iter()
            .filter(|rating| rating.moderation.approved)
            .collect())
    }

    /// Listed accommodations offered to the university that still have an open slot.
    pub fn search(
        &self,
        ctx: &UniversityContext,
        query: &AccommodationQuery,
    ) -> Result<Vec<AccommodationView>, CatalogError> {
        query.validate()?;
        let campus = match query.campus_id {
            Some(id) => Some(
                self.store
                    .campus(id)?
                    .filter(|campus| campus.university == ctx.university_id)
                    .ok_or(CatalogError::NotFound {
                        entity: "campus",
                        id: id.0,
                    })?,
            ),
            None => None,
        };

        let mut results = Vec::new();
        for accommodation in self.store.accommodations()? {
            if !accommodation.is_offered_to(ctx.university_id) || !query.admits(&accommodation) {
                continue;
            }
            let view = self.view(accommodation, campus.as_ref())?;
            if query.has_open_slot(&view.slots) {
                results.push(view);
            }
        }

        match query.sort_by.unwrap_or_default() {
            SortOrder::PriceAsc => {
                results.sort_by_key(|view| view.accommodation.monthly_rent);
            }
            SortOrder::PriceDesc => {
                results.sort_by_key(|view| std::cmp::Reverse(view.accommodation.monthly_rent));
            }
            SortOrder::Distance => {
                if campus.is_some() {
                    results.sort_by(|a, b| {
                        a.distance_km
                            .partial_cmp(&b.distance_km)
                            .unwrap_or(Ordering::Equal)
                    });
                }
            }
        }
        Ok(results)
    }

    fn offered(
        &self,
        ctx: &UniversityContext,
        id: AccommodationId,
    ) -> Result<Accommodation, CatalogError> {
        let accommodation = self
            .store
            .accommodation(id)?
            .ok_or(CatalogError::NotFound {
                entity: "accommodation",
                id: id.0,
            })?;
        if accommodation.is_offered_to(ctx.university_id) {
            Ok(accommodation)
        } else {
            Err(CatalogError::Forbidden)
        }
    }

    fn view(
        &self,
        accommodation: Accommodation,
        campus: Option<&Campus>,
    ) -> Result<AccommodationView, CatalogError> {
        let slots = self.store.slots_of(accommodation.id)?;
        let ratings = self.store.ratings_for(accommodation.id)?;
        let rating_count = ratings
            .iter()
            .filter(|rating| rating.moderation.approved)
            .count();
        let distance_km =
            campus.map(|campus| (accommodation.distance_to(campus) * 100.0).round() / 100.0);
        Ok(AccommodationView {
            type_display: accommodation.kind.label(),
            average_rating: average_score(&ratings),
            rating_count,
            distance_km,
            slots,
            accommodation,
        })
    }
}
