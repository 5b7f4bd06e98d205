use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Accommodation, AccommodationId, ActionLog, ActionLogId, AvailabilitySlot, Campus, CampusId,
    Member, MemberId, Moderation, NewAccommodation, NewActionLog, NewCampus, NewMember,
    NewRating, NewReservation, NewSlot, NewSpecialist, NewUniversity, Rating, RatingId,
    Reservation, ReservationId, ReservationStatus, SlotId, Specialist, SpecialistId, University,
    UniversityId,
};
use super::identity::UniversityToken;

/// Persistence boundary. Every method is one unit of work: it either applies completely or
/// leaves the store untouched.
pub trait HousingStore: Send + Sync {
    fn insert_university(
        &self,
        draft: NewUniversity,
        token: UniversityToken,
    ) -> Result<University, StoreError>;
    fn university(&self, id: UniversityId) -> Result<Option<University>, StoreError>;
    fn universities(&self) -> Result<Vec<University>, StoreError>;
    /// Must compare against every stored token without returning early.
    fn find_university_by_token(
        &self,
        token: &UniversityToken,
    ) -> Result<Option<University>, StoreError>;

    fn insert_member(&self, university: UniversityId, draft: NewMember)
        -> Result<Member, StoreError>;
    fn member(&self, id: MemberId) -> Result<Option<Member>, StoreError>;

    fn insert_specialist(
        &self,
        university: UniversityId,
        draft: NewSpecialist,
    ) -> Result<Specialist, StoreError>;
    fn specialist(&self, id: SpecialistId) -> Result<Option<Specialist>, StoreError>;
    fn specialists_of(&self, university: UniversityId) -> Result<Vec<Specialist>, StoreError>;

    fn insert_campus(&self, university: UniversityId, draft: NewCampus)
        -> Result<Campus, StoreError>;
    fn campus(&self, id: CampusId) -> Result<Option<Campus>, StoreError>;

    fn insert_accommodation(
        &self,
        draft: NewAccommodation,
        universities: BTreeSet<UniversityId>,
    ) -> Result<Accommodation, StoreError>;
    fn accommodation(&self, id: AccommodationId) -> Result<Option<Accommodation>, StoreError>;
    fn accommodations(&self) -> Result<Vec<Accommodation>, StoreError>;
    fn set_listed(&self, id: AccommodationId, listed: bool) -> Result<Accommodation, StoreError>;
    /// Deletes the accommodation with its slots, reservations and ratings, unless a Pending or
    /// Confirmed reservation still holds one of its slots.
    fn remove_accommodation(&self, id: AccommodationId) -> Result<Accommodation, StoreError>;

    /// Rejects windows overlapping any slot of the accommodation, available or not.
    fn insert_slot(
        &self,
        accommodation: AccommodationId,
        draft: NewSlot,
    ) -> Result<AvailabilitySlot, StoreError>;
    fn slot(&self, id: SlotId) -> Result<Option<AvailabilitySlot>, StoreError>;
    fn slots_of(&self, accommodation: AccommodationId)
        -> Result<Vec<AvailabilitySlot>, StoreError>;

    /// Flips the slot from available to taken and inserts the reservation in one step.
    fn claim_slot(&self, draft: NewReservation) -> Result<Reservation, StoreError>;
    /// Moves a reservation to `next` if its status is one of `expected`. Cancelling an active
    /// reservation releases its slot in the same step.
    fn transition(
        &self,
        id: ReservationId,
        expected: &[ReservationStatus],
        next: ReservationStatus,
    ) -> Result<Reservation, StoreError>;
    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;
    fn reservations(&self) -> Result<Vec<Reservation>, StoreError>;

    /// One rating per reservation.
    fn insert_rating(&self, draft: NewRating) -> Result<Rating, StoreError>;
    fn rating(&self, id: RatingId) -> Result<Option<Rating>, StoreError>;
    fn ratings_for(&self, accommodation: AccommodationId) -> Result<Vec<Rating>, StoreError>;
    fn ratings(&self) -> Result<Vec<Rating>, StoreError>;
    fn update_moderation(&self, id: RatingId, moderation: Moderation)
        -> Result<Rating, StoreError>;

    fn append_action(&self, entry: NewActionLog) -> Result<ActionLog, StoreError>;
    fn action_logs(&self, university: UniversityId) -> Result<Vec<ActionLog>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("slot {0} is already taken")]
    SlotTaken(SlotId),
    #[error("reservation {reservation} is {current}")]
    StaleStatus {
        reservation: ReservationId,
        current: ReservationStatus,
    },
    #[error("window {start} - {end} overlaps an existing slot")]
    Overlap {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("accommodation {accommodation} has {active} active reservation(s)")]
    InUse {
        accommodation: AccommodationId,
        active: usize,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    fn not_found(entity: &'static str, id: u64) -> Self {
        Self::NotFound { entity, id }
    }
}

#[derive(Debug, Default)]
struct HousingState {
    universities: BTreeMap<UniversityId, University>,
    members: BTreeMap<MemberId, Member>,
    specialists: BTreeMap<SpecialistId, Specialist>,
    campuses: BTreeMap<CampusId, Campus>,
    accommodations: BTreeMap<AccommodationId, Accommodation>,
    slots: BTreeMap<SlotId, AvailabilitySlot>,
    reservations: BTreeMap<ReservationId, Reservation>,
    ratings: BTreeMap<RatingId, Rating>,
    action_logs: Vec<ActionLog>,
}

fn next_id<K: Copy, V>(records: &BTreeMap<K, V>, raw: impl Fn(K) -> u64) -> u64 {
    records.keys().next_back().map_or(1, |key| raw(*key) + 1)
}

/// Mutex-guarded store; each trait call holds the lock for its whole unit of work.
#[derive(Debug, Default)]
pub struct InMemoryHousingStore {
    state: Mutex<HousingState>,
}

impl InMemoryHousingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, HousingState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("housing state lock poisoned".to_string()))
    }
}

impl HousingStore for InMemoryHousingStore {
    fn insert_university(
        &self,
        draft: NewUniversity,
        token: UniversityToken,
    ) -> Result<University, StoreError> {
        let mut state = self.state()?;
        let duplicate = state.universities.values().any(|existing| {
            existing.name.eq_ignore_ascii_case(draft.name.trim())
                && existing.country.eq_ignore_ascii_case(draft.country.trim())
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "university '{}' in '{}'",
                draft.name.trim(),
                draft.country.trim()
            )));
        }
        if state
            .universities
            .values()
            .any(|existing| existing.token.matches(&token))
        {
            return Err(StoreError::Conflict("university token".to_string()));
        }

        let id = UniversityId(next_id(&state.universities, |id| id.0));
        let university = University {
            id,
            name: draft.name.trim().to_string(),
            country: draft.country.trim().to_string(),
            address: draft.address,
            token,
            created_at: Utc::now(),
        };
        state.universities.insert(id, university.clone());
        Ok(university)
    }

    fn university(&self, id: UniversityId) -> Result<Option<University>, StoreError> {
        Ok(self.state()?.universities.get(&id).cloned())
    }

    fn universities(&self) -> Result<Vec<University>, StoreError> {
        Ok(self.state()?.universities.values().cloned().collect())
    }

    fn find_university_by_token(
        &self,
        token: &UniversityToken,
    ) -> Result<Option<University>, StoreError> {
        let state = self.state()?;
        let mut found = None;
        for university in state.universities.values() {
            let matched = university.token.matches(token);
            if matched && found.is_none() {
                found = Some(university.clone());
            }
        }
        Ok(found)
    }

    fn insert_member(
        &self,
        university: UniversityId,
        draft: NewMember,
    ) -> Result<Member, StoreError> {
        let mut state = self.state()?;
        if !state.universities.contains_key(&university) {
            return Err(StoreError::not_found("university", university.0));
        }
        if state
            .members
            .values()
            .any(|member| member.phone == draft.phone)
        {
            return Err(StoreError::Conflict(format!("member phone {}", draft.phone)));
        }

        let id = MemberId(next_id(&state.members, |id| id.0));
        let member = Member {
            id,
            name: draft.name,
            email: draft.email,
            phone: draft.phone,
            university,
        };
        state.members.insert(id, member.clone());
        Ok(member)
    }

    fn member(&self, id: MemberId) -> Result<Option<Member>, StoreError> {
        Ok(self.state()?.members.get(&id).cloned())
    }

    fn insert_specialist(
        &self,
        university: UniversityId,
        draft: NewSpecialist,
    ) -> Result<Specialist, StoreError> {
        let mut state = self.state()?;
        if !state.universities.contains_key(&university) {
            return Err(StoreError::not_found("university", university.0));
        }
        if state
            .specialists
            .values()
            .any(|specialist| specialist.email.eq_ignore_ascii_case(&draft.email))
        {
            return Err(StoreError::Conflict(format!(
                "specialist email {}",
                draft.email
            )));
        }

        let id = SpecialistId(next_id(&state.specialists, |id| id.0));
        let specialist = Specialist {
            id,
            name: draft.name,
            email: draft.email,
            phone: draft.phone,
            university,
        };
        state.specialists.insert(id, specialist.clone());
        Ok(specialist)
    }

    fn specialist(&self, id: SpecialistId) -> Result<Option<Specialist>, StoreError> {
        Ok(self.state()?.specialists.get(&id).cloned())
    }

    fn specialists_of(&self, university: UniversityId) -> Result<Vec<Specialist>, StoreError> {
        Ok(self
            .state()?
            .specialists
            .values()
            .filter(|specialist| specialist.university == university)
            .cloned()
            .collect())
    }

    fn insert_campus(
        &self,
        university: UniversityId,
        draft: NewCampus,
    ) -> Result<Campus, StoreError> {
        let mut state = self.state()?;
        if !state.universities.contains_key(&university) {
            return Err(StoreError::not_found("university", university.0));
        }
        if state
            .campuses
            .values()
            .any(|campus| campus.university == university && campus.name == draft.name)
        {
            return Err(StoreError::Conflict(format!("campus '{}'", draft.name)));
        }

        let id = CampusId(next_id(&state.campuses, |id| id.0));
        let campus = Campus {
            id,
            name: draft.name,
            latitude: draft.latitude,
            longitude: draft.longitude,
            university,
        };
        state.campuses.insert(id, campus.clone());
        Ok(campus)
    }

    fn campus(&self, id: CampusId) -> Result<Option<Campus>, StoreError> {
        Ok(self.state()?.campuses.get(&id).cloned())
    }

    fn insert_accommodation(
        &self,
        draft: NewAccommodation,
        universities: BTreeSet<UniversityId>,
    ) -> Result<Accommodation, StoreError> {
        let mut state = self.state()?;
        if let Some(missing) = universities
            .iter()
            .find(|id| !state.universities.contains_key(id))
        {
            return Err(StoreError::not_found("university", missing.0));
        }

        let id = AccommodationId(next_id(&state.accommodations, |id| id.0));
        let accommodation = Accommodation {
            id,
            name: draft.name,
            building_name: draft.building_name,
            description: draft.description,
            kind: draft.kind,
            num_bedrooms: draft.num_bedrooms,
            num_beds: draft.num_beds,
            address: draft.address,
            latitude: draft.latitude,
            longitude: draft.longitude,
            monthly_rent: draft.monthly_rent,
            owner: draft.owner,
            universities,
            available: true,
            created_at: Utc::now(),
        };
        state.accommodations.insert(id, accommodation.clone());
        Ok(accommodation)
    }

    fn accommodation(&self, id: AccommodationId) -> Result<Option<Accommodation>, StoreError> {
        Ok(self.state()?.accommodations.get(&id).cloned())
    }

    fn accommodations(&self) -> Result<Vec<Accommodation>, StoreError> {
        Ok(self.state()?.accommodations.values().cloned().collect())
    }

    fn set_listed(&self, id: AccommodationId, listed: bool) -> Result<Accommodation, StoreError> {
        let mut state = self.state()?;
        let accommodation = state
            .accommodations
            .get_mut(&id)
            .ok_or(StoreError::not_found("accommodation", id.0))?;
        accommodation.available = listed;
        Ok(accommodation.clone())
    }

    fn remove_accommodation(&self, id: AccommodationId) -> Result<Accommodation, StoreError> {
        let mut state = self.state()?;
        if !state.accommodations.contains_key(&id) {
            return Err(StoreError::not_found("accommodation", id.0));
        }
        let active = state
            .reservations
            .values()
            .filter(|reservation| {
                reservation.accommodation == id && reservation.status.is_active()
            })
            .count();
        if active > 0 {
            return Err(StoreError::InUse {
                accommodation: id,
                active,
            });
        }

        state.slots.retain(|_, slot| slot.accommodation != id);
        state
            .reservations
            .retain(|_, reservation| reservation.accommodation != id);
        state.ratings.retain(|_, rating| rating.accommodation != id);
        state
            .accommodations
            .remove(&id)
            .ok_or(StoreError::not_found("accommodation", id.0))
    }

    fn insert_slot(
        &self,
        accommodation: AccommodationId,
        draft: NewSlot,
    ) -> Result<AvailabilitySlot, StoreError> {
        let mut state = self.state()?;
        if !state.accommodations.contains_key(&accommodation) {
            return Err(StoreError::not_found("accommodation", accommodation.0));
        }
        let overlapping = state.slots.values().any(|slot| {
            slot.accommodation == accommodation && slot.overlaps(draft.start, draft.end)
        });
        if overlapping {
            return Err(StoreError::Overlap {
                start: draft.start,
                end: draft.end,
            });
        }

        let id = SlotId(next_id(&state.slots, |id| id.0));
        let slot = AvailabilitySlot {
            id,
            accommodation,
            start: draft.start,
            end: draft.end,
            available: true,
        };
        state.slots.insert(id, slot.clone());
        Ok(slot)
    }

    fn slot(&self, id: SlotId) -> Result<Option<AvailabilitySlot>, StoreError> {
        Ok(self.state()?.slots.get(&id).cloned())
    }

    fn slots_of(
        &self,
        accommodation: AccommodationId,
    ) -> Result<Vec<AvailabilitySlot>, StoreError> {
        Ok(self
            .state()?
            .slots
            .values()
            .filter(|slot| slot.accommodation == accommodation)
            .cloned()
            .collect())
    }

    fn claim_slot(&self, draft: NewReservation) -> Result<Reservation, StoreError> {
        let mut state = self.state()?;
        if !state.members.contains_key(&draft.member) {
            return Err(StoreError::not_found("member", draft.member.0));
        }
        let slot = state
            .slots
            .get(&draft.slot)
            .filter(|slot| slot.accommodation == draft.accommodation)
            .ok_or(StoreError::not_found("slot", draft.slot.0))?;
        let held = state
            .reservations
            .values()
            .any(|existing| existing.slot == draft.slot && existing.status.is_active());
        if !slot.available || held {
            return Err(StoreError::SlotTaken(draft.slot));
        }

        let id = ReservationId(next_id(&state.reservations, |id| id.0));
        let reservation = Reservation {
            id,
            accommodation: draft.accommodation,
            slot: draft.slot,
            member: draft.member,
            contact_name: draft.contact_name,
            contact_phone: draft.contact_phone,
            status: draft.status,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };
        if let Some(slot) = state.slots.get_mut(&draft.slot) {
            slot.available = false;
        }
        state.reservations.insert(id, reservation.clone());
        Ok(reservation)
    }

    fn transition(
        &self,
        id: ReservationId,
        expected: &[ReservationStatus],
        next: ReservationStatus,
    ) -> Result<Reservation, StoreError> {
        let mut state = self.state()?;
        let current = state
            .reservations
            .get(&id)
            .ok_or(StoreError::not_found("reservation", id.0))?
            .clone();
        if !expected.contains(&current.status) {
            return Err(StoreError::StaleStatus {
                reservation: id,
                current: current.status,
            });
        }

        let releases_slot = current.status.is_active() && next == ReservationStatus::Cancelled;
        if releases_slot && !state.slots.contains_key(&current.slot) {
            return Err(StoreError::not_found("slot", current.slot.0));
        }

        let updated = Reservation {
            status: next,
            updated_at: Utc::now(),
            ..current
        };
        if releases_slot {
            if let Some(slot) = state.slots.get_mut(&updated.slot) {
                slot.available = true;
            }
        }
        state.reservations.insert(id, updated.clone());
        Ok(updated)
    }

    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.state()?.reservations.get(&id).cloned())
    }

    fn reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.state()?.reservations.values().cloned().collect())
    }

    fn insert_rating(&self, draft: NewRating) -> Result<Rating, StoreError> {
        let mut state = self.state()?;
        if state
            .ratings
            .values()
            .any(|rating| rating.reservation == draft.reservation)
        {
            return Err(StoreError::Conflict(format!(
                "rating for reservation {}",
                draft.reservation
            )));
        }

        let id = RatingId(next_id(&state.ratings, |id| id.0));
        let rating = Rating {
            id,
            accommodation: draft.accommodation,
            member: draft.member,
            reservation: draft.reservation,
            score: draft.score,
            comment: draft.comment,
            created_at: draft.created_at,
            moderation: Moderation::default(),
        };
        state.ratings.insert(id, rating.clone());
        Ok(rating)
    }

    fn rating(&self, id: RatingId) -> Result<Option<Rating>, StoreError> {
        Ok(self.state()?.ratings.get(&id).cloned())
    }

    fn ratings_for(&self, accommodation: AccommodationId) -> Result<Vec<Rating>, StoreError> {
        Ok(self
            .state()?
            .ratings
            .values()
            .filter(|rating| rating.accommodation == accommodation)
            .cloned()
            .collect())
    }

    fn ratings(&self) -> Result<Vec<Rating>, StoreError> {
        Ok(self.state()?.ratings.values().cloned().collect())
    }

    fn update_moderation(
        &self,
        id: RatingId,
        moderation: Moderation,
    ) -> Result<Rating, StoreError> {
        let mut state = self.state()?;
        let rating = state
            .ratings
            .get_mut(&id)
            .ok_or(StoreError::not_found("rating", id.0))?;
        rating.moderation = moderation;
        Ok(rating.clone())
    }

    fn append_action(&self, entry: NewActionLog) -> Result<ActionLog, StoreError> {
        let mut state = self.state()?;
        let id = ActionLogId(state.action_logs.len() as u64 + 1);
        let log = ActionLog {
            id,
            action: entry.action,
            university: entry.university,
            accommodation: entry.accommodation,
            reservation: entry.reservation,
            rating: entry.rating,
            details: entry.details,
            created_at: Utc::now(),
        };
        state.action_logs.push(log.clone());
        Ok(log)
    }

    fn action_logs(&self, university: UniversityId) -> Result<Vec<ActionLog>, StoreError> {
        Ok(self
            .state()?
            .action_logs
            .iter()
            .filter(|log| log.university == university)
            .cloned()
            .collect())
    }
}
