use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::UniversityToken;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a registered university.
    UniversityId
);
record_id!(
    /// Identifier of a university member (student).
    MemberId
);
record_id!(SpecialistId);
record_id!(CampusId);
record_id!(AccommodationId);
record_id!(
    /// Identifier of an availability slot.
    SlotId
);
record_id!(ReservationId);
record_id!(RatingId);
record_id!(ActionLogId);

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Authenticated university resolved from the request token.
///
/// Passed explicitly into every catalog, lifecycle and rating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniversityContext {
    pub university_id: UniversityId,
    pub name: String,
}

impl From<&University> for UniversityContext {
    fn from(university: &University) -> Self {
        Self {
            university_id: university.id,
            name: university.name.clone(),
        }
    }
}

/// Universities own the token used for API access. The token is never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct University {
    pub id: UniversityId,
    pub name: String,
    pub country: String,
    pub address: String,
    #[serde(skip)]
    pub token: UniversityToken,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUniversity {
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub university: UniversityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Staff member of a university; the specialists of a university form its notification group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Specialist {
    pub id: SpecialistId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub university: UniversityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewSpecialist {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Campus {
    pub id: CampusId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub university: UniversityId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCampus {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccommodationKind {
    Apartment,
    House,
    Shared,
    Studio,
}

impl AccommodationKind {
    pub const fn label(self) -> &'static str {
        match self {
            AccommodationKind::Apartment => "Apartment",
            AccommodationKind::House => "House",
            AccommodationKind::Shared => "Shared Room",
            AccommodationKind::Studio => "Studio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accommodation {
    pub id: AccommodationId,
    pub name: String,
    pub building_name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: AccommodationKind,
    pub num_bedrooms: u32,
    pub num_beds: u32,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub monthly_rent: u32,
    pub owner: Owner,
    pub universities: BTreeSet<UniversityId>,
    /// Cleared when a university takes the listing off the market; hidden listings never
    /// appear in search.
    #[serde(rename = "is_available")]
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

impl Accommodation {
    pub fn is_offered_to(&self, university: UniversityId) -> bool {
        self.universities.contains(&university)
    }

    pub fn distance_to(&self, campus: &Campus) -> f64 {
        distance_km(
            self.latitude,
            self.longitude,
            campus.latitude,
            campus.longitude,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewAccommodation {
    pub name: String,
    pub building_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: AccommodationKind,
    pub num_bedrooms: u32,
    pub num_beds: u32,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub monthly_rent: u32,
    pub owner: Owner,
    #[serde(default)]
    pub university_ids: Vec<UniversityId>,
}

/// Equirectangular approximation, good enough at city scale.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());
    let x = (lon2 - lon1) * ((lat1 + lat2) / 2.0).cos();
    let y = lat2 - lat1;
    (x * x + y * y).sqrt() * EARTH_RADIUS_KM
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilitySlot {
    pub id: SlotId,
    pub accommodation: AccommodationId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
}

impl AvailabilitySlot {
    /// Half-open overlap: touching windows do not overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }

    pub fn covers(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start <= from && to <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NewSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl NewSlot {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end <= self.start {
            return Err(ValidationError::InvalidInterval {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Reservation states. Cancelled and ContractSigned are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    ContractSigned,
}

impl ReservationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "Pending",
            ReservationStatus::Confirmed => "Confirmed",
            ReservationStatus::Cancelled => "Cancelled",
            ReservationStatus::ContractSigned => "Contract Signed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Cancelled | ReservationStatus::ContractSigned
        )
    }

    /// Whether the reservation still holds its slot.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Confirmed
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub accommodation: AccommodationId,
    pub slot: SlotId,
    pub member: MemberId,
    pub contact_name: String,
    pub contact_phone: String,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reservation as handed to the store before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub accommodation: AccommodationId,
    pub slot: SlotId,
    pub member: MemberId,
    pub contact_name: String,
    pub contact_phone: String,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

/// Rating value in `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct RatingScore(u8);

impl RatingScore {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 5;

    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RatingScore {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::OutOfRange { value })
        }
    }
}

impl From<RatingScore> for u8 {
    fn from(score: RatingScore) -> Self {
        score.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Moderation {
    pub approved: bool,
    pub moderated_by: Option<SpecialistId>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub note: String,
}

impl Default for Moderation {
    fn default() -> Self {
        Self {
            approved: true,
            moderated_by: None,
            moderated_at: None,
            note: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rating {
    pub id: RatingId,
    pub accommodation: AccommodationId,
    pub member: MemberId,
    pub reservation: ReservationId,
    pub score: RatingScore,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub moderation: Moderation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRating {
    pub accommodation: AccommodationId,
    pub member: MemberId,
    pub reservation: ReservationId,
    pub score: RatingScore,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Mean of the approved scores, rounded to one decimal.
pub fn average_score(ratings: &[Rating]) -> Option<f64> {
    let approved: Vec<u8> = ratings
        .iter()
        .filter(|rating| rating.moderation.approved)
        .map(|rating| rating.score.value())
        .collect();
    if approved.is_empty() {
        return None;
    }
    let total: u32 = approved.iter().map(|score| u32::from(*score)).sum();
    let mean = f64::from(total) / approved.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    CreateAccommodation,
    AddAvailability,
    MarkUnavailable,
    DeleteAccommodation,
    CreateReservation,
    CancelReservation,
    SignContract,
    CreateRating,
    ModerateRating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionLog {
    pub id: ActionLogId,
    pub action: ActionKind,
    pub university: UniversityId,
    pub accommodation: Option<AccommodationId>,
    pub reservation: Option<ReservationId>,
    pub rating: Option<RatingId>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActionLog {
    pub action: ActionKind,
    pub university: UniversityId,
    pub accommodation: Option<AccommodationId>,
    pub reservation: Option<ReservationId>,
    pub rating: Option<RatingId>,
    pub details: String,
}

impl NewActionLog {
    pub fn new(action: ActionKind, university: UniversityId, details: impl Into<String>) -> Self {
        Self {
            action,
            university,
            accommodation: None,
            reservation: None,
            rating: None,
            details: details.into(),
        }
    }

    pub fn accommodation(mut self, id: AccommodationId) -> Self {
        self.accommodation = Some(id);
        self
    }

    pub fn reservation(mut self, id: ReservationId) -> Self {
        self.reservation = Some(id);
        self
    }

    pub fn rating(mut self, id: RatingId) -> Self {
        self.rating = Some(id);
        self
    }
}

/// Input validation failures shared by the catalog, lifecycle and rating flows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("rating score {value} is outside the allowed range 0-5")]
    OutOfRange { value: i64 },
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },
    #[error("slot end {end} must be after its start {start}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("available_from and available_to must be given together ({missing} is missing)")]
    IncompleteWindow { missing: &'static str },
    #[error("slot {start} - {end} overlaps an existing availability window")]
    OverlappingSlot {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::BlankField { field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn slot(start: u32, end: u32) -> AvailabilitySlot {
        AvailabilitySlot {
            id: SlotId(1),
            accommodation: AccommodationId(1),
            start: at(start),
            end: at(end),
            available: true,
        }
    }

    #[test]
    fn rating_score_accepts_inclusive_bounds() {
        assert_eq!(RatingScore::try_from(0).map(RatingScore::value), Ok(0));
        assert_eq!(RatingScore::try_from(5).map(RatingScore::value), Ok(5));
        assert_eq!(
            RatingScore::try_from(-1),
            Err(ValidationError::OutOfRange { value: -1 })
        );
        assert_eq!(
            RatingScore::try_from(6),
            Err(ValidationError::OutOfRange { value: 6 })
        );
    }

    #[test]
    fn rating_score_deserializes_through_validation() {
        let score: RatingScore = serde_json::from_str("4").expect("valid score");
        assert_eq!(score.value(), 4);
        assert!(serde_json::from_str::<RatingScore>("9").is_err());
    }

    #[test]
    fn touching_slots_do_not_overlap() {
        let morning = slot(9, 10);
        assert!(!morning.overlaps(at(10), at(11)));
        assert!(!morning.overlaps(at(8), at(9)));
        assert!(morning.overlaps(at(9), at(10)));
        assert!(morning.overlaps(at(8), at(11)));
    }

    #[test]
    fn new_slot_rejects_empty_or_inverted_windows() {
        let inverted = NewSlot {
            start: at(10),
            end: at(9),
        };
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::InvalidInterval { .. })
        ));
        let empty = NewSlot {
            start: at(9),
            end: at(9),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn distance_matches_equirectangular_estimate() {
        // Jolly Villa to HKU main campus.
        let km = distance_km(22.27731, 114.19238, 22.28405, 114.13784);
        assert!((km - 5.66).abs() < 0.05, "unexpected distance {km}");
        assert_eq!(distance_km(22.3, 114.1, 22.3, 114.1), 0.0);
    }

    #[test]
    fn only_pending_and_confirmed_hold_the_slot() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Confirmed.is_active());
        assert!(!ReservationStatus::Cancelled.is_active());
        assert!(ReservationStatus::ContractSigned.is_terminal());
        assert_eq!(
            serde_json::to_string(&ReservationStatus::ContractSigned).expect("serializes"),
            "\"CONTRACT_SIGNED\""
        );
    }
}
