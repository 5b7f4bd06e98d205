//! University housing: token identity, accommodation catalog, reservation lifecycle,
//! ratings, specialist notifications and the per-university action log.

pub mod audit;
pub mod catalog;
pub mod domain;
pub mod identity;
pub mod lifecycle;
pub mod notification;
pub mod ratings;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use audit::AuditTrail;
pub use catalog::{AccommodationQuery, AccommodationView, Catalog, CatalogError, SortOrder};
pub use domain::{
    Accommodation, AccommodationId, AccommodationKind, ActionKind, ActionLog, AvailabilitySlot,
    Campus, CampusId, Member, MemberId, Moderation, NewAccommodation, NewCampus, NewMember,
    NewSlot, NewSpecialist, NewUniversity, Owner, Rating, RatingId, RatingScore, Reservation,
    ReservationId, ReservationStatus, SlotId, Specialist, SpecialistId, University,
    UniversityContext, UniversityId, ValidationError,
};
pub use identity::{AuthError, RegistrationError, TokenRegistry, UniversityToken, AUTH_SCHEME};
pub use lifecycle::{ReservationError, ReservationLifecycle, ReservationRequest, INITIAL_STATUS};
pub use notification::{
    ConsoleMailer, DispatchOutcome, MailChannel, MailError, MailOutbox, NotificationDispatcher,
    OutboundMail, ReservationEvent,
};
pub use ratings::{
    ModerationRequest, PageRequest, RatingError, RatingPage, RatingService, RatingSubmission,
    PENDING_PAGE_SIZE,
};
pub use router::{housing_router, ApiError, AuthenticatedUniversity};
pub use service::UniHavenService;
pub use store::{HousingStore, InMemoryHousingStore, StoreError};
