use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::audit::AuditTrail;
use super::domain::{
    require_text, AccommodationId, ActionKind, MemberId, NewActionLog, NewReservation,
    Reservation, ReservationId, ReservationStatus, SlotId, UniversityContext, ValidationError,
};
use super::notification::{MailChannel, NotificationDispatcher, ReservationEvent};
use super::store::{HousingStore, StoreError};

/// Status given to freshly created reservations.
pub const INITIAL_STATUS: ReservationStatus = ReservationStatus::Confirmed;

const CANCELLABLE: &[ReservationStatus] =
    &[ReservationStatus::Pending, ReservationStatus::Confirmed];
const SIGNABLE: &[ReservationStatus] = &[ReservationStatus::Confirmed];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReservationRequest {
    pub member_id: MemberId,
    pub accommodation_id: AccommodationId,
    pub slot_id: SlotId,
    pub contact_name: String,
    pub contact_phone: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("slot {0} is not available")]
    SlotUnavailable(SlotId),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("cannot {action} a reservation that is {from}")]
    InvalidTransition {
        from: ReservationStatus,
        action: &'static str,
    },
    #[error("university may not act on this reservation")]
    Forbidden,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReservationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::SlotTaken(slot) => Self::SlotUnavailable(slot),
            other => Self::Store(other),
        }
    }
}

/// Create, cancel and contract-sign transitions with their audit and notification side effects.
pub struct ReservationLifecycle<S, M> {
    store: Arc<S>,
    notifier: NotificationDispatcher<S, M>,
    audit: AuditTrail<S>,
}

impl<S, M> ReservationLifecycle<S, M>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: NotificationDispatcher<S, M>,
        audit: AuditTrail<S>,
    ) -> Self {
        Self {
            store,
            notifier,
            audit,
        }
    }

    pub fn create(
        &self,
        ctx: &UniversityContext,
        request: ReservationRequest,
    ) -> Result<Reservation, ReservationError> {
        require_text("contact_name", &request.contact_name)?;
        require_text("contact_phone", &request.contact_phone)?;

        let member = self
            .store
            .member(request.member_id)?
            .ok_or(ReservationError::NotFound {
                entity: "member",
                id: request.member_id.0,
            })?;
        let accommodation = self
            .store
            .accommodation(request.accommodation_id)?
            .ok_or(ReservationError::NotFound {
                entity: "accommodation",
                id: request.accommodation_id.0,
            })?;
        let slot = self
            .store
            .slot(request.slot_id)?
            .filter(|slot| slot.accommodation == accommodation.id)
            .ok_or(ReservationError::NotFound {
                entity: "slot",
                id: request.slot_id.0,
            })?;

        if member.university != ctx.university_id || !accommodation.is_offered_to(member.university)
        {
            return Err(ReservationError::Forbidden);
        }
        if !slot.available {
            return Err(ReservationError::SlotUnavailable(slot.id));
        }

        let reservation = self.store.claim_slot(NewReservation {
            accommodation: accommodation.id,
            slot: slot.id,
            member: member.id,
            contact_name: request.contact_name.trim().to_string(),
            contact_phone: request.contact_phone.trim().to_string(),
            status: INITIAL_STATUS,
            created_at: Utc::now(),
        })?;

        info!(
            reservation = %reservation.id,
            slot = %slot.id,
            university = %ctx.university_id,
            "reservation created"
        );
        self.audit.record(
            NewActionLog::new(
                ActionKind::CreateReservation,
                ctx.university_id,
                format!("{} reserved '{}'", member.name, accommodation.name),
            )
            .accommodation(accommodation.id)
            .reservation(reservation.id),
        );
        self.notifier.notify(ReservationEvent::Created, &reservation);

        Ok(reservation)
    }

    pub fn cancel(
        &self,
        ctx: &UniversityContext,
        id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        let reservation = self.owned(ctx, id)?;
        if !CANCELLABLE.contains(&reservation.status) {
            return Err(ReservationError::InvalidTransition {
                from: reservation.status,
                action: "cancel",
            });
        }

        let cancelled = self
            .store
            .transition(id, CANCELLABLE, ReservationStatus::Cancelled)
            .map_err(|err| stale_to_transition(err, "cancel"))?;

        info!(reservation = %id, from = %reservation.status, "reservation cancelled");
        self.audit.record(
            NewActionLog::new(
                ActionKind::CancelReservation,
                ctx.university_id,
                format!(
                    "status changed from {} to {}",
                    reservation.status, cancelled.status
                ),
            )
            .accommodation(cancelled.accommodation)
            .reservation(id),
        );
        self.notifier.notify(ReservationEvent::Cancelled, &cancelled);

        Ok(cancelled)
    }

    pub fn sign_contract(
        &self,
        ctx: &UniversityContext,
        id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        let reservation = self.owned(ctx, id)?;
        if !SIGNABLE.contains(&reservation.status) {
            return Err(ReservationError::InvalidTransition {
                from: reservation.status,
                action: "sign a contract for",
            });
        }

        let signed = self
            .store
            .transition(id, SIGNABLE, ReservationStatus::ContractSigned)
            .map_err(|err| stale_to_transition(err, "sign a contract for"))?;

        info!(reservation = %id, "contract signed");
        self.audit.record(
            NewActionLog::new(
                ActionKind::SignContract,
                ctx.university_id,
                "tenancy contract signed",
            )
            .accommodation(signed.accommodation)
            .reservation(id),
        );
        self.notifier.notify(ReservationEvent::ContractSigned, &signed);

        Ok(signed)
    }

    /// Reservations made by the university's members for accommodations offered to it.
    pub fn list(&self, ctx: &UniversityContext) -> Result<Vec<Reservation>, ReservationError> {
        let mut visible = Vec::new();
        for reservation in self.store.reservations()? {
            if self.is_visible(ctx, &reservation)? {
                visible.push(reservation);
            }
        }
        Ok(visible)
    }

    /// Every reservation of one member of the university, oldest first.
    pub fn for_member(
        &self,
        ctx: &UniversityContext,
        member_id: MemberId,
    ) -> Result<Vec<Reservation>, ReservationError> {
        let member = self
            .store
            .member(member_id)?
            .ok_or(ReservationError::NotFound {
                entity: "member",
                id: member_id.0,
            })?;
        if member.university != ctx.university_id {
            return Err(ReservationError::Forbidden);
        }
        Ok(self
            .store
            .reservations()?
            .into_iter()
            .filter(|reservation| reservation.member == member_id)
            .collect())
    }

    pub fn get(
        &self,
        ctx: &UniversityContext,
        id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        let reservation = self.find(id)?;
        if self.is_visible(ctx, &reservation)? {
            Ok(reservation)
        } else {
            Err(ReservationError::Forbidden)
        }
    }

    fn find(&self, id: ReservationId) -> Result<Reservation, ReservationError> {
        self.store
            .reservation(id)?
            .ok_or(ReservationError::NotFound {
                entity: "reservation",
                id: id.0,
            })
    }

    /// The acting university must be the university of the reserving student.
    fn owned(
        &self,
        ctx: &UniversityContext,
        id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        let reservation = self.find(id)?;
        let member = self
            .store
            .member(reservation.member)?
            .ok_or(ReservationError::NotFound {
                entity: "member",
                id: reservation.member.0,
            })?;
        if member.university != ctx.university_id {
            return Err(ReservationError::Forbidden);
        }
        Ok(reservation)
    }

    fn is_visible(
        &self,
        ctx: &UniversityContext,
        reservation: &Reservation,
    ) -> Result<bool, ReservationError> {
        let by_member = self
            .store
            .member(reservation.member)?
            .is_some_and(|member| member.university == ctx.university_id);
        if !by_member {
            return Ok(false);
        }
        Ok(self
            .store
            .accommodation(reservation.accommodation)?
            .is_some_and(|accommodation| accommodation.is_offered_to(ctx.university_id)))
    }
}

fn stale_to_transition(err: StoreError, action: &'static str) -> ReservationError {
    match err {
        StoreError::StaleStatus { current, .. } => ReservationError::InvalidTransition {
            from: current,
            action,
        },
        other => ReservationError::from(other),
    }
}
