use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::Reservation;
use super::store::{HousingStore, StoreError};

/// Outbound mail collaborator (SMTP relay, console sink, test outbox).
pub trait MailChannel: Send + Sync {
    fn send(&self, mail: OutboundMail) -> Result<(), MailError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMail {
    pub from: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

/// Lifecycle events that reach the specialist group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationEvent {
    Created,
    Cancelled,
    ContractSigned,
}

impl ReservationEvent {
    pub const fn subject(self) -> &'static str {
        match self {
            ReservationEvent::Created => "New Reservation Created",
            ReservationEvent::Cancelled => "Reservation Cancelled",
            ReservationEvent::ContractSigned => "Reservation Contract Signed",
        }
    }

    const fn headline(self) -> &'static str {
        match self {
            ReservationEvent::Created => "A new reservation has been created.",
            ReservationEvent::Cancelled => "A reservation has been cancelled.",
            ReservationEvent::ContractSigned => {
                "A tenancy contract has been signed for a reservation."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { recipients: usize },
    NoRecipients,
    Failed,
}

#[derive(Debug, thiserror::Error)]
enum ComposeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{entity} {id} referenced by reservation is missing")]
    Dangling { entity: &'static str, id: u64 },
}

/// Emails the specialist group of the student's university. Best effort: failures are logged
/// and reported through [`DispatchOutcome`], never propagated.
pub struct NotificationDispatcher<S, M> {
    store: Arc<S>,
    mail: Arc<M>,
    from_address: String,
}

impl<S, M> Clone for NotificationDispatcher<S, M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            mail: Arc::clone(&self.mail),
            from_address: self.from_address.clone(),
        }
    }
}

impl<S, M> NotificationDispatcher<S, M>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    pub fn new(store: Arc<S>, mail: Arc<M>, from_address: impl Into<String>) -> Self {
        Self {
            store,
            mail,
            from_address: from_address.into(),
        }
    }

    pub fn notify(&self, event: ReservationEvent, reservation: &Reservation) -> DispatchOutcome {
        let mail = match self.compose(event, reservation) {
            Ok(Some(mail)) => mail,
            Ok(None) => {
                warn!(
                    reservation = %reservation.id,
                    ?event,
                    "no specialists registered for the student's university"
                );
                return DispatchOutcome::NoRecipients;
            }
            Err(err) => {
                error!(
                    reservation = %reservation.id,
                    ?event,
                    %err,
                    "unable to compose notification"
                );
                return DispatchOutcome::Failed;
            }
        };

        let recipients = mail.recipients.len();
        match self.mail.send(mail) {
            Ok(()) => {
                info!(reservation = %reservation.id, ?event, recipients, "specialists notified");
                DispatchOutcome::Delivered { recipients }
            }
            Err(err) => {
                error!(reservation = %reservation.id, ?event, %err, "failed to notify specialists");
                DispatchOutcome::Failed
            }
        }
    }

    fn compose(
        &self,
        event: ReservationEvent,
        reservation: &Reservation,
    ) -> Result<Option<OutboundMail>, ComposeError> {
        let member = self
            .store
            .member(reservation.member)?
            .ok_or(ComposeError::Dangling {
                entity: "member",
                id: reservation.member.0,
            })?;
        let recipients: Vec<String> = self
            .store
            .specialists_of(member.university)?
            .into_iter()
            .map(|specialist| specialist.email)
            .collect();
        if recipients.is_empty() {
            return Ok(None);
        }

        let accommodation = self
            .store
            .accommodation(reservation.accommodation)?
            .ok_or(ComposeError::Dangling {
                entity: "accommodation",
                id: reservation.accommodation.0,
            })?;
        let period = match self.store.slot(reservation.slot)? {
            Some(slot) => format!("{} to {}", slot.start.to_rfc3339(), slot.end.to_rfc3339()),
            None => "unknown".to_string(),
        };

        let body = format!(
            "{headline}\n\n\
             Accommodation: {name}\n\
             Type: {kind}\n\
             Building: {building}\n\
             Address: {address}\n\n\
             Reserved by: {member} ({email})\n\
             Period: {period}\n\
             Status: {status}\n\n\
             Reservation ID: {id}\n",
            headline = event.headline(),
            name = accommodation.name,
            kind = accommodation.kind.label(),
            building = accommodation.building_name,
            address = accommodation.address,
            member = member.name,
            email = member.email,
            status = reservation.status.label(),
            id = reservation.id,
        );

        Ok(Some(OutboundMail {
            from: self.from_address.clone(),
            recipients,
            subject: event.subject().to_string(),
            body,
        }))
    }
}

/// Writes every message to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct ConsoleMailer;

impl MailChannel for ConsoleMailer {
    fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        info!(
            from = %mail.from,
            to = %mail.recipients.join(", "),
            subject = %mail.subject,
            body = %mail.body,
            "outbound mail"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory so callers can inspect them.
#[derive(Debug, Default, Clone)]
pub struct MailOutbox {
    messages: Arc<Mutex<Vec<OutboundMail>>>,
}

impl MailOutbox {
    pub fn messages(&self) -> Vec<OutboundMail> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl MailChannel for MailOutbox {
    fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        self.messages
            .lock()
            .map_err(|_| MailError::Transport("outbox lock poisoned".to_string()))?
            .push(mail);
        Ok(())
    }
}
