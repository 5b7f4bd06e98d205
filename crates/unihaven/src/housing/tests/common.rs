use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::housing::domain::{
    Accommodation, AccommodationKind, AvailabilitySlot, Member, NewAccommodation, NewMember,
    NewSlot, NewSpecialist, NewUniversity, Owner, UniversityContext, UniversityId,
};
use crate::housing::identity::UniversityToken;
use crate::housing::lifecycle::ReservationRequest;
use crate::housing::notification::{MailChannel, MailError, MailOutbox, OutboundMail};
use crate::housing::service::UniHavenService;
use crate::housing::store::InMemoryHousingStore;

pub(super) type TestService = UniHavenService<InMemoryHousingStore, MailOutbox>;

pub(super) const MAIL_FROM: &str = "noreply@unihaven.test";

pub(super) fn build_service() -> (Arc<TestService>, MailOutbox) {
    let outbox = MailOutbox::default();
    let service = UniHavenService::new(
        Arc::new(InMemoryHousingStore::new()),
        Arc::new(outbox.clone()),
        MAIL_FROM,
    );
    (Arc::new(service), outbox)
}

/// Mail transport that is always down.
#[derive(Debug, Default)]
pub(super) struct BrokenMailer;

impl MailChannel for BrokenMailer {
    fn send(&self, _mail: OutboundMail) -> Result<(), MailError> {
        Err(MailError::Transport("relay refused connection".to_string()))
    }
}

pub(super) fn on(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, month, day, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn september() -> NewSlot {
    NewSlot {
        start: on(9, 1),
        end: on(10, 1),
    }
}

pub(super) struct Enrolled {
    pub ctx: UniversityContext,
    pub token: UniversityToken,
}

impl Enrolled {
    pub fn id(&self) -> UniversityId {
        self.ctx.university_id
    }

    pub fn header(&self) -> String {
        format!("Token {}", self.token.as_str())
    }
}

pub(super) fn register_university<S, M>(service: &UniHavenService<S, M>, name: &str) -> Enrolled
where
    S: crate::housing::store::HousingStore + 'static,
    M: MailChannel + 'static,
{
    let (university, token) = service
        .registry()
        .register(NewUniversity {
            name: name.to_string(),
            country: "Hong Kong".to_string(),
            address: String::new(),
        })
        .expect("university registers");
    Enrolled {
        ctx: UniversityContext::from(&university),
        token,
    }
}

pub(super) fn register_student<S, M>(
    service: &UniHavenService<S, M>,
    enrolled: &Enrolled,
    name: &str,
    phone: &str,
) -> Member
where
    S: crate::housing::store::HousingStore + 'static,
    M: MailChannel + 'static,
{
    service
        .catalog()
        .register_member(
            &enrolled.ctx,
            NewMember {
                name: name.to_string(),
                email: format!("{}@student.test", name.to_lowercase().replace(' ', ".")),
                phone: phone.to_string(),
            },
        )
        .expect("member registers")
}

pub(super) fn register_specialist<S, M>(
    service: &UniHavenService<S, M>,
    enrolled: &Enrolled,
    email: &str,
) where
    S: crate::housing::store::HousingStore + 'static,
    M: MailChannel + 'static,
{
    service
        .catalog()
        .register_specialist(
            &enrolled.ctx,
            NewSpecialist {
                name: "Housing Office".to_string(),
                email: email.to_string(),
                phone: String::new(),
            },
        )
        .expect("specialist registers");
}

pub(super) fn draft_accommodation(
    name: &str,
    rent: u32,
    shared_with: &[UniversityId],
) -> NewAccommodation {
    NewAccommodation {
        name: name.to_string(),
        building_name: format!("{name} Tower"),
        description: "Two bedroom flat near the MTR".to_string(),
        kind: AccommodationKind::Apartment,
        num_bedrooms: 2,
        num_beds: 3,
        address: "1 Pok Fu Lam Road".to_string(),
        latitude: 22.27731,
        longitude: 114.19238,
        monthly_rent: rent,
        owner: Owner {
            name: "George Wong".to_string(),
            email: "george@owners.test".to_string(),
            phone: "91234567".to_string(),
        },
        university_ids: shared_with.to_vec(),
    }
}

pub(super) fn list_accommodation<S, M>(
    service: &UniHavenService<S, M>,
    enrolled: &Enrolled,
    name: &str,
) -> (Accommodation, AvailabilitySlot)
where
    S: crate::housing::store::HousingStore + 'static,
    M: MailChannel + 'static,
{
    let accommodation = service
        .catalog()
        .register_accommodation(&enrolled.ctx, draft_accommodation(name, 12_000, &[]))
        .expect("accommodation registers");
    let slot = service
        .catalog()
        .add_slot(&enrolled.ctx, accommodation.id, september())
        .expect("slot added");
    (accommodation, slot)
}

pub(super) fn request(
    member: &Member,
    accommodation: &Accommodation,
    slot: &AvailabilitySlot,
) -> ReservationRequest {
    ReservationRequest {
        member_id: member.id,
        accommodation_id: accommodation.id,
        slot_id: slot.id,
        contact_name: member.name.clone(),
        contact_phone: member.phone.clone(),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body is readable");
    serde_json::from_slice(&bytes).expect("body is json")
}

pub(super) async fn assert_error(response: Response, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], code, "unexpected payload {payload}");
    assert!(payload["error"].as_str().is_some_and(|message| !message.is_empty()));
}
