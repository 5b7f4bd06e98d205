//! End-to-end reservation scenarios driven through the public service facade and HTTP router.

mod common {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use unihaven::housing::{
        Accommodation, AccommodationKind, AvailabilitySlot, HousingStore, InMemoryHousingStore,
        MailOutbox, Member, NewAccommodation, NewMember, NewSlot, NewSpecialist, NewUniversity,
        Owner, ReservationRequest, UniHavenService, UniversityContext, UniversityToken,
    };

    pub type Service = UniHavenService<InMemoryHousingStore, MailOutbox>;

    pub struct Fixture {
        pub service: Arc<Service>,
        pub outbox: MailOutbox,
        pub ctx: UniversityContext,
        pub token: UniversityToken,
        pub student: Member,
        pub accommodation: Accommodation,
        pub slot: AvailabilitySlot,
    }

    impl Fixture {
        pub fn request(&self) -> ReservationRequest {
            ReservationRequest {
                member_id: self.student.id,
                accommodation_id: self.accommodation.id,
                slot_id: self.slot.id,
                contact_name: self.student.name.clone(),
                contact_phone: self.student.phone.clone(),
            }
        }

        pub fn slot_available(&self) -> bool {
            self.service
                .store()
                .slot(self.slot.id)
                .expect("store readable")
                .expect("slot exists")
                .available
        }
    }

    /// University U with one specialist, one student and accommodation A with a 09:00-10:00 slot.
    pub fn university_with_slot() -> Fixture {
        let outbox = MailOutbox::default();
        let service = Arc::new(UniHavenService::new(
            Arc::new(InMemoryHousingStore::new()),
            Arc::new(outbox.clone()),
            "noreply@unihaven.test",
        ));

        let (university, token) = service
            .registry()
            .register(NewUniversity {
                name: "The University of Hong Kong".to_string(),
                country: "Hong Kong".to_string(),
                address: "Pok Fu Lam".to_string(),
            })
            .expect("university registers");
        let ctx = UniversityContext::from(&university);

        service
            .catalog()
            .register_specialist(
                &ctx,
                NewSpecialist {
                    name: "CEDARS Housing".to_string(),
                    email: "cedars@hku.test".to_string(),
                    phone: String::new(),
                },
            )
            .expect("specialist registers");
        let student = service
            .catalog()
            .register_member(
                &ctx,
                NewMember {
                    name: "Chan Tai Man".to_string(),
                    email: "chan@student.test".to_string(),
                    phone: "98765432".to_string(),
                },
            )
            .expect("member registers");
        let accommodation = service
            .catalog()
            .register_accommodation(
                &ctx,
                NewAccommodation {
                    name: "Jolly Villa".to_string(),
                    building_name: "Jolly Villa".to_string(),
                    description: "Harbour view flat".to_string(),
                    kind: AccommodationKind::Apartment,
                    num_bedrooms: 2,
                    num_beds: 2,
                    address: "Jolly Villa, Tin Hau".to_string(),
                    latitude: 22.27731,
                    longitude: 114.19238,
                    monthly_rent: 15_000,
                    owner: Owner {
                        name: "George".to_string(),
                        email: "george@owners.test".to_string(),
                        phone: "92223333".to_string(),
                    },
                    university_ids: Vec::new(),
                },
            )
            .expect("accommodation registers");
        let slot = service
            .catalog()
            .add_slot(
                &ctx,
                accommodation.id,
                NewSlot {
                    start: Utc
                        .with_ymd_and_hms(2025, 9, 1, 9, 0, 0)
                        .single()
                        .expect("valid"),
                    end: Utc
                        .with_ymd_and_hms(2025, 9, 1, 10, 0, 0)
                        .single()
                        .expect("valid"),
                },
            )
            .expect("slot added");

        Fixture {
            service,
            outbox,
            ctx,
            token,
            student,
            accommodation,
            slot,
        }
    }
}

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use unihaven::housing::{housing_router, HousingStore, ReservationError, ReservationStatus};

use common::university_with_slot;

#[test]
fn create_confirms_and_notifies_the_specialist_group() {
    let fixture = university_with_slot();

    let reservation = fixture
        .service
        .lifecycle()
        .create(&fixture.ctx, fixture.request())
        .expect("reservation created");

    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert!(!fixture.slot_available());
    let messages = fixture.outbox.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].recipients, vec!["cedars@hku.test".to_string()]);
}

#[test]
fn second_create_on_a_taken_slot_changes_nothing() {
    let fixture = university_with_slot();
    fixture
        .service
        .lifecycle()
        .create(&fixture.ctx, fixture.request())
        .expect("first reservation");

    let second = fixture
        .service
        .lifecycle()
        .create(&fixture.ctx, fixture.request());

    assert!(matches!(second, Err(ReservationError::SlotUnavailable(_))));
    let reservations = fixture
        .service
        .lifecycle()
        .list(&fixture.ctx)
        .expect("listed");
    assert_eq!(reservations.len(), 1);
    assert!(!fixture.slot_available());
    assert_eq!(fixture.outbox.messages().len(), 1);
}

#[test]
fn cancel_succeeds_once_and_releases_the_slot_once() {
    let fixture = university_with_slot();
    let reservation = fixture
        .service
        .lifecycle()
        .create(&fixture.ctx, fixture.request())
        .expect("created");

    let cancelled = fixture
        .service
        .lifecycle()
        .cancel(&fixture.ctx, reservation.id)
        .expect("first cancel");
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert!(fixture.slot_available());
    assert_eq!(fixture.outbox.messages().len(), 2);

    let again = fixture
        .service
        .lifecycle()
        .cancel(&fixture.ctx, reservation.id);
    assert!(matches!(
        again,
        Err(ReservationError::InvalidTransition {
            from: ReservationStatus::Cancelled,
            ..
        })
    ));
    assert_eq!(fixture.outbox.messages().len(), 2);
}

#[test]
fn signing_a_cancelled_reservation_fails_without_mail() {
    let fixture = university_with_slot();
    let reservation = fixture
        .service
        .lifecycle()
        .create(&fixture.ctx, fixture.request())
        .expect("created");
    fixture
        .service
        .lifecycle()
        .cancel(&fixture.ctx, reservation.id)
        .expect("cancelled");
    let before = fixture.outbox.messages().len();

    let result = fixture
        .service
        .lifecycle()
        .sign_contract(&fixture.ctx, reservation.id);

    assert!(matches!(
        result,
        Err(ReservationError::InvalidTransition { .. })
    ));
    assert_eq!(fixture.outbox.messages().len(), before);
}

#[tokio::test]
async fn unauthorized_requests_never_reserve_or_notify() {
    let fixture = university_with_slot();
    let router = housing_router(fixture.service.clone());
    let body = json!({
        "member_id": fixture.student.id,
        "accommodation_id": fixture.accommodation.id,
        "slot_id": fixture.slot.id,
        "contact_name": "Chan Tai Man",
        "contact_phone": "98765432"
    });

    for authorization in [None, Some("Token 00000000-0000-4000-8000-000000000000")] {
        let mut request = Request::post("/api/reservations")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        let response = router
            .clone()
            .oneshot(
                request
                    .body(Body::from(body.to_string()))
                    .expect("request builds"),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    assert!(fixture.slot_available());
    assert!(fixture.outbox.messages().is_empty());
    assert!(fixture
        .service
        .store()
        .reservations()
        .expect("readable")
        .is_empty());

    let response = router
        .oneshot(
            Request::post("/api/reservations")
                .header(header::CONTENT_TYPE, "application/json")
                .header(
                    header::AUTHORIZATION,
                    format!("Token {}", fixture.token.as_str()),
                )
                .body(Body::from(body.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(!fixture.slot_available());
}
