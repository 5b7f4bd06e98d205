use std::sync::Arc;

use super::common::*;

use crate::housing::domain::ReservationStatus;
use crate::housing::notification::{DispatchOutcome, NotificationDispatcher, ReservationEvent};
use crate::housing::service::UniHavenService;
use crate::housing::store::{HousingStore, InMemoryHousingStore};

#[test]
fn specialists_of_the_students_university_receive_lifecycle_mail() {
    let (service, outbox) = build_service();
    let hku = register_university(&service, "HKU");
    register_specialist(&service, &hku, "housing@hku.test");
    register_specialist(&service, &hku, "warden@hku.test");
    let student = register_student(&service, &hku, "Chan Tai Man", "98765432");
    let (accommodation, slot) = list_accommodation(&service, &hku, "Jolly Villa");

    let reservation = service
        .lifecycle()
        .create(&hku.ctx, request(&student, &accommodation, &slot))
        .expect("created");
    service
        .lifecycle()
        .sign_contract(&hku.ctx, reservation.id)
        .expect("signed");

    let messages = outbox.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].subject, "New Reservation Created");
    assert_eq!(messages[1].subject, "Reservation Contract Signed");
    assert_eq!(messages[0].from, MAIL_FROM);
    assert_eq!(
        messages[0].recipients,
        vec!["housing@hku.test".to_string(), "warden@hku.test".to_string()]
    );
    assert!(messages[0].body.contains("Jolly Villa"));
    assert!(messages[0].body.contains("Chan Tai Man"));
    assert!(messages[1].body.contains("Contract Signed"));
}

#[test]
fn other_universities_specialists_are_not_notified() {
    let (service, outbox) = build_service();
    let hku = register_university(&service, "HKU");
    let hkust = register_university(&service, "HKUST");
    register_specialist(&service, &hkust, "housing@hkust.test");
    let student = register_student(&service, &hku, "Chan Tai Man", "98765432");
    let (accommodation, slot) = list_accommodation(&service, &hku, "Jolly Villa");

    service
        .lifecycle()
        .create(&hku.ctx, request(&student, &accommodation, &slot))
        .expect("created without any recipients");

    assert!(outbox.messages().is_empty());
}

#[test]
fn cancellation_mail_uses_its_own_subject() {
    let (service, outbox) = build_service();
    let hku = register_university(&service, "HKU");
    register_specialist(&service, &hku, "housing@hku.test");
    let student = register_student(&service, &hku, "Chan Tai Man", "98765432");
    let (accommodation, slot) = list_accommodation(&service, &hku, "Jolly Villa");

    let reservation = service
        .lifecycle()
        .create(&hku.ctx, request(&student, &accommodation, &slot))
        .expect("created");
    service
        .lifecycle()
        .cancel(&hku.ctx, reservation.id)
        .expect("cancelled");

    let last = outbox.messages().pop().expect("cancellation mail");
    assert_eq!(last.subject, "Reservation Cancelled");
    assert!(last.body.contains("Status: Cancelled"));
}

#[test]
fn mail_failure_does_not_roll_back_the_transition() {
    let store = Arc::new(InMemoryHousingStore::new());
    let service = UniHavenService::new(store, Arc::new(BrokenMailer), MAIL_FROM);
    let hku = register_university(&service, "HKU");
    register_specialist(&service, &hku, "housing@hku.test");
    let student = register_student(&service, &hku, "Chan Tai Man", "98765432");
    let (accommodation, slot) = list_accommodation(&service, &hku, "Jolly Villa");

    let reservation = service
        .lifecycle()
        .create(&hku.ctx, request(&student, &accommodation, &slot))
        .expect("reservation survives the mail failure");
    let stored = service
        .store()
        .reservation(reservation.id)
        .expect("readable")
        .expect("persisted");
    assert_eq!(stored.status, ReservationStatus::Confirmed);
}

#[test]
fn dispatcher_reports_each_outcome() {
    let (service, outbox) = build_service();
    let hku = register_university(&service, "HKU");
    let student = register_student(&service, &hku, "Chan Tai Man", "98765432");
    let (accommodation, slot) = list_accommodation(&service, &hku, "Jolly Villa");
    let reservation = service
        .lifecycle()
        .create(&hku.ctx, request(&student, &accommodation, &slot))
        .expect("created");

    let dispatcher = NotificationDispatcher::new(
        Arc::clone(service.store()),
        Arc::new(outbox.clone()),
        MAIL_FROM,
    );
    assert_eq!(
        dispatcher.notify(ReservationEvent::Created, &reservation),
        DispatchOutcome::NoRecipients
    );

    register_specialist(&service, &hku, "housing@hku.test");
    assert_eq!(
        dispatcher.notify(ReservationEvent::Created, &reservation),
        DispatchOutcome::Delivered { recipients: 1 }
    );

    let broken = NotificationDispatcher::new(
        Arc::clone(service.store()),
        Arc::new(BrokenMailer),
        MAIL_FROM,
    );
    assert_eq!(
        broken.notify(ReservationEvent::Cancelled, &reservation),
        DispatchOutcome::Failed
    );
}
