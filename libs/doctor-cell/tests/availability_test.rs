// libs/doctor-cell/tests/availability_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use doctor_cell::models::*;
use doctor_cell::services::{AvailabilityService, DoctorService};
use doctor_cell::store::{InMemoryDoctorStore, InMemorySlotStore, SlotStore};
use shared_models::auth::Caller;

fn service() -> (AvailabilityService, Arc<InMemorySlotStore>) {
    let store = Arc::new(InMemorySlotStore::new());
    (AvailabilityService::with_store(store.clone()), store)
}

fn next_monday_nine() -> DateTime<Utc> {
    let mut day = (Utc::now() + Duration::days(7)).date_naive();
    while DayOfWeek::of(day.and_hms_opt(9, 0, 0).unwrap().and_utc()) != DayOfWeek::Monday {
        day = day.succ_opt().unwrap();
    }
    day.and_hms_opt(9, 0, 0).unwrap().and_utc()
}

fn request(start: DateTime<Utc>, minutes: i64, day: &str) -> CreateSlotRequest {
    CreateSlotRequest {
        doctor_id: None,
        start_time: Some(start),
        end_time: Some(start + Duration::minutes(minutes)),
        day_of_week: Some(day.to_string()),
    }
}

#[tokio::test]
async fn creates_unbooked_slot() {
    let (service, _) = service();
    let doctor_id = Uuid::new_v4();
    let start = next_monday_nine();

    let slot = service.create_slot(doctor_id, request(start, 30, "Monday")).await.unwrap();

    assert_eq!(slot.doctor_id, doctor_id);
    assert_eq!(slot.day_of_week, DayOfWeek::Monday);
    assert!(!slot.is_booked);
}

#[tokio::test]
async fn rejects_invalid_day_and_missing_times() {
    let (service, _) = service();
    let doctor_id = Uuid::new_v4();
    let start = next_monday_nine();

    let bad_day = service.create_slot(doctor_id, request(start, 30, "Someday")).await;
    assert_matches!(bad_day, Err(AvailabilityError::ValidationError(_)));

    let mut missing_end = request(start, 30, "Monday");
    missing_end.end_time = None;
    assert_matches!(
        service.create_slot(doctor_id, missing_end).await,
        Err(AvailabilityError::ValidationError(_))
    );

    let reversed = request(start, -30, "Monday");
    assert_matches!(
        service.create_slot(doctor_id, reversed).await,
        Err(AvailabilityError::ValidationError(_))
    );
}

#[tokio::test]
async fn nearby_boundaries_conflict_for_same_doctor_and_day() {
    let (service, _) = service();
    let doctor_id = Uuid::new_v4();
    let start = next_monday_nine();
    service.create_slot(doctor_id, request(start, 30, "Monday")).await.unwrap();

    for offset in [0, 1, 4, 5] {
        let candidate = request(start + Duration::minutes(offset), 60, "Monday");
        assert_matches!(
            service.create_slot(doctor_id, candidate).await,
            Err(AvailabilityError::Conflict(_)),
            "start offset {} should conflict",
            offset
        );
    }

    // ends two minutes after the existing slot even though it starts much earlier
    let end_clash = CreateSlotRequest {
        doctor_id: None,
        start_time: Some(start - Duration::minutes(60)),
        end_time: Some(start + Duration::minutes(32)),
        day_of_week: Some("Monday".to_string()),
    };
    assert_matches!(service.create_slot(doctor_id, end_clash).await, Err(AvailabilityError::Conflict(_)));
}

#[tokio::test]
async fn distant_boundaries_other_days_and_other_doctors_do_not_conflict() {
    let (service, _) = service();
    let doctor_id = Uuid::new_v4();
    let start = next_monday_nine();
    service.create_slot(doctor_id, request(start, 30, "Monday")).await.unwrap();

    // back-to-back slot is fine: both boundaries are 30 minutes away
    service.create_slot(doctor_id, request(start + Duration::minutes(30), 30, "Monday")).await.unwrap();
    service.create_slot(doctor_id, request(start + Duration::minutes(2), 30, "Tuesday")).await.unwrap();
    service.create_slot(Uuid::new_v4(), request(start, 30, "Monday")).await.unwrap();
}

#[tokio::test]
async fn update_rechecks_proximity_excluding_itself() {
    let (service, _) = service();
    let doctor_id = Uuid::new_v4();
    let owner = Caller::doctor(doctor_id);
    let start = next_monday_nine();

    let first = service.create_slot(doctor_id, request(start, 30, "Monday")).await.unwrap();
    let second = service.create_slot(doctor_id, request(start + Duration::hours(2), 30, "Monday")).await.unwrap();

    // shifting a slot by a minute only conflicts with itself, which is excluded
    let nudged = service.update_slot(first.id, &owner, UpdateSlotRequest {
        start_time: Some(start + Duration::minutes(1)),
        ..Default::default()
    }).await.unwrap();
    assert_eq!(nudged.start_time, start + Duration::minutes(1));
    assert_eq!(nudged.end_time, first.end_time);

    let clash = service.update_slot(second.id, &owner, UpdateSlotRequest {
        start_time: Some(start + Duration::minutes(3)),
        end_time: Some(start + Duration::minutes(50)),
        ..Default::default()
    }).await;
    assert_matches!(clash, Err(AvailabilityError::Conflict(_)));
}

#[tokio::test]
async fn only_owner_or_admin_can_modify() {
    let (service, store) = service();
    let doctor_id = Uuid::new_v4();
    let slot = service.create_slot(doctor_id, request(next_monday_nine(), 30, "Monday")).await.unwrap();

    let stranger = Caller::doctor(Uuid::new_v4());
    assert_matches!(
        service.update_slot(slot.id, &stranger, UpdateSlotRequest::default()).await,
        Err(AvailabilityError::Unauthorized(_))
    );
    assert_matches!(service.delete_slot(slot.id, &stranger).await, Err(AvailabilityError::Unauthorized(_)));

    // doctors cannot toggle the booked flag; administrators can
    let owner = Caller::doctor(doctor_id);
    assert_matches!(
        service.update_slot(slot.id, &owner, UpdateSlotRequest { is_booked: Some(true), ..Default::default() }).await,
        Err(AvailabilityError::Unauthorized(field)) if field == "is_booked"
    );
    let admin = Caller::admin(Uuid::new_v4());
    let flagged = service
        .update_slot(slot.id, &admin, UpdateSlotRequest { is_booked: Some(true), ..Default::default() })
        .await
        .unwrap();
    assert!(flagged.is_booked);

    // booked slots cannot be removed
    assert_matches!(service.delete_slot(slot.id, &owner).await, Err(AvailabilityError::Conflict(_)));

    store.set_booked_if(slot.id, Some(true), false).await.unwrap();
    service.delete_slot(slot.id, &owner).await.unwrap();
    assert_matches!(service.get_slot(slot.id).await, Err(AvailabilityError::SlotNotFound));
}

#[tokio::test]
async fn missing_slot_is_not_found() {
    let (service, _) = service();
    let caller = Caller::doctor(Uuid::new_v4());
    assert_matches!(
        service.update_slot(Uuid::new_v4(), &caller, UpdateSlotRequest::default()).await,
        Err(AvailabilityError::SlotNotFound)
    );
}

#[tokio::test]
async fn doctor_search_attaches_three_preview_slots() {
    let (availability, _) = service();
    let now = Utc::now();
    let cardiologist = Doctor {
        id: Uuid::new_v4(),
        first_name: "Amara".to_string(),
        last_name: "Okafor".to_string(),
        email: "amara.okafor@example.com".to_string(),
        specialty: "Cardiologist".to_string(),
        bio: None,
        profile_image_url: None,
        is_available: true,
        created_at: now,
        updated_at: now,
    };
    let start = next_monday_nine();
    for i in 0..5 {
        let slot_start = start + Duration::hours(i);
        availability
            .create_slot(cardiologist.id, request(slot_start, 30, DayOfWeek::of(slot_start).as_str()))
            .await
            .unwrap();
    }

    let doctors = DoctorService::with_store(
        Arc::new(InMemoryDoctorStore::with_doctors([cardiologist.clone()])),
        availability,
    );

    let found = doctors.search_doctors(&["cardio".to_string()], None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].full_name, "Amara Okafor");
    assert_eq!(found[0].available_slots.len(), 3);

    let none = doctors.search_doctors(&["dermatology".to_string()], None).await.unwrap();
    assert!(none.is_empty());
}
