use crate::infra::{build_service, MailTransport};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use unihaven::config::{MailBackend, MailConfig};
use unihaven::error::AppError;
use unihaven::housing::{
    Accommodation, AccommodationKind, AccommodationQuery, AvailabilitySlot, Campus, HousingStore,
    MailChannel, Member, NewAccommodation, NewCampus, NewMember, NewSlot, NewSpecialist,
    NewUniversity, Owner, RatingSubmission, ReservationRequest, SortOrder, UniHavenService,
    UniversityContext, UniversityId, UniversityToken,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the full body of every notification mail.
    #[arg(long)]
    pub(crate) show_mail: bool,
}

pub(crate) struct SeededUniversity {
    pub(crate) ctx: UniversityContext,
    pub(crate) token: UniversityToken,
}

/// Handles to the records the demo scenario works with.
pub(crate) struct DemoSeed {
    pub(crate) universities: Vec<SeededUniversity>,
    hku_main_campus: Campus,
    fred: Member,
    jolly_villa: Accommodation,
    jolly_villa_open: AvailabilitySlot,
}

struct ListingSeed {
    name: &'static str,
    description: &'static str,
    address: &'static str,
    latitude: f64,
    longitude: f64,
    owner: usize,
    offered_to: &'static [usize],
    slots: &'static [((i32, u32, u32), (i32, u32, u32))],
}

const UNIVERSITIES: [(&str, &str); 3] = [
    ("HKU", "housing@hku.unihaven.local"),
    ("HKUST", "housing@hkust.unihaven.local"),
    ("CUHK", "housing@cuhk.unihaven.local"),
];

const OWNERS: [(&str, &str, &str); 2] = [
    ("George", "george@example.com", "88888888"),
    ("Ian", "ian@example.com", "99999999"),
];

const CAMPUSES: [(usize, &str, f64, f64); 7] = [
    (0, "Main Campus", 22.28405, 114.13784),
    (0, "Sassoon Road Campus", 22.2675, 114.12881),
    (0, "Swire Institute of Marine Science", 22.20805, 114.26021),
    (0, "Kadoorie Centre", 22.43022, 114.11429),
    (0, "Faculty of Dentistry", 22.28649, 114.14426),
    (1, "Main Campus", 22.33584, 114.26355),
    (2, "Main Campus", 22.41907, 114.20693),
];

const LISTINGS: [ListingSeed; 4] = [
    ListingSeed {
        name: "Jolly Villa",
        description: "Apartment for HKU students",
        address: "Room 1, Flat C, Floor 3, Jolly Villa",
        latitude: 22.27731,
        longitude: 114.19238,
        owner: 0,
        offered_to: &[0, 1],
        slots: &[
            ((2025, 4, 22), (2025, 5, 14)),
            ((2025, 6, 15), (2025, 6, 30)),
            ((2025, 7, 1), (2025, 8, 31)),
        ],
    },
    ListingSeed {
        name: "South View Garden",
        description: "Apartment for HKU students",
        address: "Flat G, Floor 22, South View Garden",
        latitude: 22.2617,
        longitude: 114.1303,
        owner: 0,
        offered_to: &[0],
        slots: &[
            ((2025, 4, 15), (2025, 4, 21)),
            ((2025, 5, 1), (2025, 10, 31)),
        ],
    },
    ListingSeed {
        name: "Glen Haven",
        description: "Apartment for HKU and CUHK students",
        address: "Room 3, Flat E, Glen Haven",
        latitude: 22.3817,
        longitude: 114.1886,
        owner: 1,
        offered_to: &[0, 2],
        slots: &[
            ((2025, 3, 1), (2025, 5, 7)),
            ((2025, 5, 22), (2025, 7, 7)),
            ((2025, 7, 8), (2025, 12, 31)),
        ],
    },
    ListingSeed {
        name: "Prosperity Mansion",
        description: "Apartment for CUHK students",
        address: "Flat D, Prosperity Mansion",
        latitude: 22.4145,
        longitude: 114.2101,
        owner: 1,
        offered_to: &[2],
        slots: &[((2025, 3, 15), (2025, 7, 31))],
    },
];

const MEMBERS: [(usize, &str, &str, &str); 4] = [
    (0, "Anson Lee", "ansonlee@gmail.com", "2290 4324"),
    (0, "Candy Chan", "candychan@gmail.com", "3528 6925"),
    (2, "Billy Johnson", "billyjohnson@gmail.com", "3910 1481"),
    (0, "Fred Lam", "fredlam@gmail.com", "3859 4679"),
];

fn midnight((year, month, day): (i32, u32, u32)) -> Result<DateTime<Utc>, AppError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::Seed(format!("invalid seed date {year}-{month}-{day}")))
}

/// Loads the three Hong Kong universities with their campuses, listings, students and a few
/// reservations in various states.
pub(crate) fn seed_demo_data<S, M>(service: &UniHavenService<S, M>) -> Result<DemoSeed, AppError>
where
    S: HousingStore + 'static,
    M: MailChannel + 'static,
{
    let mut universities = Vec::with_capacity(UNIVERSITIES.len());
    for (name, specialist_email) in UNIVERSITIES {
        let (university, token) = service.registry().register(NewUniversity {
            name: name.to_string(),
            country: "China".to_string(),
            address: "Hong Kong".to_string(),
        })?;
        let ctx = UniversityContext::from(&university);
        service.catalog().register_specialist(
            &ctx,
            NewSpecialist {
                name: format!("{name} Housing Office"),
                email: specialist_email.to_string(),
                phone: String::new(),
            },
        )?;
        universities.push(SeededUniversity { ctx, token });
    }
    let ids: Vec<UniversityId> = universities
        .iter()
        .map(|seeded| seeded.ctx.university_id)
        .collect();

    let mut campuses = Vec::with_capacity(CAMPUSES.len());
    for (owner, name, latitude, longitude) in CAMPUSES {
        campuses.push(service.catalog().register_campus(
            &universities[owner].ctx,
            NewCampus {
                name: name.to_string(),
                latitude,
                longitude,
            },
        )?);
    }

    let mut listings = Vec::with_capacity(LISTINGS.len());
    for listing in &LISTINGS {
        let (owner_name, owner_email, owner_phone) = OWNERS[listing.owner];
        let registrar = &universities[listing.offered_to[0]].ctx;
        let accommodation = service.catalog().register_accommodation(
            registrar,
            NewAccommodation {
                name: listing.name.to_string(),
                building_name: listing.name.to_string(),
                description: listing.description.to_string(),
                kind: AccommodationKind::Apartment,
                num_bedrooms: 2,
                num_beds: 4,
                address: listing.address.to_string(),
                latitude: listing.latitude,
                longitude: listing.longitude,
                monthly_rent: 5000,
                owner: Owner {
                    name: owner_name.to_string(),
                    email: owner_email.to_string(),
                    phone: owner_phone.to_string(),
                },
                university_ids: listing.offered_to.iter().map(|index| ids[*index]).collect(),
            },
        )?;
        let mut slots = Vec::with_capacity(listing.slots.len());
        for (start, end) in listing.slots {
            slots.push(service.catalog().add_slot(
                registrar,
                accommodation.id,
                NewSlot {
                    start: midnight(*start)?,
                    end: midnight(*end)?,
                },
            )?);
        }
        listings.push((accommodation, slots));
    }

    let mut members = Vec::with_capacity(MEMBERS.len());
    for (university, name, email, phone) in MEMBERS {
        members.push(service.catalog().register_member(
            &universities[university].ctx,
            NewMember {
                name: name.to_string(),
                email: email.to_string(),
                phone: phone.to_string(),
            },
        )?);
    }

    // (member, listing, slot, university, contact, cancel afterwards)
    let bookings = [
        (0, 1, 0, 0, "Anson Lee", false),
        (0, 0, 0, 0, "Anson Lee", false),
        (0, 0, 1, 0, "Anson Lee", true),
        (1, 2, 1, 0, "Tao", false),
        (2, 2, 0, 2, "Billy Johnson", false),
    ];
    for (member, listing, slot, university, contact, cancel) in bookings {
        let member: &Member = &members[member];
        let (accommodation, slots) = &listings[listing];
        let ctx = &universities[university].ctx;
        let reservation = service.lifecycle().create(
            ctx,
            ReservationRequest {
                member_id: member.id,
                accommodation_id: accommodation.id,
                slot_id: slots[slot].id,
                contact_name: contact.to_string(),
                contact_phone: member.phone.replace(' ', ""),
            },
        )?;
        if cancel {
            service.lifecycle().cancel(ctx, reservation.id)?;
        }
    }

    let (jolly_villa, jolly_villa_slots) = listings.swap_remove(0);
    Ok(DemoSeed {
        hku_main_campus: campuses.swap_remove(0),
        fred: members.swap_remove(3),
        jolly_villa_open: jolly_villa_slots[2].clone(),
        jolly_villa,
        universities,
    })
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let (service, transport) = build_service(&MailConfig {
        from_address: "noreply@unihaven.local".to_string(),
        backend: MailBackend::Memory,
    });
    let seed = seed_demo_data(&service)?;
    let hku = &seed.universities[0].ctx;

    println!("UniHaven demo");
    println!("\nRegistered universities");
    for seeded in &seed.universities {
        println!(
            "  {:<6} id={} token={}",
            seeded.ctx.name,
            seeded.ctx.university_id,
            seeded.token.as_str()
        );
    }

    let query = AccommodationQuery {
        campus_id: Some(seed.hku_main_campus.id),
        sort_by: Some(SortOrder::Distance),
        ..AccommodationQuery::default()
    };
    println!(
        "\nOpen listings for {} near {}",
        hku.name, seed.hku_main_campus.name
    );
    for view in service.catalog().search(hku, &query)? {
        println!(
            "  {:<20} {:>6.2} km  HK${}/month  open slots: {}",
            view.accommodation.name,
            view.distance_km.unwrap_or_default(),
            view.accommodation.monthly_rent,
            view.slots.iter().filter(|slot| slot.available).count()
        );
    }

    println!("\nReservation lifecycle");
    let request = ReservationRequest {
        member_id: seed.fred.id,
        accommodation_id: seed.jolly_villa.id,
        slot_id: seed.jolly_villa_open.id,
        contact_name: seed.fred.name.clone(),
        contact_phone: seed.fred.phone.replace(' ', ""),
    };
    let reservation = service.lifecycle().create(hku, request.clone())?;
    println!(
        "  {} reserved {} ({} to {}): {}",
        seed.fred.name,
        seed.jolly_villa.name,
        seed.jolly_villa_open.start.date_naive(),
        seed.jolly_villa_open.end.date_naive(),
        reservation.status
    );
    match service.lifecycle().create(hku, request) {
        Ok(_) => println!("  Second booking of the same slot unexpectedly succeeded"),
        Err(err) => println!("  Second booking of the same slot rejected: {err}"),
    }
    let signed = service.lifecycle().sign_contract(hku, reservation.id)?;
    println!("  Contract signed: {}", signed.status);

    let rating = service.ratings().rate(
        hku,
        RatingSubmission {
            reservation_id: reservation.id,
            score: 5,
            comment: "Bright flat, easy commute".to_string(),
        },
    )?;
    let view = service.catalog().accommodation(hku, seed.jolly_villa.id)?;
    println!(
        "  Rated {} star(s); average now {:.1} over {} rating(s)",
        rating.score.value(),
        view.average_rating.unwrap_or_default(),
        view.rating_count
    );

    println!("\nAction log for {}", hku.name);
    for entry in service.audit().entries(hku, None)?.iter().take(5) {
        println!("  {:?}: {}", entry.action, entry.details);
    }

    render_outbox(&transport, args.show_mail);
    Ok(())
}

fn render_outbox(transport: &MailTransport, show_mail: bool) {
    let Some(outbox) = transport.outbox() else {
        return;
    };
    let messages = outbox.messages();
    println!("\nSpecialist notifications: {}", messages.len());
    for mail in messages {
        println!("  [{}] -> {}", mail.subject, mail.recipients.join(", "));
        if show_mail {
            for line in mail.body.lines() {
                println!("      {line}");
            }
        }
    }
}
