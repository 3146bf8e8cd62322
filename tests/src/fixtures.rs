//! Shared builders for the integration scenarios.

use chrono::{TimeZone, Utc};
use entitlement_ledger::{
    CourseInfo, EntitlementService, FixedTimeSource, GrantRequest, InMemoryDatabase,
    LedgerConfig, LedgerStores, PackageProperties,
};
use shared_types::Timestamp;
use std::sync::{Arc, Once};

pub const STUDENT: &str = "stu-1";
pub const PACKAGE: &str = "pkg-1";
pub const HEAD: &str = "sp-1";
pub const COURSE: &str = "c-1";
pub const LOCATION: &str = "loc-1";

static TELEMETRY: Once = Once::new();

/// Install the log subscriber once per test binary.
pub fn init_logs() {
    TELEMETRY.call_once(|| {
        let config = ledger_telemetry::TelemetryConfig {
            log_level: "warn".to_string(),
            ..Default::default()
        };
        let _ = ledger_telemetry::init_logging(&config);
    });
}

/// Midnight UTC of a day in 2024.
pub fn day(month: u32, d: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, month, d, 0, 0, 0).unwrap()
}

pub struct Ledger {
    pub db: InMemoryDatabase,
    pub clock: Arc<FixedTimeSource>,
    pub service: Arc<EntitlementService>,
}

impl Ledger {
    pub fn at(now: Timestamp) -> Self {
        Self::with_config(now, LedgerConfig::default())
    }

    pub fn with_config(now: Timestamp, config: LedgerConfig) -> Self {
        init_logs();
        let clock = Arc::new(FixedTimeSource::new(now));
        let stores = LedgerStores::new(clock.clone(), &config);
        Self {
            db: InMemoryDatabase::with_config(&config),
            service: Arc::new(EntitlementService::new(stores, clock.clone())),
            clock,
        }
    }
}

pub fn grant(order_id: &str, from: Timestamp, to: Timestamp) -> GrantRequest {
    GrantRequest {
        student_id: STUDENT.into(),
        package_id: Some(PACKAGE.into()),
        student_package_id: Some(HEAD.into()),
        order_id: order_id.into(),
        course_id: COURSE.into(),
        location_ids: vec![LOCATION.into()],
        properties: PackageProperties::for_courses(vec![CourseInfo {
            course_id: COURSE.into(),
            name: "Maths".into(),
            number_of_slots: 10,
            weight: 2,
        }]),
        start_at: from,
        end_at: to,
        from_student_package_order_id: None,
        flow: "new order".into(),
    }
}
