//! Postgres DDL for the ledger tables.
//!
//! Column order matches the descriptors in `tables.rs`.

/// Schema applied by migrations. `resource_path` defaults from the session scope.
pub const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS student_packages (
    student_package_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    package_id TEXT,
    start_at TIMESTAMPTZ,
    end_at TIMESTAMPTZ,
    properties JSONB,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    location_ids TEXT[],
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    resource_path TEXT DEFAULT autofillresourcepath(),
    CONSTRAINT student_packages_pk PRIMARY KEY (student_package_id)
);

CREATE TABLE IF NOT EXISTS student_package_order (
    student_package_order_id TEXT NOT NULL,
    student_package_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    order_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    start_at TIMESTAMPTZ NOT NULL,
    end_at TIMESTAMPTZ NOT NULL,
    student_package_object JSONB,
    is_current_student_package BOOLEAN NOT NULL DEFAULT FALSE,
    from_student_package_order_id TEXT,
    executed_error TEXT,
    is_executed_by_cronjob BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    resource_path TEXT DEFAULT autofillresourcepath(),
    CONSTRAINT student_package_order_pk PRIMARY KEY (student_package_order_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS student_package_order_current_idx
    ON student_package_order (student_package_id)
    WHERE is_current_student_package AND deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS student_course (
    student_package_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    student_start_date TIMESTAMPTZ NOT NULL,
    student_end_date TIMESTAMPTZ NOT NULL,
    course_slot INTEGER,
    course_slot_per_week INTEGER,
    weight INTEGER,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    resource_path TEXT DEFAULT autofillresourcepath(),
    CONSTRAINT student_course_pk PRIMARY KEY (student_id, course_id, location_id, student_package_id)
);

CREATE TABLE IF NOT EXISTS student_package_access_path (
    student_package_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    access_path TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    resource_path TEXT DEFAULT autofillresourcepath(),
    CONSTRAINT student_package_access_path_pk PRIMARY KEY (student_package_id, student_id, course_id, location_id)
);

CREATE TABLE IF NOT EXISTS student_package_log (
    student_package_log_id TEXT NOT NULL,
    student_package_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    course_id TEXT,
    user_id TEXT,
    action TEXT NOT NULL,
    flow TEXT NOT NULL,
    student_package_object JSONB,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    resource_path TEXT DEFAULT autofillresourcepath(),
    CONSTRAINT student_package_log_pk PRIMARY KEY (student_package_log_id)
);

CREATE TABLE IF NOT EXISTS package_course (
    package_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    mandatory_flag BOOLEAN NOT NULL DEFAULT FALSE,
    course_weight INTEGER NOT NULL DEFAULT 1,
    max_slots_per_course INTEGER NOT NULL DEFAULT 1,
    created_at TIMESTAMPTZ NOT NULL,
    resource_path TEXT DEFAULT autofillresourcepath(),
    CONSTRAINT package_course_pk PRIMARY KEY (package_id, course_id)
);

CREATE TABLE IF NOT EXISTS package_course_material (
    package_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    material_id TEXT NOT NULL,
    available_from TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    resource_path TEXT DEFAULT autofillresourcepath(),
    CONSTRAINT package_course_material_pk PRIMARY KEY (package_id, course_id, material_id)
);

CREATE TABLE IF NOT EXISTS package_course_fee (
    package_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    fee_id TEXT NOT NULL,
    available_from TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    resource_path TEXT DEFAULT autofillresourcepath(),
    CONSTRAINT package_course_fee_pk PRIMARY KEY (package_id, course_id, fee_id)
);

CREATE TABLE IF NOT EXISTS product_location (
    product_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    resource_path TEXT DEFAULT autofillresourcepath(),
    CONSTRAINT product_location_pk PRIMARY KEY (product_id, location_id)
);
"#;
