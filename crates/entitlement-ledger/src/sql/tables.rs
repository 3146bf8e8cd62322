//! Table descriptors and row mappings for every persisted entity.

use super::descriptor::{PartialUniqueIndex, Record, TableDescriptor, AUDIT_SCOPE_COLUMN};
use super::row::{to_json_value, Row};
use super::value::SqlValue;
use crate::domain::entities::{
    PackageCourse, PackageCourseFee, PackageCourseMaterial, PackageLogAction, ProductLocation,
    StudentCourse, StudentPackage, StudentPackageAccessPath, StudentPackageLog,
    StudentPackageOrder,
};
use crate::domain::errors::RowError;

pub static STUDENT_PACKAGES: TableDescriptor = TableDescriptor {
    name: "student_packages",
    columns: &[
        "student_package_id",
        "student_id",
        "package_id",
        "start_at",
        "end_at",
        "properties",
        "is_active",
        "location_ids",
        "created_at",
        "updated_at",
        "deleted_at",
        AUDIT_SCOPE_COLUMN,
    ],
    primary_key: &["student_package_id"],
    audit_scope: Some(AUDIT_SCOPE_COLUMN),
    partial_unique: None,
};

/// At most one live current segment per package.
pub const CURRENT_SEGMENT_INDEX: PartialUniqueIndex = PartialUniqueIndex {
    name: "student_package_order_current_idx",
    columns: &["student_package_id"],
    where_true: &["is_current_student_package"],
    where_null: &["deleted_at"],
};

pub static STUDENT_PACKAGE_ORDER: TableDescriptor = TableDescriptor {
    name: "student_package_order",
    columns: &[
        "student_package_order_id",
        "student_package_id",
        "user_id",
        "order_id",
        "course_id",
        "start_at",
        "end_at",
        "student_package_object",
        "is_current_student_package",
        "from_student_package_order_id",
        "executed_error",
        "is_executed_by_cronjob",
        "created_at",
        "updated_at",
        "deleted_at",
        AUDIT_SCOPE_COLUMN,
    ],
    primary_key: &["student_package_order_id"],
    audit_scope: Some(AUDIT_SCOPE_COLUMN),
    partial_unique: Some(CURRENT_SEGMENT_INDEX),
};

pub static STUDENT_COURSE: TableDescriptor = TableDescriptor {
    name: "student_course",
    columns: &[
        "student_package_id",
        "student_id",
        "course_id",
        "location_id",
        "student_start_date",
        "student_end_date",
        "course_slot",
        "course_slot_per_week",
        "weight",
        "created_at",
        "updated_at",
        "deleted_at",
        AUDIT_SCOPE_COLUMN,
    ],
    primary_key: &["student_id", "course_id", "location_id", "student_package_id"],
    audit_scope: Some(AUDIT_SCOPE_COLUMN),
    partial_unique: None,
};

pub static STUDENT_PACKAGE_ACCESS_PATH: TableDescriptor = TableDescriptor {
    name: "student_package_access_path",
    columns: &[
        "student_package_id",
        "student_id",
        "course_id",
        "location_id",
        "access_path",
        "created_at",
        "updated_at",
        "deleted_at",
        AUDIT_SCOPE_COLUMN,
    ],
    primary_key: &["student_package_id", "student_id", "course_id", "location_id"],
    audit_scope: Some(AUDIT_SCOPE_COLUMN),
    partial_unique: None,
};

pub static STUDENT_PACKAGE_LOG: TableDescriptor = TableDescriptor {
    name: "student_package_log",
    columns: &[
        "student_package_log_id",
        "student_package_id",
        "student_id",
        "course_id",
        "user_id",
        "action",
        "flow",
        "student_package_object",
        "created_at",
        "updated_at",
        AUDIT_SCOPE_COLUMN,
    ],
    primary_key: &["student_package_log_id"],
    audit_scope: Some(AUDIT_SCOPE_COLUMN),
    partial_unique: None,
};

pub static PACKAGE_COURSE: TableDescriptor = TableDescriptor {
    name: "package_course",
    columns: &[
        "package_id",
        "course_id",
        "mandatory_flag",
        "course_weight",
        "max_slots_per_course",
        "created_at",
        AUDIT_SCOPE_COLUMN,
    ],
    primary_key: &["package_id", "course_id"],
    audit_scope: Some(AUDIT_SCOPE_COLUMN),
    partial_unique: None,
};

pub static PACKAGE_COURSE_MATERIAL: TableDescriptor = TableDescriptor {
    name: "package_course_material",
    columns: &[
        "package_id",
        "course_id",
        "material_id",
        "available_from",
        "created_at",
        AUDIT_SCOPE_COLUMN,
    ],
    primary_key: &["package_id", "course_id", "material_id"],
    audit_scope: Some(AUDIT_SCOPE_COLUMN),
    partial_unique: None,
};

pub static PACKAGE_COURSE_FEE: TableDescriptor = TableDescriptor {
    name: "package_course_fee",
    columns: &[
        "package_id",
        "course_id",
        "fee_id",
        "available_from",
        "created_at",
        AUDIT_SCOPE_COLUMN,
    ],
    primary_key: &["package_id", "course_id", "fee_id"],
    audit_scope: Some(AUDIT_SCOPE_COLUMN),
    partial_unique: None,
};

pub static PRODUCT_LOCATION: TableDescriptor = TableDescriptor {
    name: "product_location",
    columns: &["product_id", "location_id", "created_at", AUDIT_SCOPE_COLUMN],
    primary_key: &["product_id", "location_id"],
    audit_scope: Some(AUDIT_SCOPE_COLUMN),
    partial_unique: None,
};

/// Every table the ledger touches.
pub fn all_tables() -> [&'static TableDescriptor; 9] {
    [
        &STUDENT_PACKAGES,
        &STUDENT_PACKAGE_ORDER,
        &STUDENT_COURSE,
        &STUDENT_PACKAGE_ACCESS_PATH,
        &STUDENT_PACKAGE_LOG,
        &PACKAGE_COURSE,
        &PACKAGE_COURSE_MATERIAL,
        &PACKAGE_COURSE_FEE,
        &PRODUCT_LOCATION,
    ]
}

// =============================================================================
// Row mappings
// =============================================================================

impl Record for StudentPackage {
    fn descriptor() -> &'static TableDescriptor {
        &STUDENT_PACKAGES
    }

    fn to_row(&self) -> Row {
        let properties = to_json_value("properties", &self.properties).unwrap_or(SqlValue::Null);
        Row::new()
            .with("student_package_id", &self.student_package_id)
            .with("student_id", &self.student_id)
            .with("package_id", self.package_id.clone())
            .with("start_at", self.start_at)
            .with("end_at", self.end_at)
            .with("properties", properties)
            .with("is_active", self.is_active)
            .with("location_ids", self.location_ids.clone())
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
            .with("deleted_at", self.deleted_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            student_package_id: row.text("student_package_id")?,
            student_id: row.text("student_id")?,
            package_id: row.opt_text("package_id")?,
            start_at: row.opt_timestamp("start_at")?,
            end_at: row.opt_timestamp("end_at")?,
            properties: row.json_as("properties")?,
            is_active: row.boolean("is_active")?,
            location_ids: row.text_array("location_ids")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
            deleted_at: row.opt_timestamp("deleted_at")?,
        })
    }
}

impl Record for StudentPackageOrder {
    fn descriptor() -> &'static TableDescriptor {
        &STUDENT_PACKAGE_ORDER
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("student_package_order_id", &self.student_package_order_id)
            .with("student_package_id", &self.student_package_id)
            .with("user_id", &self.user_id)
            .with("order_id", &self.order_id)
            .with("course_id", &self.course_id)
            .with("start_at", self.start_at)
            .with("end_at", self.end_at)
            .with("student_package_object", self.student_package_object.clone())
            .with("is_current_student_package", self.is_current_student_package)
            .with(
                "from_student_package_order_id",
                self.from_student_package_order_id.clone(),
            )
            .with("executed_error", self.executed_error.clone())
            .with("is_executed_by_cronjob", self.is_executed_by_cronjob)
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
            .with("deleted_at", self.deleted_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            student_package_order_id: row.text("student_package_order_id")?,
            student_package_id: row.text("student_package_id")?,
            user_id: row.text("user_id")?,
            order_id: row.text("order_id")?,
            course_id: row.text("course_id")?,
            start_at: row.timestamp("start_at")?,
            end_at: row.timestamp("end_at")?,
            student_package_object: row.json("student_package_object")?,
            is_current_student_package: row.boolean("is_current_student_package")?,
            from_student_package_order_id: row.opt_text("from_student_package_order_id")?,
            executed_error: row.opt_text("executed_error")?,
            is_executed_by_cronjob: row.boolean("is_executed_by_cronjob")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
            deleted_at: row.opt_timestamp("deleted_at")?,
        })
    }
}

impl Record for StudentCourse {
    fn descriptor() -> &'static TableDescriptor {
        &STUDENT_COURSE
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("student_package_id", &self.student_package_id)
            .with("student_id", &self.student_id)
            .with("course_id", &self.course_id)
            .with("location_id", &self.location_id)
            .with("student_start_date", self.student_start_date)
            .with("student_end_date", self.student_end_date)
            .with("course_slot", self.course_slot)
            .with("course_slot_per_week", self.course_slot_per_week)
            .with("weight", self.weight)
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
            .with("deleted_at", self.deleted_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            student_package_id: row.text("student_package_id")?,
            student_id: row.text("student_id")?,
            course_id: row.text("course_id")?,
            location_id: row.text("location_id")?,
            student_start_date: row.timestamp("student_start_date")?,
            student_end_date: row.timestamp("student_end_date")?,
            course_slot: row.opt_int("course_slot")?,
            course_slot_per_week: row.opt_int("course_slot_per_week")?,
            weight: row.opt_int("weight")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
            deleted_at: row.opt_timestamp("deleted_at")?,
        })
    }
}

impl Record for StudentPackageAccessPath {
    fn descriptor() -> &'static TableDescriptor {
        &STUDENT_PACKAGE_ACCESS_PATH
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("student_package_id", &self.student_package_id)
            .with("student_id", &self.student_id)
            .with("course_id", &self.course_id)
            .with("location_id", &self.location_id)
            .with("access_path", self.access_path.clone())
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
            .with("deleted_at", self.deleted_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            student_package_id: row.text("student_package_id")?,
            student_id: row.text("student_id")?,
            course_id: row.text("course_id")?,
            location_id: row.text("location_id")?,
            access_path: row.opt_text("access_path")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
            deleted_at: row.opt_timestamp("deleted_at")?,
        })
    }
}

impl Record for StudentPackageLog {
    fn descriptor() -> &'static TableDescriptor {
        &STUDENT_PACKAGE_LOG
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("student_package_log_id", &self.student_package_log_id)
            .with("student_package_id", &self.student_package_id)
            .with("student_id", &self.student_id)
            .with("course_id", self.course_id.clone())
            .with("user_id", self.user_id.clone())
            .with("action", self.action.as_str())
            .with("flow", &self.flow)
            .with("student_package_object", self.student_package_object.clone())
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        let action = row.text("action")?;
        Ok(Self {
            student_package_log_id: row.text("student_package_log_id")?,
            student_package_id: row.text("student_package_id")?,
            student_id: row.text("student_id")?,
            course_id: row.opt_text("course_id")?,
            user_id: row.opt_text("user_id")?,
            action: PackageLogAction::parse(&action).ok_or(RowError::TypeMismatch {
                column: "action".to_string(),
                expected: "student package action",
            })?,
            flow: row.text("flow")?,
            student_package_object: row.json("student_package_object")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
        })
    }
}

impl Record for PackageCourse {
    fn descriptor() -> &'static TableDescriptor {
        &PACKAGE_COURSE
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("package_id", &self.package_id)
            .with("course_id", &self.course_id)
            .with("mandatory_flag", self.mandatory_flag)
            .with("course_weight", self.course_weight)
            .with("max_slots_per_course", self.max_slots_per_course)
            .with("created_at", self.created_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            package_id: row.text("package_id")?,
            course_id: row.text("course_id")?,
            mandatory_flag: row.boolean("mandatory_flag")?,
            course_weight: row.int("course_weight")?,
            max_slots_per_course: row.int("max_slots_per_course")?,
            created_at: row.timestamp("created_at")?,
        })
    }
}

impl Record for PackageCourseMaterial {
    fn descriptor() -> &'static TableDescriptor {
        &PACKAGE_COURSE_MATERIAL
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("package_id", &self.package_id)
            .with("course_id", &self.course_id)
            .with("material_id", &self.material_id)
            .with("available_from", self.available_from)
            .with("created_at", self.created_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            package_id: row.text("package_id")?,
            course_id: row.text("course_id")?,
            material_id: row.text("material_id")?,
            available_from: row.opt_timestamp("available_from")?,
            created_at: row.timestamp("created_at")?,
        })
    }
}

impl Record for PackageCourseFee {
    fn descriptor() -> &'static TableDescriptor {
        &PACKAGE_COURSE_FEE
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("package_id", &self.package_id)
            .with("course_id", &self.course_id)
            .with("fee_id", &self.fee_id)
            .with("available_from", self.available_from)
            .with("created_at", self.created_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            package_id: row.text("package_id")?,
            course_id: row.text("course_id")?,
            fee_id: row.text("fee_id")?,
            available_from: row.opt_timestamp("available_from")?,
            created_at: row.timestamp("created_at")?,
        })
    }
}

impl Record for ProductLocation {
    fn descriptor() -> &'static TableDescriptor {
        &PRODUCT_LOCATION
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("product_id", &self.product_id)
            .with("location_id", &self.location_id)
            .with("created_at", self.created_at)
    }

    fn from_row(row: &Row) -> Result<Self, RowError> {
        Ok(Self {
            product_id: row.text("product_id")?,
            location_id: row.text("location_id")?,
            created_at: row.timestamp("created_at")?,
        })
    }
}

/// Decode every row, failing on the first malformed one.
pub fn decode_all<R: Record>(rows: &[Row]) -> Result<Vec<R>, RowError> {
    rows.iter().map(R::from_row).collect()
}
