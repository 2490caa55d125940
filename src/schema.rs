//! Database schema definitions
//!
//! Table names and the column lists selected by the data access layer. Rows
//! are mapped by column name, so every `SELECT` goes through these lists.

/// Salons table schema
pub mod salons {
    /// Table name
    pub const TABLE: &str = "salons";
    /// Selected columns
    pub const COLUMNS: &str = "id, name, address, phone, email, created_at";
}

/// Profiles table schema
pub mod profiles {
    /// Table name
    pub const TABLE: &str = "profiles";
    /// Selected columns
    pub const COLUMNS: &str = "id, email, display_name, role, salon_id, created_at";
    /// Bearer token column
    pub const API_TOKEN: &str = "api_token";
}

/// Services table schema
pub mod services {
    /// Table name
    pub const TABLE: &str = "services";
    /// Selected columns
    pub const COLUMNS: &str = "id, salon_id, name, duration_minutes, price, is_active";
}

/// Appointments table schema
pub mod appointments {
    /// Table name
    pub const TABLE: &str = "appointments";
    /// Selected columns
    pub const COLUMNS: &str = "id, salon_id, customer_id, staff_id, start_time, end_time, \
        duration_minutes, status, confirmation_code, service_count, subtotal, tax_amount, \
        discount_amount, tip_amount, total_amount, payment_status, payment_method, \
        transaction_id, paid_at, notes, internal_notes, booking_source, cancelled_at, \
        cancelled_by, cancellation_reason, checked_in_at, checked_in_by, completed_at, \
        completed_by, marked_no_show_at, marked_no_show_by, created_at, updated_at";
    /// Start timestamp column
    pub const START_TIME: &str = "start_time";
    /// Status column
    pub const STATUS: &str = "status";
}

/// Appointment line items table schema
pub mod appointment_services {
    /// Table name
    pub const TABLE: &str = "appointment_services";
    /// Selected columns
    pub const COLUMNS: &str = "id, appointment_id, service_id, staff_id, service_name, \
        duration_minutes, unit_price, quantity, discount_percentage, subtotal, service_order, \
        start_time, end_time, is_completed";
}

/// Waiting list table schema
pub mod waiting_list {
    /// Table name
    pub const TABLE: &str = "waiting_list";
    /// Selected columns
    pub const COLUMNS: &str = "id, salon_id, customer_id, service_ids, preferred_staff_id, \
        preferred_date, preferred_time, notes, notified, notified_at, created_at";
}

/// Staff profiles table schema
pub mod staff_profiles {
    /// Table name
    pub const TABLE: &str = "staff_profiles";
    /// Selected columns
    pub const COLUMNS: &str = "id, salon_id, user_id, display_name, first_name, last_name, \
        email, phone, title, bio, experience_years, employment_type, commission_rate, \
        hourly_rate, is_active, is_bookable, is_featured, hired_at, terminated_at, created_at, \
        updated_at";
}

/// Staff weekly schedule table schema
pub mod staff_schedules {
    /// Table name
    pub const TABLE: &str = "staff_schedules";
    /// Selected columns
    pub const COLUMNS: &str =
        "id, staff_id, day_of_week, start_time, end_time, break_start, break_end, is_working";
}

/// Staff to service assignment table schema
pub mod staff_services {
    /// Table name
    pub const TABLE: &str = "staff_services";
}

/// Blocked times table schema
pub mod blocked_times {
    /// Table name
    pub const TABLE: &str = "blocked_times";
    /// Selected columns
    pub const COLUMNS: &str = "id, staff_id, start_time, end_time, reason, created_at";
}

/// Loyalty programs table schema
pub mod loyalty_programs {
    /// Table name
    pub const TABLE: &str = "loyalty_programs";
    /// Selected columns
    pub const COLUMNS: &str = "id, salon_id, name, description, points_per_dollar, \
        points_per_visit, is_active, created_at, updated_at";
}

/// Loyalty tiers table schema
pub mod loyalty_tiers {
    /// Table name
    pub const TABLE: &str = "loyalty_tiers";
    /// Selected columns
    pub const COLUMNS: &str =
        "id, program_id, name, min_points, discount_percentage, benefits, created_at";
}

/// Customer loyalty membership table schema
pub mod customer_loyalty {
    /// Table name
    pub const TABLE: &str = "customer_loyalty";
    /// Selected columns
    pub const COLUMNS: &str = "id, customer_id, program_id, points_balance, lifetime_points, \
        visits_count, tier_level, tier_achieved_at, enrolled_at, last_activity_at, updated_at";
}

/// Loyalty ledger table schema
pub mod loyalty_transactions {
    /// Table name
    pub const TABLE: &str = "loyalty_transactions";
    /// Selected columns
    pub const COLUMNS: &str = "id, customer_loyalty_id, appointment_id, transaction_type, \
        points_amount, balance_after, description, reference_id, reference_type, created_by, \
        created_at";
}
