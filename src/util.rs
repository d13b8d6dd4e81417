use chrono::Utc;

const FLOAT_TO_INT_MAX: f64 = 9007199254740991_f64;

/// Converting float to int has undefined behaviour for huge floats: https://stackoverflow.com/a/41139453.
/// To avoid this, refuse to convert floats with magnitude greater than 2**53 - 1, after which 64-bit floats no longer
/// retain integer precision.
pub(crate) fn f64_to_i64_safe(f: f64) -> Option<i64> {
    if f.abs() <= FLOAT_TO_INT_MAX {
        Some(f as i64)
    } else {
        None
    }
}

/// Current wall-clock time in whole seconds since the Unix epoch.
pub(crate) fn now_epoch_secs() -> i64 {
    Utc::now().timestamp()
}

/// Current wall-clock time in fractional seconds since the Unix epoch.
pub(crate) fn now_epoch_secs_f64() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
