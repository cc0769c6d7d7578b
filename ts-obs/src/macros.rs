//! Macros for error handling.
//!
//! Provides convenience macros for creating and returning [`crate::error::ObsError`]
//! instances with reduced boilerplate.

/// Creates an [`crate::error::ObsError`] from error kind and description, with an
/// optional detail.
#[macro_export]
macro_rules! obs_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::ObsError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::ObsError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns an [`crate::error::ObsError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::obs_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::obs_error!($kind, $desc, $detail))
    };
}
