//! Macros for logging and debug assertions. [`hb_dbg!()`], [`hb_trace!()`], and the
//! `hb_debug_assert_*!()` macros are compiled out during release builds, so they can be used for
//! asserting additional invariants in debug builds. Check the [`hb_log!()`] macro for more
//! information on the logger. None of the logging functions are realtime-safe, so avoid using them
//! in release builds from any function that may be called from an audio thread.

// NOTE: `#[macro_export]` exports these macros from the crate root. They're also re-exported from
//       this module so `use hostbridge::debug::*;` pulls in all of them at once.

/// Write something to the logger. This defaults to STDERR unless the user is running Windows and a
/// debugger has been attached, in which case `OutputDebugString()` will be used instead.
///
/// The logger's behavior can be controlled by setting the `HOSTBRIDGE_LOG` environment variable
/// to:
///
/// - `stderr`, in which case the log output always gets written to STDERR.
/// - `windbg` (only on Windows), in which case the output always gets logged using
///   `OutputDebugString()`.
/// - A file path, in which case the output gets appended to the end of that file which will be
///   created if necessary.
#[macro_export]
macro_rules! hb_log {
    ($($args:tt)*) => (
        $crate::log::info!($($args)*)
    );
}
#[doc(inline)]
pub use hb_log;

/// Similar to `hb_log!()`, but for warnings.
#[macro_export]
macro_rules! hb_warn {
    ($($args:tt)*) => (
        $crate::log::warn!($($args)*)
    );
}
#[doc(inline)]
pub use hb_warn;

/// Similar to `hb_log!()`, but for fatal errors like a host that's missing a required feature.
#[macro_export]
macro_rules! hb_error {
    ($($args:tt)*) => (
        $crate::log::error!($($args)*)
    );
}
#[doc(inline)]
pub use hb_error;

/// The same as `hb_log!()`, but with source and thread information. Like the
/// `hb_debug_assert*!()` macros, this is only shown when compiling in debug mode.
#[macro_export]
macro_rules! hb_trace {
    ($($args:tt)*) => (
        $crate::util::permit_alloc(|| $crate::log::trace!($($args)*))
    );
}
#[doc(inline)]
pub use hb_trace;

/// Analogous to the `dbg!()` macro, but going through the same logger as the other `hb_*!()`
/// macros. The value is only printed in debug builds, but it's always returned.
#[macro_export]
macro_rules! hb_dbg {
    () => {
        $crate::util::permit_alloc(|| $crate::log::debug!(""));
    };
    ($val:expr $(,)?) => {
        // Match here acts as a let-binding, the same as in `std::dbg!()`
        match $val {
            tmp => {
                $crate::util::permit_alloc(|| $crate::log::debug!("{} = {:#?}", stringify!($val), &tmp));
                tmp
            }
        }
    };
    ($($val:expr),+ $(,)?) => { ($($crate::hb_dbg!($val)),+,) };
}
#[doc(inline)]
pub use hb_dbg;

/// A `debug_assert!()` analogue that logs a warning with the failed condition instead of
/// panicking. During tests this is upgraded to a regular panicking `debug_assert!()`, so contract
/// violations in the bridge still fail the test suite.
#[macro_export]
macro_rules! hb_debug_assert {
    ($cond:expr $(,)?) => (
        #[allow(clippy::neg_cmp_op_on_partial_ord)]
        if cfg!(test) {
           debug_assert!($cond);
        } else if cfg!(debug_assertions) && !$cond {
            $crate::util::permit_alloc(|| $crate::log::warn!(concat!("Debug assertion failed: ", stringify!($cond))));
        }
    );
    ($cond:expr, $format:expr $(, $($args:tt)*)?) => (
        #[allow(clippy::neg_cmp_op_on_partial_ord)]
        if cfg!(test) {
           debug_assert!($cond, $format, $($($args)*)?);
        } else if cfg!(debug_assertions) && !$cond {
            $crate::util::permit_alloc(|| $crate::log::warn!(concat!("Debug assertion failed: ", stringify!($cond), ", ", $format), $($($args)*)?));
        }
    );
}
#[doc(inline)]
pub use hb_debug_assert;

/// An unconditional debug assertion failure, for when the condition has already been checked
/// elsewhere. See [`hb_debug_assert!()`] for more information.
#[macro_export]
macro_rules! hb_debug_assert_failure {
    () => (
        if cfg!(test) {
           debug_assert!(false, "Debug assertion failed");
        } else if cfg!(debug_assertions) {
            $crate::util::permit_alloc(|| $crate::log::warn!("Debug assertion failed"));
        }
    );
    ($format:expr $(, $($args:tt)*)?) => (
        if cfg!(test) {
           debug_assert!(false, concat!("Debug assertion failed: ", $format), $($($args)*)?);
        } else if cfg!(debug_assertions) {
            $crate::util::permit_alloc(|| $crate::log::warn!(concat!("Debug assertion failed: ", $format), $($($args)*)?));
        }
    );
}
#[doc(inline)]
pub use hb_debug_assert_failure;

/// A `debug_assert_eq!()` analogue. See [`hb_debug_assert!()`] for more information.
#[macro_export]
macro_rules! hb_debug_assert_eq {
    ($left:expr, $right:expr $(,)?) => (
        if cfg!(test) {
           debug_assert_eq!($left, $right);
        } else if cfg!(debug_assertions) && $left != $right {
            $crate::util::permit_alloc(|| $crate::log::warn!(concat!("Debug assertion failed: ", stringify!($left), " != ", stringify!($right))));
        }
    );
    ($left:expr, $right:expr, $format:expr $(, $($args:tt)*)?) => (
        if cfg!(test) {
           debug_assert_eq!($left, $right, $format, $($($args)*)?);
        } else if cfg!(debug_assertions) && $left != $right {
            $crate::util::permit_alloc(|| $crate::log::warn!(concat!("Debug assertion failed: ", stringify!($left), " != ", stringify!($right), ", ", $format), $($($args)*)?));
        }
    );
}
#[doc(inline)]
pub use hb_debug_assert_eq;

/// A `debug_assert_ne!()` analogue. See [`hb_debug_assert!()`] for more information.
#[macro_export]
macro_rules! hb_debug_assert_ne {
    ($left:expr, $right:expr $(,)?) => (
        if cfg!(test) {
           debug_assert_ne!($left, $right);
        } else if cfg!(debug_assertions) && $left == $right {
            $crate::util::permit_alloc(|| $crate::log::warn!(concat!("Debug assertion failed: ", stringify!($left), " == ", stringify!($right))));
        }
    );
    ($left:expr, $right:expr, $format:expr $(, $($args:tt)*)?) => (
        if cfg!(test) {
           debug_assert_ne!($left, $right, $format, $($($args)*)?);
        } else if cfg!(debug_assertions) && $left == $right {
            $crate::util::permit_alloc(|| $crate::log::warn!(concat!("Debug assertion failed: ", stringify!($left), " == ", stringify!($right), ", ", $format), $($($args)*)?));
        }
    );
}
#[doc(inline)]
pub use hb_debug_assert_ne;
