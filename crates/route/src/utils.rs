//! Internal helper macros.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// Like `assert!`, but for validation that reports an error instead of panicking.
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
