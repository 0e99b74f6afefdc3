//! Structured logging helpers.
//!
//! Every engine log line carries an `engine` field so per-engine output can
//! be filtered by a log shipper.

/// Log with a standard `engine` field.
#[macro_export]
macro_rules! log_event {
    (info, $engine:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            engine = $engine,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $engine:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            engine = $engine,
            $($($field)*,)?
            $msg
        )
    };

    (error, $engine:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            engine = $engine,
            $($($field)*,)?
            $msg
        )
    };

    (debug, $engine:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            engine = $engine,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a header-related event with height and hash fields.
#[macro_export]
macro_rules! log_header_event {
    ($level:ident, $engine:expr, $msg:expr, $height:expr, $hash:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            engine = $engine,
            height = $height,
            hash = %$hash,
            $($($field)*,)?
            $msg
        )
    };
}
