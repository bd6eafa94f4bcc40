//! Structured logging helpers.
//!
//! Every cabinet log line carries a `subsystem` field plus the identity of
//! the entity it concerns (`transaction_id`, `bin_id`, `hardware_id`), so
//! that log shippers can index on them.

/// Log with a `subsystem` field.
#[macro_export]
macro_rules! log_event {
    ($level:ident, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = $subsystem,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a transaction-scoped event.
#[macro_export]
macro_rules! log_tx_event {
    ($level:ident, $transaction_id:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = "transactions",
            transaction_id = %$transaction_id,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a compartment-scoped event.
#[macro_export]
macro_rules! log_bin_event {
    ($level:ident, $subsystem:expr, $bin_id:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = $subsystem,
            bin_id = %$bin_id,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand_without_subscriber() {
        let tx = "tx-1";
        crate::log_event!(info, "loadcell", "sample ignored", hardware_id = 4);
        crate::log_tx_event!(warn, tx, "open attempt failed", attempt = 2);
        crate::log_bin_event!(debug, "lock-control", "bin-9", "bin secured");
    }
}
