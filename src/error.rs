/// Error type returned when building [`TimberOptions`](crate::timber::TimberOptions)
/// or a [`Timber`](crate::timber::Timber) handle from the environment.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Error type returned when installing the global `tracing` subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Error type returned by [`HttpDelivery`](crate::delivery::HttpDelivery).
#[cfg(feature = "http-delivery")]
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("request to Timber failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Timber rejected batch with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Describe a panic payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[test]
    fn panic_payloads_are_described() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(text.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
