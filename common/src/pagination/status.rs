/// The only status a page is accepted with.
pub const OK: u16 = 200;
/// Returned once the revision or continue token of a listing has expired.
pub const GONE: u16 = 410;
/// Returned when a write races another writer.
pub const CONFLICT: u16 = 409;

/// Outcome of a page request as far as its status code goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    /// 200.
    Ok,
    /// 410: the server no longer holds the state the listing is fenced on.
    Gone,
    /// Any other status.
    Failed(u16),
}

/// Classify a page response status.
pub fn classify(status: u16) -> StatusClass {
    match status {
        OK => StatusClass::Ok,
        GONE => StatusClass::Gone,
        other => StatusClass::Failed(other),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gone_is_not_a_generic_failure() {
        assert_eq!(classify(200), StatusClass::Ok);
        assert_eq!(classify(410), StatusClass::Gone);
        assert_eq!(classify(500), StatusClass::Failed(500));
        assert_ne!(classify(410), classify(500));
        // Other 2xx statuses are not pages.
        assert_eq!(classify(204), StatusClass::Failed(204));
    }
}
