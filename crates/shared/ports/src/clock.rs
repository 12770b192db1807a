use beacon_core::Timestamp;

/// Port for the time source behind cache expiry and snapshot timestamps
///
/// Update timestamps from the backend win over this clock; it only stamps
/// data the client records itself and measures cached ages.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Shown in logs when the client starts
    fn name(&self) -> &str {
        "Clock"
    }
}
