use common::Initializers;

/// Result of checking a pod's pending initializer list against our own
/// initializer name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerOutcome {
    /// Not this controller's turn: the list is absent, empty, or
    /// another initializer is at the front of the queue.
    NotOurs,
    /// Our marker was at the front; the payload is the initializer
    /// list with it removed. `None` means no initializers remain, so
    /// the field must be dropped from the object entirely.
    Claimed(Option<Initializers>),
}

/// Removes this controller's own initializer from the front of the
/// pending queue, preserving the order of the remainder.
///
/// Only the front entry is ever eligible: initializers act strictly in
/// queue order, so a mismatching front means another controller acts
/// first and we must not touch the object yet.
pub fn remove_self_from_pending(
    initializers: Option<&Initializers>,
    own_name: &str,
) -> MarkerOutcome {
    let pending = match initializers {
        Some(init) => &init.pending,
        None => return MarkerOutcome::NotOurs,
    };
    match pending.first() {
        Some(front) if front.name == own_name => {
            if pending.len() == 1 {
                MarkerOutcome::Claimed(None)
            } else {
                MarkerOutcome::Claimed(Some(Initializers {
                    pending: pending[1..].to_vec(),
                }))
            }
        }
        _ => MarkerOutcome::NotOurs,
    }
}
