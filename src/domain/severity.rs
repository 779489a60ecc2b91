//! Reduces a set of per-system statuses to the single most severe one.

use super::status::SystemStatus;

/// Most severe status in `statuses`, or `None` when there are none.
pub fn try_resolve<I>(statuses: I) -> Option<SystemStatus>
where
    I: IntoIterator<Item = SystemStatus>,
{
    statuses.into_iter().max_by_key(|s| s.severity())
}

/// Most severe status in `statuses`.
///
/// Empty input resolves to `Online`. Call sites that want a different empty
/// default use [`try_resolve`].
pub fn resolve<I>(statuses: I) -> SystemStatus
where
    I: IntoIterator<Item = SystemStatus>,
{
    try_resolve(statuses).unwrap_or(SystemStatus::Online)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use SystemStatus::*;

    #[test]
    fn examples() {
        assert_eq!(resolve([Online, Warning, Online]), Warning);
        assert_eq!(resolve([Offline, Error]), Offline);
        assert_eq!(resolve([Error, Warning, Online]), Error);
        assert_eq!(resolve([Online]), Online);
    }

    #[test]
    fn empty_defaults_to_online() {
        assert_eq!(resolve(Vec::<SystemStatus>::new()), Online);
        assert_eq!(try_resolve(Vec::<SystemStatus>::new()), None);
    }

    fn any_status() -> impl Strategy<Value = SystemStatus> {
        prop_oneof![Just(Online), Just(Warning), Just(Error), Just(Offline)]
    }

    proptest! {
        #[test]
        fn result_is_highest_present(statuses in prop::collection::vec(any_status(), 1..32)) {
            let resolved = resolve(statuses.iter().copied());
            prop_assert!(statuses.contains(&resolved));
            for s in &statuses {
                prop_assert!(s.severity() <= resolved.severity());
            }
        }

        #[test]
        fn independent_of_order(mut statuses in prop::collection::vec(any_status(), 1..32)) {
            let forward = resolve(statuses.iter().copied());
            statuses.reverse();
            prop_assert_eq!(forward, resolve(statuses.iter().copied()));
            statuses.sort();
            prop_assert_eq!(forward, resolve(statuses.iter().copied()));
        }
    }
}
