//! Ordered field-equality policies shared by the reconcilers and their tests

/// A named field comparison
pub type FieldCheck<T> = (&'static str, fn(&T, &T) -> bool);

/// First field (in policy order) on which `current` and `desired` differ
pub fn first_difference<T>(
    policy: &[FieldCheck<T>],
    current: &T,
    desired: &T,
) -> Option<&'static str> {
    policy
        .iter()
        .find(|(_, equal)| !equal(current, desired))
        .map(|(field, _)| *field)
}

/// Whether `current` and `desired` agree on every field of the policy
pub fn all_equal<T>(policy: &[FieldCheck<T>], current: &T, desired: &T) -> bool {
    first_difference(policy, current, desired).is_none()
}
