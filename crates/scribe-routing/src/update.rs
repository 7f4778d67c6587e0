//! Partial routing updates with explicit field-set tracking

use serde_json::Value;

/// One optional field in a partial update
///
/// Distinguishes "leave the stored value alone" from "overwrite with
/// null", a distinction a plain `Option` cannot carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    /// Leave the stored value unchanged
    #[default]
    Keep,
    /// Overwrite the stored value with null
    Clear,
    /// Overwrite the stored value
    Set(T),
}

impl<T> FieldUpdate<T> {
    /// Whether this field participates in the update at all
    pub const fn is_update(&self) -> bool {
        !matches!(self, Self::Keep)
    }

    /// The value to write, `None` for both `Keep` and `Clear`
    pub const fn as_option(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Keep | Self::Clear => None,
        }
    }

    /// Build from the wire convention used by the admin API: an absent
    /// field keeps, an explicit null clears, a value sets
    pub fn from_wire(present: bool, value: Option<T>) -> Self {
        match (present, value) {
            (false, _) => Self::Keep,
            (true, None) => Self::Clear,
            (true, Some(value)) => Self::Set(value),
        }
    }
}

/// Partial update for a (user, task) routing row
#[derive(Debug, Clone, Default)]
pub struct RoutingUpdate {
    pub primary_model_id: FieldUpdate<i64>,
    pub fallback_model_id: FieldUpdate<i64>,
    pub credential_id: FieldUpdate<i64>,
    pub config_override: FieldUpdate<Value>,
    pub prompt_template: FieldUpdate<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keeps_everything() {
        let update = RoutingUpdate::default();
        assert!(!update.primary_model_id.is_update());
        assert!(!update.config_override.is_update());
        assert!(!update.prompt_template.is_update());
    }

    #[test]
    fn clear_is_an_update_without_a_value() {
        let field: FieldUpdate<i64> = FieldUpdate::Clear;
        assert!(field.is_update());
        assert_eq!(field.as_option(), None);
    }

    #[test]
    fn set_carries_its_value() {
        let field = FieldUpdate::Set(42_i64);
        assert!(field.is_update());
        assert_eq!(field.as_option(), Some(&42));
    }

    #[test]
    fn wire_convention_round_trips() {
        assert_eq!(FieldUpdate::<i64>::from_wire(false, None), FieldUpdate::Keep);
        assert_eq!(FieldUpdate::<i64>::from_wire(true, None), FieldUpdate::Clear);
        assert_eq!(FieldUpdate::from_wire(true, Some(7_i64)), FieldUpdate::Set(7));
    }
}
