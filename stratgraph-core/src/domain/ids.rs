use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a string-backed identifier newtype.
///
/// Ids are opaque strings on the wire; cross-node references always go
/// through these ids, never through object identity.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh random identifier (UUID v4).
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Graph node id.
    NodeId
);
string_id!(
    /// Control-flow edge id.
    EdgeId
);
string_id!(
    /// Virtual position id (the record id, not the user-facing `vpi`).
    PositionId
);
string_id!(
    /// Snapshot variable, trailing variable, or assignment id.
    VariableId
);
string_id!(
    /// Strategy-wide global variable id.
    GlobalVariableId
);
string_id!(
    /// Condition leaf or group id.
    ConditionId
);
string_id!(
    /// Strategy document id.
    StrategyId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = NodeId::new("entry-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"entry-1\"");
        let back: NodeId = serde_json::from_str("\"entry-1\"").unwrap();
        assert_eq!(back, id);
    }
}
