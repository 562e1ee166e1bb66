use thiserror::Error;

/// Configuration errors raised while building the node registry.
///
/// All of these are fatal at startup: a process holding an invalid graph must
/// not serve traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate data-flow node id '{0}'")]
    DuplicateDataFlowNode(String),

    #[error("duplicate decision node id '{0}'")]
    DuplicateDecisionNode(String),

    #[error("decision node '{node}' references unknown node '{target}' via {field}")]
    DanglingReference {
        node: String,
        field: &'static str,
        target: String,
    },

    #[error("decision node '{node}' has action target '{target}' that resolves to no node")]
    UnresolvedActionTarget { node: String, target: String },

    #[error("no root decision node was designated")]
    MissingRoot,

    #[error("root '{0}' is not a registered decision node")]
    UnknownRoot(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_reference_display() {
        let err = RegistryError::DanglingReference {
            node: "check".to_string(),
            field: "true_next",
            target: "ghost".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "decision node 'check' references unknown node 'ghost' via true_next"
        );
    }

    #[test]
    fn test_duplicate_display() {
        let err = RegistryError::DuplicateDataFlowNode("input-analysis".to_string());
        assert!(err.to_string().contains("input-analysis"));
    }
}
