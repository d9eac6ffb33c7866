use serde::{Deserialize, Serialize};

/// Identifier transitions must carry to be validated by this contract.
pub const DEFAULT_CONTRACT_ID: &str = "insure.policy.v1";

/// Contract parameters, passed to the validator at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub contract_id: String,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            contract_id: DEFAULT_CONTRACT_ID.to_string(),
        }
    }
}
