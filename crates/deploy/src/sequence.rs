//! Deployment steps and the ordered sequence they form.
//!
//! A step references an earlier step only through [`ConstructorArg::AddressOf`],
//! which is replaced by the literal confirmed address before the step is
//! submitted. Declaration order is therefore the dependency order.

use std::collections::HashSet;

use alloy_core::primitives::{Address, Bytes, I256, U256};
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::{DeployError, DeployedContract};

/// The NFT-style item registry deployed first by the built-in sequence.
pub const ITEM_CONTRACT: &str = "JobReadyNFT";

/// The contract constructed with the item registry's address.
pub const JOB_CONTRACT: &str = "Job";

/// A concrete constructor argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "lowercase")]
pub enum ArgValue {
    Address(Address),
    #[serde(deserialize_with = "uint_from_number_or_string")]
    Uint(U256),
    #[serde(deserialize_with = "int_from_number_or_string")]
    Int(I256),
    Bool(bool),
    String(String),
    Bytes(Bytes),
}

impl ArgValue {
    /// Short name of the value's kind, used in mismatch messages.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

/// A config integer: a bare number, or a decimal or `0x` string for wide values.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawInteger {
    Unsigned(u64),
    Signed(i64),
    Text(String),
}

impl RawInteger {
    fn text(self) -> String {
        match self {
            Self::Unsigned(value) => value.to_string(),
            Self::Signed(value) => value.to_string(),
            Self::Text(text) => text,
        }
    }
}

fn uint_from_number_or_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<U256, D::Error> {
    let text = RawInteger::deserialize(deserializer)?.text();
    text.trim()
        .parse::<U256>()
        .map_err(|e| de::Error::custom(format!("invalid uint '{text}': {e}")))
}

fn int_from_number_or_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<I256, D::Error> {
    let text = RawInteger::deserialize(deserializer)?.text();
    text.trim()
        .parse::<I256>()
        .map_err(|e| de::Error::custom(format!("invalid int '{text}': {e}")))
}

impl From<Address> for ArgValue {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

/// A constructor argument as declared in a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructorArg {
    /// The confirmed address of an earlier step, by artifact name.
    AddressOf(String),
    #[serde(untagged)]
    Value(ArgValue),
}

/// One artifact-deploy-and-confirm operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployStep {
    /// Name of the compiled artifact. Also identifies the step.
    pub artifact: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ConstructorArg>,
}

impl DeployStep {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.args.push(ConstructorArg::Value(value.into()));
        self
    }

    pub fn address_of(mut self, step: impl Into<String>) -> Self {
        self.args.push(ConstructorArg::AddressOf(step.into()));
        self
    }

    /// Substitute the addresses of already confirmed steps into the arguments.
    pub fn resolve_args(
        &self,
        deployed: &[DeployedContract],
    ) -> Result<Vec<ArgValue>, DeployError> {
        self.args
            .iter()
            .map(|arg| match arg {
                ConstructorArg::Value(value) => Ok(value.clone()),
                ConstructorArg::AddressOf(name) => deployed
                    .iter()
                    .find(|contract| &contract.name == name)
                    .map(|contract| ArgValue::Address(contract.address))
                    .ok_or_else(|| {
                        DeployError::Configuration(format!(
                            "step {} needs the address of {name}, which is not deployed yet",
                            self.artifact
                        ))
                    }),
            })
            .collect()
    }
}

/// An ordered list of steps where a step may only reference earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSequence {
    steps: Vec<DeployStep>,
}

impl DeploymentSequence {
    /// Validate and build a sequence.
    ///
    /// Fails when the sequence is empty, when two steps share an artifact name,
    /// or when a step references a step that is not declared before it.
    pub fn new(steps: Vec<DeployStep>) -> Result<Self, DeployError> {
        if steps.is_empty() {
            return Err(DeployError::Configuration(
                "deployment sequence is empty".to_string(),
            ));
        }

        let mut declared = HashSet::new();
        for step in &steps {
            for arg in &step.args {
                if let ConstructorArg::AddressOf(name) = arg {
                    if !declared.contains(name.as_str()) {
                        return Err(DeployError::Configuration(format!(
                            "step {} references {name}, which is not deployed by an earlier step",
                            step.artifact
                        )));
                    }
                }
            }

            if !declared.insert(step.artifact.as_str()) {
                return Err(DeployError::Configuration(format!(
                    "artifact {} appears twice in the deployment sequence",
                    step.artifact
                )));
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[DeployStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for DeploymentSequence {
    /// The item registry, then the job contract wired to its address.
    fn default() -> Self {
        Self {
            steps: vec![
                DeployStep::new(ITEM_CONTRACT),
                DeployStep::new(JOB_CONTRACT).address_of(ITEM_CONTRACT),
            ],
        }
    }
}
