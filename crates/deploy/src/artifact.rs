//! Compiled contract artifacts and where to find them.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::JsonAbi,
    primitives::{B256, Bytes, I256, U256},
};
use serde::Deserialize;

use crate::{ArgValue, DeployError};

/// A compiled contract: interface plus creation bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractArtifact {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Number of arguments the constructor takes.
    pub fn constructor_arity(&self) -> usize {
        self.abi
            .constructor()
            .map(|constructor| constructor.inputs.len())
            .unwrap_or(0)
    }

    /// Creation code followed by the ABI-encoded constructor arguments.
    ///
    /// Fails with [`DeployError::ArgumentMismatch`] when the arguments do not
    /// match the constructor's arity or parameter types.
    pub fn deploy_code(&self, args: &[ArgValue]) -> Result<Bytes, DeployError> {
        let mismatch = |reason: String| DeployError::ArgumentMismatch {
            artifact: self.name.clone(),
            reason,
        };

        let params = self
            .abi
            .constructor()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        if params.len() != args.len() {
            return Err(mismatch(format!(
                "expected {} constructor argument(s), got {}",
                params.len(),
                args.len()
            )));
        }

        let values = params
            .iter()
            .zip(args)
            .enumerate()
            .map(|(index, (param, arg))| {
                let ty: DynSolType = param.resolve().map_err(|e| {
                    mismatch(format!("unsupported parameter type {}: {e}", param.ty))
                })?;
                coerce(&ty, arg).ok_or_else(|| {
                    mismatch(format!(
                        "argument {index} ({}) expects {}, got {}",
                        param.name,
                        param.ty,
                        arg.kind()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut code = self.bytecode.to_vec();
        if !values.is_empty() {
            code.extend(DynSolValue::Tuple(values).abi_encode_params());
        }

        Ok(code.into())
    }
}

fn coerce(ty: &DynSolType, arg: &ArgValue) -> Option<DynSolValue> {
    match (ty, arg) {
        (DynSolType::Address, ArgValue::Address(address)) => Some(DynSolValue::Address(*address)),
        (DynSolType::Uint(bits), ArgValue::Uint(value)) if value.bit_len() <= *bits => {
            Some(DynSolValue::Uint(*value, *bits))
        }
        (DynSolType::Int(bits), ArgValue::Int(value)) if fits_signed(value, *bits) => {
            Some(DynSolValue::Int(*value, *bits))
        }
        (DynSolType::Bool, ArgValue::Bool(value)) => Some(DynSolValue::Bool(*value)),
        (DynSolType::String, ArgValue::String(value)) => Some(DynSolValue::String(value.clone())),
        (DynSolType::Bytes, ArgValue::Bytes(value)) => Some(DynSolValue::Bytes(value.to_vec())),
        (DynSolType::FixedBytes(size), ArgValue::Bytes(value)) if value.len() == *size => Some(
            DynSolValue::FixedBytes(B256::right_padding_from(value), *size),
        ),
        _ => None,
    }
}

/// Whether `value` is representable as a two's complement integer of `bits` bits.
fn fits_signed(value: &I256, bits: usize) -> bool {
    if bits >= 256 {
        return true;
    }

    let limit = U256::from(1) << (bits - 1);
    let magnitude = value.unsigned_abs();
    if value.is_negative() {
        magnitude <= limit
    } else {
        magnitude < limit
    }
}

/// Source of compiled artifacts, looked up by contract name.
pub trait ArtifactSource: Send + Sync {
    fn artifact(&self, name: &str) -> Result<ContractArtifact, DeployError>;
}

/// Hardhat artifact file layout (only the fields used here).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: String,
    abi: JsonAbi,
    bytecode: Bytes,
}

/// Artifacts read from a Hardhat `artifacts/` directory.
///
/// `<root>/contracts/Foo.sol/Foo.json` is found for the name `Foo`. Debug files
/// (`*.dbg.json`) and the `build-info` directory are ignored.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find(&self, dir: &Path, file_name: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(dir).ok()?;

        let mut subdirs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if entry.file_name() != "build-info" {
                    subdirs.push(path);
                }
            } else if entry.file_name() == file_name {
                return Some(path);
            }
        }

        subdirs.sort();
        subdirs
            .iter()
            .find_map(|subdir| self.find(subdir, file_name))
    }
}

impl ArtifactSource for ArtifactDir {
    fn artifact(&self, name: &str) -> Result<ContractArtifact, DeployError> {
        let path = self.find(&self.root, &format!("{name}.json")).ok_or_else(|| {
            DeployError::ArtifactNotFound(format!(
                "{name} (searched {})",
                self.root.display()
            ))
        })?;

        let content = std::fs::read_to_string(&path).map_err(|e| {
            DeployError::ArtifactNotFound(format!("{name}: failed to read {}: {e}", path.display()))
        })?;
        let artifact: HardhatArtifact = serde_json::from_str(&content).map_err(|e| {
            DeployError::ArtifactNotFound(format!(
                "{name}: {} is not a valid artifact: {e}",
                path.display()
            ))
        })?;

        if artifact.bytecode.is_empty() {
            return Err(DeployError::ArtifactNotFound(format!(
                "{name}: artifact has no creation bytecode (abstract contract or interface?)"
            )));
        }

        tracing::debug!(artifact = name, path = %path.display(), "Artifact loaded");

        Ok(ContractArtifact {
            name: artifact.contract_name,
            abi: artifact.abi,
            bytecode: artifact.bytecode,
        })
    }
}

/// Artifacts held in memory, for tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifacts {
    artifacts: HashMap<String, ContractArtifact>,
}

impl InMemoryArtifacts {
    pub fn with(mut self, artifact: ContractArtifact) -> Self {
        self.artifacts.insert(artifact.name.clone(), artifact);
        self
    }
}

impl ArtifactSource for InMemoryArtifacts {
    fn artifact(&self, name: &str) -> Result<ContractArtifact, DeployError> {
        self.artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::ArtifactNotFound(name.to_string()))
    }
}
