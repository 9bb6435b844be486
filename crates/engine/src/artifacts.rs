//! Contract artifacts: compiled ABI and bytecode.
//!
//! The compiler itself is an external collaborator; the engine only consumes
//! its output. [`FileArtifactSource`] reads the common Hardhat artifact shape
//! (`{"abi": [...], "bytecode": "0x..."}`), ignoring the many fields it does
//! not need.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

/// One entry of a Solidity JSON ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEntry {
    /// `"function"`, `"event"`, `"constructor"`, ...
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

/// A named, typed ABI parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub indexed: bool,
}

/// Compiled artifact for one contract.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub contract_name: String,
    pub abi: Vec<AbiEntry>,
    pub bytecode: Bytes,
}

impl Artifact {
    /// Find a function entry by name.
    pub fn function(&self, name: &str) -> Option<&AbiEntry> {
        self.abi
            .iter()
            .find(|e| e.kind == "function" && e.name.as_deref() == Some(name))
    }

    /// Find an event entry by name.
    pub fn event(&self, name: &str) -> Option<&AbiEntry> {
        self.abi
            .iter()
            .find(|e| e.kind == "event" && e.name.as_deref() == Some(name))
    }

    /// The constructor entry, if the contract declares one.
    pub fn constructor(&self) -> Option<&AbiEntry> {
        self.abi.iter().find(|e| e.kind == "constructor")
    }
}

/// Source of compiled artifacts, resolved by contract name.
pub trait ArtifactSource {
    fn load(&self, contract_name: &str) -> Result<Artifact, ArtifactError>;
}

/// On-disk artifact file, Hardhat shape.
#[derive(Debug, Deserialize)]
struct ArtifactFile {
    abi: Vec<AbiEntry>,
    bytecode: String,
}

/// Reads `<dir>/<ContractName>.json` artifacts.
#[derive(Debug, Clone)]
pub struct FileArtifactSource {
    dir: PathBuf,
}

impl FileArtifactSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSource for FileArtifactSource {
    fn load(&self, contract_name: &str) -> Result<Artifact, ArtifactError> {
        let path = self.dir.join(format!("{contract_name}.json"));
        if !path.exists() {
            return Err(ArtifactError::ArtifactNotFound {
                contract: contract_name.to_string(),
                path,
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            contract: contract_name.to_string(),
            source,
        })?;
        let parsed: ArtifactFile =
            serde_json::from_str(&content).map_err(|e| ArtifactError::InvalidArtifact {
                contract: contract_name.to_string(),
                reason: e.to_string(),
            })?;

        let bytecode = hex::decode(parsed.bytecode.trim_start_matches("0x")).map_err(|e| {
            ArtifactError::InvalidArtifact {
                contract: contract_name.to_string(),
                reason: format!("bytecode is not valid hex: {e}"),
            }
        })?;

        Ok(Artifact {
            contract_name: contract_name.to_string(),
            abi: parsed.abi,
            bytecode: Bytes::from(bytecode),
        })
    }
}
