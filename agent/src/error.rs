//! Consolidates configuration failures under common error types

use common::scene::NodeId;
use std::{fmt, io};

#[derive(Debug)]
pub enum RigError {
    // A node the rig refers to does not exist in the scene
    MissingNode { role: &'static str, node: NodeId },
    // Left and right leg lists must pair up for the alternating gait
    LegCountMismatch { left: usize, right: usize },
    // The detection layer name was never defined in the scene
    UnknownLayer(String),
}

impl fmt::Display for RigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNode { role, node } => write!(f, "Missing {} node {}", role, node),
            Self::LegCountMismatch { left, right } => write!(
                f,
                "Leg lists differ in length: {} left, {} right",
                left, right
            ),
            Self::UnknownLayer(name) => write!(f, "Unknown detection layer `{}`", name),
        }
    }
}

impl std::error::Error for RigError {}

#[derive(Debug)]
pub enum SettingsError {
    Io(io::Error),
    Serialization(ron::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", match self {
            Self::Io(error) => error.to_string(),
            Self::Serialization(error) => error.to_string(),
        })
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::Serialization(error) => Some(error),
        }
    }
}

impl From<io::Error> for SettingsError {
    fn from(error: io::Error) -> SettingsError { SettingsError::Io(error) }
}

impl From<ron::Error> for SettingsError {
    fn from(error: ron::Error) -> SettingsError { SettingsError::Serialization(error) }
}

/// Looks up a rig node, failing with its role if it is absent.
pub(crate) fn require(
    scene: &common::scene::Scene,
    role: &'static str,
    node: NodeId,
) -> Result<NodeId, RigError> {
    if scene.contains(node) {
        Ok(node)
    } else {
        Err(RigError::MissingNode { role, node })
    }
}
