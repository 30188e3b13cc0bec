use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of a plugin, assigned by the native container. Always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PluginId(u32);

/// Id of a parameter, scoped to its plugin. Always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ParamId(u32);

/// Any addressable element: the root document, a plugin or a parameter.
///
/// Ids are only meaningful inside the container that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ElementId(u32);

impl PluginId {
    /// Returns `None` for the failure ids (< 1)
    pub fn new(raw: u32) -> Option<Self> {
        (raw >= 1).then_some(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl ParamId {
    /// Returns `None` for the failure ids (< 1)
    pub fn new(raw: u32) -> Option<Self> {
        (raw >= 1).then_some(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl ElementId {
    /// The document root, the default target of meta calls.
    ///
    /// The native header calls id 0 "the container itself", but 0 is also
    /// the not-found result of `GetElementId`, so this crate addresses the
    /// root as 1. Libraries that only honour 0 for the root are not
    /// supported.
    pub const ROOT: Self = Self(1);

    /// Returns `None` for 0, the "not found" id
    pub fn new(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Reinterpret as a plugin id (an element resolved at plugin scope)
    pub fn as_plugin(self) -> PluginId {
        PluginId(self.0)
    }

    /// Reinterpret as a parameter id (an element resolved under a plugin)
    pub fn as_param(self) -> ParamId {
        ParamId(self.0)
    }
}

impl From<PluginId> for ElementId {
    fn from(id: PluginId) -> Self {
        ElementId(id.0)
    }
}

impl From<ParamId> for ElementId {
    fn from(id: ParamId) -> Self {
        ElementId(id.0)
    }
}

macro_rules! serde_via_u32 {
    ($($id:ident),*) => {$(
        impl TryFrom<u32> for $id {
            type Error = String;

            fn try_from(raw: u32) -> Result<Self, String> {
                $id::new(raw).ok_or_else(|| format!("{} is not a valid {}", raw, stringify!($id)))
            }
        }

        impl From<$id> for u32 {
            fn from(id: $id) -> u32 {
                id.0
            }
        }
    )*};
}

serde_via_u32!(PluginId, ParamId, ElementId);

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin #{}", self.0)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param #{}", self.0)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element #{}", self.0)
    }
}
