//! Modifier source module.
//!
//! A `ModifierSource` records where a modifier comes from: applying to the
//! whole character (`Global`) or only to values coming from one particular
//! item, skill, passive node and so on (`Local`). Sources decide which
//! computation paths a modifier contributes to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Equipment slot of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemSlot {
    Unequipable,
    BodyArmour,
    MainHand,
    OffHand,
    Ring,
    Ring2,
    Amulet,
    Helm,
    Gloves,
    Boots,
    Belt,
    Flask(u8),
}

/// Radius of a jewel socketed into the passive tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JewelRadius {
    None,
    Small,
    Medium,
    Large,
}

/// The kind of a local source together with its discriminating data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalKind {
    /// Modifiers the character is given regardless of build choices.
    Given,
    PassiveNode { node_id: u16 },
    Item { slot: ItemSlot },
    Jewel { radius: JewelRadius, passive_node_id: u16 },
    Skill { skill_id: String },
    Gem { slot: ItemSlot, socket_index: u32 },
    UserSpecified,
}

/// A local source: a kind plus an optional display name.
///
/// The display name takes part in equality but is dropped by
/// [`ModifierSource::canonical`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalSource {
    pub kind: LocalKind,
    #[serde(default)]
    pub name: String,
}

impl LocalSource {
    pub fn new(kind: LocalKind) -> Self {
        Self {
            kind,
            name: String::new(),
        }
    }

    pub fn named(kind: LocalKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    fn canonical(&self) -> Self {
        Self::new(self.kind.clone())
    }
}

/// Provenance of a modifier.
///
/// # Examples
///
/// ```rust
/// use statgraph::source::{ItemSlot, ModifierSource};
///
/// let body = ModifierSource::item(ItemSlot::BodyArmour, "Sadist Garb");
///
/// assert_ne!(body, ModifierSource::item(ItemSlot::BodyArmour, ""));
/// assert_eq!(body.canonical(), ModifierSource::item(ItemSlot::BodyArmour, ""));
/// assert_eq!(
///     body.influencing_sources(),
///     vec![body.canonical(), ModifierSource::global()]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierSource {
    /// Applies to every value of the character. May remember the local
    /// source whose text it originated from.
    Global { local: Option<LocalSource> },
    Local(LocalSource),
}

impl ModifierSource {
    pub fn global() -> Self {
        Self::Global { local: None }
    }

    /// A global source created from the text of a local one.
    pub fn globalized(local: LocalSource) -> Self {
        Self::Global { local: Some(local) }
    }

    pub fn given() -> Self {
        Self::Local(LocalSource::new(LocalKind::Given))
    }

    pub fn item(slot: ItemSlot, name: impl Into<String>) -> Self {
        Self::Local(LocalSource::named(LocalKind::Item { slot }, name))
    }

    pub fn skill(skill_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Local(LocalSource::named(
            LocalKind::Skill {
                skill_id: skill_id.into(),
            },
            name,
        ))
    }

    pub fn passive_node(node_id: u16, name: impl Into<String>) -> Self {
        Self::Local(LocalSource::named(LocalKind::PassiveNode { node_id }, name))
    }

    pub fn jewel(radius: JewelRadius, passive_node_id: u16, name: impl Into<String>) -> Self {
        Self::Local(LocalSource::named(
            LocalKind::Jewel {
                radius,
                passive_node_id,
            },
            name,
        ))
    }

    pub fn gem(slot: ItemSlot, socket_index: u32, name: impl Into<String>) -> Self {
        Self::Local(LocalSource::named(LocalKind::Gem { slot, socket_index }, name))
    }

    pub fn user_specified() -> Self {
        Self::Local(LocalSource::new(LocalKind::UserSpecified))
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global { .. })
    }

    pub fn is_skill(&self) -> bool {
        matches!(
            self,
            Self::Local(LocalSource {
                kind: LocalKind::Skill { .. },
                ..
            })
        )
    }

    /// The source stripped of display names. Used to identify paths.
    pub fn canonical(&self) -> Self {
        match self {
            Self::Global { .. } => Self::global(),
            Self::Local(local) => Self::Local(local.canonical()),
        }
    }

    /// Canonical sources whose modifiers apply to values of this source,
    /// most specific first.
    pub fn influencing_sources(&self) -> Vec<ModifierSource> {
        match self {
            Self::Global { .. } => vec![Self::global()],
            Self::Local(_) => vec![self.canonical(), Self::global()],
        }
    }

    /// The display name, if any.
    pub fn name(&self) -> &str {
        match self {
            Self::Global { local: Some(local) } | Self::Local(local) => &local.name,
            Self::Global { local: None } => "",
        }
    }
}

impl Default for ModifierSource {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for ModifierSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = match self {
            Self::Global { local: None } => return write!(f, "Global"),
            Self::Global { local: Some(local) } | Self::Local(local) => local,
        };
        match &local.kind {
            LocalKind::Given => write!(f, "Given"),
            LocalKind::PassiveNode { node_id } => write!(f, "PassiveNode({node_id})"),
            LocalKind::Item { slot } => write!(f, "{slot:?}"),
            LocalKind::Jewel {
                radius,
                passive_node_id,
            } => write!(f, "Jewel({radius:?}, {passive_node_id})"),
            LocalKind::Skill { skill_id } => write!(f, "Skill({skill_id})"),
            LocalKind::Gem { slot, socket_index } => write!(f, "Gem({slot:?}, {socket_index})"),
            LocalKind::UserSpecified => write!(f, "UserSpecified"),
        }
    }
}
