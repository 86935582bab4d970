//! Domain models for creature records.
//!
//! `Creature` is the full record as served by the remote source.
//! `CachedRecord` is the reduced list-view projection that the cache persists;
//! see [`crate::compress`] for the mapping between the two.

use serde::{Deserialize, Serialize};

// ============================================================================
// Full domain record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Creature {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub types: Vec<TypeSlot>,
    #[serde(default)]
    pub sprites: Sprites,
    #[serde(default)]
    pub stats: Vec<StatEntry>,
    #[serde(default)]
    pub moves: Vec<MoveEntry>,
    #[serde(default)]
    pub abilities: Vec<AbilitySlot>,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub base_experience: u32,
    #[serde(default)]
    pub species: Option<SpeciesInfo>,
    #[serde(default)]
    pub form: Option<FormInfo>,
}

impl Creature {
    /// Type names in slot order
    pub fn type_names(&self) -> Vec<String> {
        let mut slots: Vec<&TypeSlot> = self.types.iter().collect();
        slots.sort_by_key(|t| t.slot);
        slots.into_iter().map(|t| t.type_name.clone()).collect()
    }

    /// Localized display name, falling back to the canonical name
    pub fn display_name(&self, language: &str) -> &str {
        self.species
            .as_ref()
            .and_then(|s| s.names.iter().find(|n| n.language == language))
            .map(|n| n.name.as_str())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSlot {
    pub slot: u8,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Sprites {
    pub front_default: Option<String>,
    #[serde(default)]
    pub official_artwork: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEntry {
    pub name: String,
    pub base_stat: u32,
    #[serde(default)]
    pub effort: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEntry {
    pub name: String,
    #[serde(default)]
    pub learn_method: Option<String>,
    #[serde(default)]
    pub level_learned_at: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilitySlot {
    pub name: String,
    pub slot: u8,
    #[serde(default)]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpeciesInfo {
    #[serde(default)]
    pub names: Vec<LocalizedName>,
    #[serde(default)]
    pub genera: Vec<LocalizedGenus>,
    #[serde(default)]
    pub is_baby: bool,
    #[serde(default)]
    pub is_legendary: bool,
    #[serde(default)]
    pub is_mythical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FormInfo {
    pub form_name: Option<String>,
    #[serde(default)]
    pub is_regional_variant: bool,
    #[serde(default)]
    pub is_mega: bool,
    #[serde(default)]
    pub is_dynamax: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedName {
    pub language: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedGenus {
    pub language: String,
    pub genus: String,
}

// ============================================================================
// Cached projection
// ============================================================================

/// List-view projection of a [`Creature`].
///
/// Field names are shortened on the wire and absent optionals are omitted;
/// partitions hold a few hundred of these, so the blob size matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRecord {
    #[serde(rename = "i")]
    pub id: u32,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "t", default)]
    pub types: Vec<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<String>,
    #[serde(rename = "ln", default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<LocalizedName>>,
    #[serde(rename = "lg", default, skip_serializing_if = "Option::is_none")]
    pub genera: Option<Vec<LocalizedGenus>>,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    pub form: Option<CachedForm>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Classification {
    #[serde(rename = "b", default)]
    pub is_baby: bool,
    #[serde(rename = "l", default)]
    pub is_legendary: bool,
    #[serde(rename = "m", default)]
    pub is_mythical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CachedForm {
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub form_name: Option<String>,
    #[serde(rename = "r", default)]
    pub is_regional_variant: bool,
    #[serde(rename = "m", default)]
    pub is_mega: bool,
    #[serde(rename = "d", default)]
    pub is_dynamax: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_follow_slot_order() {
        let creature = Creature {
            id: 1,
            name: "bulbasaur".to_string(),
            types: vec![
                TypeSlot { slot: 2, type_name: "poison".to_string() },
                TypeSlot { slot: 1, type_name: "grass".to_string() },
            ],
            ..Default::default()
        };
        assert_eq!(creature.type_names(), vec!["grass", "poison"]);
    }

    #[test]
    fn test_display_name_falls_back_to_canonical() {
        let mut creature = Creature {
            id: 25,
            name: "pikachu".to_string(),
            ..Default::default()
        };
        assert_eq!(creature.display_name("ja"), "pikachu");

        creature.species = Some(SpeciesInfo {
            names: vec![LocalizedName {
                language: "ja".to_string(),
                name: "ピカチュウ".to_string(),
            }],
            ..Default::default()
        });
        assert_eq!(creature.display_name("ja"), "ピカチュウ");
        assert_eq!(creature.display_name("fr"), "pikachu");
    }

    #[test]
    fn test_cached_record_omits_absent_optionals() {
        let record = CachedRecord {
            id: 4,
            name: "charmander".to_string(),
            types: vec!["fire".to_string()],
            sprite: None,
            names: None,
            genera: None,
            classification: None,
            form: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"i":4,"n":"charmander","t":["fire"]}"#);
    }
}
