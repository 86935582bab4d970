//! Lossy mapping between full records and their cached projection.
//!
//! `compress` keeps what a list view renders (identity, name, type labels,
//! sprite) plus any localization, classification and form metadata present.
//! Stats, moves, abilities and size detail are dropped. `decompress` rebuilds a
//! structurally complete `Creature` with those fields left empty.

use crate::models::{
    CachedForm, CachedRecord, Classification, Creature, FormInfo, SpeciesInfo, Sprites, TypeSlot,
};

pub fn compress(creature: &Creature) -> CachedRecord {
    let sprite = creature
        .sprites
        .front_default
        .clone()
        .or_else(|| creature.sprites.official_artwork.clone());

    let (names, genera, classification) = match &creature.species {
        Some(species) => (
            non_empty(species.names.clone()),
            non_empty(species.genera.clone()),
            Some(Classification {
                is_baby: species.is_baby,
                is_legendary: species.is_legendary,
                is_mythical: species.is_mythical,
            }),
        ),
        None => (None, None, None),
    };

    let form = creature.form.as_ref().map(|f| CachedForm {
        form_name: f.form_name.clone(),
        is_regional_variant: f.is_regional_variant,
        is_mega: f.is_mega,
        is_dynamax: f.is_dynamax,
    });

    CachedRecord {
        id: creature.id,
        name: creature.name.clone(),
        types: creature.type_names(),
        sprite,
        names,
        genera,
        classification,
        form,
    }
}

pub fn decompress(cached: &CachedRecord) -> Creature {
    let types = cached
        .types
        .iter()
        .enumerate()
        .map(|(i, name)| TypeSlot {
            slot: (i + 1) as u8,
            type_name: name.clone(),
        })
        .collect();

    let has_species =
        cached.names.is_some() || cached.genera.is_some() || cached.classification.is_some();
    let species = has_species.then(|| {
        let flags = cached.classification.unwrap_or_default();
        SpeciesInfo {
            names: cached.names.clone().unwrap_or_default(),
            genera: cached.genera.clone().unwrap_or_default(),
            is_baby: flags.is_baby,
            is_legendary: flags.is_legendary,
            is_mythical: flags.is_mythical,
        }
    });

    let form = cached.form.as_ref().map(|f| FormInfo {
        form_name: f.form_name.clone(),
        is_regional_variant: f.is_regional_variant,
        is_mega: f.is_mega,
        is_dynamax: f.is_dynamax,
    });

    Creature {
        id: cached.id,
        name: cached.name.clone(),
        types,
        sprites: Sprites {
            front_default: cached.sprite.clone(),
            official_artwork: None,
        },
        stats: Vec::new(),
        moves: Vec::new(),
        abilities: Vec::new(),
        height: 0,
        weight: 0,
        base_experience: 0,
        species,
        form,
    }
}

pub fn compress_all(creatures: &[Creature]) -> Vec<CachedRecord> {
    creatures.iter().map(compress).collect()
}

pub fn decompress_all(records: &[CachedRecord]) -> Vec<Creature> {
    records.iter().map(decompress).collect()
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AbilitySlot, LocalizedGenus, LocalizedName, MoveEntry, StatEntry};

    fn charizard() -> Creature {
        Creature {
            id: 6,
            name: "charizard".to_string(),
            types: vec![
                TypeSlot { slot: 1, type_name: "fire".to_string() },
                TypeSlot { slot: 2, type_name: "flying".to_string() },
            ],
            sprites: Sprites {
                front_default: Some("https://img.example/6.png".to_string()),
                official_artwork: Some("https://img.example/art/6.png".to_string()),
            },
            stats: vec![StatEntry { name: "hp".to_string(), base_stat: 78, effort: 0 }],
            moves: vec![MoveEntry {
                name: "flamethrower".to_string(),
                learn_method: Some("machine".to_string()),
                level_learned_at: None,
            }],
            abilities: vec![AbilitySlot { name: "blaze".to_string(), slot: 1, is_hidden: false }],
            height: 17,
            weight: 905,
            base_experience: 267,
            species: Some(SpeciesInfo {
                names: vec![LocalizedName { language: "ja".to_string(), name: "リザードン".to_string() }],
                genera: vec![LocalizedGenus { language: "en".to_string(), genus: "Flame Pokémon".to_string() }],
                is_baby: false,
                is_legendary: false,
                is_mythical: false,
            }),
            form: Some(FormInfo {
                form_name: Some("mega-x".to_string()),
                is_regional_variant: false,
                is_mega: true,
                is_dynamax: false,
            }),
        }
    }

    #[test]
    fn test_round_trip_preserves_list_view_fields() {
        let original = charizard();
        let restored = decompress(&compress(&original));

        assert_eq!(restored.id, original.id);
        assert_eq!(restored.name, original.name);
        assert_eq!(restored.type_names(), original.type_names());
        assert_eq!(restored.sprites.front_default, original.sprites.front_default);
        assert_eq!(restored.species, original.species);
        assert_eq!(restored.form, original.form);
    }

    fn with_types(id: u32, name: &str, types: &[(u8, &str)]) -> Creature {
        Creature {
            id,
            name: name.to_string(),
            types: types
                .iter()
                .map(|(slot, t)| TypeSlot { slot: *slot, type_name: t.to_string() })
                .collect(),
            sprites: Sprites {
                front_default: Some(format!("https://img.example/{}.png", id)),
                official_artwork: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_round_trip_across_record_shapes() {
        let no_metadata = with_types(1, "bulbasaur", &[(2, "poison"), (1, "grass")]);

        let mut flags_only = with_types(151, "mew", &[(1, "psychic")]);
        flags_only.species = Some(SpeciesInfo {
            names: Vec::new(),
            genera: Vec::new(),
            is_baby: false,
            is_legendary: false,
            is_mythical: true,
        });

        let mut unnamed_form = with_types(10091, "rattata-alola", &[(1, "dark"), (2, "normal")]);
        unnamed_form.form = Some(FormInfo {
            form_name: None,
            is_regional_variant: true,
            is_mega: false,
            is_dynamax: false,
        });

        let mut artwork_only = with_types(25, "pikachu", &[(1, "electric")]);
        artwork_only.sprites = Sprites {
            front_default: None,
            official_artwork: Some("https://img.example/art/25.png".to_string()),
        };

        let mut multibyte = with_types(29, "ニドラン♀", &[(1, "poison")]);
        multibyte.species = Some(SpeciesInfo {
            names: vec![
                LocalizedName { language: "ko".to_string(), name: "니드런♀".to_string() },
                LocalizedName { language: "zh-Hans".to_string(), name: "尼多兰".to_string() },
            ],
            genera: vec![LocalizedGenus { language: "fr".to_string(), genus: "Pokémon Vénépic".to_string() }],
            is_baby: false,
            is_legendary: false,
            is_mythical: false,
        });

        let cases = [
            ("no metadata", no_metadata),
            ("classification flags only", flags_only),
            ("form without a name", unnamed_form),
            ("artwork-only sprite", artwork_only),
            ("multi-byte names", multibyte),
            ("full record", charizard()),
        ];

        for (label, original) in cases {
            let restored = decompress(&compress(&original));
            let expected_sprite = original
                .sprites
                .front_default
                .clone()
                .or_else(|| original.sprites.official_artwork.clone());

            assert_eq!(restored.id, original.id, "{}", label);
            assert_eq!(restored.name, original.name, "{}", label);
            assert_eq!(restored.type_names(), original.type_names(), "{}", label);
            assert_eq!(restored.sprites.front_default, expected_sprite, "{}", label);
            assert_eq!(restored.species, original.species, "{}", label);
            assert_eq!(restored.form, original.form, "{}", label);
        }
    }

    #[test]
    fn test_round_trip_drops_detail_fields() {
        let restored = decompress(&compress(&charizard()));
        assert!(restored.stats.is_empty());
        assert!(restored.moves.is_empty());
        assert!(restored.abilities.is_empty());
        assert_eq!(restored.height, 0);
        assert_eq!(restored.weight, 0);
        assert_eq!(restored.base_experience, 0);
    }

    #[test]
    fn test_decompress_rebuilds_one_based_type_slots() {
        let restored = decompress(&compress(&charizard()));
        let slots: Vec<u8> = restored.types.iter().map(|t| t.slot).collect();
        assert_eq!(slots, vec![1, 2]);
    }

    #[test]
    fn test_sprite_falls_back_to_artwork() {
        let mut creature = charizard();
        creature.sprites.front_default = None;
        let cached = compress(&creature);
        assert_eq!(cached.sprite.as_deref(), Some("https://img.example/art/6.png"));
    }

    #[test]
    fn test_bare_record_has_no_metadata() {
        let creature = Creature {
            id: 10,
            name: "caterpie".to_string(),
            ..Default::default()
        };
        let cached = compress(&creature);
        assert!(cached.names.is_none());
        assert!(cached.classification.is_none());
        assert!(cached.form.is_none());

        let restored = decompress(&cached);
        assert!(restored.species.is_none());
        assert!(restored.form.is_none());
    }

    #[test]
    fn test_classification_flags_survive() {
        let mut creature = charizard();
        if let Some(species) = creature.species.as_mut() {
            species.names.clear();
            species.genera.clear();
            species.is_legendary = true;
        }
        let restored = decompress(&compress(&creature));
        let species = restored.species.expect("classification implies species");
        assert!(species.is_legendary);
        assert!(!species.is_mythical);
    }
}
