//! Block entity load/save over tag compounds.
//!
//! Saved data comes in two generations: older files identify items by
//! numeric id, newer ones by namespaced name. Loading accepts both; saving
//! always writes the name.

use super::tag::Compound;
use tracing::warn;

/// Load/save contract for block entity state.
pub trait BlockEntity {
    /// Identifier written under `id`.
    fn save_id(&self) -> &'static str;

    fn position(&self) -> BlockPos;

    fn load(&mut self, tag: &Compound);

    fn save(&self, tag: &mut Compound);

    /// Writes the fields every block entity shares.
    fn save_common(&self, tag: &mut Compound) {
        let pos = self.position();
        tag.put_string("id", self.save_id());
        tag.put_int("x", pos.x);
        tag.put_int("y", pos.y);
        tag.put_int("z", pos.z);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// An item with its damage/variant value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemData {
    pub item: String,
    pub data: u8,
}

/// Numeric ids of the items a flower pot can hold.
const LEGACY_POT_ITEMS: &[(i32, &str)] = &[
    (6, "minecraft:sapling"),
    (31, "minecraft:tallgrass"),
    (32, "minecraft:deadbush"),
    (37, "minecraft:yellow_flower"),
    (38, "minecraft:red_flower"),
    (39, "minecraft:brown_mushroom"),
    (40, "minecraft:red_mushroom"),
    (81, "minecraft:cactus"),
];

pub fn legacy_item_name(id: i32) -> Option<&'static str> {
    LEGACY_POT_ITEMS
        .iter()
        .find(|(legacy, _)| *legacy == id)
        .map(|(_, name)| *name)
}

fn namespaced(name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        format!("minecraft:{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowerPot {
    pub position: BlockPos,
    pub contents: Option<ItemData>,
}

impl FlowerPot {
    pub fn new(position: BlockPos) -> Self {
        Self {
            position,
            contents: None,
        }
    }
}

impl BlockEntity for FlowerPot {
    fn save_id(&self) -> &'static str {
        "FlowerPot"
    }

    fn position(&self) -> BlockPos {
        self.position
    }

    fn load(&mut self, tag: &Compound) {
        let raw = tag.get_int("Data").unwrap_or(0);
        let data = u8::try_from(raw).unwrap_or_else(|_| {
            warn!("Flower pot at {:?} has out of range data value {}", self.position, raw);
            0
        });

        if let Some(name) = tag.get_str("Item").filter(|n| !n.is_empty()) {
            self.contents = Some(ItemData {
                item: namespaced(name),
                data,
            });
        } else if let Some(id) = tag.get_int("Item") {
            self.contents = match legacy_item_name(id) {
                Some(name) => Some(ItemData {
                    item: name.to_string(),
                    data,
                }),
                None => {
                    warn!("Flower pot at {:?} holds unknown legacy item {}", self.position, id);
                    None
                }
            };
        }
    }

    fn save(&self, tag: &mut Compound) {
        self.save_common(tag);
        match &self.contents {
            Some(contents) => {
                tag.put_string("Item", contents.item.clone());
                tag.put_int("Data", i32::from(contents.data));
            }
            None => {
                tag.put_string("Item", "");
                tag.put_int("Data", 0);
            }
        }
    }
}
