//! Static collectible-item catalog.
//!
//! Hand-authored business memorabilia, skewed toward the common tier. Rows
//! are only persisted the first time an item is actually awarded.

use crate::schemas::{ItemCategory, ItemSpec, Rarity};

/// A catalog entry. `to_spec` produces the owned form used for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogItem {
    pub name: &'static str,
    pub description: &'static str,
    pub rarity: Rarity,
    pub category: ItemCategory,
}

impl CatalogItem {
    pub fn to_spec(&self) -> ItemSpec {
        ItemSpec {
            name: self.name.to_string(),
            description: self.description.to_string(),
            rarity: self.rarity,
            category: self.category,
        }
    }
}

const fn item(
    name: &'static str,
    description: &'static str,
    rarity: Rarity,
    category: ItemCategory,
) -> CatalogItem {
    CatalogItem {
        name,
        description,
        rarity,
        category,
    }
}

use ItemCategory::*;
use Rarity::*;

pub const ITEM_CATALOG: &[CatalogItem] = &[
    // Legendary
    item(
        "The Founding Garage Key",
        "Opens the garage where a trillion-dollar company allegedly started. Smells of solder and ambition.",
        Legendary,
        StartupMemorabilia,
    ),
    item(
        "Opening Bell of the First IPO",
        "Still ringing faintly. Each chime mints one paper millionaire somewhere.",
        Legendary,
        CorporateTreasures,
    ),
    item(
        "The Original Napkin Sketch",
        "A cocktail napkin bearing the first-ever platform business model, in smudged ballpoint.",
        Legendary,
        BusinessTools,
    ),
    item(
        "Punch Card Zero",
        "The very first punch card ever fed to a mainframe. Do not fold, spindle, or mutilate.",
        Legendary,
        TechRelics,
    ),
    item(
        "Scroll of Unread Terms",
        "The complete terms and conditions, printed. Nobody has ever reached the end and returned.",
        Legendary,
        CorporateTreasures,
    ),
    // Epic
    item(
        "The Demo-Day Hoodie",
        "Worn at seventeen consecutive demo days. Radiates an aura of product-market fit.",
        Epic,
        StartupMemorabilia,
    ),
    item(
        "Whiteboard of First Principles",
        "Still carries the ghost of a billion-dollar architecture diagram under the eraser marks.",
        Epic,
        OfficeArtifacts,
    ),
    item(
        "The Unicorn Horn Paperweight",
        "Crystallized from a ten-figure valuation. Glows during funding announcements.",
        Epic,
        StartupMemorabilia,
    ),
    item(
        "Server Rack of the Old Web",
        "A beige tower that once served a million page views of blinking text.",
        Epic,
        TechRelics,
    ),
    item(
        "The Eternal Espresso Machine",
        "Has never been descaled, never been off, and never once failed before a launch.",
        Epic,
        OfficeArtifacts,
    ),
    item(
        "Pitch Deck of Prophecy",
        "Slide 7 predicts your next pivot with unsettling accuracy.",
        Epic,
        BusinessTools,
    ),
    item(
        "Ironclad NDA Stack",
        "Bound in reinforced legalese. Keeps even the office gossip quiet.",
        Epic,
        CorporateTreasures,
    ),
    item(
        "The First Accepted Answer",
        "Preserved in digital amber. Solved a problem nobody remembers having.",
        Epic,
        TechRelics,
    ),
    item(
        "Keycard to the Corner Office",
        "Grants access to a room that is somehow always booked.",
        Epic,
        CorporateTreasures,
    ),
    // Rare
    item(
        "Rubber Duck of Debugging",
        "Has heard more confessions than any therapist. Judges silently.",
        Rare,
        TechRelics,
    ),
    item(
        "The Battle-Scarred Ping Pong Table",
        "Witnessed four pivots, two mergers, and one very heated sprint retro.",
        Rare,
        OfficeArtifacts,
    ),
    item(
        "Investor's Monocle",
        "See straight through any pitch deck to the bottom line beneath.",
        Rare,
        BusinessTools,
    ),
    item(
        "Prototype Sticky Notes",
        "The original yellow squares used to plan world domination, one task at a time.",
        Rare,
        OfficeArtifacts,
    ),
    item(
        "The Beta Tester's Notebook",
        "Detailed notes on bugs that should never have shipped, but did.",
        Rare,
        TechRelics,
    ),
    item(
        "Mechanical Keyboard of Focus",
        "Loud enough to drown out every distraction and most coworkers.",
        Rare,
        OfficeArtifacts,
    ),
    item(
        "The Founder's Flip-Flops",
        "Have walked the halls of countless conferences and one acquisition.",
        Rare,
        StartupMemorabilia,
    ),
    item(
        "Canvas of a Thousand Pivots",
        "A business model canvas erased so often it has achieved a soft gray enlightenment.",
        Rare,
        BusinessTools,
    ),
    item(
        "The Angel's Tarnished Halo",
        "Dimmed by one seed round too many. Still sparkles in pitch meetings.",
        Rare,
        CorporateTreasures,
    ),
    item(
        "Crypto Winter Beanie",
        "Knitted during the downturn. Warm, slightly volatile.",
        Rare,
        TechRelics,
    ),
    item(
        "Cloud Storage Snow Globe",
        "Shake it to watch your data drift gently through the cloud.",
        Rare,
        TechRelics,
    ),
    item(
        "Stand-Up Meeting Stool",
        "The ironic seat from the world's longest fifteen-minute stand-up.",
        Rare,
        OfficeArtifacts,
    ),
    item(
        "Perpetual Beta Badge",
        "Proudly worn since forever. Somehow still hasn't reached v1.0.",
        Rare,
        TechRelics,
    ),
    // Common
    item(
        "Defunct Startup Sticker Sheet",
        "A pristine collection of logos from companies that no longer exist.",
        Common,
        StartupMemorabilia,
    ),
    item(
        "The Infinite Todo Scroll",
        "Generates new tasks faster than you can cross them off.",
        Common,
        BusinessTools,
    ),
    item(
        "Pizza-Stained Keyboard",
        "Bears the grease marks of countless midnight deploys.",
        Common,
        OfficeArtifacts,
    ),
    item(
        "Reply-All Chain Mail",
        "Forged from the wreckage of inboxes lost to a single careless click.",
        Common,
        OfficeArtifacts,
    ),
    item(
        "Casual Friday Hawaiian Shirt",
        "Has survived hundreds of casual Fridays and remains painfully casual.",
        Common,
        OfficeArtifacts,
    ),
    item(
        "Networking Card Stack",
        "Collected at events. Most have coffee rings and illegible notes.",
        Common,
        BusinessTools,
    ),
    item(
        "Expired Domain Portfolio",
        "A binder of names that could have been worth millions. Maybe.",
        Common,
        TechRelics,
    ),
    item(
        "Agile Sprint Sneakers",
        "Well worn from running through planning sessions.",
        Common,
        OfficeArtifacts,
    ),
    item(
        "Motivational Poster Bundle",
        "Has inspired eye rolls across a thousand open-plan offices.",
        Common,
        OfficeArtifacts,
    ),
    item(
        "The Hockey Stick Chart",
        "A growth chart that looks suspiciously like sporting equipment.",
        Common,
        BusinessTools,
    ),
    item(
        "The Disruption Button",
        "A big red button pressed by every founder who ever said 'Uber, but for'.",
        Common,
        StartupMemorabilia,
    ),
    item(
        "Pivot Table of Destiny",
        "A spreadsheet pivoted so many times it now pivots itself.",
        Common,
        BusinessTools,
    ),
    item(
        "Mythical Man-Month Calendar",
        "Always shows you behind schedule, however early you start.",
        Common,
        BusinessTools,
    ),
    item(
        "Premium Profile Crown",
        "Slightly dented. Lets you see exactly who viewed your profile.",
        Common,
        CorporateTreasures,
    ),
    item(
        "Beta Version Badge",
        "Has been in beta longer than most startups have existed.",
        Common,
        TechRelics,
    ),
    item(
        "Lanyard of a Hundred Conferences",
        "Heavy with badges from events remembered only by their tote bags.",
        Common,
        StartupMemorabilia,
    ),
    item(
        "The Office Plant That Lived",
        "Survived three reorgs and a desk move on fluorescent light alone.",
        Common,
        OfficeArtifacts,
    ),
    item(
        "Burndown Chart Candle",
        "Burns down steadily and is always gone one day before the deadline.",
        Common,
        BusinessTools,
    ),
];

/// All catalog entries of a rarity tier.
pub fn items_of_rarity(rarity: Rarity) -> impl Iterator<Item = &'static CatalogItem> {
    ITEM_CATALOG.iter().filter(move |i| i.rarity == rarity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_rarity_is_stocked() {
        for rarity in Rarity::ALL {
            assert!(
                items_of_rarity(rarity).next().is_some(),
                "no items of rarity {:?}",
                rarity
            );
        }
    }

    #[test]
    fn test_distribution_skews_common() {
        let count = |r| items_of_rarity(r).count();
        assert!(count(Rarity::Common) > count(Rarity::Rare));
        assert!(count(Rarity::Rare) > count(Rarity::Epic));
        assert!(count(Rarity::Epic) > count(Rarity::Legendary));
    }

    #[test]
    fn test_identities_are_unique() {
        let mut seen = HashSet::new();
        for entry in ITEM_CATALOG {
            assert!(
                seen.insert((entry.name, entry.rarity, entry.category)),
                "duplicate catalog identity: {}",
                entry.name
            );
        }
        assert_eq!(ITEM_CATALOG.len(), 45);
    }
}
