//! Marketplace controller.
//!
//! Listing, buying and unlisting items. Every operation is all-or-nothing: a
//! listing and the ownership row it replaces never coexist, and a sale's two
//! balance mutations and ownership transfer land together or not at all.

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::store::Store;
use std::sync::Arc;
use venture_common::schemas::{Item, MarketListing, User, UserItem};

pub struct MarketController {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl MarketController {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// List an owned item for sale. The ownership row is removed in the same
    /// transaction that creates the listing.
    pub fn list(&self, user_id: i64, item_id: i64, price: u64) -> EngineResult<MarketListing> {
        if price == 0 {
            return Err(EngineError::validation("price must be positive"));
        }
        self.store
            .list_item(user_id, item_id, price, self.clock.now())
    }

    /// Buy an active listing: debit buyer, credit seller, deactivate the
    /// listing and hand the buyer the item, atomically. Returns the settled
    /// listing and the buyer's updated record.
    pub fn buy(&self, listing_id: i64, buyer_id: i64) -> EngineResult<(MarketListing, User)> {
        self.store.buy_listing(listing_id, buyer_id, self.clock.now())
    }

    /// Withdraw one's own active listing, restoring ownership.
    pub fn unlist(&self, listing_id: i64, owner_id: i64) -> EngineResult<MarketListing> {
        self.store
            .unlist_item(listing_id, owner_id, self.clock.now())
    }

    pub fn inventory(&self, user_id: i64) -> EngineResult<Vec<(UserItem, Item)>> {
        self.store.inventory(user_id)
    }

    pub fn listings(&self) -> EngineResult<Vec<(MarketListing, Item)>> {
        self.store.active_listings()
    }

    /// Toggle an inventory item's equipped flag; equipping unequips the
    /// user's other items.
    pub fn toggle_equipped(&self, user_id: i64, user_item_id: i64) -> EngineResult<UserItem> {
        self.store.toggle_equipped(user_id, user_item_id)
    }
}
