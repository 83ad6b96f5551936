//! Subscriber fan-out
//!
//! Live subscriber sets for the price and trade channels, the JSON frames
//! pushed to them, and the periodic price broadcaster.

mod frames;
mod prices;
mod subscribers;

pub use frames::{CycleMetadata, PriceFrame, TradeFrame};
pub use prices::{CycleOutcome, CycleReport, PriceBroadcaster};
pub use subscribers::{SubscriberId, SubscriberSet, Subscription};
