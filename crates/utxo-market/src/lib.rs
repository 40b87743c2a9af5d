//! # utxo-market
//!
//! Order book protocol on top of the token core.
//!
//! - [`OrderBook`] — Create, fill, cancel and list bid/ask orders
//! - [`plan_fill`] — Partial-fill arithmetic with checked amounts
//! - [`MarketConfig`] — Fee, scheme, expiry window and price guard

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod order;
pub mod orderbook;
pub mod settlement;

pub use config::{DEFAULT_EXPIRY_BLOCKS, MarketConfig, MarketConfigBuilder};
pub use error::{MarketError, Result};
pub use order::{Order, OrderId, OrderStatus};
pub use orderbook::{MarketOutcome, MarketReceipt, OrderBook, OrderRequest};
pub use settlement::{FillPlan, bid_lock, check_price, plan_fill};
